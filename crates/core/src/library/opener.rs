//! Lazy, once-only opening of the library database.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use super::{LibraryError, SqliteLibrary};

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

/// Opens the library at most once.
///
/// Concurrent callers of [`initialize`](Self::initialize) wait on the same
/// open and all receive the same handle. A failed open is not cached, so a
/// later call retries.
pub struct LibraryOpener {
    location: Location,
    cell: OnceCell<Arc<SqliteLibrary>>,
}

impl LibraryOpener {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
            cell: OnceCell::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            cell: OnceCell::new(),
        }
    }

    /// Open the database and create the schema, or return the already-open handle.
    pub async fn initialize(&self) -> Result<Arc<SqliteLibrary>, LibraryError> {
        let library = self
            .cell
            .get_or_try_init(|| async {
                let location = self.location.clone();
                let library = tokio::task::spawn_blocking(move || match location {
                    Location::File(path) => {
                        info!("Opening library at {}", path.display());
                        SqliteLibrary::new(&path)
                    }
                    Location::Memory => SqliteLibrary::in_memory(),
                })
                .await
                .map_err(|e| LibraryError::Initialization(e.to_string()))??;
                Ok::<_, LibraryError>(Arc::new(library))
            })
            .await?;

        Ok(Arc::clone(library))
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::LibraryStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_concurrent_initialize_shares_one_handle() {
        let dir = TempDir::new().unwrap();
        let opener = Arc::new(LibraryOpener::new(dir.path().join("library.db")));
        assert!(!opener.is_initialized());

        let a = tokio::spawn({
            let opener = Arc::clone(&opener);
            async move { opener.initialize().await.unwrap() }
        });
        let b = tokio::spawn({
            let opener = Arc::clone(&opener);
            async move { opener.initialize().await.unwrap() }
        });

        let a = a.await.unwrap();
        let b = b.await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(opener.is_initialized());
    }

    #[tokio::test]
    async fn test_initialize_again_returns_same_library() {
        let opener = LibraryOpener::in_memory();
        let first = opener.initialize().await.unwrap();
        first
            .upsert_anime(&crate::library::NewAnime {
                title: "Mushishi".to_string(),
                ..Default::default()
            })
            .unwrap();

        let second = opener.initialize().await.unwrap();
        assert_eq!(second.stats().unwrap().animes, 1);
    }

    #[tokio::test]
    async fn test_failed_open_is_reported() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let opener = LibraryOpener::new(blocker.join("library.db"));
        let result = opener.initialize().await;
        assert!(matches!(result, Err(LibraryError::Initialization(_))));
        assert!(!opener.is_initialized());
    }
}
