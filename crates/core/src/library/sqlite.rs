//! SQLite-backed library implementation.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::{
    generate_id, Anime, AnimeStatus, CollectionEntry, CollectionItem, CollectionStatus,
    CollectionUpdate, Episode, LibraryError, LibraryStats, LibraryStore, NewAnime, NewEpisode,
    WatchedMark, WatchlistEntry, WatchlistItem,
};

const ANIME_COLUMNS: &str = "id, external_id, title, original_title, synopsis, poster_image_url, \
     cover_image_url, episode_count, status, start_date, end_date, age_rating";

const JOINED_ANIME_COLUMNS: &str = "a.id, a.external_id, a.title, a.original_title, a.synopsis, \
     a.poster_image_url, a.cover_image_url, a.episode_count, a.status, a.start_date, a.end_date, \
     a.age_rating";

const EPISODE_COLUMNS: &str = "id, anime_id, external_id, number, title, synopsis, air_date, \
     thumbnail_url, length_minutes";

const JOINED_EPISODE_COLUMNS: &str = "e.id, e.anime_id, e.external_id, e.number, e.title, \
     e.synopsis, e.air_date, e.thumbnail_url, e.length_minutes";

const COLLECTION_COLUMNS: &str =
    "id, anime_id, status, progress, start_date, finish_date, rating, notes, created_at";

const JOINED_COLLECTION_COLUMNS: &str = "c.id, c.anime_id, c.status, c.progress, c.start_date, \
     c.finish_date, c.rating, c.notes, c.created_at";

/// SQLite-backed library.
pub struct SqliteLibrary {
    conn: Mutex<Connection>,
}

impl SqliteLibrary {
    /// Open (or create) the library database at `path` and create the schema if needed.
    pub fn new(path: &Path) -> Result<Self, LibraryError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| LibraryError::Initialization(e.to_string()))?;
        }
        let conn =
            Connection::open(path).map_err(|e| LibraryError::Initialization(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory library (useful for testing).
    pub fn in_memory() -> Result<Self, LibraryError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LibraryError::Initialization(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LibraryError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS animes (
                id TEXT PRIMARY KEY,
                external_id TEXT,
                title TEXT NOT NULL,
                original_title TEXT,
                synopsis TEXT,
                poster_image_url TEXT,
                cover_image_url TEXT,
                episode_count INTEGER,
                status TEXT NOT NULL DEFAULT 'unknown',
                start_date TEXT,
                end_date TEXT,
                age_rating TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_animes_external_id
                ON animes(external_id) WHERE external_id IS NOT NULL;

            CREATE TABLE IF NOT EXISTS episodes (
                id TEXT PRIMARY KEY,
                anime_id TEXT NOT NULL REFERENCES animes(id) ON DELETE CASCADE,
                external_id TEXT,
                number INTEGER NOT NULL CHECK (number > 0),
                title TEXT,
                synopsis TEXT,
                air_date TEXT,
                thumbnail_url TEXT,
                length_minutes INTEGER,
                UNIQUE(anime_id, number)
            );

            CREATE INDEX IF NOT EXISTS idx_episodes_anime_id ON episodes(anime_id);

            CREATE INDEX IF NOT EXISTS idx_episodes_external_id
                ON episodes(external_id) WHERE external_id IS NOT NULL;

            CREATE TABLE IF NOT EXISTS user_collection (
                id TEXT PRIMARY KEY,
                anime_id TEXT NOT NULL UNIQUE REFERENCES animes(id) ON DELETE CASCADE,
                status TEXT NOT NULL DEFAULT 'planned',
                progress INTEGER NOT NULL DEFAULT 0,
                start_date TEXT,
                finish_date TEXT,
                rating INTEGER CHECK (rating IS NULL OR rating BETWEEN 1 AND 10),
                notes TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_user_collection_created_at
                ON user_collection(created_at);

            CREATE TABLE IF NOT EXISTS watched_episodes (
                id TEXT PRIMARY KEY,
                episode_id TEXT NOT NULL UNIQUE REFERENCES episodes(id) ON DELETE CASCADE,
                watched_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS watchlist (
                id TEXT PRIMARY KEY,
                episode_id TEXT NOT NULL UNIQUE REFERENCES episodes(id) ON DELETE CASCADE,
                added_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_watchlist_added_at ON watchlist(added_at);
            "#,
        )
        .map_err(|e| LibraryError::Initialization(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LibraryError> {
        self.conn
            .lock()
            .map_err(|_| LibraryError::Storage("library connection lock poisoned".to_string()))
    }

    fn anime_exists(conn: &Connection, anime_id: &str) -> Result<bool, LibraryError> {
        conn.query_row(
            "SELECT 1 FROM animes WHERE id = ?1",
            params![anime_id],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(storage)
    }

    fn anime_id_of_episode(
        conn: &Connection,
        episode_id: &str,
    ) -> Result<Option<String>, LibraryError> {
        conn.query_row(
            "SELECT anime_id FROM episodes WHERE id = ?1",
            params![episode_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage)
    }

    fn insert_collection_entry(
        conn: &Connection,
        anime_id: &str,
        status: CollectionStatus,
    ) -> Result<String, LibraryError> {
        let id = generate_id();
        let now = timestamp(Utc::now());
        let start_date = (status == CollectionStatus::Watching).then(|| now.clone());

        conn.execute(
            "INSERT INTO user_collection (id, anime_id, status, progress, start_date, created_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?5)",
            params![id, anime_id, status.as_str(), start_date, now],
        )
        .map_err(storage)?;

        Ok(id)
    }

    /// Recount the watched episodes of `anime_id` and write the result into its
    /// collection entry. With `create_missing`, a `watching` entry is created first
    /// when the anime is not collected yet.
    fn recompute_progress(
        conn: &Connection,
        anime_id: &str,
        create_missing: bool,
    ) -> Result<u32, LibraryError> {
        let watched: u32 = conn
            .query_row(
                "SELECT COUNT(*) FROM watched_episodes w
                 JOIN episodes e ON w.episode_id = e.id
                 WHERE e.anime_id = ?1",
                params![anime_id],
                |row| row.get(0),
            )
            .map_err(storage)?;

        let updated = conn
            .execute(
                "UPDATE user_collection SET progress = ?1 WHERE anime_id = ?2",
                params![watched, anime_id],
            )
            .map_err(storage)?;

        if updated == 0 && create_missing {
            debug!("Auto-adding anime {} to collection as watching", anime_id);
            let entry_id = Self::insert_collection_entry(conn, anime_id, CollectionStatus::Watching)?;
            conn.execute(
                "UPDATE user_collection SET progress = ?1 WHERE id = ?2",
                params![watched, entry_id],
            )
            .map_err(storage)?;
        }

        Ok(watched)
    }
}

impl LibraryStore for SqliteLibrary {
    fn upsert_anime(&self, anime: &NewAnime) -> Result<String, LibraryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let existing: Option<String> = match anime.external_id.as_deref() {
            Some(external_id) => tx
                .query_row(
                    "SELECT id FROM animes WHERE external_id = ?1",
                    params![external_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage)?,
            None => None,
        };

        let id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE animes SET
                        title = ?1,
                        original_title = ?2,
                        synopsis = ?3,
                        poster_image_url = ?4,
                        cover_image_url = ?5,
                        episode_count = ?6,
                        status = ?7,
                        start_date = ?8,
                        end_date = ?9,
                        age_rating = ?10
                     WHERE id = ?11",
                    params![
                        anime.title,
                        anime.original_title,
                        anime.synopsis,
                        anime.poster_image_url,
                        anime.cover_image_url,
                        anime.episode_count,
                        anime.status.as_str(),
                        anime.start_date,
                        anime.end_date,
                        anime.age_rating,
                        id,
                    ],
                )
                .map_err(storage)?;
                id
            }
            None => {
                let id = anime.id.clone().unwrap_or_else(generate_id);
                tx.execute(
                    &format!(
                        "INSERT INTO animes ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                        ANIME_COLUMNS
                    ),
                    params![
                        id,
                        anime.external_id,
                        anime.title,
                        anime.original_title,
                        anime.synopsis,
                        anime.poster_image_url,
                        anime.cover_image_url,
                        anime.episode_count,
                        anime.status.as_str(),
                        anime.start_date,
                        anime.end_date,
                        anime.age_rating,
                    ],
                )
                .map_err(storage)?;
                id
            }
        };

        tx.commit().map_err(storage)?;
        debug!("Stored anime '{}' as {}", anime.title, id);
        Ok(id)
    }

    fn upsert_episode(&self, episode: &NewEpisode) -> Result<String, LibraryError> {
        if episode.number == 0 {
            return Err(LibraryError::Validation(
                "episode number must be positive".to_string(),
            ));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM episodes WHERE anime_id = ?1 AND number = ?2",
                params![episode.anime_id, episode.number],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)?;

        let id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE episodes SET
                        external_id = COALESCE(?1, external_id),
                        title = ?2,
                        synopsis = ?3,
                        air_date = ?4,
                        thumbnail_url = ?5,
                        length_minutes = ?6
                     WHERE id = ?7",
                    params![
                        episode.external_id,
                        episode.title,
                        episode.synopsis,
                        episode.air_date,
                        episode.thumbnail_url,
                        episode.length_minutes,
                        id,
                    ],
                )
                .map_err(storage)?;
                id
            }
            None => {
                let id = episode.id.clone().unwrap_or_else(generate_id);
                tx.execute(
                    &format!(
                        "INSERT INTO episodes ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        EPISODE_COLUMNS
                    ),
                    params![
                        id,
                        episode.anime_id,
                        episode.external_id,
                        episode.number,
                        episode.title,
                        episode.synopsis,
                        episode.air_date,
                        episode.thumbnail_url,
                        episode.length_minutes,
                    ],
                )
                .map_err(storage)?;
                id
            }
        };

        tx.commit().map_err(storage)?;
        Ok(id)
    }

    fn get_anime(&self, id: &str) -> Result<Option<Anime>, LibraryError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM animes WHERE id = ?1", ANIME_COLUMNS),
            params![id],
            |row| row_to_anime(row, 0),
        )
        .optional()
        .map_err(storage)
    }

    fn get_anime_by_external_id(&self, external_id: &str) -> Result<Option<Anime>, LibraryError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM animes WHERE external_id = ?1", ANIME_COLUMNS),
            params![external_id],
            |row| row_to_anime(row, 0),
        )
        .optional()
        .map_err(storage)
    }

    fn get_episodes(&self, anime_id: &str) -> Result<Vec<Episode>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM episodes WHERE anime_id = ?1 ORDER BY number ASC",
                EPISODE_COLUMNS
            ))
            .map_err(storage)?;

        let rows = stmt
            .query_map(params![anime_id], |row| row_to_episode(row, 0))
            .map_err(storage)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(storage)
    }

    fn get_episode(&self, id: &str) -> Result<Option<Episode>, LibraryError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM episodes WHERE id = ?1", EPISODE_COLUMNS),
            params![id],
            |row| row_to_episode(row, 0),
        )
        .optional()
        .map_err(storage)
    }

    fn get_episode_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Episode>, LibraryError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM episodes WHERE external_id = ?1 LIMIT 1",
                EPISODE_COLUMNS
            ),
            params![external_id],
            |row| row_to_episode(row, 0),
        )
        .optional()
        .map_err(storage)
    }

    fn mark_watched(&self, episode_id: &str) -> Result<(), LibraryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let anime_id = Self::anime_id_of_episode(&tx, episode_id)?
            .ok_or_else(|| LibraryError::NotFound(format!("Episode {}", episode_id)))?;

        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO watched_episodes (id, episode_id, watched_at)
                 VALUES (?1, ?2, ?3)",
                params![generate_id(), episode_id, timestamp(Utc::now())],
            )
            .map_err(storage)?;

        if inserted > 0 {
            let progress = Self::recompute_progress(&tx, &anime_id, true)?;
            debug!(
                "Marked episode {} watched, anime {} progress is now {}",
                episode_id, anime_id, progress
            );
        }

        tx.execute(
            "DELETE FROM watchlist WHERE episode_id = ?1",
            params![episode_id],
        )
        .map_err(storage)?;

        tx.commit().map_err(storage)
    }

    fn unmark_watched(&self, episode_id: &str) -> Result<(), LibraryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let deleted = tx
            .execute(
                "DELETE FROM watched_episodes WHERE episode_id = ?1",
                params![episode_id],
            )
            .map_err(storage)?;

        if deleted > 0 {
            if let Some(anime_id) = Self::anime_id_of_episode(&tx, episode_id)? {
                let progress = Self::recompute_progress(&tx, &anime_id, false)?;
                debug!(
                    "Unmarked episode {}, anime {} progress is now {}",
                    episode_id, anime_id, progress
                );
            }
        }

        tx.commit().map_err(storage)
    }

    fn is_watched(&self, episode_id: &str) -> Result<bool, LibraryError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT 1 FROM watched_episodes WHERE episode_id = ?1",
            params![episode_id],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(storage)
    }

    fn watched_episode_ids(&self, anime_id: &str) -> Result<HashSet<String>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT w.episode_id FROM watched_episodes w
                 JOIN episodes e ON w.episode_id = e.id
                 WHERE e.anime_id = ?1",
            )
            .map_err(storage)?;

        let rows = stmt
            .query_map(params![anime_id], |row| row.get::<_, String>(0))
            .map_err(storage)?;

        rows.collect::<Result<HashSet<_>, _>>().map_err(storage)
    }

    fn watched_marks(&self, anime_id: &str) -> Result<Vec<WatchedMark>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT w.id, w.episode_id, w.watched_at FROM watched_episodes w
                 JOIN episodes e ON w.episode_id = e.id
                 WHERE e.anime_id = ?1
                 ORDER BY e.number ASC",
            )
            .map_err(storage)?;

        let rows = stmt
            .query_map(params![anime_id], |row| {
                Ok(WatchedMark {
                    id: row.get(0)?,
                    episode_id: row.get(1)?,
                    watched_at: parse_timestamp(&row.get::<_, String>(2)?),
                })
            })
            .map_err(storage)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(storage)
    }

    fn add_to_watchlist(&self, episode_id: &str) -> Result<(), LibraryError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO watchlist (id, episode_id, added_at) VALUES (?1, ?2, ?3)",
            params![generate_id(), episode_id, timestamp(Utc::now())],
        )
        .map_err(storage)?;
        Ok(())
    }

    fn remove_from_watchlist(&self, episode_id: &str) -> Result<(), LibraryError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM watchlist WHERE episode_id = ?1",
            params![episode_id],
        )
        .map_err(storage)?;
        Ok(())
    }

    fn is_in_watchlist(&self, episode_id: &str) -> Result<bool, LibraryError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT 1 FROM watchlist WHERE episode_id = ?1",
            params![episode_id],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(storage)
    }

    fn watchlist(&self) -> Result<Vec<WatchlistItem>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT w.id, w.episode_id, w.added_at, {}, {}
                 FROM watchlist w
                 JOIN episodes e ON w.episode_id = e.id
                 JOIN animes a ON e.anime_id = a.id
                 ORDER BY w.added_at DESC, w.rowid DESC",
                JOINED_EPISODE_COLUMNS, JOINED_ANIME_COLUMNS
            ))
            .map_err(storage)?;

        let rows = stmt
            .query_map([], |row| {
                let added_at: String = row.get(2)?;
                Ok(WatchlistItem {
                    entry: WatchlistEntry {
                        id: row.get(0)?,
                        episode_id: row.get(1)?,
                        added_at: parse_timestamp(&added_at),
                    },
                    episode: row_to_episode(row, 3)?,
                    anime: row_to_anime(row, 12)?,
                })
            })
            .map_err(storage)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(storage)
    }

    fn add_to_collection(
        &self,
        anime_id: &str,
        status: CollectionStatus,
    ) -> Result<String, LibraryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        if !Self::anime_exists(&tx, anime_id)? {
            return Err(LibraryError::NotFound(format!("Anime {}", anime_id)));
        }

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM user_collection WHERE anime_id = ?1",
                params![anime_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)?;

        let id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE user_collection SET status = ?1 WHERE id = ?2",
                    params![status.as_str(), id],
                )
                .map_err(storage)?;
                id
            }
            None => Self::insert_collection_entry(&tx, anime_id, status)?,
        };

        tx.commit().map_err(storage)?;
        debug!("Anime {} is in the collection as {}", anime_id, status);
        Ok(id)
    }

    fn update_collection_entry(
        &self,
        collection_id: &str,
        update: &CollectionUpdate,
    ) -> Result<(), LibraryError> {
        if let Some(rating) = update.rating {
            if !(1..=10).contains(&rating) {
                return Err(LibraryError::Validation(format!(
                    "rating must be between 1 and 10, got {}",
                    rating
                )));
            }
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let episode_count: Option<Option<u32>> = tx
            .query_row(
                "SELECT a.episode_count FROM user_collection c
                 JOIN animes a ON c.anime_id = a.id
                 WHERE c.id = ?1",
                params![collection_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)?;

        let Some(episode_count) = episode_count else {
            return Err(LibraryError::NotFound(format!(
                "Collection entry {}",
                collection_id
            )));
        };

        if let (Some(progress), Some(total)) = (update.progress, episode_count) {
            if progress > total {
                return Err(LibraryError::Validation(format!(
                    "progress {} exceeds episode count {}",
                    progress, total
                )));
            }
        }

        tx.execute(
            "UPDATE user_collection SET
                status = COALESCE(?1, status),
                progress = COALESCE(?2, progress),
                rating = COALESCE(?3, rating),
                notes = COALESCE(?4, notes)
             WHERE id = ?5",
            params![
                update.status.map(|s| s.as_str()),
                update.progress,
                update.rating,
                update.notes,
                collection_id,
            ],
        )
        .map_err(storage)?;

        tx.commit().map_err(storage)
    }

    fn remove_from_collection(&self, collection_id: &str) -> Result<(), LibraryError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM user_collection WHERE id = ?1",
            params![collection_id],
        )
        .map_err(storage)?;
        Ok(())
    }

    fn collection(&self) -> Result<Vec<CollectionItem>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {}, {}
                 FROM user_collection c
                 JOIN animes a ON c.anime_id = a.id
                 ORDER BY c.created_at DESC, c.rowid DESC",
                JOINED_COLLECTION_COLUMNS, JOINED_ANIME_COLUMNS
            ))
            .map_err(storage)?;

        let rows = stmt
            .query_map([], |row| {
                Ok(CollectionItem {
                    entry: row_to_collection_entry(row, 0)?,
                    anime: row_to_anime(row, 9)?,
                })
            })
            .map_err(storage)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(storage)
    }

    fn collection_entry_for_anime(
        &self,
        anime_id: &str,
    ) -> Result<Option<CollectionEntry>, LibraryError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM user_collection WHERE anime_id = ?1",
                COLLECTION_COLUMNS
            ),
            params![anime_id],
            |row| row_to_collection_entry(row, 0),
        )
        .optional()
        .map_err(storage)
    }

    fn stats(&self) -> Result<LibraryStats, LibraryError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM animes),
                (SELECT COUNT(*) FROM episodes),
                (SELECT COUNT(*) FROM user_collection),
                (SELECT COUNT(*) FROM watched_episodes),
                (SELECT COUNT(*) FROM watchlist)",
            [],
            |row| {
                Ok(LibraryStats {
                    animes: row.get(0)?,
                    episodes: row.get(1)?,
                    collection_entries: row.get(2)?,
                    watched_episodes: row.get(3)?,
                    watchlist_entries: row.get(4)?,
                })
            },
        )
        .map_err(storage)
    }
}

fn storage(e: rusqlite::Error) -> LibraryError {
    LibraryError::Storage(e.to_string())
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_optional_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value.and_then(|v| {
        DateTime::parse_from_rfc3339(&v)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

fn row_to_anime(row: &Row, base: usize) -> rusqlite::Result<Anime> {
    let status: Option<String> = row.get(base + 8)?;
    Ok(Anime {
        id: row.get(base)?,
        external_id: row.get(base + 1)?,
        title: row.get(base + 2)?,
        original_title: row.get(base + 3)?,
        synopsis: row.get(base + 4)?,
        poster_image_url: row.get(base + 5)?,
        cover_image_url: row.get(base + 6)?,
        episode_count: row.get(base + 7)?,
        status: status
            .as_deref()
            .map(AnimeStatus::parse_lenient)
            .unwrap_or_default(),
        start_date: row.get(base + 9)?,
        end_date: row.get(base + 10)?,
        age_rating: row.get(base + 11)?,
    })
}

fn row_to_episode(row: &Row, base: usize) -> rusqlite::Result<Episode> {
    Ok(Episode {
        id: row.get(base)?,
        anime_id: row.get(base + 1)?,
        external_id: row.get(base + 2)?,
        number: row.get(base + 3)?,
        title: row.get(base + 4)?,
        synopsis: row.get(base + 5)?,
        air_date: row.get(base + 6)?,
        thumbnail_url: row.get(base + 7)?,
        length_minutes: row.get(base + 8)?,
    })
}

fn row_to_collection_entry(row: &Row, base: usize) -> rusqlite::Result<CollectionEntry> {
    let status_text: String = row.get(base + 2)?;
    let status = status_text
        .parse::<CollectionStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(base + 2, Type::Text, Box::new(e)))?;
    let created_at: String = row.get(base + 8)?;

    Ok(CollectionEntry {
        id: row.get(base)?,
        anime_id: row.get(base + 1)?,
        status,
        progress: row.get(base + 3)?,
        start_date: parse_optional_timestamp(row.get(base + 4)?),
        finish_date: parse_optional_timestamp(row.get(base + 5)?),
        rating: row.get(base + 6)?,
        notes: row.get(base + 7)?,
        created_at: parse_timestamp(&created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_library() -> SqliteLibrary {
        SqliteLibrary::in_memory().unwrap()
    }

    fn test_anime(external_id: Option<&str>, title: &str) -> NewAnime {
        NewAnime {
            external_id: external_id.map(String::from),
            title: title.to_string(),
            original_title: Some("ワンピース".to_string()),
            synopsis: Some("Pirates.".to_string()),
            poster_image_url: Some("https://media.kitsu.io/poster.jpg".to_string()),
            episode_count: Some(3),
            status: AnimeStatus::Current,
            start_date: Some("1999-10-20".to_string()),
            ..Default::default()
        }
    }

    fn test_episode(anime_id: &str, number: u32) -> NewEpisode {
        NewEpisode {
            anime_id: anime_id.to_string(),
            external_id: Some(format!("ep-{}", number)),
            number,
            title: Some(format!("Episode {}", number)),
            length_minutes: Some(24),
            ..Default::default()
        }
    }

    /// Anime with external id "12" and three episodes. Returns (anime_id, episode_ids).
    fn seed(library: &SqliteLibrary) -> (String, Vec<String>) {
        let anime_id = library.upsert_anime(&test_anime(Some("12"), "One Piece")).unwrap();
        let episodes = (1..=3)
            .map(|n| library.upsert_episode(&test_episode(&anime_id, n)).unwrap())
            .collect();
        (anime_id, episodes)
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("library.db");

        let first = SqliteLibrary::new(&path).unwrap();
        first.upsert_anime(&test_anime(Some("1"), "Cowboy Bebop")).unwrap();
        drop(first);

        let second = SqliteLibrary::new(&path).unwrap();
        assert_eq!(second.stats().unwrap().animes, 1);
    }

    #[test]
    fn test_new_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("library.db");
        SqliteLibrary::new(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_open_failure_is_initialization_error() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be opened as a database file.
        let result = SqliteLibrary::new(dir.path());
        assert!(matches!(result, Err(LibraryError::Initialization(_))));
    }

    #[test]
    fn test_upsert_anime_same_external_id_keeps_one_row() {
        let library = create_test_library();

        let first = library.upsert_anime(&test_anime(Some("12"), "One Piece")).unwrap();
        let mut updated = test_anime(Some("12"), "One Piece (TV)");
        updated.episode_count = Some(1100);
        let second = library.upsert_anime(&updated).unwrap();

        assert_eq!(first, second);
        assert_eq!(library.stats().unwrap().animes, 1);

        let anime = library.get_anime(&first).unwrap().unwrap();
        assert_eq!(anime.title, "One Piece (TV)");
        assert_eq!(anime.episode_count, Some(1100));
    }

    #[test]
    fn test_upsert_anime_update_ignores_supplied_id() {
        let library = create_test_library();
        let first = library.upsert_anime(&test_anime(Some("12"), "One Piece")).unwrap();

        let mut again = test_anime(Some("12"), "One Piece");
        again.id = Some("other-id".to_string());
        assert_eq!(library.upsert_anime(&again).unwrap(), first);
        assert!(library.get_anime("other-id").unwrap().is_none());
    }

    #[test]
    fn test_upsert_anime_null_external_id_always_inserts() {
        let library = create_test_library();

        let a = library.upsert_anime(&test_anime(None, "Homebrew")).unwrap();
        let b = library.upsert_anime(&test_anime(None, "Homebrew")).unwrap();

        assert_ne!(a, b);
        assert_eq!(library.stats().unwrap().animes, 2);
    }

    #[test]
    fn test_upsert_anime_uses_supplied_id_on_insert() {
        let library = create_test_library();
        let mut anime = test_anime(Some("7"), "Trigun");
        anime.id = Some("local-7".to_string());

        assert_eq!(library.upsert_anime(&anime).unwrap(), "local-7");
        assert_eq!(
            library.get_anime_by_external_id("7").unwrap().unwrap().id,
            "local-7"
        );
    }

    #[test]
    fn test_get_missing_returns_none() {
        let library = create_test_library();
        assert!(library.get_anime("nope").unwrap().is_none());
        assert!(library.get_anime_by_external_id("nope").unwrap().is_none());
        assert!(library.get_episode("nope").unwrap().is_none());
        assert!(library.get_episodes("nope").unwrap().is_empty());
    }

    #[test]
    fn test_upsert_episode_keyed_on_anime_and_number() {
        let library = create_test_library();
        let anime_id = library.upsert_anime(&test_anime(Some("12"), "One Piece")).unwrap();

        let first = library.upsert_episode(&test_episode(&anime_id, 1)).unwrap();
        let mut renamed = test_episode(&anime_id, 1);
        renamed.title = Some("I'm Luffy!".to_string());
        renamed.external_id = None;
        let second = library.upsert_episode(&renamed).unwrap();

        assert_eq!(first, second);
        let episode = library.get_episode(&first).unwrap().unwrap();
        assert_eq!(episode.title.as_deref(), Some("I'm Luffy!"));
        // A missing external id does not erase the known one.
        assert_eq!(episode.external_id.as_deref(), Some("ep-1"));
    }

    #[test]
    fn test_upsert_episode_rejects_number_zero() {
        let library = create_test_library();
        let anime_id = library.upsert_anime(&test_anime(Some("12"), "One Piece")).unwrap();
        let result = library.upsert_episode(&test_episode(&anime_id, 0));
        assert!(matches!(result, Err(LibraryError::Validation(_))));
    }

    #[test]
    fn test_upsert_episode_requires_existing_anime() {
        let library = create_test_library();
        let result = library.upsert_episode(&test_episode("ghost", 1));
        assert!(matches!(result, Err(LibraryError::Storage(_))));
    }

    #[test]
    fn test_get_episodes_ordered_by_number() {
        let library = create_test_library();
        let anime_id = library.upsert_anime(&test_anime(Some("12"), "One Piece")).unwrap();
        for n in [3, 1, 2] {
            library.upsert_episode(&test_episode(&anime_id, n)).unwrap();
        }

        let numbers: Vec<u32> = library
            .get_episodes(&anime_id)
            .unwrap()
            .iter()
            .map(|e| e.number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_mark_watched_auto_creates_collection_entry() {
        let library = create_test_library();
        let (anime_id, episodes) = seed(&library);

        library.mark_watched(&episodes[0]).unwrap();
        library.mark_watched(&episodes[1]).unwrap();

        let collection = library.collection().unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection[0].anime.id, anime_id);
        assert_eq!(collection[0].anime.external_id.as_deref(), Some("12"));
        assert_eq!(collection[0].entry.status, CollectionStatus::Watching);
        assert_eq!(collection[0].entry.progress, 2);
        assert!(collection[0].entry.start_date.is_some());

        library.unmark_watched(&episodes[0]).unwrap();

        let entry = library.collection_entry_for_anime(&anime_id).unwrap().unwrap();
        assert_eq!(entry.progress, 1);
        assert_eq!(entry.status, CollectionStatus::Watching);
    }

    #[test]
    fn test_get_episode_by_external_id() {
        let library = create_test_library();
        let (_, episodes) = seed(&library);

        let episode = library.get_episode_by_external_id("ep-2").unwrap().unwrap();
        assert_eq!(episode.id, episodes[1]);
        assert_eq!(episode.number, 2);
        assert!(library.get_episode_by_external_id(&episodes[1]).unwrap().is_none());
    }

    #[test]
    fn test_watched_marks_of_one_anime_by_number() {
        let library = create_test_library();
        let (anime_id, episodes) = seed(&library);
        let other_id = library.upsert_anime(&test_anime(Some("1"), "Cowboy Bebop")).unwrap();
        let other_episode = library.upsert_episode(&test_episode(&other_id, 1)).unwrap();

        library.mark_watched(&episodes[2]).unwrap();
        library.mark_watched(&episodes[0]).unwrap();
        library.mark_watched(&other_episode).unwrap();

        let marks = library.watched_marks(&anime_id).unwrap();
        let marked: Vec<&str> = marks.iter().map(|m| m.episode_id.as_str()).collect();
        assert_eq!(marked, vec![episodes[0].as_str(), episodes[2].as_str()]);
        assert!(marks.iter().all(|m| m.watched_at <= Utc::now()));

        library.unmark_watched(&episodes[0]).unwrap();
        assert_eq!(library.watched_marks(&anime_id).unwrap().len(), 1);
        assert!(library.watched_marks("missing").unwrap().is_empty());
    }

    #[test]
    fn test_mark_watched_is_idempotent() {
        let library = create_test_library();
        let (anime_id, episodes) = seed(&library);

        library.mark_watched(&episodes[0]).unwrap();
        let before = library.collection_entry_for_anime(&anime_id).unwrap().unwrap();
        library.mark_watched(&episodes[0]).unwrap();
        let after = library.collection_entry_for_anime(&anime_id).unwrap().unwrap();

        assert_eq!(before.progress, 1);
        assert_eq!(after.progress, 1);
        assert_eq!(library.stats().unwrap().watched_episodes, 1);
    }

    #[test]
    fn test_mark_watched_unknown_episode_is_not_found() {
        let library = create_test_library();
        let result = library.mark_watched("ghost");
        assert!(matches!(result, Err(LibraryError::NotFound(_))));
    }

    #[test]
    fn test_mark_watched_removes_from_watchlist() {
        let library = create_test_library();
        let (_, episodes) = seed(&library);

        library.add_to_watchlist(&episodes[2]).unwrap();
        assert!(library.is_in_watchlist(&episodes[2]).unwrap());

        library.mark_watched(&episodes[2]).unwrap();

        assert!(library.is_watched(&episodes[2]).unwrap());
        assert!(!library.is_in_watchlist(&episodes[2]).unwrap());
    }

    #[test]
    fn test_mark_watched_updates_existing_entry_without_status_change() {
        let library = create_test_library();
        let (anime_id, episodes) = seed(&library);
        library
            .add_to_collection(&anime_id, CollectionStatus::Planned)
            .unwrap();

        library.mark_watched(&episodes[0]).unwrap();

        let entry = library.collection_entry_for_anime(&anime_id).unwrap().unwrap();
        assert_eq!(entry.status, CollectionStatus::Planned);
        assert_eq!(entry.progress, 1);
    }

    #[test]
    fn test_progress_tracks_watched_count() {
        let library = create_test_library();
        let (anime_id, episodes) = seed(&library);

        let steps: [(usize, bool); 7] = [
            (0, true),
            (1, true),
            (1, true),
            (2, true),
            (0, false),
            (0, false),
            (2, false),
        ];
        for (index, mark) in steps {
            if mark {
                library.mark_watched(&episodes[index]).unwrap();
            } else {
                library.unmark_watched(&episodes[index]).unwrap();
            }
            let watched = library.watched_episode_ids(&anime_id).unwrap();
            let entry = library.collection_entry_for_anime(&anime_id).unwrap().unwrap();
            assert_eq!(entry.progress as usize, watched.len());
        }

        let watched = library.watched_episode_ids(&anime_id).unwrap();
        assert_eq!(watched, HashSet::from([episodes[1].clone()]));
    }

    #[test]
    fn test_unmark_without_collection_entry_does_not_create_one() {
        let library = create_test_library();
        let (anime_id, episodes) = seed(&library);

        library.mark_watched(&episodes[0]).unwrap();
        let entry = library.collection_entry_for_anime(&anime_id).unwrap().unwrap();
        library.remove_from_collection(&entry.id).unwrap();

        library.unmark_watched(&episodes[0]).unwrap();
        assert!(library.collection_entry_for_anime(&anime_id).unwrap().is_none());
    }

    #[test]
    fn test_unmark_not_watched_is_noop() {
        let library = create_test_library();
        let (_, episodes) = seed(&library);
        library.unmark_watched(&episodes[0]).unwrap();
        library.unmark_watched("ghost").unwrap();
        assert!(!library.is_watched(&episodes[0]).unwrap());
    }

    #[test]
    fn test_watchlist_idempotent_and_ordered_newest_first() {
        let library = create_test_library();
        let (anime_id, episodes) = seed(&library);

        library.add_to_watchlist(&episodes[0]).unwrap();
        library.add_to_watchlist(&episodes[1]).unwrap();
        library.add_to_watchlist(&episodes[0]).unwrap();

        let list = library.watchlist().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].episode.id, episodes[1]);
        assert_eq!(list[1].episode.id, episodes[0]);
        assert_eq!(list[0].anime.id, anime_id);
        assert_eq!(list[0].episode.number, 2);

        library.remove_from_watchlist(&episodes[1]).unwrap();
        library.remove_from_watchlist(&episodes[1]).unwrap();
        assert_eq!(library.watchlist().unwrap().len(), 1);
    }

    #[test]
    fn test_add_to_collection_sets_start_date_only_when_watching() {
        let library = create_test_library();
        let watching = library.upsert_anime(&test_anime(Some("1"), "A")).unwrap();
        let planned = library.upsert_anime(&test_anime(Some("2"), "B")).unwrap();

        library
            .add_to_collection(&watching, CollectionStatus::Watching)
            .unwrap();
        library
            .add_to_collection(&planned, CollectionStatus::Planned)
            .unwrap();

        let watching_entry = library.collection_entry_for_anime(&watching).unwrap().unwrap();
        let planned_entry = library.collection_entry_for_anime(&planned).unwrap().unwrap();
        assert!(watching_entry.start_date.is_some());
        assert!(planned_entry.start_date.is_none());
        assert_eq!(planned_entry.progress, 0);
    }

    #[test]
    fn test_add_to_collection_twice_updates_status() {
        let library = create_test_library();
        let anime_id = library.upsert_anime(&test_anime(Some("1"), "A")).unwrap();

        let first = library
            .add_to_collection(&anime_id, CollectionStatus::Planned)
            .unwrap();
        let second = library
            .add_to_collection(&anime_id, CollectionStatus::Completed)
            .unwrap();

        assert_eq!(first, second);
        let collection = library.collection().unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection[0].entry.status, CollectionStatus::Completed);
    }

    #[test]
    fn test_add_to_collection_unknown_anime() {
        let library = create_test_library();
        let result = library.add_to_collection("ghost", CollectionStatus::Planned);
        assert!(matches!(result, Err(LibraryError::NotFound(_))));
    }

    #[test]
    fn test_collection_ordered_most_recent_first() {
        let library = create_test_library();
        let first = library.upsert_anime(&test_anime(Some("1"), "First")).unwrap();
        let second = library.upsert_anime(&test_anime(Some("2"), "Second")).unwrap();

        library
            .add_to_collection(&first, CollectionStatus::Planned)
            .unwrap();
        library
            .add_to_collection(&second, CollectionStatus::Planned)
            .unwrap();

        let titles: Vec<String> = library
            .collection()
            .unwrap()
            .into_iter()
            .map(|item| item.anime.title)
            .collect();
        assert_eq!(titles, vec!["Second", "First"]);
    }

    #[test]
    fn test_update_collection_entry_partial() {
        let library = create_test_library();
        let anime_id = library.upsert_anime(&test_anime(Some("1"), "A")).unwrap();
        let entry_id = library
            .add_to_collection(&anime_id, CollectionStatus::Watching)
            .unwrap();

        library
            .update_collection_entry(
                &entry_id,
                &CollectionUpdate {
                    progress: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();
        library
            .update_collection_entry(
                &entry_id,
                &CollectionUpdate {
                    status: Some(CollectionStatus::Completed),
                    rating: Some(9),
                    notes: Some("Great ending".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let entry = library.collection_entry_for_anime(&anime_id).unwrap().unwrap();
        assert_eq!(entry.status, CollectionStatus::Completed);
        assert_eq!(entry.progress, 2);
        assert_eq!(entry.rating, Some(9));
        assert_eq!(entry.notes.as_deref(), Some("Great ending"));
    }

    #[test]
    fn test_update_collection_entry_validation() {
        let library = create_test_library();
        let anime_id = library.upsert_anime(&test_anime(Some("1"), "A")).unwrap();
        let entry_id = library
            .add_to_collection(&anime_id, CollectionStatus::Watching)
            .unwrap();

        let bad_rating = CollectionUpdate {
            rating: Some(11),
            ..Default::default()
        };
        assert!(matches!(
            library.update_collection_entry(&entry_id, &bad_rating),
            Err(LibraryError::Validation(_))
        ));

        let too_far = CollectionUpdate {
            progress: Some(4),
            ..Default::default()
        };
        assert!(matches!(
            library.update_collection_entry(&entry_id, &too_far),
            Err(LibraryError::Validation(_))
        ));

        let entry = library.collection_entry_for_anime(&anime_id).unwrap().unwrap();
        assert_eq!(entry.progress, 0);
        assert_eq!(entry.rating, None);
    }

    #[test]
    fn test_update_missing_collection_entry() {
        let library = create_test_library();
        let result = library.update_collection_entry(
            "ghost",
            &CollectionUpdate {
                status: Some(CollectionStatus::Dropped),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(LibraryError::NotFound(_))));
    }

    #[test]
    fn test_remove_from_collection_keeps_anime_and_episodes() {
        let library = create_test_library();
        let (anime_id, episodes) = seed(&library);
        library.mark_watched(&episodes[0]).unwrap();
        let entry = library.collection_entry_for_anime(&anime_id).unwrap().unwrap();

        library.remove_from_collection(&entry.id).unwrap();

        assert!(library.collection().unwrap().is_empty());
        assert!(library.get_anime(&anime_id).unwrap().is_some());
        assert_eq!(library.get_episodes(&anime_id).unwrap().len(), 3);
        assert!(library.is_watched(&episodes[0]).unwrap());
    }

    #[test]
    fn test_deleting_anime_cascades() {
        let library = create_test_library();
        let (anime_id, episodes) = seed(&library);
        library.mark_watched(&episodes[0]).unwrap();
        library.add_to_watchlist(&episodes[1]).unwrap();

        library
            .conn()
            .unwrap()
            .execute("DELETE FROM animes WHERE id = ?1", params![anime_id])
            .unwrap();

        let stats = library.stats().unwrap();
        assert_eq!(stats, LibraryStats::default());
    }

    #[test]
    fn test_unknown_collection_status_is_storage_error() {
        let library = create_test_library();
        let anime_id = library.upsert_anime(&test_anime(Some("1"), "A")).unwrap();
        library
            .add_to_collection(&anime_id, CollectionStatus::Planned)
            .unwrap();
        library
            .conn()
            .unwrap()
            .execute("UPDATE user_collection SET status = 'on_hold'", [])
            .unwrap();

        assert!(matches!(library.collection(), Err(LibraryError::Storage(_))));
    }

    #[test]
    fn test_stats() {
        let library = create_test_library();
        let (_, episodes) = seed(&library);
        library.mark_watched(&episodes[0]).unwrap();
        library.add_to_watchlist(&episodes[1]).unwrap();

        let stats = library.stats().unwrap();
        assert_eq!(stats.animes, 1);
        assert_eq!(stats.episodes, 3);
        assert_eq!(stats.collection_entries, 1);
        assert_eq!(stats.watched_episodes, 1);
        assert_eq!(stats.watchlist_entries, 1);
    }
}
