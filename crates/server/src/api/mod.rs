pub mod anime;
pub mod catalog;
pub mod error;
pub mod handlers;
pub mod library;
pub mod middleware;
pub mod routes;

pub use error::ErrorResponse;
pub use routes::create_router;
