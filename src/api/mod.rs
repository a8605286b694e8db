//! HTTP API over the scanner, ledger and resolver.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
