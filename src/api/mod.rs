mod error;
mod handlers;
pub(crate) mod helpers;
mod router;
mod session;
mod types;

pub use router::build_router;
pub use types::AppState;
