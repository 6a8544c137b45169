// Submodules
pub mod download;
pub mod handlers;
pub mod page;
pub mod routes;
pub mod runtime;
mod state;

pub use routes::create_router;
pub use runtime::run;
pub use state::AppState;

/// Sent as the `Server` header on every response. Probes look for exactly this.
pub const SERVER_IDENTITY: &str = "friendly-file-server";
