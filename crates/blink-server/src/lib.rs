pub mod auth;
pub mod clock;
pub mod dirs;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod server;
pub mod store;
pub mod validate;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: store::Store,
    /// Shared secret for the admin routes. `None` closes them.
    pub admin_secret: Option<String>,
    /// Public base URL used to build `shortUrl` in link responses.
    pub public_url: String,
}

pub use error::BlinkError;
pub use server::{load_or_create_key, resolve_data_dir, router, run, ServerConfig};
