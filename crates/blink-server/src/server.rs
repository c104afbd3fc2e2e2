use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    auth::require_admin_secret,
    handlers::{
        admin_cleanup_links, admin_delete_link, admin_delete_snippet, admin_list_links,
        admin_list_snippets, admin_stats, create_link, create_snippet, health, link_stats,
        read_snippet, redirect,
    },
    store::crypto::{self, EncryptionKey},
    store::Store,
    AppState,
};

pub const DB_FILE_NAME: &str = "blink.db";
pub const KEY_FILE_NAME: &str = "blink.key";

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub admin_secret: Option<String>,
    pub data_dir: Option<PathBuf>,
    /// Base used to build `shortUrl`; defaults to `http://<host>:<port>`.
    pub public_url: Option<String>,
    pub sweep_interval: Duration,
    pub request_timeout: Duration,
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("BLINK_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("BLINK_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            admin_secret: std::env::var("BLINK_ADMIN_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            data_dir: std::env::var("BLINK_DATA_DIR").ok().map(PathBuf::from),
            public_url: std::env::var("BLINK_PUBLIC_URL").ok(),
            sweep_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(10),
            cors_origins: std::env::var("BLINK_CORS_ORIGINS").ok(),
        }
    }
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");

    let enc_key = load_or_create_key(&data_dir)?;
    let store = Store::open(&data_dir.join(DB_FILE_NAME), enc_key).context("open store")?;

    store.clone().spawn_sweep(cfg.sweep_interval);

    if cfg.admin_secret.is_none() {
        info!("BLINK_ADMIN_SECRET not set, admin endpoints are disabled");
    }

    let public_url = cfg
        .public_url
        .clone()
        .unwrap_or_else(|| default_public_url(&cfg.host, cfg.port));

    let state = AppState {
        store,
        admin_secret: cfg.admin_secret.clone(),
        public_url,
    };

    let app = with_transport_layers(
        router(state),
        cfg.request_timeout,
        cfg.cors_origins.as_deref(),
    );

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "blink server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}

/// All routes with state applied, without transport layers.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/api/snippets", post(create_snippet))
        .route("/api/snippets/{code}", get(read_snippet))
        .route("/api/links", post(create_link))
        .route("/api/links/{slug}", get(link_stats))
        .route("/{slug}", get(redirect));

    let admin = Router::new()
        .route("/api/admin/stats", get(admin_stats))
        .route("/api/admin/snippets", get(admin_list_snippets))
        .route("/api/admin/snippets/{code}", delete(admin_delete_snippet))
        .route("/api/admin/links", get(admin_list_links))
        .route("/api/admin/links/cleanup", post(admin_cleanup_links))
        .route("/api/admin/links/{slug}", delete(admin_delete_link))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_secret,
        ));

    Router::new().merge(public).merge(admin).with_state(state)
}

/// Timeout (408 on expiry), CORS and request tracing around `app`.
pub fn with_transport_layers(app: Router, timeout: Duration, cors_origins: Option<&str>) -> Router {
    app.layer(TimeoutLayer::with_status_code(
        http::StatusCode::REQUEST_TIMEOUT,
        timeout,
    ))
    .layer(build_cors(cors_origins))
    .layer(TraceLayer::new_for_http())
}

/// Base for `shortUrl` when none is configured. A wildcard bind address is
/// not reachable by clients, so it is swapped for `localhost`.
fn default_public_url(host: &str, port: u16) -> String {
    let unspecified = host
        .trim_matches(|c| c == '[' || c == ']')
        .parse::<std::net::IpAddr>()
        .is_ok_and(|ip| ip.is_unspecified());
    if unspecified {
        format!("http://localhost:{port}")
    } else if host.contains(':') && !host.starts_with('[') {
        format!("http://[{host}]:{port}")
    } else {
        format!("http://{host}:{port}")
    }
}

/// Use `explicit` when given (creating it if needed), else the platform data dir.
pub fn resolve_data_dir(explicit: Option<&PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(d) => {
            std::fs::create_dir_all(d).context("create data dir")?;
            Ok(d.clone())
        }
        None => crate::dirs::data_dir(),
    }
}

pub fn load_or_create_key(data_dir: &Path) -> Result<EncryptionKey> {
    let key_path = data_dir.join(KEY_FILE_NAME);
    if key_path.exists() {
        let bytes = std::fs::read(&key_path).context("read blink.key")?;
        crypto::load_key(&bytes).ok_or_else(|| {
            anyhow::anyhow!(
                "blink.key is corrupt (expected {} bytes, got {})",
                crypto::KEY_LEN,
                bytes.len()
            )
        })
    } else {
        let key = crypto::generate_key();
        std::fs::write(&key_path, key.as_bytes()).context("write blink.key")?;
        info!("generated new encryption key");
        Ok(key)
    }
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
