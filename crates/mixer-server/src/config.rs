//! Server Configuration
//!
//! Read from the environment (and `.env` via dotenvy in `main`).

use std::path::PathBuf;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_APP_URL: &str = "http://localhost:3000";
const DEFAULT_STATIC_DIR: &str = "static";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind_addr: String,

    /// Public base URL customers are redirected back to
    pub app_url: String,

    /// Directory holding the marketing pages
    pub static_dir: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let app_url = lookup("APP_URL")
            .or_else(|| lookup("NEXT_PUBLIC_APP_URL"))
            .unwrap_or_else(|| DEFAULT_APP_URL.into());

        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            app_url: app_url.trim_end_matches('/').to_string(),
            static_dir: lookup("STATIC_DIR")
                .unwrap_or_else(|| DEFAULT_STATIC_DIR.into())
                .into(),
        }
    }
}
