use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use super::csrf::CSRF_HEADER;

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub max_age_secs: u64,
}

impl CorsConfig {
    /// Explicit origins win; otherwise only the server's own origin is allowed.
    pub fn new(configured: &[String], base_url: &str) -> Self {
        let allowed_origins = if configured.is_empty() {
            origin_of(base_url).into_iter().collect()
        } else {
            configured.to_vec()
        };
        Self {
            allowed_origins,
            max_age_secs: 3600,
        }
    }

    pub fn build(self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter(|o| is_valid_origin_format(o))
            .filter_map(|o| o.parse().ok())
            .collect();
        if origins.len() != self.allowed_origins.len() {
            warn!("Ignoring malformed CORS origins in {:?}", self.allowed_origins);
        }
        info!("CORS allows {} origin(s)", origins.len());

        let csrf_header = HeaderName::from_static(CSRF_HEADER);
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::ACCEPT,
                csrf_header,
            ])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(self.max_age_secs))
    }
}

/// `scheme://host[:port]` of a URL, without path.
pub fn origin_of(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let host = rest.split('/').next().filter(|h| !h.is_empty())?;
    Some(format!("{scheme}://{host}"))
}

fn is_valid_origin_format(origin: &str) -> bool {
    if !origin.starts_with("http://") && !origin.starts_with("https://") {
        return false;
    }
    if origin.contains("..") || origin.matches("//").count() > 1 {
        return false;
    }
    let lower = origin.to_lowercase();
    !["<script", "javascript:", "data:", "%3c", "%3e", "\\x"]
        .iter()
        .any(|pattern| lower.contains(pattern))
}
