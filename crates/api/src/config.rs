//! Server configuration loaded from environment variables.

/// All fields have defaults suitable for local development; override via
/// environment variables in production.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Grace period for background jobs during shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Directory uploaded videos are stored in (default: `uploads`).
    pub upload_dir: String,
    /// Maximum accepted upload size in bytes (default: 100 MiB).
    pub max_upload_bytes: usize,
    /// Base URL of the remote inference service. When unset the server
    /// falls back to the built-in static backends.
    pub inference_endpoint: Option<String>,
    /// Default object-detection model name.
    pub detection_model: String,
    /// Default scene-classification model name.
    pub classification_model: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                   |
    /// |-------------------------|---------------------------|
    /// | `HOST`                  | `0.0.0.0`                 |
    /// | `PORT`                  | `8000`                    |
    /// | `CORS_ORIGINS`          | `http://localhost:5173`   |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                      |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                      |
    /// | `UPLOAD_DIR`            | `uploads`                 |
    /// | `MAX_UPLOAD_BYTES`      | `104857600`               |
    /// | `INFERENCE_ENDPOINT`    | unset                     |
    /// | `DETECTION_MODEL`       | `facebook/detr-resnet-50` |
    /// | `CLASSIFICATION_MODEL`  | `MCG-NJU/videomae-base`   |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".into());

        let max_upload_bytes: usize = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| (100 * 1024 * 1024).to_string())
            .parse()
            .expect("MAX_UPLOAD_BYTES must be a valid usize");

        let inference_endpoint = std::env::var("INFERENCE_ENDPOINT")
            .ok()
            .filter(|s| !s.is_empty());

        let detection_model = std::env::var("DETECTION_MODEL")
            .unwrap_or_else(|_| "facebook/detr-resnet-50".into());

        let classification_model = std::env::var("CLASSIFICATION_MODEL")
            .unwrap_or_else(|_| "MCG-NJU/videomae-base".into());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            upload_dir,
            max_upload_bytes,
            inference_endpoint,
            detection_model,
            classification_model,
        }
    }
}
