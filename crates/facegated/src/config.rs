use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Default upload limit for `/verify-face` bodies: 10 MiB.
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// CORS origin policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    /// `*` (or an empty value) allows any origin; otherwise a comma-separated list.
    fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins)
        }
    }
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface to bind (default: 0.0.0.0).
    pub host: String,
    /// Listening port (default: 5001).
    pub port: u16,
    /// Origins allowed by CORS.
    pub allowed_origins: AllowedOrigins,
    /// Directory holding one enrollment image per identity.
    pub faces_dir: PathBuf,
    /// Euclidean distance below which the nearest reference is accepted.
    pub tolerance: f32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Maximum accepted request body size in bytes.
    pub max_upload_bytes: usize,
    /// Capacity of the request queue in front of the extraction engine.
    pub engine_queue: usize,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    ///
    /// `PORT` and `ALLOWED_ORIGINS` are honoured when the prefixed variants are unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, fallback: Option<&str>| {
            lookup(key).or_else(|| fallback.and_then(&lookup))
        };

        Self {
            host: get("FACEGATE_HOST", None).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(get("FACEGATE_PORT", Some("PORT"))).unwrap_or(5001),
            allowed_origins: AllowedOrigins::parse(
                &get("FACEGATE_ALLOWED_ORIGINS", Some("ALLOWED_ORIGINS"))
                    .unwrap_or_else(|| "*".into()),
            ),
            faces_dir: get("FACEGATE_FACES_DIR", None)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("face_recognition/known_faces")),
            tolerance: parse(get("FACEGATE_TOLERANCE", None))
                .filter(|t: &f32| t.is_finite())
                .unwrap_or(facegate_core::DEFAULT_TOLERANCE),
            model_dir: get("FACEGATE_MODEL_DIR", None)
                .map(PathBuf::from)
                .unwrap_or_else(facegate_core::default_model_dir),
            max_upload_bytes: parse(get("FACEGATE_MAX_UPLOAD_BYTES", None))
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            engine_queue: parse(get("FACEGATE_ENGINE_QUEUE", None))
                .filter(|&n: &usize| n > 0)
                .unwrap_or(4),
        }
    }

    /// Socket address to bind, or an error naming the bad host.
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("invalid bind address {addr}: {e}"))
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join(facegate_core::SCRFD_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join(facegate_core::ARCFACE_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

fn parse<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]);
        assert_eq!(c.host, "0.0.0.0");
        assert_eq!(c.port, 5001);
        assert_eq!(c.allowed_origins, AllowedOrigins::Any);
        assert_eq!(c.faces_dir, PathBuf::from("face_recognition/known_faces"));
        assert_eq!(c.tolerance, 1.0);
        assert_eq!(c.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(c.engine_queue, 4);
        assert!(c.scrfd_model_path().ends_with("det_10g.onnx"));
    }

    #[test]
    fn test_prefixed_values_win_over_fallbacks() {
        let c = config(&[
            ("PORT", "8080"),
            ("FACEGATE_PORT", "9000"),
            ("ALLOWED_ORIGINS", "https://a.example"),
        ]);
        assert_eq!(c.port, 9000);
        assert_eq!(c.allowed_origins, AllowedOrigins::List(vec!["https://a.example".into()]));
    }

    #[test]
    fn test_fallback_port() {
        assert_eq!(config(&[("PORT", "8080")]).port, 8080);
    }

    #[test]
    fn test_unparseable_values_use_defaults() {
        let c = config(&[
            ("FACEGATE_PORT", "http"),
            ("FACEGATE_TOLERANCE", "NaN"),
            ("FACEGATE_ENGINE_QUEUE", "0"),
        ]);
        assert_eq!(c.port, 5001);
        assert_eq!(c.tolerance, 1.0);
        assert_eq!(c.engine_queue, 4);
    }

    #[test]
    fn test_tolerance_and_dirs() {
        let c = config(&[
            ("FACEGATE_TOLERANCE", "0.45"),
            ("FACEGATE_FACES_DIR", "/srv/faces"),
            ("FACEGATE_MODEL_DIR", "/srv/models"),
        ]);
        assert!((c.tolerance - 0.45).abs() < 1e-6);
        assert_eq!(c.faces_dir, PathBuf::from("/srv/faces"));
        assert_eq!(c.arcface_model_path(), "/srv/models/w600k_r50.onnx");
    }

    #[test]
    fn test_origin_list_parsing() {
        assert_eq!(
            AllowedOrigins::parse(" https://a.example , https://b.example,"),
            AllowedOrigins::List(vec!["https://a.example".into(), "https://b.example".into()])
        );
        assert_eq!(AllowedOrigins::parse("https://a.example,*"), AllowedOrigins::Any);
        assert_eq!(AllowedOrigins::parse(""), AllowedOrigins::Any);
    }

    #[test]
    fn test_bind_addr() {
        let c = config(&[("FACEGATE_HOST", "127.0.0.1"), ("FACEGATE_PORT", "6000")]);
        assert_eq!(c.bind_addr().unwrap().to_string(), "127.0.0.1:6000");
        assert!(config(&[("FACEGATE_HOST", "not a host")]).bind_addr().is_err());
    }
}
