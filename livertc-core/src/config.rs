use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub ice: IceConfig,
    pub sfu: SfuConfig,
    pub recording: RecordingConfig,
    pub upload: UploadConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    /// Allowed CORS origin, "*" for any
    pub allowed_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
            allowed_origin: "*".to_string(),
        }
    }
}

/// ICE servers handed to every peer connection.
///
/// When both lists are empty the SFU falls back to one public STUN server
/// so that plain LAN demos still gather server-reflexive candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    pub stun: Vec<String>,
    pub turn: Vec<String>,
    pub turn_username: String,
    pub turn_password: String,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun: vec!["stun:stun.l.google.com:19302".to_string()],
            turn: Vec::new(),
            turn_username: String::new(),
            turn_password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SfuConfig {
    /// Maximum subscribers per room (0 = unlimited)
    pub max_subs_per_room: usize,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            max_subs_per_room: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("records"),
        }
    }
}

/// Recording upload target (S3-style HTTP object storage).
///
/// The uploader stays disabled unless `enabled` is set and both
/// `endpoint` and `bucket` are non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub bucket: String,
    pub prefix: String,
    pub access_key: String,
    pub secret_key: String,
    pub delete_after_upload: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Global bearer token; empty means no token auth
    pub token: String,
    /// Token for the admin endpoints; empty means admin endpoints refuse everyone
    pub admin_token: String,
    /// HMAC secret for JWT auth; empty disables JWT
    pub jwt_secret: String,
    /// Per-room tokens in `room1:token1;room2:token2` form, overriding the global token
    pub room_tokens: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per second per client IP (0 disables rate limiting)
    pub rps: f64,
    pub burst: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // Override with environment variables (LIVERTC_SERVER__HTTP_PORT, etc.)
        builder = builder.add_source(
            Environment::with_prefix("LIVERTC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ice.stun")
                .with_list_parse_key("ice.turn"),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Get HTTP address
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }
}

/// Parse the `room1:token1;room2:token2` room-token form.
///
/// Malformed items and blank keys or values are skipped.
pub fn parse_room_tokens(s: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for item in s.split(';') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let Some((room, token)) = item.split_once(':') else {
            continue;
        };
        let room = room.trim();
        let token = token.trim();
        if !room.is_empty() && !token.is_empty() {
            out.insert(room.to_string(), token.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.server.allowed_origin, "*");
        assert_eq!(config.ice.stun, vec!["stun:stun.l.google.com:19302"]);
        assert!(config.ice.turn.is_empty());
        assert_eq!(config.sfu.max_subs_per_room, 0);
        assert!(!config.recording.enabled);
        assert_eq!(config.recording.dir, PathBuf::from("records"));
        assert!(!config.upload.enabled);
        assert_eq!(config.rate_limit.rps, 0.0);
    }

    #[test]
    fn test_http_address() {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                http_port: 9090,
                allowed_origin: "*".to_string(),
            },
            ..Config::default()
        };

        assert_eq!(config.http_address(), "127.0.0.1:9090");
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("LIVERTC_SFU__MAX_SUBS_PER_ROOM", "8");
        std::env::set_var("LIVERTC_RECORDING__ENABLED", "true");

        let config = Config::from_env().expect("config should load from env");
        assert_eq!(config.sfu.max_subs_per_room, 8);
        assert!(config.recording.enabled);

        std::env::remove_var("LIVERTC_SFU__MAX_SUBS_PER_ROOM");
        std::env::remove_var("LIVERTC_RECORDING__ENABLED");
    }

    #[test]
    fn test_parse_room_tokens() {
        let tokens = parse_room_tokens("demo:secret;studio:hunter2");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens["demo"], "secret");
        assert_eq!(tokens["studio"], "hunter2");
    }

    #[test]
    fn test_parse_room_tokens_skips_malformed() {
        let tokens = parse_room_tokens("  demo : secret ;;broken; :empty;blank: ");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens["demo"], "secret");
    }

    #[test]
    fn test_parse_room_tokens_empty() {
        assert!(parse_room_tokens("").is_empty());
    }
}
