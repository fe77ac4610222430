//! Exporter configuration.
//!
//! Loaded from an optional TOML file and then overridden by command-line
//! flags or environment variables in the binary:
//!
//! ```toml
//! address = "0.0.0.0"
//! port = 9349
//! metrics_prefix = "idrac"
//! timeout_secs = 10
//! https_proxy = "http://proxy.internal:3128"
//!
//! [tls]
//! enabled = true
//! cert_file = "/etc/bmcgpu/tls.crt"
//! key_file = "/etc/bmcgpu/tls.key"
//!
//! [hosts.default]
//! username = "root"
//! password = "calvin"
//!
//! [hosts."10.0.0.12:443"]
//! username = "admin"
//! password = "secret"
//! scheme = "https"
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Host entry used when a target has no entry of its own.
pub const DEFAULT_HOST: &str = "default";

const DEFAULT_SCHEME: &str = "https";
const DEFAULT_ADDRESS: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 9349;
const DEFAULT_METRICS_PREFIX: &str = "idrac";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Error loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    Io(String),
    /// Config file is not valid TOML or has wrong field types.
    Parse(String),
    /// Settings are individually valid but unusable together.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "config I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "config parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Credentials and address of one managed controller.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostConfig {
    pub username: String,
    pub password: String,
    pub scheme: String,
    /// Filled from the scrape target, never from the file.
    #[serde(skip)]
    pub hostname: String,
}

impl HostConfig {
    /// Host entry with no credentials, addressed by `hostname`.
    pub fn with_hostname(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    /// Scheme to use, defaulting to https.
    pub fn scheme(&self) -> &str {
        if self.scheme.is_empty() {
            DEFAULT_SCHEME
        } else {
            &self.scheme
        }
    }

    /// `scheme://hostname`, the prefix every resource path is appended to.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme(), self.hostname)
    }
}

impl fmt::Debug for HostConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("scheme", &self.scheme)
            .field("hostname", &self.hostname)
            .finish()
    }
}

/// TLS for the exporter's own listener.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Process-wide exporter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address, without the port.
    pub address: String,
    pub port: u16,
    /// Proxy for https traffic towards controllers; empty for none.
    pub https_proxy: String,
    /// Namespace prepended to every metric name.
    pub metrics_prefix: String,
    pub tls: TlsConfig,
    /// Per-request deadline for controller fetches.
    pub timeout_secs: u64,
    /// Host entries keyed by target (`host:port`) or `default`.
    pub hosts: HashMap<String, HostConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            https_proxy: String::new(),
            metrics_prefix: DEFAULT_METRICS_PREFIX.to_string(),
            tls: TlsConfig::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            hosts: HashMap::new(),
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Overlays default credentials onto the `default` host entry.
    ///
    /// Only non-empty values override; the entry is created if any is given.
    pub fn with_default_credentials(
        mut self,
        username: Option<String>,
        password: Option<String>,
        scheme: Option<String>,
    ) -> Self {
        let overrides = [username, password, scheme].map(|v| v.filter(|s| !s.is_empty()));
        if overrides.iter().all(Option::is_none) {
            return self;
        }
        let [username, password, scheme] = overrides;
        let entry = self.hosts.entry(DEFAULT_HOST.to_string()).or_default();
        if let Some(username) = username {
            entry.username = username;
        }
        if let Some(password) = password {
            entry.password = password;
        }
        if let Some(scheme) = scheme {
            entry.scheme = scheme;
        }
        self
    }

    /// Resolves the host entry for `target`, falling back to `default`.
    ///
    /// The returned entry is addressed at `target`.
    pub fn host(&self, target: &str) -> Option<HostConfig> {
        let entry = self
            .hosts
            .get(target)
            .or_else(|| self.hosts.get(DEFAULT_HOST))?;
        Some(HostConfig {
            hostname: target.to_string(),
            ..entry.clone()
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn https_proxy(&self) -> Option<&str> {
        Some(self.https_proxy.as_str()).filter(|p| !p.is_empty())
    }

    /// `address:port`, with IPv6 addresses bracketed.
    pub fn listen_addr(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }

    /// Checks settings that only fail in combination.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tls.enabled {
            if self.tls.cert_file.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("tls enabled without cert_file".into()));
            }
            if self.tls.key_file.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("tls enabled without key_file".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
metrics_prefix = "bmc"
timeout_secs = 5

[hosts.default]
username = "root"
password = "calvin"

[hosts."10.0.0.12:443"]
username = "admin"
password = "secret"
scheme = "http"
"#;

    #[test]
    fn test_parse_config() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.metrics_prefix, "bmc");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.hosts.len(), 2);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.metrics_prefix, "idrac");
        assert_eq!(config.timeout_secs, 10);
        assert!(config.hosts.is_empty());
        assert!(config.host("10.0.0.1:443").is_none());
    }

    #[test]
    fn test_listener_defaults() {
        let config = Config::default();
        assert_eq!(config.listen_addr(), "0.0.0.0:9349");
        assert!(config.https_proxy().is_none());
        assert!(!config.tls.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_listener_proxy_and_tls() {
        let config = Config::from_toml_str(
            r#"
address = "127.0.0.1"
port = 9100
https_proxy = "http://proxy.internal:3128"

[tls]
enabled = true
cert_file = "/etc/bmcgpu/tls.crt"
key_file = "/etc/bmcgpu/tls.key"
"#,
        )
        .unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:9100");
        assert_eq!(config.https_proxy(), Some("http://proxy.internal:3128"));
        assert!(config.tls.enabled);
        assert_eq!(config.tls.cert_file, PathBuf::from("/etc/bmcgpu/tls.crt"));
        assert_eq!(config.tls.key_file, PathBuf::from("/etc/bmcgpu/tls.key"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ipv6_listen_addr() {
        let config = Config {
            address: "::".into(),
            ..Config::default()
        };
        assert_eq!(config.listen_addr(), "[::]:9349");
    }

    #[test]
    fn test_tls_requires_cert_and_key() {
        let config = Config::from_toml_str("[tls]\nenabled = true\ncert_file = \"/c.pem\"").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(m)) if m.contains("key_file")));

        let config = Config::from_toml_str("[tls]\nenabled = true").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(m)) if m.contains("cert_file")));

        let disabled = Config::from_toml_str("[tls]\nenabled = false").unwrap();
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn test_host_lookup_exact_and_default() {
        let config = Config::from_toml_str(SAMPLE).unwrap();

        let exact = config.host("10.0.0.12:443").unwrap();
        assert_eq!(exact.username, "admin");
        assert_eq!(exact.hostname, "10.0.0.12:443");
        assert_eq!(exact.base_url(), "http://10.0.0.12:443");

        let fallback = config.host("10.0.0.99").unwrap();
        assert_eq!(fallback.username, "root");
        assert_eq!(fallback.hostname, "10.0.0.99");
        assert_eq!(fallback.base_url(), "https://10.0.0.99");
    }

    #[test]
    fn test_default_credentials_overlay() {
        let config = Config::default().with_default_credentials(
            Some("root".into()),
            Some(String::new()),
            None,
        );
        let host = config.host("bmc-1").unwrap();
        assert_eq!(host.username, "root");
        assert_eq!(host.password, "");
        assert_eq!(host.scheme(), "https");

        let untouched = Config::default().with_default_credentials(None, Some(String::new()), None);
        assert!(untouched.hosts.is_empty());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.metrics_prefix, "bmc");

        let missing = Config::from_file(Path::new("/nonexistent/bmcgpu.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml_str("timeout_secs = \"soon\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_debug_redacts_password() {
        let host = Config::from_toml_str(SAMPLE).unwrap().host("x").unwrap();
        let debug = format!("{:?}", host);
        assert!(!debug.contains("calvin"));
        assert!(debug.contains("<redacted>"));
    }
}
