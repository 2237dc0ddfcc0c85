//! Run settings.
//!
//! [`RunSettings`] is assembled once from the command line and never changes
//! after the run starts. It carries the listener address, the filtering
//! lists, the CA material paths and the optional remote endpoints.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Default bind address.
pub const DEFAULT_IP: &str = "0.0.0.0";

/// Default proxy port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default maximum run time in minutes.
pub const DEFAULT_MAX_RUN_TIME_MINUTES: u64 = 180;

/// CA certificate file name.
pub const CA_CERT_FILENAME: &str = "ca.pem";

/// CA private key file name.
pub const CA_KEY_FILENAME: &str = "caprikey.pem";

/// Settings for a single capture run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Identifier of the run, stamped on every record.
    pub id: String,
    /// Address the proxy listens on.
    pub ip: String,
    /// Port the proxy listens on.
    pub port: u16,
    /// Remote collector receiving each admitted record.
    pub remote_output_addr: Option<String>,
    /// Endpoint receiving the completion notice on timeout.
    pub message_addr: Option<String>,
    /// Host allow-list. Empty means every host.
    pub hosts: Vec<String>,
    /// URLs containing any of these substrings are dropped.
    pub ignore_words: Vec<String>,
    /// Whether CONNECT tunnels are decrypted.
    pub contain_https: bool,
    /// Maximum run time in minutes.
    pub max_run_time: u64,
    /// CA certificate PEM path.
    pub ca_cert: PathBuf,
    /// CA private key PEM path.
    pub ca_key: PathBuf,
    /// Custom headers. Carried through configuration only.
    pub headers: HashMap<String, String>,
    /// Directory receiving the per-run log artifact.
    pub log_dir: PathBuf,
}

impl RunSettings {
    /// Creates settings with defaults rooted at `base_dir`.
    ///
    /// `base_dir` is normally the directory of the running executable; CA
    /// files default to `<base_dir>/CA` and the run log goes to
    /// `<base_dir>/log/passivescanner`.
    pub fn new(id: impl Into<String>, base_dir: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.as_ref();
        Self {
            id: id.into(),
            ip: DEFAULT_IP.to_string(),
            port: DEFAULT_PORT,
            remote_output_addr: None,
            message_addr: None,
            hosts: Vec::new(),
            ignore_words: Vec::new(),
            contain_https: false,
            max_run_time: DEFAULT_MAX_RUN_TIME_MINUTES,
            ca_cert: base_dir.join("CA").join(CA_CERT_FILENAME),
            ca_key: base_dir.join("CA").join(CA_KEY_FILENAME),
            headers: HashMap::new(),
            log_dir: base_dir.join("log").join("passivescanner"),
        }
    }

    /// Sets the listen address. An empty IP keeps the default, and port
    /// `0` or `65535` falls back to [`DEFAULT_PORT`].
    pub fn with_listen(mut self, ip: impl Into<String>, port: u16) -> Self {
        let ip = ip.into();
        self.ip = if ip.trim().is_empty() {
            DEFAULT_IP.to_string()
        } else {
            ip.trim().to_string()
        };
        self.port = if port == 0 || port == u16::MAX {
            DEFAULT_PORT
        } else {
            port
        };
        self
    }

    /// Sets the remote collector address. Empty strings disable it.
    pub fn with_remote_output(mut self, addr: impl Into<String>) -> Self {
        self.remote_output_addr = non_empty(addr.into());
        self
    }

    /// Sets the completion-notice address. Empty strings disable it.
    pub fn with_message_addr(mut self, addr: impl Into<String>) -> Self {
        self.message_addr = non_empty(addr.into());
        self
    }

    /// Sets the host allow-list.
    pub fn with_hosts(mut self, hosts: Vec<String>) -> Self {
        self.hosts = hosts;
        self
    }

    /// Sets the keyword ignore-list.
    pub fn with_ignore_words(mut self, words: Vec<String>) -> Self {
        self.ignore_words = words;
        self
    }

    /// Enables or disables HTTPS interception.
    pub fn with_contain_https(mut self, enabled: bool) -> Self {
        self.contain_https = enabled;
        self
    }

    /// Sets the maximum run time in minutes. Non-positive values fall back
    /// to [`DEFAULT_MAX_RUN_TIME_MINUTES`].
    pub fn with_max_run_time(mut self, minutes: i64) -> Self {
        self.max_run_time = if minutes <= 0 {
            DEFAULT_MAX_RUN_TIME_MINUTES
        } else {
            minutes as u64
        };
        self
    }

    /// Overrides the CA certificate and key paths.
    pub fn with_ca_paths(mut self, cert: Option<PathBuf>, key: Option<PathBuf>) -> Self {
        if let Some(cert) = cert {
            self.ca_cert = cert;
        }
        if let Some(key) = key {
            self.ca_key = key;
        }
        self
    }

    /// Sets the custom headers.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Overrides the run-log directory.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Resolves the listener socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let raw = if self.ip.contains(':') && !self.ip.starts_with('[') {
            format!("[{}]:{}", self.ip, self.port)
        } else {
            format!("{}:{}", self.ip, self.port)
        };
        raw.parse()
            .map_err(|_| CoreError::Config(format!("invalid listen address: {}", raw)))
    }

    /// Maximum run time as a duration.
    pub fn max_run_duration(&self) -> Duration {
        Duration::from_secs(self.max_run_time.saturating_mul(60))
    }

    /// Checks a request host against the allow-list.
    ///
    /// Comparison ignores ASCII case and surrounding whitespace. An empty
    /// allow-list admits every host.
    pub fn host_allowed(&self, host: &str) -> bool {
        if self.hosts.is_empty() {
            return true;
        }
        let host = host.trim();
        self.hosts
            .iter()
            .any(|allowed| allowed.trim().eq_ignore_ascii_case(host))
    }

    /// Returns true when the URL contains any ignore keyword.
    pub fn is_ignored(&self, url: &str) -> bool {
        self.ignore_words
            .iter()
            .any(|word| url.contains(word.as_str()))
    }
}

/// Decodes a JSON array flag such as `--hosts '["a.com","b.com"]'`.
pub fn parse_string_list(flag: &str, raw: &str) -> Result<Vec<String>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
        .map_err(|e| CoreError::Config(format!("--{} expects a JSON array of strings: {}", flag, e)))
}

/// Decodes a JSON object flag such as `--headers '{"X-Token":"abc"}'`.
pub fn parse_string_map(flag: &str, raw: &str) -> Result<HashMap<String, String>> {
    if raw.trim().is_empty() {
        return Ok(HashMap::new());
    }
    serde_json::from_str(raw)
        .map_err(|e| CoreError::Config(format!("--{} expects a JSON object of strings: {}", flag, e)))
}

/// Returns the directory containing the running executable.
pub fn executable_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| CoreError::Config("executable has no parent directory".into()))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RunSettings {
        RunSettings::new("run-1", "/opt/scanner")
    }

    #[test]
    fn defaults_are_rooted_at_base_dir() {
        let s = settings();
        assert_eq!(s.ip, "0.0.0.0");
        assert_eq!(s.port, 8080);
        assert_eq!(s.max_run_time, 180);
        assert_eq!(s.ca_cert, PathBuf::from("/opt/scanner/CA/ca.pem"));
        assert_eq!(s.ca_key, PathBuf::from("/opt/scanner/CA/caprikey.pem"));
        assert_eq!(s.log_dir, PathBuf::from("/opt/scanner/log/passivescanner"));
        assert!(!s.contain_https);
    }

    #[test]
    fn listen_falls_back_on_bad_values() {
        let s = settings().with_listen("  ", 0);
        assert_eq!(s.ip, "0.0.0.0");
        assert_eq!(s.port, 8080);

        let s = settings().with_listen("127.0.0.1", 65535);
        assert_eq!(s.port, 8080);

        let s = settings().with_listen("127.0.0.1", 9000);
        assert_eq!(s.bind_addr().unwrap(), "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn ipv6_bind_addr() {
        let s = settings().with_listen("::1", 9000);
        assert_eq!(s.bind_addr().unwrap(), "[::1]:9000".parse().unwrap());
    }

    #[test]
    fn invalid_ip_is_config_error() {
        let s = settings().with_listen("not-an-ip", 9000);
        assert!(matches!(s.bind_addr(), Err(CoreError::Config(_))));
    }

    #[test]
    fn max_run_time_defaults_when_non_positive() {
        assert_eq!(settings().with_max_run_time(0).max_run_time, 180);
        assert_eq!(settings().with_max_run_time(-5).max_run_time, 180);
        assert_eq!(settings().with_max_run_time(10).max_run_time, 10);
        assert_eq!(
            settings().with_max_run_time(10).max_run_duration(),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn huge_max_run_time_saturates() {
        let s = settings().with_max_run_time(i64::MAX);
        assert_eq!(s.max_run_time, i64::MAX as u64);
        assert_eq!(s.max_run_duration(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn empty_addresses_are_disabled() {
        let s = settings().with_remote_output("").with_message_addr("  ");
        assert!(s.remote_output_addr.is_none());
        assert!(s.message_addr.is_none());

        let s = settings().with_remote_output("http://127.0.0.1:8888/result");
        assert_eq!(
            s.remote_output_addr.as_deref(),
            Some("http://127.0.0.1:8888/result")
        );
    }

    #[test]
    fn host_allow_list_ignores_case_and_whitespace() {
        let s = settings().with_hosts(vec![" Example.COM ".to_string()]);
        assert!(s.host_allowed("example.com"));
        assert!(s.host_allowed("EXAMPLE.com "));
        assert!(!s.host_allowed("other.com"));
        assert!(settings().host_allowed("anything.org"));
    }

    #[test]
    fn ignore_words_match_substrings() {
        let s = settings().with_ignore_words(vec!["logout".to_string(), ".png".to_string()]);
        assert!(s.is_ignored("https://a.com/user/logout?x=1"));
        assert!(s.is_ignored("https://a.com/img/logo.png"));
        assert!(!s.is_ignored("https://a.com/api"));
    }

    #[test]
    fn ca_paths_override() {
        let s = settings().with_ca_paths(Some(PathBuf::from("/tmp/c.pem")), None);
        assert_eq!(s.ca_cert, PathBuf::from("/tmp/c.pem"));
        assert_eq!(s.ca_key, PathBuf::from("/opt/scanner/CA/caprikey.pem"));
    }

    #[test]
    fn parse_json_flags() {
        let hosts = parse_string_list("hosts", r#"["admin", "admin123"]"#).unwrap();
        assert_eq!(hosts, vec!["admin", "admin123"]);
        assert!(parse_string_list("hosts", "").unwrap().is_empty());

        let headers = parse_string_map("headers", r#"{"myheader":"abc"}"#).unwrap();
        assert_eq!(headers.get("myheader").map(String::as_str), Some("abc"));
    }

    #[test]
    fn malformed_json_flag_is_config_error() {
        let err = parse_string_list("ignore-words", "[admin").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
        assert!(err.to_string().contains("--ignore-words"));

        assert!(parse_string_map("headers", r#"["not", "a", "map"]"#).is_err());
    }
}
