//! Command-line surface of the `passivescanner` binary.

use std::path::{Path, PathBuf};

use clap::Parser;
use passive_core::settings::{parse_string_list, parse_string_map, DEFAULT_IP, DEFAULT_PORT};
use passive_core::RunSettings;
use passive_proxy::generate_root;

use crate::error::RunError;

/// Directory used by `--generate-ca` when no output directory is given.
pub const DEFAULT_CA_DIR: &str = "./CA";

/// Passive scanner - records unique requests flowing through a local proxy
#[derive(Parser, Debug, Clone)]
#[command(name = "passivescanner", about, disable_version_flag = true)]
pub struct Args {
    /// Uniquely marks a task, e.g. --id 62bd64a1-ef71-4db6-a1e2-ca06fa96f97a
    #[arg(short = 'i', long, default_value = "")]
    pub id: String,

    /// Address that receives the results, e.g. http://127.0.0.1:8888
    #[arg(short = 'R', long, default_value = "")]
    pub remote_output_addr: String,

    /// Proxy listen address
    #[arg(short = 'I', long, default_value = DEFAULT_IP)]
    pub ip: String,

    /// Proxy listen port
    #[arg(short = 'P', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Allowed hosts as a JSON array, e.g. --hosts '["a.com","b.com:8443"]'
    #[arg(short = 'T', long, default_value = "")]
    pub hosts: String,

    /// Maximum run time in minutes (non-positive means 180)
    #[arg(short = 't', long, default_value_t = 0, allow_negative_numbers = true)]
    pub maxruntime: i64,

    /// Path of the CA certificate
    #[arg(short = 'c', long)]
    pub cert: Option<PathBuf>,

    /// Path of the CA private key
    #[arg(short = 'p', long)]
    pub prikey: Option<PathBuf>,

    /// Intercept HTTPS traffic as well
    #[arg(short = 's', long)]
    pub contain_https: bool,

    /// Custom headers as a JSON object, e.g. --headers '{"X-Token":"abc"}'
    #[arg(short = 'H', long, default_value = "")]
    pub headers: String,

    /// URLs containing any of these keywords are ignored (JSON array)
    #[arg(short = 'G', long, default_value = "")]
    pub ignore_words: String,

    /// Generate a new CA and exit
    #[arg(short = 'n', long)]
    pub generate_ca: bool,

    /// Output directory for --generate-ca
    #[arg(short = 'o', long)]
    pub ca_outputdir: Option<PathBuf>,

    /// Display the version and build time
    #[arg(short = 'v', long)]
    pub version: bool,

    /// Address notified when the run times out, e.g. http://127.0.0.1:4000
    #[arg(short = 'M', long, default_value = "")]
    pub message_addr: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    /// Effective diagnostic log level.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }

    /// Builds the run settings, with defaults rooted at `base_dir`.
    pub fn run_settings(&self, base_dir: &Path) -> Result<RunSettings, RunError> {
        let hosts = parse_string_list("hosts", &self.hosts)?;
        let ignore_words = parse_string_list("ignore-words", &self.ignore_words)?;
        let headers = parse_string_map("headers", &self.headers)?;

        Ok(RunSettings::new(self.id.trim(), base_dir)
            .with_listen(self.ip.as_str(), self.port)
            .with_remote_output(self.remote_output_addr.as_str())
            .with_message_addr(self.message_addr.as_str())
            .with_hosts(hosts)
            .with_ignore_words(ignore_words)
            .with_contain_https(self.contain_https)
            .with_max_run_time(self.maxruntime)
            .with_ca_paths(self.cert.clone(), self.prikey.clone())
            .with_headers(headers))
    }
}

/// Version and build time baked into the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub build_time: &'static str,
}

impl BuildInfo {
    /// Build info of the running binary.
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            build_time: option_env!("PASSIVE_BUILD_TIME").unwrap_or("unknown"),
        }
    }

    /// Text printed by `--version`.
    pub fn banner(&self) -> String {
        format!("version: {}\r\nbuildtime: {}\r\n", self.version, self.build_time)
    }
}

/// Resolves where `--generate-ca` writes its files.
///
/// A requested directory must already exist. Without one, `fallback` is
/// used and created if missing.
pub fn resolve_ca_dir(requested: Option<&Path>, fallback: &Path) -> Result<PathBuf, RunError> {
    match requested {
        Some(dir) => {
            if !dir.exists() {
                return Err(RunError::Config("not found the directory".into()));
            }
            if !dir.is_dir() {
                return Err(RunError::Config("it's not a directory".into()));
            }
            Ok(dir.to_path_buf())
        }
        None => {
            std::fs::create_dir_all(fallback)?;
            Ok(fallback.to_path_buf())
        }
    }
}

/// Generates a fresh root CA and writes `ca.pem` and `caprikey.pem`.
///
/// Returns the certificate and key paths.
pub fn generate_ca(requested: Option<&Path>) -> Result<(PathBuf, PathBuf), RunError> {
    let dir = resolve_ca_dir(requested, Path::new(DEFAULT_CA_DIR))?;
    let pair = generate_root()?;
    let paths = pair.write_to(&dir)?;
    tracing::info!("CA written to {:?}", dir);
    Ok(paths)
}
