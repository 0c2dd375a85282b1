//! Client configuration: log destination and level, seed addresses, and
//! the tuning knobs consumed once at construction.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use multiaddr::Multiaddr;
use tracing_subscriber::filter::LevelFilter;

use crate::error::{Error, Result};

/// Log severity, in decreasing order of urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LogLevel {
    /// Unrecoverable faults.
    Critical,
    /// Errors the client survives.
    Error,
    /// Suspicious but non-fatal conditions.
    Warning,
    /// Normal but significant events.
    Notice,
    /// Routine operational messages.
    Info,
    /// Everything, including per-message tracing.
    #[default]
    Debug,
}

impl LogLevel {
    /// Resolve a level name. Recognized names are `CRITICAL`, `ERROR`,
    /// `WARNING`, `NOTICE`, and `INFO`; anything else (unrecognized or
    /// empty) resolves to the most verbose level, [`LogLevel::Debug`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "CRITICAL" => Self::Critical,
            "ERROR" => Self::Error,
            "WARNING" => Self::Warning,
            "NOTICE" => Self::Notice,
            "INFO" => Self::Info,
            _ => Self::Debug,
        }
    }

    /// The `tracing` filter this level maps onto. `tracing` has no
    /// CRITICAL or NOTICE, so those collapse into ERROR and INFO.
    #[must_use]
    pub fn as_filter(self) -> LevelFilter {
        match self {
            Self::Critical | Self::Error => LevelFilter::ERROR,
            Self::Warning => LevelFilter::WARN,
            Self::Notice | Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
        }
    }
}

/// Where log output goes. Carries the open handle, not just a path, so a
/// bad destination fails at configuration time rather than mid-run.
#[derive(Debug, Clone, Default)]
pub enum LogWriter {
    /// Process standard output.
    #[default]
    Stdout,
    /// An append-mode file opened by [`LogWriter::append`].
    File(Arc<File>),
}

impl LogWriter {
    /// Open `path` for append, creating it with mode 0o644 if absent.
    ///
    /// # Errors
    /// Returns [`Error::LogFile`] when the file cannot be opened.
    pub fn append<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = OpenOptions::new();
        opts.append(true).create(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o644);
        }
        let file = opts.open(path).map_err(Error::LogFile)?;
        Ok(Self::File(Arc::new(file)))
    }

    /// The open file handle, when output goes to a file.
    #[must_use]
    pub fn file(&self) -> Option<Arc<File>> {
        match self {
            Self::Stdout => None,
            Self::File(f) => Some(Arc::clone(f)),
        }
    }
}

/// Client configuration. Consumed once by [`Client::new`]; not retained.
///
/// [`Client::new`]: crate::Client::new
#[derive(Debug, Clone)]
pub struct Config {
    /// Interval between analytics reports.
    pub analytics_interval: Duration,
    /// Analytics endpoint URL.
    pub analytics_url: String,
    /// Opaque user data attached to analytics reports.
    pub analytics_user_data: String,
    /// Artifact cache capacity, in entries.
    pub artifact_cache_size: usize,
    /// Artifact chunk size, in bytes.
    pub artifact_chunk_size: u32,
    /// Upper bound on a buffered artifact, in bytes.
    pub artifact_max_buffer_size: u32,
    /// Artifact queue capacity, in entries.
    pub artifact_queue_size: usize,
    /// Cluster identifier.
    pub cluster_id: i32,
    /// Suppress analytics reporting.
    pub disable_analytics: bool,
    /// Suppress broadcast fan-out of sent payloads.
    pub disable_broadcast: bool,
    /// Suppress NAT port mapping.
    pub disable_nat_port_map: bool,
    /// Suppress peer discovery.
    pub disable_peer_discovery: bool,
    /// Suppress stream discovery.
    pub disable_stream_discovery: bool,
    /// Bind IP. Empty means the client has no listen address and cannot
    /// be dialed.
    pub ip: String,
    /// Routing table bucket size.
    pub k_bucket_size: usize,
    /// Tolerated peer latency.
    pub latency_tolerance: Duration,
    /// Log destination.
    pub log_writer: LogWriter,
    /// Log severity threshold.
    pub log_level: LogLevel,
    /// Interval between NAT monitor probes.
    pub nat_monitor_interval: Duration,
    /// NAT monitor probe timeout.
    pub nat_monitor_timeout: Duration,
    /// Network name; clients only see peers in the same network.
    pub network: String,
    /// Ping buffer capacity.
    pub ping_buffer_size: u32,
    /// Bind port.
    pub port: u16,
    /// Process identifier attached to log and analytics output.
    pub process_id: i32,
    /// Seed for the client identity. Empty means a random identity.
    pub random_seed: String,
    /// Upper bound on a buffered sample, in bytes.
    pub sample_max_buffer_size: u32,
    /// Peer sample size.
    pub sample_size: usize,
    /// Addresses dialed at startup.
    pub seed_nodes: Vec<Multiaddr>,
    /// Stream store capacity, in streams.
    pub streamstore_capacity: usize,
    /// Per-stream outbound queue capacity, in messages.
    pub streamstore_queue_size: usize,
    /// General operation timeout.
    pub timeout: Duration,
    /// Client version string.
    pub version: String,
    /// Witness cache capacity, in entries.
    pub witness_cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analytics_interval: Duration::from_secs(3600),
            analytics_url: String::new(),
            analytics_user_data: String::new(),
            artifact_cache_size: 65536,
            artifact_chunk_size: 65536,
            artifact_max_buffer_size: 8 * 1024 * 1024,
            artifact_queue_size: 8,
            cluster_id: 0,
            disable_analytics: true,
            disable_broadcast: false,
            disable_nat_port_map: true,
            disable_peer_discovery: false,
            disable_stream_discovery: false,
            ip: "127.0.0.1".to_owned(),
            k_bucket_size: 16,
            latency_tolerance: Duration::from_secs(60),
            log_writer: LogWriter::Stdout,
            log_level: LogLevel::Info,
            nat_monitor_interval: Duration::from_secs(60),
            nat_monitor_timeout: Duration::from_secs(10),
            network: "revolver".to_owned(),
            ping_buffer_size: 32,
            port: 0,
            process_id: 0,
            random_seed: String::new(),
            sample_max_buffer_size: 8192,
            sample_size: 4,
            seed_nodes: Vec::new(),
            streamstore_capacity: 8,
            streamstore_queue_size: 8,
            timeout: Duration::from_secs(10),
            version: "0.1.0".to_owned(),
            witness_cache_size: 65536,
        }
    }
}

impl Config {
    /// The listen multiaddress implied by `ip` and `port`, or `None` when
    /// no bind IP is configured.
    ///
    /// # Errors
    /// Returns [`Error::BindAddress`] when a non-empty `ip` does not form
    /// a valid listen multiaddress.
    pub fn listen_addr(&self) -> Result<Option<Multiaddr>> {
        if self.ip.is_empty() {
            return Ok(None);
        }
        format!("/ip4/{}/tcp/{}", self.ip, self.port)
            .parse()
            .map(Some)
            .map_err(|_| Error::BindAddress(self.ip.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_resolve_exactly() {
        assert_eq!(LogLevel::from_name("CRITICAL"), LogLevel::Critical);
        assert_eq!(LogLevel::from_name("ERROR"), LogLevel::Error);
        assert_eq!(LogLevel::from_name("WARNING"), LogLevel::Warning);
        assert_eq!(LogLevel::from_name("NOTICE"), LogLevel::Notice);
        assert_eq!(LogLevel::from_name("INFO"), LogLevel::Info);
    }

    #[test]
    fn unknown_level_names_default_to_most_verbose() {
        assert_eq!(LogLevel::from_name("bogus"), LogLevel::Debug);
        assert_eq!(LogLevel::from_name(""), LogLevel::Debug);
        assert_eq!(LogLevel::from_name("info"), LogLevel::Debug); // case-sensitive
    }

    #[test]
    fn empty_ip_means_no_listen_addr() {
        let cfg = Config {
            ip: String::new(),
            ..Config::default()
        };
        assert!(cfg.listen_addr().expect("listen addr").is_none());

        let cfg = Config {
            ip: "127.0.0.1".to_owned(),
            port: 4000,
            ..Config::default()
        };
        let addr = cfg.listen_addr().expect("listen addr").expect("addr");
        assert_eq!(addr.to_string(), "/ip4/127.0.0.1/tcp/4000");
    }

    #[test]
    fn invalid_ip_is_a_config_error() {
        let cfg = Config {
            ip: "not-an-ip".to_owned(),
            ..Config::default()
        };
        assert!(matches!(cfg.listen_addr(), Err(Error::BindAddress(_))));
    }

    #[test]
    fn append_writer_creates_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("client.log");
        let writer = LogWriter::append(&path).expect("open");
        assert!(writer.file().is_some());
        assert!(path.exists());
    }

    #[test]
    fn append_writer_reports_bad_path() {
        let err = LogWriter::append("/nonexistent-dir/client.log");
        assert!(matches!(err, Err(Error::LogFile(_))));
    }
}
