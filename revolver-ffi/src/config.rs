//! The flat foreign configuration record and its translation into the
//! native [`Config`].

use std::ffi::c_char;
use std::time::Duration;

use multiaddr::Multiaddr;
use revolver_p2p::{Config, Error, LogLevel, LogWriter};

use crate::ffi::{FfiResult, c_str_or_empty, c_str_to_string};

/// Flat client configuration as seen from C. All string fields are
/// borrowed for the duration of the call and never freed by this
/// library; null string pointers read as empty strings. Field order is
/// ABI-stable and matches `include/revolver.h`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct P2pConfig {
    /// Seconds between analytics reports.
    pub analytics_interval: i64,
    /// Analytics endpoint URL.
    pub analytics_url: *const c_char,
    /// Opaque user data attached to analytics reports.
    pub analytics_user_data: *const c_char,
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
    /// Bind IP. Empty means no listen address.
    pub ip: *const c_char,
    /// Routing table bucket size.
    pub k_bucket_size: usize,
    /// Tolerated peer latency, in seconds.
    pub latency_tolerance: i64,
    /// Log file path. Empty means standard output.
    pub log_file: *const c_char,
    /// Log level name. Unrecognized names mean DEBUG.
    pub log_level: *const c_char,
    /// Seconds between NAT monitor probes.
    pub nat_monitor_interval: i64,
    /// NAT monitor probe timeout, in seconds.
    pub nat_monitor_timeout: i64,
    /// Network name.
    pub network: *const c_char,
    /// Ping buffer capacity.
    pub ping_buffer_size: u32,
    /// Bind port.
    pub port: u16,
    /// Process identifier.
    pub process_id: i32,
    /// Identity seed. Empty means a random identity.
    pub random_seed: *const c_char,
    /// Upper bound on a buffered sample, in bytes.
    pub sample_max_buffer_size: u32,
    /// Peer sample size.
    pub sample_size: usize,
    /// Array of `seed_nodes_size` multiaddress strings.
    pub seed_nodes: *const *const c_char,
    /// Number of entries behind `seed_nodes`.
    pub seed_nodes_size: usize,
    /// Stream store capacity, in streams.
    pub streamstore_capacity: usize,
    /// Per-stream outbound queue capacity, in messages.
    pub streamstore_queue_size: usize,
    /// General operation timeout, in seconds.
    pub timeout: i64,
    /// Client version string.
    pub version: *const c_char,
    /// Witness cache capacity, in entries.
    pub witness_cache_size: usize,
}

/// A non-negative second count as a `Duration`.
fn seconds(field: &'static str, value: i64) -> FfiResult<Duration> {
    u64::try_from(value)
        .map(Duration::from_secs)
        .map_err(|_| Error::NegativeDuration(field).into())
}

/// Translate the flat record into the native configuration. The first
/// failure wins; no partial configuration escapes.
pub(crate) unsafe fn translate(cfg: &P2pConfig) -> FfiResult<Config> {
    let log_file = unsafe { c_str_or_empty(cfg.log_file)? };
    let log_writer = if log_file.is_empty() {
        LogWriter::Stdout
    } else {
        LogWriter::append(&log_file)?
    };

    let log_level = LogLevel::from_name(&unsafe { c_str_or_empty(cfg.log_level)? });

    let mut seed_nodes = Vec::with_capacity(cfg.seed_nodes_size);
    if cfg.seed_nodes_size > 0 {
        if cfg.seed_nodes.is_null() {
            return Err("null seed node array".into());
        }
        let ptrs = unsafe { std::slice::from_raw_parts(cfg.seed_nodes, cfg.seed_nodes_size) };
        for ptr in ptrs {
            let text = unsafe { c_str_to_string(*ptr)? };
            let addr: Multiaddr = text
                .parse()
                .map_err(|e| format!("seed address {text:?}: {e}"))?;
            seed_nodes.push(addr);
        }
    }

    Ok(Config {
        analytics_interval: seconds("analytics_interval", cfg.analytics_interval)?,
        analytics_url: unsafe { c_str_or_empty(cfg.analytics_url)? },
        analytics_user_data: unsafe { c_str_or_empty(cfg.analytics_user_data)? },
        artifact_cache_size: cfg.artifact_cache_size,
        artifact_chunk_size: cfg.artifact_chunk_size,
        artifact_max_buffer_size: cfg.artifact_max_buffer_size,
        artifact_queue_size: cfg.artifact_queue_size,
        cluster_id: cfg.cluster_id,
        disable_analytics: cfg.disable_analytics,
        disable_broadcast: cfg.disable_broadcast,
        disable_nat_port_map: cfg.disable_nat_port_map,
        disable_peer_discovery: cfg.disable_peer_discovery,
        disable_stream_discovery: cfg.disable_stream_discovery,
        ip: unsafe { c_str_or_empty(cfg.ip)? },
        k_bucket_size: cfg.k_bucket_size,
        latency_tolerance: seconds("latency_tolerance", cfg.latency_tolerance)?,
        log_writer,
        log_level,
        nat_monitor_interval: seconds("nat_monitor_interval", cfg.nat_monitor_interval)?,
        nat_monitor_timeout: seconds("nat_monitor_timeout", cfg.nat_monitor_timeout)?,
        network: unsafe { c_str_or_empty(cfg.network)? },
        ping_buffer_size: cfg.ping_buffer_size,
        port: cfg.port,
        process_id: cfg.process_id,
        random_seed: unsafe { c_str_or_empty(cfg.random_seed)? },
        sample_max_buffer_size: cfg.sample_max_buffer_size,
        sample_size: cfg.sample_size,
        seed_nodes,
        streamstore_capacity: cfg.streamstore_capacity,
        streamstore_queue_size: cfg.streamstore_queue_size,
        timeout: seconds("timeout", cfg.timeout)?,
        version: unsafe { c_str_or_empty(cfg.version)? },
        witness_cache_size: cfg.witness_cache_size,
    })
}
