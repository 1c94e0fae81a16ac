//! Tuning knobs, read once from the environment with safe defaults and
//! passed explicitly into the filesystem handle constructor.
//!
//! Per the redesign note in spec.md §9 ("pass an explicit context/handle
//! through the API; no statics"), `Config` is plain data, not a
//! `lazy_static`. Only the CLI-argument globals in `main.rs` (mount point,
//! device path) stay `lazy_static`, the way the teacher already does for
//! those.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Size in bytes of one allocator block (§3 "block size B").
    pub block_size: u32,
    /// Directory branching factor; fixed by the 64 B node layout at 16.
    pub branching_factor: usize,
    /// Inline extent count K before an inode's extent list spills.
    pub inline_extents: usize,
    /// Extent-tree block capacity M once spilled.
    pub spill_extents: usize,
    /// File size at or below which payload stays inline in the node.
    pub inline_threshold: u64,
    /// Compression threshold in bytes; shorter payloads are never compressed.
    pub compression_threshold: usize,
    /// WAL ring size in bytes, bounded to [64 KiB, 1 GiB].
    pub wal_size: u64,
    /// Node-array modification count between rebalances.
    pub rebalance_threshold: u64,
    /// Entry-count threshold that triggers an auto-checkpoint.
    pub checkpoint_entries: u64,
    /// Wall-clock interval that triggers an auto-checkpoint.
    pub checkpoint_interval: Duration,
    /// Soft timeout for topology/node lock acquisition.
    pub lock_timeout: Duration,
    /// Whether the WAL background auto-checkpoint thread is started.
    pub auto_checkpoint: bool,
}

const MIN_WAL_SIZE: u64 = 64 * 1024;
const MAX_WAL_SIZE: u64 = 1024 * 1024 * 1024;

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: 4096,
            branching_factor: 16,
            inline_extents: 4,
            spill_extents: 256,
            inline_threshold: 4096,
            compression_threshold: 512,
            wal_size: 1024 * 1024,
            rebalance_threshold: 1000,
            checkpoint_entries: 512,
            checkpoint_interval: Duration::from_secs(30),
            lock_timeout: Duration::from_secs(5),
            auto_checkpoint: true,
        }
    }
}

impl Config {
    /// Builds a `Config` from environment variables, falling back to
    /// `Default::default()` for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_u32("PFS_BLOCK_SIZE") {
            cfg.block_size = v;
        }
        if let Some(v) = env_u64("PFS_WAL_SIZE") {
            cfg.wal_size = v.clamp(MIN_WAL_SIZE, MAX_WAL_SIZE);
        }
        if let Some(v) = env_u64("PFS_COMPRESSION_THRESHOLD") {
            cfg.compression_threshold = v as usize;
        }
        if let Some(v) = env_u64("PFS_REBALANCE_THRESHOLD") {
            cfg.rebalance_threshold = v;
        }
        if let Some(v) = env_u64("PFS_CHECKPOINT_INTERVAL_SECS") {
            cfg.checkpoint_interval = Duration::from_secs(v);
        }
        if let Ok(v) = env::var("PFS_AUTO_CHECKPOINT") {
            cfg.auto_checkpoint = v != "0" && v.to_lowercase() != "false";
        }
        cfg
    }

    /// Shrinks thresholds the way test builds want (spec.md §4.5: "16 B in
    /// test builds"), without touching anything a unit test doesn't set up
    /// for itself.
    pub fn for_tests() -> Self {
        Self {
            compression_threshold: 16,
            wal_size: MIN_WAL_SIZE,
            rebalance_threshold: 8,
            lock_timeout: Duration::from_millis(200),
            ..Self::default()
        }
    }
}

fn env_u32(key: &str) -> Option<u32> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
