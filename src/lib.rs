pub mod core;
pub mod fuse_adapter;

pub use crate::core::{Config, CoreError, CoreResult, Facade};

use lazy_static::lazy_static;
use parking_lot::RwLock;

// Per spec.md §9 ("pass an explicit context/handle through the API; no
// statics"), `Config` and the mounted `Facade` are constructed explicitly
// and threaded through call sites, not kept here. These globals remain
// `lazy_static` only because they are pure CLI-argument passthrough for
// `main.rs`'s signal handler, mirroring the teacher's own
// `MOUNT_POINT`/`DEVICE_FILE` globals — the teacher's `mut_static` cells
// are replaced with plain `parking_lot::RwLock<Option<T>>`, since a
// non-blocking, already-in-the-dependency-tree lock covers the same
// "set once, read from a signal handler" use without a second crate.
lazy_static! {
    pub static ref MOUNT_POINT: RwLock<Option<String>> = RwLock::new(None);
    pub static ref DEVICE_FILE: RwLock<Option<String>> = RwLock::new(None);
    pub static ref FORCE_FORMAT: RwLock<Option<bool>> = RwLock::new(None);
}
