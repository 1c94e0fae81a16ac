//! The packed-tree + extent + WAL + persistence core, standing in for
//! `rfs_lib` the way `storage` stands in for `disk_driver`.

pub mod block;
pub mod compress;
pub mod config;
pub mod error;
pub mod extent;
pub mod facade;
pub mod layout;
pub mod lock;
pub mod recovery;
pub mod strings;
pub mod tree;
pub mod utils;
pub mod wal;
pub mod xattr;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use facade::Facade;
