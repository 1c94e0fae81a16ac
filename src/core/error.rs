//! Error taxonomy shared by every `core::*` component, and its translation
//! to POSIX errno at the facade boundary.

use thiserror::Error;

/// Kinds named one-for-one off the error taxonomy: path/inode/xattr/log
/// lookups, input validation, capacity, locking, and persistence failures.
/// The core never panics on a caller-reachable path; every failure mode
/// below is returned, not asserted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    Exists,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("permission denied")]
    PermissionDenied,
    #[error("name too long")]
    NameTooLong,
    #[error("bad name: {0}")]
    BadName(String),
    #[error("unrecognized xattr namespace")]
    BadNamespace,
    #[error("xattr value too big")]
    ValueTooBig,
    #[error("buffer too small, need {0} bytes")]
    BufferTooSmall(usize),
    #[error("no space")]
    NoSpace,
    #[error("lock wait timed out")]
    LockTimeout,
    #[error("corrupted: {0}")]
    Corrupted(String),
    #[error("incompatible on-disk version")]
    VersionMismatch,
    #[error("directory full")]
    ParentFull,
    #[error("log is full")]
    NoLogSpace,
    #[error("i/o error: {0}")]
    IoError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<anyhow::Error> for CoreError {
    fn from(e: anyhow::Error) -> Self {
        CoreError::IoError(e.to_string())
    }
}

impl CoreError {
    /// Translates a `CoreError` to the errno the kernel adapter expects,
    /// mirroring the teacher's `ret`/`rep!` error-to-reply plumbing in
    /// `rfs_lib/fuse.rs`, generalized from ext2's fixed ENOENT/EEXIST set
    /// to the full taxonomy of spec §7.
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            CoreError::NotFound => libc::ENOENT,
            CoreError::Exists => libc::EEXIST,
            CoreError::NotADirectory => libc::ENOTDIR,
            CoreError::IsADirectory => libc::EISDIR,
            CoreError::NotEmpty => libc::ENOTEMPTY,
            CoreError::PermissionDenied => libc::EACCES,
            CoreError::NameTooLong => libc::ENAMETOOLONG,
            CoreError::BadName(_) => libc::EINVAL,
            CoreError::BadNamespace => libc::ENOTSUP,
            CoreError::ValueTooBig => libc::E2BIG,
            CoreError::BufferTooSmall(_) => libc::ERANGE,
            CoreError::NoSpace => libc::ENOSPC,
            CoreError::LockTimeout => libc::ETIMEDOUT,
            CoreError::Corrupted(_) => libc::EIO,
            CoreError::VersionMismatch => libc::EIO,
            CoreError::ParentFull => libc::ENOSPC,
            CoreError::NoLogSpace => libc::ENOSPC,
            CoreError::IoError(_) => libc::EIO,
        }
    }
}
