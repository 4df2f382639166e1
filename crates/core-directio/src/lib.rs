//! Block-aligned, cache-bypassing file I/O for sealed payloads.

use std::io;
use std::path::{Path, PathBuf};

pub mod align;
pub mod channel;

pub use align::{align, recover_length, AlignedBuffer, BlockSize};
pub use channel::{unseal_aligned, Channel, IoMode, ReadReport, Unsealed, WriteReport};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid block size {0}: must be a non-zero power of two")]
    InvalidBlockSize(usize),
    #[error("crypto error: {0}")]
    Crypto(#[from] core_crypto::Error),
    #[error("decryption failed after {attempts} attempt(s)")]
    Decrypt { attempts: usize },
    #[error("{op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        Error::Io { op, path: path.to_path_buf(), source }
    }

    /// Get type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Error::InvalidBlockSize(_) => "invalid_block_size",
            Error::Crypto(_) => "crypto",
            Error::Decrypt { .. } => "decrypt",
            Error::Io { .. } => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
