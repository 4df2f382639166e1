//! Single-shot sealed write/read through cache-bypassing file handles.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::Once;
use std::time::{Duration, Instant};

use core_crypto::{aead, Cipher, SessionKey};
use serde::{Deserialize, Serialize};

use crate::align::{align, recover_length, AlignedBuffer, BlockSize};
use crate::{Error, Result};

/// Zero bytes past the recovered length that may still belong to the ciphertext.
/// A sealed buffer ends in k zero bytes with probability 256^-k.
const TAIL_PROBE: usize = 8;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IoMode {
    /// Bypass the page cache; fail if the filesystem refuses.
    Direct,
    /// Bypass the page cache where supported, otherwise fall back to buffered I/O.
    #[default]
    PreferDirect,
    Buffered,
}

impl IoMode {
    pub fn as_str(self) -> &'static str {
        match self {
            IoMode::Direct => "direct",
            IoMode::PreferDirect => "prefer-direct",
            IoMode::Buffered => "buffered",
        }
    }
}

impl fmt::Display for IoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IoMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(IoMode::Direct),
            "prefer-direct" | "prefer_direct" | "auto" => Ok(IoMode::PreferDirect),
            "buffered" => Ok(IoMode::Buffered),
            other => Err(format!("unknown io mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WriteReport {
    pub elapsed: Duration,
    /// Aligned bytes handed to the device.
    pub bytes: usize,
    pub ciphertext_len: usize,
}

#[derive(Debug, Clone)]
pub struct ReadReport {
    pub elapsed: Duration,
    /// Aligned bytes read from the device.
    pub bytes: usize,
    pub ciphertext_len: usize,
    pub plaintext: Vec<u8>,
    pub attempts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsealed {
    pub plaintext: Vec<u8>,
    pub ciphertext_len: usize,
    pub attempts: usize,
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Write,
    Read,
}

impl Access {
    fn options(self) -> OpenOptions {
        let mut opts = OpenOptions::new();
        match self {
            Access::Write => {
                opts.create(true).write(true).truncate(true);
            }
            Access::Read => {
                opts.read(true);
            }
        }
        opts
    }
}

/// Seal-align-write and read-unseal against one file at a time.
///
/// A `Channel` holds no file state, so one instance can be shared by any number
/// of threads as long as each works on its own path.
#[derive(Debug, Clone, Copy, Default)]
pub struct Channel {
    pub cipher: Cipher,
    pub block_size: BlockSize,
    pub mode: IoMode,
}

impl Channel {
    pub fn new(cipher: Cipher, block_size: BlockSize, mode: IoMode) -> Self {
        Self { cipher, block_size, mode }
    }

    /// Seal `plaintext`, pad it to the block size and persist it at `path`.
    ///
    /// The elapsed time covers encryption through the durability sync.
    pub fn write_once(&self, plaintext: &[u8], key: &SessionKey, path: &Path) -> Result<WriteReport> {
        let start = Instant::now();
        let sealed = aead::seal(self.cipher, key.as_bytes(), plaintext)?;
        let aligned = align(&sealed, self.block_size);

        let mut file = self.open(path, Access::Write)?;
        file.write_all(&aligned).map_err(|e| Error::io("write", path, e))?;
        file.sync_all().map_err(|e| Error::io("sync", path, e))?;

        let elapsed = start.elapsed();
        log::trace!("channel: wrote {} aligned bytes to {} in {:?}", aligned.len(), path.display(), elapsed);
        Ok(WriteReport { elapsed, bytes: aligned.len(), ciphertext_len: sealed.len() })
    }

    /// Read back a file written by [`Channel::write_once`] and authenticate it.
    ///
    /// The elapsed time covers open through successful decryption.
    pub fn read_once(&self, path: &Path, key: &SessionKey) -> Result<ReadReport> {
        let start = Instant::now();
        let mut file = self.open(path, Access::Read)?;
        let size = file.metadata().map_err(|e| Error::io("stat", path, e))?.len() as usize;

        let mut buf = AlignedBuffer::zeroed(size, self.block_size);
        file.read_exact(&mut buf).map_err(|e| Error::io("read", path, e))?;

        let unsealed = unseal_aligned(self.cipher, key.as_bytes(), &buf).map_err(|e| {
            log::warn!("channel: unseal {} failed: {}", path.display(), e);
            e
        })?;
        let elapsed = start.elapsed();
        if unsealed.attempts > 1 {
            log::debug!("channel: {}: ciphertext boundary found after {} attempts", path.display(), unsealed.attempts);
        }
        Ok(ReadReport {
            elapsed,
            bytes: size,
            ciphertext_len: unsealed.ciphertext_len,
            plaintext: unsealed.plaintext,
            attempts: unsealed.attempts,
        })
    }

    fn open(&self, path: &Path, access: Access) -> Result<File> {
        let op = match access {
            Access::Write => "open for write",
            Access::Read => "open for read",
        };
        let opened = match self.mode {
            IoMode::Buffered => access.options().open(path),
            IoMode::Direct => open_uncached(path, access),
            IoMode::PreferDirect => match open_uncached(path, access) {
                Err(e) if direct_unsupported(&e) => {
                    static FALLBACK: Once = Once::new();
                    FALLBACK.call_once(|| {
                        log::warn!("channel: cache-bypassing I/O unsupported under {}; falling back to buffered I/O", path.display())
                    });
                    log::debug!("channel: buffered fallback for {}: {}", path.display(), e);
                    access.options().open(path)
                }
                other => other,
            },
        };
        opened.map_err(|e| Error::io(op, path, e))
    }
}

#[cfg(target_os = "linux")]
fn open_uncached(path: &Path, access: Access) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    access.options().custom_flags(libc::O_DIRECT).open(path)
}

#[cfg(target_os = "macos")]
fn open_uncached(path: &Path, access: Access) -> io::Result<File> {
    use std::os::unix::io::AsRawFd;
    let file = access.options().open(path)?;
    // SAFETY: fd is owned by `file` and stays open for the duration of the call
    let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_NOCACHE, 1) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(file)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn open_uncached(_path: &Path, _access: Access) -> io::Result<File> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "cache-bypassing I/O not available on this platform"))
}

#[cfg(unix)]
fn direct_unsupported(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EINVAL) || e.kind() == io::ErrorKind::Unsupported
}

#[cfg(not(unix))]
fn direct_unsupported(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::Unsupported
}

/// Authenticate and decrypt a block-aligned sealed buffer.
///
/// The ciphertext boundary comes from the trailing-zero scan. If that slice
/// fails authentication the whole buffer is tried, then up to [`TAIL_PROBE`]
/// longer prefixes, because genuine ciphertext may itself end in zero bytes.
/// The tag check rejects every wrong boundary.
pub fn unseal_aligned(cipher: Cipher, key: &[u8], buf: &[u8]) -> Result<Unsealed> {
    let recovered = recover_length(buf);
    let mut attempts = 1;
    match aead::open(cipher, key, &buf[..recovered]) {
        Ok(plaintext) => return Ok(Unsealed { plaintext, ciphertext_len: recovered, attempts }),
        Err(e) if e.is_setup() => return Err(e.into()),
        Err(_) => {}
    }
    if recovered == buf.len() {
        return Err(Error::Decrypt { attempts });
    }

    attempts += 1;
    if let Ok(plaintext) = aead::open(cipher, key, buf) {
        return Ok(Unsealed { plaintext, ciphertext_len: buf.len(), attempts });
    }

    let first = (recovered + 1).max(aead::sealed_len(cipher, 0));
    let last = (recovered + TAIL_PROBE).min(buf.len() - 1);
    for end in first..=last {
        attempts += 1;
        if let Ok(plaintext) = aead::open(cipher, key, &buf[..end]) {
            return Ok(Unsealed { plaintext, ciphertext_len: end, attempts });
        }
    }
    Err(Error::Decrypt { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, RngCore, SeedableRng};

    fn channel(cipher: Cipher) -> Channel {
        Channel::new(cipher, BlockSize::default(), IoMode::PreferDirect)
    }

    #[test]
    fn write_read_roundtrip_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        for cipher in [Cipher::Aes256Gcm, Cipher::ChaCha20Poly1305] {
            let ch = channel(cipher);
            let key = SessionKey::generate(cipher).unwrap();
            for len in [0usize, 1, 100, 4068, 4096, 10_000, 1 << 20] {
                let mut pt = vec![0u8; len];
                rng.fill_bytes(&mut pt);
                let path = dir.path().join(format!("rt-{cipher}-{len}"));

                let w = ch.write_once(&pt, &key, &path).expect("write ok");
                assert_eq!(w.bytes % 4096, 0);
                assert!(w.bytes >= w.ciphertext_len);
                assert_eq!(w.ciphertext_len, aead::sealed_len(cipher, len));
                assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, w.bytes);

                let r = ch.read_once(&path, &key).expect("read ok");
                assert_eq!(r.plaintext, pt);
                assert_eq!(r.bytes, w.bytes);
                assert_eq!(r.ciphertext_len, w.ciphertext_len);
            }
        }
    }

    #[test]
    fn buffered_mode_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let ch = Channel::new(Cipher::Aes256Gcm, BlockSize::new(512).unwrap(), IoMode::Buffered);
        let key = SessionKey::generate(Cipher::Aes256Gcm).unwrap();
        let path = dir.path().join("buffered");
        let pt = vec![0x5Au8; 3000];
        let w = ch.write_once(&pt, &key, &path).unwrap();
        assert_eq!(w.bytes, 3072);
        assert_eq!(ch.read_once(&path, &key).unwrap().plaintext, pt);
    }

    #[test]
    fn direct_mode_roundtrips_or_reports_open_failure() {
        // tmpfs and some container filesystems reject O_DIRECT
        let dir = tempfile::tempdir().unwrap();
        let ch = Channel::new(Cipher::Aes256Gcm, BlockSize::default(), IoMode::Direct);
        let key = SessionKey::generate(Cipher::Aes256Gcm).unwrap();
        let path = dir.path().join("direct");
        match ch.write_once(b"direct payload", &key, &path) {
            Ok(_) => assert_eq!(ch.read_once(&path, &key).unwrap().plaintext, b"direct payload"),
            Err(Error::Io { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn wrong_key_length_fails_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never");
        let key = SessionKey::from_bytes(vec![7u8; 16]);
        let err = channel(Cipher::Aes256Gcm).write_once(b"data", &key, &path).unwrap_err();
        assert!(matches!(err, Error::Crypto(core_crypto::Error::KeyLength { expected: 32, actual: 16 })));
        assert_eq!(err.type_name(), "crypto");
        assert!(!path.exists());
    }

    #[test]
    fn wrong_key_is_decrypt_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wrong-key");
        let ch = channel(Cipher::Aes256Gcm);
        let key = SessionKey::generate(Cipher::Aes256Gcm).unwrap();
        let other = SessionKey::generate(Cipher::Aes256Gcm).unwrap();
        ch.write_once(&[3u8; 777], &key, &path).unwrap();
        let err = ch.read_once(&path, &other).unwrap_err();
        assert!(matches!(err, Error::Decrypt { attempts } if attempts >= 2), "{err:?}");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let key = SessionKey::generate(Cipher::Aes256Gcm).unwrap();
        let err = channel(Cipher::Aes256Gcm).read_once(&dir.path().join("absent"), &key).unwrap_err();
        match err {
            Error::Io { op, source, .. } => {
                assert_eq!(op, "open for read");
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn ciphertext_ending_in_zero_still_unseals() {
        let cipher = Cipher::Aes256Gcm;
        let key = SessionKey::generate(cipher).unwrap();
        let pt = b"payload whose tag happens to end in zero";
        // About 1 in 256 seals ends in a zero byte
        let sealed = (0..100_000)
            .map(|_| aead::seal(cipher, key.as_bytes(), pt).unwrap())
            .find(|s| s.last() == Some(&0))
            .expect("a sealed buffer ending in zero");

        let aligned = align(&sealed, BlockSize::default());
        assert!(recover_length(&aligned) < sealed.len());
        let out = unseal_aligned(cipher, key.as_bytes(), &aligned).expect("unseal ok");
        assert_eq!(out.plaintext, pt);
        assert_eq!(out.ciphertext_len, sealed.len());
        assert!(out.attempts >= 3);
    }

    #[test]
    fn exact_fit_buffer_needs_one_attempt() {
        let cipher = Cipher::Aes256Gcm;
        let key = SessionKey::generate(cipher).unwrap();
        // 12-byte nonce + 4068 + 16-byte tag = 4096
        let pt = vec![0xA5u8; 4068];
        let sealed = aead::seal(cipher, key.as_bytes(), &pt).unwrap();
        let aligned = align(&sealed, BlockSize::default());
        assert_eq!(aligned.len(), sealed.len());
        if sealed.last() != Some(&0) {
            let out = unseal_aligned(cipher, key.as_bytes(), &aligned).unwrap();
            assert_eq!(out.attempts, 1);
            assert_eq!(out.plaintext, pt);
        }
    }

    #[test]
    fn all_zero_buffer_is_decrypt_error() {
        let key = SessionKey::generate(Cipher::Aes256Gcm).unwrap();
        let err = unseal_aligned(Cipher::Aes256Gcm, key.as_bytes(), &[0u8; 4096]).unwrap_err();
        assert!(matches!(err, Error::Decrypt { .. }));
        let err = unseal_aligned(Cipher::Aes256Gcm, key.as_bytes(), &[]).unwrap_err();
        assert!(matches!(err, Error::Decrypt { attempts: 1 }));
    }

    #[test]
    fn io_mode_names() {
        for m in [IoMode::Direct, IoMode::PreferDirect, IoMode::Buffered] {
            assert_eq!(m.to_string().parse::<IoMode>().unwrap(), m);
        }
        assert_eq!(IoMode::default(), IoMode::PreferDirect);
        assert!("mmap".parse::<IoMode>().is_err());
    }
}
