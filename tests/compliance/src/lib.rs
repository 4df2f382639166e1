//! Shared fixtures for the scenario suites.

use std::path::Path;

use core_bench::RunOptions;
use core_crypto::Cipher;
use core_directio::{BlockSize, Channel, IoMode};
use rand::{rngs::StdRng, RngCore, SeedableRng};

pub const MIB: usize = 1024 * 1024;

pub fn random_payload(len: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    data
}

pub fn channel(cipher: Cipher) -> Channel {
    Channel::new(cipher, BlockSize::default(), IoMode::PreferDirect)
}

pub fn run_options(dir: &Path, cipher: Cipher, seed: Option<u64>) -> RunOptions {
    RunOptions {
        dir: dir.to_path_buf(),
        file_name: "encryption_test.txt".into(),
        channel: channel(cipher),
        verify: true,
        payload_seed: seed,
    }
}

/// Number of entries left in `dir`.
pub fn leftover_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
