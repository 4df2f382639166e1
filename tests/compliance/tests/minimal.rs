use compliance::{channel, leftover_files, random_payload, run_options, MIB};
use core_bench::{benchmark_read, benchmark_write, split, BenchmarkRequest, Error, Orchestrator, ScratchFiles};
use core_crypto::{Cipher, SessionKey};
use core_directio::{align, recover_length, BlockSize};

// MINIMAL profile:
// - sealed round trip through the aligned channel, including empty and unaligned sizes
// - alignment and trailing-zero recovery
// - chunk coverage and isolation of concurrent workers
// - 1 MiB end-to-end run with four workers
// - wrong key length fails the size without a result row

#[test]
fn channel_roundtrip_all_sizes() {
    let dir = tempfile::tempdir().unwrap();
    let ch = channel(Cipher::Aes256Gcm);
    let key = SessionKey::generate(Cipher::Aes256Gcm).unwrap();
    for (i, len) in [0usize, 1, 511, 4095, 4096, 4097, 123_457].into_iter().enumerate() {
        let pt = random_payload(len, i as u64);
        let path = dir.path().join(format!("rt{}", i));
        ch.write_once(&pt, &key, &path).expect("write ok");
        let back = ch.read_once(&path, &key).expect("read ok");
        assert_eq!(back.plaintext, pt, "len={}", len);
    }
}

#[test]
fn alignment_recovers_length_when_last_byte_nonzero() {
    let block = BlockSize::default();
    for len in [1usize, 28, 4095, 4096, 4097, 9000] {
        let mut buf = random_payload(len, 77);
        buf[len - 1] = 0x01;
        let aligned = align(&buf, block);
        assert_eq!(aligned.len() % block.get(), 0);
        assert_eq!(recover_length(&aligned), len);
    }
    // Degenerate: a genuine trailing zero is indistinguishable from padding
    let aligned = align(&[5, 6, 0], block);
    assert_eq!(recover_length(&aligned), 2);
}

#[test]
fn chunks_partition_payload() {
    let payload = random_payload(10_007, 3);
    for workers in [1usize, 2, 3, 4, 7, 16] {
        let chunks = split(&payload, workers);
        assert_eq!(chunks.len(), workers);
        assert_eq!(chunks.concat(), payload);
        // Remainder lands in the last chunk
        let base = payload.len() / workers;
        assert!(chunks[..workers - 1].iter().all(|c| c.len() == base));
        assert_eq!(chunks[workers - 1].len(), base + payload.len() % workers);
    }
}

#[test]
fn concurrent_workers_do_not_interfere() {
    let dir = tempfile::tempdir().unwrap();
    let ch = channel(Cipher::Aes256Gcm);
    let key = SessionKey::generate(Cipher::Aes256Gcm).unwrap();
    let payload = random_payload(2 * MIB + 13, 9);
    let chunks = split(&payload, 8);
    let scratch = ScratchFiles::new(dir.path(), "iso", 0, chunks.len());

    benchmark_write(&ch, &chunks, &key, &scratch).expect("write phase");
    for (worker, chunk) in chunks.iter().enumerate() {
        let back = ch.read_once(scratch.path(worker), &key).expect("read ok");
        assert_eq!(&back.plaintext[..], *chunk, "worker {}", worker);
    }
    let read = benchmark_read(&ch, &key, &scratch).expect("read phase");
    assert_eq!(read.plaintexts.concat(), payload);
    drop(scratch);
    assert_eq!(leftover_files(dir.path()), 0);
}

#[test]
fn end_to_end_one_mib_four_workers() {
    let dir = tempfile::tempdir().unwrap();
    let orch = Orchestrator::new(run_options(dir.path(), Cipher::Aes256Gcm, Some(2024)));
    let req = BenchmarkRequest::new(vec![1_048_576], Some(4)).unwrap();
    let report = orch.run(&req);

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.results.len(), 1);
    let r = &report.results[0];
    assert_eq!(r.size, 1_048_576);
    assert_eq!(r.workers, 4);
    assert!(r.write_mbps > 0.0);
    assert!(r.read_mbps > 0.0);
    // Read-back was compared byte for byte against the payload
    assert!(r.verified);
    assert_eq!(leftover_files(dir.path()), 0);
}

#[test]
fn wrong_key_length_yields_crypto_error_and_no_row() {
    let dir = tempfile::tempdir().unwrap();
    let orch = Orchestrator::new(run_options(dir.path(), Cipher::Aes256Gcm, None));
    let req = BenchmarkRequest::new(vec![1_048_576], Some(4)).unwrap();
    let report = orch.run_with_keys(&req, |_| Ok(SessionKey::from_bytes(vec![0u8; 24])));

    assert!(report.results.is_empty());
    assert_eq!(report.failures.len(), 1);
    let err = &report.failures[0].error;
    assert!(matches!(
        err,
        Error::Canonical(core_directio::Error::Crypto(core_crypto::Error::KeyLength { expected: 32, actual: 24 }))
    ));
    assert_eq!(leftover_files(dir.path()), 0);
}
