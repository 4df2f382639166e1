use compliance::{leftover_files, random_payload, run_options, MIB};
use core_bench::{BenchmarkRequest, Orchestrator};
use core_crypto::{aead, Cipher, SessionKey};
use core_directio::{align, unseal_aligned, BlockSize};

// STANDARD profile extensions beyond MINIMAL
// - multi-size runs with both ciphers, results in request order
// - worker ceiling larger than the payload
// - sealed buffers whose final byte is zero

#[test]
fn multi_size_run_both_ciphers() {
    for cipher in [Cipher::Aes256Gcm, Cipher::ChaCha20Poly1305] {
        let dir = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(run_options(dir.path(), cipher, Some(1)));
        let sizes = vec![MIB, 3 * MIB + 1, 64 * 1024];
        let req = BenchmarkRequest::new(sizes.clone(), Some(4)).unwrap();
        let report = orch.run(&req);

        assert!(report.is_success(), "{:?}", report.failures);
        let got: Vec<usize> = report.results.iter().map(|r| r.size).collect();
        assert_eq!(got, sizes);
        for r in &report.results {
            assert!(r.write_mbps > 0.0 && r.read_mbps > 0.0);
            assert!(r.latency_ms() > 0.0);
        }
        assert_eq!(leftover_files(dir.path()), 0);
    }
}

#[test]
fn tiny_payload_caps_workers() {
    let dir = tempfile::tempdir().unwrap();
    let orch = Orchestrator::new(run_options(dir.path(), Cipher::Aes256Gcm, None));
    let req = BenchmarkRequest::new(vec![5], Some(64)).unwrap();
    let report = orch.run(&req);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].workers, 5);
}

#[test]
fn zero_terminated_ciphertexts_read_back() {
    let key = SessionKey::generate(Cipher::ChaCha20Poly1305).unwrap();
    let mut found = 0;
    for i in 0..200_000u64 {
        let pt = random_payload(64, i);
        let sealed = aead::seal(Cipher::ChaCha20Poly1305, key.as_bytes(), &pt).unwrap();
        if sealed.last() != Some(&0) {
            continue;
        }
        let aligned = align(&sealed, BlockSize::default());
        let out = unseal_aligned(Cipher::ChaCha20Poly1305, key.as_bytes(), &aligned).expect("unseal ok");
        assert_eq!(out.plaintext, pt);
        found += 1;
        if found == 3 {
            break;
        }
    }
    assert_eq!(found, 3);
}
