#![no_main]
use arbitrary::Arbitrary;
use core_crypto::Cipher;
use core_directio::{align, recover_length, unseal_aligned, BlockSize};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    data: Vec<u8>,
    key: [u8; 32],
    chacha: bool,
    /// log2 of the block size, clamped to 9..=13
    block_shift: u8,
}

fuzz_target!(|inp: Input| {
    let cipher = if inp.chacha { Cipher::ChaCha20Poly1305 } else { Cipher::Aes256Gcm };
    let shift = 9 + u32::from(inp.block_shift % 5);
    let block = match BlockSize::new(1usize << shift) {
        Ok(b) => b,
        Err(_) => return,
    };

    let aligned = align(&inp.data, block);
    assert_eq!(aligned.len() % block.get(), 0);
    assert!(recover_length(&aligned) <= inp.data.len());

    // Arbitrary bytes must never authenticate or panic.
    let _ = unseal_aligned(cipher, &inp.key, &aligned);
    let _ = unseal_aligned(cipher, &inp.key, &inp.data);
});
