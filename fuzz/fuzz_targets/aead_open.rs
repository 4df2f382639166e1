#![no_main]
use arbitrary::Arbitrary;
use core_crypto::{aead, Cipher};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    key: Vec<u8>,
    sealed: Vec<u8>,
    plaintext: Vec<u8>,
    chacha: bool,
}

fuzz_target!(|inp: Input| {
    let cipher = if inp.chacha { Cipher::ChaCha20Poly1305 } else { Cipher::Aes256Gcm };
    // Any key length and any input: errors only.
    let _ = aead::open(cipher, &inp.key, &inp.sealed);

    if inp.key.len() == cipher.key_len() {
        let sealed = aead::seal(cipher, &inp.key, &inp.plaintext).expect("seal with valid key");
        assert_eq!(sealed.len(), aead::sealed_len(cipher, inp.plaintext.len()));
        let opened = aead::open(cipher, &inp.key, &sealed).expect("open own ciphertext");
        assert_eq!(opened, inp.plaintext);
    }
});
