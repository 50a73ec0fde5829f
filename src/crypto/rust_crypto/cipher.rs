//! AES-GCM and AES-CBC using RustCrypto.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit as BlockKeyInit};
use aes::{Aes128, Aes256};
use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes128Gcm, Aes256Gcm, Key, Nonce};

use crate::buffer::Buf;
use crate::crypto::provider::{Aead, BlockCipher, CipherProvider};
use crate::types::BulkCipher;

/// AES-GCM cipher implementation using RustCrypto.
enum AesGcm {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl std::fmt::Debug for AesGcm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AesGcm::Aes128(_) => f.debug_tuple("AesGcm::Aes128").finish(),
            AesGcm::Aes256(_) => f.debug_tuple("AesGcm::Aes256").finish(),
        }
    }
}

impl AesGcm {
    fn new(key: &[u8]) -> Result<Self, String> {
        match key.len() {
            16 => {
                let key = Key::<Aes128Gcm>::from_slice(key);
                Ok(AesGcm::Aes128(Box::new(Aes128Gcm::new(key))))
            }
            32 => {
                let key = Key::<Aes256Gcm>::from_slice(key);
                Ok(AesGcm::Aes256(Box::new(Aes256Gcm::new(key))))
            }
            _ => Err(format!("Invalid key size for AES-GCM: {}", key.len())),
        }
    }
}

fn check_nonce(nonce: &[u8]) -> Result<(), String> {
    if nonce.len() != 12 {
        return Err(format!(
            "Invalid nonce length: expected 12, got {}",
            nonce.len()
        ));
    }
    Ok(())
}

impl Aead for AesGcm {
    fn seal(&self, nonce: &[u8], aad: &[u8], data: &mut Buf) -> Result<(), String> {
        check_nonce(nonce)?;
        let nonce = Nonce::from_slice(nonce);
        match self {
            AesGcm::Aes128(cipher) => cipher.encrypt_in_place(nonce, aad, data),
            AesGcm::Aes256(cipher) => cipher.encrypt_in_place(nonce, aad, data),
        }
        .map_err(|_| "AES-GCM encryption failed".to_string())
    }

    fn open(&self, nonce: &[u8], aad: &[u8], data: &mut Buf) -> Result<(), String> {
        check_nonce(nonce)?;
        if data.len() < 16 {
            return Err(format!("Ciphertext too short: {}", data.len()));
        }
        let nonce = Nonce::from_slice(nonce);
        // decrypt_in_place removes the tag and shortens the buffer
        match self {
            AesGcm::Aes128(cipher) => cipher.decrypt_in_place(nonce, aad, data),
            AesGcm::Aes256(cipher) => cipher.decrypt_in_place(nonce, aad, data),
        }
        .map_err(|_| "AES-GCM decryption failed".to_string())
    }
}

/// AES block cipher chained in CBC mode.
enum AesCbc {
    Aes128(Box<Aes128>),
    Aes256(Box<Aes256>),
}

impl std::fmt::Debug for AesCbc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AesCbc::Aes128(_) => f.debug_tuple("AesCbc::Aes128").finish(),
            AesCbc::Aes256(_) => f.debug_tuple("AesCbc::Aes256").finish(),
        }
    }
}

impl AesCbc {
    fn new(key: &[u8]) -> Result<Self, String> {
        match key.len() {
            16 => Aes128::new_from_slice(key)
                .map(|c| AesCbc::Aes128(Box::new(c)))
                .map_err(|_| "Invalid AES-128 key".to_string()),
            32 => Aes256::new_from_slice(key)
                .map(|c| AesCbc::Aes256(Box::new(c)))
                .map_err(|_| "Invalid AES-256 key".to_string()),
            _ => Err(format!("Invalid key size for AES-CBC: {}", key.len())),
        }
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        let block = aes::Block::from_mut_slice(block);
        match self {
            AesCbc::Aes128(c) => c.encrypt_block(block),
            AesCbc::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        let block = aes::Block::from_mut_slice(block);
        match self {
            AesCbc::Aes128(c) => c.decrypt_block(block),
            AesCbc::Aes256(c) => c.decrypt_block(block),
        }
    }
}

fn check_cbc_input(iv: &[u8], data: &[u8]) -> Result<(), String> {
    if iv.len() != 16 {
        return Err(format!("Invalid IV length: {}", iv.len()));
    }
    if data.len() % 16 != 0 {
        return Err(format!("CBC input not block aligned: {}", data.len()));
    }
    Ok(())
}

impl BlockCipher for AesCbc {
    fn encrypt_cbc(&self, iv: &[u8], data: &mut [u8]) -> Result<(), String> {
        check_cbc_input(iv, data)?;
        let mut prev = [0u8; 16];
        prev.copy_from_slice(iv);
        for block in data.chunks_exact_mut(16) {
            for (b, p) in block.iter_mut().zip(prev.iter()) {
                *b ^= p;
            }
            self.encrypt_block(block);
            prev.copy_from_slice(block);
        }
        Ok(())
    }

    fn decrypt_cbc(&self, iv: &[u8], data: &mut [u8]) -> Result<(), String> {
        check_cbc_input(iv, data)?;
        let mut prev = [0u8; 16];
        prev.copy_from_slice(iv);
        for block in data.chunks_exact_mut(16) {
            let mut this = [0u8; 16];
            this.copy_from_slice(block);
            self.decrypt_block(block);
            for (b, p) in block.iter_mut().zip(prev.iter()) {
                *b ^= p;
            }
            prev = this;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub(super) struct RustCryptoCipherProvider;

impl CipherProvider for RustCryptoCipherProvider {
    fn create_aead(&self, cipher: BulkCipher, key: &[u8]) -> Result<Box<dyn Aead>, String> {
        if !cipher.is_aead() || key.len() != cipher.key_len() {
            return Err(format!("{:?} is not an AEAD with a {} byte key", cipher, key.len()));
        }
        Ok(Box::new(AesGcm::new(key)?))
    }

    fn create_block_cipher(
        &self,
        cipher: BulkCipher,
        key: &[u8],
    ) -> Result<Box<dyn BlockCipher>, String> {
        if cipher.is_aead() || key.len() != cipher.key_len() {
            return Err(format!("{:?} is not a block cipher with a {} byte key", cipher, key.len()));
        }
        Ok(Box::new(AesCbc::new(key)?))
    }
}

pub(super) static CIPHER_PROVIDER: RustCryptoCipherProvider = RustCryptoCipherProvider;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcm_seal_open() {
        let aead = CIPHER_PROVIDER
            .create_aead(BulkCipher::Aes128Gcm, &[3; 16])
            .unwrap();
        let mut data = Buf::from_slice(b"attack at dawn");
        aead.seal(&[1; 12], b"aad", &mut data).unwrap();
        assert_eq!(data.len(), 14 + 16);

        let mut tampered = data.clone();
        tampered[0] ^= 1;
        assert!(aead.open(&[1; 12], b"aad", &mut tampered).is_err());

        aead.open(&[1; 12], b"aad", &mut data).unwrap();
        assert_eq!(&data[..], b"attack at dawn");
    }

    #[test]
    fn cbc_roundtrip_and_chaining() {
        let c = CIPHER_PROVIDER
            .create_block_cipher(BulkCipher::Aes256Cbc, &[9; 32])
            .unwrap();
        let plain = [0x42u8; 48];
        let mut data = plain;
        c.encrypt_cbc(&[5; 16], &mut data).unwrap();
        // Identical plaintext blocks must not encrypt identically.
        assert_ne!(data[..16], data[16..32]);
        c.decrypt_cbc(&[5; 16], &mut data).unwrap();
        assert_eq!(data, plain);

        let mut odd = [0u8; 17];
        assert!(c.encrypt_cbc(&[0; 16], &mut odd).is_err());
    }

    #[test]
    fn factory_rejects_mismatched_key() {
        assert!(CIPHER_PROVIDER
            .create_aead(BulkCipher::Aes256Gcm, &[0; 16])
            .is_err());
        assert!(CIPHER_PROVIDER
            .create_block_cipher(BulkCipher::Aes128Gcm, &[0; 16])
            .is_err());
    }
}
