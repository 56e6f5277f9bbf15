//! AES-256-CBC address cipher.
//!
//! Opaque form is `base64(iv || ciphertext)` with PKCS#7 padding and a
//! random 16-byte IV per encryption, so the same address never encrypts to
//! the same blob twice.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::error::{Error, Result};
use crate::port::cipher::AddressCipher;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const IV_LEN: usize = 16;

pub struct AesAddressCipher {
    key: [u8; 32],
}

impl AesAddressCipher {
    pub fn from_hex_key(key_hex: &str) -> Result<Self> {
        let bytes = hex::decode(key_hex).map_err(|e| Error::Parse(format!("bad key hex: {e}")))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::Parse("cipher key must be 32 bytes".to_string()))?;
        Ok(Self { key })
    }
}

impl AddressCipher for AesAddressCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    fn decrypt(&self, opaque: &str) -> Result<String> {
        let blob = BASE64
            .decode(opaque)
            .map_err(|e| Error::Parse(format!("bad ciphertext encoding: {e}")))?;
        if blob.len() <= IV_LEN {
            return Err(Error::Parse("ciphertext too short".to_string()));
        }
        let (iv, ciphertext) = blob.split_at(IV_LEN);

        let plaintext = Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|_| Error::Parse("bad IV length".to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| Error::Parse("decryption failed".to_string()))?;

        String::from_utf8(plaintext).map_err(|e| Error::Parse(format!("bad plaintext: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> AesAddressCipher {
        AesAddressCipher::from_hex_key(&"ab".repeat(32)).unwrap()
    }

    #[test]
    fn round_trip() {
        let cipher = cipher();
        let address = "0x2222222222222222222222222222222222222222";
        let opaque = cipher.encrypt(address).unwrap();
        assert_eq!(cipher.decrypt(&opaque).unwrap(), address);
    }

    #[test]
    fn fresh_iv_per_encryption() {
        let cipher = cipher();
        let a = cipher.encrypt("0xabc").unwrap();
        let b = cipher.encrypt("0xabc").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_closed() {
        let opaque = cipher().encrypt("0xabc").unwrap();
        let other = AesAddressCipher::from_hex_key(&"cd".repeat(32)).unwrap();
        assert!(other.decrypt(&opaque).is_err());
    }

    #[test]
    fn garbage_input_rejected() {
        let cipher = cipher();
        assert!(cipher.decrypt("not base64!!").is_err());
        assert!(cipher.decrypt("AAAA").is_err());
    }

    #[test]
    fn short_key_rejected() {
        assert!(AesAddressCipher::from_hex_key("deadbeef").is_err());
    }
}
