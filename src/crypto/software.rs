//! Software cipher provider
//!
//! Implements [`CipherProvider`] with the RustCrypto `aes`, `cmac` and `eax`
//! crates. Deployments with a hardware crypto engine supply their own
//! provider instead.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;
use cmac::{Cmac, Mac};
use eax::aead::{Aead, Payload};
use eax::Eax;

use crate::crypto::provider::{CipherProvider, BLOCK_LEN, TAG_LEN};
use crate::error::CryptoError;

/// Pure-software AES-128 / CMAC / EAX provider
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareCipher;

impl CipherProvider for SoftwareCipher {
    fn aes_ecb_encrypt(&self, key: &[u8; BLOCK_LEN], block: &[u8; BLOCK_LEN]) -> [u8; BLOCK_LEN] {
        let cipher = Aes128::new(GenericArray::from_slice(key));
        let mut out = GenericArray::clone_from_slice(block);
        cipher.encrypt_block(&mut out);
        out.into()
    }

    fn cmac_aes128(&self, key: &[u8; BLOCK_LEN], data: &[u8]) -> [u8; TAG_LEN] {
        let mut mac = <Cmac<Aes128> as Mac>::new(GenericArray::from_slice(key));
        mac.update(data);
        mac.finalize().into_bytes().into()
    }

    fn eax_encrypt(
        &self,
        key: &[u8; BLOCK_LEN],
        nonce: &[u8; BLOCK_LEN],
        header: &[u8],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, [u8; TAG_LEN]), CryptoError> {
        let cipher = Eax::<Aes128>::new(GenericArray::from_slice(key));

        // The aead interface appends the tag to the ciphertext; EAP-PSK
        // carries them detached, so split them back apart.
        let mut sealed = cipher
            .encrypt(
                GenericArray::from_slice(nonce),
                Payload {
                    msg: plaintext,
                    aad: header,
                },
            )
            .map_err(|_| CryptoError::Encryption)?;

        let tag_start = sealed.len() - TAG_LEN;
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&sealed[tag_start..]);
        sealed.truncate(tag_start);

        Ok((sealed, tag))
    }

    fn eax_decrypt(
        &self,
        key: &[u8; BLOCK_LEN],
        nonce: &[u8; BLOCK_LEN],
        header: &[u8],
        ciphertext: &[u8],
        tag: &[u8; TAG_LEN],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = Eax::<Aes128>::new(GenericArray::from_slice(key));

        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        cipher
            .decrypt(
                GenericArray::from_slice(nonce),
                Payload {
                    msg: &sealed,
                    aad: header,
                },
            )
            .map_err(|_| CryptoError::Decryption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes_ecb_known_vector() {
        // FIPS-197 appendix C.1
        let key = [
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
            0x0e, 0x0f,
        ];
        let block = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ];
        let expected = [
            0x69, 0xc4, 0xe0, 0xd8, 0x6a, 0x7b, 0x04, 0x30, 0xd8, 0xcd, 0xb7, 0x80, 0x70, 0xb4,
            0xc5, 0x5a,
        ];

        assert_eq!(SoftwareCipher.aes_ecb_encrypt(&key, &block), expected);
    }

    #[test]
    fn test_cmac_known_vector() {
        // RFC 4493 example 1: CMAC over the empty string
        let key = [
            0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf,
            0x4f, 0x3c,
        ];
        let expected = [
            0xbb, 0x1d, 0x69, 0x29, 0xe9, 0x59, 0x37, 0x28, 0x7f, 0xa3, 0x7d, 0x12, 0x9b, 0x75,
            0x67, 0x46,
        ];

        assert_eq!(SoftwareCipher.cmac_aes128(&key, &[]), expected);
    }

    #[test]
    fn test_eax_roundtrip() {
        let key = [7u8; 16];
        let nonce = [9u8; 16];
        let header = b"associated header";
        let plaintext = b"p-channel payload";

        let (ciphertext, tag) = SoftwareCipher
            .eax_encrypt(&key, &nonce, header, plaintext)
            .unwrap();
        assert_eq!(ciphertext.len(), plaintext.len());

        let decrypted = SoftwareCipher
            .eax_decrypt(&key, &nonce, header, &ciphertext, &tag)
            .unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_eax_rejects_bad_tag() {
        let key = [7u8; 16];
        let nonce = [9u8; 16];

        let (ciphertext, mut tag) = SoftwareCipher
            .eax_encrypt(&key, &nonce, b"hdr", b"data")
            .unwrap();
        tag[0] ^= 0x01;

        assert!(SoftwareCipher
            .eax_decrypt(&key, &nonce, b"hdr", &ciphertext, &tag)
            .is_err());
    }

    #[test]
    fn test_eax_rejects_modified_header() {
        let key = [7u8; 16];
        let nonce = [9u8; 16];

        let (ciphertext, tag) = SoftwareCipher
            .eax_encrypt(&key, &nonce, b"hdr", b"data")
            .unwrap();

        assert!(SoftwareCipher
            .eax_decrypt(&key, &nonce, b"HDR", &ciphertext, &tag)
            .is_err());
    }

    #[test]
    fn test_eax_empty_plaintext() {
        let key = [1u8; 16];
        let nonce = [2u8; 16];

        let (ciphertext, tag) = SoftwareCipher.eax_encrypt(&key, &nonce, &[], &[]).unwrap();
        assert!(ciphertext.is_empty());

        let decrypted = SoftwareCipher
            .eax_decrypt(&key, &nonce, &[], &ciphertext, &tag)
            .unwrap();
        assert!(decrypted.is_empty());
    }
}
