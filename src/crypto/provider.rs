//! Cipher provider capability
//!
//! The EAP-PSK engine never touches a cipher implementation directly; it
//! receives a provider from the caller. This keeps the engine pure and lets
//! deployments swap in a hardware AES engine.

use crate::error::CryptoError;

/// Key and single-block length for AES-128
pub const BLOCK_LEN: usize = 16;

/// Authentication tag length (CMAC and EAX)
pub const TAG_LEN: usize = 16;

/// Cipher operations required by the EAP-PSK handshake
///
/// All operations are synchronous. The AEAD operations are fallible;
/// decryption fails when the authentication tag does not match.
pub trait CipherProvider {
    /// Encrypt a single 16-byte block with AES-128 in ECB mode
    fn aes_ecb_encrypt(&self, key: &[u8; BLOCK_LEN], block: &[u8; BLOCK_LEN]) -> [u8; BLOCK_LEN];

    /// Compute CMAC-AES-128 over `data`
    fn cmac_aes128(&self, key: &[u8; BLOCK_LEN], data: &[u8]) -> [u8; TAG_LEN];

    /// EAX authenticated encryption with a 16-byte nonce and associated header
    ///
    /// Returns the ciphertext and the 16-byte tag separately, matching the
    /// detached layout of EAP-PSK messages 3 and 4.
    fn eax_encrypt(
        &self,
        key: &[u8; BLOCK_LEN],
        nonce: &[u8; BLOCK_LEN],
        header: &[u8],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, [u8; TAG_LEN]), CryptoError>;

    /// EAX authenticated decryption
    fn eax_decrypt(
        &self,
        key: &[u8; BLOCK_LEN],
        nonce: &[u8; BLOCK_LEN],
        header: &[u8],
        ciphertext: &[u8],
        tag: &[u8; TAG_LEN],
    ) -> Result<Vec<u8>, CryptoError>;
}
