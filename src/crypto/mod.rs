//! Cryptographic primitives for EAP-PSK bootstrapping
//!
//! All ciphering is consumed through the [`CipherProvider`] capability so the
//! coordinator can run against a hardware crypto engine or the bundled
//! software implementation:
//! - AES-128 single-block ECB encryption (key derivation chain)
//! - CMAC-AES-128 (MacP / MacS computation)
//! - EAX AEAD over AES-128 (P-CHANNEL protection)

pub mod provider;
pub mod software;

pub use provider::CipherProvider;
pub use software::SoftwareCipher;
