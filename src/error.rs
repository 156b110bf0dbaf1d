//! Error types for the LBP coordinator

use thiserror::Error;

/// Main error type for LBP bootstrap operations
#[derive(Error, Debug)]
pub enum LbpError {
    /// Cryptographic errors
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Cryptographic operation errors
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    Encryption,

    #[error("Decryption failed: invalid ciphertext or authentication tag")]
    Decryption,
}

/// Protocol-level errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message type: {msg_type}")]
    InvalidMessageType { msg_type: u8 },

    #[error("Invalid message length: expected at least {expected}, got {got}")]
    InvalidMessageLength { expected: usize, got: usize },

    #[error("EAP length field ({claimed}) exceeds received octets ({received})")]
    LengthFieldOverrun { claimed: usize, received: usize },

    #[error("MAC verification failed")]
    MacVerificationFailed,

    #[error("RandS mismatch: peer echoed a stale challenge")]
    RandSMismatch,

    #[error("Invalid network access identifier length: {got}")]
    InvalidNaiLength { got: usize },
}

/// Result type alias for LBP operations
pub type Result<T> = std::result::Result<T, LbpError>;
