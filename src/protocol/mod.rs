//! LBP wire protocol
//!
//! - [`messages`]: the outer LBP envelope (type bits, EUI-64, payload)
//! - [`eap_psk`]: the EAP-PSK handshake carried inside CHALLENGE frames
//! - [`session`]: per-device slot state and confirm bookkeeping

pub mod eap_psk;
pub mod messages;
pub mod session;

pub use eap_psk::{NetworkAccessId, PskContext};
pub use messages::{LbpFrame, LbpMessageType};
pub use session::{ConfirmQueue, Slot, SlotState};
