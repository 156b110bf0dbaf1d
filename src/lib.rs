//! Coordinator-side G3-PLC bootstrapping (LBP) with EAP-PSK authentication
//!
//! A joining device and the coordinator run a four-message EAP-PSK
//! handshake inside LBP envelopes; on success the device receives its short
//! address and the group master key over an EAX-protected channel. This
//! crate implements the coordinator half: the slot pool tracking concurrent
//! exchanges, the handshake engine, retransmission and rekeying.
//!
//! The lower adaptation layer and the time source are injected through the
//! [`transport::Transport`] and [`transport::Clock`] traits, so the crate
//! itself performs no I/O.
//!
//! ```no_run
//! use lbp_coordinator::coordinator::{Coordinator, CoordinatorConfig};
//! use lbp_coordinator::crypto::SoftwareCipher;
//! use lbp_coordinator::transport::SystemClock;
//! # use lbp_coordinator::transport::{Address, Transport};
//! # struct Adp;
//! # impl Transport for Adp {
//! #     fn send(&mut self, _: &Address, _: &[u8], _: u8, _: u8, _: bool, _: u8, _: bool) {}
//! #     fn set_group_key(&mut self, _: u8, _: &[u8; 16]) {}
//! # }
//!
//! let mut coordinator = Coordinator::new(
//!     CoordinatorConfig::default(),
//!     Box::new(SoftwareCipher),
//!     Adp,
//!     SystemClock::new(),
//! );
//!
//! // Feed frames and confirms from the adaptation layer:
//! // coordinator.handle_frame(&source, &nsdu, security_enabled);
//! // coordinator.handle_confirm(handle, status);
//! // and drive timeouts periodically:
//! coordinator.tick();
//! ```

pub mod coordinator;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod transport;

pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorEvents, JoinDecision};
pub use error::{LbpError, Result};
pub use transport::{Address, Clock, ConfirmStatus, Transport};
