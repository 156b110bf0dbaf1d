//! Lower-layer capabilities
//!
//! The coordinator drives an adaptation layer it does not own: frames go
//! down as LBP requests and come back as confirms, and group keys are
//! written into the MAC keying table. Both concerns are behind traits so
//! tests can run against in-memory fakes.

use std::time::Instant;

use crate::crypto::provider::BLOCK_LEN;
use crate::protocol::messages::EUI64_LEN;

/// Destination of an outbound LBP frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    /// 16-bit short address of a joined device or agent
    Short(u16),
    /// EUI-64, used while the device has no short address yet
    Extended([u8; EUI64_LEN]),
}

/// Delivery status reported by the lower layer for a sent frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmStatus {
    Success,
    Failure,
}

impl ConfirmStatus {
    pub fn is_success(self) -> bool {
        self == ConfirmStatus::Success
    }
}

/// Adaptation-layer services used by the coordinator
pub trait Transport {
    /// Hand an LBP frame to the lower layer
    ///
    /// `handle` identifies the frame in the matching confirm. LBP frames
    /// travel unsecured; `security_enabled` is part of the lower-layer
    /// request surface and stays available to embedders.
    #[allow(clippy::too_many_arguments)]
    fn send(
        &mut self,
        destination: &Address,
        payload: &[u8],
        handle: u8,
        max_hops: u8,
        discover_route: bool,
        qos: u8,
        security_enabled: bool,
    );

    /// Install a GMK in the keying table and make its index the active one
    fn set_group_key(&mut self, key_index: u8, key: &[u8; BLOCK_LEN]);
}

/// Millisecond time source
///
/// The counter wraps naturally at `u32::MAX`; deadline comparisons are done
/// with wrapping arithmetic.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// [`Clock`] backed by the process monotonic clock
#[derive(Debug)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }
}
