//! Bootstrapping slot state
//!
//! Each device being bootstrapped occupies one slot holding its handshake
//! progress, retry bookkeeping and derived keys. Slots are recycled as soon
//! as the exchange terminates or times out.

use crate::protocol::eap_psk::{PskContext, RAND_LEN};
use crate::protocol::messages::EUI64_LEN;

/// Progress of one bootstrapping exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    /// Idle, available for a new device
    #[default]
    WaitingJoin,
    /// First EAP-PSK message handed to the lower layer, confirm outstanding
    SentMsg1,
    /// Message 1 on the air, waiting for the device's message 2
    WaitingMsg2,
    /// Third message handed to the lower layer, confirm outstanding
    SentMsg3,
    /// Message 3 on the air, waiting for the device's message 4
    WaitingMsg4,
    /// ACCEPTED frame handed to the lower layer
    SentAccepted,
    /// DECLINE frame handed to the lower layer
    SentDeclined,
}

/// Outcome of matching a lower-layer confirm against a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmMatch {
    /// Confirm for the only outstanding frame; drive the state machine
    Advance,
    /// Confirm for a superseded frame; swallow it and keep waiting
    Absorbed,
    /// Not for this slot
    Stale,
}

/// Outstanding-confirm bookkeeping for one slot
///
/// A retransmission may be handed to the lower layer while the confirm for
/// the previous copy is still pending, so up to two handles can be
/// outstanding at once. Only the confirm that leaves the queue empty drives
/// the state machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfirmQueue {
    pending: u8,
    tx_handle: u8,
    pending_tx_handle: u8,
}

impl ConfirmQueue {
    /// Record a frame handed to the lower layer under `handle`
    pub fn push(&mut self, handle: u8) {
        if self.pending > 0 {
            self.pending_tx_handle = self.tx_handle;
        }
        self.tx_handle = handle;
        self.pending += 1;
    }

    /// Number of outstanding confirms
    pub fn len(&self) -> u8 {
        self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }

    /// Drop all outstanding handles
    pub fn clear(&mut self) {
        self.pending = 0;
    }

    /// Match an arriving confirm handle against the outstanding frames
    ///
    /// `active` is false while the slot is idle; an idle slot never advances,
    /// so its sole outstanding confirm is treated as stale.
    pub fn resolve(&mut self, handle: u8, active: bool) -> ConfirmMatch {
        if self.pending == 1 && handle == self.tx_handle && active {
            self.pending = 0;
            ConfirmMatch::Advance
        } else if self.pending == 2 && handle == self.pending_tx_handle {
            // Confirm for the first (superseded) request
            self.pending = 1;
            ConfirmMatch::Absorbed
        } else if self.pending == 2 && handle == self.tx_handle {
            // Confirm for the latest request; keep waiting for the first
            self.pending = 1;
            self.tx_handle = self.pending_tx_handle;
            ConfirmMatch::Absorbed
        } else {
            ConfirmMatch::Stale
        }
    }
}

/// One bootstrapping slot
#[derive(Debug, Clone)]
pub struct Slot {
    pub state: SlotState,
    /// EUI-64 of the device being bootstrapped
    pub lbd_address: [u8; EUI64_LEN],
    /// Short address of the relaying agent, `None` when talking to the
    /// device directly over extended addressing
    pub lba_address: Option<u16>,
    pub assigned_short_address: u16,
    /// Absolute millisecond deadline for the current exchange step
    pub deadline: u32,
    pub tx_attempts: u8,
    pub confirms: ConfirmQueue,
    pub media_type: u8,
    pub disable_backup: bool,
    /// Server challenge for the handshake in progress
    pub rand_s: [u8; RAND_LEN],
    /// P-CHANNEL nonce counter
    pub nonce: u32,
    pub psk_context: PskContext,
    /// Last frame handed to the lower layer, kept for retransmission
    pub last_frame: Vec<u8>,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            state: SlotState::WaitingJoin,
            lbd_address: [0xFF; EUI64_LEN],
            lba_address: None,
            assigned_short_address: 0,
            deadline: u32::MAX,
            tx_attempts: 0,
            confirms: ConfirmQueue::default(),
            media_type: 0,
            disable_backup: false,
            rand_s: [0u8; RAND_LEN],
            nonce: 0,
            psk_context: PskContext::default(),
            last_frame: Vec::new(),
        }
    }
}

impl Slot {
    /// Return the slot to the idle state, discarding keys and frames
    pub fn reset(&mut self) {
        self.state = SlotState::WaitingJoin;
        self.confirms.clear();
        self.nonce = 0;
        self.deadline = u32::MAX;
        self.psk_context = PskContext::default();
        self.last_frame.clear();
    }

    pub fn is_idle(&self) -> bool {
        self.state == SlotState::WaitingJoin
    }
}

/// Whether `deadline` lies in the past relative to `now`
///
/// The millisecond counter wraps every ~49 days; the signed difference keeps
/// comparisons correct across the wrap.
pub(crate) fn deadline_passed(now: u32, deadline: u32) -> bool {
    (deadline.wrapping_sub(now) as i32) < 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_confirm_advances() {
        let mut queue = ConfirmQueue::default();
        queue.push(5);

        assert_eq!(queue.resolve(5, true), ConfirmMatch::Advance);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_idle_slot_confirm_is_stale() {
        let mut queue = ConfirmQueue::default();
        queue.push(5);

        assert_eq!(queue.resolve(5, false), ConfirmMatch::Stale);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_unknown_handle_is_stale() {
        let mut queue = ConfirmQueue::default();
        queue.push(5);

        assert_eq!(queue.resolve(9, true), ConfirmMatch::Stale);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_superseded_confirm_first_then_latest() {
        let mut queue = ConfirmQueue::default();
        queue.push(5);
        queue.push(6); // retransmission while 5 still pending

        // Confirm for the old copy is absorbed
        assert_eq!(queue.resolve(5, true), ConfirmMatch::Absorbed);
        // Confirm for the latest copy now drives the state machine
        assert_eq!(queue.resolve(6, true), ConfirmMatch::Advance);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_superseded_confirm_latest_then_first() {
        let mut queue = ConfirmQueue::default();
        queue.push(5);
        queue.push(6);

        // Confirm for the latest copy arrives first and is absorbed; the
        // queue falls back to waiting for the older handle
        assert_eq!(queue.resolve(6, true), ConfirmMatch::Absorbed);
        assert_eq!(queue.resolve(5, true), ConfirmMatch::Advance);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_slot_reset_clears_session_material() {
        let mut slot = Slot {
            state: SlotState::WaitingMsg4,
            nonce: 3,
            deadline: 1000,
            last_frame: vec![1, 2, 3],
            ..Default::default()
        };
        slot.confirms.push(1);

        slot.reset();

        assert!(slot.is_idle());
        assert!(slot.confirms.is_empty());
        assert_eq!(slot.nonce, 0);
        assert_eq!(slot.deadline, u32::MAX);
        assert!(slot.last_frame.is_empty());
    }

    #[test]
    fn test_deadline_comparison_wraps() {
        assert!(deadline_passed(1000, 500));
        assert!(!deadline_passed(500, 1000));
        // Deadline shortly after a counter wrap, now shortly before it
        assert!(!deadline_passed(u32::MAX - 10, 10));
        // Now wrapped past the deadline
        assert!(deadline_passed(10, u32::MAX - 10));
    }
}
