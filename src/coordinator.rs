//! LBP coordinator
//!
//! Owns the bootstrapping slot pool and drives the EAP-PSK exchange with
//! each joining device: challenge out, response in, keys derived, ACCEPTED
//! or DECLINE back. The lower layer is reached through [`Transport`] and
//! time through [`Clock`]; the embedding application observes progress via
//! [`CoordinatorEvents`].

use rand::RngCore;
use tracing::{debug, warn};

use crate::crypto::provider::BLOCK_LEN;
use crate::crypto::CipherProvider;
use crate::error::{LbpError, ProtocolError};
use crate::protocol::eap_psk::{
    self, NetworkAccessId, PskContext, EAP_PSK_T1, EAP_PSK_T3, EAP_RESPONSE,
    NAI_SIZE_S_ARIB, NAI_SIZE_S_CENELEC_FCC, PCHANNEL_RESULT_DONE_SUCCESS, RAND_LEN,
};
use crate::protocol::messages::{
    self, LbpMessageType, CONF_PARAM_GMK, CONF_PARAM_GMK_ACTIVATION, CONF_PARAM_SHORT_ADDR,
    EAP_EXT_CONFIGURATION_PARAMS, EUI64_LEN,
};
use crate::protocol::session::{deadline_passed, ConfirmMatch, Slot, SlotState};
use crate::transport::{Address, Clock, ConfirmStatus, Transport};

/// Interop default PSK, replaceable through [`ParamId::Psk`]
pub const DEFAULT_PSK: [u8; BLOCK_LEN] = [
    0xAB, 0x10, 0x34, 0x11, 0x45, 0x11, 0x1B, 0xC3, 0xC1, 0x2D, 0xE8, 0xFF, 0x11, 0x14, 0x22,
    0x04,
];

/// Interop default current GMK, replaceable through [`ParamId::Gmk`]
pub const DEFAULT_GMK: [u8; BLOCK_LEN] = [
    0xAF, 0x4D, 0x6D, 0xCC, 0xF1, 0x4D, 0xE7, 0xC1, 0xC4, 0x23, 0x5E, 0x6F, 0xEF, 0x6C, 0x15,
    0x1F,
];

/// Interop default rekeying GMK, replaceable through [`ParamId::RekeyGmk`]
pub const DEFAULT_REKEY_GMK: [u8; BLOCK_LEN] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15,
    0x16,
];

const DEFAULT_IDS_CENELEC_FCC: &[u8] = &[0x81, 0x72, 0x63, 0x54, 0x45, 0x36, 0x27, 0x18];

const DEFAULT_IDS_ARIB: &[u8] = &[
    0x53, 0x4D, 0xAD, 0xB2, 0xC4, 0xD5, 0xE6, 0xFA, 0x53, 0x4D, 0xAD, 0xB2, 0xC4, 0xD5, 0xE6,
    0xFA, 0x53, 0x4D, 0xAD, 0xB2, 0xC4, 0xD5, 0xE6, 0xFA, 0x53, 0x4D, 0xAD, 0xB2, 0xC4, 0xD5,
    0xE6, 0xFA, 0x53, 0x4D,
];

/// Coordinator tuning knobs
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// ARIB band selects the long server identity and NAI sizing rules
    pub arib_band: bool,
    /// Number of devices that can bootstrap concurrently
    pub num_slots: usize,
    /// Retransmissions per exchange step before the slot is abandoned
    pub max_retries: u8,
    /// Seconds to wait for a device response or a lower-layer confirm
    pub msg_timeout_secs: u16,
    /// Hop limit handed to the lower layer on every request
    pub max_hops: u8,
    /// Keying-table index the initial GMK is written to
    pub initial_key_index: u8,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            arib_band: false,
            num_slots: 1,
            max_retries: 1,
            msg_timeout_secs: 300,
            max_hops: 8,
            initial_key_index: 0,
        }
    }
}

/// Application verdict on a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDecision {
    /// Admit the device under this short address
    Accept(u16),
    /// Refuse the device
    Decline,
    /// Decide later via [`Coordinator::assign_short_address`]
    Defer,
}

/// Upper-layer notifications
///
/// All methods have no-op defaults; without an events handler installed the
/// coordinator admits every device and assigns short addresses sequentially.
pub trait CoordinatorEvents {
    /// A device with no running exchange asked to join
    fn join_request(&mut self, lbd_address: &[u8; EUI64_LEN]) -> JoinDecision {
        let _ = lbd_address;
        JoinDecision::Defer
    }

    /// A device finished bootstrapping and holds the network key
    fn join_complete(&mut self, lbd_address: &[u8; EUI64_LEN], short_address: u16) {
        let _ = (lbd_address, short_address);
    }

    /// A joined device announced it is leaving
    fn device_left(&mut self, short_address: u16) {
        let _ = short_address;
    }
}

/// Writable / readable coordinator parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamId {
    /// Server NAI (8 bytes CENELEC/FCC, 34 bytes ARIB)
    ServerId,
    /// EAP-PSK pre-shared key, write-only
    Psk,
    /// Current GMK, write-only; writing also updates the keying table
    Gmk,
    /// GMK distributed during rekeying, write-only
    RekeyGmk,
    /// Exchange timeout in seconds, little-endian u16
    MsgTimeout,
}

/// Outcome of a parameter access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStatus {
    Success,
    InvalidLength,
    /// Parameter exists but cannot be read back
    InvalidValue,
    UnsupportedParameter,
}

/// Coordinator-side LBP session manager
pub struct Coordinator<T: Transport, C: Clock> {
    config: CoordinatorConfig,
    cipher: Box<dyn CipherProvider>,
    transport: T,
    clock: C,
    events: Option<Box<dyn CoordinatorEvents>>,
    slots: Vec<Slot>,
    psk: [u8; BLOCK_LEN],
    id_s: NetworkAccessId,
    curr_gmk: [u8; BLOCK_LEN],
    rekey_gmk: [u8; BLOCK_LEN],
    curr_key_index: u8,
    msg_timeout_secs: u16,
    rekey: bool,
    next_handle: u8,
    next_identifier: u8,
    internal_assigned_address: u16,
}

impl<T: Transport, C: Clock> Coordinator<T, C> {
    /// Create a coordinator and install the initial GMK in the keying table
    pub fn new(
        config: CoordinatorConfig,
        cipher: Box<dyn CipherProvider>,
        mut transport: T,
        clock: C,
    ) -> Self {
        let id_s = if config.arib_band {
            NetworkAccessId::from_static(DEFAULT_IDS_ARIB)
        } else {
            NetworkAccessId::from_static(DEFAULT_IDS_CENELEC_FCC)
        };

        transport.set_group_key(config.initial_key_index, &DEFAULT_GMK);

        let slots = (0..config.num_slots).map(|_| Slot::default()).collect();
        let msg_timeout_secs = config.msg_timeout_secs;
        let curr_key_index = config.initial_key_index;

        Self {
            config,
            cipher,
            transport,
            clock,
            events: None,
            slots,
            psk: DEFAULT_PSK,
            id_s,
            curr_gmk: DEFAULT_GMK,
            rekey_gmk: DEFAULT_REKEY_GMK,
            curr_key_index,
            msg_timeout_secs,
            rekey: false,
            next_handle: 0,
            next_identifier: 0,
            internal_assigned_address: 0,
        }
    }

    /// Install the upper-layer events handler
    pub fn set_events(&mut self, events: Box<dyn CoordinatorEvents>) {
        self.events = Some(events);
    }

    /// Keying-table index currently holding the active GMK
    pub fn current_key_index(&self) -> u8 {
        self.curr_key_index
    }

    /// Process an inbound LBP frame from the lower layer
    ///
    /// `security_enabled` reflects the link-layer security of the frame;
    /// devices that have not joined yet must talk in the clear.
    pub fn handle_frame(&mut self, source: &Address, nsdu: &[u8], security_enabled: bool) {
        let frame = match messages::decode(nsdu) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(%err, "dropping undecodable LBP frame");
                return;
            }
        };

        let origin = match source {
            Address::Extended(addr) => {
                if security_enabled {
                    debug!("secured frame from unjoined device, dropped");
                    return;
                }
                if *addr != frame.eui64 {
                    debug!("source address does not match LBP frame, dropped");
                    return;
                }
                if frame.msg_type != LbpMessageType::JoiningRequest {
                    debug!("non-joining frame over extended addressing, dropped");
                    return;
                }
                None
            }
            Address::Short(addr) => {
                if *addr > 0x7FFF {
                    return;
                }
                Some(*addr)
            }
        };

        let slot_idx = self.find_slot(&frame.eui64);
        if let Some(idx) = slot_idx {
            self.slots[idx].last_frame.clear();
        }

        match frame.msg_type {
            LbpMessageType::JoiningRequest => {
                if frame.payload.is_empty() {
                    self.handle_first_join(&frame, origin, slot_idx);
                    // Response goes out through address assignment
                    return;
                }
                self.handle_successive_join(&frame, slot_idx);
            }
            LbpMessageType::KickFromDevice => {}
            other => {
                debug!(?other, "unexpected LBP message at coordinator");
            }
        }

        if let Some(idx) = slot_idx {
            if !self.slots[idx].last_frame.is_empty() {
                let destination = match origin {
                    Some(addr) => Address::Short(addr),
                    None => Address::Extended(self.slots[idx].lbd_address),
                };
                self.dispatch(idx, destination, true);
            }
        }

        if frame.msg_type == LbpMessageType::KickFromDevice {
            if let (Some(addr), Some(events)) = (origin, self.events.as_deref_mut()) {
                events.device_left(addr);
            }
        }
    }

    /// Process a lower-layer confirm for a previously sent frame
    pub fn handle_confirm(&mut self, handle: u8, status: ConfirmStatus) {
        let mut matched = None;
        let mut accepted = false;

        for idx in 0..self.slots.len() {
            let slot = &mut self.slots[idx];
            let active = !slot.is_idle();
            match slot.confirms.resolve(handle, active) {
                ConfirmMatch::Advance => {
                    matched = Some(idx);
                    if status.is_success() {
                        match slot.state {
                            SlotState::SentMsg1 => slot.state = SlotState::WaitingMsg2,
                            SlotState::SentMsg3 => slot.state = SlotState::WaitingMsg4,
                            SlotState::SentAccepted => {
                                slot.state = SlotState::WaitingJoin;
                                slot.nonce = 0;
                                accepted = true;
                            }
                            _ => {
                                slot.state = SlotState::WaitingJoin;
                                slot.nonce = 0;
                            }
                        }
                    } else {
                        slot.state = SlotState::WaitingJoin;
                        slot.nonce = 0;
                    }
                    debug!(idx, state = ?slot.state, "confirm advanced slot");
                }
                ConfirmMatch::Absorbed => {
                    // Superseded frame; status intentionally ignored
                    matched = Some(idx);
                    debug!(idx, handle, "confirm absorbed");
                }
                ConfirmMatch::Stale => {}
            }
        }

        match matched {
            Some(idx) => {
                self.slots[idx].deadline = self.response_deadline();
                if accepted && status.is_success() {
                    let lbd_address = self.slots[idx].lbd_address;
                    let short_address = self.slots[idx].assigned_short_address;
                    if let Some(events) = self.events.as_deref_mut() {
                        events.join_complete(&lbd_address, short_address);
                    }
                }
            }
            None => {
                debug!(handle, "confirm does not match any exchange");
            }
        }
    }

    /// Resolve a deferred join: `Some(addr)` admits the device, `None`
    /// declines it
    pub fn assign_short_address(
        &mut self,
        lbd_address: &[u8; EUI64_LEN],
        short_address: Option<u16>,
    ) {
        let Some(idx) = self.find_slot(lbd_address) else {
            debug!(
                lbd = %hex::encode(lbd_address),
                "address assignment for unknown device, ignored"
            );
            return;
        };

        match short_address {
            Some(addr) => {
                self.slots[idx].assigned_short_address = addr;
                self.prepare_message1(idx);
                self.slots[idx].state = SlotState::SentMsg1;
            }
            None => {
                let identifier = self.take_identifier();
                let eap = eap_psk::encode_failure(identifier);
                let slot = &mut self.slots[idx];
                slot.last_frame = messages::encode_decline(
                    slot.media_type,
                    slot.disable_backup,
                    &slot.lbd_address,
                    &eap,
                );
                slot.state = SlotState::SentDeclined;
            }
        }

        if !self.slots[idx].last_frame.is_empty() {
            let destination = self.response_destination(idx);
            self.dispatch(idx, destination, true);
        }
    }

    /// Retransmit on expiry and recycle exhausted slots
    ///
    /// Call periodically; granularity only needs to be well under the
    /// exchange timeout.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();

        for idx in 0..self.slots.len() {
            {
                let slot = &self.slots[idx];
                if slot.is_idle() || !deadline_passed(now, slot.deadline) {
                    continue;
                }
            }

            if !self.slots[idx].confirms.is_empty() {
                warn!(idx, "confirm still outstanding at timeout, recycling slot");
                self.slots[idx].reset();
                continue;
            }

            if self.slots[idx].tx_attempts >= self.config.max_retries {
                debug!(idx, "retries exhausted, recycling slot");
                self.slots[idx].reset();
                continue;
            }

            {
                let slot = &mut self.slots[idx];
                slot.tx_attempts += 1;
                slot.state = match slot.state {
                    SlotState::WaitingMsg2 => SlotState::SentMsg1,
                    SlotState::WaitingMsg4 => SlotState::SentMsg3,
                    other => other,
                };
            }

            if self.slots[idx].last_frame.is_empty() {
                continue;
            }

            debug!(idx, attempt = self.slots[idx].tx_attempts, "timeout, retransmitting");
            let destination = self.response_destination(idx);
            self.dispatch(idx, destination, false);
        }
    }

    /// Push new key material to one joined device
    ///
    /// With `distribute` the full handshake re-runs and message 3 carries
    /// the rekey GMK; without it a single ACCEPTED frame activates the key
    /// previously distributed.
    pub fn rekey_device(
        &mut self,
        short_address: u16,
        lbd_address: &[u8; EUI64_LEN],
        distribute: bool,
    ) {
        let Some(idx) = self.find_slot(lbd_address) else {
            debug!("no slot available for rekeying, skipped");
            return;
        };

        {
            let slot = &mut self.slots[idx];
            slot.last_frame.clear();
            // Rekeying frames never set the media routing bits
            slot.media_type = 0;
            slot.disable_backup = false;
        }

        if distribute {
            self.slots[idx].lbd_address = *lbd_address;
            self.prepare_message1(idx);
            self.slots[idx].state = SlotState::SentMsg1;
        } else {
            let new_key_index = if self.curr_key_index == 0 { 1 } else { 0 };
            let fragment = eap_psk::encode_gmk_activation(new_key_index);
            let slot = &mut self.slots[idx];
            slot.last_frame = messages::encode_accepted(0, false, lbd_address, &fragment);
            slot.state = SlotState::SentAccepted;
        }

        self.dispatch(idx, Address::Short(short_address), true);
    }

    /// Select between distribution and activation framing for rekeying
    pub fn set_rekey_phase(&mut self, distributing: bool) {
        self.rekey = distributing;
    }

    /// Switch the network to the previously distributed rekey GMK
    pub fn activate_new_key(&mut self) {
        let new_key_index = if self.curr_key_index == 0 { 1 } else { 0 };
        self.curr_gmk = self.rekey_gmk;
        self.transport.set_group_key(new_key_index, &self.curr_gmk);
        self.curr_key_index = new_key_index;
    }

    /// Expel a joined device from the network
    pub fn kick_device(&mut self, short_address: u16, lbd_address: &[u8; EUI64_LEN]) {
        let frame = messages::encode_kick_to_device(lbd_address);
        let handle = self.take_handle();
        debug!(short_address, handle, "kicking device");
        self.transport.send(
            &Address::Short(short_address),
            &frame,
            handle,
            self.config.max_hops,
            true,
            0,
            false,
        );
    }

    /// Write a coordinator parameter
    pub fn set_param(&mut self, param: ParamId, index: u16, value: &[u8]) -> ParamStatus {
        match param {
            ParamId::ServerId => {
                if value.len() == NAI_SIZE_S_ARIB || value.len() == NAI_SIZE_S_CENELEC_FCC {
                    self.id_s = NetworkAccessId::from_static(value);
                    ParamStatus::Success
                } else {
                    ParamStatus::InvalidLength
                }
            }
            ParamId::Psk => match value.try_into() {
                Ok(key) => {
                    self.psk = key;
                    ParamStatus::Success
                }
                Err(_) => ParamStatus::InvalidLength,
            },
            ParamId::Gmk => match value.try_into() {
                Ok(key) => {
                    self.curr_gmk = key;
                    self.transport.set_group_key(index as u8, &self.curr_gmk);
                    self.curr_key_index = index as u8;
                    ParamStatus::Success
                }
                Err(_) => ParamStatus::InvalidLength,
            },
            ParamId::RekeyGmk => match value.try_into() {
                Ok(key) => {
                    self.rekey_gmk = key;
                    ParamStatus::Success
                }
                Err(_) => ParamStatus::InvalidLength,
            },
            ParamId::MsgTimeout => {
                if value.len() == 2 {
                    self.msg_timeout_secs = u16::from_le_bytes([value[0], value[1]]);
                    ParamStatus::Success
                } else {
                    ParamStatus::InvalidLength
                }
            }
        }
    }

    /// Read a coordinator parameter; key material is write-only
    pub fn get_param(&self, param: ParamId) -> Result<Vec<u8>, ParamStatus> {
        match param {
            ParamId::ServerId => Ok(self.id_s.as_slice().to_vec()),
            ParamId::MsgTimeout => Ok(self.msg_timeout_secs.to_le_bytes().to_vec()),
            ParamId::Psk | ParamId::Gmk | ParamId::RekeyGmk => Err(ParamStatus::InvalidValue),
        }
    }

    fn handle_first_join(
        &mut self,
        frame: &messages::LbpFrame<'_>,
        origin: Option<u16>,
        slot_idx: Option<usize>,
    ) {
        let Some(idx) = slot_idx else {
            debug!(
                lbd = %hex::encode(frame.eui64),
                "no slot available for join request, ignored"
            );
            return;
        };
        if !self.slots[idx].is_idle() {
            debug!(
                lbd = %hex::encode(frame.eui64),
                "join request while bootstrap in progress, ignored"
            );
            return;
        }
        debug!(lbd = %hex::encode(frame.eui64), slot = idx, "join request");

        {
            let slot = &mut self.slots[idx];
            slot.media_type = frame.media_type;
            slot.disable_backup = frame.disable_backup;
            slot.lba_address = origin;
            slot.lbd_address = frame.eui64;
        }

        let decision = match self.events.as_deref_mut() {
            Some(events) => events.join_request(&frame.eui64),
            None => {
                self.internal_assigned_address = self.internal_assigned_address.wrapping_add(1);
                JoinDecision::Accept(self.internal_assigned_address)
            }
        };

        match decision {
            JoinDecision::Accept(addr) => self.assign_short_address(&frame.eui64, Some(addr)),
            JoinDecision::Decline => self.assign_short_address(&frame.eui64, None),
            JoinDecision::Defer => {}
        }
    }

    fn handle_successive_join(&mut self, frame: &messages::LbpFrame<'_>, slot_idx: Option<usize>) {
        let Some(idx) = slot_idx else {
            debug!("handshake frame without running exchange, ignored");
            return;
        };

        {
            let slot = &mut self.slots[idx];
            slot.media_type = frame.media_type;
            slot.disable_backup = frame.disable_backup;
        }

        // Odd first byte marks non-EAP bootstrapping data; nothing to do
        if frame.payload[0] & 0x01 == 0x01 {
            return;
        }

        let eap = match eap_psk::decode_header(frame.payload) {
            Ok(eap) => eap,
            Err(err) => {
                debug!(%err, "undecodable EAP frame, aborting exchange");
                self.slots[idx].reset();
                return;
            }
        };

        if eap.code != EAP_RESPONSE {
            return;
        }

        let state = self.slots[idx].state;
        if eap.t_subfield == Some(EAP_PSK_T1)
            && matches!(state, SlotState::WaitingMsg2 | SlotState::SentMsg1)
        {
            match self.process_msg2(idx, eap.data) {
                Ok(()) => self.slots[idx].state = SlotState::SentMsg3,
                Err(err) => {
                    debug!(%err, "message 2 rejected, aborting exchange");
                    self.slots[idx].reset();
                }
            }
        } else if eap.t_subfield == Some(EAP_PSK_T3)
            && matches!(state, SlotState::WaitingMsg4 | SlotState::SentMsg3)
        {
            match self.process_msg4(idx, frame.payload, eap.data) {
                Ok(()) => self.slots[idx].state = SlotState::SentAccepted,
                Err(err) => {
                    debug!(%err, "message 4 rejected, aborting exchange");
                    self.slots[idx].reset();
                }
            }
        } else {
            debug!(?state, t = ?eap.t_subfield, "handshake step out of order, aborting");
            self.slots[idx].reset();
        }
    }

    /// Verify message 2, derive session keys and stage message 3
    fn process_msg2(&mut self, idx: usize, eap_data: &[u8]) -> Result<(), LbpError> {
        let (ak, kdk, expected_rand_s, assigned, nonce) = {
            let slot = &self.slots[idx];
            (
                slot.psk_context.ak,
                slot.psk_context.kdk,
                slot.rand_s,
                slot.assigned_short_address,
                slot.nonce,
            )
        };

        let msg2 = eap_psk::decode_message2(
            self.cipher.as_ref(),
            self.config.arib_band,
            &ak,
            &self.id_s,
            eap_data,
        )?;

        if msg2.rand_s != expected_rand_s {
            return Err(ProtocolError::RandSMismatch.into());
        }

        let (tek, msk) = eap_psk::derive_tek_msk(self.cipher.as_ref(), &kdk, &msg2.rand_p);
        let pchannel = self.build_config_params(assigned);
        let identifier = self.take_identifier();

        let eap = eap_psk::encode_message3(
            self.cipher.as_ref(),
            &ak,
            &tek,
            identifier,
            &msg2.rand_s,
            &msg2.rand_p,
            &self.id_s,
            nonce,
            PCHANNEL_RESULT_DONE_SUCCESS,
            &pchannel,
        )?;

        let slot = &mut self.slots[idx];
        slot.psk_context.tek = tek;
        slot.psk_context.msk = msk;
        slot.psk_context.rand_p = msg2.rand_p;
        slot.nonce = slot.nonce.wrapping_add(1);
        slot.last_frame = messages::encode_challenge(
            slot.media_type,
            slot.disable_backup,
            &slot.lbd_address,
            &eap,
        );
        Ok(())
    }

    /// Verify message 4 and stage the ACCEPTED frame
    fn process_msg4(
        &mut self,
        idx: usize,
        eap_message: &[u8],
        eap_data: &[u8],
    ) -> Result<(), LbpError> {
        let (tek, expected_rand_s) = {
            let slot = &self.slots[idx];
            (slot.psk_context.tek, slot.rand_s)
        };

        let decoded =
            eap_psk::decode_message4(self.cipher.as_ref(), &tek, eap_message, eap_data)?;

        if decoded.rand_s != expected_rand_s {
            return Err(ProtocolError::RandSMismatch.into());
        }

        let identifier = self.take_identifier();
        let eap = eap_psk::encode_success(identifier);
        let slot = &mut self.slots[idx];
        slot.last_frame = messages::encode_accepted(
            slot.media_type,
            slot.disable_backup,
            &slot.lbd_address,
            &eap,
        );
        Ok(())
    }

    /// P-CHANNEL configuration block for message 3
    fn build_config_params(&self, short_address: u16) -> Vec<u8> {
        let mut data = Vec::with_capacity(28);
        data.push(EAP_EXT_CONFIGURATION_PARAMS);

        if !self.rekey {
            data.push(CONF_PARAM_SHORT_ADDR);
            data.push(2);
            data.extend_from_slice(&short_address.to_be_bytes());

            data.push(CONF_PARAM_GMK);
            data.push(17);
            data.push(self.curr_key_index);
            data.extend_from_slice(&self.curr_gmk);

            data.push(CONF_PARAM_GMK_ACTIVATION);
            data.push(1);
            data.push(self.curr_key_index);
        } else {
            let new_key_index = if self.curr_key_index == 0 { 1 } else { 0 };
            data.push(CONF_PARAM_GMK);
            data.push(17);
            data.push(new_key_index);
            data.extend_from_slice(&self.rekey_gmk);
        }

        data
    }

    /// Derive fresh handshake keys and stage message 1
    fn prepare_message1(&mut self, idx: usize) {
        let (ak, kdk) = eap_psk::derive_ak_kdk(self.cipher.as_ref(), &self.psk);

        let mut rand_s = [0u8; RAND_LEN];
        rand::thread_rng().fill_bytes(&mut rand_s);

        let identifier = self.take_identifier();
        let eap = eap_psk::encode_message1(identifier, &rand_s, &self.id_s);

        let slot = &mut self.slots[idx];
        slot.psk_context = PskContext {
            ak,
            kdk,
            ..Default::default()
        };
        slot.rand_s = rand_s;
        slot.last_frame = messages::encode_challenge(
            slot.media_type,
            slot.disable_backup,
            &slot.lbd_address,
            &eap,
        );
    }

    /// Hand the slot's staged frame to the lower layer
    fn dispatch(&mut self, idx: usize, destination: Address, reset_attempts: bool) {
        let handle = self.take_handle();
        let deadline = self.response_deadline();

        let slot = &mut self.slots[idx];
        slot.confirms.push(handle);
        slot.deadline = deadline;
        if reset_attempts {
            slot.tx_attempts = 0;
        }

        debug!(idx, handle, len = slot.last_frame.len(), "lbp request");
        self.transport.send(
            &destination,
            &slot.last_frame,
            handle,
            self.config.max_hops,
            true,
            0,
            false,
        );
    }

    fn response_destination(&self, idx: usize) -> Address {
        match self.slots[idx].lba_address {
            Some(addr) => Address::Short(addr),
            None => Address::Extended(self.slots[idx].lbd_address),
        }
    }

    fn response_deadline(&self) -> u32 {
        self.clock
            .now_ms()
            .wrapping_add(1000u32.wrapping_mul(u32::from(self.msg_timeout_secs)))
    }

    /// Slot already bound to this device, or the first idle one
    fn find_slot(&self, eui64: &[u8; EUI64_LEN]) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.lbd_address == *eui64)
            .or_else(|| self.slots.iter().position(Slot::is_idle))
    }

    fn take_handle(&mut self) -> u8 {
        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1);
        handle
    }

    fn take_identifier(&mut self) -> u8 {
        let identifier = self.next_identifier;
        self.next_identifier = self.next_identifier.wrapping_add(1);
        identifier
    }
}
