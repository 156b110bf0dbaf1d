//! LBP envelope codec
//!
//! Every bootstrapping exchange travels inside a small LBP envelope: a
//! two-byte header carrying the message type and media routing bits, the
//! device EUI-64, and an opaque payload (usually an EAP message).

use crate::error::ProtocolError;

/// EUI-64 length
pub const EUI64_LEN: usize = 8;

/// Envelope header plus EUI-64
pub const LBP_HEADER_LEN: usize = 10;

/// Extension-field marker introducing configuration parameters
pub const EAP_EXT_CONFIGURATION_PARAMS: u8 = 0x02;

/// Configuration parameter: assigned 16-bit short address (length 2)
pub const CONF_PARAM_SHORT_ADDR: u8 = 0x1D;
/// Configuration parameter: GMK key-index plus 16-byte key (length 17)
pub const CONF_PARAM_GMK: u8 = 0x27;
/// Configuration parameter: GMK activation by key index (length 1)
pub const CONF_PARAM_GMK_ACTIVATION: u8 = 0x2B;

/// LBP message type nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LbpMessageType {
    /// Device asks to join (device -> coordinator)
    JoiningRequest = 0x01,
    /// Device announces it is leaving (device -> coordinator)
    KickFromDevice = 0x04,
    /// Bootstrap finished successfully (coordinator -> device)
    Accepted = 0x09,
    /// Handshake message requiring a response (coordinator -> device)
    Challenge = 0x0A,
    /// Bootstrap refused (coordinator -> device)
    Decline = 0x0B,
    /// Coordinator expels the device (coordinator -> device)
    KickToDevice = 0x0C,
}

impl TryFrom<u8> for LbpMessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::JoiningRequest),
            0x04 => Ok(Self::KickFromDevice),
            0x09 => Ok(Self::Accepted),
            0x0A => Ok(Self::Challenge),
            0x0B => Ok(Self::Decline),
            0x0C => Ok(Self::KickToDevice),
            other => Err(ProtocolError::InvalidMessageType { msg_type: other }),
        }
    }
}

/// Decoded LBP envelope, payload borrowed from the receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LbpFrame<'a> {
    pub msg_type: LbpMessageType,
    /// Medium the originator used (0 PLC, 1 RF on hybrid stacks)
    pub media_type: u8,
    /// Originator requests the backup medium stay unused
    pub disable_backup: bool,
    pub eui64: [u8; EUI64_LEN],
    pub payload: &'a [u8],
}

/// Decode an inbound LBP frame
pub fn decode(frame: &[u8]) -> Result<LbpFrame<'_>, ProtocolError> {
    if frame.len() < LBP_HEADER_LEN {
        return Err(ProtocolError::InvalidMessageLength {
            expected: LBP_HEADER_LEN,
            got: frame.len(),
        });
    }

    let msg_type = LbpMessageType::try_from(frame[0] >> 4)?;
    let mut eui64 = [0u8; EUI64_LEN];
    eui64.copy_from_slice(&frame[2..10]);

    Ok(LbpFrame {
        msg_type,
        media_type: (frame[0] >> 3) & 0x01,
        disable_backup: (frame[0] >> 2) & 0x01 != 0,
        eui64,
        payload: &frame[LBP_HEADER_LEN..],
    })
}

fn encode(
    msg_type: LbpMessageType,
    media_type: u8,
    disable_backup: bool,
    eui64: &[u8; EUI64_LEN],
    payload: &[u8],
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(LBP_HEADER_LEN + payload.len());
    buf.push(
        ((msg_type as u8) << 4) | ((media_type & 0x01) << 3) | (u8::from(disable_backup) << 2),
    );
    buf.push(0x00); // reserved, always zero on the wire
    buf.extend_from_slice(eui64);
    buf.extend_from_slice(payload);
    buf
}

/// Encode a CHALLENGE envelope around an EAP request
pub fn encode_challenge(
    media_type: u8,
    disable_backup: bool,
    eui64: &[u8; EUI64_LEN],
    eap: &[u8],
) -> Vec<u8> {
    encode(LbpMessageType::Challenge, media_type, disable_backup, eui64, eap)
}

/// Encode an ACCEPTED envelope (EAP-Success payload)
pub fn encode_accepted(
    media_type: u8,
    disable_backup: bool,
    eui64: &[u8; EUI64_LEN],
    eap: &[u8],
) -> Vec<u8> {
    encode(LbpMessageType::Accepted, media_type, disable_backup, eui64, eap)
}

/// Encode a DECLINE envelope (EAP-Failure payload)
pub fn encode_decline(
    media_type: u8,
    disable_backup: bool,
    eui64: &[u8; EUI64_LEN],
    eap: &[u8],
) -> Vec<u8> {
    encode(LbpMessageType::Decline, media_type, disable_backup, eui64, eap)
}

/// Encode a KICK addressed to a device; carries no payload
pub fn encode_kick_to_device(eui64: &[u8; EUI64_LEN]) -> Vec<u8> {
    encode(LbpMessageType::KickToDevice, 0, false, eui64, &[])
}

/// Encode a JOINING request (device side)
pub fn encode_joining(
    media_type: u8,
    disable_backup: bool,
    eui64: &[u8; EUI64_LEN],
    eap: &[u8],
) -> Vec<u8> {
    encode(LbpMessageType::JoiningRequest, media_type, disable_backup, eui64, eap)
}

/// Encode a KICK announcement from a device (device side)
pub fn encode_kick_from_device(eui64: &[u8; EUI64_LEN]) -> Vec<u8> {
    encode(LbpMessageType::KickFromDevice, 0, false, eui64, &[])
}
