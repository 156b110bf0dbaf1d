//! EAP-PSK handshake engine
//!
//! Pure encode/decode and key-derivation logic for the four EAP-PSK messages
//! carried during G3 bootstrapping, including the EAX-protected P-CHANNEL
//! embedded in messages 3 and 4. No I/O and no timers; all state lives in the
//! caller's [`PskContext`].
//!
//! Both the server-side and peer-side codecs are provided, mirroring the
//! coordinator/device split of the protocol itself.

use crate::crypto::CipherProvider;
use crate::error::{CryptoError, LbpError, ProtocolError};
use crate::protocol::messages::CONF_PARAM_GMK_ACTIVATION;

/// Length of RandS / RandP and of every derived key except the MSK
pub const RAND_LEN: usize = 16;

/// Master Session Key length
pub const MSK_LEN: usize = 64;

/// EAP codes as carried on the G3 wire (left-shifted by 2 from RFC 3748)
pub const EAP_REQUEST: u8 = 0x04;
pub const EAP_RESPONSE: u8 = 0x08;
pub const EAP_SUCCESS: u8 = 0x0C;
pub const EAP_FAILURE: u8 = 0x10;

/// IANA-allocated EAP method type for EAP-PSK
pub const EAP_PSK_IANA_TYPE: u8 = 0x2F;

/// T-subfield values (top two bits of the sixth header byte)
pub const EAP_PSK_T0: u8 = 0x00 << 6;
pub const EAP_PSK_T1: u8 = 0x01 << 6;
pub const EAP_PSK_T2: u8 = 0x02 << 6;
pub const EAP_PSK_T3: u8 = 0x03 << 6;

const T_SUBFIELD_MASK: u8 = 0xC0;
const P_CHANNEL_RESULT_MASK: u8 = 0xC0;
const P_CHANNEL_EXTENSION: u8 = 0x20;

/// P-Channel result codes
pub const PCHANNEL_RESULT_CONTINUE: u8 = 0x01;
pub const PCHANNEL_RESULT_DONE_SUCCESS: u8 = 0x02;
pub const PCHANNEL_RESULT_DONE_FAILURE: u8 = 0x03;

/// Server NAI size for CENELEC and FCC bands
pub const NAI_SIZE_S_CENELEC_FCC: usize = 8;
/// Peer NAI size for CENELEC and FCC bands
pub const NAI_SIZE_P_CENELEC_FCC: usize = 8;
/// Server NAI size for the ARIB band
pub const NAI_SIZE_S_ARIB: usize = 34;
/// Maximum peer NAI size (ARIB)
pub const NAI_MAX_SIZE_P: usize = 36;

/// Length of the EAP header slice used as AEAD associated data
const AAD_HEADER_LEN: usize = 22;

/// Variable-length Network Access Identifier (server or peer identity)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkAccessId(Vec<u8>);

impl NetworkAccessId {
    /// Create an NAI, rejecting out-of-range lengths
    pub fn new(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.is_empty() || bytes.len() > NAI_MAX_SIZE_P {
            return Err(ProtocolError::InvalidNaiLength { got: bytes.len() });
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Build from identity bytes whose length is fixed at compile time
    pub(crate) fn from_static(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-session derived key material
///
/// AK/KDK are filled at handshake start, TEK/MSK once RandP is known. The
/// whole context is dropped (and rewritten with zeroes) when its slot resets.
#[derive(Debug, Clone)]
pub struct PskContext {
    /// Authentication key (MacP / MacS computation)
    pub ak: [u8; RAND_LEN],
    /// Key-derivation key
    pub kdk: [u8; RAND_LEN],
    /// Transient key protecting the P-CHANNEL
    pub tek: [u8; RAND_LEN],
    /// Master session key, reserved for upper layers
    pub msk: [u8; MSK_LEN],
    /// Server identity
    pub id_s: NetworkAccessId,
    /// Peer nonce, known after message 2
    pub rand_p: [u8; RAND_LEN],
    /// Server nonce
    pub rand_s: [u8; RAND_LEN],
}

impl Default for PskContext {
    fn default() -> Self {
        Self {
            ak: [0u8; RAND_LEN],
            kdk: [0u8; RAND_LEN],
            tek: [0u8; RAND_LEN],
            msk: [0u8; MSK_LEN],
            id_s: NetworkAccessId::default(),
            rand_p: [0u8; RAND_LEN],
            rand_s: [0u8; RAND_LEN],
        }
    }
}

/// Derive AK and KDK from the PSK
///
/// Fixed counter-style derivation: encrypt an all-zero block under the PSK,
/// then re-encrypt with the last byte XORed by 1 (AK) and by 2 (KDK). The
/// XOR deltas below are exactly those of the G3 stack; peers are not under
/// this implementation's control, so the chain must match bit for bit.
pub fn derive_ak_kdk(
    cipher: &dyn CipherProvider,
    psk: &[u8; RAND_LEN],
) -> ([u8; RAND_LEN], [u8; RAND_LEN]) {
    let mut res = cipher.aes_ecb_encrypt(psk, &[0u8; RAND_LEN]);

    res[15] ^= 0x01;
    let ak = cipher.aes_ecb_encrypt(psk, &res);

    // 3 rather than 2: the previous XOR is still applied
    res[15] ^= 0x03;
    let kdk = cipher.aes_ecb_encrypt(psk, &res);

    (ak, kdk)
}

/// Derive TEK and the 64-byte MSK once RandP is known
pub fn derive_tek_msk(
    cipher: &dyn CipherProvider,
    kdk: &[u8; RAND_LEN],
    rand_p: &[u8; RAND_LEN],
) -> ([u8; RAND_LEN], [u8; MSK_LEN]) {
    let mut res = cipher.aes_ecb_encrypt(kdk, rand_p);

    res[15] ^= 0x01;
    let tek = cipher.aes_ecb_encrypt(kdk, &res);
    res[15] ^= 0x01;

    let mut msk = [0u8; MSK_LEN];
    for idx in 0..4u8 {
        res[15] ^= idx + 2;
        let block = cipher.aes_ecb_encrypt(kdk, &res);
        msk[usize::from(idx) * RAND_LEN..(usize::from(idx) + 1) * RAND_LEN]
            .copy_from_slice(&block);
        res[15] ^= idx + 2;
    }

    (tek, msk)
}

/// Outer EAP header fields shared by every handshake message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EapFrame<'a> {
    pub code: u8,
    pub identifier: u8,
    /// T-subfield, present only on EAP-PSK method frames
    pub t_subfield: Option<u8>,
    /// Method payload following the T byte
    pub data: &'a [u8],
}

/// Decode the outer EAP header of an inbound frame
///
/// A length field claiming more octets than received is a silent-discard
/// condition per the EAP specification.
pub fn decode_header(message: &[u8]) -> Result<EapFrame<'_>, ProtocolError> {
    if message.len() < 4 {
        return Err(ProtocolError::InvalidMessageLength {
            expected: 4,
            got: message.len(),
        });
    }

    let code = message[0];
    let identifier = message[1];
    let claimed = usize::from(u16::from_be_bytes([message[2], message[3]]));

    if claimed > message.len() {
        return Err(ProtocolError::LengthFieldOverrun {
            claimed,
            received: message.len(),
        });
    }

    if claimed < 6 {
        // EAP-Success / EAP-Failure carry no method payload
        return Ok(EapFrame {
            code,
            identifier,
            t_subfield: None,
            data: &[],
        });
    }

    if message[4] != EAP_PSK_IANA_TYPE {
        return Err(ProtocolError::InvalidMessageType {
            msg_type: message[4],
        });
    }

    Ok(EapFrame {
        code,
        identifier,
        t_subfield: Some(message[5] & T_SUBFIELD_MASK),
        data: &message[6..claimed],
    })
}

fn push_header(buf: &mut Vec<u8>, code: u8, identifier: u8, t: u8) {
    buf.push(code);
    buf.push(identifier);
    buf.extend_from_slice(&[0, 0]); // length, patched last
    buf.push(EAP_PSK_IANA_TYPE);
    buf.push(t);
}

fn patch_length(buf: &mut [u8]) {
    let len = buf.len() as u16;
    buf[2..4].copy_from_slice(&len.to_be_bytes());
}

/// Build the 16-byte EAX nonce from the 32-bit message nonce (big endian)
fn aead_nonce(nonce: u32) -> [u8; RAND_LEN] {
    let mut out = [0u8; RAND_LEN];
    out[12..16].copy_from_slice(&nonce.to_be_bytes());
    out
}

/// Copy the leading EAP header and right-shift the Code field by two bits
///
/// G3 frames carry the code pre-shifted; the authentication tag is computed
/// over the RFC-compliant header. The shift is a framing shim, applied
/// symmetrically on encode and decode, and must not be altered.
fn aad_header(message: &[u8]) -> [u8; AAD_HEADER_LEN] {
    let mut header = [0u8; AAD_HEADER_LEN];
    header.copy_from_slice(&message[..AAD_HEADER_LEN]);
    header[0] >>= 2;
    header
}

/// Encode the first EAP-PSK message (coordinator -> device)
pub fn encode_message1(
    identifier: u8,
    rand_s: &[u8; RAND_LEN],
    id_s: &NetworkAccessId,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(6 + RAND_LEN + id_s.len());
    push_header(&mut buf, EAP_REQUEST, identifier, EAP_PSK_T0);
    buf.extend_from_slice(rand_s);
    buf.extend_from_slice(id_s.as_slice());
    patch_length(&mut buf);
    buf
}

/// Decoded first message (device side)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message1 {
    pub rand_s: [u8; RAND_LEN],
    pub id_s: NetworkAccessId,
}

/// Decode the first message's method payload (device side)
pub fn decode_message1(data: &[u8]) -> Result<Message1, ProtocolError> {
    if data.len() < RAND_LEN {
        return Err(ProtocolError::InvalidMessageLength {
            expected: RAND_LEN,
            got: data.len(),
        });
    }

    let mut rand_s = [0u8; RAND_LEN];
    rand_s.copy_from_slice(&data[..RAND_LEN]);
    let id_s = NetworkAccessId::new(&data[RAND_LEN..])?;

    Ok(Message1 { rand_s, id_s })
}

/// Encode the second EAP-PSK message (device -> coordinator)
///
/// `MacP = CMAC-AES-128(AK, IdP || IdS || RandS || RandP)`.
pub fn encode_message2(
    cipher: &dyn CipherProvider,
    ak: &[u8; RAND_LEN],
    identifier: u8,
    rand_s: &[u8; RAND_LEN],
    rand_p: &[u8; RAND_LEN],
    id_s: &NetworkAccessId,
    id_p: &NetworkAccessId,
) -> Vec<u8> {
    let mut seed = Vec::with_capacity(id_p.len() + id_s.len() + 2 * RAND_LEN);
    seed.extend_from_slice(id_p.as_slice());
    seed.extend_from_slice(id_s.as_slice());
    seed.extend_from_slice(rand_s);
    seed.extend_from_slice(rand_p);
    let mac_p = cipher.cmac_aes128(ak, &seed);

    let mut buf = Vec::with_capacity(6 + 3 * RAND_LEN + id_p.len());
    push_header(&mut buf, EAP_RESPONSE, identifier, EAP_PSK_T1);
    buf.extend_from_slice(rand_s);
    buf.extend_from_slice(rand_p);
    buf.extend_from_slice(&mac_p);
    buf.extend_from_slice(id_p.as_slice());
    patch_length(&mut buf);
    buf
}

/// Decoded second message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message2 {
    pub rand_s: [u8; RAND_LEN],
    pub rand_p: [u8; RAND_LEN],
    pub id_p: NetworkAccessId,
}

/// Decode and authenticate the second message's method payload
///
/// The peer NAI length is fixed per band except in ARIB, where it is derived
/// from the total length and clamped to the maximum.
pub fn decode_message2(
    cipher: &dyn CipherProvider,
    arib_band: bool,
    ak: &[u8; RAND_LEN],
    id_s: &NetworkAccessId,
    data: &[u8],
) -> Result<Message2, ProtocolError> {
    let min_len = if arib_band { 49 } else { 56 };
    if data.len() < min_len {
        return Err(ProtocolError::InvalidMessageLength {
            expected: min_len,
            got: data.len(),
        });
    }

    let id_p_len = if arib_band {
        (data.len() - 48).min(NAI_MAX_SIZE_P)
    } else {
        NAI_SIZE_P_CENELEC_FCC
    };

    let mut rand_s = [0u8; RAND_LEN];
    rand_s.copy_from_slice(&data[..RAND_LEN]);
    let mut rand_p = [0u8; RAND_LEN];
    rand_p.copy_from_slice(&data[RAND_LEN..2 * RAND_LEN]);
    let mac_p = &data[2 * RAND_LEN..3 * RAND_LEN];
    let id_p = NetworkAccessId::new(&data[3 * RAND_LEN..3 * RAND_LEN + id_p_len])?;

    let mut seed = Vec::with_capacity(id_p.len() + id_s.len() + 2 * RAND_LEN);
    seed.extend_from_slice(id_p.as_slice());
    seed.extend_from_slice(id_s.as_slice());
    seed.extend_from_slice(&rand_s);
    seed.extend_from_slice(&rand_p);
    let expected = cipher.cmac_aes128(ak, &seed);

    if expected != mac_p {
        return Err(ProtocolError::MacVerificationFailed);
    }

    Ok(Message2 {
        rand_s,
        rand_p,
        id_p,
    })
}

fn encode_protected(
    cipher: &dyn CipherProvider,
    tek: &[u8; RAND_LEN],
    mut buf: Vec<u8>,
    nonce: u32,
    result: u8,
    pchannel_data: &[u8],
) -> Result<Vec<u8>, LbpError> {
    buf.extend_from_slice(&nonce.to_be_bytes());

    let tag_offset = buf.len();
    buf.extend_from_slice(&[0u8; 16]); // tag, patched after sealing

    let mut protected = Vec::with_capacity(1 + pchannel_data.len());
    if pchannel_data.is_empty() {
        protected.push(result << 6);
    } else {
        protected.push((result << 6) | P_CHANNEL_EXTENSION);
        protected.extend_from_slice(pchannel_data);
    }

    let total = buf.len() + protected.len();
    buf[2..4].copy_from_slice(&(total as u16).to_be_bytes());

    let aad = aad_header(&buf);
    let (ciphertext, tag) = cipher.eax_encrypt(tek, &aead_nonce(nonce), &aad, &protected)?;

    buf[tag_offset..tag_offset + 16].copy_from_slice(&tag);
    buf.extend_from_slice(&ciphertext);
    Ok(buf)
}

/// Encode the third EAP-PSK message (coordinator -> device)
///
/// Carries `MacS = CMAC-AES-128(AK, IdS || RandP)` and the EAX-protected
/// P-CHANNEL with the assigned address and key material.
#[allow(clippy::too_many_arguments)]
pub fn encode_message3(
    cipher: &dyn CipherProvider,
    ak: &[u8; RAND_LEN],
    tek: &[u8; RAND_LEN],
    identifier: u8,
    rand_s: &[u8; RAND_LEN],
    rand_p: &[u8; RAND_LEN],
    id_s: &NetworkAccessId,
    nonce: u32,
    result: u8,
    pchannel_data: &[u8],
) -> Result<Vec<u8>, LbpError> {
    let mut seed = Vec::with_capacity(id_s.len() + RAND_LEN);
    seed.extend_from_slice(id_s.as_slice());
    seed.extend_from_slice(rand_p);
    let mac_s = cipher.cmac_aes128(ak, &seed);

    let mut buf = Vec::with_capacity(59 + pchannel_data.len());
    push_header(&mut buf, EAP_REQUEST, identifier, EAP_PSK_T2);
    buf.extend_from_slice(rand_s);
    buf.extend_from_slice(&mac_s);

    encode_protected(cipher, tek, buf, nonce, result, pchannel_data)
}

/// Decoded P-CHANNEL contents of message 3 or 4
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedChannel {
    pub rand_s: [u8; RAND_LEN],
    pub nonce: u32,
    pub result: u8,
    pub data: Vec<u8>,
}

fn decode_protected(
    cipher: &dyn CipherProvider,
    tek: &[u8; RAND_LEN],
    header: &[u8],
    rand_s: [u8; RAND_LEN],
    wire: &[u8],
) -> Result<ProtectedChannel, LbpError> {
    if header.len() < AAD_HEADER_LEN {
        return Err(ProtocolError::InvalidMessageLength {
            expected: AAD_HEADER_LEN,
            got: header.len(),
        }
        .into());
    }

    let nonce = u32::from_be_bytes([wire[0], wire[1], wire[2], wire[3]]);
    let mut tag = [0u8; 16];
    tag.copy_from_slice(&wire[4..20]);
    let ciphertext = &wire[20..];

    let aad = aad_header(header);
    let protected = cipher.eax_decrypt(tek, &aead_nonce(nonce), &aad, ciphertext, &tag)?;

    if protected.is_empty() {
        return Err(CryptoError::Decryption.into());
    }

    Ok(ProtectedChannel {
        rand_s,
        nonce,
        result: (protected[0] & P_CHANNEL_RESULT_MASK) >> 6,
        data: protected[1..].to_vec(),
    })
}

/// Decode the third message's method payload (device side)
///
/// `header` is the leading 22 bytes of the full EAP message, used as AEAD
/// associated data. MacS is verified against the context's IdS and RandP.
pub fn decode_message3(
    cipher: &dyn CipherProvider,
    context: &PskContext,
    header: &[u8],
    data: &[u8],
) -> Result<ProtectedChannel, LbpError> {
    if data.len() < 59 {
        return Err(ProtocolError::InvalidMessageLength {
            expected: 59,
            got: data.len(),
        }
        .into());
    }

    let mut rand_s = [0u8; RAND_LEN];
    rand_s.copy_from_slice(&data[..RAND_LEN]);

    let mut seed = Vec::with_capacity(context.id_s.len() + RAND_LEN);
    seed.extend_from_slice(context.id_s.as_slice());
    seed.extend_from_slice(&context.rand_p);
    let expected = cipher.cmac_aes128(&context.ak, &seed);

    if expected[..] != data[RAND_LEN..2 * RAND_LEN] {
        return Err(ProtocolError::MacVerificationFailed.into());
    }

    decode_protected(cipher, &context.tek, header, rand_s, &data[2 * RAND_LEN..])
}

/// Encode the fourth EAP-PSK message (device -> coordinator)
pub fn encode_message4(
    cipher: &dyn CipherProvider,
    tek: &[u8; RAND_LEN],
    identifier: u8,
    rand_s: &[u8; RAND_LEN],
    nonce: u32,
    result: u8,
    pchannel_data: &[u8],
) -> Result<Vec<u8>, LbpError> {
    let mut buf = Vec::with_capacity(43 + pchannel_data.len());
    push_header(&mut buf, EAP_RESPONSE, identifier, EAP_PSK_T3);
    buf.extend_from_slice(rand_s);

    encode_protected(cipher, tek, buf, nonce, result, pchannel_data)
}

/// Decode the fourth message's method payload (coordinator side)
pub fn decode_message4(
    cipher: &dyn CipherProvider,
    tek: &[u8; RAND_LEN],
    header: &[u8],
    data: &[u8],
) -> Result<ProtectedChannel, LbpError> {
    if data.len() < 41 {
        return Err(ProtocolError::InvalidMessageLength {
            expected: 41,
            got: data.len(),
        }
        .into());
    }

    let mut rand_s = [0u8; RAND_LEN];
    rand_s.copy_from_slice(&data[..RAND_LEN]);

    decode_protected(cipher, tek, header, rand_s, &data[RAND_LEN..])
}

/// Encode an EAP-Success terminator
pub fn encode_success(identifier: u8) -> Vec<u8> {
    vec![EAP_SUCCESS, identifier, 0x00, 0x04]
}

/// Encode an EAP-Failure terminator
pub fn encode_failure(identifier: u8) -> Vec<u8> {
    vec![EAP_FAILURE, identifier, 0x00, 0x04]
}

/// Encode the GMK-activation P-CHANNEL fragment used during rekeying
pub fn encode_gmk_activation(key_index: u8) -> Vec<u8> {
    vec![CONF_PARAM_GMK_ACTIVATION, 0x01, key_index]
}
