//! NTLM message encoding (MS-NLMP), NTLMv2 responses only.

use crate::primitives::{hmac_md5, md4};
use crate::AuthError;

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const NEGOTIATE_OEM: u32 = 0x0000_0002;
const REQUEST_TARGET: u32 = 0x0000_0004;
const NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEGOTIATE_EXTENDED_SESSIONSECURITY: u32 = 0x0008_0000;
const NEGOTIATE_TARGET_INFO: u32 = 0x0080_0000;
const NEGOTIATE_128: u32 = 0x2000_0000;
const NEGOTIATE_56: u32 = 0x8000_0000;

const NEGOTIATE_FLAGS: u32 = NEGOTIATE_UNICODE
    | NEGOTIATE_OEM
    | REQUEST_TARGET
    | NEGOTIATE_NTLM
    | NEGOTIATE_ALWAYS_SIGN
    | NEGOTIATE_EXTENDED_SESSIONSECURITY
    | NEGOTIATE_TARGET_INFO
    | NEGOTIATE_128
    | NEGOTIATE_56;

/// AV pair id of the server timestamp in the target info block.
const MSV_AV_TIMESTAMP: u16 = 7;
const MSV_AV_EOL: u16 = 0;

/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_EPOCH_OFFSET: u64 = 11_644_473_600;

/// Credentials used to answer a challenge.
#[derive(Debug, Clone, Default)]
pub(crate) struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: String,
    pub workstation: String,
}

impl Credentials {
    /// Split a `DOMAIN\user` username unless a domain is given explicitly.
    pub fn new(username: &str, password: &str, domain: &str, workstation: &str) -> Self {
        let (domain, username) = match username.split_once('\\') {
            Some((prefix, user)) if domain.is_empty() => (prefix, user),
            _ => (domain, username),
        };
        Self {
            username: username.to_owned(),
            password: password.to_owned(),
            domain: domain.to_owned(),
            workstation: workstation.to_owned(),
        }
    }
}

fn utf16le(value: &str) -> Vec<u8> {
    value.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let slice = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([slice[0], slice[1]]))
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let slice = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

/// Contents of the security buffer descriptor at `offset`.
fn read_buffer(bytes: &[u8], offset: usize) -> Option<&[u8]> {
    let len = usize::from(read_u16(bytes, offset)?);
    let start = usize::try_from(read_u32(bytes, offset + 4)?).ok()?;
    bytes.get(start..start.checked_add(len)?)
}

/// Type 1 message.
pub(crate) fn negotiate_message() -> Vec<u8> {
    let mut message = Vec::with_capacity(32);
    message.extend_from_slice(SIGNATURE);
    message.extend_from_slice(&1u32.to_le_bytes());
    message.extend_from_slice(&NEGOTIATE_FLAGS.to_le_bytes());
    // Empty domain and workstation buffers.
    for _ in 0..2 {
        message.extend_from_slice(&0u16.to_le_bytes());
        message.extend_from_slice(&0u16.to_le_bytes());
        message.extend_from_slice(&32u32.to_le_bytes());
    }
    message
}

/// Type 2 message sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChallengeMessage {
    pub flags: u32,
    pub server_challenge: [u8; 8],
    pub target_info: Vec<u8>,
}

impl ChallengeMessage {
    pub fn parse(bytes: &[u8]) -> Result<Self, AuthError> {
        let invalid = |reason: &str| AuthError::InvalidChallenge(format!("NTLM type 2 message {reason}"));

        if bytes.get(..8) != Some(&SIGNATURE[..]) {
            return Err(invalid("has no NTLMSSP signature"));
        }
        if read_u32(bytes, 8) != Some(2) {
            return Err(invalid("has the wrong message type"));
        }
        let flags = read_u32(bytes, 20).ok_or_else(|| invalid("is truncated"))?;
        let server_challenge: [u8; 8] = bytes
            .get(24..32)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| invalid("is truncated"))?;
        let target_info = if bytes.len() >= 48 {
            read_buffer(bytes, 40)
                .ok_or_else(|| invalid("has a target info buffer out of bounds"))?
                .to_vec()
        } else {
            Vec::new()
        };

        Ok(Self {
            flags,
            server_challenge,
            target_info,
        })
    }

    /// Server timestamp from the target info, if the server sent one.
    pub fn timestamp(&self) -> Option<u64> {
        let info = &self.target_info;
        let mut offset = 0;
        while let (Some(id), Some(len)) = (read_u16(info, offset), read_u16(info, offset + 2)) {
            let value = info.get(offset + 4..offset + 4 + usize::from(len))?;
            match id {
                MSV_AV_EOL => return None,
                MSV_AV_TIMESTAMP => return Some(u64::from_le_bytes(value.try_into().ok()?)),
                _ => offset += 4 + usize::from(len),
            }
        }
        None
    }
}

/// Current time as a Windows FILETIME.
pub(crate) fn filetime_now() -> u64 {
    let unix = chrono::Utc::now().timestamp();
    let seconds = u64::try_from(unix).unwrap_or_default() + FILETIME_EPOCH_OFFSET;
    seconds * 10_000_000
}

/// NTLMv2 hash of the credentials.
pub(crate) fn ntowf_v2(credentials: &Credentials) -> Vec<u8> {
    let nt_hash = md4(&utf16le(&credentials.password));
    let identity = format!("{}{}", credentials.username.to_uppercase(), credentials.domain);
    hmac_md5(&nt_hash, &utf16le(&identity))
}

/// LMv2 and NTLMv2 responses to a challenge.
pub(crate) fn ntlm_v2_responses(
    credentials: &Credentials,
    challenge: &ChallengeMessage,
    client_challenge: [u8; 8],
    timestamp: u64,
) -> (Vec<u8>, Vec<u8>) {
    let key = ntowf_v2(credentials);

    let mut blob = vec![0x01, 0x01, 0, 0, 0, 0, 0, 0];
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(&client_challenge);
    blob.extend_from_slice(&[0; 4]);
    blob.extend_from_slice(&challenge.target_info);
    blob.extend_from_slice(&[0; 4]);

    let mut nt_input = challenge.server_challenge.to_vec();
    nt_input.extend_from_slice(&blob);
    let mut nt_response = hmac_md5(&key, &nt_input);
    nt_response.extend_from_slice(&blob);

    let mut lm_input = challenge.server_challenge.to_vec();
    lm_input.extend_from_slice(&client_challenge);
    let mut lm_response = hmac_md5(&key, &lm_input);
    lm_response.extend_from_slice(&client_challenge);

    (lm_response, nt_response)
}

/// Type 3 message answering `challenge`.
pub(crate) fn authenticate_message(
    credentials: &Credentials,
    challenge: &ChallengeMessage,
    client_challenge: [u8; 8],
    timestamp: u64,
) -> Result<Vec<u8>, AuthError> {
    let (lm_response, nt_response) =
        ntlm_v2_responses(credentials, challenge, client_challenge, timestamp);

    let unicode = challenge.flags & NEGOTIATE_UNICODE != 0;
    let encode = |value: &str| {
        if unicode {
            utf16le(value)
        } else {
            value.as_bytes().to_vec()
        }
    };
    let payloads = [
        lm_response,
        nt_response,
        encode(&credentials.domain),
        encode(&credentials.username),
        encode(&credentials.workstation),
        Vec::new(),
    ];

    const HEADER_LEN: usize = 64;
    let mut message = Vec::with_capacity(HEADER_LEN + payloads.iter().map(Vec::len).sum::<usize>());
    message.extend_from_slice(SIGNATURE);
    message.extend_from_slice(&3u32.to_le_bytes());

    let mut offset = HEADER_LEN;
    for payload in &payloads {
        let len = u16::try_from(payload.len())
            .map_err(|_| AuthError::Other("NTLM field too long".into()))?;
        let start = u32::try_from(offset).map_err(|_| AuthError::Other("NTLM message too long".into()))?;
        message.extend_from_slice(&len.to_le_bytes());
        message.extend_from_slice(&len.to_le_bytes());
        message.extend_from_slice(&start.to_le_bytes());
        offset += payload.len();
    }
    let flags = (challenge.flags & NEGOTIATE_FLAGS) | NEGOTIATE_NTLM;
    message.extend_from_slice(&flags.to_le_bytes());

    for payload in &payloads {
        message.extend_from_slice(payload);
    }
    Ok(message)
}
