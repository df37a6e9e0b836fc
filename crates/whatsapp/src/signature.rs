use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing x-hub-signature-256 header")]
    Missing,
    #[error("malformed signature header")]
    Malformed,
    #[error("signature does not match payload")]
    Mismatch,
    #[error("verification challenge rejected")]
    ChallengeRejected,
}

/// Query string Meta sends when subscribing the webhook.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChallengeQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Echoes the challenge back only for a `subscribe` request carrying our token.
pub fn verify_challenge(query: &ChallengeQuery, expected: &SecretString) -> Result<String, SignatureError> {
    let subscribed = query.mode.as_deref() == Some("subscribe");
    let token_matches = query
        .verify_token
        .as_deref()
        .map(|token| constant_time_eq(token.as_bytes(), expected.expose_secret().as_bytes()))
        .unwrap_or(false);
    match (&query.challenge, subscribed && token_matches) {
        (Some(challenge), true) => Ok(challenge.clone()),
        _ => Err(SignatureError::ChallengeRejected),
    }
}

/// Checks `sha256=<hex>` against the HMAC of the raw body.
pub fn verify_signature(
    app_secret: &SecretString,
    body: &[u8],
    header: Option<&str>,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;
    let hex = header.trim().strip_prefix("sha256=").ok_or(SignatureError::Malformed)?;
    let expected = decode_hex(hex).ok_or(SignatureError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(app_secret.expose_secret().as_bytes())
        .map_err(|_| SignatureError::Malformed)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

/// `sha256=<hex>` header value for `body`; used by the simulator and tests.
pub fn sign(app_secret: &SecretString, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(app_secret.expose_secret().as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", encode_hex(mac.finalize().into_bytes().as_slice())))
}

fn encode_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push(HEX[(byte >> 4) as usize] as char);
        output.push(HEX[(byte & 0x0f) as usize] as char);
    }
    output
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let high = (pair[0] as char).to_digit(16)?;
            let low = (pair[1] as char).to_digit(16)?;
            Some((high * 16 + low) as u8)
        })
        .collect()
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter().zip(right).fold(0u8, |diff, (a, b)| diff | (a ^ b)) == 0
}
