use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// The one claim we care about on tokens we did not issue ourselves.
#[derive(Deserialize)]
struct ExpiryClaims {
    exp: Option<u64>,
}

/// Decodes the payload of a JWT into `T`.
///
/// There's no signature check here: whoever issued the token will validate
/// it when we present it. We only peek at claims for diagnostics.
pub fn decode_claims<T: DeserializeOwned>(token: &str) -> Result<T> {
    // Header, payload, signature.
    let components: Vec<&str> = token.split('.').collect();
    if components.len() != 3 {
        return Err(Error::Token(format!(
            "expected 3 dot-separated parts, found {}",
            components.len()
        )));
    }

    // Some issuers pad their base64 anyway.
    let encoded_payload = components[1].trim_end_matches('=');
    let decoded_payload = URL_SAFE_NO_PAD
        .decode(encoded_payload)
        .map_err(|error| Error::Token(format!("payload is not base64: {error}")))?;

    serde_json::from_slice(&decoded_payload)
        .map_err(|error| Error::Token(format!("payload is not the expected JSON: {error}")))
}

pub fn now_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

/// Seconds from `now` until `exp`, negative once expired.
pub fn seconds_until(exp: u64, now: u64) -> i64 {
    exp as i64 - now as i64
}

/// Seconds until the token expires, if it says.
pub fn expires_in(token: &str) -> Result<Option<i64>> {
    let claims: ExpiryClaims = decode_claims(token)?;
    Ok(claims.exp.map(|exp| seconds_until(exp, now_timestamp())))
}

#[cfg(test)]
pub(crate) fn encode_unsigned(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{payload}.signature")
}
