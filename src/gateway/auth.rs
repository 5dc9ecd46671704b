//! HTTP Basic authentication

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hyper::header::HeaderValue;

/// `WWW-Authenticate` challenge sent with every 401
pub const CHALLENGE: &str = "Basic realm=\"MQTT Gateway\"";

/// Decode `Basic <base64(user:pass)>` into its username and password bytes
fn decode_basic(header: &HeaderValue) -> Option<(Vec<u8>, Vec<u8>)> {
    let value = header.as_bytes();
    let (scheme, token) = value.split_at(value.iter().position(|b| *b == b' ')?);
    if !scheme.eq_ignore_ascii_case(b"Basic") {
        return None;
    }

    let token = std::str::from_utf8(token).ok()?.trim();
    let decoded = STANDARD.decode(token).ok()?;

    // The password may itself contain ':'
    let colon = decoded.iter().position(|b| *b == b':')?;
    let password = decoded[colon + 1..].to_vec();
    let mut username = decoded;
    username.truncate(colon);
    Some((username, password))
}

/// Check an `Authorization` header against the configured credentials.
/// Missing or malformed headers are treated as a mismatch.
pub fn is_authorized(header: Option<&HeaderValue>, username: &str, password: &str) -> bool {
    match header.and_then(decode_basic) {
        Some((user, pass)) => user == username.as_bytes() && pass == password.as_bytes(),
        None => false,
    }
}
