use rand::rngs::OsRng;
use rand::RngCore;

/// The number of random bytes behind every session token.
pub const SECRET_BYTES: usize = 32;
/// Length of the hex-encoded secret.
pub const SECRET_HEX_LEN: usize = SECRET_BYTES * 2;
/// Prefix of versioned composite tokens.
pub const COMPOSITE_PREFIX: &str = "sess_";

/// The shape a session token was recognised as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFormat {
    /// A bare 64-character lowercase hex string.
    Legacy,
    /// `sess_<userId>_<64 hex chars>`.
    Composite { user_id: i32 },
}

/// Generates 32 random bytes, hex-encoded to 64 lowercase characters.
pub fn generate_secret() -> String {
    let mut secret = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut secret);
    hex::encode(secret)
}

/// Generates a composite session token for `user_id`.
pub fn generate(user_id: i32) -> String {
    format!("{}{}_{}", COMPOSITE_PREFIX, user_id, generate_secret())
}

/// Recognises a token's format without touching storage.
pub fn parse(token: &str) -> Option<TokenFormat> {
    if is_secret(token) {
        return Some(TokenFormat::Legacy);
    }

    let rest = token.strip_prefix(COMPOSITE_PREFIX)?;
    let (user_id, secret) = rest.split_once('_')?;

    if user_id.is_empty() || !user_id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !is_secret(secret) {
        return None;
    }

    let user_id = user_id.parse().ok()?;
    Some(TokenFormat::Composite { user_id })
}

/// Cheap pre-filter run before any session lookup.
pub fn is_valid_format(token: &str) -> bool {
    parse(token).is_some()
}

/// A shortened form of the token that is safe to show or log.
pub fn preview(token: &str) -> String {
    let cut = token
        .char_indices()
        .nth(12)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    format!("{}…", &token[..cut])
}

fn is_secret(s: &str) -> bool {
    s.len() == SECRET_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
