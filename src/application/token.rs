//! Bearer token introspection.
//!
//! The gateway does not authenticate. It only reads the subject id out of
//! a JWT payload so it can ask the user service for that user; the
//! signature is never checked here; the user service validates the token
//! it receives via the forwarded `Authorization` header.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;

/// Extract the subject id from an `Authorization: Bearer <jwt>` value.
///
/// Reads the `id` claim (string or number), falling back to `sub`.
/// Returns `None` for anything that is not a decodable bearer JWT, or when
/// the id is not usable verbatim as a single path segment.
pub fn subject_from_authorization(header: &str) -> Option<String> {
    let token = header.strip_prefix("Bearer ")?.trim();
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;

    let id = match claims.get("id").or_else(|| claims.get("sub"))? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    let path_safe = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    // "." and ".." would be normalized away as path segments
    let has_alnum = id.chars().any(|c| c.is_ascii_alphanumeric());
    if !path_safe || !has_alnum {
        return None;
    }
    Some(id)
}
