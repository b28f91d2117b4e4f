//! Bearer token inspection.
//!
//! Only the `exp` claim is read; signatures are the backend's business.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};

/// Returns the `exp` claim (epoch seconds) of a three-segment JWT.
///
/// Total: any malformed input yields `None`.
pub fn decode_expiry(token: &str) -> Option<i64> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let decoded = decode_segment(payload)?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    let exp = claims.get("exp")?;

    exp.as_i64().or_else(|| {
        exp.as_f64()
            .filter(|v| v.is_finite())
            .map(|v| v.floor() as i64)
    })
}

/// Returns true if the token is expired at `now` (epoch seconds).
///
/// Tokens without a readable `exp` count as expired.
pub fn is_expired_at(token: &str, now: i64) -> bool {
    decode_expiry(token).is_none_or(|exp| exp < now)
}

/// Returns a masked version of a token for display (first 12 chars + ...).
pub fn mask_token(token: &str) -> String {
    if token.len() <= 16 || !token.is_char_boundary(12) {
        return "***".to_string();
    }
    format!("{}...", &token[..12])
}

// JWTs use unpadded base64url, but hand-built tokens show up in every variant.
fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| URL_SAFE.decode(segment))
        .or_else(|_| STANDARD.decode(segment))
        .or_else(|_| STANDARD_NO_PAD.decode(segment))
        .ok()
}

#[cfg(test)]
pub(crate) mod test_tokens {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    /// Builds an unsigned token whose payload is `claims`.
    pub fn token_with_claims(claims: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.signature")
    }

    pub fn token_expiring_at(exp: i64) -> String {
        token_with_claims(&serde_json::json!({ "sub": "user-1", "exp": exp }))
    }
}
