use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use subtle::ConstantTimeEq;

use qmc_kernel::error::{QmcError, QmcResult};
use qmc_se::SeSession;

use crate::types::{Role, MAX_SESSIONS};

/// Spec §4.7 "Token format": three base64url segments,
/// `header.payload.signature`, HMAC-SHA256-signed with the session's
/// own 32-byte random secret.
pub struct EncodedToken {
    pub text: String,
}

fn b64(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

fn header_json(sid: i32) -> String {
    format!(r#"{{"alg":"HS256","typ":"JWT","kid":{sid}}}"#)
}

fn payload_json(sid: i32, iat: u64, exp: u64, role: Role, device_id: &str, username: &str) -> String {
    let role_str = role.as_jwt_str();
    format!(r#"{{"sid":{sid},"iat":"{iat}","exp":"{exp}","role":"{role_str}","iss":"{device_id}","sub":"{username}"}}"#)
}

/// Builds the signed token string for a freshly created session.
pub async fn encode(
    se: &SeSession,
    sid: i32,
    iat: u64,
    exp: u64,
    role: Role,
    device_id: &str,
    username: &str,
    session_secret: &[u8],
) -> QmcResult<EncodedToken> {
    let header = b64(header_json(sid).as_bytes());
    let payload = b64(payload_json(sid, iat, exp, role, device_id, username).as_bytes());
    let signing_input = format!("{header}.{payload}");
    let tag = se.hmac_sha256(session_secret, signing_input.as_bytes()).await?;
    let text = format!("{signing_input}.{}", b64(&tag));
    Ok(EncodedToken { text })
}

/// What a validated token reveals without trusting anything from the
/// session table yet: the claimed `sid`. Everything else (role, expiry)
/// is read from the caller's own session record, never from the token's
/// payload, once the signature has verified — spec §4.7's validation
/// only uses the payload's `exp` for the final wall-clock check.
pub struct DecodedToken {
    pub sid: i32,
    pub exp: u64,
}

/// Spec §4.7 "Validation": splits on `.`, parses `kid` as an unsigned
/// decimal with no leading whitespace and `< MAX_SESSIONS`, recomputes
/// the HMAC against `session_secret` and compares in constant time,
/// then parses `exp` as a decimal-string.
pub async fn decode(se: &SeSession, token: &str, session_secret: &[u8]) -> QmcResult<DecodedToken> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(QmcError::ArgInvalid)?;
    let payload_b64 = parts.next().ok_or(QmcError::ArgInvalid)?;
    let signature_b64 = parts.next().ok_or(QmcError::ArgInvalid)?;
    if parts.next().is_some() {
        return Err(QmcError::ArgInvalid);
    }

    let header_bytes = URL_SAFE_NO_PAD.decode(header_b64).map_err(|_| QmcError::ArgInvalid)?;
    let header_text = String::from_utf8(header_bytes).map_err(|_| QmcError::ArgInvalid)?;
    let sid = parse_kid(&header_text)?;
    if !(0..MAX_SESSIONS as i32).contains(&sid) {
        return Err(QmcError::ArgInvalid);
    }

    let signing_input = format!("{header_b64}.{payload_b64}");
    let expected_tag = se.hmac_sha256(session_secret, signing_input.as_bytes()).await?;
    let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|_| QmcError::ArgInvalid)?;
    if signature.len() != expected_tag.len() || signature.as_slice().ct_eq(&expected_tag[..]).unwrap_u8() != 1 {
        return Err(QmcError::SignatureInvalid);
    }

    let payload_bytes = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| QmcError::ArgInvalid)?;
    let payload_text = String::from_utf8(payload_bytes).map_err(|_| QmcError::ArgInvalid)?;
    let exp = parse_decimal_field(&payload_text, "exp")?;

    Ok(DecodedToken { sid, exp })
}

/// Extracts `"kid":<int>` from the header JSON without a JSON parser —
/// this crate's only two record shapes are fixed-format enough that a
/// tiny hand-rolled scanner is less risk than a new dependency, matching
/// `qmc-config`'s hand-rolled shadow encoding.
fn parse_kid(header: &str) -> QmcResult<i32> {
    let marker = "\"kid\":";
    let start = header.find(marker).ok_or(QmcError::ArgInvalid)? + marker.len();
    let rest = &header[start..];
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    if end == 0 {
        return Err(QmcError::ArgInvalid);
    }
    rest[..end].parse().map_err(|_| QmcError::ArgInvalid)
}

/// Extracts a quoted decimal-string field (`"exp":"123"`), rejecting a
/// leading sign or whitespace (spec §4.7: "parses `kid`/`exp` ... with
/// no sign and no leading whitespace").
fn parse_decimal_field(payload: &str, field: &str) -> QmcResult<u64> {
    let marker = format!("\"{field}\":\"");
    let start = payload.find(&marker).ok_or(QmcError::ArgInvalid)? + marker.len();
    let rest = &payload[start..];
    let end = rest.find('"').ok_or(QmcError::ArgInvalid)?;
    let digits = &rest[..end];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(QmcError::ArgInvalid);
    }
    digits.parse().map_err(|_| QmcError::ArgInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qmc_se::EphemeralTransport;

    fn se() -> SeSession {
        SeSession::open(Box::new(EphemeralTransport::new([9u8; 32]))).unwrap()
    }

    #[tokio::test]
    async fn encode_then_decode_round_trips() {
        let se = se();
        let secret = [1u8; 32];
        let encoded = encode(&se, 3, 1_000, 2_000, Role::Operator, "dev-1", "alice", &secret).await.unwrap();
        let decoded = decode(&se, &encoded.text, &secret).await.unwrap();
        assert_eq!(decoded.sid, 3);
        assert_eq!(decoded.exp, 2000);
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let se = se();
        let encoded = encode(&se, 1, 0, 1, Role::Operator, "dev-1", "alice", &[1u8; 32]).await.unwrap();
        let err = decode(&se, &encoded.text, &[2u8; 32]).await.unwrap_err();
        assert_eq!(err, QmcError::SignatureInvalid);
    }

    #[tokio::test]
    async fn sid_out_of_range_is_rejected() {
        let se = se();
        let secret = [1u8; 32];
        let encoded = encode(&se, MAX_SESSIONS as i32 + 5, 0, 1, Role::Operator, "dev-1", "alice", &secret).await.unwrap();
        assert_eq!(decode(&se, &encoded.text, &secret).await.unwrap_err(), QmcError::ArgInvalid);
    }

    #[tokio::test]
    async fn malformed_token_is_rejected() {
        let se = se();
        assert_eq!(decode(&se, "not.a.token.extra", &[0u8; 32]).await.unwrap_err(), QmcError::ArgInvalid);
    }
}
