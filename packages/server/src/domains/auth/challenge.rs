//! Challenge issue and verification.
//!
//! A challenge record lives for exactly one round: created fresh when the
//! round is issued, compared at most once, and replaced (or discarded) when
//! the round resolves. Codes never survive across rounds or attempts.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::domains::auth::code::generate_code;
use crate::domains::auth::flow::AuthFlowError;
use crate::kernel::traits::SmsSender;

/// Server-held challenge parameters for one round. Never exposed to the
/// client; the only public parameter of a round is the delivery channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Issue a fresh challenge: generate a code, deliver it over SMS, and return
/// the record to store for the round.
///
/// Delivery failure is not masked — it propagates as `DeliveryFailed` so the
/// gateway can surface an initiate failure instead of handing out a session
/// whose code never reached the user.
pub async fn issue_challenge(
    phone: &str,
    ttl_minutes: i64,
    sms: &dyn SmsSender,
) -> Result<ChallengeRecord, AuthFlowError> {
    let code = generate_code().map_err(AuthFlowError::CodeGeneration)?;
    let expires_at = Utc::now() + Duration::minutes(ttl_minutes);

    let message = format!("Your verification code is: {code}");
    sms.send_sms(phone, &message)
        .await
        .map_err(AuthFlowError::DeliveryFailed)?;

    Ok(ChallengeRecord { code, expires_at })
}

/// Verify a submitted answer against the round's challenge record.
///
/// Success requires a stored code, a non-empty answer, `now` strictly before
/// the expiry, and byte equality under a constant-time comparison (length
/// first, then an accumulated difference over all bytes). One comparison per
/// round; retries are a new round.
pub fn verify_answer(challenge: &ChallengeRecord, answer: &str, now: DateTime<Utc>) -> bool {
    if challenge.code.is_empty() || answer.is_empty() {
        return false;
    }
    if now >= challenge.expires_at {
        return false;
    }
    let expected = challenge.code.as_bytes();
    let provided = answer.as_bytes();
    if expected.len() != provided.len() {
        return false;
    }
    expected.ct_eq(provided).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str, ttl_secs: i64) -> ChallengeRecord {
        ChallengeRecord {
            code: code.to_string(),
            expires_at: Utc::now() + Duration::seconds(ttl_secs),
        }
    }

    #[test]
    fn accepts_matching_code_before_expiry() {
        let challenge = record("123456", 60);
        assert!(verify_answer(&challenge, "123456", Utc::now()));
    }

    #[test]
    fn rejects_wrong_code() {
        let challenge = record("123456", 60);
        assert!(!verify_answer(&challenge, "123457", Utc::now()));
        assert!(!verify_answer(&challenge, "654321", Utc::now()));
    }

    #[test]
    fn rejects_length_mismatch() {
        let challenge = record("123456", 60);
        assert!(!verify_answer(&challenge, "12345", Utc::now()));
        assert!(!verify_answer(&challenge, "1234567", Utc::now()));
    }

    #[test]
    fn rejects_empty_answer_or_code() {
        let challenge = record("123456", 60);
        assert!(!verify_answer(&challenge, "", Utc::now()));
        let empty = record("", 60);
        assert!(!verify_answer(&empty, "", Utc::now()));
    }

    #[test]
    fn rejects_at_and_after_expiry_even_when_equal() {
        let challenge = record("123456", 60);
        assert!(!verify_answer(&challenge, "123456", challenge.expires_at));
        assert!(!verify_answer(
            &challenge,
            "123456",
            challenge.expires_at + Duration::seconds(1)
        ));
    }

    #[test]
    fn comparison_covers_all_bytes() {
        // Structural constant-time property: a difference in the last byte is
        // rejected exactly like a difference in the first byte; the
        // comparison never short-circuits on a prefix match.
        let challenge = record("111111", 60);
        assert!(!verify_answer(&challenge, "111112", Utc::now()));
        assert!(!verify_answer(&challenge, "211111", Utc::now()));
        assert!(verify_answer(&challenge, "111111", Utc::now()));
    }
}
