//! Login flow orchestration.
//!
//! `initiate` opens a login attempt: checks the identity, issues the first
//! challenge round, and persists the session behind an opaque handle.
//! `respond` runs one round: verifies the answer against the stored
//! challenge, appends the outcome to the transcript, and lets the session
//! state machine decide whether to mint tokens, terminate, or issue a fresh
//! code.
//!
//! Every error variant here is internally distinct (telemetry needs that);
//! the gateway collapses them to the opaque wire failures.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::common::is_e164;
use crate::domains::auth::challenge::{issue_challenge, verify_answer};
use crate::domains::auth::jwt::TokenBundle;
use crate::domains::auth::session::{self, ChallengeKind, ChallengeRound, SessionState};
use crate::domains::auth::store::LoginSession;
use crate::kernel::traits::StoreError;
use crate::kernel::ServerDeps;

#[derive(Debug, thiserror::Error)]
pub enum AuthFlowError {
    #[error("not a valid E.164 phone number")]
    InvalidPhone,

    #[error("identity is not registered")]
    UnknownIdentity,

    #[error("code generation failed: {0}")]
    CodeGeneration(#[source] anyhow::Error),

    #[error("code delivery failed: {0}")]
    DeliveryFailed(#[source] anyhow::Error),

    #[error("login session missing or expired")]
    SessionNotFound,

    #[error("submitted code rejected")]
    CodeRejected,

    #[error("challenge attempt budget exhausted")]
    TooManyAttempts,

    #[error("token minting failed: {0}")]
    TokenMint(#[source] anyhow::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of opening a login attempt.
#[derive(Debug, Clone)]
pub struct ChallengeStarted {
    pub session: Uuid,
    /// Wire name of the challenge the client owes an answer to; `None` once
    /// an attempt is already resolved (cannot happen on a fresh transcript,
    /// but the wire shape allows it).
    pub challenge_name: Option<&'static str>,
}

/// Open a new login attempt for `phone` and issue its first challenge.
pub async fn initiate(phone: &str, deps: &ServerDeps) -> Result<ChallengeStarted, AuthFlowError> {
    if !is_e164(phone) {
        return Err(AuthFlowError::InvalidPhone);
    }
    if !deps.users.is_registered(phone).await? {
        return Err(AuthFlowError::UnknownIdentity);
    }

    let kind = ChallengeKind::OneTimeCode;
    debug_assert_eq!(
        session::evaluate(&[], kind),
        SessionState::AwaitingChallenge
    );

    let challenge = issue_challenge(phone, deps.otp_ttl_minutes, deps.sms.as_ref()).await?;
    let login = LoginSession::new(phone, challenge);
    deps.sessions.insert(&login).await?;

    info!(session = %login.id, "challenge issued");
    Ok(ChallengeStarted {
        session: login.id,
        challenge_name: Some(kind.wire_name()),
    })
}

/// Run one challenge round for an open login attempt.
///
/// The round transcript, not a counter, decides the outcome: the state
/// machine is re-evaluated from the full history on every call.
pub async fn respond(
    phone: &str,
    session_id: Uuid,
    answer: &str,
    deps: &ServerDeps,
) -> Result<TokenBundle, AuthFlowError> {
    let Some(mut login) = deps.sessions.fetch(session_id).await? else {
        return Err(AuthFlowError::SessionNotFound);
    };
    // The identity is fixed when the attempt opens; a mismatched phone is a
    // dead handle, not a different error.
    if login.phone != phone {
        return Err(AuthFlowError::SessionNotFound);
    }

    let kind = ChallengeKind::OneTimeCode;
    let passed = verify_answer(&login.challenge, answer, Utc::now());
    login.transcript.push(ChallengeRound { kind, passed });

    match session::evaluate(&login.transcript, kind) {
        SessionState::Succeeded => {
            deps.sessions.remove(login.id).await?;
            let bundle = deps
                .jwt_service
                .mint_bundle(phone)
                .map_err(AuthFlowError::TokenMint)?;
            info!(session = %login.id, "login succeeded");
            Ok(bundle)
        }
        SessionState::Failed => {
            deps.sessions.remove(login.id).await?;
            warn!(session = %login.id, rounds = login.transcript.len(), "attempt budget exhausted");
            Err(AuthFlowError::TooManyAttempts)
        }
        SessionState::AwaitingChallenge | SessionState::ChallengeIssued => {
            // Another round of the same kind: the old code is spent either
            // way, even if the replacement cannot be delivered.
            match issue_challenge(phone, deps.otp_ttl_minutes, deps.sms.as_ref()).await {
                Ok(challenge) => {
                    login.challenge = challenge;
                    deps.sessions.update(&login).await?;
                    info!(session = %login.id, rounds = login.transcript.len(), "code rejected, new round issued");
                    Err(AuthFlowError::CodeRejected)
                }
                Err(err) => {
                    login.challenge.code.clear();
                    deps.sessions.update(&login).await?;
                    warn!(session = %login.id, "re-issue failed after rejected code");
                    Err(err)
                }
            }
        }
    }
}
