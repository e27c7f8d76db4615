//! Session state machine for the login challenge flow.
//!
//! The machine is deliberately a pure function of the round transcript:
//! every invocation replays the full history instead of consulting a
//! counter, so concurrent handler instances evaluating the same attempt
//! reach the same decision and nothing can desynchronize from the
//! transcript.

use serde::{Deserialize, Serialize};

/// Maximum challenge rounds per login attempt. Exceeding it is a hard
/// terminal failure; the client restarts from identity submission.
pub const MAX_ATTEMPTS: usize = 3;

/// The kinds of challenge a login attempt can present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeKind {
    OneTimeCode,
}

impl ChallengeKind {
    /// Wire name surfaced to clients as `challengeName`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ChallengeKind::OneTimeCode => "ONE_TIME_CODE",
        }
    }
}

/// One completed challenge round in a login attempt's transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRound {
    pub kind: ChallengeKind,
    pub passed: bool,
}

/// States of one login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No round issued yet.
    AwaitingChallenge,
    /// A round is outstanding; the client owes an answer.
    ChallengeIssued,
    /// Terminal: issue tokens.
    Succeeded,
    /// Terminal: reject the attempt, do not issue a new challenge.
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::Failed)
    }
}

/// Evaluate the state of a login attempt from its transcript alone.
///
/// - any prior round of `kind` with a true result => `Succeeded`
/// - else transcript length at the attempt budget => `Failed`
/// - else => present (another) round of the same kind
pub fn evaluate(transcript: &[ChallengeRound], kind: ChallengeKind) -> SessionState {
    if transcript.iter().any(|r| r.kind == kind && r.passed) {
        SessionState::Succeeded
    } else if transcript.len() >= MAX_ATTEMPTS {
        SessionState::Failed
    } else if transcript.is_empty() {
        SessionState::AwaitingChallenge
    } else {
        SessionState::ChallengeIssued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(passed: bool) -> ChallengeRound {
        ChallengeRound {
            kind: ChallengeKind::OneTimeCode,
            passed,
        }
    }

    #[test]
    fn empty_transcript_awaits_challenge() {
        assert_eq!(
            evaluate(&[], ChallengeKind::OneTimeCode),
            SessionState::AwaitingChallenge
        );
    }

    #[test]
    fn any_passed_round_succeeds() {
        assert_eq!(
            evaluate(&[round(true)], ChallengeKind::OneTimeCode),
            SessionState::Succeeded
        );
        // Earlier failures do not matter, nor does transcript length.
        assert_eq!(
            evaluate(
                &[round(false), round(false), round(true)],
                ChallengeKind::OneTimeCode
            ),
            SessionState::Succeeded
        );
        assert_eq!(
            evaluate(
                &[round(false), round(false), round(false), round(true)],
                ChallengeKind::OneTimeCode
            ),
            SessionState::Succeeded
        );
    }

    #[test]
    fn failures_below_budget_continue() {
        assert_eq!(
            evaluate(&[round(false)], ChallengeKind::OneTimeCode),
            SessionState::ChallengeIssued
        );
        assert_eq!(
            evaluate(&[round(false), round(false)], ChallengeKind::OneTimeCode),
            SessionState::ChallengeIssued
        );
    }

    #[test]
    fn budget_exhaustion_is_terminal() {
        // Exactly MAX_ATTEMPTS unsuccessful rounds fail the attempt. The
        // N-th round is still offered (N-1 failures continue); only after it
        // fails does the machine terminate.
        let mut transcript = Vec::new();
        for _ in 0..MAX_ATTEMPTS - 1 {
            transcript.push(round(false));
            assert_eq!(
                evaluate(&transcript, ChallengeKind::OneTimeCode),
                SessionState::ChallengeIssued
            );
        }
        transcript.push(round(false));
        assert_eq!(
            evaluate(&transcript, ChallengeKind::OneTimeCode),
            SessionState::Failed
        );
        // Beyond the budget stays failed.
        transcript.push(round(false));
        assert_eq!(
            evaluate(&transcript, ChallengeKind::OneTimeCode),
            SessionState::Failed
        );
    }

    #[test]
    fn evaluation_is_replay_safe() {
        // Same transcript, same answer, no matter how often it is evaluated.
        let transcript = vec![round(false), round(false)];
        let first = evaluate(&transcript, ChallengeKind::OneTimeCode);
        for _ in 0..10 {
            assert_eq!(evaluate(&transcript, ChallengeKind::OneTimeCode), first);
        }
    }
}
