//! Auth domain - passwordless login via SMS one-time codes
//!
//! A login attempt is a sequence of challenge rounds. Each round issues a
//! fresh code, delivers it out of band, and verifies the submitted answer.
//! The decision to continue, succeed, or fail is replayed from the round
//! transcript on every invocation (session.rs), so any number of handler
//! instances can serve rounds of the same attempt concurrently.
//!
//! Responsibilities:
//! - One-time code generation and verification
//! - Session state machine over the challenge transcript
//! - JWT token bundle minting

pub mod challenge;
pub mod code;
pub mod directory;
pub mod flow;
pub mod jwt;
pub mod session;
pub mod store;

pub use challenge::{verify_answer, ChallengeRecord};
pub use directory::UserDirectory;
pub use flow::{AuthFlowError, ChallengeStarted};
pub use jwt::{Claims, JwtService, TokenBundle};
pub use session::{ChallengeKind, ChallengeRound, SessionState};
pub use store::{LoginSession, SessionStore};
