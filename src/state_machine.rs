//! Consultation session state machine
//!
//! Owns the session lifecycle (status/phase), the closed clinical enums,
//! and the pure operations that gatekeep every state-changing action.

pub mod merge;
pub mod ops;
pub mod state;

#[cfg(test)]
mod proptests;

pub use merge::RESULT_UNAVAILABLE;
pub use ops::{
    accept_student_message, begin_finalize, order_tests, record_followup, record_triage,
    reveal_section, FollowupRecorded, FollowupState, OrderOutcome, OutboundMessage, RevealOutcome,
    SessionError, SessionSnapshot, TriageOutcome, SESSION_START_MESSAGE,
};
pub use state::{ExamSection, FollowupOutcome, MessageRole, SessionPhase, SessionStatus};
