//! Session state types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle stage of a session's finalize workflow.
///
/// Transitions are monotonic: `InProgress` -> `WaitingEval` -> `Done`.
/// `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    #[default]
    InProgress,
    WaitingEval,
    Done,
}

impl SessionStatus {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "WAITING_EVAL" => SessionStatus::WaitingEval,
            "DONE" => SessionStatus::Done,
            _ => SessionStatus::InProgress,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::InProgress => write!(f, "IN_PROGRESS"),
            SessionStatus::WaitingEval => write!(f, "WAITING_EVAL"),
            SessionStatus::Done => write!(f, "DONE"),
        }
    }
}

/// Pedagogical stage of the consultation, independent of status.
///
/// Monotonic `Triage` -> `Consult` -> `Followup` -> `Finalized`, except that
/// `Followup` may be re-entered while the session is still in progress.
/// `Finalized` is set only by finalize.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    #[default]
    Triage,
    Consult,
    Followup,
    Finalized,
}

impl SessionPhase {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "CONSULT" => SessionPhase::Consult,
            "FOLLOWUP" => SessionPhase::Followup,
            "FINALIZED" => SessionPhase::Finalized,
            _ => SessionPhase::Triage,
        }
    }

    /// First reveal or test order moves the session out of triage.
    /// Any later phase is kept as-is (phase never regresses).
    pub fn after_clinical_action(self) -> Self {
        match self {
            SessionPhase::Triage => SessionPhase::Consult,
            other => other,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Triage => write!(f, "TRIAGE"),
            SessionPhase::Consult => write!(f, "CONSULT"),
            SessionPhase::Followup => write!(f, "FOLLOWUP"),
            SessionPhase::Finalized => write!(f, "FINALIZED"),
        }
    }
}

/// Speaker role for a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageRole {
    Student,
    PatientAi,
    CoordinatorAi,
    System,
}

impl MessageRole {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "STUDENT" => MessageRole::Student,
            "PATIENT_AI" => MessageRole::PatientAi,
            "COORDINATOR_AI" => MessageRole::CoordinatorAi,
            _ => MessageRole::System,
        }
    }

    /// Speaker label used when rendering a transcript for the evaluator.
    pub fn transcript_label(self) -> &'static str {
        match self {
            MessageRole::Student => "ALUNO",
            MessageRole::PatientAi => "PACIENTE",
            MessageRole::CoordinatorAi => "COORDENADOR",
            MessageRole::System => "SISTEMA",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::Student => write!(f, "STUDENT"),
            MessageRole::PatientAi => write!(f, "PATIENT_AI"),
            MessageRole::CoordinatorAi => write!(f, "COORDINATOR_AI"),
            MessageRole::System => write!(f, "SYSTEM"),
        }
    }
}

/// Closed set of physical-exam sections a student may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExamSection {
    Vitals,
    General,
    Heent,
    Cardio,
    Resp,
    Abdomen,
    Neuro,
    Skin,
    Extremities,
    GynUro,
}

impl ExamSection {
    pub const ALL: [ExamSection; 10] = [
        ExamSection::Vitals,
        ExamSection::General,
        ExamSection::Heent,
        ExamSection::Cardio,
        ExamSection::Resp,
        ExamSection::Abdomen,
        ExamSection::Neuro,
        ExamSection::Skin,
        ExamSection::Extremities,
        ExamSection::GynUro,
    ];

    pub fn as_key(self) -> &'static str {
        match self {
            ExamSection::Vitals => "vitals",
            ExamSection::General => "general",
            ExamSection::Heent => "heent",
            ExamSection::Cardio => "cardio",
            ExamSection::Resp => "resp",
            ExamSection::Abdomen => "abdomen",
            ExamSection::Neuro => "neuro",
            ExamSection::Skin => "skin",
            ExamSection::Extremities => "extremities",
            ExamSection::GynUro => "gynUro",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_key() == key)
    }

    /// Human-readable label used in the revealed-finding chat message.
    pub fn label(self) -> &'static str {
        match self {
            ExamSection::Vitals => "Sinais vitais",
            ExamSection::General => "Inspeção geral",
            ExamSection::Heent => "HEENT (olho/ouvido/garganta)",
            ExamSection::Cardio => "Cardiovascular",
            ExamSection::Resp => "Respiratório",
            ExamSection::Abdomen => "Abdome",
            ExamSection::Neuro => "Neurológico",
            ExamSection::Skin => "Pele",
            ExamSection::Extremities => "Extremidades",
            ExamSection::GynUro => "Ginecológico/Urológico",
        }
    }
}

/// Closed set of follow-up outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FollowupOutcome {
    Improved,
    Same,
    Worse,
    SideEffect,
}

impl FollowupOutcome {
    pub const ALL: [FollowupOutcome; 4] = [
        FollowupOutcome::Improved,
        FollowupOutcome::Same,
        FollowupOutcome::Worse,
        FollowupOutcome::SideEffect,
    ];

    pub fn as_key(self) -> &'static str {
        match self {
            FollowupOutcome::Improved => "improved",
            FollowupOutcome::Same => "same",
            FollowupOutcome::Worse => "worse",
            FollowupOutcome::SideEffect => "sideEffect",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.as_key() == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_keys_round_trip() {
        for section in ExamSection::ALL {
            assert_eq!(ExamSection::from_key(section.as_key()), Some(section));
        }
        assert_eq!(ExamSection::from_key("gynUro"), Some(ExamSection::GynUro));
        assert_eq!(ExamSection::from_key("gynuro"), None);
        assert_eq!(ExamSection::from_key("xray"), None);
    }

    #[test]
    fn outcome_keys_round_trip() {
        for outcome in FollowupOutcome::ALL {
            assert_eq!(FollowupOutcome::from_key(outcome.as_key()), Some(outcome));
        }
        assert_eq!(
            FollowupOutcome::from_key("sideEffect"),
            Some(FollowupOutcome::SideEffect)
        );
        assert_eq!(FollowupOutcome::from_key("cured"), None);
    }

    #[test]
    fn status_wire_format() {
        assert_eq!(SessionStatus::InProgress.to_string(), "IN_PROGRESS");
        assert_eq!(
            SessionStatus::from_wire("WAITING_EVAL"),
            SessionStatus::WaitingEval
        );
        assert_eq!(
            SessionStatus::from_wire("garbage"),
            SessionStatus::InProgress
        );
    }

    #[test]
    fn phase_advance_never_regresses() {
        assert_eq!(
            SessionPhase::Triage.after_clinical_action(),
            SessionPhase::Consult
        );
        assert_eq!(
            SessionPhase::Followup.after_clinical_action(),
            SessionPhase::Followup
        );
        assert_eq!(
            SessionPhase::Finalized.after_clinical_action(),
            SessionPhase::Finalized
        );
    }
}
