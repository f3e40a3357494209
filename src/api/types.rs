//! API request and response types
//!
//! Wire names are camelCase to match the web client.

use crate::db::{Evaluation, Message, SessionSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ==================== Requests ====================

/// Student chat message
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Physical-exam section to reveal
#[derive(Debug, Deserialize)]
pub struct PhysicalRequest {
    pub section: String,
}

/// Test keys to order
#[derive(Debug, Deserialize)]
pub struct OrderTestsRequest {
    #[serde(default)]
    pub keys: Vec<String>,
}

/// Follow-up outcome chosen by the student
#[derive(Debug, Deserialize)]
pub struct FollowupRequest {
    pub outcome: String,
}

// ==================== Responses ====================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CaseHeader {
    pub id: String,
    pub title: String,
    pub triage: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    pub ok: bool,
    pub session_id: String,
    pub case: CaseHeader,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListItem {
    pub id: String,
    pub status: String,
    pub case: CaseListHeader,
    pub score: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CaseListHeader {
    pub title: String,
    pub triage: Option<String>,
}

impl From<SessionSummary> for SessionListItem {
    fn from(s: SessionSummary) -> Self {
        Self {
            id: s.id,
            status: s.status.to_string(),
            case: CaseListHeader {
                title: s.case_title,
                triage: s.case_triage,
            },
            score: s.score,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub ok: bool,
    pub items: Vec<SessionListItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageDto {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            role: m.role.to_string(),
            content: m.content,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EvaluationDto {
    pub score: i64,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub improvements: Vec<String>,
}

impl From<Evaluation> for EvaluationDto {
    fn from(e: Evaluation) -> Self {
        Self {
            score: e.score,
            feedback: e.feedback,
            strengths: e.strengths,
            weaknesses: e.weaknesses,
            improvements: e.improvements,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    pub id: String,
    pub status: String,
    pub phase: String,
    pub case: CaseListHeader,
    pub evaluation: Option<EvaluationDto>,
    pub messages: Vec<MessageDto>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub ok: bool,
    pub session: SessionDetail,
}

#[derive(Debug, Serialize)]
pub struct ReplyResponse {
    pub ok: bool,
    pub reply: String,
}

#[derive(Debug, Serialize)]
pub struct TriageResponse {
    pub ok: bool,
    pub phase: String,
    pub triage: Value,
}

#[derive(Debug, Serialize)]
pub struct RecordTriageResponse {
    pub ok: bool,
    pub triage: Value,
}

#[derive(Debug, Serialize)]
pub struct PhysicalResponse {
    pub ok: bool,
    pub section: String,
    pub value: Value,
}

#[derive(Debug, Serialize)]
pub struct TestsViewResponse {
    pub ok: bool,
    pub phase: String,
    pub catalog: Vec<crate::case::TestDef>,
    pub ordered: Vec<String>,
    pub results: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct OrderTestsResponse {
    pub ok: bool,
    pub ordered: Vec<String>,
    pub newly: Vec<String>,
    pub dropped: Vec<String>,
    pub results: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct FollowupResponse {
    pub ok: bool,
    pub outcome: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct FinalizeResponse {
    pub ok: bool,
    pub score: i64,
}
