use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// IncidentStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an incident.
///
/// Transitions: `Received → PlanningDone → Resolved | Failed`
///
/// Step execution happens between `PlanningDone` and a terminal state but is
/// not persisted as its own status; the action trail carries that detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Received,
    PlanningDone,
    Resolved,
    Failed,
}

impl IncidentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, IncidentStatus::Resolved | IncidentStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IncidentStatus::Received => "received",
            IncidentStatus::PlanningDone => "planning_done",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IncidentStatus {
    type Err = crate::error::TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(IncidentStatus::Received),
            "planning_done" => Ok(IncidentStatus::PlanningDone),
            "resolved" => Ok(IncidentStatus::Resolved),
            "failed" => Ok(IncidentStatus::Failed),
            _ => Err(crate::error::TriageError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Incident
// ---------------------------------------------------------------------------

/// Root entity for one alert's end-to-end investigation lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub tenant_id: String,
    pub source: String,
    pub status: IncidentStatus,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Incident {
    pub fn new(tenant_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            source: source.into(),
            status: IncidentStatus::Received,
            summary: None,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionRecord
// ---------------------------------------------------------------------------

/// Append-only audit record of one workflow step or lifecycle transition.
///
/// `seq` is assigned inside the insert transaction, so ordering by `seq`
/// reconstructs the exact execution trace even when two actions land in the
/// same millisecond.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: Uuid,
    pub incident_id: Uuid,
    pub seq: u64,
    pub kind: String,
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// EvidenceRecord
// ---------------------------------------------------------------------------

/// Append-only artifact reference produced by a capture-evidence step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub id: Uuid,
    pub incident_id: Uuid,
    pub kind: String,
    pub path: String,
    pub hash: Option<String>,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// TicketRecord
// ---------------------------------------------------------------------------

/// A ticket registered in an external tracking system.
///
/// No uniqueness constraint: an incident may accumulate several tickets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRecord {
    pub id: Uuid,
    pub incident_id: Uuid,
    pub external_id: String,
    pub system: String,
    pub status: String,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Alert
// ---------------------------------------------------------------------------

/// Parsed webhook body. Never persisted directly — embedded as the payload of
/// the first `received_alert` action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default)]
    pub source: String,
    #[serde(rename = "type", default)]
    pub alert_type: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub entity: String,
    #[serde(default)]
    pub raw: serde_json::Value,
}

// ---------------------------------------------------------------------------
// StepKind / Step
// ---------------------------------------------------------------------------

/// Known investigation step kinds, plus a fallback for anything a planner
/// emits that this executor set does not recognize. Dispatch sites match on
/// the closed enum so adding a kind is a compile-time checklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    RunQuery,
    CaptureEvidence,
    CreateTicket,
    Other(String),
}

impl StepKind {
    pub fn as_str(&self) -> &str {
        match self {
            StepKind::RunQuery => "run_query",
            StepKind::CaptureEvidence => "capture_evidence",
            StepKind::CreateTicket => "create_ticket",
            StepKind::Other(s) => s.as_str(),
        }
    }
}

impl From<&str> for StepKind {
    fn from(s: &str) -> Self {
        match s {
            "run_query" => StepKind::RunQuery,
            "capture_evidence" => StepKind::CaptureEvidence,
            "create_ticket" => StepKind::CreateTicket,
            other => StepKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StepKind {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StepKind {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(StepKind::from(s.as_str()))
    }
}

/// One planned investigation step: a kind plus free-form parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub kind: StepKind,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Step {
    pub fn new(kind: impl Into<StepKind>, params: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
