//! Step executors: the dispatch table the workflow drives one step at a time.
//!
//! Every branch — including the unknown-kind fallback — produces exactly one
//! `StepRecord`, from which the orchestrator appends one action and publishes
//! one broadcast frame. An executor that returns `Err` is step-fatal: the
//! workflow halts and routes through its failure path. Errors an executor can
//! meaningfully absorb (a down evidence collaborator) are folded into the
//! record's payload instead.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::Result;
use crate::resilience;
use crate::types::{Step, StepKind};
use crate::workflow::Services;

// ---------------------------------------------------------------------------
// EvidenceCapturer
// ---------------------------------------------------------------------------

/// One artifact produced by an evidence capture run.
#[derive(Debug, Clone)]
pub struct EvidenceArtifact {
    pub kind: String,
    pub path: String,
    pub hash: Option<String>,
}

/// External evidence-capture capability (browser automation or equivalent).
#[async_trait]
pub trait EvidenceCapturer: Send + Sync {
    async fn capture(&self, url: Option<&str>) -> Result<Vec<EvidenceArtifact>>;
}

/// Default capturer: produces no artifacts, so the step reports `noop`.
pub struct NoopCapturer;

#[async_trait]
impl EvidenceCapturer for NoopCapturer {
    async fn capture(&self, _url: Option<&str>) -> Result<Vec<EvidenceArtifact>> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// StepRecord
// ---------------------------------------------------------------------------

/// Outcome of one executed step: the action kind to record, the payload shared
/// by the action row and the broadcast frame, and the step's contribution to
/// the running findings.
#[derive(Debug)]
pub struct StepRecord {
    pub kind: String,
    pub payload: Value,
    pub findings: Vec<Value>,
}

// ---------------------------------------------------------------------------
// execute
// ---------------------------------------------------------------------------

/// Run one plan step against the registered collaborators.
pub async fn execute(services: &Services, incident_id: Uuid, step: &Step) -> Result<StepRecord> {
    match &step.kind {
        StepKind::RunQuery => run_query(services, step),
        StepKind::CaptureEvidence => capture_evidence(services, incident_id, step).await,
        StepKind::CreateTicket => create_ticket(services, incident_id, step),
        StepKind::Other(kind) => Ok(skip_unknown(kind, step)),
    }
}

/// Look up log records by the planned dimension. An unsupported dimension or
/// a missing lookup value yields an empty result set, never an error; log
/// store failures propagate and are step-fatal.
fn run_query(services: &Services, step: &Step) -> Result<StepRecord> {
    let params = &step.params;
    let result = match params.get("by").and_then(Value::as_str) {
        Some("ip") => match params.get("ip").and_then(Value::as_str) {
            Some(ip) => services.logs.by_ip(ip)?,
            None => Vec::new(),
        },
        Some("user") => match params.get("user").and_then(Value::as_str) {
            Some(user) => services.logs.by_user(user)?,
            None => Vec::new(),
        },
        _ => Vec::new(),
    };

    let payload = json!({
        "step": {"kind": "run_query", "params": params},
        "result_count": result.len(),
    });
    Ok(StepRecord {
        kind: "run_query".to_string(),
        payload,
        findings: result,
    })
}

/// Capture evidence through the external collaborator, protected by the
/// shared stability policy. Collaborator failure is absorbed into an error
/// fragment; the workflow moves on to the next step.
async fn capture_evidence(
    services: &Services,
    incident_id: Uuid,
    step: &Step,
) -> Result<StepRecord> {
    let url = step
        .params
        .get("url")
        .and_then(Value::as_str)
        .map(str::to_string);

    let captured = resilience::call(&services.call_policy, &services.breaker, || {
        services.evidence.capture(url.as_deref())
    })
    .await;

    let payload = match captured {
        Ok(artifacts) if artifacts.is_empty() => json!({
            "step": {"kind": "capture_evidence", "params": step.params},
            "status": "noop",
        }),
        Ok(artifacts) => {
            let mut stored = Vec::with_capacity(artifacts.len());
            for artifact in &artifacts {
                let record = services.store.add_evidence(
                    incident_id,
                    &artifact.kind,
                    &artifact.path,
                    artifact.hash.clone(),
                )?;
                stored.push(json!({"kind": record.kind, "path": record.path, "hash": record.hash}));
            }
            json!({
                "step": {"kind": "capture_evidence", "params": step.params},
                "status": "captured",
                "artifacts": stored,
            })
        }
        Err(error) => {
            tracing::warn!(incident_id = %incident_id, error = %error, "evidence capture failed");
            json!({
                "step": {"kind": "capture_evidence", "params": step.params},
                "status": "error",
                "error": error.to_string(),
            })
        }
    };

    Ok(StepRecord {
        kind: "capture_evidence".to_string(),
        payload,
        findings: Vec::new(),
    })
}

/// Register a ticket for the incident and feed it into the findings so the
/// summarizer can reference it. Store failures are step-fatal.
fn create_ticket(services: &Services, incident_id: Uuid, step: &Step) -> Result<StepRecord> {
    let external_id = format!("TCK-{incident_id}-{}", Utc::now().timestamp_millis());
    let ticket = services
        .store
        .add_ticket(incident_id, &external_id, "local", "open")?;

    let ticket_data = json!({
        "external_id": ticket.external_id,
        "system": ticket.system,
        "status": ticket.status,
    });
    let mut finding = json!({"finding": "ticket"});
    if let (Value::Object(f), Value::Object(t)) = (&mut finding, &ticket_data) {
        f.extend(t.clone());
    }

    Ok(StepRecord {
        kind: "create_ticket".to_string(),
        payload: json!({"step": {"kind": "create_ticket", "params": step.params}, "ticket": ticket_data}),
        findings: vec![finding],
    })
}

/// Planner emitted a kind this executor set does not know. Record it and move
/// on — an exotic plan must not fail the run.
fn skip_unknown(kind: &str, step: &Step) -> StepRecord {
    StepRecord {
        kind: kind.to_string(),
        payload: json!({
            "step": {"kind": kind, "params": step.params},
            "status": "skipped_unknown",
        }),
        findings: vec![json!({"finding": "skipped_step", "kind": kind})],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
