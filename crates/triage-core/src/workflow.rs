//! Workflow orchestrator: drives one incident from `received` to a terminal
//! state.
//!
//! The state machine is `received → planning_done → resolved | failed`. Plan
//! steps execute strictly sequentially — later steps consume findings
//! accumulated by earlier ones, so the plan is a dependency chain, not an
//! independent task set. Every fatal condition, wherever it arises, funnels
//! through one `fail` handler that performs the terminal bookkeeping exactly
//! once: one status write, one `failed` action, one `failed` broadcast.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::broadcast::EventBroadcaster;
use crate::config::Config;
use crate::error::TriageError;
use crate::logs::LogStore;
use crate::planner::Planner;
use crate::resilience::{CallPolicy, CircuitBreaker};
use crate::steps::{self, EvidenceCapturer};
use crate::store::IncidentStore;
use crate::types::{Alert, IncidentStatus, Step};

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Explicitly constructed service set shared by the intake path and every
/// workflow task. Built once at process start; all consumers hold handles.
pub struct Services {
    pub store: Arc<IncidentStore>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub planner: Arc<dyn Planner>,
    pub logs: Arc<dyn LogStore>,
    pub evidence: Arc<dyn EvidenceCapturer>,
    pub breaker: Arc<CircuitBreaker>,
    pub call_policy: CallPolicy,
    pub config: Config,
}

// ---------------------------------------------------------------------------
// WorkflowFailure
// ---------------------------------------------------------------------------

/// A fatal condition on its way to the terminal failure handler: a stable
/// reason tag plus caller-supplied detail fields. The reason tag and detail
/// are the only failure signal exposed to subscribers; stack traces stay in
/// the logs.
struct WorkflowFailure {
    reason: String,
    detail: Value,
}

impl WorkflowFailure {
    fn new(reason: impl Into<String>, detail: Value) -> Self {
        Self {
            reason: reason.into(),
            detail,
        }
    }

    fn from_error(error: &TriageError) -> Self {
        Self::new("workflow_error", json!({"error": error.to_string()}))
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Execute the full workflow for one admitted incident. Spawned as a
/// background task; the admitting request has already returned by the time
/// this runs. The whole run's wall-clock duration, admission delay included,
/// is reported on every exit path.
pub async fn run(services: Arc<Services>, incident_id: Uuid) {
    let started = Instant::now();

    tokio::time::sleep(services.config.admission_delay).await;
    let outcome = drive(&services, incident_id).await;

    let terminal = match outcome {
        Ok(()) => IncidentStatus::Resolved,
        Err(failure) => {
            fail(&services, incident_id, failure).await;
            IncidentStatus::Failed
        }
    };

    tracing::info!(
        incident_id = %incident_id,
        status = %terminal,
        duration_ms = started.elapsed().as_millis() as u64,
        "workflow finished"
    );
}

/// The happy path, peeled away from terminal bookkeeping: any `Err` here is
/// fatal and handled exactly once by the caller.
async fn drive(services: &Services, incident_id: Uuid) -> Result<(), WorkflowFailure> {
    // Preconditions: the incident and its originating alert must exist.
    services
        .store
        .get_incident(incident_id)
        .map_err(|e| WorkflowFailure::from_error(&e))?;
    let initial = services
        .store
        .first_action_of_kind(incident_id, "received_alert")
        .map_err(|e| WorkflowFailure::from_error(&e))?
        .ok_or_else(|| {
            WorkflowFailure::from_error(&TriageError::MissingInitialAlert(incident_id))
        })?;
    let alert: Alert = serde_json::from_value(initial.payload)
        .map_err(|e| WorkflowFailure::from_error(&TriageError::Json(e)))?;

    // Planning.
    let plan = services
        .planner
        .plan(&alert)
        .map_err(|e| WorkflowFailure::from_error(&e))?;
    let plan_payload = json!({
        "steps": plan
            .iter()
            .map(|s| json!({"kind": s.kind, "params": s.params}))
            .collect::<Vec<_>>(),
    });
    services
        .store
        .append_action(incident_id, "llm_plan", plan_payload.clone())
        .map_err(|e| WorkflowFailure::from_error(&e))?;
    services
        .store
        .set_status(incident_id, IncidentStatus::PlanningDone)
        .map_err(|e| WorkflowFailure::from_error(&e))?;
    services
        .broadcaster
        .publish(incident_id, "llm_plan", plan_payload);

    // Sequential step execution.
    let mut findings: Vec<Value> = Vec::new();
    for step in &plan {
        let record = match steps::execute(services, incident_id, step).await {
            Ok(record) => record,
            Err(error) => {
                return Err(step_failure(step, &error));
            }
        };
        services
            .store
            .append_action(incident_id, &record.kind, record.payload.clone())
            .map_err(|e| WorkflowFailure::from_error(&e))?;
        services
            .broadcaster
            .publish(incident_id, &record.kind, record.payload);
        findings.extend(record.findings);
    }

    // Summarize and resolve.
    let summary = services
        .planner
        .summarize(&findings)
        .map_err(|e| WorkflowFailure::new("summarize_error", json!({"error": e.to_string()})))?;
    services
        .store
        .resolve_with_summary(incident_id, &summary)
        .map_err(|e| WorkflowFailure::new("summarize_error", json!({"error": e.to_string()})))?;
    services
        .store
        .append_action(
            incident_id,
            "summarize",
            json!({"summary": summary, "count": findings.len()}),
        )
        .map_err(|e| WorkflowFailure::new("summarize_error", json!({"error": e.to_string()})))?;
    services
        .broadcaster
        .publish(incident_id, "summarize", json!({"summary": summary}));
    services.broadcaster.publish(incident_id, "done", json!({}));

    Ok(())
}

fn step_failure(step: &Step, error: &TriageError) -> WorkflowFailure {
    WorkflowFailure::new(
        format!("step_error:{}", step.kind),
        json!({"error": error.to_string(), "params": step.params}),
    )
}

/// Terminal failure bookkeeping. Sole writer of the `failed` status and the
/// `failed` action; best-effort on each write so a broken store cannot mask
/// the broadcast.
async fn fail(services: &Services, incident_id: Uuid, failure: WorkflowFailure) {
    tracing::warn!(
        incident_id = %incident_id,
        reason = %failure.reason,
        "workflow failed"
    );

    let mut payload = json!({"reason": failure.reason});
    if let (Value::Object(p), Value::Object(detail)) = (&mut payload, &failure.detail) {
        p.extend(detail.clone());
    }

    if let Err(e) = services.store.set_status(incident_id, IncidentStatus::Failed) {
        tracing::error!(incident_id = %incident_id, error = %e, "failed to persist failure status");
    }
    if let Err(e) = services
        .store
        .append_action(incident_id, "failed", payload.clone())
    {
        tracing::error!(incident_id = %incident_id, error = %e, "failed to persist failure action");
    }
    services.broadcaster.publish(incident_id, "failed", payload);
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
