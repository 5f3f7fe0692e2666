use serde_json::{json, Value};

use crate::error::Result;
use crate::types::{Alert, Step};

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Converts an alert into an ordered investigation plan and renders the
/// accumulated findings into a closing summary. The workflow depends only on
/// this trait; swapping in an LLM-backed implementation is a construction-time
/// choice.
pub trait Planner: Send + Sync {
    fn plan(&self, alert: &Alert) -> Result<Vec<Step>>;
    fn summarize(&self, findings: &[Value]) -> Result<String>;
}

// ---------------------------------------------------------------------------
// RulePlanner
// ---------------------------------------------------------------------------

/// Deterministic rule-based planner: different alert types yield different
/// plans, so identical alerts are reproducible in tests.
pub struct RulePlanner;

impl Planner for RulePlanner {
    fn plan(&self, alert: &Alert) -> Result<Vec<Step>> {
        let raw = &alert.raw;
        let alert_type = alert.alert_type.to_lowercase();

        let steps = match alert_type.as_str() {
            "login_anomaly" => vec![
                Step::new("run_query", query_params("ip", raw.get("ip"))),
                Step::new("run_query", query_params("user", raw.get("user"))),
                Step::new("capture_evidence", json!({"url": raw.get("url").cloned()})),
                Step::new(
                    "create_ticket",
                    json!({"severity": alert.severity, "entity": alert.entity}),
                ),
            ],
            "malware_detection" => vec![
                Step::new("isolate_host", json!({"entity": alert.entity})),
                Step::new("run_query", query_params("hash", raw.get("hash"))),
                Step::new("capture_evidence", json!({"artifact": "malware_sample"})),
                Step::new(
                    "create_ticket",
                    json!({"severity": alert.severity, "entity": alert.entity}),
                ),
            ],
            "data_exfiltration" => vec![
                Step::new("run_query", json!({"by": "user", "user": alert.entity})),
                Step::new("run_query", query_params("ip", raw.get("ip"))),
                Step::new("increase_monitoring", json!({"entity": alert.entity})),
                Step::new(
                    "create_ticket",
                    json!({"severity": alert.severity, "entity": alert.entity}),
                ),
            ],
            _ => vec![
                Step::new(
                    "triage",
                    json!({
                        "type": alert.alert_type,
                        "entity": alert.entity,
                        "severity": alert.severity,
                    }),
                ),
                Step::new(
                    "create_ticket",
                    json!({"severity": alert.severity, "entity": alert.entity}),
                ),
            ],
        };
        Ok(steps)
    }

    fn summarize(&self, findings: &[Value]) -> Result<String> {
        if findings.is_empty() {
            return Ok("No findings available.".to_string());
        }
        let parts: Vec<String> = findings
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let desc = match item.as_object() {
                    Some(map) => map
                        .iter()
                        .take(6)
                        .map(|(k, v)| format!("{k}={}", render_scalar(v)))
                        .collect::<Vec<_>>()
                        .join(", "),
                    None => render_scalar(item),
                };
                format!("[{}] {desc}", i + 1)
            })
            .collect();
        Ok(parts.join("; "))
    }
}

/// `{"by": dim, dim: value}` when the alert carries the value, `{"by": dim}`
/// otherwise — the executor treats the missing value as an empty lookup.
fn query_params(dimension: &str, value: Option<&Value>) -> Value {
    match value {
        Some(v) if !v.is_null() => json!({"by": dimension, dimension: v.clone()}),
        _ => json!({"by": dimension}),
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
