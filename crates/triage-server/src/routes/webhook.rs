use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::json;

use triage_core::idempotency::body_hash;
use triage_core::types::{Alert, Incident};
use triage_core::workflow;

use crate::error::AppError;
use crate::sign;
use crate::state::AppState;

const TENANT_HEADER: &str = "x-tenant-id";
const IDEMPOTENCY_HEADER: &str = "idempotency-key";

const MAX_SOURCE_LEN: usize = 100;
const MAX_TENANT_LEN: usize = 36;

/// POST /webhook/siem — admit one alert delivery.
///
/// Admission is synchronous: the incident row and its `received_alert` action
/// are persisted before the response is sent. The workflow itself runs as a
/// detached background task and finishes long after this handler returns.
pub async fn webhook_siem(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Some(secret) = &app.webhook_secret {
        let header_value = headers
            .get(sign::SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        if !sign::verify(secret.as_bytes(), &body, header_value) {
            return Err(AppError::unauthorized("Missing or invalid signature"));
        }
    }

    let tenant_id = headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("");
    if tenant_id.is_empty() || tenant_id.len() > MAX_TENANT_LEN {
        return Err(AppError::bad_request(format!(
            "Missing or invalid {TENANT_HEADER} header"
        )));
    }

    let alert: Alert = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("Malformed alert body: {e}")))?;
    if alert.source.is_empty() || alert.source.len() > MAX_SOURCE_LEN {
        return Err(AppError::bad_request("Invalid alert source"));
    }

    let key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| body_hash(&body));
    if !app
        .gate
        .acquire(&key, app.services.config.idempotency_ttl)
    {
        tracing::info!(key = %key, "duplicate webhook rejected");
        return Err(AppError::conflict(json!({
            "message": "Duplicate webhook",
            "key": key,
        })));
    }

    let incident = Incident::new(tenant_id, &alert.source);
    app.services.store.create_incident(&incident)?;
    let alert_payload = serde_json::to_value(&alert)?;
    app.services
        .store
        .append_action(incident.id, "received_alert", alert_payload.clone())?;

    app.services
        .broadcaster
        .publish(incident.id, "received_alert", json!({"alert": alert_payload}));

    tracing::info!(incident_id = %incident.id, source = %alert.source, "alert admitted");
    tokio::spawn(workflow::run(app.services.clone(), incident.id));

    Ok(Json(json!({"incident_id": incident.id})))
}
