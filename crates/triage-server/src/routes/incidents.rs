use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 200;

#[derive(Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// GET /incidents/{id} — incident detail: latest ticket, one page of the
/// action trail, and the full evidence list.
pub async fn get_incident(
    State(app): State<AppState>,
    Path(incident_id): Path<String>,
    Query(page): Query<PageParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let incident_id = Uuid::parse_str(&incident_id)
        .map_err(|_| AppError::bad_request(format!("Invalid incident id: {incident_id}")))?;
    let limit = page.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let offset = page.offset.unwrap_or(0);

    let store = &app.services.store;
    let incident = store.get_incident(incident_id)?;
    let ticket = store.latest_ticket(incident_id)?;
    let actions = store.list_actions(incident_id, limit, offset)?;
    let total = store.count_actions(incident_id)?;
    let evidence = store.list_evidence(incident_id)?;

    Ok(Json(json!({
        "id": incident.id,
        "tenant_id": incident.tenant_id,
        "source": incident.source,
        "status": incident.status,
        "summary": incident.summary,
        "created_at": incident.created_at,
        "ticket": ticket.map(|t| json!({
            "external_id": t.external_id,
            "system": t.system,
            "status": t.status,
            "at": t.at,
        })),
        "actions": actions.iter().map(|a| json!({
            "id": a.id,
            "kind": a.kind,
            "payload": a.payload,
            "at": a.at,
        })).collect::<Vec<_>>(),
        "actions_pagination": {
            "limit": limit,
            "offset": offset,
            "total": total,
            "returned": actions.len(),
        },
        "evidence": evidence.iter().map(|e| json!({
            "id": e.id,
            "kind": e.kind,
            "path": e.path,
            "hash": e.hash,
            "at": e.at,
        })).collect::<Vec<_>>(),
    })))
}
