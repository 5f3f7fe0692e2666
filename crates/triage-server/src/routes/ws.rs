use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// GET /ws/incidents/{id} — per-incident live update stream.
///
/// First frame after the upgrade is `{event: "connected", incident_id}`.
/// Frames published by the workflow are forwarded as they arrive; any inbound
/// text from the client is answered with `{event: "pong"}` (heartbeat only,
/// there is no other inbound protocol).
pub async fn ws_incident(
    ws: WebSocketUpgrade,
    Path(incident_id): Path<String>,
    State(app): State<AppState>,
) -> Result<Response, AppError> {
    let incident_id = Uuid::parse_str(&incident_id)
        .map_err(|_| AppError::bad_request(format!("Invalid incident id: {incident_id}")))?;
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, app, incident_id))
        .into_response())
}

async fn handle_socket(mut socket: WebSocket, app: AppState, incident_id: Uuid) {
    let (subscriber, mut events) = app.services.broadcaster.subscribe(incident_id);

    let connected = json!({"event": "connected", "incident_id": incident_id.to_string()});
    if socket
        .send(Message::Text(connected.to_string().into()))
        .await
        .is_err()
    {
        app.services.broadcaster.unsubscribe(incident_id, subscriber);
        return;
    }

    loop {
        tokio::select! {
            frame = events.recv() => match frame {
                Some(frame) => {
                    if socket
                        .send(Message::Text(frame.to_string().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                None => break,
            },
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(_))) => {
                    let pong = json!({"event": "pong"});
                    if socket
                        .send(Message::Text(pong.to_string().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    app.services.broadcaster.unsubscribe(incident_id, subscriber);
    tracing::debug!(incident_id = %incident_id, "subscriber disconnected");
}
