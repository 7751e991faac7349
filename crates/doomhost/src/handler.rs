//! Per-connection handler: ban check, authentication, and dispatch.
//!
//! Each control connection carries exactly one request and gets exactly
//! one reply. The flow is:
//!   1. Refuse banned addresses
//!   2. Read and decode the frame
//!   3. Check the shared secret (a mismatch bans the address)
//!   4. Check the account credentials
//!   5. Run the action and send its reply

use std::time::Duration;

use doomhost_instance::{HostRequest, InstanceError, StartupOutcome};
use doomhost_protocol::{Action, Codec, ControlReply, ControlRequest, ProtocolError};
use doomhost_session::UserRecord;
use doomhost_transport::{ControlConnection, DEFAULT_MAX_FRAME};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::DoomhostError;
use crate::server::ServerState;
use crate::upload::{UploadTarget, receive_upload};

/// How long a client has to deliver its request frame.
const FRAME_TIMEOUT: Duration = Duration::from_secs(15);

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    mut conn: ControlConnection,
    state: &mut ServerState,
) -> Result<(), DoomhostError> {
    let conn_id = conn.id();
    let peer = conn.peer();
    debug!(%conn_id, %peer, "handling control connection");

    if state.bans.is_banned(peer.ip()) {
        debug!(%conn_id, %peer, "refusing banned address");
        return send_reply(conn, state, ControlReply::error("IP address is banned.")).await;
    }

    // --- Step 1: Frame ---
    let frame = match tokio::time::timeout(FRAME_TIMEOUT, conn.read_frame(DEFAULT_MAX_FRAME)).await {
        Ok(Ok(frame)) => frame,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("request timed out".into()).into());
        }
    };

    let request: ControlRequest = match state.codec.decode(&frame.body) {
        Ok(request) => request,
        Err(e) => {
            debug!(%conn_id, error = %e, "failed to decode request");
            return send_reply(
                conn,
                state,
                ControlReply::error("Received incorrectly formatted JSON string."),
            )
            .await;
        }
    };

    // --- Step 2: Secret ---
    if request.secret.as_deref() != Some(state.secret.as_str()) {
        warn!(%conn_id, %peer, ban = ?state.bans.duration(), "incorrect secret, banning address");
        state.bans.ban(peer.ip());
        return send_reply(conn, state, ControlReply::error("Incorrect secret received.")).await;
    }

    // --- Step 3: Account ---
    let user = match authenticate(state, &request) {
        Ok(user) => user,
        Err(reply) => return send_reply(conn, state, reply).await,
    };

    // --- Step 4: Action ---
    let action = match request.action() {
        Ok(action) => action,
        Err(e) => {
            debug!(%conn_id, error = %e, "bad action");
            return send_reply(conn, state, ControlReply::error("Missing or unknown action.")).await;
        }
    };
    info!(%conn_id, user = %user.username, %action, "control request");

    let reply = match action {
        Action::Host => host(state, &request, &user).await,
        Action::Kill => kill(state, &request).await,
        Action::Upload => upload(&mut conn, state, &request, frame.trailing).await,
    };
    send_reply(conn, state, reply).await
}

fn authenticate(state: &ServerState, request: &ControlRequest) -> Result<UserRecord, ControlReply> {
    let (Some(username), Some(password)) = (request.username.as_deref(), request.password.as_deref()) else {
        return Err(ControlReply::error("Missing username or password."));
    };

    let found = state
        .store
        .check_login(username, password)
        .and_then(|ok| if ok { state.store.get_user(username) } else { Ok(None) });
    match found {
        Ok(Some(user)) if user.activated => Ok(user),
        Ok(Some(_)) => Err(ControlReply::error("Account is not activated.")),
        Ok(None) => {
            debug!(username, "invalid credentials");
            Err(ControlReply::error("Invalid username or password."))
        }
        Err(e) => {
            error!(error = %e, "account store failed");
            Err(ControlReply::error("Account service unavailable."))
        }
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

async fn host(state: &ServerState, request: &ControlRequest, user: &UserRecord) -> ControlReply {
    let host_request = match HostRequest::from_fields(&request.fields, state.field_policy) {
        Ok(host_request) => host_request,
        Err(e) => return ControlReply::error(e.to_string()),
    };

    let owned = state
        .registry
        .handles()
        .iter()
        .filter(|h| h.owner() == user.username)
        .count();
    if owned >= user.server_limit as usize {
        return ControlReply::error(format!("Server limit of {} reached.", user.server_limit));
    }

    let handle = match state.registry.host(host_request, user) {
        Ok(handle) => handle,
        Err(InstanceError::NoFreePort { .. }) => {
            return ControlReply::error("No free ports available.");
        }
        Err(InstanceError::Request(e)) => return ControlReply::error(e.to_string()),
        Err(e) => {
            error!(error = %e, "failed to host server");
            return ControlReply::error("Failed to start server.");
        }
    };

    let port = handle.port();
    if state.startup_wait.is_zero() {
        return ControlReply::ok(format!("Starting server on port {port}."));
    }
    match handle.wait_started(state.startup_wait).await {
        StartupOutcome::Started => ControlReply::ok(format!("Server started on port {port}.")),
        StartupOutcome::Pending => ControlReply::ok(format!("Starting server on port {port}.")),
        StartupOutcome::Failed => ControlReply::error(format!("Server on port {port} failed to start.")),
    }
}

async fn kill(state: &ServerState, request: &ControlRequest) -> ControlReply {
    let Some(port) = request.fields.get("port").and_then(port_value) else {
        return ControlReply::error("Missing or invalid port.");
    };
    if !state.registry.in_range(port) {
        return ControlReply::error(format!("Port {port} is outside the hosting range."));
    }
    let Some(handle) = state.registry.get(port) else {
        return ControlReply::error(format!("No server found on port {port}."));
    };
    if handle.state().is_starting() {
        return ControlReply::error(format!("Server on port {port} is still starting."));
    }

    let reason = handle.kill().await;
    info!(server_id = %handle.id(), port, %reason, "server killed on request");
    ControlReply::ok(format!("Killed server on port {port}."))
}

/// Accepts a JSON number or a numeric string.
fn port_value(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

async fn upload(
    conn: &mut ControlConnection,
    state: &ServerState,
    request: &ControlRequest,
    initial: Vec<u8>,
) -> ControlReply {
    let target = match UploadTarget::from_fields(&request.fields) {
        Ok(target) => target,
        Err(e) => return ControlReply::error(e.to_string()),
    };
    match receive_upload(conn, &target, initial, &state.directories, state.max_upload_bytes).await {
        Ok(_) => ControlReply::ok(format!("Uploaded {}.", target.name)),
        Err(e) => {
            warn!(file = %target.name, error = ?e, "upload failed");
            ControlReply::error(e.to_string())
        }
    }
}

/// Sends the one reply this connection gets and closes it.
async fn send_reply(
    mut conn: ControlConnection,
    state: &ServerState,
    reply: ControlReply,
) -> Result<(), DoomhostError> {
    conn.send_reply(&state.codec, &reply).await?;
    conn.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_port_value_number_and_string() {
        assert_eq!(port_value(&json!(10666)), Some(10666));
        assert_eq!(port_value(&json!("10667")), Some(10667));
        assert_eq!(port_value(&json!(" 10668 ")), Some(10668));
    }

    #[test]
    fn test_port_value_rejects_invalid() {
        assert_eq!(port_value(&json!(70000)), None);
        assert_eq!(port_value(&json!(-1)), None);
        assert_eq!(port_value(&json!(10666.5)), None);
        assert_eq!(port_value(&json!("port")), None);
        assert_eq!(port_value(&json!(true)), None);
    }
}
