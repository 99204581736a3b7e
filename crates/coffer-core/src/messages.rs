//! Pending-state polling for every account on this device.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;

use coffer_crypto::codec::base64_encode;

use crate::context::LoginContext;
use crate::error::{LoginError, Result};
use crate::types::{LoginMessage, ServerMethod};

/// Timeout for the messages endpoint. Polling competes with interactive
/// traffic, so it gets its own budget rather than the transport default.
const MESSAGES_TIMEOUT: Duration = Duration::from_secs(30);

/// Ask the server about pending resets and vouchers for every stash on
/// disk. Returns messages keyed by username.
pub async fn fetch_login_messages(ctx: &LoginContext) -> Result<HashMap<String, LoginMessage>> {
    let stashes = ctx.stashes.load_stashes().await?;

    let mut usernames: HashMap<String, String> = HashMap::new();
    for stash in &stashes {
        if let Some(username) = &stash.username {
            if !stash.login_id.is_empty() {
                usernames.insert(base64_encode(&stash.login_id), username.clone());
            }
        }
    }

    let login_ids: Vec<&String> = usernames.keys().collect();
    let request = json!({ "loginIds": login_ids });
    let results = ctx
        .server
        .fetch(
            ServerMethod::Post,
            "/api/v2/messages",
            &request,
            Some(MESSAGES_TIMEOUT),
        )
        .await?;
    let payload: Vec<LoginMessage> = serde_json::from_value(results)
        .map_err(|err| LoginError::Protocol(format!("malformed messages payload: {err}")))?;

    let mut out = HashMap::new();
    for message in payload {
        if let Some(username) = usernames.get(&base64_encode(&message.login_id)) {
            out.insert(username.clone(), message);
        }
    }
    Ok(out)
}
