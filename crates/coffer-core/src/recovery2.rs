//! Recovery-question login and management.
//!
//! The recovery key is handed to the user out-of-band when recovery is set
//! up; a new device presents it together with the answers. The questions
//! themselves live on the server sealed under the recovery key, so they
//! can be fetched before any authentication happens.

use serde_json::json;

use coffer_crypto::codec::base64_encode;
use coffer_crypto::{decrypt, decrypt_text, encrypt, hmac_sha256, random_bytes};

use crate::auth::{apply_kit, complete_login, server_login, LoginRequestOpts};
use crate::context::LoginContext;
use crate::error::{LoginError, Result};
use crate::types::{LoginKit, LoginPatch, LoginStash, LoginTree, Patch, ServerMethod, StashPatch};
use crate::username::fix_username;

fn recovery2_id(recovery2_key: &[u8], username: &str) -> [u8; 32] {
    hmac_sha256(recovery2_key, username.as_bytes())
}

fn recovery2_auth(recovery2_key: &[u8], answer: &str) -> [u8; 32] {
    hmac_sha256(recovery2_key, answer.as_bytes())
}

/// Log in by answering the recovery questions.
pub async fn login_with_recovery2(
    ctx: &LoginContext,
    recovery2_key: &[u8],
    username: &str,
    answers: &[String],
    opts: &LoginRequestOpts,
) -> Result<LoginTree> {
    let username = fix_username(username)?;
    // Recovery works on devices that have never seen this account.
    let stash_tree = ctx
        .stashes
        .find_stash(&username)
        .await?
        .unwrap_or_else(|| LoginStash {
            username: Some(username.clone()),
            ..Default::default()
        });

    let recovery2_auth: Vec<String> = answers
        .iter()
        .map(|answer| base64_encode(&recovery2_auth(recovery2_key, answer)))
        .collect();
    let auth = json!({
        "recovery2Id": base64_encode(&recovery2_id(recovery2_key, &username)),
        "recovery2Auth": recovery2_auth,
    });
    let reply = server_login(ctx, &stash_tree, &stash_tree, opts, auth).await?;

    let recovery2_box = reply.recovery2_box.as_ref().ok_or(LoginError::Recovery2)?;
    let login_key = decrypt(recovery2_box, recovery2_key).map_err(|_| LoginError::Recovery2)?;
    let (_, login) = complete_login(ctx, &stash_tree, &reply, &login_key).await?;
    Ok(login)
}

/// Fetch the recovery questions for an account, unauthenticated.
pub async fn get_recovery2_questions(
    ctx: &LoginContext,
    recovery2_key: &[u8],
    username: &str,
) -> Result<Vec<String>> {
    let username = fix_username(username)?;
    let request = json!({
        "recovery2Id": base64_encode(&recovery2_id(recovery2_key, &username)),
    });
    let results = ctx
        .server
        .fetch(ServerMethod::Post, "/v2/login", &request, None)
        .await?;
    let reply: crate::types::LoginReply = serde_json::from_value(results)
        .map_err(|err| LoginError::Protocol(format!("malformed login reply: {err}")))?;

    let question2_box = reply.question2_box.as_ref().ok_or(LoginError::Recovery2)?;
    let text =
        decrypt_text(question2_box, recovery2_key).map_err(|_| LoginError::Recovery2)?;
    serde_json::from_str(&text)
        .map_err(|err| LoginError::Protocol(format!("malformed question list: {err}")))
}

/// Build a kit that sets or replaces a node's recovery questions, returning
/// the kit and the fresh recovery key to hand to the user.
pub fn make_recovery2_kit(
    login: &LoginTree,
    username: &str,
    questions: &[String],
    answers: &[String],
) -> Result<(LoginKit, Vec<u8>)> {
    let login_key = login.login_key.as_ref().ok_or(LoginError::MissingAuth)?;
    if questions.len() != answers.len() || questions.is_empty() {
        return Err(LoginError::Recovery2);
    }
    let recovery2_key: [u8; 32] = random_bytes();

    let recovery2_box = encrypt(login_key, &recovery2_key)?;
    let recovery2_key_box = encrypt(&recovery2_key, login_key)?;
    let question_text = serde_json::to_string(questions)
        .map_err(|err| LoginError::Internal(format!("cannot serialize questions: {err}")))?;
    let question2_box = encrypt(question_text.as_bytes(), &recovery2_key)?;
    let recovery2_auth: Vec<String> = answers
        .iter()
        .map(|answer| base64_encode(&recovery2_auth(&recovery2_key, answer)))
        .collect();

    let kit = LoginKit {
        login_id: login.login_id.clone(),
        server_path: "/v2/login/recovery2".into(),
        server: Some(json!({
            "recovery2Id": base64_encode(&recovery2_id(&recovery2_key, username)),
            "recovery2Auth": recovery2_auth,
            "recovery2Box": &recovery2_box,
            "recovery2KeyBox": &recovery2_key_box,
            "question2Box": &question2_box,
        })),
        stash: StashPatch {
            recovery2_key: Patch::Set(recovery2_key.to_vec()),
            ..Default::default()
        },
        login: LoginPatch {
            recovery2_key: Patch::Set(recovery2_key.to_vec()),
            ..Default::default()
        },
        ..Default::default()
    };
    Ok((kit, recovery2_key.to_vec()))
}

/// Set or replace the account's recovery questions. Returns the new trees
/// and the recovery key the user must keep.
pub async fn change_recovery(
    ctx: &LoginContext,
    stash_tree: &LoginStash,
    login_tree: &LoginTree,
    questions: &[String],
    answers: &[String],
) -> Result<(LoginStash, LoginTree, Vec<u8>)> {
    let username = stash_tree
        .username
        .clone()
        .ok_or(LoginError::InvalidUsername)?;
    let (kit, recovery2_key) = make_recovery2_kit(login_tree, &username, questions, answers)?;
    let (stash_tree, login_tree) = apply_kit(ctx, stash_tree, login_tree, &kit).await?;
    Ok((stash_tree, login_tree, recovery2_key))
}

/// Remove recovery from server, memory, and disk.
pub async fn delete_recovery2(
    ctx: &LoginContext,
    stash_tree: &LoginStash,
    login_tree: &LoginTree,
) -> Result<(LoginStash, LoginTree)> {
    let kit = LoginKit {
        login_id: login_tree.login_id.clone(),
        server_method: ServerMethod::Delete,
        server_path: "/v2/login/recovery2".into(),
        server: None,
        stash: StashPatch {
            recovery2_key: Patch::Clear,
            ..Default::default()
        },
        login: LoginPatch {
            recovery2_key: Patch::Clear,
            ..Default::default()
        },
    };
    apply_kit(ctx, stash_tree, login_tree, &kit).await
}
