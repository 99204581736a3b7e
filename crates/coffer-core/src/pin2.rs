//! PIN login and management.
//!
//! The PIN never reaches the server. A random `pin2Key` lives in the local
//! stash; the server sees only `pin2Id` (which account) and `pin2Auth`
//! (proof the device knows the PIN), both HMACs under that key. PINs are
//! scoped per app id.

use serde_json::json;

use coffer_crypto::codec::base64_encode;
use coffer_crypto::{decrypt, encrypt, hmac_sha256, random_bytes};

use crate::auth::{apply_kit, complete_login, server_login, LoginRequestOpts};
use crate::context::LoginContext;
use crate::error::{LoginError, Result};
use crate::tree::search_tree;
use crate::types::{LoginKit, LoginPatch, LoginStash, LoginTree, Patch, ServerMethod, StashPatch};
use crate::username::fix_username;

fn pin2_id(pin2_key: &[u8], username: &str) -> [u8; 32] {
    hmac_sha256(pin2_key, username.as_bytes())
}

fn pin2_auth(pin2_key: &[u8], pin: &str) -> [u8; 32] {
    hmac_sha256(pin2_key, pin.as_bytes())
}

/// Log in with a PIN, using the `pin2Key` cached in the local stash for
/// this context's app id.
pub async fn login_with_pin2(
    ctx: &LoginContext,
    username: &str,
    pin: &str,
    opts: &LoginRequestOpts,
) -> Result<LoginTree> {
    let username = fix_username(username)?;
    let stash_tree = ctx
        .stashes
        .find_stash(&username)
        .await?
        .ok_or(LoginError::Pin2)?;
    let stash = search_tree(&stash_tree, &|stash: &LoginStash| {
        stash.app_id == ctx.app_id && stash.pin2_key.is_some()
    })
    .ok_or(LoginError::Pin2)?;
    let pin2_key = stash.pin2_key.clone().ok_or(LoginError::Pin2)?;

    let auth = json!({
        "pin2Id": base64_encode(&pin2_id(&pin2_key, &username)),
        "pin2Auth": base64_encode(&pin2_auth(&pin2_key, pin)),
    });
    let reply = server_login(ctx, &stash_tree, stash, opts, auth).await?;

    let pin2_box = reply.pin2_box.as_ref().ok_or(LoginError::Pin2)?;
    let login_key = decrypt(pin2_box, &pin2_key).map_err(|_| LoginError::Pin2)?;
    let (_, login) = complete_login(ctx, &stash_tree, &reply, &login_key).await?;
    Ok(login)
}

/// Build a kit that sets or replaces a node's PIN.
pub fn make_pin2_kit(login: &LoginTree, username: &str, pin: &str) -> Result<LoginKit> {
    let login_key = login.login_key.as_ref().ok_or(LoginError::MissingAuth)?;
    let pin2_key: [u8; 32] = random_bytes();

    let pin2_box = encrypt(login_key, &pin2_key)?;
    let pin2_key_box = encrypt(&pin2_key, login_key)?;
    let pin2_text_box = encrypt(pin.as_bytes(), login_key)?;

    Ok(LoginKit {
        login_id: login.login_id.clone(),
        server_path: "/v2/login/pin2".into(),
        server: Some(json!({
            "pin2Id": base64_encode(&pin2_id(&pin2_key, username)),
            "pin2Auth": base64_encode(&pin2_auth(&pin2_key, pin)),
            "pin2Box": &pin2_box,
            "pin2KeyBox": &pin2_key_box,
            "pin2TextBox": &pin2_text_box,
        })),
        stash: StashPatch {
            pin2_key: Patch::Set(pin2_key.to_vec()),
            pin2_text_box: Patch::Set(pin2_text_box),
            ..Default::default()
        },
        login: LoginPatch {
            pin: Patch::Set(pin.to_string()),
            pin2_key: Patch::Set(pin2_key.to_vec()),
            ..Default::default()
        },
        ..Default::default()
    })
}

/// Set or replace the PIN for this context's app id.
pub async fn change_pin(
    ctx: &LoginContext,
    stash_tree: &LoginStash,
    login_tree: &LoginTree,
    pin: &str,
) -> Result<(LoginStash, LoginTree)> {
    let username = stash_tree
        .username
        .clone()
        .ok_or(LoginError::InvalidUsername)?;
    let login = search_tree(login_tree, &|login: &LoginTree| login.app_id == ctx.app_id)
        .ok_or(LoginError::MissingLogin)?;
    let kit = make_pin2_kit(login, &username, pin)?;
    apply_kit(ctx, stash_tree, login_tree, &kit).await
}

/// Remove the PIN for this context's app id from server, memory, and disk.
pub async fn delete_pin(
    ctx: &LoginContext,
    stash_tree: &LoginStash,
    login_tree: &LoginTree,
) -> Result<(LoginStash, LoginTree)> {
    let login = search_tree(login_tree, &|login: &LoginTree| login.app_id == ctx.app_id)
        .ok_or(LoginError::MissingLogin)?;
    let kit = LoginKit {
        login_id: login.login_id.clone(),
        server_method: ServerMethod::Delete,
        server_path: "/v2/login/pin2".into(),
        server: None,
        stash: StashPatch {
            pin2_key: Patch::Clear,
            pin2_text_box: Patch::Clear,
            ..Default::default()
        },
        login: LoginPatch {
            pin: Patch::Clear,
            pin2_key: Patch::Clear,
            ..Default::default()
        },
    };
    apply_kit(ctx, stash_tree, login_tree, &kit).await
}
