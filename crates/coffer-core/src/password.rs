//! Password login and management.
//!
//! The password stretches twice: once with the fixed username-id SNRP into
//! `passwordAuth` (what the server checks), and once with device-tuned
//! parameters into `passwordKey` (what seals the login key). The server
//! never sees anything that can open a box.

use serde_json::json;
use zeroize::Zeroize;

use coffer_crypto::codec::base64_encode;
use coffer_crypto::{decrypt, encrypt, username_id_snrp};

use crate::auth::{apply_kit, complete_login, server_login, LoginRequestOpts};
use crate::context::LoginContext;
use crate::error::{LoginError, Result};
use crate::types::{LoginKit, LoginPatch, LoginStash, LoginTree, Patch, StashPatch};
use crate::username::fix_username;

/// Build a kit that sets or replaces a node's password.
pub async fn make_password_kit(
    ctx: &LoginContext,
    login: &LoginTree,
    username: &str,
    password: &str,
) -> Result<LoginKit> {
    let login_key = login.login_key.as_ref().ok_or(LoginError::MissingAuth)?;
    let up = format!("{username}{password}");

    let auth_snrp = username_id_snrp();
    let mut password_auth = ctx.scrypt.derive(up.clone().into_bytes(), &auth_snrp).await?;
    let key_snrp = ctx.scrypt.make_snrp().await?;
    let mut password_key = ctx.scrypt.derive(up.into_bytes(), &key_snrp).await?;

    let password_box = encrypt(login_key, &password_key)?;
    let password_auth_box = encrypt(&password_auth, login_key)?;
    password_key.zeroize();

    let kit = LoginKit {
        login_id: login.login_id.clone(),
        server_path: "/v2/login/password".into(),
        server: Some(json!({
            "passwordAuth": base64_encode(&password_auth),
            "passwordAuthSnrp": &auth_snrp,
            "passwordBox": &password_box,
            "passwordKeySnrp": &key_snrp,
        })),
        stash: StashPatch {
            password_auth_box: Patch::Set(password_auth_box),
            password_auth_snrp: Patch::Set(auth_snrp),
            password_box: Patch::Set(password_box),
            password_key_snrp: Patch::Set(key_snrp),
            ..Default::default()
        },
        login: LoginPatch {
            user_id: Patch::Set(login.login_id.clone()),
            password_auth: Patch::Set(password_auth.to_vec()),
            ..Default::default()
        },
        ..Default::default()
    };
    password_auth.zeroize();
    Ok(kit)
}

/// Log in with a username and password.
pub async fn login_with_password(
    ctx: &LoginContext,
    username: &str,
    password: &str,
    opts: &LoginRequestOpts,
) -> Result<LoginTree> {
    let username = fix_username(username)?;
    let stash_tree = ctx
        .stashes
        .find_stash(&username)
        .await?
        .unwrap_or_else(|| LoginStash {
            username: Some(username.clone()),
            ..Default::default()
        });

    let up = format!("{username}{password}");
    let auth_snrp = stash_tree
        .password_auth_snrp
        .clone()
        .unwrap_or_else(username_id_snrp);
    let user_id = ctx.scrypt.hash_username(&username).await?;
    let password_auth = ctx.scrypt.derive(up.clone().into_bytes(), &auth_snrp).await?;

    let auth = json!({
        "userId": base64_encode(&user_id),
        "passwordAuth": base64_encode(&password_auth),
    });
    let reply = server_login(ctx, &stash_tree, &stash_tree, opts, auth).await?;

    let password_box = reply.password_box.as_ref().ok_or(LoginError::Password)?;
    let key_snrp = reply
        .password_key_snrp
        .clone()
        .ok_or(LoginError::Password)?;
    let mut password_key = ctx.scrypt.derive(up.into_bytes(), &key_snrp).await?;
    let login_key = decrypt(password_box, &password_key).map_err(|_| LoginError::Password)?;
    password_key.zeroize();

    let (_, login) = complete_login(ctx, &stash_tree, &reply, &login_key).await?;
    Ok(login)
}

/// Replace the account password on server, memory, and disk.
pub async fn change_password(
    ctx: &LoginContext,
    stash_tree: &LoginStash,
    login_tree: &LoginTree,
    password: &str,
) -> Result<(LoginStash, LoginTree)> {
    let username = stash_tree
        .username
        .clone()
        .ok_or(LoginError::InvalidUsername)?;
    let kit = make_password_kit(ctx, login_tree, &username, password).await?;
    apply_kit(ctx, stash_tree, login_tree, &kit).await
}

/// Check a password locally against the logged-in tree, with no server
/// round trip.
pub async fn check_password(
    ctx: &LoginContext,
    stash_tree: &LoginStash,
    login: &LoginTree,
    password: &str,
) -> Result<bool> {
    let Some(password_auth) = &login.password_auth else {
        return Ok(false);
    };
    let username = stash_tree
        .username
        .clone()
        .ok_or(LoginError::InvalidUsername)?;
    let auth_snrp = stash_tree
        .password_auth_snrp
        .clone()
        .unwrap_or_else(username_id_snrp);
    let candidate = ctx
        .scrypt
        .derive(format!("{username}{password}").into_bytes(), &auth_snrp)
        .await?;
    Ok(password_auth.as_slice() == candidate)
}
