//! Server authentication and the kit update protocol.

use chrono::Utc;
use serde_json::{json, Value};

use coffer_crypto::codec::base64_encode;
use coffer_crypto::totp;

use crate::builder::make_login_tree;
use crate::context::LoginContext;
use crate::error::{LoginError, Result};
use crate::reply::apply_login_reply;
use crate::tree::{default_clone, search_tree, update_tree};
use crate::types::{LoginKit, LoginReply, LoginStash, LoginTree, ServerMethod};

/// Caller-supplied 2-factor options for a login attempt.
#[derive(Clone, Debug, Default)]
pub struct LoginRequestOpts {
    /// A user-typed 2-factor code, or a full base32 OTP secret recovered
    /// from a backup.
    pub otp: Option<String>,
    /// An explicit OTP secret overriding whatever the stash has.
    pub otp_key: Option<String>,
}

/// Pick the 2-factor code for a request, if any.
///
/// A short digit string is a user-typed code and passes through verbatim;
/// anything longer is treated as a base32 secret. Otherwise fall back to
/// an explicit key, then the stash's own.
pub fn get_stash_otp(stash: &LoginStash, opts: &LoginRequestOpts) -> Result<Option<String>> {
    if let Some(otp) = &opts.otp {
        if otp.len() < 16 && otp.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Some(otp.clone()));
        }
        return Ok(Some(totp(otp)?));
    }
    if let Some(otp_key) = opts.otp_key.as_ref().or(stash.otp_key.as_ref()) {
        return Ok(Some(totp(otp_key)?));
    }
    Ok(None)
}

/// Build the authentication fields for a server call, using the strongest
/// method the node supports.
pub fn make_auth_json(stash_tree: &LoginStash, login: &LoginTree) -> Result<Value> {
    let stash = search_tree(stash_tree, &|stash: &LoginStash| {
        stash.app_id == login.app_id
    });

    let mut auth = serde_json::Map::new();
    if let Some(login_auth) = &login.login_auth {
        auth.insert("loginId".into(), base64_encode(&login.login_id).into());
        auth.insert("loginAuth".into(), base64_encode(login_auth).into());
    } else if let Some(password_auth) = &login.password_auth {
        let user_id = login.user_id.as_ref().ok_or(LoginError::NoAuth)?;
        auth.insert("userId".into(), base64_encode(user_id).into());
        auth.insert("passwordAuth".into(), base64_encode(password_auth).into());
    } else {
        return Err(LoginError::NoAuth);
    }

    if let Some(otp_key) = &login.otp_key {
        auth.insert("otp".into(), totp(otp_key)?.into());
    }
    if let Some(stash) = stash {
        if let Some(voucher_id) = &stash.voucher_id {
            auth.insert("voucherId".into(), voucher_id.clone().into());
        }
        if let Some(voucher_auth) = &stash.voucher_auth {
            auth.insert("voucherAuth".into(), base64_encode(voucher_auth).into());
        }
    }
    Ok(Value::Object(auth))
}

/// POST a login attempt and return the parsed reply.
///
/// `stash` is the node within `stash_tree` being authenticated against,
/// and supplies the OTP secret and any stored voucher. A 2-factor
/// rejection that identifies the account or hands out a voucher is
/// persisted best-effort before the error continues up, so the next
/// attempt can present the voucher.
pub(crate) async fn server_login(
    ctx: &LoginContext,
    stash_tree: &LoginStash,
    stash: &LoginStash,
    opts: &LoginRequestOpts,
    auth: Value,
) -> Result<LoginReply> {
    let Value::Object(mut request) = auth else {
        return Err(LoginError::Internal("auth fields must be an object".into()));
    };
    if let Some(otp) = get_stash_otp(stash, opts)? {
        request.insert("otp".into(), otp.into());
    }
    if let Some(voucher_id) = &stash.voucher_id {
        request.insert("voucherId".into(), voucher_id.clone().into());
    }
    if let Some(voucher_auth) = &stash.voucher_auth {
        request.insert("voucherAuth".into(), base64_encode(voucher_auth).into());
    }
    if let Some(description) = &ctx.device_description {
        request.insert("deviceDescription".into(), description.clone().into());
    }

    let results = match ctx
        .server
        .fetch(ServerMethod::Post, "/v2/login", &Value::Object(request), None)
        .await
    {
        Err(LoginError::Otp(challenge)) => {
            let first_sighting = stash.login_id.is_empty();
            let fresh_voucher =
                challenge.voucher_id.is_some() || challenge.voucher_auth.is_some();
            if challenge.login_id.is_some() && (first_sighting || fresh_voucher) {
                let app_id = stash.app_id.clone();
                let mut updated = update_tree(
                    stash_tree,
                    |stash: &LoginStash| stash.app_id == app_id,
                    |stash| {
                        let mut stash = stash.clone();
                        if let Some(login_id) = &challenge.login_id {
                            stash.login_id = login_id.clone();
                        }
                        if challenge.voucher_id.is_some() {
                            stash.voucher_id = challenge.voucher_id.clone();
                        }
                        if challenge.voucher_auth.is_some() {
                            stash.voucher_auth = challenge.voucher_auth.clone();
                        }
                        Ok::<_, LoginError>(stash)
                    },
                    default_clone,
                )?;
                updated.last_login = Some(Utc::now());
                if let Err(err) = ctx.stashes.save_stash(&updated).await {
                    tracing::warn!(%err, "cannot persist 2-factor voucher state");
                }
            }
            return Err(LoginError::Otp(challenge));
        }
        other => other?,
    };

    serde_json::from_value(results)
        .map_err(|err| LoginError::Protocol(format!("malformed login reply: {err}")))
}

/// Finish a successful login: reconcile the reply into the stash, stamp
/// the login time, persist, and build the in-memory tree.
pub(crate) async fn complete_login(
    ctx: &LoginContext,
    stash_tree: &LoginStash,
    reply: &LoginReply,
    login_key: &[u8],
) -> Result<(LoginStash, LoginTree)> {
    let mut stash_tree = apply_login_reply(stash_tree, login_key, reply)?;
    stash_tree.last_login = Some(Utc::now());
    ctx.stashes.save_stash(&stash_tree).await?;
    let login = make_login_tree(&stash_tree, login_key, &reply.app_id)?;
    Ok((stash_tree, login))
}

/// Re-sync a logged-in node with the server, treating the reply as
/// authoritative.
pub async fn sync_login(
    ctx: &LoginContext,
    stash_tree: &LoginStash,
    login: &LoginTree,
) -> Result<(LoginStash, LoginTree)> {
    let login_key = login.login_key.clone().ok_or(LoginError::MissingAuth)?;
    let auth = make_auth_json(stash_tree, login)?;
    let results = ctx
        .server
        .fetch(ServerMethod::Post, "/v2/login", &auth, None)
        .await?;
    let reply: LoginReply = serde_json::from_value(results)
        .map_err(|err| LoginError::Protocol(format!("malformed login reply: {err}")))?;
    complete_login(ctx, stash_tree, &reply, &login_key).await
}

/// Apply one kit: server first, then memory, then disk.
///
/// If the disk write fails after the server call, memory and server are
/// already current; the error surfaces so the caller can retry the save.
pub async fn apply_kit(
    ctx: &LoginContext,
    stash_tree: &LoginStash,
    login_tree: &LoginTree,
    kit: &LoginKit,
) -> Result<(LoginStash, LoginTree)> {
    let login = search_tree(login_tree, &|login: &LoginTree| {
        login.login_id == kit.login_id
    })
    .ok_or(LoginError::MissingLogin)?;

    let mut request = match make_auth_json(stash_tree, login)? {
        Value::Object(map) => map,
        _ => return Err(LoginError::Internal("auth fields must be an object".into())),
    };
    if let Some(data) = &kit.server {
        request.insert("data".into(), data.clone());
    }
    ctx.server
        .fetch(
            kit.server_method,
            &kit.server_path,
            &Value::Object(request),
            None,
        )
        .await?;

    let new_login_tree = update_tree(
        login_tree,
        |login: &LoginTree| login.login_id == kit.login_id,
        |login| kit.login.merge_into(login),
        default_clone,
    )?;
    let new_stash_tree = update_tree(
        stash_tree,
        |stash: &LoginStash| stash.login_id == kit.login_id,
        |stash| Ok::<_, LoginError>(kit.stash.merge_into(stash)),
        default_clone,
    )?;
    ctx.stashes.save_stash(&new_stash_tree).await?;
    Ok((new_stash_tree, new_login_tree))
}

/// Apply kits strictly one after another, each seeing the trees the
/// previous one produced. Kits touch overlapping subtrees, so running
/// them concurrently would lose updates.
pub async fn apply_kits(
    ctx: &LoginContext,
    stash_tree: &LoginStash,
    login_tree: &LoginTree,
    kits: &[LoginKit],
) -> Result<(LoginStash, LoginTree)> {
    let mut state = (stash_tree.clone(), login_tree.clone());
    for kit in kits {
        state = apply_kit(ctx, &state.0, &state.1, kit).await?;
    }
    Ok(state)
}

/// Reduce a stash tree for sharing with an app of narrower scope: the
/// requested subtree stays intact, every other node keeps only its
/// identity and children.
pub fn sanitize_login_stash(stash_tree: &LoginStash, app_id: &str) -> LoginStash {
    let result = update_tree(
        stash_tree,
        |stash: &LoginStash| stash.app_id == app_id,
        |stash| Ok::<_, std::convert::Infallible>(stash.clone()),
        |stash, children| LoginStash {
            app_id: stash.app_id.clone(),
            login_id: stash.login_id.clone(),
            username: stash.username.clone(),
            children,
            ..Default::default()
        },
    );
    match result {
        Ok(stash) => stash,
        Err(never) => match never {},
    }
}

/// Build a login tree straight from the local stash with a caller-held
/// login key; no server round trip. This is the "return login" path for
/// devices that keep the key in secure storage.
pub async fn login_with_key(
    ctx: &LoginContext,
    username: &str,
    login_key: &[u8],
) -> Result<LoginTree> {
    let stash_tree = ctx
        .stashes
        .find_stash(username)
        .await?
        .ok_or(LoginError::Username)?;
    make_login_tree(&stash_tree, login_key, &ctx.app_id)
}

/// Probe whether a username has an account, without authenticating.
pub async fn username_available(ctx: &LoginContext, username: &str) -> Result<bool> {
    let user_id = ctx.scrypt.hash_username(username).await?;
    let request = json!({ "userId": base64_encode(&user_id) });
    match ctx
        .server
        .fetch(ServerMethod::Post, "/v2/login", &request, None)
        .await
    {
        Err(LoginError::Username) => Ok(true),
        Err(LoginError::Password) | Ok(_) => Ok(false),
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_both_secrets() -> LoginTree {
        LoginTree {
            login_id: vec![1; 32],
            user_id: Some(vec![2; 32]),
            login_auth: Some(vec![3; 32]),
            password_auth: Some(vec![4; 32]),
            ..Default::default()
        }
    }

    #[test]
    fn test_auth_json_prefers_login_auth() {
        let login = tree_with_both_secrets();
        let auth = make_auth_json(&LoginStash::default(), &login).unwrap();
        assert!(auth.get("loginAuth").is_some());
        assert!(auth.get("loginId").is_some());
        assert!(auth.get("passwordAuth").is_none());
        // No otpKey on the node: no otp field at all.
        assert!(auth.get("otp").is_none());
    }

    #[test]
    fn test_auth_json_falls_back_to_password_auth() {
        let mut login = tree_with_both_secrets();
        login.login_auth = None;
        let auth = make_auth_json(&LoginStash::default(), &login).unwrap();
        assert!(auth.get("passwordAuth").is_some());
        assert!(auth.get("userId").is_some());
        assert!(auth.get("loginAuth").is_none());
    }

    #[test]
    fn test_auth_json_with_no_secrets_fails() {
        let mut login = tree_with_both_secrets();
        login.login_auth = None;
        login.password_auth = None;
        assert_eq!(
            make_auth_json(&LoginStash::default(), &login),
            Err(LoginError::NoAuth)
        );
    }

    #[test]
    fn test_auth_json_includes_otp_and_voucher() {
        let mut login = tree_with_both_secrets();
        login.otp_key = Some("GEZDGNBVGY3TQOJQ".into());
        let stash = LoginStash {
            voucher_id: Some("voucher-1".into()),
            voucher_auth: Some(vec![9; 8]),
            ..Default::default()
        };
        let auth = make_auth_json(&stash, &login).unwrap();
        let otp = auth["otp"].as_str().unwrap();
        assert_eq!(otp.len(), 6);
        assert!(otp.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(auth["voucherId"], "voucher-1");
        assert!(auth.get("voucherAuth").is_some());
    }

    #[test]
    fn test_get_stash_otp_user_typed_code_passes_through() {
        let opts = LoginRequestOpts {
            otp: Some("123456".into()),
            ..Default::default()
        };
        let otp = get_stash_otp(&LoginStash::default(), &opts).unwrap();
        assert_eq!(otp.as_deref(), Some("123456"));
    }

    #[test]
    fn test_get_stash_otp_long_secret_becomes_code() {
        let opts = LoginRequestOpts {
            otp: Some("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ".into()),
            ..Default::default()
        };
        let otp = get_stash_otp(&LoginStash::default(), &opts)
            .unwrap()
            .unwrap();
        assert_eq!(otp.len(), 6);
        assert!(otp.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_get_stash_otp_falls_back_to_stash_key() {
        let stash = LoginStash {
            otp_key: Some("GEZDGNBVGY3TQOJQ".into()),
            ..Default::default()
        };
        let otp = get_stash_otp(&stash, &LoginRequestOpts::default()).unwrap();
        assert!(otp.is_some());
        assert!(
            get_stash_otp(&LoginStash::default(), &LoginRequestOpts::default())
                .unwrap()
                .is_none()
        );
    }

    fn two_app_tree() -> LoginStash {
        LoginStash {
            login_id: vec![1; 32],
            username: Some("edge".into()),
            otp_key: Some("SECRET".into()),
            children: vec![
                LoginStash {
                    app_id: "app.a".into(),
                    login_id: vec![2; 32],
                    pin2_key: Some(vec![7; 32]),
                    ..Default::default()
                },
                LoginStash {
                    app_id: "app.b".into(),
                    login_id: vec![3; 32],
                    pin2_key: Some(vec![8; 32]),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_sanitize_hides_sibling_apps() {
        let tree = two_app_tree();
        let out = sanitize_login_stash(&tree, "app.b");

        // The root is reduced to identity: its OTP secret is gone.
        assert_eq!(out.otp_key, None);
        assert_eq!(out.username.as_deref(), Some("edge"));
        assert_eq!(out.children.len(), 2);

        // The sibling is stripped, the target is intact.
        assert_eq!(out.children[0].app_id, "app.a");
        assert_eq!(out.children[0].pin2_key, None);
        assert_eq!(out.children[1].app_id, "app.b");
        assert_eq!(out.children[1].pin2_key, Some(vec![8; 32]));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let tree = two_app_tree();
        let once = sanitize_login_stash(&tree, "app.b");
        let twice = sanitize_login_stash(&once, "app.b");
        assert_eq!(once, twice);
    }
}
