//! Account and sub-login creation.

use chrono::Utc;
use serde_json::{json, Value};

use coffer_crypto::codec::base64_encode;
use coffer_crypto::{encrypt, random_bytes};

use crate::auth::apply_kit;
use crate::context::LoginContext;
use crate::error::{LoginError, Result};
use crate::keys::make_keys_kit;
use crate::password::make_password_kit;
use crate::pin2::make_pin2_kit;
use crate::tree::search_tree;
use crate::types::{
    LoginKit, LoginPatch, LoginStash, LoginTree, ServerMethod, StashPatch, WalletInfo,
};
use crate::username::fix_username;

/// Optional credentials and keys to install on a brand-new account.
#[derive(Clone, Debug, Default)]
pub struct AccountOpts {
    pub password: Option<String>,
    pub pin: Option<String>,
    pub key_infos: Vec<WalletInfo>,
}

/// Create a root account on the server and persist its stash.
///
/// The root's identity is derived from the username; children get random
/// identities. Password, PIN, and wallet keys fold into the creation
/// payload so the account comes up complete in one call.
pub async fn create_login(
    ctx: &LoginContext,
    username: &str,
    opts: &AccountOpts,
) -> Result<LoginTree> {
    let username = fix_username(username)?;
    let login_id = ctx.scrypt.hash_username(&username).await?;
    let login_key: [u8; 32] = random_bytes();
    let login_auth: [u8; 32] = random_bytes();
    let login_auth_box = encrypt(&login_auth, &login_key)?;
    let now = Utc::now();

    let mut stash = LoginStash {
        login_id: login_id.to_vec(),
        username: Some(username.clone()),
        created: Some(now),
        login_auth_box: Some(login_auth_box.clone()),
        ..Default::default()
    };
    let mut login = LoginTree {
        login_id: login_id.to_vec(),
        username: Some(username.clone()),
        created: Some(now),
        last_login: Some(now),
        login_key: Some(login_key.to_vec()),
        login_auth: Some(login_auth.to_vec()),
        ..Default::default()
    };

    let mut data = serde_json::Map::new();
    data.insert("appId".into(), "".into());
    data.insert("loginId".into(), base64_encode(&login_id).into());
    data.insert("loginAuth".into(), base64_encode(&login_auth).into());
    data.insert(
        "loginAuthBox".into(),
        serde_json::to_value(&login_auth_box)
            .map_err(|err| LoginError::Internal(err.to_string()))?,
    );

    // Fold the optional sub-kits into the creation payload and both trees.
    let mut kits = Vec::new();
    if let Some(password) = &opts.password {
        kits.push(make_password_kit(ctx, &login, &username, password).await?);
    }
    if let Some(pin) = &opts.pin {
        kits.push(make_pin2_kit(&login, &username, pin)?);
    }
    if !opts.key_infos.is_empty() {
        kits.push(make_keys_kit(&login, &opts.key_infos)?);
    }
    for kit in kits {
        if let Some(Value::Object(fields)) = kit.server {
            data.extend(fields);
        }
        stash = kit.stash.merge_into(&stash);
        login = kit.login.merge_into(&login)?;
    }

    let request = json!({ "data": Value::Object(data) });
    ctx.server
        .fetch(ServerMethod::Post, "/v2/login/create", &request, None)
        .await?;

    stash.last_login = Some(now);
    ctx.stashes.save_stash(&stash).await?;
    Ok(login)
}

/// Build a kit that creates a child login under `parent` for an app id.
///
/// The child's login key is sealed under the parent's as its `parentBox`,
/// which is what makes the tree a tree.
pub fn make_create_kit(parent: &LoginTree, app_id: &str) -> Result<LoginKit> {
    let parent_key = parent.login_key.as_ref().ok_or(LoginError::MissingAuth)?;
    let login_id: [u8; 32] = random_bytes();
    let login_key: [u8; 32] = random_bytes();
    let login_auth: [u8; 32] = random_bytes();

    let login_auth_box = encrypt(&login_auth, &login_key)?;
    let parent_box = encrypt(&login_key, parent_key)?;

    let child_stash = LoginStash {
        app_id: app_id.to_string(),
        login_id: login_id.to_vec(),
        login_auth_box: Some(login_auth_box.clone()),
        parent_box: Some(parent_box.clone()),
        ..Default::default()
    };
    let child_login = LoginTree {
        app_id: app_id.to_string(),
        login_id: login_id.to_vec(),
        last_login: Some(Utc::now()),
        login_key: Some(login_key.to_vec()),
        login_auth: Some(login_auth.to_vec()),
        ..Default::default()
    };

    Ok(LoginKit {
        login_id: parent.login_id.clone(),
        server_path: "/v2/login/create".into(),
        server: Some(json!({
            "appId": app_id,
            "loginId": base64_encode(&login_id),
            "loginAuth": base64_encode(&login_auth),
            "loginAuthBox": &login_auth_box,
            "parentBox": &parent_box,
        })),
        stash: StashPatch {
            children: vec![child_stash],
            ..Default::default()
        },
        login: LoginPatch {
            children: vec![child_login],
            ..Default::default()
        },
        ..Default::default()
    })
}

/// Make sure a child login exists for an app id, creating one on the
/// server if needed. Returns the up-to-date trees.
pub async fn create_child_login(
    ctx: &LoginContext,
    stash_tree: &LoginStash,
    login_tree: &LoginTree,
    app_id: &str,
) -> Result<(LoginStash, LoginTree)> {
    if search_tree(login_tree, &|login: &LoginTree| login.app_id == app_id).is_some() {
        return Ok((stash_tree.clone(), login_tree.clone()));
    }
    let kit = make_create_kit(login_tree, app_id)?;
    apply_kit(ctx, stash_tree, login_tree, &kit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use coffer_crypto::decrypt;

    #[test]
    fn test_make_create_kit_links_child_to_parent() {
        let parent_key = [9u8; 32];
        let parent = LoginTree {
            login_id: vec![1; 32],
            login_key: Some(parent_key.to_vec()),
            ..Default::default()
        };
        let kit = make_create_kit(&parent, "app.child").unwrap();

        // The kit targets the parent, so the child attaches under it.
        assert_eq!(kit.login_id, parent.login_id);
        let child_stash = &kit.stash.children[0];
        let child_login = &kit.login.children[0];
        assert_eq!(child_stash.app_id, "app.child");
        assert_eq!(child_stash.login_id.len(), 32);
        assert_ne!(child_stash.login_id, parent.login_id);

        // The parentBox opens under the parent's key to the child's key.
        let opened = decrypt(child_stash.parent_box.as_ref().unwrap(), &parent_key).unwrap();
        assert_eq!(Some(opened), child_login.login_key);
    }
}
