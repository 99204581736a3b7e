//! Decrypting a stash tree into an in-memory login tree.

use chrono::Utc;
use serde_json::json;

use coffer_crypto::codec::base64_encode;
use coffer_crypto::{decrypt, decrypt_text, hmac_sha256, EncryptedBox};

use crate::error::{LoginError, Result};
use crate::keys::{account_type, fix_wallet_info, make_key_info, merge_key_infos};
use crate::tree::update_tree;
use crate::types::{LoginStash, LoginTree, WalletInfo};

/// Open an allowlisted envelope, mapping any failure to a key-integrity
/// error naming the field.
pub(crate) fn open_box(envelope: &EncryptedBox, key: &[u8], field: &str) -> Result<Vec<u8>> {
    decrypt(envelope, key).map_err(|_| LoginError::KeyIntegrity(format!("cannot decrypt {field}")))
}

/// Decrypt the subtree rooted at `app_id` with the given login key.
///
/// Nodes outside that subtree come back as bare identity shells: callers
/// can walk an app id they don't own without ever seeing key material
/// for it.
pub fn make_login_tree(
    stash_tree: &LoginStash,
    login_key: &[u8],
    app_id: &str,
) -> Result<LoginTree> {
    update_tree(
        stash_tree,
        |stash: &LoginStash| stash.app_id == app_id,
        |stash| make_login_tree_inner(stash, login_key),
        |stash, children| LoginTree {
            app_id: stash.app_id.clone(),
            login_id: stash.login_id.clone(),
            username: stash.username.clone(),
            children,
            ..Default::default()
        },
    )
}

fn make_login_tree_inner(stash: &LoginStash, login_key: &[u8]) -> Result<LoginTree> {
    // Authentication secrets. Every usable node has at least one.
    let login_auth = stash
        .login_auth_box
        .as_ref()
        .map(|envelope| open_box(envelope, login_key, "loginAuthBox"))
        .transpose()?;
    let password_auth = stash
        .password_auth_box
        .as_ref()
        .map(|envelope| open_box(envelope, login_key, "passwordAuthBox"))
        .transpose()?;
    if login_auth.is_none() && password_auth.is_none() {
        return Err(LoginError::MissingAuth);
    }
    let user_id = stash.user_id.clone().or_else(|| {
        password_auth
            .is_some()
            .then(|| stash.login_id.clone())
    });

    let pin = stash
        .pin2_text_box
        .as_ref()
        .map(|envelope| {
            decrypt_text(envelope, login_key)
                .map_err(|_| LoginError::KeyIntegrity("cannot decrypt pin2TextBox".into()))
        })
        .transpose()?;

    // Legacy BitID wallet, predating the key-box model.
    let mut key_infos = Vec::new();
    if let (Some(mnemonic_box), Some(root_key_box)) = (&stash.mnemonic_box, &stash.root_key_box) {
        let root_key = open_box(root_key_box, login_key, "rootKeyBox")?;
        let info_key = hmac_sha256(&root_key, b"infoKey");
        let mnemonic = decrypt_text(mnemonic_box, &info_key)
            .map_err(|_| LoginError::KeyIntegrity("cannot decrypt mnemonicBox".into()))?;
        let keys = json!({
            "mnemonic": mnemonic,
            "rootKey": base64_encode(&root_key),
        });
        key_infos.push(make_key_info("wallet:bitid", keys, &root_key));
    }

    // The account's own sync repo.
    if let Some(sync_key_box) = &stash.sync_key_box {
        let sync_key = open_box(sync_key_box, login_key, "syncKeyBox")?;
        let keys = json!({
            "dataKey": base64_encode(login_key),
            "syncKey": base64_encode(&sync_key),
        });
        key_infos.push(make_key_info(&account_type(&stash.app_id), keys, login_key));
    }

    // Regular wallet keys.
    for envelope in &stash.key_boxes {
        let text = decrypt_text(envelope, login_key)
            .map_err(|_| LoginError::KeyIntegrity("cannot decrypt keyBox".into()))?;
        let info: WalletInfo = serde_json::from_str(&text)
            .map_err(|err| LoginError::KeyIntegrity(format!("malformed wallet info: {err}")))?;
        key_infos.push(info);
    }
    let key_infos = merge_key_infos(&key_infos)?
        .into_iter()
        .map(fix_wallet_info)
        .collect();

    // Each child seals its own login key under ours.
    let mut children = Vec::with_capacity(stash.children.len());
    for child in &stash.children {
        let parent_box = child
            .parent_box
            .as_ref()
            .ok_or_else(|| LoginError::KeyIntegrity("child is missing parentBox".into()))?;
        let child_key = open_box(parent_box, login_key, "parentBox")?;
        children.push(make_login_tree_inner(child, &child_key)?);
    }

    Ok(LoginTree {
        app_id: stash.app_id.clone(),
        login_id: stash.login_id.clone(),
        username: stash.username.clone(),
        user_id,
        created: stash.created,
        last_login: Some(stash.last_login.unwrap_or_else(Utc::now)),
        login_key: Some(login_key.to_vec()),
        login_auth,
        password_auth,
        otp_key: stash.otp_key.clone(),
        otp_reset_date: stash.otp_reset_date,
        otp_timeout: stash.otp_timeout,
        pin,
        pin2_key: stash.pin2_key.clone(),
        recovery2_key: stash.recovery2_key.clone(),
        key_infos,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use coffer_crypto::encrypt;

    fn keyed_stash(login_key: &[u8]) -> LoginStash {
        LoginStash {
            login_id: vec![1; 32],
            username: Some("edge".into()),
            login_auth_box: Some(encrypt(&[7; 32], login_key).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn test_builds_root_with_login_auth() {
        let login_key = [9u8; 32];
        let stash = keyed_stash(&login_key);

        let tree = make_login_tree(&stash, &login_key, "").unwrap();
        assert_eq!(tree.login_auth, Some(vec![7; 32]));
        assert_eq!(tree.login_key, Some(login_key.to_vec()));
        assert_eq!(tree.username.as_deref(), Some("edge"));
        assert!(tree.last_login.is_some());
        // No passwordAuth, so no defaulted userId either.
        assert_eq!(tree.user_id, None);
    }

    #[test]
    fn test_password_auth_defaults_user_id() {
        let login_key = [9u8; 32];
        let mut stash = keyed_stash(&login_key);
        stash.login_auth_box = None;
        stash.password_auth_box = Some(encrypt(&[8; 32], &login_key).unwrap());

        let tree = make_login_tree(&stash, &login_key, "").unwrap();
        assert_eq!(tree.password_auth, Some(vec![8; 32]));
        assert_eq!(tree.user_id, Some(vec![1; 32]));
    }

    #[test]
    fn test_missing_auth_is_rejected() {
        let stash = LoginStash {
            login_id: vec![1; 32],
            ..Default::default()
        };
        assert_eq!(
            make_login_tree(&stash, &[9; 32], ""),
            Err(LoginError::MissingAuth)
        );
    }

    #[test]
    fn test_pin_text_surfaces() {
        let login_key = [9u8; 32];
        let mut stash = keyed_stash(&login_key);
        stash.pin2_text_box = Some(encrypt(b"1234", &login_key).unwrap());
        stash.pin2_key = Some(vec![4; 32]);

        let tree = make_login_tree(&stash, &login_key, "").unwrap();
        assert_eq!(tree.pin.as_deref(), Some("1234"));
        assert_eq!(tree.pin2_key, Some(vec![4; 32]));
    }

    #[test]
    fn test_legacy_bitid_and_sync_key_wallets() {
        let login_key = [9u8; 32];
        let root_key = [5u8; 32];
        let sync_key = [6u8; 20];
        let info_key = hmac_sha256(&root_key, b"infoKey");

        let mut stash = keyed_stash(&login_key);
        stash.root_key_box = Some(encrypt(&root_key, &login_key).unwrap());
        stash.mnemonic_box = Some(encrypt(b"legacy words", &info_key).unwrap());
        stash.sync_key_box = Some(encrypt(&sync_key, &login_key).unwrap());

        let tree = make_login_tree(&stash, &login_key, "").unwrap();
        assert_eq!(tree.key_infos.len(), 2);

        let bitid = &tree.key_infos[0];
        assert_eq!(bitid.wallet_type, "wallet:bitid");
        assert_eq!(bitid.keys["mnemonic"], "legacy words");

        let account = &tree.key_infos[1];
        assert_eq!(account.wallet_type, "account-repo:com.coffer.account");
        assert_eq!(account.keys["dataKey"], base64_encode(&login_key));
        assert_eq!(account.keys["syncKey"], base64_encode(&sync_key));
    }

    #[test]
    fn test_child_recursion_and_outer_shells() {
        let login_key = [9u8; 32];
        let child_key = [10u8; 32];

        let child = LoginStash {
            app_id: "app.child".into(),
            login_id: vec![2; 32],
            parent_box: Some(encrypt(&child_key, &login_key).unwrap()),
            login_auth_box: Some(encrypt(&[11; 32], &child_key).unwrap()),
            ..Default::default()
        };
        let mut root = keyed_stash(&login_key);
        root.children = vec![child];

        // Built at the root: the child decrypts under its parentBox key.
        let tree = make_login_tree(&root, &login_key, "").unwrap();
        assert_eq!(tree.children[0].login_key, Some(child_key.to_vec()));
        assert_eq!(tree.children[0].login_auth, Some(vec![11; 32]));

        // Built at the child: the root is a bare identity shell.
        let tree = make_login_tree(&root, &child_key, "app.child").unwrap();
        assert_eq!(tree.login_key, None);
        assert_eq!(tree.login_auth, None);
        assert_eq!(tree.username.as_deref(), Some("edge"));
        assert_eq!(tree.children[0].login_key, Some(child_key.to_vec()));
    }

    #[test]
    fn test_child_without_parent_box_is_rejected() {
        let login_key = [9u8; 32];
        let mut root = keyed_stash(&login_key);
        root.children = vec![LoginStash {
            app_id: "app.child".into(),
            login_id: vec![2; 32],
            ..Default::default()
        }];
        assert!(matches!(
            make_login_tree(&root, &login_key, ""),
            Err(LoginError::KeyIntegrity(_))
        ));
    }
}
