//! 2-factor secret management.
//!
//! Enabling 2FA is a kit like any other mutation: the server learns the
//! secret (it must verify codes), and both local representations store it.
//! An account under an OTP reset countdown clears the pending reset by
//! re-confirming its key.

use serde_json::json;

use coffer_crypto::codec::base32_encode;
use coffer_crypto::{fix_otp_key, random_bytes};

use crate::auth::apply_kit;
use crate::context::LoginContext;
use crate::error::{LoginError, Result};
use crate::types::{LoginKit, LoginPatch, LoginStash, LoginTree, Patch, ServerMethod, StashPatch};

/// Default reset window the server honors when none is given, in seconds.
pub const DEFAULT_OTP_TIMEOUT: u64 = 7 * 24 * 60 * 60;

/// Build a kit that turns 2FA on, keeping an existing secret if the node
/// already has one.
pub fn make_otp_kit(
    login: &LoginTree,
    otp_key: Option<&str>,
    otp_timeout: u64,
) -> Result<LoginKit> {
    let otp_key = match otp_key.or(login.otp_key.as_deref()) {
        Some(key) => fix_otp_key(key)?,
        None => base32_encode(&random_bytes::<10>()),
    };
    Ok(LoginKit {
        login_id: login.login_id.clone(),
        server_path: "/v2/login/otp".into(),
        server: Some(json!({
            "otpKey": otp_key,
            "otpTimeout": otp_timeout,
        })),
        stash: StashPatch {
            otp_key: Patch::Set(otp_key.clone()),
            otp_reset_date: Patch::Clear,
            otp_timeout: Patch::Set(otp_timeout),
            ..Default::default()
        },
        login: LoginPatch {
            otp_key: Patch::Set(otp_key),
            otp_reset_date: Patch::Clear,
            otp_timeout: Patch::Set(otp_timeout),
            ..Default::default()
        },
        ..Default::default()
    })
}

/// Turn 2FA on for the tree's root login.
pub async fn enable_otp(
    ctx: &LoginContext,
    stash_tree: &LoginStash,
    login_tree: &LoginTree,
    otp_timeout: u64,
) -> Result<(LoginStash, LoginTree)> {
    let kit = make_otp_kit(login_tree, None, otp_timeout)?;
    apply_kit(ctx, stash_tree, login_tree, &kit).await
}

/// Turn 2FA off for the tree's root login.
pub async fn disable_otp(
    ctx: &LoginContext,
    stash_tree: &LoginStash,
    login_tree: &LoginTree,
) -> Result<(LoginStash, LoginTree)> {
    let kit = LoginKit {
        login_id: login_tree.login_id.clone(),
        server_method: ServerMethod::Delete,
        server_path: "/v2/login/otp".into(),
        server: None,
        stash: StashPatch {
            otp_key: Patch::Clear,
            otp_reset_date: Patch::Clear,
            otp_timeout: Patch::Clear,
            ..Default::default()
        },
        login: LoginPatch {
            otp_key: Patch::Clear,
            otp_reset_date: Patch::Clear,
            otp_timeout: Patch::Clear,
            ..Default::default()
        },
    };
    apply_kit(ctx, stash_tree, login_tree, &kit).await
}

/// Cancel a pending OTP reset by re-confirming the existing secret.
pub async fn cancel_otp_reset(
    ctx: &LoginContext,
    stash_tree: &LoginStash,
    login_tree: &LoginTree,
) -> Result<(LoginStash, LoginTree)> {
    let otp_key = login_tree.otp_key.clone().ok_or(LoginError::MissingAuth)?;
    let otp_timeout = login_tree.otp_timeout.unwrap_or(DEFAULT_OTP_TIMEOUT);
    let kit = LoginKit {
        login_id: login_tree.login_id.clone(),
        server_path: "/v2/login/otp".into(),
        server: Some(json!({
            "otpKey": otp_key,
            "otpTimeout": otp_timeout,
        })),
        stash: StashPatch {
            otp_reset_date: Patch::Clear,
            ..Default::default()
        },
        login: LoginPatch {
            otp_reset_date: Patch::Clear,
            ..Default::default()
        },
        ..Default::default()
    };
    apply_kit(ctx, stash_tree, login_tree, &kit).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_otp_kit_generates_base32_secret() {
        let login = LoginTree {
            login_id: vec![1; 32],
            ..Default::default()
        };
        let kit = make_otp_kit(&login, None, DEFAULT_OTP_TIMEOUT).unwrap();
        let Patch::Set(otp_key) = &kit.stash.otp_key else {
            panic!("kit must set otpKey");
        };
        // 10 random bytes encode to 16 base32 characters.
        assert_eq!(otp_key.len(), 16);
        assert!(fix_otp_key(otp_key).is_ok());
        assert!(matches!(kit.stash.otp_reset_date, Patch::Clear));
    }

    #[test]
    fn test_make_otp_kit_keeps_existing_secret() {
        let login = LoginTree {
            login_id: vec![1; 32],
            otp_key: Some("GEZDGNBVGY3TQOJQ".into()),
            ..Default::default()
        };
        let kit = make_otp_kit(&login, None, 86400).unwrap();
        assert_eq!(
            kit.stash.otp_key,
            Patch::Set("GEZDGNBVGY3TQOJQ".to_string())
        );
        assert_eq!(kit.server.unwrap()["otpTimeout"], 86400);
    }
}
