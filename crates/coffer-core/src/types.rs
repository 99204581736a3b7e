//! The login data model: on-disk stashes, server replies, decrypted
//! in-memory trees, and the kit mutation bundles that tie them together.

use chrono::{DateTime, Utc};
use coffer_crypto::codec::{b64, b64_opt};
use coffer_crypto::{EncryptedBox, Snrp};
use serde::{Deserialize, Serialize};

use crate::tree::TreeNode;

/// One node of the on-disk login tree: identity plus encrypted envelopes,
/// still sealed. The root carries the username; every child carries a
/// `parentBox` sealing its login key under its parent's.
///
/// Unknown JSON fields are ignored on read; absent fields are omitted on
/// write, so a stash round-trips byte-stably.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginStash {
    // Identity
    #[serde(skip_serializing_if = "String::is_empty")]
    pub app_id: String,
    #[serde(with = "b64", skip_serializing_if = "Vec::is_empty")]
    pub login_id: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(with = "b64_opt", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,

    // 2-factor state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_reset_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voucher_id: Option<String>,
    #[serde(with = "b64_opt", skip_serializing_if = "Option::is_none")]
    pub voucher_auth: Option<Vec<u8>>,

    // Envelope material
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_auth_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_auth_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_auth_snrp: Option<Snrp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_key_snrp: Option<Snrp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin2_text_box: Option<EncryptedBox>,

    // Derived-key caches, stored plaintext after the server hands the
    // matching key box back once.
    #[serde(with = "b64_opt", skip_serializing_if = "Option::is_none")]
    pub pin2_key: Option<Vec<u8>>,
    #[serde(with = "b64_opt", skip_serializing_if = "Option::is_none")]
    pub recovery2_key: Option<Vec<u8>>,

    // Wallet material
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub key_boxes: Vec<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mnemonic_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_key_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_key_box: Option<EncryptedBox>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LoginStash>,
}

impl TreeNode for LoginStash {
    fn node_children(&self) -> &[Self] {
        &self.children
    }

    fn with_children(&self, children: Vec<Self>) -> Self {
        LoginStash {
            children,
            ..self.clone()
        }
    }
}

/// One node of a server login reply. Superset of the stash envelope fields
/// plus the key boxes the server re-sends on every login.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginReply {
    pub app_id: String,
    #[serde(with = "b64", skip_serializing_if = "Vec::is_empty")]
    pub login_id: Vec<u8>,
    #[serde(with = "b64_opt", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_reset_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_timeout: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_auth_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_auth_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_auth_snrp: Option<Snrp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_key_snrp: Option<Snrp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin2_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin2_key_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin2_text_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question2_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery2_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery2_key_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mnemonic_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_key_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_key_box: Option<EncryptedBox>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub key_boxes: Vec<EncryptedBox>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LoginReply>,
}

/// Decrypted wallet keys, as carried inside a key box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub wallet_type: String,
    #[serde(default)]
    pub keys: serde_json::Value,
}

/// One node of the in-memory login tree: the stash with its envelopes
/// opened. Exists only while an account is logged in.
///
/// Nodes outside the subtree a caller logged into carry only identity and
/// children; their `login_key` stays `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoginTree {
    pub app_id: String,
    pub login_id: Vec<u8>,
    pub username: Option<String>,
    pub user_id: Option<Vec<u8>>,
    pub created: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,

    pub login_key: Option<Vec<u8>>,
    pub login_auth: Option<Vec<u8>>,
    pub password_auth: Option<Vec<u8>>,

    pub otp_key: Option<String>,
    pub otp_reset_date: Option<DateTime<Utc>>,
    pub otp_timeout: Option<u64>,

    pub pin: Option<String>,
    pub pin2_key: Option<Vec<u8>>,
    pub recovery2_key: Option<Vec<u8>>,

    pub key_infos: Vec<WalletInfo>,
    pub children: Vec<LoginTree>,
}

impl TreeNode for LoginTree {
    fn node_children(&self) -> &[Self] {
        &self.children
    }

    fn with_children(&self, children: Vec<Self>) -> Self {
        LoginTree {
            children,
            ..self.clone()
        }
    }
}

/// A tri-state field edit inside a kit patch: leave alone, clear, or set.
#[derive(Clone, Debug, PartialEq)]
pub enum Patch<T> {
    Keep,
    Clear,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T: Clone> Patch<T> {
    /// Apply this edit to an optional field.
    pub fn apply(&self, slot: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Clear => *slot = None,
            Patch::Set(value) => *slot = Some(value.clone()),
        }
    }
}

/// The stash-side delta of a kit. List fields are appended, not replaced.
#[derive(Clone, Debug, Default)]
pub struct StashPatch {
    pub user_id: Patch<Vec<u8>>,
    pub otp_key: Patch<String>,
    pub otp_reset_date: Patch<DateTime<Utc>>,
    pub otp_timeout: Patch<u64>,
    pub login_auth_box: Patch<EncryptedBox>,
    pub password_auth_box: Patch<EncryptedBox>,
    pub password_auth_snrp: Patch<Snrp>,
    pub password_box: Patch<EncryptedBox>,
    pub password_key_snrp: Patch<Snrp>,
    pub pin2_key: Patch<Vec<u8>>,
    pub pin2_text_box: Patch<EncryptedBox>,
    pub recovery2_key: Patch<Vec<u8>>,
    pub key_boxes: Vec<EncryptedBox>,
    pub children: Vec<LoginStash>,
}

impl StashPatch {
    /// Produce a new stash node with this delta folded in.
    pub fn merge_into(&self, stash: &LoginStash) -> LoginStash {
        let mut out = stash.clone();
        self.user_id.apply(&mut out.user_id);
        self.otp_key.apply(&mut out.otp_key);
        self.otp_reset_date.apply(&mut out.otp_reset_date);
        self.otp_timeout.apply(&mut out.otp_timeout);
        self.login_auth_box.apply(&mut out.login_auth_box);
        self.password_auth_box.apply(&mut out.password_auth_box);
        self.password_auth_snrp.apply(&mut out.password_auth_snrp);
        self.password_box.apply(&mut out.password_box);
        self.password_key_snrp.apply(&mut out.password_key_snrp);
        self.pin2_key.apply(&mut out.pin2_key);
        self.pin2_text_box.apply(&mut out.pin2_text_box);
        self.recovery2_key.apply(&mut out.recovery2_key);
        out.key_boxes.extend(self.key_boxes.iter().cloned());
        out.children.extend(self.children.iter().cloned());
        out
    }
}

/// The login-side delta of a kit. `key_infos` merge through wallet-id
/// deduplication; `children` append.
#[derive(Clone, Debug, Default)]
pub struct LoginPatch {
    pub user_id: Patch<Vec<u8>>,
    pub password_auth: Patch<Vec<u8>>,
    pub otp_key: Patch<String>,
    pub otp_reset_date: Patch<DateTime<Utc>>,
    pub otp_timeout: Patch<u64>,
    pub pin: Patch<String>,
    pub pin2_key: Patch<Vec<u8>>,
    pub recovery2_key: Patch<Vec<u8>>,
    pub key_infos: Vec<WalletInfo>,
    pub children: Vec<LoginTree>,
}

impl LoginPatch {
    /// Produce a new login node with this delta folded in.
    pub fn merge_into(&self, login: &LoginTree) -> crate::error::Result<LoginTree> {
        let mut out = login.clone();
        self.user_id.apply(&mut out.user_id);
        self.password_auth.apply(&mut out.password_auth);
        self.otp_key.apply(&mut out.otp_key);
        self.otp_reset_date.apply(&mut out.otp_reset_date);
        self.otp_timeout.apply(&mut out.otp_timeout);
        self.pin.apply(&mut out.pin);
        self.pin2_key.apply(&mut out.pin2_key);
        self.recovery2_key.apply(&mut out.recovery2_key);
        if !self.key_infos.is_empty() {
            let combined: Vec<WalletInfo> = out
                .key_infos
                .iter()
                .chain(self.key_infos.iter())
                .cloned()
                .collect();
            out.key_infos = crate::keys::merge_key_infos(&combined)?;
        }
        out.children.extend(self.children.iter().cloned());
        Ok(out)
    }
}

/// HTTP method of a kit's server call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ServerMethod {
    #[default]
    Post,
    Delete,
}

/// A mutation bundle applied to server, memory, and disk in that order,
/// targeted at one node by `login_id`.
#[derive(Clone, Debug, Default)]
pub struct LoginKit {
    pub login_id: Vec<u8>,
    pub server_method: ServerMethod,
    pub server_path: String,
    pub server: Option<serde_json::Value>,
    pub stash: StashPatch,
    pub login: LoginPatch,
}

/// Pending-state summary for one login, from the messages endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginMessage {
    #[serde(with = "b64", skip_serializing_if = "Vec::is_empty")]
    pub login_id: Vec<u8>,
    pub otp_reset_pending: bool,
    pub pending_vouchers: Vec<String>,
    pub recovery2_corrupt: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stash_wire_names_are_camel_case() {
        let stash = LoginStash {
            app_id: "app.test".into(),
            login_id: vec![1; 32],
            username: Some("edge".into()),
            otp_key: Some("GEZDGNBV".into()),
            pin2_key: Some(vec![2; 32]),
            ..Default::default()
        };
        let json = serde_json::to_value(&stash).unwrap();
        assert_eq!(json["appId"], "app.test");
        assert!(json["loginId"].is_string());
        assert_eq!(json["otpKey"], "GEZDGNBV");
        assert!(json["pin2Key"].is_string());
        // Absent optionals are omitted entirely.
        assert!(json.get("passwordBox").is_none());
        assert!(json.get("children").is_none());
    }

    #[test]
    fn test_stash_roundtrip() {
        let stash = LoginStash {
            login_id: vec![7; 32],
            username: Some("edge".into()),
            user_id: Some(vec![9; 32]),
            children: vec![LoginStash {
                app_id: "app.child".into(),
                login_id: vec![8; 32],
                ..Default::default()
            }],
            ..Default::default()
        };
        let text = serde_json::to_string(&stash).unwrap();
        let back: LoginStash = serde_json::from_str(&text).unwrap();
        assert_eq!(back, stash);
    }

    #[test]
    fn test_stash_ignores_unknown_fields() {
        let text = r#"{ "appId": "", "loginId": "AAAA", "futureField": 42 }"#;
        let stash: LoginStash = serde_json::from_str(text).unwrap();
        assert_eq!(stash.login_id, vec![0, 0, 0]);
    }

    #[test]
    fn test_patch_apply() {
        let mut slot = Some("old".to_string());
        Patch::Keep.apply(&mut slot);
        assert_eq!(slot.as_deref(), Some("old"));
        Patch::Set("new".to_string()).apply(&mut slot);
        assert_eq!(slot.as_deref(), Some("new"));
        Patch::<String>::Clear.apply(&mut slot);
        assert_eq!(slot, None);
    }

    #[test]
    fn test_stash_patch_appends_lists() {
        let stash = LoginStash {
            children: vec![LoginStash::default()],
            ..Default::default()
        };
        let patch = StashPatch {
            children: vec![LoginStash {
                app_id: "app.new".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let merged = patch.merge_into(&stash);
        assert_eq!(merged.children.len(), 2);
        assert_eq!(merged.children[1].app_id, "app.new");
    }
}
