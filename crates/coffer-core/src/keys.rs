//! Wallet key handling: canonical ids, merge rules, and the keys kit.

use serde_json::Value;

use coffer_crypto::codec::base64_encode;
use coffer_crypto::{encrypt, hmac_sha256};

use crate::error::{LoginError, Result};
use crate::types::{LoginKit, LoginPatch, LoginTree, StashPatch, WalletInfo};

/// Account-repo type of the root login.
const ACCOUNT_TYPE_ROOT: &str = "account-repo:com.coffer.account";

/// The account-repo wallet type for an app id.
pub fn account_type(app_id: &str) -> String {
    if app_id.is_empty() {
        ACCOUNT_TYPE_ROOT.to_string()
    } else {
        format!("account-repo:{app_id}")
    }
}

/// Canonical wallet id: HMAC of the wallet type under its data key.
///
/// Deterministic, so the same wallet synthesized on two devices
/// deduplicates to one entry.
pub fn wallet_id(data_key: &[u8], wallet_type: &str) -> String {
    base64_encode(&hmac_sha256(data_key, wallet_type.as_bytes()))
}

/// Build a wallet info with its canonical id.
pub fn make_key_info(wallet_type: &str, keys: Value, data_key: &[u8]) -> WalletInfo {
    WalletInfo {
        id: wallet_id(data_key, wallet_type),
        wallet_type: wallet_type.to_string(),
        keys,
    }
}

/// Deduplicate wallet infos by id, unioning their key fields.
///
/// When two entries share an id, earlier (existing) fields win over later
/// (incoming) ones, and their types must agree.
pub fn merge_key_infos(infos: &[WalletInfo]) -> Result<Vec<WalletInfo>> {
    let mut out: Vec<WalletInfo> = Vec::with_capacity(infos.len());
    for info in infos {
        match out.iter_mut().find(|existing| existing.id == info.id) {
            None => out.push(info.clone()),
            Some(existing) => {
                if existing.wallet_type != info.wallet_type {
                    return Err(LoginError::KeyIntegrity(format!(
                        "wallet {} has conflicting types",
                        info.id
                    )));
                }
                existing.keys = union_keys(&existing.keys, &info.keys);
            }
        }
    }
    Ok(out)
}

/// Union two key objects, preferring fields already present.
fn union_keys(existing: &Value, incoming: &Value) -> Value {
    match (existing, incoming) {
        (Value::Object(existing), Value::Object(incoming)) => {
            let mut merged = incoming.clone();
            for (name, value) in existing {
                if !value.is_null() {
                    merged.insert(name.clone(), value.clone());
                }
            }
            Value::Object(merged)
        }
        (Value::Null, _) => incoming.clone(),
        _ => existing.clone(),
    }
}

/// Normalize a wallet info parsed from a key box.
///
/// Old clients wrote entries with missing `keys` objects or without ids;
/// fill both so the merge rules hold.
pub fn fix_wallet_info(mut info: WalletInfo) -> WalletInfo {
    if !info.keys.is_object() {
        info.keys = Value::Object(Default::default());
    }
    if info.id.is_empty() {
        if let Some(data_key) = info.keys.get("dataKey").and_then(Value::as_str) {
            if let Ok(data_key) = coffer_crypto::codec::base64_decode(data_key) {
                info.id = wallet_id(&data_key, &info.wallet_type);
            }
        }
    }
    info
}

/// Build a kit that attaches new wallet keys to a login.
///
/// Each info is sealed under the node's login key as a key box; the same
/// box list goes to the server and into the stash, while the decrypted
/// infos merge into the in-memory tree.
pub fn make_keys_kit(login: &LoginTree, key_infos: &[WalletInfo]) -> Result<LoginKit> {
    let login_key = login.login_key.as_ref().ok_or(LoginError::MissingAuth)?;

    let mut key_boxes = Vec::with_capacity(key_infos.len());
    for info in key_infos {
        let text = serde_json::to_string(info)
            .map_err(|err| LoginError::Internal(format!("cannot serialize wallet info: {err}")))?;
        key_boxes.push(encrypt(text.as_bytes(), login_key)?);
    }

    Ok(LoginKit {
        login_id: login.login_id.clone(),
        server_path: "/v2/login/keys".into(),
        server: Some(serde_json::json!({ "keyBoxes": &key_boxes })),
        stash: StashPatch {
            key_boxes,
            ..Default::default()
        },
        login: LoginPatch {
            key_infos: key_infos.to_vec(),
            ..Default::default()
        },
        ..Default::default()
    })
}
