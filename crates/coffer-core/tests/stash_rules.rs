//! Wire-level trust-boundary checks on the stash reconciler.

use serde_json::json;

use coffer_core::{apply_login_reply, make_login_tree, LoginReply, LoginStash};
use coffer_crypto::encrypt;

fn keyed_reply(login_key: &[u8; 32]) -> LoginReply {
    LoginReply {
        login_id: vec![1; 32],
        login_auth_box: Some(encrypt(&[3; 32], login_key).unwrap()),
        ..Default::default()
    }
}

#[test]
fn test_unknown_reply_fields_never_reach_disk() {
    let login_key = [9u8; 32];
    let mut wire = serde_json::to_value(&keyed_reply(&login_key)).unwrap();
    // A malicious or future server slips extra fields into the reply.
    wire["sneakyField"] = json!("injected");
    wire["children"] = json!([]);

    let reply: LoginReply = serde_json::from_value(wire).unwrap();
    let stash = LoginStash {
        login_id: vec![1; 32],
        username: Some("edge".into()),
        ..Default::default()
    };
    let out = apply_login_reply(&stash, &login_key, &reply).unwrap();

    let text = serde_json::to_string(&out).unwrap();
    assert!(!text.contains("sneakyField"));
    assert!(!text.contains("injected"));
}

#[test]
fn test_reconcile_then_build_preserves_identity() {
    // makeLoginTree ∘ applyLoginReply lands on the reply's identity.
    let login_key = [9u8; 32];
    let mut reply = keyed_reply(&login_key);
    reply.app_id = String::new();
    reply.login_id = vec![42; 32];

    let stash = LoginStash {
        login_id: vec![1; 32],
        username: Some("edge".into()),
        ..Default::default()
    };
    let reconciled = apply_login_reply(&stash, &login_key, &reply).unwrap();
    let tree = make_login_tree(&reconciled, &login_key, &reply.app_id).unwrap();
    assert_eq!(tree.login_id, reply.login_id);
    assert_eq!(tree.username.as_deref(), Some("edge"));
}

#[test]
fn test_method_transport_boxes_are_not_persisted() {
    // pin2Box / recovery2Box / pin2KeyBox exist only to carry keys during
    // login; the stash stores the opened keys, never those boxes.
    let login_key = [9u8; 32];
    let pin2_key = [4u8; 32];
    let mut reply = keyed_reply(&login_key);
    reply.pin2_box = Some(encrypt(&login_key, &pin2_key).unwrap());
    reply.pin2_key_box = Some(encrypt(&pin2_key, &login_key).unwrap());

    let stash = LoginStash {
        login_id: vec![1; 32],
        username: Some("edge".into()),
        ..Default::default()
    };
    let out = apply_login_reply(&stash, &login_key, &reply).unwrap();
    assert_eq!(out.pin2_key, Some(pin2_key.to_vec()));

    let text = serde_json::to_string(&out).unwrap();
    assert!(!text.contains("pin2Box"));
    assert!(!text.contains("pin2KeyBox"));
}
