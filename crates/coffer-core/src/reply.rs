//! Merging server login replies into the local stash.
//!
//! The server is never trusted with the stash wholesale: only the fields
//! enumerated here are copied out of a reply, everything else is dropped
//! on the floor. This is the single place network data enters the stash.

use crate::builder::open_box;
use crate::error::{LoginError, Result};
use crate::tree::{default_clone, update_tree};
use crate::types::{LoginReply, LoginStash};

/// Replace the stash node matching the reply's app id with the reconciled
/// server state, leaving the rest of the tree untouched.
pub fn apply_login_reply(
    stash_tree: &LoginStash,
    login_key: &[u8],
    reply: &LoginReply,
) -> Result<LoginStash> {
    update_tree(
        stash_tree,
        |stash: &LoginStash| stash.app_id == reply.app_id,
        |stash| apply_login_reply_inner(stash, login_key, reply),
        default_clone,
    )
}

fn apply_login_reply_inner(
    stash: &LoginStash,
    login_key: &[u8],
    reply: &LoginReply,
) -> Result<LoginStash> {
    let mut out = LoginStash {
        // Fields the server owns. This list is deliberately enumerated;
        // never copy reply fields by reflection.
        app_id: reply.app_id.clone(),
        created: reply.created,
        login_id: reply.login_id.clone(),
        login_auth_box: reply.login_auth_box.clone(),
        otp_key: reply.otp_key.clone(),
        otp_reset_date: reply.otp_reset_date,
        otp_timeout: reply.otp_timeout,
        parent_box: reply.parent_box.clone(),
        password_auth_box: reply.password_auth_box.clone(),
        password_auth_snrp: reply.password_auth_snrp.clone(),
        password_box: reply.password_box.clone(),
        password_key_snrp: reply.password_key_snrp.clone(),
        pin2_text_box: reply.pin2_text_box.clone(),
        mnemonic_box: reply.mnemonic_box.clone(),
        root_key_box: reply.root_key_box.clone(),
        sync_key_box: reply.sync_key_box.clone(),
        key_boxes: reply.key_boxes.clone(),

        // Fields only this client knows.
        last_login: stash.last_login,
        username: stash.username.clone(),
        user_id: reply.user_id.clone().or_else(|| stash.user_id.clone()),

        ..Default::default()
    };

    // The server hands the pin2 and recovery2 keys back sealed under the
    // login key; they are stored opened so the matching login methods work
    // before the next round trip.
    if let Some(pin2_key_box) = &reply.pin2_key_box {
        out.pin2_key = Some(open_box(pin2_key_box, login_key, "pin2KeyBox")?);
    }
    if let Some(recovery2_key_box) = &reply.recovery2_key_box {
        out.recovery2_key = Some(open_box(recovery2_key_box, login_key, "recovery2KeyBox")?);
    }

    // The server may add children but can never lose them.
    if stash.children.len() > reply.children.len() {
        return Err(LoginError::ServerLostChildren);
    }
    let mut children = Vec::with_capacity(reply.children.len());
    for (index, reply_child) in reply.children.iter().enumerate() {
        let parent_box = reply_child
            .parent_box
            .as_ref()
            .ok_or_else(|| LoginError::KeyIntegrity("reply child is missing parentBox".into()))?;
        let child_key = open_box(parent_box, login_key, "parentBox")?;

        let placeholder;
        let stash_child = match stash.children.get(index) {
            Some(child) => child,
            None => {
                placeholder = LoginStash {
                    app_id: reply_child.app_id.clone(),
                    login_id: reply_child.login_id.clone(),
                    ..Default::default()
                };
                &placeholder
            }
        };
        children.push(apply_login_reply_inner(stash_child, &child_key, reply_child)?);
    }
    out.children = children;

    Ok(out)
}
