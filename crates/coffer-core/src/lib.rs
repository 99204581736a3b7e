//! # coffer-core
//!
//! The client side of a hierarchical, end-to-end encrypted login system.
//!
//! An account is a tree: one root login owning a child login per
//! application id, each child's key sealed under its parent's. On disk the
//! tree is a *stash* of unopened envelopes; in memory, while logged in, it
//! is a *login tree* of opened secrets. The server stores the same
//! envelopes but can never open them.
//!
//! The pieces:
//!
//! - [`stash_store`] loads, saves, and deletes stashes under `logins/`.
//! - [`builder`] decrypts a stash into a login tree, one app-id subtree
//!   at a time.
//! - [`reply`] reconciles server replies into the stash through a strict
//!   field allowlist.
//! - [`auth`] builds authenticated requests and applies [`types::LoginKit`]
//!   mutations to server, memory, and disk in that order.
//! - [`password`], [`pin2`], [`recovery2`], [`otp`] are the per-method
//!   login and management flows; [`create`] makes accounts and children.
//! - [`scrypt_worker`] serializes every memory-hard derivation.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod auth;
pub mod builder;
pub mod context;
pub mod create;
pub mod disklet;
pub mod error;
pub mod event;
pub mod keys;
pub mod messages;
pub mod otp;
pub mod password;
pub mod pin2;
pub mod recovery2;
pub mod reply;
pub mod scrypt_worker;
pub mod server;
pub mod stash_store;
pub mod tree;
pub mod types;
pub mod username;

pub use auth::{
    apply_kit, apply_kits, get_stash_otp, login_with_key, make_auth_json, sanitize_login_stash,
    sync_login, username_available, LoginRequestOpts,
};
pub use builder::make_login_tree;
pub use context::{ContextConfig, LoginContext};
pub use create::{create_child_login, create_login, AccountOpts};
pub use error::{LoginError, OtpChallenge, Result};
pub use event::LoginEvent;
pub use keys::{account_type, make_keys_kit, merge_key_infos};
pub use messages::fetch_login_messages;
pub use otp::{cancel_otp_reset, disable_otp, enable_otp, make_otp_kit};
pub use password::{change_password, check_password, login_with_password};
pub use pin2::{change_pin, delete_pin, login_with_pin2};
pub use recovery2::{
    change_recovery, delete_recovery2, get_recovery2_questions, login_with_recovery2,
};
pub use reply::apply_login_reply;
pub use stash_store::StashStore;
pub use types::{
    LoginKit, LoginMessage, LoginPatch, LoginReply, LoginStash, LoginTree, Patch, ServerMethod,
    StashPatch, WalletInfo,
};
