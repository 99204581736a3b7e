//! Change notifications for on-disk login state.
//!
//! Other subsystems (rate caches, account lists, UI bridges) watch the
//! stash store through this channel. Events fire only after the
//! corresponding disk operation has succeeded.

use tokio::sync::broadcast;

use crate::types::LoginStash;

/// A change to the on-disk login state.
#[derive(Clone, Debug)]
pub enum LoginEvent {
    /// A root stash was written, carrying the new tree.
    StashSaved(LoginStash),
    /// Every stash for this normalized username was deleted.
    StashDeleted(String),
}

pub(crate) fn channel() -> broadcast::Sender<LoginEvent> {
    broadcast::channel(16).0
}
