//! Loading, saving, and deleting on-disk login stashes.

use std::sync::Arc;

use tokio::sync::broadcast;

use coffer_crypto::codec::base58_encode;
use coffer_crypto::constants::LOGIN_ID_SIZE;

use crate::disklet::{just_files, Disklet};
use crate::error::{LoginError, Result};
use crate::event::{channel, LoginEvent};
use crate::types::LoginStash;
use crate::username::fix_username;

const LOGINS_DIR: &str = "logins";

/// The collection of root stashes under `logins/`, one file per account.
#[derive(Clone)]
pub struct StashStore {
    disklet: Arc<dyn Disklet>,
    events: broadcast::Sender<LoginEvent>,
}

impl StashStore {
    pub fn new(disklet: Arc<dyn Disklet>) -> Self {
        StashStore {
            disklet,
            events: channel(),
        }
    }

    /// Watch for stash saves and deletions.
    pub fn subscribe(&self) -> broadcast::Receiver<LoginEvent> {
        self.events.subscribe()
    }

    /// Load every valid root stash. Corrupt files are logged and skipped;
    /// filesystem errors surface to the caller.
    pub async fn load_stashes(&self) -> Result<Vec<LoginStash>> {
        let listing = self.disklet.list(LOGINS_DIR).await?;
        let mut stashes = Vec::new();
        for path in just_files(listing) {
            let text = self.disklet.get_text(&path).await?;
            match serde_json::from_str::<LoginStash>(&text) {
                Ok(stash) => stashes.push(stash),
                Err(err) => tracing::warn!(path, %err, "skipping unreadable login stash"),
            }
        }
        Ok(stashes)
    }

    /// Find the root stash for a username, if one is on disk.
    pub async fn find_stash(&self, username: &str) -> Result<Option<LoginStash>> {
        let username = fix_username(username)?;
        Ok(self
            .load_stashes()
            .await?
            .into_iter()
            .find(|stash| stash.username.as_deref() == Some(username.as_str())))
    }

    /// Write a root stash to its deterministic filename, then announce it.
    ///
    /// Writes are whole-file and per-file, so different accounts never
    /// interfere; concurrent saves of the *same* account must be
    /// serialized by the caller.
    pub async fn save_stash(&self, stash_tree: &LoginStash) -> Result<()> {
        let path = stash_path(stash_tree)?;
        let text = serde_json::to_string_pretty(stash_tree)
            .map_err(|err| LoginError::InvalidStash(err.to_string()))?;
        self.disklet.set_text(&path, &text).await?;
        let _ = self.events.send(LoginEvent::StashSaved(stash_tree.clone()));
        Ok(())
    }

    /// Delete every stash file belonging to a username, then announce it.
    pub async fn remove_stash(&self, username: &str) -> Result<()> {
        let username = fix_username(username)?;
        for path in just_files(self.disklet.list(LOGINS_DIR).await?) {
            let Ok(text) = self.disklet.get_text(&path).await else {
                continue;
            };
            let Ok(stash) = serde_json::from_str::<LoginStash>(&text) else {
                continue;
            };
            if stash.username.as_deref() == Some(username.as_str()) {
                self.disklet.delete(&path).await?;
            }
        }
        let _ = self.events.send(LoginEvent::StashDeleted(username));
        Ok(())
    }
}

/// Validate a root stash and compute its on-disk filename.
fn stash_path(stash: &LoginStash) -> Result<String> {
    if !stash.app_id.is_empty() {
        return Err(LoginError::InvalidStash(
            "only root stashes can be saved".into(),
        ));
    }
    if stash.login_id.len() != LOGIN_ID_SIZE {
        return Err(LoginError::InvalidStash(format!(
            "loginId must be {LOGIN_ID_SIZE} bytes, got {}",
            stash.login_id.len()
        )));
    }
    if stash.username.is_none() {
        return Err(LoginError::InvalidStash("root stash has no username".into()));
    }
    Ok(format!(
        "{LOGINS_DIR}/{}.json",
        base58_encode(&stash.login_id)
    ))
}
