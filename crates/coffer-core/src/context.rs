//! Engine wiring: server handle, stash store, and the scrypt worker.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::disklet::{Disklet, FsDisklet};
use crate::error::Result;
use crate::event::LoginEvent;
use crate::scrypt_worker::ScryptWorker;
use crate::server::{HttpAuthServer, LoginFetch};
use crate::stash_store::StashStore;

/// Everything needed to stand up a [`LoginContext`].
pub struct ContextConfig {
    /// Auth server base URL, e.g. `https://login.example.com/api`.
    pub auth_server: String,
    /// API key sent as `Authorization: Token <apiKey>`.
    pub api_key: String,
    /// This application's sub-login scope. Empty string is the root.
    pub app_id: String,
    /// Optional human-readable device name, attached to login requests so
    /// the server can label vouchers.
    pub device_description: Option<String>,
    /// Directory holding the `logins/` folder.
    pub data_dir: PathBuf,
}

/// The engine's shared state. Cheap to clone-by-reference behind an `Arc`.
pub struct LoginContext {
    pub(crate) server: Arc<dyn LoginFetch>,
    pub(crate) stashes: StashStore,
    pub(crate) scrypt: ScryptWorker,
    pub(crate) app_id: String,
    pub(crate) device_description: Option<String>,
}

impl LoginContext {
    /// Stand up a context over HTTP and the local filesystem.
    pub fn new(config: ContextConfig) -> Result<Self> {
        let server = Arc::new(HttpAuthServer::new(&config.auth_server, &config.api_key)?);
        let disklet = Arc::new(FsDisklet::new(config.data_dir)?);
        Ok(Self::with_parts(
            server,
            disklet,
            config.app_id,
            config.device_description,
        ))
    }

    /// Assemble a context from explicit parts. This is the seam tests use
    /// to swap in scripted servers and in-memory storage.
    pub fn with_parts(
        server: Arc<dyn LoginFetch>,
        disklet: Arc<dyn Disklet>,
        app_id: String,
        device_description: Option<String>,
    ) -> Self {
        LoginContext {
            server,
            stashes: StashStore::new(disklet),
            scrypt: ScryptWorker::new(),
            app_id,
            device_description,
        }
    }

    /// The stash store.
    pub fn stashes(&self) -> &StashStore {
        &self.stashes
    }

    /// This context's app id.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Watch for stash saves and deletions.
    pub fn subscribe(&self) -> broadcast::Receiver<LoginEvent> {
        self.stashes.subscribe()
    }
}
