//! Persistence of the last selected device.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Key-value collaborator holding the last selected device id.
pub trait DeviceStore: Send {
    fn last_device(&self) -> Option<String>;
    fn set_last_device(&mut self, device: &str);
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredState {
    last_device: Option<String>,
}

/// JSON-file-backed store. Load failures fall back to an empty state;
/// save failures are logged and swallowed.
pub struct JsonFileStore {
    path: PathBuf,
    state: StoredState,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = fs::read(&path)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .unwrap_or_default();
        Self { path, state }
    }

    fn persist(&self) {
        match serde_json::to_vec_pretty(&self.state) {
            Ok(raw) => {
                if let Err(e) = fs::write(&self.path, raw) {
                    warn!(path = %self.path.display(), error = %e, "failed to persist device store");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize device store"),
        }
    }
}

impl DeviceStore for JsonFileStore {
    fn last_device(&self) -> Option<String> {
        self.state.last_device.clone()
    }

    fn set_last_device(&mut self, device: &str) {
        self.state.last_device = Some(device.to_string());
        self.persist();
    }
}

/// In-memory store for tests and transient sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    last: Option<String>,
}

impl DeviceStore for MemoryStore {
    fn last_device(&self) -> Option<String> {
        self.last.clone()
    }

    fn set_last_device(&mut self, device: &str) {
        self.last = Some(device.to_string());
    }
}
