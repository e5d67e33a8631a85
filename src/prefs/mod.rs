//! Locally persisted client state: per-user sidebar layout and the stored
//! CLI session.
//!
//! Reads degrade to `None` on any fault (missing file, unreadable JSON) so
//! a broken prefs file never blocks sign-in. Writes report their errors.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Sidebar layout for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidebarPrefs {
    /// Section names in display order.
    #[serde(default)]
    pub order: Vec<String>,
    /// Whether the custom order is applied instead of the default layout.
    #[serde(default)]
    pub custom_order_enabled: bool,
}

/// Identity session persisted between CLI invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub session_id: String,
    pub user_id: String,
}

/// File-backed preference store rooted in one directory.
#[derive(Debug, Clone)]
pub struct PrefsStore {
    dir: PathBuf,
}

impl PrefsStore {
    /// Store under the platform config directory (`~/.config/opsboard` on
    /// Linux), created if absent.
    pub fn open_default() -> Result<Self> {
        let base = dirs::config_dir().ok_or(Error::MissingConfig(
            "no config directory available on this platform",
        ))?;
        Self::open(base.join("opsboard"))
    }

    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn load_sidebar(&self, user_id: &str) -> Option<SidebarPrefs> {
        self.load_json(&self.sidebar_path(user_id))
    }

    pub fn save_sidebar(&self, user_id: &str, prefs: &SidebarPrefs) -> Result<()> {
        self.save_json(&self.sidebar_path(user_id), prefs)
    }

    /// Forget a user's layout. Idempotent.
    pub fn clear_sidebar(&self, user_id: &str) -> Result<()> {
        remove_if_present(&self.sidebar_path(user_id))
    }

    pub fn load_session(&self) -> Option<StoredSession> {
        self.load_json(&self.session_path())
    }

    pub fn save_session(&self, session: &StoredSession) -> Result<()> {
        self.save_json(&self.session_path(), session)
    }

    pub fn clear_session(&self) -> Result<()> {
        remove_if_present(&self.session_path())
    }

    fn sidebar_path(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("sidebar_{}.json", safe_id(user_id)))
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join("session.json")
    }

    fn load_json<T: for<'de> Deserialize<'de>>(&self, path: &PathBuf) -> Option<T> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "no stored prefs");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "stored prefs unreadable, ignoring");
                None
            }
        }
    }

    fn save_json<T: Serialize>(&self, path: &PathBuf, value: &T) -> Result<()> {
        let raw = serde_json::to_string_pretty(value)?;
        fs::write(path, raw)?;
        Ok(())
    }
}

fn remove_if_present(path: &PathBuf) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// User ids become file names; anything exotic is flattened first.
fn safe_id(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
