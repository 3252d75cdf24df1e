//! Credential persistence.
//!
//! The store is the only owner of the current [`Credential`]. Every read is a
//! snapshot; callers must not assume the value is unchanged between two reads.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::types::Credential;

pub trait CredentialStore: Send + Sync {
    /// Snapshot of the current credential, `None` when logged out.
    fn read(&self) -> Option<Credential>;

    /// Replace the current credential as one unit.
    fn write(&self, credential: Credential);

    /// Forget the current credential. Idempotent.
    fn clear(&self);

    /// Current access token, if any.
    fn access_token(&self) -> Option<String> {
        self.read().map(|c| c.access_token)
    }
}

/// Process-local store without persistence.
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: RwLock<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: RwLock::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn read(&self) -> Option<Credential> {
        self.slot.read().clone()
    }

    fn write(&self, credential: Credential) {
        *self.slot.write() = Some(credential);
    }

    fn clear(&self) {
        self.slot.write().take();
    }
}

/// Store backed by a JSON file so a session survives restarts.
///
/// The in-memory slot is authoritative; disk failures are logged and never
/// undo an update.
pub struct FileCredentialStore {
    path: PathBuf,
    slot: RwLock<Option<Credential>>,
}

impl FileCredentialStore {
    /// Open the store at `path`, loading any credential already saved there.
    ///
    /// A missing or unreadable file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initial = load_credential(&path);
        Self {
            path,
            slot: RwLock::new(initial),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, credential: &Credential) {
        if let Err(e) = write_credential(&self.path, credential) {
            warn!(path = %self.path.display(), error = %e, "Failed to persist credential (non-fatal)");
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn read(&self) -> Option<Credential> {
        self.slot.read().clone()
    }

    fn write(&self, credential: Credential) {
        let mut slot = self.slot.write();
        self.persist(&credential);
        *slot = Some(credential);
    }

    fn clear(&self) {
        let mut slot = self.slot.write();
        slot.take();
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed credential file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove credential file")
            }
        }
    }
}

fn load_credential(path: &Path) -> Option<Credential> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read credential file");
            return None;
        }
    };

    match serde_json::from_slice::<Credential>(&raw) {
        Ok(credential) => {
            debug!(path = %path.display(), "Loaded saved credential");
            Some(credential)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed credential file");
            None
        }
    }
}

/// Write via a private sibling temp file and rename so readers never see
/// half a file. The file is readable by the owner only.
fn write_credential(path: &Path, credential: &Credential) -> std::io::Result<()> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            std::fs::create_dir_all(parent)?;
            parent
        }
        None => Path::new("."),
    };

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    serde_json::to_writer_pretty(&mut file, credential)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
