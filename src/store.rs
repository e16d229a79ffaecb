//! Session persistence under `.repair-relay/` in the working directory.
//!
//! [`SessionStore::load`] and [`SessionStore::save`] each take the advisory
//! lock for a single read or write. A command that reads, changes and writes
//! the session back uses [`SessionStore::open`], which holds the lock until
//! the returned [`LockedSession`] is dropped, so a concurrent command waits
//! (or times out) instead of losing the other's update.

use crate::session::Session;
use anyhow::Context;
use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const STORE_DIR: &str = ".repair-relay";
const SESSION_FILE: &str = "session.json";
const LOCK_FILE: &str = ".lock";
const LOCK_TIMEOUT_SECS: u64 = 5;
const LOCK_RETRY_MS: u64 = 50;

/// Held for one load or save, or for the life of a [`LockedSession`].
struct StoreLock {
    file: fs::File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Store rooted at `<project_root>/.repair-relay`.
    pub fn new(project_root: &Path) -> Self {
        Self::at(project_root.join(STORE_DIR))
    }

    /// Store using `dir` directly.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    /// Load the saved session, or an empty one when nothing was saved yet.
    ///
    /// An unreadable session file is moved aside as `session.json.corrupt`
    /// and an empty session is returned.
    pub fn load(&self) -> anyhow::Result<Session> {
        if !self.session_path().exists() {
            return Ok(Session::default());
        }
        let _lock = self.lock()?;
        self.read_session()
    }

    pub fn save(&self, session: &Session) -> anyhow::Result<()> {
        let _lock = self.lock()?;
        self.write_session(session)
    }

    /// Lock the store and load the session for a read-modify-write.
    pub fn open(&self) -> anyhow::Result<LockedSession<'_>> {
        let lock = self.lock()?;
        let session = self.read_session()?;
        Ok(LockedSession {
            store: self,
            _lock: lock,
            session,
        })
    }

    fn read_session(&self) -> anyhow::Result<Session> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(Session::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        match serde_json::from_str(&content) {
            Ok(session) => Ok(session),
            Err(err) => {
                let corrupt = path.with_extension("json.corrupt");
                if fs::rename(&path, &corrupt).is_err() {
                    let _ = fs::write(&corrupt, &content);
                }
                tracing::warn!(
                    "Session file was corrupted ({}). Moved it to {} and started fresh.",
                    err,
                    corrupt.display()
                );
                Ok(Session::default())
            }
        }
    }

    fn write_session(&self, session: &Session) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(session).context("Failed to serialize session")?;
        write_atomic(&self.session_path(), &content)
            .with_context(|| format!("Failed to write {}", self.session_path().display()))
    }

    /// Delete the saved session. Returns whether there was one.
    pub fn reset(&self) -> anyhow::Result<bool> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(false);
        }
        let _lock = self.lock()?;
        fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
        Ok(true)
    }

    fn lock(&self) -> anyhow::Result<StoreLock> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.dir.join(LOCK_FILE))?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(StoreLock { file }),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    if start.elapsed() >= Duration::from_secs(LOCK_TIMEOUT_SECS) {
                        anyhow::bail!(
                            "Timed out waiting for session lock ({}s); another repair-relay command is using {}",
                            LOCK_TIMEOUT_SECS,
                            self.dir.display()
                        );
                    }
                    std::thread::sleep(Duration::from_millis(LOCK_RETRY_MS));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// A session loaded under the store lock. The lock is released on drop.
pub struct LockedSession<'a> {
    store: &'a SessionStore,
    _lock: StoreLock,
    pub session: Session,
}

impl LockedSession<'_> {
    /// Write the session back while still holding the lock.
    pub fn save(&self) -> anyhow::Result<()> {
        self.store.write_session(&self.session)
    }
}

/// Write to a sibling temp file, then rename over the target.
pub(crate) fn write_atomic(path: &Path, content: &str) -> anyhow::Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600));
    }

    #[cfg(windows)]
    {
        if path.exists() {
            let _ = fs::remove_file(path);
        }
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}
