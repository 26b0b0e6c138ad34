//! Session state threaded through edit operations.
//!
//! The legacy tool this crate supersedes kept helper-tool caches and a
//! logging handle as process-global mutable state. Here that becomes an
//! explicit [`Session`] value the caller owns and passes to every
//! operation, plus a [`Workspace`] whose `Drop` impl removes its scratch
//! directory on every exit path, including error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// A warning surfaced by an operation: platform bounds violated,
/// manifest digest mismatch, insufficient free space at the write
/// target. Warnings do not abort an operation on their own; they are
/// routed through the session's confirmation callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub category: WarningCategory,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningCategory {
    PlatformBounds,
    ManifestMismatch,
    SpaceShortfall,
}

impl Warning {
    pub fn new(category: WarningCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

/// Cooperative cancellation token. Checked at the coarse boundaries the
/// design calls out: before each member copy, after each descriptor
/// mutation batch.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns `Err(Error::Cancelled)` if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Confirms a warning with the caller. Returns `true` to proceed,
/// `false` to abort the operation that raised it. `--force` mode is
/// implemented by a callback that always returns `true`.
pub type ConfirmCallback = Box<dyn FnMut(&Warning) -> bool + Send>;

/// Per-invocation state: the confirmation callback, the cancellation
/// token, and a memo of helper-tool paths the client has already
/// resolved (the core never shells out to find `qemu-img` et al. itself
/// — it asks the session for a capability by name and treats a miss as
/// [`Error::Capability`]).
pub struct Session {
    confirm: ConfirmCallback,
    cancellation: CancellationToken,
    helpers: HashMap<String, PathBuf>,
}

impl Session {
    /// Create a session that auto-confirms every warning (`--force`).
    pub fn forced() -> Self {
        Self::new(Box::new(|_| true))
    }

    /// Create a session with an explicit confirmation callback.
    pub fn new(confirm: ConfirmCallback) -> Self {
        Self {
            confirm,
            cancellation: CancellationToken::new(),
            helpers: HashMap::new(),
        }
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Register a helper tool's resolved path. Populated by the CLI
    /// layer's discovery logic; the core only ever reads this map.
    pub fn register_helper(&mut self, name: impl Into<String>, path: PathBuf) {
        self.helpers.insert(name.into(), path);
    }

    /// Look up a previously registered helper's path.
    pub fn helper_path(&self, name: &str) -> Result<&Path> {
        self.helpers
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::capability(name))
    }

    /// Surface a warning to the caller. Returns `Ok(())` if confirmed,
    /// `Err(Error::Cancelled)` if the caller declined.
    pub fn confirm(&mut self, warning: Warning) -> Result<()> {
        tracing::warn!(category = ?warning.category, message = %warning.message, "warning raised");
        if (self.confirm)(&warning) {
            Ok(())
        } else {
            Err(Error::Cancelled)
        }
    }
}

/// Owns a scratch directory exclusive to one package-edit session.
/// Removed on every exit path via `Drop`, including on error, matching
/// the "scoped cleanup" design note: the legacy tool relied on
/// process-exit handlers to clean up, this crate makes the ownership
/// explicit instead.
pub struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    /// Create a new scratch directory under the system temp dir.
    pub fn new() -> Result<Self> {
        let dir = tempfile::TempDir::new().map_err(Error::io_simple)?;
        Ok(Self { dir })
    }

    /// Create a scratch directory as a sibling of `path`, so that the
    /// final atomic rename stays on the same filesystem.
    pub fn sibling_of(path: &Path) -> Result<Self> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let dir = tempfile::Builder::new()
            .prefix(".ovapkg-")
            .tempdir_in(parent)
            .map_err(|e| Error::io(e, parent))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
