//! Per-request scratch directories.
//!
//! A [`Workdir`] is created under the configured root with a fresh UUID v4 name,
//! holds the materialized `script.py`, and is removed when the guard drops. The
//! directory is `0755` and the script `0644` so the unprivileged sandbox user
//! can read them.

use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

pub const SCRIPT_FILE_NAME: &str = "script.py";

/// Exclusive scratch directory for one request. Removed on drop.
#[derive(Debug)]
pub struct Workdir {
    id: Uuid,
    path: PathBuf,
    script_path: PathBuf,
}

impl Workdir {
    /// Create `<root>/<uuid>/script.py` holding `script`.
    pub fn create(root: &Path, script: &str) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;

        let id = Uuid::new_v4();
        let path = root.join(id.to_string());
        // create_dir (not _all) fails if the name is somehow taken.
        std::fs::create_dir(&path)?;
        let workdir = Self {
            id,
            script_path: path.join(SCRIPT_FILE_NAME),
            path,
        };

        set_mode(&workdir.path, 0o755)?;
        std::fs::write(&workdir.script_path, script)?;
        set_mode(&workdir.script_path, 0o644)?;
        Ok(workdir)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }
}

impl Drop for Workdir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!("Failed to remove workdir {:?}: {}", self.path, e);
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
