//! Filesystem helpers: atomic writes, staging directories and deletes.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use uuid::Uuid;

const STAGING_SUFFIX: &str = ".tmp";

/// Hidden staging entry produced by [`StagingDir`] or [`write_atomic`].
pub fn is_staging_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(STAGING_SUFFIX)
}

fn hidden_sibling(target: &Path) -> io::Result<PathBuf> {
    let parent = target.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("{} has no parent", target.display()))
    })?;
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(parent.join(format!(".{}-{}{}", name, Uuid::new_v4(), STAGING_SUFFIX)))
}

/// Write atomically via temp file
pub fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = hidden_sibling(path)?;
    let result = (|| {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Private directory next to a target file in which downloads are assembled
/// under their real filenames. Removed with everything left in it on drop.
/// Parent directories it had to create are removed too when nothing was
/// committed, so a failed fetch leaves no empty version directories.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    /// Deepest first.
    created_parents: Vec<PathBuf>,
    committed: AtomicBool,
}

impl StagingDir {
    /// Create `.<name>-<uuid>.tmp` beside `target`, creating parents as needed.
    pub fn create(target: &Path) -> io::Result<Self> {
        let path = hidden_sibling(target)?;
        let created_parents = path
            .ancestors()
            .skip(1)
            .take_while(|dir| !dir.as_os_str().is_empty() && !dir.exists())
            .map(Path::to_path_buf)
            .collect();
        fs::create_dir_all(&path)?;
        Ok(Self {
            path,
            created_parents,
            committed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location for a staged file with the given name.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Move a staged file into its final place, replacing what is there.
    pub fn commit(&self, staged: &Path, target: &Path) -> io::Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(staged, target)?;
        self.committed.store(true, Ordering::Release);
        Ok(())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staging directory");
            }
        }
        if self.committed.load(Ordering::Acquire) {
            return;
        }
        // Stops at the first directory something else has written into.
        for dir in &self.created_parents {
            if fs::remove_dir(dir).is_err() {
                break;
            }
        }
    }
}

/// Delete a file, treating "already gone" as success. Returns whether a file
/// was removed.
pub fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/file.txt");
        write_atomic(&target, b"one").unwrap();
        write_atomic(&target, b"two").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "two");

        let names: Vec<String> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["file.txt"]);
    }

    #[test]
    fn test_staging_dir_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lib-1.0.jar");
        let staging_path = {
            let staging = StagingDir::create(&target).unwrap();
            let staged = staging.file("lib-1.0.jar");
            fs::write(&staged, b"content").unwrap();
            fs::write(staging.file("lib-1.0.jar.sha1"), b"left behind").unwrap();
            staging.commit(&staged, &target).unwrap();
            let name = staging.path().file_name().unwrap().to_string_lossy().into_owned();
            assert!(is_staging_name(&name));
            staging.path().to_path_buf()
        };
        assert!(!staging_path.exists());
        assert_eq!(fs::read(&target).unwrap(), b"content");
    }

    #[test]
    fn test_uncommitted_staging_removes_created_parents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("org/example/lib/1.0/lib-1.0.jar");
        {
            let staging = StagingDir::create(&target).unwrap();
            fs::write(staging.file("lib-1.0.jar"), b"partial").unwrap();
        }
        assert!(!dir.path().join("org").exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_uncommitted_staging_keeps_parents_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("org/example/lib/1.0/lib-1.0.jar");
        let sibling = dir.path().join("org/example/lib/0.9/lib-0.9.jar");
        {
            let staging = StagingDir::create(&target).unwrap();
            fs::create_dir_all(sibling.parent().unwrap()).unwrap();
            fs::write(&sibling, b"other").unwrap();
            drop(staging);
        }
        assert!(!dir.path().join("org/example/lib/1.0").exists());
        assert!(sibling.exists());
    }

    #[test]
    fn test_remove_file_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        fs::write(&path, b"x").unwrap();
        assert!(remove_file_if_exists(&path).unwrap());
        assert!(!remove_file_if_exists(&path).unwrap());
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
