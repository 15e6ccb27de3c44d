//! Per-request scratch directories.
//!
//! Every request gets its own uniquely named directory under the configured
//! root:
//!
//! ```text
//! <root>/relay_<timestamp>_<suffix>/
//! ├── work/   scratch directory, world-writable, assistant cwd
//! └── home/   private assistant home holding credential files (0o700)
//! ```
//!
//! The directory is removed by [`Workspace::remove`], or on drop if the
//! request bailed out before reaching cleanup.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};
use tracing::{debug, warn};

const NAME_PREFIX: &str = "relay";
const MAX_NAME_ATTEMPTS: usize = 8;

pub const SCRATCH_MODE: u32 = 0o777;
pub const HOME_MODE: u32 = 0o700;
const ROOT_MODE: u32 = 0o755;

/// An isolated workspace owned by a single request.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    scratch: PathBuf,
    home: PathBuf,
    name: String,
    removed: bool,
}

impl Workspace {
    /// Create a fresh workspace under `base_dir`.
    ///
    /// Directory creation is exclusive: a name collision picks a new suffix
    /// instead of sharing an existing directory.
    pub fn create(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir)
            .with_context(|| format!("create workspace base {}", base_dir.display()))?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = build_workspace_name(&generate_timestamp(), &generate_short_id());
            let root = base_dir.join(&name);
            match fs::create_dir(&root) {
                Ok(()) => return Self::populate(root, name),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(name, "workspace name collision, retrying");
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("create workspace root {}", root.display()));
                }
            }
        }
        bail!(
            "could not allocate a unique workspace under {} after {MAX_NAME_ATTEMPTS} attempts",
            base_dir.display()
        )
    }

    fn populate(root: PathBuf, name: String) -> Result<Self> {
        let workspace = Self {
            scratch: root.join("work"),
            home: root.join("home"),
            root,
            name,
            removed: false,
        };
        // From here on, drop cleans up if any step fails.
        set_mode(&workspace.root, ROOT_MODE)?;
        fs::create_dir(&workspace.scratch)
            .with_context(|| format!("create scratch dir {}", workspace.scratch.display()))?;
        set_mode(&workspace.scratch, SCRATCH_MODE)?;
        fs::create_dir(&workspace.home)
            .with_context(|| format!("create home dir {}", workspace.home.display()))?;
        set_mode(&workspace.home, HOME_MODE)?;
        debug!(root = %workspace.root.display(), "workspace created");
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scratch directory the assistant writes into.
    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    /// Private home directory for the assistant's credential files.
    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delete the workspace and everything in it.
    pub fn remove(mut self) -> Result<()> {
        self.removed = true;
        fs::remove_dir_all(&self.root)
            .with_context(|| format!("remove workspace {}", self.root.display()))?;
        debug!(root = %self.root.display(), "workspace removed");
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.root) {
            warn!(root = %self.root.display(), err = %e, "failed to remove workspace on drop");
        }
    }
}

pub fn build_workspace_name(timestamp: &str, short_id: &str) -> String {
    format!("{NAME_PREFIX}_{timestamp}_{short_id}")
}

fn generate_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

fn generate_short_id() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(12)
        .collect::<String>()
        .to_lowercase()
}

/// List regular files directly inside `dir` whose extension is in `extensions`,
/// sorted by file name.
///
/// Only failing to open `dir` is an error; an entry that cannot be read is
/// logged and skipped.
pub fn list_files_with_extensions(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))?;
    Ok(select_files(
        entries.map(|entry| entry.map(|entry| entry.path())),
        extensions,
    ))
}

fn select_files<I>(entries: I, extensions: &[String]) -> Vec<PathBuf>
where
    I: IntoIterator<Item = io::Result<PathBuf>>,
{
    let mut files = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(err = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|allowed| allowed == ext));
        if matches {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files
}

/// Display name of a file inside a workspace directory.
pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("chmod {mode:o} {}", path.display()))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn workspace_name_uses_expected_format() {
        let name = build_workspace_name("20260118_120000", "abc123");
        assert_eq!(name, "relay_20260118_120000_abc123");
    }

    #[test]
    fn creates_scratch_and_home_directories() {
        let temp = tempdir().expect("tempdir");
        let workspace = Workspace::create(temp.path()).expect("workspace");

        assert!(workspace.scratch().is_dir());
        assert!(workspace.home().is_dir());
        assert!(workspace.root().starts_with(temp.path()));
        assert!(workspace.name().starts_with("relay_"));
    }

    #[cfg(unix)]
    #[test]
    fn scratch_is_world_writable_and_home_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().expect("tempdir");
        let workspace = Workspace::create(temp.path()).expect("workspace");
        let scratch_mode = fs::metadata(workspace.scratch())
            .expect("scratch meta")
            .permissions()
            .mode();
        let home_mode = fs::metadata(workspace.home())
            .expect("home meta")
            .permissions()
            .mode();
        assert_eq!(scratch_mode & 0o777, SCRATCH_MODE);
        assert_eq!(home_mode & 0o777, HOME_MODE);
    }

    #[test]
    fn sequential_workspaces_never_share_a_directory() {
        let temp = tempdir().expect("tempdir");
        let first = Workspace::create(temp.path()).expect("first");
        let second = Workspace::create(temp.path()).expect("second");
        assert_ne!(first.root(), second.root());
    }

    #[test]
    fn remove_deletes_root() {
        let temp = tempdir().expect("tempdir");
        let workspace = Workspace::create(temp.path()).expect("workspace");
        let root = workspace.root().to_path_buf();
        fs::write(workspace.scratch().join("a.py"), "print(1)").expect("write");

        workspace.remove().expect("remove");
        assert!(!root.exists());
    }

    #[test]
    fn drop_deletes_root_when_not_removed() {
        let temp = tempdir().expect("tempdir");
        let root = {
            let workspace = Workspace::create(temp.path()).expect("workspace");
            workspace.root().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[test]
    fn lists_matching_files_sorted_by_name() {
        let temp = tempdir().expect("tempdir");
        for name in ["b.py", "a.py", "notes.txt", "c.PY", "d.js"] {
            fs::write(temp.path().join(name), "").expect("write");
        }
        fs::create_dir(temp.path().join("dir.py")).expect("mkdir");

        let files = list_files_with_extensions(temp.path(), &["py".to_string()]).expect("list");
        let names: Vec<String> = files.iter().map(|path| file_label(path)).collect();
        assert_eq!(names, vec!["a.py", "b.py"]);
    }

    #[test]
    fn unreadable_entries_are_skipped() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("a.py"), "").expect("write");
        fs::write(temp.path().join("b.py"), "").expect("write");

        let entries = vec![
            Ok(temp.path().join("b.py")),
            Err(io::Error::new(ErrorKind::PermissionDenied, "denied")),
            Ok(temp.path().join("a.py")),
        ];
        let files = select_files(entries, &["py".to_string()]);
        let names: Vec<String> = files.iter().map(|path| file_label(path)).collect();
        assert_eq!(names, vec!["a.py", "b.py"]);
    }

    #[test]
    fn listing_missing_directory_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let err = list_files_with_extensions(&temp.path().join("missing"), &["py".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("read dir"));
    }
}
