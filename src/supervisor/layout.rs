//! Working-directory layout.
//!
//! Each linked folder in the backend working directory is replaced with a
//! symbolic link into the durable store. The three starting states are all
//! handled without failing:
//!
//! ```text
//! link exists        → kept if it points at the store, re-pointed otherwise
//! dir/file exists    → removed, then linked
//! nothing exists     → linked
//! ```

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::download::store::ContentStore;

/// What happened to one linked folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    /// The link already pointed at the store.
    AlreadyLinked,
    /// A link pointing elsewhere was replaced.
    Relinked,
    /// A plain directory or file was removed and replaced.
    Replaced,
    /// Nothing existed; the link was created.
    Created,
}

/// Folder name plus the action applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReport {
    pub folder: String,
    pub link: PathBuf,
    pub target: PathBuf,
    pub action: LinkAction,
}

/// Bootstrap the store and link `folders` from `working_dir` into it.
pub async fn prepare_layout(
    store: &ContentStore,
    working_dir: &Path,
    folders: &[String],
) -> io::Result<Vec<LinkReport>> {
    store.bootstrap(folders).await?;
    crate::download::store::ensure_dir(working_dir).await?;

    // Link targets resolve from the link's directory, so they must be absolute.
    let root = absolute_root(store.root())?;

    let mut reports = Vec::with_capacity(folders.len());
    for folder in folders {
        let link = working_dir.join(folder);
        let target = root.join(folder);
        let action = link_folder(&link, &target).await?;

        tracing::debug!(
            link = %link.display(),
            target = %target.display(),
            action = ?action,
            "Linked folder into store"
        );
        reports.push(LinkReport {
            folder: folder.clone(),
            link,
            target,
            action,
        });
    }
    Ok(reports)
}

/// `root` as an absolute path, relative roots taken from the current directory.
fn absolute_root(root: &Path) -> io::Result<PathBuf> {
    if root.is_absolute() {
        Ok(root.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(root))
    }
}

async fn link_folder(link: &Path, target: &Path) -> io::Result<LinkAction> {
    let action = match fs::symlink_metadata(link).await {
        Ok(meta) if meta.file_type().is_symlink() => {
            if fs::read_link(link).await? == target {
                return Ok(LinkAction::AlreadyLinked);
            }
            fs::remove_file(link).await?;
            LinkAction::Relinked
        }
        Ok(meta) if meta.is_dir() => {
            fs::remove_dir_all(link).await?;
            LinkAction::Replaced
        }
        Ok(_) => {
            fs::remove_file(link).await?;
            LinkAction::Replaced
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => LinkAction::Created,
        Err(e) => return Err(e),
    };

    symlink_dir(target, link).await?;
    Ok(action)
}

#[cfg(unix)]
async fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    fs::symlink(target, link).await
}

#[cfg(windows)]
async fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    fs::symlink_dir(target, link).await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn folders() -> Vec<String> {
        ["models", "custom_nodes", "output", "input"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[tokio::test]
    async fn handles_all_three_starting_states() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path().join("storage"));
        let work = dir.path().join("app");

        std::fs::create_dir_all(work.join("models/checkpoints")).unwrap();
        std::fs::write(work.join("models/checkpoints/stale.bin"), b"x").unwrap();
        std::fs::write(work.join("input"), b"not a dir").unwrap();
        std::os::unix::fs::symlink(dir.path(), work.join("output")).unwrap();

        let reports = prepare_layout(&store, &work, &folders()).await.unwrap();
        let actions: Vec<_> = reports.iter().map(|r| r.action).collect();
        assert_eq!(
            actions,
            vec![
                LinkAction::Replaced,
                LinkAction::Created,
                LinkAction::Relinked,
                LinkAction::Replaced,
            ]
        );

        for report in &reports {
            assert_eq!(std::fs::read_link(&report.link).unwrap(), report.target);
            assert!(report.target.is_dir());
        }
        assert!(work.join("models/vae").is_dir());
    }

    #[tokio::test]
    async fn second_run_converges_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path().join("storage"));
        let work = dir.path().join("app");

        let first = prepare_layout(&store, &work, &folders()).await.unwrap();
        let second = prepare_layout(&store, &work, &folders()).await.unwrap();

        assert!(first.iter().all(|r| r.action == LinkAction::Created));
        assert!(second.iter().all(|r| r.action == LinkAction::AlreadyLinked));
        let targets = |reports: &[LinkReport]| {
            reports
                .iter()
                .map(|r| std::fs::read_link(&r.link).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(targets(&first), targets(&second));
    }

    #[test]
    fn relative_root_becomes_absolute_target() {
        let resolved = absolute_root(Path::new("storage")).unwrap();
        assert!(resolved.is_absolute());
        assert_eq!(resolved, std::env::current_dir().unwrap().join("storage"));

        let absolute = Path::new("/srv/storage");
        assert_eq!(absolute_root(absolute).unwrap(), absolute);
    }

    #[tokio::test]
    async fn every_link_resolves_to_a_store_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path().join("storage"));
        let work = dir.path().join("app");

        let reports = prepare_layout(&store, &work, &folders()).await.unwrap();
        for report in &reports {
            assert!(report.target.is_absolute());
            // Follows the link itself, not just the recorded target.
            assert!(std::fs::metadata(&report.link).unwrap().is_dir());
        }
    }
}
