//! Directory enumeration and the opt-in rescan task.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Weak;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Excludes;
use crate::watcher::Inner;

/// List the immediate children of `dir`, without descending.
///
/// Entries that cannot be read are skipped with a warning. Only a failure to
/// open `dir` itself is returned as an error.
pub(crate) fn list_children(dir: &Path, excludes: &Excludes) -> io::Result<Vec<PathBuf>> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    let mut children = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(io::Error::from(e)),
            Err(e) => {
                warn!("Skipping entry in {}: {e}", dir.display());
                continue;
            }
        };

        let path = entry.into_path();
        if excludes.matches(&path) {
            debug!("Excluded: {}", path.display());
            continue;
        }
        children.push(path);
    }

    Ok(children)
}

/// Re-enumerate `dir` every `interval` and watch children that appeared.
///
/// Holds only a weak handle, so dropping the last watcher handle ends the
/// task as well.
pub(crate) async fn rescan(
    inner: Weak<Inner>,
    dir: PathBuf,
    interval: Duration,
    cancel: CancellationToken,
) {
    debug!("Rescanning {} every {interval:?}", dir.display());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        let Ok(context) = inner.context().await else {
            break;
        };

        match inner.add_children(&context, &dir).await {
            Ok(0) => {}
            Ok(added) => info!("Rescan of {} found {added} new entries", dir.display()),
            Err(e) => {
                warn!("Stopping rescan of {}: {e}", dir.display());
                inner.registry.remove_directory(&dir).await;
                break;
            }
        }
    }

    debug!("Stopped rescanning {}", dir.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::{self, File};
    use tempfile::TempDir;

    #[test]
    fn test_lists_one_level() {
        let temp_dir = TempDir::new().unwrap();
        File::create(temp_dir.path().join("a.txt")).unwrap();
        File::create(temp_dir.path().join("b.txt")).unwrap();
        fs::create_dir(temp_dir.path().join("sub")).unwrap();
        File::create(temp_dir.path().join("sub/nested.txt")).unwrap();

        let children = list_children(temp_dir.path(), &Excludes::default()).unwrap();

        assert_eq!(
            children,
            vec![
                temp_dir.path().join("a.txt"),
                temp_dir.path().join("b.txt"),
                temp_dir.path().join("sub"),
            ]
        );
    }

    #[test]
    fn test_applies_excludes() {
        let temp_dir = TempDir::new().unwrap();
        File::create(temp_dir.path().join("keep.txt")).unwrap();
        File::create(temp_dir.path().join("skip.tmp")).unwrap();

        let excludes = Excludes::new(vec![glob::Pattern::new("**/*.tmp").unwrap()]);
        let children = list_children(temp_dir.path(), &excludes).unwrap();

        assert_eq!(children, vec![temp_dir.path().join("keep.txt")]);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");

        let err = list_children(&missing, &Excludes::default()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
