use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Component, Path, PathBuf};

use crate::common::{self, WrappedIoError};
use crate::v2::util::{self, V2UtilError, CGROUP_SUBTREE_CONTROL};

#[derive(thiserror::Error, Debug)]
pub enum DelegationError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("failed to read available controllers: {0}")]
    Controllers(#[from] V2UtilError),
    #[error("{path:?} is not below the cgroup root {root:?}")]
    OutsideRoot { root: PathBuf, path: PathBuf },
}

/// Makes sure *each level* in the downward path from the cgroup root to `path` exists and
/// delegates every controller available at the root to its children.
///
/// The leaf gets no subtree control. A cgroup with controllers enabled for its children
/// cannot hold processes itself, so writing to its `cgroup.procs` would fail with EBUSY.
/// Directories created here are removed again if a later step fails.
pub fn prepare_tree(root: &Path, path: &Path) -> Result<(), DelegationError> {
    let segments = relative_segments(root, path)?;

    let controllers = util::get_available_controllers(root)?
        .iter()
        .map(|c| format!("+{c}"))
        .collect::<Vec<_>>()
        .join(" ");

    let mut created = Vec::new();
    let result = walk(root, &segments, &controllers, &mut created);
    if result.is_err() {
        rollback(&created);
    }

    result
}

fn relative_segments<'a>(root: &Path, path: &'a Path) -> Result<Vec<&'a Path>, DelegationError> {
    let outside_root = || DelegationError::OutsideRoot {
        root: root.to_path_buf(),
        path: path.to_path_buf(),
    };

    path.strip_prefix(root)
        .map_err(|_| outside_root())?
        .components()
        .map(|c| match c {
            Component::Normal(segment) => Ok(Path::new(segment)),
            _ => Err(outside_root()),
        })
        .collect()
}

fn walk(
    root: &Path,
    segments: &[&Path],
    controllers: &str,
    created: &mut Vec<PathBuf>,
) -> Result<(), DelegationError> {
    if segments.is_empty() {
        return Ok(());
    }

    // the root is never created, but delegates like every other non-leaf level
    write_controllers(root, controllers)?;

    let mut current = root.to_path_buf();
    for (i, segment) in segments.iter().enumerate() {
        current.push(segment);

        match fs::DirBuilder::new().mode(0o755).create(&current) {
            Ok(()) => {
                tracing::debug!("created cgroup {:?}", current);
                created.push(current.clone());
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => {
                return Err(WrappedIoError::CreateDir {
                    err,
                    path: current,
                }
                .into())
            }
        }

        if i + 1 < segments.len() {
            write_controllers(&current, controllers)?;
        }
    }

    Ok(())
}

fn write_controllers(path: &Path, controllers: &str) -> Result<(), WrappedIoError> {
    if controllers.is_empty() {
        return Ok(());
    }

    common::write_cgroup_file_str(path.join(CGROUP_SUBTREE_CONTROL), controllers)
}

fn rollback(created: &[PathBuf]) {
    for dir in created.iter().rev() {
        tracing::debug!("removing {:?} after failed delegation", dir);
        if let Err(err) = fs::remove_dir(dir) {
            tracing::warn!("failed to remove {:?}: {}", dir, err);
        }
    }
}
