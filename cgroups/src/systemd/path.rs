use std::path::{Path, PathBuf};

use crate::common::{JoinSafelyError, PathBufExt};
use crate::config::Cgroup;
use crate::controller_type::{CgroupPaths, ControllerType};

/// Slice a scope is placed in when no parent is configured
pub const DEFAULT_SLICE: &str = "system.slice";
const SLICE_SUFFIX: &str = ".slice";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ExpandSliceError {
    #[error("invalid slice name {0}: expected a name ending in .slice")]
    MissingSuffix(String),
    #[error("invalid slice name {0}: must not contain '/'")]
    ContainsSlash(String),
    #[error("invalid slice name {0}: empty component")]
    EmptyComponent(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ComputePathError {
    #[error("failed to expand parent slice: {0}")]
    ExpandSlice(#[from] ExpandSliceError),
    #[error("failed to join cgroup path: {0}")]
    JoinSafely(#[from] JoinSafelyError),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("cannot detect unified path")]
    NoPathDetected,
    #[error("expected {controller} path to be unified path {expected:?}, got {actual:?}")]
    Inconsistent {
        controller: ControllerType,
        expected: PathBuf,
        actual: PathBuf,
    },
}

/// Returns the name of the unit owning the cgroup, e.g. `docker-foo.scope` for the
/// container `foo` with prefix `docker`. Names that already end in `.slice` describe a
/// grouping unit and are taken as they are.
pub fn get_unit_name(cgroup: &Cgroup) -> String {
    if cgroup.name.ends_with(SLICE_SUFFIX) {
        return cgroup.name.clone();
    }

    match cgroup.scope_prefix.as_str() {
        "" => format!("{}.scope", cgroup.name),
        prefix => format!("{}-{}.scope", prefix, cgroup.name),
    }
}

// systemd represents slice hierarchy using `-`, so we need to follow suit when
// generating the path of slice. For example, 'test-a-b.slice' becomes
// '/test.slice/test-a.slice/test-a-b.slice'.
pub fn expand_slice(slice: &str) -> Result<PathBuf, ExpandSliceError> {
    let slice_name = match slice.strip_suffix(SLICE_SUFFIX) {
        Some(name) if !name.is_empty() => name,
        _ => return Err(ExpandSliceError::MissingSuffix(slice.to_owned())),
    };
    if slice.contains('/') {
        return Err(ExpandSliceError::ContainsSlash(slice.to_owned()));
    }
    // the root slice
    if slice_name == "-" {
        return Ok(PathBuf::from("/"));
    }

    let mut path = PathBuf::from("/");
    let mut prefix = String::new();
    for component in slice_name.split('-') {
        if component.is_empty() {
            return Err(ExpandSliceError::EmptyComponent(slice.to_owned()));
        }
        path.push(format!("{prefix}{component}{SLICE_SUFFIX}"));
        prefix = format!("{prefix}{component}-");
    }

    Ok(path)
}

/// Computes where systemd places the unit of `cgroup` below the cgroup2 mount `root`.
pub fn compute_path(root: &Path, cgroup: &Cgroup) -> Result<PathBuf, ComputePathError> {
    let parent = match cgroup.parent.as_str() {
        "" => DEFAULT_SLICE,
        parent => parent,
    };

    let slice = expand_slice(parent)?;
    let path = root
        .to_path_buf()
        .join_safely(&slice)?
        .join_safely(get_unit_name(cgroup))?;
    Ok(path)
}

/// Collapses a path set into its single unified path. Every populated controller must
/// point at the same directory.
pub fn reconcile(paths: &CgroupPaths) -> Result<PathBuf, ReconcileError> {
    let mut entries = paths.iter();
    let (_, unified) = entries.next().ok_or(ReconcileError::NoPathDetected)?;

    for (controller, path) in entries {
        if path != unified {
            return Err(ReconcileError::Inconsistent {
                controller,
                expected: unified.to_path_buf(),
                actual: path.to_path_buf(),
            });
        }
    }

    Ok(unified.to_path_buf())
}
