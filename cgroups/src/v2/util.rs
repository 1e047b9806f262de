use std::path::{Path, PathBuf};

use procfs::{process::Process, ProcError};

use crate::common::{self, WrappedIoError};

pub const CGROUP_CONTROLLERS: &str = "cgroup.controllers";
pub const CGROUP_SUBTREE_CONTROL: &str = "cgroup.subtree_control";

#[derive(thiserror::Error, Debug)]
pub enum V2UtilError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("proc error: {0}")]
    Proc(#[from] ProcError),
    #[error("could not find mountpoint for unified")]
    CouldNotFind,
    #[error("cannot get available controllers. {0} does not exist")]
    DoesNotExist(PathBuf),
}

// Reads the `/proc/self/mountinfo` to get the mount point of this cgroup
pub fn get_unified_mount_point() -> Result<PathBuf, V2UtilError> {
    Process::myself()?
        .mountinfo()?
        .into_iter()
        .find(|m| m.fs_type == "cgroup2")
        .map(|m| m.mount_point)
        .ok_or(V2UtilError::CouldNotFind)
}

/// Reads `{cgroup_path}/cgroup.controllers` and returns the kernel names of the
/// controllers available in this cgroup, in the order the kernel lists them.
pub fn get_available_controllers<P: AsRef<Path>>(
    cgroup_path: P,
) -> Result<Vec<String>, V2UtilError> {
    let controllers_path = cgroup_path.as_ref().join(CGROUP_CONTROLLERS);
    if !controllers_path.exists() {
        return Err(V2UtilError::DoesNotExist(controllers_path));
    }

    Ok(common::read_cgroup_file(controllers_path)?
        .split_whitespace()
        .map(str::to_owned)
        .collect())
}
