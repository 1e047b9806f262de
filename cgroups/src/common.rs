use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::{BufRead, BufReader, ErrorKind, Write},
    path::{Path, PathBuf, StripPrefixError},
    thread,
    time::Duration,
};

use nix::unistd::Pid;

use crate::config::Resources;
use crate::controller_type::CgroupPaths;
use crate::stats::Stats;

pub const CGROUP_PROCS: &str = "cgroup.procs";
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

const REMOVE_RETRIES: u32 = 5;
const REMOVE_INITIAL_DELAY: Duration = Duration::from_millis(10);

pub trait CgroupManager {
    type Error;

    /// Creates the cgroup if needed and adds the process to it. A pid of -1 only
    /// creates the cgroup.
    fn apply(&self, pid: Pid) -> Result<(), Self::Error>;

    /// Removes the cgroup
    fn destroy(&self) -> Result<(), Self::Error>;

    /// Sets the freezer cgroup to the specified state
    fn freeze(&self, state: FreezerState) -> Result<(), Self::Error>;

    /// Retrieve statistics for the cgroup
    fn stats(&self) -> Result<Stats, Self::Error>;

    /// Applies resource restrictions to the cgroup
    fn set(&self, resources: &Resources) -> Result<(), Self::Error>;

    /// Gets the PIDs directly inside the cgroup
    fn get_pids(&self) -> Result<Vec<Pid>, Self::Error>;

    /// Gets the PIDs inside the cgroup and all of its descendants
    fn get_all_pids(&self) -> Result<Vec<Pid>, Self::Error>;

    /// Returns the cgroup path of every controller
    fn get_paths(&self) -> CgroupPaths;
}

/// FreezerState is given freezer controller
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FreezerState {
    /// Tasks in cgroup are undefined
    Undefined,
    /// Tasks in cgroup are suspended.
    Frozen,
    /// Tasks in cgroup are resuming.
    Thawed,
}

#[derive(thiserror::Error, Debug)]
pub enum WrappedIoError {
    #[error("failed to open {path}: {err}")]
    Open { err: std::io::Error, path: PathBuf },
    #[error("failed to write {data} to {path}: {err}")]
    Write {
        err: std::io::Error,
        path: PathBuf,
        data: String,
    },
    #[error("failed to read {path}: {err}")]
    Read { err: std::io::Error, path: PathBuf },
    #[error("failed to create dir {path}: {err}")]
    CreateDir { err: std::io::Error, path: PathBuf },
    #[error("failed to remove {path}: {err}")]
    Remove { err: std::io::Error, path: PathBuf },
    #[error("at {path}: {err}")]
    Other { err: std::io::Error, path: PathBuf },
}

impl WrappedIoError {
    pub fn inner(&self) -> &std::io::Error {
        match self {
            WrappedIoError::Open { err, .. } => err,
            WrappedIoError::Write { err, .. } => err,
            WrappedIoError::Read { err, .. } => err,
            WrappedIoError::CreateDir { err, .. } => err,
            WrappedIoError::Remove { err, .. } => err,
            WrappedIoError::Other { err, .. } => err,
        }
    }
}

#[inline]
pub fn write_cgroup_file_str<P: AsRef<Path>>(path: P, data: &str) -> Result<(), WrappedIoError> {
    let path = path.as_ref();

    fs::OpenOptions::new()
        .create(false)
        .write(true)
        .truncate(false)
        .open(path)
        .wrap_open(path)?
        .write_all(data.as_bytes())
        .wrap_write(path, data)?;

    Ok(())
}

#[inline]
pub fn write_cgroup_file<P: AsRef<Path>, T: ToString>(
    path: P,
    data: T,
) -> Result<(), WrappedIoError> {
    write_cgroup_file_str(path, &data.to_string())
}

#[inline]
pub fn read_cgroup_file<P: AsRef<Path>>(path: P) -> Result<String, WrappedIoError> {
    let path = path.as_ref();
    fs::read_to_string(path).wrap_read(path)
}

/// Adds the process to every cgroup of the path set that exists. A pid of -1 is ignored.
pub fn enter_pid(paths: &CgroupPaths, pid: Pid) -> Result<(), WrappedIoError> {
    if pid.as_raw() == -1 {
        return Ok(());
    }

    for path in distinct_paths(paths) {
        if path.exists() {
            tracing::debug!("add pid {} to {:?}", pid, path);
            write_cgroup_file(path.join(CGROUP_PROCS), pid)?;
        }
    }

    Ok(())
}

/// Returns the processes that are direct members of the cgroup.
pub fn get_pids(path: &Path) -> Result<Vec<Pid>, WrappedIoError> {
    read_procs(&path.join(CGROUP_PROCS))
}

/// Returns the processes of the cgroup and all of its descendants.
pub fn get_all_pids(path: &Path) -> Result<Vec<Pid>, WrappedIoError> {
    tracing::debug!("scan pids in folder: {:?}", path);
    let mut result = vec![];
    walk_dir(path, &mut |p| {
        let file_path = p.join(CGROUP_PROCS);
        if file_path.exists() {
            result.extend(read_procs(&file_path)?);
        }
        Ok::<(), WrappedIoError>(())
    })?;
    Ok(result)
}

fn read_procs(file_path: &Path) -> Result<Vec<Pid>, WrappedIoError> {
    let file = File::open(file_path).wrap_open(file_path)?;
    let mut pids = vec![];
    for line in BufReader::new(file).lines() {
        let line = line.wrap_read(file_path)?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        pids.push(Pid::from_raw(
            line.parse::<i32>()
                .map_err(|err| std::io::Error::new(ErrorKind::InvalidData, err))
                .wrap_other(file_path)?,
        ));
    }
    Ok(pids)
}

fn walk_dir<F, E>(path: &Path, c: &mut F) -> Result<(), E>
where
    F: FnMut(&Path) -> Result<(), E>,
    E: From<WrappedIoError>,
{
    c(path)?;
    for entry in fs::read_dir(path).wrap_read(path)? {
        let entry = entry.wrap_open(path)?;
        let path = entry.path();

        if path.is_dir() {
            walk_dir(&path, c)?;
        }
    }
    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum RemovePathsError {
    #[error("failed to remove cgroup paths {remaining:?}: {err}")]
    Remaining {
        remaining: Vec<PathBuf>,
        err: WrappedIoError,
    },
}

/// Removes every distinct directory of the path set, descendants first. Busy cgroups
/// are retried with an increasing delay before giving up.
pub fn remove_paths(paths: &CgroupPaths) -> Result<(), RemovePathsError> {
    let mut remaining: Vec<PathBuf> = distinct_paths(paths).into_iter().collect();
    let mut delay = REMOVE_INITIAL_DELAY;
    let mut last_err = None;

    for attempt in 0..REMOVE_RETRIES {
        if attempt != 0 {
            thread::sleep(delay);
            delay *= 2;
        }

        remaining.retain(|path| match remove_cgroup_dir(path) {
            Ok(()) => false,
            Err(err) => {
                tracing::debug!("failed to remove {:?}: {}", path, err);
                last_err = Some(err);
                true
            }
        });

        if remaining.is_empty() {
            return Ok(());
        }
    }

    Err(RemovePathsError::Remaining {
        remaining,
        err: last_err.unwrap_or_else(|| WrappedIoError::Other {
            err: std::io::Error::new(ErrorKind::TimedOut, "could not delete"),
            path: PathBuf::new(),
        }),
    })
}

/// Removes a cgroup directory including all child cgroups. Only directories are
/// removed since the files inside a cgroup vanish together with it.
pub(crate) fn remove_cgroup_dir(path: &Path) -> Result<(), WrappedIoError> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(WrappedIoError::Read {
            err,
            path: path.to_path_buf(),
        }),
    };

    for entry in entries {
        let entry = entry.wrap_read(path)?;
        let child = entry.path();
        if child.is_dir() {
            remove_cgroup_dir(&child)?;
        }
    }

    match fs::remove_dir(path) {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(WrappedIoError::Remove {
            err,
            path: path.to_path_buf(),
        }),
        _ => Ok(()),
    }
}

fn distinct_paths(paths: &CgroupPaths) -> BTreeSet<PathBuf> {
    paths.iter().map(|(_, p)| p.to_path_buf()).collect()
}

pub(crate) trait PathBufExt {
    fn join_safely<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf, JoinSafelyError>;
}

#[derive(thiserror::Error, Debug)]
pub enum JoinSafelyError {
    #[error("failed to strip prefix from {path}: {err}")]
    StripPrefix {
        err: StripPrefixError,
        path: PathBuf,
    },
}

impl PathBufExt for PathBuf {
    fn join_safely<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf, JoinSafelyError> {
        let path = path.as_ref();
        if path.is_relative() {
            return Ok(self.join(path));
        }

        let stripped = path
            .strip_prefix("/")
            .map_err(|err| JoinSafelyError::StripPrefix {
                err,
                path: path.to_path_buf(),
            })?;
        Ok(self.join(stripped))
    }
}

pub(crate) trait WrapIoResult {
    type Target;

    fn wrap_create_dir<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
    fn wrap_read<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
    fn wrap_open<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
    fn wrap_write<P: Into<PathBuf>, D: Into<String>>(
        self,
        path: P,
        data: D,
    ) -> Result<Self::Target, WrappedIoError>;
    fn wrap_other<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
}

impl<T> WrapIoResult for Result<T, std::io::Error> {
    type Target = T;

    fn wrap_create_dir<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::CreateDir {
            err,
            path: path.into(),
        })
    }

    fn wrap_read<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Read {
            err,
            path: path.into(),
        })
    }

    fn wrap_open<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Open {
            err,
            path: path.into(),
        })
    }

    fn wrap_write<P: Into<PathBuf>, D: Into<String>>(
        self,
        path: P,
        data: D,
    ) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Write {
            err,
            path: path.into(),
            data: data.into(),
        })
    }

    fn wrap_other<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Other {
            err,
            path: path.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::set_fixture;
    use anyhow::Result;

    #[test]
    fn test_enter_pid_writes_every_existing_path_once() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let procs = set_fixture(tmp.path(), CGROUP_PROCS, "")?;

        let mut paths = CgroupPaths::unified(tmp.path());
        paths.insert(
            crate::controller_type::ControllerType::Devices,
            tmp.path().join("does-not-exist"),
        );

        enter_pid(&paths, Pid::from_raw(1234))?;
        assert_eq!(fs::read_to_string(procs)?, "1234");

        Ok(())
    }

    #[test]
    fn test_enter_pid_ignores_placeholder_pid() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let procs = set_fixture(tmp.path(), CGROUP_PROCS, "")?;

        enter_pid(&CgroupPaths::unified(tmp.path()), Pid::from_raw(-1))?;
        assert_eq!(fs::read_to_string(procs)?, "");

        Ok(())
    }

    #[test]
    fn test_get_pids_only_reads_the_cgroup_itself() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        set_fixture(tmp.path(), CGROUP_PROCS, "1\n2\n")?;
        let child = tmp.path().join("child");
        fs::create_dir(&child)?;
        set_fixture(&child, CGROUP_PROCS, "3\n")?;

        let pids = get_pids(tmp.path())?;
        assert_eq!(pids, vec![Pid::from_raw(1), Pid::from_raw(2)]);

        let mut all = get_all_pids(tmp.path())?;
        all.sort();
        assert_eq!(
            all,
            vec![Pid::from_raw(1), Pid::from_raw(2), Pid::from_raw(3)]
        );

        Ok(())
    }

    #[test]
    fn test_get_pids_rejects_garbage() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        set_fixture(tmp.path(), CGROUP_PROCS, "abc\n")?;

        assert!(get_pids(tmp.path()).is_err());
        Ok(())
    }

    #[test]
    fn test_remove_paths_removes_nested_cgroups() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let cgroup = tmp.path().join("foo.scope");
        fs::create_dir_all(cgroup.join("child/grandchild"))?;

        remove_paths(&CgroupPaths::unified(&cgroup))?;
        assert!(!cgroup.exists());
        assert!(tmp.path().exists());

        Ok(())
    }

    #[test]
    fn test_remove_paths_tolerates_missing_paths() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        remove_paths(&CgroupPaths::unified(tmp.path().join("gone")))?;
        remove_paths(&CgroupPaths::default())?;

        Ok(())
    }

    #[test]
    fn test_remove_paths_reports_remaining() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let cgroup = tmp.path().join("busy");
        fs::create_dir(&cgroup)?;
        // a regular file keeps the directory from being removed
        set_fixture(&cgroup, "leftover", "x")?;

        let result = remove_paths(&CgroupPaths::unified(&cgroup));
        match result {
            Err(RemovePathsError::Remaining { remaining, .. }) => {
                assert_eq!(remaining, vec![cgroup.clone()])
            }
            other => panic!("expected removal failure, got {other:?}"),
        }
        assert!(cgroup.exists());

        Ok(())
    }

    #[test]
    fn test_join_safely() -> Result<()> {
        let root = PathBuf::from("/sys/fs/cgroup");
        assert_eq!(
            root.join_safely("/system.slice")?,
            PathBuf::from("/sys/fs/cgroup/system.slice")
        );
        assert_eq!(
            root.join_safely("user.slice")?,
            PathBuf::from("/sys/fs/cgroup/user.slice")
        );

        Ok(())
    }
}
