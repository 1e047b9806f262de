use std::fs;
use std::os::unix::fs::DirBuilderExt;
use std::path::PathBuf;

use nix::unistd::Pid;

use super::controller::Controller;
use super::cpu::{Cpu, V2CpuControllerError, V2CpuStatsError};
use super::freezer::{Freezer, V2FreezerError};
use super::memory::{Memory, V2MemoryControllerError, V2MemoryStatsError};
use super::pids::Pids;
use super::util::{self, V2UtilError};
use crate::common::{self, CgroupManager, FreezerState, WrapIoResult, WrappedIoError};
use crate::config::Resources;
use crate::controller_type::CgroupPaths;
use crate::stats::{PidStatsError, Stats, StatsProvider};

#[derive(thiserror::Error, Debug)]
pub enum V2ManagerError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("util error: {0}")]
    Util(#[from] V2UtilError),

    #[error(transparent)]
    CpuController(#[from] V2CpuControllerError),
    #[error(transparent)]
    MemoryController(#[from] V2MemoryControllerError),
    #[error(transparent)]
    Freezer(#[from] V2FreezerError),

    #[error(transparent)]
    CpuStats(#[from] V2CpuStatsError),
    #[error(transparent)]
    MemoryStats(#[from] V2MemoryStatsError),
    #[error(transparent)]
    PidsStats(#[from] PidStatsError),
}

/// Drives a single cgroup of the unified hierarchy through its interface files.
pub struct Manager {
    full_path: PathBuf,
}

impl Manager {
    /// Constructs a manager for the cgroup at `full_path`, an absolute path below the
    /// cgroup2 mount point.
    pub fn new<P: Into<PathBuf>>(full_path: P) -> Self {
        Self {
            full_path: full_path.into(),
        }
    }

    fn create_cgroup(&self) -> Result<(), WrappedIoError> {
        if !self.full_path.exists() {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(0o755)
                .create(&self.full_path)
                .wrap_create_dir(&self.full_path)?;
        }

        Ok(())
    }
}

impl CgroupManager for Manager {
    type Error = V2ManagerError;

    fn apply(&self, pid: Pid) -> Result<(), Self::Error> {
        self.create_cgroup()?;
        common::enter_pid(&self.get_paths(), pid)?;
        Ok(())
    }

    fn destroy(&self) -> Result<(), Self::Error> {
        tracing::debug!("remove cgroup {:?}", self.full_path);
        common::remove_cgroup_dir(&self.full_path)?;
        Ok(())
    }

    fn freeze(&self, state: FreezerState) -> Result<(), Self::Error> {
        Freezer::apply(state, &self.full_path)?;
        Ok(())
    }

    fn stats(&self) -> Result<Stats, Self::Error> {
        let mut stats = Stats::default();

        for controller in util::get_available_controllers(&self.full_path)? {
            match controller.as_str() {
                "cpu" => stats.cpu = Cpu::stats(&self.full_path)?,
                "memory" => stats.memory = Memory::stats(&self.full_path)?,
                "pids" => stats.pids = Pids::stats(&self.full_path)?,
                _ => continue,
            }
        }

        Ok(stats)
    }

    fn set(&self, resources: &Resources) -> Result<(), Self::Error> {
        <Cpu as Controller>::apply(resources, &self.full_path)?;
        <Memory as Controller>::apply(resources, &self.full_path)?;
        <Pids as Controller>::apply(resources, &self.full_path)?;
        Ok(())
    }

    fn get_pids(&self) -> Result<Vec<Pid>, Self::Error> {
        Ok(common::get_pids(&self.full_path)?)
    }

    fn get_all_pids(&self) -> Result<Vec<Pid>, Self::Error> {
        Ok(common::get_all_pids(&self.full_path)?)
    }

    fn get_paths(&self) -> CgroupPaths {
        CgroupPaths::unified(&self.full_path)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::controller_type::ControllerType;
    use crate::test::{create_cgroup_dir, set_fixture};
    use anyhow::Result;

    #[test]
    fn test_apply_creates_cgroup_and_enters_pid() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let cgroup = tmp.path().join("system.slice/foo.scope");
        let manager = Manager::new(&cgroup);

        // placeholder pid only creates the directory
        manager.apply(Pid::from_raw(-1))?;
        assert!(cgroup.is_dir());

        set_fixture(&cgroup, common::CGROUP_PROCS, "")?;
        manager.apply(Pid::from_raw(42))?;
        assert_eq!(fs::read_to_string(cgroup.join(common::CGROUP_PROCS))?, "42");
        assert_eq!(manager.get_pids()?, vec![Pid::from_raw(42)]);

        Ok(())
    }

    #[test]
    fn test_set_writes_interface_files() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let cgroup = create_cgroup_dir(
            &tmp.path().join("foo.scope"),
            &["cpu.weight", "cpu.max", "memory.max", "pids.max"],
        )?;
        let manager = Manager::new(&cgroup);

        manager.set(&Resources {
            memory: 104857600,
            cpu_weight: 512,
            cpu_quota: 50000,
            cpu_period: 100000,
            pids_limit: 64,
        })?;

        assert_eq!(fs::read_to_string(cgroup.join("memory.max"))?, "104857600");
        assert_eq!(fs::read_to_string(cgroup.join("cpu.weight"))?, "512");
        assert_eq!(fs::read_to_string(cgroup.join("cpu.max"))?, "50000 100000");
        assert_eq!(fs::read_to_string(cgroup.join("pids.max"))?, "64");

        Ok(())
    }

    #[test]
    fn test_stats_only_reads_enabled_controllers() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let cgroup = tmp.path();
        set_fixture(cgroup, "cgroup.controllers", "cpu pids")?;
        set_fixture(
            cgroup,
            "cpu.stat",
            "usage_usec 100\nuser_usec 60\nsystem_usec 40",
        )?;
        set_fixture(cgroup, "pids.current", "3")?;
        set_fixture(cgroup, "pids.max", "10")?;

        let manager = Manager::new(cgroup);
        let stats = manager.stats()?;
        assert_eq!(stats.cpu.usage.usage_total, 100);
        assert_eq!(stats.pids.current, 3);
        assert_eq!(stats.pids.limit, 10);
        // no memory files exist, so memory must not have been read
        assert_eq!(stats.memory.usage, 0);

        Ok(())
    }

    #[test]
    fn test_destroy_removes_cgroup() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let cgroup = tmp.path().join("foo.scope");
        fs::create_dir_all(cgroup.join("child"))?;

        let manager = Manager::new(&cgroup);
        manager.destroy()?;
        assert!(!cgroup.exists());

        // a second removal finds nothing and succeeds
        manager.destroy()?;

        Ok(())
    }

    #[test]
    fn test_get_paths_is_unified() {
        let manager = Manager::new("/sys/fs/cgroup/system.slice/foo.scope");
        let paths = manager.get_paths();
        assert_eq!(
            paths.get(ControllerType::Freezer),
            Some(Path::new("/sys/fs/cgroup/system.slice/foo.scope"))
        );
    }
}
