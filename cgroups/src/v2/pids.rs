use std::path::Path;

use super::controller::Controller;
use crate::common::{self, WrappedIoError};
use crate::config::Resources;
use crate::stats::{self, PidStats, PidStatsError, StatsProvider};

const CGROUP_PIDS_MAX: &str = "pids.max";

pub struct Pids {}

impl Controller for Pids {
    type Error = WrappedIoError;

    fn apply(resources: &Resources, cgroup_root: &Path) -> Result<(), Self::Error> {
        tracing::debug!("Apply pids cgroup v2 config");
        if resources.pids_limit > 0 {
            Self::apply(cgroup_root, resources.pids_limit)?;
        }
        Ok(())
    }
}

impl StatsProvider for Pids {
    type Error = PidStatsError;
    type Stats = PidStats;

    fn stats(cgroup_path: &Path) -> Result<Self::Stats, Self::Error> {
        stats::pid_stats(cgroup_path)
    }
}

impl Pids {
    fn apply(root_path: &Path, limit: i64) -> Result<(), WrappedIoError> {
        common::write_cgroup_file(root_path.join(CGROUP_PIDS_MAX), limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::set_fixture;

    #[test]
    fn test_set_pids() {
        let tmp = tempfile::tempdir().unwrap();
        set_fixture(tmp.path(), CGROUP_PIDS_MAX, "max").expect("Set fixture for pids");

        let resources = Resources {
            pids_limit: 1000,
            ..Default::default()
        };

        <Pids as Controller>::apply(&resources, tmp.path()).expect("apply pids");
        let content =
            std::fs::read_to_string(tmp.path().join(CGROUP_PIDS_MAX)).expect("Read pids contents");
        assert_eq!("1000", content);
    }

    #[test]
    fn test_unset_pids_is_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        set_fixture(tmp.path(), CGROUP_PIDS_MAX, "max").expect("set fixture for pids");

        <Pids as Controller>::apply(&Resources::default(), tmp.path()).expect("apply pids");

        let content =
            std::fs::read_to_string(tmp.path().join(CGROUP_PIDS_MAX)).expect("Read pids contents");
        assert_eq!("max", content);
    }
}
