use std::path::Path;

use super::controller::Controller;
use crate::common::{self, WrappedIoError};
use crate::config::Resources;
use crate::stats::{self, MemoryStats, ParseFlatKeyedDataError, StatsProvider};

const CGROUP_MEMORY_MAX: &str = "memory.max";
const CGROUP_MEMORY_CURRENT: &str = "memory.current";
const MEMORY_STAT: &str = "memory.stat";

#[derive(thiserror::Error, Debug)]
pub enum V2MemoryControllerError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("invalid memory value {0}")]
    MemoryValue(i64),
}

pub struct Memory {}

impl Controller for Memory {
    type Error = V2MemoryControllerError;

    fn apply(resources: &Resources, cgroup_path: &Path) -> Result<(), Self::Error> {
        tracing::debug!("Apply memory cgroup v2 config");
        Self::apply(cgroup_path, resources.memory)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum V2MemoryStatsError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("while parsing stat table: {0}")]
    ParseFlatKeyedData(#[from] ParseFlatKeyedDataError),
}

impl StatsProvider for Memory {
    type Error = V2MemoryStatsError;
    type Stats = MemoryStats;

    fn stats(cgroup_path: &Path) -> Result<Self::Stats, Self::Error> {
        let stats = MemoryStats {
            usage: stats::parse_single_value(&cgroup_path.join(CGROUP_MEMORY_CURRENT))?,
            limit: stats::parse_single_value(&cgroup_path.join(CGROUP_MEMORY_MAX))?,
            stats: stats::parse_flat_keyed_data(&cgroup_path.join(MEMORY_STAT))?,
        };

        Ok(stats)
    }
}

impl Memory {
    fn apply(path: &Path, limit: i64) -> Result<(), V2MemoryControllerError> {
        match limit {
            0 => Ok(()),
            -1 => Ok(common::write_cgroup_file_str(
                path.join(CGROUP_MEMORY_MAX),
                "max",
            )?),
            limit if limit < -1 => Err(V2MemoryControllerError::MemoryValue(limit)),
            limit => Ok(common::write_cgroup_file(
                path.join(CGROUP_MEMORY_MAX),
                limit,
            )?),
        }
    }
}
