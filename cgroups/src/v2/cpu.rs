use std::path::{Path, PathBuf};

use super::controller::Controller;
use crate::common::{self, WrappedIoError};
use crate::config::Resources;
use crate::stats::{self, CpuStats, ParseFlatKeyedDataError, StatsProvider};

const CGROUP_CPU_WEIGHT: &str = "cpu.weight";
const CGROUP_CPU_MAX: &str = "cpu.max";
const UNRESTRICTED_QUOTA: &str = "max";
const MAX_CPU_WEIGHT: u64 = 10000;

const CPU_STAT: &str = "cpu.stat";

#[derive(thiserror::Error, Debug)]
pub enum V2CpuControllerError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("cpu weight {0} is out of range 1-10000")]
    WeightOutOfRange(u64),
}

pub struct Cpu {}

impl Controller for Cpu {
    type Error = V2CpuControllerError;

    fn apply(resources: &Resources, path: &Path) -> Result<(), Self::Error> {
        tracing::debug!("Apply cpu cgroup v2 config");
        Self::apply(path, resources)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum V2CpuStatsError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("while parsing stat table: {0}")]
    ParseFlatKeyedData(#[from] ParseFlatKeyedDataError),
    #[error("missing field {field} from {path}")]
    MissingField { field: &'static str, path: PathBuf },
}

impl StatsProvider for Cpu {
    type Error = V2CpuStatsError;
    type Stats = CpuStats;

    fn stats(cgroup_path: &Path) -> Result<Self::Stats, Self::Error> {
        let mut stats = CpuStats::default();
        let stats_path = cgroup_path.join(CPU_STAT);

        let stats_table = stats::parse_flat_keyed_data(&stats_path)?;

        macro_rules! get {
            ($name: expr => $field1:ident.$field2:ident) => {
                stats.$field1.$field2 =
                    *stats_table
                        .get($name)
                        .ok_or_else(|| V2CpuStatsError::MissingField {
                            field: $name,
                            path: stats_path.clone(),
                        })?;
            };
        }

        get!("usage_usec" => usage.usage_total);
        get!("user_usec" => usage.usage_user);
        get!("system_usec" => usage.usage_kernel);

        // throttling counters only show up once the cpu controller is enabled
        if stats_table.contains_key("nr_periods") {
            get!("nr_periods" => throttling.periods);
            get!("nr_throttled" => throttling.throttled_periods);
            get!("throttled_usec" => throttling.throttled_time);
        }

        Ok(stats)
    }
}

impl Cpu {
    fn apply(path: &Path, resources: &Resources) -> Result<(), V2CpuControllerError> {
        if resources.cpu_weight != 0 {
            if resources.cpu_weight > MAX_CPU_WEIGHT {
                return Err(V2CpuControllerError::WeightOutOfRange(resources.cpu_weight));
            }
            common::write_cgroup_file(path.join(CGROUP_CPU_WEIGHT), resources.cpu_weight)?;
        }

        // format is 'quota period', the kernel default is 'max 100000'
        if let Some(cpu_max) = Self::cpu_max_value(resources.cpu_quota, resources.cpu_period) {
            common::write_cgroup_file_str(path.join(CGROUP_CPU_MAX), &cpu_max)?;
        }

        Ok(())
    }

    fn cpu_max_value(quota: i64, period: u64) -> Option<String> {
        if quota == 0 && period == 0 {
            return None;
        }

        let mut value = if quota > 0 {
            quota.to_string()
        } else {
            UNRESTRICTED_QUOTA.to_owned()
        };
        if period != 0 {
            value = format!("{value} {period}");
        }

        Some(value)
    }
}
