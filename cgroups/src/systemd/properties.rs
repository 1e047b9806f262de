use std::fmt::Display;
use std::str::FromStr;

use nix::unistd::Pid;

use super::cpu;
use crate::config::Cgroup;

pub const DESCRIPTION: &str = "Description";
pub const WANTS: &str = "Wants";
pub const SLICE: &str = "Slice";
pub const PIDS: &str = "PIDs";
pub const DELEGATE: &str = "Delegate";
pub const MEMORY_ACCOUNTING: &str = "MemoryAccounting";
pub const CPU_ACCOUNTING: &str = "CPUAccounting";
pub const IO_ACCOUNTING: &str = "IOAccounting";
pub const DEFAULT_DEPENDENCIES: &str = "DefaultDependencies";
pub const MEMORY_MAX: &str = "MemoryMax";
pub const CPU_WEIGHT: &str = "CPUWeight";
pub const CPU_QUOTA: &str = "CPUQuotaPerSecUSec";
pub const TASKS_ACCOUNTING: &str = "TasksAccounting";
pub const TASKS_MAX: &str = "TasksMax";

/// Value of a unit property, limited to the D-Bus types the manager sends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Variant {
    String(String),
    Bool(bool),
    U64(u64),
    ArrayU32(Vec<u32>),
    ArrayString(Vec<String>),
}

impl Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::ArrayU32(v) => write!(f, "{v:?}"),
            Self::ArrayString(v) => write!(f, "{v:?}"),
        }
    }
}

/// A named property of a systemd transient unit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: Variant,
}

impl Property {
    pub fn new<S: Into<String>>(name: S, value: Variant) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ParsePropertyError {
    #[error("property {0:?} is not of the form KEY=VALUE")]
    MissingSeparator(String),
    #[error("property {0:?} has an empty name")]
    EmptyName(String),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ComposePropertiesError {
    #[error("invalid memory value {0}")]
    InvalidMemory(i64),
    #[error("invalid pid {0}")]
    InvalidPid(i32),
}

/// Parses `KEY=VALUE`. Values of `true`/`false` become booleans and unsigned integers
/// become u64, anything else is passed as a string.
impl FromStr for Property {
    type Err = ParsePropertyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| ParsePropertyError::MissingSeparator(s.to_owned()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ParsePropertyError::EmptyName(s.to_owned()));
        }

        let value = match value {
            "true" => Variant::Bool(true),
            "false" => Variant::Bool(false),
            v => v
                .parse::<u64>()
                .map(Variant::U64)
                .unwrap_or_else(|_| Variant::String(v.to_owned())),
        };

        Ok(Property::new(name, value))
    }
}

pub(crate) fn is_slice(unit_name: &str) -> bool {
    unit_name.ends_with(".slice")
}

/// Translates the resource spec of `cgroup` into the property list of its transient
/// unit. A pid of -1 creates the unit without attaching a process.
pub fn compose_properties(
    cgroup: &Cgroup,
    unit_name: &str,
    pid: Pid,
) -> Result<Vec<Property>, ComposePropertiesError> {
    let parent = match cgroup.parent.as_str() {
        "" => super::path::DEFAULT_SLICE,
        parent => parent,
    };
    let resources = &cgroup.resources;

    let mut properties = Vec::with_capacity(12 + cgroup.systemd_props.len());
    properties.push(Property::new(
        DESCRIPTION,
        Variant::String(format!("cgscope container {}", cgroup.name)),
    ));

    // a slice is ordered after its parent, a scope is placed into it
    if is_slice(unit_name) {
        properties.push(Property::new(
            WANTS,
            Variant::ArrayString(vec![parent.to_owned()]),
        ));
    } else {
        properties.push(Property::new(SLICE, Variant::String(parent.to_owned())));
    }

    if pid.as_raw() != -1 {
        let pid = u32::try_from(pid.as_raw())
            .map_err(|_| ComposePropertiesError::InvalidPid(pid.as_raw()))?;
        properties.push(Property::new(PIDS, Variant::ArrayU32(vec![pid])));
    }

    if !is_slice(unit_name) {
        properties.push(Property::new(DELEGATE, Variant::Bool(true)));
    }

    // the kernel cannot move a task into the memory controller later on
    properties.push(Property::new(MEMORY_ACCOUNTING, Variant::Bool(true)));
    properties.push(Property::new(CPU_ACCOUNTING, Variant::Bool(true)));
    properties.push(Property::new(IO_ACCOUNTING, Variant::Bool(true)));
    properties.push(Property::new(DEFAULT_DEPENDENCIES, Variant::Bool(false)));

    if resources.memory != 0 {
        let limit = match resources.memory {
            -1 => u64::MAX,
            limit => {
                u64::try_from(limit).map_err(|_| ComposePropertiesError::InvalidMemory(limit))?
            }
        };
        properties.push(Property::new(MEMORY_MAX, Variant::U64(limit)));
    }

    if resources.cpu_weight != 0 {
        properties.push(Property::new(CPU_WEIGHT, Variant::U64(resources.cpu_weight)));
    }

    // always sent when configured so that a later apply with quota <= 0 lifts the limit
    if resources.cpu_quota != 0 && resources.cpu_period != 0 {
        properties.push(Property::new(
            CPU_QUOTA,
            Variant::U64(cpu::quota_per_sec_usec(
                resources.cpu_quota,
                resources.cpu_period,
            )),
        ));
    }

    if resources.pids_limit > 0 {
        properties.push(Property::new(TASKS_ACCOUNTING, Variant::Bool(true)));
        properties.push(Property::new(
            TASKS_MAX,
            Variant::U64(resources.pids_limit as u64),
        ));
    }

    properties.extend(cgroup.systemd_props.iter().cloned());
    Ok(properties)
}
