use crate::controller_type::CgroupPaths;
use crate::systemd::properties::Property;

/// Resource limits requested for a container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resources {
    /// Memory ceiling in bytes. 0 leaves it unset, -1 removes the limit.
    pub memory: i64,
    /// Relative CPU weight (1-10000). 0 leaves it unset.
    pub cpu_weight: u64,
    /// CPU time in microseconds allowed per `cpu_period`. Values <= 0 mean unlimited.
    pub cpu_quota: i64,
    /// Length of a CPU accounting period in microseconds. 0 leaves the quota unset.
    pub cpu_period: u64,
    /// Maximum number of tasks. Only values > 0 are applied.
    pub pids_limit: i64,
}

/// Describes the control group of a single container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cgroup {
    /// Container name, or the name of a slice when a grouping unit is requested
    pub name: String,
    /// Parent slice, e.g. `machine.slice`. Empty means `system.slice`
    pub parent: String,
    /// Prefix of the scope unit name, e.g. `docker` gives `docker-<name>.scope`
    pub scope_prefix: String,
    pub resources: Resources,
    /// Pre-provisioned cgroup paths. When present no unit and no cgroup is created.
    pub paths: Option<CgroupPaths>,
    /// Additional unit properties passed to systemd as they are
    pub systemd_props: Vec<Property>,
}

impl Cgroup {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_parent<S: Into<String>>(mut self, parent: S) -> Self {
        self.parent = parent.into();
        self
    }

    pub fn with_scope_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.scope_prefix = prefix.into();
        self
    }

    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_paths(mut self, paths: CgroupPaths) -> Self {
        self.paths = Some(paths);
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.systemd_props.push(property);
        self
    }
}
