use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Controllers that a resolved path set carries an entry for. On the unified hierarchy
/// every entry points at the same directory, the table only keeps the per-controller
/// shape callers expect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControllerType {
    Pids,
    Memory,
    Io,
    Cpu,
    Devices,
    CpuSet,
    Freezer,
}

impl ControllerType {
    fn index(self) -> usize {
        match self {
            Self::Pids => 0,
            Self::Memory => 1,
            Self::Io => 2,
            Self::Cpu => 3,
            Self::Devices => 4,
            Self::CpuSet => 5,
            Self::Freezer => 6,
        }
    }
}

impl Display for ControllerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let print = match self {
            Self::Pids => "pids",
            Self::Memory => "memory",
            Self::Io => "io",
            Self::Cpu => "cpu",
            Self::Devices => "devices",
            Self::CpuSet => "cpuset",
            Self::Freezer => "freezer",
        };

        write!(f, "{print}")
    }
}

pub const CONTROLLER_TYPES: &[ControllerType] = &[
    ControllerType::Pids,
    ControllerType::Memory,
    ControllerType::Io,
    ControllerType::Cpu,
    ControllerType::Devices,
    ControllerType::CpuSet,
    ControllerType::Freezer,
];

/// Fixed table mapping every [`ControllerType`] to an optional cgroup path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CgroupPaths {
    paths: [Option<PathBuf>; CONTROLLER_TYPES.len()],
}

impl CgroupPaths {
    /// Creates a table with `path` stored under every controller.
    pub fn unified<P: AsRef<Path>>(path: P) -> Self {
        let mut paths = Self::default();
        for controller in CONTROLLER_TYPES {
            paths.insert(*controller, path.as_ref());
        }
        paths
    }

    pub fn get(&self, controller: ControllerType) -> Option<&Path> {
        self.paths[controller.index()].as_deref()
    }

    pub fn insert<P: Into<PathBuf>>(&mut self, controller: ControllerType, path: P) {
        self.paths[controller.index()] = Some(path.into());
    }

    /// Iterates over the populated entries in [`CONTROLLER_TYPES`] order.
    pub fn iter(&self) -> impl Iterator<Item = (ControllerType, &Path)> + '_ {
        CONTROLLER_TYPES
            .iter()
            .filter_map(move |c| self.get(*c).map(|p| (*c, p)))
    }

    pub fn is_empty(&self) -> bool {
        self.paths.iter().all(Option::is_none)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unified_fills_every_controller() {
        let paths = CgroupPaths::unified("/sys/fs/cgroup/system.slice/foo.scope");

        for controller in CONTROLLER_TYPES {
            assert_eq!(
                paths.get(*controller),
                Some(Path::new("/sys/fs/cgroup/system.slice/foo.scope"))
            );
        }
        assert_eq!(paths.iter().count(), CONTROLLER_TYPES.len());
    }

    #[test]
    fn test_iter_skips_missing_entries() {
        let mut paths = CgroupPaths::default();
        assert!(paths.is_empty());

        paths.insert(ControllerType::Memory, "/a");
        paths.insert(ControllerType::Pids, "/b");

        let entries: Vec<_> = paths.iter().collect();
        assert_eq!(
            entries,
            vec![
                (ControllerType::Pids, Path::new("/b")),
                (ControllerType::Memory, Path::new("/a")),
            ]
        );

        paths.clear();
        assert!(paths.is_empty());
    }

    #[test]
    fn test_controller_names() {
        let names: Vec<String> = CONTROLLER_TYPES.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            names,
            vec!["pids", "memory", "io", "cpu", "devices", "cpuset", "freezer"]
        );
    }
}
