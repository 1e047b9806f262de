use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use nix::unistd::Pid;

use super::dbus::{SystemdClient, SystemdClientError};
use super::delegation::{self, DelegationError};
use super::launcher::{self, DEFAULT_UNIT_START_TIMEOUT};
use super::path::{self, ComputePathError, ReconcileError};
use super::properties::{self, ComposePropertiesError};
use crate::common::{
    self, CgroupManager, FreezerState, RemovePathsError, WrappedIoError, DEFAULT_CGROUP_ROOT,
};
use crate::config::{Cgroup, Resources};
use crate::controller_type::CgroupPaths;
use crate::stats::Stats;
use crate::v2::manager::{Manager as FsManager, V2ManagerError};

#[derive(thiserror::Error, Debug)]
pub enum SystemdManagerError {
    #[error("systemd request failed: {0}")]
    Client(#[from] SystemdClientError),
    #[error("failed to compose unit properties: {0}")]
    Properties(#[from] ComposePropertiesError),
    #[error("failed to compute cgroup path: {0}")]
    ComputePath(#[from] ComputePathError),
    #[error("failed to prepare cgroup tree: {0}")]
    Delegation(#[from] DelegationError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error(transparent)]
    RemovePaths(#[from] RemovePathsError),
    #[error(transparent)]
    V2(#[from] V2ManagerError),
}

/// Opens the connection to systemd. Called at most once per manager, and only by the
/// operations that talk to systemd.
pub type ConnectFn =
    Box<dyn Fn() -> Result<Arc<dyn SystemdClient>, SystemdClientError> + Send + Sync>;

/// Manages the cgroup of a container through a systemd transient unit on the unified
/// hierarchy.
///
/// systemd creates the unit and owns its cgroup; the limits themselves are written
/// through the cgroup filesystem once the path of that cgroup has been resolved.
pub struct UnifiedManager {
    cgroup: Cgroup,
    /// Client for communicating with systemd, connected on first use
    client: Mutex<Option<Arc<dyn SystemdClient>>>,
    connect: ConnectFn,
    /// Mount point of the unified hierarchy e.g. /sys/fs/cgroup
    root_path: PathBuf,
    unit_start_timeout: Duration,
    paths: Mutex<CgroupPaths>,
}

// custom debug impl as the client does not implement Debug
impl Debug for UnifiedManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedManager")
            .field("cgroup", &self.cgroup)
            .field("root_path", &self.root_path)
            .field("unit_start_timeout", &self.unit_start_timeout)
            .field("connected", &self.lock_client().is_some())
            .field("paths", &*self.lock_paths())
            .finish()
    }
}

impl UnifiedManager {
    pub fn new(cgroup: Cgroup, client: Arc<dyn SystemdClient>) -> Self {
        Self::connect_on_demand(cgroup, move || Ok(Arc::clone(&client)))
    }

    /// Creates a manager that opens its systemd connection only when a unit has to be
    /// started or stopped. Inspecting or limiting an existing cgroup never connects.
    pub fn connect_on_demand<F>(cgroup: Cgroup, connect: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn SystemdClient>, SystemdClientError> + Send + Sync + 'static,
    {
        Self {
            cgroup,
            client: Mutex::new(None),
            connect: Box::new(connect),
            root_path: PathBuf::from(DEFAULT_CGROUP_ROOT),
            unit_start_timeout: DEFAULT_UNIT_START_TIMEOUT,
            paths: Mutex::new(CgroupPaths::default()),
        }
    }

    pub fn with_root_path<P: Into<PathBuf>>(mut self, root_path: P) -> Self {
        self.root_path = root_path.into();
        self
    }

    pub fn with_unit_start_timeout(mut self, timeout: Duration) -> Self {
        self.unit_start_timeout = timeout;
        self
    }

    /// Restores a path set resolved by an earlier [`CgroupManager::apply`], e.g. from
    /// saved container state.
    pub fn with_paths(self, paths: CgroupPaths) -> Self {
        *self.lock_paths() = paths;
        self
    }

    pub fn get_cgroups(&self) -> &Cgroup {
        &self.cgroup
    }

    /// Returns the single path every controller of the container resolves to.
    pub fn get_unified_path(&self) -> Result<PathBuf, ReconcileError> {
        path::reconcile(&self.lock_paths())
    }

    fn client(&self) -> Result<Arc<dyn SystemdClient>, SystemdClientError> {
        let mut client = self.lock_client();
        if let Some(client) = client.as_ref() {
            return Ok(Arc::clone(client));
        }

        let connected = (self.connect)()?;
        *client = Some(Arc::clone(&connected));
        Ok(connected)
    }

    fn lock_client(&self) -> MutexGuard<'_, Option<Arc<dyn SystemdClient>>> {
        self.client.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_paths(&self) -> MutexGuard<'_, CgroupPaths> {
        // the table is replaced as a whole, a poisoned lock still holds a valid one
        self.paths.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn fs_manager(&self) -> Result<FsManager, ReconcileError> {
        Ok(FsManager::new(self.get_unified_path()?))
    }

    fn apply_preexisting(&self, paths: &CgroupPaths, pid: Pid) -> Result<(), WrappedIoError> {
        tracing::debug!("using pre-existing cgroup paths {:?}", paths);
        let mut current = self.lock_paths();
        *current = paths.clone();
        common::enter_pid(&current, pid)
    }
}

impl CgroupManager for UnifiedManager {
    type Error = SystemdManagerError;

    fn apply(&self, pid: Pid) -> Result<(), Self::Error> {
        if let Some(paths) = &self.cgroup.paths {
            self.apply_preexisting(paths, pid)?;
            return Ok(());
        }

        let unit_name = path::get_unit_name(&self.cgroup);
        let properties = properties::compose_properties(&self.cgroup, &unit_name, pid)?;
        tracing::debug!("starting {} with properties {:?}", unit_name, properties);
        let client = self.client()?;
        launcher::ensure_unit(
            client.as_ref(),
            &unit_name,
            &properties,
            self.unit_start_timeout,
        )?;

        let path = path::compute_path(&self.root_path, &self.cgroup)?;
        delegation::prepare_tree(&self.root_path, &path)?;

        tracing::debug!("unit {} resolved to {:?}", unit_name, path);
        *self.lock_paths() = CgroupPaths::unified(path);
        Ok(())
    }

    fn destroy(&self) -> Result<(), Self::Error> {
        if self.cgroup.paths.is_some() {
            return Ok(());
        }

        let client = self.client()?;
        // held for the whole teardown so readers never see a half removed set
        let mut paths = self.lock_paths();
        launcher::stop_unit(client.as_ref(), &path::get_unit_name(&self.cgroup));

        if paths.is_empty() {
            return Ok(());
        }

        common::remove_paths(&paths)?;
        paths.clear();
        Ok(())
    }

    fn freeze(&self, state: FreezerState) -> Result<(), Self::Error> {
        self.fs_manager()?.freeze(state)?;
        Ok(())
    }

    fn stats(&self) -> Result<Stats, Self::Error> {
        Ok(self.fs_manager()?.stats()?)
    }

    fn set(&self, resources: &Resources) -> Result<(), Self::Error> {
        self.fs_manager()?.set(resources)?;
        Ok(())
    }

    fn get_pids(&self) -> Result<Vec<Pid>, Self::Error> {
        let path = self.get_unified_path()?;
        Ok(common::get_pids(&path)?)
    }

    fn get_all_pids(&self) -> Result<Vec<Pid>, Self::Error> {
        let path = self.get_unified_path()?;
        Ok(common::get_all_pids(&path)?)
    }

    fn get_paths(&self) -> CgroupPaths {
        self.lock_paths().clone()
    }
}
