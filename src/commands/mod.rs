use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use libcgscope::common::DEFAULT_CGROUP_ROOT;
use libcgscope::config::{Cgroup, Resources};
use libcgscope::controller_type::CgroupPaths;
use libcgscope::systemd::dbus::{DbusClient, SystemdClient, SystemdClientError};
use libcgscope::systemd::manager::UnifiedManager;
use libcgscope::systemd::properties::Property;
use libcgscope::systemd::{self, path};
use libcgscope::v2::util;

pub mod apply;
pub mod destroy;
pub mod freeze;
pub mod pids;
pub mod set;
pub mod stats;

/// Identity and resource limits of the container cgroup
#[derive(Args, Debug)]
pub struct CgroupOpts {
    /// name of the container, or of a slice when it ends in '.slice'
    #[clap(long, global = true, default_value = "")]
    pub name: String,
    /// parent slice of the unit (default: system.slice)
    #[clap(long, global = true, default_value = "")]
    pub parent: String,
    /// prefix of the scope unit name
    #[clap(long, global = true, default_value = "cgscope")]
    pub scope_prefix: String,
    /// memory limit in bytes, -1 for unlimited
    #[clap(long, global = true, default_value_t = 0, allow_hyphen_values = true)]
    pub memory: i64,
    /// relative cpu weight (1-10000)
    #[clap(long, global = true, default_value_t = 0)]
    pub cpu_weight: u64,
    /// cpu time in microseconds per period, -1 for unlimited
    #[clap(long, global = true, default_value_t = 0, allow_hyphen_values = true)]
    pub cpu_quota: i64,
    /// length of a cpu period in microseconds
    #[clap(long, global = true, default_value_t = 0)]
    pub cpu_period: u64,
    /// maximum number of tasks
    #[clap(long, global = true, default_value_t = 0)]
    pub pids_limit: i64,
    /// additional unit property as KEY=VALUE, may be repeated
    #[clap(long, global = true)]
    pub property: Vec<Property>,
    /// mount point of the unified cgroup hierarchy (default: detected from mountinfo)
    #[clap(long, global = true)]
    pub cgroup_root: Option<PathBuf>,
    /// talk to the systemd user instance on the session bus
    #[clap(long, global = true)]
    pub session: bool,
    /// use this existing cgroup instead of creating a unit
    #[clap(long, global = true)]
    pub cgroup_path: Option<PathBuf>,
}

impl CgroupOpts {
    fn cgroup_root(&self) -> PathBuf {
        if let Some(root) = &self.cgroup_root {
            return root.clone();
        }

        match util::get_unified_mount_point() {
            Ok(root) => root,
            Err(err) => {
                tracing::warn!("falling back to {}: {}", DEFAULT_CGROUP_ROOT, err);
                PathBuf::from(DEFAULT_CGROUP_ROOT)
            }
        }
    }

    fn to_cgroup(&self) -> Result<Cgroup> {
        if self.name.is_empty() {
            anyhow::bail!("a container name is required (--name)");
        }

        let mut cgroup = Cgroup::new(self.name.as_str())
            .with_parent(self.parent.as_str())
            .with_scope_prefix(self.scope_prefix.as_str())
            .with_resources(Resources {
                memory: self.memory,
                cpu_weight: self.cpu_weight,
                cpu_quota: self.cpu_quota,
                cpu_period: self.cpu_period,
                pids_limit: self.pids_limit,
            });
        for property in &self.property {
            cgroup = cgroup.with_property(property.clone());
        }
        if let Some(existing) = &self.cgroup_path {
            cgroup = cgroup.with_paths(CgroupPaths::unified(existing));
        }

        Ok(cgroup)
    }
}

fn connect(session: bool) -> Result<Arc<dyn SystemdClient>, SystemdClientError> {
    if !systemd::booted() {
        tracing::warn!("the system was not booted with systemd");
    }

    tracing::debug!("connecting to systemd (session bus: {})", session);
    let client = if session {
        DbusClient::open_session()?
    } else {
        DbusClient::open_system()?
    };
    Ok(Arc::new(client))
}

fn new_manager(opts: &CgroupOpts, cgroup: Cgroup) -> UnifiedManager {
    let session = opts.session;
    UnifiedManager::connect_on_demand(cgroup, move || connect(session))
}

/// Builds the manager for a fresh apply. The path set starts out empty.
fn create_cgroup_manager(opts: &CgroupOpts) -> Result<UnifiedManager> {
    let cgroup = opts.to_cgroup()?;
    Ok(new_manager(opts, cgroup).with_root_path(opts.cgroup_root()))
}

/// Builds the manager for a cgroup created by an earlier invocation. The path systemd
/// placed the unit at is derived from the unit name again.
fn load_cgroup_manager(opts: &CgroupOpts) -> Result<UnifiedManager> {
    let cgroup = opts.to_cgroup()?;
    let root = opts.cgroup_root();
    let resolved = match &cgroup.paths {
        Some(paths) => paths.clone(),
        None => CgroupPaths::unified(
            path::compute_path(&root, &cgroup)
                .with_context(|| format!("failed to compute the cgroup path of {}", cgroup.name))?,
        ),
    };

    Ok(new_manager(opts, cgroup)
        .with_root_path(root)
        .with_paths(resolved))
}
