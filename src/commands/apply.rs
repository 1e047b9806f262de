use anyhow::{Context, Result};
use clap::Args;
use libcgscope::common::CgroupManager;
use nix::unistd::Pid;

use super::{create_cgroup_manager, CgroupOpts};

/// Arguments of the apply command
#[derive(Args, Debug)]
pub struct Apply {
    /// process to move into the cgroup, -1 only creates the cgroup
    #[clap(long, default_value_t = -1, allow_hyphen_values = true)]
    pub pid: i32,
}

pub fn apply(args: Apply, opts: &CgroupOpts) -> Result<()> {
    let manager = create_cgroup_manager(opts)?;
    tracing::debug!("applying cgroup for {:?}", manager.get_cgroups().name);

    manager
        .apply(Pid::from_raw(args.pid))
        .with_context(|| format!("failed to apply cgroup for {}", opts.name))?;

    let path = manager
        .get_unified_path()
        .context("failed to resolve the cgroup path")?;
    println!("{}", path.display());
    Ok(())
}
