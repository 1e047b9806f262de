use anyhow::{Context, Result};
use libcgscope::common::CgroupManager;

use super::{load_cgroup_manager, CgroupOpts};

pub fn destroy(opts: &CgroupOpts) -> Result<()> {
    tracing::debug!("start destroying cgroup of {}", opts.name);
    let manager = load_cgroup_manager(opts)?;
    manager
        .destroy()
        .with_context(|| format!("failed to destroy cgroup of {}", opts.name))
}
