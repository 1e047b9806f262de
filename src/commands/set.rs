use anyhow::{Context, Result};
use libcgscope::common::CgroupManager;

use super::{load_cgroup_manager, CgroupOpts};

pub fn set(opts: &CgroupOpts) -> Result<()> {
    let manager = load_cgroup_manager(opts)?;
    let resources = &manager.get_cgroups().resources;
    tracing::debug!("update resources of {}: {:?}", opts.name, resources);

    manager
        .set(resources)
        .with_context(|| format!("failed to update resources of {}", opts.name))
}
