use anyhow::{Context, Result};
use libcgscope::common::CgroupManager;

use super::{load_cgroup_manager, CgroupOpts};

pub fn stats(opts: &CgroupOpts) -> Result<()> {
    let manager = load_cgroup_manager(opts)?;
    let stats = manager
        .stats()
        .with_context(|| format!("failed to read statistics of {}", opts.name))?;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
