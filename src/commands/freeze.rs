//! Suspends and resumes all processes of a cgroup through the cgroup v2 freezer.
//! For more information see https://docs.kernel.org/admin-guide/cgroup-v2.html
use anyhow::{Context, Result};
use libcgscope::common::{CgroupManager, FreezerState};

use super::{load_cgroup_manager, CgroupOpts};

pub fn freeze(opts: &CgroupOpts) -> Result<()> {
    set_state(opts, FreezerState::Frozen)
}

pub fn thaw(opts: &CgroupOpts) -> Result<()> {
    set_state(opts, FreezerState::Thawed)
}

fn set_state(opts: &CgroupOpts, state: FreezerState) -> Result<()> {
    tracing::debug!("set freezer state of {} to {:?}", opts.name, state);
    let manager = load_cgroup_manager(opts)?;
    manager
        .freeze(state)
        .with_context(|| format!("failed to set {} to {:?}", opts.name, state))
}
