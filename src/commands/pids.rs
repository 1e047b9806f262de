use anyhow::Result;
use clap::Args;
use libcgscope::common::CgroupManager;

use super::{load_cgroup_manager, CgroupOpts};

/// Arguments of the pids command
#[derive(Args, Debug)]
pub struct Pids {
    /// include processes of child cgroups
    #[clap(long)]
    pub all: bool,
    /// print a JSON array instead of one pid per line
    #[clap(long)]
    pub json: bool,
}

pub fn pids(args: Pids, opts: &CgroupOpts) -> Result<()> {
    let manager = load_cgroup_manager(opts)?;

    let pids = if args.all {
        manager.get_all_pids()?
    } else {
        manager.get_pids()?
    };
    let pids: Vec<i32> = pids.iter().map(|pid| pid.as_raw()).collect();

    if args.json {
        println!("{}", serde_json::to_string(&pids)?);
    } else {
        for pid in pids {
            println!("{pid}");
        }
    }
    Ok(())
}
