//! # cgscope
//! Places a container into a systemd transient unit on the unified cgroup hierarchy and
//! manages the resource limits of its cgroup.
mod commands;
mod observability;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::commands::CgroupOpts;
use crate::observability::LogFormat;

#[derive(Parser, Debug)]
#[clap(version, about)]
pub(crate) struct Opts {
    #[clap(flatten)]
    global: GlobalOpts,

    #[clap(flatten)]
    cgroup: CgroupOpts,

    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Args, Debug)]
pub(crate) struct GlobalOpts {
    /// set the log file to write logs to (default is '/dev/stderr')
    #[clap(short, long, global = true, overrides_with("log"))]
    log: Option<PathBuf>,
    /// set the log format
    #[clap(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    /// set the log level (error, warn, info, debug, trace)
    #[clap(long, global = true, env = "CGSCOPE_LOG_LEVEL")]
    log_level: Option<String>,
    /// additionally send logs to journald
    #[clap(long, global = true)]
    systemd_log: bool,
}

#[derive(Subcommand, Debug)]
enum SubCommand {
    /// Create the unit and its cgroup, optionally moving a process into it
    Apply(commands::apply::Apply),
    /// Stop the unit and remove its cgroup
    Destroy,
    /// Suspend every process in the cgroup
    Freeze,
    /// Resume the processes of a frozen cgroup
    Thaw,
    /// Write the configured resource limits to the cgroup
    Set,
    /// Print cgroup statistics as JSON
    Stats,
    /// List the processes of the cgroup
    Pids(commands::pids::Pids),
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    if let Err(e) = observability::init(&opts) {
        eprintln!("log init failed: {:?}", e);
    }

    tracing::debug!(
        "started by user {} with {:?}",
        nix::unistd::geteuid(),
        std::env::args_os()
    );

    let cgroup = &opts.cgroup;
    match opts.subcmd {
        SubCommand::Apply(args) => commands::apply::apply(args, cgroup),
        SubCommand::Destroy => commands::destroy::destroy(cgroup),
        SubCommand::Freeze => commands::freeze::freeze(cgroup),
        SubCommand::Thaw => commands::freeze::thaw(cgroup),
        SubCommand::Set => commands::set::set(cgroup),
        SubCommand::Stats => commands::stats::stats(cgroup),
        SubCommand::Pids(args) => commands::pids::pids(args, cgroup),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_parse_apply() {
        let opts = Opts::try_parse_from([
            "cgscope",
            "--name",
            "foo",
            "--parent",
            "machine.slice",
            "--memory",
            "-1",
            "--cpu-quota",
            "-1",
            "--cpu-period",
            "100000",
            "--property",
            "TasksMax=64",
            "apply",
            "--pid",
            "1234",
        ])
        .expect("parse apply");

        assert_eq!(opts.cgroup.name, "foo");
        assert_eq!(opts.cgroup.parent, "machine.slice");
        assert_eq!(opts.cgroup.memory, -1);
        assert_eq!(opts.cgroup.cpu_quota, -1);
        assert_eq!(opts.cgroup.property.len(), 1);
        match opts.subcmd {
            SubCommand::Apply(apply) => assert_eq!(apply.pid, 1234),
            other => panic!("unexpected subcommand {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_parse_defaults() {
        let opts = Opts::try_parse_from(["cgscope", "--name", "foo", "stats"]).expect("parse");

        assert_eq!(opts.cgroup.scope_prefix, "cgscope");
        assert_eq!(opts.cgroup.cgroup_root, None);
        assert_eq!(opts.cgroup.cgroup_path, None);
        assert!(!opts.cgroup.session);
        assert_eq!(opts.global.log_format, LogFormat::Text);
        assert!(matches!(opts.subcmd, SubCommand::Stats));
    }

    #[test]
    #[serial]
    fn test_log_level_from_env() {
        std::env::set_var("CGSCOPE_LOG_LEVEL", "warn");
        let opts = Opts::try_parse_from(["cgscope", "--name", "foo", "destroy"]);
        std::env::remove_var("CGSCOPE_LOG_LEVEL");

        let opts = opts.expect("parse");
        assert_eq!(opts.global.log_level.as_deref(), Some("warn"));
    }

    #[test]
    #[serial]
    fn test_parse_log_format() {
        let opts = Opts::try_parse_from([
            "cgscope",
            "--log-format",
            "json",
            "--name",
            "foo",
            "pids",
        ])
        .expect("parse");
        assert_eq!(opts.global.log_format, LogFormat::Json);

        let result = Opts::try_parse_from(["cgscope", "--log-format", "yaml", "stats"]);
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_invalid_property_is_rejected() {
        let result = Opts::try_parse_from([
            "cgscope",
            "--name",
            "foo",
            "--property",
            "Delegate",
            "apply",
        ]);
        assert!(result.is_err());
    }
}
