//! Control groups provide a way of controlling groups of processes.
//! This crate binds the resource limits of a container to a systemd transient unit
//! and to the unified (v2) cgroup hierarchy that enforces them.
#[cfg(test)]
#[macro_use]
extern crate quickcheck;

mod test;

pub mod common;
pub mod config;
pub mod controller_type;
pub mod stats;
pub mod systemd;
pub mod v2;
