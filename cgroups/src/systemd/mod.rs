use std::fs;

pub mod cpu;
pub mod dbus;
pub mod delegation;
pub mod launcher;
pub mod manager;
pub mod path;
pub mod properties;

/// Checks if the system was booted with systemd
pub fn booted() -> bool {
    fs::symlink_metadata("/run/systemd/system")
        .map(|p| p.is_dir())
        .unwrap_or_default()
}
