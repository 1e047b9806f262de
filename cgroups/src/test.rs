#![cfg(test)]

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
    thread,
    time::Duration,
};

use crate::systemd::dbus::{SystemdClient, SystemdClientError};
use crate::systemd::properties::Property;

pub fn set_fixture(temp_dir: &Path, filename: &str, val: &str) -> Result<PathBuf> {
    let full_path = temp_dir.join(filename);

    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&full_path)
        .with_context(|| format!("failed to open {full_path:?}"))?
        .write_all(val.as_bytes())
        .with_context(|| format!("failed to write to {full_path:?}"))?;

    Ok(full_path)
}

/// Lays out a fake cgroup directory: creates `dir` and an empty fixture for every file
/// the kernel would provide in it.
pub fn create_cgroup_dir(dir: &Path, files: &[&str]) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {dir:?}"))?;
    for file in files {
        set_fixture(dir, file, "")?;
    }

    Ok(dir.to_path_buf())
}

/// How [`FakeSystemdClient`] answers a start request
#[derive(Clone, Copy, Debug)]
pub enum StartBehavior {
    /// accept the job and report it as done right away
    Complete,
    /// accept the job but never report its completion
    Silent,
    /// reject with UnitExists
    Exists,
    /// reject with a transport failure
    Fail,
}

/// Stand-in for systemd recording every request it receives.
pub struct FakeSystemdClient {
    behavior: StartBehavior,
    fail_stop: bool,
    stop_delay: Duration,
    calls: Mutex<Vec<String>>,
    properties: Mutex<Vec<Property>>,
    pending: Mutex<Vec<Sender<String>>>,
}

impl FakeSystemdClient {
    pub fn new(behavior: StartBehavior) -> Self {
        Self {
            behavior,
            fail_stop: false,
            stop_delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            properties: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn with_failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn started_properties(&self) -> Vec<Property> {
        self.properties.lock().unwrap().clone()
    }
}

impl SystemdClient for FakeSystemdClient {
    fn start_transient_unit(
        &self,
        unit_name: &str,
        mode: &str,
        properties: &[Property],
        completion: Sender<String>,
    ) -> std::result::Result<(), SystemdClientError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("start {unit_name} {mode}"));
        *self.properties.lock().unwrap() = properties.to_vec();

        match self.behavior {
            StartBehavior::Complete => {
                completion.send("done".to_owned()).unwrap();
                Ok(())
            }
            StartBehavior::Silent => {
                self.pending.lock().unwrap().push(completion);
                Ok(())
            }
            StartBehavior::Exists => Err(SystemdClientError::UnitExists {
                unit_name: unit_name.to_owned(),
            }),
            StartBehavior::Fail => Err(SystemdClientError::FailedTransient {
                unit_name: unit_name.to_owned(),
                reason: "access denied".to_owned(),
            }),
        }
    }

    fn stop_unit(
        &self,
        unit_name: &str,
        mode: &str,
    ) -> std::result::Result<(), SystemdClientError> {
        thread::sleep(self.stop_delay);
        self.calls
            .lock()
            .unwrap()
            .push(format!("stop {unit_name} {mode}"));

        if self.fail_stop {
            return Err(SystemdClientError::FailedStop {
                unit_name: unit_name.to_owned(),
                reason: "unit not loaded".to_owned(),
            });
        }
        Ok(())
    }
}
