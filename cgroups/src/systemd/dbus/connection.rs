use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use dbus::arg::{RefArg, Variant};
use dbus::blocking::{Proxy, SyncConnection};
use dbus::message::MatchRule;

use super::client::{SystemdClient, SystemdClientError};
use crate::systemd::properties::{self, Property};

const DESTINATION: &str = "org.freedesktop.systemd1";
const OBJECT_PATH: &str = "/org/freedesktop/systemd1";
const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";
const UNIT_EXISTS_ERROR: &str = "org.freedesktop.systemd1.UnitExists";

const METHOD_TIMEOUT: Duration = Duration::from_millis(5000);
const PUMP_INTERVAL: Duration = Duration::from_millis(100);
/// Results of jobs nobody waits for yet. JobRemoved is broadcast for every job on the
/// system, so only the most recent ones are kept.
const FINISHED_JOBS_CAPACITY: usize = 64;

type UnitProperties<'a> = Vec<(&'a str, Variant<Box<dyn RefArg>>)>;

/// Connection to systemd over the system or session bus.
///
/// Opening the client subscribes to job signals and starts a thread dispatching them;
/// [`DbusClient::close`] (or dropping the client) stops it again.
pub struct DbusClient {
    conn: Arc<SyncConnection>,
    jobs: Arc<JobTracker>,
    closed: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl DbusClient {
    /// Uses the system bus to communicate with systemd
    pub fn open_system() -> Result<Self, SystemdClientError> {
        Self::open(SyncConnection::new_system()?)
    }

    /// Uses the session bus to communicate with systemd
    pub fn open_session() -> Result<Self, SystemdClientError> {
        Self::open(SyncConnection::new_session()?)
    }

    fn open(conn: SyncConnection) -> Result<Self, SystemdClientError> {
        let conn = Arc::new(conn);
        let jobs = Arc::new(JobTracker::default());

        // systemd only emits signals to subscribed clients
        Self::proxy(&conn).method_call::<(), _, _, _>(MANAGER_INTERFACE, "Subscribe", ())?;

        let tracker = Arc::clone(&jobs);
        conn.add_match(
            MatchRule::new_signal(MANAGER_INTERFACE, "JobRemoved"),
            move |(_id, job, unit, result): (u32, dbus::Path<'static>, String, String), _, _| {
                tracing::debug!("job {} for unit {} finished: {}", job, unit, result);
                tracker.complete(job.to_string(), result);
                true
            },
        )?;

        let closed = Arc::new(AtomicBool::new(false));
        let pump = {
            let conn = Arc::clone(&conn);
            let closed = Arc::clone(&closed);
            thread::Builder::new()
                .name("systemd-dbus".to_owned())
                .spawn(move || {
                    while !closed.load(Ordering::Acquire) {
                        if let Err(err) = conn.process(PUMP_INTERVAL) {
                            tracing::warn!("dbus connection failed: {}", err);
                            closed.store(true, Ordering::Release);
                        }
                    }
                })
                .map_err(SystemdClientError::Pump)?
        };

        Ok(Self {
            conn,
            jobs,
            closed,
            pump: Mutex::new(Some(pump)),
        })
    }

    /// Stops dispatching signals. Requests made afterwards fail with
    /// [`SystemdClientError::NotConnected`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let pump = self.pump.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(pump) = pump {
            if pump.join().is_err() {
                tracing::warn!("dbus message pump panicked");
            }
        }
    }

    fn proxy(conn: &SyncConnection) -> Proxy<'_, &SyncConnection> {
        conn.with_proxy(DESTINATION, OBJECT_PATH, METHOD_TIMEOUT)
    }

    fn ensure_open(&self) -> Result<(), SystemdClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SystemdClientError::NotConnected);
        }
        Ok(())
    }
}

impl Drop for DbusClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl SystemdClient for DbusClient {
    fn start_transient_unit(
        &self,
        unit_name: &str,
        mode: &str,
        properties: &[Property],
        completion: Sender<String>,
    ) -> Result<(), SystemdClientError> {
        self.ensure_open()?;

        // To view and introspect the methods under the 'org.freedesktop.systemd1' destination
        // use `gdbus introspect --system --dest org.freedesktop.systemd1 --object-path /org/freedesktop/systemd1`
        let props: UnitProperties = properties
            .iter()
            .map(|p| (p.name.as_str(), Variant(to_ref_arg(&p.value))))
            .collect();
        let aux: Vec<(&str, UnitProperties)> = Vec::new();

        let (job,): (dbus::Path<'static>,) = Self::proxy(&self.conn)
            .method_call(
                MANAGER_INTERFACE,
                "StartTransientUnit",
                (unit_name, mode, props, aux),
            )
            .map_err(|err| match err.name() {
                Some(UNIT_EXISTS_ERROR) => SystemdClientError::UnitExists {
                    unit_name: unit_name.to_owned(),
                },
                _ => SystemdClientError::FailedTransient {
                    unit_name: unit_name.to_owned(),
                    reason: err.to_string(),
                },
            })?;

        tracing::debug!("queued job {} to start {}", job, unit_name);
        self.jobs.wait(job.to_string(), completion);
        Ok(())
    }

    fn stop_unit(&self, unit_name: &str, mode: &str) -> Result<(), SystemdClientError> {
        self.ensure_open()?;

        let (job,): (dbus::Path<'static>,) = Self::proxy(&self.conn)
            .method_call(MANAGER_INTERFACE, "StopUnit", (unit_name, mode))
            .map_err(|err| SystemdClientError::FailedStop {
                unit_name: unit_name.to_owned(),
                reason: err.to_string(),
            })?;

        tracing::debug!("queued job {} to stop {}", job, unit_name);
        Ok(())
    }
}

fn to_ref_arg(value: &properties::Variant) -> Box<dyn RefArg> {
    match value {
        properties::Variant::String(s) => Box::new(s.clone()),
        properties::Variant::Bool(b) => Box::new(*b),
        properties::Variant::U64(v) => Box::new(*v),
        properties::Variant::ArrayU32(v) => Box::new(v.clone()),
        properties::Variant::ArrayString(v) => Box::new(v.clone()),
    }
}

/// Routes job results to whoever waits for them. A result may arrive before the
/// waiter registers, such results are held back until then.
#[derive(Default)]
struct JobTracker {
    state: Mutex<JobState>,
}

#[derive(Default)]
struct JobState {
    waiting: HashMap<String, Sender<String>>,
    finished: VecDeque<(String, String)>,
}

impl JobTracker {
    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn wait(&self, job: String, completion: Sender<String>) {
        let mut state = self.lock();
        if let Some(pos) = state.finished.iter().position(|(j, _)| *j == job) {
            if let Some((_, result)) = state.finished.remove(pos) {
                let _ = completion.try_send(result);
            }
            return;
        }
        state.waiting.insert(job, completion);
    }

    fn complete(&self, job: String, result: String) {
        let mut state = self.lock();
        match state.waiting.remove(&job) {
            Some(completion) => {
                // the receiver may have timed out already
                let _ = completion.try_send(result);
            }
            None => {
                if state.finished.len() == FINISHED_JOBS_CAPACITY {
                    state.finished.pop_front();
                }
                state.finished.push_back((job, result));
            }
        }
    }
}
