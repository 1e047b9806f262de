use crossbeam_channel::Sender;

use crate::systemd::properties::Property;

#[derive(thiserror::Error, Debug)]
pub enum SystemdClientError {
    #[error("unit {unit_name} already exists")]
    UnitExists { unit_name: String },
    #[error("failed to start transient unit {unit_name}: {reason}")]
    FailedTransient { unit_name: String, reason: String },
    #[error("failed to stop unit {unit_name}: {reason}")]
    FailedStop { unit_name: String, reason: String },
    #[cfg(feature = "systemd")]
    #[error("dbus error: {0}")]
    DBus(#[from] dbus::Error),
    #[error("failed to start the dbus message pump: {0}")]
    Pump(std::io::Error),
    #[error("the dbus connection has been closed")]
    NotConnected,
}

impl SystemdClientError {
    pub fn is_unit_exists(&self) -> bool {
        matches!(self, Self::UnitExists { .. })
    }
}

/// Requests the manager sends to systemd. For more information see
/// https://www.freedesktop.org/wiki/Software/systemd/dbus/
pub trait SystemdClient: Send + Sync {
    /// Queues a start job for a new transient unit. Once the job has been removed from
    /// the queue its result (`done`, `failed`, ...) is sent on `completion`.
    fn start_transient_unit(
        &self,
        unit_name: &str,
        mode: &str,
        properties: &[Property],
        completion: Sender<String>,
    ) -> Result<(), SystemdClientError>;

    fn stop_unit(&self, unit_name: &str, mode: &str) -> Result<(), SystemdClientError>;
}
