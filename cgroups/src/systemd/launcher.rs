use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use super::dbus::{SystemdClient, SystemdClientError};
use super::properties::Property;

/// How long to wait for systemd to report the start job as finished
pub const DEFAULT_UNIT_START_TIMEOUT: Duration = Duration::from_secs(1);
const MODE_REPLACE: &str = "replace";

/// Starts the transient unit `unit_name`. A unit that already exists is accepted as it
/// is, its properties are not updated.
///
/// The start job runs asynchronously in systemd. If it does not finish within `timeout`
/// the unit is assumed to come up anyway and the caller proceeds.
pub fn ensure_unit(
    client: &dyn SystemdClient,
    unit_name: &str,
    properties: &[Property],
    timeout: Duration,
) -> Result<(), SystemdClientError> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    match client.start_transient_unit(unit_name, MODE_REPLACE, properties, tx) {
        Ok(()) => {}
        Err(err) if err.is_unit_exists() => {
            tracing::debug!("unit {} already exists, keeping its properties", unit_name);
            return Ok(());
        }
        Err(err) => return Err(err),
    }

    match rx.recv_timeout(timeout) {
        Ok(result) if result == "done" => tracing::debug!("started unit {}", unit_name),
        Ok(result) => tracing::warn!("start job of unit {} finished with {}", unit_name, result),
        Err(RecvTimeoutError::Timeout) => tracing::warn!(
            "timed out after {:?} waiting for unit {} to start, continuing",
            timeout,
            unit_name
        ),
        Err(RecvTimeoutError::Disconnected) => tracing::warn!(
            "no completion signal for unit {}, continuing",
            unit_name
        ),
    }

    Ok(())
}

/// Asks systemd to stop `unit_name`. Failures are logged and otherwise ignored.
pub fn stop_unit(client: &dyn SystemdClient, unit_name: &str) {
    tracing::debug!("stop unit {}", unit_name);
    if let Err(err) = client.stop_unit(unit_name, MODE_REPLACE) {
        tracing::warn!("failed to stop unit {}: {}", unit_name, err);
    }
}
