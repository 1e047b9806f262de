use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::common::{self, FreezerState, WrappedIoError};

const CGROUP_FREEZE: &str = "cgroup.freeze";
const CGROUP_EVENTS: &str = "cgroup.events";

const FROZEN_POLL_INTERVAL: Duration = Duration::from_millis(10);
const FROZEN_POLL_ATTEMPTS: u32 = 1000;

#[derive(thiserror::Error, Debug)]
pub enum V2FreezerError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("freezer not supported: {0}")]
    NotSupported(WrappedIoError),
    #[error("expected \"cgroup.freeze\" to be in state {expected:?} but was in {actual:?}")]
    ExpectedToBe {
        expected: FreezerState,
        actual: FreezerState,
    },
    #[error("unexpected \"cgroup.freeze\" state: {state}")]
    UnknownState { state: String },
    #[error("timeout of {0} ms reached waiting for the cgroup to freeze")]
    Timeout(u128),
}

pub struct Freezer {}

impl Freezer {
    pub fn apply(state: FreezerState, path: &Path) -> Result<(), V2FreezerError> {
        let value = match state {
            FreezerState::Undefined => return Ok(()),
            FreezerState::Frozen => "1",
            FreezerState::Thawed => "0",
        };

        let target = path.join(CGROUP_FREEZE);
        if let Err(err) = common::write_cgroup_file_str(&target, value) {
            // a kernel without cgroup.freeze has nothing frozen, so thawing is a no-op
            return match state {
                FreezerState::Frozen => Err(V2FreezerError::NotSupported(err)),
                _ => Ok(()),
            };
        }

        let actual = Self::read_state(path)?;
        if actual != state {
            return Err(V2FreezerError::ExpectedToBe {
                expected: state,
                actual,
            });
        }

        Ok(())
    }

    fn read_state(path: &Path) -> Result<FreezerState, V2FreezerError> {
        let content = common::read_cgroup_file(path.join(CGROUP_FREEZE))?;
        match content.trim() {
            "0" => Ok(FreezerState::Thawed),
            "1" => Self::wait_frozen(path),
            other => Err(V2FreezerError::UnknownState {
                state: other.to_owned(),
            }),
        }
    }

    // Freezing is asynchronous, cgroup.events reports "frozen 1" once every task stopped.
    fn wait_frozen(path: &Path) -> Result<FreezerState, V2FreezerError> {
        let events = path.join(CGROUP_EVENTS);
        for attempt in 0..FROZEN_POLL_ATTEMPTS {
            let content = common::read_cgroup_file(&events)?;
            let frozen = content
                .lines()
                .find_map(|line| line.strip_prefix("frozen "))
                .map(str::trim);

            match frozen {
                Some("1") => {
                    if attempt > 1 {
                        tracing::debug!("frozen after {} retries", attempt)
                    }
                    return Ok(FreezerState::Frozen);
                }
                Some(_) => thread::sleep(FROZEN_POLL_INTERVAL),
                None => return Ok(FreezerState::Undefined),
            }
        }

        Err(V2FreezerError::Timeout(
            FROZEN_POLL_INTERVAL.as_millis() * FROZEN_POLL_ATTEMPTS as u128,
        ))
    }
}
