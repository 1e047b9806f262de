pub mod client;
#[cfg(feature = "systemd")]
pub mod connection;

pub use client::{SystemdClient, SystemdClientError};
#[cfg(feature = "systemd")]
pub use connection::DbusClient;
