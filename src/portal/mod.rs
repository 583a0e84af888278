//! Device portal access: connection contract, HTTP client, endpoint trust

mod client;
pub mod trust;

pub use client::{Connector, DeviceClient, PortalClient, PortalConnector};
