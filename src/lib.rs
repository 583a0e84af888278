//! ipd-portal-daemon: keeps an authenticated session to a headset's device
//! portal and lets voice commands read and adjust the interpupillary
//! distance (IPD).

pub mod config;
pub mod credentials;
pub mod error;
pub mod ipc;
pub mod ipd;
pub mod lifecycle;
pub mod polling;
pub mod portal;
pub mod session;
pub mod ui;
pub mod view;
pub mod voice;
