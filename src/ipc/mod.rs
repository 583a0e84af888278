//! IPC module: recogniser bridge and status socket

mod protocol;
mod server;

pub use protocol::{DaemonStatus, Request, Response, MAX_FRAME_LEN};
pub use server::{Server, ServerContext};
