//! Friendly File Server: share one file (or an archive of several) over HTTP,
//! optionally accept uploads, and report whether the server is reachable.

pub mod common;
pub mod receive;
pub mod server;
pub mod share;
pub mod transport;
pub mod ui;
pub mod utils;
