//! HTTP transport for query requests.

mod server;

pub use server::*;
