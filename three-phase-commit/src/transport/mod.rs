//! Concrete [`CommunicationHandler`](crate::comm::CommunicationHandler)s.
//!
//! - [`http`]: the HTTP routes a node serves plus the matching client.
//! - [`local`]: an in-process network connecting engines in one process.

pub mod http;
pub mod local;
