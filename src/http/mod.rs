//! HTTP boundary: request templates and the probe transport.

pub mod requester;
pub mod template;
