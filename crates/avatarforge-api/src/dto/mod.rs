//! Request and response payloads.

pub mod request;
pub mod response;
