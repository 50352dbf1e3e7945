//! Management API (C4) service implementations.

pub mod workflow;

pub use workflow::{router, ManagementApi};
