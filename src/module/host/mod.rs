//! Host attachment
//!
//! The manager only touches host output through [`HostAttachment`]. This module
//! provides a headless in-memory document for hosts without a real render tree.

pub mod memory;

pub use memory::{MemoryHost, StyleNode};
