//! Background Tasks Module
//!
//! # Tasks
//! - Expiry sweep: purges expired entries of the in-memory backend

mod cleanup;

pub use cleanup::spawn_expiry_sweeper;
