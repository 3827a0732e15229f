//! Infrastructure layer: storage backends and their connection setup.
//!
//! - [`connection`] - connection string parsing and store construction
//! - [`persistence`] - [`crate::odm::DocumentStore`] implementations

pub mod connection;
pub mod persistence;
