//! Domain layer containing the blog entities.
//!
//! # Architecture
//!
//! - [`entities`] - Schemas of the stored records and their partial updates
//!
//! # Design Principles
//!
//! - Entities depend only on the ODM model layer, never on HTTP or storage
//! - Business rules spanning several records live in services
//!   (see [`crate::application::services`])

pub mod entities;
