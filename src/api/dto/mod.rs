//! Data Transfer Objects for API requests and responses.
//!
//! Request bodies that map one-to-one onto a schema (`User`, `UserPatch`,
//! `PostPatch`) are deserialized straight into the entity; the types here
//! cover query strings, bodies that reference other documents, and
//! response envelopes.

pub mod health;
pub mod models;
pub mod pagination;
pub mod post;
pub mod user;
