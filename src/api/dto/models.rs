//! DTOs for the model registry endpoint.

use serde::Serialize;

use crate::odm::ModelDescriptor;

/// Every registered model with its collection and reference paths.
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelDescriptor>,
}
