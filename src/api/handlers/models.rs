//! Handler listing the registered models.

use axum::{Json, extract::State};

use crate::api::dto::models::ModelsResponse;
use crate::state::AppState;

/// `GET /api/models`
pub async fn models_handler(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.odm.registry().iter().cloned().collect(),
    })
}
