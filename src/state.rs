//! Shared application state injected into every handler.

use crate::application::services::{PostService, UserService};
use crate::odm::{ModelError, Odm};

#[derive(Clone)]
pub struct AppState {
    pub odm: Odm,
    pub user_service: UserService,
    pub post_service: PostService,
}

impl AppState {
    /// Builds the services over a configured ODM.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if the domain models were not registered.
    pub fn new(odm: Odm) -> Result<Self, ModelError> {
        Ok(Self {
            user_service: UserService::new(&odm)?,
            post_service: PostService::new(&odm)?,
            odm,
        })
    }
}
