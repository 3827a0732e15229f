//! HTTP request handlers for API endpoints.
//!
//! Each handler module corresponds to a logical grouping of endpoints.
//! Handlers never build error responses themselves; failures propagate as
//! [`crate::error::AppError`].

pub mod health;
pub mod models;
pub mod not_found;
pub mod posts;
pub mod users;

pub use health::health_handler;
pub use models::models_handler;
pub use not_found::not_found_handler;
pub use posts::{
    add_comment_handler, create_post_handler, delete_post_handler, get_post_handler,
    like_post_handler, post_list_handler, unlike_post_handler, update_post_handler,
};
pub use users::{
    create_user_handler, delete_user_handler, get_user_handler, update_user_handler,
    user_list_handler, user_posts_handler,
};
