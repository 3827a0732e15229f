//! API route configuration.
//!
//! `/users` and `/posts` are sub-routers whose paths are relative to their
//! mount point; [`api_routes`] is itself mounted under `/api`.

use crate::api::handlers::{
    add_comment_handler, create_post_handler, create_user_handler, delete_post_handler,
    delete_user_handler, get_post_handler, get_user_handler, like_post_handler, models_handler,
    not_found_handler, post_list_handler, unlike_post_handler, update_post_handler,
    update_user_handler, user_list_handler, user_posts_handler,
};
use crate::state::AppState;
use axum::{Router, routing::get, routing::post};

/// User routes.
///
/// # Endpoints
///
/// - `GET    /`            - List users (paginated, `role` filter)
/// - `POST   /`            - Create a user
/// - `GET    /{id}`        - Fetch a user
/// - `PATCH  /{id}`        - Partially update a user
/// - `DELETE /{id}`        - Delete a user who authors no posts
/// - `GET    /{id}/posts`  - Posts by this user
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(user_list_handler).post(create_user_handler))
        .route(
            "/{id}",
            get(get_user_handler)
                .patch(update_user_handler)
                .delete(delete_user_handler),
        )
        .route("/{id}/posts", get(user_posts_handler))
        .method_not_allowed_fallback(not_found_handler)
}

/// Post routes.
///
/// # Endpoints
///
/// - `GET    /`               - List posts (filters, `populate`, `fields`)
/// - `POST   /`               - Create a post
/// - `GET    /{id}`           - Fetch a post with references populated
/// - `PATCH  /{id}`           - Partially update a post
/// - `DELETE /{id}`           - Delete a post
/// - `POST   /{id}/comments`  - Add a comment
/// - `POST   /{id}/likes`     - Like a post
/// - `DELETE /{id}/likes`     - Remove a like
pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(post_list_handler).post(create_post_handler))
        .route(
            "/{id}",
            get(get_post_handler)
                .patch(update_post_handler)
                .delete(delete_post_handler),
        )
        .route("/{id}/comments", post(add_comment_handler))
        .route(
            "/{id}/likes",
            post(like_post_handler).delete(unlike_post_handler),
        )
        .method_not_allowed_fallback(not_found_handler)
}

/// Every route under `/api`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/models", get(models_handler))
        .nest("/users", user_routes())
        .nest("/posts", post_routes())
}
