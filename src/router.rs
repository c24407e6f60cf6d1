use axum::{
    Router, middleware,
    routing::{any, get, post},
};

use crate::{
    auth::admin_auth,
    handlers::{
        proxy::{proxy_posts_handler, proxy_users_handler},
        saga::{create_saga_handler, get_saga_handler},
        status::{list_breakers_handler, status_handler},
    },
    monitor::count_requests,
    state::AppState,
};

pub fn build_router(state: AppState) -> Router {
    let api_router = Router::new()
        .route("/api/saga/create", post(create_saga_handler))
        .route("/api/saga/:saga_id", get(get_saga_handler))
        .route("/api/users", any(proxy_users_handler))
        .route("/api/users/*rest", any(proxy_users_handler))
        .route("/api/posts", any(proxy_posts_handler))
        .route("/api/posts/*rest", any(proxy_posts_handler))
        .layer(middleware::from_fn_with_state(state.clone(), count_requests));

    let internal_router = Router::new()
        .route("/breakers", get(list_breakers_handler))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth));

    Router::new()
        .merge(api_router)
        .route("/status", get(status_handler))
        .nest("/internal", internal_router)
        .with_state(state)
}
