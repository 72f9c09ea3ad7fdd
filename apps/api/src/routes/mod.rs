pub mod health;

use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::challenge::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/generate-challenge",
            post(handlers::handle_generate_challenge)
                .options(handlers::handle_preflight)
                .fallback(handlers::handle_method_not_allowed),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(preflight_no_content))
        .with_state(state)
}

/// CORS preflights are answered by `CorsLayer` with 200; clients get 204.
async fn preflight_no_content(request: Request, next: Next) -> Response {
    let is_options = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    if is_options && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}
