use crate::routes::ROUTES;
use crate::state::GatewayState;
use axum::http::StatusCode;
use axum::Router;

/// Build the HTTP router over `state`.
pub fn get_app(state: GatewayState) -> Router {
    let mut router = Router::new();
    for (path, method_router) in ROUTES.iter() {
        router = router.route(path, method_router.clone());
    }
    router
        .fallback(|| async { (StatusCode::NOT_FOUND, "not found") })
        .with_state(state)
}
