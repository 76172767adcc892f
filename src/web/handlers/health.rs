//! `GET /health`

use axum::extract::State;
use axum::http::StatusCode;

use crate::web::state::WebState;

pub async fn health_check(State(state): State<WebState>) -> (StatusCode, &'static str) {
    if state.health.check_all().await {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Not OK")
    }
}
