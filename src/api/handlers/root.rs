use axum::response::IntoResponse;

/// Undocumented landing route; useful as a liveness probe that skips the
/// database.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
