use crate::api::handlers::{auth, root};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware,
    routing::get,
    Extension,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

pub mod handlers;
pub mod notify;
pub(crate) mod rate_limit;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use openapi::openapi;
pub use rate_limit::FixedWindowLimiter;

// Expired OTP rows are swept on this cadence.
const OTP_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Assemble the application router with its middleware stack.
///
/// Kept separate from [`new`] so integration tests can drive the full stack
/// without binding a socket.
pub fn app(
    pool: sqlx::PgPool,
    auth_state: Arc<auth::AuthState>,
    limiter: Arc<rate_limit::FixedWindowLimiter>,
) -> Result<axum::Router> {
    let frontend_origin = frontend_origin(auth_state.config().frontend_base_url())?;

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    // Build the router from OpenAPI-wired routes, then extend it with
    // non-doc routes like `/`. The spec stays in openapi.rs for the `openapi`
    // binary.
    let (router, _openapi) = router().split_for_parts();
    let app = router.route("/", get(root::root)).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors)
            .layer(middleware::from_fn_with_state(
                limiter,
                rate_limit::limit_requests,
            ))
            .layer(Extension(auth_state))
            .layer(Extension(pool)),
    );

    Ok(app)
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: auth::AuthConfig,
    outbox_config: notify::OutboxConfig,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let auth_state = Arc::new(auth::AuthState::new(auth_config));

    // Background worker delivers queued OTP emails; a second task sweeps
    // expired OTP rows.
    notify::spawn_outbox_worker(pool.clone(), Arc::new(notify::LogNotifier), outbox_config);
    auth::spawn_cleanup_sweep(pool.clone(), OTP_SWEEP_INTERVAL);

    let limiter = Arc::new(rate_limit::FixedWindowLimiter::new());
    let app = app(pool, auth_state, limiter)?;

    let listener = TcpListener::bind(format!("[::]:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_strips_path() -> Result<()> {
        let origin = frontend_origin("https://notu.dev/app/")?;
        assert_eq!(origin.to_str()?, "https://notu.dev");
        Ok(())
    }

    #[test]
    fn frontend_origin_keeps_port() -> Result<()> {
        let origin = frontend_origin("http://localhost:5173")?;
        assert_eq!(origin.to_str()?, "http://localhost:5173");
        Ok(())
    }

    #[test]
    fn frontend_origin_rejects_invalid_url() {
        assert!(frontend_origin("not a url").is_err());
    }
}
