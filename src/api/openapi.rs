use super::handlers::{auth, health, notes, users};
use utoipa::openapi::{InfoBuilder, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` spec. Routes added outside (like
/// `/`) are intentionally not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    let router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::signup::signup))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::verification::send_otp))
        .routes(routes!(auth::verification::verify_otp_endpoint))
        .routes(routes!(auth::google::google_auth))
        .routes(routes!(auth::session::logout))
        .routes(routes!(notes::list_notes, notes::create_note))
        .routes(routes!(
            notes::get_note,
            notes::update_note,
            notes::delete_note
        ))
        .routes(routes!(users::get_profile, users::update_profile_endpoint))
        .routes(routes!(users::delete_account));

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Signup, login, OTP, and Google sign-in".to_string());

    let mut notes_tag = Tag::new("notes");
    notes_tag.description = Some("Ownership-scoped note CRUD".to_string());

    let mut users_tag = Tag::new("users");
    users_tag.description = Some("Profile and account management".to_string());

    OpenApiBuilder::new()
        .info(info)
        .tags(Some(vec![auth_tag, notes_tag, users_tag]))
        .build()
}
