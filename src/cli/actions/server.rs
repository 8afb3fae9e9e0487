use crate::api;
use crate::api::handlers::auth::AuthConfig;
use crate::api::notify::OutboxConfig;
use crate::cli::actions::Action;
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            jwt_secret,
            frontend_url,
            google_client_id,
        } => {
            let mut auth_config = AuthConfig::new(frontend_url, jwt_secret);
            if let Some(client_id) = google_client_id {
                auth_config = auth_config.with_google_client_id(client_id);
            }

            api::new(port, dsn, auth_config, OutboxConfig::new()).await?;
        }
    }

    Ok(())
}
