pub mod server;

use secrecy::SecretString;

/// Actions the CLI can dispatch to.
#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        jwt_secret: SecretString,
        frontend_url: String,
        google_client_id: Option<String>,
    },
}
