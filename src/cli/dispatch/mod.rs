use crate::cli::actions::Action;
use anyhow::Result;
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --dsn"))?,
        jwt_secret: matches
            .get_one("jwt-secret")
            .map(|s: &String| SecretString::from(s.clone()))
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --jwt-secret"))?,
        frontend_url: matches
            .get_one("frontend-url")
            .map(|s: &String| s.to_string())
            .unwrap_or_else(|| "http://localhost:5173".to_string()),
        google_client_id: matches
            .get_one("google-client-id")
            .map(|s: &String| s.to_string()),
    })
}
