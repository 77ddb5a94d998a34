use std::sync::Arc;

use anyhow::Context;

use felicita_client::{ApiClient, ClientConfig, Credentials, FileTokenStore, SessionController};

/// Headless session driver.
///
/// Restores the stored session, optionally signs in with `FELICITA_USERNAME`
/// / `FELICITA_PASSWORD` or signs out (`logout` argument), then prints the
/// resulting session state as JSON.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    felicita_observability::init();

    let config = ClientConfig::from_env();
    let token_path = match config.token_path.clone() {
        Some(path) => path,
        None => FileTokenStore::default_path().context("no platform data directory for the token file")?,
    };
    let tokens = FileTokenStore::open(&token_path)
        .with_context(|| format!("opening token store at {}", token_path.display()))?;

    let client = ApiClient::from_config(config, Arc::new(tokens)).context("building HTTP client")?;
    let controller = SessionController::new(Arc::new(client));
    controller.initialize().await;

    let command = std::env::args().nth(1);
    match command.as_deref() {
        Some("logout") => controller.logout().await,
        Some(other) => anyhow::bail!("unknown command: {other}"),
        None => {
            let username = std::env::var("FELICITA_USERNAME").ok();
            let password = std::env::var("FELICITA_PASSWORD").ok();
            if let (Some(username), Some(password)) = (username, password) {
                if !controller.state().is_authenticated {
                    controller
                        .login(&Credentials::new(username, password))
                        .await
                        .context("login failed")?;
                }
            }
        }
    }

    let state = controller.state();
    tracing::info!(status = ?state.status(), "session ready");
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
