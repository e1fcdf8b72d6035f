use std::time::{Duration, Instant};

use tokio::net::TcpListener;

use crate::{
    api::AppState, config::Config, error, harvest::Session, info, management::TokenManager,
    server, success, warning,
};

/// How long to wait for the browser login to come back.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(120);

/// Logs in through the browser and stores the session for later CLI runs.
///
/// Starts the local server, opens its `/login` page and waits until the
/// callback has exchanged the authorization code. The configured redirect
/// URI must point at this server.
pub async fn auth(config: Config) {
    let listener = match TcpListener::bind(&config.server_address).await {
        Ok(listener) => listener,
        Err(e) => error!("Cannot bind {}: {}", config.server_address, e),
    };
    let login_url = format!("http://{}/login", config.server_address);

    let state = match AppState::new(config) {
        Ok(state) => state.with_post_login_path("/authorized"),
        Err(e) => error!("Failed to set up the API client: {}", e),
    };

    let server_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = server::serve(listener, server_state).await {
            warning!("Callback server stopped: {}", e);
        }
    });

    if webbrowser::open(&login_url).is_err() {
        warning!(
            "Failed to open browser. Please navigate to the following URL manually:\n{}",
            login_url
        )
    }
    info!("Waiting for authorization...");

    match wait_for_login(&state).await {
        Some(session) => {
            let manager = TokenManager::new(session);
            if let Err(e) = manager.persist().await {
                error!("Failed to save session: {}", e);
            }
            success!("Authentication successful!");
        }
        None => error!("Authentication failed or timed out."),
    }
}

async fn wait_for_login(state: &AppState) -> Option<Session> {
    let start = Instant::now();

    while start.elapsed() < LOGIN_TIMEOUT {
        if let Some(session) = state.last_login.lock().await.take() {
            return Some(session);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    None
}
