use crate::{api::AppState, config::Config, error, info, server};

pub async fn serve(config: Config) {
    let address = config.server_address.clone();
    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => error!("Failed to set up the API client: {}", e),
    };

    info!("Listening on http://{}", address);
    info!("Open http://{}/login to start.", address);
    if let Err(e) = server::start_api_server(state).await {
        error!("Server stopped: {}", e);
    }
}
