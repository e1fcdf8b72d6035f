//! # CLI Module
//!
//! User-facing commands of harvestify. Each command loads what it needs
//! (configuration, stored session, snapshots), delegates to the harvest
//! engine or the web server, and reports progress with the colored console
//! macros.
//!
//! ## Commands
//!
//! - [`serve`] - runs the web server (login, dashboard, recommendations)
//! - [`auth`] - browser login; stores the session for later CLI runs
//! - [`harvest`] - harvests listening data into a new snapshot
//! - [`recommend`] - runs the recommendation engine on a snapshot
//! - [`info`] - session and snapshot status
//!
//! ## Typical Usage
//!
//! ```bash
//! harvestify auth          # log in once
//! harvestify harvest       # write a snapshot
//! harvestify recommend     # recommendations from the latest snapshot
//! ```

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::{error, management::TokenManager};

mod auth;
mod harvest;
mod info;
mod recommend;
mod serve;

pub use auth::auth;
pub use harvest::harvest;
pub use info::info;
pub use recommend::recommend;
pub use serve::serve;

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb
}

async fn load_token_manager() -> TokenManager {
    match TokenManager::load().await {
        Ok(manager) => manager,
        Err(e) => error!(
            "Failed to load session. Please run harvestify auth\n Error: {}",
            e
        ),
    }
}
