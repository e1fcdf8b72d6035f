use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

use harvestify::{cli, config, error};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the web server (login, dashboard, recommendations)
    Serve,

    /// Authorize with Spotify API
    Auth,

    /// Harvest listening data into a new snapshot
    Harvest(HarvestOptions),

    /// Run the recommendation engine on a snapshot
    Recommend(RecommendOptions),

    /// Show session and snapshot status
    Info(InfoOptions),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct HarvestOptions {
    /// Number of top tracks to print
    #[clap(long, default_value_t = 10)]
    show: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct RecommendOptions {
    /// Snapshot file name; defaults to the most recent one
    #[clap(long)]
    snapshot: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct InfoOptions {
    #[clap(long)]
    session: bool,
    #[clap(long)]
    snapshots: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("harvestify=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    let cli = Cli::parse();

    if let Command::Completions(opt) = &cli.command {
        let mut cmd = Cli::command_for_update();
        let name = cmd.get_name().to_string();
        generate(opt.shell, &mut cmd, name, &mut std::io::stdout());
        return;
    }

    let config = match config::Config::from_env() {
        Ok(config) => config,
        Err(e) => error!("Invalid configuration: {}", e),
    };

    match cli.command {
        Command::Serve => cli::serve(config).await,
        Command::Auth => cli::auth(config).await,
        Command::Harvest(opt) => cli::harvest(&config, opt.show).await,
        Command::Recommend(opt) => cli::recommend(&config, opt.snapshot).await,
        Command::Info(opt) => cli::info(&config, opt.session, opt.snapshots).await,
        Command::Completions(_) => {}
    }
}
