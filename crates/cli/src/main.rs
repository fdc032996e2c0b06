use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley: Slack gateway that answers mentions and commands with AI replies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the gateway (POST /slack/events). Credentials come from the config file or SLACK_BOT_TOKEN / OPENAI_API_KEY / OPENAI_API_DOMAIN.
    Serve {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config, PORT env, or 3000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Resolve settings and report any missing required values without starting the server.
    CheckConfig {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    // A missing .env is fine; the process environment and config file still apply.
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("parley {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::CheckConfig { config }) => {
            if let Err(e) = run_check_config(config) {
                log::error!("configuration check failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    lib::gateway::run_gateway(config).await
}

fn run_check_config(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    let settings = lib::config::Settings::resolve(&config)?;
    println!("configuration at {} is complete", path.display());
    println!("  listen:     {}:{}", settings.bind, settings.port);
    println!("  backend:    {:?} ({})", settings.backend, settings.deployment);
    println!(
        "  signing:    {}",
        if settings.signing_secret.is_some() {
            "verified"
        } else {
            "not verified"
        }
    );
    println!("  history:    {} messages", settings.history_limit);
    println!("  dedup ttl:  {}s", settings.dedup_ttl.as_secs());
    println!("  generation: {}s timeout", settings.generation_timeout.as_secs());
    Ok(())
}
