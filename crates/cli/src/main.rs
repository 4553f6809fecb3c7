use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden: allowlisted command execution gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory, a default config file, and the sandbox workspace.
    Init {
        /// Config file path (default: WARDEN_CONFIG_PATH or ~/.warden/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the HTTP gateway until SIGINT/SIGTERM.
    Gateway {
        /// Config file path (default: WARDEN_CONFIG_PATH or ~/.warden/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,

        /// Bind address (default from config or 127.0.0.1)
        #[arg(long, short)]
        bind: Option<String>,
    },

    /// Validate a command string against the policy without running it.
    Check {
        /// The full command string, e.g. "nmap -sV 10.0.0.1"
        command: String,
    },

    /// Print the allowlisted commands and their categories as JSON.
    Allowed,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("warden {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port, bind }) => {
            if let Err(e) = run_gateway(config, port, bind).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Check { command }) => {
            if !run_check(&command) {
                std::process::exit(1);
            }
        }
        Some(Commands::Allowed) => {
            if let Err(e) = run_allowed() {
                log::error!("listing allowed commands failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let (dir, config) = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    match lib::init::ensure_workspace(&config) {
        Ok(ws) => println!("workspace: {}", ws.display()),
        Err(e) => log::warn!("{:#} (commands will fall back to {})", e, config.exec.fallback_dir.display()),
    }
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
    bind: Option<String>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    if let Some(b) = bind {
        config.gateway.bind = b;
    }
    log::info!(
        "starting gateway on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    lib::gateway::run_gateway(config).await
}

/// Print the category on success or the rejection reason; returns whether it was accepted.
fn run_check(command: &str) -> bool {
    let policy = lib::exec::CommandPolicy::new();
    match lib::exec::validate(&policy, command) {
        Ok(v) => {
            println!("allowed [{}]: {}", v.category, v.argv.join(" "));
            true
        }
        Err(reason) => {
            println!("rejected: {}", reason);
            false
        }
    }
}

fn run_allowed() -> anyhow::Result<()> {
    let policy = lib::exec::CommandPolicy::new();
    println!("{}", serde_json::to_string_pretty(&policy.allowed_commands())?);
    Ok(())
}
