use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "slumble")]
#[command(about = "Relay chat between a Mumble channel and a Slack channel", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the relay (default when no subcommand is given).
    Run(RunArgs),
}

#[derive(Args, Default)]
struct RunArgs {
    /// Config file path (default: SLUMBLE_CONFIG_PATH or ./slumble.config)
    #[arg(long, short, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Mumble server as host or host:port (overrides Mumble.Server)
    #[arg(long, value_name = "ADDR")]
    server: Option<String>,

    /// Mumble username the relay logs in with (overrides Mumble.Username)
    #[arg(long)]
    username: Option<String>,

    /// Mumble server password (overrides Mumble.Password)
    #[arg(long)]
    password: Option<String>,

    /// Accept self-signed Mumble server certificates (overrides Mumble.Insecure)
    #[arg(long)]
    insecure: Option<bool>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("slumble {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run(args)) => exit_on_error(run(args).await),
        None => exit_on_error(run(RunArgs::default()).await),
    }
}

fn exit_on_error(result: anyhow::Result<()>) {
    if let Err(e) = result {
        log::error!("relay failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let (mut config, path) = slumble::config::load_config(args.config)?;
    if let Some(server) = args.server {
        config.mumble.server = server;
    }
    if let Some(username) = args.username {
        config.mumble.username = username;
    }
    if args.password.is_some() {
        config.mumble.password = args.password;
    }
    if let Some(insecure) = args.insecure {
        config.mumble.insecure = insecure;
    }
    log::info!("starting relay with config {}", path.display());
    slumble::relay::run_relay(config).await
}
