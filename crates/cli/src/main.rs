use clap::{Parser, Subcommand};

use lib::message::InboundMessage;
use lib::session::Session;

#[derive(Parser)]
#[command(name = "relai")]
#[command(about = "relai CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the webhook gateway (HTTP server the messaging platform posts to).
    Serve {
        /// Config file path (default: RELAI_CONFIG_PATH or ~/.relai/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 8383)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Chat with the agent interactively from the terminal.
    Chat {
        /// Config file path (default: RELAI_CONFIG_PATH or ~/.relai/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("relai {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("gateway failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config }) => {
            if let Err(e) = run_chat(config).await {
                log::error!("chat failed: {}", e);
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
    log::info!("config loaded from {}", path.display());
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    lib::gateway::run_gateway(config).await
}

async fn run_chat(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    use std::io::{self, Write};

    if let Some(path) = config_path {
        // get_instance loads from the default path; point it at the given file.
        std::env::set_var("RELAI_CONFIG_PATH", path);
    }
    let session = Session::get_instance().await?;

    println!("Type your message, or 'quit' to exit.");
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("quit") {
            break;
        }

        let message = InboundMessage {
            timestamp: chrono::Utc::now(),
            sender: "cli".to_string(),
            content: input.to_string(),
            chat_jid: "cli".to_string(),
            is_from_me: false,
            media_type: None,
            message_id: None,
        };
        match session.process(&message).await {
            Ok(reply) => println!("< {}", reply.trim()),
            Err(e) => eprintln!("chat error: {}", e),
        }
    }

    session.cleanup().await;
    Ok(())
}
