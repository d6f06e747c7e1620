use adkchat::session::short_id;
use adkchat::{ChatController, FileStore, Message, SendOutcome, SendRejected};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "adkchat")]
#[command(about = "ADK Chat CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: ADKCHAT_CONFIG_PATH or ~/.adkchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Chat with the agent through the proxy (interactive). Resumes the stored session.
    Chat {
        /// Config file path (default: ADKCHAT_CONFIG_PATH or ~/.adkchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Probe the proxy once and print the connection state.
    Health {
        /// Config file path (default: ADKCHAT_CONFIG_PATH or ~/.adkchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Print the stored conversation.
    History {
        /// Config file path (default: ADKCHAT_CONFIG_PATH or ~/.adkchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Delete the stored conversation and start a new session.
    Clear {
        /// Config file path (default: ADKCHAT_CONFIG_PATH or ~/.adkchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Do not ask for confirmation.
        #[arg(long, short)]
        yes: bool,
    },
}

const CHAT_HELP: &str = "available commands:\n\n/clear - delete chat history and start a new session\n/status - check the proxy connection\n/help - show this help message\n/exit - leave";

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("adkchat {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Init { config }) => run_init(config),
        Some(Commands::Chat { config }) => run_chat(config).await,
        Some(Commands::Health { config }) => run_health(config).await,
        Some(Commands::History { config }) => run_history(config),
        Some(Commands::Clear { config, yes }) => run_clear(config, yes),
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(adkchat::config::default_config_path);
    let dir = adkchat::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

fn open(config_path: Option<PathBuf>) -> anyhow::Result<(ChatController<FileStore>, adkchat::config::Config)> {
    let (config, path) = adkchat::config::load_config(config_path)?;
    let mut controller = adkchat::open_controller(&config, &path);
    controller.initialize()?;
    Ok((controller, config))
}

async fn run_health(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = adkchat::config::load_config(config_path)?;
    let controller = adkchat::open_controller(&config, &path);
    let state = controller.probe_health().await;
    println!("{} ({})", state, adkchat::config::resolve_base_url(&config));
    Ok(())
}

fn run_history(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (controller, _) = open(config_path)?;
    if controller.history().is_empty() {
        println!("No messages yet.");
    }
    for m in controller.history() {
        print_message(m);
    }
    Ok(())
}

fn run_clear(config_path: Option<PathBuf>, yes: bool) -> anyhow::Result<()> {
    let (mut controller, _) = open(config_path)?;
    if !yes && !confirm("Delete all chat history?")? {
        return Ok(());
    }
    if let Some(id) = controller.clear()? {
        println!("Chat history cleared (session {}...)", short_id(&id));
    }
    Ok(())
}

async fn run_chat(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (mut controller, config) = open(config_path)?;
    for m in controller.history() {
        print_message(m);
    }
    let state = controller.probe_health().await;
    println!(
        "[{}] session {}... (type /help for commands)",
        state,
        short_id(controller.session_id().unwrap_or_default())
    );
    if let Some(warning) = state.warning() {
        println!("{}", warning);
    }
    // State transitions are logged at info level.
    controller.start_health_monitor(config.api.health_interval());

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if input.eq_ignore_ascii_case("/help") {
            println!("{}", CHAT_HELP);
            continue;
        }
        if input.eq_ignore_ascii_case("/status") {
            let state = controller.probe_health().await;
            println!("[{}]", state);
            continue;
        }
        if input.eq_ignore_ascii_case("/clear") {
            if confirm("Delete all chat history?")? {
                if let Some(id) = controller.clear()? {
                    println!("Chat history cleared (session {}...)", short_id(&id));
                }
            }
            continue;
        }

        controller.set_input(input);
        match controller.submit().await {
            Ok(SendOutcome::Replied(reply)) => print_message(&reply),
            Ok(SendOutcome::Failed(bubble)) => print_message(&bubble),
            Err(SendRejected::Empty) => {}
            Err(e) => eprintln!("not sent: {}", e),
        }
    }

    controller.stop_health_monitor();
    Ok(())
}

fn print_message(m: &Message) {
    let prefix = if m.is_user() {
        ">"
    } else if m.is_error {
        "!"
    } else {
        "<"
    };
    let time = m.time_label();
    let mut lines = m.text.trim().lines();
    println!("{} [{}] {}", prefix, time, lines.next().unwrap_or(""));
    for line in lines {
        println!("{}         {}", prefix, line);
    }
}

fn confirm(question: &str) -> io::Result<bool> {
    let mut stdout = io::stdout();
    write!(stdout, "{} [y/N] ", question)?;
    stdout.flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
