mod api;
mod cli;
mod config;
mod directory;
mod error;
mod model;
mod session;
mod transcript;

use anyhow::Result;
use clap::Parser;
use std::cell::RefCell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "userdesk", about = "Browse and manage a remote user directory")]
pub struct Args {
    #[arg(short, long, help = "Run a single command and exit")]
    pub command: Option<String>,

    #[arg(long, env = "USERDESK_BASE_URL", help = "Users API base URL")]
    pub base_url: Option<String>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Where the session token is persisted")]
    pub token_file: Option<PathBuf>,

    #[arg(long, help = "Skip delete confirmation")]
    pub yes: bool,

    #[arg(long, help = "Session transcripts directory")]
    pub transcripts_dir: Option<PathBuf>,

    #[arg(long, help = "Debug output (log HTTP requests to stderr)")]
    pub debug: bool,
}

fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("userdesk=debug")
        } else {
            EnvFilter::new("userdesk=warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.debug);

    let mut cfg = if let Some(config_path) = &args.config {
        config::Config::load_from(config_path)?
    } else {
        config::Config::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring unreadable config, using defaults");
            config::Config::default()
        })
    };

    // CLI flags override every config layer
    if let Some(base_url) = &args.base_url {
        cfg.api.base_url = base_url.clone();
    }
    if let Some(token_file) = &args.token_file {
        cfg.session.token_file = Some(token_file.clone());
    }

    if let Err(errors) = cfg.validate() {
        let details: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(anyhow::anyhow!(
            "Invalid configuration:\n  {}",
            details.join("\n  ")
        ));
    }

    let client = api::Client::new(&cfg.api.base_url).with_timeout(cfg.api.timeout());
    tracing::debug!(base_url = client.base_url(), "using users API");

    let token_path = cfg
        .session
        .token_file
        .clone()
        .unwrap_or_else(session::FileTokenStore::default_path);
    let session = session::Session::restore(session::FileTokenStore::new(&token_path));

    let root = std::env::current_dir()?;
    let transcripts_dir = args
        .transcripts_dir
        .clone()
        .unwrap_or_else(|| root.join(".userdesk").join("sessions"));
    std::fs::create_dir_all(&transcripts_dir)?;

    let session_id = uuid::Uuid::new_v4().to_string();
    let transcript_path = transcripts_dir.join(format!("{}.jsonl", session_id));
    let transcript = transcript::Transcript::new(&transcript_path, &session_id)?;

    let ctx = cli::Context {
        args,
        config: cfg,
        api: Box::new(client),
        session: RefCell::new(session),
        directory: RefCell::new(directory::Directory::new()),
        transcript: RefCell::new(transcript),
        session_id,
    };

    if let Some(command) = ctx.args.command.clone() {
        cli::run_once(&ctx, &command)
    } else {
        cli::run_repl(ctx)
    }
}
