//! Manest CLI: train and chat with a resonant character model.
//!
//! Usage:
//!   manest init
//!   manest train [--data data]
//!   manest chat

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing_subscriber::EnvFilter;

use manest::config::{BrainConfig, DEFAULT_TOML};
use manest::errors::ManestError;
use manest::text::chat::{CancelToken, ChatSession, StdConsole, MAX_STEPS};
use manest::text::corpus::load_corpus;
use manest::text::engine::BrainEngine;

const SAMPLE_DATA: &str = "User: Halo.\nMahestra: Salam. Saya adalah AI berbasis reservoir resonan.\n";

#[derive(Parser)]
#[command(name = "manest", version, about = "Manest: resonant reservoir character model")]
struct Cli {
    /// Path to the brain config
    #[arg(short, long, global = true, default_value = "brain.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create brain.toml and a sample data/ folder
    Init,
    /// Train the readout on every .txt file in the data folder
    Train {
        /// Folder with .txt training files
        #[arg(short, long, default_value = "data")]
        data: PathBuf,
        /// Print the training report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Talk to the trained brain
    Chat {
        /// Maximum characters generated per reply
        #[arg(long, default_value_t = MAX_STEPS)]
        max_steps: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => cmd_init(&cli.config),
        Commands::Train { data, json } => cmd_train(&cli.config, &data, json),
        Commands::Chat { max_steps } => cmd_chat(&cli.config, max_steps),
    }
}

fn cmd_init(config_path: &Path) {
    if config_path.exists() {
        eprintln!("Warning: {} already exists, leaving it untouched.", config_path.display());
        return;
    }

    let result = fs::write(config_path, DEFAULT_TOML)
        .and_then(|_| fs::create_dir_all("data"))
        .and_then(|_| fs::write(Path::new("data").join("contoh.txt"), SAMPLE_DATA));
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    println!("Project initialized.");
    println!("  1. Edit {} to configure the brain.", config_path.display());
    println!("  2. Put .txt files in data/.");
    println!("  3. Run `manest train`.");
}

fn cmd_train(config_path: &Path, data: &Path, json: bool) {
    let mut engine = open_engine(config_path);

    let corpus = match load_corpus(data) {
        Ok(text) => text,
        Err(e) if e.is_recoverable() => {
            eprintln!("Warning: {}", e);
            return;
        }
        Err(e) => fail(e),
    };
    println!("Total characters: {}", corpus.chars().count());

    let start = Instant::now();
    let report = engine.train(&corpus).unwrap_or_else(|e| fail(e));
    let elapsed = start.elapsed();

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Error: {}", e),
        }
    } else {
        println!("Training finished and saved in {:.2?}.", elapsed);
        println!("  vocabulary:  {}", report.vocab_size);
        println!("  readout:     {} → {}", report.feature_dim, report.output_dim);
    }
}

fn cmd_chat(config_path: &Path, max_steps: usize) {
    let mut engine = open_engine(config_path);
    if !engine.is_trained() {
        eprintln!("{}", ManestError::Untrained);
        return;
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    let installed = ctrlc::set_handler(move || {
        if handler_token.is_generating() {
            handler_token.cancel();
        } else {
            // Waiting at the prompt: nothing is unsaved, end the session here.
            println!();
            std::process::exit(0);
        }
    });
    if let Err(e) = installed {
        tracing::warn!("interrupt handler unavailable: {}", e);
    }

    let session = ChatSession::new(max_steps, cancel);
    let mut console = StdConsole::new();
    if let Err(e) = session.run(&mut engine, &mut console) {
        fail(e);
    }
}

fn open_engine(config_path: &Path) -> BrainEngine {
    let config = BrainConfig::from_file(config_path).unwrap_or_else(|e| fail(e));
    BrainEngine::initialize(config).unwrap_or_else(|e| fail(e))
}

fn fail(e: ManestError) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}
