//! Rivet CLI
//!
//! Chat interactively with a directory of reply scripts, lint scripts,
//! or inspect the sorted trigger buffer.

use anyhow::Context;
use clap::{Parser, Subcommand};
use rivet::{Config, Rivet, ThawAction};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rivet")]
#[command(about = "Reply-script engine - chat with RiveScript-style documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Directory containing reply scripts
        #[arg(short, long)]
        dir: PathBuf,

        /// Username for the session
        #[arg(short, long, default_value = "localuser")]
        user: String,

        /// Log and skip script errors instead of failing
        #[arg(long)]
        lenient: bool,

        /// Enable UTF-8 mode
        #[arg(long)]
        utf8: bool,

        /// Recursion depth limit
        #[arg(long, default_value = "50")]
        depth: usize,
    },

    /// Parse scripts and report syntax problems
    Check {
        /// Script files to check
        files: Vec<PathBuf>,
    },

    /// Print the sorted trigger buffer
    Sort {
        /// Directory containing reply scripts
        #[arg(short, long)]
        dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            dir,
            user,
            lenient,
            utf8,
            depth,
        } => {
            run_chat(dir, user, lenient, utf8, depth)?;
        }

        Commands::Check { files } => {
            run_check(files)?;
        }

        Commands::Sort { dir } => {
            run_sort(dir)?;
        }
    }

    Ok(())
}

fn run_chat(
    dir: PathBuf,
    user: String,
    lenient: bool,
    utf8: bool,
    depth: usize,
) -> anyhow::Result<()> {
    let config = Config::default()
        .with_strict(!lenient)
        .with_utf8(utf8)
        .with_depth(depth);

    let mut bot = Rivet::with_config(config);
    bot.load_directory(&dir)
        .with_context(|| format!("failed to load scripts from {}", dir.display()))?;
    bot.sort_replies();

    println!("Loaded {} topics.", bot.dump_topics().len());
    println!("Commands: /quit, /vars, /freeze, /thaw, /clear\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("You: ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/vars" => {
                match bot.get_uservars(&user) {
                    Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
                    None => println!("No session data yet."),
                }
                continue;
            }
            "/freeze" => {
                match bot.freeze_uservars(&user) {
                    Ok(()) => println!("Session frozen."),
                    Err(err) => println!("Error: {}", err),
                }
                continue;
            }
            "/thaw" => {
                match bot.thaw_uservars(&user, ThawAction::Thaw) {
                    Ok(()) => println!("Session restored."),
                    Err(err) => println!("Error: {}", err),
                }
                continue;
            }
            "/clear" => {
                bot.clear_uservars(&user);
                println!("Session cleared.");
                continue;
            }
            _ => {}
        }

        match bot.reply(&user, input) {
            Ok(reply) => println!("Bot: {}\n", reply),
            Err(err) => println!("Error: {}\n", err),
        }
    }

    Ok(())
}

fn run_check(files: Vec<PathBuf>) -> anyhow::Result<()> {
    let mut failures = 0usize;

    for file in &files {
        let mut bot = Rivet::new();
        match bot.load_file(file) {
            Ok(()) => println!("ok      {}", file.display()),
            Err(err) => {
                failures += 1;
                println!("error   {}: {}", file.display(), err);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} files failed", failures, files.len());
    }
    Ok(())
}

fn run_sort(dir: PathBuf) -> anyhow::Result<()> {
    let mut bot = Rivet::new();
    bot.load_directory(&dir)
        .with_context(|| format!("failed to load scripts from {}", dir.display()))?;
    bot.sort_replies();

    for (topic, patterns) in bot.dump_sorted() {
        println!("> topic {}", topic);
        for (rank, pattern) in patterns.iter().enumerate() {
            println!("  {:3}. {}", rank + 1, pattern);
        }
    }

    Ok(())
}
