//! MathPath CLI entry point.
//!
//! Provides `check`, `summary`, `ask`, and `chat` subcommands: validate the
//! setup, show a student's derived placement summary, answer one question,
//! or hold an interactive session.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use mathpath::assistant::Assistant;
use mathpath::config::Config;
use mathpath::prompt::{render_summary, ConversationHistory};
use mathpath::retrieval::bedrock::BedrockRetriever;
use mathpath::students::{StudentDirectory, StudentRecord};
use mathpath::summary::derive_flags;

/// MathPath: math placement guidance from your student record and the
/// placement knowledge base.
#[derive(Parser)]
#[command(name = "mathpath", version, about)]
struct Cli {
    /// Config file (default: `$MATHPATH_CONFIG` or `./mathpath.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Validate configuration, student data and credentials, then exit.
    Check,
    /// Print the derived placement summary for a student.
    Summary {
        /// Student email.
        #[arg(long)]
        email: String,
    },
    /// Answer a single question and exit.
    Ask {
        /// Student email.
        #[arg(long)]
        email: String,
        /// The question.
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Start an interactive chat.
    Chat {
        /// Student email; prompted for when omitted.
        #[arg(long)]
        email: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let dotenv = dotenvy::dotenv();

    if !matches!(cli.command, Command::Chat { .. }) {
        mathpath::logging::init_cli(cli.verbose);
        log_dotenv(&dotenv);
    }
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Check => handle_check(&config),
        Command::Summary { email } => handle_summary(&config, &email),
        Command::Ask { email, question } => {
            handle_ask(&config, &email, &question.join(" ")).await
        }
        Command::Chat { email } => {
            let logs_dir = config.logs_dir()?;
            let _logging_guard = mathpath::logging::init_chat(&logs_dir)?;
            log_dotenv(&dotenv);
            handle_chat(&config, email).await
        }
    }
}

fn log_dotenv(result: &Result<PathBuf, dotenvy::Error>) {
    match result {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => debug!("no .env file"),
        Err(e) => warn!(error = %e, "failed to load .env"),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_required(path, |key| std::env::var(key).ok())?,
        None => Config::load()?,
    };
    Ok(config)
}

fn load_directory(config: &Config) -> anyhow::Result<StudentDirectory> {
    StudentDirectory::load(&config.data.students_path).context("failed to load student data")
}

fn build_assistant(config: &Config) -> anyhow::Result<Assistant> {
    let settings = config
        .retrieval_settings()
        .context("knowledge base is not configured")?;
    let retriever = BedrockRetriever::new(&settings, config.credentials_provider())
        .context("failed to create knowledge base client")?;
    let rules = config.prompt_rules()?;
    Ok(Assistant::new(
        Arc::new(retriever),
        rules,
        config.citations.clone(),
    ))
}

/// Validate everything a question needs, without asking one.
fn handle_check(config: &Config) -> anyhow::Result<()> {
    let settings = config
        .retrieval_settings()
        .context("knowledge base is not configured")?;
    let directory = load_directory(config)?;
    let rules = config.prompt_rules()?;

    println!("region:          {}", settings.region);
    println!("knowledge base:  {}", settings.knowledge_base_id);
    println!("model:           {}", settings.model_id);
    println!("rules version:   {}", rules.version());
    println!(
        "students:        {} ({})",
        directory.len(),
        config.data.students_path.display()
    );

    match config.credentials_provider().resolve() {
        Ok(creds) => println!("credentials:     {}", creds.access_key_id),
        Err(e) => {
            warn!(error = %e, "credentials unavailable");
            println!("credentials:     unavailable ({e})");
        }
    }
    Ok(())
}

fn sign_in<'d>(directory: &'d StudentDirectory, email: &str) -> anyhow::Result<&'d StudentRecord> {
    directory.authenticate(email).map_err(anyhow::Error::from)
}

/// Print the derived summary as JSON.
fn handle_summary(config: &Config, email: &str) -> anyhow::Result<()> {
    let directory = load_directory(config)?;
    let record = sign_in(&directory, email)?;
    let summary = derive_flags(record);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Answer one question.
async fn handle_ask(config: &Config, email: &str, question: &str) -> anyhow::Result<()> {
    let assistant = build_assistant(config)?;
    let directory = load_directory(config)?;
    let record = sign_in(&directory, email)?;
    println!("{}", assistant.process_user_question(record, question).await);
    Ok(())
}

/// Interactive session: sign in, then one answer per input line.
///
/// Lines starting with `/` are commands: `/summary`, `/reset`, `/signout`,
/// `/quit`.
async fn handle_chat(config: &Config, email: Option<String>) -> anyhow::Result<()> {
    let assistant = build_assistant(config)?;
    let directory = load_directory(config)?;
    info!(
        students = directory.len(),
        rules_version = %assistant.rules().version(),
        "chat session starting"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending_email = email;

    'session: loop {
        let record = loop {
            let candidate = match pending_email.take() {
                Some(email) => email,
                None => {
                    prompt_line("Email: ")?;
                    match lines.next_line().await? {
                        Some(line) => line,
                        None => break 'session,
                    }
                }
            };
            match directory.authenticate(&candidate) {
                Ok(record) => break record,
                Err(miss) => {
                    println!("{miss}");
                    println!("{}", directory.sign_in_hint());
                }
            }
        };

        let summary = derive_flags(record);
        println!("Signed in as {}. Ask a question, or /quit.", summary.name);
        let mut history = ConversationHistory::new();

        loop {
            prompt_line("> ")?;
            let Some(line) = lines.next_line().await? else {
                break 'session;
            };
            let question = line.trim();
            match question {
                "" => continue,
                "/quit" | "/exit" => break 'session,
                "/signout" => continue 'session,
                "/reset" => {
                    history.clear();
                    println!("Conversation cleared.");
                    continue;
                }
                "/summary" => {
                    println!("{}", render_summary(&derive_flags(record)));
                    continue;
                }
                _ => {}
            }

            println!("Working...");
            let answer = assistant.process_turn(record, question, &history).await;
            println!("\n{answer}\n");
            history.record_exchange(question, answer);
        }
    }

    info!("chat session ended");
    Ok(())
}

fn prompt_line(prompt: &str) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(prompt.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
