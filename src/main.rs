use clap::Parser;

use qa_harvest::checkpoint::CheckpointStore;
use qa_harvest::cli::{CheckpointAction, Cli, Command, confirm_reset};
use qa_harvest::config::AppConfig;
use qa_harvest::mailbox::ImapSource;
use qa_harvest::oracle::OllamaOracle;
use qa_harvest::pipeline::run_pipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    // Checkpoint actions short-circuit without touching the mailbox
    // or oracle configuration.
    if let Some(Command::Checkpoint { action }) = &cli.command {
        let store = CheckpointStore::new(AppConfig::output_dir_from_env());
        match action {
            CheckpointAction::Inspect => match store.load().await? {
                Some(cp) => {
                    println!("last_sent_at:    {}", cp.last_sent_at.to_rfc3339());
                    println!("last_message_id: {}", cp.last_message_id);
                }
                None => println!("No checkpoint at {}", store.path().display()),
            },
            CheckpointAction::Reset { force } => {
                if !confirm_reset(*force, prompt_stderr) {
                    eprintln!("Aborted.");
                    return Ok(());
                }
                if store.reset().await? {
                    println!("Checkpoint deleted.");
                } else {
                    println!("No checkpoint to delete.");
                }
            }
        }
        return Ok(());
    }

    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let config = AppConfig::from_env()?;
    let options = cli.to_run_options();

    eprintln!("📬 QA Harvest v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {} on {}", config.mailbox, config.imap_host);
    eprintln!("   Model: {}", config.ollama_model);
    eprintln!("   Output: {}", config.output_dir);
    eprintln!("   Min confidence: {}", config.min_confidence);
    if options.dry_run {
        eprintln!("   Mode: dry-run (oracle disabled)");
    }

    let source = ImapSource::new(&config);
    let oracle = OllamaOracle::new(&config.ollama_base_url, &config.ollama_model);

    let run_dir = run_pipeline(&config, &options, &source, &oracle).await?;
    println!("Run completed. Output: {}", run_dir.display());
    Ok(())
}

fn prompt_stderr(prompt: &str) -> String {
    use std::io::Write;

    eprint!("{prompt}");
    let _ = std::io::stderr().flush();
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
    line
}
