//! stixpoll CLI
//!
//! Incremental TAXII 1.1 poller emitting normalized indicators as JSON lines.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use stixpoll_runtime::{checkpoint, now_millis, PollRun, SourceConfig, TaxiiSource};

#[derive(Parser)]
#[command(name = "stixpoll")]
#[command(author, version, about = "stixpoll: incremental TAXII 1.1 indicator poller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll a collection from the stored watermark up to now
    Poll {
        #[command(flatten)]
        source: SourceArgs,

        /// Checkpoint file holding the watermark
        #[arg(short, long, default_value = "stixpoll-checkpoint.json")]
        checkpoint: PathBuf,

        /// Write indicators here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Delete the stored checkpoint and start from the initial lookback
        #[arg(long)]
        reset: bool,
    },

    /// Resolve and print the poll endpoint of the configured collection
    Discover {
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Source configuration (TOML)
    #[arg(long, default_value = "stixpoll.toml")]
    config: PathBuf,

    /// Basic auth user (or set STIXPOLL_USERNAME env var)
    #[arg(long, env = "STIXPOLL_USERNAME")]
    username: Option<String>,

    /// Basic auth password (or set STIXPOLL_PASSWORD env var)
    #[arg(long, env = "STIXPOLL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// API key (or set STIXPOLL_API_KEY env var)
    #[arg(long, env = "STIXPOLL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

impl SourceArgs {
    fn load(&self) -> Result<SourceConfig> {
        let mut config = SourceConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        apply_overrides(&mut config, self);
        Ok(config)
    }
}

fn apply_overrides(config: &mut SourceConfig, args: &SourceArgs) {
    if let Some(username) = &args.username {
        config.username = Some(username.clone());
    }
    if let Some(password) = &args.password {
        config.password = Some(password.clone());
    }
    if let Some(key) = &args.api_key {
        config.api_key = Some(key.clone());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match cli.command {
        Commands::Poll {
            source,
            checkpoint,
            output,
            reset,
        } => {
            let config = source.load()?;
            let count = match output {
                Some(path) => {
                    let file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("creating {}", path.display()))?;
                    run_poll(config, &checkpoint, reset, file).await?
                }
                None => run_poll(config, &checkpoint, reset, tokio::io::stdout()).await?,
            };
            eprintln!("✅ {} indicator(s) written", count);
        }
        Commands::Discover { source } => {
            let config = source.load()?;
            let source = TaxiiSource::new(config)?;
            let endpoint = source.poll_endpoint().await?;
            println!("{}", endpoint);
        }
    }

    Ok(())
}

/// Run one poll, write indicators as JSON lines, then persist the watermark
///
/// The checkpoint is written after the output is flushed, also when the
/// run failed part way; it then covers the windows completed before the
/// failure.
async fn run_poll<W>(config: SourceConfig, checkpoint_path: &Path, reset: bool, out: W) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    if reset {
        info!("Discarding checkpoint {}", checkpoint_path.display());
        checkpoint::reset(checkpoint_path)
            .await
            .with_context(|| format!("removing checkpoint {}", checkpoint_path.display()))?;
    }
    let state = checkpoint::load(checkpoint_path)
        .await
        .with_context(|| format!("reading checkpoint {}", checkpoint_path.display()))?;

    let settings = config.run_settings();
    let source = TaxiiSource::new(config)?;
    let mut run = PollRun::new(source, state, now_millis(), &settings);

    let mut writer = BufWriter::new(out);
    let mut count = 0;
    let outcome = loop {
        match run.next().await {
            Ok(Some(indicator)) => {
                let mut line = serde_json::to_string(&indicator)?;
                line.push('\n');
                writer.write_all(line.as_bytes()).await?;
                count += 1;
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    writer.flush().await?;

    let state = run.finish();
    checkpoint::save(checkpoint_path, &state)
        .await
        .with_context(|| format!("writing checkpoint {}", checkpoint_path.display()))?;

    outcome.context("poll run failed")?;
    Ok(count)
}
