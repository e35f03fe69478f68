//! CLI entry point for `mailgrab`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{debug, error};

use mailgrab::record::LogLevel;
use mailgrab::{
    load_or_init, vault, AuthSession, CliOverrides, Downloader, GmailClient, RecordKeeper,
    VAULT_KEY_ENV_VAR,
};

#[derive(Parser)]
#[command(name = "mailgrab", version, about = "Search Gmail and download matching attachments")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the YAML config file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Gmail search query (overrides the config value)
    #[arg(short, long)]
    query: Option<String>,

    /// Comma-separated extension allow-list, e.g. ".pdf,.docx"
    #[arg(short = 't', long = "file-types")]
    file_types: Option<String>,

    /// Run the full pipeline without writing any attachment files
    #[arg(short, long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a credential file for at-rest storage
    Encrypt {
        /// Plaintext credential JSON to encrypt
        #[arg(short, long)]
        file: PathBuf,
        /// Output path (defaults to `<file>.encrypted`)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Derive the key from this password instead of generating
        /// a random one
        #[arg(short, long)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging();

    let result = match cli.command {
        Some(Commands::Encrypt {
            ref file,
            ref output,
            ref password,
        }) => run_encrypt(file, output.as_deref(), password.as_deref()),
        None => run_download(&cli).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_encrypt(
    file: &std::path::Path,
    output: Option<&std::path::Path>,
    password: Option<&str>,
) -> mailgrab::Result<()> {
    let (output, key_hex) = vault::encrypt_file(file, output, password)?;
    println!("Encrypted credentials written to {}", output.display());
    println!("Encryption key (store it somewhere safe):");
    println!("  {}", key_hex);
    println!();
    println!("To use it without a prompt:");
    println!("  export {}={}", VAULT_KEY_ENV_VAR, key_hex);
    Ok(())
}

async fn run_download(cli: &Cli) -> mailgrab::Result<()> {
    let mut config = load_or_init(&cli.config)?;
    config.apply_overrides(&CliOverrides {
        query: cli.query.clone(),
        file_types: cli.file_types.clone(),
        dry_run: cli.dry_run,
    });
    debug!("Loaded config from {}", cli.config.display());

    let keeper = RecordKeeper::new(&config)?;

    let run = async {
        // The unlocked guard stays in scope for the whole run so an
        // ephemeral decrypted copy outlives every read of it, then
        // disappears when we return.
        let unlocked = vault::unlock(&config)?;
        let session = AuthSession::load(unlocked.path(), config.token_path())?;
        let access_token = session.authenticate().await?;
        let client = GmailClient::new(access_token)?;

        Downloader::new(&client, &keeper, &config).run().await?;
        Ok(())
    };

    match run.await {
        Ok(()) => Ok(()),
        Err(e) => {
            // Error messages never include credential material.
            let _ = keeper.log_event(LogLevel::Error, &format!("Run aborted: {}", e));
            Err(e)
        }
    }
}

/// Tracing to stderr, filterable with RUST_LOG. `log` macro calls
/// from the library are bridged in.
fn setup_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let _ = tracing_log::LogTracer::init();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}
