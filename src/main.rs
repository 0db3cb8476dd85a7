use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use qrzsync::db::{self, SqliteImportLedger, SqliteQsoStore};
use qrzsync::error::QrzError;
use qrzsync::qrz::{Credential, FetchOption, QrzClient, SettingsCredentialProvider};
use qrzsync::sync::{ImportRequest, ImportSettings, Importer, LockMode};

/// Import QSOs from a QRZ.com logbook into a local database
#[derive(Parser, Debug)]
#[command(name = "qrzsync")]
#[command(version)]
struct Args {
    /// SQLite database file
    #[arg(long, default_value = "qrzsync.db", env = "QRZSYNC_DB")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the account's logbook and reconcile it into the database
    Import {
        #[arg(long)]
        account: String,

        /// ALL, MODIFIED or RANGE:start:end
        #[arg(long, default_value = "MODIFIED")]
        option: FetchOption,

        /// Logbook id; repeat for several books
        #[arg(long = "book-id")]
        book_ids: Vec<String>,

        /// Report what would be imported without writing
        #[arg(long)]
        dry_run: bool,

        /// Use this key instead of the stored credential
        #[arg(long, env = "QRZ_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// HTTP request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Records per request (MAX); omit to let QRZ decide
        #[arg(long)]
        page_size: Option<usize>,

        #[arg(long, value_enum, default_value = "wait")]
        lock_mode: CliLockMode,
    },
    /// Store QRZ credentials for an account
    SetCredential {
        #[arg(long)]
        account: String,

        #[arg(long, env = "QRZ_API_KEY", hide_env_values = true)]
        api_key: String,

        #[arg(long, default_value = "")]
        username: String,

        #[arg(long, default_value = "")]
        password: String,

        #[arg(long = "book-id")]
        book_ids: Vec<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliLockMode {
    Wait,
    FailFast,
}

impl From<CliLockMode> for LockMode {
    fn from(mode: CliLockMode) -> Self {
        match mode {
            CliLockMode::Wait => LockMode::Wait,
            CliLockMode::FailFast => LockMode::FailFast,
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging - default to info level for our crate
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("qrzsync=info")
    ).init();

    let args = Args::parse();

    match run(args).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(2);
        }
    }
}

/// Ok(false) when the import was aborted or cancelled
async fn run(args: Args) -> Result<bool, QrzError> {
    let pool = db::open_db(&args.db).await?;

    match args.command {
        Command::Import {
            account,
            option,
            book_ids,
            dry_run,
            api_key,
            timeout,
            page_size,
            lock_mode,
        } => {
            let transport = QrzClient::new(Duration::from_secs(timeout))?;
            let importer = Importer::new(
                Arc::new(transport),
                Arc::new(SqliteQsoStore::new(pool.clone())),
                Arc::new(SqliteImportLedger::new(pool.clone())),
                Arc::new(SettingsCredentialProvider::new(pool.clone())),
                ImportSettings {
                    page_size,
                    lock_mode: lock_mode.into(),
                    ..Default::default()
                },
            );

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupted, cancelling import");
                    ctrl_c.cancel();
                }
            });

            let request = ImportRequest {
                account,
                option,
                dry_run,
                credential: api_key.as_deref().map(Credential::from_api_key),
                book_ids,
            };
            let report = importer.import(&request, &cancel).await;

            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| QrzError::Decode(format!("Failed to serialize report: {}", e)))?;
            println!("{}", json);

            pool.close().await;
            Ok(!report.is_aborted() && !report.cancelled)
        }
        Command::SetCredential {
            account,
            api_key,
            username,
            password,
            book_ids,
        } => {
            let provider = SettingsCredentialProvider::new(pool.clone());
            provider
                .store(&account, &Credential::new(&username, &password, &api_key), &book_ids)
                .await?;
            log::info!("Stored QRZ credentials for {}", account);

            pool.close().await;
            Ok(true)
        }
    }
}
