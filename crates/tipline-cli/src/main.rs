//! Tipline CLI - admin and operations tool for the source identity subsystem.
//!
//! This is the command-line interface for Tipline. It exercises the core
//! library against a deployment: database initialization, passphrase
//! generation, source registration, and journalist 2FA management.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use dialoguer::Password;
use serde::Deserialize;
use zeroize::Zeroizing;

use tipline_core::storage::Database;
use tipline_core::{
    authenticate_source_user, create_source_user, journalist, Config, DesignationGenerator,
    DicewarePassphrase, Filestore, PassphraseGenerator, ScryptManager, SqliteDatabase, VERSION,
};

/// Tipline - source identity and session security administration
#[derive(Parser)]
#[command(name = "tipline")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the deployment config file
    #[arg(short, long, global = true, env = "TIPLINE_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and storage directory
    Init,

    /// Generate diceware passphrases without touching the database
    Passphrase {
        /// Word list language (defaults to the configured fallback)
        #[arg(short, long)]
        language: Option<String>,

        /// Number of passphrases to generate
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },

    /// Register a new source and print their credentials
    AddSource,

    /// Verify a source passphrase (prompts; never passed as an argument)
    CheckPassphrase,

    /// Enroll a journalist with a fresh TOTP secret
    AddJournalist {
        /// Username for the new account
        #[arg(value_name = "USERNAME")]
        username: String,
    },

    /// Replace a journalist's TOTP secret
    ResetTotp {
        /// Username of the account
        #[arg(value_name = "USERNAME")]
        username: String,
    },

    /// Enroll a journalist with a hardware HOTP token
    SetHotp {
        /// Username of the account
        #[arg(value_name = "USERNAME")]
        username: String,
    },

    /// Show a journalist's TOTP provisioning URI
    ProvisioningUri {
        /// Username of the account
        #[arg(value_name = "USERNAME")]
        username: String,
    },

    /// Verify a journalist's OTP token
    VerifyToken {
        /// Username of the account
        #[arg(value_name = "USERNAME")]
        username: String,

        /// The six-digit token to check
        #[arg(value_name = "TOKEN")]
        token: String,
    },
}

/// On-disk deployment config: the core settings plus the database location.
#[derive(Debug, Deserialize)]
struct CliConfig {
    /// Path to the SQLite database.
    database: PathBuf,

    #[serde(flatten)]
    core: Config,
}

fn read_config(path: &Path) -> anyhow::Result<CliConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
    toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))
}

fn load_config(cli_config: &Option<String>) -> anyhow::Result<CliConfig> {
    let path = cli_config
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("No config provided. Use --config or TIPLINE_CONFIG."))?;
    read_config(Path::new(path))
}

fn open_database(config: &CliConfig) -> anyhow::Result<SqliteDatabase> {
    Ok(SqliteDatabase::open(&config.database)?)
}

fn lookup_journalist(
    db: &SqliteDatabase,
    username: &str,
) -> anyhow::Result<tipline_core::storage::Journalist> {
    db.get_journalist_by_username(username)?
        .ok_or_else(|| anyhow::anyhow!("No journalist named \"{}\"", username))
}

fn prompt_passphrase() -> anyhow::Result<DicewarePassphrase> {
    let entered = Zeroizing::new(
        Password::new()
            .with_prompt("Passphrase")
            .interact()
            .map_err(|e| anyhow::anyhow!("Failed to read passphrase: {}", e))?,
    );
    Ok(DicewarePassphrase::new(entered.trim()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let config = load_config(&cli.config)?;
            if !config.core.store_dir.is_dir() {
                std::fs::create_dir_all(&config.core.store_dir).map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to create store directory {}: {}",
                        config.core.store_dir.display(),
                        e
                    )
                })?;
            }
            // Validates the word lists and scrypt parameters up front so a
            // broken deployment fails here, not on first registration.
            PassphraseGenerator::from_config(&config.core)?;
            DesignationGenerator::from_config(&config.core)?;
            ScryptManager::from_config(&config.core)?;
            open_database(&config)?;

            if !cli.quiet {
                println!("Initialized database at {}", config.database.display());
            }
        }
        Commands::Passphrase { language, count } => {
            let config = load_config(&cli.config)?;
            let generator = PassphraseGenerator::from_config(&config.core)?;
            if let Some(language) = language.as_deref() {
                let available = generator.available_languages();
                if !available.contains(&language) {
                    return Err(anyhow::anyhow!(
                        "No word list for language \"{}\"; available: {}",
                        language,
                        available.join(", ")
                    ));
                }
            }
            for _ in 0..count {
                let passphrase = generator.generate_passphrase(language.as_deref());
                println!("{}", passphrase.as_str());
            }
        }
        Commands::AddSource => {
            let config = load_config(&cli.config)?;
            let db = open_database(&config)?;
            let filestore = Filestore::from_config(&config.core)?;
            let scrypt_manager = ScryptManager::from_config(&config.core)?;
            let designations = DesignationGenerator::from_config(&config.core)?;
            let passphrases = PassphraseGenerator::from_config(&config.core)?;

            let passphrase = passphrases.generate_passphrase(None);
            let source_user = create_source_user(
                &db,
                &passphrase,
                &filestore,
                &scrypt_manager,
                &designations,
            )?;
            let record = source_user.get_db_record(&db)?;

            // The passphrase is the source's only credential; it is shown
            // exactly once and stored nowhere.
            println!("Designation: {}", record.journalist_designation);
            println!("Passphrase:  {}", passphrase.as_str());
        }
        Commands::CheckPassphrase => {
            let config = load_config(&cli.config)?;
            let db = open_database(&config)?;
            let scrypt_manager = ScryptManager::from_config(&config.core)?;

            let passphrase = prompt_passphrase()?;
            let source_user = authenticate_source_user(&db, &passphrase, &scrypt_manager)?;
            let record = source_user.get_db_record(&db)?;

            if !cli.quiet {
                println!("Valid passphrase for {}", record.journalist_designation);
            }
        }
        Commands::AddJournalist { username } => {
            let config = load_config(&cli.config)?;
            let db = open_database(&config)?;

            let record = journalist::enroll_journalist(&db, &username)?;
            let uri = journalist::get_totp_provisioning_uri(&record)?;

            println!("Enrolled {}", record.username);
            println!("{}", uri);
        }
        Commands::ResetTotp { username } => {
            let config = load_config(&cli.config)?;
            let db = open_database(&config)?;

            let record = lookup_journalist(&db, &username)?;
            journalist::regenerate_totp_secret(&db, &record)?;
            let record = lookup_journalist(&db, &username)?;
            let uri = journalist::get_totp_provisioning_uri(&record)?;

            println!("Reset TOTP secret for {}", record.username);
            println!("{}", uri);
        }
        Commands::SetHotp { username } => {
            let config = load_config(&cli.config)?;
            let db = open_database(&config)?;
            let record = lookup_journalist(&db, &username)?;

            let secret_as_hex = Zeroizing::new(
                Password::new()
                    .with_prompt("HOTP secret (40 hex characters)")
                    .interact()
                    .map_err(|e| anyhow::anyhow!("Failed to read secret: {}", e))?,
            );
            journalist::set_hotp_secret(&db, &record, secret_as_hex.trim())?;

            if !cli.quiet {
                println!("Enrolled HOTP token for {}", record.username);
            }
        }
        Commands::ProvisioningUri { username } => {
            let config = load_config(&cli.config)?;
            let db = open_database(&config)?;

            let record = lookup_journalist(&db, &username)?;
            let uri = journalist::get_totp_provisioning_uri(&record)?;
            println!("{}", uri);
        }
        Commands::VerifyToken { username, token } => {
            let config = load_config(&cli.config)?;
            let db = open_database(&config)?;

            let record = lookup_journalist(&db, &username)?;
            journalist::verify_journalist_2fa(&db, &record, &token)?;
            if !cli.quiet {
                println!("Token is valid");
            }
        }
    }

    Ok(())
}
