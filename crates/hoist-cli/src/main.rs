//! hoist CLI tool.

use clap::{Parser, Subcommand};
use hoist_core::manifest::MANIFEST_FILE_NAME;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "hoist")]
#[command(about = "hoist CI operator tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt and decrypt secret envelopes
    Secret {
        /// Decryption key (32 bytes)
        #[arg(long, env = "SECRET_DECRYPTION_KEY", hide_env_values = true)]
        key: String,

        #[command(subcommand)]
        command: SecretCommands,
    },
    /// Inspect build manifests
    Manifest {
        #[command(subcommand)]
        command: ManifestCommands,
    },
}

#[derive(Subcommand)]
enum SecretCommands {
    /// Encrypt a value into an envelope
    Encrypt {
        /// Plaintext value
        value: String,
    },
    /// Decrypt an envelope
    Decrypt {
        /// Envelope, or a bare `nonce.ciphertext` pair
        envelope: String,
    },
}

#[derive(Subcommand)]
enum ManifestCommands {
    /// Resolve a manifest and print the result
    Validate {
        /// Path to the manifest
        #[arg(default_value = MANIFEST_FILE_NAME)]
        path: String,
    },
    /// Preview the version a build would get
    Version {
        /// Path to the manifest
        #[arg(default_value = MANIFEST_FILE_NAME)]
        path: String,
        /// Branch being built
        #[arg(long, default_value = "master")]
        branch: String,
        /// Revision being built
        #[arg(long, default_value = "")]
        revision: String,
        /// Autoincrement counter value
        #[arg(long, default_value = "1")]
        auto_increment: i64,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Secret { key, command } => match command {
            SecretCommands::Encrypt { value } => {
                println!("{}", commands::secret::encrypt(&key, &value)?);
            }
            SecretCommands::Decrypt { envelope } => {
                println!("{}", commands::secret::decrypt(&key, &envelope)?);
            }
        },
        Commands::Manifest { command } => match command {
            ManifestCommands::Validate { path } => {
                print!("{}", commands::manifest::validate(&path)?);
            }
            ManifestCommands::Version {
                path,
                branch,
                revision,
                auto_increment,
            } => {
                let version =
                    commands::manifest::version(&path, branch, revision, auto_increment)?;
                println!("{}", version);
            }
        },
    }

    Ok(())
}
