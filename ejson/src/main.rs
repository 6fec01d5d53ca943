//! `ejson` command line: key generation and whole-file encryption and
//! decryption on top of the library.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use zeroize::Zeroizing;

use ejson::config::Config;
use ejson::keydir::KeyDir;
use ejson::{decrypt_file, encrypt_file, generate_keypair, PrivateKeySource};

/// Manage encrypted secrets in JSON files using public-key cryptography
#[derive(Parser, Debug)]
#[command(name = "ejson", author, version, about, long_about = None)]
struct Args {
    /// Directory containing private key files (default: $EJSON_KEYDIR or /opt/ejson/keys)
    #[arg(short, long, global = true)]
    keydir: Option<PathBuf>,

    /// Optional JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new EJSON keypair
    Keygen {
        /// Write the private key to the key directory and print only the public key.
        /// With `passphrase_env` configured the key file is a passphrase-wrapped
        /// JSON envelope that other EJSON implementations cannot read
        #[arg(short, long)]
        write: bool,
    },
    /// (Re-)encrypt one or more EJSON files
    Encrypt {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write the result here instead of back into the input file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Decrypt an EJSON file
    Decrypt {
        file: PathBuf,

        /// Print the output to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Read the private key from stdin instead of the key directory
        #[arg(long)]
        key_from_stdin: bool,
    },
}

fn init_tracing(log_level: &str) {
    let log_level: tracing::Level = log_level.parse().unwrap_or(tracing::Level::WARN);
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config =
        Config::load(args.keydir, args.config.as_deref()).context("loading configuration")?;

    match args.command {
        Command::Keygen { write } => keygen(&config, write),
        Command::Encrypt { files, output } => encrypt(&files, output),
        Command::Decrypt {
            file,
            output,
            key_from_stdin,
        } => decrypt(&config, file, output, key_from_stdin),
    }
}

/// With `write`, the private key lands in the key directory. A configured
/// passphrase wraps it, and the wrapped file is only readable by this tool.
fn keygen(config: &Config, write: bool) -> Result<()> {
    let pair = generate_keypair().context("generating keypair")?;
    if write {
        let passphrase = config.passphrase()?.map(Zeroizing::new);
        let keydir = KeyDir::new(&config.keydir);
        let path = keydir
            .write_keypair(&pair, passphrase.as_deref().map(String::as_str))
            .context("storing private key")?;
        tracing::info!(path = %path.display(), "wrote private key");
        println!("{}", pair.public_hex());
    } else {
        println!(
            "Public Key:\n{}\nPrivate Key:\n{}",
            pair.public_hex(),
            pair.private_hex()
        );
    }
    Ok(())
}

fn encrypt(files: &[PathBuf], output: Option<PathBuf>) -> Result<()> {
    if output.is_some() && files.len() > 1 {
        bail!("--output can only be used with a single input file");
    }
    for file in files {
        let bytes = encrypt_file(file, output.as_deref())
            .with_context(|| format!("encrypting {}", file.display()))?;
        let target = output.as_ref().unwrap_or(file);
        println!("Wrote {bytes} bytes to {}.", target.display());
    }
    Ok(())
}

fn decrypt(
    config: &Config,
    file: PathBuf,
    output: Option<PathBuf>,
    key_from_stdin: bool,
) -> Result<()> {
    let plaintext = if key_from_stdin {
        let mut private_hex = Zeroizing::new(String::new());
        std::io::stdin()
            .read_to_string(&mut private_hex)
            .context("reading private key from stdin")?;
        decrypt_file(&file, PrivateKeySource::Literal(&private_hex), output.as_deref())
    } else {
        let passphrase = config.passphrase()?.map(Zeroizing::new);
        let keydir = KeyDir::new(&config.keydir);
        decrypt_file(
            &file,
            PrivateKeySource::KeyDir {
                keydir: &keydir,
                passphrase: passphrase.as_deref().map(String::as_str),
            },
            output.as_deref(),
        )
    }
    .with_context(|| format!("decrypting {}", file.display()))?;

    if output.is_none() {
        print!("{plaintext}");
    }
    Ok(())
}
