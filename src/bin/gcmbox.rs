//! gcmbox CLI - Passphrase-based file encryption
//!
//! Command-line front end for encrypting and decrypting single files with
//! AES-128-GCM under a passphrase-derived key.

use clap::{ArgAction, Parser, Subcommand};
use std::error::Error as StdError;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use gcmbox::file_ops;
use gcmbox::passphrase::{PassphraseReader, ReaderPassphraseReader, TerminalPassphraseReader};
use gcmbox::{ErrorKind, GcmboxError, TransformOptions};

/// Environment variable holding a tracing filter directive, e.g. `debug`.
const LOG_ENV: &str = "GCMBOX_LOG";

#[derive(Parser)]
#[command(name = "gcmbox")]
#[command(version)]
#[command(about = "Passphrase-based file encryption.", long_about = None)]
struct Cli {
    /// Read passphrase from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    /// Log more detail to stderr (-v for info, -vv for debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file, writing FILE.gcm next to it
    #[command(alias = "e")]
    Encrypt {
        /// Path to the file whose contents is to be encrypted
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Fail instead of replacing an existing output file
        #[arg(long)]
        no_clobber: bool,
    },

    /// Decrypt a .gcm file, writing the restored file next to it
    #[command(alias = "d")]
    Decrypt {
        /// Path to the .gcm file whose contents is to be decrypted
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Fail instead of replacing an existing output file
        #[arg(long)]
        no_clobber: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut reader = get_passphrase_reader(cli.passphrase_stdin);
    let result = match cli.command {
        Commands::Encrypt { input, no_clobber } => {
            file_ops::encrypt_file(&input, &mut *reader, options(no_clobber))
        }
        Commands::Decrypt { input, no_clobber } => {
            file_ops::decrypt_file(&input, &mut *reader, options(no_clobber))
        }
    };

    match result {
        Ok(output) => println!("{}", output.display()),
        Err(e) => {
            eprintln!("Error: {}", render(&e));
            process::exit(1);
        }
    }
}

fn options(no_clobber: bool) -> TransformOptions {
    TransformOptions {
        overwrite: !no_clobber,
    }
}

fn get_passphrase_reader(use_stdin: bool) -> Box<dyn PassphraseReader> {
    if use_stdin {
        Box::new(ReaderPassphraseReader::new(std::io::stdin()))
    } else {
        Box::new(TerminalPassphraseReader::new())
    }
}

/// `GCMBOX_LOG` takes precedence over `-v` when set.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Authentication failures get one fixed message; everything else shows the
/// full chain of causes.
fn render(err: &GcmboxError) -> String {
    if err.kind == ErrorKind::AuthenticationFailure {
        return "decryption failed: wrong passphrase or file modified".to_string();
    }

    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
