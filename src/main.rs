use std::cell::RefCell;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use secrecy::SecretString;

use recovery_signer::confirm::{PresetSecret, SecretProvider, TerminalInput};
use recovery_signer::utils::logging;
use recovery_signer::{log_error, log_warn, storage, CoinRegistry, RecoveryError, SigningSession};

/// Offline backup-key cosigner for half-signed recovery transactions
#[derive(Parser)]
#[command(name = "recovery-signer", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign the recovery request in FILE with the backup key
    Sign {
        /// Path to the recovery request JSON
        #[arg(short, long)]
        file: PathBuf,
        /// Backup key secret; prompted for after confirmation when omitted
        #[arg(short, long)]
        key: Option<String>,
        /// Do not wait for the confirmation token
        #[arg(long)]
        no_confirm: bool,
        /// Enable debug logging
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> ExitCode {
    logging::init_from_env();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<RecoveryError>()
                .map(|e| format!("{:?}", e.code))
                .unwrap_or_else(|| "Other".to_string());
            log_error!("cli", "Signing aborted, no result written", code = code);
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Sign { file, key, no_confirm, verbose } => sign(file, key, no_confirm, verbose),
    }
}

fn sign(file: PathBuf, key: Option<String>, no_confirm: bool, verbose: bool) -> Result<()> {
    if verbose {
        logging::enable_debug();
    }

    let request = storage::load_request(&file)?;
    let registry = CoinRegistry::standard();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let terminal = RefCell::new(TerminalInput::stdio());
    let mut confirmations = &terminal;
    let mut prompted = &terminal;
    let mut preset;
    let secrets: &mut dyn SecretProvider = match key {
        Some(key) => {
            log_warn!("cli", "Backup key supplied on the command line; it may persist in shell history");
            preset = PresetSecret::new(SecretString::from(key));
            &mut preset
        }
        None => &mut prompted,
    };

    let signed = SigningSession::new(&registry, &mut out, &mut confirmations, secrets)
        .skip_confirmation(no_confirm)
        .sign(&request)?;

    writeln!(out, "Signed transaction hex: {}", signed.tx_hex)?;
    let path = storage::result_path(&file);
    writeln!(out, "Writing signed transaction to file: {}", path.display())?;
    storage::write_result(&path, &signed)?;
    writeln!(out, "Done")?;
    Ok(())
}
