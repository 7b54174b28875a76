//! Operator Confirmation
//!
//! The single human checkpoint before any signature is produced. Input
//! capture is injected through [`ConfirmationProvider`] and
//! [`SecretProvider`] so tests can feed canned answers.

use std::cell::RefCell;
use std::io::{self, BufRead, Write};

use secrecy::SecretString;

use crate::error::{RecoveryError, RecoveryResult};
use crate::types::Output;

/// The only answer that lets a recovery proceed
pub const CONFIRMATION_TOKEN: &str = "go";

pub const XPRV_PROMPT: &str = "Please enter the xprv of the wallet for signing: ";
pub const FLAT_KEY_PROMPT: &str = "Please enter the private key of the wallet for signing: ";

const BANNER_RULE: &str = "=========================";

/// Supplies one line of operator input for the confirmation checkpoint
pub trait ConfirmationProvider {
    fn read_confirmation(&mut self) -> RecoveryResult<String>;
}

/// Supplies the backup secret after confirmation
pub trait SecretProvider {
    fn read_secret(&mut self, prompt: &str) -> RecoveryResult<SecretString>;
}

/// Line-based terminal input (stdin/stdout in production)
pub struct TerminalInput<R, W> {
    reader: R,
    writer: W,
}

impl TerminalInput<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalInput<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    fn read_line(&mut self) -> RecoveryResult<String> {
        let mut line = String::new();
        self.reader.read_line(&mut line)?;
        Ok(strip_line_ending(line))
    }
}

impl<R: BufRead, W: Write> ConfirmationProvider for TerminalInput<R, W> {
    fn read_confirmation(&mut self) -> RecoveryResult<String> {
        self.read_line()
    }
}

impl<R: BufRead, W: Write> SecretProvider for TerminalInput<R, W> {
    fn read_secret(&mut self, prompt: &str) -> RecoveryResult<SecretString> {
        writeln!(self.writer, "{}", prompt)?;
        self.writer.flush()?;
        self.read_line().map(SecretString::from)
    }
}

/// One terminal answering both the checkpoint and the key prompt
impl<T: ConfirmationProvider> ConfirmationProvider for &RefCell<T> {
    fn read_confirmation(&mut self) -> RecoveryResult<String> {
        self.borrow_mut().read_confirmation()
    }
}

impl<T: SecretProvider> SecretProvider for &RefCell<T> {
    fn read_secret(&mut self, prompt: &str) -> RecoveryResult<SecretString> {
        self.borrow_mut().read_secret(prompt)
    }
}

/// A secret handed over up front (the `--key` flag); usable once
pub struct PresetSecret {
    secret: Option<SecretString>,
}

impl PresetSecret {
    pub fn new(secret: SecretString) -> Self {
        Self { secret: Some(secret) }
    }
}

impl SecretProvider for PresetSecret {
    fn read_secret(&mut self, _prompt: &str) -> RecoveryResult<SecretString> {
        self.secret
            .take()
            .ok_or_else(|| RecoveryError::invalid_key().with_details("pre-supplied key already consumed"))
    }
}

fn strip_line_ending(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

/// Deterministic summary shown before the checkpoint
pub fn render_summary(backup_key: &str, outputs: &[Output], custom_message: &str) -> String {
    let mut summary = String::new();
    summary.push_str("Sign Recovery Transaction\n");
    summary.push_str(BANNER_RULE);
    summary.push('\n');
    summary.push_str(&format!("Backup Key: {}\n", backup_key));
    for output in outputs {
        summary.push_str(&format!("Output Address: {}\n", output.address));
        summary.push_str(&format!("Output Amount: {}\n", output.amount));
    }
    summary.push_str(&format!("Custom Message: {}\n", custom_message));
    summary.push_str(BANNER_RULE);
    summary.push('\n');
    summary
}

/// Print the summary and, unless skipped, require the exact token `go`
pub fn confirm_recovery(
    out: &mut dyn Write,
    input: &mut dyn ConfirmationProvider,
    backup_key: &str,
    outputs: &[Output],
    custom_message: &str,
    skip_confirm: bool,
) -> RecoveryResult<()> {
    out.write_all(render_summary(backup_key, outputs, custom_message).as_bytes())?;

    if skip_confirm {
        out.flush()?;
        return Ok(());
    }

    writeln!(out, "Please type \"{}\" to confirm: ", CONFIRMATION_TOKEN)?;
    out.flush()?;

    let answer = input.read_confirmation()?;
    if answer != CONFIRMATION_TOKEN {
        return Err(RecoveryError::recovery_aborted());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use secrecy::ExposeSecret;
    use std::io::Cursor;

    struct Canned(Option<String>);

    impl ConfirmationProvider for Canned {
        fn read_confirmation(&mut self) -> RecoveryResult<String> {
            self.0.take().ok_or_else(|| RecoveryError::invalid_request("no input expected"))
        }
    }

    fn outputs() -> Vec<Output> {
        vec![Output::new("1BoatSLRHtKNngkdXEeobR76b53LETtpyT", "0.01")]
    }

    fn run(answer: Option<&str>, skip: bool) -> (RecoveryResult<()>, String) {
        let mut out = Vec::new();
        let mut input = Canned(answer.map(str::to_string));
        let result = confirm_recovery(&mut out, &mut input, "xpub-backup", &outputs(), "None", skip);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_summary_layout() {
        let summary = render_summary("xpub-backup", &outputs(), "hello");
        assert_eq!(
            summary,
            "Sign Recovery Transaction\n\
             =========================\n\
             Backup Key: xpub-backup\n\
             Output Address: 1BoatSLRHtKNngkdXEeobR76b53LETtpyT\n\
             Output Amount: 0.01\n\
             Custom Message: hello\n\
             =========================\n"
        );
    }

    #[test]
    fn test_go_proceeds() {
        let (result, printed) = run(Some("go"), false);
        assert!(result.is_ok());
        assert!(printed.contains("Please type \"go\" to confirm"));
    }

    #[test]
    fn test_anything_else_aborts() {
        for answer in ["", "Go", "yes", "go ", " go"] {
            let (result, _) = run(Some(answer), false);
            assert!(result.unwrap_err().is(ErrorCode::RecoveryAborted), "answer {:?}", answer);
        }
    }

    #[test]
    fn test_skip_never_reads_input() {
        let (result, printed) = run(None, true);
        assert!(result.is_ok());
        assert!(!printed.contains("Please type"));
        assert!(printed.contains("Backup Key: xpub-backup"));
    }

    #[test]
    fn test_terminal_input_strips_line_endings() {
        let mut terminal = TerminalInput::new(Cursor::new("go\r\nxprv-secret\n"), Vec::new());
        assert_eq!(terminal.read_confirmation().unwrap(), "go");
        let secret = terminal.read_secret(XPRV_PROMPT).unwrap();
        assert_eq!(secret.expose_secret(), "xprv-secret");
        assert_eq!(String::from_utf8(terminal.writer).unwrap(), format!("{}\n", XPRV_PROMPT));
    }

    #[test]
    fn test_shared_terminal_reads_in_order() {
        let terminal = RefCell::new(TerminalInput::new(Cursor::new("go\nxprv-secret\n"), Vec::new()));
        let mut confirmations = &terminal;
        let mut secrets = &terminal;
        assert_eq!(confirmations.read_confirmation().unwrap(), "go");
        assert_eq!(secrets.read_secret(XPRV_PROMPT).unwrap().expose_secret(), "xprv-secret");
    }

    #[test]
    fn test_preset_secret_is_single_use() {
        let mut preset = PresetSecret::new(SecretString::from("xprv".to_string()));
        assert_eq!(preset.read_secret(XPRV_PROMPT).unwrap().expose_secret(), "xprv");
        assert!(preset.read_secret(XPRV_PROMPT).is_err());
    }
}
