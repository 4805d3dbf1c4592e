//! Passphrase sources

use crate::error::{ErrorCategory, ErrorKind, GcmboxError, Result};
use std::io::{self, IsTerminal, Read, Write};
use zeroize::Zeroizing;

/// Trait for reading passphrases from various sources
pub trait PassphraseReader {
    /// Read a passphrase as arbitrary bytes (not necessarily UTF-8)
    ///
    /// Returns the passphrase wrapped in `Zeroizing` so it is wiped from
    /// memory when dropped.
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>>;
}

/// Returns a fixed passphrase. Used by library callers that already hold
/// the passphrase, and by tests.
pub struct ConstantPassphraseReader {
    passphrase: Zeroizing<Vec<u8>>,
}

impl ConstantPassphraseReader {
    pub fn new(passphrase: impl Into<Vec<u8>>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
        }
    }
}

impl PassphraseReader for ConstantPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(self.passphrase.clone())
    }
}

/// Reads the entire contents of an `io::Read` source as the passphrase.
///
/// No trimming is done: a trailing newline is part of the passphrase.
pub struct ReaderPassphraseReader<R> {
    reader: R,
}

impl<R: Read> ReaderPassphraseReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read> PassphraseReader for ReaderPassphraseReader<R> {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader
            .read_to_end(&mut data)
            .map_err(|e| GcmboxError::io(format!("error reading passphrase: {}", e), e))?;
        Ok(data)
    }
}

/// Reads passphrase from terminal with no echo
#[derive(Default)]
pub struct TerminalPassphraseReader;

impl TerminalPassphraseReader {
    pub fn new() -> Self {
        Self
    }
}

impl PassphraseReader for TerminalPassphraseReader {
    /// Read passphrase from terminal.
    ///
    /// Terminal input is limited to UTF-8 by rpassword. For other byte
    /// sequences use `--passphrase-stdin`.
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        if !io::stdin().is_terminal() {
            return Err(GcmboxError::new(
                ErrorCategory::User,
                ErrorKind::InvalidInput,
                "cannot read passphrase from terminal - stdin is not a terminal",
            ));
        }

        let mut stderr = io::stderr();
        stderr
            .write_all(b"Passphrase (gcmbox): ")
            .and_then(|()| stderr.flush())
            .map_err(|e| GcmboxError::io(format!("failed to write prompt: {}", e), e))?;

        // rpassword hands back a plain String; move it straight into
        // zeroizing storage.
        let passphrase = rpassword::read_password()
            .map_err(|e| GcmboxError::io(format!("failure reading passphrase: {}", e), e))?;

        Ok(Zeroizing::new(passphrase.into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_reader() {
        let mut reader = ConstantPassphraseReader::new(b"test123".to_vec());
        assert_eq!(&*reader.read_passphrase().unwrap(), b"test123");
        assert_eq!(&*reader.read_passphrase().unwrap(), b"test123");
    }

    #[test]
    fn test_constant_reader_from_str() {
        let mut reader = ConstantPassphraseReader::new("secret");
        assert_eq!(&*reader.read_passphrase().unwrap(), b"secret");
    }

    /// Tests the terminal reader. Ignored by default; run explicitly with
    /// human input:
    ///
    /// cargo test test_terminal_reader_interactive -- --ignored --nocapture
    #[test]
    #[ignore]
    fn test_terminal_reader_interactive() {
        let mut reader = TerminalPassphraseReader::new();
        println!("\nPlease enter a test passphrase:");
        let passphrase = reader.read_passphrase().unwrap();
        assert!(!passphrase.is_empty(), "Expected non-empty passphrase");
    }

    #[test]
    fn test_reader_passphrase_reader() {
        let data = b"mypassword";
        let mut reader = ReaderPassphraseReader::new(&data[..]);
        assert_eq!(&*reader.read_passphrase().unwrap(), b"mypassword");
    }

    #[test]
    fn test_reader_keeps_trailing_newline() {
        let data = b"mypassword\n";
        let mut reader = ReaderPassphraseReader::new(&data[..]);
        assert_eq!(&*reader.read_passphrase().unwrap(), b"mypassword\n");
    }

    #[test]
    fn test_reader_passphrase_reader_empty() {
        let data = b"";
        let mut reader = ReaderPassphraseReader::new(&data[..]);
        assert_eq!(&*reader.read_passphrase().unwrap(), b"");
    }

    #[test]
    fn test_reader_passphrase_reader_non_utf8() {
        let data: &[u8] = &[0xff, 0xfe, 0x00, 0x01];
        let mut reader = ReaderPassphraseReader::new(data);
        assert_eq!(&*reader.read_passphrase().unwrap(), data);
    }

    #[test]
    fn test_reader_error_is_io() {
        struct Broken;

        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("pipe closed"))
            }
        }

        let mut reader = ReaderPassphraseReader::new(Broken);
        let err = reader.read_passphrase().expect_err("expected read failure");
        assert_eq!(err.kind, ErrorKind::Io);
    }
}
