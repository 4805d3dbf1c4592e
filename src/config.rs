//! Naming conventions and tunables shared by the file operations.

/// Suffix appended to the source path when encrypting.
pub const ENCRYPTED_SUFFIX: &str = ".gcm";

/// Marker inserted into the file stem of a decrypted output.
pub const RESTORED_MARKER: &str = "_restored";

/// Number of bytes read from the input per cipher step.
pub const CHUNK_SIZE: usize = 4096;

/// Options controlling how file operations write their output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOptions {
    /// Replace an existing file at the output path. When false, an existing
    /// output makes the operation fail before anything is written.
    pub overwrite: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self { overwrite: true }
    }
}
