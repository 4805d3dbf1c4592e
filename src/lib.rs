//! gcmbox - Passphrase-based file encryption using AES-128-GCM

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod file_ops;
pub mod gcmcrypt;
pub mod kdf;
pub mod passphrase;

pub use config::TransformOptions;
pub use error::{ErrorCategory, ErrorKind, GcmboxError, Result};
