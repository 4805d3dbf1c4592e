//! File encryption/decryption operations
//!
//! Binds key derivation and the container codec to the filesystem. Output is
//! always staged in a temporary file next to its destination and renamed into
//! place only once the whole operation has succeeded, so a failed decryption
//! never leaves plaintext behind.

use crate::config::{ENCRYPTED_SUFFIX, RESTORED_MARKER, TransformOptions};
use crate::error::{ErrorCategory, ErrorKind, GcmboxError, Result, read_error, write_error};
use crate::gcmcrypt;
use crate::kdf::{self, SymmetricKey};
use crate::passphrase::PassphraseReader;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Encrypt a file with a passphrase
///
/// Reads plaintext from `input_path` in bounded chunks and writes the
/// container to `input_path` + `.gcm`. Returns the output path.
///
/// The output file is created with mode 0o600 (read/write for owner only) on
/// Unix systems.
pub fn encrypt_file(
    input_path: &Path,
    passphrase_reader: &mut dyn PassphraseReader,
    options: TransformOptions,
) -> Result<PathBuf> {
    let output_path = encrypted_path(input_path);
    let mut input = open_input(input_path)?;
    let key = read_key(passphrase_reader)?;
    check_target(&output_path, options)?;

    debug!(input = %input_path.display(), output = %output_path.display(), "encrypting");
    let len = write_staged(&output_path, options, |out| {
        gcmcrypt::encrypt_stream(&key, &mut input, out)
            .map_err(|e| e.with_context(format!("failed to encrypt {}", input_path.display())))
    })?;
    debug!(bytes = len, output = %output_path.display(), "encrypted");

    Ok(output_path)
}

/// Decrypt a file with a passphrase
///
/// `input_path` must end in `.gcm`. The plaintext is written next to it under
/// the name given by [`restored_path`], but only after the authentication
/// tag has been verified; on any failure no output file appears and an
/// existing file at the output path is left untouched.
///
/// The output file is created with mode 0o600 (read/write for owner only) on
/// Unix systems.
pub fn decrypt_file(
    input_path: &Path,
    passphrase_reader: &mut dyn PassphraseReader,
    options: TransformOptions,
) -> Result<PathBuf> {
    let output_path = restored_path(input_path)?;
    let mut input = open_input(input_path)?;
    let key = read_key(passphrase_reader)?;
    check_target(&output_path, options)?;

    debug!(input = %input_path.display(), output = %output_path.display(), "decrypting");
    let len = write_staged(&output_path, options, |out| {
        gcmcrypt::decrypt_stream(&key, &mut input, out)
            .map_err(|e| e.with_context(format!("failed to decrypt {}", input_path.display())))
    })?;
    debug!(bytes = len, output = %output_path.display(), "decrypted");

    Ok(output_path)
}

/// Path an encrypted copy of `input_path` is written to: the input path with
/// `.gcm` appended.
pub fn encrypted_path(input_path: &Path) -> PathBuf {
    let mut path = input_path.as_os_str().to_os_string();
    path.push(ENCRYPTED_SUFFIX);
    PathBuf::from(path)
}

/// Path a decrypted copy of `input_path` is written to.
///
/// The `.gcm` suffix is removed and `_restored` is inserted before the last
/// extension of what remains: `photo.jpg.gcm` becomes `photo_restored.jpg`,
/// `notes.gcm` becomes `notes_restored`.
pub fn restored_path(input_path: &Path) -> Result<PathBuf> {
    let name = input_path
        .file_name()
        .ok_or_else(|| GcmboxError::invalid_input(format!("{} is not a file", input_path.display())))?
        .to_str()
        .ok_or_else(|| {
            GcmboxError::invalid_input(format!(
                "file name of {} is not valid UTF-8",
                input_path.display()
            ))
        })?;

    let stem = name
        .strip_suffix(ENCRYPTED_SUFFIX)
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| {
            GcmboxError::invalid_input(format!(
                "{} is not a {} file",
                input_path.display(),
                ENCRYPTED_SUFFIX
            ))
        })?;

    let restored = match stem.rfind('.') {
        Some(dot) if dot > 0 => format!("{}{}{}", &stem[..dot], RESTORED_MARKER, &stem[dot..]),
        _ => format!("{}{}", stem, RESTORED_MARKER),
    };
    Ok(input_path.with_file_name(restored))
}

fn open_input(path: &Path) -> Result<File> {
    let file = File::open(path).map_err(|e| {
        GcmboxError::with_source(
            ErrorCategory::User,
            ErrorKind::InvalidInput,
            format!("cannot read {}", path.display()),
            e,
        )
    })?;
    let metadata = file.metadata().map_err(|e| read_error(path, e))?;
    if !metadata.is_file() {
        return Err(GcmboxError::invalid_input(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    Ok(file)
}

/// Read the passphrase and derive the key. The passphrase is wiped when it
/// goes out of scope at the end of this function.
fn read_key(passphrase_reader: &mut dyn PassphraseReader) -> Result<SymmetricKey> {
    let passphrase = passphrase_reader.read_passphrase()?;
    if passphrase.is_empty() {
        return Err(GcmboxError::invalid_input("passphrase must not be empty"));
    }
    kdf::derive_key(&passphrase)
}

fn check_target(output_path: &Path, options: TransformOptions) -> Result<()> {
    if !options.overwrite && output_path.exists() {
        return Err(GcmboxError::invalid_input(format!(
            "refusing to overwrite existing {}",
            output_path.display()
        )));
    }
    Ok(())
}

/// Run `fill` against a temporary file beside `output_path`, then flush,
/// fsync and rename it into place. If `fill` fails the temporary file is
/// removed and `output_path` is never touched.
fn write_staged<F>(output_path: &Path, options: TransformOptions, fill: F) -> Result<u64>
where
    F: FnOnce(&mut dyn Write) -> Result<u64>,
{
    let dir = parent_dir(output_path);
    let mut temp_file = tempfile::Builder::new()
        .prefix(".gcmbox-")
        .tempfile_in(dir)
        .map_err(|e| GcmboxError::io(format!("failed to create tempfile in {}", dir.display()), e))?;

    let filled = fill_and_sync(&mut temp_file, output_path, fill);
    let len = match filled {
        Ok(len) => len,
        Err(err) => {
            discard(temp_file);
            return Err(err);
        }
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        if let Err(e) = temp_file.as_file().set_permissions(perms) {
            discard(temp_file);
            return Err(GcmboxError::io("failed to set tempfile permissions", e));
        }
    }

    let persisted = if options.overwrite {
        temp_file.persist(output_path)
    } else {
        temp_file.persist_noclobber(output_path)
    };
    persisted.map_err(|e| {
        let exists = e.error.kind() == std::io::ErrorKind::AlreadyExists;
        let msg = format!("failed to rename to target file {}", output_path.display());
        // Dropping `e` drops the temporary file with it.
        if exists {
            GcmboxError::with_source(ErrorCategory::User, ErrorKind::InvalidInput, msg, e.error)
        } else {
            GcmboxError::io(msg, e.error)
        }
    })?;

    Ok(len)
}

fn fill_and_sync<F>(temp_file: &mut NamedTempFile, output_path: &Path, fill: F) -> Result<u64>
where
    F: FnOnce(&mut dyn Write) -> Result<u64>,
{
    let mut writer = BufWriter::new(temp_file.as_file_mut());
    let len = fill(&mut writer)?;
    writer.flush().map_err(|e| write_error(output_path, e))?;
    drop(writer);

    // fsync so that the rename, if it succeeds, always points at complete
    // contents.
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| GcmboxError::io("failed to sync file prior to rename", e))?;
    Ok(len)
}

fn discard(temp_file: NamedTempFile) {
    let path = temp_file.path().to_path_buf();
    if let Err(e) = temp_file.close() {
        warn!(path = %path.display(), error = %e, "failed to remove tempfile");
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}
