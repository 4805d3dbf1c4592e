//! CLI integration tests
//!
//! Tests the command-line interface end-to-end.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Run gcmbox with passphrase from stdin
fn run_gcmbox_with_passphrase(args: &[&str], passphrase: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_gcmbox"))
        .arg("--passphrase-stdin")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn gcmbox");

    {
        let stdin = child.stdin.as_mut().expect("failed to open stdin");
        // The command may exit before reading stdin if it fails early.
        let _ = stdin.write_all(passphrase.as_bytes());
    }

    child.wait_with_output().expect("failed to wait for gcmbox")
}

fn testdata_path(filename: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("testdata");
    path.push(filename);
    path
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("temp paths are UTF-8")
}

fn stdout_path(output: &Output) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&output.stdout).trim_end())
}

/// Decrypt a container produced by an independent AES-GCM implementation.
#[test]
fn test_decrypt_known_ciphertext() {
    let temp_dir = TempDir::new().unwrap();
    let crypt_path = temp_dir.path().join("hello.txt.gcm");
    fs::copy(testdata_path("hello.txt.gcm"), &crypt_path).unwrap();

    let result = run_gcmbox_with_passphrase(&["decrypt", path_arg(&crypt_path)], "test");
    assert!(
        result.status.success(),
        "decrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    let restored = temp_dir.path().join("hello_restored.txt");
    assert_eq!(stdout_path(&result), restored);
    assert_eq!(
        fs::read(&restored).unwrap(),
        fs::read(testdata_path("hello.txt")).unwrap()
    );
}

#[test]
fn test_encrypt_decrypt_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let plain_path = temp_dir.path().join("photo.jpg");
    fs::copy(testdata_path("hello.txt"), &plain_path).unwrap();

    let result = run_gcmbox_with_passphrase(&["encrypt", path_arg(&plain_path)], "test");
    assert!(
        result.status.success(),
        "encrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    let crypt_path = temp_dir.path().join("photo.jpg.gcm");
    assert_eq!(stdout_path(&result), crypt_path);

    let result = run_gcmbox_with_passphrase(&["d", path_arg(&crypt_path)], "test");
    assert!(
        result.status.success(),
        "decrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    let restored = temp_dir.path().join("photo_restored.jpg");
    assert_eq!(fs::read(&restored).unwrap(), fs::read(&plain_path).unwrap());
}

#[test]
fn test_wrong_passphrase_fails_without_output() {
    let temp_dir = TempDir::new().unwrap();
    let plain_path = temp_dir.path().join("secret.txt");
    fs::write(&plain_path, "Original").unwrap();

    let result = run_gcmbox_with_passphrase(&["encrypt", path_arg(&plain_path)], "correct");
    assert!(result.status.success());

    let crypt_path = temp_dir.path().join("secret.txt.gcm");
    let result = run_gcmbox_with_passphrase(&["decrypt", path_arg(&crypt_path)], "wrong");

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(
        stderr.contains("wrong passphrase or file modified"),
        "Expected authentication failure message, got: {}",
        stderr
    );
    assert!(!temp_dir.path().join("secret_restored.txt").exists());
}

#[test]
fn test_decrypt_requires_gcm_suffix() {
    let temp_dir = TempDir::new().unwrap();
    let plain_path = temp_dir.path().join("plain.txt");
    fs::write(&plain_path, "data").unwrap();

    let result = run_gcmbox_with_passphrase(&["decrypt", path_arg(&plain_path)], "test");
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains(".gcm"));
}

#[test]
fn test_decrypt_nonexistent_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let nonexistent = temp_dir.path().join("nonexistent.gcm");

    let result = run_gcmbox_with_passphrase(&["decrypt", path_arg(&nonexistent)], "test");

    assert!(!result.status.success());
    assert!(!temp_dir.path().join("nonexistent_restored").exists());
}

#[test]
fn test_empty_passphrase_fails() {
    let temp_dir = TempDir::new().unwrap();
    let plain_path = temp_dir.path().join("plain.txt");
    fs::write(&plain_path, "data").unwrap();

    let result = run_gcmbox_with_passphrase(&["encrypt", path_arg(&plain_path)], "");

    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("passphrase"));
    assert!(!temp_dir.path().join("plain.txt.gcm").exists());
}

#[test]
fn test_no_clobber_keeps_existing_output() {
    let temp_dir = TempDir::new().unwrap();
    let plain_path = temp_dir.path().join("plain.txt");
    let crypt_path = temp_dir.path().join("plain.txt.gcm");
    fs::write(&plain_path, "data").unwrap();
    fs::write(&crypt_path, "existing").unwrap();

    let result = run_gcmbox_with_passphrase(
        &["encrypt", "--no-clobber", path_arg(&plain_path)],
        "test",
    );

    assert!(!result.status.success());
    assert_eq!(fs::read_to_string(&crypt_path).unwrap(), "existing");
}

#[test]
fn test_empty_file_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let plain_path = temp_dir.path().join("empty.txt");
    fs::write(&plain_path, b"").unwrap();

    let result = run_gcmbox_with_passphrase(&["encrypt", path_arg(&plain_path)], "test");
    assert!(result.status.success());

    let crypt_path = temp_dir.path().join("empty.txt.gcm");
    assert_eq!(fs::metadata(&crypt_path).unwrap().len(), 28);

    let result = run_gcmbox_with_passphrase(&["decrypt", path_arg(&crypt_path)], "test");
    assert!(result.status.success());
    assert_eq!(
        fs::read(temp_dir.path().join("empty_restored.txt")).unwrap(),
        b""
    );
}

#[test]
fn test_large_file_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let plain_path = temp_dir.path().join("large.bin");
    let large_content = vec![0x42u8; 1024 * 1024 + 7];
    fs::write(&plain_path, &large_content).unwrap();

    let result = run_gcmbox_with_passphrase(&["encrypt", path_arg(&plain_path)], "test");
    assert!(result.status.success());

    let crypt_path = temp_dir.path().join("large.bin.gcm");
    let result = run_gcmbox_with_passphrase(&["decrypt", path_arg(&crypt_path)], "test");
    assert!(result.status.success());

    assert_eq!(
        fs::read(temp_dir.path().join("large_restored.bin")).unwrap(),
        large_content
    );
}
