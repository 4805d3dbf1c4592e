//! Encryption/decryption of the AES-128-GCM container
//!
//! The binary format is:
//! - nonce: 12 bytes
//! - ciphertext: exactly as long as the plaintext
//! - tag: 16 bytes
//!
//! The slice functions hand the whole message to `aes-gcm`. The stream
//! functions compute the same GCM construction incrementally (CTR keystream
//! plus GHASH) so that files of any size pass through a fixed-size buffer,
//! and produce byte-identical containers.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use aes_gcm::Aes128Gcm;
use aes_gcm::aead::Aead;
use ghash::GHash;
use ghash::universal_hash::UniversalHash;
use rand::RngCore;
use rand::rngs::OsRng;
use std::io::{self, Read, Write};
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::Zeroize;

use crate::config::CHUNK_SIZE;
use crate::error::{ErrorCategory, ErrorKind, GcmboxError, Result};
use crate::kdf::SymmetricKey;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Length of the authentication tag in bytes
pub const TAG_LEN: usize = 16;

/// Smallest well-formed container: a nonce and a tag around empty ciphertext
pub const MIN_CONTAINER_LEN: usize = NONCE_LEN + TAG_LEN;

/// Longest plaintext GCM can protect under a single nonce
pub const MAX_PLAINTEXT_LEN: u64 = (1 << 36) - 32;

const BLOCK_LEN: usize = 16;

type Aes128Ctr32 = ctr::Ctr32BE<Aes128>;

/// Encrypt `plaintext` under a freshly generated nonce.
///
/// Returns the container: nonce(12) + ciphertext + tag(16).
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let nonce = generate_nonce()?;
    encrypt_with_nonce(key, &nonce, plaintext)
}

/// Encrypt `plaintext` under the provided nonce.
///
/// This function is ONLY for known-answer tests. Reusing a nonce under the
/// same key destroys both confidentiality and integrity; always use
/// [`encrypt`] otherwise.
pub fn encrypt_with_nonce(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    if plaintext.len() as u64 > MAX_PLAINTEXT_LEN {
        return Err(too_long());
    }

    let cipher = <Aes128Gcm as KeyInit>::new(GenericArray::from_slice(key.as_bytes()));
    let sealed = cipher
        .encrypt(aes_gcm::Nonce::from_slice(nonce), plaintext)
        .map_err(|_| too_long())?;

    let mut output = Vec::with_capacity(NONCE_LEN + sealed.len());
    output.extend_from_slice(nonce);
    output.extend_from_slice(&sealed);
    Ok(output)
}

/// Decrypt and verify a container.
///
/// No plaintext is returned unless the tag verifies.
pub fn decrypt(key: &SymmetricKey, container: &[u8]) -> Result<Vec<u8>> {
    if container.len() < MIN_CONTAINER_LEN {
        return Err(too_short(container.len()));
    }

    let (nonce, sealed) = container.split_at(NONCE_LEN);
    let cipher = <Aes128Gcm as KeyInit>::new(GenericArray::from_slice(key.as_bytes()));
    cipher
        .decrypt(aes_gcm::Nonce::from_slice(nonce), sealed)
        .map_err(|_| {
            debug!(len = container.len(), "container failed tag verification");
            GcmboxError::authentication()
        })
}

/// Encrypt everything `reader` yields into `writer` under a fresh nonce.
///
/// Returns the number of plaintext bytes consumed.
pub fn encrypt_stream<R, W>(key: &SymmetricKey, reader: &mut R, writer: &mut W) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let nonce = generate_nonce()?;
    encrypt_stream_with_nonce(key, &nonce, reader, writer)
}

/// Streaming counterpart of [`encrypt_with_nonce`]. Known-answer tests only.
pub fn encrypt_stream_with_nonce<R, W>(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_LEN],
    reader: &mut R,
    writer: &mut W,
) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut gcm = GcmStream::new(key, nonce);
    writer.write_all(nonce).map_err(write_failed)?;

    let mut chunk = vec![0u8; CHUNK_SIZE];
    let result = loop {
        let n = match read_some(reader, &mut chunk) {
            Ok(n) => n,
            Err(e) => break Err(read_failed(e)),
        };
        if n == 0 {
            break Ok(());
        }
        if let Err(e) = gcm.seal(&mut chunk[..n]) {
            break Err(e);
        }
        if let Err(e) = writer.write_all(&chunk[..n]) {
            break Err(write_failed(e));
        }
    };
    chunk.zeroize();
    result?;

    let len = gcm.len;
    let tag = gcm.finish();
    writer.write_all(&tag).map_err(write_failed)?;
    Ok(len)
}

/// Decrypt a container read from `reader`, writing plaintext to `writer`.
///
/// The trailing 16 bytes of the stream are held back as the tag, and the tag
/// is only checked once the reader is exhausted. Bytes written to `writer`
/// are therefore unauthenticated until this returns `Ok`; on any error the
/// caller must discard everything written.
///
/// Returns the number of plaintext bytes written.
pub fn decrypt_stream<R, W>(key: &SymmetricKey, reader: &mut R, writer: &mut W) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut nonce = [0u8; NONCE_LEN];
    let got = read_up_to(reader, &mut nonce).map_err(read_failed)?;
    if got < NONCE_LEN {
        return Err(too_short(got));
    }

    let mut gcm = GcmStream::new(key, &nonce);
    // buf[..held] always ends with the most recent bytes of the stream; once
    // more than TAG_LEN are held, everything before the last TAG_LEN is
    // ciphertext.
    let mut buf = vec![0u8; CHUNK_SIZE + TAG_LEN];
    let mut held = 0;
    let result = loop {
        let n = match read_some(reader, &mut buf[held..]) {
            Ok(n) => n,
            Err(e) => break Err(read_failed(e)),
        };
        if n == 0 {
            break Ok(());
        }
        held += n;
        if held > TAG_LEN {
            let ready = held - TAG_LEN;
            if let Err(e) = gcm.open(&mut buf[..ready]) {
                break Err(e);
            }
            if let Err(e) = writer.write_all(&buf[..ready]) {
                break Err(write_failed(e));
            }
            buf.copy_within(ready..held, 0);
            held = TAG_LEN;
        }
    };

    let outcome = result.and_then(|()| {
        if held < TAG_LEN {
            return Err(too_short(NONCE_LEN + held));
        }
        let len = gcm.len;
        let expected = gcm.finish();
        if bool::from(expected[..].ct_eq(&buf[..TAG_LEN])) {
            Ok(len)
        } else {
            debug!(len, "stream failed tag verification");
            Err(GcmboxError::authentication())
        }
    });
    buf.zeroize();
    outcome
}

/// Incremental AES-128-GCM over a single message with no associated data.
struct GcmStream {
    ctr: Aes128Ctr32,
    ghash: GHash,
    tag_mask: [u8; TAG_LEN],
    pending: [u8; BLOCK_LEN],
    pending_len: usize,
    len: u64,
}

impl GcmStream {
    fn new(key: &SymmetricKey, nonce: &[u8; NONCE_LEN]) -> Self {
        let key = GenericArray::from_slice(key.as_bytes());

        let mut hash_key = ghash::Key::default();
        <Aes128 as KeyInit>::new(key).encrypt_block(&mut hash_key);
        let ghash = <GHash as ghash::universal_hash::KeyInit>::new(&hash_key);
        hash_key.as_mut_slice().zeroize();

        // J0 = nonce || 0^31 || 1. Its keystream block masks the tag; the
        // message keystream starts at J0 + 1.
        let mut j0 = [0u8; BLOCK_LEN];
        j0[..NONCE_LEN].copy_from_slice(nonce);
        j0[BLOCK_LEN - 1] = 1;
        let mut ctr = <Aes128Ctr32 as KeyIvInit>::new(key, GenericArray::from_slice(&j0));
        let mut tag_mask = [0u8; TAG_LEN];
        ctr.apply_keystream(&mut tag_mask);

        Self {
            ctr,
            ghash,
            tag_mask,
            pending: [0u8; BLOCK_LEN],
            pending_len: 0,
            len: 0,
        }
    }

    /// Encrypt `buf` in place and absorb the resulting ciphertext.
    fn seal(&mut self, buf: &mut [u8]) -> Result<()> {
        self.advance(buf.len())?;
        self.ctr.try_apply_keystream(buf).map_err(|_| too_long())?;
        self.absorb(buf);
        Ok(())
    }

    /// Absorb the ciphertext in `buf`, then decrypt it in place.
    fn open(&mut self, buf: &mut [u8]) -> Result<()> {
        self.advance(buf.len())?;
        self.absorb(buf);
        self.ctr.try_apply_keystream(buf).map_err(|_| too_long())
    }

    fn advance(&mut self, n: usize) -> Result<()> {
        self.len = self
            .len
            .checked_add(n as u64)
            .filter(|len| *len <= MAX_PLAINTEXT_LEN)
            .ok_or_else(too_long)?;
        Ok(())
    }

    /// Feed ciphertext to GHASH, carrying partial blocks across calls so
    /// that only the final block of the message is zero-padded.
    fn absorb(&mut self, mut data: &[u8]) {
        if self.pending_len > 0 {
            let take = (BLOCK_LEN - self.pending_len).min(data.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&data[..take]);
            self.pending_len += take;
            data = &data[take..];
            if self.pending_len < BLOCK_LEN {
                return;
            }
            self.ghash.update_padded(&self.pending);
            self.pending_len = 0;
        }

        let aligned = data.len() - data.len() % BLOCK_LEN;
        self.ghash.update_padded(&data[..aligned]);

        let rest = &data[aligned..];
        self.pending[..rest.len()].copy_from_slice(rest);
        self.pending_len = rest.len();
    }

    fn finish(mut self) -> [u8; TAG_LEN] {
        self.ghash.update_padded(&self.pending[..self.pending_len]);

        // Length block: 64-bit associated data length (always zero) followed
        // by the 64-bit ciphertext length, both in bits.
        let mut lengths = [0u8; BLOCK_LEN];
        lengths[8..].copy_from_slice(&(self.len * 8).to_be_bytes());
        self.ghash.update_padded(&lengths);

        let digest = self.ghash.finalize();
        let mut tag = [0u8; TAG_LEN];
        for ((t, d), m) in tag.iter_mut().zip(digest.iter()).zip(self.tag_mask.iter()) {
            *t = d ^ m;
        }
        tag
    }
}

fn generate_nonce() -> Result<[u8; NONCE_LEN]> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.try_fill_bytes(&mut nonce).map_err(|e| {
        GcmboxError::with_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to obtain random nonce",
            e,
        )
    })?;
    Ok(nonce)
}

fn read_some<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Fill `buf` unless the reader hits end of stream first; returns bytes read.
fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match read_some(reader, &mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn too_short(len: usize) -> GcmboxError {
    GcmboxError::malformed(format!(
        "input too short to be a container: {} bytes, need at least {}",
        len, MIN_CONTAINER_LEN
    ))
}

fn too_long() -> GcmboxError {
    GcmboxError::invalid_input("input exceeds the maximum AES-GCM message length")
}

fn read_failed(err: io::Error) -> GcmboxError {
    GcmboxError::io("failed to read input stream", err)
}

fn write_failed(err: io::Error) -> GcmboxError {
    GcmboxError::io("failed to write output stream", err)
}
