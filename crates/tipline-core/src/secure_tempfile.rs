//! Encrypted buffering of uploads on disk.
//!
//! Buffering large submissions in memory for the whole request is too
//! expensive, but spooling plaintext to disk would leave recoverable
//! traces for forensic analysis. `SecureTemporaryFile` writes the stream
//! through AES-256-CTR with a per-instance ephemeral key that only ever
//! lives in memory, and unlinks the backing file when dropped.
//!
//! This is not a general file type: content may be appended any number of
//! times, then read out exactly once. The single write-then-read pass is
//! what makes CTR mode safe here; each of the two cipher states consumes
//! the keystream at most once, and neither the key nor the IV ever
//! outlives the instance. Rewinding or rewriting would reuse keystream
//! and break confidentiality, so the state machine forbids it.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use aes::Aes256;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{Result, TiplineError};

type Aes256Ctr = Ctr128BE<Aes256>;

#[derive(Debug, PartialEq, Eq)]
enum LastAction {
    Init,
    Write,
    Read,
}

/// A write-once-then-read-once encrypted temporary file.
pub struct SecureTemporaryFile {
    file: File,
    filepath: PathBuf,
    encryptor: Aes256Ctr,
    decryptor: Aes256Ctr,
    last_action: LastAction,
}

impl SecureTemporaryFile {
    /// Create a fresh encrypted temporary file in `store_dir`.
    ///
    /// Generates a random AES-256 key and counter IV unique to this
    /// instance, and a pseudorandom filename free of path separators and
    /// NUL bytes.
    pub fn new(store_dir: &Path) -> Result<Self> {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(key.as_mut());
        let mut iv = [0u8; 16];
        OsRng.fill_bytes(&mut iv);

        // Two cipher states over the same keystream: one consumed by the
        // write pass, one by the single read pass.
        let encryptor = Aes256Ctr::new((&*key).into(), &iv.into());
        let decryptor = Aes256Ctr::new((&*key).into(), &iv.into());

        let mut file_id = [0u8; 32];
        OsRng.fill_bytes(&mut file_id);
        let filepath = store_dir.join(format!("{}.aes", URL_SAFE_NO_PAD.encode(file_id)));

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&filepath)
            .map_err(|e| TiplineError::Storage(format!("Temp file create failed: {}", e)))?;

        Ok(Self {
            file,
            filepath,
            encryptor,
            decryptor,
            last_action: LastAction::Init,
        })
    }

    /// Append `data`, encrypted, to the file.
    ///
    /// May be called any number of times before the first `read`.
    ///
    /// # Errors
    ///
    /// Returns `TiplineError::InvalidInput` if called after `read`:
    /// writing again would reuse CTR keystream.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.last_action == LastAction::Read {
            return Err(TiplineError::InvalidInput(
                "Cannot write to a secure temporary file after reading it".to_string(),
            ));
        }
        self.last_action = LastAction::Write;

        let mut ciphertext = data.to_vec();
        self.encryptor.apply_keystream(&mut ciphertext);
        self.file.write_all(&ciphertext)?;
        Ok(())
    }

    /// Read decrypted content back.
    ///
    /// The first call rewinds to the start of the file; the full contents
    /// can be read exactly once, in one call (`count = None`) or in
    /// chunks. Reads past the end return an empty buffer, matching what
    /// stream consumers expect at EOF.
    ///
    /// # Errors
    ///
    /// Returns `TiplineError::InvalidInput` if nothing has been written
    /// yet.
    pub fn read(&mut self, count: Option<usize>) -> Result<Vec<u8>> {
        match self.last_action {
            LastAction::Init => {
                return Err(TiplineError::InvalidInput(
                    "Must write to a secure temporary file before reading it".to_string(),
                ))
            }
            LastAction::Write => {
                self.file.flush()?;
                self.file.seek(SeekFrom::Start(0))?;
                self.last_action = LastAction::Read;
            }
            LastAction::Read => {}
        }

        let mut plaintext = match count {
            Some(count) => {
                let mut buf = vec![0u8; count];
                let n = self.file.read(&mut buf)?;
                buf.truncate(n);
                buf
            }
            None => {
                let mut buf = Vec::new();
                self.file.read_to_end(&mut buf)?;
                buf
            }
        };
        self.decryptor.apply_keystream(&mut plaintext);
        Ok(plaintext)
    }

    /// Path of the encrypted backing file.
    pub fn path(&self) -> &Path {
        &self.filepath
    }

    /// Close the file, unlinking it from disk.
    ///
    /// Dropping the instance unlinks it too; `close` only exists to
    /// surface an unlink failure instead of swallowing it.
    pub fn close(self) -> Result<()> {
        fs::remove_file(&self.filepath)
            .map_err(|e| TiplineError::Storage(format!("Temp file unlink failed: {}", e)))
        // Drop runs next and finds the file already gone; its unlink is a
        // no-op.
    }
}

impl Drop for SecureTemporaryFile {
    fn drop(&mut self) {
        // Unconditional unlink on every exit path.
        let _ = fs::remove_file(&self.filepath);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mut stf = SecureTemporaryFile::new(dir.path()).expect("create should succeed");

        stf.write(b"abc").expect("write should succeed");
        let contents = stf.read(None).expect("read should succeed");
        assert_eq!(contents, b"abc");
    }

    #[test]
    fn test_multiple_writes_concatenate() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mut stf = SecureTemporaryFile::new(dir.path()).expect("create should succeed");

        stf.write(b"hello ").expect("write should succeed");
        stf.write(b"world").expect("write should succeed");
        let contents = stf.read(None).expect("read should succeed");
        assert_eq!(contents, b"hello world");
    }

    #[test]
    fn test_chunked_read() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mut stf = SecureTemporaryFile::new(dir.path()).expect("create should succeed");

        stf.write(b"0123456789").expect("write should succeed");
        assert_eq!(stf.read(Some(4)).unwrap(), b"0123");
        assert_eq!(stf.read(Some(4)).unwrap(), b"4567");
        assert_eq!(stf.read(Some(4)).unwrap(), b"89");
        // EOF: further reads return an empty buffer.
        assert_eq!(stf.read(Some(4)).unwrap(), b"");
        assert_eq!(stf.read(None).unwrap(), b"");
    }

    #[test]
    fn test_read_before_write_fails() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mut stf = SecureTemporaryFile::new(dir.path()).expect("create should succeed");

        let result = stf.read(None);
        assert!(matches!(result, Err(TiplineError::InvalidInput(_))));
    }

    #[test]
    fn test_write_after_read_fails() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mut stf = SecureTemporaryFile::new(dir.path()).expect("create should succeed");

        stf.write(b"abc").expect("write should succeed");
        stf.read(None).expect("read should succeed");

        let result = stf.write(b"more");
        assert!(matches!(result, Err(TiplineError::InvalidInput(_))));
    }

    #[test]
    fn test_on_disk_bytes_are_not_plaintext() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mut stf = SecureTemporaryFile::new(dir.path()).expect("create should succeed");

        let plaintext = b"a long and recognizable submission body".repeat(10);
        stf.write(&plaintext).expect("write should succeed");

        let on_disk = fs::read(stf.path()).expect("raw read should succeed");
        assert_eq!(on_disk.len(), plaintext.len());
        assert_ne!(on_disk, plaintext);
        // No plaintext window survives on disk.
        assert!(!on_disk
            .windows(b"recognizable".len())
            .any(|window| window == b"recognizable"));
    }

    #[test]
    fn test_fresh_key_per_instance() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mut first = SecureTemporaryFile::new(dir.path()).expect("create should succeed");
        let mut second = SecureTemporaryFile::new(dir.path()).expect("create should succeed");

        first.write(b"identical plaintext").expect("write should succeed");
        second.write(b"identical plaintext").expect("write should succeed");

        let first_bytes = fs::read(first.path()).expect("raw read should succeed");
        let second_bytes = fs::read(second.path()).expect("raw read should succeed");
        assert_ne!(first_bytes, second_bytes);
    }

    #[test]
    fn test_filename_is_safe() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let stf = SecureTemporaryFile::new(dir.path()).expect("create should succeed");

        let filename = stf
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .expect("filename should be unicode");
        assert!(filename.ends_with(".aes"));
        assert!(!filename.contains('/'));
        assert!(!filename.contains('\0'));
    }

    #[test]
    fn test_close_unlinks_backing_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mut stf = SecureTemporaryFile::new(dir.path()).expect("create should succeed");
        stf.write(b"abc").expect("write should succeed");

        let path = stf.path().to_path_buf();
        assert!(path.exists());
        stf.close().expect("close should succeed");
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_unlinks_backing_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let stf = SecureTemporaryFile::new(dir.path()).expect("create should succeed");
        let path = stf.path().to_path_buf();

        drop(stf);
        assert!(!path.exists());
    }
}
