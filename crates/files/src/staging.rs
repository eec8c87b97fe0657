//! Staging uploads: stream to a temp file while hashing.

use crate::constants::{DEFAULT_CHUNK_SIZE, STAGING_FILE_PREFIX, STAGING_FILE_SUFFIX};
use crate::key::ContentKey;
use crate::{io_error, FilesError};
use fleischchan_types::NonEmptyText;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// An uploaded byte stream parked in the staging directory.
///
/// The underlying temp file is deleted when this value is dropped, so every exit path
/// that does not hand the file to [`crate::publish`] cleans up after itself.
#[derive(Debug)]
pub struct StagedFile {
    temp: NamedTempFile,
    size_bytes: u64,
}

impl StagedFile {
    /// Location of the temp file while it exists.
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Number of bytes written.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub(crate) fn into_temp(self) -> NamedTempFile {
        self.temp
    }
}

/// Result of a successful staging pass.
#[derive(Debug)]
pub struct Staged {
    pub file: StagedFile,
    pub content_key: ContentKey,
    pub original_name: NonEmptyText,
}

/// Streams an upload into the staging directory while computing its SHA-256 digest.
#[derive(Debug, Clone)]
pub struct DigestWriter {
    staging_dir: PathBuf,
    chunk_size: usize,
}

impl DigestWriter {
    /// Creates a writer that stages into `staging_dir` using the default chunk size.
    ///
    /// The directory is created lazily on the first write.
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Overrides the read buffer size.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        assert!(chunk_size >= 1, "chunk size must be at least one byte");
        self.chunk_size = chunk_size;
        self
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Copies `reader` to a fresh temp file and derives its content key.
    ///
    /// The digest is updated with every chunk in read order before that chunk is written,
    /// so the key always describes the bytes exactly as they arrived.
    ///
    /// # Errors
    ///
    /// - `FilesError::InvalidInput` if `original_name` is absent or blank. Nothing is
    ///   created on disk in that case.
    /// - `FilesError::Io` if the staging directory or temp file cannot be created, or if
    ///   reading the stream or writing the temp file fails. The temp file is removed.
    pub fn write<R: Read>(
        &self,
        original_name: Option<&str>,
        reader: R,
    ) -> Result<Staged, FilesError> {
        let original_name = original_name
            .map(NonEmptyText::verbatim)
            .transpose()
            .ok()
            .flatten()
            .ok_or_else(|| {
                FilesError::InvalidInput("upload has no usable original filename".into())
            })?;

        fs::create_dir_all(&self.staging_dir).map_err(|e| {
            io_error(
                e,
                format!(
                    "Failed to create staging directory {}",
                    self.staging_dir.display()
                ),
            )
        })?;

        let temp = tempfile::Builder::new()
            .prefix(STAGING_FILE_PREFIX)
            .suffix(STAGING_FILE_SUFFIX)
            .tempfile_in(&self.staging_dir)
            .map_err(|e| {
                io_error(
                    e,
                    format!(
                        "Failed to create staging file in {}",
                        self.staging_dir.display()
                    ),
                )
            })?;

        let (temp, size_bytes, digest) = self.copy_hashed(reader, temp)?;

        temp.as_file().sync_all().map_err(|e| {
            io_error(
                e,
                format!("Failed to flush staging file {}", temp.path().display()),
            )
        })?;

        let content_key = ContentKey::from_sha256(digest);
        tracing::debug!(
            "staged {} bytes for {:?} as {}",
            size_bytes,
            original_name.as_str(),
            content_key
        );

        Ok(Staged {
            file: StagedFile { temp, size_bytes },
            content_key,
            original_name,
        })
    }

    /// Copies `reader` into `sink` chunk by chunk, hashing each chunk before writing it.
    ///
    /// `sink` is handed back on success and dropped on failure.
    fn copy_hashed<R: Read, W: Write>(
        &self,
        mut reader: R,
        mut sink: W,
    ) -> Result<(W, u64, [u8; 32]), FilesError> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.chunk_size];
        let mut size_bytes = 0u64;

        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_error(e, "Failed to read upload stream")),
            };

            let chunk = &buffer[..read];
            hasher.update(chunk);
            sink.write_all(chunk).map_err(|e| {
                io_error(
                    e,
                    format!(
                        "Failed to write staging file in {}",
                        self.staging_dir.display()
                    ),
                )
            })?;
            size_bytes += read as u64;
        }

        Ok((sink, size_bytes, hasher.finalize().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tempfile::TempDir;

    fn staged_entries(dir: &Path) -> usize {
        match fs::read_dir(dir) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    /// Yields its data one byte per call and fails once the data runs out.
    struct FailingReader {
        data: Vec<u8>,
        position: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.position >= self.data.len() {
                return Err(io::Error::new(ErrorKind::ConnectionReset, "client went away"));
            }
            buf[0] = self.data[self.position];
            self.position += 1;
            Ok(1)
        }
    }

    /// Interrupts every other call before delivering data.
    struct InterruptingReader<'a> {
        inner: &'a [u8],
        interrupt_next: bool,
    }

    impl Read for InterruptingReader<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interrupt_next {
                self.interrupt_next = false;
                return Err(io::Error::from(ErrorKind::Interrupted));
            }
            self.interrupt_next = true;
            self.inner.read(buf)
        }
    }

    /// Accepts `budget` bytes into a real staging file, then reports a full disk.
    #[derive(Debug)]
    struct FullDisk {
        file: NamedTempFile,
        budget: usize,
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::from(ErrorKind::StorageFull));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            self.file.write(&buf[..n])
        }

        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    #[test]
    fn test_write_stages_bytes_and_key() {
        let temp = TempDir::new().unwrap();
        let writer = DigestWriter::new(temp.path().join(".staging"));

        let staged = writer.write(Some("greeting.txt"), &b"hello world"[..]).unwrap();

        assert_eq!(
            staged.content_key.as_str(),
            "SHA-256$uU0nuZNNPgilLlLX2n2r-sSE7-N6U4DukIj3rOLvzek="
        );
        assert_eq!(staged.original_name.as_str(), "greeting.txt");
        assert_eq!(staged.file.size_bytes(), 11);
        assert_eq!(fs::read(staged.file.path()).unwrap(), b"hello world");

        let name = staged.file.path().file_name().unwrap().to_string_lossy();
        assert!(name.starts_with(STAGING_FILE_PREFIX));
        assert!(name.ends_with(STAGING_FILE_SUFFIX));
    }

    #[test]
    fn test_key_is_independent_of_chunk_size() {
        let temp = TempDir::new().unwrap();
        let data: Vec<u8> = (0..20_000u32).map(|i| (i * 31 % 251) as u8).collect();

        let keys: Vec<ContentKey> = [1usize, 7, 4096, DEFAULT_CHUNK_SIZE, 1 << 20]
            .into_iter()
            .map(|chunk| {
                DigestWriter::new(temp.path())
                    .with_chunk_size(chunk)
                    .write(Some("data.bin"), data.as_slice())
                    .unwrap()
                    .content_key
            })
            .collect();

        assert!(keys.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn test_key_is_independent_of_filename() {
        let temp = TempDir::new().unwrap();
        let writer = DigestWriter::new(temp.path());

        let a = writer.write(Some("a.png"), &b"same bytes"[..]).unwrap();
        let b = writer.write(Some("b.jpg"), &b"same bytes"[..]).unwrap();

        assert_eq!(a.content_key, b.content_key);
        assert_ne!(a.file.path(), b.file.path());
    }

    #[test]
    fn test_missing_filename_rejected_before_io() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(".staging");
        let writer = DigestWriter::new(&staging);

        for name in [None, Some(""), Some("   ")] {
            let result = writer.write(name, &b"hello"[..]);
            assert!(matches!(result, Err(FilesError::InvalidInput(_))));
        }

        assert!(!staging.exists(), "no staging directory should be created");
    }

    #[test]
    fn test_read_failure_removes_temp_file() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(".staging");
        let writer = DigestWriter::new(&staging);

        let reader = FailingReader {
            data: b"partial".to_vec(),
            position: 0,
        };
        let result = writer.write(Some("broken.bin"), reader);

        match result {
            Err(FilesError::Io(e)) => assert_eq!(e.kind(), ErrorKind::ConnectionReset),
            other => panic!("expected Io error, got {:?}", other),
        }
        assert_eq!(staged_entries(&staging), 0);
    }

    #[test]
    fn test_write_failure_removes_partial_file() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(".staging");
        fs::create_dir_all(&staging).unwrap();
        let writer = DigestWriter::new(&staging).with_chunk_size(4);

        let file = tempfile::Builder::new()
            .prefix(STAGING_FILE_PREFIX)
            .suffix(STAGING_FILE_SUFFIX)
            .tempfile_in(&staging)
            .unwrap();
        let partial_path = file.path().to_path_buf();
        let sink = FullDisk { file, budget: 6 };

        match writer.copy_hashed(&b"more bytes than the disk can hold"[..], sink) {
            Err(FilesError::Io(e)) => assert_eq!(e.kind(), ErrorKind::StorageFull),
            Err(other) => panic!("expected Io error, got {:?}", other),
            Ok(_) => panic!("expected the write to fail"),
        }
        assert!(!partial_path.exists());
        assert_eq!(staged_entries(&staging), 0);
    }

    #[test]
    fn test_original_name_recorded_as_supplied() {
        let temp = TempDir::new().unwrap();
        let writer = DigestWriter::new(temp.path());

        let staged = writer
            .write(Some("  holiday photo.png "), &b"sunny"[..])
            .unwrap();

        assert_eq!(staged.original_name.as_str(), "  holiday photo.png ");
    }

    #[test]
    fn test_interrupted_reads_are_retried() {
        let temp = TempDir::new().unwrap();
        let writer = DigestWriter::new(temp.path()).with_chunk_size(3);

        let reader = InterruptingReader {
            inner: b"hello world",
            interrupt_next: true,
        };
        let staged = writer.write(Some("greeting.txt"), reader).unwrap();

        assert_eq!(fs::read(staged.file.path()).unwrap(), b"hello world");
    }

    #[test]
    fn test_dropping_staged_file_removes_it() {
        let temp = TempDir::new().unwrap();
        let writer = DigestWriter::new(temp.path().join(".staging"));

        let staged = writer.write(Some("x.txt"), &b"x"[..]).unwrap();
        let path = staged.file.path().to_path_buf();
        assert!(path.exists());

        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn test_empty_stream() {
        let temp = TempDir::new().unwrap();
        let writer = DigestWriter::new(temp.path());

        let staged = writer.write(Some("empty.dat"), io::empty()).unwrap();

        assert_eq!(staged.file.size_bytes(), 0);
        assert_eq!(
            staged.content_key.as_str(),
            "SHA-256$47DEQpj8HBSa-_TImW-5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    #[should_panic(expected = "chunk size must be at least one byte")]
    fn test_zero_chunk_size_panics() {
        let _ = DigestWriter::new("unused").with_chunk_size(0);
    }
}
