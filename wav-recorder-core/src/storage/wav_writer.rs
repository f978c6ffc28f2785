use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;
use crate::processing::wav_format::{
    self, WavSpec, BYTES_PER_SAMPLE, MAX_DATA_SIZE, RIFF_SIZE_OFFSET, WAV_HEADER_SIZE,
};

/// Bytes buffered in front of the file between flushes.
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Samples serialized per `write_all` on the stack.
const ENCODE_CHUNK: usize = 1024;

/// Streaming 16-bit PCM WAV writer with deferred size patching.
///
/// ## File Format
///
/// ```text
/// [44-byte WAV header, size fields zero until close]
/// [16-bit LE PCM samples, interleaved by channel...]
/// ```
///
/// `open` writes the header with both size fields zeroed and remembers where
/// the `data` size lives; `close` seeks back and patches the `data` size and
/// the RIFF size. A writer covers exactly one file: it cannot be reopened
/// after `close`.
///
/// An `append` either lands completely or not at all: when a write fails,
/// whatever part of it reached the buffer or the file is cut off again so the
/// file always ends at `header + data_size`. If that repair fails too the
/// writer is marked failed and refuses further appends.
#[derive(Debug, Default)]
pub struct WavWriter {
    file_path: Option<PathBuf>,
    file: Option<BufWriter<File>>,
    spec: Option<WavSpec>,
    data_size_offset: u64,
    data_size: u64,
    closed: bool,
    failed: bool,
}

impl WavWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the file at `path` and write the provisional header.
    ///
    /// Returns the number of header bytes written.
    pub fn open(&mut self, path: &Path, frame_rate: u32, channels: u16) -> Result<u64, CaptureError> {
        if self.file.is_some() || self.closed {
            return Err(CaptureError::InvalidState(
                "writer already used; create a new writer per file".into(),
            ));
        }
        let spec = WavSpec::new(frame_rate, channels)?;

        let file = File::create(path)
            .map_err(|e| CaptureError::Io(format!("failed to create {}: {}", path.display(), e)))?;
        let mut file = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);

        let header = wav_format::generate_wav_header(&spec, 0);
        file.write_all(&header)
            .map_err(|e| CaptureError::Io(format!("failed to write header: {}", e)))?;

        self.data_size_offset = (header.len() - 4) as u64;
        self.data_size = 0;
        self.spec = Some(spec);
        self.file = Some(file);
        self.file_path = Some(path.to_path_buf());

        log::debug!(
            "opened {} ({} Hz, {} ch)",
            path.display(),
            spec.frame_rate,
            spec.channels
        );
        Ok(header.len() as u64)
    }

    /// Append interleaved samples to the data chunk.
    ///
    /// Returns the number of payload bytes written. Does not allocate; the
    /// only blocking is the buffered file write itself.
    pub fn append(&mut self, samples: &[i16]) -> Result<u64, CaptureError> {
        if samples.is_empty() {
            return Err(CaptureError::InvalidArgument("sample count must be positive".into()));
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::InvalidState("writer is not open".into()))?;

        if self.failed {
            return Err(CaptureError::Io("writer failed earlier; file is not writable".into()));
        }

        let bytes = samples.len() as u64 * BYTES_PER_SAMPLE as u64;
        if self.data_size + bytes > MAX_DATA_SIZE {
            return Err(CaptureError::InvalidArgument(format!(
                "data chunk would exceed {} bytes",
                MAX_DATA_SIZE
            )));
        }

        if let Err(e) = write_samples(file, samples) {
            if let Err(repair) = self.truncate_to_committed() {
                log::error!("failed to discard partial write: {}", repair);
            }
            return Err(CaptureError::Io(format!("write failed: {}", e)));
        }
        self.data_size += bytes;
        Ok(bytes)
    }

    /// Offset just past the last committed payload byte.
    fn committed_len(&self) -> u64 {
        WAV_HEADER_SIZE as u64 + self.data_size
    }

    /// Drop the bytes of a failed append, keeping everything committed before it.
    fn truncate_to_committed(&mut self) -> Result<(), CaptureError> {
        let Some(buffered) = self.file.take() else {
            return Ok(());
        };
        let (mut file, pending) = buffered.into_parts();
        let pending = pending.unwrap_or_else(|panicked| panicked.into_inner());

        let result = restore_committed(&mut file, &pending, self.committed_len());
        self.file = Some(BufWriter::with_capacity(WRITE_BUFFER_SIZE, file));
        if result.is_err() {
            self.failed = true;
        }
        result.map_err(|e| CaptureError::Io(format!("truncate failed: {}", e)))
    }

    /// Patch both size fields and release the file.
    ///
    /// Returns the final data chunk size in bytes.
    pub fn close(&mut self) -> Result<u64, CaptureError> {
        if self.failed && self.file.is_some() {
            // One more attempt to cut the file back before patching.
            if self.truncate_to_committed().is_ok() {
                self.failed = false;
            }
        }
        let mut file = self
            .file
            .take()
            .ok_or_else(|| CaptureError::InvalidState("writer is not open".into()))?;
        self.closed = true;
        if self.failed {
            return Err(CaptureError::Io("file could not be restored after a failed write".into()));
        }

        // data_size never exceeds MAX_DATA_SIZE, so both fields fit in u32.
        let data_size = self.data_size as u32;
        patch_u32(&mut file, self.data_size_offset, data_size)?;
        patch_u32(&mut file, RIFF_SIZE_OFFSET, wav_format::riff_size(data_size))?;
        file.flush()
            .map_err(|e| CaptureError::Io(format!("flush failed: {}", e)))?;

        if let Some(path) = &self.file_path {
            log::debug!("finalized {} with {} data bytes", path.display(), data_size);
        }
        Ok(self.data_size)
    }

    /// Payload bytes appended so far.
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn spec(&self) -> Option<WavSpec> {
        self.spec
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }
}

impl Drop for WavWriter {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(e) = self.close() {
                log::warn!("failed to finalize WAV on drop: {}", e);
            }
        }
    }
}

fn write_samples<W: Write>(out: &mut W, samples: &[i16]) -> io::Result<()> {
    let mut encoded = [0u8; ENCODE_CHUNK * 2];
    for chunk in samples.chunks(ENCODE_CHUNK) {
        for (bytes, sample) in encoded.chunks_exact_mut(2).zip(chunk) {
            bytes.copy_from_slice(&sample.to_le_bytes());
        }
        out.write_all(&encoded[..chunk.len() * 2])?;
    }
    Ok(())
}

/// Make `file` end exactly at `committed`.
///
/// `pending` is what the buffer still held when the write failed; it
/// continues the file from its current position.
fn restore_committed(file: &mut File, pending: &[u8], committed: u64) -> io::Result<()> {
    let on_disk = file.stream_position()?;
    if on_disk < committed {
        let missing = usize::try_from(committed - on_disk).unwrap_or(usize::MAX);
        file.write_all(&pending[..missing.min(pending.len())])?;
    }
    file.set_len(committed)?;
    file.seek(SeekFrom::Start(committed))?;
    Ok(())
}

fn patch_u32<W: Write + Seek>(file: &mut W, offset: u64, value: u32) -> Result<(), CaptureError> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| CaptureError::Io(format!("seek to {} failed: {}", offset, e)))?;
    file.write_all(&value.to_le_bytes())
        .map_err(|e| CaptureError::Io(format!("patch at {} failed: {}", offset, e)))?;
    Ok(())
}

/// Write `samples` to a complete WAV file in one pass.
///
/// Returns the data chunk size in bytes.
pub fn write_wav_file(path: &Path, spec: WavSpec, samples: &[i16]) -> Result<u64, CaptureError> {
    let mut writer = WavWriter::new();
    writer.open(path, spec.frame_rate, spec.channels)?;
    if !samples.is_empty() {
        writer.append(samples)?;
    }
    writer.close()
}

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let mut file = File::open(path)
        .map_err(|e| CaptureError::Io(format!("failed to read file for checksum: {}", e)))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
