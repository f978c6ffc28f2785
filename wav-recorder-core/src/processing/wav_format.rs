//! WAV (RIFF) header layout for 16-bit linear PCM.
//!
//! Chunk IDs are four-character codes stored as big-endian `u32` constants so
//! they land in the file in ASCII order. Every numeric field is little-endian.
//!
//! ```text
//! [0-3]    "RIFF"
//! [4-7]    riff size = 36 + data_size
//! [8-11]   "WAVE"
//! [12-15]  "fmt "
//! [16-19]  16 (PCM format chunk size)
//! [20-21]  1 (PCM format code)
//! [22-23]  channels
//! [24-27]  frame_rate
//! [28-31]  byte_rate = frame_rate * channels * 2
//! [32-33]  block_align = channels * 2
//! [34-35]  16 (bits per sample)
//! [36-39]  "data"
//! [40-43]  data_size
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::models::error::CaptureError;

pub const RIFF_ID: u32 = u32::from_be_bytes(*b"RIFF");
pub const WAVE_ID: u32 = u32::from_be_bytes(*b"WAVE");
pub const FMT_ID: u32 = u32::from_be_bytes(*b"fmt ");
pub const DATA_ID: u32 = u32::from_be_bytes(*b"data");

pub const WAVE_FORMAT_PCM: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;
pub const BYTES_PER_SAMPLE: u16 = BITS_PER_SAMPLE / 8;
const FMT_CHUNK_SIZE: u32 = 16;

/// Size of the RIFF header written before the first sample.
pub const WAV_HEADER_SIZE: usize = 44;

/// Offset of the RIFF chunk size field.
pub const RIFF_SIZE_OFFSET: u64 = 4;

/// Offset of the `data` chunk size field.
pub const DATA_SIZE_OFFSET: u64 = 40;

/// Largest data chunk whose RIFF size still fits in 32 bits.
pub const MAX_DATA_SIZE: u64 = u32::MAX as u64 - (WAV_HEADER_SIZE as u64 - 8);

/// Most channels whose block align still fits the 16-bit header field.
pub const MAX_WAV_CHANNELS: u16 = u16::MAX / BYTES_PER_SAMPLE;

/// Frame layout of a 16-bit PCM WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WavSpec {
    pub frame_rate: u32,
    pub channels: u16,
}

impl WavSpec {
    pub fn new(frame_rate: u32, channels: u16) -> Result<Self, CaptureError> {
        if frame_rate == 0 {
            return Err(CaptureError::InvalidArgument("frame rate must be positive".into()));
        }
        if channels == 0 {
            return Err(CaptureError::InvalidArgument("channel count must be positive".into()));
        }
        if channels > MAX_WAV_CHANNELS {
            return Err(CaptureError::InvalidArgument(format!(
                "block align overflows: {} channels",
                channels
            )));
        }
        (frame_rate as u64)
            .checked_mul(channels as u64 * BYTES_PER_SAMPLE as u64)
            .filter(|rate| *rate <= u32::MAX as u64)
            .ok_or_else(|| {
                CaptureError::InvalidArgument(format!(
                    "byte rate overflows: {} Hz x {} channels",
                    frame_rate, channels
                ))
            })?;
        Ok(Self { frame_rate, channels })
    }

    /// Bytes per frame. Saturates for layouts `new` would have rejected.
    pub fn block_align(&self) -> u16 {
        self.channels.saturating_mul(BYTES_PER_SAMPLE)
    }

    pub fn byte_rate(&self) -> u32 {
        self.frame_rate.saturating_mul(self.block_align() as u32)
    }
}

/// RIFF chunk size for a given data chunk size.
pub fn riff_size(data_size: u32) -> u32 {
    data_size + (WAV_HEADER_SIZE as u32 - 8)
}

/// Generate a 44-byte header for `spec` carrying `data_size` payload bytes.
pub fn generate_wav_header(spec: &WavSpec, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let mut header = [0u8; WAV_HEADER_SIZE];

    // RIFF chunk descriptor
    header[0..4].copy_from_slice(&RIFF_ID.to_be_bytes());
    header[4..8].copy_from_slice(&riff_size(data_size).to_le_bytes());
    header[8..12].copy_from_slice(&WAVE_ID.to_be_bytes());

    // fmt sub-chunk
    header[12..16].copy_from_slice(&FMT_ID.to_be_bytes());
    header[16..20].copy_from_slice(&FMT_CHUNK_SIZE.to_le_bytes());
    header[20..22].copy_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
    header[22..24].copy_from_slice(&spec.channels.to_le_bytes());
    header[24..28].copy_from_slice(&spec.frame_rate.to_le_bytes());
    header[28..32].copy_from_slice(&spec.byte_rate().to_le_bytes());
    header[32..34].copy_from_slice(&spec.block_align().to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data sub-chunk
    header[36..40].copy_from_slice(&DATA_ID.to_be_bytes());
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Header fields recovered from an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub spec: WavSpec,
    pub riff_size: u32,
    pub data_size: u32,
}

impl WavHeader {
    pub fn frames(&self) -> u64 {
        self.data_size as u64 / self.spec.block_align() as u64
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.spec.frame_rate as f64
    }
}

/// Parse the canonical 44-byte header produced by [`generate_wav_header`].
pub fn parse_header(bytes: &[u8]) -> Result<WavHeader, CaptureError> {
    if bytes.len() < WAV_HEADER_SIZE {
        return Err(CaptureError::InvalidArgument(format!(
            "truncated header: {} of {} bytes",
            bytes.len(),
            WAV_HEADER_SIZE
        )));
    }

    expect_tag(bytes, 0, RIFF_ID)?;
    expect_tag(bytes, 8, WAVE_ID)?;
    expect_tag(bytes, 12, FMT_ID)?;
    expect_tag(bytes, 36, DATA_ID)?;

    let fmt_size = read_u32(bytes, 16);
    if fmt_size != FMT_CHUNK_SIZE {
        return Err(CaptureError::InvalidArgument(format!("unexpected fmt chunk size {}", fmt_size)));
    }
    let format_code = read_u16(bytes, 20);
    if format_code != WAVE_FORMAT_PCM {
        return Err(CaptureError::InvalidArgument(format!(
            "unsupported format code {}",
            format_code
        )));
    }
    let bits = read_u16(bytes, 34);
    if bits != BITS_PER_SAMPLE {
        return Err(CaptureError::InvalidArgument(format!("unsupported bit depth {}", bits)));
    }

    let spec = WavSpec::new(read_u32(bytes, 24), read_u16(bytes, 22))?;
    if read_u32(bytes, 28) != spec.byte_rate() || read_u16(bytes, 32) != spec.block_align() {
        return Err(CaptureError::InvalidArgument(
            "byte rate or block align disagrees with channel layout".into(),
        ));
    }

    Ok(WavHeader {
        spec,
        riff_size: read_u32(bytes, 4),
        data_size: read_u32(bytes, 40),
    })
}

/// Read and parse the header at the start of the file at `path`.
pub fn read_header(path: &Path) -> Result<WavHeader, CaptureError> {
    let mut header = [0u8; WAV_HEADER_SIZE];
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < WAV_HEADER_SIZE {
        let n = file.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    parse_header(&header[..filled])
}

fn expect_tag(bytes: &[u8], offset: usize, id: u32) -> Result<(), CaptureError> {
    let found = u32::from_be_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]);
    if found != id {
        return Err(CaptureError::InvalidArgument(format!(
            "expected {:?} at offset {}, found {:?}",
            String::from_utf8_lossy(&id.to_be_bytes()),
            offset,
            String::from_utf8_lossy(&found.to_be_bytes())
        )));
    }
    Ok(())
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}
