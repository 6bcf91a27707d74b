use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use bytes::Bytes;

use crate::error::AppError;

const SIGNATURE: &[u8; 4] = b"DKIF";
const AV1_FOURCC: &[u8; 4] = b"AV01";
const FILE_HEADER_LEN: usize = 32;
const FRAME_HEADER_LEN: usize = 12;

/// Stream description from the IVF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfHeader {
    /// Frame width in pixels.
    pub width: u16,
    /// Frame height in pixels.
    pub height: u16,
    /// Time base denominator (the rate).
    pub timebase_den: u32,
    /// Time base numerator (the scale).
    pub timebase_num: u32,
    /// Frame count as written by the muxer; may be zero.
    pub frame_count: u32,
}

impl IvfHeader {
    /// Seconds per timestamp tick.
    pub fn tick_seconds(&self) -> f64 {
        if self.timebase_den == 0 {
            return 0.0;
        }
        f64::from(self.timebase_num) / f64::from(self.timebase_den)
    }
}

/// One temporal unit read from an IVF file.
#[derive(Debug, Clone)]
pub struct IvfFrame {
    /// Presentation time in seconds.
    pub pts: f64,
    /// The OBUs of the temporal unit.
    pub data: Bytes,
}

/// Sequential reader for AV1 IVF files.
pub struct IvfReader<R> {
    inner: R,
    header: IvfHeader,
}

impl IvfReader<BufReader<File>> {
    /// Opens the file at `path` and validates its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AppError::MissingInput(path.display().to_string()));
        }
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read> IvfReader<R> {
    /// Reads and validates the file header.
    pub fn new(mut inner: R) -> Result<Self, AppError> {
        let mut raw = [0u8; FILE_HEADER_LEN];
        inner.read_exact(&mut raw).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => AppError::InvalidIvf("truncated file header".into()),
            _ => AppError::Io(e),
        })?;

        if &raw[0..4] != SIGNATURE {
            return Err(AppError::InvalidIvf("missing DKIF signature".into()));
        }
        if &raw[8..12] != AV1_FOURCC {
            let fourcc = String::from_utf8_lossy(&raw[8..12]).into_owned();
            return Err(AppError::InvalidIvf(format!("not an AV1 stream ({fourcc})")));
        }
        let header_len = usize::from(u16_at(&raw, 6));
        if header_len > FILE_HEADER_LEN {
            // some muxers append private data to the header
            io::copy(&mut (&mut inner).take((header_len - FILE_HEADER_LEN) as u64), &mut io::sink())?;
        }

        let header = IvfHeader {
            width: u16_at(&raw, 12),
            height: u16_at(&raw, 14),
            timebase_den: u32_at(&raw, 16),
            timebase_num: u32_at(&raw, 20),
            frame_count: u32_at(&raw, 24),
        };
        tracing::debug!(
            width = header.width,
            height = header.height,
            frames = header.frame_count,
            "ivf header"
        );
        Ok(Self { inner, header })
    }

    /// The validated file header.
    pub fn header(&self) -> &IvfHeader {
        &self.header
    }

    /// Next frame, or `None` at a clean end of file.
    pub fn next_frame(&mut self) -> Result<Option<IvfFrame>, AppError> {
        let mut raw = [0u8; FRAME_HEADER_LEN];
        match read_full(&mut self.inner, &mut raw)? {
            0 => return Ok(None),
            FRAME_HEADER_LEN => {}
            _ => return Err(AppError::InvalidIvf("truncated frame header".into())),
        }

        let size = u32_at(&raw, 0) as usize;
        let timestamp = u64::from_le_bytes([
            raw[4], raw[5], raw[6], raw[7], raw[8], raw[9], raw[10], raw[11],
        ]);

        // the length is untrusted: grow with the bytes actually present
        let mut data = Vec::new();
        (&mut self.inner).take(size as u64).read_to_end(&mut data)?;
        if data.len() != size {
            return Err(AppError::InvalidIvf("truncated frame".into()));
        }
        Ok(Some(IvfFrame {
            pts: timestamp as f64 * self.header.tick_seconds(),
            data: Bytes::from(data),
        }))
    }
}

impl<R: Read> Iterator for IvfReader<R> {
    type Item = Result<IvfFrame, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

fn u16_at(raw: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([raw[at], raw[at + 1]])
}

fn u32_at(raw: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

/// Like `read_exact` but reports how much was read before end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
