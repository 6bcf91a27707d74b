//! Zero-copy frames over decoded pictures.
//!
//! A [`Picture`] owns one `Dav1dPicture` reference and releases it on drop.
//! Every [`PlaneBuffer`] of a frame holds an `Arc` to the same picture, so
//! the pixel memory stays valid until the last plane view is dropped, no
//! matter what the decoder session does in the meantime.

use std::sync::Arc;

use crate::binding::Dav1dApi;
use crate::format::{self, ColorSpace, PixelFormat};
use crate::sys::Dav1dPicture;

/// Ticks per second of the integer timestamps handed to the decoder.
pub const TIME_SCALE: f64 = 10_000.0;

/// Seconds to decoder ticks.
pub fn to_ticks(seconds: f64) -> i64 {
    (seconds * TIME_SCALE) as i64
}

/// Decoder ticks to seconds.
pub fn to_seconds(ticks: i64) -> f64 {
    ticks as f64 / TIME_SCALE
}

/// A decoded picture owned by this process.
pub struct Picture {
    raw: Box<Dav1dPicture>,
    api: &'static Dav1dApi,
}

// SAFETY: after `dav1d_get_picture` returns, the picture's planes and headers
// are immutable and reference counted inside the library; the only mutation,
// `dav1d_picture_unref`, happens once in `drop`.
unsafe impl Send for Picture {}
unsafe impl Sync for Picture {}

impl Picture {
    /// Takes ownership of a picture filled by `dav1d_get_picture`.
    ///
    /// # Safety
    /// `raw` must hold a reference produced by `api` that nobody else will
    /// release.
    pub unsafe fn from_raw(raw: Box<Dav1dPicture>, api: &'static Dav1dApi) -> Self {
        Self { raw, api }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        u32::try_from(self.raw.p.w).unwrap_or(0)
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        u32::try_from(self.raw.p.h).unwrap_or(0)
    }

    /// Presentation timestamp in decoder ticks.
    pub fn timestamp(&self) -> i64 {
        self.raw.m.timestamp
    }

    /// Pixel format and signaled color space. [`PixelFormat::Unknown`] and
    /// the default color space when the picture carries no sequence header.
    pub fn describe(&self) -> (PixelFormat, ColorSpace) {
        if self.raw.seq_hdr.is_null() {
            return (PixelFormat::Unknown, ColorSpace::default());
        }
        // SAFETY: seq_hdr is kept alive by the picture's seq_hdr_ref.
        let hdr = unsafe { &*self.raw.seq_hdr };
        // the picture's own layout describes the planes it carries
        format::describe(self.raw.p.layout, hdr)
    }
}

impl Drop for Picture {
    fn drop(&mut self) {
        // SAFETY: we own exactly one reference, released exactly here.
        unsafe { self.api.dav1d_picture_unref(&mut *self.raw) };
    }
}

/// Read-only view of one plane of a [`Picture`].
#[derive(Clone)]
pub struct PlaneBuffer {
    data: *const u8,
    size: usize,
    stride: usize,
    _picture: Arc<Picture>,
}

// SAFETY: the view is immutable and the backing memory is owned by the
// shared picture, which is itself Send + Sync.
unsafe impl Send for PlaneBuffer {}
unsafe impl Sync for PlaneBuffer {}

impl PlaneBuffer {
    /// Pointer to the first byte of the plane.
    pub fn as_ptr(&self) -> *const u8 {
        self.data
    }

    /// Bytes covered by the plane: stride times plane rows.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Bytes between the starts of consecutive rows.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The plane bytes, including row padding.
    pub fn as_slice(&self) -> &[u8] {
        if self.size == 0 {
            return &[];
        }
        // SAFETY: `data` points at `size` bytes owned by `_picture`, which
        // this buffer keeps alive and which nobody writes to.
        unsafe { std::slice::from_raw_parts(self.data, self.size) }
    }

    /// One row of the plane, padding included.
    pub fn row(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(self.stride)?;
        self.as_slice().get(start..start.checked_add(self.stride)?)
    }
}

impl std::fmt::Debug for PlaneBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaneBuffer")
            .field("size", &self.size)
            .field("stride", &self.stride)
            .finish()
    }
}

/// Color space attached to a frame, plus whether it was derived from the
/// bitstream rather than set authoritatively by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorSpaceHint {
    /// The description itself.
    pub color_space: ColorSpace,
    /// Derived values yield to any later authoritative value.
    pub derived: bool,
}

/// A decoded frame ready for the host.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    format: PixelFormat,
    planes: Vec<PlaneBuffer>,
    timestamp: f64,
    color_space: Option<ColorSpaceHint>,
}

impl VideoFrame {
    /// Wraps every plane of `picture` without copying pixel data.
    pub fn from_picture(picture: Picture) -> Self {
        let picture = Arc::new(picture);
        let (format, color_space) = picture.describe();
        let (width, height) = (picture.width(), picture.height());

        let planes = (0..format.plane_count())
            .map_while(|i| {
                let data = picture.raw.data[i].cast::<u8>().cast_const();
                if data.is_null() {
                    return None;
                }
                // chroma planes share the second stride
                let stride = picture.raw.stride[i.min(1)].unsigned_abs();
                let rows = format.plane_height(height, i) as usize;
                Some(PlaneBuffer {
                    data,
                    size: stride * rows,
                    stride,
                    _picture: Arc::clone(&picture),
                })
            })
            .collect();

        let mut frame = VideoFrame {
            width,
            height,
            format,
            planes,
            timestamp: to_seconds(picture.timestamp()),
            color_space: None,
        };
        frame.set_color_space(color_space, true);
        frame
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel format of the planes.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Planes in canonical order (Y, U, V or G, B, R).
    pub fn planes(&self) -> &[PlaneBuffer] {
        &self.planes
    }

    /// Consumes the frame, keeping only its planes.
    pub fn into_planes(self) -> Vec<PlaneBuffer> {
        self.planes
    }

    /// Presentation time in seconds.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Current color space, if any.
    pub fn color_space(&self) -> Option<ColorSpaceHint> {
        self.color_space
    }

    /// Sets the color space. A derived value never replaces an
    /// authoritative one; an authoritative value always wins.
    pub fn set_color_space(&mut self, color_space: ColorSpace, derived: bool) {
        if derived && matches!(self.color_space, Some(ColorSpaceHint { derived: false, .. })) {
            return;
        }
        self.color_space = Some(ColorSpaceHint {
            color_space,
            derived,
        });
    }
}
