#![deny(missing_docs)]

//! AV1 decoding through a dav1d shared library loaded at runtime.
//!
//! Nothing links against dav1d at build time: the library is located on
//! first use and every entry point is resolved lazily. Decoded pictures are
//! exposed as zero-copy frames that stay valid after the decoder is closed.

/// Lazily resolved dav1d entry points.
pub mod binding;

/// Error types used by the decoder and the command-line tool.
pub mod error;

/// Pixel format and color description mapping.
pub mod format;

/// Reader for AV1 streams in IVF containers.
pub mod ivf;

/// Shared library discovery.
pub mod locator;

/// Decoder options and the threading heuristic.
pub mod options;

/// Zero-copy frames over decoded pictures.
pub mod picture;

/// Sequence header probing.
pub mod sequence;

/// Decode session state machine and host-facing traits.
pub mod session;

/// Raw `#[repr(C)]` mirrors of the dav1d ABI.
pub mod sys;

#[cfg(test)]
mod fake;

pub use binding::Dav1dApi;
pub use error::{AppError, DecoderError};
pub use format::{ColorRange, ColorSpace, PixelFormat};
pub use locator::LibraryLocator;
pub use options::DecoderOptions;
pub use picture::{PlaneBuffer, VideoFrame};
pub use session::{
    CodecParameters, DecodeProgress, Dav1dDecoder, FrameSink, Packet, VideoDecoder,
};
