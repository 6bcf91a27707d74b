//! The dav1d decode session.
//!
//! ```text
//! Packet ──wrap (zero-copy)──▸ InputData ──dav1d_send_data──▸ dav1d
//!                                                              │
//!                                          dav1d_get_picture ◂─┘ (0..N)
//!                                                  │
//!                                   Picture ─▸ VideoFrame ─▸ FrameSink
//! ```
//!
//! At most one input is in flight: a new packet is only wrapped once the
//! decoder consumed the previous one. The session is not internally
//! synchronized; hosts drive one session from one logical sequence.

use std::ffi::c_void;
use std::ptr::{self, NonNull};

use bytes::Bytes;

use crate::binding::Dav1dApi;
use crate::error::DecoderError;
use crate::options::{self, DecoderOptions, LibraryGeneration, ThreadingPlan};
use crate::picture::{self, Picture, VideoFrame};
use crate::sequence;
use crate::sys::*;

/// Codec identifier this decoder accepts.
pub const AV1_CODEC: &str = "av1";

/// One compressed access unit handed in by the host.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    /// Compressed bytes. Shared with the decoder, never copied.
    pub data: Bytes,
    /// Presentation time in seconds.
    pub pts: f64,
    /// Marks the end of the stream; `data` is ignored.
    pub end_of_stream: bool,
}

impl Packet {
    /// A regular packet.
    pub fn new(data: impl Into<Bytes>, pts: f64) -> Self {
        Self {
            data: data.into(),
            pts,
            end_of_stream: false,
        }
    }

    /// The end-of-stream marker.
    pub fn end_of_stream() -> Self {
        Self {
            end_of_stream: true,
            ..Self::default()
        }
    }
}

/// Stream parameters known at open time.
#[derive(Debug, Clone, Default)]
pub struct CodecParameters {
    /// Codec identifier, e.g. `"av1"`.
    pub codec: String,
    /// Out-of-band codec data (`av1C` or raw OBUs), if any.
    pub extradata: Option<Bytes>,
}

impl CodecParameters {
    /// Parameters for an AV1 stream without extradata.
    pub fn av1() -> Self {
        Self {
            codec: AV1_CODEC.to_string(),
            extradata: None,
        }
    }
}

/// What a successful [`VideoDecoder::decode`] call left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeProgress {
    /// Bytes of submitted input the decoder has not consumed yet. Until this
    /// reaches zero, further calls resubmit that input instead of the packet
    /// they are given.
    Pending(usize),
    /// End of stream: everything buffered has been emitted.
    Drained,
}

impl DecodeProgress {
    /// Integer form: leftover bytes, or `i32::MAX` once drained.
    pub fn code(self) -> i32 {
        match self {
            DecodeProgress::Pending(n) => i32::try_from(n).unwrap_or(i32::MAX - 1).min(i32::MAX - 1),
            DecodeProgress::Drained => i32::MAX,
        }
    }
}

/// Receives every frame a decode call produces, in output order.
pub trait FrameSink {
    /// Called once per decoded frame.
    fn frame_decoded(&mut self, frame: VideoFrame);
}

impl<F: FnMut(VideoFrame)> FrameSink for F {
    fn frame_decoded(&mut self, frame: VideoFrame) {
        self(frame)
    }
}

/// Host-facing video decoder contract.
pub trait VideoDecoder {
    /// Short decoder name.
    fn name(&self) -> &'static str;
    /// Creates the decoder for `params`.
    fn open(&mut self, params: &CodecParameters) -> Result<(), DecoderError>;
    /// Releases the decoder. Frames already emitted stay valid.
    fn close(&mut self) -> Result<(), DecoderError>;
    /// Drops buffered input and decoder state, e.g. on seek.
    fn flush(&mut self) -> Result<(), DecoderError>;
    /// Submits `packet` and emits every picture that became available.
    fn decode(
        &mut self,
        packet: &Packet,
        sink: &mut dyn FrameSink,
    ) -> Result<DecodeProgress, DecoderError>;
}

/// Owning handle to a `Dav1dContext`.
struct DecoderContext {
    raw: NonNull<Dav1dContext>,
    api: &'static Dav1dApi,
}

// SAFETY:
// - A dav1d context is not bound to the thread that created it; any thread
//   may drive it as long as calls are not concurrent.
// - The context has a single owner (`OpenSession`) and is never shared, so
//   moving it moves all access with it. No `Sync`: there is no locking.
unsafe impl Send for DecoderContext {}

impl DecoderContext {
    fn open(api: &'static Dav1dApi, settings: &Dav1dSettings) -> Result<Self, DecoderError> {
        let mut raw: *mut Dav1dContext = ptr::null_mut();
        // SAFETY: `raw` and `settings` are valid for the call.
        let status = unsafe { api.dav1d_open(&mut raw, settings) };
        if status < 0 {
            return Err(DecoderError::OpenFailed(status));
        }
        // a missing entry point reports success without creating anything
        let raw = NonNull::new(raw).ok_or(DecoderError::LibraryUnavailable)?;
        Ok(Self { raw, api })
    }

    fn as_ptr(&self) -> *mut Dav1dContext {
        self.raw.as_ptr()
    }

    fn flush(&mut self) {
        // SAFETY: the context is live until drop.
        unsafe { self.api.dav1d_flush(self.as_ptr()) };
    }
}

impl Drop for DecoderContext {
    fn drop(&mut self) {
        let mut raw = self.as_ptr();
        // SAFETY: we own the context; dav1d_close nulls our copy.
        unsafe { self.api.dav1d_close(&mut raw) };
    }
}

/// The input currently owned by the session.
///
/// While non-empty it references the caller's packet through a boxed
/// `Bytes` handle passed to the library as the release cookie; the library
/// drops it exactly once through [`release_packet`].
struct InputData {
    raw: Box<Dav1dData>,
    api: &'static Dav1dApi,
}

unsafe extern "C" fn release_packet(_buf: *const u8, cookie: *mut c_void) {
    // SAFETY: `cookie` came from `Box::into_raw` in `InputData::wrap` and
    // the library invokes this callback once per wrapped buffer.
    drop(unsafe { Box::from_raw(cookie.cast::<Bytes>()) });
}

// SAFETY: the raw pointers reference the caller's `Bytes` (kept alive by the
// boxed cookie, itself `Send`) and the library's data reference, which is
// released from whichever thread owns the input. There is one owner.
unsafe impl Send for InputData {}

impl InputData {
    fn empty(api: &'static Dav1dApi) -> Self {
        Self {
            raw: Box::new(Dav1dData::default()),
            api,
        }
    }

    /// Bytes not yet consumed by the decoder.
    fn pending(&self) -> usize {
        self.raw.sz
    }

    fn wrap(&mut self, data: &Bytes, pts: f64) -> Result<(), DecoderError> {
        debug_assert_eq!(self.pending(), 0);
        self.reset();

        let cookie = Box::into_raw(Box::new(data.clone()));
        // SAFETY: the wrapped bytes are kept alive by `cookie` until the
        // library calls `release_packet`.
        let status = unsafe {
            self.api.dav1d_data_wrap(
                &mut *self.raw,
                data.as_ptr(),
                data.len(),
                Some(release_packet),
                cookie.cast(),
            )
        };
        if status < 0 || self.raw.r#ref.is_null() {
            // the library did not take the cookie
            // SAFETY: `cookie` is still exclusively ours.
            drop(unsafe { Box::from_raw(cookie) });
            *self.raw = Dav1dData::default();
            return Err(DecoderError::InputWrap(status.min(-1)));
        }
        self.raw.m.timestamp = picture::to_ticks(pts);
        Ok(())
    }

    fn as_mut_ptr(&mut self) -> *mut Dav1dData {
        &mut *self.raw
    }

    fn reset(&mut self) {
        if !self.raw.r#ref.is_null() {
            // SAFETY: the reference was created by dav1d_data_wrap.
            unsafe { self.api.dav1d_data_unref(&mut *self.raw) };
        }
        *self.raw = Dav1dData::default();
    }
}

impl Drop for InputData {
    fn drop(&mut self) {
        self.reset();
    }
}

struct OpenSession {
    // field order: pending input is released before the context closes
    input: InputData,
    context: DecoderContext,
}

/// AV1 decoder backed by a runtime-loaded dav1d.
pub struct Dav1dDecoder {
    api: &'static Dav1dApi,
    options: DecoderOptions,
    session: Option<OpenSession>,
}

impl Dav1dDecoder {
    /// Decoder bound to the process-wide library.
    pub fn new(options: DecoderOptions) -> Self {
        Self::with_api(Dav1dApi::global(), options)
    }

    /// Decoder bound to a specific binding.
    pub fn with_api(api: &'static Dav1dApi, options: DecoderOptions) -> Self {
        Self {
            api,
            options,
            session: None,
        }
    }

    /// Options used at the next [`VideoDecoder::open`].
    pub fn options_mut(&mut self) -> &mut DecoderOptions {
        &mut self.options
    }

    /// Whether a decoder context exists.
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Bytes of the current input not yet consumed, `0` when closed.
    pub fn pending_input(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.input.pending())
    }

    fn settings(&self, version: &str) -> Box<Dav1dSettings> {
        let mut settings = Dav1dSettings::zeroed();
        // SAFETY: storage is larger than every known Dav1dSettings layout.
        unsafe { self.api.dav1d_default_settings(&mut *settings) };
        // the library's default logger stays installed: its callback takes a
        // `va_list`, which has no stable Rust representation

        let generation = LibraryGeneration::from_version(version).unwrap_or(LibraryGeneration::Current);
        let plan = self
            .options
            .threading_plan(generation, options::hardware_threads());
        match plan {
            ThreadingPlan::Combined { threads } => {
                tracing::debug!(threads, "dav1d threading");
            }
            ThreadingPlan::Split {
                frame_threads,
                tile_threads,
            } => {
                tracing::debug!(frame_threads, tile_threads, "dav1d threading");
            }
        }
        let [first, second] = plan.settings_slots();
        settings.set_slot(0, first);
        if let ThreadingPlan::Split { .. } = plan {
            settings.set_slot(1, second);
        }
        settings
    }

    fn drain(
        session: &mut OpenSession,
        api: &'static Dav1dApi,
        sink: &mut dyn FrameSink,
    ) -> Result<(), DecoderError> {
        loop {
            let mut raw = Box::new(Dav1dPicture::default());
            // SAFETY: context is live; `raw` is a valid out parameter.
            let status = unsafe { api.dav1d_get_picture(session.context.as_ptr(), &mut *raw) };
            if status == DAV1D_EAGAIN {
                return Ok(());
            }
            if status < 0 {
                tracing::warn!(status, "dav1d_get_picture failed");
                return Err(DecoderError::Receive(status));
            }
            if raw.data[0].is_null() {
                // a missing entry point reports success without a picture
                return Ok(());
            }
            // SAFETY: dav1d_get_picture handed us one reference.
            let picture = unsafe { Picture::from_raw(raw, api) };
            sink.frame_decoded(VideoFrame::from_picture(picture));
        }
    }
}

impl VideoDecoder for Dav1dDecoder {
    fn name(&self) -> &'static str {
        "dav1d"
    }

    fn open(&mut self, params: &CodecParameters) -> Result<(), DecoderError> {
        if params.codec != AV1_CODEC {
            return Err(DecoderError::UnsupportedCodec(params.codec.clone()));
        }
        let Some(version) = self.api.version() else {
            return Err(DecoderError::LibraryUnavailable);
        };
        tracing::debug!(version = %version, "dav1d runtime");

        // reopening replaces the previous context
        self.session = None;

        if let Some(info) = params
            .extradata
            .as_deref()
            .and_then(|data| sequence::probe(self.api, data))
        {
            tracing::debug!(
                width = info.max_width,
                height = info.max_height,
                format = ?info.format,
                "sequence header"
            );
        }

        let settings = self.settings(&version);
        let context = DecoderContext::open(self.api, &settings)?;
        self.session = Some(OpenSession {
            input: InputData::empty(self.api),
            context,
        });
        tracing::debug!("dav1d decoder opened");
        Ok(())
    }

    fn close(&mut self) -> Result<(), DecoderError> {
        if self.session.take().is_some() {
            tracing::debug!("dav1d decoder closed");
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DecoderError> {
        let session = self.session.as_mut().ok_or(DecoderError::NotOpen)?;
        session.context.flush();
        session.input.reset();
        tracing::debug!("dav1d decoder flushed");
        Ok(())
    }

    fn decode(
        &mut self,
        packet: &Packet,
        sink: &mut dyn FrameSink,
    ) -> Result<DecodeProgress, DecoderError> {
        let api = self.api;
        let session = self.session.as_mut().ok_or(DecoderError::NotOpen)?;

        if session.input.pending() == 0 && !packet.end_of_stream {
            session.input.wrap(&packet.data, packet.pts)?;
        }

        // SAFETY: context is live; input is either empty or wrapped.
        let status = unsafe { api.dav1d_send_data(session.context.as_ptr(), session.input.as_mut_ptr()) };
        if status < 0 && status != DAV1D_EAGAIN {
            tracing::warn!(status, "dav1d_send_data failed");
            return Err(DecoderError::Send(status));
        }

        Self::drain(session, api, sink)?;

        if packet.end_of_stream {
            Ok(DecodeProgress::Drained)
        } else {
            Ok(DecodeProgress::Pending(session.input.pending()))
        }
    }
}
