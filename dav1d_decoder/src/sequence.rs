use crate::binding::Dav1dApi;
use crate::format::{self, ColorSpace, PixelFormat};
use crate::sys::Dav1dSequenceHeaderStorage;

/// Stream properties read from an AV1 sequence header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceInfo {
    /// Seq profile (0 main, 1 high, 2 professional).
    pub profile: u8,
    /// Largest frame width the stream may use.
    pub max_width: u32,
    /// Largest frame height the stream may use.
    pub max_height: u32,
    /// Output format frames of this sequence will have.
    pub format: PixelFormat,
    /// Signaled color description.
    pub color_space: ColorSpace,
}

/// Parses the first sequence header found in `obus`.
///
/// Accepts raw OBUs or an `av1C` record, whose 4-byte prefix is skipped.
/// `None` when the library is missing or no sequence header is present.
pub fn probe(api: &Dav1dApi, obus: &[u8]) -> Option<SequenceInfo> {
    let obus = strip_av1c_prefix(obus);
    if obus.is_empty() {
        return None;
    }

    let mut storage = Dav1dSequenceHeaderStorage::zeroed();
    // SAFETY: storage outlives the call and is large enough for the full
    // header; `obus` is a valid slice for the duration of the call.
    let status =
        unsafe { api.dav1d_parse_sequence_header(storage.as_mut_ptr(), obus.as_ptr(), obus.len()) };
    let hdr = storage.header();
    // a missing entry point reports success without writing anything
    if status < 0 || hdr.max_width <= 0 {
        tracing::debug!(status, "no sequence header in codec data");
        return None;
    }

    let (format, color_space) = format::describe(hdr.layout, hdr);
    Some(SequenceInfo {
        profile: hdr.profile,
        max_width: u32::try_from(hdr.max_width).unwrap_or(0),
        max_height: u32::try_from(hdr.max_height).unwrap_or(0),
        format,
        color_space,
    })
}

/// `av1C` starts with marker bit + version 1, i.e. `0x81`.
fn strip_av1c_prefix(data: &[u8]) -> &[u8] {
    match data {
        [0x81, _, _, _, rest @ ..] => rest,
        _ => data,
    }
}
