//! `#[repr(C)]` mirror of the subset of the dav1d ABI this crate consumes.
//!
//! Layouts follow the dav1d 1.x headers (API 7). Structs the library only
//! hands back through pointers (`Dav1dSequenceHeader`) are declared as
//! prefixes; structs whose layout moved between library generations
//! (`Dav1dSettings`) are opaque storage with slot accessors.
//!
//! # Safety
//!
//! Nothing in here is safe to hand to the library on its own. The owning
//! wrappers in `session` and `picture` enforce the lifetimes.

#![allow(non_camel_case_types, missing_docs)]

use std::ffi::{c_int, c_uint, c_void};
use std::ptr;

/// `DAV1D_ERR(EAGAIN)`: queue full on send, nothing ready on receive.
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
))]
pub const DAV1D_EAGAIN: c_int = -35;
#[cfg(not(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
)))]
pub const DAV1D_EAGAIN: c_int = -11;

/// Upper bound for tile threads in the legacy settings layout.
pub const DAV1D_MAX_TILE_THREADS: u32 = 64;
/// Upper bound for frame threads in the legacy settings layout.
pub const DAV1D_MAX_FRAME_THREADS: u32 = 256;

// ─── Pixel layout ────────────────────────────────────────────────────────

pub type Dav1dPixelLayout = c_uint;
pub const DAV1D_PIXEL_LAYOUT_I400: Dav1dPixelLayout = 0;
pub const DAV1D_PIXEL_LAYOUT_I420: Dav1dPixelLayout = 1;
pub const DAV1D_PIXEL_LAYOUT_I422: Dav1dPixelLayout = 2;
pub const DAV1D_PIXEL_LAYOUT_I444: Dav1dPixelLayout = 3;

// ─── Opaque handles ──────────────────────────────────────────────────────

#[repr(C)]
pub struct Dav1dContext {
    _private: [u8; 0],
}

#[repr(C)]
pub struct Dav1dRef {
    _private: [u8; 0],
}

#[repr(C)]
pub struct Dav1dFrameHeader {
    _private: [u8; 0],
}

#[repr(C)]
pub struct Dav1dContentLightLevel {
    _private: [u8; 0],
}

#[repr(C)]
pub struct Dav1dMasteringDisplay {
    _private: [u8; 0],
}

#[repr(C)]
pub struct Dav1dITUTT35 {
    _private: [u8; 0],
}

/// Release callback handed to `dav1d_data_wrap`.
pub type Dav1dFreeCallback = Option<unsafe extern "C" fn(buf: *const u8, cookie: *mut c_void)>;

// ─── Data ────────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Dav1dUserData {
    pub data: *const u8,
    pub r#ref: *mut Dav1dRef,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Dav1dDataProps {
    pub timestamp: i64,
    pub duration: i64,
    pub offset: i64,
    pub size: usize,
    pub user_data: Dav1dUserData,
}

#[repr(C)]
#[derive(Debug)]
pub struct Dav1dData {
    pub data: *const u8,
    pub sz: usize,
    pub r#ref: *mut Dav1dRef,
    pub m: Dav1dDataProps,
}

impl Default for Dav1dUserData {
    fn default() -> Self {
        Self {
            data: ptr::null(),
            r#ref: ptr::null_mut(),
        }
    }
}

impl Default for Dav1dDataProps {
    fn default() -> Self {
        Self {
            // INT64_MIN marks "no timestamp" inside the library.
            timestamp: i64::MIN,
            duration: 0,
            offset: -1,
            size: 0,
            user_data: Dav1dUserData::default(),
        }
    }
}

impl Default for Dav1dData {
    fn default() -> Self {
        Self {
            data: ptr::null(),
            sz: 0,
            r#ref: ptr::null_mut(),
            m: Dav1dDataProps::default(),
        }
    }
}

// ─── Sequence header ─────────────────────────────────────────────────────

/// Leading fields of `Dav1dSequenceHeader`. Only ever read through a
/// pointer owned by the library or through [`Dav1dSequenceHeaderStorage`].
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Dav1dSequenceHeader {
    pub profile: u8,
    pub max_width: c_int,
    pub max_height: c_int,
    pub layout: Dav1dPixelLayout,
    pub pri: c_uint,
    pub trc: c_uint,
    pub mtrx: c_uint,
    pub chr: c_uint,
    /// 0, 1, 2 for 8, 10, 12 bits per component.
    pub hbd: u8,
    pub color_range: u8,
}

/// Caller-owned backing store large enough for the full
/// `Dav1dSequenceHeader` of every known library generation.
#[repr(C, align(8))]
pub struct Dav1dSequenceHeaderStorage {
    bytes: [u8; 4096],
}

impl Dav1dSequenceHeaderStorage {
    pub fn zeroed() -> Box<Self> {
        Box::new(Self { bytes: [0; 4096] })
    }

    pub fn as_mut_ptr(&mut self) -> *mut Dav1dSequenceHeader {
        self.bytes.as_mut_ptr().cast()
    }

    pub fn header(&self) -> &Dav1dSequenceHeader {
        // SAFETY: storage is 8-aligned, larger than the prefix, and every
        // bit pattern of the prefix fields is a valid value.
        unsafe { &*self.bytes.as_ptr().cast::<Dav1dSequenceHeader>() }
    }
}

// ─── Picture ─────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Dav1dPictureParameters {
    pub w: c_int,
    pub h: c_int,
    pub layout: Dav1dPixelLayout,
    pub bpc: c_int,
}

#[repr(C)]
#[derive(Debug)]
pub struct Dav1dPicture {
    pub seq_hdr: *mut Dav1dSequenceHeader,
    pub frame_hdr: *mut Dav1dFrameHeader,
    pub data: [*mut c_void; 3],
    pub stride: [isize; 2],
    pub p: Dav1dPictureParameters,
    pub m: Dav1dDataProps,
    pub content_light: *mut Dav1dContentLightLevel,
    pub mastering_display: *mut Dav1dMasteringDisplay,
    pub itut_t35: *mut Dav1dITUTT35,
    pub n_itut_t35: usize,
    pub reserved: [usize; 4],
    pub frame_hdr_ref: *mut Dav1dRef,
    pub seq_hdr_ref: *mut Dav1dRef,
    pub content_light_ref: *mut Dav1dRef,
    pub mastering_display_ref: *mut Dav1dRef,
    pub itut_t35_ref: *mut Dav1dRef,
    pub reserved_ref: [usize; 4],
    pub r#ref: *mut Dav1dRef,
    pub allocator_data: *mut c_void,
}

impl Default for Dav1dPicture {
    fn default() -> Self {
        Self {
            seq_hdr: ptr::null_mut(),
            frame_hdr: ptr::null_mut(),
            data: [ptr::null_mut(); 3],
            stride: [0; 2],
            p: Dav1dPictureParameters::default(),
            m: Dav1dDataProps::default(),
            content_light: ptr::null_mut(),
            mastering_display: ptr::null_mut(),
            itut_t35: ptr::null_mut(),
            n_itut_t35: 0,
            reserved: [0; 4],
            frame_hdr_ref: ptr::null_mut(),
            seq_hdr_ref: ptr::null_mut(),
            content_light_ref: ptr::null_mut(),
            mastering_display_ref: ptr::null_mut(),
            itut_t35_ref: ptr::null_mut(),
            reserved_ref: [0; 4],
            r#ref: ptr::null_mut(),
            allocator_data: ptr::null_mut(),
        }
    }
}

// ─── Settings ────────────────────────────────────────────────────────────

/// Generation-agnostic `Dav1dSettings` storage.
///
/// The library fills it via `dav1d_default_settings`. Only the two leading
/// `int` fields are touched from Rust: `n_threads`/`max_frame_delay` in
/// 1.x, `n_frame_threads`/`n_tile_threads` in 0.x.
#[repr(C, align(8))]
pub struct Dav1dSettings {
    words: [c_int; 256],
}

impl Dav1dSettings {
    pub fn zeroed() -> Box<Self> {
        Box::new(Self { words: [0; 256] })
    }

    pub fn slot(&self, index: usize) -> c_int {
        self.words[index]
    }

    pub fn set_slot(&mut self, index: usize, value: c_int) {
        self.words[index] = value;
    }
}
