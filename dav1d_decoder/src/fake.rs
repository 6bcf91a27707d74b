//! In-process stand-in for the dav1d shared library.
//!
//! Exports the consumed ABI as `extern "C"` functions behind a
//! [`SymbolSource`]. Each packet payload becomes one 16x8 picture whose
//! bytes describe it: `[layout, hbd, primaries, transfer, matrix, range]`.
//! Behavior knobs and counters live in a [`FakeControl`] bound to the
//! current test thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::binding::{Dav1dApi, SymbolSource};
use crate::sys::*;

pub const WIDTH: u32 = 16;
pub const HEIGHT: u32 = 8;
pub const LUMA_STRIDE: usize = 64;
pub const CHROMA_STRIDE: usize = 32;

const EINVAL: c_int = -22;
const ENOENT: c_int = -2;

pub struct FakeControl {
    pub version: Mutex<&'static CStr>,
    /// Pictures held back until more than this many are queued.
    pub delay: AtomicUsize,
    /// Upcoming sends answered with EAGAIN.
    pub reject_sends: AtomicUsize,
    pub fail_open: AtomicBool,
    pub fail_send: AtomicBool,
    pub fail_receive: AtomicBool,

    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub flushes: AtomicUsize,
    pub pictures_created: AtomicUsize,
    pub pictures_released: AtomicUsize,
    pub inputs_wrapped: AtomicUsize,
    pub inputs_released: AtomicUsize,
    pub settings: Mutex<Option<[c_int; 2]>>,
    pub received: Mutex<Vec<Vec<u8>>>,
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<FakeControl>>> = const { RefCell::new(None) };
}

impl FakeControl {
    /// Fresh control, bound to the calling thread.
    pub fn new() -> Arc<Self> {
        let control = Arc::new(Self {
            version: Mutex::new(c"1.4.3"),
            delay: AtomicUsize::new(0),
            reject_sends: AtomicUsize::new(0),
            fail_open: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            fail_receive: AtomicBool::new(false),
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            pictures_created: AtomicUsize::new(0),
            pictures_released: AtomicUsize::new(0),
            inputs_wrapped: AtomicUsize::new(0),
            inputs_released: AtomicUsize::new(0),
            settings: Mutex::new(None),
            received: Mutex::new(Vec::new()),
        });
        CURRENT.with(|c| *c.borrow_mut() = Some(Arc::clone(&control)));
        control
    }

    pub fn set_version(&self, version: &'static CStr) {
        *self.version.lock().unwrap() = version;
    }
}

/// Binds an existing control to the calling thread.
pub fn bind(control: &Arc<FakeControl>) {
    CURRENT.with(|c| *c.borrow_mut() = Some(Arc::clone(control)));
}

fn current() -> Arc<FakeControl> {
    CURRENT
        .with(|c| c.borrow().clone())
        .unwrap_or_else(FakeControl::new)
}

struct FakeContext {
    control: Arc<FakeControl>,
    queue: VecDeque<(Vec<u8>, i64)>,
    draining: bool,
}

struct FakePicture {
    planes: Vec<Vec<u8>>,
    seq: Dav1dSequenceHeader,
    control: Arc<FakeControl>,
}

struct FakeDataRef {
    free: Dav1dFreeCallback,
    cookie: *mut c_void,
    buf: *const u8,
    owned: Option<Box<[u8]>>,
    user: Option<(Dav1dFreeCallback, *mut c_void, *const u8)>,
    control: Arc<FakeControl>,
}

/// Builds a picture the way `dav1d_get_picture` would fill it.
pub fn picture(control: &Arc<FakeControl>, payload: &[u8], timestamp: i64) -> Box<Dav1dPicture> {
    let byte = |i: usize, default: u8| payload.get(i).copied().unwrap_or(default);
    let layout = Dav1dPixelLayout::from(byte(0, DAV1D_PIXEL_LAYOUT_I420 as u8));

    let chroma_rows = match layout {
        DAV1D_PIXEL_LAYOUT_I420 => HEIGHT as usize / 2,
        _ => HEIGHT as usize,
    };
    let mut planes = vec![vec![0x10u8; LUMA_STRIDE * HEIGHT as usize]];
    if layout != DAV1D_PIXEL_LAYOUT_I400 {
        planes.push(vec![0x80u8; CHROMA_STRIDE * chroma_rows]);
        planes.push(vec![0x80u8; CHROMA_STRIDE * chroma_rows]);
    }

    let mut owner = Box::new(FakePicture {
        planes,
        seq: Dav1dSequenceHeader {
            profile: 0,
            max_width: WIDTH as c_int,
            max_height: HEIGHT as c_int,
            layout,
            pri: byte(2, 1).into(),
            trc: byte(3, 1).into(),
            mtrx: byte(4, 1).into(),
            chr: 0,
            hbd: byte(1, 0),
            color_range: byte(5, 0),
        },
        control: Arc::clone(control),
    });

    let mut pic = Box::new(Dav1dPicture::default());
    pic.seq_hdr = &mut owner.seq;
    for (slot, plane) in pic.data.iter_mut().zip(owner.planes.iter_mut()) {
        *slot = plane.as_mut_ptr().cast();
    }
    pic.stride = [LUMA_STRIDE as isize, CHROMA_STRIDE as isize];
    pic.p = Dav1dPictureParameters {
        w: WIDTH as c_int,
        h: HEIGHT as c_int,
        layout,
        bpc: 8 + 2 * c_int::from(owner.seq.hbd),
    };
    pic.m.timestamp = timestamp;
    pic.r#ref = Box::into_raw(owner).cast();
    control.pictures_created.fetch_add(1, Ordering::SeqCst);
    pic
}

unsafe extern "C" fn fake_version() -> *const c_char {
    let control = current();
    let version = *control.version.lock().unwrap();
    version.as_ptr()
}

unsafe extern "C" fn fake_default_settings(s: *mut Dav1dSettings) {
    let s = unsafe { &mut *s };
    s.set_slot(0, 0);
    s.set_slot(1, 0);
    s.set_slot(2, 1);
}

unsafe extern "C" fn fake_open(c_out: *mut *mut Dav1dContext, s: *const Dav1dSettings) -> c_int {
    let control = current();
    if control.fail_open.load(Ordering::SeqCst) {
        return EINVAL;
    }
    let s = unsafe { &*s };
    *control.settings.lock().unwrap() = Some([s.slot(0), s.slot(1)]);
    control.opened.fetch_add(1, Ordering::SeqCst);
    let ctx = Box::new(FakeContext {
        control,
        queue: VecDeque::new(),
        draining: false,
    });
    unsafe { *c_out = Box::into_raw(ctx).cast() };
    0
}

unsafe extern "C" fn fake_parse_sequence_header(
    out: *mut Dav1dSequenceHeader,
    buf: *const u8,
    sz: usize,
) -> c_int {
    if buf.is_null() || sz == 0 {
        return ENOENT;
    }
    let payload = unsafe { std::slice::from_raw_parts(buf, sz) };
    let control = current();
    let pic = picture(&control, payload, 0);
    unsafe {
        *out = *pic.seq_hdr;
        let mut pic = pic;
        fake_picture_unref(&mut *pic);
    }
    0
}

unsafe extern "C" fn fake_send_data(c: *mut Dav1dContext, data: *mut Dav1dData) -> c_int {
    let ctx = unsafe { &mut *c.cast::<FakeContext>() };
    let data = unsafe { &mut *data };
    if ctx.control.fail_send.load(Ordering::SeqCst) {
        return EINVAL;
    }
    if data.data.is_null() || data.sz == 0 {
        ctx.draining = true;
        return 0;
    }
    let rejected = ctx
        .control
        .reject_sends
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    if rejected.is_ok() {
        return DAV1D_EAGAIN;
    }

    ctx.draining = false;
    let payload = unsafe { std::slice::from_raw_parts(data.data, data.sz) }.to_vec();
    ctx.control.received.lock().unwrap().push(payload.clone());
    ctx.queue.push_back((payload, data.m.timestamp));
    unsafe { fake_data_unref(data) };
    0
}

unsafe extern "C" fn fake_get_picture(c: *mut Dav1dContext, out: *mut Dav1dPicture) -> c_int {
    let ctx = unsafe { &mut *c.cast::<FakeContext>() };
    if ctx.control.fail_receive.load(Ordering::SeqCst) {
        return EINVAL;
    }
    let ready = ctx.queue.len() > ctx.control.delay.load(Ordering::SeqCst)
        || (ctx.draining && !ctx.queue.is_empty());
    if !ready {
        return DAV1D_EAGAIN;
    }
    let Some((payload, timestamp)) = ctx.queue.pop_front() else {
        return DAV1D_EAGAIN;
    };
    let pic = picture(&ctx.control, &payload, timestamp);
    unsafe { out.write(*pic) };
    0
}

unsafe extern "C" fn fake_close(c_out: *mut *mut Dav1dContext) {
    let c = unsafe { *c_out };
    if c.is_null() {
        return;
    }
    let ctx = unsafe { Box::from_raw(c.cast::<FakeContext>()) };
    ctx.control.closed.fetch_add(1, Ordering::SeqCst);
    unsafe { *c_out = ptr::null_mut() };
}

unsafe extern "C" fn fake_flush(c: *mut Dav1dContext) {
    let ctx = unsafe { &mut *c.cast::<FakeContext>() };
    ctx.queue.clear();
    ctx.draining = false;
    ctx.control.flushes.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn fake_data_create(data: *mut Dav1dData, sz: usize) -> *mut u8 {
    let mut owned = vec![0u8; sz].into_boxed_slice();
    let buf = owned.as_mut_ptr();
    let holder = Box::new(FakeDataRef {
        free: None,
        cookie: ptr::null_mut(),
        buf,
        owned: Some(owned),
        user: None,
        control: current(),
    });
    let data = unsafe { &mut *data };
    *data = Dav1dData {
        data: buf,
        sz,
        r#ref: Box::into_raw(holder).cast(),
        m: Dav1dDataProps {
            size: sz,
            ..Dav1dDataProps::default()
        },
    };
    buf
}

unsafe extern "C" fn fake_data_wrap(
    data: *mut Dav1dData,
    buf: *const u8,
    sz: usize,
    free_callback: Dav1dFreeCallback,
    cookie: *mut c_void,
) -> c_int {
    if buf.is_null() || sz == 0 || free_callback.is_none() {
        return EINVAL;
    }
    let control = current();
    control.inputs_wrapped.fetch_add(1, Ordering::SeqCst);
    let holder = Box::new(FakeDataRef {
        free: free_callback,
        cookie,
        buf,
        owned: None,
        user: None,
        control,
    });
    let data = unsafe { &mut *data };
    *data = Dav1dData {
        data: buf,
        sz,
        r#ref: Box::into_raw(holder).cast(),
        m: Dav1dDataProps {
            size: sz,
            ..Dav1dDataProps::default()
        },
    };
    0
}

unsafe extern "C" fn fake_data_wrap_user_data(
    data: *mut Dav1dData,
    user_data: *const u8,
    free_callback: Dav1dFreeCallback,
    cookie: *mut c_void,
) -> c_int {
    let data = unsafe { &mut *data };
    if data.r#ref.is_null() || free_callback.is_none() {
        return EINVAL;
    }
    let holder = unsafe { &mut *data.r#ref.cast::<FakeDataRef>() };
    holder.user = Some((free_callback, cookie, user_data));
    data.m.user_data.data = user_data;
    0
}

unsafe extern "C" fn fake_data_unref(data: *mut Dav1dData) {
    let data = unsafe { &mut *data };
    if data.r#ref.is_null() {
        return;
    }
    let holder = unsafe { Box::from_raw(data.r#ref.cast::<FakeDataRef>()) };
    if let Some(free) = holder.free {
        unsafe { free(holder.buf, holder.cookie) };
        holder.control.inputs_released.fetch_add(1, Ordering::SeqCst);
    }
    if let Some((Some(free), cookie, user_data)) = holder.user {
        unsafe { free(user_data, cookie) };
    }
    drop(holder.owned);
    *data = Dav1dData::default();
}

unsafe extern "C" fn fake_picture_unref(p: *mut Dav1dPicture) {
    let p = unsafe { &mut *p };
    if p.r#ref.is_null() {
        return;
    }
    let owner = unsafe { Box::from_raw(p.r#ref.cast::<FakePicture>()) };
    owner.control.pictures_released.fetch_add(1, Ordering::SeqCst);
    *p = Dav1dPicture::default();
}

macro_rules! entry {
    ($name:literal, $f:expr) => {
        (concat!($name, "\0").as_bytes(), $f as *const () as usize)
    };
}

/// The fake's exported symbol table.
pub struct FakeLibrary {
    symbols: Vec<(&'static [u8], usize)>,
    lookups: Arc<AtomicUsize>,
}

impl FakeLibrary {
    pub fn new() -> Self {
        let symbols = vec![
            entry!("dav1d_version", fake_version),
            entry!("dav1d_default_settings", fake_default_settings),
            entry!("dav1d_open", fake_open),
            entry!("dav1d_parse_sequence_header", fake_parse_sequence_header),
            entry!("dav1d_send_data", fake_send_data),
            entry!("dav1d_get_picture", fake_get_picture),
            entry!("dav1d_close", fake_close),
            entry!("dav1d_flush", fake_flush),
            entry!("dav1d_data_create", fake_data_create),
            entry!("dav1d_data_wrap", fake_data_wrap),
            entry!("dav1d_data_wrap_user_data", fake_data_wrap_user_data),
            entry!("dav1d_data_unref", fake_data_unref),
            entry!("dav1d_picture_unref", fake_picture_unref),
        ];
        Self {
            symbols,
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Drops `name` from the export table.
    pub fn without(mut self, name: &str) -> Self {
        self.symbols
            .retain(|(symbol, _)| symbol.strip_suffix(b"\0") != Some(name.as_bytes()));
        self
    }

    /// Shared counter of `symbol` lookups.
    pub fn lookups(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.lookups)
    }
}

impl SymbolSource for FakeLibrary {
    fn symbol(&self, name: &[u8]) -> Option<*mut c_void> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.symbols
            .iter()
            .find(|(symbol, _)| *symbol == name)
            .map(|(_, address)| *address as *mut c_void)
    }
}

/// Shared binding over a complete fake library.
pub fn api() -> &'static Dav1dApi {
    static API: OnceLock<Dav1dApi> = OnceLock::new();
    API.get_or_init(|| Dav1dApi::from_source(FakeLibrary::new()))
}

/// A leaked binding over `library`, for tests that remove symbols.
pub fn api_with(library: FakeLibrary) -> &'static Dav1dApi {
    Box::leak(Box::new(Dav1dApi::from_source(library)))
}
