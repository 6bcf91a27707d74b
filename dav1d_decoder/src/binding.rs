use std::ffi::{CStr, c_char, c_int, c_void};
use std::sync::OnceLock;

use libloading::Library;

use crate::locator::LibraryLocator;
use crate::sys::*;

/// Anything that can hand out raw symbol addresses by name.
///
/// Implemented for [`libloading::Library`]; tests and hosts that already
/// hold the decoder's entry points can provide their own.
pub trait SymbolSource: Send + Sync {
    /// Address of the NUL-terminated symbol `name`, if exported.
    fn symbol(&self, name: &[u8]) -> Option<*mut c_void>;
}

impl SymbolSource for Library {
    fn symbol(&self, name: &[u8]) -> Option<*mut c_void> {
        // SAFETY: the symbol is read as an untyped address; it only becomes
        // callable through `EntryPoint`, which fixes the signature.
        unsafe { self.get::<*mut c_void>(name) }.ok().map(|sym| *sym)
    }
}

type Loader = Box<dyn Fn() -> Option<Box<dyn SymbolSource>> + Send + Sync>;

fn no_library() -> Option<Box<dyn SymbolSource>> {
    None
}

/// A named function pointer resolved on first use and cached for the
/// lifetime of its owner, including a cached miss.
pub struct EntryPoint<F> {
    name: &'static [u8],
    resolved: OnceLock<Option<F>>,
}

impl<F: Copy> EntryPoint<F> {
    /// `name` must be NUL-terminated.
    pub const fn new(name: &'static [u8]) -> Self {
        Self {
            name,
            resolved: OnceLock::new(),
        }
    }

    /// Symbol name without the terminator.
    pub fn name(&self) -> &str {
        let bytes = self.name.strip_suffix(b"\0").unwrap_or(self.name);
        std::str::from_utf8(bytes).unwrap_or("?")
    }

    /// Resolves at most once. `library` is only consulted on the first call.
    pub fn get<'a>(&self, library: impl FnOnce() -> Option<&'a dyn SymbolSource>) -> Option<F> {
        *self.resolved.get_or_init(|| {
            let address = library()?.symbol(self.name).filter(|p| !p.is_null());
            if address.is_none() {
                tracing::debug!(symbol = self.name(), "dav1d entry point not found");
            }
            debug_assert_eq!(size_of::<F>(), size_of::<*mut c_void>());
            // SAFETY: `F` is always an `unsafe extern "C" fn` pointer type
            // declared by `dav1d_api!` with the library's C signature.
            address.map(|p| unsafe { std::mem::transmute_copy::<*mut c_void, F>(&p) })
        })
    }
}

macro_rules! dav1d_api {
    ($(
        $(#[$doc:meta])*
        fn $name:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)? = $default:expr;
    )*) => {
        /// Lazily bound dav1d entry points.
        ///
        /// Every method forwards to the library function of the same name.
        /// When the library or the symbol is missing the call returns the
        /// documented default instead.
        pub struct Dav1dApi {
            library: OnceLock<Option<Box<dyn SymbolSource>>>,
            loader: Loader,
            $( $name: EntryPoint<unsafe extern "C" fn($($ty),*) $(-> $ret)?>, )*
        }

        impl Dav1dApi {
            fn with_loader(loader: Loader) -> Self {
                Self {
                    library: OnceLock::new(),
                    loader,
                    $( $name: EntryPoint::new(concat!(stringify!($name), "\0").as_bytes()), )*
                }
            }

            $(
                $(#[$doc])*
                ///
                /// # Safety
                /// Pointer arguments must satisfy the dav1d contract for this call.
                pub unsafe fn $name(&self, $($arg: $ty),*) $(-> $ret)? {
                    match self.$name.get(|| self.library()) {
                        // SAFETY: forwarded under the caller's contract.
                        Some(f) => unsafe { f($($arg),*) },
                        None => $default,
                    }
                }
            )*
        }
    };
}

dav1d_api! {
    /// Runtime version string; null when unavailable.
    fn dav1d_version() -> *const c_char = std::ptr::null();
    /// Fills `s` with library defaults; no-op when unavailable.
    fn dav1d_default_settings(s: *mut Dav1dSettings) = ();
    /// Creates a decoder context; `0` when unavailable (context stays null).
    fn dav1d_open(c_out: *mut *mut Dav1dContext, s: *const Dav1dSettings) -> c_int = 0;
    /// Parses a sequence header out of OBUs; `0` when unavailable.
    fn dav1d_parse_sequence_header(
        out: *mut Dav1dSequenceHeader,
        buf: *const u8,
        sz: usize,
    ) -> c_int = 0;
    /// Feeds compressed data; `0` when unavailable (data left untouched).
    fn dav1d_send_data(c: *mut Dav1dContext, data: *mut Dav1dData) -> c_int = 0;
    /// Pulls one decoded picture; `0` when unavailable (picture left empty).
    fn dav1d_get_picture(c: *mut Dav1dContext, out: *mut Dav1dPicture) -> c_int = 0;
    /// Destroys a context and nulls the handle; no-op when unavailable.
    fn dav1d_close(c_out: *mut *mut Dav1dContext) = ();
    /// Drops all buffered decoder state; no-op when unavailable.
    fn dav1d_flush(c: *mut Dav1dContext) = ();
    /// Allocates a library-owned input buffer; null when unavailable.
    fn dav1d_data_create(data: *mut Dav1dData, sz: usize) -> *mut u8 = std::ptr::null_mut();
    /// Wraps caller memory without copying; `0` when unavailable.
    fn dav1d_data_wrap(
        data: *mut Dav1dData,
        buf: *const u8,
        sz: usize,
        free_callback: Dav1dFreeCallback,
        cookie: *mut c_void,
    ) -> c_int = 0;
    /// Attaches caller user data to `data`; `0` when unavailable.
    fn dav1d_data_wrap_user_data(
        data: *mut Dav1dData,
        user_data: *const u8,
        free_callback: Dav1dFreeCallback,
        cookie: *mut c_void,
    ) -> c_int = 0;
    /// Releases a data reference; no-op when unavailable.
    fn dav1d_data_unref(data: *mut Dav1dData) = ();
    /// Releases a picture reference; no-op when unavailable.
    fn dav1d_picture_unref(p: *mut Dav1dPicture) = ();
}

static GLOBAL: OnceLock<Dav1dApi> = OnceLock::new();

impl Dav1dApi {
    /// Process-wide binding, locating the library through [`DAV1D_LIB`] and
    /// the versioned fallback list on first use.
    ///
    /// [`DAV1D_LIB`]: crate::locator::LIBRARY_ENV
    pub fn global() -> &'static Dav1dApi {
        Self::install_global(LibraryLocator::from_env())
    }

    /// Like [`Dav1dApi::global`] with an explicit locator. First access wins:
    /// once the global binding exists `locator` is ignored.
    pub fn install_global(locator: LibraryLocator) -> &'static Dav1dApi {
        GLOBAL.get_or_init(|| Self::from_locator(locator))
    }

    /// A standalone binding that loads through `locator` on first use.
    pub fn from_locator(locator: LibraryLocator) -> Self {
        Self::with_loader(Box::new(move || {
            locator
                .load()
                .map(|lib| Box::new(lib) as Box<dyn SymbolSource>)
        }))
    }

    /// A binding over an already available symbol source.
    pub fn from_source<S: SymbolSource + 'static>(source: S) -> Self {
        let api = Self::with_loader(Box::new(no_library));
        let _ = api.library.set(Some(Box::new(source)));
        api
    }

    /// A binding whose library is permanently missing.
    pub fn unavailable() -> Self {
        Self::with_loader(Box::new(no_library))
    }

    /// Whether the library could be loaded. Triggers loading on first call.
    pub fn is_loaded(&self) -> bool {
        self.library().is_some()
    }

    fn library(&self) -> Option<&dyn SymbolSource> {
        self.library.get_or_init(|| (self.loader)()).as_deref()
    }

    /// Runtime version string, `None` when the library or symbol is missing.
    pub fn version(&self) -> Option<String> {
        // SAFETY: dav1d_version takes no arguments.
        let raw = unsafe { self.dav1d_version() };
        if raw.is_null() {
            return None;
        }
        // SAFETY: the library returns a static NUL-terminated string.
        let version = unsafe { CStr::from_ptr(raw) };
        Some(version.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeLibrary;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn resolves_each_symbol_once() {
        let library = FakeLibrary::new();
        let lookups = library.lookups();
        let api = Dav1dApi::from_source(library);

        for _ in 0..5 {
            assert_eq!(api.version().as_deref(), Some("1.4.3"));
        }
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_library_loads_once_and_defaults() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let api = Dav1dApi::with_loader(Box::new(move || -> Option<Box<dyn SymbolSource>> {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        }));

        for _ in 0..3 {
            assert!(api.version().is_none());
            let mut ctx = std::ptr::null_mut();
            let settings = Dav1dSettings::zeroed();
            // SAFETY: defaults never touch the arguments.
            let status = unsafe { api.dav1d_open(&mut ctx, &*settings) };
            assert_eq!(status, 0);
            assert!(ctx.is_null());
            // SAFETY: as above.
            assert!(unsafe { api.dav1d_data_create(std::ptr::null_mut(), 16) }.is_null());
        }
        assert!(!api.is_loaded());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_symbol_is_cached_miss() {
        let library = FakeLibrary::new().without("dav1d_version");
        let lookups = library.lookups();
        let api = Dav1dApi::from_source(library);

        assert!(api.is_loaded());
        assert!(api.version().is_none());
        assert!(api.version().is_none());
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_first_use_resolves_once() {
        let library = FakeLibrary::new();
        let lookups = library.lookups();
        let api: &'static Dav1dApi = Box::leak(Box::new(Dav1dApi::from_source(library)));

        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(move || api.version()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().as_deref(), Some("1.4.3"));
        }
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn entry_point_name_strips_terminator() {
        let entry: EntryPoint<unsafe extern "C" fn()> = EntryPoint::new(b"dav1d_flush\0");
        assert_eq!(entry.name(), "dav1d_flush");
    }
}
