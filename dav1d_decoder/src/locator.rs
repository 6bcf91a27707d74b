use std::ffi::OsString;

use libloading::Library;

/// Environment variable naming an explicit library path or file name.
pub const LIBRARY_ENV: &str = "DAV1D_LIB";

/// ABI (soname) versions known to be compatible, newest first.
pub const KNOWN_ABI_VERSIONS: &[u32] = &[7, 6, 5, 4];

/// Platform file name for the decoder library, optionally versioned.
pub fn lib_filename(version: Option<u32>) -> String {
    if cfg!(target_os = "windows") {
        match version {
            Some(v) => format!("libdav1d-{v}.dll"),
            None => "libdav1d.dll".to_string(),
        }
    } else if cfg!(target_os = "macos") {
        match version {
            Some(v) => format!("libdav1d.{v}.dylib"),
            None => "libdav1d.dylib".to_string(),
        }
    } else {
        match version {
            Some(v) => format!("libdav1d.so.{v}"),
            None => "libdav1d.so".to_string(),
        }
    }
}

/// Decides which shared-library names to try, and in which order.
#[derive(Debug, Clone, Default)]
pub struct LibraryLocator {
    override_path: Option<OsString>,
    preferred_version: Option<u32>,
}

impl LibraryLocator {
    /// Locator honoring [`LIBRARY_ENV`] when it is set and non-empty.
    pub fn from_env() -> Self {
        let override_path = std::env::var_os(LIBRARY_ENV).filter(|v| !v.is_empty());
        Self {
            override_path,
            preferred_version: None,
        }
    }

    /// Use exactly this library; no fallback is attempted when it fails.
    pub fn with_override(mut self, path: impl Into<OsString>) -> Self {
        self.override_path = Some(path.into());
        self
    }

    /// Try this ABI version before the known list.
    pub fn with_version(mut self, version: u32) -> Self {
        self.preferred_version = Some(version);
        self
    }

    /// Ordered candidate names.
    ///
    /// An override yields a single candidate. Otherwise: the preferred and
    /// known versions, deduplicated and newest first, then the unversioned
    /// name.
    pub fn candidates(&self) -> Vec<OsString> {
        if let Some(path) = &self.override_path {
            return vec![path.clone()];
        }

        let mut versions: Vec<u32> = KNOWN_ABI_VERSIONS.to_vec();
        versions.extend(self.preferred_version);
        versions.sort_unstable_by(|a, b| b.cmp(a));
        versions.dedup();

        versions
            .into_iter()
            .map(Some)
            .chain(std::iter::once(None))
            .map(|v| OsString::from(lib_filename(v)))
            .collect()
    }

    /// Returns the first candidate `open` accepts, or `None` when every
    /// candidate failed.
    pub fn locate_with<T, E, F>(&self, mut open: F) -> Option<T>
    where
        E: std::fmt::Display,
        F: FnMut(&OsString) -> Result<T, E>,
    {
        for candidate in self.candidates() {
            match open(&candidate) {
                Ok(handle) => {
                    tracing::info!(library = %candidate.to_string_lossy(), "dav1d library loaded");
                    return Some(handle);
                }
                Err(e) => {
                    tracing::debug!(library = %candidate.to_string_lossy(), error = %e, "candidate rejected");
                }
            }
        }
        tracing::warn!(
            candidates = ?self.candidates(),
            "dav1d library unavailable, decoder disabled for this process"
        );
        None
    }

    /// Loads the decoder library from the first working candidate.
    pub fn load(&self) -> Option<Library> {
        self.locate_with(|name| {
            // SAFETY:
            // - Loading runs the library's initializers; dav1d has none with
            //   observable side effects beyond its own state.
            // - Every symbol is later resolved with the ABI declared in `sys`.
            unsafe { Library::new(name) }
        })
    }
}
