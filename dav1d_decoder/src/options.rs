use serde::Deserialize;

use crate::error::DecoderError;
use crate::sys::{DAV1D_MAX_FRAME_THREADS, DAV1D_MAX_TILE_THREADS};

/// Decoder configuration. `0` means "derive automatically" everywhere.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(default)]
pub struct DecoderOptions {
    /// Total worker threads; `0` uses all hardware threads.
    pub threads: u32,
    /// Tile threads for legacy libraries; `0` derives from `threads`.
    pub tile_threads: u32,
    /// Frame threads for legacy libraries; `0` derives from `threads`.
    pub frame_threads: u32,
}

impl DecoderOptions {
    /// Parses options from a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, DecoderError> {
        Ok(toml::from_str(s)?)
    }

    /// Sets one option from a host-style string property. Negative values
    /// mean "auto", like `0`.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), DecoderError> {
        let slot = match name {
            "threads" => &mut self.threads,
            "tile_threads" => &mut self.tile_threads,
            "frame_threads" => &mut self.frame_threads,
            _ => return Err(DecoderError::UnknownOption(name.to_string())),
        };
        let parsed: i64 = value
            .trim()
            .parse()
            .map_err(|_| DecoderError::InvalidOption {
                name: name.to_string(),
                value: value.to_string(),
            })?;
        *slot = u32::try_from(parsed.max(0)).unwrap_or(u32::MAX);
        Ok(())
    }

    /// Chooses how threads are configured for a library generation.
    /// `hardware_threads` stands in for `threads == 0`.
    pub fn threading_plan(&self, generation: LibraryGeneration, hardware_threads: u32) -> ThreadingPlan {
        match generation {
            LibraryGeneration::Current => ThreadingPlan::Combined {
                threads: self.threads,
            },
            LibraryGeneration::Legacy => {
                let total = if self.threads == 0 {
                    hardware_threads.max(1)
                } else {
                    self.threads
                };
                let tile_threads = if self.tile_threads == 0 {
                    total.isqrt().clamp(1, DAV1D_MAX_TILE_THREADS)
                } else {
                    self.tile_threads
                };
                let frame_threads = if self.frame_threads == 0 {
                    total.div_ceil(tile_threads).min(DAV1D_MAX_FRAME_THREADS)
                } else {
                    self.frame_threads
                };
                ThreadingPlan::Split {
                    frame_threads,
                    tile_threads,
                }
            }
        }
    }
}

/// Which settings layout the loaded library uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryGeneration {
    /// 0.x: separate frame and tile thread counts.
    Legacy,
    /// 1.x and later: one combined thread count.
    Current,
}

impl LibraryGeneration {
    /// From a runtime version string such as `"1.4.3"`.
    pub fn from_version(version: &str) -> Option<Self> {
        let major = version.trim_start().chars().next()?.to_digit(10)?;
        Some(if major == 0 {
            LibraryGeneration::Legacy
        } else {
            LibraryGeneration::Current
        })
    }
}

/// Thread counts to write into the decoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadingPlan {
    /// One knob; `0` lets the library use every core.
    Combined {
        /// Total threads.
        threads: u32,
    },
    /// Temporal and spatial parallelism configured separately.
    Split {
        /// Frames decoded in parallel.
        frame_threads: u32,
        /// Tiles decoded in parallel within a frame.
        tile_threads: u32,
    },
}

impl ThreadingPlan {
    /// Values for the two leading settings slots.
    pub(crate) fn settings_slots(self) -> [i32; 2] {
        let clamp = |v: u32| i32::try_from(v).unwrap_or(i32::MAX);
        match self {
            // slot 1 is max_frame_delay; 0 keeps the library default
            ThreadingPlan::Combined { threads } => [clamp(threads), 0],
            ThreadingPlan::Split {
                frame_threads,
                tile_threads,
            } => [clamp(frame_threads), clamp(tile_threads)],
        }
    }
}

/// Hardware threads available to this process.
pub fn hardware_threads() -> u32 {
    std::thread::available_parallelism()
        .map(|n| u32::try_from(n.get()).unwrap_or(u32::MAX))
        .unwrap_or(1)
}
