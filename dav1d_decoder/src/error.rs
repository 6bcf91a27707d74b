use thiserror::Error;

/// Errors produced by a decoder session.
#[derive(Error, Debug)]
pub enum DecoderError {
    /// The dav1d shared library could not be loaded, or lacks a version.
    #[error("dav1d library is not available")]
    LibraryUnavailable,

    /// The stream is not AV1.
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// `dav1d_open` rejected the settings.
    #[error("dav1d_open failed with status {0}")]
    OpenFailed(i32),

    /// The session was used while closed.
    #[error("decoder session is not open")]
    NotOpen,

    /// The packet could not be wrapped as decoder input.
    #[error("failed to wrap packet as decoder input (status {0})")]
    InputWrap(i32),

    /// `dav1d_send_data` failed with something other than "try again".
    #[error("dav1d_send_data failed with status {0}")]
    Send(i32),

    /// `dav1d_get_picture` failed with something other than "try again".
    #[error("dav1d_get_picture failed with status {0}")]
    Receive(i32),

    /// Option value is not an integer.
    #[error("invalid value {value:?} for option {name}")]
    InvalidOption {
        /// Option name.
        name: String,
        /// Rejected value.
        value: String,
    },

    /// No option with this name.
    #[error("unknown option: {0}")]
    UnknownOption(String),

    /// Options document could not be parsed.
    #[error("invalid options: {0}")]
    Config(#[from] toml::de::Error),
}

impl DecoderError {
    /// Stable negative code for hosts that speak integers.
    pub fn code(&self) -> i32 {
        match self {
            DecoderError::Send(_) => -1,
            DecoderError::Receive(_) => -2,
            DecoderError::InputWrap(_) => -3,
            _ => -4,
        }
    }
}

/// Application-level errors produced by the command-line decoder.
#[derive(Error, Debug)]
pub enum AppError {
    /// Input file does not exist.
    #[error("Input file does not exist: {0}")]
    MissingInput(String),

    /// I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error occurred while encoding a snapshot image.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Error reported by the decoder.
    #[error("Decoder error: {0}")]
    Decoder(#[from] DecoderError),

    /// Input is not a well-formed AV1 IVF file.
    #[error("Invalid IVF input: {0}")]
    InvalidIvf(String),
}
