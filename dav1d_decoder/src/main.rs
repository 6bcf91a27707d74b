use clap::Parser;
use image::{GrayImage, ImageBuffer, Luma};
use std::path::{Path, PathBuf};

use dav1d_decoder::error::AppError;
use dav1d_decoder::ivf::IvfReader;
use dav1d_decoder::session::{DecodeProgress, Packet};
use dav1d_decoder::{
    CodecParameters, Dav1dApi, Dav1dDecoder, DecoderOptions, LibraryLocator, VideoDecoder,
    VideoFrame,
};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "dav1d_decoder")]
struct Args {
    /// path to input IVF file with an AV1 stream
    #[arg(long)]
    input: PathBuf,

    /// total decoder threads (0 = all cores)
    #[arg(long)]
    threads: Option<u32>,

    /// tile threads, only used by 0.x libraries
    #[arg(long)]
    tile_threads: Option<u32>,

    /// frame threads, only used by 0.x libraries
    #[arg(long)]
    frame_threads: Option<u32>,

    /// TOML file with decoder options; flags override its values
    #[arg(long)]
    options: Option<PathBuf>,

    /// explicit dav1d library path (overrides DAV1D_LIB)
    #[arg(long)]
    library: Option<String>,

    /// stop after submitting this many frames
    #[arg(long)]
    max_frames: Option<usize>,

    /// save the luma plane of the first 8-bit frame as PNG
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn load_options(args: &Args) -> Result<DecoderOptions, AppError> {
    let mut options = match &args.options {
        Some(path) => {
            if !path.exists() {
                return Err(AppError::MissingInput(path.display().to_string()));
            }
            DecoderOptions::from_toml_str(&std::fs::read_to_string(path)?)?
        }
        None => DecoderOptions::default(),
    };
    if let Some(threads) = args.threads {
        options.threads = threads;
    }
    if let Some(tile_threads) = args.tile_threads {
        options.tile_threads = tile_threads;
    }
    if let Some(frame_threads) = args.frame_threads {
        options.frame_threads = frame_threads;
    }
    Ok(options)
}

fn luma_image(frame: &VideoFrame) -> Option<GrayImage> {
    if frame.format().bit_depth() != 8 {
        return None;
    }
    let luma = frame.planes().first()?;
    Some(ImageBuffer::from_fn(frame.width(), frame.height(), |x, y| {
        let sample = luma
            .row(y as usize)
            .and_then(|row| row.get(x as usize))
            .copied()
            .unwrap_or(0);
        Luma([sample])
    }))
}

fn main() -> Result<(), AppError> {
    init_tracing();

    let args = Args::parse();
    let options = load_options(&args)?;

    let mut locator = LibraryLocator::from_env();
    if let Some(library) = &args.library {
        locator = locator.with_override(library);
    }
    let api = Dav1dApi::install_global(locator);

    let mut reader = IvfReader::open(&args.input)?;
    let header = *reader.header();
    tracing::info!(
        width = header.width,
        height = header.height,
        input_file = %args.input.display(),
        "decoding.."
    );

    let mut decoder = Dav1dDecoder::with_api(api, options);
    decoder.open(&CodecParameters::av1())?;

    let mut decoded = 0usize;
    let mut snapshot: Option<GrayImage> = None;
    let want_snapshot = args.snapshot.is_some();
    let mut sink = |frame: VideoFrame| {
        tracing::info!(
            index = decoded,
            width = frame.width(),
            height = frame.height(),
            format = ?frame.format(),
            pts = frame.timestamp(),
            "frame decoded"
        );
        if want_snapshot && snapshot.is_none() {
            snapshot = luma_image(&frame);
        }
        decoded += 1;
    };

    let mut submitted = 0usize;
    while let Some(frame) = reader.next_frame()? {
        if args.max_frames.is_some_and(|max| submitted >= max) {
            break;
        }
        let packet = Packet::new(frame.data, frame.pts);
        // resubmit until the decoder took the whole packet
        while let DecodeProgress::Pending(left) = decoder.decode(&packet, &mut sink)? {
            if left == 0 {
                break;
            }
        }
        submitted += 1;
    }
    decoder.decode(&Packet::end_of_stream(), &mut sink)?;
    decoder.close()?;

    tracing::info!(submitted, decoded, "decoding finished");

    if let Some(path) = &args.snapshot {
        save_snapshot(snapshot.as_ref(), path)?;
    }

    Ok(())
}

fn save_snapshot(image: Option<&GrayImage>, path: &Path) -> Result<(), AppError> {
    match image {
        Some(image) => {
            image.save(path)?;
            tracing::info!(output_file = %path.display(), "snapshot saved");
        }
        None => tracing::warn!("no 8-bit frame decoded, snapshot skipped"),
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}
