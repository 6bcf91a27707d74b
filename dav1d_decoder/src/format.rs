use crate::sys::{
    DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
    DAV1D_PIXEL_LAYOUT_I444, Dav1dSequenceHeader,
};

/// Host pixel formats a decoded picture can be described with.
///
/// High bit depth variants are little-endian, one sample per 16-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Decoder reported something this crate does not understand.
    Unknown,
    /// 8-bit monochrome.
    Gray,
    /// 10-bit monochrome.
    Gray10Le,
    /// 12-bit monochrome.
    Gray12Le,
    /// 8-bit planar 4:2:0.
    Yuv420p,
    /// 10-bit planar 4:2:0.
    Yuv420p10Le,
    /// 12-bit planar 4:2:0.
    Yuv420p12Le,
    /// 8-bit planar 4:2:2.
    Yuv422p,
    /// 10-bit planar 4:2:2.
    Yuv422p10Le,
    /// 12-bit planar 4:2:2.
    Yuv422p12Le,
    /// 8-bit planar 4:4:4.
    Yuv444p,
    /// 10-bit planar 4:4:4.
    Yuv444p10Le,
    /// 12-bit planar 4:4:4.
    Yuv444p12Le,
    /// 8-bit planar RGB in G, B, R plane order.
    Gbrp,
    /// 10-bit planar RGB in G, B, R plane order.
    Gbrp10Le,
    /// 12-bit planar RGB in G, B, R plane order.
    Gbrp12Le,
}

impl PixelFormat {
    /// Number of planes carried by a frame of this format.
    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::Unknown => 0,
            PixelFormat::Gray | PixelFormat::Gray10Le | PixelFormat::Gray12Le => 1,
            _ => 3,
        }
    }

    /// Bits per component, 0 for [`PixelFormat::Unknown`].
    pub fn bit_depth(self) -> u32 {
        use PixelFormat::*;
        match self {
            Unknown => 0,
            Gray | Yuv420p | Yuv422p | Yuv444p | Gbrp => 8,
            Gray10Le | Yuv420p10Le | Yuv422p10Le | Yuv444p10Le | Gbrp10Le => 10,
            Gray12Le | Yuv420p12Le | Yuv422p12Le | Yuv444p12Le | Gbrp12Le => 12,
        }
    }

    /// Whether the planes are RGB rather than YUV.
    pub fn is_rgb(self) -> bool {
        matches!(
            self,
            PixelFormat::Gbrp | PixelFormat::Gbrp10Le | PixelFormat::Gbrp12Le
        )
    }

    /// Rows in `plane` for a frame `height` rows tall.
    pub fn plane_height(self, height: u32, plane: usize) -> u32 {
        use PixelFormat::*;
        match (self, plane) {
            (_, 0) => height,
            (Yuv420p | Yuv420p10Le | Yuv420p12Le, _) => height.div_ceil(2),
            _ => height,
        }
    }
}

/// Raw chroma layout as reported by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaLayout {
    /// Luma only.
    Monochrome,
    /// Chroma halved in both directions.
    Yuv420,
    /// Chroma halved horizontally.
    Yuv422,
    /// Full resolution chroma.
    Yuv444,
}

impl ChromaLayout {
    /// `None` for any value the decoder ABI does not define.
    pub fn from_raw(layout: u32) -> Option<Self> {
        match layout {
            DAV1D_PIXEL_LAYOUT_I400 => Some(ChromaLayout::Monochrome),
            DAV1D_PIXEL_LAYOUT_I420 => Some(ChromaLayout::Yuv420),
            DAV1D_PIXEL_LAYOUT_I422 => Some(ChromaLayout::Yuv422),
            DAV1D_PIXEL_LAYOUT_I444 => Some(ChromaLayout::Yuv444),
            _ => None,
        }
    }
}

/// Color primaries code point (ITU-T H.273).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorPrimaries(pub u8);

impl ColorPrimaries {
    /// BT.709 / sRGB.
    pub const BT709: Self = Self(1);
    /// Not signaled.
    pub const UNSPECIFIED: Self = Self(2);
    /// BT.601 625-line.
    pub const BT470BG: Self = Self(5);
    /// BT.601 525-line.
    pub const BT601: Self = Self(6);
    /// BT.2020 / BT.2100.
    pub const BT2020: Self = Self(9);
    /// DCI-P3 with D65 white point.
    pub const SMPTE432: Self = Self(12);
}

/// Transfer characteristics code point (ITU-T H.273).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferCharacteristic(pub u8);

impl TransferCharacteristic {
    /// BT.709.
    pub const BT709: Self = Self(1);
    /// Not signaled.
    pub const UNSPECIFIED: Self = Self(2);
    /// Linear light.
    pub const LINEAR: Self = Self(8);
    /// IEC 61966-2-1 (sRGB).
    pub const SRGB: Self = Self(13);
    /// SMPTE ST 2084 (PQ).
    pub const SMPTE2084: Self = Self(16);
    /// ARIB STD-B67 (HLG).
    pub const HLG: Self = Self(18);
}

/// Matrix coefficients code point (ITU-T H.273).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatrixCoefficients(pub u8);

impl MatrixCoefficients {
    /// Identity: the planes already hold G, B, R.
    pub const IDENTITY: Self = Self(0);
    /// BT.709.
    pub const BT709: Self = Self(1);
    /// Not signaled.
    pub const UNSPECIFIED: Self = Self(2);
    /// BT.601.
    pub const BT601: Self = Self(6);
    /// BT.2020 non-constant luminance.
    pub const BT2020_NCL: Self = Self(9);
}

/// Sample value range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorRange {
    /// Studio swing, e.g. 16..=235 for 8-bit luma.
    #[default]
    Limited,
    /// Full swing.
    Full,
}

/// Color description attached to an output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorSpace {
    /// Chromaticity of the primaries.
    pub primaries: ColorPrimaries,
    /// Opto-electronic transfer function.
    pub transfer: TransferCharacteristic,
    /// YUV to RGB matrix.
    pub matrix: MatrixCoefficients,
    /// Sample value range.
    pub range: ColorRange,
}

impl Default for ColorSpace {
    fn default() -> Self {
        Self {
            primaries: ColorPrimaries::UNSPECIFIED,
            transfer: TransferCharacteristic::UNSPECIFIED,
            matrix: MatrixCoefficients::UNSPECIFIED,
            range: ColorRange::Limited,
        }
    }
}

/// Maps decoder layout, bit depth index (0/1/2 for 8/10/12 bits) and color
/// metadata to a host pixel format.
///
/// 4:4:4 with identity matrix, BT.709 primaries and sRGB transfer is RGB
/// carried in YUV planes and maps to the planar GBR family.
pub fn pixel_format(
    layout: u32,
    bit_depth_index: u8,
    primaries: ColorPrimaries,
    transfer: TransferCharacteristic,
    matrix: MatrixCoefficients,
) -> PixelFormat {
    use PixelFormat::*;

    let Some(layout) = ChromaLayout::from_raw(layout) else {
        return Unknown;
    };
    let family: [PixelFormat; 3] = match layout {
        ChromaLayout::Yuv444
            if matrix == MatrixCoefficients::IDENTITY
                && primaries == ColorPrimaries::BT709
                && transfer == TransferCharacteristic::SRGB =>
        {
            [Gbrp, Gbrp10Le, Gbrp12Le]
        }
        ChromaLayout::Monochrome => [Gray, Gray10Le, Gray12Le],
        ChromaLayout::Yuv420 => [Yuv420p, Yuv420p10Le, Yuv420p12Le],
        ChromaLayout::Yuv422 => [Yuv422p, Yuv422p10Le, Yuv422p12Le],
        ChromaLayout::Yuv444 => [Yuv444p, Yuv444p10Le, Yuv444p12Le],
    };
    family
        .get(usize::from(bit_depth_index))
        .copied()
        .unwrap_or(Unknown)
}

/// Color space as signaled in the sequence header.
pub fn color_space(
    primaries: u32,
    transfer: u32,
    matrix: u32,
    full_range: bool,
) -> ColorSpace {
    let code = |v: u32| u8::try_from(v).unwrap_or(u8::MAX);
    ColorSpace {
        primaries: ColorPrimaries(code(primaries)),
        transfer: TransferCharacteristic(code(transfer)),
        matrix: MatrixCoefficients(code(matrix)),
        range: if full_range {
            ColorRange::Full
        } else {
            ColorRange::Limited
        },
    }
}

/// Format and color space of planes laid out as `layout` under `hdr`.
pub(crate) fn describe(layout: u32, hdr: &Dav1dSequenceHeader) -> (PixelFormat, ColorSpace) {
    let cs = color_space(hdr.pri, hdr.trc, hdr.mtrx, hdr.color_range != 0);
    let format = pixel_format(layout, hdr.hbd, cs.primaries, cs.transfer, cs.matrix);
    (format, cs)
}
