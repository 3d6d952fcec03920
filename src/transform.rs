// Pixel transform module
// Opacity, grayscale and white-background keying applied to a decoded frame

use crate::settings::DisplaySettings;
use image::RgbaImage;
use rayon::prelude::*;

/// Channels strictly above this on all of R, G and B count as white background
pub const WHITE_KEY_THRESHOLD: u8 = 240;

/// Standard luma weights
pub const LUMA_R: f32 = 0.299;
pub const LUMA_G: f32 = 0.587;
pub const LUMA_B: f32 = 0.114;

/// Grayscale value of a pixel
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = r as f32 * LUMA_R + g as f32 * LUMA_G + b as f32 * LUMA_B;
    y.round().clamp(0.0, 255.0) as u8
}

/// Whether a pixel is classified as white background
#[inline]
pub fn is_white_background(r: u8, g: u8, b: u8) -> bool {
    r > WHITE_KEY_THRESHOLD && g > WHITE_KEY_THRESHOLD && b > WHITE_KEY_THRESHOLD
}

/// A 5x5 affine color matrix in row-vector convention.
///
/// `out[j] = sum(in[i] * m[i][j]) + m[4][j] * 255` for the RGBA channels
/// `i, j` in `0..4`; row 4 holds the translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatrix(pub [[f32; 5]; 5]);

impl ColorMatrix {
    pub fn identity() -> Self {
        let mut m = [[0.0; 5]; 5];
        for (i, row) in m.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self(m)
    }

    /// Matrix for the non-keying path: optional luma grayscale, alpha scaled
    pub fn for_display(grayscale: bool, opacity: f32) -> Self {
        let mut m = Self::identity().0;
        if grayscale {
            m[0][..3].copy_from_slice(&[LUMA_R; 3]);
            m[1][..3].copy_from_slice(&[LUMA_G; 3]);
            m[2][..3].copy_from_slice(&[LUMA_B; 3]);
        }
        m[3][3] = opacity;
        Self(m)
    }

    #[inline]
    pub fn apply(&self, px: [u8; 4]) -> [u8; 4] {
        let m = &self.0;
        let mut out = [0u8; 4];
        for (j, channel) in out.iter_mut().enumerate() {
            let v = px[0] as f32 * m[0][j]
                + px[1] as f32 * m[1][j]
                + px[2] as f32 * m[2][j]
                + px[3] as f32 * m[3][j]
                + m[4][j] * 255.0;
            *channel = v.round().clamp(0.0, 255.0) as u8;
        }
        out
    }
}

/// Keying path for a single pixel.
///
/// The white test looks at the original colors; grayscale runs afterwards
/// and never changes the alpha decision.
#[inline]
pub fn key_pixel(px: [u8; 4], opacity: f32, grayscale: bool) -> [u8; 4] {
    let [r, g, b, a] = px;
    let alpha = if is_white_background(r, g, b) {
        0
    } else {
        (a as f32 * opacity).round().clamp(0.0, 255.0) as u8
    };

    if grayscale {
        let y = luma(r, g, b);
        [y, y, y, alpha]
    } else {
        [r, g, b, alpha]
    }
}

/// Produce the transformed copy of `source` that gets composited.
///
/// Uses the color matrix when background removal is off and the per-pixel
/// keying loop otherwise. `source` is left untouched.
pub fn apply(source: &RgbaImage, settings: &DisplaySettings) -> RgbaImage {
    let mut out = source.clone();
    let row_len = out.width() as usize * 4;
    if row_len == 0 {
        return out;
    }

    let opacity = settings.opacity;
    let grayscale = settings.grayscale;

    if settings.remove_white_background {
        out.par_chunks_mut(row_len).for_each(|row| {
            for px in row.chunks_exact_mut(4) {
                let keyed = key_pixel([px[0], px[1], px[2], px[3]], opacity, grayscale);
                px.copy_from_slice(&keyed);
            }
        });
    } else {
        let matrix = ColorMatrix::for_display(grayscale, opacity);
        out.par_chunks_mut(row_len).for_each(|row| {
            for px in row.chunks_exact_mut(4) {
                let mapped = matrix.apply([px[0], px[1], px[2], px[3]]);
                px.copy_from_slice(&mapped);
            }
        });
    }
    out
}
