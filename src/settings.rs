// Display settings module
// The per-redraw settings snapshot and its thread-shared atomic form

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};

/// Smallest scale factor that can be stored. There is no upper bound.
pub const MIN_SCALE: f32 = 0.05;

/// Settings read by every redraw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySettings {
    /// Image scale factor (> 0)
    pub scale: f32,
    /// Image opacity (0.0 - 1.0)
    pub opacity: f32,
    pub grayscale: bool,
    /// Key out near-white pixels
    pub remove_white_background: bool,
    /// Clockwise rotation in degrees, always in [0, 360)
    pub rotation_degrees: i32,
    /// User drag offset from the centered position
    pub offset_x: i32,
    pub offset_y: i32,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            scale: 0.5,
            opacity: 0.5,
            grayscale: false,
            remove_white_background: false,
            rotation_degrees: 0,
            offset_x: 0,
            offset_y: 0,
        }
    }
}

impl DisplaySettings {
    /// Return a copy with every field forced into its valid range
    pub fn clamped(self) -> Self {
        Self {
            scale: clamp_scale(self.scale),
            opacity: clamp_opacity(self.opacity),
            rotation_degrees: normalize_rotation(self.rotation_degrees),
            ..self
        }
    }
}

pub fn clamp_scale(scale: f32) -> f32 {
    if !scale.is_finite() {
        return 1.0;
    }
    scale.max(MIN_SCALE)
}

pub fn clamp_opacity(opacity: f32) -> f32 {
    if opacity.is_nan() {
        return 1.0;
    }
    opacity.clamp(0.0, 1.0)
}

pub fn normalize_rotation(degrees: i32) -> i32 {
    degrees.rem_euclid(360)
}

fn pack_offset(x: i32, y: i32) -> u64 {
    ((x as u32 as u64) << 32) | (y as u32 as u64)
}

fn unpack_offset(packed: u64) -> (i32, i32) {
    ((packed >> 32) as u32 as i32, packed as u32 as i32)
}

/// Thread-shared display settings.
///
/// Every field is its own atomic so hotkey handlers never wait on the
/// redraw. The offset pair lives in a single `AtomicU64`, which keeps a
/// redraw from observing a half-applied drag.
#[derive(Debug)]
pub struct SharedSettings {
    scale: AtomicU32,
    opacity: AtomicU32,
    grayscale: AtomicBool,
    remove_white_background: AtomicBool,
    rotation_degrees: AtomicI32,
    offset: AtomicU64,
}

impl SharedSettings {
    pub fn new(initial: DisplaySettings) -> Self {
        let initial = initial.clamped();
        Self {
            scale: AtomicU32::new(initial.scale.to_bits()),
            opacity: AtomicU32::new(initial.opacity.to_bits()),
            grayscale: AtomicBool::new(initial.grayscale),
            remove_white_background: AtomicBool::new(initial.remove_white_background),
            rotation_degrees: AtomicI32::new(initial.rotation_degrees),
            offset: AtomicU64::new(pack_offset(initial.offset_x, initial.offset_y)),
        }
    }

    /// Take the copy a single redraw works from
    pub fn snapshot(&self) -> DisplaySettings {
        let (offset_x, offset_y) = self.offset();
        DisplaySettings {
            scale: self.scale(),
            opacity: self.opacity(),
            grayscale: self.grayscale.load(Ordering::Acquire),
            remove_white_background: self.remove_white_background.load(Ordering::Acquire),
            rotation_degrees: self.rotation_degrees.load(Ordering::Acquire),
            offset_x,
            offset_y,
        }
    }

    pub fn scale(&self) -> f32 {
        f32::from_bits(self.scale.load(Ordering::Acquire))
    }

    #[cfg(test)]
    pub fn set_scale(&self, scale: f32) {
        self.scale
            .store(clamp_scale(scale).to_bits(), Ordering::Release);
    }

    /// Add `delta` to the scale, never going below `floor`. Returns the new value.
    pub fn adjust_scale(&self, delta: f32, floor: f32) -> f32 {
        update_f32(&self.scale, |scale| clamp_scale((scale + delta).max(floor)))
    }

    pub fn opacity(&self) -> f32 {
        f32::from_bits(self.opacity.load(Ordering::Acquire))
    }

    #[cfg(test)]
    pub fn set_opacity(&self, opacity: f32) {
        self.opacity
            .store(clamp_opacity(opacity).to_bits(), Ordering::Release);
    }

    /// Add `delta` to the opacity, never going below `floor`. Returns the new value.
    pub fn adjust_opacity(&self, delta: f32, floor: f32) -> f32 {
        update_f32(&self.opacity, |opacity| {
            clamp_opacity((opacity + delta).max(floor))
        })
    }

    /// Flip grayscale. Returns the new state.
    pub fn toggle_grayscale(&self) -> bool {
        !self.grayscale.fetch_xor(true, Ordering::AcqRel)
    }

    /// Flip white-background keying. Returns the new state.
    pub fn toggle_remove_white_background(&self) -> bool {
        !self.remove_white_background.fetch_xor(true, Ordering::AcqRel)
    }

    /// Rotate by `delta` degrees. Returns the normalized angle.
    pub fn rotate(&self, delta: i32) -> i32 {
        let previous = self
            .rotation_degrees
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |deg| {
                Some(normalize_rotation(deg + delta))
            })
            .unwrap_or_default();
        normalize_rotation(previous + delta)
    }

    pub fn offset(&self) -> (i32, i32) {
        unpack_offset(self.offset.load(Ordering::Acquire))
    }

    #[cfg(test)]
    pub fn set_offset(&self, x: i32, y: i32) {
        self.offset.store(pack_offset(x, y), Ordering::Release);
    }

    /// Move the image by a drag delta
    pub fn translate(&self, dx: i32, dy: i32) {
        let _ = self
            .offset
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |packed| {
                let (x, y) = unpack_offset(packed);
                Some(pack_offset(x.saturating_add(dx), y.saturating_add(dy)))
            });
    }
}

/// Apply `f` to an f32 stored as bits, returning the value that was stored
fn update_f32(cell: &AtomicU32, f: impl Fn(f32) -> f32) -> f32 {
    let previous = cell
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
            Some(f(f32::from_bits(bits)).to_bits())
        })
        .unwrap_or_default();
    f(f32::from_bits(previous))
}
