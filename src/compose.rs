// Composition module
// Places the transformed image on a full-screen transparent canvas

use crate::settings::DisplaySettings;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use rayon::prelude::*;

/// Full-screen pixel buffer in premultiplied BGRA byte order (`wl_shm` ARGB8888)
#[derive(Debug, Clone)]
pub struct Canvas {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Canvas {
    /// Create a fully transparent canvas
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reset every pixel to (0, 0, 0, 0)
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Premultiplied BGRA value at (x, y)
    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }

    /// Fill the canvas with an opaque copy of a straight RGBA image of the same size
    pub fn fill_from_rgba(&mut self, image: &RgbaImage) {
        let row_len = self.width as usize * 4;
        if row_len == 0 || image.dimensions() != (self.width, self.height) {
            return;
        }
        self.data
            .par_chunks_mut(row_len)
            .zip(image.par_chunks(row_len))
            .for_each(|(dst, src)| {
                for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                    d[0] = s[2];
                    d[1] = s[1];
                    d[2] = s[0];
                    d[3] = 255;
                }
            });
    }

    /// Source-over blend a straight RGBA color into the rectangle, clipped to the canvas
    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, rgba: [u8; 4]) {
        let x0 = x.max(0) as u32;
        let y0 = y.max(0) as u32;
        let x1 = (x as i64 + w as i64).clamp(0, self.width as i64) as u32;
        let y1 = (y as i64 + h as i64).clamp(0, self.height as i64) as u32;
        for py in y0..y1 {
            for px in x0..x1 {
                self.blend_pixel(px, py, rgba);
            }
        }
    }

    /// Draw a rectangle outline `thickness` pixels wide, inside the rectangle
    pub fn stroke_rect(&mut self, x: i32, y: i32, w: u32, h: u32, thickness: u32, rgba: [u8; 4]) {
        let t = thickness.min(w).min(h);
        self.fill_rect(x, y, w, t, rgba);
        self.fill_rect(x, y + h as i32 - t as i32, w, t, rgba);
        self.fill_rect(x, y + t as i32, t, h.saturating_sub(2 * t), rgba);
        self.fill_rect(x + w as i32 - t as i32, y + t as i32, t, h.saturating_sub(2 * t), rgba);
    }

    /// Source-over blend of one straight RGBA color
    pub fn blend_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let a = rgba[3] as u32;
        let inv = 255 - a;
        let src = [rgba[2], rgba[1], rgba[0]];
        for c in 0..3 {
            let premul = (src[c] as u32 * a + 127) / 255;
            self.data[idx + c] = (premul + (self.data[idx + c] as u32 * inv + 127) / 255) as u8;
        }
        self.data[idx + 3] = (a + (self.data[idx + 3] as u32 * inv + 127) / 255) as u8;
    }
}

/// Where and how big the image lands on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub scaled_width: u32,
    pub scaled_height: u32,
    /// Axis-aligned bounding box of the rotated, scaled image
    pub render_width: u32,
    pub render_height: u32,
    /// Top-left of the bounding box in screen space
    pub origin_x: i32,
    pub origin_y: i32,
    /// Top-left of the unrotated scaled rectangle, centered in the bounding box
    pub draw_x: i32,
    pub draw_y: i32,
    pub rotation_degrees: i32,
}

/// Bounding box of a `width` x `height` rectangle rotated by `degrees` about its center
pub fn bounding_box(width: u32, height: u32, degrees: i32) -> (u32, u32) {
    let theta = (degrees.rem_euclid(360) as f64).to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let (w, h) = (width as f64, height as f64);
    let render_w = w * cos + h * sin;
    let render_h = w * sin + h * cos;
    (render_w as u32, render_h as u32)
}

impl Placement {
    pub fn compute(
        image_width: u32,
        image_height: u32,
        settings: &DisplaySettings,
        screen_width: u32,
        screen_height: u32,
    ) -> Self {
        let scaled_width = (image_width as f64 * settings.scale as f64).floor() as u32;
        let scaled_height = (image_height as f64 * settings.scale as f64).floor() as u32;
        let rotation_degrees = settings.rotation_degrees.rem_euclid(360);
        let (render_width, render_height) =
            bounding_box(scaled_width, scaled_height, rotation_degrees);

        let origin_x = settings.offset_x + (screen_width as i32 - render_width as i32) / 2;
        let origin_y = settings.offset_y + (screen_height as i32 - render_height as i32) / 2;
        let draw_x = origin_x + (render_width as i32 - scaled_width as i32) / 2;
        let draw_y = origin_y + (render_height as i32 - scaled_height as i32) / 2;

        Self {
            scaled_width,
            scaled_height,
            render_width,
            render_height,
            origin_x,
            origin_y,
            draw_x,
            draw_y,
            rotation_degrees,
        }
    }
}

/// Catmull-Rom cubic kernel
#[inline]
fn cubic_weight(t: f64) -> f64 {
    let t = t.abs();
    if t < 1.0 {
        1.5 * t * t * t - 2.5 * t * t + 1.0
    } else if t < 2.0 {
        -0.5 * t * t * t + 2.5 * t * t - 4.0 * t + 2.0
    } else {
        0.0
    }
}

/// Bicubic sample of a premultiplied RGBA image, edges clamped
fn sample_bicubic(src: &RgbaImage, fx: f64, fy: f64) -> [f64; 4] {
    let (w, h) = (src.width() as i64, src.height() as i64);
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;
    let wx = [
        cubic_weight(tx + 1.0),
        cubic_weight(tx),
        cubic_weight(1.0 - tx),
        cubic_weight(2.0 - tx),
    ];
    let wy = [
        cubic_weight(ty + 1.0),
        cubic_weight(ty),
        cubic_weight(1.0 - ty),
        cubic_weight(2.0 - ty),
    ];
    let (x0, y0) = (x0 as i64, y0 as i64);
    let raw = src.as_raw();

    let mut acc = [0.0f64; 4];
    for (j, wyj) in wy.iter().enumerate() {
        if *wyj == 0.0 {
            continue;
        }
        let sy = (y0 - 1 + j as i64).clamp(0, h - 1) as usize;
        for (i, wxi) in wx.iter().enumerate() {
            let weight = wxi * wyj;
            if weight == 0.0 {
                continue;
            }
            let sx = (x0 - 1 + i as i64).clamp(0, w - 1) as usize;
            let idx = (sy * w as usize + sx) * 4;
            for c in 0..4 {
                acc[c] += raw[idx + c] as f64 * weight;
            }
        }
    }
    acc
}

fn premultiply(image: &RgbaImage) -> RgbaImage {
    let mut out = image.clone();
    let row_len = out.width() as usize * 4;
    if row_len == 0 {
        return out;
    }
    out.par_chunks_mut(row_len).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            let a = px[3] as u32;
            for c in px.iter_mut().take(3) {
                *c = ((*c as u32 * a + 127) / 255) as u8;
            }
        }
    });
    out
}

/// Clear `canvas` and draw `image` onto it scaled, rotated about its center
/// and positioned per `settings`. Pixels falling off screen are clipped.
pub fn composite(canvas: &mut Canvas, image: &RgbaImage, settings: &DisplaySettings) -> Placement {
    canvas.clear();

    let placement = Placement::compute(
        image.width(),
        image.height(),
        settings,
        canvas.width,
        canvas.height,
    );
    if placement.scaled_width == 0 || placement.scaled_height == 0 || canvas.width == 0 {
        return placement;
    }

    // Interpolate in premultiplied space so keyed-out pixels do not bleed color
    let mut source = premultiply(image);
    let shrinks = placement.scaled_width <= source.width()
        && placement.scaled_height <= source.height();
    if shrinks && (placement.scaled_width, placement.scaled_height) != source.dimensions() {
        source = imageops::resize(
            &source,
            placement.scaled_width,
            placement.scaled_height,
            FilterType::CatmullRom,
        );
    }

    // Scaled-space to source-space factors
    let to_src_x = source.width() as f64 / placement.scaled_width as f64;
    let to_src_y = source.height() as f64 / placement.scaled_height as f64;

    let half_w = placement.scaled_width as f64 / 2.0;
    let half_h = placement.scaled_height as f64 / 2.0;
    let center_x = placement.draw_x as f64 + half_w;
    let center_y = placement.draw_y as f64 + half_h;
    let theta = (placement.rotation_degrees as f64).to_radians();
    let (sin, cos) = theta.sin_cos();

    let x_start = placement.origin_x.max(0) as u32;
    let x_end = (placement.origin_x as i64 + placement.render_width as i64)
        .clamp(0, canvas.width as i64) as u32;
    let y_start = placement.origin_y.max(0) as u32;
    let y_end = (placement.origin_y as i64 + placement.render_height as i64)
        .clamp(0, canvas.height as i64) as u32;
    if x_start >= x_end || y_start >= y_end {
        return placement;
    }

    let row_len = canvas.width as usize * 4;
    canvas
        .data
        .par_chunks_mut(row_len)
        .enumerate()
        .skip(y_start as usize)
        .take((y_end - y_start) as usize)
        .for_each(|(py, row)| {
            let dy = py as f64 + 0.5 - center_y;
            for px in x_start..x_end {
                let dx = px as f64 + 0.5 - center_x;
                // Inverse of the clockwise rotation (screen y points down)
                let u = dx * cos + dy * sin + half_w;
                let v = -dx * sin + dy * cos + half_h;
                if u < 0.0 || v < 0.0 || u >= placement.scaled_width as f64 || v >= placement.scaled_height as f64 {
                    continue;
                }

                let [r, g, b, a] = sample_bicubic(&source, u * to_src_x - 0.5, v * to_src_y - 0.5);
                let alpha = a.round().clamp(0.0, 255.0);
                let clamp_color = |c: f64| c.round().clamp(0.0, alpha) as u8;
                let idx = px as usize * 4;
                row[idx] = clamp_color(b);
                row[idx + 1] = clamp_color(g);
                row[idx + 2] = clamp_color(r);
                row[idx + 3] = alpha as u8;
            }
        });

    placement
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn settings(scale: f32, rotation: i32, offset: (i32, i32)) -> DisplaySettings {
        DisplaySettings {
            scale,
            opacity: 1.0,
            rotation_degrees: rotation,
            offset_x: offset.0,
            offset_y: offset.1,
            ..DisplaySettings::default()
        }
    }

    #[test]
    fn test_bounding_box_axis_aligned() {
        assert_eq!(bounding_box(300, 100, 0), (300, 100));
        assert_eq!(bounding_box(300, 100, 90), (100, 300));
        assert_eq!(bounding_box(300, 100, 180), (300, 100));
        assert_eq!(bounding_box(300, 100, 270), (100, 300));
        assert_eq!(bounding_box(100, 100, 45), (141, 141));
    }

    #[test]
    fn test_bounding_box_bounds_for_all_angles() {
        for &(w, h) in &[(1u32, 1u32), (64, 64), (640, 480), (17, 900), (1000, 3)] {
            for deg in 0..360 {
                let (rw, rh) = bounding_box(w, h, deg);
                assert!(rw <= w + h && rh <= w + h, "{}x{} at {}", w, h, deg);
                assert!(rw >= w.min(h) && rh >= w.min(h), "{}x{} at {}", w, h, deg);
                if w == h {
                    assert!(rw >= w && rh >= h, "{}x{} at {}", w, h, deg);
                }
                // The rotated box never has a shorter diagonal than the original
                let diag = (rw as f64 + 1.0).powi(2) + (rh as f64 + 1.0).powi(2);
                assert!(diag >= (w as f64).powi(2) + (h as f64).powi(2));
            }
        }
    }

    #[test]
    fn test_placement_centers_and_offsets() {
        let p = Placement::compute(200, 100, &settings(0.5, 0, (0, 0)), 1920, 1080);
        assert_eq!((p.scaled_width, p.scaled_height), (100, 50));
        assert_eq!((p.origin_x, p.origin_y), (910, 515));
        assert_eq!((p.draw_x, p.draw_y), (910, 515));

        let p = Placement::compute(200, 100, &settings(0.5, 0, (-30, 12)), 1920, 1080);
        assert_eq!((p.origin_x, p.origin_y), (880, 527));
    }

    #[test]
    fn test_placement_floor_and_rotation() {
        let p = Placement::compute(101, 51, &settings(0.5, 90, (0, 0)), 1000, 1000);
        assert_eq!((p.scaled_width, p.scaled_height), (50, 25));
        assert_eq!((p.render_width, p.render_height), (25, 50));
        assert_eq!((p.origin_x, p.origin_y), (487, 475));
        // Unrotated rect is centered in the box: (25 - 50) / 2 == -12
        assert_eq!((p.draw_x, p.draw_y), (475, 487));
    }

    #[test]
    fn test_placement_larger_than_screen() {
        let p = Placement::compute(100, 100, &settings(30.0, 0, (0, 0)), 800, 600);
        assert_eq!(p.scaled_width, 3000);
        assert_eq!((p.origin_x, p.origin_y), (-1100, -1200));
    }

    #[test]
    fn test_composite_identity_copies_pixels() {
        let mut image = RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 255]));
        image.put_pixel(3, 1, Rgba([200, 100, 50, 255]));
        let mut canvas = Canvas::new(10, 6);
        let p = composite(&mut canvas, &image, &settings(1.0, 0, (0, 0)));
        assert_eq!((p.draw_x, p.draw_y), (3, 2));

        assert_eq!(canvas.pixel(3, 2), [30, 20, 10, 255]);
        assert_eq!(canvas.pixel(6, 3), [50, 100, 200, 255]);
        assert_eq!(canvas.pixel(2, 2), [0, 0, 0, 0]);
        assert_eq!(canvas.pixel(7, 3), [0, 0, 0, 0]);
        assert_eq!(canvas.pixel(3, 4), [0, 0, 0, 0]);
    }

    #[test]
    fn test_composite_writes_premultiplied_alpha() {
        let image = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 128]));
        let mut canvas = Canvas::new(2, 2);
        composite(&mut canvas, &image, &settings(1.0, 0, (0, 0)));
        assert_eq!(canvas.pixel(0, 0), [0, 0, 128, 128]);
    }

    #[test]
    fn test_composite_clears_previous_frame() {
        let image = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));
        let mut canvas = Canvas::new(8, 8);
        composite(&mut canvas, &image, &settings(1.0, 0, (-3, -3)));
        assert_eq!(canvas.pixel(0, 0), [255, 255, 255, 255]);

        composite(&mut canvas, &image, &settings(1.0, 0, (3, 3)));
        assert_eq!(canvas.pixel(0, 0), [0, 0, 0, 0]);
        assert_eq!(canvas.pixel(6, 6), [255, 255, 255, 255]);
    }

    #[test]
    fn test_composite_rotates_about_center() {
        // Left column red, rest blue; after 90 degrees clockwise red is the top row
        let mut image = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));
        for y in 0..4 {
            image.put_pixel(0, y, Rgba([255, 0, 0, 255]));
        }
        let mut canvas = Canvas::new(4, 4);
        composite(&mut canvas, &image, &settings(1.0, 90, (0, 0)));

        for x in 0..4 {
            let top = canvas.pixel(x, 0);
            assert!(top[2] > 250 && top[0] < 5, "top row pixel {} = {:?}", x, top);
            let bottom = canvas.pixel(x, 3);
            assert!(bottom[0] > 250 && bottom[2] < 5, "bottom row pixel {} = {:?}", x, bottom);
        }
    }

    #[test]
    fn test_composite_upscale_is_smooth() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([255, 255, 255, 255]));
        let mut canvas = Canvas::new(8, 4);
        let p = composite(&mut canvas, &image, &settings(4.0, 0, (0, 0)));
        assert_eq!((p.scaled_width, p.scaled_height), (8, 4));

        let row: Vec<u8> = (0..8).map(|x| canvas.pixel(x, 1)[0]).collect();
        assert!(row.windows(2).all(|w| w[0] <= w[1]), "{:?}", row);
        // Some intermediate shade exists, nearest-neighbour would only give 0 or 255
        assert!(row.iter().any(|&v| v > 10 && v < 245), "{:?}", row);
    }

    #[test]
    fn test_composite_offscreen_is_clipped() {
        let image = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
        let mut canvas = Canvas::new(4, 4);
        composite(&mut canvas, &image, &settings(1.0, 0, (100, 0)));
        assert!(canvas.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_blend_and_stroke() {
        let mut canvas = Canvas::new(6, 6);
        canvas.fill_rect(-2, -2, 4, 4, [255, 0, 0, 255]);
        assert_eq!(canvas.pixel(1, 1), [0, 0, 255, 255]);
        assert_eq!(canvas.pixel(2, 2), [0, 0, 0, 0]);

        canvas.fill_rect(0, 0, 1, 1, [0, 0, 0, 128]);
        assert_eq!(canvas.pixel(0, 0), [0, 0, 127, 255]);

        let mut canvas = Canvas::new(6, 6);
        canvas.stroke_rect(0, 0, 6, 6, 1, [0, 255, 0, 255]);
        assert_eq!(canvas.pixel(0, 3), [0, 255, 0, 255]);
        assert_eq!(canvas.pixel(5, 5), [0, 255, 0, 255]);
        assert_eq!(canvas.pixel(3, 3), [0, 0, 0, 0]);
    }
}
