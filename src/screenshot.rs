// Region screenshot module
// Frozen-desktop selection, Save/Cancel buttons and cropping to a PNG in the image directory

use crate::compose::Canvas;
use crate::error::ScreenshotError;
use crate::glyphs;
use chrono::{DateTime, Local};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use log::{debug, info};
use screenshots::Screen;
use std::fs;
use std::path::{Path, PathBuf};

/// Pause between hiding the overlay and grabbing the screen
pub const CAPTURE_DELAY_MS: u64 = 150;

/// Selections this small or smaller in either direction are discarded
pub const MIN_SELECTION: u32 = 5;

const BUTTON_W: u32 = 70;
const BUTTON_H: u32 = 30;
const BUTTON_GAP: i32 = 10;
const BUTTON_MARGIN: i32 = 8;

const DIM: [u8; 4] = [0, 0, 0, 120];
const ACCENT: [u8; 4] = [0, 120, 215, 255];
const SAVE_BG: [u8; 4] = [0, 120, 215, 220];
const CANCEL_BG: [u8; 4] = [80, 80, 80, 220];
const LABEL_BG: [u8; 4] = [0, 0, 0, 180];
const WHITE: [u8; 4] = [255, 255, 255, 255];
const TEXT_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && y >= self.y
            && (x as i64) < self.x as i64 + self.w as i64
            && (y as i64) < self.y as i64 + self.h as i64
    }

    fn right(&self) -> i32 {
        self.x + self.w as i32
    }

    fn bottom(&self) -> i32 {
        self.y + self.h as i32
    }
}

/// Rectangle spanned by two corner points, in either order
pub fn normalize_rect(a: (i32, i32), b: (i32, i32)) -> Rect {
    Rect {
        x: a.0.min(b.0),
        y: a.1.min(b.1),
        w: a.0.abs_diff(b.0),
        h: a.1.abs_diff(b.1),
    }
}

/// Save and Cancel buttons centered under the selection, or above it when
/// they would run off the bottom of the screen
pub fn button_rects(selection: &Rect, screen_h: u32) -> (Rect, Rect) {
    let cx = (selection.x + selection.right()) / 2;
    let mut by = selection.bottom() + BUTTON_MARGIN;
    if by + BUTTON_H as i32 > screen_h as i32 {
        by = selection.y - BUTTON_H as i32 - BUTTON_MARGIN;
    }
    let save = Rect {
        x: cx - BUTTON_W as i32 - BUTTON_GAP / 2,
        y: by,
        w: BUTTON_W,
        h: BUTTON_H,
    };
    let cancel = Rect {
        x: cx + BUTTON_GAP / 2,
        y: by,
        w: BUTTON_W,
        h: BUTTON_H,
    };
    (save, cancel)
}

/// `screenshot_YYYYMMDD_HHMMSS.png`
pub fn screenshot_file_name(now: DateTime<Local>) -> String {
    format!("screenshot_{}.png", now.format("%Y%m%d_%H%M%S"))
}

/// Grab the screen the overlay lives on
pub fn capture_desktop() -> Result<RgbaImage, ScreenshotError> {
    let screen = Screen::from_point(0, 0).map_err(|e| ScreenshotError::Capture(e.to_string()))?;
    let shot = screen
        .capture()
        .map_err(|e| ScreenshotError::Capture(e.to_string()))?;
    let (width, height) = (shot.width(), shot.height());
    debug!("Captured desktop {}x{}", width, height);
    RgbaImage::from_raw(width, height, shot.into_raw())
        .ok_or_else(|| ScreenshotError::Capture("capture buffer has the wrong size".to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    None,
    Dragging { start: (i32, i32), current: (i32, i32) },
    Done(Rect),
}

/// What the presenter should do after a pointer event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    None,
    Redraw,
    Save,
    Cancel,
}

/// One region-screenshot interaction over a frozen desktop image.
///
/// Pointer coordinates are in view (surface) space; the saved crop is taken
/// from the full-resolution desktop.
pub struct ScreenshotSession {
    desktop: RgbaImage,
    view: RgbaImage,
    selection: Selection,
}

impl ScreenshotSession {
    pub fn new(desktop: RgbaImage, view_w: u32, view_h: u32) -> Self {
        let view = if desktop.dimensions() == (view_w, view_h) {
            desktop.clone()
        } else {
            imageops::resize(&desktop, view_w, view_h, FilterType::Triangle)
        };
        Self {
            desktop,
            view,
            selection: Selection::None,
        }
    }

    fn view_size(&self) -> (u32, u32) {
        self.view.dimensions()
    }

    /// Finished selection, if any
    pub fn selection(&self) -> Option<Rect> {
        match self.selection {
            Selection::Done(rect) => Some(rect),
            _ => None,
        }
    }

    /// Rectangle currently outlined on screen
    fn visible_rect(&self) -> Option<Rect> {
        match self.selection {
            Selection::None => None,
            Selection::Dragging { start, current } => Some(normalize_rect(start, current)),
            Selection::Done(rect) => Some(rect),
        }
    }

    pub fn pointer_press(&mut self, x: i32, y: i32) -> SessionAction {
        if let Selection::Done(rect) = self.selection {
            let (save, cancel) = button_rects(&rect, self.view_size().1);
            if save.contains(x, y) {
                return SessionAction::Save;
            }
            if cancel.contains(x, y) {
                return SessionAction::Cancel;
            }
        }
        self.selection = Selection::Dragging {
            start: (x, y),
            current: (x, y),
        };
        SessionAction::Redraw
    }

    pub fn pointer_motion(&mut self, x: i32, y: i32) -> SessionAction {
        match &mut self.selection {
            Selection::Dragging { current, .. } => {
                *current = (x, y);
                SessionAction::Redraw
            }
            _ => SessionAction::None,
        }
    }

    pub fn pointer_release(&mut self, x: i32, y: i32) -> SessionAction {
        let Selection::Dragging { start, .. } = self.selection else {
            return SessionAction::None;
        };
        let rect = normalize_rect(start, (x, y));
        self.selection = if rect.w > MIN_SELECTION && rect.h > MIN_SELECTION {
            Selection::Done(rect)
        } else {
            Selection::None
        };
        SessionAction::Redraw
    }

    /// Map a view-space rectangle onto desktop pixels, clipped to the desktop
    pub fn crop_rect(&self, rect: &Rect) -> Option<(u32, u32, u32, u32)> {
        let (view_w, view_h) = self.view_size();
        if view_w == 0 || view_h == 0 {
            return None;
        }
        let sx = self.desktop.width() as f64 / view_w as f64;
        let sy = self.desktop.height() as f64 / view_h as f64;
        let x0 = (rect.x as f64 * sx).round().clamp(0.0, self.desktop.width() as f64) as u32;
        let y0 = (rect.y as f64 * sy).round().clamp(0.0, self.desktop.height() as f64) as u32;
        let x1 = (rect.right() as f64 * sx).round().clamp(0.0, self.desktop.width() as f64) as u32;
        let y1 = (rect.bottom() as f64 * sy).round().clamp(0.0, self.desktop.height() as f64) as u32;
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }

    /// Crop the selection out of the desktop and write it as PNG into `dir`
    pub fn save(&self, dir: &Path, now: DateTime<Local>) -> Result<PathBuf, ScreenshotError> {
        let (x, y, w, h) = self
            .selection()
            .and_then(|rect| self.crop_rect(&rect))
            .ok_or(ScreenshotError::EmptySelection)?;

        fs::create_dir_all(dir).map_err(|source| ScreenshotError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(screenshot_file_name(now));
        imageops::crop_imm(&self.desktop, x, y, w, h)
            .to_image()
            .save(&path)
            .map_err(|source| ScreenshotError::Save {
                path: path.clone(),
                source,
            })?;
        info!("Screenshot saved to {:?} ({}x{})", path, w, h);
        Ok(path)
    }

    /// Paint the frozen desktop, dimming and selection chrome
    pub fn render(&self, canvas: &mut Canvas) {
        canvas.fill_from_rgba(&self.view);
        let (view_w, view_h) = (canvas.width(), canvas.height());

        let Some(rect) = self.visible_rect() else {
            canvas.fill_rect(0, 0, view_w, view_h, DIM);
            return;
        };

        // Dim everything outside the selection
        let top_h = rect.y.clamp(0, view_h as i32) as u32;
        let bottom_y = rect.bottom().clamp(0, view_h as i32);
        canvas.fill_rect(0, 0, view_w, top_h, DIM);
        canvas.fill_rect(0, bottom_y, view_w, view_h - bottom_y as u32, DIM);
        canvas.fill_rect(0, rect.y, rect.x.max(0) as u32, rect.h, DIM);
        let right_x = rect.right().clamp(0, view_w as i32);
        canvas.fill_rect(right_x, rect.y, view_w - right_x as u32, rect.h, DIM);

        canvas.stroke_rect(rect.x, rect.y, rect.w, rect.h, 2, ACCENT);

        // Size label above the selection, or inside it at the top edge
        let label = match self.crop_rect(&rect) {
            Some((_, _, w, h)) => format!("{} x {}", w, h),
            None => format!("{} x {}", rect.w, rect.h),
        };
        let text_w = glyphs::text_width(&label, TEXT_SCALE);
        let text_h = glyphs::text_height(TEXT_SCALE);
        let mut ly = rect.y - text_h as i32 - 8;
        if ly < 0 {
            ly = rect.y + 4;
        }
        canvas.fill_rect(rect.x, ly, text_w + 8, text_h + 4, LABEL_BG);
        glyphs::draw_text(canvas, rect.x + 4, ly + 2, &label, TEXT_SCALE, WHITE);

        if let Selection::Done(rect) = self.selection {
            let (save, cancel) = button_rects(&rect, view_h);
            draw_button(canvas, &save, "Save", SAVE_BG);
            draw_button(canvas, &cancel, "Cancel", CANCEL_BG);
        }
    }
}

fn draw_button(canvas: &mut Canvas, rect: &Rect, label: &str, background: [u8; 4]) {
    canvas.fill_rect(rect.x, rect.y, rect.w, rect.h, background);
    let text_w = glyphs::text_width(label, TEXT_SCALE) as i32;
    let text_h = glyphs::text_height(TEXT_SCALE) as i32;
    let tx = rect.x + (rect.w as i32 - text_w) / 2;
    let ty = rect.y + (rect.h as i32 - text_h) / 2;
    glyphs::draw_text(canvas, tx, ty, label, TEXT_SCALE, WHITE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::Rgba;
    use tempfile::TempDir;

    fn desktop(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([x as u8, y as u8, 0, 255]))
    }

    #[test]
    fn test_normalize_rect_any_corner_order() {
        let expected = Rect {
            x: 10,
            y: 20,
            w: 30,
            h: 40,
        };
        assert_eq!(normalize_rect((10, 20), (40, 60)), expected);
        assert_eq!(normalize_rect((40, 60), (10, 20)), expected);
        assert_eq!(normalize_rect((40, 20), (10, 60)), expected);
    }

    #[test]
    fn test_buttons_below_then_above_selection() {
        let sel = normalize_rect((100, 100), (300, 200));
        let (save, cancel) = button_rects(&sel, 1080);
        assert_eq!((save.x, save.y), (125, 208));
        assert_eq!((cancel.x, cancel.y), (205, 208));
        assert_eq!((save.w, save.h), (70, 30));

        let low = normalize_rect((100, 900), (300, 1060));
        let (save, cancel) = button_rects(&low, 1080);
        assert_eq!(save.y, 900 - 30 - 8);
        assert_eq!(cancel.y, save.y);
    }

    #[test]
    fn test_small_selection_is_discarded() {
        let mut session = ScreenshotSession::new(desktop(100, 100), 100, 100);
        session.pointer_press(10, 10);
        session.pointer_motion(40, 12);
        assert_eq!(session.pointer_release(40, 15), SessionAction::Redraw);
        assert_eq!(session.selection(), None);

        session.pointer_press(10, 10);
        session.pointer_release(16, 16);
        assert_eq!(session.selection(), Some(normalize_rect((10, 10), (16, 16))));
    }

    #[test]
    fn test_buttons_hit_after_selection() {
        let mut session = ScreenshotSession::new(desktop(400, 400), 400, 400);
        session.pointer_press(150, 100);
        session.pointer_release(50, 50);
        let sel = session.selection().unwrap();
        let (save, cancel) = button_rects(&sel, 400);

        assert_eq!(session.pointer_press(save.x + 1, save.y + 1), SessionAction::Save);
        assert_eq!(session.pointer_press(cancel.x + 1, cancel.y + 1), SessionAction::Cancel);
        // Anywhere else starts a fresh selection
        assert_eq!(session.pointer_press(390, 10), SessionAction::Redraw);
        assert_eq!(session.selection(), None);
    }

    #[test]
    fn test_motion_without_press_is_ignored() {
        let mut session = ScreenshotSession::new(desktop(10, 10), 10, 10);
        assert_eq!(session.pointer_motion(3, 3), SessionAction::None);
        assert_eq!(session.pointer_release(3, 3), SessionAction::None);
    }

    #[test]
    fn test_crop_scales_view_to_desktop() {
        let session = ScreenshotSession::new(desktop(200, 100), 100, 50);
        let rect = normalize_rect((10, 5), (30, 25));
        assert_eq!(session.crop_rect(&rect), Some((20, 10, 40, 40)));
    }

    #[test]
    fn test_file_name_format() {
        let now = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(screenshot_file_name(now), "screenshot_20240307_090502.png");
    }

    #[test]
    fn test_save_writes_cropped_png() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("shots");
        let mut session = ScreenshotSession::new(desktop(64, 64), 64, 64);
        session.pointer_press(10, 20);
        session.pointer_release(30, 28);

        let now = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let path = session.save(&target, now).unwrap();
        assert_eq!(path, target.join("screenshot_20240102_030405.png"));

        let saved = image::open(&path).unwrap().to_rgba8();
        assert_eq!(saved.dimensions(), (20, 8));
        assert_eq!(saved.get_pixel(0, 0), &Rgba([10, 20, 0, 255]));
    }

    #[test]
    fn test_save_without_selection_fails() {
        let dir = TempDir::new().unwrap();
        let session = ScreenshotSession::new(desktop(8, 8), 8, 8);
        let err = session.save(dir.path(), Local::now()).unwrap_err();
        assert!(matches!(err, ScreenshotError::EmptySelection));
    }

    #[test]
    fn test_render_dims_outside_selection_only() {
        let grey = RgbaImage::from_pixel(60, 60, Rgba([200, 200, 200, 255]));
        let mut session = ScreenshotSession::new(grey, 60, 60);
        let mut canvas = Canvas::new(60, 60);
        session.render(&mut canvas);
        assert!(canvas.pixel(30, 30)[0] < 200);

        session.pointer_press(10, 30);
        session.pointer_release(50, 50);
        session.render(&mut canvas);
        assert_eq!(canvas.pixel(30, 40), [200, 200, 200, 255]);
        assert!(canvas.pixel(5, 55)[0] < 200);
        assert_eq!(canvas.pixel(10, 40), [215, 120, 0, 255]);
    }
}
