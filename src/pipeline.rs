// Redraw pipeline module
// One full resolve -> decode -> transform -> composite cycle per redraw request

use crate::compose::{self, Canvas, Placement};
use crate::error::ImageLoadError;
use crate::image_loader;
use crate::library::ImageLibrary;
use crate::settings::DisplaySettings;
use crate::transform;
use log::debug;
use thiserror::Error;

/// Where a redraw currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedrawStage {
    Idle,
    ResolvingImage,
    Decoding,
    Transforming,
    Compositing,
    Presenting,
}

/// Why a redraw left the screen unchanged
#[derive(Error, Debug)]
pub enum RedrawError {
    #[error("No image to display")]
    NoImage,

    #[error(transparent)]
    Load(#[from] ImageLoadError),
}

/// Owns the screen-sized canvas and drives it through the redraw stages.
///
/// A failed resolve or decode returns to `Idle` before the canvas is
/// touched, so the last good frame stays on screen.
pub struct RedrawPipeline {
    canvas: Canvas,
    stage: RedrawStage,
    placement: Option<Placement>,
}

impl RedrawPipeline {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: Canvas::new(width, height),
            stage: RedrawStage::Idle,
            placement: None,
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    #[cfg(test)]
    pub fn stage(&self) -> RedrawStage {
        self.stage
    }

    /// Geometry of the last successful composite
    pub fn placement(&self) -> Option<Placement> {
        self.placement
    }

    /// Follow an output size change. Returns true when the canvas was replaced.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if (self.canvas.width(), self.canvas.height()) == (width, height) {
            return false;
        }
        debug!("Canvas resized to {}x{}", width, height);
        self.canvas = Canvas::new(width, height);
        self.placement = None;
        true
    }

    fn enter(&mut self, stage: RedrawStage) {
        debug!("Redraw stage {:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    /// Run every stage up to `Presenting`.
    ///
    /// On success the canvas holds the new frame and the caller must push it
    /// to the surface and then call [`RedrawPipeline::presented`].
    pub fn render(
        &mut self,
        library: &mut ImageLibrary,
        settings: &DisplaySettings,
    ) -> Result<Placement, RedrawError> {
        self.enter(RedrawStage::ResolvingImage);
        let Some(path) = library.resolve() else {
            self.enter(RedrawStage::Idle);
            return Err(RedrawError::NoImage);
        };

        self.enter(RedrawStage::Decoding);
        let frame = match image_loader::load_image(&path) {
            Ok(frame) => frame,
            Err(e) => {
                self.enter(RedrawStage::Idle);
                return Err(e.into());
            }
        };

        self.enter(RedrawStage::Transforming);
        let transformed = transform::apply(&frame, settings);
        drop(frame);

        self.enter(RedrawStage::Compositing);
        let placement = compose::composite(&mut self.canvas, &transformed, settings);
        self.placement = Some(placement);

        self.enter(RedrawStage::Presenting);
        Ok(placement)
    }

    /// The frame has been committed to the surface
    pub fn presented(&mut self) {
        self.enter(RedrawStage::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::fs;
    use tempfile::TempDir;

    fn full_opacity() -> DisplaySettings {
        DisplaySettings {
            scale: 1.0,
            opacity: 1.0,
            ..DisplaySettings::default()
        }
    }

    #[test]
    fn test_render_draws_resolved_image() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("red.png");
        RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();

        let mut library = ImageLibrary::new(dir.path().to_path_buf(), None, true);
        let mut pipeline = RedrawPipeline::new(6, 6);
        let placement = pipeline.render(&mut library, &full_opacity()).unwrap();

        assert_eq!(pipeline.stage(), RedrawStage::Presenting);
        assert_eq!((placement.origin_x, placement.origin_y), (2, 2));
        assert_eq!(pipeline.canvas().pixel(2, 2), [0, 0, 255, 255]);
        assert_eq!(pipeline.canvas().pixel(0, 0), [0, 0, 0, 0]);
        assert_eq!(library.current(), Some(path.as_path()));

        pipeline.presented();
        assert_eq!(pipeline.stage(), RedrawStage::Idle);
    }

    #[test]
    fn test_failed_decode_keeps_last_canvas() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.png");
        RgbaImage::from_pixel(6, 6, Rgba([0, 255, 0, 255]))
            .save(&good)
            .unwrap();
        let bad = dir.path().join("bad.png");
        fs::write(&bad, b"definitely not an image").unwrap();

        let mut library = ImageLibrary::new(dir.path().to_path_buf(), Some(good), false);
        let mut pipeline = RedrawPipeline::new(6, 6);
        pipeline.render(&mut library, &full_opacity()).unwrap();
        pipeline.presented();
        let before = pipeline.canvas().as_bytes().to_vec();

        library.set_current(bad);
        let err = pipeline.render(&mut library, &full_opacity()).unwrap_err();
        assert!(matches!(err, RedrawError::Load(_)));
        assert_eq!(pipeline.stage(), RedrawStage::Idle);
        assert_eq!(pipeline.canvas().as_bytes(), before.as_slice());
    }

    #[test]
    fn test_empty_directory_is_no_image() {
        let dir = TempDir::new().unwrap();
        let mut library = ImageLibrary::new(dir.path().to_path_buf(), None, true);
        let mut pipeline = RedrawPipeline::new(4, 4);
        let err = pipeline.render(&mut library, &full_opacity()).unwrap_err();
        assert!(matches!(err, RedrawError::NoImage));
        assert!(pipeline.placement().is_none());
    }

    #[test]
    fn test_resize_replaces_canvas_only_on_change() {
        let mut pipeline = RedrawPipeline::new(4, 4);
        assert!(!pipeline.resize(4, 4));
        assert!(pipeline.resize(8, 2));
        assert_eq!(pipeline.canvas().as_bytes().len(), 8 * 2 * 4);
    }
}
