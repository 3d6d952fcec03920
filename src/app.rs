// Application state module
// Process-wide shared state, the overlay event queue payload and event application

use crate::config::Config;
use crate::input::{Action, InputSignal};
use crate::library::{Direction, ImageLibrary};
use crate::settings::SharedSettings;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Hotkey step for opacity
pub const OPACITY_STEP: f32 = 0.05;
/// Lowest opacity reachable from the keyboard
pub const OPACITY_FLOOR: f32 = 0.05;
/// Hotkey step for scale
pub const SCALE_STEP: f32 = 0.05;
/// Lowest scale reachable from the keyboard
pub const SCALE_FLOOR: f32 = 0.1;
/// Hotkey rotation step in degrees
pub const ROTATION_STEP: i32 = 90;

/// State touched by both the input thread and the UI thread
#[derive(Debug)]
pub struct SharedState {
    pub settings: SharedSettings,
    /// A region screenshot is in progress; global input is ignored
    capturing: AtomicBool,
    /// A `Redraw` event is already queued
    redraw_pending: AtomicBool,
}

impl SharedState {
    pub fn new(settings: SharedSettings) -> Self {
        Self {
            settings,
            capturing: AtomicBool::new(false),
            redraw_pending: AtomicBool::new(false),
        }
    }

    pub fn capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    pub fn set_capturing(&self, capturing: bool) {
        self.capturing.store(capturing, Ordering::Release);
    }
}

/// Payload of the UI thread's event channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayEvent {
    Action(Action),
    /// Shared settings changed off the UI thread
    Redraw,
}

/// What the UI thread must do after applying an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    Redraw,
    SetVisible(bool),
    StartScreenshot,
    Exit,
}

/// Route one input signal from the listener thread.
///
/// Drags update the shared offset in place and queue at most one `Redraw`;
/// actions are queued as they are. Returns false once `send` reports the
/// queue is gone.
pub fn forward_signal<F>(shared: &SharedState, signal: InputSignal, mut send: F) -> bool
where
    F: FnMut(OverlayEvent) -> bool,
{
    match signal {
        InputSignal::Action(action) => send(OverlayEvent::Action(action)),
        InputSignal::Drag(dx, dy) => {
            if shared.capturing() {
                return true;
            }
            shared.settings.translate(dx, dy);
            if shared.redraw_pending.swap(true, Ordering::AcqRel) {
                return true;
            }
            send(OverlayEvent::Redraw)
        }
    }
}

/// UI-thread application context
pub struct AppContext {
    pub shared: Arc<SharedState>,
    pub library: ImageLibrary,
    /// The config as read from disk, before command line overrides
    persisted: Config,
    /// Session state at startup, the reference for what changed since
    session_start: Config,
    config_path: Option<PathBuf>,
    visible: bool,
}

impl AppContext {
    /// `persisted` is the file content; `session` is that config with the
    /// command line applied, which the shared state and library were built from.
    pub fn new(
        shared: Arc<SharedState>,
        library: ImageLibrary,
        persisted: Config,
        session: Config,
        config_path: Option<PathBuf>,
    ) -> Self {
        let mut session_start = session;
        session_start.update_from(&shared.settings.snapshot(), &library);
        Self {
            shared,
            library,
            persisted,
            session_start,
            config_path,
            visible: true,
        }
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Whether overlay frames may reach the screen. False while a screenshot
    /// is pending or in progress.
    pub fn presentable(&self) -> bool {
        self.visible && !self.shared.capturing()
    }

    /// Apply one event to the settings and library
    pub fn apply(&mut self, event: OverlayEvent) -> Effect {
        let action = match event {
            OverlayEvent::Redraw => {
                self.shared.redraw_pending.store(false, Ordering::Release);
                return Effect::Redraw;
            }
            OverlayEvent::Action(action) => action,
        };

        if self.shared.capturing() {
            debug!("Ignoring {:?} during screenshot", action);
            return Effect::None;
        }

        let settings = &self.shared.settings;
        match action {
            Action::Exit => Effect::Exit,
            Action::ToggleVisible => {
                self.visible = !self.visible;
                info!("Overlay {}", if self.visible { "shown" } else { "hidden" });
                Effect::SetVisible(self.visible)
            }
            Action::Reload => {
                self.library.reload();
                Effect::Redraw
            }
            Action::OpacityUp | Action::OpacityDown => {
                let delta = if action == Action::OpacityUp {
                    OPACITY_STEP
                } else {
                    -OPACITY_STEP
                };
                let opacity = settings.adjust_opacity(delta, OPACITY_FLOOR);
                debug!("Opacity {:.2}", opacity);
                Effect::Redraw
            }
            Action::ScaleUp | Action::ScaleDown => {
                let delta = if action == Action::ScaleUp {
                    SCALE_STEP
                } else {
                    -SCALE_STEP
                };
                let scale = settings.adjust_scale(delta, SCALE_FLOOR);
                debug!("Scale {:.2}", scale);
                Effect::Redraw
            }
            Action::PrevImage | Action::NextImage => {
                let direction = if action == Action::NextImage {
                    Direction::Next
                } else {
                    Direction::Prev
                };
                match self.library.navigate(direction) {
                    Some(path) => info!("Showing {:?}", path),
                    None => debug!("No images to switch to"),
                }
                Effect::Redraw
            }
            Action::RotateCw | Action::RotateCcw => {
                let delta = if action == Action::RotateCw {
                    ROTATION_STEP
                } else {
                    -ROTATION_STEP
                };
                let degrees = settings.rotate(delta);
                debug!("Rotation {} degrees", degrees);
                Effect::Redraw
            }
            Action::StartScreenshot => {
                self.shared.set_capturing(true);
                Effect::StartScreenshot
            }
            Action::ToggleGrayscale => {
                let enabled = settings.toggle_grayscale();
                info!("Grayscale {}", if enabled { "on" } else { "off" });
                Effect::Redraw
            }
            Action::ToggleRemoveWhite => {
                let enabled = settings.toggle_remove_white_background();
                info!("White background removal {}", if enabled { "on" } else { "off" });
                Effect::Redraw
            }
            Action::ToggleAutoLoad => {
                let enabled = !self.library.auto_load_latest();
                self.library.set_auto_load(enabled);
                info!("Auto-load {}", if enabled { "on" } else { "off" });
                Effect::Redraw
            }
        }
    }

    /// Write what changed during the session back to the config file.
    /// Command line overrides the user never touched stay out of it.
    pub fn save_config(&mut self) {
        let Some(path) = self.config_path.clone() else {
            return;
        };
        let mut session_end = self.session_start.clone();
        session_end.update_from(&self.shared.settings.snapshot(), &self.library);
        self.persisted
            .merge_session_changes(&self.session_start, &session_end);
        if let Err(e) = self.persisted.save(&path) {
            warn!("Failed to save config: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::DisplaySettings;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn context(dir: &TempDir, auto_load: bool) -> AppContext {
        let shared = Arc::new(SharedState::new(SharedSettings::new(
            DisplaySettings::default(),
        )));
        let library = ImageLibrary::new(dir.path().to_path_buf(), None, auto_load);
        AppContext::new(shared, library, Config::default(), Config::default(), None)
    }

    fn touch(dir: &TempDir, name: &str, secs: u64) {
        touch_path(dir, name, secs);
    }

    fn touch_path(dir: &TempDir, name: &str, secs: u64) -> PathBuf {
        let path = dir.path().join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
        path
    }

    #[test]
    fn test_opacity_and_scale_steps_respect_floors() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, false);
        ctx.shared.settings.set_opacity(0.07);
        ctx.shared.settings.set_scale(0.12);

        assert_eq!(ctx.apply(OverlayEvent::Action(Action::OpacityDown)), Effect::Redraw);
        assert_eq!(ctx.shared.settings.opacity(), OPACITY_FLOOR);
        ctx.apply(OverlayEvent::Action(Action::ScaleDown));
        assert_eq!(ctx.shared.settings.scale(), SCALE_FLOOR);

        ctx.apply(OverlayEvent::Action(Action::ScaleUp));
        assert!((ctx.shared.settings.scale() - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_wraps() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, false);
        ctx.apply(OverlayEvent::Action(Action::RotateCcw));
        assert_eq!(ctx.shared.settings.snapshot().rotation_degrees, 270);
        ctx.apply(OverlayEvent::Action(Action::RotateCw));
        ctx.apply(OverlayEvent::Action(Action::RotateCw));
        assert_eq!(ctx.shared.settings.snapshot().rotation_degrees, 90);
    }

    #[test]
    fn test_toggle_visibility() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, false);
        assert_eq!(
            ctx.apply(OverlayEvent::Action(Action::ToggleVisible)),
            Effect::SetVisible(false)
        );
        assert!(!ctx.visible());
        assert_eq!(
            ctx.apply(OverlayEvent::Action(Action::ToggleVisible)),
            Effect::SetVisible(true)
        );
    }

    #[test]
    fn test_manual_switch_survives_next_redraw() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "a.png", 100);
        touch(&dir, "b.png", 200);
        let mut ctx = context(&dir, true);
        assert_eq!(ctx.library.resolve(), Some(dir.path().join("b.png")));

        ctx.apply(OverlayEvent::Action(Action::PrevImage));
        assert_eq!(ctx.library.resolve(), Some(dir.path().join("a.png")));
        assert_eq!(ctx.library.resolve(), Some(dir.path().join("a.png")));
    }

    #[test]
    fn test_actions_ignored_while_capturing() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, false);
        ctx.shared.set_capturing(true);
        assert_eq!(ctx.apply(OverlayEvent::Action(Action::Exit)), Effect::None);
        assert_eq!(
            ctx.apply(OverlayEvent::Action(Action::StartScreenshot)),
            Effect::None
        );
        ctx.shared.set_capturing(false);
        assert_eq!(
            ctx.apply(OverlayEvent::Action(Action::StartScreenshot)),
            Effect::StartScreenshot
        );
        assert!(ctx.shared.capturing());
    }

    #[test]
    fn test_pending_redraw_is_not_presented_once_screenshot_starts() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, false);
        let mut queued = Vec::new();
        forward_signal(&ctx.shared, InputSignal::Drag(4, 4), |e| {
            queued.push(e);
            true
        });
        queued.push(OverlayEvent::Action(Action::StartScreenshot));
        assert!(ctx.presentable());

        let effects: Vec<Effect> = queued.into_iter().map(|e| ctx.apply(e)).collect();
        assert_eq!(effects, vec![Effect::Redraw, Effect::StartScreenshot]);
        // The redraw left pending by the drag must not reach the screen
        assert!(!ctx.presentable());

        ctx.shared.set_capturing(false);
        assert!(ctx.presentable());
        ctx.apply(OverlayEvent::Action(Action::ToggleVisible));
        assert!(!ctx.presentable());
    }

    #[test]
    fn test_toggles_change_settings_and_library() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, true);
        assert_eq!(
            ctx.apply(OverlayEvent::Action(Action::ToggleGrayscale)),
            Effect::Redraw
        );
        ctx.apply(OverlayEvent::Action(Action::ToggleRemoveWhite));
        let snap = ctx.shared.settings.snapshot();
        assert!(snap.grayscale && snap.remove_white_background);

        ctx.apply(OverlayEvent::Action(Action::ToggleAutoLoad));
        assert!(!ctx.library.auto_load_latest());
        ctx.apply(OverlayEvent::Action(Action::ToggleAutoLoad));
        assert!(ctx.library.auto_load_latest());
    }

    #[test]
    fn test_drag_forwarding_coalesces_redraws() {
        let shared = SharedState::new(SharedSettings::new(DisplaySettings::default()));
        let mut sent = Vec::new();
        for _ in 0..3 {
            assert!(forward_signal(&shared, InputSignal::Drag(2, -1), |e| {
                sent.push(e);
                true
            }));
        }
        assert_eq!(sent, vec![OverlayEvent::Redraw]);
        assert_eq!(shared.settings.offset(), (6, -3));

        forward_signal(&shared, InputSignal::Action(Action::Reload), |e| {
            sent.push(e);
            true
        });
        assert_eq!(sent[1], OverlayEvent::Action(Action::Reload));
    }

    #[test]
    fn test_redraw_event_rearms_coalescing() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, false);
        let mut count = 0;
        let mut send = |_| {
            count += 1;
            true
        };
        forward_signal(&ctx.shared, InputSignal::Drag(1, 1), &mut send);
        assert_eq!(ctx.apply(OverlayEvent::Redraw), Effect::Redraw);
        forward_signal(&ctx.shared, InputSignal::Drag(1, 1), &mut send);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_drag_dropped_while_capturing() {
        let shared = SharedState::new(SharedSettings::new(DisplaySettings::default()));
        shared.set_capturing(true);
        let mut sent = Vec::new();
        forward_signal(&shared, InputSignal::Drag(5, 5), |e| {
            sent.push(e);
            true
        });
        assert!(sent.is_empty());
        assert_eq!(shared.settings.offset(), (0, 0));
    }

    #[test]
    fn test_save_config_writes_session_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let shared = Arc::new(SharedState::new(SharedSettings::new(
            DisplaySettings::default(),
        )));
        let library = ImageLibrary::new(dir.path().to_path_buf(), None, true);
        let mut ctx = AppContext::new(
            shared,
            library,
            Config::default(),
            Config::default(),
            Some(path.clone()),
        );
        ctx.apply(OverlayEvent::Action(Action::OpacityUp));
        ctx.save_config();

        let saved = Config::load(&path).unwrap();
        assert_eq!(saved.opacity, 55);
    }

    #[test]
    fn test_save_config_keeps_command_line_overrides_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let image = touch_path(&dir, "ref.png", 100);
        let persisted = Config {
            directory: dir.path().to_path_buf(),
            ..Config::default()
        };
        // As if started with `overtrace ref.png --scale 2`
        let session = Config {
            image_path: Some(image.clone()),
            auto_load: false,
            scale: 200,
            ..persisted.clone()
        };
        let shared = Arc::new(SharedState::new(SharedSettings::new(
            session.display_settings(),
        )));
        let library = ImageLibrary::new(dir.path().to_path_buf(), Some(image), false);
        let mut ctx = AppContext::new(shared, library, persisted, session, Some(path.clone()));
        ctx.apply(OverlayEvent::Action(Action::RotateCw));
        ctx.save_config();

        let saved = Config::load(&path).unwrap();
        assert!(saved.auto_load);
        assert_eq!(saved.image_path, None);
        assert_eq!(saved.scale, 50);
        assert_eq!(saved.rotation, 90);
    }
}
