// Global input module
// Hotkey bindings, edge/level triggering and modifier+button drag over rdev events

use log::{debug, error, info};
use rdev::{listen, Button, EventType, Key};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};

/// Minimum spacing between repeats of a held continuous action
pub const CONTINUOUS_COOLDOWN_MS: u64 = 100;

/// Modifier bits used by the config file
pub const MOD_CTRL: u8 = 1;
pub const MOD_SHIFT: u8 = 2;
pub const MOD_ALT: u8 = 4;

/// Everything a hotkey can trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Exit,
    ToggleVisible,
    Reload,
    OpacityUp,
    OpacityDown,
    ScaleUp,
    ScaleDown,
    PrevImage,
    NextImage,
    RotateCw,
    RotateCcw,
    StartScreenshot,
    ToggleGrayscale,
    ToggleRemoveWhite,
    ToggleAutoLoad,
}

impl Action {
    pub const ALL: [Action; 15] = [
        Action::Exit,
        Action::ToggleVisible,
        Action::Reload,
        Action::OpacityUp,
        Action::OpacityDown,
        Action::ScaleUp,
        Action::ScaleDown,
        Action::PrevImage,
        Action::NextImage,
        Action::RotateCw,
        Action::RotateCcw,
        Action::StartScreenshot,
        Action::ToggleGrayscale,
        Action::ToggleRemoveWhite,
        Action::ToggleAutoLoad,
    ];

    /// Name used as the key in the config file
    pub fn name(self) -> &'static str {
        match self {
            Action::Exit => "Exit",
            Action::ToggleVisible => "ToggleVisible",
            Action::Reload => "Reload",
            Action::OpacityUp => "OpacityUp",
            Action::OpacityDown => "OpacityDown",
            Action::ScaleUp => "ScaleUp",
            Action::ScaleDown => "ScaleDown",
            Action::PrevImage => "PrevImage",
            Action::NextImage => "NextImage",
            Action::RotateCw => "RotateCW",
            Action::RotateCcw => "RotateCCW",
            Action::StartScreenshot => "StartScreenshot",
            Action::ToggleGrayscale => "ToggleGrayscale",
            Action::ToggleRemoveWhite => "ToggleRemoveWhite",
            Action::ToggleAutoLoad => "ToggleAutoLoad",
        }
    }

    pub fn from_name(name: &str) -> Option<Action> {
        Action::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
    }

    /// Continuous actions keep firing while held; the rest fire once per press
    pub fn is_continuous(self) -> bool {
        matches!(
            self,
            Action::OpacityUp | Action::OpacityDown | Action::ScaleUp | Action::ScaleDown
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hotkey {
    pub key: Key,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Hotkey {
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            ctrl: false,
            shift: false,
            alt: false,
        }
    }

    /// Build from a key name and a modifier bitmask
    pub fn from_parts(key: &str, modifiers: u8) -> Option<Self> {
        let key = parse_key(&key.trim().to_ascii_uppercase())?;
        Some(Self {
            key,
            ctrl: modifiers & MOD_CTRL != 0,
            shift: modifiers & MOD_SHIFT != 0,
            alt: modifiers & MOD_ALT != 0,
        })
    }

    pub fn modifiers(&self) -> u8 {
        let mut bits = 0;
        if self.ctrl {
            bits |= MOD_CTRL;
        }
        if self.shift {
            bits |= MOD_SHIFT;
        }
        if self.alt {
            bits |= MOD_ALT;
        }
        bits
    }
}

/// Parse a hotkey string like "Ctrl+Shift+F5" into a [`Hotkey`].
pub fn parse_hotkey(s: &str) -> Option<Hotkey> {
    let mut ctrl = false;
    let mut shift = false;
    let mut alt = false;
    let mut key: Option<Key> = None;

    for part in s.split('+') {
        let upper = part.trim().to_ascii_uppercase();
        match upper.as_str() {
            "CTRL" | "CONTROL" => ctrl = true,
            "SHIFT" => shift = true,
            "ALT" => alt = true,
            "" => {}
            _ => key = Some(parse_key(&upper)?),
        }
    }

    key.map(|key| Hotkey {
        key,
        ctrl,
        shift,
        alt,
    })
}

/// Names accepted in bindings, upper-cased. The first name of each key is
/// the one written back to the config file.
const KEY_NAMES: &[(&str, Key)] = &[
    ("END", Key::End),
    ("HOME", Key::Home),
    ("PAGEUP", Key::PageUp),
    ("PAGEDOWN", Key::PageDown),
    ("INSERT", Key::Insert),
    ("DELETE", Key::Delete),
    ("ESCAPE", Key::Escape),
    ("ESC", Key::Escape),
    ("RETURN", Key::Return),
    ("ENTER", Key::Return),
    ("SPACE", Key::Space),
    ("TAB", Key::Tab),
    ("BACKSPACE", Key::Backspace),
    ("PRINTSCREEN", Key::PrintScreen),
    ("PRINT", Key::PrintScreen),
    ("PAUSE", Key::Pause),
    ("SCROLLLOCK", Key::ScrollLock),
    ("UPARROW", Key::UpArrow),
    ("UP", Key::UpArrow),
    ("DOWNARROW", Key::DownArrow),
    ("DOWN", Key::DownArrow),
    ("LEFTARROW", Key::LeftArrow),
    ("LEFT", Key::LeftArrow),
    ("RIGHTARROW", Key::RightArrow),
    ("RIGHT", Key::RightArrow),
    ("KP0", Key::Kp0),
    ("KP1", Key::Kp1),
    ("KP2", Key::Kp2),
    ("KP3", Key::Kp3),
    ("KP4", Key::Kp4),
    ("KP5", Key::Kp5),
    ("KP6", Key::Kp6),
    ("KP7", Key::Kp7),
    ("KP8", Key::Kp8),
    ("KP9", Key::Kp9),
    ("KPDELETE", Key::KpDelete),
    ("KPDECIMAL", Key::KpDelete),
    ("KPRETURN", Key::KpReturn),
    ("KPPLUS", Key::KpPlus),
    ("KPMINUS", Key::KpMinus),
    ("KPMULTIPLY", Key::KpMultiply),
    ("KPDIVIDE", Key::KpDivide),
    ("CONTROLLEFT", Key::ControlLeft),
    ("CONTROLRIGHT", Key::ControlRight),
    ("SHIFTLEFT", Key::ShiftLeft),
    ("SHIFTRIGHT", Key::ShiftRight),
    ("ALTLEFT", Key::Alt),
    ("ALTGR", Key::AltGr),
    ("F1", Key::F1),
    ("F2", Key::F2),
    ("F3", Key::F3),
    ("F4", Key::F4),
    ("F5", Key::F5),
    ("F6", Key::F6),
    ("F7", Key::F7),
    ("F8", Key::F8),
    ("F9", Key::F9),
    ("F10", Key::F10),
    ("F11", Key::F11),
    ("F12", Key::F12),
    ("0", Key::Num0),
    ("1", Key::Num1),
    ("2", Key::Num2),
    ("3", Key::Num3),
    ("4", Key::Num4),
    ("5", Key::Num5),
    ("6", Key::Num6),
    ("7", Key::Num7),
    ("8", Key::Num8),
    ("9", Key::Num9),
    ("A", Key::KeyA),
    ("B", Key::KeyB),
    ("C", Key::KeyC),
    ("D", Key::KeyD),
    ("E", Key::KeyE),
    ("F", Key::KeyF),
    ("G", Key::KeyG),
    ("H", Key::KeyH),
    ("I", Key::KeyI),
    ("J", Key::KeyJ),
    ("K", Key::KeyK),
    ("L", Key::KeyL),
    ("M", Key::KeyM),
    ("N", Key::KeyN),
    ("O", Key::KeyO),
    ("P", Key::KeyP),
    ("Q", Key::KeyQ),
    ("R", Key::KeyR),
    ("S", Key::KeyS),
    ("T", Key::KeyT),
    ("U", Key::KeyU),
    ("V", Key::KeyV),
    ("W", Key::KeyW),
    ("X", Key::KeyX),
    ("Y", Key::KeyY),
    ("Z", Key::KeyZ),
];

/// Key for an upper-cased name
pub fn parse_key(upper: &str) -> Option<Key> {
    KEY_NAMES
        .iter()
        .find(|(name, _)| *name == upper)
        .map(|(_, key)| *key)
}

/// Canonical name of a key, if it can be bound
pub fn key_name(key: Key) -> Option<&'static str> {
    KEY_NAMES
        .iter()
        .find(|(_, k)| *k == key)
        .map(|(name, _)| *name)
}

/// Mouse button that moves the image while the drag modifier is held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DragButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl DragButton {
    fn matches(self, button: Button) -> bool {
        matches!(
            (self, button),
            (DragButton::Left, Button::Left)
                | (DragButton::Right, Button::Right)
                | (DragButton::Middle, Button::Middle)
        )
    }
}

/// The full set of global bindings
#[derive(Debug, Clone)]
pub struct Bindings {
    pub hotkeys: Vec<(Action, Hotkey)>,
    pub drag_modifier: Key,
    pub drag_button: DragButton,
}

impl Bindings {
    #[cfg(test)]
    pub fn hotkey(&self, action: Action) -> Option<Hotkey> {
        self.hotkeys
            .iter()
            .find(|(a, _)| *a == action)
            .map(|(_, hk)| *hk)
    }

    /// Replace the binding of `action`
    pub fn bind(&mut self, action: Action, hotkey: Hotkey) {
        match self.hotkeys.iter_mut().find(|(a, _)| *a == action) {
            Some(entry) => entry.1 = hotkey,
            None => self.hotkeys.push((action, hotkey)),
        }
    }
}

impl Default for Bindings {
    fn default() -> Self {
        let hotkeys = vec![
            (Action::Exit, Hotkey::plain(Key::End)),
            (Action::ToggleVisible, Hotkey::plain(Key::Kp0)),
            (Action::Reload, Hotkey::plain(Key::KpDelete)),
            (Action::OpacityUp, Hotkey::plain(Key::Kp8)),
            (Action::OpacityDown, Hotkey::plain(Key::Kp2)),
            (Action::ScaleUp, Hotkey::plain(Key::UpArrow)),
            (Action::ScaleDown, Hotkey::plain(Key::DownArrow)),
            (Action::PrevImage, Hotkey::plain(Key::LeftArrow)),
            (Action::NextImage, Hotkey::plain(Key::RightArrow)),
            (Action::RotateCw, Hotkey::plain(Key::Kp9)),
            (Action::RotateCcw, Hotkey::plain(Key::Kp7)),
            (Action::ToggleGrayscale, Hotkey::plain(Key::Kp1)),
            (Action::ToggleRemoveWhite, Hotkey::plain(Key::Kp3)),
            (Action::ToggleAutoLoad, Hotkey::plain(Key::Kp5)),
            (
                Action::StartScreenshot,
                Hotkey {
                    ctrl: true,
                    ..Hotkey::plain(Key::PrintScreen)
                },
            ),
        ];
        Self {
            hotkeys,
            drag_modifier: Key::ControlLeft,
            drag_button: DragButton::Left,
        }
    }
}

/// What the tracker asks the overlay to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSignal {
    Action(Action),
    Drag(i32, i32),
}

/// Turns the raw global event stream into [`InputSignal`]s.
///
/// Pure state machine: the caller feeds events and the time they arrived.
pub struct InputTracker {
    bindings: Bindings,
    held: Vec<Key>,
    last_fired: Vec<(Action, Instant)>,
    drag_button_down: bool,
    /// Cursor position at the last drag step, `None` while not dragging
    drag_anchor: Option<(i32, i32)>,
    cooldown: Duration,
}

impl InputTracker {
    pub fn new(bindings: Bindings) -> Self {
        Self {
            bindings,
            held: Vec::new(),
            last_fired: Vec::new(),
            drag_button_down: false,
            drag_anchor: None,
            cooldown: Duration::from_millis(CONTINUOUS_COOLDOWN_MS),
        }
    }

    fn is_held(&self, key: Key) -> bool {
        self.held.contains(&key)
    }

    fn modifiers_satisfied(&self, hotkey: &Hotkey) -> bool {
        let ctrl = self.is_held(Key::ControlLeft) || self.is_held(Key::ControlRight);
        let shift = self.is_held(Key::ShiftLeft) || self.is_held(Key::ShiftRight);
        let alt = self.is_held(Key::Alt) || self.is_held(Key::AltGr);
        (!hotkey.ctrl || ctrl) && (!hotkey.shift || shift) && (!hotkey.alt || alt)
    }

    fn dragging_allowed(&self) -> bool {
        self.drag_button_down && self.is_held(self.bindings.drag_modifier)
    }

    fn cooled_down(&mut self, action: Action, now: Instant) -> bool {
        match self.last_fired.iter_mut().find(|(a, _)| *a == action) {
            Some((_, last)) if now.duration_since(*last) < self.cooldown => false,
            Some((_, last)) => {
                *last = now;
                true
            }
            None => {
                self.last_fired.push((action, now));
                true
            }
        }
    }

    pub fn handle(&mut self, event: &EventType, now: Instant) -> Vec<InputSignal> {
        let mut signals = Vec::new();
        match event {
            &EventType::KeyPress(key) => {
                let repeat = self.is_held(key);
                if !repeat {
                    self.held.push(key);
                }
                let matching: Vec<Action> = self
                    .bindings
                    .hotkeys
                    .iter()
                    .filter(|(_, hk)| hk.key == key && self.modifiers_satisfied(hk))
                    .map(|(action, _)| *action)
                    .collect();
                for action in matching {
                    let fire = if action.is_continuous() {
                        if !repeat {
                            // A fresh press always fires and restarts the cool-down
                            self.last_fired.retain(|(a, _)| *a != action);
                        }
                        self.cooled_down(action, now)
                    } else {
                        !repeat
                    };
                    if fire {
                        debug!("Hotkey {:?} fired", action);
                        signals.push(InputSignal::Action(action));
                    }
                }
            }
            &EventType::KeyRelease(key) => {
                self.held.retain(|k| *k != key);
                if key == self.bindings.drag_modifier {
                    self.drag_anchor = None;
                }
            }
            &EventType::ButtonPress(button) => {
                if self.bindings.drag_button.matches(button) {
                    self.drag_button_down = true;
                }
            }
            &EventType::ButtonRelease(button) => {
                if self.bindings.drag_button.matches(button) {
                    self.drag_button_down = false;
                    self.drag_anchor = None;
                }
            }
            &EventType::MouseMove { x, y } => {
                let pos = (x.round() as i32, y.round() as i32);
                if self.dragging_allowed() {
                    if let Some((ax, ay)) = self.drag_anchor {
                        let (dx, dy) = (pos.0 - ax, pos.1 - ay);
                        if dx != 0 || dy != 0 {
                            signals.push(InputSignal::Drag(dx, dy));
                        }
                    }
                    self.drag_anchor = Some(pos);
                } else {
                    self.drag_anchor = None;
                }
            }
            _ => {}
        }
        signals
    }
}

/// Start the global listener thread.
///
/// `emit` receives every signal and returns false once the receiving side
/// is gone; later events are then dropped.
pub fn spawn_listener<F>(bindings: Bindings, mut emit: F) -> thread::JoinHandle<()>
where
    F: FnMut(InputSignal) -> bool + Send + 'static,
{
    thread::spawn(move || {
        info!(
            "Starting global input listener ({} hotkeys)",
            bindings.hotkeys.len()
        );
        let mut tracker = InputTracker::new(bindings);
        let mut open = true;
        let result = listen(move |event| {
            if !open {
                return;
            }
            for signal in tracker.handle(&event.event_type, Instant::now()) {
                if !emit(signal) {
                    open = false;
                    break;
                }
            }
        });
        if let Err(e) = result {
            error!("Global input listener failed: {:?}", e);
        }
    })
}
