// Wayland integration module
// Full-screen click-through overlay on wlr-layer-shell, driven by a calloop event loop

use crate::app::{AppContext, Effect, OverlayEvent};
use crate::compose::Canvas;
use crate::library::AutoLoadOutcome;
use crate::pipeline::{RedrawError, RedrawPipeline};
use crate::screenshot::{self, ScreenshotSession, SessionAction, CAPTURE_DELAY_MS};
use anyhow::{anyhow, Context, Result};
use chrono::Local;
use log::{debug, error, info, warn};
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState, Region},
    delegate_compositor, delegate_keyboard, delegate_layer, delegate_output, delegate_pointer,
    delegate_registry, delegate_seat, delegate_shm,
    output::{OutputHandler, OutputState},
    reexports::{
        calloop::{
            channel::{self, Channel},
            timer::{TimeoutAction, Timer},
            EventLoop, LoopHandle,
        },
        calloop_wayland_source::WaylandSource,
    },
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    seat::{
        keyboard::{KeyEvent, KeyboardHandler, Keysym, Modifiers},
        pointer::{PointerEvent, PointerEventKind, PointerHandler},
        Capability, SeatHandler, SeatState,
    },
    shell::{
        wlr_layer::{
            Anchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
            LayerSurfaceConfigure,
        },
        WaylandSurface,
    },
    shm::{
        slot::{Buffer, SlotPool},
        Shm, ShmHandler,
    },
};
use std::time::Duration;
use wayland_client::{
    globals::registry_queue_init,
    protocol::{wl_keyboard, wl_output, wl_pointer, wl_seat, wl_shm, wl_surface},
    Connection, QueueHandle,
};

/// Mouse button constants
const BTN_LEFT: u32 = 272;
const BTN_RIGHT: u32 = 273;

/// Directory poll interval for auto-load
pub const AUTO_LOAD_POLL_MS: u64 = 1000;

/// Maximum buffer size (a 5K screen fits)
const MAX_BUFFER_SIZE: usize = 128 * 1024 * 1024;

/// Shared-memory buffers for the overlay surface
#[derive(Default)]
struct ShmPresenter {
    pool: Option<SlotPool>,
    // Kept alive until the compositor is done with it
    buffer: Option<Buffer>,
}

impl ShmPresenter {
    /// Copy `canvas` into a fresh `Argb8888` buffer, attach it and commit
    fn present(
        &mut self,
        shm: &Shm,
        surface: &wl_surface::WlSurface,
        canvas: &Canvas,
    ) -> Result<()> {
        self.commit_frame(shm, surface, canvas.width(), canvas.height(), |pixels| {
            pixels.copy_from_slice(canvas.as_bytes())
        })
    }

    /// Commit a fully transparent frame. The surface stays mapped so showing
    /// it again needs no new configure.
    fn hide(
        &mut self,
        shm: &Shm,
        surface: &wl_surface::WlSurface,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.commit_frame(shm, surface, width, height, |pixels| pixels.fill(0))
    }

    fn commit_frame<F>(
        &mut self,
        shm: &Shm,
        surface: &wl_surface::WlSurface,
        width: u32,
        height: u32,
        fill: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut [u8]),
    {
        let stride = width as i32 * 4;
        let buffer_size = width as usize * height as usize * 4;
        if buffer_size == 0 {
            return Ok(());
        }
        if buffer_size > MAX_BUFFER_SIZE {
            return Err(anyhow!(
                "Buffer size too large: {} bytes, max: {} bytes",
                buffer_size,
                MAX_BUFFER_SIZE
            ));
        }

        if self.pool.is_none() {
            self.pool =
                Some(SlotPool::new(buffer_size, shm).context("Failed to create slot pool")?);
        }
        let Some(pool) = self.pool.as_mut() else {
            return Ok(());
        };
        if pool.len() < buffer_size {
            pool.resize(buffer_size)
                .with_context(|| format!("Failed to resize pool to {} bytes", buffer_size))?;
        }

        let (buffer, pixels) = pool
            .create_buffer(width as i32, height as i32, stride, wl_shm::Format::Argb8888)
            .with_context(|| format!("Failed to create buffer {}x{}", width, height))?;
        fill(&mut pixels[..buffer_size]);

        buffer
            .attach_to(surface)
            .context("Failed to attach buffer")?;
        surface.damage_buffer(0, 0, width as i32, height as i32);
        surface.commit();

        self.buffer = Some(buffer);
        Ok(())
    }
}

/// Main Wayland application state
struct OverlayApp {
    // Registry state
    registry_state: RegistryState,
    // Seat state for input handling
    seat_state: SeatState,
    // Output state for display info
    output_state: OutputState,
    // Shared memory for buffer allocation
    shm: Shm,
    // Layer shell for overlay windows
    layer_shell: LayerShell,
    // Compositor state
    compositor_state: CompositorState,

    loop_handle: LoopHandle<'static, OverlayApp>,

    // Application-specific state
    ctx: AppContext,
    pipeline: RedrawPipeline,
    should_exit: bool,

    // Surface and buffer management
    layer_surface: Option<LayerSurface>,
    presenter: ShmPresenter,
    width: u32,
    height: u32,
    configured: bool,
    needs_redraw: bool,

    // Region screenshot in progress
    screenshot: Option<ScreenshotSession>,
    screenshot_canvas: Option<Canvas>,
}

impl OverlayApp {
    /// Run one full redraw cycle now and push it to the surface.
    /// Returns true when a new frame was composited.
    fn request_redraw(&mut self) -> bool {
        if !self.configured {
            self.needs_redraw = true;
            return false;
        }
        self.needs_redraw = false;

        let settings = self.ctx.shared.settings.snapshot();
        match self.pipeline.render(&mut self.ctx.library, &settings) {
            Ok(placement) => {
                debug!("Composited at {:?}", placement);
                if self.ctx.presentable() {
                    if let Some(layer_surface) = self.layer_surface.as_ref() {
                        if let Err(e) = self.presenter.present(
                            &self.shm,
                            layer_surface.wl_surface(),
                            self.pipeline.canvas(),
                        ) {
                            error!("Failed to present frame: {:#}", e);
                        }
                    }
                }
                self.pipeline.presented();
                true
            }
            Err(RedrawError::NoImage) => {
                debug!("Nothing to draw");
                false
            }
            Err(e) => {
                warn!("Redraw skipped: {}", e);
                false
            }
        }
    }

    /// Show or hide the overlay without discarding the last frame
    fn set_visible(&mut self, visible: bool) {
        if self.ctx.shared.capturing() {
            return;
        }
        if !visible {
            self.hide_surface();
        } else if self.pipeline.placement().is_none() {
            // Nothing composited yet
            self.request_redraw();
        } else if let Some(layer_surface) = self.layer_surface.as_ref() {
            if let Err(e) =
                self.presenter
                    .present(&self.shm, layer_surface.wl_surface(), self.pipeline.canvas())
            {
                error!("Failed to present frame: {:#}", e);
            }
        }
    }

    fn hide_surface(&mut self) {
        if let Some(layer_surface) = self.layer_surface.as_ref() {
            if let Err(e) =
                self.presenter
                    .hide(&self.shm, layer_surface.wl_surface(), self.width, self.height)
            {
                error!("Failed to hide overlay: {:#}", e);
            }
        }
    }

    fn handle_event(&mut self, event: OverlayEvent) {
        match self.ctx.apply(event) {
            Effect::None => {}
            Effect::Redraw => self.needs_redraw = true,
            Effect::SetVisible(visible) => self.set_visible(visible),
            Effect::StartScreenshot => self.start_screenshot(),
            Effect::Exit => {
                info!("Exit requested");
                self.should_exit = true;
            }
        }
    }

    /// Timer tick: switch to a newer file when auto-load is on
    fn poll_auto_load(&mut self) {
        if self.ctx.shared.capturing() {
            return;
        }
        match self.ctx.library.evaluate_auto_load() {
            AutoLoadOutcome::NewFile(_) | AutoLoadOutcome::Adopted(_) => self.needs_redraw = true,
            _ => {}
        }
    }

    /// Toggle between the click-through overlay and the interactive capture surface
    fn set_interactive(&self, interactive: bool) {
        let Some(layer_surface) = self.layer_surface.as_ref() else {
            return;
        };
        if interactive {
            layer_surface.wl_surface().set_input_region(None);
            layer_surface.set_keyboard_interactivity(KeyboardInteractivity::Exclusive);
        } else {
            match Region::new(&self.compositor_state) {
                Ok(region) => layer_surface
                    .wl_surface()
                    .set_input_region(Some(region.wl_region())),
                Err(e) => error!("Failed to create input region: {}", e),
            }
            layer_surface.set_keyboard_interactivity(KeyboardInteractivity::None);
        }
    }

    fn start_screenshot(&mut self) {
        // The capturing flag is already set, so nothing presents until the
        // session ends
        if self.screenshot.is_some() {
            return;
        }
        info!("Starting region screenshot");
        self.needs_redraw = false;
        self.hide_surface();

        let delay = Timer::from_duration(Duration::from_millis(CAPTURE_DELAY_MS));
        let inserted = self.loop_handle.insert_source(delay, |_, _, app| {
            app.capture_screenshot();
            TimeoutAction::Drop
        });
        if let Err(e) = inserted {
            error!("Failed to schedule capture: {}", e.error);
            self.finish_screenshot(false);
        }
    }

    fn capture_screenshot(&mut self) {
        let desktop = match screenshot::capture_desktop() {
            Ok(desktop) => desktop,
            Err(e) => {
                warn!("{}", e);
                self.finish_screenshot(false);
                return;
            }
        };
        self.screenshot = Some(ScreenshotSession::new(desktop, self.width, self.height));
        self.screenshot_canvas = Some(Canvas::new(self.width, self.height));
        self.set_interactive(true);
        self.render_screenshot();
    }

    fn render_screenshot(&mut self) {
        let (Some(session), Some(canvas)) = (self.screenshot.as_ref(), self.screenshot_canvas.as_mut())
        else {
            return;
        };
        session.render(canvas);
        if let Some(layer_surface) = self.layer_surface.as_ref() {
            if let Err(e) = self
                .presenter
                .present(&self.shm, layer_surface.wl_surface(), canvas)
            {
                error!("Failed to present screenshot view: {:#}", e);
            }
        }
    }

    /// Leave capture mode, saving the selection first when asked
    fn finish_screenshot(&mut self, save: bool) {
        if let Some(session) = self.screenshot.take() {
            if save {
                match session.save(self.ctx.library.directory(), Local::now()) {
                    Ok(path) => self.ctx.library.note_new_file(path),
                    Err(e) => warn!("{}", e),
                }
            }
        }
        self.screenshot_canvas = None;
        self.set_interactive(false);
        self.ctx.shared.set_capturing(false);

        // Redraw picks up a new screenshot in auto-load mode
        let redrawn = self.ctx.visible() && self.request_redraw();
        if !redrawn {
            if self.ctx.visible() && self.pipeline.placement().is_some() {
                self.set_visible(true);
            } else {
                self.hide_surface();
            }
        }
    }

    fn handle_session_action(&mut self, action: SessionAction) {
        match action {
            SessionAction::None => {}
            SessionAction::Redraw => self.render_screenshot(),
            SessionAction::Save => self.finish_screenshot(true),
            SessionAction::Cancel => self.finish_screenshot(false),
        }
    }
}

impl CompositorHandler for OverlayApp {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {
        // Buffers stay at buffer scale 1; the compositor scales them
        debug!("Scale factor changed");
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
        debug!("Transform changed");
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for OverlayApp {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("New output detected");
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("Output updated");
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("Output destroyed");
    }
}

impl LayerShellHandler for OverlayApp {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _layer: &LayerSurface) {
        info!("Layer surface closed");
        self.should_exit = true;
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        debug!("Layer surface configured: {:?}", configure);

        if configure.new_size.0 > 0 {
            self.width = configure.new_size.0;
        }
        if configure.new_size.1 > 0 {
            self.height = configure.new_size.1;
        }
        if self.pipeline.resize(self.width, self.height) {
            info!("Overlay size: {}x{}", self.width, self.height);
        }

        self.configured = true;
        if self.screenshot.is_none() {
            self.needs_redraw = true;
        }
    }
}

impl SeatHandler for OverlayApp {
    fn seat_state(&mut self) -> &mut SeatState {
        &mut self.seat_state
    }

    fn new_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {
        debug!("New seat");
    }

    fn new_capability(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        debug!("New capability: {:?}", capability);

        if capability == Capability::Keyboard {
            if let Err(e) = self.seat_state.get_keyboard(qh, &seat, None) {
                error!("Failed to get keyboard: {}", e);
            }
        }
        if capability == Capability::Pointer {
            if let Err(e) = self.seat_state.get_pointer(qh, &seat) {
                error!("Failed to get pointer: {}", e);
            }
        }
    }

    fn remove_capability(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _seat: wl_seat::WlSeat,
        _capability: Capability,
    ) {
        debug!("Capability removed");
    }

    fn remove_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {
        debug!("Seat removed");
    }
}

impl KeyboardHandler for OverlayApp {
    fn enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _surface: &wl_surface::WlSurface,
        _serial: u32,
        _raw: &[u32],
        _keysyms: &[Keysym],
    ) {
        debug!("Keyboard entered surface");
    }

    fn leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _surface: &wl_surface::WlSurface,
        _serial: u32,
    ) {
        debug!("Keyboard left surface");
    }

    fn press_key(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        event: KeyEvent,
    ) {
        // The surface only takes keyboard focus while capturing
        let Some(session) = self.screenshot.as_ref() else {
            return;
        };
        debug!("Key pressed: {:?}", event.keysym);

        if event.keysym == Keysym::Escape {
            info!("Screenshot cancelled");
            self.finish_screenshot(false);
        } else if event.keysym == Keysym::Return || event.keysym == Keysym::KP_Enter {
            if session.selection().is_some() {
                self.finish_screenshot(true);
            }
        }
    }

    fn release_key(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        _event: KeyEvent,
    ) {
    }

    fn update_modifiers(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        _modifiers: Modifiers,
        _layout: u32,
    ) {
    }
}

impl PointerHandler for OverlayApp {
    fn pointer_frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _pointer: &wl_pointer::WlPointer,
        events: &[PointerEvent],
    ) {
        for event in events {
            let (x, y) = (event.position.0 as i32, event.position.1 as i32);
            let Some(session) = self.screenshot.as_mut() else {
                continue;
            };

            let action = match event.kind {
                PointerEventKind::Motion { .. } => session.pointer_motion(x, y),
                PointerEventKind::Press { button, .. } if button == BTN_LEFT => {
                    session.pointer_press(x, y)
                }
                PointerEventKind::Press { button, .. } if button == BTN_RIGHT => {
                    SessionAction::Cancel
                }
                PointerEventKind::Release { button, .. } if button == BTN_LEFT => {
                    session.pointer_release(x, y)
                }
                _ => SessionAction::None,
            };
            self.handle_session_action(action);
        }
    }
}

impl ShmHandler for OverlayApp {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.shm
    }
}

impl ProvidesRegistryState for OverlayApp {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState, SeatState];
}

// Delegate macros
delegate_compositor!(OverlayApp);
delegate_output!(OverlayApp);
delegate_layer!(OverlayApp);
delegate_seat!(OverlayApp);
delegate_keyboard!(OverlayApp);
delegate_pointer!(OverlayApp);
delegate_shm!(OverlayApp);
delegate_registry!(OverlayApp);

/// Run the overlay until an Exit event, then persist the session
pub fn run(ctx: AppContext, events: Channel<OverlayEvent>) -> Result<()> {
    info!("Connecting to Wayland display");

    // Connect to Wayland display
    let conn = Connection::connect_to_env().context("Failed to connect to Wayland display")?;

    // Initialize registry and event queue
    let (globals, mut event_queue) =
        registry_queue_init(&conn).context("Failed to initialize registry")?;
    let qh = event_queue.handle();

    // Initialize required globals
    let compositor_state =
        CompositorState::bind(&globals, &qh).context("Failed to bind compositor")?;
    let layer_shell = LayerShell::bind(&globals, &qh).context("Failed to bind layer shell")?;
    let shm = Shm::bind(&globals, &qh).context("Failed to bind shm")?;

    let mut event_loop: EventLoop<'static, OverlayApp> =
        EventLoop::try_new().context("Failed to create event loop")?;
    let loop_handle = event_loop.handle();

    let mut app = OverlayApp {
        registry_state: RegistryState::new(&globals),
        seat_state: SeatState::new(&globals, &qh),
        output_state: OutputState::new(&globals, &qh),
        shm,
        layer_shell,
        compositor_state,
        loop_handle: loop_handle.clone(),
        ctx,
        pipeline: RedrawPipeline::new(0, 0),
        should_exit: false,
        layer_surface: None,
        presenter: ShmPresenter::default(),
        width: 0,
        height: 0,
        configured: false,
        needs_redraw: false,
        screenshot: None,
        screenshot_canvas: None,
    };

    // Dispatch once to get output info
    event_queue.roundtrip(&mut app)?;

    let (display_width, display_height) = get_display_dimensions(&app.output_state);
    info!("Display dimensions: {}x{}", display_width, display_height);
    app.width = display_width;
    app.height = display_height;

    // Full-screen overlay that never takes input
    let surface = app.compositor_state.create_surface(&qh);
    let layer_surface = app.layer_shell.create_layer_surface(
        &qh,
        surface,
        Layer::Overlay,
        Some("overtrace"),
        None,
    );
    layer_surface.set_anchor(Anchor::TOP | Anchor::BOTTOM | Anchor::LEFT | Anchor::RIGHT);
    layer_surface.set_exclusive_zone(-1);
    layer_surface.set_size(0, 0);
    app.layer_surface = Some(layer_surface);
    app.set_interactive(false);

    // Commit the surface to trigger configure
    if let Some(layer_surface) = app.layer_surface.as_ref() {
        layer_surface.commit();
    }

    WaylandSource::new(conn.clone(), event_queue)
        .insert(loop_handle.clone())
        .map_err(|e| anyhow!("Failed to insert Wayland source: {}", e.error))?;

    loop_handle
        .insert_source(events, |event, _, app| match event {
            channel::Event::Msg(event) => app.handle_event(event),
            channel::Event::Closed => debug!("Input channel closed"),
        })
        .map_err(|e| anyhow!("Failed to insert event channel: {}", e.error))?;

    let poll = Duration::from_millis(AUTO_LOAD_POLL_MS);
    loop_handle
        .insert_source(Timer::from_duration(poll), move |_, _, app| {
            app.poll_auto_load();
            TimeoutAction::ToDuration(poll)
        })
        .map_err(|e| anyhow!("Failed to insert auto-load timer: {}", e.error))?;

    info!("Starting event loop");

    // Main event loop
    loop {
        if app.needs_redraw && !app.ctx.shared.capturing() {
            app.request_redraw();
        }

        event_loop
            .dispatch(None, &mut app)
            .context("Event loop dispatch failed")?;

        if app.should_exit {
            info!("Exiting application");
            break;
        }
    }

    app.ctx.save_config();
    Ok(())
}

/// Get display dimensions from the output state
fn get_display_dimensions(output_state: &OutputState) -> (u32, u32) {
    for output in output_state.outputs() {
        if let Some(info) = output_state.info(&output) {
            if let Some((w, h)) = info.logical_size {
                return (w as u32, h as u32);
            }
            if let Some(mode) = info.modes.iter().find(|m| m.current) {
                return (mode.dimensions.0 as u32, mode.dimensions.1 as u32);
            }
        }
    }
    (1920, 1080)
}
