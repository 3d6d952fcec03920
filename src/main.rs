// overtrace - A click-through tracing overlay for Wayland
// Shows an image full-screen above every window while input passes through to the desktop

mod app;
mod cli;
mod compose;
mod config;
mod error;
mod glyphs;
mod image_loader;
mod input;
mod library;
mod pipeline;
mod screenshot;
mod settings;
mod transform;
mod wayland;

use anyhow::Result;
use app::{AppContext, SharedState};
use config::Config;
use library::ImageLibrary;
use log::{info, warn};
use settings::SharedSettings;
use smithay_client_toolkit::reexports::calloop::channel;
use std::sync::Arc;

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let args = cli::parse_args();

    // Saved session, then command line overrides
    let config_path = args.config.clone().or_else(config::default_config_path);
    let persisted = match config_path.as_deref() {
        Some(path) => Config::load_or_default(path),
        None => {
            warn!("No config directory available, settings will not be saved");
            Config::default()
        }
    };
    let mut config = persisted.clone();
    args.apply_to(&mut config);

    if let Err(e) = std::fs::create_dir_all(&config.directory) {
        warn!("Failed to create image directory {:?}: {}", config.directory, e);
    }

    info!(
        "Starting overtrace in {:?}, image: {:?}, auto-load: {}",
        config.directory, config.image_path, config.auto_load
    );

    let library = ImageLibrary::new(
        config.directory.clone(),
        config.image_path.clone(),
        config.auto_load,
    );
    let shared = Arc::new(SharedState::new(SharedSettings::new(
        config.display_settings(),
    )));

    let (sender, events) = channel::channel();
    if args.no_hotkeys {
        info!("Global hotkeys disabled");
    } else {
        let listener_state = Arc::clone(&shared);
        input::spawn_listener(config.bindings(), move |signal| {
            app::forward_signal(&listener_state, signal, |event| sender.send(event).is_ok())
        });
    }

    let ctx = AppContext::new(shared, library, persisted, config, config_path);
    wayland::run(ctx, events)
}
