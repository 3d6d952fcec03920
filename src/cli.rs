// Command line interface module
// Handles parsing of command line arguments and their overrides of the saved config

use crate::config::{to_percent, Config};
use clap::Parser;
use std::path::PathBuf;

/// overtrace - A click-through tracing overlay for Wayland
#[derive(Parser, Debug)]
#[command(name = "overtrace")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Image to show first (disables auto-load unless --auto-load is given)
    #[arg(value_name = "IMAGE")]
    pub image_path: Option<PathBuf>,

    /// Directory scanned for images and used for screenshots
    #[arg(short, long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Opacity of the image (0.0 - 1.0)
    #[arg(short, long, value_parser = parse_opacity)]
    pub opacity: Option<f32>,

    /// Scale factor for the image (e.g., 0.5 for half size, 2.0 for double)
    #[arg(short, long, value_parser = parse_scale)]
    pub scale: Option<f32>,

    /// Show the image in grayscale
    #[arg(short, long)]
    pub grayscale: bool,

    /// Make near-white pixels fully transparent
    #[arg(short = 'w', long)]
    pub remove_white: bool,

    /// Follow the newest image in the directory
    #[arg(long, conflicts_with = "no_auto_load")]
    pub auto_load: bool,

    /// Keep the chosen image even when newer ones appear
    #[arg(long)]
    pub no_auto_load: bool,

    /// Clockwise rotation in degrees
    #[arg(short, long, allow_hyphen_values = true)]
    pub rotation: Option<i32>,

    /// Path of the config file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Do not listen for global hotkeys
    #[arg(long)]
    pub no_hotkeys: bool,
}

/// Parse opacity value and ensure it's within valid range
fn parse_opacity(s: &str) -> Result<f32, String> {
    let opacity: f32 = s.parse().map_err(|_| "Invalid opacity value")?;
    if !(0.0..=1.0).contains(&opacity) {
        return Err("Opacity must be between 0.0 and 1.0".to_string());
    }
    Ok(opacity)
}

/// Parse scale value and ensure it's positive
fn parse_scale(s: &str) -> Result<f32, String> {
    let scale: f32 = s.parse().map_err(|_| "Invalid scale value")?;
    if !(scale > 0.0) || !scale.is_finite() {
        return Err("Scale must be greater than 0".to_string());
    }
    Ok(scale)
}

impl Args {
    /// Apply the command line on top of the loaded config for this session
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(dir) = &self.dir {
            config.directory = dir.clone();
        }
        if let Some(path) = &self.image_path {
            config.image_path = Some(path.clone());
            config.auto_load = false;
        }
        if let Some(opacity) = self.opacity {
            config.opacity = to_percent(opacity);
        }
        if let Some(scale) = self.scale {
            config.scale = to_percent(scale).max(1);
        }
        if self.grayscale {
            config.grayscale = true;
        }
        if self.remove_white {
            config.remove_white = true;
        }
        if self.auto_load {
            config.auto_load = true;
        }
        if self.no_auto_load {
            config.auto_load = false;
        }
        if let Some(rotation) = self.rotation {
            config.rotation = rotation.rem_euclid(360);
        }
    }
}

/// Parse command line arguments
pub fn parse_args() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("overtrace").chain(args.iter().copied()))
    }

    #[test]
    fn test_value_validation() {
        assert!(parse(&["--opacity", "1.5"]).is_err());
        assert!(parse(&["--opacity", "abc"]).is_err());
        assert!(parse(&["--scale", "0"]).is_err());
        assert!(parse(&["--scale", "-2"]).is_err());
        assert!(parse(&["--auto-load", "--no-auto-load"]).is_err());
        assert_eq!(parse(&["--rotation", "-90"]).unwrap().rotation, Some(-90));
    }

    #[test]
    fn test_overrides_config() {
        let mut config = Config::default();
        parse(&["--opacity", "0.8", "--scale", "1.5", "-g", "--rotation", "-90", "--dir", "/tmp/x"])
            .unwrap()
            .apply_to(&mut config);
        assert_eq!(config.opacity, 80);
        assert_eq!(config.scale, 150);
        assert!(config.grayscale);
        assert!(!config.remove_white);
        assert_eq!(config.rotation, 270);
        assert_eq!(config.directory, PathBuf::from("/tmp/x"));
        assert!(config.auto_load);
    }

    #[test]
    fn test_explicit_image_turns_off_auto_load() {
        let mut config = Config::default();
        parse(&["ref.png"]).unwrap().apply_to(&mut config);
        assert_eq!(config.image_path, Some(PathBuf::from("ref.png")));
        assert!(!config.auto_load);

        let mut config = Config::default();
        parse(&["ref.png", "--auto-load"])
            .unwrap()
            .apply_to(&mut config);
        assert!(config.auto_load);
    }
}
