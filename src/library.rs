// Image library module
// Decides which file in the image directory is the current one

use crate::error::DirectoryScanError;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Extensions (lowercase) considered images
pub const IMAGE_EXTENSIONS: [&str; 9] = [
    "jpg", "jpeg", "png", "bmp", "gif", "tiff", "tif", "ico", "webp",
];

/// Navigation direction for manual image switching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

/// Result of one auto-load evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoLoadOutcome {
    /// Auto-load is turned off
    Disabled,
    /// A manual switch happened in this refresh; nothing was scanned
    Suppressed,
    /// The directory holds no images
    NoImages,
    /// First evaluation: the newest file became current and the baseline.
    /// Not a "new file arrived" event.
    Adopted(PathBuf),
    /// A file newer than the baseline appeared
    NewFile(PathBuf),
    /// Nothing newer than the baseline
    Unchanged,
}

/// Check whether a path has a whitelisted image extension (case-insensitive)
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// List the images directly inside `directory` with their modification times,
/// in directory iteration order
fn scan_images(directory: &Path) -> Result<Vec<(PathBuf, SystemTime)>, DirectoryScanError> {
    if !directory.is_dir() {
        return Err(DirectoryScanError::Missing(directory.to_path_buf()));
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(DirectoryScanError::Unreadable {
                    path: directory.to_path_buf(),
                    source: err,
                });
            }
            Err(err) => {
                debug!("Skipping unreadable entry: {}", err);
                continue;
            }
        };

        if !entry.file_type().is_file() || !is_supported_image(entry.path()) {
            continue;
        }

        let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
            Some(modified) => modified,
            None => continue,
        };
        images.push((entry.into_path(), modified));
    }
    Ok(images)
}

fn scan_or_empty(directory: &Path) -> Vec<(PathBuf, SystemTime)> {
    scan_images(directory).unwrap_or_else(|err| {
        debug!("Directory scan failed, treating as empty: {}", err);
        Vec::new()
    })
}

/// Find the most recently modified image directly inside `directory`.
///
/// Returns `None` for a missing, unreadable or image-less directory. On equal
/// timestamps the first entry encountered wins.
pub fn resolve_auto_latest(directory: &Path) -> Option<(PathBuf, SystemTime)> {
    let mut latest: Option<(PathBuf, SystemTime)> = None;
    for (path, modified) in scan_or_empty(directory) {
        match latest {
            Some((_, best)) if modified <= best => {}
            _ => latest = Some((path, modified)),
        }
    }
    latest
}

/// Pick the neighbour of `current` in the lexicographically sorted image list.
///
/// Wraps around at both ends. If `current` is not in the list, `Next` yields
/// the first image and `Prev` the last. With no images `current` is returned.
pub fn switch_image(direction: Direction, current: &Path, directory: &Path) -> PathBuf {
    let mut images: Vec<PathBuf> = scan_or_empty(directory)
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    if images.is_empty() {
        return current.to_path_buf();
    }
    images.sort();

    let len = images.len();
    let index = match (images.iter().position(|p| p == current), direction) {
        (Some(i), Direction::Next) => (i + 1) % len,
        (Some(i), Direction::Prev) => (i + len - 1) % len,
        (None, Direction::Next) => 0,
        (None, Direction::Prev) => len - 1,
    };
    images.swap_remove(index)
}

/// Current-image selection state for one image directory
#[derive(Debug, Clone)]
pub struct ImageLibrary {
    directory: PathBuf,
    current: Option<PathBuf>,
    known_latest: Option<SystemTime>,
    auto_load_latest: bool,
    suppress_auto_load: bool,
}

impl ImageLibrary {
    pub fn new(directory: PathBuf, current: Option<PathBuf>, auto_load_latest: bool) -> Self {
        Self {
            directory,
            current,
            known_latest: None,
            auto_load_latest,
            suppress_auto_load: false,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    #[cfg(test)]
    pub fn known_latest(&self) -> Option<SystemTime> {
        self.known_latest
    }

    pub fn auto_load_latest(&self) -> bool {
        self.auto_load_latest
    }

    /// Turn auto-load on or off. Turning it on starts from an empty baseline.
    pub fn set_auto_load(&mut self, enabled: bool) {
        if enabled && !self.auto_load_latest {
            self.known_latest = None;
        }
        self.auto_load_latest = enabled;
    }

    #[cfg(test)]
    pub fn set_current(&mut self, path: PathBuf) {
        self.current = Some(path);
    }

    /// Compare the directory's newest file against the baseline and switch
    /// to it when appropriate
    pub fn evaluate_auto_load(&mut self) -> AutoLoadOutcome {
        if !self.auto_load_latest {
            return AutoLoadOutcome::Disabled;
        }
        if self.suppress_auto_load {
            self.suppress_auto_load = false;
            return AutoLoadOutcome::Suppressed;
        }

        let Some((path, modified)) = resolve_auto_latest(&self.directory) else {
            return AutoLoadOutcome::NoImages;
        };

        match self.known_latest {
            None => {
                debug!("Auto-load baseline set from {:?}", path);
                self.known_latest = Some(modified);
                self.current = Some(path.clone());
                AutoLoadOutcome::Adopted(path)
            }
            Some(baseline) if modified > baseline => {
                info!("New image detected: {:?}", path);
                self.known_latest = Some(modified);
                self.current = Some(path.clone());
                AutoLoadOutcome::NewFile(path)
            }
            Some(_) => AutoLoadOutcome::Unchanged,
        }
    }

    /// Manually step to the previous/next image.
    ///
    /// The next auto-load evaluation is skipped so the manual choice survives
    /// the refresh it triggers. Returns the new current path, if any.
    pub fn navigate(&mut self, direction: Direction) -> Option<&Path> {
        let current = self.current.clone().unwrap_or_default();
        let next = switch_image(direction, &current, &self.directory);
        if next.as_os_str().is_empty() {
            return None;
        }

        if self.auto_load_latest {
            self.suppress_auto_load = true;
            if self.known_latest.is_none() {
                // Seed the baseline so a later evaluation does not adopt over
                // the manual choice.
                self.known_latest = resolve_auto_latest(&self.directory).map(|(_, t)| t);
            }
        }

        debug!("Switched image {:?} -> {:?}", direction, next);
        self.current = Some(next);
        self.current.as_deref()
    }

    /// Forget the baseline so the next evaluation re-adopts the newest file
    pub fn reload(&mut self) {
        self.known_latest = None;
        self.suppress_auto_load = false;
    }

    /// A file was just written into the directory (e.g. a screenshot)
    pub fn note_new_file(&mut self, path: PathBuf) {
        if self.auto_load_latest {
            self.suppress_auto_load = false;
            if let AutoLoadOutcome::NoImages = self.evaluate_auto_load() {
                self.current = Some(path);
            }
        } else {
            self.current = Some(path);
        }
    }

    /// Resolve the path to draw in this redraw
    pub fn resolve(&mut self) -> Option<PathBuf> {
        self.evaluate_auto_load();
        self.current.clone()
    }
}
