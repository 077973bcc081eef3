use std::fs;
use std::path::Path;

use log::{debug, error};

use crate::error::SyncError;
use crate::layout;

/// First non-empty, non-comment line of the config file.
pub fn load_repository_url(root: &Path) -> Option<String> {
    let path = layout::config_path(root);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!("config: no config at {}", path.display());
            return None;
        }
        Err(err) => {
            error!("config: failed to read {}: {err}", path.display());
            return None;
        }
    };
    first_url_line(&contents)
}

pub fn save_repository_url(root: &Path, url: &str) -> Result<(), SyncError> {
    let dir = layout::config_dir(root);
    fs::create_dir_all(&dir).map_err(|e| SyncError::io("unable to create config dir", e))?;
    let path = layout::config_path(root);
    fs::write(&path, format!("{}\n", url.trim()))
        .map_err(|e| SyncError::io(format!("unable to write {}", path.display()), e))
}

fn first_url_line(contents: &str) -> Option<String> {
    contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
}
