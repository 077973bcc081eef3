use std::fs;
use std::path::{Path, PathBuf};

/// Managed subdirectory under the root directory, scanned non-recursively.
pub const MODS_DIR: &str = "mods";
/// Case-insensitive filename prefix of this tool's own artifact.
pub const SELF_PREFIX: &str = "modpack-sync";

const CONFIG_DIR: &str = "modpack-sync";
const CONFIG_FILE: &str = "config.txt";
const STATE_FILE: &str = "managed-mods.json";

pub fn mods_dir(root: &Path) -> PathBuf {
    root.join(MODS_DIR)
}

pub fn config_dir(root: &Path) -> PathBuf {
    mods_dir(root).join(CONFIG_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    config_dir(root).join(CONFIG_FILE)
}

pub fn managed_state_path(root: &Path) -> PathBuf {
    config_dir(root).join(STATE_FILE)
}

/// Create the on-disk folder layout expected under `root`.
pub fn ensure_base_dirs(root: &Path) -> std::io::Result<()> {
    for dir in [mods_dir(root), config_dir(root)] {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}
