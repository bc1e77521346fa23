//! Configuration file discovery
//!
//! When no `--config` is given, the first existing file among these wins:
//!
//! 1. `organ.yaml` next to the executable
//! 2. `~/.organ.yaml`
//! 3. `<config dir>/organsound/organ.yaml` (e.g. `~/.config/organsound/organ.yaml`)
//! 4. `/etc/organ.yaml`

use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration file name used next to the executable and under /etc
const CONFIG_FILE: &str = "organ.yaml";

/// Application name used for the per-user config directory
const APP_NAME: &str = "organsound";

/// Candidate configuration paths, in search order
pub fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    {
        candidates.push(exe_dir.join(CONFIG_FILE));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(format!(".{}", CONFIG_FILE)));
    }
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join(APP_NAME).join(CONFIG_FILE));
    }
    candidates.push(Path::new("/etc").join(CONFIG_FILE));

    candidates
}

/// First candidate that exists on disk
pub fn find_config_file() -> Option<PathBuf> {
    first_existing(config_candidates())
}

fn first_existing(candidates: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    candidates.into_iter().find(|path| {
        let exists = path.is_file();
        debug!("Config candidate {} (exists: {})", path.display(), exists);
        exists
    })
}
