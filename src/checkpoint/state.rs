use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{debug, warn};

use super::bundle::index_path;

/// Name of the text file a training run keeps next to its checkpoints,
/// pointing at the most recent one.
pub const CHECKPOINT_STATE_FILE: &str = "checkpoint";

/// Turns a `--restore` argument into a bundle prefix.
///
/// A path whose `.index` file exists is used as is. A directory is resolved
/// through its `checkpoint` state file (`model_checkpoint_path: "..."`),
/// with relative entries taken relative to that directory.
pub fn resolve_prefix(path: &Path) -> Result<PathBuf> {
    if index_path(path).is_file() {
        return Ok(path.to_path_buf());
    }
    if path.is_dir() {
        let state = path.join(CHECKPOINT_STATE_FILE);
        if !state.is_file() {
            warn!("{} is a directory without a {} file", path.display(), CHECKPOINT_STATE_FILE);
            bail!("no checkpoint found in directory {}", path.display());
        }
        let text = std::fs::read_to_string(&state)
            .with_context(|| format!("failed to read {}", state.display()))?;
        let latest = parse_model_checkpoint_path(&text)
            .with_context(|| format!("{} has no model_checkpoint_path entry", state.display()))?;
        let latest = PathBuf::from(latest);
        let prefix = if latest.is_absolute() { latest } else { path.join(latest) };
        debug!("{} points at {}", state.display(), prefix.display());
        if !index_path(&prefix).is_file() {
            bail!(
                "{} names checkpoint {}, but {} does not exist",
                state.display(),
                prefix.display(),
                index_path(&prefix).display()
            );
        }
        return Ok(prefix);
    }
    bail!(
        "no checkpoint found at prefix {} ({} does not exist)",
        path.display(),
        index_path(path).display()
    )
}

/// Extracts the quoted value of the `model_checkpoint_path` field from a
/// text-format checkpoint state.
fn parse_model_checkpoint_path(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("model_checkpoint_path:")?;
        let quoted = rest.trim().strip_prefix('"')?.strip_suffix('"')?;
        Some(unescape(quoted))
    })
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
