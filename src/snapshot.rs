use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

const KEEP_COUNT: usize = 10;

/// Write a fetched batch to the data directory twice: once under a
/// timestamped name for the audit trail, once under a stable name for the
/// next plan/run to pick up. Old timestamped files beyond the retention
/// count are removed.
pub fn save<T: Serialize>(dir: &Path, prefix: &str, payload: &T) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create data dir {}", dir.display()))?;

    let json = serde_json::to_string_pretty(payload)?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let stamped = dir.join(format!("{prefix}_{stamp}.json"));
    std::fs::write(&stamped, &json)
        .with_context(|| format!("Failed to write {}", stamped.display()))?;

    let stable = stable_path(dir, prefix);
    std::fs::write(&stable, &json)
        .with_context(|| format!("Failed to write {}", stable.display()))?;
    info!("saved snapshot {}", stamped.display());

    cleanup(dir, prefix)?;
    Ok(stable)
}

/// Load the stable snapshot for a prefix. A missing file is not an error:
/// the caller gets the default (an empty batch means "no prior state").
pub fn load_or_default<T: DeserializeOwned + Default>(dir: &Path, prefix: &str) -> Result<T> {
    let path = stable_path(dir, prefix);
    if !path.exists() {
        warn!(
            "snapshot {} not found; treating as empty",
            path.display()
        );
        return Ok(T::default());
    }
    load(dir, prefix)
}

/// Load the stable snapshot, failing when it is absent or unparsable.
pub fn load<T: DeserializeOwned>(dir: &Path, prefix: &str) -> Result<T> {
    let path = stable_path(dir, prefix);
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))
}

fn stable_path(dir: &Path, prefix: &str) -> PathBuf {
    dir.join(format!("{prefix}.json"))
}

/// Remove timestamped snapshots beyond the retention count, newest kept.
fn cleanup(dir: &Path, prefix: &str) -> Result<()> {
    let marker = format!("{prefix}_");
    let mut stamped: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(&marker) && n.ends_with(".json"))
                .unwrap_or(false)
        })
        .collect();

    if stamped.len() <= KEEP_COUNT {
        return Ok(());
    }

    // Timestamped names sort chronologically; oldest first.
    stamped.sort();
    let excess = stamped.len() - KEEP_COUNT;
    for path in stamped.into_iter().take(excess) {
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("removed old snapshot {}", path.display()),
            Err(err) => warn!("failed to remove {}: {err}", path.display()),
        }
    }
    Ok(())
}
