use std::fs;
use std::path::Path;

use crate::error::{ChannelError, Result};
use crate::models::Resource;
use crate::paths::relative_path;
use crate::resolver::{whole_seconds, DurationProbe, ProbeConfig};
use crate::storage::StorageError;

/// A resource for `file`, or `None` when the extension is not supported or
/// no duration could be found. The stored path is relative to
/// `channel_root`; the title is the file stem.
pub fn resource_from_file(
    channel_root: &Path,
    file: &Path,
    probe: &dyn DurationProbe,
    config: &ProbeConfig,
) -> Option<Resource> {
    if !config.is_supported(file) {
        tracing::debug!("Skipping unsupported file {:?}", file);
        return None;
    }

    let duration = whole_seconds(probe.probe_duration(file));
    if duration == 0 {
        tracing::warn!("Could not determine the duration of {:?}", file);
        return None;
    }

    let title = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    Some(Resource::new(relative_path(file, channel_root), duration).with_title(title))
}

/// Resources for every supported file directly inside `dir`, ordered by
/// series, then order, then title, then path.
pub fn scan_directory(
    channel_root: &Path,
    dir: &Path,
    probe: &dyn DurationProbe,
    config: &ProbeConfig,
) -> Result<Vec<Resource>> {
    let entries = fs::read_dir(dir).map_err(|e| ChannelError::Read {
        path: dir.to_path_buf(),
        source: StorageError::Io(e),
    })?;

    let mut resources = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(resource) = resource_from_file(channel_root, &path, probe, config) {
            resources.push(resource);
        }
    }

    resources.sort_by(|a, b| {
        a.series_id
            .cmp(&b.series_id)
            .then(a.order.cmp(&b.order))
            .then(a.title.cmp(&b.title))
            .then(a.path.cmp(&b.path))
    });
    tracing::info!("Found {} resources in {:?}", resources.len(), dir);
    Ok(resources)
}
