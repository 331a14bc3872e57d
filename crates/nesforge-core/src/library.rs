use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::{ids::SampleId, project::Project};

pub const DMC_EXTENSION: &str = "dmc";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleFileEntry {
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: u64,
}

#[instrument(fields(directory = %directory.display()))]
pub fn scan_dmc_files(directory: &Path) -> Result<Vec<SampleFileEntry>> {
    if !directory.exists() {
        fs::create_dir_all(directory).with_context(|| {
            format!(
                "failed to create sample directory: {}",
                directory.display()
            )
        })?;
        debug!("sample directory missing, created empty directory");
        return Ok(Vec::new());
    }
    if !directory.is_dir() {
        bail!("sample path is not a directory: {}", directory.display());
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(directory).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(?error, "ignoring unreadable entry while scanning samples");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_dmc(entry.path()) {
            continue;
        }

        let size_bytes = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(error) => {
                warn!(path = %entry.path().display(), ?error, "skipping sample without metadata");
                continue;
            }
        };
        entries.push(SampleFileEntry {
            path: entry.path().to_path_buf(),
            name: sample_name(entry.path()),
            size_bytes,
        });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(count = entries.len(), "sample scan complete");
    Ok(entries)
}

#[instrument(skip(project), fields(path = %path.display()))]
pub fn import_dmc_file(project: &mut Project, path: &Path) -> Result<Option<SampleId>> {
    let data =
        fs::read(path).with_context(|| format!("failed to read sample: {}", path.display()))?;
    if let Some(existing) = project.find_matching_sample(&data) {
        debug!(sample_id = %existing, "identical sample already present");
        return Ok(Some(existing));
    }

    let imported = project.create_or_update_sample(&sample_name(path), data);
    match imported {
        Some(id) => info!(sample_id = %id, "sample imported"),
        None => warn!("sample does not fit in the remaining dpcm space"),
    }
    Ok(imported)
}

pub fn import_directory(project: &mut Project, directory: &Path) -> Result<Vec<SampleId>> {
    let mut imported = Vec::new();
    for entry in scan_dmc_files(directory)? {
        if let Some(id) = import_dmc_file(project, &entry.path)? {
            imported.push(id);
        }
    }
    Ok(imported)
}

fn is_dmc(path: &Path) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .is_some_and(|value| value.eq_ignore_ascii_case(DMC_EXTENSION))
}

fn sample_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("Sample")
        .to_string()
}
