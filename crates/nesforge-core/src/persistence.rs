use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};

use crate::{
    codec::{CURRENT_VERSION, MIN_VERSION},
    project::Project,
    snapshot,
};

pub const FILE_MAGIC: &[u8; 4] = b"NESF";
pub const FILE_EXTENSION: &str = "nesf";
const HEADER_LEN: usize = FILE_MAGIC.len() + 4;

pub fn encode_container(project: &mut Project) -> Result<Vec<u8>> {
    let payload = snapshot::save(project).context("failed to encode project")?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(FILE_MAGIC);
    bytes.extend_from_slice(&CURRENT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

pub fn decode_container(bytes: &[u8]) -> Result<Project> {
    let Some((magic, rest)) = bytes.split_first_chunk::<4>() else {
        bail!("file is too short to be a project");
    };
    if magic != FILE_MAGIC {
        bail!("not a project file (bad signature)");
    }
    let Some((revision, payload)) = rest.split_first_chunk::<4>() else {
        bail!("project header is truncated");
    };
    let revision = u32::from_le_bytes(*revision);
    if !(MIN_VERSION..=CURRENT_VERSION).contains(&revision) {
        bail!("unsupported project revision {revision}");
    }

    snapshot::load(payload, revision)
        .with_context(|| format!("failed to decode revision {revision} project"))
}

#[instrument(skip(project), fields(project = %project.name, path = %path.display()))]
pub fn save_project(path: &Path, project: &mut Project) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let bytes = encode_container(project)?;
    let mut temp_file = tempfile::NamedTempFile::new_in(
        path.parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| Path::new(".").to_path_buf(), Path::to_path_buf),
    )
    .context("failed to create temp project file")?;

    temp_file
        .write_all(&bytes)
        .context("failed to write temp project file")?;
    temp_file
        .persist(path)
        .map_err(|error| anyhow::anyhow!(error.error))
        .with_context(|| format!("failed to persist project: {}", path.display()))?;

    project.filename = path.display().to_string();
    info!(bytes = bytes.len(), "project saved");
    Ok(())
}

#[instrument(fields(path = %path.display()))]
pub fn load_project(path: &Path) -> Result<Project> {
    let content =
        fs::read(path).with_context(|| format!("failed to read project: {}", path.display()))?;
    let mut project = decode_container(&content)
        .with_context(|| format!("invalid project file: {}", path.display()))?;
    project.filename = path.display().to_string();
    info!(project = %project.name, songs = project.songs().len(), "project loaded");
    Ok(project)
}

#[instrument(skip(project), fields(project = %project.name, autosave_dir = %autosave_dir.display()))]
pub fn autosave_project(project: &mut Project, autosave_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(autosave_dir).with_context(|| {
        format!(
            "failed to create autosave directory: {}",
            autosave_dir.display()
        )
    })?;

    let file_name = format!(
        "{}.autosave.{FILE_EXTENSION}",
        sanitize_file_stem(&project.name)
    );
    let autosave_path = autosave_dir.join(file_name);
    let filename = project.filename.clone();
    save_project(&autosave_path, project)?;
    project.filename = filename;

    debug!(path = %autosave_path.display(), "autosave complete");
    Ok(autosave_path)
}

fn sanitize_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "untitled".to_string()
    } else {
        stem
    }
}
