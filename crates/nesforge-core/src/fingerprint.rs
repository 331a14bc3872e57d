use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::{
    codec::CURRENT_VERSION,
    model::{ExpansionAudio, Song},
    project::Project,
    snapshot,
};

const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentReport {
    pub schema_version: u32,
    pub revision: u32,
    pub name: String,
    pub expansion: ExpansionAudio,
    pub song_count: usize,
    pub pattern_count: usize,
    pub note_count: usize,
    pub instrument_count: usize,
    pub arpeggio_count: usize,
    pub sample_count: usize,
    pub mapped_slot_count: usize,
    pub sample_bytes: usize,
    pub next_id: u32,
    pub snapshot_hash: String,
    pub packed_samples_hash: String,
}

#[instrument(skip(project), fields(project = %project.name))]
pub fn generate_report(project: &mut Project) -> Result<DocumentReport> {
    let snapshot_bytes = snapshot::save(project).context("failed to encode project")?;
    let pattern_count = project.songs().iter().flat_map(Song::patterns).count();
    let note_count = project
        .songs()
        .iter()
        .flat_map(Song::patterns)
        .map(|pattern| pattern.notes().len())
        .sum();

    Ok(DocumentReport {
        schema_version: REPORT_SCHEMA_VERSION,
        revision: CURRENT_VERSION,
        name: project.name.clone(),
        expansion: project.expansion_audio(),
        song_count: project.songs().len(),
        pattern_count,
        note_count,
        instrument_count: project.instruments().len(),
        arpeggio_count: project.arpeggios().len(),
        sample_count: project.samples().len(),
        mapped_slot_count: project.sample_mappings().iter().flatten().count(),
        sample_bytes: project.total_sample_size(),
        next_id: project.next_id_watermark(),
        snapshot_hash: hash_hex(&snapshot_bytes),
        packed_samples_hash: hash_hex(&project.packed_sample_data()),
    })
}

pub fn read_report(path: &Path) -> Result<DocumentReport> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read document report: {}", path.display()))?;
    serde_json::from_slice(&bytes).context("failed to parse document report json")
}

pub fn write_report(path: &Path, report: &DocumentReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create report directory: {}", parent.display()))?;
    }

    let json = serde_json::to_vec_pretty(report).context("failed to encode document report")?;
    fs::write(path, json)
        .with_context(|| format!("failed to write document report: {}", path.display()))
}

fn hash_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}
