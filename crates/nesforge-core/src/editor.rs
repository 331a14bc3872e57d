use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::{
    codec::CodecError,
    config::AppConfig,
    ids::{ArpeggioId, InstrumentId, PatternId, SampleId, SongId},
    merge::{MergeError, MergeReport},
    model::{ChannelKind, ExpansionAudio, Note, TempoMode},
    persistence,
    project::Project,
    snapshot::{capture_undo, restore_undo},
    undo::UndoHistory,
};

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("song not found: {0}")]
    SongNotFound(SongId),
    #[error("instrument not found: {0}")]
    InstrumentNotFound(InstrumentId),
    #[error("arpeggio not found: {0}")]
    ArpeggioNotFound(ArpeggioId),
    #[error("sample not found: {0}")]
    SampleNotFound(SampleId),
    #[error("pattern not found: {0}")]
    PatternNotFound(PatternId),
    #[error("edit rejected: {0}")]
    Rejected(&'static str),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error("io error: {0}")]
    Io(String),
}

impl From<anyhow::Error> for EditorError {
    fn from(value: anyhow::Error) -> Self {
        Self::Io(format!("{value:#}"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Editor {
    project: Project,
    history: UndoHistory,
}

impl Editor {
    #[must_use]
    pub fn new(project: Project) -> Self {
        Self {
            project,
            history: UndoHistory::default(),
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            project: config.new_project(),
            history: UndoHistory::new(config.undo.max_depth),
        }
    }

    #[must_use]
    pub fn project(&self) -> &Project {
        &self.project
    }

    #[must_use]
    pub fn history(&self) -> &UndoHistory {
        &self.history
    }

    #[instrument(skip(self, project), fields(project = %project.name))]
    pub fn replace_project(&mut self, project: Project) {
        self.project = project;
        self.history.clear();
        info!("project replaced");
    }

    pub fn transact<T>(
        &mut self,
        label: &'static str,
        edit: impl FnOnce(&mut Project) -> Result<T, EditorError>,
    ) -> Result<T, EditorError> {
        let snapshot = capture_undo(&mut self.project)?;
        match edit(&mut self.project) {
            Ok(value) => {
                self.history.push(snapshot);
                debug!(label, "edit committed");
                Ok(value)
            }
            Err(error) => {
                restore_undo(&mut self.project, &snapshot)?;
                debug!(label, %error, "edit rolled back");
                Err(error)
            }
        }
    }

    #[instrument(skip(self))]
    pub fn undo(&mut self) -> Result<bool, EditorError> {
        Ok(self.history.undo(&mut self.project)?)
    }

    #[instrument(skip(self))]
    pub fn redo(&mut self) -> Result<bool, EditorError> {
        Ok(self.history.redo(&mut self.project)?)
    }

    #[instrument(skip(self))]
    pub fn create_song(&mut self, name: Option<&str>) -> Result<SongId, EditorError> {
        self.transact("create song", |project| {
            project
                .create_song(name)
                .ok_or(EditorError::Rejected("song name already in use"))
        })
    }

    #[instrument(skip(self), fields(song_id = %id))]
    pub fn rename_song(&mut self, id: SongId, name: &str) -> Result<(), EditorError> {
        self.transact("rename song", |project| {
            if project.song(id).is_none() {
                return Err(EditorError::SongNotFound(id));
            }
            project
                .rename_song(id, name)
                .then_some(())
                .ok_or(EditorError::Rejected("song name already in use"))
        })
    }

    #[instrument(skip(self), fields(song_id = %id))]
    pub fn delete_song(&mut self, id: SongId) -> Result<(), EditorError> {
        self.transact("delete song", |project| {
            project
                .delete_song(id)
                .then_some(())
                .ok_or(EditorError::SongNotFound(id))
        })
    }

    #[instrument(skip(self), fields(song_id = %id))]
    pub fn duplicate_song(&mut self, id: SongId) -> Result<SongId, EditorError> {
        self.transact("duplicate song", |project| {
            project
                .duplicate_song(id)?
                .ok_or(EditorError::SongNotFound(id))
        })
    }

    #[instrument(skip(self))]
    pub fn create_instrument(
        &mut self,
        expansion: ExpansionAudio,
        name: Option<&str>,
    ) -> Result<InstrumentId, EditorError> {
        self.transact("create instrument", |project| {
            project
                .create_instrument(expansion, name)
                .ok_or(EditorError::Rejected(
                    "instrument name in use or expansion not enabled",
                ))
        })
    }

    #[instrument(skip(self), fields(instrument_id = %id))]
    pub fn rename_instrument(&mut self, id: InstrumentId, name: &str) -> Result<(), EditorError> {
        self.transact("rename instrument", |project| {
            if project.instrument(id).is_none() {
                return Err(EditorError::InstrumentNotFound(id));
            }
            project
                .rename_instrument(id, name)
                .then_some(())
                .ok_or(EditorError::Rejected("instrument name already in use"))
        })
    }

    #[instrument(skip(self), fields(instrument_id = %id))]
    pub fn delete_instrument(&mut self, id: InstrumentId) -> Result<(), EditorError> {
        self.transact("delete instrument", |project| {
            project
                .delete_instrument(id)
                .then_some(())
                .ok_or(EditorError::InstrumentNotFound(id))
        })
    }

    #[instrument(skip(self), fields(instrument_id = %id))]
    pub fn duplicate_instrument(&mut self, id: InstrumentId) -> Result<InstrumentId, EditorError> {
        self.transact("duplicate instrument", |project| {
            project
                .duplicate_instrument(id)?
                .ok_or(EditorError::InstrumentNotFound(id))
        })
    }

    #[instrument(skip(self))]
    pub fn create_arpeggio(&mut self, name: Option<&str>) -> Result<ArpeggioId, EditorError> {
        self.transact("create arpeggio", |project| {
            project
                .create_arpeggio(name)
                .ok_or(EditorError::Rejected("arpeggio name already in use"))
        })
    }

    #[instrument(skip(self), fields(arpeggio_id = %id))]
    pub fn delete_arpeggio(&mut self, id: ArpeggioId) -> Result<(), EditorError> {
        self.transact("delete arpeggio", |project| {
            project
                .delete_arpeggio(id)
                .then_some(())
                .ok_or(EditorError::ArpeggioNotFound(id))
        })
    }

    #[instrument(skip(self), fields(arpeggio_id = %id))]
    pub fn duplicate_arpeggio(&mut self, id: ArpeggioId) -> Result<ArpeggioId, EditorError> {
        self.transact("duplicate arpeggio", |project| {
            project
                .duplicate_arpeggio(id)?
                .ok_or(EditorError::ArpeggioNotFound(id))
        })
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    pub fn import_sample(&mut self, name: &str, data: Vec<u8>) -> Result<SampleId, EditorError> {
        self.transact("import sample", |project| {
            project
                .create_or_update_sample(name, data)
                .ok_or(EditorError::Rejected("sample exceeds the dpcm budget"))
        })
    }

    #[instrument(skip(self), fields(sample_id = %id))]
    pub fn delete_sample(&mut self, id: SampleId) -> Result<(), EditorError> {
        self.transact("delete sample", |project| {
            project
                .delete_sample(id)
                .then_some(())
                .ok_or(EditorError::SampleNotFound(id))
        })
    }

    #[instrument(skip(self), fields(sample_id = %sample))]
    pub fn map_sample(
        &mut self,
        note: u8,
        sample: SampleId,
        pitch: u8,
        looping: bool,
    ) -> Result<(), EditorError> {
        self.transact("map sample", |project| {
            if project.sample(sample).is_none() {
                return Err(EditorError::SampleNotFound(sample));
            }
            project
                .map_sample(note, sample, pitch, looping)
                .then_some(())
                .ok_or(EditorError::Rejected("note unsupported or already mapped"))
        })
    }

    #[instrument(skip(self), fields(song_id = %song))]
    pub fn create_pattern(
        &mut self,
        song: SongId,
        kind: ChannelKind,
        name: Option<&str>,
    ) -> Result<PatternId, EditorError> {
        self.transact("create pattern", |project| {
            if project.song(song).is_none() {
                return Err(EditorError::SongNotFound(song));
            }
            project
                .create_pattern(song, kind, name)
                .ok_or(EditorError::Rejected("channel inactive or pattern name in use"))
        })
    }

    #[instrument(skip(self), fields(song_id = %song))]
    pub fn set_pattern_instance(
        &mut self,
        song: SongId,
        kind: ChannelKind,
        position: u16,
        pattern: Option<PatternId>,
    ) -> Result<(), EditorError> {
        self.transact("place pattern", |project| {
            project
                .set_pattern_instance(song, kind, position, pattern)
                .then_some(())
                .ok_or(EditorError::Rejected("pattern not owned or position out of range"))
        })
    }

    #[instrument(skip(self, note), fields(pattern_id = %pattern))]
    pub fn set_note(&mut self, pattern: PatternId, time: u16, note: Note) -> Result<(), EditorError> {
        self.transact("set note", |project| {
            if note.instrument.is_some_and(|id| project.instrument(id).is_none()) {
                return Err(EditorError::Rejected("note references a missing instrument"));
            }
            if note.arpeggio.is_some_and(|id| project.arpeggio(id).is_none()) {
                return Err(EditorError::Rejected("note references a missing arpeggio"));
            }
            project
                .pattern_mut(pattern)
                .ok_or(EditorError::PatternNotFound(pattern))?
                .set_note(time, note)
                .then_some(())
                .ok_or(EditorError::Rejected("note volume out of range"))
        })
    }

    #[instrument(skip(self), fields(pattern_id = %pattern))]
    pub fn clear_note(&mut self, pattern: PatternId, time: u16) -> Result<Option<Note>, EditorError> {
        self.transact("clear note", |project| {
            Ok(project
                .pattern_mut(pattern)
                .ok_or(EditorError::PatternNotFound(pattern))?
                .clear_note(time))
        })
    }

    #[instrument(skip(self))]
    pub fn set_expansion_audio(
        &mut self,
        expansion: ExpansionAudio,
        channel_count: u8,
    ) -> Result<(), EditorError> {
        self.transact("set expansion audio", |project| {
            project.set_expansion_audio(expansion, channel_count);
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub fn set_pal_mode(&mut self, pal: bool) -> Result<(), EditorError> {
        self.transact("set pal mode", |project| {
            project.set_pal_mode(pal);
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub fn set_tempo_mode(&mut self, mode: TempoMode) -> Result<(), EditorError> {
        self.transact("set tempo mode", |project| {
            project
                .set_tempo_mode(mode)
                .then_some(())
                .ok_or(EditorError::Rejected("songs are not empty"))
        })
    }

    #[instrument(skip(self))]
    pub fn convert_tempo(&mut self, mode: TempoMode, set_defaults: bool) -> Result<(), EditorError> {
        self.transact("convert tempo", |project| {
            let converted = match mode {
                TempoMode::FamiStudio => project.convert_to_famistudio_tempo(),
                TempoMode::FamiTracker => project.convert_to_famitracker_tempo(set_defaults),
            };
            converted
                .then_some(())
                .ok_or(EditorError::Rejected("project already uses that tempo mode"))
        })
    }

    #[instrument(skip(self))]
    pub fn cleanup(&mut self) -> Result<(), EditorError> {
        self.transact("cleanup", |project| {
            project.cleanup();
            Ok(())
        })
    }

    #[instrument(skip(self, foreign), fields(foreign = %foreign.name))]
    pub fn merge_from(&mut self, foreign: Project) -> Result<MergeReport, EditorError> {
        self.transact("merge songs", |project| Ok(project.merge_songs(foreign)?))
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn save_project(&mut self, path: &Path) -> Result<(), EditorError> {
        persistence::save_project(path, &mut self.project)?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn load_project(&mut self, path: &Path) -> Result<&Project, EditorError> {
        let project = persistence::load_project(path)?;
        self.replace_project(project);
        Ok(&self.project)
    }

    #[instrument(skip(self), fields(autosave_dir = %autosave_dir.display()))]
    pub fn autosave(&mut self, autosave_dir: &Path) -> Result<PathBuf, EditorError> {
        Ok(persistence::autosave_project(
            &mut self.project,
            autosave_dir,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_edits_leave_no_undo_entry() {
        let mut editor = Editor::new(Project::with_default_content());
        let err = editor
            .create_song(Some("Song 1"))
            .expect_err("name collides");
        assert!(matches!(err, EditorError::Rejected(_)));
        assert!(!editor.history().can_undo());
    }

    #[test]
    fn anyhow_errors_map_to_io() {
        let err: EditorError = anyhow::anyhow!("disk full").into();
        assert!(matches!(err, EditorError::Io(message) if message == "disk full"));
    }
}
