use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
    ids::{RawId, SongId},
    instrument::{Arpeggio, Instrument},
    model::{DPCM_NOTE_MIN, ExpansionAudio, Song, TempoMode},
    project::Project,
    sample::{DpcmSample, MAX_SAMPLE_SIZE},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
}

impl Diagnostic {
    fn warning(message: String) -> Self {
        warn!(%message, "merge conflict");
        Self { message }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub imported_songs: Vec<SongId>,
    pub adopted_instruments: usize,
    pub aliased_instruments: usize,
    pub adopted_arpeggios: usize,
    pub aliased_arpeggios: usize,
    pub adopted_samples: usize,
    pub aliased_samples: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl MergeReport {
    #[must_use]
    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.diagnostics.iter().map(|diag| diag.message.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("cannot import a project using {foreign:?} into one using {host:?}")]
    IncompatibleExpansion {
        host: ExpansionAudio,
        foreign: ExpansionAudio,
    },
    #[error("tempo mode {foreign:?} does not match the host tempo mode {host:?}")]
    TempoModeMismatch { host: TempoMode, foreign: TempoMode },
    #[error("every imported song collides with an existing song name")]
    NoSongsToImport,
}

impl Project {
    #[instrument(skip_all, fields(host_songs = self.songs.len(), foreign_songs = foreign.songs.len()))]
    pub fn merge_songs(&mut self, mut foreign: Project) -> Result<MergeReport, MergeError> {
        if foreign.expansion != ExpansionAudio::None && foreign.expansion != self.expansion {
            return Err(MergeError::IncompatibleExpansion {
                host: self.expansion,
                foreign: foreign.expansion,
            });
        }
        if foreign.tempo_mode != self.tempo_mode {
            return Err(MergeError::TempoModeMismatch {
                host: self.tempo_mode,
                foreign: foreign.tempo_mode,
            });
        }

        let mut report = MergeReport::default();
        let host_song_names: Vec<String> = self
            .songs
            .iter()
            .map(|song| song.name().to_string())
            .collect();
        foreign.songs.retain(|song| {
            let collides = host_song_names.iter().any(|name| name == song.name());
            if collides {
                report.diagnostics.push(Diagnostic::warning(format!(
                    "Project already contains a song named '{}', skipping it",
                    song.name()
                )));
            }
            !collides
        });
        if foreign.songs.is_empty() {
            return Err(MergeError::NoSongsToImport);
        }

        foreign.set_expansion_audio(self.expansion, self.expansion_channel_count);

        let ids: Vec<RawId> = foreign.all_entity_ids().collect();
        let remap: HashMap<RawId, RawId> = ids
            .into_iter()
            .map(|old| (old, self.allocator.next_id()))
            .collect();
        foreign.apply_id_remap(&remap);
        foreign.ensure_next_id_is_large_enough();
        foreign.cleanup();

        self.absorb_instruments(&mut foreign, &mut report);
        self.absorb_arpeggios(&mut foreign, &mut report);
        self.absorb_samples(&mut foreign, &mut report);
        self.absorb_sample_mappings(&foreign, &mut report);

        report.imported_songs = foreign.songs.iter().map(Song::id).collect();
        self.songs.append(&mut foreign.songs);
        self.sort_instruments();
        self.sort_arpeggios();
        self.sort_samples();
        self.ensure_next_id_is_large_enough();
        self.debug_validate("merge");

        info!(
            songs = report.imported_songs.len(),
            instruments = report.adopted_instruments,
            arpeggios = report.adopted_arpeggios,
            samples = report.adopted_samples,
            warnings = report.diagnostics.len(),
            "songs merged"
        );
        Ok(report)
    }

    fn absorb_instruments(&mut self, foreign: &mut Project, report: &mut MergeReport) {
        for instrument in std::mem::take(&mut foreign.instruments) {
            if let Some(existing) = self.instrument_by_name(instrument.name()).map(Instrument::id) {
                report.diagnostics.push(Diagnostic::warning(format!(
                    "Project already contains an instrument named '{}', assuming it is the same",
                    instrument.name()
                )));
                foreign.replace_instrument(instrument.id(), Some(existing));
                report.aliased_instruments += 1;
            } else {
                self.instruments.push(instrument);
                report.adopted_instruments += 1;
            }
        }
    }

    fn absorb_arpeggios(&mut self, foreign: &mut Project, report: &mut MergeReport) {
        for arpeggio in std::mem::take(&mut foreign.arpeggios) {
            if let Some(existing) = self.arpeggio_by_name(arpeggio.name()).map(Arpeggio::id) {
                report.diagnostics.push(Diagnostic::warning(format!(
                    "Project already contains an arpeggio named '{}', assuming it is the same",
                    arpeggio.name()
                )));
                foreign.replace_arpeggio(arpeggio.id(), Some(existing));
                report.aliased_arpeggios += 1;
            } else {
                self.arpeggios.push(arpeggio);
                report.adopted_arpeggios += 1;
            }
        }
    }

    fn absorb_samples(&mut self, foreign: &mut Project, report: &mut MergeReport) {
        for sample in std::mem::take(&mut foreign.samples) {
            if let Some(existing) = self.sample_by_name(sample.name()).map(DpcmSample::id) {
                report.diagnostics.push(Diagnostic::warning(format!(
                    "Project already contains a DPCM sample named '{}', assuming it is the same",
                    sample.name()
                )));
                foreign.replace_sample(sample.id(), Some(existing));
                report.aliased_samples += 1;
            } else {
                self.samples.push(sample);
                report.adopted_samples += 1;
            }
        }

        let used: usize = self.samples.iter().map(DpcmSample::padded_len).sum();
        if used > MAX_SAMPLE_SIZE {
            report.diagnostics.push(Diagnostic::warning(format!(
                "DPCM samples now use {used} bytes, only the first {MAX_SAMPLE_SIZE} will play"
            )));
        }
    }

    fn absorb_sample_mappings(&mut self, foreign: &Project, report: &mut MergeReport) {
        for (slot, mapping) in foreign.sample_mappings.iter().enumerate() {
            let Some(mapping) = mapping else {
                continue;
            };
            if self.sample_mappings[slot].is_none() {
                self.sample_mappings[slot] = Some(*mapping);
            } else {
                let note = slot + usize::from(DPCM_NOTE_MIN);
                report.diagnostics.push(Diagnostic::warning(format!(
                    "Project already has a DPCM sample mapped at key {note}, ignoring"
                )));
            }
        }
    }

    pub fn merge_other_project_instruments(&mut self, instruments: Vec<Instrument>) -> bool {
        let mut imported = 0_usize;
        for mut instrument in instruments {
            if !self.is_instrument_name_unique(instrument.name()) {
                warn!(name = instrument.name(), "instrument already exists, skipping");
                continue;
            }
            if instrument.is_expansion_instrument() && instrument.expansion() != self.expansion {
                warn!(
                    name = instrument.name(),
                    expansion = ?instrument.expansion(),
                    "instrument is incompatible with the project expansion, skipping"
                );
                continue;
            }
            instrument.set_id(self.allocator.allocate());
            self.instruments.push(instrument);
            imported += 1;
        }
        self.sort_instruments();
        info!(imported, "instruments imported");
        imported > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChannelKind, Note};

    fn song_with_note(name: &str, instrument_name: &str) -> Project {
        let mut project = Project::new();
        let song = project.create_song(Some(name)).expect("song");
        let instrument = project
            .create_instrument(ExpansionAudio::None, Some(instrument_name))
            .expect("instrument");
        let pattern = project
            .create_pattern(song, ChannelKind::Square1, None)
            .expect("pattern");
        assert!(project.set_pattern_instance(song, ChannelKind::Square1, 0, Some(pattern)));
        project
            .pattern_mut(pattern)
            .expect("pattern")
            .set_note(0, Note::musical(40, Some(instrument)));
        project
    }

    #[test]
    fn same_named_instruments_are_aliased() {
        let mut host = song_with_note("Intro", "Lead");
        let foreign = song_with_note("Boss", "Lead");
        let host_lead = host.instruments()[0].id();

        let report = host.merge_songs(foreign).expect("merge succeeds");

        assert_eq!(report.imported_songs.len(), 1);
        assert_eq!(report.aliased_instruments, 1);
        assert_eq!(host.instruments().len(), 1);
        let boss = host.song_by_name("Boss").expect("imported song");
        let note = boss
            .patterns()
            .next()
            .and_then(|pattern| pattern.note(0))
            .expect("note survives");
        assert_eq!(note.instrument, Some(host_lead));
        assert!(report.warnings().any(|w| w.contains("assuming it is the same")));
    }

    #[test]
    fn merge_fails_without_touching_host_when_every_song_collides() {
        let mut host = song_with_note("Intro", "Lead");
        let foreign = song_with_note("Intro", "Bass");
        let before = host.clone();

        assert_eq!(host.merge_songs(foreign), Err(MergeError::NoSongsToImport));
        assert_eq!(host, before);
    }

    #[test]
    fn tempo_mismatch_is_rejected() {
        let mut host = Project::new();
        let mut foreign = song_with_note("Other", "Lead");
        foreign.tempo_mode = TempoMode::FamiTracker;

        assert!(matches!(
            host.merge_songs(foreign),
            Err(MergeError::TempoModeMismatch { .. })
        ));
    }

    #[test]
    fn loose_instruments_skip_collisions_and_foreign_expansions() {
        let mut project = Project::with_default_content();
        let incoming = vec![
            Instrument::new(Default::default(), ExpansionAudio::None, "Instrument 1"),
            Instrument::new(Default::default(), ExpansionAudio::Fds, "Wave"),
            Instrument::new(Default::default(), ExpansionAudio::None, "Pluck"),
        ];

        assert!(project.merge_other_project_instruments(incoming));
        assert_eq!(project.instruments().len(), 2);
        assert!(project.instrument_by_name("Pluck").is_some());
        assert!(project.validate().is_ok());
    }
}
