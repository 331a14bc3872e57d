use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{error, info};

use crate::{
    ids::{ArpeggioId, EntityId, InstrumentId, PatternId, RawId, SampleId, SongId},
    instrument::{Arpeggio, Instrument},
    model::{ChannelKind, ExpansionAudio, NOTE_INVALID, Pattern, Song},
    project::Project,
    sample::DpcmSample,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("id {0} is used by more than one entity")]
    DuplicateId(RawId),
    #[error("id {id} is not below the allocator watermark {watermark}")]
    IdAboveWatermark { id: RawId, watermark: RawId },
    #[error("pattern {pattern} references missing instrument {instrument}")]
    DanglingInstrument {
        pattern: PatternId,
        instrument: InstrumentId,
    },
    #[error("pattern {pattern} references missing arpeggio {arpeggio}")]
    DanglingArpeggio {
        pattern: PatternId,
        arpeggio: ArpeggioId,
    },
    #[error("mapping slot {slot} references missing sample {sample}")]
    DanglingSampleMapping { slot: usize, sample: SampleId },
    #[error("song {song} places pattern {pattern} on {kind:?} but the channel does not own it")]
    ForeignPatternInstance {
        song: SongId,
        kind: ChannelKind,
        pattern: PatternId,
    },
    #[error("{collection} name {name:?} is used more than once")]
    DuplicateName {
        collection: &'static str,
        name: String,
    },
    #[error("instrument {instrument} needs {expansion:?} which the project does not use")]
    IncompatibleInstrument {
        instrument: InstrumentId,
        expansion: ExpansionAudio,
    },
    #[error("pal authoring is enabled together with expansion audio")]
    PalWithExpansion,
}

impl Project {
    pub(crate) fn all_patterns_mut(&mut self) -> impl Iterator<Item = &mut Pattern> {
        self.songs.iter_mut().flat_map(Song::patterns_mut)
    }

    pub fn replace_instrument(&mut self, old: InstrumentId, new: Option<InstrumentId>) {
        for pattern in self.all_patterns_mut() {
            pattern.update_notes(|note| {
                if note.instrument != Some(old) {
                    return false;
                }
                note.instrument = new;
                if new.is_none() {
                    note.value = NOTE_INVALID;
                }
                true
            });
        }
    }

    pub fn replace_arpeggio(&mut self, old: ArpeggioId, new: Option<ArpeggioId>) {
        for pattern in self.all_patterns_mut() {
            pattern.update_notes(|note| {
                if note.arpeggio != Some(old) {
                    return false;
                }
                note.arpeggio = new;
                true
            });
        }
    }

    pub fn replace_sample(&mut self, old: SampleId, new: Option<SampleId>) {
        for slot in &mut self.sample_mappings {
            if slot.is_some_and(|mapping| mapping.sample == old) {
                match new {
                    Some(sample) => {
                        if let Some(mapping) = slot.as_mut() {
                            mapping.sample = sample;
                        }
                    }
                    None => *slot = None,
                }
            }
        }
    }

    pub(crate) fn apply_id_remap(&mut self, remap: &HashMap<RawId, RawId>) {
        fn lookup<I: EntityId>(remap: &HashMap<RawId, RawId>, id: I) -> I {
            remap.get(&id.raw()).map_or(id, |raw| I::from_raw(*raw))
        }

        for instrument in &mut self.instruments {
            instrument.set_id(lookup(remap, instrument.id()));
        }
        for arpeggio in &mut self.arpeggios {
            arpeggio.set_id(lookup(remap, arpeggio.id()));
        }
        for sample in &mut self.samples {
            sample.set_id(lookup(remap, sample.id()));
        }
        for mapping in self.sample_mappings.iter_mut().flatten() {
            mapping.sample = lookup(remap, mapping.sample);
        }

        for song in &mut self.songs {
            song.set_id(lookup(remap, song.id()));
            for channel in song.channels_mut() {
                for instance in channel.instances_mut().iter_mut().flatten() {
                    *instance = lookup(remap, *instance);
                }
                for pattern in channel.patterns_mut() {
                    pattern.set_id(lookup(remap, pattern.id()));
                    pattern.update_notes(|note| {
                        note.instrument = note.instrument.map(|id| lookup(remap, id));
                        note.arpeggio = note.arpeggio.map(|id| lookup(remap, id));
                        true
                    });
                    pattern.clear_last_valid_note_cache();
                }
            }
        }
    }

    pub fn invalidate_all_note_caches(&mut self) {
        for pattern in self.all_patterns_mut() {
            pattern.clear_last_valid_note_cache();
        }
    }

    pub fn delete_unused_instruments(&mut self) -> usize {
        let used: HashSet<InstrumentId> = self
            .songs
            .iter()
            .flat_map(Song::patterns)
            .flat_map(|pattern| pattern.notes().values())
            .filter_map(|note| note.instrument)
            .collect();

        let before = self.instruments.len();
        self.instruments.retain(|inst| used.contains(&inst.id()));
        self.sort_instruments();
        before - self.instruments.len()
    }

    pub fn delete_unused_arpeggios(&mut self) -> usize {
        let used: HashSet<ArpeggioId> = self
            .songs
            .iter()
            .flat_map(Song::patterns)
            .flat_map(|pattern| pattern.notes().values())
            .filter(|note| note.is_arpeggio())
            .filter_map(|note| note.arpeggio)
            .collect();

        let before = self.arpeggios.len();
        self.arpeggios.retain(|arp| used.contains(&arp.id()));
        self.replace_missing_arpeggios();
        self.sort_arpeggios();
        before - self.arpeggios.len()
    }

    pub fn delete_unused_samples(&mut self) -> usize {
        let used: HashSet<SampleId> = self
            .songs
            .iter()
            .filter_map(|song| song.channel(ChannelKind::Dpcm))
            .flat_map(|channel| channel.patterns())
            .flat_map(|pattern| pattern.notes().values())
            .filter(|note| note.is_musical() && note.instrument.is_none())
            .filter_map(|note| self.sample_mapping(note.value))
            .map(|mapping| mapping.sample)
            .collect();

        let before = self.samples.len();
        self.samples.retain(|sample| used.contains(&sample.id()));
        for slot in &mut self.sample_mappings {
            if slot.is_some_and(|mapping| !used.contains(&mapping.sample)) {
                *slot = None;
            }
        }
        self.sort_samples();
        before - self.samples.len()
    }

    fn replace_missing_arpeggios(&mut self) {
        let live: HashSet<ArpeggioId> = self.arpeggios.iter().map(Arpeggio::id).collect();
        for pattern in self.all_patterns_mut() {
            pattern.update_notes(|note| match note.arpeggio {
                Some(id) if !live.contains(&id) => {
                    note.arpeggio = None;
                    true
                }
                _ => false,
            });
        }
    }

    pub fn cleanup(&mut self) {
        let instruments = self.delete_unused_instruments();
        let samples = self.delete_unused_samples();
        let arpeggios = self.delete_unused_arpeggios();
        info!(instruments, samples, arpeggios, "removed unused entities");
    }

    pub fn validate(&self) -> Result<(), IntegrityError> {
        let watermark = self.next_id_watermark();
        let mut seen = HashSet::new();
        for id in self.all_entity_ids() {
            if !seen.insert(id) {
                return Err(IntegrityError::DuplicateId(id));
            }
            if id >= watermark {
                return Err(IntegrityError::IdAboveWatermark { id, watermark });
            }
        }

        if self.pal && self.expansion != ExpansionAudio::None {
            return Err(IntegrityError::PalWithExpansion);
        }

        check_unique_names("song", self.songs.iter().map(Song::name))?;
        check_unique_names("instrument", self.instruments.iter().map(Instrument::name))?;
        check_unique_names("arpeggio", self.arpeggios.iter().map(Arpeggio::name))?;
        check_unique_names("sample", self.samples.iter().map(DpcmSample::name))?;

        for instrument in &self.instruments {
            if instrument.is_expansion_instrument() && instrument.expansion() != self.expansion {
                return Err(IntegrityError::IncompatibleInstrument {
                    instrument: instrument.id(),
                    expansion: instrument.expansion(),
                });
            }
        }

        for (slot, mapping) in self.sample_mappings.iter().enumerate() {
            if let Some(mapping) = mapping
                && self.sample(mapping.sample).is_none()
            {
                return Err(IntegrityError::DanglingSampleMapping {
                    slot,
                    sample: mapping.sample,
                });
            }
        }

        for song in &self.songs {
            for channel in song.channels() {
                check_unique_names("pattern", channel.patterns().iter().map(Pattern::name))?;
                for pattern in channel.instances().iter().flatten() {
                    if channel.pattern(*pattern).is_none() {
                        return Err(IntegrityError::ForeignPatternInstance {
                            song: song.id(),
                            kind: channel.kind(),
                            pattern: *pattern,
                        });
                    }
                }
                for pattern in channel.patterns() {
                    self.validate_notes(pattern)?;
                }
            }
        }
        Ok(())
    }

    fn validate_notes(&self, pattern: &Pattern) -> Result<(), IntegrityError> {
        for note in pattern.notes().values() {
            if let Some(instrument) = note.instrument
                && self.instrument(instrument).is_none()
            {
                return Err(IntegrityError::DanglingInstrument {
                    pattern: pattern.id(),
                    instrument,
                });
            }
            if let Some(arpeggio) = note.arpeggio
                && self.arpeggio(arpeggio).is_none()
            {
                return Err(IntegrityError::DanglingArpeggio {
                    pattern: pattern.id(),
                    arpeggio,
                });
            }
        }
        Ok(())
    }

    /// Runs [`Project::validate`] in debug builds or with the `validation`
    /// feature. Failures are logged, and fatal in debug builds.
    pub fn debug_validate(&self, context: &str) {
        if !(cfg!(debug_assertions) || cfg!(feature = "validation")) {
            return;
        }
        if let Err(err) = self.validate() {
            error!(context, %err, "document failed consistency check");
            if cfg!(debug_assertions) {
                panic!("document failed consistency check after {context}: {err}");
            }
        }
    }
}

fn check_unique_names<'a>(
    collection: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), IntegrityError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(IntegrityError::DuplicateName {
                collection,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}
