use crate::{
    codec::{CodecError, ProjectBuffer, serialize_enum},
    ids::{IdAllocator, RawId},
    instrument::{Arpeggio, Instrument},
    model::{ExpansionAudio, Song, TempoMode},
    sample::{DpcmSample, SAMPLE_MAPPING_SLOTS, SampleMapping},
};

pub const DEFAULT_PROJECT_NAME: &str = "Untitled";
pub const DEFAULT_AUTHOR: &str = "Unknown";
const MISSPELLED_DEFAULT_AUTHOR: &str = "Unkown";

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub(crate) allocator: IdAllocator,
    pub(crate) songs: Vec<Song>,
    pub(crate) instruments: Vec<Instrument>,
    pub(crate) arpeggios: Vec<Arpeggio>,
    pub(crate) samples: Vec<DpcmSample>,
    pub(crate) sample_mappings: [Option<SampleMapping>; SAMPLE_MAPPING_SLOTS],
    pub name: String,
    pub author: String,
    pub copyright: String,
    pub filename: String,
    pub(crate) expansion: ExpansionAudio,
    pub(crate) expansion_channel_count: u8,
    pub(crate) tempo_mode: TempoMode,
    pub(crate) pal: bool,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            allocator: IdAllocator::new(),
            songs: Vec::new(),
            instruments: Vec::new(),
            arpeggios: Vec::new(),
            samples: Vec::new(),
            sample_mappings: [None; SAMPLE_MAPPING_SLOTS],
            name: DEFAULT_PROJECT_NAME.to_string(),
            author: DEFAULT_AUTHOR.to_string(),
            copyright: String::new(),
            filename: String::new(),
            expansion: ExpansionAudio::None,
            expansion_channel_count: 1,
            tempo_mode: TempoMode::FamiStudio,
            pal: false,
        }
    }
}

impl Project {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_default_content() -> Self {
        let mut project = Self::new();
        let _song = project.create_song(None);
        let _instrument = project.create_instrument(ExpansionAudio::None, None);
        project
    }

    pub fn generate_unique_id(&mut self) -> RawId {
        self.allocator.next_id()
    }

    #[must_use]
    pub fn next_id_watermark(&self) -> RawId {
        self.allocator.watermark()
    }

    #[must_use]
    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    #[must_use]
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    #[must_use]
    pub fn arpeggios(&self) -> &[Arpeggio] {
        &self.arpeggios
    }

    #[must_use]
    pub fn samples(&self) -> &[DpcmSample] {
        &self.samples
    }

    #[must_use]
    pub fn sample_mappings(&self) -> &[Option<SampleMapping>; SAMPLE_MAPPING_SLOTS] {
        &self.sample_mappings
    }

    #[must_use]
    pub fn expansion_audio(&self) -> ExpansionAudio {
        self.expansion
    }

    #[must_use]
    pub fn expansion_channel_count(&self) -> u8 {
        self.expansion_channel_count
    }

    #[must_use]
    pub fn uses_expansion_audio(&self) -> bool {
        self.expansion != ExpansionAudio::None
    }

    #[must_use]
    pub fn tempo_mode(&self) -> TempoMode {
        self.tempo_mode
    }

    #[must_use]
    pub fn pal_mode(&self) -> bool {
        self.pal
    }

    pub fn all_entity_ids(&self) -> impl Iterator<Item = RawId> + '_ {
        let instruments = self.instruments.iter().map(|inst| inst.id().get());
        let arpeggios = self.arpeggios.iter().map(|arp| arp.id().get());
        let samples = self.samples.iter().map(|sample| sample.id().get());
        let songs = self.songs.iter().flat_map(|song| {
            std::iter::once(song.id().get())
                .chain(song.patterns().map(|pattern| pattern.id().get()))
        });
        instruments.chain(arpeggios).chain(samples).chain(songs)
    }

    pub fn ensure_next_id_is_large_enough(&mut self) {
        let largest = self.all_entity_ids().max();
        self.allocator.ensure_above(largest);
    }

    pub fn serialize_state<B: ProjectBuffer>(&mut self, buffer: &mut B) -> Result<(), CodecError> {
        let version = buffer.version();
        for rule in field_rules::<B>() {
            if rule.persistent_only && buffer.is_for_undo_redo() {
                continue;
            }

            let reading = buffer.is_reading();
            if version >= rule.introduced_in {
                (rule.visit)(self, buffer)?;
                if let Some(fixup) = rule.fixup.filter(|_| reading) {
                    fixup(self, version);
                }
            } else if let Some(default) = rule.default_if_absent.filter(|_| reading) {
                tracing::trace!(field = rule.name, version, "field absent, applying default");
                default(self);
            }
        }

        if buffer.is_reading() && !buffer.is_for_undo_redo() {
            self.ensure_next_id_is_large_enough();
        }
        Ok(())
    }
}

type VisitFn<B> = fn(&mut Project, &mut B) -> Result<(), CodecError>;

struct FieldRule<B> {
    name: &'static str,
    introduced_in: u32,
    /// Skipped by undo/redo snapshots, which rely on the live allocator.
    persistent_only: bool,
    visit: VisitFn<B>,
    default_if_absent: Option<fn(&mut Project)>,
    fixup: Option<fn(&mut Project, u32)>,
}

fn field_rules<B: ProjectBuffer>() -> [FieldRule<B>; 9] {
    [
        FieldRule {
            name: "id watermark",
            introduced_in: 1,
            persistent_only: true,
            visit: |project, buffer| buffer.serialize_u32(project.allocator.watermark_mut()),
            default_if_absent: None,
            fixup: None,
        },
        FieldRule {
            name: "metadata",
            introduced_in: 2,
            persistent_only: false,
            visit: |project, buffer| {
                buffer.serialize_string(&mut project.name)?;
                buffer.serialize_string(&mut project.author)?;
                buffer.serialize_string(&mut project.copyright)
            },
            default_if_absent: Some(|project| {
                project.name = DEFAULT_PROJECT_NAME.to_string();
                project.author = DEFAULT_AUTHOR.to_string();
                project.copyright = String::new();
            }),
            fixup: Some(|project, version| {
                if version < 3 && project.author == MISSPELLED_DEFAULT_AUTHOR {
                    project.author = DEFAULT_AUTHOR.to_string();
                }
            }),
        },
        FieldRule {
            name: "expansion audio",
            introduced_in: 4,
            persistent_only: false,
            visit: |project, buffer| {
                serialize_enum(
                    buffer,
                    &mut project.expansion,
                    "expansion audio",
                    ExpansionAudio::raw,
                    ExpansionAudio::from_raw,
                )
            },
            default_if_absent: Some(|project| project.expansion = ExpansionAudio::None),
            fixup: None,
        },
        FieldRule {
            name: "expansion channels and tempo mode",
            introduced_in: 5,
            persistent_only: false,
            visit: |project, buffer| {
                buffer.serialize_u8(&mut project.expansion_channel_count)?;
                serialize_enum(
                    buffer,
                    &mut project.tempo_mode,
                    "tempo mode",
                    TempoMode::raw,
                    TempoMode::from_raw,
                )
            },
            default_if_absent: Some(|project| {
                project.expansion_channel_count = 1;
                project.tempo_mode = TempoMode::FamiTracker;
            }),
            fixup: None,
        },
        FieldRule {
            name: "pal authoring",
            introduced_in: 6,
            persistent_only: false,
            visit: |project, buffer| buffer.serialize_bool(&mut project.pal),
            default_if_absent: Some(|project| project.pal = false),
            fixup: None,
        },
        FieldRule {
            name: "dpcm samples",
            introduced_in: 1,
            persistent_only: false,
            visit: serialize_dpcm_state,
            default_if_absent: None,
            fixup: None,
        },
        FieldRule {
            name: "instruments",
            introduced_in: 1,
            persistent_only: false,
            visit: |project, buffer| {
                buffer.serialize_list(&mut project.instruments, |instrument, buffer| {
                    instrument.serialize_state(buffer)
                })
            },
            default_if_absent: None,
            fixup: None,
        },
        FieldRule {
            name: "arpeggios",
            introduced_in: 7,
            persistent_only: false,
            visit: |project, buffer| {
                buffer.serialize_list(&mut project.arpeggios, |arpeggio, buffer| {
                    arpeggio.serialize_state(buffer)
                })
            },
            default_if_absent: Some(|project| project.arpeggios.clear()),
            fixup: None,
        },
        FieldRule {
            name: "songs",
            introduced_in: 1,
            persistent_only: false,
            visit: |project, buffer| {
                buffer.serialize_list(&mut project.songs, |song, buffer| {
                    song.serialize_state(buffer)
                })
            },
            default_if_absent: None,
            fixup: None,
        },
    ]
}

fn serialize_dpcm_state<B: ProjectBuffer>(
    project: &mut Project,
    buffer: &mut B,
) -> Result<(), CodecError> {
    buffer.serialize_list(&mut project.samples, |sample, buffer| {
        sample.serialize_state(buffer)
    })?;

    let mut mask = project
        .sample_mappings
        .iter()
        .enumerate()
        .filter(|(_, mapping)| mapping.is_some())
        .fold(0_u64, |mask, (slot, _)| mask | (1 << slot));
    buffer.serialize_u64(&mut mask)?;

    for (slot, mapping) in project.sample_mappings.iter_mut().enumerate() {
        if mask & (1 << slot) == 0 {
            *mapping = None;
            continue;
        }
        mapping
            .get_or_insert_with(SampleMapping::default)
            .serialize_state(buffer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{LoadBuffer, SaveBuffer};

    #[test]
    fn undo_snapshots_do_not_carry_the_watermark() {
        let mut project = Project::with_default_content();
        let mut persistent = SaveBuffer::new();
        let mut undo = SaveBuffer::for_undo_redo();
        project.serialize_state(&mut persistent).expect("persistent save");
        project.serialize_state(&mut undo).expect("undo save");

        assert_eq!(persistent.into_bytes().len(), undo.into_bytes().len() + 4);
    }

    #[test]
    fn reading_restores_the_watermark_from_the_highest_id() {
        let mut project = Project::with_default_content();
        let mut save = SaveBuffer::new();
        project.serialize_state(&mut save).expect("save");
        let mut bytes = save.into_bytes();
        // Corrupt the stored watermark so it trails the real ids.
        bytes[..4].copy_from_slice(&0_u32.to_le_bytes());

        let mut load = LoadBuffer::new(&bytes, crate::codec::CURRENT_VERSION).expect("buffer");
        let mut restored = Project::new();
        restored.serialize_state(&mut load).expect("load");

        let largest = restored.all_entity_ids().max().expect("entities exist");
        assert_eq!(restored.next_id_watermark(), largest + 1);
    }
}
