use std::collections::{HashMap, hash_map::Entry};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::{
    codec::{CodecError, SaveBuffer},
    ids::{ArpeggioId, InstrumentId, PatternId, SampleId, SongId},
    instrument::{Arpeggio, Instrument},
    model::{
        ChannelKind, DEFAULT_SPEED, DEFAULT_TEMPO, DPCM_NOTE_MAX, DPCM_NOTE_MIN, ExpansionAudio,
        MAX_N163_CHANNELS, NATIVE_TEMPO, Pattern, Song, TempoMode,
    },
    project::Project,
    sample::{
        DpcmSample, MAX_SAMPLE_PITCH, MAX_SAMPLE_SIZE, SAMPLE_ALIGNMENT, SAMPLE_FILL_BYTE,
        SAMPLE_MAPPING_SLOTS, SampleMapping, padded_size,
    },
};

impl Project {
    #[must_use]
    pub fn song(&self, id: SongId) -> Option<&Song> {
        self.songs.iter().find(|song| song.id() == id)
    }

    pub fn song_mut(&mut self, id: SongId) -> Option<&mut Song> {
        self.songs.iter_mut().find(|song| song.id() == id)
    }

    #[must_use]
    pub fn song_by_name(&self, name: &str) -> Option<&Song> {
        self.songs.iter().find(|song| song.name() == name)
    }

    #[must_use]
    pub fn instrument(&self, id: InstrumentId) -> Option<&Instrument> {
        self.instruments.iter().find(|inst| inst.id() == id)
    }

    pub fn instrument_mut(&mut self, id: InstrumentId) -> Option<&mut Instrument> {
        self.instruments.iter_mut().find(|inst| inst.id() == id)
    }

    #[must_use]
    pub fn instrument_by_name(&self, name: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|inst| inst.name() == name)
    }

    #[must_use]
    pub fn arpeggio(&self, id: ArpeggioId) -> Option<&Arpeggio> {
        self.arpeggios.iter().find(|arp| arp.id() == id)
    }

    pub fn arpeggio_mut(&mut self, id: ArpeggioId) -> Option<&mut Arpeggio> {
        self.arpeggios.iter_mut().find(|arp| arp.id() == id)
    }

    #[must_use]
    pub fn arpeggio_by_name(&self, name: &str) -> Option<&Arpeggio> {
        self.arpeggios.iter().find(|arp| arp.name() == name)
    }

    #[must_use]
    pub fn sample(&self, id: SampleId) -> Option<&DpcmSample> {
        self.samples.iter().find(|sample| sample.id() == id)
    }

    pub fn sample_mut(&mut self, id: SampleId) -> Option<&mut DpcmSample> {
        self.samples.iter_mut().find(|sample| sample.id() == id)
    }

    #[must_use]
    pub fn sample_by_name(&self, name: &str) -> Option<&DpcmSample> {
        self.samples.iter().find(|sample| sample.name() == name)
    }

    #[must_use]
    pub fn pattern(&self, id: PatternId) -> Option<&Pattern> {
        self.songs.iter().find_map(|song| song.pattern(id))
    }

    pub fn pattern_mut(&mut self, id: PatternId) -> Option<&mut Pattern> {
        self.songs.iter_mut().find_map(|song| song.pattern_mut(id))
    }

    #[must_use]
    pub fn is_song_name_unique(&self, name: &str) -> bool {
        self.song_by_name(name).is_none()
    }

    #[must_use]
    pub fn is_instrument_name_unique(&self, name: &str) -> bool {
        self.instrument_by_name(name).is_none()
    }

    #[must_use]
    pub fn is_arpeggio_name_unique(&self, name: &str) -> bool {
        self.arpeggio_by_name(name).is_none()
    }

    #[must_use]
    pub fn is_sample_name_unique(&self, name: &str) -> bool {
        self.sample_by_name(name).is_none()
    }

    #[must_use]
    pub fn generate_unique_song_name(&self) -> String {
        unique_numbered_name("Song", |name| !self.is_song_name_unique(name))
    }

    #[must_use]
    pub fn generate_unique_instrument_name(&self) -> String {
        unique_numbered_name("Instrument", |name| !self.is_instrument_name_unique(name))
    }

    #[must_use]
    pub fn generate_unique_arpeggio_name(&self) -> String {
        unique_numbered_name("Arpeggio", |name| !self.is_arpeggio_name_unique(name))
    }

    pub fn create_song(&mut self, name: Option<&str>) -> Option<SongId> {
        let name = match name {
            None => self.generate_unique_song_name(),
            Some(name) if self.is_song_name_unique(name) => name.to_string(),
            Some(name) => {
                debug!(name, "song name already in use");
                return None;
            }
        };

        let id = self.allocator.allocate();
        let song = Song::new(id, name, self.expansion, self.expansion_channel_count);
        self.songs.push(song);
        info!(song_id = %id, "song created");
        Some(id)
    }

    pub fn delete_song(&mut self, id: SongId) -> bool {
        let before = self.songs.len();
        self.songs.retain(|song| song.id() != id);
        before != self.songs.len()
    }

    pub fn rename_song(&mut self, id: SongId, name: &str) -> bool {
        let Some(current) = self.song(id).map(|song| song.name().to_string()) else {
            return false;
        };
        if current == name {
            return true;
        }
        if !self.is_song_name_unique(name) {
            return false;
        }
        if let Some(song) = self.song_mut(id) {
            song.set_name(name);
        }
        self.sort_songs();
        true
    }

    pub fn sort_songs(&mut self) {
        self.songs.sort_by(|a, b| a.name().cmp(b.name()));
    }

    pub fn create_pattern(
        &mut self,
        song: SongId,
        kind: ChannelKind,
        name: Option<&str>,
    ) -> Option<PatternId> {
        let channel = self.song(song)?.channel(kind)?;
        let name = match name {
            None => unique_numbered_name("Pattern", |name| !channel.is_pattern_name_unique(name)),
            Some(name) if channel.is_pattern_name_unique(name) => name.to_string(),
            Some(_) => return None,
        };

        let id = self.allocator.allocate();
        self.song_mut(song)?
            .channel_mut(kind)?
            .add_pattern(Pattern::new(id, name));
        Some(id)
    }

    pub fn set_pattern_instance(
        &mut self,
        song: SongId,
        kind: ChannelKind,
        position: u16,
        pattern: Option<PatternId>,
    ) -> bool {
        self.song_mut(song)
            .and_then(|song| song.channel_mut(kind))
            .is_some_and(|channel| channel.set_instance(position, pattern))
    }

    pub fn create_instrument(
        &mut self,
        expansion: ExpansionAudio,
        name: Option<&str>,
    ) -> Option<InstrumentId> {
        if expansion != ExpansionAudio::None && expansion != self.expansion {
            debug!(?expansion, "instrument expansion does not match project");
            return None;
        }

        let name = match name {
            None => self.generate_unique_instrument_name(),
            Some(name) if self.is_instrument_name_unique(name) => name.to_string(),
            Some(_) => return None,
        };

        let id = self.allocator.allocate();
        self.instruments.push(Instrument::new(id, expansion, name));
        self.sort_instruments();
        info!(instrument_id = %id, "instrument created");
        Some(id)
    }

    pub fn rename_instrument(&mut self, id: InstrumentId, name: &str) -> bool {
        let Some(current) = self.instrument(id).map(|inst| inst.name().to_string()) else {
            return false;
        };
        if current == name {
            return true;
        }
        if !self.is_instrument_name_unique(name) {
            return false;
        }
        if let Some(instrument) = self.instrument_mut(id) {
            instrument.set_name(name);
        }
        self.sort_instruments();
        true
    }

    pub fn delete_instrument(&mut self, id: InstrumentId) -> bool {
        let before = self.instruments.len();
        self.instruments.retain(|inst| inst.id() != id);
        if before == self.instruments.len() {
            return false;
        }
        self.replace_instrument(id, None);
        info!(instrument_id = %id, "instrument deleted");
        true
    }

    pub fn delete_all_instruments(&mut self) {
        let ids: Vec<_> = self.instruments.iter().map(Instrument::id).collect();
        for id in ids {
            self.replace_instrument(id, None);
        }
        self.instruments.clear();
    }

    pub fn sort_instruments(&mut self) {
        self.instruments.sort_by(|a, b| {
            a.expansion()
                .cmp(&b.expansion())
                .then_with(|| a.name().cmp(b.name()))
        });
    }

    pub fn merge_identical_instruments(&mut self) -> usize {
        let mut seen: HashMap<[u8; 32], InstrumentId> = HashMap::new();
        let mut duplicates = Vec::new();
        for instrument in &self.instruments {
            let Ok(digest) = instrument_digest(instrument) else {
                continue;
            };
            match seen.entry(digest) {
                Entry::Occupied(original) => duplicates.push((instrument.id(), *original.get())),
                Entry::Vacant(slot) => {
                    slot.insert(instrument.id());
                }
            }
        }

        for (duplicate, original) in &duplicates {
            self.replace_instrument(*duplicate, Some(*original));
            self.instruments.retain(|inst| inst.id() != *duplicate);
        }
        duplicates.len()
    }

    pub fn create_arpeggio(&mut self, name: Option<&str>) -> Option<ArpeggioId> {
        let name = match name {
            None => self.generate_unique_arpeggio_name(),
            Some(name) if self.is_arpeggio_name_unique(name) => name.to_string(),
            Some(_) => return None,
        };

        let id = self.allocator.allocate();
        self.arpeggios.push(Arpeggio::new(id, name));
        self.sort_arpeggios();
        Some(id)
    }

    pub fn rename_arpeggio(&mut self, id: ArpeggioId, name: &str) -> bool {
        let Some(current) = self.arpeggio(id).map(|arp| arp.name().to_string()) else {
            return false;
        };
        if current == name {
            return true;
        }
        if !self.is_arpeggio_name_unique(name) {
            return false;
        }
        if let Some(arpeggio) = self.arpeggio_mut(id) {
            arpeggio.set_name(name);
        }
        self.sort_arpeggios();
        true
    }

    pub fn delete_arpeggio(&mut self, id: ArpeggioId) -> bool {
        let before = self.arpeggios.len();
        self.arpeggios.retain(|arp| arp.id() != id);
        if before == self.arpeggios.len() {
            return false;
        }
        self.replace_arpeggio(id, None);
        true
    }

    pub fn sort_arpeggios(&mut self) {
        self.arpeggios.sort_by(|a, b| a.name().cmp(b.name()));
    }

    #[must_use]
    pub fn total_sample_size(&self) -> usize {
        self.samples
            .iter()
            .map(DpcmSample::padded_len)
            .sum::<usize>()
            .min(MAX_SAMPLE_SIZE)
    }

    pub fn create_or_update_sample(&mut self, name: &str, data: Vec<u8>) -> Option<SampleId> {
        let used: usize = self.samples.iter().map(DpcmSample::padded_len).sum();
        let incoming = padded_size(data.len());

        if let Some(sample) = self.samples.iter_mut().find(|sample| sample.name() == name) {
            if used - sample.padded_len() + incoming > MAX_SAMPLE_SIZE {
                debug!(name, incoming, used, "sample update exceeds dpcm budget");
                return None;
            }
            sample.set_data(data);
            return Some(sample.id());
        }

        if used + incoming > MAX_SAMPLE_SIZE {
            debug!(name, incoming, used, "new sample exceeds dpcm budget");
            return None;
        }

        let id = self.allocator.allocate();
        self.samples.push(DpcmSample::new(id, name, data));
        self.sort_samples();
        info!(sample_id = %id, "sample created");
        Some(id)
    }

    pub fn rename_sample(&mut self, id: SampleId, name: &str) -> bool {
        let Some(current) = self.sample(id).map(|sample| sample.name().to_string()) else {
            return false;
        };
        if current == name {
            return true;
        }
        if !self.is_sample_name_unique(name) {
            return false;
        }
        if let Some(sample) = self.sample_mut(id) {
            sample.set_name(name);
        }
        self.sort_samples();
        true
    }

    pub fn delete_sample(&mut self, id: SampleId) -> bool {
        let before = self.samples.len();
        self.samples.retain(|sample| sample.id() != id);
        if before == self.samples.len() {
            return false;
        }
        self.replace_sample(id, None);
        true
    }

    pub fn delete_all_samples(&mut self) {
        self.sample_mappings = [None; SAMPLE_MAPPING_SLOTS];
        self.samples.clear();
    }

    pub fn delete_unmapped_samples(&mut self) {
        let mapped: Vec<SampleId> = self
            .sample_mappings
            .iter()
            .flatten()
            .map(|mapping| mapping.sample)
            .collect();
        self.samples.retain(|sample| mapped.contains(&sample.id()));
    }

    pub fn sort_samples(&mut self) {
        self.samples.sort_by(|a, b| a.name().cmp(b.name()));
    }

    #[must_use]
    pub fn find_matching_sample(&self, data: &[u8]) -> Option<SampleId> {
        self.samples
            .iter()
            .find(|sample| sample.data() == data)
            .map(DpcmSample::id)
    }

    #[must_use]
    pub fn address_for_sample(&self, id: SampleId) -> Option<usize> {
        let mut address = 0;
        for sample in &self.samples {
            if sample.id() == id {
                return Some(address);
            }
            address = padded_size(address + sample.data().len());
        }
        None
    }

    #[must_use]
    pub fn sample_byte_at_address(&self, offset: usize) -> u8 {
        let mut address = 0;
        for sample in &self.samples {
            let data = sample.data();
            if (address..address + data.len()).contains(&offset) {
                let byte = data[offset - address];
                return if sample.reverse_bits {
                    byte.reverse_bits()
                } else {
                    byte
                };
            }
            address = padded_size(address + data.len());
        }
        SAMPLE_FILL_BYTE
    }

    #[must_use]
    pub fn packed_sample_data(&self) -> Vec<u8> {
        let mut packed = Vec::with_capacity(self.total_sample_size());
        for sample in &self.samples {
            packed.extend(sample.data_with_reverse());
            let padding = padded_size(packed.len()) - packed.len();
            packed.extend(std::iter::repeat_n(SAMPLE_FILL_BYTE, padding));
        }
        packed.truncate(MAX_SAMPLE_SIZE);
        debug_assert_eq!(packed.len() % SAMPLE_ALIGNMENT, 0);
        packed
    }

    #[must_use]
    pub fn note_supports_dpcm(note: u8) -> bool {
        note > DPCM_NOTE_MIN && note <= DPCM_NOTE_MAX
    }

    fn mapping_slot(note: u8) -> Option<usize> {
        Self::note_supports_dpcm(note).then(|| usize::from(note - DPCM_NOTE_MIN))
    }

    pub fn map_sample(&mut self, note: u8, sample: SampleId, pitch: u8, looping: bool) -> bool {
        let Some(slot) = Self::mapping_slot(note) else {
            return false;
        };
        if pitch > MAX_SAMPLE_PITCH
            || self.sample(sample).is_none()
            || self.sample_mappings[slot].is_some()
        {
            return false;
        }
        self.sample_mappings[slot] = Some(SampleMapping::new(sample, pitch, looping));
        true
    }

    pub fn unmap_sample(&mut self, note: u8) {
        if let Some(slot) = Self::mapping_slot(note) {
            self.sample_mappings[slot] = None;
        }
    }

    #[must_use]
    pub fn sample_mapping(&self, note: u8) -> Option<&SampleMapping> {
        Self::mapping_slot(note).and_then(|slot| self.sample_mappings[slot].as_ref())
    }

    #[must_use]
    pub fn find_sample_mapping(&self, sample: SampleId, pitch: u8, looping: bool) -> Option<u8> {
        let wanted = SampleMapping::new(sample, pitch, looping);
        self.sample_mappings
            .iter()
            .position(|mapping| *mapping == Some(wanted))
            .and_then(|slot| u8::try_from(slot).ok())
            .map(|slot| slot + DPCM_NOTE_MIN)
    }

    pub fn transpose_dpcm_mapping(&mut self, old_note: u8, new_note: u8) -> bool {
        let (Some(old_slot), Some(new_slot)) =
            (Self::mapping_slot(old_note), Self::mapping_slot(new_note))
        else {
            return false;
        };
        if old_slot == new_slot {
            return true;
        }
        if self.sample_mappings[old_slot].is_none() || self.sample_mappings[new_slot].is_some() {
            return false;
        }

        self.sample_mappings[new_slot] = self.sample_mappings[old_slot].take();
        for song in &mut self.songs {
            let Some(channel) = song.channel_mut(ChannelKind::Dpcm) else {
                continue;
            };
            for pattern in channel.patterns_mut() {
                pattern.update_notes(|note| {
                    if note.value == old_note {
                        note.value = new_note;
                        true
                    } else {
                        false
                    }
                });
            }
        }
        true
    }

    pub fn set_expansion_audio(&mut self, expansion: ExpansionAudio, channel_count: u8) {
        let expansion = if expansion == ExpansionAudio::N163 && channel_count == 0 {
            ExpansionAudio::None
        } else {
            expansion
        };

        let changed = self.expansion != expansion;
        self.expansion = expansion;
        self.expansion_channel_count = if expansion == ExpansionAudio::N163 {
            channel_count.min(MAX_N163_CHANNELS)
        } else {
            1
        };

        for song in &mut self.songs {
            song.regenerate_channels(expansion, self.expansion_channel_count);
        }

        if changed {
            let stale: Vec<_> = self
                .instruments
                .iter()
                .filter(|inst| inst.is_expansion_instrument() && inst.expansion() != expansion)
                .map(Instrument::id)
                .collect();
            for id in stale {
                self.delete_instrument(id);
            }
        }

        if expansion != ExpansionAudio::None {
            self.pal = false;
        }
        info!(
            ?expansion,
            channels = self.expansion_channel_count,
            changed,
            "expansion audio set"
        );
    }

    pub fn set_pal_mode(&mut self, pal: bool) {
        if pal && self.uses_expansion_audio() {
            debug!("pal authoring ignored while expansion audio is active");
        }
        self.pal = pal && !self.uses_expansion_audio();
    }

    pub fn set_tempo_mode(&mut self, mode: TempoMode) -> bool {
        if mode == self.tempo_mode {
            return true;
        }
        if !self.are_songs_empty() {
            debug!(?mode, "tempo mode change rejected, songs contain notes");
            return false;
        }
        self.tempo_mode = mode;
        true
    }

    /// Rewrites every song's timing for FamiStudio tempo, where `speed` holds
    /// the frames per row. The rate in rows per second is kept as close as
    /// whole frames allow.
    pub fn convert_to_famistudio_tempo(&mut self) -> bool {
        if self.tempo_mode == TempoMode::FamiStudio {
            return false;
        }
        for song in &mut self.songs {
            let frames = (u32::from(song.speed) * u32::from(NATIVE_TEMPO)
                + u32::from(song.tempo) / 2)
                / u32::from(song.tempo.max(1));
            song.speed = u8::try_from(frames.clamp(1, u32::from(u8::MAX))).unwrap_or(u8::MAX);
            song.tempo = NATIVE_TEMPO;
        }
        self.tempo_mode = TempoMode::FamiStudio;
        info!(songs = self.songs.len(), "converted to famistudio tempo");
        true
    }

    pub fn convert_to_famitracker_tempo(&mut self, set_defaults: bool) -> bool {
        if self.tempo_mode == TempoMode::FamiTracker {
            return false;
        }
        for song in &mut self.songs {
            if set_defaults {
                song.speed = DEFAULT_SPEED;
                song.tempo = DEFAULT_TEMPO;
            } else {
                song.speed = 1;
                song.tempo = NATIVE_TEMPO;
            }
        }
        self.tempo_mode = TempoMode::FamiTracker;
        info!(songs = self.songs.len(), set_defaults, "converted to famitracker tempo");
        true
    }

    #[must_use]
    pub fn are_songs_empty(&self) -> bool {
        self.songs.iter().all(Song::is_empty)
    }

    #[must_use]
    pub fn uses_samples(&self) -> bool {
        !self.samples.is_empty()
            && self.songs.iter().any(|song| {
                song.channel(ChannelKind::Dpcm)
                    .is_some_and(|channel| channel.patterns().iter().any(|p| !p.is_empty()))
            })
    }

    #[must_use]
    pub fn is_channel_active(&self, kind: ChannelKind) -> bool {
        kind.is_active(self.expansion, self.expansion_channel_count)
    }

    #[must_use]
    pub fn active_channels(&self) -> Vec<ChannelKind> {
        ChannelKind::active(self.expansion, self.expansion_channel_count).collect()
    }

    #[must_use]
    pub fn needs_expansion_instruments(&self) -> bool {
        !matches!(self.expansion, ExpansionAudio::None | ExpansionAudio::Mmc5)
    }

    pub fn remove_all_songs_but(&mut self, keep: &[SongId], delete_unused_data: bool) {
        self.songs.retain(|song| keep.contains(&song.id()));
        if delete_unused_data {
            self.cleanup();
        }
    }
}

fn unique_numbered_name(prefix: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut index = 1_u32;
    loop {
        let name = format!("{prefix} {index}");
        if !taken(&name) {
            return name;
        }
        index += 1;
    }
}

pub(crate) fn unique_copy_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    let first = format!("{base} (copy)");
    if !taken(&first) {
        return first;
    }
    let mut index = 2_u32;
    loop {
        let name = format!("{base} (copy {index})");
        if !taken(&name) {
            return name;
        }
        index += 1;
    }
}

fn instrument_digest(instrument: &Instrument) -> Result<[u8; 32], CodecError> {
    let mut body = instrument.clone();
    let mut buffer = SaveBuffer::new();
    body.serialize_body(&mut buffer)?;
    Ok(Sha256::digest(buffer.into_bytes()).into())
}
