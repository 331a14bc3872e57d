use std::{cell::OnceCell, collections::BTreeMap};

use serde::{Deserialize, Serialize};

use crate::{
    codec::{CodecError, ProjectBuffer, serialize_enum},
    ids::{ArpeggioId, InstrumentId, PatternId, SongId},
};

pub const NOTE_STOP: u8 = 0x00;
pub const MUSICAL_NOTE_MIN: u8 = 0x01;
pub const MUSICAL_NOTE_MAX: u8 = 0x60;
pub const NOTE_INVALID: u8 = 0xff;
pub const DPCM_NOTE_MIN: u8 = 0x0c;
pub const DPCM_NOTE_MAX: u8 = 0x4b;

pub const DEFAULT_SONG_LENGTH: u16 = 16;
pub const DEFAULT_PATTERN_LENGTH: u16 = 64;
pub const DEFAULT_SPEED: u8 = 6;
pub const DEFAULT_TEMPO: u16 = 150;
pub const NATIVE_TEMPO: u16 = 150;
pub const MAX_N163_CHANNELS: u8 = 8;
pub const MAX_NOTE_VOLUME: u8 = 15;

const NO_VOLUME: u8 = 0xff;
const NO_LOOP_POINT: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionAudio {
    #[default]
    None,
    Vrc6,
    Vrc7,
    Fds,
    Mmc5,
    N163,
    S5b,
}

impl ExpansionAudio {
    pub const ALL: [Self; 7] = [
        Self::None,
        Self::Vrc6,
        Self::Vrc7,
        Self::Fds,
        Self::Mmc5,
        Self::N163,
        Self::S5b,
    ];

    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(usize::from(raw)).copied()
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Vrc6 => "Konami VRC6",
            Self::Vrc7 => "Konami VRC7",
            Self::Fds => "Famicom Disk System",
            Self::Mmc5 => "Nintendo MMC5",
            Self::N163 => "Namco 163",
            Self::S5b => "Sunsoft 5B",
        }
    }

    #[must_use]
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Vrc6 => "VRC6",
            Self::Vrc7 => "VRC7",
            Self::Fds => "FDS",
            Self::Mmc5 => "MMC5",
            Self::N163 => "N163",
            Self::S5b => "S5B",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoMode {
    #[default]
    FamiStudio,
    FamiTracker,
}

impl TempoMode {
    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::FamiStudio),
            1 => Some(Self::FamiTracker),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelKind {
    #[default]
    Square1,
    Square2,
    Triangle,
    Noise,
    Dpcm,
    Vrc6Square1,
    Vrc6Square2,
    Vrc6Saw,
    Vrc7Fm1,
    Vrc7Fm2,
    Vrc7Fm3,
    Vrc7Fm4,
    Vrc7Fm5,
    Vrc7Fm6,
    FdsWave,
    Mmc5Square1,
    Mmc5Square2,
    Mmc5Dpcm,
    N163Wave1,
    N163Wave2,
    N163Wave3,
    N163Wave4,
    N163Wave5,
    N163Wave6,
    N163Wave7,
    N163Wave8,
    S5bSquare1,
    S5bSquare2,
    S5bSquare3,
}

impl ChannelKind {
    pub const ALL: [Self; 29] = [
        Self::Square1,
        Self::Square2,
        Self::Triangle,
        Self::Noise,
        Self::Dpcm,
        Self::Vrc6Square1,
        Self::Vrc6Square2,
        Self::Vrc6Saw,
        Self::Vrc7Fm1,
        Self::Vrc7Fm2,
        Self::Vrc7Fm3,
        Self::Vrc7Fm4,
        Self::Vrc7Fm5,
        Self::Vrc7Fm6,
        Self::FdsWave,
        Self::Mmc5Square1,
        Self::Mmc5Square2,
        Self::Mmc5Dpcm,
        Self::N163Wave1,
        Self::N163Wave2,
        Self::N163Wave3,
        Self::N163Wave4,
        Self::N163Wave5,
        Self::N163Wave6,
        Self::N163Wave7,
        Self::N163Wave8,
        Self::S5bSquare1,
        Self::S5bSquare2,
        Self::S5bSquare3,
    ];

    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(usize::from(raw)).copied()
    }

    #[must_use]
    pub const fn expansion(self) -> ExpansionAudio {
        match self {
            Self::Square1 | Self::Square2 | Self::Triangle | Self::Noise | Self::Dpcm => {
                ExpansionAudio::None
            }
            Self::Vrc6Square1 | Self::Vrc6Square2 | Self::Vrc6Saw => ExpansionAudio::Vrc6,
            Self::Vrc7Fm1
            | Self::Vrc7Fm2
            | Self::Vrc7Fm3
            | Self::Vrc7Fm4
            | Self::Vrc7Fm5
            | Self::Vrc7Fm6 => ExpansionAudio::Vrc7,
            Self::FdsWave => ExpansionAudio::Fds,
            Self::Mmc5Square1 | Self::Mmc5Square2 | Self::Mmc5Dpcm => ExpansionAudio::Mmc5,
            Self::N163Wave1
            | Self::N163Wave2
            | Self::N163Wave3
            | Self::N163Wave4
            | Self::N163Wave5
            | Self::N163Wave6
            | Self::N163Wave7
            | Self::N163Wave8 => ExpansionAudio::N163,
            Self::S5bSquare1 | Self::S5bSquare2 | Self::S5bSquare3 => ExpansionAudio::S5b,
        }
    }

    #[must_use]
    pub fn is_active(self, expansion: ExpansionAudio, n163_channels: u8) -> bool {
        match self {
            Self::Mmc5Dpcm => false,
            Self::N163Wave1
            | Self::N163Wave2
            | Self::N163Wave3
            | Self::N163Wave4
            | Self::N163Wave5
            | Self::N163Wave6
            | Self::N163Wave7
            | Self::N163Wave8 => {
                expansion == ExpansionAudio::N163
                    && self.raw() - Self::N163Wave1.raw() < n163_channels
            }
            _ => {
                let owner = self.expansion();
                owner == ExpansionAudio::None || owner == expansion
            }
        }
    }

    pub fn active(expansion: ExpansionAudio, n163_channels: u8) -> impl Iterator<Item = Self> {
        Self::ALL
            .into_iter()
            .filter(move |kind| kind.is_active(expansion, n163_channels))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub value: u8,
    pub instrument: Option<InstrumentId>,
    pub arpeggio: Option<ArpeggioId>,
    pub volume: Option<u8>,
}

impl Default for Note {
    fn default() -> Self {
        Self {
            value: NOTE_INVALID,
            instrument: None,
            arpeggio: None,
            volume: None,
        }
    }
}

impl Note {
    #[must_use]
    pub fn musical(value: u8, instrument: Option<InstrumentId>) -> Self {
        Self {
            value,
            instrument,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn stop() -> Self {
        Self {
            value: NOTE_STOP,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.value != NOTE_INVALID
    }

    #[must_use]
    pub const fn is_stop(&self) -> bool {
        self.value == NOTE_STOP
    }

    #[must_use]
    pub const fn is_musical(&self) -> bool {
        self.is_valid() && !self.is_stop()
    }

    #[must_use]
    pub const fn is_arpeggio(&self) -> bool {
        self.arpeggio.is_some() && self.is_musical()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.is_valid()
            && self.instrument.is_none()
            && self.arpeggio.is_none()
            && self.volume.is_none()
    }

    pub fn serialize_state<B: ProjectBuffer>(&mut self, buffer: &mut B) -> Result<(), CodecError> {
        buffer.serialize_u8(&mut self.value)?;
        buffer.serialize_opt_id(&mut self.instrument)?;

        // Revision 3 added volume.
        if buffer.version() >= 3 {
            let mut volume = self.volume.unwrap_or(NO_VOLUME);
            buffer.serialize_u8(&mut volume)?;
            if buffer.is_reading() {
                self.volume = (volume != NO_VOLUME).then_some(volume);
            }
        }

        // Revision 7 added arpeggios.
        if buffer.version() >= 7 {
            buffer.serialize_opt_id(&mut self.arpeggio)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pattern {
    id: PatternId,
    name: String,
    notes: BTreeMap<u16, Note>,
    last_valid_note: OnceCell<Option<u16>>,
}

// The cache is derived state and does not take part in equality.
impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name && self.notes == other.notes
    }
}

impl Pattern {
    #[must_use]
    pub fn new(id: PatternId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn id(&self) -> PatternId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: PatternId) {
        self.id = id;
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub fn notes(&self) -> &BTreeMap<u16, Note> {
        &self.notes
    }

    #[must_use]
    pub fn note(&self, time: u16) -> Option<&Note> {
        self.notes.get(&time)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn set_note(&mut self, time: u16, note: Note) -> bool {
        if note.volume.is_some_and(|volume| volume > MAX_NOTE_VOLUME) {
            return false;
        }
        if note.is_empty() {
            self.notes.remove(&time);
        } else {
            self.notes.insert(time, note);
        }
        self.clear_last_valid_note_cache();
        true
    }

    pub fn clear_note(&mut self, time: u16) -> Option<Note> {
        let removed = self.notes.remove(&time);
        if removed.is_some() {
            self.clear_last_valid_note_cache();
        }
        removed
    }

    pub(crate) fn update_notes(&mut self, mut update: impl FnMut(&mut Note) -> bool) -> bool {
        let mut dirty = false;
        for note in self.notes.values_mut() {
            dirty |= update(note);
        }
        if dirty {
            self.notes.retain(|_, note| !note.is_empty());
            self.clear_last_valid_note_cache();
        }
        dirty
    }

    /// Latest note in time order that holds a valid value. Computed lazily
    /// and cached until the next note mutation.
    #[must_use]
    pub fn last_valid_note(&self) -> Option<(u16, Note)> {
        let time = *self.last_valid_note.get_or_init(|| {
            self.notes
                .iter()
                .rev()
                .find(|(_, note)| note.is_valid())
                .map(|(time, _)| *time)
        });
        time.and_then(|time| self.notes.get(&time).map(|note| (time, *note)))
    }

    #[must_use]
    pub fn has_cached_last_valid_note(&self) -> bool {
        self.last_valid_note.get().is_some()
    }

    pub fn clear_last_valid_note_cache(&mut self) {
        self.last_valid_note.take();
    }

    pub fn serialize_state<B: ProjectBuffer>(&mut self, buffer: &mut B) -> Result<(), CodecError> {
        buffer.serialize_id(&mut self.id)?;
        buffer.serialize_string(&mut self.name)?;

        let count = buffer.serialize_len(self.notes.len())?;
        if buffer.is_reading() {
            self.notes.clear();
            for _ in 0..count {
                let mut time = 0;
                let mut note = Note::default();
                buffer.serialize_u16(&mut time)?;
                note.serialize_state(buffer)?;
                self.notes.insert(time, note);
            }
            self.clear_last_valid_note_cache();
        } else {
            for (time, note) in &mut self.notes {
                let mut time = *time;
                buffer.serialize_u16(&mut time)?;
                note.serialize_state(buffer)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Channel {
    kind: ChannelKind,
    patterns: Vec<Pattern>,
    instances: Vec<Option<PatternId>>,
}

impl Channel {
    #[must_use]
    pub fn new(kind: ChannelKind, song_length: u16) -> Self {
        Self {
            kind,
            patterns: Vec::new(),
            instances: vec![None; usize::from(song_length)],
        }
    }

    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    #[must_use]
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn patterns_mut(&mut self) -> impl Iterator<Item = &mut Pattern> {
        self.patterns.iter_mut()
    }

    #[must_use]
    pub fn pattern(&self, id: PatternId) -> Option<&Pattern> {
        self.patterns.iter().find(|pattern| pattern.id == id)
    }

    pub fn pattern_mut(&mut self, id: PatternId) -> Option<&mut Pattern> {
        self.patterns.iter_mut().find(|pattern| pattern.id == id)
    }

    #[must_use]
    pub fn is_pattern_name_unique(&self, name: &str) -> bool {
        self.patterns.iter().all(|pattern| pattern.name != name)
    }

    pub(crate) fn add_pattern(&mut self, pattern: Pattern) {
        self.patterns.push(pattern);
    }

    #[must_use]
    pub fn instances(&self) -> &[Option<PatternId>] {
        &self.instances
    }

    pub(crate) fn instances_mut(&mut self) -> &mut [Option<PatternId>] {
        &mut self.instances
    }

    pub fn set_instance(&mut self, position: u16, pattern: Option<PatternId>) -> bool {
        if pattern.is_some_and(|id| self.pattern(id).is_none()) {
            return false;
        }
        match self.instances.get_mut(usize::from(position)) {
            Some(slot) => {
                *slot = pattern;
                true
            }
            None => false,
        }
    }

    fn resize(&mut self, song_length: u16) {
        self.instances.resize(usize::from(song_length), None);
    }

    pub fn serialize_state<B: ProjectBuffer>(&mut self, buffer: &mut B) -> Result<(), CodecError> {
        serialize_enum(
            buffer,
            &mut self.kind,
            "channel kind",
            ChannelKind::raw,
            ChannelKind::from_raw,
        )?;
        buffer.serialize_list(&mut self.patterns, |pattern, buffer| {
            pattern.serialize_state(buffer)
        })?;
        buffer.serialize_list(&mut self.instances, |instance, buffer| {
            buffer.serialize_opt_id(instance)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    id: SongId,
    name: String,
    length: u16,
    pub pattern_length: u16,
    pub speed: u8,
    pub tempo: u16,
    loop_point: Option<u16>,
    channels: Vec<Channel>,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            id: SongId::default(),
            name: String::new(),
            length: DEFAULT_SONG_LENGTH,
            pattern_length: DEFAULT_PATTERN_LENGTH,
            speed: DEFAULT_SPEED,
            tempo: DEFAULT_TEMPO,
            loop_point: None,
            channels: Vec::new(),
        }
    }
}

impl Song {
    #[must_use]
    pub fn new(
        id: SongId,
        name: impl Into<String>,
        expansion: ExpansionAudio,
        n163_channels: u8,
    ) -> Self {
        let mut song = Self {
            id,
            name: name.into(),
            ..Self::default()
        };
        song.regenerate_channels(expansion, n163_channels);
        song
    }

    #[must_use]
    pub fn id(&self) -> SongId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: SongId) {
        self.id = id;
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn set_length(&mut self, length: u16) {
        self.length = length.max(1);
        for channel in &mut self.channels {
            channel.resize(self.length);
        }
        if self.loop_point.is_some_and(|point| point >= self.length) {
            self.loop_point = None;
        }
    }

    #[must_use]
    pub fn loop_point(&self) -> Option<u16> {
        self.loop_point
    }

    pub fn set_loop_point(&mut self, loop_point: Option<u16>) -> bool {
        if loop_point.is_some_and(|point| point >= self.length) {
            return false;
        }
        self.loop_point = loop_point;
        true
    }

    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.channels.iter_mut()
    }

    #[must_use]
    pub fn channel(&self, kind: ChannelKind) -> Option<&Channel> {
        self.channels.iter().find(|channel| channel.kind == kind)
    }

    pub fn channel_mut(&mut self, kind: ChannelKind) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|channel| channel.kind == kind)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.channels.iter().flat_map(|channel| channel.patterns.iter())
    }

    pub fn patterns_mut(&mut self) -> impl Iterator<Item = &mut Pattern> {
        self.channels
            .iter_mut()
            .flat_map(|channel| channel.patterns.iter_mut())
    }

    #[must_use]
    pub fn pattern(&self, id: PatternId) -> Option<&Pattern> {
        self.patterns().find(|pattern| pattern.id == id)
    }

    pub fn pattern_mut(&mut self, id: PatternId) -> Option<&mut Pattern> {
        self.patterns_mut().find(|pattern| pattern.id == id)
    }

    #[must_use]
    pub fn pattern_ids(&self) -> Vec<PatternId> {
        self.patterns().map(Pattern::id).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns().all(Pattern::is_empty)
    }

    pub fn regenerate_channels(&mut self, expansion: ExpansionAudio, n163_channels: u8) {
        let mut previous = std::mem::take(&mut self.channels);
        self.channels = ChannelKind::active(expansion, n163_channels)
            .map(|kind| {
                previous
                    .iter()
                    .position(|channel| channel.kind == kind)
                    .map_or_else(
                        || Channel::new(kind, self.length),
                        |index| previous.swap_remove(index),
                    )
            })
            .collect();
    }

    pub fn serialize_state<B: ProjectBuffer>(&mut self, buffer: &mut B) -> Result<(), CodecError> {
        buffer.serialize_id(&mut self.id)?;
        buffer.serialize_string(&mut self.name)?;
        buffer.serialize_u16(&mut self.length)?;
        buffer.serialize_u16(&mut self.pattern_length)?;
        buffer.serialize_u8(&mut self.speed)?;
        buffer.serialize_u16(&mut self.tempo)?;

        // Revision 5 added loop points; older songs loop from the start.
        if buffer.version() >= 5 {
            let mut loop_point = self.loop_point.unwrap_or(NO_LOOP_POINT);
            buffer.serialize_u16(&mut loop_point)?;
            if buffer.is_reading() {
                self.loop_point = (loop_point != NO_LOOP_POINT).then_some(loop_point);
            }
        } else if buffer.is_reading() {
            self.loop_point = None;
        }

        buffer.serialize_list(&mut self.channels, |channel, buffer| {
            channel.serialize_state(buffer)
        })
    }
}
