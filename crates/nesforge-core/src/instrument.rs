use crate::{
    codec::{CodecError, ProjectBuffer, serialize_enum},
    ids::{ArpeggioId, InstrumentId},
    model::ExpansionAudio,
};

const NO_LOOP: u8 = u8::MAX;
const DEFAULT_N163_WAVE_SIZE: u8 = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub values: Vec<i8>,
    loop_point: Option<u8>,
}

impl Envelope {
    #[must_use]
    pub fn new(values: Vec<i8>) -> Self {
        Self {
            values,
            loop_point: None,
        }
    }

    #[must_use]
    pub fn loop_point(&self) -> Option<u8> {
        self.loop_point
    }

    pub fn set_loop_point(&mut self, loop_point: Option<u8>) -> bool {
        let in_range = |point: u8| point != NO_LOOP && usize::from(point) < self.values.len();
        if loop_point.is_some_and(|point| !in_range(point)) {
            return false;
        }
        self.loop_point = loop_point;
        true
    }

    pub fn serialize_state<B: ProjectBuffer>(&mut self, buffer: &mut B) -> Result<(), CodecError> {
        let mut loop_point = self.loop_point.unwrap_or(NO_LOOP);
        buffer.serialize_u8(&mut loop_point)?;
        if buffer.is_reading() {
            self.loop_point = (loop_point != NO_LOOP).then_some(loop_point);
        }
        buffer.serialize_list(&mut self.values, |value, buffer| buffer.serialize_i8(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    id: InstrumentId,
    name: String,
    expansion: ExpansionAudio,
    pub duty: u8,
    pub volume_envelope: Envelope,
    pub pitch_envelope: Envelope,
    pub vrc7_patch: u8,
    pub n163_wave_size: u8,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            id: InstrumentId::default(),
            name: String::new(),
            expansion: ExpansionAudio::None,
            duty: 0,
            volume_envelope: Envelope::default(),
            pitch_envelope: Envelope::default(),
            vrc7_patch: 0,
            n163_wave_size: DEFAULT_N163_WAVE_SIZE,
        }
    }
}

impl Instrument {
    #[must_use]
    pub fn new(id: InstrumentId, expansion: ExpansionAudio, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            expansion,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn id(&self) -> InstrumentId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: InstrumentId) {
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
    pub fn expansion(&self) -> ExpansionAudio {
        self.expansion
    }

    #[must_use]
    pub fn is_expansion_instrument(&self) -> bool {
        self.expansion != ExpansionAudio::None
    }

    pub fn serialize_state<B: ProjectBuffer>(&mut self, buffer: &mut B) -> Result<(), CodecError> {
        buffer.serialize_id(&mut self.id)?;
        buffer.serialize_string(&mut self.name)?;
        self.serialize_body(buffer)
    }

    /// Everything except identity. Also used to compare instrument content.
    pub(crate) fn serialize_body<B: ProjectBuffer>(
        &mut self,
        buffer: &mut B,
    ) -> Result<(), CodecError> {
        // Revision 4 introduced expansion instruments.
        if buffer.version() >= 4 {
            serialize_enum(
                buffer,
                &mut self.expansion,
                "instrument expansion",
                ExpansionAudio::raw,
                ExpansionAudio::from_raw,
            )?;
        }

        // Revision 5 added duty and per-expansion settings.
        if buffer.version() >= 5 {
            buffer.serialize_u8(&mut self.duty)?;
            match self.expansion {
                ExpansionAudio::Vrc7 => buffer.serialize_u8(&mut self.vrc7_patch)?,
                ExpansionAudio::N163 => buffer.serialize_u8(&mut self.n163_wave_size)?,
                _ => {}
            }
        }

        self.volume_envelope.serialize_state(buffer)?;
        self.pitch_envelope.serialize_state(buffer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arpeggio {
    id: ArpeggioId,
    name: String,
    pub envelope: Envelope,
}

impl Arpeggio {
    #[must_use]
    pub fn new(id: ArpeggioId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            envelope: Envelope::new(vec![0, 4, 7]),
        }
    }

    #[must_use]
    pub fn id(&self) -> ArpeggioId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: ArpeggioId) {
        self.id = id;
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn serialize_state<B: ProjectBuffer>(&mut self, buffer: &mut B) -> Result<(), CodecError> {
        buffer.serialize_id(&mut self.id)?;
        buffer.serialize_string(&mut self.name)?;
        self.envelope.serialize_state(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{LoadBuffer, SaveBuffer};

    #[test]
    fn revision_three_instruments_default_to_no_expansion() {
        let mut writer = SaveBuffer::new();
        let mut id = InstrumentId::new(120);
        let mut name = "Lead".to_string();
        let mut envelope = Envelope::new(vec![15, 12, 8]);
        writer.serialize_id(&mut id).expect("id");
        writer.serialize_string(&mut name).expect("name");
        envelope.serialize_state(&mut writer).expect("volume");
        Envelope::default()
            .serialize_state(&mut writer)
            .expect("pitch");
        let bytes = writer.into_bytes();

        let mut reader = LoadBuffer::new(&bytes, 3).expect("revision 3 is supported");
        let mut instrument = Instrument::default();
        instrument
            .serialize_state(&mut reader)
            .expect("revision 3 instrument should load");
        reader.finish().expect("no trailing bytes");

        assert_eq!(instrument.id(), InstrumentId::new(120));
        assert_eq!(instrument.expansion(), ExpansionAudio::None);
        assert_eq!(instrument.volume_envelope.values, vec![15, 12, 8]);
        assert_eq!(instrument.duty, 0);
    }
}
