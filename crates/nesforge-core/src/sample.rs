use crate::{
    codec::{CodecError, ProjectBuffer},
    ids::SampleId,
};

pub const MAX_SAMPLE_SIZE: usize = 0x4000;
pub const SAMPLE_ALIGNMENT: usize = 64;
pub const SAMPLE_MAPPING_SLOTS: usize = 64;
pub const DEFAULT_SAMPLE_PITCH: u8 = 15;
pub const MAX_SAMPLE_PITCH: u8 = 15;
pub const SAMPLE_FILL_BYTE: u8 = 0x55;

#[must_use]
pub const fn padded_size(len: usize) -> usize {
    len.div_ceil(SAMPLE_ALIGNMENT) * SAMPLE_ALIGNMENT
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DpcmSample {
    id: SampleId,
    name: String,
    data: Vec<u8>,
    pub reverse_bits: bool,
}

impl DpcmSample {
    #[must_use]
    pub fn new(id: SampleId, name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id,
            name: name.into(),
            data,
            reverse_bits: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> SampleId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: SampleId) {
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
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    #[must_use]
    pub fn padded_len(&self) -> usize {
        padded_size(self.data.len())
    }

    #[must_use]
    pub fn data_with_reverse(&self) -> Vec<u8> {
        if self.reverse_bits {
            self.data.iter().map(|byte| byte.reverse_bits()).collect()
        } else {
            self.data.clone()
        }
    }

    pub fn serialize_state<B: ProjectBuffer>(&mut self, buffer: &mut B) -> Result<(), CodecError> {
        buffer.serialize_id(&mut self.id)?;
        buffer.serialize_string(&mut self.name)?;
        buffer.serialize_bytes(&mut self.data)?;

        // Revision 8 added bit reversal.
        if buffer.version() >= 8 {
            buffer.serialize_bool(&mut self.reverse_bits)?;
        } else if buffer.is_reading() {
            self.reverse_bits = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleMapping {
    pub sample: SampleId,
    pub pitch: u8,
    pub looping: bool,
}

impl Default for SampleMapping {
    fn default() -> Self {
        Self {
            sample: SampleId::default(),
            pitch: DEFAULT_SAMPLE_PITCH,
            looping: false,
        }
    }
}

impl SampleMapping {
    #[must_use]
    pub fn new(sample: SampleId, pitch: u8, looping: bool) -> Self {
        Self {
            sample,
            pitch,
            looping,
        }
    }

    pub fn serialize_state<B: ProjectBuffer>(&mut self, buffer: &mut B) -> Result<(), CodecError> {
        buffer.serialize_id(&mut self.sample)?;
        buffer.serialize_u8(&mut self.pitch)?;
        buffer.serialize_bool(&mut self.looping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_rounds_up_to_alignment() {
        assert_eq!(padded_size(0), 0);
        assert_eq!(padded_size(1), 64);
        assert_eq!(padded_size(64), 64);
        assert_eq!(padded_size(100), 128);
    }

    #[test]
    fn reversed_samples_flip_bit_order() {
        let mut sample = DpcmSample::new(SampleId::new(100), "Kick", vec![0b0000_0001, 0xf0]);
        sample.reverse_bits = true;
        assert_eq!(sample.data_with_reverse(), vec![0b1000_0000, 0x0f]);
    }
}
