pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod editor;
pub mod fingerprint;
pub mod fixtures;
pub mod ids;
pub mod instrument;
pub mod integrity;
pub mod library;
pub mod merge;
pub mod model;
pub mod persistence;
pub mod project;
pub mod registry;
pub mod sample;
pub mod snapshot;
pub mod undo;

pub use codec::{CURRENT_VERSION, CodecError, LoadBuffer, MIN_VERSION, ProjectBuffer, SaveBuffer};
pub use config::AppConfig;
pub use diagnostics::{TelemetryGuard, init_tracing, init_tracing_with_options};
pub use editor::{Editor, EditorError};
pub use fingerprint::{DocumentReport, generate_report};
pub use ids::{ArpeggioId, EntityId, IdAllocator, InstrumentId, PatternId, RawId, SampleId, SongId};
pub use instrument::{Arpeggio, Envelope, Instrument};
pub use integrity::IntegrityError;
pub use merge::{Diagnostic, MergeError, MergeReport};
pub use model::{
    Channel, ChannelKind, DPCM_NOTE_MAX, DPCM_NOTE_MIN, ExpansionAudio, MAX_NOTE_VOLUME,
    NATIVE_TEMPO, NOTE_INVALID, NOTE_STOP, Note, Pattern, Song, TempoMode,
};
pub use project::Project;
pub use sample::{DpcmSample, MAX_SAMPLE_PITCH, MAX_SAMPLE_SIZE, SampleMapping};
pub use undo::UndoHistory;
