use tracing::{debug, info, instrument};

use crate::{
    codec::{CURRENT_VERSION, CodecError, LoadBuffer, ProjectBuffer, SaveBuffer},
    ids::{ArpeggioId, InstrumentId, RawId, SongId},
    instrument::{Arpeggio, Instrument},
    model::Song,
    project::Project,
    registry::unique_copy_name,
};

#[instrument(skip_all, fields(songs = project.songs().len()))]
pub fn save(project: &mut Project) -> Result<Vec<u8>, CodecError> {
    let mut buffer = SaveBuffer::new();
    project.serialize_state(&mut buffer)?;
    let bytes = buffer.into_bytes();
    debug!(bytes = bytes.len(), "project encoded");
    Ok(bytes)
}

#[instrument(skip(bytes), fields(len = bytes.len()))]
pub fn load(bytes: &[u8], version: u32) -> Result<Project, CodecError> {
    let mut buffer = LoadBuffer::new(bytes, version)?;
    let mut project = Project::new();
    project.serialize_state(&mut buffer)?;
    buffer.finish()?;
    project
        .validate()
        .map_err(|err| CodecError::Integrity(err.to_string()))?;
    info!(
        songs = project.songs().len(),
        instruments = project.instruments().len(),
        "project decoded"
    );
    Ok(project)
}

pub fn deep_clone(project: &mut Project) -> Result<Project, CodecError> {
    let bytes = save(project)?;
    let mut clone = load(&bytes, CURRENT_VERSION)?;
    clone.filename.clone_from(&project.filename);
    Ok(clone)
}

/// Undo/redo state. The watermark is left out; restoring keeps the live
/// allocator so ids are never handed out twice.
pub fn capture_undo(project: &mut Project) -> Result<Vec<u8>, CodecError> {
    let mut buffer = SaveBuffer::for_undo_redo();
    project.serialize_state(&mut buffer)?;
    Ok(buffer.into_bytes())
}

pub fn restore_undo(project: &mut Project, bytes: &[u8]) -> Result<(), CodecError> {
    let mut restored = Project {
        allocator: project.allocator.clone(),
        filename: project.filename.clone(),
        ..Project::new()
    };
    let mut buffer = LoadBuffer::for_undo_redo(bytes);
    restored.serialize_state(&mut buffer)?;
    buffer.finish()?;

    *project = restored;
    project.debug_validate("undo restore");
    Ok(())
}

trait Subtree: Default {
    fn visit<B: ProjectBuffer>(&mut self, buffer: &mut B) -> Result<(), CodecError>;
}

impl Subtree for Song {
    fn visit<B: ProjectBuffer>(&mut self, buffer: &mut B) -> Result<(), CodecError> {
        self.serialize_state(buffer)
    }
}

impl Subtree for Instrument {
    fn visit<B: ProjectBuffer>(&mut self, buffer: &mut B) -> Result<(), CodecError> {
        self.serialize_state(buffer)
    }
}

impl Subtree for Arpeggio {
    fn visit<B: ProjectBuffer>(&mut self, buffer: &mut B) -> Result<(), CodecError> {
        self.serialize_state(buffer)
    }
}

fn reencode<T: Subtree>(source: &mut T, remap: &[(RawId, RawId)]) -> Result<T, CodecError> {
    let mut save = SaveBuffer::for_undo_redo();
    source.visit(&mut save)?;
    let bytes = save.into_bytes();

    let mut load = LoadBuffer::for_undo_redo(&bytes);
    for (old, new) in remap {
        load.remap_id(*old, *new);
    }
    let mut copy = T::default();
    copy.visit(&mut load)?;
    load.finish()?;
    Ok(copy)
}

impl Project {
    #[instrument(skip(self))]
    pub fn duplicate_song(&mut self, id: SongId) -> Result<Option<SongId>, CodecError> {
        let Some(pattern_ids) = self.song(id).map(Song::pattern_ids) else {
            return Ok(None);
        };

        let new_id: SongId = self.allocator.allocate();
        let mut remap = vec![(id.get(), new_id.get())];
        remap.extend(
            pattern_ids
                .into_iter()
                .map(|pattern| (pattern.get(), self.allocator.next_id())),
        );

        let name = self.generate_unique_song_name();
        let Some(source) = self.song_mut(id) else {
            return Ok(None);
        };
        let mut copy = reencode(source, &remap)?;
        copy.set_name(name);

        self.songs.push(copy);
        self.sort_songs();
        self.debug_validate("duplicate song");
        info!(source = %id, copy = %new_id, "song duplicated");
        Ok(Some(new_id))
    }

    #[instrument(skip(self))]
    pub fn duplicate_instrument(
        &mut self,
        id: InstrumentId,
    ) -> Result<Option<InstrumentId>, CodecError> {
        let Some(base) = self.instrument(id).map(|inst| inst.name().to_string()) else {
            return Ok(None);
        };
        let name = unique_copy_name(&base, |name| !self.is_instrument_name_unique(name));

        let new_id: InstrumentId = self.allocator.allocate();
        let Some(source) = self.instrument_mut(id) else {
            return Ok(None);
        };
        let mut copy = reencode(source, &[(id.get(), new_id.get())])?;
        copy.set_name(name);

        self.instruments.push(copy);
        self.sort_instruments();
        self.debug_validate("duplicate instrument");
        Ok(Some(new_id))
    }

    #[instrument(skip(self))]
    pub fn duplicate_arpeggio(&mut self, id: ArpeggioId) -> Result<Option<ArpeggioId>, CodecError> {
        let Some(base) = self.arpeggio(id).map(|arp| arp.name().to_string()) else {
            return Ok(None);
        };
        let name = unique_copy_name(&base, |name| !self.is_arpeggio_name_unique(name));

        let new_id: ArpeggioId = self.allocator.allocate();
        let Some(source) = self.arpeggio_mut(id) else {
            return Ok(None);
        };
        let mut copy = reencode(source, &[(id.get(), new_id.get())])?;
        copy.set_name(name);

        self.arpeggios.push(copy);
        self.sort_arpeggios();
        self.debug_validate("duplicate arpeggio");
        Ok(Some(new_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ids::PatternId,
        model::{ChannelKind, Note},
    };

    #[test]
    fn deep_clone_is_equal_and_independent() {
        let mut project = Project::with_default_content();
        project.name = "Cave".to_string();
        let mut clone = deep_clone(&mut project).expect("clone");
        assert_eq!(clone, project);

        let _ = clone.create_song(Some("Extra"));
        assert_eq!(project.songs().len(), 1);
    }

    #[test]
    fn restore_undo_keeps_the_live_allocator() {
        let mut project = Project::with_default_content();
        let before = capture_undo(&mut project).expect("capture");
        let song = project.create_song(None).expect("song");

        restore_undo(&mut project, &before).expect("restore");
        assert!(project.song(song).is_none());
        assert!(project.next_id_watermark() > song.get());
    }

    #[test]
    fn failed_restore_leaves_project_untouched() {
        let mut project = Project::with_default_content();
        let expected = project.clone();
        let err = restore_undo(&mut project, &[1, 2, 3]).expect_err("garbage is rejected");
        assert!(matches!(err, CodecError::UnexpectedEof { .. }));
        assert_eq!(project, expected);
    }

    #[test]
    fn duplicated_song_owns_fresh_pattern_ids() {
        let mut project = Project::with_default_content();
        let song = project.songs()[0].id();
        let pattern = project
            .create_pattern(song, ChannelKind::Triangle, None)
            .expect("pattern");
        assert!(project.set_pattern_instance(song, ChannelKind::Triangle, 2, Some(pattern)));
        project
            .pattern_mut(pattern)
            .expect("pattern")
            .set_note(3, Note::musical(50, None));

        let copy = project
            .duplicate_song(song)
            .expect("duplicate")
            .expect("song exists");
        let copied = project.song(copy).expect("copy present");
        let new_patterns = copied.pattern_ids();

        assert_eq!(copied.name(), "Song 2");
        assert_eq!(new_patterns.len(), 1);
        assert_ne!(new_patterns[0], pattern);
        assert_eq!(
            copied
                .channel(ChannelKind::Triangle)
                .and_then(|channel| channel.instances()[2]),
            Some(new_patterns[0])
        );
        assert!(project.validate().is_ok());

        project
            .pattern_mut(new_patterns[0])
            .expect("copied pattern")
            .set_note(3, Note::stop());
        let original: Option<PatternId> = project.pattern(pattern).map(|p| p.id());
        assert_eq!(original, Some(pattern));
        assert_eq!(
            project.pattern(pattern).and_then(|p| p.note(3)).map(|n| n.value),
            Some(50)
        );
    }

    #[test]
    fn duplicated_instrument_gets_a_copy_name() {
        let mut project = Project::with_default_content();
        let source = project.instruments()[0].id();
        let copy = project
            .duplicate_instrument(source)
            .expect("duplicate")
            .expect("instrument exists");
        assert_eq!(
            project.instrument(copy).map(Instrument::name),
            Some("Instrument 1 (copy)")
        );
        assert!(project.duplicate_instrument(InstrumentId::new(9999)).expect("ok").is_none());
    }
}
