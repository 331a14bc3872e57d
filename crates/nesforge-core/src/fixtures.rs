use crate::{
    ids::{PatternId, SongId},
    model::{ChannelKind, DPCM_NOTE_MIN, ExpansionAudio, Note},
    project::Project,
};

pub const DEMO_KICK_NOTE: u8 = DPCM_NOTE_MIN + 24;

#[must_use]
pub fn demo_project() -> Project {
    let mut project = Project::new();
    project.name = "Nesforge Demo".to_string();
    project.author = "nesforge".to_string();
    project.copyright = "CC0".to_string();

    let song = project
        .create_song(Some("Overworld"))
        .expect("fixture song should be created");
    let lead = project
        .create_instrument(ExpansionAudio::None, Some("Pulse Lead"))
        .expect("fixture lead instrument should be created");
    let bass = project
        .create_instrument(ExpansionAudio::None, Some("Tri Bass"))
        .expect("fixture bass instrument should be created");
    let major = project
        .create_arpeggio(Some("Major"))
        .expect("fixture arpeggio should be created");
    let kick = project
        .create_or_update_sample("Kick", kick_drum())
        .expect("fixture sample should fit");
    assert!(project.map_sample(DEMO_KICK_NOTE, kick, 15, false));

    let melody = place_pattern(&mut project, song, ChannelKind::Square1, 0);
    let pattern = project.pattern_mut(melody).expect("melody pattern exists");
    for (time, value) in [(0, 49), (8, 52), (16, 56), (24, 54)] {
        pattern.set_note(time, Note::musical(value, Some(lead)));
    }
    pattern.set_note(
        32,
        Note {
            arpeggio: Some(major),
            volume: Some(12),
            ..Note::musical(49, Some(lead))
        },
    );
    pattern.set_note(48, Note::stop());

    let bassline = place_pattern(&mut project, song, ChannelKind::Triangle, 0);
    let pattern = project.pattern_mut(bassline).expect("bass pattern exists");
    for time in (0..64).step_by(16) {
        pattern.set_note(time, Note::musical(25, Some(bass)));
    }

    let drums = place_pattern(&mut project, song, ChannelKind::Dpcm, 0);
    let pattern = project.pattern_mut(drums).expect("drum pattern exists");
    for time in (0..64).step_by(8) {
        pattern.set_note(time, Note::musical(DEMO_KICK_NOTE, None));
    }

    project
}

fn place_pattern(
    project: &mut Project,
    song: SongId,
    kind: ChannelKind,
    position: u16,
) -> PatternId {
    let pattern = project
        .create_pattern(song, kind, None)
        .expect("fixture pattern should be created");
    assert!(project.set_pattern_instance(song, kind, position, Some(pattern)));
    pattern
}

fn kick_drum() -> Vec<u8> {
    (0_u8..72).map(|i| if i < 36 { 0xff } else { 0x0f }).collect()
}
