use std::collections::HashSet;

use nesforge_core::{
    ChannelKind, ExpansionAudio, MergeError, Project, TempoMode,
    fixtures::{DEMO_KICK_NOTE, demo_project},
};

fn foreign_demo() -> Project {
    let mut foreign = demo_project();
    let song = foreign.songs()[0].id();
    assert!(foreign.rename_song(song, "Underworld"));
    foreign.create_song(Some("Overworld")).expect("colliding song");
    foreign
}

#[test]
fn colliding_songs_are_skipped_with_a_warning() {
    let mut host = demo_project();
    let report = host.merge_songs(foreign_demo()).expect("merge succeeds");

    assert_eq!(report.imported_songs.len(), 1);
    assert_eq!(host.songs().len(), 2);
    assert!(host.song_by_name("Underworld").is_some());
    assert!(
        report
            .warnings()
            .any(|warning| warning.contains("song named 'Overworld'"))
    );
}

#[test]
fn same_named_entities_are_aliased_to_the_host() {
    let mut host = demo_project();
    let host_lead = host
        .instrument_by_name("Pulse Lead")
        .map(|inst| inst.id())
        .expect("lead");
    let report = host.merge_songs(foreign_demo()).expect("merge succeeds");

    assert_eq!(report.aliased_instruments, 2);
    assert_eq!(report.aliased_arpeggios, 1);
    assert_eq!(report.aliased_samples, 1);
    assert_eq!(report.adopted_instruments, 0);
    assert_eq!(host.instruments().len(), 2);
    assert_eq!(host.samples().len(), 1);

    let imported = host.song_by_name("Underworld").expect("imported song");
    let used: HashSet<_> = imported
        .patterns()
        .flat_map(|pattern| pattern.notes().values())
        .filter_map(|note| note.instrument)
        .collect();
    assert!(used.contains(&host_lead));
    assert!(host.validate().is_ok());
}

#[test]
fn occupied_mapping_slots_keep_the_host_sample() {
    let mut host = demo_project();
    let host_kick = host.sample_mapping(DEMO_KICK_NOTE).copied().expect("mapped");

    let mut foreign = foreign_demo();
    let snare = foreign
        .create_or_update_sample("Snare", vec![0x33; 40])
        .expect("snare fits");
    foreign.unmap_sample(DEMO_KICK_NOTE);
    assert!(foreign.map_sample(DEMO_KICK_NOTE, snare, 12, false));

    let report = host.merge_songs(foreign).expect("merge succeeds");

    assert_eq!(host.sample_mapping(DEMO_KICK_NOTE).copied(), Some(host_kick));
    let expected = format!("already has a DPCM sample mapped at key {DEMO_KICK_NOTE}");
    assert!(report.warnings().any(|warning| warning.contains(&expected)));
    // The adopted snare is kept even though its slot was refused.
    assert_eq!(report.adopted_samples, 1);
    assert!(host.sample_by_name("Snare").is_some());
    assert!(host.validate().is_ok());
}

#[test]
fn free_mapping_slots_are_adopted() {
    let mut host = demo_project();
    let mut foreign = foreign_demo();
    assert!(foreign.transpose_dpcm_mapping(DEMO_KICK_NOTE, DEMO_KICK_NOTE + 5));

    host.merge_songs(foreign).expect("merge succeeds");

    let host_kick = host
        .sample_by_name("Kick")
        .map(|sample| sample.id())
        .expect("kick");
    let moved = host
        .sample_mapping(DEMO_KICK_NOTE + 5)
        .expect("slot adopted from the foreign document");
    assert_eq!(moved.sample, host_kick);
}

#[test]
fn every_song_colliding_fails_and_leaves_the_host_untouched() {
    let mut host = demo_project();
    let before = host.clone();

    let error = host
        .merge_songs(demo_project())
        .expect_err("only song collides");
    assert_eq!(error, MergeError::NoSongsToImport);
    assert_eq!(host, before);
    assert_eq!(host.next_id_watermark(), before.next_id_watermark());
}

#[test]
fn incompatible_configurations_are_rejected() {
    let mut host = demo_project();

    let mut vrc6 = foreign_demo();
    vrc6.set_expansion_audio(ExpansionAudio::Vrc6, 1);
    assert!(matches!(
        host.merge_songs(vrc6),
        Err(MergeError::IncompatibleExpansion { .. })
    ));

    let mut tracker = Project::new();
    assert!(tracker.set_tempo_mode(TempoMode::FamiTracker));
    tracker.create_song(Some("Tracker")).expect("song");
    assert!(matches!(
        host.merge_songs(tracker),
        Err(MergeError::TempoModeMismatch { .. })
    ));
}

#[test]
fn plain_songs_import_into_an_expansion_project() {
    let mut host = Project::with_default_content();
    host.set_expansion_audio(ExpansionAudio::Vrc6, 1);

    let report = host.merge_songs(foreign_demo()).expect("merge succeeds");
    let imported = host.song(report.imported_songs[0]).expect("imported");
    assert!(imported.channel(ChannelKind::Vrc6Saw).is_some());
    assert!(host.validate().is_ok());
}

#[test]
fn merged_ids_are_unique_and_below_the_watermark() {
    let mut host = demo_project();
    host.merge_songs(foreign_demo()).expect("merge succeeds");

    let ids: Vec<_> = host.all_entity_ids().collect();
    let unique: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
    let watermark = host.next_id_watermark();
    assert!(ids.iter().all(|id| *id < watermark));

    let fresh = host.generate_unique_id();
    assert!(!unique.contains(&fresh));
}
