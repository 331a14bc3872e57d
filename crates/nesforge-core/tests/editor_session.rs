use nesforge_core::{
    AppConfig, ChannelKind, Editor, EditorError, ExpansionAudio, InstrumentId, MAX_NOTE_VOLUME,
    Note, Project, TempoMode, fixtures::demo_project, snapshot,
};

fn undo_state(project: &Project) -> Vec<u8> {
    let mut copy = project.clone();
    snapshot::capture_undo(&mut copy).expect("capture")
}

#[test]
fn undo_and_redo_restore_identical_states() {
    let mut editor = Editor::new(demo_project());
    let original = undo_state(editor.project());

    let song = editor.create_song(Some("Boss")).expect("create song");
    let pattern = editor
        .create_pattern(song, ChannelKind::Noise, None)
        .expect("create pattern");
    editor
        .set_note(pattern, 4, Note::musical(9, None))
        .expect("set note");
    let edited = undo_state(editor.project());

    assert!(editor.undo().expect("undo note"));
    assert!(editor.undo().expect("undo pattern"));
    assert!(editor.undo().expect("undo song"));
    assert_eq!(undo_state(editor.project()), original);
    assert!(!editor.undo().expect("nothing left"));

    for _ in 0..3 {
        assert!(editor.redo().expect("redo"));
    }
    assert_eq!(undo_state(editor.project()), edited);
    assert!(!editor.history().can_redo());
}

#[test]
fn ids_are_not_reissued_after_undo() {
    let mut editor = Editor::new(Project::with_default_content());
    let first = editor.create_arpeggio(None).expect("arpeggio");
    editor.undo().expect("undo");
    let second = editor.create_arpeggio(None).expect("arpeggio");
    assert_ne!(first, second);
    assert!(editor.project().arpeggio(first).is_none());
}

#[test]
fn a_new_edit_discards_redo_history() {
    let mut editor = Editor::new(Project::with_default_content());
    editor.create_song(Some("A")).expect("song");
    editor.undo().expect("undo");
    assert!(editor.history().can_redo());

    editor.create_song(Some("B")).expect("song");
    assert!(!editor.history().can_redo());
}

#[test]
fn failed_edits_roll_back_and_record_nothing() {
    let mut editor = Editor::new(demo_project());
    let before = undo_state(editor.project());
    let undo_len = editor.history().undo_len();

    let pattern = editor.project().songs()[0]
        .patterns()
        .next()
        .map(|pattern| pattern.id())
        .expect("demo pattern");
    let missing = InstrumentId::new(u32::MAX - 1);
    let error = editor
        .set_note(pattern, 2, Note::musical(30, Some(missing)))
        .expect_err("dangling instrument");
    assert!(matches!(error, EditorError::Rejected(_)));

    let error = editor
        .transact("partial edit", |project| {
            project.name = "Half done".to_string();
            Err::<(), _>(EditorError::Rejected("abandoned"))
        })
        .expect_err("edit fails");
    assert!(matches!(error, EditorError::Rejected("abandoned")));

    assert_eq!(undo_state(editor.project()), before);
    assert_eq!(editor.history().undo_len(), undo_len);
}

#[test]
fn notes_louder_than_the_volume_range_are_rejected() {
    let mut editor = Editor::new(demo_project());
    let pattern = editor.project().songs()[0]
        .patterns()
        .next()
        .map(|pattern| pattern.id())
        .expect("demo pattern");
    let undo_len = editor.history().undo_len();

    let too_loud = Note {
        volume: Some(MAX_NOTE_VOLUME + 1),
        ..Note::musical(30, None)
    };
    let error = editor.set_note(pattern, 2, too_loud).expect_err("volume 16");
    assert!(matches!(error, EditorError::Rejected(_)));
    assert_eq!(editor.history().undo_len(), undo_len);

    let loudest = Note {
        volume: Some(MAX_NOTE_VOLUME),
        ..Note::musical(30, None)
    };
    editor.set_note(pattern, 2, loudest).expect("volume 15");
}

#[test]
fn undo_depth_follows_configuration() {
    let config = AppConfig::from_toml_str("[undo]\nmax_depth = 2\n").expect("config");
    let mut editor = Editor::from_config(&config);
    for name in ["A", "B", "C", "D"] {
        editor.create_song(Some(name)).expect("song");
    }
    assert_eq!(editor.history().undo_len(), 2);
}

#[test]
fn duplicates_are_undoable() {
    let mut editor = Editor::new(demo_project());
    let lead = editor
        .project()
        .instrument_by_name("Pulse Lead")
        .map(|inst| inst.id())
        .expect("lead");
    let copy = editor.duplicate_instrument(lead).expect("duplicate");
    assert_eq!(
        editor.project().instrument(copy).map(|inst| inst.name().to_string()),
        Some("Pulse Lead (copy)".to_string())
    );

    editor.undo().expect("undo");
    assert!(editor.project().instrument(copy).is_none());
}

#[test]
fn merges_are_undoable() {
    let mut editor = Editor::new(demo_project());
    let mut foreign = demo_project();
    let song = foreign.songs()[0].id();
    assert!(foreign.rename_song(song, "Imported"));

    let report = editor.merge_from(foreign).expect("merge");
    assert_eq!(report.imported_songs.len(), 1);
    assert_eq!(editor.project().songs().len(), 2);

    editor.undo().expect("undo");
    assert_eq!(editor.project().songs().len(), 1);
}

#[test]
fn failed_merges_surface_as_merge_errors() {
    let mut editor = Editor::new(demo_project());
    let error = editor.merge_from(demo_project()).expect_err("collision");
    assert!(matches!(error, EditorError::Merge(_)));
    assert!(!editor.history().can_undo());
}

#[test]
fn tempo_conversions_are_undoable() {
    let mut editor = Editor::new(demo_project());
    editor
        .convert_tempo(TempoMode::FamiTracker, true)
        .expect("convert");
    assert_eq!(editor.project().tempo_mode(), TempoMode::FamiTracker);

    let error = editor
        .convert_tempo(TempoMode::FamiTracker, true)
        .expect_err("already famitracker");
    assert!(matches!(error, EditorError::Rejected(_)));

    editor.undo().expect("undo");
    assert_eq!(editor.project().tempo_mode(), TempoMode::FamiStudio);
}

#[test]
fn expansion_changes_are_undoable() {
    let mut editor = Editor::new(demo_project());
    editor
        .set_expansion_audio(ExpansionAudio::Vrc7, 1)
        .expect("expansion");
    assert_eq!(editor.project().expansion_audio(), ExpansionAudio::Vrc7);

    editor.undo().expect("undo");
    assert_eq!(editor.project().expansion_audio(), ExpansionAudio::None);
    assert!(
        editor.project().songs()[0]
            .channel(ChannelKind::Vrc7Fm1)
            .is_none()
    );
}

#[test]
fn sessions_save_load_and_autosave() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let path = temp.path().join("session.nesf");
    let autosave_dir = temp.path().join("autosave");

    let mut editor = Editor::new(demo_project());
    editor.create_song(Some("Extra")).expect("song");
    editor.save_project(&path).expect("save");

    let autosave = editor.autosave(&autosave_dir).expect("autosave");
    assert_eq!(
        autosave.file_name().and_then(|name| name.to_str()),
        Some("Nesforge_Demo.autosave.nesf")
    );
    assert_eq!(editor.project().filename, path.display().to_string());

    let mut reopened = Editor::default();
    let project = reopened.load_project(&path).expect("load");
    assert_eq!(project.songs().len(), 2);
    assert!(!reopened.history().can_undo());

    let missing = reopened
        .load_project(&temp.path().join("missing.nesf"))
        .expect_err("missing file");
    assert!(matches!(missing, EditorError::Io(_)));
}
