use nesforge_core::{MAX_SAMPLE_SIZE, Project, library};

#[test]
fn scanning_finds_dmc_files_recursively() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let nested = temp.path().join("drums");
    std::fs::create_dir_all(&nested).expect("create nested dir");
    std::fs::write(temp.path().join("bass.dmc"), [0x11; 16]).expect("write bass");
    std::fs::write(nested.join("Snare.DMC"), [0x22; 32]).expect("write snare");
    std::fs::write(nested.join("notes.txt"), b"not a sample").expect("write text");

    let entries = library::scan_dmc_files(temp.path()).expect("scan");
    let names: Vec<_> = entries.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(names, ["bass", "Snare"]);
    assert_eq!(entries[1].size_bytes, 32);
}

#[test]
fn scanning_a_missing_directory_creates_it() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let missing = temp.path().join("dpcm");

    let entries = library::scan_dmc_files(&missing).expect("scan");
    assert!(entries.is_empty());
    assert!(missing.is_dir());
}

#[test]
fn importing_reuses_identical_samples() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    std::fs::write(temp.path().join("kick.dmc"), [0xf0; 48]).expect("write kick");
    std::fs::write(temp.path().join("kick_copy.dmc"), [0xf0; 48]).expect("write copy");
    std::fs::write(temp.path().join("hat.dmc"), [0x0f; 20]).expect("write hat");

    let mut project = Project::new();
    let imported = library::import_directory(&mut project, temp.path()).expect("import");

    assert_eq!(imported.len(), 3);
    assert_eq!(project.samples().len(), 2);
    assert_eq!(imported[1], imported[2], "identical bytes map to one sample");
    assert!(project.sample_by_name("kick").is_some());
    assert!(project.sample_by_name("kick_copy").is_none());
}

#[test]
fn reimporting_a_changed_file_updates_the_sample() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let path = temp.path().join("tom.dmc");
    std::fs::write(&path, [0x01; 10]).expect("write tom");

    let mut project = Project::new();
    let first = library::import_dmc_file(&mut project, &path)
        .expect("import")
        .expect("fits");
    std::fs::write(&path, [0x02; 30]).expect("rewrite tom");
    let second = library::import_dmc_file(&mut project, &path)
        .expect("import")
        .expect("fits");

    assert_eq!(first, second);
    assert_eq!(
        project.sample(first).map(|sample| sample.data().len()),
        Some(30)
    );
}

#[test]
fn samples_beyond_the_budget_are_skipped() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    std::fs::write(temp.path().join("a_huge.dmc"), vec![0x5a; MAX_SAMPLE_SIZE]).expect("write");
    std::fs::write(temp.path().join("b_small.dmc"), [0x33; 8]).expect("write");

    let mut project = Project::new();
    let imported = library::import_directory(&mut project, temp.path()).expect("import");
    assert_eq!(imported.len(), 1);
    assert_eq!(project.total_sample_size(), MAX_SAMPLE_SIZE);
}

#[test]
fn unreadable_files_are_errors() {
    let mut project = Project::new();
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    assert!(library::import_dmc_file(&mut project, &temp.path().join("gone.dmc")).is_err());
}
