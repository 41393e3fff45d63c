use std::fs;
use std::path::{Path, PathBuf};

use cubesync_core::link::sim::hex_dump;
use cubesync_core::{AnimationDocument, LinkConfig, Session, SimulatedCube, load_document};

fn case_dir(dir: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join(dir)
}

fn load_input(dir: &str) -> AnimationDocument {
    load_document(&case_dir(dir).join("input.json")).expect("load input.json")
}

fn read_expected(dir: &str, name: &str) -> String {
    fs::read_to_string(case_dir(dir).join(name)).expect("read expected transcript")
}

fn run_golden(dir: &str) {
    let doc = load_input(dir);

    let cube = SimulatedCube::new();
    let mut session = Session::new(cube.clone(), &LinkConfig::default()).expect("session");
    session.try_upload(&doc.animations).expect("upload");
    assert_eq!(
        hex_dump(&cube.host_bytes()),
        read_expected(dir, "expected_upload.txt"),
        "upload transcript mismatch in {dir}"
    );
    assert_eq!(cube.stored(), doc.animations);

    let cube = SimulatedCube::with_animations(doc.animations.clone());
    let mut session = Session::new(cube.clone(), &LinkConfig::default()).expect("session");
    let downloaded = session.try_download().expect("download");
    assert_eq!(
        hex_dump(&cube.host_bytes()),
        read_expected(dir, "expected_download.txt"),
        "download transcript mismatch in {dir}"
    );
    assert_eq!(downloaded, doc.animations);
}

#[test]
fn golden_two_animations() {
    run_golden("tests/golden/two_animations");
}

#[test]
fn golden_empty_set() {
    run_golden("tests/golden/empty_set");
}

#[test]
fn golden_patterns() {
    run_golden("tests/golden/patterns");
}

#[test]
fn golden_two_animations_has_empty_second_animation() {
    let doc = load_input("tests/golden/two_animations");
    assert_eq!(doc.animations.animation_count(), 2);
    assert!(doc.animations.animations()[1].is_empty());
}
