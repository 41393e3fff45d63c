use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cubesync_core::link::sim::hex_dump;
use cubesync_core::{LinkConfig, Session, SimulatedCube, load_document};

fn main() -> ExitCode {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> Result<(), String> {
    let root = PathBuf::from("tests").join("golden");
    let entries =
        fs::read_dir(&root).map_err(|err| format!("failed to read {}: {}", root.display(), err))?;

    for entry in entries {
        let entry = entry.map_err(|err| format!("failed to read entry: {}", err))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let input = path.join("input.json");
        if !input.exists() {
            continue;
        }
        regenerate_one(&input, &path)?;
    }

    Ok(())
}

fn regenerate_one(input: &Path, dir: &Path) -> Result<(), String> {
    let doc = load_document(input)
        .map_err(|err| format!("failed to load {}: {}", input.display(), err))?;
    let config = LinkConfig::default();

    let cube = SimulatedCube::new();
    let mut session = Session::new(cube.clone(), &config)
        .map_err(|err| format!("failed to start session: {}", err))?;
    session
        .try_upload(&doc.animations)
        .map_err(|err| format!("upload failed for {}: {}", input.display(), err))?;
    write_transcript(&dir.join("expected_upload.txt"), &cube.host_bytes())?;

    let cube = SimulatedCube::with_animations(doc.animations);
    let mut session = Session::new(cube.clone(), &config)
        .map_err(|err| format!("failed to start session: {}", err))?;
    session
        .try_download()
        .map_err(|err| format!("download failed for {}: {}", input.display(), err))?;
    write_transcript(&dir.join("expected_download.txt"), &cube.host_bytes())?;
    Ok(())
}

fn write_transcript(path: &Path, bytes: &[u8]) -> Result<(), String> {
    fs::write(path, hex_dump(bytes))
        .map_err(|err| format!("failed to write {}: {}", path.display(), err))
}
