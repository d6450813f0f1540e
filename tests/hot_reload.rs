use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

use gshader::{DynamicShader, LoadError, Mailbox, NagaGlslBackend, UnitState};
use tempfile::tempdir;

const ENTRY: &str = r#"#version 450
#include "noise.glsl"
layout(location = 0) in vec2 fragCoord;
layout(location = 0) out vec4 outColor;
void main() {
    outColor = vec4(vec3(noise(fragCoord)), 1.0);
}
"#;

const NOISE: &str = "float noise(vec2 p) {\n    return fract(sin(dot(p, vec2(12.9898, 78.233))) * 43758.5453);\n}\n";

const BROKEN_NOISE: &str = "float noise(vec2 p) {\n    return fract(sin(dot(p, vec2(12.9898, 78.233))) * );\n}\n";

fn rewrite(path: &Path, contents: &str, offset_secs: u64) {
    fs::write(path, contents).expect("shader should write");
    File::options()
        .write(true)
        .open(path)
        .expect("shader should open")
        .set_modified(SystemTime::now() + Duration::from_secs(offset_secs))
        .expect("mtime should update");
}

fn ready_shader() -> DynamicShader<NagaGlslBackend> {
    let mut shader = DynamicShader::new(NagaGlslBackend::new());
    shader.initialize().expect("passthrough vertex shader should compile");
    shader
}

#[test]
fn broken_include_keeps_previous_program_until_fixed() {
    let dir = tempdir().expect("tempdir should create");
    let entry = dir.path().join("main.glsl");
    let noise = dir.path().join("noise.glsl");
    fs::write(&entry, ENTRY).expect("entry should write");
    fs::write(&noise, NOISE).expect("include should write");

    let mut shader = ready_shader();
    let mut mailbox = Mailbox::new();
    shader.load(&entry, &mut mailbox).expect("first load should succeed");
    assert_eq!(shader.state(), UnitState::Compiled);
    assert!(mailbox.is_empty());
    assert!(!shader.was_updated());

    rewrite(&noise, BROKEN_NOISE, 30);
    assert!(shader.was_updated());

    let error = shader.reload(&mut mailbox).expect_err("broken include should fail");
    assert!(matches!(error, LoadError::Compile { .. }), "{error:?}");
    assert!(shader.has_failed());
    assert!(shader.program().is_some(), "last good program stays active");

    let report = shader.last_report().expect("compile failure should keep a report");
    assert!(report.text.starts_with("Shader compilation error"));
    assert!(
        report
            .diagnostics
            .iter()
            .any(|diagnostic| diagnostic.display == "noise.glsl" && diagnostic.local_line == 2),
        "{}",
        report.text
    );
    assert_eq!(mailbox.errors().count(), 1);

    rewrite(&noise, NOISE, 60);
    mailbox.clear();
    shader.reload(&mut mailbox).expect("fixed include should reload");
    assert_eq!(shader.state(), UnitState::Compiled);
    assert!(shader.last_report().is_none());
    assert!(mailbox.is_empty());
}

#[test]
fn unrelated_file_changes_do_not_mark_the_unit_stale() {
    let dir = tempdir().expect("tempdir should create");
    let entry = dir.path().join("main.glsl");
    let unrelated = dir.path().join("unused.glsl");
    fs::write(&entry, ENTRY).expect("entry should write");
    fs::write(dir.path().join("noise.glsl"), NOISE).expect("include should write");
    fs::write(&unrelated, "float unused;\n").expect("unrelated should write");

    let mut shader = ready_shader();
    let mut mailbox = Mailbox::new();
    shader.load(&entry, &mut mailbox).expect("load should succeed");

    rewrite(&unrelated, "float still_unused;\n", 30);
    assert!(!shader.was_updated());
    assert_eq!(shader.watched_files().count(), 2);
}
