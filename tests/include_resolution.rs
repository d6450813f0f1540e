use std::fs;
use std::path::{Path, PathBuf};

use gshader::line_index::Attribution;
use gshader::remap::ParenLineFormat;
use gshader::{remap, resolve, IncludeLimits};
use tempfile::tempdir;

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent dir should create");
    }
    fs::write(&path, contents).expect("shader should write");
    path
}

fn numbered(prefix: &str, count: usize) -> String {
    (1..=count)
        .map(|line| format!("{prefix} line {line}\n"))
        .collect()
}

/// Every owned flattened line must equal the source line it claims to be.
fn assert_provenance_round_trips(entry: &Path) {
    let resolved = resolve(entry, IncludeLimits::default()).expect("resolve should succeed");
    for record in resolved.records.iter() {
        let source = fs::read_to_string(&record.path).expect("source should read");
        let source_lines = source.lines().collect::<Vec<_>>();
        for segment in &record.segments {
            for line in segment.start..=segment.end {
                let located = resolved.records.locate(line).expect("owned line should locate");
                assert_eq!(located.record.path, record.path);
                let local = located.local_line as usize;
                assert_eq!(
                    resolved.unit.line(line),
                    Some(source_lines[local - 1]),
                    "flattened line {line} should be {}:{local}",
                    record.display
                );
            }
        }
    }
}

#[test]
fn line_count_is_own_lines_plus_one_per_repeat_include() {
    let dir = tempdir().expect("tempdir should create");
    let entry = write(
        dir.path(),
        "main.glsl",
        "#version 450\n#include \"a.glsl\"\n#include \"b.glsl\"\n#include \"a.glsl\"\nvoid main() {}\n",
    );
    write(dir.path(), "a.glsl", "#include \"util/common.glsl\"\nfloat a;\n");
    write(dir.path(), "b.glsl", "#include \"util/common.glsl\"\nfloat b1;\nfloat b2;\n");
    write(dir.path(), "util/common.glsl", &numbered("common", 4));

    let resolved = resolve(&entry, IncludeLimits::default()).expect("resolve should succeed");

    let own_lines: u32 = resolved
        .records
        .iter()
        .map(|record| record.contributed_lines())
        .sum();
    // main 2 + a 1 + b 2 + common 4, repeats: common from b, a from main
    assert_eq!(own_lines, 9);
    assert_eq!(resolved.records.placeholders().len(), 2);
    assert_eq!(resolved.unit.line_count(), 11);
    assert_eq!(resolved.records.total_lines(), 11);
    assert_provenance_round_trips(&entry);
}

#[test]
fn shared_include_is_expanded_once_with_one_record() {
    let dir = tempdir().expect("tempdir should create");
    let entry = write(
        dir.path(),
        "main.glsl",
        "#include \"left.glsl\"\n#include \"right.glsl\"\n",
    );
    write(dir.path(), "left.glsl", "#include \"shared.glsl\"\nleft\n");
    write(dir.path(), "right.glsl", "#include \"shared.glsl\"\nright\n");
    write(dir.path(), "shared.glsl", &numbered("shared", 3));

    let resolved = resolve(&entry, IncludeLimits::default()).expect("resolve should succeed");
    let shared_records = resolved
        .records
        .iter()
        .filter(|record| record.path.ends_with("shared.glsl"))
        .count();
    assert_eq!(shared_records, 1);
    assert_eq!(
        resolved.unit.lines(),
        [
            "shared line 1",
            "shared line 2",
            "shared line 3",
            "left",
            "",
            "right"
        ]
    );

    match resolved.records.attribute(5) {
        Attribution::Enclosing(located) => {
            assert_eq!(located.record.display, "right.glsl");
            assert_eq!(located.local_line, 1);
        }
        other => panic!("placeholder should attribute to right.glsl, got {other:?}"),
    }
}

#[test]
fn three_file_cycle_terminates() {
    let dir = tempdir().expect("tempdir should create");
    let entry = write(dir.path(), "a.glsl", "#include \"b.glsl\"\na\n");
    write(dir.path(), "b.glsl", "#include \"c.glsl\"\nb\n");
    write(dir.path(), "c.glsl", "#include \"a.glsl\"\nc\n");

    let resolved = resolve(&entry, IncludeLimits::default()).expect("resolve should succeed");
    assert_eq!(resolved.unit.lines(), ["", "c", "b", "a"]);
    assert_eq!(resolved.records.len(), 3);
}

#[test]
fn ten_line_file_maps_back_at_any_depth() {
    let dir = tempdir().expect("tempdir should create");
    let entry = write(
        dir.path(),
        "main.glsl",
        "top\n#include \"one/one.glsl\"\nbottom\n",
    );
    write(dir.path(), "one/one.glsl", "one\n#include \"two/two.glsl\"\n");
    write(dir.path(), "one/two/two.glsl", "two\n#include \"../../ten.glsl\"\ntwo after\n");
    write(dir.path(), "ten.glsl", &numbered("ten", 10));

    let resolved = resolve(&entry, IncludeLimits::default()).expect("resolve should succeed");
    let ten = resolved
        .records
        .iter()
        .find(|record| record.display == "ten.glsl")
        .expect("ten.glsl should be recorded");
    let span = ten.span().expect("ten.glsl should own lines");
    assert_eq!(span.end - span.start + 1, 10);

    let locals = (span.start..=span.end)
        .map(|line| resolved.records.locate(line).expect("line should locate").local_line)
        .collect::<Vec<_>>();
    assert_eq!(locals, (1..=10).collect::<Vec<_>>());

    let bottom = resolved
        .records
        .locate(resolved.records.total_lines())
        .expect("last line should locate");
    assert_eq!(bottom.record.display, "main.glsl");
    assert_eq!(bottom.local_line, 3);

    assert_provenance_round_trips(&entry);
}

#[test]
fn remaps_backend_line_to_included_file() {
    let dir = tempdir().expect("tempdir should create");
    let entry = write(dir.path(), "main.glsl", "#include \"lib.glsl\"\nvoid main() {}\n");
    write(dir.path(), "lib.glsl", "\nfloat broken = ;\nfloat fine;\n");

    let resolved = resolve(&entry, IncludeLimits::default()).expect("resolve should succeed");
    let report = remap(
        "(2) : error, bad syntax",
        &resolved.records,
        &ParenLineFormat,
    );

    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].display, "lib.glsl");
    assert_eq!(report.diagnostics[0].local_line, 2);
    assert!(report.text.ends_with("\nlib.glsl => 2 : error, bad syntax"));
}
