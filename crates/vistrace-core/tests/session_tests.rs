use std::{fs, path::Path};

use pretty_assertions::assert_eq;
use serde_json::json;

use vistrace_core::{
    artifact::TraceArtifact,
    reconstruct::{reconstruct, EntryKind},
    trace::{parse_log, read_log},
    RunSettings, TraceConfig, TraceSession, TransformError, VariableDescriptor, VistraceError,
};

fn write_project(root: &Path, files: &[(&str, &str)]) {
    for (name, text) in files {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }
}

#[test]
fn test_session_runs_libraries_then_entry() {
    let root = tempfile::tempdir().unwrap();
    write_project(
        root.path(),
        &[
            ("lib/util.vt", "fn bump(xs) {\n    xs[0] = xs[0] + 1;\n}\n"),
            ("main.vt", "a = [1, 2];\nbump(a);\nprint(a);\n"),
        ],
    );
    let output = root.path().join("out/trace.json");
    fs::create_dir_all(output.parent().unwrap()).unwrap();
    let mut settings = RunSettings::new(root.path(), "main.vt")
        .with_file("lib/util.vt")
        .watching(VariableDescriptor::new("a", "list"));
    settings.output = Some(output.clone());

    let outcome = TraceSession::default().run(&settings).unwrap();

    let artifact = &outcome.artifact;
    assert_eq!(artifact.header.version, 1);
    assert_eq!(
        artifact.header.annotated_variables["a"].abstract_type.as_deref(),
        Some("array")
    );
    let sources: Vec<_> = artifact.header.sources.keys().cloned().collect();
    assert_eq!(sources, vec!["lib/util.vt".to_string(), "main.vt".to_string()]);
    assert_eq!(artifact.header.sources["main.vt"][1], "bump(a);");

    let kinds: Vec<_> = artifact.body.iter().map(|entry| entry.operation).collect();
    assert_eq!(kinds, vec![EntryKind::Init, EntryKind::Write, EntryKind::Read]);
    assert_eq!(artifact.body[1].operation_body.value, json!(2));
    assert_eq!(artifact.body[2].operation_body.value, json!([2, 2]));

    assert_eq!(outcome.diagnostics.output, vec!["[2, 2]".to_string()]);
    assert!(outcome.diagnostics.program_fault.is_none());
    assert_eq!(outcome.diagnostics.passes.len(), 3);
    assert_eq!(TraceArtifact::read_from(&output).unwrap(), *artifact);

    // The originals are never rewritten
    assert_eq!(
        fs::read_to_string(root.path().join("main.vt")).unwrap(),
        "a = [1, 2];\nbump(a);\nprint(a);\n"
    );
}

#[test]
fn test_program_fault_keeps_partial_trace() {
    let root = tempfile::tempdir().unwrap();
    write_project(root.path(), &[("main.vt", "a = 1;\na = 2;\nb = a / 0;\na = 3;\n")]);
    let settings =
        RunSettings::new(root.path(), "main.vt").watching(VariableDescriptor::new("a", "int"));

    let outcome = TraceSession::default().run(&settings).unwrap();

    let values: Vec<_> = outcome
        .artifact
        .body
        .iter()
        .map(|entry| entry.operation_body.value.clone())
        .collect();
    assert_eq!(values, vec![json!(1), json!(2)]);
    let fault = outcome.diagnostics.program_fault.unwrap();
    assert_eq!(fault.line, 3);
    assert_eq!(fault.file, "main.vt");
    assert!(!fault.limit);
}

#[test]
fn test_step_limit_is_reported_as_limit_fault() {
    let root = tempfile::tempdir().unwrap();
    write_project(root.path(), &[("main.vt", "n = 0;\nwhile true {\n    n = n + 1;\n}\n")]);
    let settings =
        RunSettings::new(root.path(), "main.vt").watching(VariableDescriptor::new("n", "int"));
    let config = TraceConfig {
        max_steps: 50,
        ..TraceConfig::default()
    };

    let outcome = TraceSession::new(config).run(&settings).unwrap();

    assert!(outcome.diagnostics.program_fault.unwrap().limit);
    assert!(outcome.artifact.body.len() > 1);
    assert_eq!(outcome.artifact.body[0].operation, EntryKind::Init);
}

#[test]
fn test_transform_errors_abort_without_artifact() {
    let root = tempfile::tempdir().unwrap();
    write_project(root.path(), &[("main.vt", "a, b = [1, 2];\n")]);
    let output = root.path().join("trace.json");
    let mut settings =
        RunSettings::new(root.path(), "main.vt").watching(VariableDescriptor::new("a", "int"));
    settings.output = Some(output.clone());

    let err = TraceSession::default().run(&settings).unwrap_err();

    assert!(matches!(
        err,
        VistraceError::Transform(TransformError::UnsupportedAssignment { line: 1, .. })
    ));
    assert!(!output.exists());
}

#[test]
fn test_parse_error_names_the_failing_file() {
    let root = tempfile::tempdir().unwrap();
    write_project(root.path(), &[("lib.vt", "x = ;\n"), ("main.vt", "a = 1;\n")]);
    let settings = RunSettings::new(root.path(), "main.vt").with_file("lib.vt");

    let err = TraceSession::default().run(&settings).unwrap_err();

    assert!(matches!(
        err,
        VistraceError::Transform(TransformError::Parse { ref file, .. }) if file == "lib.vt"
    ));
}

#[test]
fn test_missing_file_is_an_environment_error() {
    let root = tempfile::tempdir().unwrap();
    let settings = RunSettings::new(root.path(), "main.vt");

    let err = TraceSession::default().run(&settings).unwrap_err();

    assert!(matches!(err, VistraceError::Environment(_)));
}

#[test]
fn test_kept_environment_holds_instrumented_source_and_log() {
    let root = tempfile::tempdir().unwrap();
    write_project(root.path(), &[("main.vt", "a = 1;\n")]);
    let settings =
        RunSettings::new(root.path(), "main.vt").watching(VariableDescriptor::new("a", "int"));
    let config = TraceConfig {
        keep_environment: true,
        embed_sources: false,
        ..TraceConfig::default()
    };

    let outcome = TraceSession::new(config).run(&settings).unwrap();

    let staged = outcome.diagnostics.staged_dir.clone().unwrap();
    let instrumented = fs::read_to_string(staged.join("main.vt")).unwrap();
    assert_eq!(instrumented, "a = __trace_write(1, store(a), 1, 1, 1);\n");
    let log = read_log(staged.join("trace.jsonl")).unwrap();
    assert_eq!(log.records.len(), 1);
    assert!(outcome.artifact.header.sources.is_empty());
    fs::remove_dir_all(staged).unwrap();
}

#[test]
fn test_settings_load_from_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    fs::write(
        &path,
        r#"{
            "rootDir": "project",
            "files": ["lib.vt"],
            "entry": "main.vt",
            "watch": [{"identifier": "grid", "rawType": "list", "attributes": {"rows": 3}}]
        }"#,
    )
    .unwrap();

    let settings = RunSettings::load(&path).unwrap();

    assert_eq!(settings.all_files().len(), 2);
    assert_eq!(settings.watch[0].attributes["rows"], json!(3));
    assert_eq!(settings.output, None);

    fs::write(&path, r#"{"rootDir": ".", "entry": "m.vt", "watch": [{"identifier": "a", "rawType": "int"}, {"identifier": "a", "rawType": "int"}]}"#).unwrap();
    assert!(matches!(RunSettings::load(&path), Err(VistraceError::Config(_))));
}

#[test]
fn test_truncated_log_still_reconstructs() {
    let text = concat!(
        r#"{"kind":"write","target":{"identifier":"a"},"value":1,"beginLine":1,"endLine":1}"#,
        "\n",
        r#"{"kind":"write","target":{"identifier":"a"},"value":2,"beginLine":2,"endLine":2}"#,
        "\n",
        r#"{"kind":"write","target":{"ident"#,
    );

    let log = parse_log(text);
    assert!(log.truncated);

    let result = reconstruct(&log.records, ["a"]);
    let kinds: Vec<_> = result.entries.iter().map(|entry| entry.operation).collect();
    assert_eq!(kinds, vec![EntryKind::Init, EntryKind::Write]);
}
