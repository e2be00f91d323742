use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use vistrace_core::{
    artifact::{Assembler, TypeTable},
    init_tracing,
    instrument::{Instrumenter, TransformationContext},
    parse_program,
    reconstruct::Reconstructor,
    trace::read_log,
    RunSettings, ToSource, TraceConfig, TraceSession, VariableDescriptor,
};

fn watch_arg() -> Arg {
    Arg::new("watch")
        .long("watch")
        .short('w')
        .value_name("NAME[:TYPE[:ABSTRACT]]")
        .help("Variable to observe (repeatable)")
        .action(ArgAction::Append)
        .value_parser(|s: &str| s.parse::<VariableDescriptor>())
}

fn output_arg() -> Arg {
    Arg::new("output")
        .long("output")
        .short('o')
        .value_name("FILE")
        .help("Write the artifact here instead of stdout")
        .value_parser(clap::value_parser!(PathBuf))
}

fn build_cli() -> Command {
    Command::new("vistrace")
        .version(vistrace_core::VERSION)
        .about("Instrument scripts and trace reads and writes of chosen variables")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Stage, instrument and run a script, then emit the trace artifact")
                .arg(
                    Arg::new("settings")
                        .long("settings")
                        .value_name("FILE")
                        .help("JSON run settings")
                        .value_parser(clap::value_parser!(PathBuf))
                        .conflicts_with_all(["root", "entry", "file"]),
                )
                .arg(
                    Arg::new("root")
                        .long("root")
                        .value_name("DIR")
                        .help("Project root directory")
                        .default_value(".")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("entry")
                        .long("entry")
                        .value_name("FILE")
                        .help("Entry script, relative to the root")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("file")
                        .long("file")
                        .value_name("FILE")
                        .help("Additional script run before the entry (repeatable)")
                        .action(ArgAction::Append)
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(watch_arg())
                .arg(output_arg())
                .arg(
                    Arg::new("max-steps")
                        .long("max-steps")
                        .value_name("N")
                        .help("Statement budget for the target program")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("no-sources")
                        .long("no-sources")
                        .help("Do not embed source text in the artifact")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("keep")
                        .long("keep")
                        .help("Keep the staged directory")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("instrument")
                .about("Print the instrumented form of a script")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .required(true)
                        .index(1)
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(watch_arg()),
        )
        .subcommand(
            Command::new("reconstruct")
                .about("Replay a raw JSON-lines log into a trace artifact")
                .arg(
                    Arg::new("log")
                        .value_name("LOG")
                        .required(true)
                        .index(1)
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(watch_arg())
                .arg(output_arg()),
        )
}

fn watched(matches: &ArgMatches) -> Vec<VariableDescriptor> {
    matches
        .get_many::<VariableDescriptor>("watch")
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn run_settings(matches: &ArgMatches) -> Result<RunSettings> {
    let mut settings = match matches.get_one::<PathBuf>("settings") {
        Some(path) => RunSettings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => {
            let Some(entry) = matches.get_one::<PathBuf>("entry") else {
                bail!("either --settings or --entry is required");
            };
            let root = matches
                .get_one::<PathBuf>("root")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("."));
            let mut settings = RunSettings::new(root, entry.clone());
            if let Some(files) = matches.get_many::<PathBuf>("file") {
                settings.files.extend(files.cloned());
            }
            settings
        }
    };
    // Flags add to whatever the settings file declared
    for descriptor in watched(matches) {
        settings.watch.retain(|d| d.identifier != descriptor.identifier);
        settings.watch.push(descriptor);
    }
    if let Some(output) = matches.get_one::<PathBuf>("output") {
        settings.output = Some(output.clone());
    }
    Ok(settings)
}

fn run(matches: &ArgMatches) -> Result<()> {
    let settings = run_settings(matches)?;
    let mut config = TraceConfig {
        embed_sources: !matches.get_flag("no-sources"),
        keep_environment: matches.get_flag("keep"),
        ..TraceConfig::default()
    };
    if let Some(max_steps) = matches.get_one::<u64>("max-steps") {
        config.max_steps = *max_steps;
    }

    let outcome = TraceSession::new(config).run(&settings)?;
    let diagnostics = &outcome.diagnostics;

    for line in &diagnostics.output {
        eprintln!("{line}");
    }
    if let Some(fault) = &diagnostics.program_fault {
        eprintln!("program fault in {} at line {}: {}", fault.file, fault.line, fault.message);
    }
    if let Some(dir) = &diagnostics.staged_dir {
        eprintln!("staged environment kept at {}", dir.display());
    }
    tracing::info!(
        entries = outcome.artifact.body.len(),
        skipped = diagnostics.trace.unresolved + diagnostics.trace.serialization_failures,
        "trace finished"
    );

    if settings.output.is_none() {
        println!("{}", outcome.artifact.to_json_pretty()?);
    }
    Ok(())
}

fn instrument_source(path: &PathBuf, watch: &[VariableDescriptor]) -> Result<String> {
    let source =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let program = parse_program(&source)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let context = TransformationContext::for_programs([&program])
        .with_source_file(path.display().to_string())
        .with_observed(watch.iter().map(|d| d.identifier.clone()));
    let instrumented = Instrumenter::new().instrument(program, &context)?;
    Ok(instrumented.to_source())
}

fn reconstruct_log(log: &PathBuf, watch: &[VariableDescriptor]) -> Result<String> {
    let parsed = read_log(log).with_context(|| format!("failed to read {}", log.display()))?;
    if parsed.truncated || parsed.malformed > 0 {
        tracing::warn!(
            malformed = parsed.malformed,
            truncated = parsed.truncated,
            "log was not fully readable"
        );
    }
    let reconstruction = Reconstructor::new(watch.iter().map(|d| d.identifier.clone()))
        .reconstruct(&parsed.records);
    let artifact = Assembler::new(TypeTable::default(), vistrace_core::FORMAT_VERSION).assemble(
        watch,
        std::iter::empty(),
        reconstruction.entries,
    );
    Ok(artifact.to_json_pretty()?)
}

fn main() -> Result<()> {
    init_tracing();

    let matches = build_cli().get_matches();
    match matches.subcommand() {
        Some(("run", sub)) => run(sub),
        Some(("instrument", sub)) => {
            let path = sub
                .get_one::<PathBuf>("file")
                .context("missing script path")?;
            print!("{}", instrument_source(path, &watched(sub))?);
            Ok(())
        }
        Some(("reconstruct", sub)) => {
            let log = sub.get_one::<PathBuf>("log").context("missing log path")?;
            let json = reconstruct_log(log, &watched(sub))?;
            match sub.get_one::<PathBuf>("output") {
                Some(output) => fs::write(output, json)
                    .with_context(|| format!("failed to write {}", output.display()))?,
                None => println!("{json}"),
            }
            Ok(())
        }
        _ => bail!("unknown command"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flags_build_settings() {
        let matches = build_cli()
            .try_get_matches_from([
                "vistrace", "run", "--root", "proj", "--entry", "main.vt", "--file", "lib.vt",
                "-w", "a:list", "-w", "n",
            ])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();

        let settings = run_settings(sub).unwrap();

        assert_eq!(settings.root_dir, PathBuf::from("proj"));
        assert_eq!(settings.files, vec![PathBuf::from("lib.vt")]);
        assert_eq!(settings.watch.len(), 2);
        assert_eq!(settings.watch[0].raw_type, "list");
    }

    #[test]
    fn test_settings_conflict_with_entry() {
        let result = build_cli().try_get_matches_from([
            "vistrace", "run", "--settings", "s.json", "--entry", "main.vt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_instrument_prints_tracer_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.vt");
        fs::write(&path, "a = 1;\nprint(a);\n").unwrap();

        let source = instrument_source(&path, &[VariableDescriptor::new("a", "int")]).unwrap();

        assert_eq!(
            source,
            "a = __trace_write(1, store(a), 1, 1, 1);\nprint(__trace_read(load(a), a, 2, 2));\n"
        );
    }

    #[test]
    fn test_reconstruct_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("trace.jsonl");
        fs::write(
            &log,
            "{\"kind\":\"write\",\"target\":{\"identifier\":\"a\"},\"value\":1,\"beginLine\":1,\"endLine\":1}\n",
        )
        .unwrap();

        let json = reconstruct_log(&log, &[VariableDescriptor::new("a", "int")]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["body"][0]["operation"], "init");
        assert_eq!(value["header"]["annotatedVariables"]["a"]["abstractType"], "int");
    }
}
