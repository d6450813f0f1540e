use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use gshader::config::{discover_config, ProjectConfig};
use gshader::error_codes::{find_coded_error, CodedError};
use gshader::resolver::Resolved;
use gshader::shader_unit::{build_unit, BuildFailure};
use gshader::watch::ShaderWatcher;
use gshader::{
    resolve, CompilerBackend, DiagnosticFormatKind, DynamicShader, LoadError, Mailbox,
    NagaGlslBackend, ShaderStage, TracingSink,
};

#[derive(Debug, Parser)]
#[command(name = "gshader")]
#[command(about = "Resolve, compile and hot-reload GLSL fragment shaders", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve includes, compile, and report diagnostics per source file.
    Check {
        entry: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = ShaderStage::Fragment)]
        stage: ShaderStage,
        #[arg(long, value_enum)]
        format: Option<DiagnosticFormatKind>,
        #[arg(long)]
        json: bool,
    },
    /// Print the flattened unit, or its per-file line map.
    Flatten {
        entry: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        map: bool,
    },
    /// Rebuild whenever a contributing file changes.
    Watch {
        entry: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum)]
        format: Option<DiagnosticFormatKind>,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    debug!(
        version = env!("CARGO_PKG_VERSION"),
        git = option_env!("GSHADER_GIT_HASH").unwrap_or("unknown"),
        "gshader starting"
    );

    let json_output = matches!(cli.command, Commands::Check { json: true, .. });
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report_error(&error, json_output);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gshader=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Check {
            entry,
            config,
            stage,
            format,
            json,
        } => {
            let (entry, config) = resolve_entry(entry, config.as_deref())?;
            let format = format.or(config.diagnostic_format);
            match stage {
                ShaderStage::Fragment => run_check(&entry, &config, format, json),
                ShaderStage::Vertex => run_check_stage(&entry, &config, stage, format, json),
            }
        }
        Commands::Flatten { entry, config, map } => {
            let config = discover_config(config.as_deref(), &env::current_dir()?)?
                .unwrap_or_default();
            run_flatten(&entry, &config, map)
        }
        Commands::Watch {
            entry,
            config,
            format,
        } => {
            let (entry, config) = resolve_entry(entry, config.as_deref())?;
            run_watch(&entry, &config, format.or(config.diagnostic_format))
        }
    }
}

fn resolve_entry(
    entry: Option<PathBuf>,
    config_path: Option<&Path>,
) -> Result<(PathBuf, ProjectConfig)> {
    let config = discover_config(config_path, &env::current_dir()?)?.unwrap_or_default();
    let entry = entry.or_else(|| config.entry.clone()).ok_or_else(|| {
        anyhow!(CodedError::usage(
            "MISSING_ENTRY",
            "no entry shader given; pass a path or set `entry` in gshader.yaml",
        ))
    })?;
    Ok((entry, config))
}

fn new_shader(
    config: &ProjectConfig,
    format: Option<DiagnosticFormatKind>,
) -> Result<DynamicShader<NagaGlslBackend>> {
    let mut shader = DynamicShader::new(NagaGlslBackend::new()).with_limits(config.limits);
    if let Some(kind) = format {
        shader = shader.with_diagnostic_format(kind);
    }
    shader
        .initialize()
        .map_err(|error| anyhow!(CodedError::from_load(&error, None)))?;
    Ok(shader)
}

fn run_check(
    entry: &Path,
    config: &ProjectConfig,
    format: Option<DiagnosticFormatKind>,
    json_output: bool,
) -> Result<()> {
    let mut shader = new_shader(config, format)?;
    let mut mailbox = Mailbox::new();

    if let Err(error) = shader.load(entry, &mut mailbox) {
        if !json_output {
            for message in mailbox.messages() {
                eprintln!("{}", message.message);
            }
        }
        return Err(anyhow!(CodedError::from_load(&error, shader.last_report())));
    }

    let files = shader.file_records().map_or(0, |records| records.len());
    let lines = shader.source_unit().map_or(0, |unit| unit.line_count());
    print_check_ok(entry, ShaderStage::Fragment, files, lines, json_output)
}

fn run_check_stage(
    entry: &Path,
    config: &ProjectConfig,
    stage: ShaderStage,
    format: Option<DiagnosticFormatKind>,
    json_output: bool,
) -> Result<()> {
    let mut backend = NagaGlslBackend::new();
    let format = match format {
        Some(kind) => kind.format(),
        None => backend.diagnostic_format(),
    };

    match build_unit(&mut backend, entry, stage, config.limits, format) {
        Ok(build) => print_check_ok(
            entry,
            stage,
            build.resolved.records.len(),
            build.resolved.unit.line_count(),
            json_output,
        ),
        Err(BuildFailure::Resolve(failure)) => {
            Err(anyhow!(CodedError::from_load(&LoadError::Resolve(failure.error), None)))
        }
        Err(BuildFailure::Compile { report, .. }) => {
            if !json_output {
                eprintln!("{}", report.text);
            }
            let error = LoadError::Compile {
                diagnostics: report.diagnostic_count(),
            };
            Err(anyhow!(CodedError::from_load(&error, Some(&report))))
        }
    }
}

fn print_check_ok(
    entry: &Path,
    stage: ShaderStage,
    files: usize,
    lines: usize,
    json_output: bool,
) -> Result<()> {
    if json_output {
        let body = json!({
            "ok": true,
            "entry": entry.display().to_string(),
            "stage": stage.as_str(),
            "files": files,
            "lines": lines,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!(
            "OK: {} ({}, {} file(s), {} line(s))",
            entry.display(),
            stage.as_str(),
            files,
            lines
        );
    }
    Ok(())
}

fn run_flatten(entry: &Path, config: &ProjectConfig, map: bool) -> Result<()> {
    let Resolved { unit, records } = resolve(entry, config.limits).map_err(|failure| {
        anyhow!(CodedError::from_load(&LoadError::Resolve(failure.error), None))
    })?;

    if !map {
        print!("{unit}");
        return Ok(());
    }

    println!("{} line(s) from {} file(s)", records.total_lines(), records.len());
    for record in records.iter() {
        match record.span() {
            Some(span) => println!(
                "{}: lines {}-{} ({} own)",
                record.display,
                span.start,
                span.end,
                record.contributed_lines()
            ),
            None => println!("{}: no own lines", record.display),
        }
        for segment in &record.segments {
            println!(
                "  {}-{} <- {}-{}",
                segment.start,
                segment.end,
                segment.local_start,
                segment.local_line(segment.end)
            );
        }
    }
    for placeholder in records.placeholders() {
        let includer = records
            .iter()
            .nth(placeholder.record)
            .map_or("?", |record| record.display.as_str());
        println!(
            "placeholder {} <- {}:{}",
            placeholder.line, includer, placeholder.local_line
        );
    }
    Ok(())
}

fn run_watch(
    entry: &Path,
    config: &ProjectConfig,
    format: Option<DiagnosticFormatKind>,
) -> Result<()> {
    let mut shader = new_shader(config, format)?;
    let mut sink = TracingSink;
    // A broken first build is fine; the watcher retries once files change.
    let _ = shader.load(entry, &mut sink);

    let mut watcher = ShaderWatcher::new(shader, config.watch)?;
    info!(
        entry = %entry.display(),
        dirs = watcher.watched_dirs().count(),
        "watching shader sources"
    );
    watcher.run(&mut sink)
}

fn report_error(error: &anyhow::Error, json_output: bool) {
    match (find_coded_error(error), json_output) {
        (Some(coded), true) => match serde_json::to_string_pretty(&coded.envelope()) {
            Ok(body) => println!("{body}"),
            Err(_) => eprintln!("error: {error:#}"),
        },
        (None, true) => {
            let coded = CodedError::usage("INTERNAL", format!("{error:#}"));
            match serde_json::to_string_pretty(&coded.envelope()) {
                Ok(body) => println!("{body}"),
                Err(_) => eprintln!("error: {error:#}"),
            }
        }
        (_, false) => eprintln!("error: {error:#}"),
    }
}
