/// Flow Linter: validates flow scripts and reports authoring problems.
///
/// Usage: flow_linter <flow.ron | dir> [--config <engine.ron>]

use narrative_flow::core::config::EngineConfig;
use narrative_flow::core::graph::{FlowError, FlowGraph};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: flow_linter <flow.ron | dir> [--config <engine.ron>]");
        process::exit(0);
    }

    let target = Path::new(&args[1]);
    let mut config_path = None;

    let mut i = 2;
    while i < args.len() {
        if args[i] == "--config" && i + 1 < args.len() {
            i += 1;
            config_path = Some(PathBuf::from(&args[i]));
        }
        i += 1;
    }

    let files = if target.is_file() {
        vec![target.to_path_buf()]
    } else if target.is_dir() {
        let mut files = Vec::new();
        collect_ron_files(target, &mut files);
        // The config is checked on its own below.
        if let Some(config) = config_path.as_deref().and_then(|p| p.canonicalize().ok()) {
            files.retain(|f| f.canonicalize().ok().as_deref() != Some(config.as_path()));
        }
        files
    } else {
        eprintln!("ERROR: Path '{}' does not exist", target.display());
        process::exit(1);
    };

    let mut error_count = 0;
    let mut warning_count = 0;

    if let Some(ref path) = config_path {
        match EngineConfig::load_from_ron(path) {
            Ok(config) => println!("Config OK: {} (tick {} ms)", path.display(), config.tick_ms),
            Err(e) => {
                println!("ERROR: {}: {}", path.display(), e);
                error_count += 1;
            }
        }
    }

    println!("\n=== Flow Lint Report ===\n");

    for path in &files {
        if target.is_dir() && is_engine_config(path) {
            println!("{}: engine config, skipped", path.display());
            continue;
        }
        let (errors, warnings) = lint_file(path);
        if errors.is_empty() && warnings.is_empty() {
            println!("{}: all checks passed", path.display());
        }
        for warning in &warnings {
            println!("WARNING: {}: {}", path.display(), warning);
        }
        for error in &errors {
            println!("ERROR: {}: {}", path.display(), error);
        }
        error_count += errors.len();
        warning_count += warnings.len();
    }

    println!(
        "\nSummary: {} files, {} errors, {} warnings",
        files.len(),
        error_count,
        warning_count
    );

    if error_count == 0 {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

/// All errors and warnings for one script file.
fn lint_file(path: &Path) -> (Vec<FlowError>, Vec<String>) {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => return (vec![FlowError::Io(e)], Vec::new()),
    };
    let (entry, flows) = match FlowGraph::parse_flows(&contents) {
        Ok(parsed) => parsed,
        Err(e) => return (vec![e], Vec::new()),
    };

    let errors = FlowGraph::check(&entry, &flows);
    if !errors.is_empty() {
        return (errors, Vec::new());
    }

    match FlowGraph::new(entry, flows) {
        Ok(graph) => {
            let warnings = graph.lint().iter().map(ToString::to_string).collect();
            (Vec::new(), warnings)
        }
        Err(e) => (vec![e], Vec::new()),
    }
}

/// Whether `path` holds an engine config rather than a flow script.
fn is_engine_config(path: &Path) -> bool {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return false;
    };
    FlowGraph::parse_flows(&contents).is_err() && EngineConfig::parse_ron(&contents).is_ok()
}

fn collect_ron_files(dir: &Path, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_ron_files(&path, files);
            } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
                files.push(path);
            }
        }
    }
    files.sort();
}
