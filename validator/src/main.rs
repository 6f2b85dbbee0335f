mod cli;

use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, Command, DefinitionArgs};
use nxdl::{
    generate_template, validate_file, Bucket, Config, DataMapping, EntryOutcome, MemoryGroup,
    SchemaCache, Validator,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::from(2)
        }
    }
}

/// `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn config(args: &DefinitionArgs) -> Config {
    let config = match &args.definitions {
        Some(root) => Config::with_root(root),
        None => Config::from_env(),
    };
    args.search_dirs
        .iter()
        .fold(config, |config, dir| config.search_dir(dir))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let file = File::open(path).map_err(|err| format!("cannot open {}: {err}", path.display()))?;
    let value = serde_json::from_reader(BufReader::new(file))
        .map_err(|err| format!("cannot parse {}: {err}", path.display()))?;
    Ok(value)
}

/// Returns whether everything checked was valid.
fn run(cli: Cli) -> Result<bool, Box<dyn Error>> {
    let config = config(&cli.definitions);
    tracing::debug!(dirs = ?config.search_dirs(), "definition search path");
    let cache = SchemaCache::from_config(&config);

    match cli.command {
        Command::Validate {
            appdef,
            mapping,
            ignore_undocumented,
        } => {
            let mapping: DataMapping = read_json(&mapping)?;
            let report = Validator::from_config(&cache, &config)
                .ignore_undocumented(ignore_undocumented)
                .validate(&appdef, &mapping)?;
            if report.is_valid() {
                println!("valid against {appdef}");
            } else {
                print!("{}", report.report());
            }
            Ok(report.is_valid())
        }
        Command::File {
            file,
            ignore_undocumented,
        } => {
            let root: MemoryGroup = read_json(&file)?;
            let reports = validate_file(&cache, &root, ignore_undocumented)?;
            if reports.is_empty() {
                println!("no NXentry groups in {}", file.display());
                return Ok(false);
            }
            let mut valid = true;
            for report in &reports {
                match &report.outcome {
                    EntryOutcome::Valid => println!("{}: valid", report.entry),
                    EntryOutcome::Invalid(problems) => {
                        println!("{}: {} problem(s)", report.entry, problems.len());
                        for problem in problems {
                            println!("  {}: {problem}", problem.kind);
                        }
                    }
                    EntryOutcome::MissingDefinition => {
                        println!("{}: no definition field", report.entry)
                    }
                    EntryOutcome::UnknownDefinition(name) => {
                        println!("{}: unknown definition {name}", report.entry)
                    }
                }
                valid &= report.is_valid();
            }
            Ok(valid)
        }
        Command::Template {
            appdef,
            required_only,
        } => {
            let template = generate_template(&*cache.tree(&appdef)?)?;
            let json = if required_only {
                Value::Object(template.bucket(Bucket::Required).clone())
            } else {
                serde_json::to_value(&template)?
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(true)
        }
        Command::Tree { appdef } => {
            let tree = cache.tree(&appdef)?;
            print!("{}", tree.render());
            for diagnostic in tree.diagnostics() {
                eprintln!("warning: {diagnostic}");
            }
            Ok(true)
        }
    }
}
