//! MVS settings transfer CLI
//!
//! Entry point for the `mvscopy` command-line tool. Without a subcommand it
//! transfers settings from `MVS` into `MVScopy` under the working directory.

use clap::{Args, Parser, Subcommand};
use mvscopy::{EffectiveConfig, ErrorPolicy, Transfer, TransferOptions};
use serde_json::{Map, Value};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mvscopy")]
#[command(about = "Transfer MVS settings between configuration folders", version)]
struct Cli {
    /// Directory that relative folders and mvscopy.toml are resolved against
    #[arg(long, short = 'C', global = true)]
    workdir: Option<PathBuf>,

    /// Path to config file (default: mvscopy.toml in the working directory)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy settings from the source folder into the target folder (default)
    Transfer(TransferArgs),

    /// List the file pairs a transfer would process
    Pairs {
        #[command(flatten)]
        dirs: DirArgs,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        #[command(flatten)]
        dirs: DirArgs,
    },
}

#[derive(Args, Default)]
struct DirArgs {
    /// Source folder (default: MVS)
    #[arg(long, short = 's')]
    source: Option<PathBuf>,

    /// Target folder (default: MVScopy)
    #[arg(long, short = 't')]
    target: Option<PathBuf>,
}

#[derive(Args, Default)]
struct TransferArgs {
    #[command(flatten)]
    dirs: DirArgs,

    /// What to do when a file pair fails
    #[arg(long, value_enum)]
    on_error: Option<ErrorPolicy>,

    /// Report what would change without writing any file
    #[arg(long)]
    dry_run: bool,

    /// Ask for confirmation before writing
    #[arg(long)]
    confirm: bool,

    /// Output the report in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let workdir = match cli.workdir.clone() {
        Some(dir) => dir,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("Error: cannot determine working directory: {}", e);
                process::exit(1);
            }
        },
    };
    let config_path = cli.config.as_deref();

    match cli.command {
        None => run_transfer(&workdir, config_path, TransferArgs::default()),
        Some(Commands::Transfer(args)) => run_transfer(&workdir, config_path, args),
        Some(Commands::Pairs { dirs, json }) => run_pairs(&workdir, config_path, &dirs, json),
        Some(Commands::Config { dirs }) => run_config(&workdir, config_path, &dirs),
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "mvscopy=debug" } else { "mvscopy=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run_transfer(workdir: &Path, config_path: Option<&Path>, args: TransferArgs) {
    let mut overrides = dir_overrides(&args.dirs);
    if let Some(policy) = args.on_error {
        overrides.insert("on_error".to_string(), serde_json::json!(policy));
    }
    if args.dry_run {
        overrides.insert("dry_run".to_string(), Value::Bool(true));
    }

    let options = load_options(workdir, config_path, overrides);

    if args.confirm && !options.dry_run {
        let prompt = format!(
            "Transfer settings from {} to {}? Back up the target files first.",
            options.source_dir.display(),
            options.target_dir.display()
        );
        if !confirm(&prompt) {
            eprintln!("Cancelled");
            process::exit(0);
        }
    }

    match Transfer::new(options).run() {
        Ok(report) => {
            if args.json {
                match report.to_json() {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error serializing report: {}", e);
                        process::exit(1);
                    }
                }
            } else {
                print!("{}", report.to_human());
                println!();
            }

            if report.has_failures() {
                process::exit(4);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn run_pairs(workdir: &Path, config_path: Option<&Path>, dirs: &DirArgs, json: bool) {
    let options = load_options(workdir, config_path, dir_overrides(dirs));

    let plan = match Transfer::new(options).plan() {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    };

    if json {
        match serde_json::to_string_pretty(&plan) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing pairs: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    if plan.pairs.is_empty() {
        println!("No matching file pairs");
    } else {
        for pair in &plan.pairs {
            println!("{} -> {}", pair.source.display(), pair.target.display());
        }
    }
    println!();
    println!("Source files: {}", plan.source_files.len());
    println!("Target files: {}", plan.target_files.len());
    println!("Pairs: {}", plan.pairs.len());
}

fn run_config(workdir: &Path, config_path: Option<&Path>, dirs: &DirArgs) {
    let effective = load_effective(workdir, config_path, dir_overrides(dirs));
    match effective.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            process::exit(1);
        }
    }
}

fn dir_overrides(dirs: &DirArgs) -> Map<String, Value> {
    let mut overrides = Map::new();
    if let Some(ref source) = dirs.source {
        overrides.insert(
            "source_dir".to_string(),
            Value::String(source.to_string_lossy().into_owned()),
        );
    }
    if let Some(ref target) = dirs.target {
        overrides.insert(
            "target_dir".to_string(),
            Value::String(target.to_string_lossy().into_owned()),
        );
    }
    overrides
}

fn load_effective(
    workdir: &Path,
    config_path: Option<&Path>,
    overrides: Map<String, Value>,
) -> EffectiveConfig {
    let cli_layer = (!overrides.is_empty()).then(|| Value::Object(overrides));
    match EffectiveConfig::build(workdir, config_path, cli_layer) {
        Ok(effective) => effective,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}

fn load_options(
    workdir: &Path,
    config_path: Option<&Path>,
    overrides: Map<String, Value>,
) -> TransferOptions {
    let effective = load_effective(workdir, config_path, overrides);
    match effective.to_options(workdir) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}

fn confirm(prompt: &str) -> bool {
    eprint!("{} [y/N] ", prompt);
    let _ = io::stderr().flush();

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
