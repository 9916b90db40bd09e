//! External merge sort for numbered-line text files
//!
//! `extsort sort` runs the bounded-memory sort pipeline over one input
//! file; `extsort generate` produces random test data in the same line
//! format.

use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;
use std::process;

use extsort::{
    check::{check_sorted, CheckOutcome},
    config::{parse_size, MergeKind, SortConfigBuilder, DEFAULT_READ_BUF_BYTES},
    error::{SortError, SortResult},
    generate::{generate, GenerateConfig},
    sort_file, EXIT_FAILURE, EXIT_SUCCESS,
};

fn main() {
    match run() {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("extsort: {e}");
            process::exit(e.exit_code());
        }
    }
}

fn run() -> SortResult<i32> {
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("sort", sub)) => run_sort(sub),
        Some(("generate", sub)) => run_generate(sub),
        Some(("check", sub)) => run_check(sub),
        _ => unreachable!("subcommand is required"),
    }
}

fn build_cli() -> Command {
    Command::new("extsort")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Sort huge text files of `N. text` lines with bounded memory")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("sort")
                .about("Sort a text file that may be larger than RAM")
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .help("File to sort")
                        .value_name("PATH")
                        .required(true),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Destination for the sorted result")
                        .value_name("PATH")
                        .required(true),
                )
                .arg(
                    Arg::new("chunk-size")
                        .short('S')
                        .long("chunk-size")
                        .help("Split size per run, e.g. 8M or 512K; larger uses more RAM per worker")
                        .value_name("SIZE"),
                )
                .arg(
                    Arg::new("fanout")
                        .long("fanout")
                        .help("Maximum sorted inputs consumed per merge pass")
                        .value_name("N"),
                )
                .arg(
                    Arg::new("parallel")
                        .long("parallel")
                        .help("Worker count for run sorting and merging")
                        .value_name("N"),
                )
                .arg(
                    Arg::new("strategy")
                        .long("strategy")
                        .help("Merge backend")
                        .value_name("NAME")
                        .value_parser(["polyphase", "kway"]),
                )
                .arg(
                    Arg::new("temporary-directory")
                        .short('T')
                        .long("temporary-directory")
                        .help("Use DIR for transient run files, not the system temp dir")
                        .value_name("DIR"),
                )
                .arg(
                    Arg::new("keep-temp")
                        .long("keep-temp")
                        .help("Keep the temp directory when the run is cancelled")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("verbose")
                        .short('v')
                        .long("verbose")
                        .help("Report run counts and merge passes on stderr")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Verify that a file is already sorted")
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .help("File to verify")
                        .value_name("PATH")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("generate")
                .about("Generate a random `N. text` test file")
                .arg(
                    Arg::new("file-name")
                        .long("file-name")
                        .help("Name of the generated file")
                        .value_name("NAME")
                        .required(true),
                )
                .arg(
                    Arg::new("file-size")
                        .long("file-size")
                        .help("Target size in MB")
                        .value_name("MB")
                        .required(true),
                )
                .arg(
                    Arg::new("output-dir")
                        .long("output-dir")
                        .help("Directory to place the file in (default: current dir)")
                        .value_name("DIR"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .help("RNG seed for reproducible output")
                        .value_name("N"),
                ),
        )
}

fn parse_number(matches: &ArgMatches, name: &str) -> SortResult<Option<u64>> {
    match matches.get_one::<String>(name) {
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| SortError::invalid_config(&format!("invalid {name}: {raw}"))),
        None => Ok(None),
    }
}

fn run_sort(matches: &ArgMatches) -> SortResult<i32> {
    let input = PathBuf::from(matches.get_one::<String>("input").expect("required arg"));
    let output = PathBuf::from(matches.get_one::<String>("output").expect("required arg"));

    let mut builder = SortConfigBuilder::new();
    if let Some(raw) = matches.get_one::<String>("chunk-size") {
        builder = builder.chunk_bytes(parse_size(raw)?);
    }
    if let Some(fanout) = parse_number(matches, "fanout")? {
        builder = builder.merge_fanout(fanout as usize);
    }
    if let Some(workers) = parse_number(matches, "parallel")? {
        builder = builder.max_concurrency(workers as usize);
    }
    if let Some(name) = matches.get_one::<String>("strategy") {
        builder = builder.merge_kind(name.parse::<MergeKind>()?);
    }
    if let Some(dir) = matches.get_one::<String>("temporary-directory") {
        builder = builder.temp_dir(PathBuf::from(dir));
    }
    if matches.get_flag("keep-temp") {
        builder = builder.keep_temp_on_cancel();
    }

    let config = builder.build()?;
    let summary = sort_file(&config, &input, &output)?;
    if matches.get_flag("verbose") {
        if summary.in_memory {
            eprintln!("extsort: sorted in memory (single chunk)");
        } else {
            eprintln!(
                "extsort: {} runs split, {} sorted, {} merge passes",
                summary.runs_split, summary.runs_sorted, summary.merge_passes
            );
        }
    }
    Ok(EXIT_SUCCESS)
}

fn run_check(matches: &ArgMatches) -> SortResult<i32> {
    let input = PathBuf::from(matches.get_one::<String>("input").expect("required arg"));

    match check_sorted(&input, DEFAULT_READ_BUF_BYTES)? {
        CheckOutcome::Sorted { .. } => Ok(EXIT_SUCCESS),
        CheckOutcome::Disorder { line } => {
            eprintln!("extsort: {}:{line}: disorder", input.display());
            Ok(EXIT_FAILURE)
        }
    }
}

fn run_generate(matches: &ArgMatches) -> SortResult<i32> {
    let file_size_mb = parse_number(matches, "file-size")?.expect("required arg");
    let config = GenerateConfig {
        file_name: matches
            .get_one::<String>("file-name")
            .expect("required arg")
            .clone(),
        file_size_mb,
        output_dir: matches.get_one::<String>("output-dir").map(PathBuf::from),
        seed: parse_number(matches, "seed")?,
    };

    generate(&config)?;
    Ok(EXIT_SUCCESS)
}
