use clap::{App, Arg, ArgMatches, SubCommand};
use log::{info, LevelFilter};
use num_enum::TryFromPrimitive;
use splitvote::*;
use std::path::Path;

mod config;

use config::{expand, Config};

#[derive(TryFromPrimitive, PartialEq, Copy, Clone)]
#[repr(u8)]
enum Verbosity {
    Silent = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl Verbosity {
    fn level_filter(self) -> LevelFilter {
        match self {
            Verbosity::Silent => LevelFilter::Off,
            Verbosity::Error => LevelFilter::Error,
            Verbosity::Warn => LevelFilter::Warn,
            Verbosity::Info => LevelFilter::Info,
            Verbosity::Debug => LevelFilter::Debug,
            Verbosity::Trace => LevelFilter::Trace,
        }
    }
}

fn main() {
    let matches = App::new("splitvote")
        .version("0.1")
        .about("Simulates and verifies split-value voting elections")
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Sets the level of verbosity"),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .global(true)
                .help("Only print results"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run a simulated election and print the tally")
                .arg(
                    Arg::with_name("params")
                        .long("params")
                        .takes_value(true)
                        .help("Election parameters JSON file - can also be set with SPLITVOTE_PARAMS"),
                )
                .arg(number_arg("n-voters", "Number of voters"))
                .arg(number_arg("n-reps", "Number of replicas (even)"))
                .arg(number_arg("n-fail", "Number of mix servers that may fail"))
                .arg(number_arg("n-leak", "Number of mix servers that may leak"))
                .arg(number_arg("max-polls", "Polls per phase before the barrier gives up"))
                .arg(
                    Arg::with_name("seed")
                        .long("seed")
                        .takes_value(true)
                        .help("Hex-encoded 32-byte master seed - can also be set with SPLITVOTE_SEED"),
                )
                .arg(
                    Arg::with_name("sbb-out")
                        .long("sbb-out")
                        .takes_value(true)
                        .help("Save the bulletin board here (default <election_id>.sbb.json) - can also be set with SPLITVOTE_SBB_PATH"),
                ),
        )
        .subcommand(
            SubCommand::with_name("verify")
                .about("Verify a saved bulletin board")
                .arg(
                    Arg::with_name("INPUT")
                        .index(1)
                        .required(true)
                        .help("Bulletin board JSON file"),
                ),
        )
        .get_matches();

    let verbosity = if matches.is_present("quiet") {
        Verbosity::Silent
    } else {
        let level = 2 + matches.occurrences_of("v").min(3) as u8;
        Verbosity::try_from_primitive(level).unwrap_or(Verbosity::Trace)
    };
    env_logger::Builder::new()
        .filter_level(verbosity.level_filter())
        .parse_default_env()
        .init();

    let config = Config::from_env();

    if let Some(matches) = matches.subcommand_matches("run") {
        command_run(matches, &config);
    } else if let Some(matches) = matches.subcommand_matches("verify") {
        command_verify(matches);
    } else {
        eprintln!("splitvote: no subcommand given, try --help");
        std::process::exit(1);
    }
}

fn number_arg<'a, 'b>(name: &'a str, help: &'b str) -> Arg<'a, 'b> {
    Arg::with_name(name).long(name).takes_value(true).help(help)
}

fn number(matches: &ArgMatches, name: &str) -> Option<usize> {
    let value = matches.value_of(name)?;
    match value.parse() {
        Ok(n) => Some(n),
        Err(e) => {
            eprintln!("splitvote run: invalid --{} {}: {}", name, value, e);
            std::process::exit(1);
        }
    }
}

fn read_params(path: &Path) -> ElectionParameters {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("splitvote run: unable to read {}: {}", path.display(), e);
            std::process::exit(1);
        }
    };
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        eprintln!("splitvote run: unable to parse {}: {}", path.display(), e);
        std::process::exit(1);
    })
}

fn command_run(matches: &ArgMatches, config: &Config) {
    let params_path = matches
        .value_of("params")
        .map(expand)
        .or_else(|| config.params_path.clone());
    let mut params = match params_path {
        Some(path) => read_params(&path),
        None => ElectionParameters::default(),
    };
    if let Some(n) = number(matches, "n-voters") {
        params.n_voters = n;
    }
    if let Some(n) = number(matches, "n-reps") {
        params.n_reps = n;
    }
    if let Some(n) = number(matches, "n-fail") {
        params.n_fail = n;
    }
    if let Some(n) = number(matches, "n-leak") {
        params.n_leak = n;
    }
    if let Some(seed) = matches.value_of("seed").map(str::to_owned).or_else(|| config.seed.clone()) {
        params.seed = Some(seed);
    }

    let mut coordinator_config = CoordinatorConfig::default();
    if let Some(n) = number(matches, "max-polls") {
        coordinator_config.max_polls_per_phase = n;
    }

    let default_sbb_path = format!("{}.sbb.json", params.election_id);
    let outcome = match simulate(params, coordinator_config) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("splitvote run: {}", e);
            std::process::exit(1);
        }
    };

    print_tally(&outcome.tally);

    let sbb_path = matches
        .value_of("sbb-out")
        .map(expand)
        .or_else(|| config.sbb_path.clone())
        .unwrap_or_else(|| default_sbb_path.into());
    if let Err(e) = save_items(&outcome.board, &sbb_path) {
        eprintln!("splitvote run: unable to save {}: {}", sbb_path.display(), e);
        std::process::exit(1);
    }
    info!("bulletin board saved to {}", sbb_path.display());
}

fn command_verify(matches: &ArgMatches) {
    let filename = match matches.value_of("INPUT") {
        Some(filename) => expand(filename),
        None => {
            eprintln!("splitvote verify: input filename required");
            std::process::exit(1);
        }
    };

    let items = match load_items(&filename) {
        Ok(items) => items,
        Err(e) => {
            eprintln!("splitvote verify: unable to read {}: {}", filename.display(), e);
            std::process::exit(1);
        }
    };

    let report = match verify(&items) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("splitvote verify: {}", e);
            std::process::exit(1);
        }
    };

    println!("> Election {} verified OK", report.election_id);
    println!(
        "  {} voters, {} replicas, {} board items",
        report.n_voters,
        report.n_reps,
        items.len()
    );
    println!("Tally:");
    for (race_id, totals) in report.tally.iter() {
        println!("  {}", race_id);
        for (choice, count) in totals.iter() {
            println!("    {} got {} votes", choice, count);
        }
    }
}
