//! Replay fragment files through the reassembly pipeline.
//!
//! Each file holds one hexadecimal fragment per line (`#` starts a comment) and is replayed by
//! its own source. Groups are solved by [Quorum] and every outcome is printed by one of
//! `--sinks` logging sinks.

use clap::{value_parser, Arg, ArgAction, Command};
use num_bigint::BigUint;
use prometheus_client::{encoding::text::encode, registry::Registry};
use sentinel_reassembly::{
    mocks::{Quorum, Replay},
    Engine, Fragment, GroupKey, Sink,
};
use serde::{Deserialize, Serialize};
use std::{fs, num::ParseIntError, path::PathBuf};
use tracing::{info, warn, Level};

const DEFAULT_SINKS: usize = 1;
const DEFAULT_QUORUM: usize = 3;

/// Optional settings loaded from `--config`. Command-line flags take precedence.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub workers: Option<usize>,
    pub sinks: Option<usize>,
    pub quorum: Option<usize>,
    #[serde(default)]
    pub sources: Vec<PathBuf>,
}

/// Prints every outcome it receives.
struct Printer {
    index: usize,
}

impl Sink for Printer {
    fn send(&mut self, key: GroupKey, value: BigUint) {
        println!("sink {}: send {key:#x} {value:#x}", self.index);
    }

    fn incomplete(&mut self, key: GroupKey) {
        println!("sink {}: incomplete {key:#x}", self.index);
    }
}

/// Parse one hexadecimal fragment per line, skipping blank lines and `#` comments.
fn parse_fragments(contents: &str) -> Result<Vec<Fragment>, ParseIntError> {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(|line| {
            let digits = line
                .strip_prefix("0x")
                .or_else(|| line.strip_prefix("0X"))
                .unwrap_or(line);
            Fragment::from_str_radix(digits, 16)
        })
        .collect()
}

fn main() {
    // Create logger
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_line_number(true)
        .init();

    // Parse arguments
    let matches = Command::new("sentinel-replay")
        .about("replay fragment files through the reassembly pipeline")
        .arg(
            Arg::new("config")
                .long("config")
                .help("YAML file with workers, sinks, quorum and sources"),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .help("number of worker threads")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("sinks")
                .long("sinks")
                .help("number of printing sinks")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("quorum")
                .long("quorum")
                .help("distinct fragments required to solve a group")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("sources")
                .help("fragment files, one source each")
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf)),
        )
        .get_matches();

    // Load config
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            let file = fs::read_to_string(path).expect("Could not read config file");
            serde_yaml::from_str(&file).expect("Could not parse config file")
        }
        None => Config::default(),
    };
    if let Some(workers) = matches.get_one::<usize>("workers") {
        config.workers = Some(*workers);
    }
    if let Some(sinks) = matches.get_one::<usize>("sinks") {
        config.sinks = Some(*sinks);
    }
    if let Some(quorum) = matches.get_one::<usize>("quorum") {
        config.quorum = Some(*quorum);
    }
    if let Some(sources) = matches.get_many::<PathBuf>("sources") {
        config.sources = sources.cloned().collect();
    }
    let engine_cfg = sentinel_reassembly::Config {
        workers: config
            .workers
            .unwrap_or(sentinel_reassembly::Config::default().workers),
    };
    let sinks = config.sinks.unwrap_or(DEFAULT_SINKS);
    let quorum = config.quorum.unwrap_or(DEFAULT_QUORUM);
    info!(
        workers = engine_cfg.workers,
        sinks,
        quorum,
        sources = config.sources.len(),
        "loaded config"
    );
    if config.sources.is_empty() {
        warn!("no fragment files provided");
    }

    // Configure pipeline
    let mut registry = Registry::with_prefix("reassembly");
    let mut engine = Engine::new(engine_cfg, Quorum::new(quorum));
    engine.register(&mut registry);
    for path in &config.sources {
        let contents = fs::read_to_string(path).expect("Could not read fragment file");
        let fragments = parse_fragments(&contents).expect("Could not parse fragment file");
        info!(path = %path.display(), fragments = fragments.len(), "loaded source");
        engine.add_source(Replay::new(fragments));
    }
    for index in 0..sinks {
        engine.add_sink(Printer { index });
    }

    // Run until every source is exhausted
    let summary = engine
        .start()
        .expect("Could not start pipeline")
        .stop()
        .expect("Pipeline failed");
    println!(
        "fragments={} attempts={} solved={} sent={} incomplete={}",
        summary.fragments, summary.attempts, summary.solved, summary.sent, summary.incomplete
    );

    // Dump metrics
    let mut buffer = String::new();
    encode(&mut buffer, &registry).expect("Could not encode metrics");
    print!("{buffer}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fragments() {
        let contents = "# header\n0x02230000000c\n\n  071e124dabef  # trailing\n0XFF\n";
        assert_eq!(
            parse_fragments(contents).unwrap(),
            vec![0x02230000000c, 0x071e124dabef, 0xff]
        );
    }

    #[test]
    fn test_parse_fragments_rejects_garbage() {
        assert!(parse_fragments("0x12\nnot-hex\n").is_err());
        assert!(parse_fragments("0x1_0000_0000_0000_0000").is_err());
    }

    #[test]
    fn test_config() {
        let config: Config = serde_yaml::from_str("workers: 4\nsources: [a.txt, b.txt]\n").unwrap();
        assert_eq!(config.workers, Some(4));
        assert_eq!(config.sinks, None);
        assert_eq!(config.sources, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
        assert!(serde_yaml::from_str::<Config>("threads: 4\n").is_err());
    }
}
