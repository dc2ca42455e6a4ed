//! streamby Replay - Replay recorded ticks through a stream aggregation
//!
//! Usage:
//!   streamby-replay --input <PATH> [OPTIONS]
//!
//! Options:
//!   --config <PATH>     Configuration file (default: streamby.yml)
//!   --input <PATH>      JSON replay file
//!   --chunk-size <N>    Rows per chunk (overrides config)

use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::PathBuf;
use streamby_aggregation::AggregationDefinition;
use streamby_core::{FieldValue, Row};
use streamby_engine::{init_logging, EngineConfig, ResultTable, Schema, StreamAggregation, StreamTable};
use tracing::info;

/// Replay file: the source schema, one aggregation, and the rows appended per
/// tick. The first tick is the initial snapshot.
#[derive(Debug, Deserialize)]
struct ReplayFile {
    schema: Schema,
    aggregation: AggregationDefinition,
    ticks: Vec<Vec<Row>>,
}

/// Command line arguments
#[derive(Debug)]
struct CliArgs {
    config_path: Option<PathBuf>,
    input_path: Option<PathBuf>,
    chunk_size: Option<usize>,
    generate_config: bool,
}

/// Parse `argv` (program name first). Option values that do not parse are
/// reported rather than skipped.
fn parse_args(argv: &[String]) -> anyhow::Result<CliArgs> {
    let mut args = CliArgs {
        config_path: None,
        input_path: None,
        chunk_size: None,
        generate_config: false,
    };

    let mut i = 1;

    while i < argv.len() {
        match argv[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < argv.len() {
                    args.config_path = Some(PathBuf::from(&argv[i + 1]));
                    i += 1;
                }
            }
            "--input" | "-i" => {
                if i + 1 < argv.len() {
                    args.input_path = Some(PathBuf::from(&argv[i + 1]));
                    i += 1;
                }
            }
            "--chunk-size" => {
                if i + 1 >= argv.len() {
                    bail!("Missing value for --chunk-size");
                }
                let value = &argv[i + 1];
                let size = value
                    .parse::<usize>()
                    .with_context(|| format!("Invalid --chunk-size '{}'", value))?;
                args.chunk_size = Some(size);
                i += 1;
            }
            "--generate-config" => {
                args.generate_config = true;
            }
            "--help" => {
                print_help();
                std::process::exit(0);
            }
            "--version" => {
                println!("streamby-replay {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    Ok(args)
}

fn print_help() {
    println!(
        r#"streamby-replay - Replay stream ticks through a first-by/last-by aggregation

USAGE:
    streamby-replay --input <PATH> [OPTIONS]

OPTIONS:
    -c, --config <PATH>      Configuration file (default: streamby.yml)
    -i, --input <PATH>       JSON replay file
    --chunk-size <N>         Rows per chunk (overrides config)
    --generate-config        Generate default config file (streamby.yml)
    --help                   Print help information
    --version                Print version information

REPLAY FILE:
    {{
      "schema": [
        {{"name": "sym", "column_type": "string"}},
        {{"name": "ts", "column_type": "integer"}},
        {{"name": "price", "column_type": "float"}}
      ],
      "aggregation": {{
        "name": "bars",
        "group_by": ["sym"],
        "aggregations": [
          {{"name": "open", "sort_column": "ts", "mode": "first", "output_columns": ["price"]}},
          {{"name": "close", "sort_column": "ts", "mode": "last", "output_columns": ["price"]}}
        ]
      }},
      "ticks": [
        [["AAPL", 1, 187.5], ["MSFT", 1, 402.0]],
        [["AAPL", 2, 188.1]]
      ]
    }}
"#
    );
}

fn format_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => "null".to_string(),
        FieldValue::Boolean(b) => b.to_string(),
        FieldValue::Integer(v) => v.to_string(),
        FieldValue::UnsignedInteger(v) => v.to_string(),
        FieldValue::Float(v) => v.to_string(),
        FieldValue::String(s) => s.clone(),
    }
}

fn print_table(tick: usize, result: &ResultTable) {
    println!("-- tick {} --", tick);
    println!("{}", result.columns().join("\t"));
    for row in result.snapshot() {
        let cells: Vec<String> = row.iter().map(format_value).collect();
        println!("{}", cells.join("\t"));
    }
}

fn main() -> anyhow::Result<()> {
    let argv: Vec<String> = std::env::args().collect();
    let args = parse_args(&argv)?;

    if args.generate_config {
        let path = "streamby.yml";
        EngineConfig::write_default(path)?;
        println!("Generated default configuration: {}", path);
        return Ok(());
    }

    let config_path = args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("streamby.yml"));
    let mut config = if config_path.exists() {
        EngineConfig::from_file(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?
    } else {
        EngineConfig::default()
    };
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    config.validate()?;

    init_logging(&config.logging)?;
    config.install_thread_pool()?;

    let input_path = args
        .input_path
        .context("Missing --input <PATH>, see --help")?;
    let content = std::fs::read_to_string(&input_path)
        .with_context(|| format!("Failed to read {}", input_path.display()))?;
    let replay: ReplayFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", input_path.display()))?;

    info!(
        "Replaying {} ticks through '{}' (chunk_size={})",
        replay.ticks.len(),
        replay.aggregation.name,
        config.chunk_size
    );

    let mut source = StreamTable::new(replay.schema.clone());
    let mut aggregation = StreamAggregation::new(replay.aggregation, &replay.schema, config)?;
    let result = aggregation.result();

    for (tick, rows) in replay.ticks.into_iter().enumerate() {
        let (update, batch) = source.append(rows)?;
        if tick == 0 {
            aggregation.initialize(&batch)?;
        } else {
            let downstream = aggregation.process(&update, &batch)?;
            info!(
                "Tick {}: {} new groups, {} modified",
                tick,
                downstream.added.size(),
                downstream.modified.size()
            );
        }
        print_table(tick, &result);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("streamby-replay")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_chunk_size() {
        let args = parse_args(&argv(&["--input", "ticks.json", "--chunk-size", "64"])).unwrap();
        assert_eq!(args.chunk_size, Some(64));
        assert_eq!(args.input_path, Some(PathBuf::from("ticks.json")));
    }

    #[test]
    fn test_invalid_chunk_size_is_an_error() {
        let err = parse_args(&argv(&["--chunk-size", "lots"])).unwrap_err();
        assert!(err.to_string().contains("lots"));
        assert!(parse_args(&argv(&["--chunk-size", "-1"])).is_err());
        assert!(parse_args(&argv(&["--chunk-size"])).is_err());
    }
}
