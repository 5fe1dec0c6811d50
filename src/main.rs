//! recwalk
//!
//! Walks a binary file of nested length-prefixed records and prints the
//! record tree plus any diagnostics.

use std::path::PathBuf;

use bytes::Bytes;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use record_walker::config::{LogConfig, LogFormat};
use record_walker::config_file::{generate_default_config, ConfigFile};
use record_walker::formats::Format;
use record_walker::{Error, OwnedWalk, Result, WalkerConfig};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "recwalk";

#[derive(Parser, Debug)]
#[command(name = "recwalk")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File to walk
    #[arg(required_unless_present = "generate_config")]
    file: Option<PathBuf>,

    /// Record format (isobmff, stun, ecp, p3, xot, tlv); sniffed when omitted
    #[arg(short, long)]
    format: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the maximum container depth
    #[arg(long)]
    max_depth: Option<u32>,

    /// Print records and diagnostics as JSON
    #[arg(long)]
    json: bool,

    /// Write a default configuration file and exit
    #[arg(long, value_name = "PATH")]
    generate_config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.generate_config {
        generate_default_config(path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config_file = match &args.config {
        Some(path) => ConfigFile::from_file(path)?,
        None => ConfigFile {
            walker: Default::default(),
            format: None,
            logging: None,
        },
    };
    init_logging(&config_file.log_config());
    tracing::debug!("{} v{} starting", APP_NAME, VERSION);

    let format = match &args.format {
        Some(name) => Some(name.parse::<Format>()?),
        None => config_file.format.clone(),
    };
    let mut config = config_file.into_walker_config();
    if let Some(depth) = args.max_depth {
        config = config.with_max_depth(depth);
    }

    let Some(path) = &args.file else {
        return Err(Error::Config("no input file given".into()));
    };
    let data = Bytes::from(std::fs::read(path)?);
    tracing::info!("Read {} bytes from {}", data.len(), path.display());

    let format = match format {
        Some(format) => format,
        None => Format::detect(&data).ok_or_else(|| {
            Error::Config(format!(
                "could not detect the format of {}; pass --format",
                path.display()
            ))
        })?,
    };

    let walk = run(&data, &format, &config)?;
    if args.json {
        let report = serde_json::json!({
            "format": format.to_string(),
            "records": walk.records,
            "diagnostics": walk.diagnostics,
            "suppressed": walk.suppressed,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_tree(&walk);
    }
    Ok(())
}

fn run(data: &Bytes, format: &Format, config: &WalkerConfig) -> Result<OwnedWalk> {
    let adapter = format.adapter()?;
    tracing::info!("Walking as {}", adapter.name());
    let output = adapter.walk(data, config)?;
    Ok(OwnedWalk::from_output(data, output))
}

fn print_tree(walk: &OwnedWalk) {
    for record in &walk.records {
        let indent = "  ".repeat(record.depth as usize);
        let mut line = format!(
            "{}{} @{} len={} {:?}",
            indent,
            record.type_code(),
            record.offset,
            record.header.declared_length,
            record.kind
        );
        for field in &record.fields {
            let value = serde_json::to_string(&field.value).unwrap_or_default();
            line.push_str(&format!(" {}={}", field.name, value));
        }
        println!("{}", line);
    }

    if walk.diagnostics.is_empty() {
        return;
    }
    println!();
    println!("{} diagnostic(s):", walk.diagnostics.len() + walk.suppressed);
    for diagnostic in &walk.diagnostics {
        println!("  {}", diagnostic);
    }
    if walk.suppressed > 0 {
        println!("  ... {} more suppressed", walk.suppressed);
    }
}

/// Initialize logging with tracing
fn init_logging(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log.level.as_str().into());
    let json = log.format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_walker::formats::isobmff;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["recwalk", "in.mp4", "--format", "mp4", "--max-depth", "4"]);
        assert_eq!(args.file, Some(PathBuf::from("in.mp4")));
        assert_eq!(args.format.as_deref(), Some("mp4"));
        assert_eq!(
            args.format.as_deref().unwrap().parse::<Format>().unwrap(),
            Format::Isobmff
        );
        assert_eq!(args.max_depth, Some(4));
        assert!(!args.json);
        assert!(Args::try_parse_from(["recwalk"]).is_err());
        assert!(Args::try_parse_from(["recwalk", "--generate-config", "x.toml"]).is_ok());
    }

    #[test]
    fn test_run_detaches_bodies() {
        let data = Bytes::from(isobmff::build_box(b"free", b"abc"));
        let walk = run(&data, &Format::Isobmff, &WalkerConfig::default()).unwrap();
        assert_eq!(walk.records.len(), 1);
        assert_eq!(&walk.records[0].body[..], b"abc");
    }
}
