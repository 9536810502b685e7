use anyhow::{Context, Result};
use autoskip::backend::AudioSubmission;
use autoskip::feedback::validate_timing;
use autoskip::segments::SegmentId;
use autoskip::{Config, HttpSkipBackend, SkipBackend, SkipSegment};
use clap::{Arg, ArgMatches, Command};
use futures::future::join_all;
use std::path::PathBuf;
use tracing::{error, info, warn};

fn cli() -> Command {
    Command::new("AutoSkip")
        .version("0.1.0")
        .author("TigreRoll")
        .about("Operator tool for the skip segment backend")
        .subcommand_required(true)
        .arg(
            Arg::new("server")
                .short('s')
                .long("server")
                .value_name("URL")
                .help("Skip server base URL (overrides config)")
                .global(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(Command::new("ping").about("Check that the skip server is up"))
        .subcommand(
            Command::new("lookup")
                .about("Show known skip segments for one or more media identifiers")
                .arg(
                    Arg::new("media-id")
                        .value_name("MEDIA_ID")
                        .help("Media identifier, e.g. tt0944947_1_2")
                        .required(true)
                        .num_args(1..),
                ),
        )
        .subcommand(
            Command::new("analyze")
                .about("Upload an audio sample for fingerprint analysis")
                .arg(
                    Arg::new("file")
                        .value_name("AUDIO_FILE")
                        .help("Encoded audio sample (webm)")
                        .required(true),
                )
                .arg(
                    Arg::new("media-id")
                        .short('m')
                        .long("media-id")
                        .value_name("ID")
                        .help("Media identifier the sample belongs to")
                        .required(true),
                )
                .arg(
                    Arg::new("start-time")
                        .short('t')
                        .long("start-time")
                        .value_name("SECS")
                        .help("Playback position where the sample starts")
                        .default_value("0"),
                ),
        )
        .subcommand(
            Command::new("correct")
                .about("Correct the timing of a segment")
                .arg(
                    Arg::new("segment-id")
                        .value_name("SEGMENT_ID")
                        .help("Segment to correct")
                        .required(true),
                )
                .arg(
                    Arg::new("start")
                        .long("start")
                        .value_name("SECS")
                        .help("New start time in seconds")
                        .required(true),
                )
                .arg(
                    Arg::new("end")
                        .long("end")
                        .value_name("SECS")
                        .help("New end time in seconds")
                        .required(true),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let verbose = matches.get_flag("verbose");

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::load_from(&PathBuf::from(path))
            .with_context(|| format!("failed to load config from {}", path))?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };
    if let Some(server) = matches.get_one::<String>("server") {
        config.server.url = server.clone();
    }

    init_logging(&config, verbose);
    config.validate()?;
    info!("🚀 AutoSkip CLI using {}", config.server.url);

    let backend = HttpSkipBackend::new(&config.server)?;

    match matches.subcommand() {
        Some(("ping", _)) => ping(&backend).await,
        Some(("lookup", args)) => lookup(&backend, args).await,
        Some(("analyze", args)) => analyze(&backend, args).await,
        Some(("correct", args)) => correct(&backend, args).await,
        _ => Err(anyhow::anyhow!("unknown command")),
    }
}

fn init_logging(config: &Config, verbose: bool) {
    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter("autoskip=debug,info")
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(format!("autoskip={},warn", config.logging.level))
            .init();
    }
}

fn print_segment(segment: &SkipSegment) {
    println!(
        "{}\t{}\t{:.1}–{:.1}\t{}\t{} vote(s)",
        segment.id,
        segment.kind.label(),
        segment.start_sec,
        segment.end_sec,
        if segment.verified { "verified" } else { "unverified" },
        segment.display_votes()
    );
}

async fn ping(backend: &HttpSkipBackend) -> Result<()> {
    if backend.ping().await? {
        info!("✅ Server is up");
        println!("pong");
        Ok(())
    } else {
        error!("❌ Server answered without pong");
        Err(anyhow::anyhow!("unexpected ping response"))
    }
}

async fn lookup(backend: &HttpSkipBackend, args: &ArgMatches) -> Result<()> {
    let ids: Vec<&String> = args
        .get_many::<String>("media-id")
        .map(|values| values.collect())
        .unwrap_or_default();

    let results = join_all(ids.iter().map(|id| backend.lookup(id))).await;

    let mut failed = 0;
    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(Some(segments)) if !segments.is_empty() => {
                println!("{} ({} segment(s))", id, segments.len());
                segments.iter().for_each(print_segment);
            }
            Ok(_) => println!("{}: no segments", id),
            Err(e) => {
                warn!("❌ Lookup failed for {}: {}", id, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(anyhow::anyhow!("{} lookup(s) failed", failed));
    }
    Ok(())
}

async fn analyze(backend: &HttpSkipBackend, args: &ArgMatches) -> Result<()> {
    let file = PathBuf::from(
        args.get_one::<String>("file")
            .context("missing audio file")?,
    );
    let media_id = args
        .get_one::<String>("media-id")
        .context("missing media id")?
        .clone();
    let start_time: f64 = args
        .get_one::<String>("start-time")
        .context("missing start time")?
        .parse()
        .context("start time must be a number")?;

    let audio = tokio::fs::read(&file)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?;
    info!("🎙️ Read {:.2} KB from {}", audio.len() as f64 / 1024.0, file.display());

    let result = backend
        .analyze_audio(AudioSubmission {
            audio,
            media_id,
            start_time: start_time.max(0.0).floor(),
        })
        .await?;

    if result.segments.is_empty() {
        println!("Fingerprint stored, no match yet");
    } else {
        result.segments.iter().for_each(print_segment);
    }
    Ok(())
}

async fn correct(backend: &HttpSkipBackend, args: &ArgMatches) -> Result<()> {
    let raw_id = args
        .get_one::<String>("segment-id")
        .context("missing segment id")?;
    let id = raw_id
        .parse::<i64>()
        .map(SegmentId::Number)
        .unwrap_or_else(|_| SegmentId::Text(raw_id.clone()));

    let start: f64 = args
        .get_one::<String>("start")
        .context("missing start")?
        .parse()
        .context("start must be a number")?;
    let end: f64 = args
        .get_one::<String>("end")
        .context("missing end")?
        .parse()
        .context("end must be a number")?;

    let correction = validate_timing(start, end)?;
    let updated = backend.update_segment(&id, correction).await?;

    info!("✅ Skip timing updated successfully");
    print_segment(&updated);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let matches = cli()
            .try_get_matches_from(["autoskip", "lookup", "tt1_1_1", "tt1_1_2", "--server", "http://x:1"])
            .unwrap();
        assert_eq!(matches.get_one::<String>("server").map(String::as_str), Some("http://x:1"));
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "lookup");
        assert_eq!(args.get_many::<String>("media-id").unwrap().count(), 2);
    }

    #[test]
    fn test_correct_requires_both_times() {
        assert!(cli()
            .try_get_matches_from(["autoskip", "correct", "42", "--start", "10"])
            .is_err());
    }
}
