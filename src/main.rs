mod cli;

use mediaforge::{config, dump, probe};
use mediaforge_common::TrackKind;
use mediaforge_media::{parse_reader, Mp4Muxer};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::fs::File;
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediaforge=trace,mediaforge_media=trace,mediaforge_probe=debug".to_string()
        } else {
            "mediaforge=info,mediaforge_media=warn,mediaforge_probe=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Probe { file, json } => probe_file(&file, json, cli.config.as_deref()),
        Commands::Dump { file, depth } => dump_file(&file, depth),
        Commands::Moov { file, output } => write_moov(&file, &output, cli.config.as_deref()),
        Commands::Remux { file, output } => remux_file(&file, &output, cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

fn require_file(file: &Path) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }
    Ok(())
}

fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    require_file(file)?;

    let report = probe::probe_file(file, config.input.chunk_size)?;

    if json || config.output.json {
        let json_str = serde_json::to_string_pretty(&report)?;
        println!("{}", json_str);
        return Ok(());
    }

    println!("File: {}", report.file.display());
    println!("Format: {}", report.format);
    println!("Size: {} bytes", report.size);

    println!("\nTracks: {}", report.tracks.len());
    for entry in &report.tracks {
        let track = &entry.track;
        match &track.kind {
            TrackKind::Video(video) => {
                print!(
                    "  [{}] video {} {}x{}",
                    track.track_id, track.codec, video.width, video.height
                );
                if video.rotation != 0 {
                    print!(", rotated {}", video.rotation);
                }
                if let Some(fps) = video.fps {
                    print!(", {:.3} fps", fps.as_f64());
                }
                println!();
                if let Some(ref color) = video.color {
                    println!(
                        "      colour: {:?}/{:?}/{:?}{}",
                        color.primaries,
                        color.transfer_characteristics,
                        color.matrix_coefficients,
                        if color.full_range { " full range" } else { "" }
                    );
                }
            }
            TrackKind::Audio(audio) => {
                println!(
                    "  [{}] audio {} {} Hz {}ch",
                    track.track_id, track.codec, audio.sample_rate, audio.number_of_channels
                );
            }
        }
        let stats = &entry.stats;
        println!(
            "      {} samples ({} key), {} bytes, {:.3} s",
            stats.samples,
            stats.key_frames,
            stats.bytes,
            stats.seconds(track.timescale)
        );
    }

    Ok(())
}

fn dump_file(file: &Path, depth: Option<usize>) -> Result<()> {
    require_file(file)?;
    let stdout = std::io::stdout();
    dump::dump_file(file, &mut stdout.lock(), depth)
}

/// Demux `file` into a muxer configured from the `[mux]` section.
fn demux_into_muxer(file: &Path, config_path: Option<&Path>) -> Result<Mp4Muxer> {
    let config = config::load_config_or_default(config_path)?;
    require_file(file)?;

    let input = File::open(file).with_context(|| format!("Failed to open {:?}", file))?;
    let session = parse_reader(input, config.input.chunk_size, config.mux.muxer())
        .with_context(|| format!("Failed to parse {:?}", file))?;
    tracing::info!(
        format = ?session.format(),
        tracks = session.tracks().count(),
        "Demuxed input"
    );
    Ok(session.into_sink())
}

fn write_moov(file: &Path, output: &Path, config_path: Option<&Path>) -> Result<()> {
    let muxer = demux_into_muxer(file, config_path)?;
    let moov = muxer.moov().context("Failed to build movie box")?;
    std::fs::write(output, &moov).with_context(|| format!("Failed to write {:?}", output))?;
    println!(
        "Wrote {} byte movie box for {} tracks to {}",
        moov.len(),
        muxer.tracks().len(),
        output.display()
    );
    Ok(())
}

fn remux_file(file: &Path, output: &Path, config_path: Option<&Path>) -> Result<()> {
    let muxer = demux_into_muxer(file, config_path)?;
    let tracks = muxer.tracks().len();
    let samples = muxer.sample_count();
    let data = muxer.finish().context("Failed to mux MP4")?;
    std::fs::write(output, &data).with_context(|| format!("Failed to write {:?}", output))?;
    println!(
        "Wrote {} ({} tracks, {} samples, {} bytes)",
        output.display(),
        tracks,
        samples,
        data.len()
    );
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Chunk size: {} bytes", config.input.chunk_size);
            println!("  Header length: {} bytes", config.mux.header_length);
            if let Some(ref tool) = config.mux.tool {
                println!("  Tool: {}", tool);
            }
            if let Some(ref comment) = config.mux.comment {
                println!("  Comment: {}", comment);
            }
            println!("  JSON output: {}", config.output.json);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Chunk size: {} bytes", config.input.chunk_size);
            println!("  Header length: {} bytes", config.mux.header_length);
        }
    }

    Ok(())
}
