//! motif: generate, render and match patterns from the command line
//!
//! Usage:
//!   motif generate [--kind chord|melody|hybrid] [--key C] [--mode major|minor]
//!     [--bars N] [--genre N] [--seed N] [--root NOTE] [--velocity N]
//!     [--channel N] [--candidates N] [--swing N] [--json]
//!   motif render [--blocks N] [--bpm BPM] [--sample-rate HZ] [--block-size N]
//!     [--root NOTE] [--chord] [--json]
//!   motif match FILE.mid [--json]
//!   motif config

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use motif_core::{
    generate_best, BarLength, GeneratedPattern, GenerationType, HostPosition, MidiEvent, PatternSettings, ScaleMode,
    TemplateLibrary, GENRES, KEYS,
};
use motif_services::{config_path, load_config, read_midi_file, EngineConfig, MotifEngine};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("motif=debug".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = load_config();

    match args.get(1).map(String::as_str) {
        Some("generate") => cmd_generate(&args, &config),
        Some("render") => cmd_render(&args, config),
        Some("match") => cmd_match(&args),
        Some("config") => cmd_config(&config),
        Some(other) => bail!("unknown command '{other}' (expected generate, render, match or config)"),
        None => bail!("usage: motif <generate|render|match|config> [options]"),
    }
}

fn cmd_generate(args: &[String], config: &EngineConfig) -> Result<()> {
    let settings = settings_from_args(args, config.generation.initial)?;
    let seed: u32 = parse_flag(args, "--seed").unwrap_or(1);
    let root: u8 = parse_flag(args, "--root").unwrap_or(60);
    let velocity: u8 = parse_flag(args, "--velocity").unwrap_or(100);
    let channel: u8 = parse_flag(args, "--channel").unwrap_or(1);
    let candidates: u32 = parse_flag(args, "--candidates").unwrap_or(config.generation.candidates);
    let follow = if settings.kind == GenerationType::Hybrid { config.generation.ui_follow_chance } else { 0.0 };

    let library = TemplateLibrary::builtin();
    let params = settings.params(settings.kind, seed, follow);
    let best = generate_best(&params, root as i32, velocity as i32, channel, &library, candidates);

    if has_flag(args, "--json") {
        println!("{}", serde_json::to_string_pretty(&best)?);
        return Ok(());
    }

    println!("=== {} {} in {} {} ===", settings.genre_name(), settings.kind, settings.key_name(), settings.mode.name());
    println!("Bars: {}  Seed: {}  Score: {:.3}", settings.bars.bars(), best.seed, best.score);
    print_pattern(&best.pattern);
    Ok(())
}

fn cmd_render(args: &[String], mut config: EngineConfig) -> Result<()> {
    let blocks: u64 = parse_flag(args, "--blocks").unwrap_or(400);
    let bpm: f64 = parse_flag(args, "--bpm").unwrap_or(config.playback.default_bpm);
    let sample_rate: f64 = parse_flag(args, "--sample-rate").unwrap_or(48_000.0);
    let block_size: u32 = parse_flag(args, "--block-size").unwrap_or(512);
    let root: u8 = parse_flag(args, "--root").unwrap_or(60);

    if !config.playback.supports_sample_rate(sample_rate) {
        bail!(
            "sample rate {sample_rate} outside {}..={}",
            config.playback.min_sample_rate,
            config.playback.max_sample_rate
        );
    }
    if block_size == 0 {
        bail!("block size must be positive");
    }

    config.generation.initial = settings_from_args(args, config.generation.initial)?;
    config.worker.threaded = false;
    let mut engine = MotifEngine::inline(config, Arc::new(TemplateLibrary::builtin()));

    // A four-note stack is read as a chord and generates a hybrid pattern
    let trigger: Vec<MidiEvent> = if has_flag(args, "--chord") {
        [0, 4, 7, 11].iter().map(|i| MidiEvent::note_on(root.saturating_add(*i), 100, 1, 0)).collect()
    } else {
        vec![MidiEvent::note_on(root, 100, 1, 0)]
    };

    let samples_per_quarter = sample_rate * 60.0 / bpm;
    let mut rendered: Vec<(u64, MidiEvent)> = Vec::new();
    for block in 0..blocks {
        let start = block * block_size as u64;
        let position = HostPosition::new(bpm, start as f64 / samples_per_quarter);
        let input: &[MidiEvent] = if block == 0 { &trigger } else { &[] };
        let events = engine.process_block(position, sample_rate, block_size, input);
        rendered.extend(events.into_iter().map(|e| (start + e.sample_offset as u64, e)));
    }

    if has_flag(args, "--json") {
        let events: Vec<serde_json::Value> = rendered
            .iter()
            .map(|(sample, e)| serde_json::json!({ "sample": sample, "event": e }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    println!("Rendered {} blocks of {} samples at {} Hz, {} BPM", blocks, block_size, sample_rate, bpm);
    for (sample, e) in &rendered {
        let kind = if e.is_note_on { "on " } else { "off" };
        println!(
            "{:>10}  {:>8.3}q  {} ch{:<2} note {:>3} vel {:>3}",
            sample,
            *sample as f64 / samples_per_quarter,
            kind,
            e.channel,
            e.note,
            e.velocity
        );
    }
    println!("{} events", rendered.len());
    Ok(())
}

fn cmd_match(args: &[String]) -> Result<()> {
    let Some(path) = args.get(2).filter(|s| !s.starts_with("--")) else {
        bail!("usage: motif match FILE.mid [--json]");
    };
    let sequence = read_midi_file(Path::new(path)).with_context(|| format!("importing {path}"))?;
    let library = TemplateLibrary::builtin();
    let result = library.match_sequence(&sequence.quantized());

    if has_flag(args, "--json") {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}: {} notes at {} ticks per quarter", path, sequence.notes.len(), sequence.ticks_per_quarter);
    match result.label() {
        Some(label) => println!("{} (similarity {:.3})", label, result.score),
        None => println!("No match (best similarity {:.3})", result.score),
    }
    Ok(())
}

fn cmd_config(config: &EngineConfig) -> Result<()> {
    println!("# {}", config_path().display());
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn settings_from_args(args: &[String], base: PatternSettings) -> Result<PatternSettings> {
    let mut settings = base;
    if let Some(kind) = parse_flag::<String>(args, "--kind") {
        settings.kind = kind.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(key) = parse_flag::<String>(args, "--key") {
        settings.key = parse_key(&key)?;
    }
    if let Some(mode) = parse_flag::<String>(args, "--mode") {
        settings.mode = match mode.to_ascii_lowercase().as_str() {
            "major" => ScaleMode::Major,
            "minor" => ScaleMode::Minor,
            other => bail!("unknown mode '{other}'"),
        };
    }
    if let Some(bars) = parse_flag(args, "--bars") {
        settings.bars = BarLength::from_bars(bars);
    }
    if let Some(genre) = parse_flag::<u8>(args, "--genre") {
        if genre as usize >= GENRES.len() {
            bail!("genre must be below {}", GENRES.len());
        }
        settings.genre = genre;
    }
    if let Some(swing) = parse_flag(args, "--swing") {
        settings.swing = swing;
    }
    Ok(settings.normalized())
}

/// Key by name (C, F#, Bb) or pitch class number
fn parse_key(key: &str) -> Result<u8> {
    if let Ok(pc) = key.parse::<u8>() {
        return Ok(pc % 12);
    }
    let flats = ["C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B"];
    KEYS.iter()
        .position(|k| k.eq_ignore_ascii_case(key))
        .or_else(|| flats.iter().position(|k| k.eq_ignore_ascii_case(key)))
        .map(|i| i as u8)
        .with_context(|| format!("unknown key '{key}'"))
}

fn print_pattern(pattern: &GeneratedPattern) {
    println!("{} steps, {} tracks, {} notes", pattern.length_steps, pattern.num_tracks, pattern.notes.len());
    for track in 0..pattern.num_tracks {
        let notes: Vec<_> = pattern.track_notes(track).collect();
        if notes.is_empty() {
            continue;
        }
        println!("Track {track}:");
        for n in notes {
            println!(
                "  step {:>3} len {:>2}  note {:>3} vel {:>3} ch {}",
                n.start_step, n.length_steps, n.note, n.velocity, n.channel
            );
        }
    }
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).and_then(|v| v.parse().ok())
}
