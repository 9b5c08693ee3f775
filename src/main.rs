// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::env;
use std::path::Path;

use anyhow::Result;
use chordarp::config::{validate_config, ConfigWatcher, PerformanceFile};
use chordarp::engine::ChordEngine;
use chordarp::midi::{print_destinations, ByteSink, MidiSink, MidirOutput, TraceSink};
use chordarp::music::{Note, TriadTheory};
use chordarp::runtime::{engine_channel, forward_config_events, play_script, progression_script, run_engine};
use tracing::{info, Level};

/// Rounds of the progression played by --play and --demo
const DEFAULT_ROUNDS: usize = 2;

fn print_usage() {
    println!("CHORDARP - Chord Arpeggiator");
    println!();
    println!("Usage: chordarp [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --list-midi             List available MIDI destinations (outputs)");
    println!("  --play <FILE> [N]       Auto-play a progression with FILE on destination N");
    println!("                          (index or part of a name; without N, notes are");
    println!("                          logged instead of sent)");
    println!("  --demo [N]              Same as --play with the built-in demo performance");
    println!("  --validate <FILE>       Check a performance file and exit");
    println!("  --write-demo <FILE>     Save the built-in demo performance to FILE");
    println!("  --watch                 With --play, reload FILE when it changes");
    println!("  -v, -vv                 More logging");
    println!("  --help                  Show this help message");
}

fn init_logging(verbosity: usize) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

/// Remove a flag from the argument list, returning how often it appeared
fn take_flag(args: &mut Vec<String>, flag: &str) -> usize {
    let before = args.len();
    args.retain(|a| a != flag);
    before - args.len()
}

/// Open a destination given by index or by part of its name
fn open_destination(destination: &str) -> Result<MidirOutput> {
    match destination.parse::<usize>() {
        Ok(index) => MidirOutput::new(index),
        Err(_) => MidirOutput::new_by_name(destination),
    }
}

async fn perform<S: MidiSink + Send + 'static>(
    file: PerformanceFile,
    sink: S,
    watch: Option<&Path>,
) -> Result<S> {
    let state = file.into_state()?;
    let tempo = state.song.tempo;
    let engine = ChordEngine::new(state, Box::new(TriadTheory));

    let (handle, inputs) = engine_channel();
    let task = tokio::spawn(run_engine(engine, sink, inputs));

    let _forwarder = match watch {
        Some(path) => {
            let watcher = ConfigWatcher::new(path, None)?;
            info!(path = ?path, "watching performance file");
            Some(forward_config_events(watcher, handle.clone()))
        }
        None => None,
    };

    println!("Playing \"{}\" at {} BPM (press Ctrl+C to stop)...", file.song.name, tempo);
    let script = play_script(handle.clone(), progression_script(tempo, DEFAULT_ROUNDS));
    tokio::select! {
        result = script => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("Stopping...");
            handle.shutdown()?;
        }
    }

    let (_, sink) = task.await?;
    println!("Done.");
    Ok(sink)
}

async fn play(file: PerformanceFile, destination: Option<&String>, watch: Option<&Path>) -> Result<()> {
    match destination {
        Some(destination) => {
            println!("Connecting to MIDI destination {}...", destination);
            let output = open_destination(destination)?;
            println!("Connected to {}", output.port_name());
            let mut sink = perform(file, ByteSink::new(output), watch).await?;
            sink.all_notes_off();
        }
        None => {
            perform(file, TraceSink, watch).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args: Vec<String> = env::args().collect();
    let verbosity = take_flag(&mut args, "-v") + 2 * take_flag(&mut args, "-vv");
    let watch = take_flag(&mut args, "--watch") > 0;
    init_logging(verbosity);

    if args.len() < 2 {
        println!("CHORDARP - Chord Arpeggiator");
        println!("Run with --help for usage information");
        return Ok(());
    }

    match args[1].as_str() {
        "--list-midi" => {
            print_destinations();
        }
        "--play" => {
            if args.len() < 3 {
                eprintln!("Error: --play requires a performance file");
                std::process::exit(1);
            }
            let path = Path::new(&args[2]);
            let file = validate_config(path)?;
            play(file, args.get(3), watch.then_some(path)).await?;
        }
        "--demo" => {
            play(PerformanceFile::demo(), args.get(2), None).await?;
        }
        "--validate" => {
            if args.len() < 3 {
                eprintln!("Error: --validate requires a performance file");
                std::process::exit(1);
            }
            let file = validate_config(&args[2])?;
            let state = file.into_state()?;
            println!(
                "{}: \"{}\", {} BPM in {}, {} part(s)",
                args[2],
                file.song.name,
                state.song.tempo,
                Note::from_pitch_class(state.slot_key()),
                file.parts.len()
            );
        }
        "--write-demo" => {
            if args.len() < 3 {
                eprintln!("Error: --write-demo requires a file name");
                std::process::exit(1);
            }
            PerformanceFile::demo().save(&args[2])?;
            println!("Wrote {}", args[2]);
        }
        "--help" | "-h" => {
            print_usage();
        }
        _ => {
            eprintln!("Unknown option: {}", args[1]);
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}
