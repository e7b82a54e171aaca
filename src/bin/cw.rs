// src/bin/cw.rs — line-oriented CW sender
//
// Reads text from stdin (or --infile), parses it through the stream
// protocol, and keys it out through the configured audio backend. Stream
// protocol parameter commands are ack/nak-reported on stderr; the library
// itself performs no formatting, per the error-handling contract.

use anyhow::{Context, Result};
use clap::Parser;
use libcw::audio::AudioSystem;
use libcw::engine::Engine;
use libcw::stream::{StreamEvent, StreamParser};
use std::io::Read;

#[derive(Parser, Debug)]
#[command(name = "cw", about = "Line-oriented CW (Morse code) sender", version)]
struct Cli {
    /// Audio system: none | console | oss | alsa | pulseaudio | soundcard
    #[arg(short = 's', long = "system", default_value = "soundcard")]
    system: String,

    /// Audio device (backend-specific; default per backend)
    #[arg(short = 'd', long = "device")]
    device: Option<String>,

    /// Sending speed in words per minute [4, 60]
    #[arg(short = 'w', long = "wpm", default_value_t = 12)]
    wpm: u32,

    /// Sidetone frequency in Hz [0, 4000]
    #[arg(short = 't', long = "tone", default_value_t = 800)]
    tone: u32,

    /// Volume percent [0, 100]
    #[arg(short = 'v', long = "volume", default_value_t = 70)]
    volume: u32,

    /// Extra inter-word gap in dot units [0, 60]
    #[arg(short = 'g', long = "gap", default_value_t = 0)]
    gap: u32,

    /// Dot/dash weighting percent [20, 80]
    #[arg(short = 'k', long = "weighting", default_value_t = 50)]
    weighting: u32,

    /// Read input from this file instead of stdin
    #[arg(short = 'f', long = "infile")]
    infile: Option<std::path::PathBuf>,

    /// Disable echoing of plain-text characters to stdout as they are sent
    #[arg(short = 'e', long = "noecho", action)]
    noecho: bool,

    /// Suppress NAK/ACK messages on stderr
    #[arg(short = 'm', long = "nomessages", action)]
    nomessages: bool,

    /// Disable %-command parsing
    #[arg(short = 'c', long = "nocommands", action)]
    nocommands: bool,

    /// Disable [...] combination parsing
    #[arg(short = 'o', long = "nocombinations", action)]
    nocombinations: bool,

    /// Disable {...} comment parsing
    #[arg(short = 'p', long = "nocomments", action)]
    nocomments: bool,
}

fn parse_audio_system(s: &str) -> Result<AudioSystem> {
    match s.to_ascii_lowercase().as_str() {
        "none" => Ok(AudioSystem::None),
        "console" => Ok(AudioSystem::Console),
        "oss" => Ok(AudioSystem::Oss),
        "alsa" => Ok(AudioSystem::Alsa),
        "pulseaudio" | "pulse" => Ok(AudioSystem::PulseAudio),
        "soundcard" => Ok(AudioSystem::SoundCard),
        other => anyhow::bail!("unrecognized audio system '{other}'"),
    }
}

/// `CW_OPTIONS` supplies extra arguments prepended to argv, so a user can
/// set site-wide defaults in their shell profile without a wrapper script.
fn effective_args() -> Vec<String> {
    let mut args: Vec<String> = std::env::args().collect();
    if let Ok(extra) = std::env::var("CW_OPTIONS") {
        let mut combined = vec![args[0].clone()];
        combined.extend(extra.split_whitespace().map(String::from));
        combined.extend(args.drain(1..));
        return combined;
    }
    args
}

/// `LIBCW_DEBUG` is a numeric bitmask; any nonzero value turns on verbose
/// (debug-level) logging, since the categories it historically gated are
/// not meaningfully distinct at the `log` facade's granularity.
fn init_logging() {
    let debug_mask: u32 =
        std::env::var("LIBCW_DEBUG").ok().and_then(|v| v.parse().ok()).unwrap_or(0);
    let mut builder = env_logger::Builder::from_default_env();
    if debug_mask != 0 && std::env::var("RUST_LOG").is_err() {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse_from(effective_args());

    let system = parse_audio_system(&cli.system)?;

    let mut input = String::new();
    match &cli.infile {
        Some(path) => {
            input = std::fs::read_to_string(path)
                .with_context(|| format!("reading input file {}", path.display()))?;
        }
        None => {
            std::io::stdin()
                .read_to_string(&mut input)
                .context("reading stdin")?;
        }
    }

    let mut engine = Engine::new();
    {
        let mut timing = engine.timing.lock().unwrap();
        timing.set_send_speed(cli.wpm).context("--wpm out of range")?;
        timing.set_frequency(cli.tone).context("--tone out of range")?;
        timing.set_volume(cli.volume).context("--volume out of range")?;
        timing.set_gap(cli.gap).context("--gap out of range")?;
        timing.set_weighting(cli.weighting).context("--weighting out of range")?;
    }

    engine
        .start_generator(system, cli.device.as_deref())
        .context("opening audio backend")?;

    let mut parser = StreamParser::default();
    parser.options.do_commands = !cli.nocommands;
    parser.options.do_combinations = !cli.nocombinations;
    parser.options.do_comments = !cli.nocomments;

    let mut do_echo = !cli.noecho;
    let mut do_messages = !cli.nomessages;

    let mut had_error = false;
    let events = parser.parse(&input);
    for event in events {
        match event {
            StreamEvent::Send { c, suppress_trailing_gap } => {
                if do_echo {
                    print!("{c}");
                }
                let result = if suppress_trailing_gap {
                    engine.sender.send_character_partial(c)
                } else {
                    engine.sender.send_character(c)
                };
                if let Err(e) = result {
                    had_error = true;
                    if do_messages {
                        eprintln!("<NAK>{c}[{e}]");
                    }
                }
            }
            StreamEvent::Echo(c) => {
                print!("{c}");
            }
            // 'E'/'M'/'C'/'O'/'P' are boolean stream toggles handled here
            // directly (echo/message flags are local to the driver loop;
            // C/O/P already took effect inside `parser.parse` itself, so
            // this arm only needs to ack them).
            StreamEvent::SetParameter { letter: 'E', value } => {
                do_echo = value != 0;
                if do_messages {
                    eprintln!("<ACK>E{value}");
                }
            }
            StreamEvent::SetParameter { letter: 'M', value } => {
                do_messages = value != 0;
                if do_messages {
                    eprintln!("<ACK>M{value}");
                }
            }
            StreamEvent::SetParameter { letter: letter @ ('C' | 'O' | 'P'), value } => {
                if do_messages {
                    eprintln!("<ACK>{letter}{value}");
                }
            }
            StreamEvent::SetParameter { letter, value } => {
                match apply_parameter(&mut engine, letter, value) {
                    Ok(()) => {
                        if do_messages {
                            eprintln!("<ACK>{letter}{value}");
                        }
                    }
                    Err(e) => {
                        had_error = true;
                        if do_messages {
                            eprintln!("<NAK>{letter}[{e}]");
                        }
                    }
                }
            }
            StreamEvent::Query { letter } => {
                if let Some(value) = query_parameter(&engine, letter) {
                    println!("{value}");
                }
            }
            StreamEvent::SpokenQuery { letter } => {
                if let Some(value) = query_parameter(&engine, letter) {
                    engine.sender.send_string(&value.to_string()).ok();
                }
            }
            StreamEvent::Quit => break,
        }
    }

    engine.stop_generator();
    std::process::exit(if had_error { 1 } else { 0 });
}

/// Handles the value-setting letters of the §6 parameter-command table
/// (F, V, S, G, K); E/M/C/O/P are boolean toggles handled inline in the
/// event loop, and Q is handled as `StreamEvent::Quit`.
fn apply_parameter(engine: &mut Engine, letter: char, value: i64) -> libcw::Result<()> {
    let mut timing = engine.timing.lock().unwrap();
    match letter {
        'S' => timing.set_send_speed(value as u32),
        'F' => timing.set_frequency(value as u32),
        'V' => timing.set_volume(value as u32),
        'G' => timing.set_gap(value as u32),
        'K' => timing.set_weighting(value as u32),
        _ => Err(libcw::CwError::BadArgument { field: "letter", value: letter.to_string() }),
    }
}

fn query_parameter(engine: &Engine, letter: char) -> Option<u32> {
    let timing = engine.timing.lock().unwrap();
    match letter {
        'S' => Some(timing.send_speed()),
        'F' => Some(timing.frequency()),
        'V' => Some(timing.volume()),
        _ => None,
    }
}
