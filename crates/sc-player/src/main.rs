//! SC1000 - portable scratch instrument.
//!
//! Wires the pieces together: configuration, the audio hardware and
//! engine, the two decks, the input thread and the rig's main loop.

mod input;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use sc_core::audio::AudioHardware;
use sc_core::config::load_config;
use sc_core::dsp::InterpolationMode;
use sc_core::platform::NullInputs;
use sc_core::{Rig, Sc1000};

use input::InputContext;

struct Cli {
    root: PathBuf,
    log_level: String,
    log_file: Option<PathBuf>,
    interpolation: InterpolationMode,
    show_stats: bool,
}

const USAGE: &str = "usage: sc1000 [options]
  --root PATH            media root (default /media/sda)
  --log-console          log to stderr (default)
  --log-file             log to <root>/sc1000.log
  --log-file-path PATH   log to PATH
  --log-level LEVEL      debug|info|warn|error (default info)
  --cubic                4-tap cubic interpolation
  --sinc                 16-tap sinc interpolation (default)
  --show-stats           periodic DSP/input statistics";

fn parse_args() -> Result<Cli> {
    let mut cli = Cli {
        root: PathBuf::from("/media/sda"),
        log_level: "info".to_string(),
        log_file: None,
        interpolation: InterpolationMode::Sinc,
        show_stats: false,
    };

    let mut args = std::env::args().skip(1);
    let mut log_to_file = false;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--root" => {
                cli.root = PathBuf::from(args.next().context("--root needs a path")?);
            }
            "--log-console" => log_to_file = false,
            "--log-file" => log_to_file = true,
            "--log-file-path" => {
                cli.log_file =
                    Some(PathBuf::from(args.next().context("--log-file-path needs a path")?));
            }
            "--log-level" => {
                cli.log_level = args.next().context("--log-level needs a level")?;
            }
            "--cubic" => cli.interpolation = InterpolationMode::Cubic,
            "--sinc" => cli.interpolation = InterpolationMode::Sinc,
            "--show-stats" => cli.show_stats = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("unknown argument {other}\n{USAGE}"),
        }
    }
    if log_to_file && cli.log_file.is_none() {
        cli.log_file = Some(cli.root.join("sc1000.log"));
    }
    Ok(cli)
}

fn init_logging(cli: &Cli) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level));
    builder.format_timestamp_millis();
    if let Some(path) = &cli.log_file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("cannot open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = parse_args()?;
    init_logging(&cli)?;

    log::info!(
        "sc1000 starting ({} interpolation)",
        cli.interpolation.name()
    );

    let config = load_config(&cli.root);

    // USB audio interfaces can take a moment to enumerate at boot
    let audio_delay = config.settings.audio_init_delay;
    if audio_delay > 0 {
        std::thread::sleep(std::time::Duration::from_secs(audio_delay as u64));
    }

    let (mut sc, registry) =
        Sc1000::setup(config, cli.interpolation).context("audio setup failed")?;
    sc.load_sample_folders();
    sc.hardware.start().context("audio start failed")?;

    // Input thread: platform drivers register here; without hardware the
    // null port provides neutral defaults
    let stop = Arc::new(AtomicBool::new(false));
    let input_ctx = InputContext::new(
        Box::new(NullInputs),
        registry,
        [Arc::clone(&sc.decks[0]), Arc::clone(&sc.decks[1])],
        sc.engine.clone(),
        Arc::clone(&sc.settings),
        cli.show_stats,
    );
    let input_stop = Arc::clone(&stop);
    let input_thread = std::thread::Builder::new()
        .name("sc-input".to_string())
        .spawn(move || input_ctx.run(input_stop))
        .context("cannot start input thread")?;

    let mut rig = Rig::new().context("rig init failed")?;
    let result = rig.main_loop(&mut sc);

    stop.store(true, Ordering::Relaxed);
    sc.hardware.stop();
    let _ = input_thread.join();
    log::info!("sc1000 exiting");

    result.map_err(Into::into)
}
