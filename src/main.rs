#[cfg(not(feature = "streaming"))]
fn main() {
    eprintln!(
        "The gotchi CLI requires the \"streaming\" feature. Rebuild with `--features streaming` to enable playback."
    );
}

#[cfg(feature = "streaming")]
mod cli {
    use std::io::{self, Read, Write};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use anyhow::Context;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    use gotchi::app::{self, try_send, AppContext};
    use gotchi::audio::AudioDevice;
    use gotchi::config::Config;
    use gotchi::diag::DiagLayer;
    use gotchi::game::ButtonEvent;
    use gotchi::render::{AnsiSink, FrameSink, NullSink};
    use gotchi::voice::phrases::{character_index, CHARACTERS};
    use gotchi::voice::stt::SilenceCapture;

    const STATUS_UPDATE: Duration = Duration::from_millis(250);

    /// Double-tap window for the keyboard input mapping
    const DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(350);

    #[cfg(unix)]
    fn set_raw_terminal(enable: bool) {
        let mut cmd = std::process::Command::new("stty");
        if enable {
            cmd.arg("-echo").arg("raw");
        } else {
            cmd.arg("echo").arg("-raw");
        }
        let _ = cmd.status();
    }

    #[cfg(not(unix))]
    fn set_raw_terminal(_enable: bool) {}

    struct Flags {
        config_path: Option<String>,
        host_override: Option<String>,
        show_frame: bool,
        show_help: bool,
    }

    fn parse_flags() -> Flags {
        let mut flags = Flags {
            config_path: None,
            host_override: None,
            show_frame: true,
            show_help: false,
        };
        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => flags.config_path = args.next(),
                "--host" => flags.host_override = args.next(),
                "--no-frame" => flags.show_frame = false,
                "--help" | "-h" => flags.show_help = true,
                _ if arg.starts_with("--host=") => {
                    flags.host_override = Some(arg[7..].to_string());
                }
                _ if arg.starts_with('-') => {
                    eprintln!("Unknown flag: {}", arg);
                    flags.show_help = true;
                }
                _ => flags.config_path = Some(arg),
            }
        }
        flags
    }

    pub fn run() -> anyhow::Result<()> {
        let flags = parse_flags();
        if flags.show_help {
            eprintln!(
                "Usage:\n  gotchi [--config <file.json>] [--host <tts-host[:port]>] [--no-frame]\n\nKeys:\n  t        tap (pet / clean)\n  d        double-tap (switch character)\n  h        hold / release (push-to-talk)\n  q        quit\n"
            );
            return Ok(());
        }

        let mut config = match &flags.config_path {
            Some(path) => Config::load(std::path::Path::new(path))
                .with_context(|| format!("loading {path}"))?,
            None => Config::default(),
        };
        if flags.host_override.is_some() {
            config.tts_host = flags.host_override.clone();
        }

        println!("gotchi - virtual pet companion");
        println!("==============================\n");

        let output = AudioDevice::open().context("opening audio output")?;
        let ctx = Arc::new(AppContext::new(config, Box::new(output)));

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(DiagLayer::new(Arc::clone(&ctx.diag)))
            .init();

        #[cfg(feature = "debug-server")]
        let _server = gotchi::server::spawn(Arc::clone(&ctx));
        #[cfg(feature = "debug-server")]
        println!(
            "Debug surface: http://127.0.0.1:{}/status\n",
            ctx.config.http_port
        );

        let (event_tx, event_rx) = app::event_queue();
        let stop = Arc::new(AtomicBool::new(false));
        let sink: Box<dyn FrameSink> = if flags.show_frame {
            Box::new(AnsiSink::new(2))
        } else {
            Box::new(NullSink::default())
        };
        let handles = app::spawn_tasks(
            Arc::clone(&ctx),
            event_rx,
            sink,
            Box::new(SilenceCapture),
            Arc::clone(&stop),
            Some(format!("127.0.0.1:{}", ctx.config.http_port)),
        );

        println!("Keys: [t]=tap [d]=double-tap [h]=hold/release [q]=quit\n");

        // Raw-mode key reader on its own thread
        let (key_tx, key_rx) = std::sync::mpsc::channel::<u8>();
        let input_running = Arc::new(AtomicBool::new(true));
        let input_running_reader = Arc::clone(&input_running);
        std::thread::spawn(move || {
            set_raw_terminal(true);
            let mut stdin = io::stdin();
            let mut buf = [0u8; 1];
            while input_running_reader.load(Ordering::Relaxed) {
                if stdin.read_exact(&mut buf).is_ok() {
                    let _ = key_tx.send(buf[0]);
                    if buf[0] == b'\x03' {
                        break;
                    }
                }
            }
            set_raw_terminal(false);
        });

        let started = Instant::now();
        let mut holding = false;
        let mut last_tap: Option<Instant> = None;

        loop {
            std::thread::sleep(STATUS_UPDATE);

            while let Ok(key) = key_rx.try_recv() {
                match key {
                    b't' | b'T' | b' ' => {
                        // Collapse rapid taps into a double-tap
                        let now = Instant::now();
                        if last_tap.is_some_and(|t| now - t < DOUBLE_TAP_WINDOW) {
                            last_tap = None;
                            try_send(&event_tx, ButtonEvent::DoubleTap);
                        } else {
                            last_tap = Some(now);
                            try_send(&event_tx, ButtonEvent::Tap);
                        }
                    }
                    b'd' | b'D' => {
                        try_send(&event_tx, ButtonEvent::DoubleTap);
                    }
                    b'h' | b'H' => {
                        holding = !holding;
                        try_send(
                            &event_tx,
                            if holding {
                                ButtonEvent::Hold
                            } else {
                                ButtonEvent::HoldRelease
                            },
                        );
                    }
                    b'q' | b'Q' | b'\x03' => {
                        input_running.store(false, Ordering::Relaxed);
                        stop.store(true, Ordering::Relaxed);
                    }
                    _ => {}
                }
            }

            if stop.load(Ordering::Relaxed) {
                break;
            }

            let ci = character_index(ctx.current_character());
            let phrase = ctx.current_phrase().unwrap_or_default();
            let slots_msg = {
                let slots = ctx.voice_slots.lock();
                format!("{}/{}", slots[0].message, slots[1].message)
            };
            print!(
                "\x1B[2K\r[{:>6.1}s] {} | voice: {} | {}",
                started.elapsed().as_secs_f32(),
                CHARACTERS[ci].name,
                slots_msg,
                phrase,
            );
            io::stdout().flush().ok();
        }

        set_raw_terminal(false);
        println!("\nShutting down");
        for handle in handles {
            handle.join().expect("worker thread panicked during shutdown");
        }
        Ok(())
    }
}

#[cfg(feature = "streaming")]
fn main() -> anyhow::Result<()> {
    cli::run()
}
