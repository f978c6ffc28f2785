use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use wav_recorder_core::processing::wav_format::{read_header, BITS_PER_SAMPLE};
use wav_recorder_core::{
    record_fixed_duration, CaptureConfiguration, CaptureDelegate, CaptureError, CaptureProvider,
    CaptureState, RecordingResult, RecordingSession,
};
use wav_recorder_cpal::{CpalInputCapture, DeviceEnumerator};

#[derive(Parser)]
#[command(name = "wav-recorder")]
#[command(about = "Record audio from an input device to a 16-bit PCM WAV file")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record until Enter is pressed (or for a fixed duration)
    Record {
        /// Output WAV file path
        #[arg(short, long)]
        output: PathBuf,

        /// Frame rate in Hz
        #[arg(short, long, default_value_t = 44100)]
        rate: u32,

        /// Number of interleaved channels
        #[arg(short, long, default_value_t = 2)]
        channels: u16,

        /// Input device id, as listed by `devices`
        #[arg(short, long)]
        device: Option<String>,

        /// Record exactly this many seconds into memory, then write the file
        #[arg(long, conflicts_with = "max_secs")]
        duration: Option<f64>,

        /// Stop automatically after this many seconds
        #[arg(long)]
        max_secs: Option<u64>,
    },
    /// List available input devices
    Devices,
    /// Print the header of a WAV file
    Inspect {
        /// WAV file to read
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Record {
            output,
            rate,
            channels,
            device,
            duration,
            max_secs,
        } => {
            let config = CaptureConfiguration {
                sample_rate: rate,
                channels,
                device_id: device,
                max_duration_secs: max_secs,
                ..Default::default()
            };
            match duration {
                Some(secs) => run_fixed(&output, config, secs),
                None => run_interactive(&output, config),
            }
        }
        Command::Devices => list_devices(),
        Command::Inspect { file } => inspect(&file),
    }
}

fn open_input(config: &CaptureConfiguration) -> Result<CpalInputCapture> {
    match &config.device_id {
        Some(id) => Ok(CpalInputCapture::with_device(id.clone())),
        None => CpalInputCapture::default_device().context("No default input device"),
    }
}

/// Prints elapsed seconds on one line while recording.
struct ConsoleDelegate;

impl CaptureDelegate for ConsoleDelegate {
    fn on_state_changed(&self, state: CaptureState) {
        log::debug!("state: {}", state);
    }

    fn on_elapsed(&self, elapsed_secs: u64) {
        print!("\rRecording: {}s    ", elapsed_secs);
        std::io::stdout().flush().ok();
    }

    fn on_error(&self, error: &CaptureError) {
        eprintln!("\nError: {}", error);
    }

    fn on_capture_finished(&self, _result: &RecordingResult) {}
}

/// Record until Enter is pressed or the maximum duration is reached. End of
/// input stops the recording only when no maximum is set.
fn run_interactive(output: &Path, config: CaptureConfiguration) -> Result<()> {
    let input = open_input(&config)?;
    println!("Input device: {}", input_name(&input));
    println!("Output file: {}", output.display());
    println!("Format: {} Hz, {} ch, 16-bit", config.sample_rate, config.channels);
    if let Some(max) = config.max_duration_secs {
        println!("Stopping after {}s", max);
    }
    println!("Press Enter to stop\n");
    let has_limit = config.max_duration_secs.is_some();

    let mut session = RecordingSession::new(input, config)?;
    session.set_delegate(Arc::new(ConsoleDelegate));
    let handle = session
        .begin_session(output)
        .with_context(|| format!("Failed to start recording to {}", output.display()))?;

    let stopper = handle.clone();
    std::thread::spawn(move || {
        let mut line = String::new();
        let read = std::io::stdin().lock().read_line(&mut line);
        match read {
            Ok(n) if stops_on_input(n, has_limit) => stopper.signal_stop(),
            Ok(_) => log::info!("stdin closed; recording until the time limit"),
            Err(e) => {
                log::warn!("failed to read stdin: {}", e);
                if !has_limit {
                    stopper.signal_stop();
                }
            }
        }
    });

    let result = session.wait()?;
    println!("\n\nRecording complete!");
    print_result(&result);
    if handle.take_success_indicator() {
        println!("Saved successfully.");
    }
    Ok(())
}

/// Whether a read of `bytes_read` from stdin should stop the recording.
///
/// A line always stops it. End of input only stops it when nothing else
/// would: with `--max-secs` the recording runs to the limit.
fn stops_on_input(bytes_read: usize, has_limit: bool) -> bool {
    bytes_read > 0 || !has_limit
}

fn run_fixed(output: &Path, config: CaptureConfiguration, secs: f64) -> Result<()> {
    if !(secs.is_finite() && secs > 0.0) {
        anyhow::bail!("--duration must be a positive number of seconds");
    }
    let mut input = open_input(&config)?;
    println!("Input device: {}", input_name(&input));
    println!("Recording {:.2}s to {}...", secs, output.display());

    let result = record_fixed_duration(&mut input, output, &config, Duration::from_secs_f64(secs))
        .with_context(|| format!("Failed to record {}", output.display()))?;
    println!("Recording complete!");
    print_result(&result);
    Ok(())
}

fn input_name(input: &CpalInputCapture) -> String {
    input.device_info().name
}

fn print_result(result: &RecordingResult) {
    println!("Output: {}", result.file_path.display());
    println!("  Duration: {:.2}s ({} frames)", result.duration_secs(), result.frames());
    println!("  Data: {} bytes", result.data_bytes);
    println!("  SHA-256: {}", result.checksum);
    println!(
        "  Levels: peak {:.3}, mean {:.3}",
        result.levels.peak_level, result.levels.mean_level
    );
    if result.diagnostics.samples_dropped > 0 {
        println!("  Dropped: {} samples", result.diagnostics.samples_dropped);
    }
    if result.diagnostics.write_errors > 0 {
        println!("  Write errors: {}", result.diagnostics.write_errors);
    }
}

fn list_devices() -> Result<()> {
    let devices = DeviceEnumerator::new().list_input_devices()?;
    if devices.is_empty() {
        println!("No input devices found.");
        return Ok(());
    }
    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        println!("{} {}", marker, device.name);
    }
    Ok(())
}

fn inspect(file: &Path) -> Result<()> {
    let header = read_header(file).with_context(|| format!("Failed to read {}", file.display()))?;
    println!("{}", file.display());
    println!("  Sample rate: {} Hz", header.spec.frame_rate);
    println!("  Channels: {}", header.spec.channels);
    println!("  Bits per sample: {}", BITS_PER_SAMPLE);
    println!("  Data: {} bytes ({} frames, {:.2}s)", header.data_size, header.frames(), header.duration_secs());
    Ok(())
}
