use clap::{Parser, Subcommand};
use optipulse_signals::{analyze_trace, Calibrator, PulseConfig};
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit code when the trace cannot be opened.
const SOURCE_FAILED: u8 = 2;

#[derive(Parser)]
#[command(name = "optipulse", version, about = "Heart rate from recorded skin-colour traces")]
struct Cli {
    /// TOML configuration file (OPTIPULSE_* variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a whole trace and print the session summary
    Analyze {
        trace: PathBuf,
        /// Frame rate of the trace
        #[arg(long)]
        fps: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Derive baseline thresholds from the start of a trace
    Calibrate {
        trace: PathBuf,
        #[arg(long)]
        fps: Option<f64>,
        /// Seconds of footage to average
        #[arg(long)]
        seconds: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn load_config(path: Option<&PathBuf>) -> Result<PulseConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => {
            log::debug!("loading configuration from {}", path.display());
            PulseConfig::from_file_with_env(path)?
        }
        None => PulseConfig::load_layered(None, None)?,
    };
    Ok(config)
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;

    match cli.cmd {
        Commands::Analyze { trace, fps, json } => {
            if let Some(fps) = fps {
                config.rppg.sample_rate = fps;
            }
            config.validate()?;

            let outcome = analyze_trace(&trace, &config);
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                let summary = &outcome.summary;
                println!("Heart rate: {} BPM", summary.final_bpm);
                println!("Remark: {}", summary.remark);
                println!("Classification: {}", summary.classification);
                println!("Readings used: {}", summary.total_readings);
                println!(
                    "Frames: {} ({} without region, {} ready readings)",
                    outcome.frames, outcome.no_region_ticks, outcome.ready_readings
                );
                if outcome.filter_degraded {
                    println!("Warning: bandpass filter unavailable at this frame rate, signal unfiltered");
                }
            }
            if outcome.source_failed {
                return Ok(ExitCode::from(SOURCE_FAILED));
            }
        }
        Commands::Calibrate {
            trace,
            fps,
            seconds,
            json,
        } => {
            if let Some(seconds) = seconds {
                config.calibration.calibration_seconds = seconds;
            }
            config.validate()?;

            let calibration = Calibrator::new(config.calibration.clone()).calibrate_path(&trace, fps);
            if json {
                println!("{}", serde_json::to_string_pretty(&calibration)?);
            } else {
                println!("Mode: {}", calibration.mode);
                println!("Baseline R/G: {:.3}", calibration.baseline_rg);
                println!("Baseline brightness: {:.1}", calibration.baseline_brightness);
                println!(
                    "Optimal range: {:.2} - {:.2}",
                    calibration.optimal_min, calibration.optimal_max
                );
                println!(
                    "Thresholds: low {:.2}, moderate {:.2}, high {:.2}",
                    calibration.low_threshold,
                    calibration.moderate_threshold,
                    calibration.high_threshold
                );
                if !calibration.is_calibrated {
                    println!("Warning: no usable frames, default calibration returned");
                }
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
        }
    }
    Ok(ExitCode::SUCCESS)
}
