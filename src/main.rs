use clap::{Parser, Subcommand};
use phd2_remote::{load_config, Phd2Client, Phd2Config, Phd2Event, SettleParams};
use std::path::PathBuf;
use tracing::{debug, info, Level};

#[derive(Parser)]
#[command(name = "phd2-remote")]
#[command(about = "PHD2 remote-control client")]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// PHD2 host address
    #[arg(long, default_value = "localhost")]
    host: String,

    /// PHD2 instance number (instance N listens on 4400 + N - 1)
    #[arg(long, default_value = "1")]
    instance: u16,

    /// Log level
    #[arg(short, long, default_value = "info", value_parser = clap::value_parser!(Level))]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to PHD2 and show the status snapshot
    Status,

    /// Connect to PHD2 and monitor events
    Monitor,

    /// List available equipment profiles
    Profiles,

    /// Select an equipment profile by name and connect its equipment
    ConnectEquipment {
        /// Exact profile name
        name: String,
    },

    /// Start guiding
    Guide {
        /// Settling pixels threshold (default: 0.5)
        #[arg(long)]
        settle_pixels: Option<f64>,

        /// Settling time in seconds (default: 10)
        #[arg(long)]
        settle_time: Option<u32>,

        /// Settling timeout in seconds (default: 60)
        #[arg(long)]
        settle_timeout: Option<u32>,
    },

    /// Dither the guide position
    Dither {
        /// Dither amount in pixels
        #[arg(default_value = "5.0")]
        amount: f64,

        /// Settling pixels threshold (default: 0.5)
        #[arg(long)]
        settle_pixels: Option<f64>,

        /// Settling time in seconds (default: 10)
        #[arg(long)]
        settle_time: Option<u32>,

        /// Settling timeout in seconds (default: 60)
        #[arg(long)]
        settle_timeout: Option<u32>,
    },

    /// Report current settle progress
    Settle,

    /// Start looping exposures
    Loop,

    /// Stop all capture and guiding
    StopCapture,

    /// Pause guiding
    Pause,

    /// Resume guiding after pause
    Unpause,

    /// Print the guide camera pixel scale
    PixelScale,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    debug!(
        "Parsed command line arguments: host={}, instance={}, log_level={:?}",
        args.host, args.instance, args.log_level
    );

    let phd2_config = if let Some(config_path) = &args.config {
        debug!("Loading configuration from {:?}", config_path);
        let config = load_config(config_path)?;
        config.phd2
    } else {
        Phd2Config {
            host: args.host,
            instance: args.instance,
            ..Default::default()
        }
    };

    let client = Phd2Client::new(phd2_config);

    match args.command {
        Commands::Status => {
            run_status(&client).await?;
        }
        Commands::Monitor => {
            run_monitor(&client).await?;
        }
        Commands::Profiles => {
            run_profiles(&client).await?;
        }
        Commands::ConnectEquipment { name } => {
            run_connect_equipment(&client, &name).await?;
        }
        Commands::Guide {
            settle_pixels,
            settle_time,
            settle_timeout,
        } => {
            run_guide(&client, settle_params(settle_pixels, settle_time, settle_timeout)).await?;
        }
        Commands::Dither {
            amount,
            settle_pixels,
            settle_time,
            settle_timeout,
        } => {
            run_dither(
                &client,
                amount,
                settle_params(settle_pixels, settle_time, settle_timeout),
            )
            .await?;
        }
        Commands::Settle => {
            run_settle(&client).await?;
        }
        Commands::Loop => {
            run_loop(&client).await?;
        }
        Commands::StopCapture => {
            run_stop_capture(&client).await?;
        }
        Commands::Pause => {
            run_pause(&client).await?;
        }
        Commands::Unpause => {
            run_unpause(&client).await?;
        }
        Commands::PixelScale => {
            run_pixel_scale(&client).await?;
        }
    }

    Ok(())
}

fn settle_params(pixels: Option<f64>, time: Option<u32>, timeout: Option<u32>) -> SettleParams {
    let defaults = SettleParams::default();
    SettleParams {
        pixels: pixels.unwrap_or(defaults.pixels),
        time: time.unwrap_or(defaults.time),
        timeout: timeout.unwrap_or(defaults.timeout),
    }
}

async fn run_status(client: &Phd2Client) -> Result<(), Box<dyn std::error::Error>> {
    info!("Connecting to PHD2...");
    client.connect().await?;

    // Wait a moment for the Version and AppState events
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let status = client.get_status().await;
    if let Some(version) = &status.version {
        info!("PHD2 Version: {}", version);
    }
    info!("State: {}", status.app_state);
    info!("Guiding: {}", status.is_guiding);
    info!("Average distance: {:.2}", status.avg_dist);
    info!(
        "RMS: RA={:.2} Dec={:.2} Total={:.2}",
        status.stats.rms_ra, status.stats.rms_dec, status.stats.rms_total
    );
    if status.settling {
        info!("Settling in progress");
    }
    if let Some(star_lost) = &status.star_lost {
        info!(
            "Last star loss: frame {} at {} (SNR {:.1})",
            star_lost.frame, star_lost.timestamp, star_lost.snr
        );
    }

    client.disconnect().await?;
    Ok(())
}

async fn run_monitor(client: &Phd2Client) -> Result<(), Box<dyn std::error::Error>> {
    info!("Connecting to PHD2...");
    client.connect().await?;

    info!("Monitoring PHD2 events (press Ctrl+C to stop)...");

    let mut receiver = client.subscribe();

    loop {
        tokio::select! {
            event = receiver.recv() => {
                match event {
                    Ok(event) => {
                        print_event(&event);
                    }
                    Err(e) => {
                        debug!("Event receiver error: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
        }
    }

    client.disconnect().await?;
    Ok(())
}

fn print_event(event: &Phd2Event) {
    match event {
        Phd2Event::Version { phd_version, .. } => {
            info!("Event: Version - PHD2 {}", phd_version);
        }
        Phd2Event::AppState { state } => {
            info!("Event: AppState - {}", state);
        }
        Phd2Event::GuideStep(stats) => {
            info!(
                "Event: GuideStep - Frame {} RA={:.2} Dec={:.2} AvgDist={:.2}",
                stats.frame,
                stats.ra_distance_raw.unwrap_or(0.0),
                stats.dec_distance_raw.unwrap_or(0.0),
                stats.avg_dist.unwrap_or(0.0)
            );
        }
        Phd2Event::StarLost { frame, snr, .. } => {
            info!("Event: StarLost - frame {} SNR {:.1}", frame, snr);
        }
        Phd2Event::SettleBegin => {
            info!("Event: SettleBegin");
        }
        Phd2Event::Settling { distance, time, .. } => {
            info!(
                "Event: Settling - distance={:.2} time={:.1}s",
                distance, time
            );
        }
        Phd2Event::SettleDone { status, error } => {
            if *status == 0 {
                info!("Event: SettleDone - Success");
            } else {
                info!(
                    "Event: SettleDone - Failed: {}",
                    error.as_deref().unwrap_or("unknown")
                );
            }
        }
        Phd2Event::GuidingDithered { dx, dy } => {
            info!("Event: GuidingDithered - dx={:.2} dy={:.2}", dx, dy);
        }
        Phd2Event::StartGuiding => {
            info!("Event: StartGuiding");
        }
        Phd2Event::GuidingStopped => {
            info!("Event: GuidingStopped");
        }
        Phd2Event::Paused => {
            info!("Event: Paused");
        }
        Phd2Event::Resumed => {
            info!("Event: Resumed");
        }
        Phd2Event::Alert { msg, alert_type } => {
            info!("Event: Alert [{}] - {}", alert_type, msg);
        }
        _ => {
            debug!("Event: {:?}", event);
        }
    }
}

async fn run_profiles(client: &Phd2Client) -> Result<(), Box<dyn std::error::Error>> {
    info!("Connecting to PHD2...");
    client.connect().await?;

    let profiles = client.get_profiles().await?;
    info!("Available profiles:");
    for profile in &profiles {
        info!("  [{}] {}", profile.id, profile.name);
    }

    client.disconnect().await?;
    Ok(())
}

async fn run_connect_equipment(
    client: &Phd2Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Connecting to PHD2...");
    client.connect().await?;

    info!("Connecting equipment for profile '{}'...", name);
    client.connect_equipment(name).await?;
    info!("Equipment connected successfully");

    client.disconnect().await?;
    Ok(())
}

async fn run_guide(
    client: &Phd2Client,
    settle: SettleParams,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Connecting to PHD2...");
    client.connect().await?;

    info!(
        "Starting guiding (settle: pixels={}, time={}, timeout={})",
        settle.pixels, settle.time, settle.timeout
    );
    client.guide(&settle).await?;
    info!("Guide command sent successfully");

    client.disconnect().await?;
    Ok(())
}

async fn run_dither(
    client: &Phd2Client,
    amount: f64,
    settle: SettleParams,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Connecting to PHD2...");
    client.connect().await?;

    info!(
        "Dithering (amount={}, settle: pixels={}, time={}, timeout={})",
        amount, settle.pixels, settle.time, settle.timeout
    );
    client.dither(amount, &settle).await?;
    info!("Dither command sent successfully");

    client.disconnect().await?;
    Ok(())
}

async fn run_settle(client: &Phd2Client) -> Result<(), Box<dyn std::error::Error>> {
    info!("Connecting to PHD2...");
    client.connect().await?;

    if client.is_settling().await? {
        let progress = client.check_settling().await?;
        if progress.done {
            info!(
                "Settle finished: status={} error={}",
                progress.status,
                progress.error.as_deref().unwrap_or("none")
            );
        } else {
            info!(
                "Settling: distance={:.2} of {:.2} px, {:.1}s of {:.1}s",
                progress.distance, progress.settle_px, progress.time, progress.settle_time
            );
        }
    } else {
        info!("Not settling");
    }

    client.disconnect().await?;
    Ok(())
}

async fn run_loop(client: &Phd2Client) -> Result<(), Box<dyn std::error::Error>> {
    info!("Connecting to PHD2...");
    client.connect().await?;

    info!("Starting loop...");
    client.start_loop().await?;
    info!("Loop command sent successfully");

    client.disconnect().await?;
    Ok(())
}

async fn run_stop_capture(client: &Phd2Client) -> Result<(), Box<dyn std::error::Error>> {
    info!("Connecting to PHD2...");
    client.connect().await?;

    info!("Stopping capture...");
    client.stop_capture().await?;
    info!("Stop capture command sent successfully");

    client.disconnect().await?;
    Ok(())
}

async fn run_pause(client: &Phd2Client) -> Result<(), Box<dyn std::error::Error>> {
    info!("Connecting to PHD2...");
    client.connect().await?;

    info!("Pausing guiding...");
    client.pause().await?;
    info!("Pause command sent successfully");

    client.disconnect().await?;
    Ok(())
}

async fn run_unpause(client: &Phd2Client) -> Result<(), Box<dyn std::error::Error>> {
    info!("Connecting to PHD2...");
    client.connect().await?;

    info!("Resuming guiding...");
    client.unpause().await?;
    info!("Unpause command sent successfully");

    client.disconnect().await?;
    Ok(())
}

async fn run_pixel_scale(client: &Phd2Client) -> Result<(), Box<dyn std::error::Error>> {
    info!("Connecting to PHD2...");
    client.connect().await?;

    let scale = client.get_pixel_scale().await?;
    info!("Pixel scale: {:.3} arc-sec/px", scale);

    client.disconnect().await?;
    Ok(())
}
