//! Sphere Capture CLI
//!
//! Drives a capture session against the mock device: one capture per
//! reference point around the horizon, logging each artifact as it lands.

use clap::Parser;
use sphere_capture::{
    device::{CompletionMode, MockHardware},
    metrics::MetricsRegistry,
    ArtifactCollector, CaptureError, CaptureSession, FileConfig, ReferencePoint, RotationMatrix,
    SizePreference, SlotStatus,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Horizontal spacing of reference points.
const YAW_STEP_DEGREES: f32 = 30.0;

/// Simulated shutter-to-callback delay of the mock device.
const MOCK_CAPTURE_DELAY: Duration = Duration::from_millis(40);

#[derive(Debug, Parser)]
#[command(name = "sphere-capture", version, about = "Photo-sphere capture session demo")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of captures to take (overrides the config file).
    #[arg(short = 'n', long)]
    captures: Option<u32>,

    /// Keep capturing until interrupted with Ctrl-C.
    #[arg(long)]
    continuous: bool,

    /// Previously saved capture width.
    #[arg(long, requires = "saved_height")]
    saved_width: Option<u32>,

    /// Previously saved capture height.
    #[arg(long, requires = "saved_width")]
    saved_height: Option<u32>,

    /// Print Prometheus metrics when done.
    #[arg(long)]
    print_metrics: bool,

    /// Serve metrics over HTTP on this port while capturing.
    #[cfg(feature = "metrics")]
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Sphere Capture v{}", sphere_capture::VERSION);
    info!("This is a demonstration using a mock camera");

    let file_config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };

    let preference = match (args.saved_width, args.saved_height) {
        (Some(width), Some(height)) => SizePreference::new(width, height),
        _ => file_config.preference,
    };
    if let Err(e) = preference.validate() {
        eprintln!("Invalid saved size: {}", e);
        std::process::exit(1);
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        if let Err(e) = ctrlc::set_handler(move || running.store(false, Ordering::SeqCst)) {
            warn!("Failed to install Ctrl-C handler: {}", e);
        }
    }

    // Simulated heading: the pose follows the current reference point.
    let heading = Arc::new(AtomicU32::new(0));
    let pose = {
        let heading = Arc::clone(&heading);
        move || {
            let index = heading.load(Ordering::Relaxed) as f32;
            RotationMatrix::from_yaw((index * YAW_STEP_DEGREES).to_radians())
        }
    };

    let hardware = MockHardware::new().with_completion(CompletionMode::Threaded(MOCK_CAPTURE_DELAY));
    let collector = Arc::new(ArtifactCollector::new());

    let Some(session) = CaptureSession::open(
        || hardware.open(),
        Arc::new(pose),
        collector.clone(),
        preference,
        file_config.session.clone(),
    ) else {
        eprintln!("No capture session available");
        std::process::exit(1);
    };
    info!("Capturing at {}", session.capture_size());

    #[cfg(feature = "metrics")]
    let metrics_state = args.metrics_port.and_then(spawn_metrics_server);

    let demo = &file_config.demo;
    let captures = args.captures.unwrap_or(demo.captures);
    let wait_timeout = Duration::from_millis(demo.wait_timeout_ms);
    let interval = Duration::from_millis(demo.interval_ms);

    let mut index: u32 = 0;
    while running.load(Ordering::SeqCst) && (args.continuous || index < captures) {
        heading.store(index, Ordering::Relaxed);
        let yaw = (index as f32 * YAW_STEP_DEGREES) % 360.0;
        let point = ReferencePoint::new(index, yaw, 0.0);

        match session.take_picture(point) {
            Ok(slot) => match slot.wait(wait_timeout) {
                SlotStatus::Saved => {
                    slot.with_artifact(|artifact| {
                        info!(
                            "Capture {} at yaw {:.0}: {}x{} ({} bytes)",
                            artifact.sequence,
                            artifact.reference_point.yaw,
                            artifact.image.width(),
                            artifact.image.height(),
                            artifact.image.byte_len()
                        );
                    });
                }
                SlotStatus::Failed(failure) => warn!("Capture {} failed: {}", index, failure),
                SlotStatus::Pending => warn!("Capture {} still pending after {:?}", index, wait_timeout),
                SlotStatus::Taken => {}
            },
            Err(CaptureError::Busy) => debug!("Capture {} skipped, session busy", index),
            Err(e) => warn!("Capture {} rejected: {}", index, e),
        }

        #[cfg(feature = "metrics")]
        if let Some(state) = &metrics_state {
            state
                .blocking_write()
                .update(&session.stats(), session.is_busy());
        }

        index += 1;
        std::thread::sleep(interval);
    }

    let stats = session.stats();
    info!(
        "Processed {} requests: {} saved, {} failed, {} rejected busy",
        stats.requested,
        collector.saved().len(),
        stats.failed,
        stats.rejected_busy
    );

    if args.print_metrics {
        match MetricsRegistry::new() {
            Ok(registry) => {
                registry.update(&stats, session.is_busy());
                match registry.encode() {
                    Ok(output) => println!("{}", output),
                    Err(e) => warn!("Failed to encode metrics: {}", e),
                }
            }
            Err(e) => warn!("Failed to create metrics registry: {}", e),
        }
    }

    session.close();

    #[cfg(feature = "metrics")]
    if let Some(state) = &metrics_state {
        state.blocking_write().set_session_open(false);
    }

    info!("Done");
}

#[cfg(feature = "metrics")]
fn spawn_metrics_server(
    port: u16,
) -> Option<Arc<tokio::sync::RwLock<sphere_capture::metrics::MetricsState>>> {
    use sphere_capture::metrics::{MetricsServer, MetricsServerConfig};

    let registry = match MetricsRegistry::new() {
        Ok(registry) => registry,
        Err(e) => {
            warn!("Failed to create metrics registry: {}", e);
            return None;
        }
    };
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
    let state = server.state();
    state.blocking_write().set_session_open(true);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!("Failed to start metrics runtime: {}", e);
            return None;
        }
    };
    std::thread::spawn(move || {
        if let Err(e) = runtime.block_on(server.run()) {
            warn!("Metrics server stopped: {}", e);
        }
    });

    Some(state)
}
