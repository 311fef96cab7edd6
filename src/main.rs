use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use stage_link::{
    axis::{parse_axis_list, AxisMap, AxisName},
    link::{LinkTransport, SimulatedLink},
    motion_controller::{ControllerConfig, MotionController},
    queue::config::QueueConfig,
    route::Route,
    settings::{AxisSettings, JsonSettingsStore},
    socket_server::{config::SocketServerConfig, SocketServer},
};

/// Drives a serial stepper stage from a settings directory.
#[derive(Parser, Debug)]
#[command(name = "stage-link", version)]
struct Cli {
    /// Directory holding save.json and the option tables
    #[arg(short, long, default_value = ".")]
    settings: PathBuf,

    /// Driven axes, e.g. X,Y
    #[arg(long, default_value = "X,Y")]
    axes: String,

    /// Pending moves accepted while one runs
    #[arg(long, default_value_t = 1)]
    queue_capacity: usize,

    /// Talk to a real serial port instead of the simulated link
    #[cfg(feature = "serial")]
    #[arg(long)]
    serial: bool,

    /// Do not wait for controller acknowledgments
    #[cfg(feature = "serial")]
    #[arg(long)]
    no_ack: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve JSON-lines requests on a Unix socket until Ctrl-C
    Serve {
        #[arg(long, default_value = "/tmp/stage-link.sock")]
        socket: String,
        #[arg(long, default_value_t = 16)]
        max_connections: usize,
    },
    /// Visit every point of a CSV move set
    Route {
        file: PathBuf,
        /// Axis speed in mm/s (e.g. --speed X=5)
        #[arg(long, value_parser = parse_speed, number_of_values = 1)]
        speed: Vec<(AxisName, f64)>,
        /// Pause at each point, in milliseconds
        #[arg(long, default_value_t = 0)]
        dwell_ms: u64,
    },
    /// Print the settings form as JSON
    Describe,
}

fn parse_speed(s: &str) -> Result<(AxisName, f64), String> {
    let (axis, speed) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid AXIS=SPEED: no `=` found in '{}'.", s))?;
    let axis = axis.parse::<AxisName>().map_err(|e| e.to_string())?;
    let speed = speed
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("Invalid speed '{}': {}", speed, e))?;
    Ok((axis, speed))
}

#[cfg(feature = "serial")]
fn build_link(cli: &Cli) -> Arc<dyn LinkTransport> {
    use stage_link::link::{config::SerialLinkConfig, SerialLink};

    if !cli.serial {
        return simulated_link();
    }
    info!("Using serial link");
    Arc::new(SerialLink::new(SerialLinkConfig {
        wait_ack: !cli.no_ack,
        ..SerialLinkConfig::default()
    }))
}

#[cfg(not(feature = "serial"))]
fn build_link(_cli: &Cli) -> Arc<dyn LinkTransport> {
    simulated_link()
}

fn simulated_link() -> Arc<dyn LinkTransport> {
    info!("Using simulated link, nothing is sent to hardware");
    Arc::new(SimulatedLink::default())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let axes = parse_axis_list(&cli.axes)?;
    let store = Arc::new(JsonSettingsStore::new(&cli.settings));
    let settings = AxisSettings::load(store, &axes)
        .with_context(|| format!("Failed to load settings from {}", cli.settings.display()))?;

    if let Commands::Describe = cli.command {
        println!("{}", serde_json::to_string_pretty(&settings.describe())?);
        return Ok(());
    }

    let config = ControllerConfig {
        axes,
        queue: QueueConfig {
            capacity: cli.queue_capacity,
            ..QueueConfig::default()
        },
        ..ControllerConfig::default()
    };
    let controller = Arc::new(MotionController::new(config, settings, build_link(&cli)));

    match cli.command {
        Commands::Serve {
            socket,
            max_connections,
        } => {
            let mut server = SocketServer::new(
                SocketServerConfig {
                    socket_path: socket.clone(),
                    max_connections,
                },
                controller.clone(),
            );
            server.start().await?;
            info!("Connect with: socat - UNIX-CONNECT:{}", socket);

            tokio::signal::ctrl_c().await?;
            server.shutdown().await?;
        }
        Commands::Route {
            file,
            speed,
            dwell_ms,
        } => {
            let route = Route::from_path(&file)
                .with_context(|| format!("Failed to read move set {}", file.display()))?;
            let speeds: AxisMap<f64> = speed.into_iter().collect();
            let dwell = Duration::from_millis(dwell_ms);

            route
                .run(&controller, &speeds, |index, point| {
                    info!("Reached point {}: {:?}", index + 1, point);
                    async move {
                        tokio::time::sleep(dwell).await;
                        Ok(())
                    }
                })
                .await?;
        }
        Commands::Describe => {}
    }

    controller.shutdown().await;
    Ok(())
}
