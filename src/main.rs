use ridesim::{
    load_geojson, validate_speed, Command, ConsoleLocationService, Coordinate, DeviceSession,
    Result, RideConfig, RideError, DEFAULT_SPEED_KMH, HELP, VERSION,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let speed = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<f64>().map_err(|e| {
            RideError::InvalidArgument(format!("invalid speed {arg:?}: {e}"))
        })?,
        None => DEFAULT_SPEED_KMH,
    };
    validate_speed(speed)?;
    let config = RideConfig::with_speed(speed);

    info!("🚲 ridesim {VERSION}, nominal speed {speed:.1} km/h");
    warn!("No device backend configured - positions are only logged");

    let mut session = DeviceSession::new(ConsoleLocationService::new(), config);
    let mut outcomes = session
        .outcomes()
        .ok_or_else(|| RideError::Other("ride outcomes already taken".to_string()))?;

    // Stdin is read on its own task so a running ride never blocks input
    let (line_sender, mut lines) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let mut reader = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match reader.next_line().await {
                Ok(Some(line)) => {
                    if line_sender.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            }
        }
    });

    println!("{HELP}");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nExiting...");
                break;
            }
            Some(outcome) = outcomes.recv() => {
                match outcome.result {
                    Ok(summary) => info!("✅ Ride {} complete: {}", outcome.id, summary),
                    Err(e) if e.is_device_error() => {
                        error!("❌ Ride {} lost the device: {}", outcome.id, e);
                    }
                    Err(e) => error!("❌ Ride {} failed: {}", outcome.id, e),
                }
                println!("{HELP}");
            }
            line = lines.recv() => {
                let Some(line) = line else {
                    break;
                };
                match Command::parse(&line) {
                    Ok(Command::Quit) => {
                        println!("Exiting...");
                        break;
                    }
                    Ok(Command::Empty) => {}
                    Ok(Command::Read(path)) => {
                        println!("Reading GPS coordinates from file: {}", path.display());
                        match load_geojson(&path).await {
                            Ok(coordinates) => start_ride(&mut session, coordinates).await,
                            Err(e) => error!("Failed to read file: {}", e),
                        }
                    }
                    Ok(Command::Go(coordinates)) => start_ride(&mut session, coordinates).await,
                    Err(e) => error!("Failed to parse GPS input: {}", e),
                }
            }
        }
    }

    info!("🔌 Stopping location simulation...");
    if let Err(e) = session.shutdown().await {
        error!("❌ Failed to stop location simulation: {}", e);
        return Err(e);
    }

    Ok(())
}

async fn start_ride(
    session: &mut DeviceSession<ConsoleLocationService>,
    coordinates: Vec<Coordinate>,
) {
    println!("Parsed {} coordinate(s)", coordinates.len());
    if let Err(e) = session.start(coordinates).await {
        error!("Failed to start location simulation: {}", e);
    }
}
