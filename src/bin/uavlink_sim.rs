use clap::{App, Arg, SubCommand};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{error, info};

use uavlink::demo_objects::{FlightTelemetryStats, GcsTelemetryStats};
use uavlink::transport::{run_tcp_duplex, ChannelTransport};
use uavlink::{LinkConfig, TelemetryMonitor, UavTalk};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "9100";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("uavlink-sim")
        .version("0.1.0")
        .author("Flight Systems Engineering Team")
        .about("UAVTalk telemetry link demo: runs a GCS or flight-side peer over TCP")
        .arg(
            Arg::with_name("host")
                .short("h")
                .long("host")
                .value_name("HOST")
                .help("Address to bind (gcs) or connect to (flight)")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("TCP port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .subcommand(SubCommand::with_name("gcs").about("Listen for a flight-side peer"))
        .subcommand(SubCommand::with_name("flight").about("Connect to a ground control station"))
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST).to_string();
    let port: u16 = matches
        .value_of("port")
        .unwrap_or(DEFAULT_PORT)
        .parse()
        .map_err(|_| "port must be a number")?;

    match matches.subcommand() {
        ("flight", _) => run_flight_side(&host, port).await,
        _ => run_gcs_side(&host, port).await,
    }
}

async fn run_gcs_side(host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind((host, port)).await?;
    info!(%host, port, "gcs listening for a flight-side peer");

    let (stream, peer) = listener.accept().await?;
    info!(%peer, "flight peer connected");
    run_peer(stream).await
}

async fn run_flight_side(host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    info!(%host, port, "connecting to ground control station");
    let stream = TcpStream::connect((host, port)).await?;
    run_peer(stream).await
}

/// Wires one side of the link: registers the telemetry-stats objects,
/// spins up the TCP duplex, and runs the monitor loop until the peer
/// disconnects.
async fn run_peer(stream: TcpStream) -> Result<(), Box<dyn std::error::Error>> {
    let mut link = UavTalk::new();
    link.register_prototype(Box::new(GcsTelemetryStats::new()))?;
    link.register_prototype(Box::new(FlightTelemetryStats::new()))?;

    let (transport, outbound) = ChannelTransport::new();
    link.set_transport(Box::new(transport));

    let link = Arc::new(Mutex::new(link));
    let io_link = Arc::clone(&link);
    let io_task = tokio::spawn(async move {
        run_tcp_duplex(stream, outbound, move |bytes| {
            let io_link = Arc::clone(&io_link);
            async move {
                io_link.lock().await.process_input_stream(&bytes);
            }
        })
        .await;
    });

    let monitor = TelemetryMonitor::new(Arc::clone(&link), LinkConfig::default()).await;
    tokio::select! {
        () = monitor.run() => {}
        result = io_task => {
            if let Err(e) = result {
                error!(error = %e, "io task panicked");
            }
        }
    }

    info!("peer disconnected, shutting down");
    Ok(())
}
