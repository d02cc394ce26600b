use clap::{App, Arg};
use flux::logging;
use gateway_core::{Gateway, GatewayConfig};
use std::path::Path;

fn main() {
    let matches = App::new("Gateway Runner")
        .version("1.0")
        .author("SleepingPills")
        .about("Runs the SL651 protocol gateway.")
        .arg(
            Arg::with_name("CONFIG_FILE")
                .help("Path to the gateway config file")
                .required(true),
        )
        .arg(
            Arg::with_name("log-config")
                .long("log-config")
                .takes_value(true)
                .help("Path to the logger config file"),
        )
        .get_matches();

    let config_file_path = matches.value_of("CONFIG_FILE").unwrap();
    let config = GatewayConfig::load(config_file_path);

    let logger = logging::init(matches.value_of("log-config").map(Path::new));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build main tokio runtime");

    runtime.block_on(run(config, logger));
}

async fn run(config: GatewayConfig, logger: slog::Logger) {
    let gateway = Gateway::new(config, logger.clone());

    if let Err(err) = gateway.start().await {
        slog::error!(logger, "failed to start gateway"; "error" => %err);
        return;
    }

    slog::info!(logger, "gateway running, press ctrl-c to stop");

    if let Err(err) = tokio::signal::ctrl_c().await {
        slog::error!(logger, "failed to listen for shutdown signal"; "error" => %err);
    }

    slog::info!(logger, "shutting down");
    gateway.stop_all();
}
