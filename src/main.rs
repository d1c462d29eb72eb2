use clap::Parser;
use log::{error, info};
use std::path::Path;
use tapd::configuration::config::Config;
use tapd::server::acceptor::CaptureServer;

#[derive(Parser)]
#[command(name = "tapd")]
#[command(version = "0.1.0")]
#[command(about = "Streams live multi-interface packet captures over SSH")]
struct Args {
    config_file: String,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = Args::parse();

    let config = match Config::from_file(Path::new(&args.config_file)) {
        Ok(config) => config,
        Err(err) => {
            error!("unable to load configuration: {}", err);
            std::process::exit(1);
        }
    };

    info!(
        "capturing on {:?} with filter {:?}",
        config.capture.interfaces, config.capture.filter
    );

    let server = CaptureServer::new(config);
    if let Err(err) = server.run().await {
        error!("{}", err);
        std::process::exit(1);
    }
}
