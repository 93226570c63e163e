use log::*;
use rudp_server::config::Config;
use rudp_server::handler::FileHandler;
use rudp_transport::{Server, TransportConfig};
use std::process::exit;
use std::sync::Arc;

const USAGE: &str = "\
usage: httpfs [-v] [-p port] [-d directory]

-v     enables verbose logging
-p     the port to listen on (default 80)
-d     the directory to serve (default htdocs)";

#[tokio::main]
async fn main() {
    let config = match Config::new_from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            eprintln!("{}", USAGE);
            exit(1);
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(if config.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    info!("serving {} on port {}", config.directory, config.port);

    let handler = Arc::new(FileHandler::new(config.directory.as_str()));
    let server = Server::new(config.port, TransportConfig::default());

    if let Err(err) = server.run(handler).await {
        error!("error occurred: {:?}", err);
        exit(1);
    }
}
