use anyhow::{Context, Result};
use log::*;
use rudp_client::config::{BodySource, Config};
use rudp_client::http::{Exchange, Request};
use rudp_transport::TransportConfig;
use std::process::exit;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const USAGE: &str = "\
usage: httpc (get|post) [-v] [-H key:value]* [-d inline-data] [-f file]
             [-o output-file] [-r relay-host:port] [-l max-redirects] URL

get    executes an HTTP GET request for the given URL
post   executes an HTTP POST request for the given URL

-v     prints the response status line and headers as well as the body
-H     adds a header to the request, may be repeated
-d     uses the given string as the POST request body
-f     uses the contents of the given file as the POST request body
-o     writes the response to the given file instead of stdout
-r     the relay to send packets through (default 127.0.0.1:3000)
-l     the maximum number of redirects to follow (default 1)";

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
            LevelFilter::Warn
        })
        .init();

    if let Err(err) = run(config).await {
        error!("error occurred: {:?}", err);
        exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    let body = match config.body_source.as_ref() {
        Some(BodySource::Inline(data)) => data.clone().into_bytes(),
        Some(BodySource::File(path)) => fs::read(path)
            .await
            .with_context(|| format!("failed to read body file: {}", path))?,
        None => vec![],
    };

    let mut request = Request::new(config.method, config.url.clone());
    request.headers = config.headers.clone();
    request.body = body;

    let exchange = Exchange::new(
        config.relay_addr.as_str(),
        config.max_redirects,
        TransportConfig::default(),
    );

    let responses = exchange.execute(request).await?;

    match config.output_file.as_ref() {
        Some(path) => {
            let mut file = fs::File::create(path)
                .await
                .with_context(|| format!("failed to create output file: {}", path))?;

            for response in responses.iter() {
                if config.verbose {
                    file.write_all(response.head_text().as_bytes()).await?;
                }

                file.write_all(response.body.as_slice()).await?;
            }
        }
        None => {
            use std::io::Write;

            let stdout = std::io::stdout();
            let mut stdout = stdout.lock();

            for response in responses.iter() {
                if config.verbose {
                    stdout.write_all(response.head_text().as_bytes())?;
                }

                stdout.write_all(response.body.as_slice())?;
            }
        }
    }

    Ok(())
}
