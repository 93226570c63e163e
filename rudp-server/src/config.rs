use anyhow::{Context, Error, Result};
use std::env;

const DEFAULT_PORT: u16 = 80;
const DEFAULT_DIRECTORY: &str = "htdocs";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub directory: String,
    pub verbose: bool,
}

impl Config {
    pub fn new_from_env() -> Result<Self> {
        let mut args = env::args();

        args.next().expect("first argument must be set");

        Self::new_from_args(args)
    }

    pub fn new_from_args(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut port = DEFAULT_PORT;
        let mut directory = DEFAULT_DIRECTORY.to_owned();
        let mut verbose = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-v" => verbose = true,
                "-p" => {
                    port = args
                        .next()
                        .ok_or_else(|| Error::msg("-p requires a port number"))?
                        .parse::<u16>()
                        .context("could not parse -p as a port number")?
                }
                "-d" => {
                    directory = args
                        .next()
                        .ok_or_else(|| Error::msg("-d requires a directory path"))?
                }
                other => return Err(Error::msg(format!("unexpected argument: {}", other))),
            }
        }

        Ok(Self {
            port,
            directory,
            verbose,
        })
    }
}
