use crate::http::{Method, Url};
use anyhow::{Context, Error, Result};
use std::env;

const DEFAULT_RELAY_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_MAX_REDIRECTS: u32 = 1;

/// Where a POST body comes from.
#[derive(Debug, PartialEq, Clone)]
pub enum BodySource {
    Inline(String),
    File(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub method: Method,
    pub url: Url,
    pub verbose: bool,
    pub headers: Vec<(String, String)>,
    pub body_source: Option<BodySource>,
    pub output_file: Option<String>,
    pub relay_addr: String,
    pub max_redirects: u32,
}

impl Config {
    pub fn new_from_env() -> Result<Self> {
        let mut args = env::args();

        args.next().expect("first argument must be set");

        Self::new_from_args(args)
    }

    pub fn new_from_args(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let method = match args.next().as_deref() {
            Some("get") => Method::Get,
            Some("post") => Method::Post,
            Some(other) => {
                return Err(Error::msg(format!("unknown command: {}", other)));
            }
            None => return Err(Error::msg("expected a command: get or post")),
        };

        let mut url = None;
        let mut verbose = false;
        let mut headers = vec![];
        let mut inline_data = None;
        let mut file_data = None;
        let mut output_file = None;
        let mut relay_addr = DEFAULT_RELAY_ADDR.to_owned();
        let mut max_redirects = DEFAULT_MAX_REDIRECTS;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-v" => verbose = true,
                "-H" => {
                    let header = args
                        .next()
                        .ok_or_else(|| Error::msg("-H requires a key:value argument"))?;

                    let mut parts = header.splitn(2, ':');
                    let name = parts.next().unwrap_or("");
                    let value = parts
                        .next()
                        .ok_or_else(|| Error::msg(format!("invalid header: {}", header)))?;

                    headers.push((name.to_owned(), value.to_owned()));
                }
                "-d" => {
                    inline_data =
                        Some(args.next().ok_or_else(|| Error::msg("-d requires a value"))?)
                }
                "-f" => {
                    file_data =
                        Some(args.next().ok_or_else(|| Error::msg("-f requires a file path"))?)
                }
                "-o" => {
                    output_file =
                        Some(args.next().ok_or_else(|| Error::msg("-o requires a file path"))?)
                }
                "-r" => {
                    relay_addr = args
                        .next()
                        .ok_or_else(|| Error::msg("-r requires a host:port argument"))?
                }
                "-l" => {
                    max_redirects = args
                        .next()
                        .ok_or_else(|| Error::msg("-l requires a number"))?
                        .parse::<u32>()
                        .context("could not parse -l as a number")?
                }
                other if url.is_none() && !other.starts_with('-') => {
                    url = Some(Url::parse(other)?);
                }
                other => return Err(Error::msg(format!("unexpected argument: {}", other))),
            }
        }

        let url = url.ok_or_else(|| Error::msg("expected a URL argument"))?;

        if inline_data.is_some() && file_data.is_some() {
            return Err(Error::msg("-d and -f cannot be used together"));
        }

        if method == Method::Get && (inline_data.is_some() || file_data.is_some()) {
            return Err(Error::msg("get requests cannot carry a body"));
        }

        let body_source = inline_data
            .map(BodySource::Inline)
            .or_else(|| file_data.map(BodySource::File));

        Ok(Self {
            method,
            url,
            verbose,
            headers,
            body_source,
            output_file,
            relay_addr,
            max_redirects,
        })
    }
}
