use crate::http::{Method, Request, Response};
use async_trait::async_trait;
use futures::StreamExt;
use log::*;
use rudp_transport::{RequestHandler, ServerConnection};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

/// Serves files from a single directory over HTTP.
///
/// GET / lists the directory, GET /name returns a file's contents and
/// POST /name overwrites (or creates) a file. Requests may only name
/// entries directly inside the served directory, anything nested or
/// containing a parent reference is refused.
pub struct FileHandler {
    root: PathBuf,
}

impl FileHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn respond(&self, raw: &[u8]) -> Response {
        let request = match Request::parse(raw) {
            Ok(request) => request,
            Err(err) => {
                warn!("failed to parse request: {}", err);
                return Response::bad_request();
            }
        };

        info!("{:?} {}", request.method, request.path);

        if !path_is_safe(request.path.as_str()) {
            warn!("refusing unsafe path: {}", request.path);
            return Response::forbidden();
        }

        match request.method {
            Method::Get if request.path == "/" => self.list_directory().await,
            Method::Get => self.read_file(request.path.as_str()).await,
            Method::Post => self.write_file(request.path.as_str(), request.body).await,
        }
    }

    async fn list_directory(&self) -> Response {
        let mut entries = match fs::read_dir(self.root.as_path()).await {
            Ok(entries) => entries,
            Err(err) => {
                error!("failed to read directory {:?}: {}", self.root, err);
                return Response::internal_error();
            }
        };

        let mut listing = String::new();

        while let Some(entry) = entries.next().await {
            match entry {
                Ok(entry) => {
                    listing.push_str(entry.file_name().to_string_lossy().as_ref());
                    listing.push('\n');
                }
                Err(err) => {
                    error!("failed to read directory entry: {}", err);
                    return Response::internal_error();
                }
            }
        }

        Response::ok(listing.into_bytes()).with_header("Content-Type", "text/plain")
    }

    async fn read_file(&self, path: &str) -> Response {
        let file_path = self.root.join(&path[1..]);

        match fs::read(file_path.as_path()).await {
            Ok(contents) => Response::ok(contents),
            Err(err) if err.kind() == ErrorKind::NotFound => Response::not_found(),
            Err(err) => {
                error!("failed to read {:?}: {}", file_path, err);
                Response::internal_error()
            }
        }
    }

    async fn write_file(&self, path: &str, body: Vec<u8>) -> Response {
        let file_path = self.root.join(&path[1..]);

        match fs::write(file_path.as_path(), body).await {
            Ok(()) => Response::ok(vec![]),
            Err(err) => {
                error!("failed to write {:?}: {}", file_path, err);
                Response::internal_error()
            }
        }
    }
}

#[async_trait]
impl RequestHandler for FileHandler {
    async fn handle(&self, request: Vec<u8>, connection: ServerConnection) {
        let response = self.respond(request.as_slice()).await;

        if let Err(err) = connection.transfer(response.to_bytes().as_slice()).await {
            error!("failed to deliver response: {}", err);
        }
    }
}

/// A request path is safe when it names the served directory itself or
/// one entry directly inside it.
fn path_is_safe(path: &str) -> bool {
    path.starts_with('/') && path.matches('/').count() <= 1 && !path.contains("..")
}
