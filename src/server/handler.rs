//! Request dispatch: static files and the diagnostic form endpoint.

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::debug;

use crate::parser::{HttpRequest, Method};
use crate::server::error::Error;
use crate::server::resolver::{resolve, ResolvedFile};
use crate::server::response::{HttpResponse, StatusCode};

/// Path of the form endpoint answering `POST` with a greeting.
pub const DIAGNOSTIC_POST_PATH: &str = "/testPostApi";

/// Methods the server answers; sent in `Allow` on `405`.
pub const ALLOWED_METHODS: &str = "GET, HEAD, POST";

/// Produce the response for one request.
///
/// Failures are turned into error pages here, so every request yields a
/// response. The keep-alive flag is left for the caller to set.
pub async fn handle(request: &HttpRequest, root: &Path) -> HttpResponse {
    let result = match &request.method {
        Method::GET => serve_file(&request.path, root, true).await,
        Method::HEAD => serve_file(&request.path, root, false).await,
        Method::POST => handle_post(request),
        other => Err(Error::MethodNotAllowed(other.to_string(), request.path.clone())),
    };

    result.unwrap_or_else(|e| error_response(&e))
}

/// Render an error as an explanatory HTML page.
pub fn error_response(error: &Error) -> HttpResponse {
    let status = error.status_code();
    let message = match error {
        Error::ParseError(_) => "The request could not be understood".to_string(),
        Error::Forbidden(path) => format!("You do not have permission to access {path}"),
        Error::NotFound(path) => format!("The requested resource {path} was not found"),
        Error::MethodNotAllowed(method, _) => format!("The {method} method is not supported"),
        Error::PayloadTooLarge(limit) => format!("Requests may not exceed {limit} bytes"),
        Error::AtCapacity(_) => "The server is busy, please try again later".to_string(),
        _ => "The server failed to process the request".to_string(),
    };

    let response = HttpResponse::error_page(status, &message);
    match error {
        Error::MethodNotAllowed(_, _) => response.with_header("Allow", ALLOWED_METHODS),
        _ => response,
    }
}

async fn serve_file(request_path: &str, root: &Path, include_body: bool) -> Result<HttpResponse, Error> {
    let ResolvedFile { path, metadata } = resolve(request_path, root)
        .await
        .map_err(|e| e.into_error(request_path))?;

    let content_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .to_string();
    let last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);

    let mut response = HttpResponse::new(StatusCode::Ok).with_content_type(content_type);
    if let Some(modified) = last_modified {
        response = response.with_last_modified(modified);
    }

    if include_body {
        let contents = tokio::fs::read(&path)
            .await
            .map_err(|e| read_error(e, request_path))?;
        Ok(response.with_body_bytes(contents))
    } else {
        Ok(response.with_content_length(metadata.len()))
    }
}

fn read_error(error: io::Error, request_path: &str) -> Error {
    debug!("Reading {request_path} failed: {error}");
    match error.kind() {
        io::ErrorKind::PermissionDenied => Error::Forbidden(request_path.to_string()),
        io::ErrorKind::NotFound => Error::NotFound(request_path.to_string()),
        _ => Error::IoError(error),
    }
}

fn handle_post(request: &HttpRequest) -> Result<HttpResponse, Error> {
    if request.path != DIAGNOSTIC_POST_PATH {
        return Err(Error::NotFound(request.path.clone()));
    }

    let body = request.body_text();
    let name = form_field(&body, "name").unwrap_or_default();

    Ok(HttpResponse::new(StatusCode::Ok)
        .with_content_type("text/plain")
        .with_body_string(format!("Hello {name}!")))
}

/// Value of the first `key=value` pair named `key` in an `&`-separated body.
fn form_field<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    body.split('&').find_map(|field| {
        let (name, value) = field.split_once('=')?;
        (name == key).then_some(value)
    })
}
