use std::convert::Infallible;
use std::sync::Arc;

use fashion_serve::{FashionClassifier, Timer};
use hyper::body::Bytes;
use hyper::header::{self, HeaderValue};
use hyper::{Body, Method, Request, Response, StatusCode};
use log::{debug, error, info, warn};
use serde_json::json;

pub const NO_FILE: &str = "No image file sent";
pub const EMPTY_FILENAME: &str = "Empty filename";
const PREDICTION_FAILURE: &str = "Error processing image or making prediction";

/// Outcome of looking for the `file` part of a multipart upload.
#[derive(Debug)]
enum Upload {
    File(Bytes),
    Missing,
    EmptyFilename,
}

pub async fn handle(
    req: Request<Body>,
    classifier: Arc<FashionClassifier>,
) -> Result<Response<Body>, Infallible> {
    debug!("{} {}", req.method(), req.uri());

    let response = match (req.method(), req.uri().path()) {
        (&Method::POST, "/predict") => predict(req, classifier).await,
        (&Method::OPTIONS, "/predict") => preflight(),
        (_, "/predict") => json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
        _ => json_error(StatusCode::NOT_FOUND, "Not found"),
    };

    Ok(response)
}

async fn predict(req: Request<Body>, classifier: Arc<FashionClassifier>) -> Response<Body> {
    let mut t = Timer::new_start("Handling request");

    let data = match read_upload(req).await {
        Upload::File(data) => data,
        Upload::Missing => return json_error(StatusCode::BAD_REQUEST, NO_FILE),
        Upload::EmptyFilename => return json_error(StatusCode::BAD_REQUEST, EMPTY_FILENAME),
    };

    // Decoding and the forward pass both block.
    let result = tokio::task::spawn_blocking(move || classifier.classify_from_raw(&data)).await;

    let response = match result {
        Ok(Ok(prediction)) => match serde_json::to_string(&prediction) {
            Ok(body) => {
                info!(
                    "Predicted '{}' with confidence {:.4}",
                    prediction.predicted_class(),
                    prediction.confidence()
                );
                json_response(StatusCode::OK, body)
            }
            Err(e) => prediction_failure(&e),
        },
        Ok(Err(e)) => prediction_failure(&e),
        Err(e) => prediction_failure(&e),
    };

    t.stop();

    response
}

async fn read_upload(req: Request<Body>) -> Upload {
    let boundary = match req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .and_then(|ct| multer::parse_boundary(ct).ok())
    {
        Some(boundary) => boundary,
        None => {
            warn!("Rejecting request without a multipart body");
            return Upload::Missing;
        }
    };

    let mut multipart = multer::Multipart::new(req.into_body(), boundary);

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed multipart body: {}", e);
                return Upload::Missing;
            }
        };

        if field.name() != Some("file") {
            continue;
        }

        // A part without a filename is a plain form value, not a file.
        let file_name = match field.file_name() {
            Some(name) => name.to_owned(),
            None => continue,
        };

        if file_name.is_empty() {
            warn!("Rejecting upload with an empty filename");
            return Upload::EmptyFilename;
        }

        return match field.bytes().await {
            Ok(data) => {
                debug!("Received '{}' ({} bytes)", file_name, data.len());
                Upload::File(data)
            }
            Err(e) => {
                warn!("Could not read '{}': {}", file_name, e);
                Upload::Missing
            }
        };
    }

    warn!("Rejecting request without a 'file' part");
    Upload::Missing
}

fn prediction_failure(e: &dyn std::fmt::Display) -> Response<Body> {
    error!("{}: {}", PREDICTION_FAILURE, e);

    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        &format!("{}: {}", PREDICTION_FAILURE, e),
    )
}

fn json_error(status: StatusCode, message: &str) -> Response<Body> {
    json_response(status, json!({ "error": message }).to_string())
}

fn json_response(status: StatusCode, body: String) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    allow_any_origin(response)
}

fn preflight() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );

    allow_any_origin(response)
}

fn allow_any_origin(mut response: Response<Body>) -> Response<Body> {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}
