use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use ndarray::Axis;
use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, StatusCode};

use ferrite_n2n::data::decode_image;
use ferrite_n2n::model::StoredTensor;
use ferrite_n2n::{Batch, DenoisingModel, Mode, N2nError, DENOISED_OUTPUT};

pub type SharedModel = Arc<Mutex<DenoisingModel>>;

type HttpResponse = Response<Cursor<Vec<u8>>>;

#[derive(Serialize)]
struct PredictResponse {
    outputs: BTreeMap<&'static str, StoredTensor>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn respond_with(status: u16, content_type: &str, body: Vec<u8>) -> HttpResponse {
    let len = body.len();
    let headers = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()).into_iter().collect();
    Response::new(StatusCode(status), headers, Cursor::new(body), Some(len), None)
}

fn json_response<T: Serialize>(status: u16, value: &T) -> HttpResponse {
    match serde_json::to_vec(value) {
        Ok(body) => respond_with(status, "application/json", body),
        Err(e) => text_response(500, &format!("could not encode response: {e}")),
    }
}

fn text_response(status: u16, text: &str) -> HttpResponse {
    respond_with(status, "text/plain; charset=utf-8", text.as_bytes().to_vec())
}

fn error_response(err: &N2nError) -> HttpResponse {
    let status = match err {
        N2nError::InvalidInput(_) | N2nError::Image(_) => 400,
        _ => 500,
    };
    json_response(status, &ErrorResponse { error: err.to_string() })
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

pub fn dispatch(mut request: Request, model: SharedModel) {
    let method = request.method().clone();
    let path = request.url().split('?').next().unwrap_or("").to_owned();
    debug!("{method} {path}");

    let response = match (method, path.as_str()) {
        (Method::Get, "/health") => text_response(200, "ok"),
        (Method::Post, "/predict") => handle_predict(&mut request, &model),
        _ => text_response(404, "404 Not Found"),
    };

    if let Err(e) = request.respond(response) {
        warn!("failed to send response: {e}");
    }
}

// ---------------------------------------------------------------------------
// POST /predict
// ---------------------------------------------------------------------------

/// Body: raw PNG/JPEG/BMP/GIF bytes. Answers the denoised image as a
/// `[1, height, width, channels]` tensor.
fn handle_predict(request: &mut Request, model: &SharedModel) -> HttpResponse {
    let mut body = Vec::new();
    if let Err(e) = request.as_reader().read_to_end(&mut body) {
        return text_response(400, &format!("could not read request body: {e}"));
    }
    if body.is_empty() {
        return text_response(400, "request body must contain an image");
    }

    let Ok(mut model) = model.lock() else {
        return text_response(500, "model state is poisoned");
    };
    match predict(&mut model, &body) {
        Ok(denoised) => json_response(200, &PredictResponse { outputs: BTreeMap::from([(DENOISED_OUTPUT, denoised)]) }),
        Err(e) => error_response(&e),
    }
}

fn predict(model: &mut DenoisingModel, bytes: &[u8]) -> ferrite_n2n::Result<StoredTensor> {
    let image = decode_image(bytes, model.channels())?;
    let batch = Batch::new(image.insert_axis(Axis(0)));
    let output = model.run(&batch, Mode::Predict)?;
    let denoised = output
        .into_denoised()
        .ok_or_else(|| N2nError::input("prediction produced no output"))?;
    Ok(StoredTensor { shape: denoised.shape().to_vec(), data: denoised.iter().copied().collect() })
}
