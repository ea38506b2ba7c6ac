// In-process stand-in for the detection service

#![allow(dead_code)]

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose, Engine as _};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// What the service saw in one multipart upload
#[derive(Debug, Clone, Default)]
pub struct SeenUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub image_len: usize,
    pub mode: Option<String>,
    pub annotated: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Reply {
    Json(StatusCode, Value),
    Text(StatusCode, &'static str),
    Delayed(Duration, Value),
}

#[derive(Clone)]
pub struct StubService {
    seen: Arc<Mutex<Vec<SeenUpload>>>,
    reply: Arc<Mutex<Reply>>,
}

impl StubService {
    pub fn new(reply: Reply) -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
            reply: Arc::new(Mutex::new(reply)),
        }
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock() = reply;
    }

    pub fn uploads(&self) -> Vec<SeenUpload> {
        self.seen.lock().clone()
    }

    /// Serve under `prefix` on an ephemeral port; returns the base URL
    pub async fn spawn(&self, prefix: &str) -> String {
        let routes = Router::new()
            .route("/detect", post(detect))
            .route("/samples", get(samples))
            .route("/sample/:name", get(sample))
            .with_state(self.clone());
        let app = if prefix.is_empty() {
            routes
        } else {
            Router::new().nest(prefix, routes)
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}{}", addr, prefix)
    }
}

async fn detect(State(stub): State<StubService>, mut multipart: Multipart) -> Response {
    let mut upload = SeenUpload::default();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                upload.file_name = field.file_name().map(str::to_string);
                upload.content_type = field.content_type().map(str::to_string);
                upload.image_len = field.bytes().await.map(|b| b.len()).unwrap_or(0);
            }
            "mode" => upload.mode = field.text().await.ok(),
            "annotated" => upload.annotated = field.text().await.ok(),
            _ => {}
        }
    }
    stub.seen.lock().push(upload);

    let reply = stub.reply.lock().clone();
    match reply {
        Reply::Json(status, body) => (status, Json(body)).into_response(),
        Reply::Text(status, body) => (status, body).into_response(),
        Reply::Delayed(delay, body) => {
            tokio::time::sleep(delay).await;
            Json(body).into_response()
        }
    }
}

async fn samples() -> Json<Value> {
    Json(json!({
        "images": ["crew.jpg", "yard.png"],
        "videos": ["site.mp4"],
    }))
}

async fn sample(Path(name): Path<String>) -> Response {
    match name.as_str() {
        "crew.jpg" => (
            [(header::CONTENT_TYPE, "image/jpeg")],
            vec![0xffu8, 0xd8, 0xff, 0xe0],
        )
            .into_response(),
        "yard.png" => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            vec![0x89u8, b'P', b'N', b'G'],
        )
            .into_response(),
        "site.mp4" => (
            [(header::CONTENT_TYPE, "video/mp4; codecs=avc1")],
            vec![0u8; 16],
        )
            .into_response(),
        _ => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

pub fn detections_body() -> Value {
    json!({
        "success": true,
        "detections": [
            {"label": "With Helmet", "confidence": 0.91, "bbox": [10, 40, 60, 120], "class_id": 0},
            {"label": "Without Helmet", "confidence": 0.77, "bbox": [80, 30, 140, 110], "class_id": 1},
        ],
        "stats": {"total": 2, "with_helmet": 1, "without_helmet": 1},
    })
}

pub fn annotated_body(jpeg: &[u8]) -> Value {
    json!({
        "success": true,
        "image": general_purpose::STANDARD.encode(jpeg),
        "detections": [
            {"label": "Without Helmet", "confidence": 0.88, "bbox": [5, 5, 20, 30], "class_id": 1},
        ],
    })
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([30, 120, 200]));
    let mut bytes = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, 85)
        .encode_image(&image)
        .unwrap();
    bytes
}
