//service/mod.rs
pub mod expiration_worker;

use actix_web::http::header::{self, ContentType};
use actix_web::{web, HttpRequest, HttpResponse};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use log::{info, warn};
use std::future::Future;

use crate::app_state::AppState;
use crate::error::GatewayError;
use crate::naming::{decode, encode};
use crate::rate_limit::Admission;
use crate::storage::StoreError;

/// Chunks buffered between the request body and the store upload
const BODY_CHANNEL_DEPTH: usize = 8;

/// Request fields kept in the logging MDC while a handler runs.
///
/// log-mdc is thread-local and one actix worker thread interleaves many
/// requests, so another request can overwrite these entries while this one is
/// suspended. `restore` puts them back after every await. Lines logged by the
/// store while the request is suspended may still carry another request's
/// fields.
struct MdcScope {
    method: &'static str,
    key: Option<String>,
}

impl MdcScope {
    fn enter(method: &'static str) -> Self {
        log_mdc::insert("method", method);
        log_mdc::remove("key");
        MdcScope { method, key: None }
    }

    fn key(&mut self, key: &str) {
        log_mdc::insert("key", key);
        self.key = Some(key.to_string());
    }

    fn restore(&self) {
        log_mdc::insert("method", self.method);
        match &self.key {
            Some(key) => {
                log_mdc::insert("key", key.as_str());
            }
            None => {
                log_mdc::remove("key");
            }
        }
    }
}

impl Drop for MdcScope {
    fn drop(&mut self) {
        // leave entries that now belong to another request alone
        if log_mdc::get("method", |value| value == Some(self.method)) {
            log_mdc::remove("method");
        }
        let key = self.key.as_deref();
        if key.is_some() && log_mdc::get("key", |value| value == key) {
            log_mdc::remove("key");
        }
    }
}

/// Register the gateway routes: `POST /` uploads, `GET /<handle>` downloads,
/// anything else is answered with 405.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/{handle:.*}")
            .route(web::post().to(upload_service))
            .route(web::get().to(download_service))
            .default_service(web::to(method_not_allowed)),
    );
}

async fn admit(app_state: &AppState, mdc: &MdcScope) {
    let timeout = app_state.config.server.admission_timeout();
    let admission = app_state.limiter.acquire_within(timeout).await;
    mdc.restore();
    if admission == Admission::Degraded {
        warn!("No rate limit token within {}s, proceeding unthrottled", timeout.as_secs());
    }
}

async fn with_deadline<T, E: From<StoreError>>(
    app_state: &AppState,
    call: impl Future<Output = Result<T, E>>,
) -> Result<T, E> {
    let timeout = app_state.config.server.request_timeout();
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| E::from(StoreError::Timeout(timeout.as_secs())))?
}

fn declared_length(req: &HttpRequest) -> Option<u64> {
    req.headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn etag(digest: md5::Digest) -> String {
    format!("\"{}\"", hex::encode(digest.0))
}

/// Entity tags go out quoted whether or not the store quoted them
fn quote_etag(tag: &str) -> String {
    if tag.starts_with('"') || tag.starts_with("W/") {
        tag.to_string()
    } else {
        format!("\"{}\"", tag)
    }
}

/// Feed the request body into `tx` chunk by chunk, enforcing `limit`.
///
/// Returns the number of bytes forwarded and the ETag of the body. When the
/// body fails or grows past the limit, an `Err` item is sent so the store
/// abandons the upload.
async fn forward_body(
    mut payload: web::Payload,
    mut tx: mpsc::Sender<Result<Bytes, StoreError>>,
    limit: Option<u64>,
    mdc: &MdcScope,
) -> Result<(u64, String), GatewayError> {
    let mut size = 0u64;
    let mut digest = md5::Context::new();

    while let Some(chunk) = payload.next().await {
        mdc.restore();
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Error reading payload chunk: {}", e);
                let _ = tx.send(Err(StoreError::Aborted(e.to_string()))).await;
                return Err(GatewayError::Payload(e.to_string()));
            }
        };

        size += chunk.len() as u64;
        if let Some(limit) = limit {
            if size > limit {
                warn!("Upload passed the {} byte limit while streaming", limit);
                let _ = tx
                    .send(Err(StoreError::Aborted(format!("body exceeds {} bytes", limit))))
                    .await;
                return Err(GatewayError::PayloadTooLarge { size, limit });
            }
        }

        digest.consume(&chunk);
        if tx.send(Ok(chunk)).await.is_err() {
            // the store stopped reading, its own result says why
            break;
        }
    }

    Ok((size, etag(digest.compute())))
}

/// Store the request body under a fresh key and answer with its handle
pub async fn upload_service(
    req: HttpRequest,
    payload: web::Payload,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let mut mdc = MdcScope::enter("POST");
    admit(&app_state, &mdc).await;

    let declared = declared_length(&req);
    match declared {
        Some(len) => info!("Upload: content_length={}", len),
        None => info!("Upload: content_length=unknown"),
    }

    let limit = app_state.config.limits.size_limit();
    if let (Some(limit), Some(size)) = (limit, declared) {
        if size > limit {
            warn!("Rejecting upload of {} bytes, limit is {}", size, limit);
            return Err(GatewayError::PayloadTooLarge { size, limit });
        }
    }

    let key = app_state.keys.generate();
    let key_str = key.to_string();
    mdc.key(&key_str);

    let (tx, rx) = mpsc::channel(BODY_CHANNEL_DEPTH);
    let upload = async {
        let (forwarded, stored) = futures::join!(
            forward_body(payload, tx, limit, &mdc),
            app_state.store.put(&key_str, rx.boxed()),
        );
        // a failing body explains a failing store, so report it first
        let (size, tag) = forwarded?;
        let status = stored?;
        Ok::<_, GatewayError>((status, size, tag))
    };
    let outcome = with_deadline(&app_state, upload).await;
    mdc.restore();
    let (status, size, tag) = outcome.map_err(|e| {
        warn!("Put of {} failed: {}", key_str, e);
        e
    })?;

    info!("Stored {} bytes at {}", size, key_str);
    Ok(HttpResponse::build(status)
        .insert_header(ContentType::plaintext())
        .insert_header((header::ETAG, tag))
        .body(encode(&key)))
}

/// Stream back the bytes behind the handle in the request path
pub async fn download_service(
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let mut mdc = MdcScope::enter("GET");
    admit(&app_state, &mdc).await;

    let raw = path.into_inner();
    let key = match decode(raw.trim_matches('/')) {
        Ok(key) => key,
        Err(e) => {
            info!("Download: invalid handle {:?}", raw);
            return Err(e.into());
        }
    };
    let key_str = key.to_string();
    mdc.key(&key_str);
    info!("Download: key={}", key_str);

    let opened = with_deadline(&app_state, app_state.store.get(&key_str)).await;
    mdc.restore();
    let object = opened.map_err(|e| {
        warn!("Get of {} failed: {}", key_str, e);
        e
    })?;

    info!("Streaming {} bytes from {}", object.size, key_str);
    let mut response = HttpResponse::Ok();
    response.content_type("application/octet-stream");
    if let Some(tag) = &object.e_tag {
        response.insert_header((header::ETAG, quote_etag(tag)));
    }
    Ok(response.no_chunking(object.size).streaming(object.body))
}

/// Anything other than GET or POST
pub async fn method_not_allowed(req: HttpRequest) -> HttpResponse {
    info!("Rejecting {} {}", req.method(), req.path());
    HttpResponse::MethodNotAllowed()
        .insert_header((header::ALLOW, "GET, POST"))
        .finish()
}
