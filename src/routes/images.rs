use crate::config::Config;
use crate::image_ops::image_types::MimeType;
use crate::routes::responses::{ApiError, ImageResponse, api_error};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use log::{debug, info};
use serde_json::{Value, json};
use std::sync::Arc;

/// Origin headers passed through to the client, besides every `X-*` header
const FORWARDED_HEADERS: [HeaderName; 4] = [
    header::CACHE_CONTROL,
    header::LAST_MODIFIED,
    header::ETAG,
    header::EXPIRES,
];

fn is_forwarded(name: &HeaderName) -> bool {
    FORWARDED_HEADERS.contains(name) || name.as_str().starts_with("x-")
}

/// Resize image at `url` (`host[:port]/path`) to exactly `width` x `height`
pub async fn fill_image(
    Path((width, height, url)): Path<(u32, u32, String)>,
    State(state): State<Arc<Config>>,
) -> Result<ImageResponse, ApiError> {
    info!("Filling {} to {}x{}", url, width, height);

    if !state.max_image_resize.is_allowed_size(width, height) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("invalid size: {}x{} is out of allowed range", width, height),
        ));
    }

    // dropping the handler (client went away) cancels the fetch as well
    let cancel = state.shutdown.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let img = state.processor.process(&cancel, &url, width, height).await?;
    debug!("processed image {}. Generating response", &url);

    let mut headers = HeaderMap::new();
    for (name, value) in img.headers.iter().filter(|(name, _)| is_forwarded(name)) {
        headers.append(name.clone(), value.clone());
    }
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(img.extension.mime_type()),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!(
            "inline; filename=\"preview.{}\"",
            img.extension.name()
        ))
        .map_err(|err| api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?,
    );

    Ok(ImageResponse {
        headers,
        data: img.data,
    })
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
