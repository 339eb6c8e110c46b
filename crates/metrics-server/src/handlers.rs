// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Route handlers. Each one receives an already decoded request body and
//! answers with a complete response; errors are mapped to status codes here.

use std::str::FromStr;

use hyper::{http, StatusCode};
use metrics_common::{metrics_from_payloads, Metric, MetricKind, MetricPayload};
use metrics_store::{Store, StoreError};
use tracing::debug;

use crate::errors::{store_error_status, validation_status};
use crate::http_utils::{
    html_response, json_response, log_and_create_http_response, text_response, HttpResponse,
};

fn store_error_response(context: &str, err: &StoreError) -> http::Result<HttpResponse> {
    log_and_create_http_response(&format!("{context}: {err}"), store_error_status(err))
}

fn encoded_response(encoded: serde_json::Result<Vec<u8>>) -> http::Result<HttpResponse> {
    match encoded {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => log_and_create_http_response(
            &format!("Failed to encode response: {e}"),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    }
}

/// `POST /update/` with a single JSON payload. Answers with the applied
/// metric.
pub async fn update_json(store: &dyn Store, body: &[u8]) -> http::Result<HttpResponse> {
    let payload: MetricPayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            return log_and_create_http_response(
                &format!("Invalid metric payload: {e}"),
                StatusCode::BAD_REQUEST,
            )
        }
    };
    let metric = match Metric::try_from(payload) {
        Ok(metric) => metric,
        Err(e) => {
            return log_and_create_http_response(
                &format!("Rejected metric: {e}"),
                validation_status(&e),
            )
        }
    };
    if let Err(e) = store.update(&metric).await {
        return store_error_response("Failed to update metric", &e);
    }
    debug!("Updated {} metric {}", metric.kind(), metric.id);
    encoded_response(serde_json::to_vec(&MetricPayload::from(&metric)))
}

/// `POST /updates/` with a JSON array. The whole batch is validated before
/// the store sees any of it, so an invalid element means nothing is applied.
pub async fn update_batch(store: &dyn Store, body: &[u8]) -> http::Result<HttpResponse> {
    let payloads: Vec<MetricPayload> = match serde_json::from_slice(body) {
        Ok(payloads) => payloads,
        Err(e) => {
            return log_and_create_http_response(
                &format!("Invalid metrics batch: {e}"),
                StatusCode::BAD_REQUEST,
            )
        }
    };
    let metrics = match metrics_from_payloads(payloads) {
        Ok(metrics) => metrics,
        Err(e) => {
            return log_and_create_http_response(
                &format!("Rejected metrics batch: {e}"),
                validation_status(&e),
            )
        }
    };
    if let Err(e) = store.update_batch(&metrics).await {
        return store_error_response("Failed to update metrics batch", &e);
    }
    debug!("Updated batch of {} metrics", metrics.len());
    let echoed: Vec<MetricPayload> = metrics.iter().map(MetricPayload::from).collect();
    encoded_response(serde_json::to_vec(&echoed))
}

/// `POST /value/` with `{"id": .., "type": ..}`. Answers with the stored
/// metric.
pub async fn value_json(store: &dyn Store, body: &[u8]) -> http::Result<HttpResponse> {
    let query: MetricPayload = match serde_json::from_slice(body) {
        Ok(query) => query,
        Err(e) => {
            return log_and_create_http_response(
                &format!("Invalid metric query: {e}"),
                StatusCode::BAD_REQUEST,
            )
        }
    };
    if query.id.is_empty() {
        return log_and_create_http_response("Metric query has no id", StatusCode::NOT_FOUND);
    }
    let kind = match query.kind() {
        Ok(kind) => kind,
        Err(e) => {
            return log_and_create_http_response(
                &format!("Invalid metric query: {e}"),
                StatusCode::BAD_REQUEST,
            )
        }
    };
    match store.get(kind, &query.id).await {
        Ok(metric) => encoded_response(serde_json::to_vec(&MetricPayload::from(&metric))),
        Err(e) => store_error_response("Failed to read metric", &e),
    }
}

/// `POST /update/{type}/{id}/{value}`, where `segments` is the part after
/// `/update/`.
pub async fn update_path(store: &dyn Store, segments: &str) -> http::Result<HttpResponse> {
    let mut parts = segments.trim_end_matches('/').splitn(3, '/');
    let kind = parts.next().unwrap_or_default();
    let id = parts.next().unwrap_or_default();
    let raw_value = parts.next().unwrap_or_default();

    if let Err(e) = MetricKind::from_str(kind) {
        return log_and_create_http_response(&format!("Rejected metric: {e}"), StatusCode::BAD_REQUEST);
    }
    if id.is_empty() || raw_value.is_empty() {
        return log_and_create_http_response(
            &format!("Metric path {segments:?} lacks an id or a value"),
            StatusCode::NOT_FOUND,
        );
    }
    let metric = match Metric::parse(kind, id, raw_value) {
        Ok(metric) => metric,
        Err(e) => {
            return log_and_create_http_response(
                &format!("Rejected metric: {e}"),
                validation_status(&e),
            )
        }
    };
    match store.update(&metric).await {
        Ok(()) => text_response(StatusCode::OK, ""),
        Err(e) => store_error_response("Failed to update metric", &e),
    }
}

/// `GET /value/{type}/{id}`. Answers with the bare value as text.
pub async fn value_path(store: &dyn Store, segments: &str) -> http::Result<HttpResponse> {
    let (kind, id) = segments
        .trim_end_matches('/')
        .split_once('/')
        .unwrap_or((segments, ""));
    let kind = match MetricKind::from_str(kind) {
        Ok(kind) => kind,
        Err(e) => {
            return log_and_create_http_response(&format!("Invalid metric query: {e}"), StatusCode::BAD_REQUEST)
        }
    };
    if id.is_empty() {
        return log_and_create_http_response("Metric query has no id", StatusCode::NOT_FOUND);
    }
    match store.get(kind, id).await {
        Ok(metric) => text_response(StatusCode::OK, metric.value.to_string()),
        Err(e) => store_error_response("Failed to read metric", &e),
    }
}

/// `GET /ping`, a probe of the store backend.
pub async fn ping(store: &dyn Store) -> http::Result<HttpResponse> {
    match store.ping().await {
        Ok(()) => text_response(StatusCode::OK, "pong"),
        Err(e) => store_error_response("Store is unreachable", &e),
    }
}

/// `GET /`, an HTML table of every stored metric.
pub async fn index(store: &dyn Store) -> http::Result<HttpResponse> {
    let metrics = match store.all().await {
        Ok(metrics) => metrics,
        Err(e) => return store_error_response("Failed to list metrics", &e),
    };

    let mut page = String::from(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"UTF-8\"><title>Metrics</title></head>\n<body>\n<table>\n<tr><th>Type</th><th>Name</th><th>Value</th></tr>\n",
    );
    for metric in &metrics {
        page.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            metric.kind(),
            escape_html(&metric.id),
            metric.value
        ));
    }
    page.push_str("</table>\n</body>\n</html>\n");
    html_response(page)
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
