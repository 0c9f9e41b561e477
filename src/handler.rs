//! Component D: orchestrates the parser, throttler and id mint, then
//! either discards the submission or hands it to the pipeline.
//!
//! Grounded on `on_post` in `breakpad_resource.py`, restructured into
//! the teacher's handler signature style
//! (`req: HttpRequest, body: web::Bytes, state: Data<...>`).

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::Settings;
use crate::crashid;
use crate::metrics_sink;
use crate::parser::{self, ParseOutcome};
use crate::pipeline::WorkQueue;
use crate::stats::StatsLog;
use crate::submission::CrashSubmission;
use crate::throttle::{ThrottleResult, Throttler};

pub struct AppState {
    pub settings: Settings,
    pub queue: Arc<WorkQueue>,
    pub throttler: Arc<dyn Throttler>,
    pub stats: Arc<StatsLog>,
}

pub async fn submit(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let content_type = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok());
    let content_encoding = req
        .headers()
        .get("content-encoding")
        .and_then(|v| v.to_str().ok());
    let content_length = req
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    let outcome = parser::parse(content_type, content_encoding, content_length, &body);

    let (mut annotations, dumps) = match outcome {
        ParseOutcome::Accepted { annotations, dumps } => (annotations, dumps),
        ParseOutcome::Malformed(_) => {
            return plain_text_response("Discarded=1");
        }
    };

    metrics_sink::incoming_crash();

    let now = Utc::now();
    annotations.insert("submitted_timestamp".to_string(), now.to_rfc3339());
    annotations.insert(
        "timestamp".to_string(),
        format!("{:.6}", now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 / 1_000_000.0),
    );

    let mut checksums = HashMap::new();
    for (dump_name, bytes) in &dumps {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        checksums.insert(dump_name.clone(), hex_encode(&digest));
    }
    let minidump_hash = checksums
        .get(&state.settings.dump_field)
        .cloned()
        .unwrap_or_default();
    annotations.insert(
        "dump_checksums".to_string(),
        serde_json::to_string(&checksums).unwrap_or_default(),
    );
    annotations.insert("MinidumpSha256Hash".to_string(), minidump_hash);

    let decision = state.throttler.throttle(&annotations);
    annotations.insert(
        "legacy_processing".to_string(),
        decision.result.as_str().to_string(),
    );
    annotations.insert("throttle_rate".to_string(), decision.rate.to_string());
    metrics_sink::throttle_rule(&decision.rule_name);
    metrics_sink::throttle_result(decision.result.as_str());

    let crash_id = match annotations.get("uuid") {
        Some(candidate) if crashid::validate(candidate) => candidate.clone(),
        _ => crashid::mint(now, decision.result.mint_depth()),
    };
    annotations.insert("uuid".to_string(), crash_id.clone());
    annotations.insert("type_tag".to_string(), state.settings.type_tag());

    let prefix = &state.settings.dump_id_prefix;

    match decision.result {
        ThrottleResult::Reject => plain_text_response("Discarded=1"),
        ThrottleResult::FakeAccept => {
            info!(crash_id = %crash_id, "fake-accepted");
            plain_text_response(&format!("CrashID={prefix}{crash_id}\n"))
        }
        ThrottleResult::Accept | ThrottleResult::Defer => {
            state.stats.record_received(&crash_id);
            let submission = CrashSubmission::new(crash_id.clone(), annotations, dumps);
            state.queue.push(submission);
            info!(crash_id = %crash_id, "accepted");
            plain_text_response(&format!("CrashID={prefix}{crash_id}\n"))
        }
    }
}

fn plain_text_response(body: &str) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain")
        .body(body.to_string())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
