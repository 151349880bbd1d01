//! Digest curator: batch runner.
//!
//! Reads one JSON batch (path from argv[1] or `DIGEST_INPUT_PATH`, else stdin),
//! deduplicates it, ranks the survivors and prints the digest as JSON.
//!
//! Input shape:
//! {
//!   "owner": "u1",
//!   "profile": { "user_id": "u1", "preferred_content_types": ["blog"] },
//!   "items": [ { "title": ..., "body": ..., "url": ..., ... } ],
//!   "feedback": [ { "item_index": 0, "action": "like" } ]
//! }
//!
//! Feedback entries refer to items of the same batch and are applied after
//! deduplication, before ranking.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use digest_curator::{
    rank::HotReloadWeights, ContentItem, DigestPipeline, FeedbackAction, FetchedItem,
    PipelineConfig, RankingEngine, UserProfile,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ENV_INPUT_PATH: &str = "DIGEST_INPUT_PATH";
const ENV_WEIGHTS_PATH: &str = "DIGEST_WEIGHTS_PATH";

#[derive(Debug, Deserialize)]
struct BatchInput {
    owner: String,
    #[serde(default)]
    profile: Option<UserProfile>,
    items: Vec<FetchedItem>,
    #[serde(default)]
    feedback: Vec<FeedbackInput>,
}

#[derive(Debug, Deserialize)]
struct FeedbackInput {
    item_index: usize,
    action: FeedbackAction,
}

#[derive(Debug, Serialize)]
struct BatchOutput<'a> {
    owner: &'a str,
    unique: usize,
    duplicates: Vec<DuplicateSummary<'a>>,
    fail_open: usize,
    cancelled: bool,
    digest: &'a digest_curator::DigestSelection,
}

#[derive(Debug, Serialize)]
struct DuplicateSummary<'a> {
    id: digest_curator::ItemId,
    duplicate_of: Option<digest_curator::ItemId>,
    stage: &'static str,
    url: &'a str,
}

/// Compact logs to stderr; JSON lines when `DIGEST_LOG_JSON=1`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("dedup=info,digest=info,preferences=info,rank=info,warn")
    });
    let json = std::env::var("DIGEST_LOG_JSON").is_ok_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "prometheus recorder not installed");
            None
        }
    }
}

fn read_input() -> Result<BatchInput> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(ENV_INPUT_PATH).ok())
        .map(PathBuf::from);
    let raw = match &path {
        Some(p) => std::fs::read_to_string(p)
            .with_context(|| format!("reading batch from {}", p.display()))?,
        None => {
            let mut s = String::new();
            std::io::stdin()
                .read_to_string(&mut s)
                .context("reading batch from stdin")?;
            s
        }
    };
    serde_json::from_str(&raw).context("parsing batch JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();
    let metrics = init_metrics();

    let cfg = PipelineConfig::load().context("loading pipeline config")?;
    let input = read_input()?;

    let weights_path = std::env::var(ENV_WEIGHTS_PATH).ok().map(PathBuf::from);
    let hot = Arc::new(HotReloadWeights::new(weights_path.as_deref(), cfg.ranking));
    let pipeline = DigestPipeline::in_memory(&cfg).with_ranking_engine(RankingEngine::with_hot_reload(hot));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let report = pipeline.deduplicate(input.items, &input.owner, &cancel).await;

    for fb in &input.feedback {
        let Some(id) = report.assigned.get(fb.item_index).copied().flatten() else {
            warn!(index = fb.item_index, "feedback refers to no deduplicated item of the batch");
            continue;
        };
        if let Err(e) = pipeline.record_feedback(&input.owner, id, fb.action).await {
            warn!(error = %e, "feedback not applied");
        }
    }

    let profile = input
        .profile
        .unwrap_or_else(|| UserProfile::new(input.owner.clone()));
    let unique: &[ContentItem] = &report.unique;
    let digest = pipeline.rank_and_select(unique, &profile).await;

    let out = BatchOutput {
        owner: &input.owner,
        unique: report.unique.len(),
        duplicates: report
            .duplicates
            .iter()
            .map(|d| DuplicateSummary {
                id: d.item.id,
                duplicate_of: d.item.duplicate_of,
                stage: d.stage.as_str(),
                url: &d.item.url,
            })
            .collect(),
        fail_open: report.fail_open,
        cancelled: report.cancelled,
        digest: &digest,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    info!(owner = %input.owner, selected = digest.len(), "digest written");

    if std::env::var("DIGEST_METRICS_DUMP").is_ok_and(|v| v == "1") {
        if let Some(handle) = metrics {
            eprintln!("{}", handle.render());
        }
    }
    Ok(())
}
