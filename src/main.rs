use anyhow::{Context, Result};
use learning::{JobEventBridge, SectionStreamReconstructor};
use log::*;
use service::{config::Config, logging::Logger};
use sse::{ConnectionConfig, EventRouter, EventSourceTransport, HttpTokenProvider};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

/// Consumers that report once they have reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Watch {
    Job,
    Guide,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::new();
    Logger::init_logger(&config as &Config);

    let mut tokens = HttpTokenProvider::new(config.base_url(), config.request_timeout())
        .context("failed to build the token client")?;
    if let Some(api_token) = config.api_token() {
        tokens = tokens.with_bearer_token(api_token);
    }

    let router = EventRouter::new(
        ConnectionConfig::new(config.base_url()).with_reconnect_delay(config.reconnect_delay()),
        Arc::new(tokens),
        Arc::new(EventSourceTransport::new()),
    );
    info!("Listening for events from {}", config.base_url());

    let (finished, mut finished_rx) = unbounded_channel();
    let mut pending = HashSet::new();

    let mut job = config.job_id.clone().map(|job_id| {
        pending.insert(Watch::Job);
        attach_job(&router, &config, job_id, finished.clone())
    });
    let mut guide = config.content_id.clone().map(|content_id| {
        pending.insert(Watch::Guide);
        attach_guide(&router, content_id, finished.clone())
    });

    if pending.is_empty() {
        // Nothing to wait for; keep the stream open until interrupted
        router.connect();
        tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
        info!("Interrupted, shutting down");
    }

    while !pending.is_empty() {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, shutting down");
                break;
            }
            Some(watch) = finished_rx.recv() => {
                pending.remove(&watch);
            }
        }
    }

    if let Some(job) = job.as_mut() {
        let snapshot = job.snapshot();
        info!("Job {:?} ended as {:?}", snapshot.job_id, snapshot.status);
        job.teardown();
    }
    if let Some(guide) = guide.as_mut() {
        info!(
            "Learning guide {}: {} of {} section(s) loaded",
            guide.content_id(),
            guide.loaded_sections().len(),
            guide.outline().len()
        );
        guide.teardown();
    }
    router.disconnect();

    Ok(())
}

fn attach_job(
    router: &EventRouter,
    config: &Config,
    job_id: String,
    finished: UnboundedSender<Watch>,
) -> JobEventBridge {
    info!("Watching {} job {}", config.job_category, job_id);
    let failed = finished.clone();

    JobEventBridge::builder(config.job_category)
        .job_id(job_id)
        .on_completed(move |result| {
            info!(
                "Job completed, resource {}",
                result.resource_id.as_deref().unwrap_or("(none)")
            );
            let _ = finished.send(Watch::Job);
        })
        .on_failed(move |message| {
            error!("Job failed: {message}");
            let _ = failed.send(Watch::Job);
        })
        .attach(router)
}

fn attach_guide(
    router: &EventRouter,
    content_id: String,
    finished: UnboundedSender<Watch>,
) -> SectionStreamReconstructor {
    info!("Reconstructing learning guide {content_id}");

    SectionStreamReconstructor::builder(content_id)
        .on_outline(|outline| {
            for (index, section) in outline.iter().enumerate() {
                info!(
                    "  [{index}] {}",
                    section.title.as_deref().unwrap_or("(untitled)")
                );
            }
        })
        .on_section_loaded(|index, section| {
            info!(
                "Section {index} loaded ({} chars of content, {} chars of example)",
                section.content.chars().count(),
                section.example.chars().count()
            );
        })
        .on_complete(move || {
            let _ = finished.send(Watch::Guide);
        })
        .attach(router)
}
