//! The interactive side of media resolution: drives a worker for one day,
//! answers its locate-content prompts and applies duration events.

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use uhf_engine::resolver::DurationProbe;
use uhf_engine::{
    Channel, LocateRequest, LocateResponse, ResolutionReport, Resolver, ResolverEvent,
    ResolverSession,
};

/// How locate-content prompts are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    Interactive,
    Decline,
}

pub async fn resolve_day(
    channel: &mut Channel,
    ordinal: i64,
    probe: Arc<dyn DurationProbe>,
    session: &ResolverSession,
    mode: PromptMode,
) -> Result<ResolutionReport> {
    let job = channel
        .resolution_job(ordinal)
        .ok_or_else(|| anyhow!("day {} is outside the channel", ordinal))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let resolver = Resolver::new(probe, session.clone(), tx);
    let mut handle = resolver.spawn(job);
    drop(resolver);

    loop {
        tokio::select! {
            Some(event) = rx.recv() => match event {
                ResolverEvent::LocateContent(request) => answer(request, mode).await?,
                other => {
                    channel.apply_resolver_event(&other);
                }
            },
            report = &mut handle => {
                while let Ok(event) = rx.try_recv() {
                    channel.apply_resolver_event(&event);
                }
                return Ok(report?);
            }
        }
    }
}

async fn answer(request: LocateRequest, mode: PromptMode) -> Result<()> {
    if mode == PromptMode::Decline || !console::user_attended() {
        tracing::warn!("Skipping {:?}", request.missing_path());
        request.respond(LocateResponse::Declined);
        return Ok(());
    }

    let prompt = format!(
        "{} (blank to skip it for this session)",
        request.prompt()
    );
    let text = tokio::task::spawn_blocking(move || -> Result<String> {
        use dialoguer::{theme::ColorfulTheme, Input};

        let text: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?;
        Ok(text)
    })
    .await??;

    request.respond(parse_directories(&text));
    Ok(())
}

/// Splits a comma separated answer into directories. Nothing usable means
/// the user declined.
pub fn parse_directories(text: &str) -> LocateResponse {
    let dirs: Vec<PathBuf> = text
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect();
    if dirs.is_empty() {
        LocateResponse::Declined
    } else {
        LocateResponse::Directories(dirs)
    }
}
