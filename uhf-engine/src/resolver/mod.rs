//! Media Resolution Pipeline.
//!
//! A worker per "resolve this day" request probes every program's resource
//! and writes durations back into the owning schedule. When a file cannot be
//! probed the worker asks the foreground to locate it and blocks until the
//! answer arrives. There is no timeout on that wait.

pub mod probe;
pub mod session;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::models::{lock_schedule, Program, SharedSchedule};

pub use probe::{
    whole_seconds, ContainerProbe, DurationProbe, FfprobeProbe, ProbeChain, ProbeConfig,
};
pub use session::{Blacklist, LocationHints, ResolverSession};

use session::path_key;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateResponse {
    /// Directories to search from now on.
    Directories(Vec<PathBuf>),
    Declined,
}

/// A worker waiting for the foreground to locate a file.
#[derive(Debug)]
pub struct LocateRequest {
    prompt: String,
    missing: PathBuf,
    session: ResolverSession,
    reply: oneshot::Sender<LocateResponse>,
}

impl LocateRequest {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn missing_path(&self) -> &Path {
        &self.missing
    }

    /// Records the answer in the session and wakes the worker. An empty
    /// directory list counts as a decline.
    pub fn respond(self, response: LocateResponse) {
        let response = match response {
            LocateResponse::Directories(dirs) if dirs.is_empty() => LocateResponse::Declined,
            other => other,
        };

        match &response {
            LocateResponse::Directories(dirs) => {
                for dir in dirs {
                    self.session.hints.add(dir.clone());
                }
            }
            LocateResponse::Declined => {
                tracing::info!("Blacklisted {:?} for this session", self.missing);
                self.session.blacklist.insert(&self.missing);
            }
        }

        if self.reply.send(response).is_err() {
            tracing::warn!("Resolution worker went away before the answer arrived");
        }
    }
}

#[derive(Debug)]
pub enum ResolverEvent {
    LocateContent(LocateRequest),
    DurationResolved {
        schedule_index: usize,
        resource_id: String,
        seconds: u32,
    },
}

/// Everything a worker needs to resolve one day.
#[derive(Debug, Clone)]
pub struct ResolutionJob {
    pub schedule_index: usize,
    pub schedule: SharedSchedule,
    pub programs: Vec<Program>,
    pub root: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    /// Resource ids whose stored duration changed.
    pub resolved: Vec<String>,
    /// Paths left unresolved because resolution was declined.
    pub blacklisted: Vec<String>,
    pub prompts: usize,
    pub passes: usize,
    pub had_failure: bool,
}

#[derive(Clone)]
pub struct Resolver {
    probe: Arc<dyn DurationProbe>,
    session: ResolverSession,
    events: mpsc::UnboundedSender<ResolverEvent>,
}

impl Resolver {
    pub fn new(
        probe: Arc<dyn DurationProbe>,
        session: ResolverSession,
        events: mpsc::UnboundedSender<ResolverEvent>,
    ) -> Self {
        Self {
            probe,
            session,
            events,
        }
    }

    pub fn session(&self) -> &ResolverSession {
        &self.session
    }

    /// Runs the job on the blocking pool.
    pub fn spawn(&self, job: ResolutionJob) -> JoinHandle<ResolutionReport> {
        let worker = self.clone();
        tokio::task::spawn_blocking(move || worker.run(job))
    }

    /// Blocks the calling thread until every program of the job is either
    /// resolved or declined. Must not run on an async executor thread.
    pub fn run(&self, job: ResolutionJob) -> ResolutionReport {
        let mut report = ResolutionReport::default();
        // Paths whose prompt nobody answered. Skipped for the rest of this run
        // only; the session blacklist is left to the user.
        let mut unanswered: HashSet<String> = HashSet::new();

        loop {
            report.passes += 1;
            report.blacklisted.clear();

            if !self.scan(&job, &mut report, &mut unanswered) {
                break;
            }
        }

        tracing::debug!(
            "Resolved day of schedule {} in {} passes ({} prompts)",
            job.schedule_index,
            report.passes,
            report.prompts
        );
        report
    }

    /// One pass over the day. Returns true when the pass was interrupted by
    /// a prompt and has to start over.
    fn scan(
        &self,
        job: &ResolutionJob,
        report: &mut ResolutionReport,
        unanswered: &mut HashSet<String>,
    ) -> bool {
        for program in &job.programs {
            // Copy out what we need; the lock is never held while probing.
            let resource = {
                let schedule = lock_schedule(&job.schedule);
                schedule.resources.get(&program.resource_id).cloned()
            };
            let Some(resource) = resource else {
                tracing::warn!(
                    "Program at {} references missing resource {}",
                    program.start_time.format("%H:%M"),
                    program.resource_id
                );
                continue;
            };

            let path = self.session.hints.resolve(&job.root, &resource.path);
            let seconds = whole_seconds(self.probe.probe_duration(&path));
            if seconds > 0 {
                self.record_duration(job, &program.resource_id, seconds, report);
                continue;
            }

            let key = path_key(&path);
            if self.session.blacklist.contains(&path) || unanswered.contains(&key) {
                if !report.blacklisted.contains(&key) {
                    report.blacklisted.push(key);
                }
                continue;
            }

            report.prompts += 1;
            match self.ask_foreground(&path) {
                Some(LocateResponse::Directories(dirs)) => {
                    tracing::info!("Retrying day with {} new location(s)", dirs.len());
                }
                Some(LocateResponse::Declined) => {
                    report.had_failure = true;
                }
                None => {
                    report.had_failure = true;
                    unanswered.insert(key);
                }
            }
            return true;
        }
        false
    }

    fn record_duration(
        &self,
        job: &ResolutionJob,
        resource_id: &str,
        seconds: u32,
        report: &mut ResolutionReport,
    ) {
        let changed = {
            let mut schedule = lock_schedule(&job.schedule);
            match schedule.resources.get_mut(resource_id) {
                Some(resource) if resource.duration != seconds => {
                    resource.duration = seconds;
                    true
                }
                _ => false,
            }
        };
        if !changed {
            return;
        }

        if !report.resolved.iter().any(|id| id == resource_id) {
            report.resolved.push(resource_id.to_string());
        }
        let event = ResolverEvent::DurationResolved {
            schedule_index: job.schedule_index,
            resource_id: resource_id.to_string(),
            seconds,
        };
        if self.events.send(event).is_err() {
            tracing::warn!("Duration of {} resolved with nobody listening", resource_id);
        }
    }

    /// Posts a locate-content request and waits for the answer. `None` when
    /// the foreground is gone.
    fn ask_foreground(&self, missing: &Path) -> Option<LocateResponse> {
        let (reply, answer) = oneshot::channel();
        let name = missing
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| missing.to_string_lossy().into_owned());
        let request = LocateRequest {
            prompt: format!("Locate the folder containing {}", name),
            missing: missing.to_path_buf(),
            session: self.session.clone(),
            reply,
        };

        if self
            .events
            .send(ResolverEvent::LocateContent(request))
            .is_err()
        {
            tracing::warn!("No foreground to locate {:?}", missing);
            return None;
        }

        match answer.blocking_recv() {
            Ok(response) => Some(response),
            Err(_) => {
                tracing::warn!("Locate request for {:?} was dropped unanswered", missing);
                None
            }
        }
    }
}
