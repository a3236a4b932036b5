use chrono::NaiveTime;
use std::fmt;
use std::path::Path;

use super::Channel;
use crate::models::lock_schedule;
use crate::paths::path_problems;
use crate::resolver::{whole_seconds, DurationProbe};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingResource {
        schedule_path: String,
        day: usize,
        start_time: NaiveTime,
        resource_id: String,
    },
    UnreadablePath {
        owner: String,
        path: String,
    },
    IllegalPath {
        owner: String,
        path: String,
        problem: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingResource {
                schedule_path,
                day,
                start_time,
                resource_id,
            } => write!(
                f,
                "{}: day {} at {} references missing resource {}",
                schedule_path,
                day,
                start_time.format("%H:%M"),
                resource_id
            ),
            ValidationIssue::UnreadablePath { owner, path } => {
                write!(f, "{}: cannot read {}", owner, path)
            }
            ValidationIssue::IllegalPath {
                owner,
                path,
                problem,
            } => write!(f, "{}: {} has a {}", owner, path, problem),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    fn check_path(&mut self, channel: &Channel, owner: &str, path: &str) {
        if !channel.storage.is_readable(Path::new(path)) {
            self.issues.push(ValidationIssue::UnreadablePath {
                owner: owner.to_string(),
                path: path.to_string(),
            });
        }
        for problem in path_problems(path) {
            self.issues.push(ValidationIssue::IllegalPath {
                owner: owner.to_string(),
                path: path.to_string(),
                problem,
            });
        }
    }
}

impl Channel {
    /// Finds dangling program references, unreadable files and paths the
    /// player would refuse. Every issue is also logged.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        for (index, shared) in self.schedules.iter().enumerate() {
            let owner = self
                .manifest
                .schedules
                .get(index)
                .map(|d| d.schedule_path.clone())
                .unwrap_or_else(|| format!("schedule #{}", index));
            let schedule = lock_schedule(shared);

            for (day, programs) in schedule.days.iter().enumerate() {
                for program in programs {
                    if !schedule.resources.contains_key(&program.resource_id) {
                        report.issues.push(ValidationIssue::MissingResource {
                            schedule_path: owner.clone(),
                            day,
                            start_time: program.start_time,
                            resource_id: program.resource_id.clone(),
                        });
                    }
                }
            }
            for resource in schedule.resources.values() {
                report.check_path(self, &owner, &resource.path);
            }
        }

        for (id, list) in &self.lists {
            let owner = format!("list {}", id);
            for resource in list.resources.values() {
                report.check_path(self, &owner, &resource.path);
            }
        }

        for issue in &report.issues {
            tracing::warn!("{}", issue);
        }
        report
    }

    /// Probes every schedule and list resource again and stores durations
    /// that changed. Returns the number of resources updated.
    pub fn reassign_durations(&mut self, probe: &dyn DurationProbe) -> usize {
        let root = self.root().to_path_buf();
        let mut changed = 0;

        for index in 0..self.schedules.len() {
            let shared = self.schedules[index].clone();
            let paths: Vec<(String, String)> = lock_schedule(&shared)
                .resources
                .iter()
                .map(|(id, r)| (id.clone(), r.path.clone()))
                .collect();

            let mut updated = 0;
            for (id, path) in paths {
                let seconds = whole_seconds(probe.probe_duration(&root.join(&path)));
                if seconds == 0 {
                    continue;
                }
                let mut schedule = lock_schedule(&shared);
                if let Some(resource) = schedule.resources.get_mut(&id) {
                    if resource.duration != seconds {
                        resource.duration = seconds;
                        updated += 1;
                    }
                }
            }
            if updated > 0 {
                self.dirty.mark_schedule(index);
                changed += updated;
            }
        }

        let list_ids: Vec<String> = self.lists.keys().cloned().collect();
        for id in list_ids {
            let mut updated = 0;
            if let Some(list) = self.lists.get_mut(&id) {
                for resource in list.resources.values_mut() {
                    let seconds = whole_seconds(probe.probe_duration(&root.join(&resource.path)));
                    if seconds > 0 && resource.duration != seconds {
                        resource.duration = seconds;
                        updated += 1;
                    }
                }
            }
            if updated > 0 {
                self.dirty.mark_list(&id);
                changed += updated;
            }
        }

        if changed > 0 {
            self.resource_db.invalidate();
        }
        tracing::info!("Reassigned {} durations", changed);
        changed
    }
}
