use chrono::{Duration, NaiveTime};
use std::collections::BTreeSet;
use std::path::Path;
use uuid::Uuid;

use super::Channel;
use crate::error::{ChannelError, Result};
use crate::models::{lock_schedule, Program, Resource, Schedule};
use crate::resolver::LocationHints;
use crate::timefmt::to_minute;

/// One row of a rendered day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayProgram {
    pub start_time: NaiveTime,
    pub duration: u32,
    pub title: String,
    pub resource_id: String,
    pub day_ordinal: i64,
    pub has_description: bool,
    /// Missing resource or unreadable file.
    pub error: bool,
}

fn fresh_identifier(schedule: &Schedule) -> String {
    loop {
        let id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        if !schedule.resources.contains_key(&id) {
            return id;
        }
    }
}

impl Channel {
    /// Places `resource` on a day at `start_time`.
    ///
    /// When the database already knows the path, its identifier and metadata
    /// are reused so the same file is not recorded twice. Returns the
    /// identifier the program points at.
    pub fn insert_program(
        &mut self,
        ordinal: i64,
        start_time: NaiveTime,
        resource: Resource,
        category_id: Option<String>,
    ) -> Result<String> {
        let loc = self.require_location(ordinal)?;
        self.refresh_resource_db();
        let matched = self.resource_db.match_by_path(&resource);

        let shared = self.shared_schedule(loc.schedule)?;
        let (identifier, stored) = {
            let mut schedule = lock_schedule(&shared);
            let reusable = matched.identifier.filter(|id| {
                schedule
                    .resources
                    .get(id)
                    .map(|existing| existing.path == resource.path)
                    .unwrap_or(true)
            });
            let identifier = reusable.unwrap_or_else(|| fresh_identifier(&schedule));

            let stored = schedule
                .resources
                .entry(identifier.clone())
                .or_insert(matched.resource)
                .clone();

            let mut program = Program::new(start_time, identifier.clone());
            program.category_id = category_id;
            schedule
                .insert_program(loc.day, program)
                .ok_or(ChannelError::NoSuchDay(ordinal))?;
            (identifier, stored)
        };

        self.resource_db.merge_candidate(&identifier, &stored);
        self.dirty.mark_schedule(loc.schedule);
        tracing::debug!(
            "Scheduled {} as {} at {} on day {}",
            stored.path,
            identifier,
            start_time.format("%H:%M"),
            ordinal
        );
        Ok(identifier)
    }

    pub fn set_program_start_time(
        &mut self,
        ordinal: i64,
        start_time: NaiveTime,
        new_start_time: NaiveTime,
    ) -> Result<()> {
        let loc = self.require_location(ordinal)?;
        let new_start_time = to_minute(new_start_time);
        let shared = self.shared_schedule(loc.schedule)?;
        {
            let mut schedule = lock_schedule(&shared);
            let index = schedule
                .program_index(loc.day, start_time)
                .ok_or(ChannelError::NoSuchProgram {
                    ordinal,
                    start_time,
                })?;
            if schedule.days[loc.day][index].start_time == new_start_time {
                return Ok(());
            }
            let mut program = schedule.days[loc.day].remove(index);
            program.start_time = new_start_time;
            schedule.insert_program(loc.day, program);
        }
        self.dirty.mark_schedule(loc.schedule);
        Ok(())
    }

    /// Moves a program by `minutes`, wrapping around midnight. Returns the
    /// new start time.
    pub fn shift_program_start_time(
        &mut self,
        ordinal: i64,
        start_time: NaiveTime,
        minutes: i64,
    ) -> Result<NaiveTime> {
        let (shifted, _) = to_minute(start_time).overflowing_add_signed(Duration::minutes(minutes));
        self.set_program_start_time(ordinal, start_time, shifted)?;
        Ok(shifted)
    }

    /// Removes a program. Its resource stays in the table until the next
    /// save prunes it.
    pub fn delete_program(&mut self, ordinal: i64, start_time: NaiveTime) -> Result<Program> {
        let loc = self.require_location(ordinal)?;
        let shared = self.shared_schedule(loc.schedule)?;
        let removed = {
            let mut schedule = lock_schedule(&shared);
            let index = schedule
                .program_index(loc.day, start_time)
                .ok_or(ChannelError::NoSuchProgram {
                    ordinal,
                    start_time,
                })?;
            schedule.days[loc.day].remove(index)
        };
        self.dirty.mark_schedule(loc.schedule);
        self.resource_db.invalidate();
        Ok(removed)
    }

    /// The program starting at `start_time` and its resource, if the table
    /// has one.
    pub fn program_at(&self, ordinal: i64, start_time: NaiveTime) -> Option<(Program, Option<Resource>)> {
        let loc = self.locate(ordinal)?;
        let shared = self.schedules.get(loc.schedule)?;
        let schedule = lock_schedule(shared);
        let index = schedule.program_index(loc.day, start_time)?;
        let program = schedule.days[loc.day][index].clone();
        let resource = schedule.resources.get(&program.resource_id).cloned();
        Some((program, resource))
    }

    /// Display rows for a day. Problems show up as `error`, never as a
    /// failure.
    pub fn day_schedule(&self, ordinal: i64) -> Vec<DayProgram> {
        self.day_schedule_with_hints(ordinal, &LocationHints::default())
    }

    /// Like [`Channel::day_schedule`], but a file the user located under one
    /// of `hints` is not flagged.
    pub fn day_schedule_with_hints(&self, ordinal: i64, hints: &LocationHints) -> Vec<DayProgram> {
        let Some(loc) = self.locate(ordinal) else {
            return Vec::new();
        };
        let Some(shared) = self.schedules.get(loc.schedule) else {
            return Vec::new();
        };
        let schedule = lock_schedule(shared);
        let Some(day) = schedule.days.get(loc.day) else {
            return Vec::new();
        };

        day.iter()
            .map(|program| match schedule.resources.get(&program.resource_id) {
                Some(resource) => DayProgram {
                    start_time: program.start_time,
                    duration: resource.duration,
                    title: self.display_title(resource),
                    resource_id: program.resource_id.clone(),
                    day_ordinal: ordinal,
                    has_description: resource.has_description(),
                    error: !self.storage.is_readable(Path::new(&resource.path))
                        && hints.find(&resource.path).is_none(),
                },
                None => {
                    tracing::warn!(
                        "Day {} references missing resource {}",
                        ordinal,
                        program.resource_id
                    );
                    DayProgram {
                        start_time: program.start_time,
                        duration: 0,
                        title: program.resource_id.clone(),
                        resource_id: program.resource_id.clone(),
                        day_ordinal: ordinal,
                        has_description: false,
                        error: true,
                    }
                }
            })
            .collect()
    }

    /// Series title when the manifest knows the series, else the resource
    /// title, else the file name.
    pub fn display_title(&self, resource: &Resource) -> String {
        if let Some(series) = resource
            .series_id
            .as_deref()
            .and_then(|id| self.manifest.series_title(id))
        {
            return series.to_string();
        }
        if let Some(title) = resource.title.as_deref().filter(|t| !t.is_empty()) {
            return title.to_string();
        }
        Path::new(&resource.path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| resource.path.clone())
    }

    /// The program at the same start time `offset_days` away, with its
    /// ordinal.
    pub fn neighbour(
        &self,
        ordinal: i64,
        start_time: NaiveTime,
        offset_days: i64,
    ) -> Option<(i64, Program)> {
        let target = ordinal.checked_add(offset_days)?;
        let start_time = to_minute(start_time);
        self.programs_for(target)
            .into_iter()
            .find(|p| p.start_time == start_time)
            .map(|p| (target, p))
    }

    /// Every path some program points at, across all schedules.
    pub fn schedule_paths(&self) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        for shared in &self.schedules {
            let schedule = lock_schedule(shared);
            for program in schedule.days.iter().flatten() {
                if let Some(resource) = schedule.resources.get(&program.resource_id) {
                    paths.insert(resource.path.clone());
                }
            }
        }
        paths
    }
}
