use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{ChannelError, Result};
use crate::timefmt::to_minute;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: &str = "UHF Channel - v1";
/// Spelling written by early versions of the editor.
pub const LEGACY_MANIFEST_VERSION: &str = "UHF channel - v1";
pub const SCHEDULE_VERSION: &str = "UHF Schedule - v1";
pub const LIST_VERSION: &str = "UHF List - v1";

/// Days per schedule file for newly created channels.
pub const DAYS_PER_WEEK: usize = 7;

// Resource models

/// Metadata for one media file. A duration of 0 means the duration has not
/// been resolved yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub path: String,
    pub duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_offset: Option<u32>,
}

impl Resource {
    pub fn new(path: impl Into<String>, duration: u32) -> Self {
        Self {
            path: path.into(),
            duration,
            title: None,
            series_id: None,
            order: None,
            description: None,
            year: None,
            start_offset: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn is_unresolved(&self) -> bool {
        self.duration == 0
    }

    pub fn has_description(&self) -> bool {
        self.description
            .as_deref()
            .map(|d| !d.is_empty())
            .unwrap_or(false)
    }
}

/// Resource identifier -> resource. Keys are only unique within one table.
pub type ResourceTable = BTreeMap<String, Resource>;

// Schedule models

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    #[serde(with = "crate::timefmt")]
    pub start_time: NaiveTime,
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
}

impl Program {
    pub fn new(start_time: NaiveTime, resource_id: impl Into<String>) -> Self {
        Self {
            start_time,
            resource_id: resource_id.into(),
            category_id: None,
        }
    }
}

pub type Day = Vec<Program>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub version: String,
    pub resources: ResourceTable,
    pub days: Vec<Day>,
}

impl Schedule {
    pub fn with_empty_days(day_count: usize) -> Self {
        Self {
            version: SCHEDULE_VERSION.to_string(),
            resources: ResourceTable::new(),
            days: vec![Vec::new(); day_count],
        }
    }

    /// Inserts a program keeping the day ordered by start time. Programs with
    /// an equal start time keep their insertion order.
    /// Appends a program and re-sorts the day, so a day that arrived out of
    /// order is sorted afterwards too. Start times are kept to the minute.
    pub fn insert_program(&mut self, day: usize, mut program: Program) -> Option<usize> {
        let programs = self.days.get_mut(day)?;
        program.start_time = to_minute(program.start_time);
        let start_time = program.start_time;
        programs.push(program);
        programs.sort_by_key(|p| p.start_time);
        programs.iter().rposition(|p| p.start_time == start_time)
    }

    pub fn sort_day(&mut self, day: usize) {
        if let Some(programs) = self.days.get_mut(day) {
            programs.sort_by_key(|p| p.start_time);
        }
    }

    /// Sorts every day by start time. Returns the indices of the days that
    /// were out of order.
    pub fn sort_days(&mut self) -> Vec<usize> {
        let mut unsorted = Vec::new();
        for (index, programs) in self.days.iter_mut().enumerate() {
            if !programs.windows(2).all(|w| w[0].start_time <= w[1].start_time) {
                programs.sort_by_key(|p| p.start_time);
                unsorted.push(index);
            }
        }
        unsorted
    }

    pub fn program_index(&self, day: usize, start_time: NaiveTime) -> Option<usize> {
        let start_time = to_minute(start_time);
        self.days
            .get(day)?
            .iter()
            .position(|p| p.start_time == start_time)
    }

    pub fn referenced_ids(&self) -> BTreeSet<&str> {
        self.days
            .iter()
            .flatten()
            .map(|p| p.resource_id.as_str())
            .collect()
    }

    /// Identifiers used by programs but absent from the resource table.
    pub fn missing_ids(&self) -> Vec<String> {
        self.referenced_ids()
            .into_iter()
            .filter(|id| !self.resources.contains_key(*id))
            .map(str::to_string)
            .collect()
    }

    /// Removes every resource that no program references. Returns the
    /// removed identifiers.
    pub fn prune_orphans(&mut self) -> Vec<String> {
        let referenced: BTreeSet<String> = self
            .referenced_ids()
            .into_iter()
            .map(str::to_string)
            .collect();

        let orphans: Vec<String> = self
            .resources
            .keys()
            .filter(|id| !referenced.contains(*id))
            .cloned()
            .collect();

        for id in &orphans {
            self.resources.remove(id);
        }
        orphans
    }

    /// Moves the resource stored under `old_id` to `new_id` and rewrites every
    /// program that referenced it. Either everything changes or nothing does.
    /// Returns the number of programs rewritten.
    pub fn rekey(&mut self, old_id: &str, new_id: &str) -> Result<usize> {
        if new_id.is_empty() {
            return Err(ChannelError::InvalidInput(
                "resource identifier must not be empty".to_string(),
            ));
        }
        if self.resources.contains_key(new_id) {
            return Err(ChannelError::IdentifierInUse(new_id.to_string()));
        }
        let resource = self
            .resources
            .remove(old_id)
            .ok_or_else(|| ChannelError::UnknownResource(old_id.to_string()))?;
        self.resources.insert(new_id.to_string(), resource);

        let mut rewritten = 0;
        for program in self.days.iter_mut().flatten() {
            if program.resource_id == old_id {
                program.resource_id = new_id.to_string();
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }
}

/// A schedule shared between the foreground and resolution workers. Each
/// schedule has its own lock so unrelated schedules never contend.
pub type SharedSchedule = Arc<Mutex<Schedule>>;

pub fn lock_schedule(schedule: &SharedSchedule) -> MutexGuard<'_, Schedule> {
    schedule.lock().unwrap_or_else(PoisonError::into_inner)
}

// List models

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct List {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<ListInfo>,
    pub resources: ResourceTable,
}

impl List {
    pub fn new(title: Option<String>) -> Self {
        Self {
            version: LIST_VERSION.to_string(),
            info: Some(ListInfo {
                title,
                description: None,
            }),
            resources: ResourceTable::new(),
        }
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.resources.values().any(|r| r.path == path)
    }

    /// Next free key of the form `<prefix><NNNN>`, counting up from the
    /// current number of entries.
    pub fn next_key(&self, prefix: &str) -> String {
        let mut count = self.resources.len();
        loop {
            let key = format!("{}{:04}", prefix, count);
            if !self.resources.contains_key(&key) {
                return key;
            }
            count += 1;
        }
    }
}

// Manifest models

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDescriptor {
    pub start_date: NaiveDate,
    pub schedule_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chyron_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListProgram {
    #[serde(with = "crate::timefmt")]
    pub start_time: NaiveTime,
    pub list_ids: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::timefmt::option"
    )]
    pub end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSchedule {
    pub schedule: Vec<ListProgram>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDescriptor {
    pub list_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<ChannelInfo>,
    pub schedules: Vec<ScheduleDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<BTreeMap<String, Series>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lists: Option<BTreeMap<String, ListDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
    /// Seven entries when present, index 0 is Sunday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dotw_list_schedule: Option<Vec<ListSchedule>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::timefmt::option"
    )]
    pub beginning_of_broadcast_day: Option<NaiveTime>,
}

impl Manifest {
    pub fn new(schedules: Vec<ScheduleDescriptor>) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            info: None,
            schedules,
            series: None,
            lists: None,
            categories: None,
            dotw_list_schedule: None,
            beginning_of_broadcast_day: None,
        }
    }

    pub fn list_descriptor(&self, id: &str) -> Option<&ListDescriptor> {
        self.lists.as_ref()?.get(id)
    }

    pub fn series_title(&self, series_id: &str) -> Option<&str> {
        self.series
            .as_ref()?
            .get(series_id)
            .map(|s| s.title.as_str())
    }

    /// Descriptors must be in ascending start date order.
    pub fn schedules_in_date_order(&self) -> bool {
        self.schedules
            .windows(2)
            .all(|pair| pair[0].start_date <= pair[1].start_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn schedule_with(programs: &[(NaiveTime, &str)], resources: &[&str]) -> Schedule {
        let mut schedule = Schedule::with_empty_days(7);
        for (start, id) in programs {
            schedule.insert_program(0, Program::new(*start, *id));
        }
        for id in resources {
            schedule
                .resources
                .insert(id.to_string(), Resource::new(format!("{}.mp4", id), 60));
        }
        schedule
    }

    #[test]
    fn test_insert_program_keeps_day_sorted() {
        let mut schedule = schedule_with(&[(t(9, 0), "a"), (t(10, 0), "b")], &["a", "b"]);
        let at = schedule.insert_program(0, Program::new(t(9, 30), "c"));
        assert_eq!(at, Some(1));

        let times: Vec<NaiveTime> = schedule.days[0].iter().map(|p| p.start_time).collect();
        assert_eq!(times, vec![t(9, 0), t(9, 30), t(10, 0)]);
    }

    #[test]
    fn test_insert_program_into_unsorted_day() {
        let mut schedule = Schedule::with_empty_days(7);
        schedule.days[0].push(Program::new(t(10, 0), "a"));
        schedule.days[0].push(Program::new(t(9, 0), "b"));

        let at = schedule.insert_program(0, Program::new(t(9, 30), "c"));
        assert_eq!(at, Some(1));
        let ids: Vec<&str> = schedule.days[0].iter().map(|p| p.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_insert_program_drops_seconds() {
        let mut schedule = Schedule::with_empty_days(7);
        schedule.insert_program(0, Program::new(NaiveTime::from_hms_opt(20, 30, 15).unwrap(), "a"));
        assert_eq!(schedule.days[0][0].start_time, t(20, 30));
        assert_eq!(
            schedule.program_index(0, NaiveTime::from_hms_opt(20, 30, 45).unwrap()),
            Some(0)
        );
    }

    #[test]
    fn test_sort_days_reports_unsorted_days() {
        let mut schedule = Schedule::with_empty_days(7);
        schedule.days[2].push(Program::new(t(10, 0), "a"));
        schedule.days[2].push(Program::new(t(9, 0), "b"));
        schedule.days[4].push(Program::new(t(9, 0), "c"));

        assert_eq!(schedule.sort_days(), vec![2]);
        assert_eq!(schedule.days[2][0].resource_id, "b");
        assert!(schedule.sort_days().is_empty());
    }

    #[test]
    fn test_insert_program_out_of_range_day() {
        let mut schedule = Schedule::with_empty_days(7);
        assert_eq!(schedule.insert_program(7, Program::new(t(1, 0), "x")), None);
    }

    #[test]
    fn test_prune_orphans() {
        let mut schedule = schedule_with(&[(t(9, 0), "a")], &["a", "orphan"]);
        let removed = schedule.prune_orphans();
        assert_eq!(removed, vec!["orphan".to_string()]);
        assert!(schedule.resources.contains_key("a"));
        assert_eq!(schedule.resources.len(), 1);
    }

    #[test]
    fn test_missing_ids() {
        let schedule = schedule_with(&[(t(9, 0), "a"), (t(11, 0), "ghost")], &["a"]);
        assert_eq!(schedule.missing_ids(), vec!["ghost".to_string()]);
    }

    #[test]
    fn test_rekey_rewrites_every_reference() {
        let mut schedule = schedule_with(&[(t(9, 0), "a"), (t(10, 0), "a")], &["a"]);
        schedule.days[3].push(Program::new(t(8, 0), "a"));

        let rewritten = schedule.rekey("a", "z").unwrap();
        assert_eq!(rewritten, 3);
        assert!(schedule.resources.contains_key("z"));
        assert!(!schedule.resources.contains_key("a"));
        assert!(schedule.days.iter().flatten().all(|p| p.resource_id == "z"));
    }

    #[test]
    fn test_rekey_to_existing_identifier_changes_nothing() {
        let mut schedule = schedule_with(&[(t(9, 0), "a"), (t(10, 0), "b")], &["a", "b"]);
        let before = schedule.clone();

        let result = schedule.rekey("a", "b");
        assert!(matches!(result, Err(ChannelError::IdentifierInUse(id)) if id == "b"));
        assert_eq!(schedule, before);
    }

    #[test]
    fn test_rekey_unknown_identifier_changes_nothing() {
        let mut schedule = schedule_with(&[(t(9, 0), "a")], &["a"]);
        let before = schedule.clone();
        assert!(matches!(
            schedule.rekey("nope", "b"),
            Err(ChannelError::UnknownResource(_))
        ));
        assert_eq!(schedule, before);
    }

    #[test]
    fn test_list_next_key_skips_used() {
        let mut list = List::new(Some("Fillers".to_string()));
        list.resources
            .insert("fill0001".to_string(), Resource::new("a.mp4", 10));
        // One entry, so counting starts at 1, which is taken.
        assert_eq!(list.next_key("fill"), "fill0002");
    }

    #[test]
    fn test_resource_json_omits_absent_fields() {
        let resource = Resource::new("movies/a.mp4", 5400).with_title("A");
        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"path": "movies/a.mp4", "duration": 5400, "title": "A"})
        );
    }

    #[test]
    fn test_program_time_format() {
        let program: Program =
            serde_json::from_str(r#"{"start_time": "21:05:00", "resource_id": "x"}"#).unwrap();
        assert_eq!(program.start_time, t(21, 5));
        let json = serde_json::to_string(&program).unwrap();
        assert!(json.contains("\"21:05\""));
    }

    #[test]
    fn test_manifest_date_order() {
        let mut manifest = Manifest::new(vec![
            ScheduleDescriptor {
                start_date: NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
                schedule_path: "schedule0.json".to_string(),
            },
            ScheduleDescriptor {
                start_date: NaiveDate::from_ymd_opt(2024, 1, 14).unwrap(),
                schedule_path: "schedule1.json".to_string(),
            },
        ]);
        assert!(manifest.schedules_in_date_order());
        manifest.schedules.swap(0, 1);
        assert!(!manifest.schedules_in_date_order());
    }
}
