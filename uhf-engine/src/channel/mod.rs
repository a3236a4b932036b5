mod catalog;
mod lists;
mod maintenance;
mod programs;
mod resources;

pub use maintenance::{ValidationIssue, ValidationReport};
pub use programs::DayProgram;
pub use resources::ResourceField;

use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::day_index::{DayIndex, DayLocation};
use crate::dirty::DirtyTracker;
use crate::error::{ChannelError, Result};
use crate::models::{
    lock_schedule, List, ListDescriptor, Manifest, Program, Schedule, ScheduleDescriptor,
    SharedSchedule, DAYS_PER_WEEK, LEGACY_MANIFEST_VERSION, LIST_VERSION, MANIFEST_FILE,
    MANIFEST_VERSION, SCHEDULE_VERSION,
};
use crate::resolver::{ResolutionJob, ResolverEvent, ResolverSession};
use crate::resource_db::ResourceDatabase;
use crate::storage::{check_version, encode_json, load_json, store_json, Storage};

/// Outcome of [`Channel::save`]. Failures other than the manifest's do not
/// stop the save; they are collected here and the entity stays dirty.
#[derive(Debug, Default)]
pub struct SaveReport {
    pub manifest_written: bool,
    pub schedules_written: Vec<String>,
    pub lists_written: Vec<String>,
    pub orphans_removed: usize,
    pub failures: Vec<ChannelError>,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Channel {
    storage: Arc<dyn Storage>,
    manifest: Manifest,
    schedules: Vec<SharedSchedule>,
    lists: BTreeMap<String, List>,
    day_index: DayIndex,
    dirty: DirtyTracker,
    resource_db: ResourceDatabase,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("root", &self.storage.root())
            .field("schedules", &self.schedules.len())
            .field("lists", &self.lists.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Channel {
    /// Reads the manifest, every schedule in descriptor order and every list.
    /// Any unreadable or malformed file fails the whole open.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        let manifest_path = Path::new(MANIFEST_FILE);
        let mut manifest: Manifest = load_json(storage.as_ref(), manifest_path)?;
        check_version(
            manifest_path,
            &manifest.version,
            &[MANIFEST_VERSION, LEGACY_MANIFEST_VERSION],
        )?;
        manifest.version = MANIFEST_VERSION.to_string();

        if let Some(dotw) = &manifest.dotw_list_schedule {
            if dotw.len() != DAYS_PER_WEEK {
                return Err(ChannelError::Malformed {
                    path: manifest_path.to_path_buf(),
                    reason: format!(
                        "dotw_list_schedule has {} entries, expected {}",
                        dotw.len(),
                        DAYS_PER_WEEK
                    ),
                });
            }
        }
        if !manifest.schedules_in_date_order() {
            tracing::warn!("Schedules in {} are not in start date order", MANIFEST_FILE);
        }

        let mut schedules = Vec::with_capacity(manifest.schedules.len());
        for descriptor in &manifest.schedules {
            let path = Path::new(&descriptor.schedule_path);
            let mut schedule: Schedule = load_json(storage.as_ref(), path)?;
            check_version(path, &schedule.version, &[SCHEDULE_VERSION])?;
            for day in schedule.sort_days() {
                tracing::warn!(
                    "Day {} of {} was not in start time order; sorted it",
                    day,
                    descriptor.schedule_path
                );
            }
            for id in schedule.missing_ids() {
                tracing::warn!(
                    "{} references missing resource {}",
                    descriptor.schedule_path,
                    id
                );
            }
            schedules.push(schedule);
        }

        let mut lists = BTreeMap::new();
        if let Some(descriptors) = &manifest.lists {
            for (id, descriptor) in descriptors {
                let path = Path::new(&descriptor.list_path);
                let list: List = load_json(storage.as_ref(), path)?;
                check_version(path, &list.version, &[LIST_VERSION])?;
                lists.insert(id.clone(), list);
            }
        }

        let day_index = DayIndex::new(schedules.iter().map(|s| s.days.len()).collect());
        let dirty = DirtyTracker::clean(schedules.len(), lists.keys().cloned());

        tracing::info!(
            "Opened channel at {:?}: {} schedules, {} days, {} lists",
            storage.root(),
            schedules.len(),
            day_index.total_days(),
            lists.len()
        );

        Ok(Self {
            storage,
            manifest,
            schedules: schedules
                .into_iter()
                .map(|s| Arc::new(Mutex::new(s)))
                .collect(),
            lists,
            day_index,
            dirty,
            resource_db: ResourceDatabase::new(),
        })
    }

    /// A new channel of `weeks` empty schedules, one week each, with start
    /// dates seven days apart. Nothing is written until [`Channel::save`].
    pub fn create(storage: Arc<dyn Storage>, weeks: usize, start_date: NaiveDate) -> Result<Self> {
        if weeks == 0 {
            return Err(ChannelError::InvalidInput(
                "a channel needs at least one week".to_string(),
            ));
        }

        let mut descriptors = Vec::with_capacity(weeks);
        for week in 0..weeks {
            let start = start_date
                .checked_add_signed(Duration::days((week * DAYS_PER_WEEK) as i64))
                .ok_or_else(|| ChannelError::InvalidInput("start date out of range".to_string()))?;
            descriptors.push(ScheduleDescriptor {
                start_date: start,
                schedule_path: format!("schedule{}.json", week),
            });
        }

        let schedules: Vec<SharedSchedule> = (0..weeks)
            .map(|_| Arc::new(Mutex::new(Schedule::with_empty_days(DAYS_PER_WEEK))))
            .collect();

        tracing::info!("Created channel with {} weeks starting {}", weeks, start_date);

        Ok(Self {
            storage,
            manifest: Manifest::new(descriptors),
            schedules,
            lists: BTreeMap::new(),
            day_index: DayIndex::new(vec![DAYS_PER_WEEK; weeks]),
            dirty: DirtyTracker::all_dirty(weeks),
            resource_db: ResourceDatabase::new(),
        })
    }

    /// Writes every dirty entity. The manifest goes first and a failure there
    /// aborts the save. Schedules are pruned of orphan resources before they
    /// are serialized.
    pub fn save(&mut self) -> Result<SaveReport> {
        let mut report = SaveReport::default();

        if self.dirty.is_manifest_dirty() {
            store_json(self.storage.as_ref(), Path::new(MANIFEST_FILE), &self.manifest)?;
            self.dirty.clear_manifest();
            report.manifest_written = true;
        }

        for index in self.dirty.dirty_schedules() {
            let Some(descriptor) = self.manifest.schedules.get(index) else {
                tracing::warn!("Dirty schedule {} has no descriptor", index);
                self.dirty.clear_schedule(index);
                continue;
            };
            let path = PathBuf::from(&descriptor.schedule_path);
            let Some(shared) = self.schedules.get(index) else {
                continue;
            };

            let encoded = {
                let mut schedule = lock_schedule(shared);
                let removed = schedule.prune_orphans();
                if !removed.is_empty() {
                    tracing::info!(
                        "Removed {} orphan resources from {}",
                        removed.len(),
                        path.display()
                    );
                    report.orphans_removed += removed.len();
                }
                encode_json(&path, &*schedule)
            };

            let written = encoded.and_then(|bytes| {
                self.storage
                    .write_bytes(&path, &bytes)
                    .map_err(|source| ChannelError::Write {
                        path: path.clone(),
                        source,
                    })
            });
            match written {
                Ok(()) => {
                    self.dirty.clear_schedule(index);
                    report
                        .schedules_written
                        .push(path.to_string_lossy().into_owned());
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    report.failures.push(e);
                }
            }
        }

        for id in self.dirty.dirty_lists() {
            let (Some(descriptor), Some(list)) =
                (self.manifest.list_descriptor(&id), self.lists.get(&id))
            else {
                tracing::warn!("Skipping list {} that is no longer in the manifest", id);
                self.dirty.forget_list(&id);
                continue;
            };
            match store_json(self.storage.as_ref(), Path::new(&descriptor.list_path), list) {
                Ok(()) => {
                    self.dirty.clear_list(&id);
                    report.lists_written.push(id);
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    report.failures.push(e);
                }
            }
        }

        tracing::info!(
            "Saved channel: manifest {}, {} schedules, {} lists, {} failures",
            if report.manifest_written { "written" } else { "unchanged" },
            report.schedules_written.len(),
            report.lists_written.len(),
            report.failures.len()
        );
        Ok(report)
    }

    pub fn root(&self) -> &Path {
        self.storage.root()
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn schedule_count(&self) -> usize {
        self.schedules.len()
    }

    pub fn schedule(&self, index: usize) -> Option<SharedSchedule> {
        self.schedules.get(index).cloned()
    }

    pub fn lists(&self) -> &BTreeMap<String, List> {
        &self.lists
    }

    pub fn list(&self, id: &str) -> Option<&List> {
        self.lists.get(id)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    pub fn dirty(&self) -> &DirtyTracker {
        &self.dirty
    }

    pub fn total_days(&self) -> usize {
        self.day_index.total_days()
    }

    pub fn locate(&self, ordinal: i64) -> Option<DayLocation> {
        self.day_index.locate(ordinal)
    }

    /// Programs shown on a day. Ordinals outside the channel give an empty
    /// day.
    pub fn programs_for(&self, ordinal: i64) -> Vec<Program> {
        let Some(loc) = self.day_index.locate(ordinal) else {
            return Vec::new();
        };
        self.schedules
            .get(loc.schedule)
            .and_then(|shared| lock_schedule(shared).days.get(loc.day).cloned())
            .unwrap_or_default()
    }

    pub fn date_for(&self, ordinal: i64) -> Option<NaiveDate> {
        self.day_index.date_for(ordinal, &self.manifest.schedules)
    }

    pub fn ordinal_for_date(&self, date: NaiveDate) -> Option<i64> {
        self.day_index
            .ordinal_for_date(date, &self.manifest.schedules)
    }

    /// The resource database, rebuilt first when an edit invalidated it.
    pub fn resource_database(&mut self) -> &ResourceDatabase {
        self.refresh_resource_db();
        &self.resource_db
    }

    /// Writes the database values as a JSON array to `sink`, relative to the
    /// channel root. Returns the number of resources written.
    pub fn export_resource_database(&mut self, sink: &Path) -> Result<usize> {
        self.refresh_resource_db();
        let bytes = self
            .resource_db
            .export_json()
            .map_err(|source| ChannelError::Encode {
                path: sink.to_path_buf(),
                source,
            })?;
        self.storage
            .write_bytes(sink, &bytes)
            .map_err(|source| ChannelError::Write {
                path: sink.to_path_buf(),
                source,
            })?;
        self.resource_db.mark_exported();
        tracing::info!(
            "Exported {} resources to {}",
            self.resource_db.len(),
            sink.display()
        );
        Ok(self.resource_db.len())
    }

    /// Foreground bookkeeping for a worker event. Locate requests are not
    /// handled here; returns false for them.
    pub fn apply_resolver_event(&mut self, event: &ResolverEvent) -> bool {
        match event {
            ResolverEvent::DurationResolved {
                schedule_index,
                resource_id,
                seconds,
            } => {
                tracing::debug!(
                    "Duration of {} in schedule {} is now {}s",
                    resource_id,
                    schedule_index,
                    seconds
                );
                self.dirty.mark_schedule(*schedule_index);
                self.resource_db.invalidate();
                true
            }
            ResolverEvent::LocateContent(_) => false,
        }
    }

    /// Work for a resolution worker covering one day.
    pub fn resolution_job(&self, ordinal: i64) -> Option<ResolutionJob> {
        let loc = self.day_index.locate(ordinal)?;
        let schedule = self.schedules.get(loc.schedule)?.clone();
        let programs = lock_schedule(&schedule).days.get(loc.day)?.clone();
        Some(ResolutionJob {
            schedule_index: loc.schedule,
            schedule,
            programs,
            root: self.root().to_path_buf(),
        })
    }

    /// True when a program of the day still has no duration and its file
    /// has not been given up on this session.
    pub fn needs_resolution(&self, ordinal: i64, session: &ResolverSession) -> bool {
        let Some(loc) = self.day_index.locate(ordinal) else {
            return false;
        };
        let Some(shared) = self.schedules.get(loc.schedule) else {
            return false;
        };
        let schedule = lock_schedule(shared);
        let Some(day) = schedule.days.get(loc.day) else {
            return false;
        };
        day.iter().any(|program| {
            schedule
                .resources
                .get(&program.resource_id)
                .map(|resource| {
                    resource.is_unresolved()
                        && !session
                            .blacklist
                            .contains(&session.hints.resolve(self.root(), &resource.path))
                })
                .unwrap_or(false)
        })
    }

    pub(crate) fn refresh_resource_db(&mut self) {
        if !self.resource_db.is_stale() {
            return;
        }
        let guards: Vec<_> = self.schedules.iter().map(lock_schedule).collect();
        self.resource_db.rebuild(guards.iter().map(|guard| &**guard));
    }

    pub(crate) fn require_location(&self, ordinal: i64) -> Result<DayLocation> {
        self.day_index
            .locate(ordinal)
            .ok_or(ChannelError::NoSuchDay(ordinal))
    }

    pub(crate) fn shared_schedule(&self, index: usize) -> Result<SharedSchedule> {
        self.schedules
            .get(index)
            .cloned()
            .ok_or(ChannelError::NoSuchDay(index as i64))
    }

    pub(crate) fn list_mut(&mut self, id: &str) -> Result<&mut List> {
        self.lists
            .get_mut(id)
            .ok_or_else(|| ChannelError::NoSuchList(id.to_string()))
    }

    pub(crate) fn list_descriptors_mut(&mut self) -> &mut BTreeMap<String, ListDescriptor> {
        self.manifest.lists.get_or_insert_with(BTreeMap::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resource;
    use crate::storage::MemoryStorage;
    use chrono::NaiveTime;

    pub(super) fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    pub(super) fn new_channel(weeks: usize) -> (Arc<MemoryStorage>, Channel) {
        let storage = Arc::new(MemoryStorage::new());
        let channel = Channel::create(
            storage.clone(),
            weeks,
            NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
        )
        .unwrap();
        (storage, channel)
    }

    #[test]
    fn test_create_rejects_zero_weeks() {
        let storage = Arc::new(MemoryStorage::new());
        let result = Channel::create(storage, 0, NaiveDate::from_ymd_opt(2024, 1, 7).unwrap());
        assert!(matches!(result, Err(ChannelError::InvalidInput(_))));
    }

    #[test]
    fn test_create_lays_out_weeks() {
        let (_, channel) = new_channel(3);
        assert!(channel.is_dirty());
        assert_eq!(channel.total_days(), 21);
        assert_eq!(channel.manifest().schedules[2].schedule_path, "schedule2.json");
        assert_eq!(
            channel.date_for(14),
            NaiveDate::from_ymd_opt(2024, 1, 21)
        );
        assert_eq!(channel.ordinal_for_date(NaiveDate::from_ymd_opt(2024, 1, 9).unwrap()), Some(2));
    }

    #[test]
    fn test_first_save_writes_everything_then_clean() {
        let (storage, mut channel) = new_channel(2);
        let report = channel.save().unwrap();
        assert!(report.manifest_written);
        assert_eq!(report.schedules_written.len(), 2);
        assert!(report.is_complete());
        assert!(!channel.is_dirty());
        assert!(storage.get(MANIFEST_FILE).is_some());
        assert!(storage.get("schedule1.json").is_some());

        let reopened = Channel::open(storage).unwrap();
        assert_eq!(reopened.total_days(), 14);
        assert!(!reopened.is_dirty());
    }

    #[test]
    fn test_manifest_failure_aborts_save() {
        let (storage, mut channel) = new_channel(1);
        storage.fail_writes_to(MANIFEST_FILE);

        let err = channel.save().unwrap_err();
        assert!(matches!(err, ChannelError::Write { .. }));
        assert!(storage.get("schedule0.json").is_none());
        assert!(channel.dirty().is_schedule_dirty(0));
        assert!(channel.dirty().is_manifest_dirty());
    }

    #[test]
    fn test_failed_schedule_stays_dirty_others_saved() {
        let (storage, mut channel) = new_channel(2);
        storage.fail_writes_to("schedule0.json");

        let report = channel.save().unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.schedules_written, vec!["schedule1.json".to_string()]);
        assert!(channel.dirty().is_schedule_dirty(0));
        assert!(!channel.dirty().is_schedule_dirty(1));
        assert!(channel.is_dirty());

        storage.allow_writes_to("schedule0.json");
        let retry = channel.save().unwrap();
        assert_eq!(retry.schedules_written, vec!["schedule0.json".to_string()]);
        assert!(!channel.is_dirty());
    }

    #[test]
    fn test_open_rejects_unknown_version() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(
            MANIFEST_FILE,
            r#"{"version": "UHF Channel - v7", "schedules": []}"#,
        );
        let err = Channel::open(storage).unwrap_err();
        assert!(matches!(err, ChannelError::UnsupportedVersion { .. }));
    }

    #[test]
    fn test_open_accepts_legacy_manifest_version() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(
            MANIFEST_FILE,
            r#"{"version": "UHF channel - v1", "schedules": []}"#,
        );
        let channel = Channel::open(storage).unwrap();
        assert_eq!(channel.manifest().version, MANIFEST_VERSION);
    }

    #[test]
    fn test_open_rejects_short_dotw_schedule() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(
            MANIFEST_FILE,
            r#"{"version": "UHF Channel - v1", "schedules": [],
                "dotw_list_schedule": [{"schedule": []}]}"#,
        );
        let err = Channel::open(storage).unwrap_err();
        assert!(matches!(err, ChannelError::Malformed { .. }));
    }

    #[test]
    fn test_open_fails_on_missing_schedule_file() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(
            MANIFEST_FILE,
            r#"{"version": "UHF Channel - v1",
                "schedules": [{"start_date": "2024-01-07", "schedule_path": "schedule0.json"}]}"#,
        );
        let err = Channel::open(storage).unwrap_err();
        assert!(err.is_file_error());
        assert!(err.to_string().contains("schedule0.json"), "{}", err);
    }

    #[test]
    fn test_programs_for_out_of_range_is_empty() {
        let (_, channel) = new_channel(1);
        assert!(channel.programs_for(-1).is_empty());
        assert!(channel.programs_for(7).is_empty());
        assert!(channel.resolution_job(7).is_none());
    }

    #[test]
    fn test_resolver_event_marks_schedule_dirty() {
        let (_, mut channel) = new_channel(2);
        channel.save().unwrap();

        let applied = channel.apply_resolver_event(&ResolverEvent::DurationResolved {
            schedule_index: 1,
            resource_id: "r1".to_string(),
            seconds: 30,
        });
        assert!(applied);
        assert!(channel.dirty().is_schedule_dirty(1));
        assert!(!channel.dirty().is_schedule_dirty(0));
    }

    #[test]
    fn test_needs_resolution() {
        let (_, mut channel) = new_channel(1);
        channel
            .insert_program(0, t(9, 0), Resource::new("shows/a.mp4", 0), None)
            .unwrap();
        channel
            .insert_program(1, t(9, 0), Resource::new("shows/b.mp4", 600), None)
            .unwrap();

        let session = ResolverSession::new();
        assert!(channel.needs_resolution(0, &session));
        assert!(!channel.needs_resolution(1, &session));
        assert!(!channel.needs_resolution(99, &session));

        session
            .blacklist
            .insert(&channel.root().join("shows/a.mp4"));
        assert!(!channel.needs_resolution(0, &session));
    }
}
