use chrono::{Duration, NaiveDate};

use crate::models::ScheduleDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayLocation {
    pub schedule: usize,
    pub day: usize,
}

/// Ordinal 0 is the first day of the first schedule in the manifest; ordinals
/// run through every schedule's days in manifest order. Misses are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayIndex {
    day_counts: Vec<usize>,
}

impl DayIndex {
    pub fn new(day_counts: Vec<usize>) -> Self {
        Self { day_counts }
    }

    pub fn day_counts(&self) -> &[usize] {
        &self.day_counts
    }

    pub fn total_days(&self) -> usize {
        self.day_counts.iter().sum()
    }

    pub fn locate(&self, ordinal: i64) -> Option<DayLocation> {
        if ordinal < 0 {
            return None;
        }
        let mut remaining = usize::try_from(ordinal).ok()?;
        for (schedule, &count) in self.day_counts.iter().enumerate() {
            if count > remaining {
                return Some(DayLocation {
                    schedule,
                    day: remaining,
                });
            }
            remaining -= count;
        }
        None
    }

    pub fn schedule_index_for(&self, ordinal: i64) -> Option<usize> {
        self.locate(ordinal).map(|loc| loc.schedule)
    }

    pub fn day_index_for(&self, ordinal: i64) -> Option<usize> {
        self.locate(ordinal).map(|loc| loc.day)
    }

    /// Inverse of [`DayIndex::locate`].
    pub fn ordinal_for(&self, location: DayLocation) -> Option<i64> {
        let count = *self.day_counts.get(location.schedule)?;
        if location.day >= count {
            return None;
        }
        let before: usize = self.day_counts[..location.schedule].iter().sum();
        i64::try_from(before + location.day).ok()
    }

    /// Calendar date of an ordinal: the owning schedule's start date plus the
    /// in-file day offset.
    pub fn date_for(&self, ordinal: i64, descriptors: &[ScheduleDescriptor]) -> Option<NaiveDate> {
        let loc = self.locate(ordinal)?;
        let start = descriptors.get(loc.schedule)?.start_date;
        start.checked_add_signed(Duration::days(loc.day as i64))
    }

    /// Ordinal showing `date`, if any schedule covers it.
    pub fn ordinal_for_date(&self, date: NaiveDate, descriptors: &[ScheduleDescriptor]) -> Option<i64> {
        for (schedule, descriptor) in descriptors.iter().enumerate() {
            let count = *self.day_counts.get(schedule)?;
            let offset = (date - descriptor.start_date).num_days();
            if offset >= 0 && (offset as usize) < count {
                return self.ordinal_for(DayLocation {
                    schedule,
                    day: offset as usize,
                });
            }
        }
        None
    }
}
