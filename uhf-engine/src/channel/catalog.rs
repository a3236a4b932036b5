use chrono::{Duration, NaiveTime};
use std::collections::BTreeMap;

use super::Channel;
use crate::error::{ChannelError, Result};
use crate::models::{
    lock_schedule, Category, ChannelInfo, ListSchedule, Series, DAYS_PER_WEEK,
};

impl Channel {
    pub fn set_channel_title(&mut self, title: Option<String>) {
        self.manifest.info.get_or_insert_with(ChannelInfo::default).title = title;
        self.dirty.mark_manifest();
    }

    pub fn set_channel_description(&mut self, description: Option<String>) {
        self.manifest
            .info
            .get_or_insert_with(ChannelInfo::default)
            .description = description;
        self.dirty.mark_manifest();
    }

    // Series

    pub fn add_series(&mut self, id: &str, title: &str) -> Result<()> {
        if id.is_empty() {
            return Err(ChannelError::InvalidInput(
                "series identifier must not be empty".to_string(),
            ));
        }
        let series = self.manifest.series.get_or_insert_with(BTreeMap::new);
        if series.contains_key(id) {
            return Err(ChannelError::InvalidInput(format!(
                "series \"{}\" already exists",
                id
            )));
        }
        series.insert(
            id.to_string(),
            Series {
                title: title.to_string(),
                logo_path: None,
            },
        );
        self.dirty.mark_manifest();
        Ok(())
    }

    fn series_mut(&mut self, id: &str) -> Result<&mut Series> {
        self.manifest
            .series
            .as_mut()
            .and_then(|series| series.get_mut(id))
            .ok_or_else(|| ChannelError::NoSuchSeries(id.to_string()))
    }

    pub fn set_series_title(&mut self, id: &str, title: &str) -> Result<()> {
        self.series_mut(id)?.title = title.to_string();
        self.dirty.mark_manifest();
        Ok(())
    }

    pub fn set_series_logo(&mut self, id: &str, logo_path: Option<String>) -> Result<()> {
        self.series_mut(id)?.logo_path = logo_path;
        self.dirty.mark_manifest();
        Ok(())
    }

    /// Renames a series and every resource reference to it. Returns the
    /// number of resources rewritten.
    pub fn rename_series(&mut self, old_id: &str, new_id: &str) -> Result<usize> {
        if new_id.is_empty() {
            return Err(ChannelError::InvalidInput(
                "series identifier must not be empty".to_string(),
            ));
        }
        let series = self
            .manifest
            .series
            .as_mut()
            .ok_or_else(|| ChannelError::NoSuchSeries(old_id.to_string()))?;
        if series.contains_key(new_id) {
            return Err(ChannelError::InvalidInput(format!(
                "series \"{}\" already exists",
                new_id
            )));
        }
        let entry = series
            .remove(old_id)
            .ok_or_else(|| ChannelError::NoSuchSeries(old_id.to_string()))?;
        series.insert(new_id.to_string(), entry);
        self.dirty.mark_manifest();

        let mut rewritten = 0;
        for (index, shared) in self.schedules.iter().enumerate() {
            let mut schedule = lock_schedule(shared);
            let mut touched = false;
            for resource in schedule.resources.values_mut() {
                if resource.series_id.as_deref() == Some(old_id) {
                    resource.series_id = Some(new_id.to_string());
                    touched = true;
                    rewritten += 1;
                }
            }
            if touched {
                self.dirty.mark_schedule(index);
            }
        }
        self.resource_db.invalidate();
        Ok(rewritten)
    }

    /// Resources that still name the series keep the dangling id.
    pub fn delete_series(&mut self, id: &str) -> Result<Series> {
        let series = self
            .manifest
            .series
            .as_mut()
            .and_then(|series| series.remove(id))
            .ok_or_else(|| ChannelError::NoSuchSeries(id.to_string()))?;
        if self.manifest.series.as_ref().is_some_and(|s| s.is_empty()) {
            self.manifest.series = None;
        }
        self.dirty.mark_manifest();
        Ok(series)
    }

    // Categories

    pub fn add_category(&mut self, category: Category) -> Result<()> {
        let categories = self.manifest.categories.get_or_insert_with(Vec::new);
        if categories.iter().any(|c| c.id == category.id) {
            return Err(ChannelError::InvalidInput(format!(
                "category \"{}\" already exists",
                category.id
            )));
        }
        categories.push(category);
        self.dirty.mark_manifest();
        Ok(())
    }

    pub fn remove_category(&mut self, id: &str) -> Result<Category> {
        let categories = self
            .manifest
            .categories
            .as_mut()
            .ok_or_else(|| ChannelError::InvalidInput(format!("no category \"{}\"", id)))?;
        let index = categories
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| ChannelError::InvalidInput(format!("no category \"{}\"", id)))?;
        let removed = categories.remove(index);
        self.dirty.mark_manifest();
        Ok(removed)
    }

    // Broadcast day

    /// Accepts `HH:MM` only.
    pub fn set_beginning_of_broadcast_day(&mut self, text: &str) -> Result<NaiveTime> {
        let time = NaiveTime::parse_from_str(text.trim(), "%H:%M").map_err(|_| {
            ChannelError::InvalidInput(format!("\"{}\" is not a HH:MM time", text))
        })?;
        self.manifest.beginning_of_broadcast_day = Some(time);
        self.dirty.mark_manifest();
        Ok(time)
    }

    /// Sets the filler schedule of one weekday, 0 being Sunday.
    pub fn set_dotw_list_schedule(&mut self, weekday: usize, schedule: ListSchedule) -> Result<()> {
        if weekday >= DAYS_PER_WEEK {
            return Err(ChannelError::InvalidInput(format!(
                "weekday {} is not in 0..{}",
                weekday, DAYS_PER_WEEK
            )));
        }
        if let Some(unknown) = schedule
            .schedule
            .iter()
            .flat_map(|entry| entry.list_ids.iter())
            .find(|id| !self.lists.contains_key(id.as_str()))
        {
            return Err(ChannelError::NoSuchList(unknown.clone()));
        }
        let week = self
            .manifest
            .dotw_list_schedule
            .get_or_insert_with(|| vec![ListSchedule::default(); DAYS_PER_WEEK]);
        week[weekday] = schedule;
        self.dirty.mark_manifest();
        Ok(())
    }

    /// Moves every schedule's start date by `days`.
    pub fn offset_schedule(&mut self, days: i64) -> Result<()> {
        let mut shifted = Vec::with_capacity(self.manifest.schedules.len());
        for descriptor in &self.manifest.schedules {
            let date = descriptor
                .start_date
                .checked_add_signed(Duration::days(days))
                .ok_or_else(|| {
                    ChannelError::InvalidInput(format!("cannot move schedules by {} days", days))
                })?;
            shifted.push(date);
        }
        for (descriptor, date) in self.manifest.schedules.iter_mut().zip(shifted) {
            descriptor.start_date = date;
        }
        self.dirty.mark_manifest();
        tracing::info!("Moved all schedules by {} days", days);
        Ok(())
    }
}
