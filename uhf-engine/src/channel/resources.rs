use chrono::NaiveTime;

use super::Channel;
use crate::error::{ChannelError, Result};
use crate::models::{lock_schedule, Resource};
use crate::resolver::{whole_seconds, DurationProbe};
use crate::timefmt::parse_offset;

/// A user-editable resource field with its new value. `None` clears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceField {
    Title(Option<String>),
    Year(Option<i32>),
    SeriesId(Option<String>),
    Order(Option<i32>),
    Description(Option<String>),
    StartOffset(Option<u32>),
}

impl ResourceField {
    fn apply(self, resource: &mut Resource) {
        match self {
            ResourceField::Title(v) => resource.title = v,
            ResourceField::Year(v) => resource.year = v,
            ResourceField::SeriesId(v) => resource.series_id = v,
            ResourceField::Order(v) => resource.order = v,
            ResourceField::Description(v) => resource.description = v,
            ResourceField::StartOffset(v) => resource.start_offset = v,
        }
    }
}

impl Channel {
    /// Runs `edit` on the resource of the program at `start_time`, marks the
    /// schedule dirty and returns the program's identifier with the edited
    /// resource.
    fn edit_program_resource<F>(
        &mut self,
        ordinal: i64,
        start_time: NaiveTime,
        edit: F,
    ) -> Result<(String, Resource)>
    where
        F: FnOnce(&mut Resource),
    {
        let loc = self.require_location(ordinal)?;
        let shared = self.shared_schedule(loc.schedule)?;
        let edited = {
            let mut schedule = lock_schedule(&shared);
            let index = schedule
                .program_index(loc.day, start_time)
                .ok_or(ChannelError::NoSuchProgram {
                    ordinal,
                    start_time,
                })?;
            let id = schedule.days[loc.day][index].resource_id.clone();
            let resource = schedule
                .resources
                .get_mut(&id)
                .ok_or_else(|| ChannelError::UnknownResource(id.clone()))?;
            edit(resource);
            (id, resource.clone())
        };
        self.dirty.mark_schedule(loc.schedule);
        Ok(edited)
    }

    pub fn set_resource_field(
        &mut self,
        ordinal: i64,
        start_time: NaiveTime,
        field: ResourceField,
    ) -> Result<()> {
        self.refresh_resource_db();
        let (id, resource) =
            self.edit_program_resource(ordinal, start_time, |resource| field.apply(resource))?;
        if !self.resource_db.merge_edit(&resource, &id) {
            self.resource_db.invalidate();
        }
        Ok(())
    }

    /// Start offset from `HH:MM:SS` text. Text that does not parse clears
    /// the offset. Returns the stored value.
    pub fn set_start_offset_text(
        &mut self,
        ordinal: i64,
        start_time: NaiveTime,
        text: &str,
    ) -> Result<Option<u32>> {
        let seconds = parse_offset(text);
        self.set_resource_field(ordinal, start_time, ResourceField::StartOffset(seconds))?;
        Ok(seconds)
    }

    /// Points the resource at another file. The duration is re-probed and
    /// kept when the probe finds nothing. Returns the stored duration.
    pub fn set_resource_path(
        &mut self,
        ordinal: i64,
        start_time: NaiveTime,
        path: &str,
        probe: &dyn DurationProbe,
    ) -> Result<u32> {
        if path.is_empty() {
            return Err(ChannelError::InvalidInput("path must not be empty".to_string()));
        }
        let seconds = whole_seconds(probe.probe_duration(&self.root().join(path)));
        let (_, resource) = self.edit_program_resource(ordinal, start_time, |resource| {
            resource.path = path.to_string();
            if seconds > 0 {
                resource.duration = seconds;
            }
        })?;
        self.resource_db.invalidate();
        Ok(resource.duration)
    }

    /// Renames the identifier of the program's resource inside its schedule.
    /// Nothing changes when `new_id` is already taken there.
    pub fn rekey_resource(
        &mut self,
        ordinal: i64,
        start_time: NaiveTime,
        new_id: &str,
    ) -> Result<usize> {
        let loc = self.require_location(ordinal)?;
        let shared = self.shared_schedule(loc.schedule)?;
        let rewritten = {
            let mut schedule = lock_schedule(&shared);
            let index = schedule
                .program_index(loc.day, start_time)
                .ok_or(ChannelError::NoSuchProgram {
                    ordinal,
                    start_time,
                })?;
            let old_id = schedule.days[loc.day][index].resource_id.clone();
            schedule.rekey(&old_id, new_id)?
        };
        self.dirty.mark_schedule(loc.schedule);
        self.resource_db.invalidate();
        tracing::info!(
            "Re-keyed resource to {} ({} programs rewritten)",
            new_id,
            rewritten
        );
        Ok(rewritten)
    }
}
