use std::collections::BTreeMap;

/// Which persisted entities changed since their last successful write.
///
/// A flag goes up on any mutation and only comes down after that entity's
/// own write succeeded. Whether the channel as a whole is dirty is computed
/// from the individual flags, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtyTracker {
    manifest: bool,
    schedules: Vec<bool>,
    lists: BTreeMap<String, bool>,
}

impl DirtyTracker {
    /// Everything clean, as after opening a channel.
    pub fn clean<I, S>(schedule_count: usize, list_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            manifest: false,
            schedules: vec![false; schedule_count],
            lists: list_ids.into_iter().map(|id| (id.into(), false)).collect(),
        }
    }

    /// Everything dirty, as after creating a channel that was never written.
    pub fn all_dirty(schedule_count: usize) -> Self {
        Self {
            manifest: true,
            schedules: vec![true; schedule_count],
            lists: BTreeMap::new(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.manifest || self.schedules.iter().any(|d| *d) || self.lists.values().any(|d| *d)
    }

    pub fn is_manifest_dirty(&self) -> bool {
        self.manifest
    }

    pub fn is_schedule_dirty(&self, index: usize) -> bool {
        self.schedules.get(index).copied().unwrap_or(false)
    }

    pub fn is_list_dirty(&self, id: &str) -> bool {
        self.lists.get(id).copied().unwrap_or(false)
    }

    pub fn mark_manifest(&mut self) {
        self.manifest = true;
    }

    pub fn clear_manifest(&mut self) {
        self.manifest = false;
    }

    pub fn mark_schedule(&mut self, index: usize) {
        if index >= self.schedules.len() {
            self.schedules.resize(index + 1, false);
        }
        self.schedules[index] = true;
    }

    pub fn clear_schedule(&mut self, index: usize) {
        if let Some(flag) = self.schedules.get_mut(index) {
            *flag = false;
        }
    }

    pub fn mark_list(&mut self, id: &str) {
        self.lists.insert(id.to_string(), true);
    }

    pub fn clear_list(&mut self, id: &str) {
        if let Some(flag) = self.lists.get_mut(id) {
            *flag = false;
        }
    }

    /// Drops the flag of a list that no longer belongs to the channel.
    pub fn forget_list(&mut self, id: &str) {
        self.lists.remove(id);
    }

    pub fn dirty_schedules(&self) -> Vec<usize> {
        self.schedules
            .iter()
            .enumerate()
            .filter(|(_, dirty)| **dirty)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn dirty_lists(&self) -> Vec<String> {
        self.lists
            .iter()
            .filter(|(_, dirty)| **dirty)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_tracker_is_not_dirty() {
        let tracker = DirtyTracker::clean(3, ["fillers"]);
        assert!(!tracker.is_dirty());
        assert!(tracker.dirty_schedules().is_empty());
        assert!(tracker.dirty_lists().is_empty());
    }

    #[test]
    fn test_channel_dirty_is_computed_from_entities() {
        let mut tracker = DirtyTracker::clean(2, ["fillers"]);
        tracker.mark_schedule(1);
        tracker.mark_list("fillers");
        assert!(tracker.is_dirty());

        tracker.clear_schedule(1);
        assert!(tracker.is_dirty());
        tracker.clear_list("fillers");
        assert!(!tracker.is_dirty());
    }

    #[test]
    fn test_all_dirty() {
        let tracker = DirtyTracker::all_dirty(2);
        assert!(tracker.is_manifest_dirty());
        assert_eq!(tracker.dirty_schedules(), vec![0, 1]);
    }

    #[test]
    fn test_forget_list() {
        let mut tracker = DirtyTracker::clean(0, Vec::<String>::new());
        tracker.mark_list("gone");
        tracker.forget_list("gone");
        assert!(!tracker.is_dirty());
        assert!(!tracker.is_list_dirty("gone"));
    }

    #[test]
    fn test_out_of_range_schedule_queries() {
        let mut tracker = DirtyTracker::clean(1, Vec::<String>::new());
        assert!(!tracker.is_schedule_dirty(5));
        tracker.clear_schedule(5);
        tracker.mark_schedule(2);
        assert_eq!(tracker.dirty_schedules(), vec![2]);
    }
}
