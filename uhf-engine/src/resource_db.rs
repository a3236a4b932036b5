use std::collections::BTreeMap;

use crate::models::{Resource, Schedule};

/// Picks the resource with richer metadata: a non-empty description wins,
/// then a release year, then an explicit series order. If none of those
/// distinguish the two, `a` is kept.
///
/// This is a ranking heuristic, not a correctness rule.
pub fn preferred<'a>(a: &'a Resource, b: &'a Resource) -> &'a Resource {
    match (a.has_description(), b.has_description()) {
        (true, false) => return a,
        (false, true) => return b,
        _ => {}
    }
    match (a.year.is_some(), b.year.is_some()) {
        (true, false) => return a,
        (false, true) => return b,
        _ => {}
    }
    match (a.order.is_some(), b.order.is_some()) {
        (true, false) => return a,
        (false, true) => return b,
        _ => {}
    }
    a
}

/// Result of looking up a resource by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    pub resource: Resource,
    pub identifier: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResourceDatabase {
    entries: BTreeMap<String, Resource>,
    stale: bool,
    dirty: bool,
}

impl Default for ResourceDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceDatabase {
    /// Starts stale: nothing has been folded in yet.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            stale: true,
            dirty: false,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// True when an edit was merged since the last export.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, identifier: &str) -> Option<&Resource> {
        self.entries.get(identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Resource)> {
        self.entries.iter()
    }

    /// Discards everything and folds in every schedule again.
    pub fn rebuild<'a, I>(&mut self, schedules: I)
    where
        I: IntoIterator<Item = &'a Schedule>,
    {
        self.entries.clear();
        for schedule in schedules {
            self.fold_schedule(schedule);
        }
        self.stale = false;
        tracing::debug!("Resource database rebuilt with {} entries", self.entries.len());
    }

    /// Folds the resources referenced by the programs of one schedule.
    /// Unreferenced table entries are not considered.
    pub fn fold_schedule(&mut self, schedule: &Schedule) {
        for program in schedule.days.iter().flatten() {
            if let Some(candidate) = schedule.resources.get(&program.resource_id) {
                self.merge_candidate(&program.resource_id, candidate);
            }
        }
    }

    pub fn merge_candidate(&mut self, identifier: &str, candidate: &Resource) {
        match self.entries.get(identifier) {
            Some(existing) => {
                let best = preferred(existing, candidate).clone();
                self.entries.insert(identifier.to_string(), best);
            }
            None => {
                self.entries
                    .insert(identifier.to_string(), candidate.clone());
            }
        }
    }

    /// Linear scan for an entry with the same path. Without a match the
    /// given resource comes back untouched and without an identifier.
    pub fn match_by_path(&self, resource: &Resource) -> PathMatch {
        self.entries
            .iter()
            .find(|(_, known)| known.path == resource.path)
            .map(|(identifier, known)| PathMatch {
                resource: known.clone(),
                identifier: Some(identifier.clone()),
            })
            .unwrap_or_else(|| PathMatch {
                resource: resource.clone(),
                identifier: None,
            })
    }

    /// Copies the user-editable fields of `resource` into the entry for
    /// `identifier`. Other schedules that use the same path under another
    /// identifier are left alone. Returns false when the identifier is not
    /// in the database.
    pub fn merge_edit(&mut self, resource: &Resource, identifier: &str) -> bool {
        let Some(entry) = self.entries.get_mut(identifier) else {
            return false;
        };
        entry.order = resource.order;
        entry.title = resource.title.clone();
        entry.description = resource.description.clone();
        entry.year = resource.year;
        entry.series_id = resource.series_id.clone();
        entry.start_offset = resource.start_offset;
        self.dirty = true;
        true
    }

    /// Identifiers are dropped, values are ordered by path.
    pub fn export_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut values: Vec<&Resource> = self.entries.values().collect();
        values.sort_by(|a, b| a.path.cmp(&b.path));
        serde_json::to_vec_pretty(&values)
    }

    pub fn mark_exported(&mut self) {
        self.dirty = false;
    }
}
