use super::Channel;
use crate::error::{ChannelError, Result};
use crate::models::{List, ListDescriptor, ListInfo, Resource};

impl Channel {
    pub fn create_list(&mut self, id: &str, title: Option<String>, list_path: &str) -> Result<()> {
        if id.is_empty() {
            return Err(ChannelError::InvalidInput(
                "list identifier must not be empty".to_string(),
            ));
        }
        if list_path.is_empty() {
            return Err(ChannelError::InvalidInput(
                "list path must not be empty".to_string(),
            ));
        }
        if self.lists.contains_key(id) || self.manifest.list_descriptor(id).is_some() {
            return Err(ChannelError::DuplicateList(id.to_string()));
        }

        self.list_descriptors_mut().insert(
            id.to_string(),
            ListDescriptor {
                list_path: list_path.to_string(),
            },
        );
        self.lists.insert(id.to_string(), List::new(title));
        self.dirty.mark_manifest();
        self.dirty.mark_list(id);
        tracing::info!("Created list {} at {}", id, list_path);
        Ok(())
    }

    /// Drops the list from the channel. Its file is left on disk.
    pub fn remove_list(&mut self, id: &str) -> Result<List> {
        let list = self
            .lists
            .remove(id)
            .ok_or_else(|| ChannelError::NoSuchList(id.to_string()))?;
        if let Some(descriptors) = self.manifest.lists.as_mut() {
            descriptors.remove(id);
            if descriptors.is_empty() {
                self.manifest.lists = None;
            }
        }
        self.dirty.forget_list(id);
        self.dirty.mark_manifest();
        Ok(list)
    }

    /// Adds a resource under a fresh `<id><NNNN>` key. Returns `None` when
    /// the list already holds a resource with the same path.
    pub fn add_resource_to_list(&mut self, id: &str, resource: Resource) -> Result<Option<String>> {
        let list = self.list_mut(id)?;
        if list.contains_path(&resource.path) {
            tracing::debug!("{} is already in list {}", resource.path, id);
            return Ok(None);
        }
        let key = list.next_key(id);
        list.resources.insert(key.clone(), resource);
        self.dirty.mark_list(id);
        Ok(Some(key))
    }

    /// Returns how many of `keys` were present.
    pub fn remove_list_resources(&mut self, id: &str, keys: &[String]) -> Result<usize> {
        let list = self.list_mut(id)?;
        let removed = keys
            .iter()
            .filter(|key| list.resources.remove(key.as_str()).is_some())
            .count();
        if removed > 0 {
            self.dirty.mark_list(id);
        }
        Ok(removed)
    }

    pub fn set_list_title(&mut self, id: &str, title: Option<String>) -> Result<()> {
        let list = self.list_mut(id)?;
        list.info.get_or_insert_with(ListInfo::default).title = title;
        self.dirty.mark_list(id);
        Ok(())
    }

    pub fn set_list_description(&mut self, id: &str, description: Option<String>) -> Result<()> {
        let list = self.list_mut(id)?;
        list.info.get_or_insert_with(ListInfo::default).description = description;
        self.dirty.mark_list(id);
        Ok(())
    }
}
