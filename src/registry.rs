//! Ordered collection of entries: the taskbar display order plus lookup
//! indexes. Owns every [`Entry`]; removal destroys the entry after its
//! external publication is withdrawn.

use tracing::debug;

use crate::entry::Entry;
use crate::events::{DockEvent, EventHub};
use crate::identify::RunningApps;
use crate::window::WindowId;

pub struct EntryRegistry {
    entries: Vec<Entry>,
    hub: EventHub,
}

/// Externally visible path of one entry, stable for its lifetime.
pub fn entry_path(entry_id: u32) -> String {
    format!("/entries/e{entry_id}")
}

impl EntryRegistry {
    pub fn new(hub: EventHub) -> Self {
        Self {
            entries: Vec::new(),
            hub,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.entries.iter_mut()
    }

    /// Append at the end of the display order.
    pub fn append(&mut self, entry: Entry) -> u32 {
        let index = self.entries.len() as isize;
        self.insert(entry, index)
    }

    /// Insert at `index`; anything out of range appends.
    pub fn insert(&mut self, entry: Entry, index: isize) -> u32 {
        let id = entry.id;
        let index = if index < 0 || index as usize >= self.entries.len() {
            self.entries.len()
        } else {
            index as usize
        };
        self.entries.insert(index, entry);
        debug!(entry = id, index, "entry inserted");
        self.hub.publish(DockEvent::EntryAdded {
            path: entry_path(id),
            index,
        });
        id
    }

    /// Remove and destroy an entry. Publication stops before the in-memory
    /// object goes away.
    pub fn remove(&mut self, entry_id: u32) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.id == entry_id) else {
            return false;
        };
        self.hub.publish(DockEvent::EntryRemoved { id: entry_id });
        let entry = self.entries.remove(pos);
        debug!(entry = entry.id, "entry removed");
        drop(entry);
        true
    }

    /// Reorder the display list. Out-of-range indexes are ignored.
    pub fn move_entry(&mut self, old_index: usize, new_index: usize) -> bool {
        if old_index >= self.entries.len() || new_index >= self.entries.len() {
            return false;
        }
        if old_index == new_index {
            return true;
        }
        let entry = self.entries.remove(old_index);
        let id = entry.id;
        self.entries.insert(new_index, entry);
        self.hub.publish(DockEvent::EntryAdded {
            path: entry_path(id),
            index: new_index,
        });
        true
    }

    pub fn by_id(&self, entry_id: u32) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == entry_id)
    }

    pub fn by_id_mut(&mut self, entry_id: u32) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == entry_id)
    }

    pub fn by_inner_id(&self, inner_id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.inner_id == inner_id)
    }

    pub fn by_inner_id_mut(&mut self, inner_id: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.inner_id == inner_id)
    }

    pub fn by_window(&self, window_id: WindowId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.window(window_id).is_some())
    }

    pub fn by_window_mut(&mut self, window_id: WindowId) -> Option<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|e| e.window(window_id).is_some())
    }

    pub fn by_desktop_path(&self, path: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.desktop_path() == Some(path))
    }

    pub fn by_desktop_path_mut(&mut self, path: &str) -> Option<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|e| e.desktop_path() == Some(path))
    }

    pub fn index_of(&self, entry_id: u32) -> Option<usize> {
        self.entries.iter().position(|e| e.id == entry_id)
    }

    /// Externally visible paths in display order.
    pub fn entry_paths(&self) -> Vec<String> {
        self.entries.iter().map(|e| entry_path(e.id)).collect()
    }

    /// Desktop paths of docked entries, in display order.
    pub fn docked_paths(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.is_docked())
            .filter_map(|e| e.desktop_path().map(str::to_string))
            .collect()
    }
}

impl RunningApps for EntryRegistry {
    fn app_for_pid(&self, pid: u32) -> Option<crate::app::AppRecord> {
        self.entries
            .iter()
            .filter(|e| !e.inner_id.is_empty())
            .find(|e| e.windows().any(|w| w.pid == pid))
            .and_then(|e| e.app.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppRecord;
    use crate::window::{WindowRecord, X11WindowData};

    fn registry() -> (EntryRegistry, EventHub) {
        let hub = EventHub::new();
        (EntryRegistry::new(hub.clone()), hub)
    }

    fn entry(hub: &EventHub, inner_id: &str, path: Option<&str>) -> Entry {
        let app = path.map(|p| AppRecord::new(p, "App"));
        Entry::new(hub.clone(), inner_id, app)
    }

    #[test]
    fn out_of_range_insert_appends() {
        let (mut reg, hub) = registry();
        let a = reg.insert(entry(&hub, "a", None), -1);
        let b = reg.insert(entry(&hub, "b", None), 99);
        let c = reg.insert(entry(&hub, "c", None), 1);

        assert_eq!(reg.index_of(a), Some(0));
        assert_eq!(reg.index_of(c), Some(1));
        assert_eq!(reg.index_of(b), Some(2));
    }

    #[test]
    fn remove_publishes_before_destruction() {
        let (mut reg, hub) = registry();
        let id = reg.append(entry(&hub, "a", None));
        let rx = hub.subscribe();

        assert!(reg.remove(id));
        assert!(!reg.remove(id));
        assert_eq!(rx.try_recv().unwrap(), DockEvent::EntryRemoved { id });
        assert!(reg.by_id(id).is_none());
    }

    #[test]
    fn lookups_by_inner_id_window_and_path() {
        let (mut reg, hub) = registry();
        let mut e = entry(&hub, "inner-x", Some("/apps/x.desktop"));
        e.attach_window(WindowRecord::new_x11(42, X11WindowData::default()));
        let id = reg.append(e);
        reg.append(entry(&hub, "inner-y", None));

        assert_eq!(reg.by_inner_id("inner-x").unwrap().id, id);
        assert_eq!(reg.by_window(42).unwrap().id, id);
        assert_eq!(reg.by_desktop_path("/apps/x.desktop").unwrap().id, id);
        assert!(reg.by_window(7).is_none());
        assert!(reg.by_desktop_path("/apps/z.desktop").is_none());
    }

    #[test]
    fn move_entry_reorders() {
        let (mut reg, hub) = registry();
        let a = reg.append(entry(&hub, "a", None));
        let b = reg.append(entry(&hub, "b", None));
        let c = reg.append(entry(&hub, "c", None));

        assert!(reg.move_entry(0, 2));
        assert_eq!(reg.index_of(b), Some(0));
        assert_eq!(reg.index_of(c), Some(1));
        assert_eq!(reg.index_of(a), Some(2));
        assert!(!reg.move_entry(0, 5));
    }

    #[test]
    fn app_for_pid_only_considers_identified_entries() {
        let (mut reg, hub) = registry();
        let mut e = entry(&hub, "inner-x", Some("/apps/x.desktop"));
        let mut w = WindowRecord::new_x11(1, X11WindowData::default());
        w.pid = 1234;
        e.attach_window(w);
        reg.append(e);

        assert_eq!(
            reg.app_for_pid(1234).unwrap().desktop_path,
            "/apps/x.desktop"
        );
        assert!(reg.app_for_pid(999).is_none());
    }
}
