//! The item tree of an archive and the edits made to it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, HeaderSection, Result};
use crate::item::{Item, ItemFlags, ItemId, ItemState};
use crate::source::DataSource;

/// The items of an archive keyed by id.
///
/// Archive data sources of the items are read from [`ItemList::data_file_path`]. While a
/// [`SaveGuard`] obtained from [`ItemList::lock_for_save`] is alive every mutation fails with
/// [`Error::ArchiveBusy`].
pub struct ItemList {
    items: BTreeMap<ItemId, Item>,
    data_file_path: PathBuf,
    next_id: u32,
    busy: Arc<AtomicBool>,
}

impl fmt::Debug for ItemList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemList")
            .field("data_file_path", &self.data_file_path)
            .field("items", &self.items.len())
            .field("busy", &self.busy.load(Ordering::SeqCst))
            .finish()
    }
}

impl Clone for ItemList {
    /// Clones the items; the clone is never locked
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            data_file_path: self.data_file_path.clone(),
            next_id: self.next_id,
            busy: Arc::default(),
        }
    }
}

/// Marks an [`ItemList`] as being saved. Dropping the guard unlocks the list.
#[derive(Debug)]
pub struct SaveGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for SaveGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

impl ItemList {
    /// Create an empty list whose archive sources read from `data_file_path`
    pub fn new(data_file_path: impl Into<PathBuf>) -> Self {
        Self {
            items: BTreeMap::new(),
            data_file_path: data_file_path.into(),
            next_id: 0,
            busy: Arc::default(),
        }
    }

    /// Path of the file that archive data sources are read from
    pub fn data_file_path(&self) -> &Path {
        &self.data_file_path
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether a save currently holds the list
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.is_busy() {
            return Err(Error::ArchiveBusy);
        }
        Ok(())
    }

    /// Lock the list for a save
    pub fn lock_for_save(&self) -> Result<SaveGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| Error::ArchiveBusy)?;

        Ok(SaveGuard {
            busy: self.busy.clone(),
        })
    }

    /// Insert an item as is.
    ///
    /// The parent is not checked so items can be loaded in any order; use
    /// [`ItemList::validate_tree`] once all of them are present.
    pub fn add(&mut self, item: Item) -> Result<()> {
        self.ensure_idle()?;

        let id = item.id();
        if self.items.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }

        self.next_id = self.next_id.max(id.value().saturating_add(1));
        self.items.insert(id, item);
        Ok(())
    }

    fn allocate(&mut self, parent: Option<ItemId>, name: &str) -> Result<(ItemId, ItemId)> {
        self.ensure_idle()?;

        if name.is_empty() || name.contains('/') {
            return Err(Error::InvalidOperation(format!(
                "invalid item name {name:?}"
            )));
        }

        if let Some(parent) = parent {
            let dir = self.items.get(&parent).ok_or(Error::ItemNotFound(parent))?;
            if !dir.is_directory() {
                return Err(Error::InvalidOperation(format!(
                    "item {parent} is not a directory"
                )));
            }
        }

        if self.children(parent).iter().any(|c| c.file_name() == name) {
            return Err(Error::InvalidOperation(format!(
                "an item named {name:?} already exists there"
            )));
        }

        if self.next_id == u32::MAX {
            return Err(Error::InvalidOperation("no item ids left".into()));
        }

        let id = ItemId(self.next_id);
        self.next_id += 1;
        Ok((id, parent.unwrap_or(id)))
    }

    /// Add a new file under `parent`, or at the root when `parent` is `None`
    pub fn add_file(
        &mut self,
        parent: Option<ItemId>,
        name: impl Into<String>,
        source: DataSource,
        flags: ItemFlags,
    ) -> Result<ItemId> {
        let name = name.into();
        if flags.is_directory() {
            return Err(Error::InvalidOperation(format!(
                "file {name:?} cannot carry the directory flag"
            )));
        }

        let (id, directory_id) = self.allocate(parent, &name)?;
        let item = Item::new(id, name, directory_id, source, flags, ItemState::Added)?;
        debug!(%id, name = item.file_name(), "adding file");
        self.items.insert(id, item);
        Ok(id)
    }

    /// Add a new empty directory under `parent`, or at the root when `parent` is `None`
    pub fn add_directory(
        &mut self,
        parent: Option<ItemId>,
        name: impl Into<String>,
    ) -> Result<ItemId> {
        let name = name.into();
        let (id, directory_id) = self.allocate(parent, &name)?;
        debug!(%id, name, "adding directory");
        self.items.insert(
            id,
            Item::directory(id, name, directory_id, ItemState::DirectoryAdded),
        );
        Ok(id)
    }

    /// Give a file new data
    pub fn replace(&mut self, id: ItemId, source: DataSource) -> Result<()> {
        self.ensure_idle()?;
        let item = self.items.get_mut(&id).ok_or(Error::ItemNotFound(id))?;
        let state = match item.state() {
            ItemState::Added => ItemState::Added,
            _ => ItemState::Replaced,
        };
        item.update_source(source, state)
    }

    pub fn rename(&mut self, id: ItemId, name: impl Into<String>) -> Result<()> {
        self.ensure_idle()?;
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            return Err(Error::InvalidOperation(format!(
                "invalid item name {name:?}"
            )));
        }

        let parent = self.directory_id_of(id)?;
        let parent = (parent != id).then_some(parent);
        if self
            .children(parent)
            .iter()
            .any(|c| c.id() != id && c.file_name() == name)
        {
            return Err(Error::InvalidOperation(format!(
                "an item named {name:?} already exists there"
            )));
        }

        let item = self.items.get_mut(&id).ok_or(Error::ItemNotFound(id))?;
        item.rename(name);
        Ok(())
    }

    /// Remove an item along with everything below it, returning the removed items
    pub fn remove(&mut self, id: ItemId) -> Result<Vec<Item>> {
        self.ensure_idle()?;
        if !self.items.contains_key(&id) {
            return Err(Error::ItemNotFound(id));
        }

        let mut doomed = vec![id];
        let mut seen = HashSet::from([id]);
        let mut i = 0;
        while i < doomed.len() {
            let parent = doomed[i];
            for item in self.items.values() {
                if !item.is_root() && item.directory_id() == parent && seen.insert(item.id()) {
                    doomed.push(item.id());
                }
            }
            i += 1;
        }

        debug!(%id, count = doomed.len(), "removing items");
        Ok(doomed
            .into_iter()
            .filter_map(|id| self.items.remove(&id))
            .collect())
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.get_mut(&id)
    }

    /// Items in ascending id order
    pub fn enumerate_by_id(&self) -> impl Iterator<Item = &Item> + '_ {
        self.items.values()
    }

    /// Ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items.keys().copied()
    }

    /// Items directly inside `parent` (or the root when `None`), ordered by name then id
    pub fn children(&self, parent: Option<ItemId>) -> Vec<&Item> {
        let mut children: Vec<&Item> = self
            .items
            .values()
            .filter(|item| match parent {
                None => item.is_root(),
                Some(parent) => !item.is_root() && item.directory_id() == parent,
            })
            .collect();
        children.sort_by(|a, b| {
            a.file_name()
                .cmp(b.file_name())
                .then_with(|| a.id().cmp(&b.id()))
        });
        children
    }

    fn child_index(&self) -> HashMap<Option<ItemId>, Vec<&Item>> {
        let mut index: HashMap<Option<ItemId>, Vec<&Item>> = HashMap::new();
        for item in self.items.values() {
            let parent = (!item.is_root()).then_some(item.directory_id());
            index.entry(parent).or_default().push(item);
        }
        for children in index.values_mut() {
            children.sort_by(|a, b| {
                a.file_name()
                    .cmp(b.file_name())
                    .then_with(|| a.id().cmp(&b.id()))
            });
        }
        index
    }

    /// Items in the order parts 2, 6 and 7 of the header store them.
    ///
    /// Starting at the root, the contents of each directory are visited by name (ties broken by
    /// id), descending into a subdirectory before moving on to its next sibling. Items that cannot
    /// be reached from the root are skipped.
    pub fn enumerate_depth_first_by_name(&self) -> DepthFirst<'_> {
        let mut children = self.child_index();
        let root = children.remove(&None).unwrap_or_default();
        DepthFirst {
            children,
            stack: vec![root.into_iter()],
        }
    }

    /// Maps every item to the next item in its directory by id, or to itself for the last one.
    ///
    /// Part 7 stores the links in depth first order by name, but the chain within a directory
    /// follows ascending ids.
    pub fn sibling_ids(&self) -> HashMap<ItemId, ItemId> {
        let mut levels: HashMap<Option<ItemId>, Vec<ItemId>> = HashMap::new();
        for item in self.items.values() {
            let parent = (!item.is_root()).then_some(item.directory_id());
            levels.entry(parent).or_default().push(item.id());
        }

        let mut siblings = HashMap::with_capacity(self.items.len());
        for ids in levels.values() {
            for pair in ids.windows(2) {
                siblings.insert(pair[0], pair[1]);
            }
            if let Some(&last) = ids.last() {
                siblings.insert(last, last);
            }
        }
        siblings
    }

    /// Id of the directory containing `id`; the id itself for root items
    pub fn directory_id_of(&self, id: ItemId) -> Result<ItemId> {
        self.items
            .get(&id)
            .map(Item::directory_id)
            .ok_or(Error::ItemNotFound(id))
    }

    /// Path of an item from the root, with `/` between names
    pub fn path_of(&self, id: ItemId) -> Result<String> {
        let mut names = Vec::new();
        let mut current = self.items.get(&id).ok_or(Error::ItemNotFound(id))?;
        loop {
            names.push(current.file_name());
            if current.is_root() {
                break;
            }
            if names.len() > self.items.len() {
                return Err(Error::corrupt(
                    HeaderSection::Tree,
                    format!("item {id} is part of a directory cycle"),
                ));
            }

            let parent = current.directory_id();
            current = self.items.get(&parent).ok_or_else(|| {
                Error::corrupt(
                    HeaderSection::Tree,
                    format!("parent {parent} of item {} is missing", current.id()),
                )
            })?;
        }

        names.reverse();
        Ok(names.join("/"))
    }

    /// Look up an item by its `/` separated path from the root
    pub fn find_path(&self, path: &str) -> Option<ItemId> {
        let mut found = None;
        for name in path.split('/').filter(|name| !name.is_empty()) {
            let item = self
                .children(found)
                .into_iter()
                .find(|child| child.file_name() == name)?;
            found = Some(item.id());
        }
        found
    }

    /// Copy of the list with ids reassigned to `0..len` in ascending order of the current ids
    pub fn renumbered(&self) -> Result<ItemList> {
        let mapping: HashMap<ItemId, ItemId> = self
            .items
            .keys()
            .enumerate()
            .map(|(i, &old)| {
                u32::try_from(i)
                    .map(|new| (old, ItemId(new)))
                    .map_err(|_| Error::InvalidOperation("too many items".into()))
            })
            .collect::<Result<_>>()?;

        let mut list = ItemList::new(self.data_file_path.clone());
        for item in self.items.values() {
            let id = mapping[&item.id()];
            let directory_id = *mapping.get(&item.directory_id()).ok_or_else(|| {
                Error::corrupt(
                    HeaderSection::Tree,
                    format!(
                        "parent {} of item {} is missing",
                        item.directory_id(),
                        item.id()
                    ),
                )
            })?;

            let mut item = item.clone();
            item.reassign(id, directory_id);
            list.items.insert(id, item);
        }
        list.next_id = list.items.len() as u32;

        Ok(list)
    }

    /// Check that every item hangs off the root through existing directories
    pub fn validate_tree(&self) -> Result<()> {
        for item in self.items.values() {
            if item.is_root() {
                continue;
            }

            match self.items.get(&item.directory_id()) {
                None => {
                    return Err(Error::corrupt(
                        HeaderSection::Tree,
                        format!(
                            "parent {} of item {} is missing",
                            item.directory_id(),
                            item.id()
                        ),
                    ))
                }
                Some(parent) if !parent.is_directory() => {
                    return Err(Error::corrupt(
                        HeaderSection::Tree,
                        format!(
                            "parent {} of item {} is not a directory",
                            parent.id(),
                            item.id()
                        ),
                    ))
                }
                Some(_) => {}
            }
        }

        let reachable = self.enumerate_depth_first_by_name().count();
        if reachable != self.items.len() {
            return Err(Error::corrupt(
                HeaderSection::Tree,
                format!(
                    "{} items are not reachable from the root",
                    self.items.len() - reachable
                ),
            ));
        }

        Ok(())
    }
}

/// Iterator returned by [`ItemList::enumerate_depth_first_by_name`]
pub struct DepthFirst<'a> {
    children: HashMap<Option<ItemId>, Vec<&'a Item>>,
    stack: Vec<std::vec::IntoIter<&'a Item>>,
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = &'a Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let level = self.stack.last_mut()?;
            match level.next() {
                Some(item) => {
                    if let Some(children) = self.children.remove(&Some(item.id())) {
                        self.stack.push(children.into_iter());
                    }
                    return Some(item);
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::ItemList;
    use crate::error::{Error, Result};
    use crate::item::{Item, ItemFlags, ItemId, ItemState};
    use crate::source::{DataSource, MemorySource};

    fn memory(data: &[u8]) -> DataSource {
        DataSource::Memory(MemorySource::new(data.to_vec()))
    }

    fn sample() -> Result<(ItemList, ItemId, ItemId, ItemId, ItemId)> {
        let mut list = ItemList::new("sample.nefs");
        let b = list.add_file(None, "b.txt", memory(b"b"), ItemFlags::empty())?;
        let dir = list.add_directory(None, "a")?;
        let inner = list.add_file(Some(dir), "z.txt", memory(b"z"), ItemFlags::empty())?;
        let sub = list.add_directory(Some(dir), "sub")?;
        Ok((list, b, dir, inner, sub))
    }

    #[test]
    fn depth_first_visits_by_name() -> Result<()> {
        let (list, b, dir, inner, sub) = sample()?;

        let order: Vec<ItemId> = list.enumerate_depth_first_by_name().map(Item::id).collect();
        assert_eq!(order, vec![dir, sub, inner, b]);

        let again: Vec<ItemId> = list.enumerate_depth_first_by_name().map(Item::id).collect();
        assert_eq!(order, again);

        Ok(())
    }

    #[test]
    fn siblings_chain_by_id() -> Result<()> {
        let (list, b, dir, inner, sub) = sample()?;
        let siblings = list.sibling_ids();

        assert_eq!(siblings[&b], dir);
        assert_eq!(siblings[&dir], dir);
        assert_eq!(siblings[&inner], sub);
        assert_eq!(siblings[&sub], sub);

        Ok(())
    }

    #[test]
    fn paths_and_directories() -> Result<()> {
        let (list, b, dir, inner, _) = sample()?;

        assert_eq!(list.path_of(inner)?, "a/z.txt");
        assert_eq!(list.path_of(b)?, "b.txt");
        assert_eq!(list.find_path("a/z.txt"), Some(inner));
        assert_eq!(list.find_path("/a"), Some(dir));
        assert_eq!(list.find_path("a/missing"), None);
        assert_eq!(list.directory_id_of(b)?, b);
        assert_eq!(list.directory_id_of(inner)?, dir);
        assert!(matches!(
            list.directory_id_of(ItemId(99)),
            Err(Error::ItemNotFound(ItemId(99)))
        ));

        Ok(())
    }

    #[test]
    fn add_rejects_duplicate_ids() -> Result<()> {
        let mut list = ItemList::new("x.nefs");
        list.add(Item::directory(ItemId(3), "a", ItemId(3), ItemState::Unchanged))?;
        let result = list.add(Item::directory(ItemId(3), "b", ItemId(3), ItemState::Unchanged));
        assert!(matches!(result, Err(Error::DuplicateId(ItemId(3)))));

        let next = list.add_directory(None, "c")?;
        assert_eq!(next, ItemId(4));

        Ok(())
    }

    #[test]
    fn add_under_file_fails() -> Result<()> {
        let (mut list, b, ..) = sample()?;
        let result = list.add_file(Some(b), "x", memory(b"x"), ItemFlags::empty());
        assert!(matches!(result, Err(Error::InvalidOperation(_))));

        let result = list.add_directory(None, "b.txt");
        assert!(matches!(result, Err(Error::InvalidOperation(_))));

        Ok(())
    }

    #[test]
    fn remove_takes_subtree() -> Result<()> {
        let (mut list, b, dir, inner, sub) = sample()?;

        let mut removed: Vec<ItemId> = list.remove(dir)?.iter().map(Item::id).collect();
        removed.sort();
        assert_eq!(removed, vec![dir, inner, sub]);
        assert_eq!(list.ids().collect::<Vec<_>>(), vec![b]);

        let next = list.add_directory(None, "later")?;
        assert!(next > sub);

        Ok(())
    }

    #[test]
    fn renumbered_is_contiguous() -> Result<()> {
        let (mut list, b, dir, _, _) = sample()?;
        list.remove(b)?;

        let renumbered = list.renumbered()?;
        assert_eq!(
            renumbered.ids().collect::<Vec<_>>(),
            vec![ItemId(0), ItemId(1), ItemId(2)]
        );
        assert_eq!(renumbered.path_of(ItemId(1))?, "a/z.txt");
        assert_eq!(renumbered.directory_id_of(ItemId(1))?, ItemId(0));
        assert!(list.get(dir).is_some());

        Ok(())
    }

    #[test]
    fn validate_finds_orphans() -> Result<()> {
        let mut list = ItemList::new("x.nefs");
        list.add(Item::directory(ItemId(0), "a", ItemId(0), ItemState::Unchanged))?;
        list.validate_tree()?;

        list.add(Item::directory(ItemId(1), "b", ItemId(7), ItemState::Unchanged))?;
        assert!(matches!(
            list.validate_tree(),
            Err(Error::CorruptHeader { .. })
        ));

        Ok(())
    }

    #[test]
    fn validate_finds_cycles() -> Result<()> {
        let mut list = ItemList::new("x.nefs");
        list.add(Item::directory(ItemId(0), "a", ItemId(1), ItemState::Unchanged))?;
        list.add(Item::directory(ItemId(1), "b", ItemId(0), ItemState::Unchanged))?;
        assert!(matches!(
            list.validate_tree(),
            Err(Error::CorruptHeader { .. })
        ));
        assert!(list.path_of(ItemId(0)).is_err());

        Ok(())
    }

    #[test]
    fn mutations_fail_while_saving() -> Result<()> {
        let (mut list, b, ..) = sample()?;

        let guard = list.lock_for_save()?;
        assert!(matches!(list.lock_for_save(), Err(Error::ArchiveBusy)));
        assert!(matches!(list.rename(b, "c.txt"), Err(Error::ArchiveBusy)));
        assert!(matches!(list.remove(b), Err(Error::ArchiveBusy)));
        assert!(matches!(
            list.add_directory(None, "d"),
            Err(Error::ArchiveBusy)
        ));
        drop(guard);

        list.rename(b, "c.txt")?;
        assert_eq!(list.get(b).map(Item::file_name), Some("c.txt"));

        Ok(())
    }

    #[test]
    fn replace_keeps_added_state() -> Result<()> {
        let (mut list, b, dir, ..) = sample()?;
        list.replace(b, memory(b"new"))?;
        assert_eq!(list.get(b).map(Item::state), Some(ItemState::Added));
        assert_eq!(list.get(b).map(Item::extracted_size), Some(3));

        assert!(matches!(
            list.replace(dir, memory(b"x")),
            Err(Error::InvalidOperation(_))
        ));

        Ok(())
    }
}
