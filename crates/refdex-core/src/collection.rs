//! Collection accessors: the per-type bundle handed to search components and
//! an in-memory collection used by tests and embedders of the library.

use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::traits::{Collection, Entry};
use crate::types::EntryType;

/// One accessor per entry type, chosen once at construction.
#[derive(Clone)]
pub struct Collections {
    papers: Arc<dyn Collection>,
    books: Arc<dyn Collection>,
    media: Arc<dyn Collection>,
}

impl Collections {
    pub fn new(papers: Arc<dyn Collection>, books: Arc<dyn Collection>, media: Arc<dyn Collection>) -> Result<Self> {
        for (slot, c) in [(EntryType::Paper, &papers), (EntryType::Book, &books), (EntryType::Media, &media)] {
            if c.entry_type() != slot {
                return Err(Error::InvalidConfig(format!(
                    "collection for {} holds {} entries",
                    slot.collection_name(),
                    c.entry_type().collection_name()
                )));
            }
        }
        Ok(Self { papers, books, media })
    }

    pub fn get(&self, entry_type: EntryType) -> &Arc<dyn Collection> {
        match entry_type {
            EntryType::Paper => &self.papers,
            EntryType::Book => &self.books,
            EntryType::Media => &self.media,
        }
    }

    pub fn resolve(&self, entry_type: EntryType, id: &str) -> Result<Option<Arc<dyn Entry>>> {
        self.get(entry_type).get(id)
    }
}

/// Insertion-ordered collection held in memory.
pub struct MemoryCollection {
    entry_type: EntryType,
    entries: RwLock<Vec<Arc<dyn Entry>>>,
}

impl MemoryCollection {
    pub fn new(entry_type: EntryType) -> Self {
        Self { entry_type, entries: RwLock::new(Vec::new()) }
    }

    /// Inserts or replaces the entry with the same id.
    pub fn upsert(&self, entry: Arc<dyn Entry>) -> Result<()> {
        if entry.entry_type() != self.entry_type {
            return Err(Error::InvalidConfig(format!(
                "cannot store {} '{}' in the {} collection",
                entry.entry_type(),
                entry.id(),
                self.entry_type.collection_name()
            )));
        }
        let mut entries = self.entries.write().map_err(|_| Error::Operation("collection lock poisoned".into()))?;
        match entries.iter().position(|e| e.id() == entry.id()) {
            Some(pos) => entries[pos] = entry,
            None => entries.push(entry),
        }
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut entries = self.entries.write().map_err(|_| Error::Operation("collection lock poisoned".into()))?;
        let before = entries.len();
        entries.retain(|e| e.id() != id);
        Ok(entries.len() != before)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Collection for MemoryCollection {
    fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    fn list_all(&self) -> Result<Vec<Arc<dyn Entry>>> {
        let entries = self.entries.read().map_err(|_| Error::Operation("collection lock poisoned".into()))?;
        Ok(entries.clone())
    }

    fn get(&self, id: &str) -> Result<Option<Arc<dyn Entry>>> {
        let entries = self.entries.read().map_err(|_| Error::Operation("collection lock poisoned".into()))?;
        Ok(entries.iter().find(|e| e.id() == id).cloned())
    }
}
