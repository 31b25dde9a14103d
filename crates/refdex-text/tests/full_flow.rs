use std::sync::Arc;

use tempfile::TempDir;

use refdex_core::error::{Error, Result};
use refdex_core::traits::{Collection, Entry};
use refdex_core::{Collections, EntryType, MemoryCollection, Record, SearchOptions};
use refdex_text::{CombinedLexicalSearch, LexicalIndex};

/// Collection whose storage is unreadable.
struct BrokenCollection(EntryType);

impl Collection for BrokenCollection {
    fn entry_type(&self) -> EntryType {
        self.0
    }

    fn list_all(&self) -> Result<Vec<Arc<dyn Entry>>> {
        Err(Error::Operation("registry file is corrupt".into()))
    }

    fn get(&self, _id: &str) -> Result<Option<Arc<dyn Entry>>> {
        Err(Error::Operation("registry file is corrupt".into()))
    }
}

fn library() -> (Arc<MemoryCollection>, Arc<MemoryCollection>, Arc<MemoryCollection>) {
    let papers = Arc::new(MemoryCollection::new(EntryType::Paper));
    papers
        .upsert(Arc::new(
            Record::new("ashford2012", EntryType::Paper)
                .with_field("Leadership development through feedback.\nNew leaders seek feedback.")
                .with_quote("Feedback is a gift."),
        ))
        .unwrap();
    papers.upsert(Arc::new(Record::new("mintzberg1973", EntryType::Paper).with_field("The nature of managerial work"))).unwrap();

    let books = Arc::new(MemoryCollection::new(EntryType::Book));
    books.upsert(Arc::new(Record::new("kotter1996", EntryType::Book).with_field("Leading change in organisations. Leadership matters."))).unwrap();

    let media = Arc::new(MemoryCollection::new(EntryType::Media));
    media.upsert(Arc::new(Record::new("ted2015", EntryType::Media).with_field("A talk on gardening and soil"))).unwrap();
    (papers, books, media)
}

#[test]
fn combined_search_merges_collections_by_score() {
    let tmp = TempDir::new().unwrap();
    let (papers, books, media) = library();
    let collections = Collections::new(papers, books, media).unwrap();
    let search: CombinedLexicalSearch = CombinedLexicalSearch::new(&collections, &tmp.path().join("search_index"));

    let counts = search.rebuild_all_indices().expect("rebuild");
    assert_eq!(counts[&EntryType::Paper], 2);
    assert_eq!(counts[&EntryType::Book], 1);
    assert_eq!(counts[&EntryType::Media], 1);
    assert!(tmp.path().join("search_index/papers").is_dir());

    let results = search.search("leadership feedback", &SearchOptions::default(), &EntryType::ALL);
    let ids: Vec<&str> = results.iter().map(|r| r.entry_id.as_str()).collect();
    assert!(ids.contains(&"ashford2012"));
    assert!(ids.contains(&"kotter1996"));
    assert!(!ids.contains(&"ted2015"));
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    let top1 = search.search("leadership feedback", &SearchOptions::default().top_k(1), &EntryType::ALL);
    assert_eq!(top1.len(), 1);

    let books_only = search.search("leadership", &SearchOptions::default(), &[EntryType::Book]);
    assert!(books_only.iter().all(|r| r.entry_type == EntryType::Book));
}

#[test]
fn missing_index_is_rebuilt_on_first_search() {
    let tmp = TempDir::new().unwrap();
    let (papers, _, _) = library();
    let index: LexicalIndex = LexicalIndex::new(papers, tmp.path().join("papers"));
    assert!(index.needs_rebuild());

    let opts = SearchOptions::default().with_fragments(1);
    let results = index.search("feedback", None, &opts).unwrap();
    assert_eq!(results[0].entry_id, "ashford2012");
    assert!(!results[0].fragments.is_empty());
    assert!(results[0].matched_content.contains("Feedback is a gift."));
    assert!(!index.needs_rebuild());
}

#[test]
fn index_survives_reopen_from_disk() {
    let tmp = TempDir::new().unwrap();
    let (papers, _, _) = library();
    let index: LexicalIndex = LexicalIndex::new(papers.clone(), tmp.path().join("papers"));
    index.rebuild_index().unwrap();

    let reopened: LexicalIndex = LexicalIndex::new(papers, tmp.path().join("papers"));
    let results = reopened.search("managerial", None, &SearchOptions::default()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].entry_id, "mintzberg1973");
    assert!(results[0].entry.is_some());
}

#[test]
fn failing_collection_is_skipped_in_combined_search() {
    let tmp = TempDir::new().unwrap();
    let (papers, _, media) = library();
    let collections = Collections::new(papers, Arc::new(BrokenCollection(EntryType::Book)), media).unwrap();
    let search: CombinedLexicalSearch = CombinedLexicalSearch::new(&collections, tmp.path());

    let results = search.search("leadership", &SearchOptions::default(), &EntryType::ALL);
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.entry_type != EntryType::Book));

    assert!(search.search_collection(EntryType::Book, "leadership", None, &SearchOptions::default()).is_err());
}

#[test]
fn ensure_current_only_rebuilds_missing() {
    let tmp = TempDir::new().unwrap();
    let (papers, books, media) = library();
    let collections = Collections::new(papers, books, media).unwrap();
    let search: CombinedLexicalSearch = CombinedLexicalSearch::new(&collections, tmp.path());

    search.index(EntryType::Paper).rebuild_index().unwrap();
    let rebuilt = search.ensure_all_indices_current().unwrap();
    assert!(!rebuilt.contains_key(&EntryType::Paper));
    assert_eq!(rebuilt.get(&EntryType::Book), Some(&1));
    assert!(search.ensure_all_indices_current().unwrap().is_empty());
}
