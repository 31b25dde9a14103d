use std::collections::HashSet;
use std::sync::Arc;

use tempfile::TempDir;

use refdex_core::error::Error;
use refdex_core::traits::Entry;
use refdex_core::{Collections, EntryType, MemoryCollection, Record, SearchOptions};
use refdex_embed::{BatchOptions, FakeEmbeddingProvider};
use refdex_vector::{VectorIndexRegistry, VectorSearch};

fn library() -> (Arc<MemoryCollection>, Collections) {
    let papers = Arc::new(MemoryCollection::new(EntryType::Paper));
    papers
        .upsert(Arc::new(
            Record::new("ashford2012", EntryType::Paper)
                .with_field("Leadership development through feedback\nNew leaders seek feedback")
                .with_quote("Feedback is a gift"),
        ))
        .unwrap();
    papers.upsert(Arc::new(Record::new("mintzberg1973", EntryType::Paper).with_field("The nature of managerial work"))).unwrap();

    let books = Arc::new(MemoryCollection::new(EntryType::Book));
    books.upsert(Arc::new(Record::new("kotter1996", EntryType::Book).with_field("Leading change in organisations"))).unwrap();

    let media = Arc::new(MemoryCollection::new(EntryType::Media));
    media.upsert(Arc::new(Record::new("ted2015", EntryType::Media).with_field("A talk on gardening and soil"))).unwrap();

    let collections = Collections::new(papers.clone(), books, media).unwrap();
    (papers, collections)
}

fn registry(tmp: &TempDir) -> Arc<VectorIndexRegistry> {
    Arc::new(
        VectorIndexRegistry::open(tmp.path(), Arc::new(FakeEmbeddingProvider), BatchOptions { workers: 2, show_progress: false })
            .unwrap(),
    )
}

#[test]
fn rebuild_then_search_ranks_by_meaning() {
    let tmp = TempDir::new().unwrap();
    let (_, collections) = library();
    let reg = registry(&tmp);
    reg.create_index("nova-256", "nova", Some(256), 300, 50).unwrap();

    let stats = reg.rebuild_index("nova-256", &collections).unwrap();
    assert_eq!((stats.papers, stats.books, stats.media), (2, 1, 1));
    assert_eq!(stats.chunks, 4);
    assert!(stats.tokens > 0);
    let meta = reg.get_index("nova-256").unwrap();
    assert_eq!(meta.chunk_count, 4);
    assert_eq!(meta.total_tokens, stats.tokens);

    let search = VectorSearch::new(reg.clone(), collections, "nova-256");
    assert!(search.index_exists());
    let results = search.search("leadership development feedback", None, &SearchOptions::default().with_fragments(0), &[]).unwrap();
    assert_eq!(results[0].entry_id, "ashford2012");
    assert_eq!(results[0].entry_type, EntryType::Paper);
    assert!(results[0].entry.is_some());
    assert!(results[0].matched_content.contains("Feedback is a gift"));
    assert!(!results[0].fragments.is_empty());
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    let unique: HashSet<&str> = results.iter().map(|r| r.entry_id.as_str()).collect();
    assert_eq!(unique.len(), results.len());
}

#[test]
fn filters_by_entry_and_type() {
    let tmp = TempDir::new().unwrap();
    let (_, collections) = library();
    let reg = registry(&tmp);
    reg.create_index("titan", "titan-v2", None, 300, 50).unwrap();
    reg.rebuild_index("titan", &collections).unwrap();
    let search = VectorSearch::new(reg, collections, "titan");

    let books = search.search("leading change", None, &SearchOptions::default(), &[EntryType::Book]).unwrap();
    assert!(books.iter().all(|r| r.entry_type == EntryType::Book));
    assert_eq!(books.len(), 1);

    let one = search.search("gardening", Some("ted2015"), &SearchOptions::default(), &[]).unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].entry_id, "ted2015");

    assert!(search.search("anything", None, &SearchOptions::default().top_k(0), &[]).unwrap().is_empty());
    assert_eq!(search.search("anything", None, &SearchOptions::default().top_k(usize::MAX), &[]).unwrap().len(), 4);
}

#[test]
fn missing_index_and_model_mismatch() {
    let tmp = TempDir::new().unwrap();
    let (_, collections) = library();
    let reg = registry(&tmp);

    let absent = VectorSearch::new(reg.clone(), collections.clone(), "nope");
    assert!(!absent.index_exists());
    assert!(matches!(absent.search("q", None, &SearchOptions::default(), &[]), Err(Error::NamedIndexNotFound(_))));

    reg.create_index("cohere", "cohere-en", None, 300, 50).unwrap();
    let mismatched = VectorSearch::new(reg.clone(), collections.clone(), "cohere").with_model("titan-v2");
    match mismatched.search("q", None, &SearchOptions::default(), &[]) {
        Err(Error::ModelMismatch { index_model, requested, .. }) => {
            assert_eq!(index_model, "cohere-en");
            assert_eq!(requested, "titan-v2");
        }
        other => panic!("expected model mismatch, got {other:?}"),
    }

    std::fs::remove_file(reg.layout().vectors_file("cohere")).unwrap();
    let matching = VectorSearch::new(reg, collections, "cohere").with_model("cohere-en");
    assert!(!matching.index_exists());
    assert!(matches!(matching.search("q", None, &SearchOptions::default(), &[]), Err(Error::NamedIndexNotFound(_))));
}

#[test]
fn cached_index_reloads_after_update() {
    let tmp = TempDir::new().unwrap();
    let (papers, collections) = library();
    let reg = registry(&tmp);
    reg.create_index("live", "titan-v2", None, 300, 50).unwrap();
    reg.rebuild_index("live", &collections).unwrap();
    let search = VectorSearch::new(reg.clone(), collections, "live");
    assert!(search.search("volcano eruption", None, &SearchOptions::default(), &[]).unwrap().iter().all(|r| r.entry_id != "new2024"));

    let record = Record::new("new2024", EntryType::Paper).with_field("Volcano eruption forecasting");
    papers.upsert(Arc::new(record.clone())).unwrap();
    reg.update_all_indices_with_entry("new2024", EntryType::Paper, &record.searchable_text());

    let results = search.search("volcano eruption", None, &SearchOptions::default(), &[]).unwrap();
    assert_eq!(results[0].entry_id, "new2024");
}

#[test]
fn unresolvable_entries_fall_back_to_chunk_text() {
    let tmp = TempDir::new().unwrap();
    let (papers, collections) = library();
    let reg = registry(&tmp);
    reg.create_index("orphan", "titan-v2", None, 300, 50).unwrap();
    reg.rebuild_index("orphan", &collections).unwrap();
    papers.remove("mintzberg1973").unwrap();

    let search = VectorSearch::new(reg, collections, "orphan");
    let results = search.search("managerial work", Some("mintzberg1973"), &SearchOptions::default(), &[]).unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].entry.is_none());
    assert_eq!(results[0].matched_content, "The nature of managerial work");
}

#[test]
fn removed_entry_disappears_and_others_keep_their_order() {
    let tmp = TempDir::new().unwrap();
    let papers = Arc::new(MemoryCollection::new(EntryType::Paper));
    for (id, text) in [
        ("p1", "soil carbon storage in grassland soil"),
        ("p2", "soil erosion on hill farms"),
        ("p3", "urban heat islands and soil moisture"),
    ] {
        papers.upsert(Arc::new(Record::new(id, EntryType::Paper).with_field(text))).unwrap();
    }
    let collections = Collections::new(
        papers,
        Arc::new(MemoryCollection::new(EntryType::Book)),
        Arc::new(MemoryCollection::new(EntryType::Media)),
    )
    .unwrap();
    let reg = registry(&tmp);
    reg.create_index("soil", "titan-v2", None, 300, 50).unwrap();
    reg.rebuild_index("soil", &collections).unwrap();
    let search = VectorSearch::new(reg.clone(), collections, "soil");

    let order = |search: &VectorSearch| -> Vec<String> {
        search.search("soil", None, &SearchOptions::default(), &[]).unwrap().into_iter().map(|r| r.entry_id).collect()
    };
    let before = order(&search);
    assert_eq!(before.len(), 3);

    let middle = before[1].clone();
    assert_eq!(reg.remove_entry_from_index("soil", &middle).unwrap(), 1);

    let after = order(&search);
    assert!(!after.contains(&middle));
    assert_eq!(after, vec![before[0].clone(), before[2].clone()]);
}
