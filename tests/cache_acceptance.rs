// Acceptance tests for cache directory allocation and the file cache

mod common;

use std::fs;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use actorcache::storage::{inspect_entry, CacheLock, CacheRepository, KEY_FILE, SUCCESS_MARKER};
use actorcache::{Actor, ActorGraph, ActorState, Error, ErrorKind, ParamValue};
use common::*;

fn build_counter(cache: &TestCache, text: &str, min_count: i64) -> Arc<Counter> {
    let graph = text_graph();
    let id = graph.get_actor_by_classname("Counter").unwrap();
    graph
        .get_actor_constructor(id)
        .unwrap()
        .create::<Counter>(&cache.context(), counter_slot_params(text, true, min_count))
        .unwrap()
}

#[test]
fn test_equal_states_share_a_directory() {
    let cache = TestCache::new();
    let first = build_counter(&cache, "a b a", 1);
    let second = build_counter(&cache, "a b a", 1);

    let first_dir = first.core().file_cache().unwrap().root().to_path_buf();
    let second_dir = second.core().file_cache().unwrap().root().to_path_buf();
    assert_eq!(first_dir, second_dir);
    assert_eq!(
        first_dir,
        cache.root().join("fixtures.text.Counter").join("1").join("000")
    );
}

#[test]
fn test_different_dependency_params_get_sibling_directories() {
    let cache = TestCache::new();
    let first = build_counter(&cache, "a b a", 1);
    let second = build_counter(&cache, "c d", 1);

    let first_dir = first.core().file_cache().unwrap().root().to_path_buf();
    let second_dir = second.core().file_cache().unwrap().root().to_path_buf();
    assert_ne!(first_dir, second_dir);
    assert_eq!(second_dir.file_name().unwrap(), "001");

    let key: serde_json::Value =
        serde_json::from_slice(&fs::read(second_dir.join(KEY_FILE)).unwrap()).unwrap();
    assert_eq!(key, second.actor_state().unwrap().to_dict().unwrap());
}

#[test]
fn test_key_file_holds_nested_state() {
    let cache = TestCache::new();
    let counter = build_counter(&cache, "hi", 1);
    let dir = counter.core().file_cache().unwrap().root().to_path_buf();

    let key: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.join(KEY_FILE)).unwrap()).unwrap();
    assert_eq!(key["classpath"], "fixtures.text.Counter");
    assert_eq!(key["classversion"], "1");
    assert_eq!(key["params"]["min_count"], 1);

    let deps = key["dependencies"].as_array().unwrap();
    assert_eq!(deps.len(), 2);
    assert_eq!(deps[0]["classpath"], "fixtures.text.Reader");
    assert_eq!(deps[1]["classpath"], "fixtures.text.Tokenizer");
    assert_eq!(deps[1]["classversion"], "2");
    assert_eq!(deps[1]["dependencies"][0]["params"]["text"], "hi");
}

#[test]
fn test_cached_file_survives_new_instances() {
    let cache = TestCache::new();
    let first = build_counter(&cache, "One two one", 1);
    let tokens = first.tokenizer.tokens().unwrap();
    assert_eq!(tokens, vec!["one", "two", "one"]);

    let tokenizer_cache = first.tokenizer.core().file_cache().unwrap();
    assert!(tokenizer_cache.has_file("tokens.json"));
    let payload = tokenizer_cache.get_file("tokens.json").unwrap();
    assert!(payload.ends_with("tokens/data.json"));

    // Tamper with the payload; a new instance must read it back, not recompute.
    fs::write(&payload, r#"["cached"]"#).unwrap();
    let second = build_counter(&cache, "One two one", 1);
    assert_eq!(second.tokenizer.tokens().unwrap(), vec!["cached"]);
}

#[test]
fn test_kv_cache_persists_per_actor() {
    let cache = TestCache::new();
    let counter = build_counter(&cache, "x y x z x", 2);

    let counts = counter.counts().unwrap();
    assert_eq!(counts.get("x"), Some(&3));
    assert!(!counts.contains_key("y"));

    let kv = counter.core().kv_cache().unwrap();
    assert!(kv.contains("counts").unwrap());
    assert_eq!(kv.keys().unwrap(), vec!["counts".to_string()]);
}

#[test]
fn test_entry_shape_after_commit() {
    let cache = TestCache::new();
    let counter = build_counter(&cache, "a", 1);
    counter.tokenizer.tokens().unwrap();

    let root = counter.tokenizer.core().file_cache().unwrap().root().to_path_buf();
    let entry = root.join("tokens");
    assert!(entry.join(SUCCESS_MARKER).exists());

    let shape = inspect_entry(&entry).unwrap();
    assert_eq!((shape.markers, shape.payloads), (1, 1));
}

#[test]
fn test_failed_write_leaves_entry_absent() {
    let cache = TestCache::new();
    let counter = build_counter(&cache, "a", 1);
    let file_cache = counter.core().file_cache().unwrap();

    let result: actorcache::Result<()> = file_cache.open_file_path("report.txt", |path| {
        fs::write(path, "partial").unwrap();
        Err(Error::FileNotFound("upstream".to_string()))
    });
    assert!(result.is_err());
    assert!(!file_cache.has_file("report.txt"));

    let err = file_cache.get_file("report.txt").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // A retry overwrites the partial payload and commits.
    file_cache
        .open_file("report.txt", |writer| {
            use std::io::Write;
            writer.write_all(b"complete").map_err(|e| Error::io("report.txt", e))
        })
        .unwrap();
    let payload = file_cache.get_file("report.txt").unwrap();
    assert_eq!(fs::read_to_string(payload).unwrap(), "complete");
}

#[test]
fn test_folder_entries() {
    let cache = TestCache::new();
    let counter = build_counter(&cache, "a", 1);
    let file_cache = counter.core().file_cache().unwrap();

    assert!(!file_cache.has_folder("shards"));
    file_cache
        .open_folder_path("shards", |dir| {
            fs::write(dir.join("part-0"), "a").map_err(|e| Error::io(dir, e))?;
            fs::write(dir.join("part-1"), "b").map_err(|e| Error::io(dir, e))
        })
        .unwrap();

    let dir = file_cache.get_folder("shards").unwrap();
    assert!(dir.join("part-1").exists());
    assert!(dir.join(SUCCESS_MARKER).exists());
}

#[test]
fn test_missing_key_file_directory_is_recreated() {
    let cache = TestCache::new();
    let state = ActorState::new(
        "fixtures.bare.Thing",
        "v1",
        ParamValue::record([("n", ParamValue::Int(1))]),
        vec![],
    )
    .unwrap();

    let dir = cache.repository.reserve_cache_dir(&state).unwrap();
    fs::write(dir.join("leftover"), "junk").unwrap();
    fs::remove_file(dir.join(KEY_FILE)).unwrap();

    let again = cache.repository.reserve_cache_dir(&state).unwrap();
    assert_eq!(dir, again);
    assert!(again.join(KEY_FILE).exists());
    assert!(!again.join("leftover").exists());
}

#[test]
fn test_version_is_slugified_into_path() {
    let cache = TestCache::new();
    let state = ActorState::new("fixtures.bare.Thing", "Release 2/B", ParamValue::Null, vec![])
        .unwrap();

    let dir = cache.repository.reserve_cache_dir(&state).unwrap();
    assert_eq!(
        dir,
        cache
            .root()
            .join("fixtures.bare.Thing")
            .join("release_2_b")
            .join("000")
    );
}

#[test]
fn test_concurrent_reservations_agree() {
    let cache = TestCache::new();
    let state = ActorState::new(
        "fixtures.bare.Thing",
        "1",
        ParamValue::record([("seed", ParamValue::Int(7))]),
        vec![],
    )
    .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let repository = Arc::clone(&cache.repository);
            let state = state.clone();
            thread::spawn(move || repository.reserve_cache_dir(&state).unwrap())
        })
        .collect();

    let dirs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(dirs.iter().all(|d| d == &dirs[0]));
    assert_eq!(cache.repository.list_slots("fixtures.bare.Thing").unwrap().len(), 1);
}

#[test]
fn test_allocation_lock_timeout() {
    let cache = TestCache::new();
    let repository =
        CacheRepository::with_lock_timeout(cache.root(), Duration::from_millis(200)).unwrap();
    let state = ActorState::new("fixtures.bare.Thing", "1", ParamValue::Null, vec![]).unwrap();

    let version_dir = cache.root().join("fixtures.bare.Thing").join("1");
    let _held = CacheLock::acquire(&version_dir, Duration::from_secs(1))
        .unwrap();

    // The lock is held through its own file handle, so the allocation blocks
    // even within this process.
    let err = thread::spawn(move || repository.reserve_cache_dir(&state).unwrap_err())
        .join()
        .unwrap();
    assert!(err.is_transient());
}

#[test]
fn test_write_lock_holder_commits_while_contender_times_out() {
    let cache = TestCache::with_lock_timeout(Duration::from_millis(200));
    let state = ActorState::new("fixtures.bare.Thing", "1", ParamValue::Null, vec![]).unwrap();
    let holder_cache = cache.repository.file_cache(&state).unwrap();
    let contender_cache = cache.repository.file_cache(&state).unwrap();

    let (locked_tx, locked_rx) = mpsc::channel();
    let (write_tx, write_rx) = mpsc::channel::<()>();

    let holder = thread::spawn(move || {
        let _guard = holder_cache.acquire_write_lock().unwrap();
        locked_tx.send(()).unwrap();
        write_rx.recv().unwrap();
        holder_cache
            .open_file_path("weights.bin", |path| {
                fs::write(path, b"trained").map_err(|e| Error::io(path, e))
            })
            .unwrap();
    });

    locked_rx.recv().unwrap();
    let err = contender_cache.acquire_write_lock().err().unwrap();
    assert!(err.is_transient());
    assert!(!contender_cache.has_file("weights.bin"));

    write_tx.send(()).unwrap();
    holder.join().unwrap();

    assert!(contender_cache.has_file("weights.bin"));
    let payload = contender_cache.get_file("weights.bin").unwrap();
    assert_eq!(fs::read(payload).unwrap(), b"trained");
    let shape = inspect_entry(&contender_cache.root().join("weights")).unwrap();
    assert_eq!((shape.markers, shape.payloads), (1, 1));
}

#[test]
fn test_lock_timeout_inside_constructor_stays_transient() {
    let cache = TestCache::with_lock_timeout(Duration::from_millis(200));
    let mut graph = ActorGraph::new();
    graph.add_actor::<Guarded>();

    let state =
        ActorState::create::<Guarded>(ParamValue::empty_record(), None, vec![]).unwrap();
    let dir = cache.repository.reserve_cache_dir(&state).unwrap();
    let _held = CacheLock::acquire(&dir, Duration::from_secs(1)).unwrap();

    let err = graph
        .create_actor("Guarded", &cache.context(), vec![ParamValue::empty_record()])
        .err()
        .unwrap();
    assert!(matches!(err, Error::LockTimeout { .. }));
    assert_eq!(err.kind(), ErrorKind::Transient);
}

fn build_ranker(cache: &TestCache, params: ParamValue) -> actorcache::Result<Arc<Ranker>> {
    let mut graph = ActorGraph::new();
    graph.depends_on::<Ranker, Reader>()?;
    let actor = graph.create_actor("Ranker", &cache.context(), vec![reader_params("a b"), params])?;
    Ok(actorcache::downcast_actor::<Ranker>(&actor).unwrap())
}

#[test]
fn test_selected_method_becomes_a_trailing_dependency() {
    let cache = TestCache::new();
    let ranker = build_ranker(&cache, ranker_params("bm25", 1.2, true)).unwrap();

    let state = ranker.actor_state().unwrap();
    let deps = state.dependencies();
    assert_eq!(deps.len(), 2);
    assert_eq!(deps[0].classpath(), "fixtures.text.Reader");
    assert_eq!(deps[1].classpath(), "fixtures.methods.Bm25");
    assert_eq!(deps[1].params().to_canonical().unwrap(), serde_json::json!({"k1": 1.2}));

    let key: serde_json::Value = serde_json::from_slice(
        &fs::read(ranker.core().file_cache().unwrap().root().join(KEY_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(key["params"], serde_json::json!({"method": "bm25", "top_k": 5}));
    assert_eq!(key["dependencies"][1]["classversion"], "1");
}

#[test]
fn test_unselected_method_args_do_not_split_the_cache() {
    let cache = TestCache::new();
    let dir_of = |params| {
        build_ranker(&cache, params)
            .unwrap()
            .core()
            .file_cache()
            .unwrap()
            .root()
            .to_path_buf()
    };

    let bm25 = dir_of(ranker_params("bm25", 1.2, true));
    assert_eq!(dir_of(ranker_params("bm25", 1.2, false)), bm25);
    assert_ne!(dir_of(ranker_params("bm25", 2.0, true)), bm25);

    let tfidf = dir_of(ranker_params("tfidf", 1.2, true));
    assert_ne!(tfidf, bm25);
    assert_eq!(dir_of(ranker_params("tfidf", 9.9, true)), tfidf);
}

#[test]
fn test_unknown_method_is_rejected_before_construction() {
    let cache = TestCache::new();
    let mut params = ranker_params("bm25", 1.2, true);
    if let ParamValue::Record(fields) = &mut params {
        fields[0].1 = ParamValue::Str("lsa".to_string());
    }

    let err = build_ranker(&cache, params).err().unwrap();
    assert!(matches!(err, Error::ParamMismatch(ref m) if m.contains("unknown method lsa")));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!cache.root().join("fixtures.text.Ranker").exists());
}
