use cueboard_core::store::{
    open_store, open_store_in_memory, Partition, StorageGateway,
};
use serde_json::json;

fn body(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    value.as_object().expect("fixture is an object").clone()
}

#[test]
fn in_memory_store_round_trips_records() {
    let mut store = open_store_in_memory().expect("in-memory store opens");

    store
        .save("sound-1", &body(json!({"id": "sound-1", "title": "Horn"})))
        .expect("save card record");
    store
        .save("grid-layout", &body(json!({"id": "grid-layout"})))
        .expect("save config record");

    let loaded = store
        .get("sound-1")
        .expect("get succeeds")
        .expect("record exists");
    assert_eq!(loaded["title"], json!("Horn"));

    assert_eq!(store.list(Partition::Cards).expect("list cards").len(), 1);
    assert_eq!(store.list(Partition::Config).expect("list config").len(), 1);
    assert_eq!(store.list_all().expect("list all").len(), 2);

    store.delete("sound-1").expect("delete succeeds");
    store.delete("sound-1").expect("second delete is a no-op");
    assert!(store.get("sound-1").expect("get succeeds").is_none());
}

#[test]
fn save_is_an_upsert() {
    let mut store = open_store_in_memory().expect("in-memory store opens");
    store
        .save("notepad-1", &body(json!({"id": "notepad-1", "text": "v1"})))
        .expect("first save");
    store
        .save("notepad-1", &body(json!({"id": "notepad-1", "text": "v2"})))
        .expect("second save");

    let loaded = store
        .get("notepad-1")
        .expect("get succeeds")
        .expect("record exists");
    assert_eq!(loaded["text"], json!("v2"));
    assert_eq!(store.list_all().expect("list all").len(), 1);
}

#[test]
fn file_store_persists_across_reopen() {
    let dir = tempfile::tempdir().expect("temp dir creates");
    let path = dir.path().join("board.sqlite3");

    {
        let mut store = open_store(&path).expect("file store opens");
        store
            .save("timer-1", &body(json!({"id": "timer-1", "duration_ms": 5000})))
            .expect("save record");
    }

    let store = open_store(&path).expect("file store reopens");
    let loaded = store
        .get("timer-1")
        .expect("get succeeds")
        .expect("record survived reopen");
    assert_eq!(loaded["duration_ms"], json!(5000));
}

#[test]
fn list_results_are_in_ascending_id_order() {
    let mut store = open_store_in_memory().expect("in-memory store opens");
    for id in ["sound-c", "sound-a", "sound-b"] {
        store
            .save(id, &body(json!({ "id": id })))
            .expect("save record");
    }

    let ids: Vec<String> = store
        .list(Partition::Cards)
        .expect("list cards")
        .into_iter()
        .map(|record| record["id"].as_str().expect("id is text").to_string())
        .collect();
    assert_eq!(ids, ["sound-a", "sound-b", "sound-c"]);
}

#[test]
fn clear_empties_both_partitions() {
    let mut store = open_store_in_memory().expect("in-memory store opens");
    store
        .save("sound-1", &body(json!({"id": "sound-1"})))
        .expect("save card record");
    store
        .save("board-title", &body(json!({"id": "board-title", "value": "t"})))
        .expect("save config record");

    store.clear().expect("clear succeeds");
    assert!(store.list_all().expect("list all").is_empty());
}
