use cueboard_core::card::sound::play_command_name;
use cueboard_core::card::{registry, Card};
use cueboard_core::model::card::{kind_of_id, CardData, CardKind, JsonMap};
use cueboard_core::store::{MemoryStore, StorageGateway};
use serde_json::json;

fn factory(kind: CardKind) -> &'static registry::CardFactory {
    registry::resolve(kind).expect("known kind resolves")
}

fn patch(value: serde_json::Value) -> JsonMap {
    value.as_object().expect("patch fixture is an object").clone()
}

#[test]
fn created_card_id_prefix_matches_default_data_kind() {
    for kind in CardKind::all() {
        let card = Card::create(factory(*kind)).expect("card should create");
        assert_eq!(kind_of_id(card.id()), Some(*kind));
        assert_eq!(card.kind(), *kind);
        assert_eq!(card.title(), kind.default_title());
    }
}

#[test]
fn from_persisted_merges_defaults_with_persisted_winning() {
    let body = patch(json!({
        "id": "sound-fixed-1",
        "type": "sound",
        "title": "Horn",
        "volume": 0.4
    }));
    let card = Card::from_persisted(factory(CardKind::Sound), &body).expect("card should load");

    assert_eq!(card.id(), "sound-fixed-1");
    assert_eq!(card.title(), "Horn");
    match &card.record().data {
        CardData::Sound(data) => {
            assert_eq!(data.volume, 0.4);
            // Untouched fields come from defaults.
            assert_eq!(data.playback_rate, 1.0);
            assert!(!data.shuffle);
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn from_persisted_rejects_mismatched_id_prefix() {
    let body = patch(json!({
        "id": "timer-wrong-prefix",
        "type": "sound",
        "title": "Broken"
    }));
    assert!(Card::from_persisted(factory(CardKind::Sound), &body).is_err());
}

#[test]
fn successive_disjoint_updates_union_in_call_order() {
    let mut store = MemoryStore::new();
    let mut card = Card::create(factory(CardKind::Sound)).expect("card should create");

    card.update_data(&patch(json!({"volume": 0.2})), &mut store)
        .expect("first update persists");
    card.update_data(&patch(json!({"shuffle": true})), &mut store)
        .expect("second update persists");
    card.update_data(&patch(json!({"volume": 0.9})), &mut store)
        .expect("third update persists");

    match &card.record().data {
        CardData::Sound(data) => {
            assert_eq!(data.volume, 0.9);
            assert!(data.shuffle);
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    let saved = store
        .get(card.id())
        .expect("store read")
        .expect("record persisted");
    assert_eq!(saved["volume"], json!(0.9));
    assert_eq!(saved["shuffle"], json!(true));
}

#[test]
fn empty_patch_is_a_complete_noop() {
    let mut store = MemoryStore::new();
    let mut card = Card::create(factory(CardKind::Notepad)).expect("card should create");

    let outcome = card
        .update_data(&JsonMap::new(), &mut store)
        .expect("empty patch succeeds");
    assert!(!outcome.title_changed);
    assert!(store.is_empty());
}

#[test]
fn title_change_rebuilds_command_names() {
    let mut store = MemoryStore::new();
    let mut card = Card::create(factory(CardKind::Sound)).expect("card should create");

    let outcome = card
        .update_data(&patch(json!({"title": "Klaxon"})), &mut store)
        .expect("title update persists");
    assert!(outcome.title_changed);

    let names: Vec<String> = card
        .command_specs()
        .into_iter()
        .map(|spec| spec.name)
        .collect();
    assert!(names.contains(&play_command_name("Klaxon")));
    assert!(!names.iter().any(|name| name.contains("New sound")));
}

#[test]
fn invalid_patch_is_rejected_without_side_effects() {
    let mut store = MemoryStore::new();
    let mut card = Card::create(factory(CardKind::Sound)).expect("card should create");
    card.update_data(&patch(json!({"volume": 0.5})), &mut store)
        .expect("valid update persists");

    let err = card.update_data(&patch(json!({"volume": "loud"})), &mut store);
    assert!(err.is_err());

    match &card.record().data {
        CardData::Sound(data) => assert_eq!(data.volume, 0.5),
        other => panic!("unexpected payload: {other:?}"),
    }
    let saved = store
        .get(card.id())
        .expect("store read")
        .expect("record still persisted");
    assert_eq!(saved["volume"], json!(0.5));
}

#[test]
fn patch_cannot_change_id_or_type() {
    let mut store = MemoryStore::new();
    let mut card = Card::create(factory(CardKind::Notepad)).expect("card should create");
    let original_id = card.id().to_string();

    card.update_data(
        &patch(json!({"id": "sound-sneaky", "type": "sound", "text": "kept"})),
        &mut store,
    )
    .expect("patch with protected keys still applies the rest");

    assert_eq!(card.id(), original_id);
    assert_eq!(card.kind(), CardKind::Notepad);
    match &card.record().data {
        CardData::Notepad(data) => assert_eq!(data.text, "kept"),
        other => panic!("unexpected payload: {other:?}"),
    }
}
