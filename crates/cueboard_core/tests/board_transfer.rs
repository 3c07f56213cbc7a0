use cueboard_core::board::{BoardManager, BoardPhase};
use cueboard_core::host::{
    AudioOutput, BoardHost, FixedBoardContext, MediaProbe, NullAudioOutput, NullProbe,
};
use cueboard_core::store::{MemoryStore, StorageGateway};
use serde_json::json;
use std::time::Instant;

struct PromptHost {
    audio: NullAudioOutput,
    probe: NullProbe,
    accept_prompts: bool,
}

impl PromptHost {
    fn accepting() -> Self {
        Self {
            audio: NullAudioOutput,
            probe: NullProbe,
            accept_prompts: true,
        }
    }

    fn declining() -> Self {
        Self {
            accept_prompts: false,
            ..Self::accepting()
        }
    }
}

impl BoardHost for PromptHost {
    fn audio(&mut self) -> &mut dyn AudioOutput {
        &mut self.audio
    }

    fn probe(&mut self) -> &mut dyn MediaProbe {
        &mut self.probe
    }

    fn confirm(&mut self, _message: &str) -> bool {
        self.accept_prompts
    }
}

fn ready_manager(host: &mut PromptHost, now: Instant) -> BoardManager<MemoryStore> {
    let mut manager = BoardManager::new(MemoryStore::new());
    manager
        .initialize(&FixedBoardContext("transfer-board".to_string()), host, now)
        .expect("empty board initializes");
    manager
}

#[test]
fn export_then_import_restores_cards_and_layout() {
    let mut host = PromptHost::accepting();
    let now = Instant::now();
    let mut source = ready_manager(&mut host, now);
    let sound = source
        .add_card("sound", None, None, &mut host, now)
        .expect("add succeeds")
        .expect("card id");
    let notepad = source
        .add_card("notepad", None, None, &mut host, now)
        .expect("add succeeds")
        .expect("card id");
    source.rename_board("Saturday session").expect("rename persists");

    let exported = source.export_board().expect("export serializes");

    let mut target = ready_manager(&mut host, now);
    let imported = target
        .import_board(&exported, &mut host, now)
        .expect("import applies");
    assert!(imported);

    assert_eq!(target.card_count(), 2);
    assert!(target.card(&sound).is_some());
    assert!(target.card(&notepad).is_some());
    assert!(target.layout().contains(&sound));
    assert!(target.layout().contains(&notepad));
    assert_eq!(target.title(), "Saturday session");
    assert_eq!(target.phase(), BoardPhase::Ready);
}

#[test]
fn import_of_legacy_file_migrates_ids_and_layout_references() {
    let mut host = PromptHost::accepting();
    let now = Instant::now();
    let mut manager = ready_manager(&mut host, now);

    let legacy = json!([
        { "id": 1, "title": "Horn", "volume": 0.5 },
        { "id": 2, "title": "Applause" },
        {
            "id": "grid-layout",
            "layout": {
                "id": "root",
                "type": "group",
                "children": [
                    { "id": 2, "children": [] },
                    { "id": 1, "children": [] }
                ]
            }
        }
    ])
    .to_string();

    assert!(manager
        .import_board(&legacy, &mut host, now)
        .expect("legacy import applies"));

    assert_eq!(manager.card_count(), 2);
    let horn = manager.card("sound-1").expect("migrated card lives");
    assert_eq!(horn.title(), "Horn");
    assert!(manager.layout().contains("sound-1"));
    assert!(manager.layout().contains("sound-2"));

    // Migrated order is preserved: applause first, horn second.
    let cards = manager.layout().card_nodes();
    assert_eq!(cards[0].0, "sound-2");
    assert_eq!(cards[1].0, "sound-1");
}

#[test]
fn malformed_import_leaves_prior_state_untouched() {
    let mut host = PromptHost::accepting();
    let now = Instant::now();
    let mut manager = ready_manager(&mut host, now);
    manager
        .add_card("timer", None, None, &mut host, now)
        .expect("add succeeds");
    let before = manager.store().list_all().expect("store read");

    assert!(manager.import_board("definitely not json", &mut host, now).is_err());
    assert!(manager
        .import_board(&json!({"id": "x"}).to_string(), &mut host, now)
        .is_err());

    let after = manager.store().list_all().expect("store read");
    assert_eq!(before, after);
    assert_eq!(manager.card_count(), 1);
}

#[test]
fn declined_import_confirmation_changes_nothing() {
    let mut accepting = PromptHost::accepting();
    let now = Instant::now();
    let mut manager = ready_manager(&mut accepting, now);
    manager
        .add_card("notepad", None, None, &mut accepting, now)
        .expect("add succeeds");
    let before = manager.store().list_all().expect("store read");

    let incoming = json!([
        { "id": "sound-new", "type": "sound", "title": "Incoming" }
    ])
    .to_string();

    let mut declining = PromptHost::declining();
    let imported = manager
        .import_board(&incoming, &mut declining, now)
        .expect("declined import is not an error");
    assert!(!imported);
    assert_eq!(manager.store().list_all().expect("store read"), before);
    assert!(manager.card("sound-new").is_none());
}

#[test]
fn exported_sound_payloads_are_base64_text() {
    let mut host = PromptHost::accepting();
    let now = Instant::now();
    let mut manager = ready_manager(&mut host, now);
    let id = manager
        .add_card("sound", None, None, &mut host, now)
        .expect("add succeeds")
        .expect("card id");
    let files_patch = json!({
        "files": [ { "name": "clip.ogg", "bytes": "AQIDBA==", "duration_ms": 1200 } ]
    });
    manager
        .update_card(
            &id,
            files_patch.as_object().expect("patch is an object"),
            now,
        )
        .expect("patch applies");

    let exported = manager.export_board().expect("export serializes");
    let parsed: serde_json::Value = serde_json::from_str(&exported).expect("export parses back");
    let records = parsed.as_array().expect("export is an array");
    let sound = records
        .iter()
        .find(|record| record["id"] == json!(id))
        .expect("sound record exported");
    assert_eq!(sound["files"][0]["bytes"], json!("AQIDBA=="));
}
