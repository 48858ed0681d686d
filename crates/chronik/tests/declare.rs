//! The declaration macro's synthesized surface: event types, the tagged
//! mutation union, introspection, and transaction meta-fields.

use chronik::{
    declare_storage, keyed_entry, Memory, Micros, Rollback, Storage, StorageFields,
};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    id: u32,
    balance: i64,
}

impl Account {
    fn account_id(&self) -> u32 {
        self.id
    }
}

// Accessor-method style; behaves exactly like the named-field style.
keyed_entry!(Account, account_id() -> u32);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    key: String,
    label: String,
}

keyed_entry!(Tag, key: String);

declare_storage! {
    pub storage Ledger {
        accounts: UnorderedDictionary<Account>,
        tags: OrderedDictionary<Tag>,
    }
}

fn account(id: u32, balance: i64) -> Account {
    Account { id, balance }
}

#[test]
fn introspection_exposes_names_and_order() {
    assert_eq!(Ledger::STORAGE_NAME, "Ledger");
    assert_eq!(Ledger::FIELD_COUNT, 2);
    assert_eq!(Ledger::FIELD_NAMES, &["accounts", "tags"]);
    assert_eq!(Ledger::field_index("tags"), Some(1));
    assert_eq!(Ledger::field_index("nope"), None);

    use chronik::KeyedField;
    assert_eq!(<AccountsField as KeyedField>::NAME, "accounts");
    assert_eq!(<AccountsField as KeyedField>::INDEX, 0);
    assert_eq!(<TagsField as KeyedField>::INDEX, 1);
    assert_eq!(Ledger::FIELD_NAMES[<TagsField as KeyedField>::INDEX], "tags");
    // The per-field event types are reachable as associated types.
    let event: <AccountsField as KeyedField>::UpdateEvent = AccountsUpdated {
        us: Micros(1),
        data: account(7, 100),
    };
    assert_eq!(event.data.account_id(), 7);
}

#[test]
fn mutation_union_is_externally_tagged_json() {
    let updated = LedgerMutation::AccountsUpdated(AccountsUpdated {
        us: Micros(42),
        data: account(1, 5),
    });
    let json = serde_json::to_value(&updated).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "AccountsUpdated": { "us": 42, "data": { "id": 1, "balance": 5 } }
        })
    );

    let deleted = LedgerMutation::TagsDeleted(TagsDeleted {
        us: Micros(43),
        key: "t1".to_owned(),
    });
    let json = serde_json::to_string(&deleted).unwrap();
    let back: LedgerMutation = serde_json::from_str(&json).unwrap();
    assert_eq!(back, deleted);
}

#[test]
fn accessor_method_style_key_drives_the_dictionary() {
    let storage = Storage::<Ledger>::create_master(Memory::new()).unwrap();
    storage
        .read_write(|fields| {
            fields.accounts().add(account(7, 100));
            fields.accounts().add(account(7, 250));
            Ok::<_, Rollback<()>>(())
        })
        .unwrap();

    storage
        .read_only(|fields| {
            assert_eq!(fields.accounts.len(), 1);
            assert_eq!(fields.accounts.get(&7), Some(&account(7, 250)));
        })
        .unwrap();
}

#[test]
fn meta_fields_attach_to_the_persisted_record() {
    let storage = Storage::<Ledger>::create_master(Memory::new()).unwrap();
    storage
        .read_write(|fields| {
            fields.set_transaction_meta_field("who", "declare-test");
            fields.set_transaction_meta_field("drop-me", "x");
            fields.erase_transaction_meta_field("drop-me");
            fields.accounts().add(account(1, 1));
            Ok::<_, Rollback<()>>(())
        })
        .unwrap();

    let records = storage.borrow_stream().read_from(0);
    assert_eq!(records.len(), 1);
    let record = &records[0].1;
    assert_eq!(record.meta.len(), 1);
    assert_eq!(record.meta.get("who").map(String::as_str), Some("declare-test"));
    assert_eq!(record.mutations.len(), 1);

    // The next transaction starts with a clean meta-field map.
    storage
        .read_write(|fields| {
            fields.accounts().add(account(2, 2));
            Ok::<_, Rollback<()>>(())
        })
        .unwrap();
    let records = storage.borrow_stream().read_from(0);
    assert!(records[1].1.meta.is_empty());
}

#[test]
fn empty_transactions_publish_nothing() {
    let storage = Storage::<Ledger>::create_master(Memory::new()).unwrap();
    storage
        .read_write(|fields| {
            // Meta-fields without mutations are discarded with the journal.
            fields.set_transaction_meta_field("who", "nobody");
            Ok::<_, Rollback<()>>(())
        })
        .unwrap();
    assert_eq!(storage.borrow_stream().size(), 0);
}

#[test]
fn event_timestamps_precede_the_record_timestamp() {
    let storage = Storage::<Ledger>::create_master(Memory::new()).unwrap();
    storage
        .read_write(|fields| {
            fields.accounts().add(account(1, 1));
            fields.tags().add(Tag {
                key: "t".into(),
                label: "l".into(),
            });
            Ok::<_, Rollback<()>>(())
        })
        .unwrap();

    let (idxts, record) = storage.borrow_stream().read_from(0).pop().unwrap();
    let event_stamps: Vec<Micros> = record
        .mutations
        .iter()
        .map(|m| match m {
            LedgerMutation::AccountsUpdated(e) => e.us,
            LedgerMutation::AccountsDeleted(e) => e.us,
            LedgerMutation::TagsUpdated(e) => e.us,
            LedgerMutation::TagsDeleted(e) => e.us,
        })
        .collect();
    assert!(event_stamps.windows(2).all(|w| w[0] < w[1]));
    assert!(event_stamps.iter().all(|us| *us < record.us));
    assert_eq!(record.us, idxts.us);
}
