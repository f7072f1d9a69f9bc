//! Store and operation tests against `MemoryStore`.

use bson::{Document, doc, oid::ObjectId};

use crate::{
  Error,
  memory::MemoryStore,
  ops::{self, RunConfig},
  record::ClassFields,
  store::{ClassFilter, StudentQuery, StudentStore},
  trash::{ClassSelector, RestoreQuery, soft_delete_update},
  update::UpdateOp,
};

fn store(docs: Vec<Document>) -> MemoryStore {
  MemoryStore::with_documents(docs).expect("seed store")
}

fn cfg() -> RunConfig { RunConfig::default() }

fn dry() -> RunConfig { RunConfig { dry_run: true, ..RunConfig::default() } }

fn anna_pair() -> Vec<Document> {
  vec![
    doc! {
      "_id": ObjectId::new(),
      "Vorname": "Anna", "Familienname": "Muster", "Geburtsdatum": "2012-05-01",
      "Benutzername": null, "Angebote": ["Chor"],
    },
    doc! {
      "_id": ObjectId::new(),
      "Vorname": "Anna", "Familienname": "Muster", "Geburtsdatum": "2012-05-01",
      "Benutzername": null, "Angebote": ["Theater"],
      "updatedAt": bson::DateTime::from_millis(1_750_000_000_000),
    },
  ]
}

// ─── MemoryStore ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_assigns_id_and_get_returns_it() {
  let s = MemoryStore::new();
  let record = s.insert(doc! { "Vorname": "Ben" }).await.unwrap();
  let fetched = s.get(record.id()).await.unwrap().unwrap();
  assert_eq!(fetched.given_name(), Some("Ben"));
  assert!(s.get(ObjectId::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn find_sorts_by_family_then_given_and_pages() {
  let s = store(vec![
    doc! { "Vorname": "Zoe", "Familienname": "Adler" },
    doc! { "Vorname": "Anna", "Familienname": "Muster" },
    doc! { "Vorname": "Ben", "Familienname": "Adler" },
    doc! { "Vorname": "Eva", "Familienname": "Adler", "_deleted": true },
  ]);

  let all = s.find(&StudentQuery::default()).await.unwrap();
  let names: Vec<_> = all.iter().map(|r| r.given_name().unwrap()).collect();
  assert_eq!(names, vec!["Ben", "Zoe", "Anna"]);

  let page = StudentQuery { skip: Some(1), limit: Some(1), ..StudentQuery::default() };
  let page = s.find(&page).await.unwrap();
  assert_eq!(page.len(), 1);
  assert_eq!(page[0].given_name(), Some("Zoe"));

  assert_eq!(s.count(&StudentQuery::default()).await.unwrap(), 3);
  let with_deleted = StudentQuery { include_deleted: true, ..StudentQuery::default() };
  assert_eq!(s.count(&with_deleted).await.unwrap(), 4);
}

#[tokio::test]
async fn normalized_username_is_unique() {
  let s = store(vec![doc! { "Vorname": "Anna", "NormBenutzername": "amuster" }]);

  let err = s.insert(doc! { "Vorname": "Anne", "NormBenutzername": "amuster" }).await;
  assert!(matches!(err, Err(Error::DuplicateUsername(_))));

  // Missing or null values are outside the constraint.
  s.insert(doc! { "Vorname": "X" }).await.unwrap();
  s.insert(doc! { "Vorname": "Y", "NormBenutzername": null }).await.unwrap();
  s.insert(doc! { "Vorname": "Z", "NormBenutzername": null }).await.unwrap();
}

#[tokio::test]
async fn bulk_update_is_unordered() {
  let s = store(vec![
    doc! { "Vorname": "A", "NormBenutzername": "taken" },
    doc! { "Vorname": "B" },
    doc! { "Vorname": "C" },
  ]);
  let docs = s.documents();
  let id = |i: usize| docs[i].get_object_id("_id").unwrap();

  let outcome = s
    .apply_updates(vec![
      UpdateOp::set(id(1), doc! { "NormBenutzername": "taken" }),
      UpdateOp::set(id(2), doc! { "Religion": "rk" }),
      UpdateOp::set(ObjectId::new(), doc! { "Religion": "rk" }),
    ])
    .await
    .unwrap();

  assert_eq!(outcome.failed, 1);
  assert_eq!(outcome.modified, 1);
  assert_eq!(outcome.matched, 2);
  let c = s.get(id(2)).await.unwrap().unwrap();
  assert_eq!(c.str_field("Religion"), Some("rk"));
}

#[tokio::test]
async fn update_returns_document_after() {
  let s = store(vec![doc! { "Vorname": "A" }]);
  let id = s.documents()[0].get_object_id("_id").unwrap();

  let after = s
    .update(soft_delete_update(id, bson::DateTime::now()))
    .await
    .unwrap()
    .unwrap();
  assert!(after.is_deleted());
  assert!(s.update(soft_delete_update(ObjectId::new(), bson::DateTime::now())).await.unwrap().is_none());
}

#[tokio::test]
async fn clear_blank_usernames_only_touches_empty_strings() {
  let s = store(vec![
    doc! { "Benutzername": "" },
    doc! { "Benutzername": "amuster" },
    doc! { "Vorname": "X" },
  ]);
  assert_eq!(s.clear_blank_usernames().await.unwrap(), 1);
  assert_eq!(s.clear_blank_usernames().await.unwrap(), 0);
  assert_eq!(s.documents()[0].get("Benutzername"), Some(&bson::Bson::Null));
}

#[tokio::test]
async fn class_filter_equals_either_field() {
  let cf = ClassFields::default();
  let s = store(vec![
    doc! { "Vorname": "A", "25/26": "3a" },
    doc! { "Vorname": "B", "Klasse 25/26": "3a" },
    doc! { "Vorname": "C", "25/26": "3b" },
  ]);
  let q = StudentQuery { class: ClassFilter::Equals(cf, "3a".into()), ..StudentQuery::default() };
  assert_eq!(s.count(&q).await.unwrap(), 2);
}

// ─── Dedup ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn dedup_merges_anna_muster() {
  let docs = anna_pair();
  let winner = docs[1].get_object_id("_id").unwrap();
  let loser = docs[0].get_object_id("_id").unwrap();
  let s = store(docs);

  let summary = ops::dedup(&s, &cfg()).await.unwrap();
  assert_eq!(summary.candidates, 2);
  assert_eq!(summary.groups, 1);
  assert_eq!(summary.merged_groups, 1);
  assert_eq!(summary.updates, 2);
  assert_eq!(summary.outcome.unwrap().modified, 2);

  let w = s.get(winner).await.unwrap().unwrap();
  let mut offerings: Vec<_> = w
    .get("Angebote")
    .and_then(|b| b.as_array())
    .unwrap()
    .iter()
    .filter_map(|b| b.as_str())
    .collect();
  offerings.sort();
  assert_eq!(offerings, vec!["Chor", "Theater"]);
  assert!(!w.is_deleted());

  let l = s.get(loser).await.unwrap().unwrap();
  assert!(l.is_deleted());
  assert_eq!(l.merged_into(), Some(winner));
}

#[tokio::test]
async fn dedup_twice_is_a_noop() {
  let s = store(anna_pair());
  ops::dedup(&s, &cfg()).await.unwrap();
  let writes = s.writes();

  let summary = ops::dedup(&s, &cfg()).await.unwrap();
  assert_eq!(summary.groups, 0);
  assert!(summary.outcome.is_none());
  assert_eq!(s.writes(), writes);
}

#[tokio::test]
async fn dedup_dry_run_writes_nothing() {
  let mut docs = anna_pair();
  docs.push(doc! { "Vorname": "Ben", "Benutzername": "" });
  let s = store(docs);
  let before = s.documents();

  let summary = ops::dedup(&s, &dry()).await.unwrap();
  assert!(summary.dry_run);
  assert_eq!(summary.merged_groups, 1);
  assert!(summary.blank_usernames.is_none());
  assert!(summary.outcome.is_none());
  assert_eq!(s.writes(), 0);
  assert_eq!(s.documents(), before);
}

#[tokio::test]
async fn dedup_ignores_records_with_normalized_username() {
  let s = store(vec![
    doc! { "Vorname": "Anna", "Familienname": "Muster", "NormBenutzername": "amuster" },
    doc! { "Vorname": "Anna", "Familienname": "Muster", "NormBenutzername": "amuster2" },
  ]);
  let summary = ops::dedup(&s, &cfg()).await.unwrap();
  assert_eq!(summary.candidates, 0);
  assert_eq!(summary.groups, 0);
}

#[tokio::test]
async fn dedup_never_merges_on_class_alone() {
  let s = store(vec![
    doc! { "Vorname": "Anna", "Familienname": "Muster", "25/26": "3a" },
    doc! { "Vorname": "Ben", "Familienname": "Muster", "25/26": "3a" },
    doc! { "Familienname": "Meier", "25/26": "3a" },
    doc! { "Familienname": "Meier", "25/26": "3a" },
  ]);
  let summary = ops::dedup(&s, &cfg()).await.unwrap();
  assert_eq!(summary.groups, 0);
}

// ─── Merge by name ───────────────────────────────────────────────────────────

#[tokio::test]
async fn merge_by_name_ignores_birth_date() {
  let s = store(vec![
    doc! { "Vorname": "Lena", "Familienname": "Huber", "Geburtsdatum": "2013-01-01", "Religion": "rk" },
    doc! { "Vorname": " lena ", "Familienname": "HUBER", "Geburtsdatum": "2013-02-01" },
    doc! { "Vorname": "Lena", "Familienname": "Hubert" },
  ]);

  let summary = ops::merge_by_name(&s, &cfg(), "Lena", "Huber").await.unwrap();
  assert_eq!(summary.found, 2);
  assert_eq!(summary.losers.len(), 1);
  assert_eq!(s.count(&StudentQuery::default()).await.unwrap(), 2);
}

#[tokio::test]
async fn merge_by_name_single_match_is_noop() {
  let s = store(vec![doc! { "Vorname": "Lena", "Familienname": "Huber" }]);
  let summary = ops::merge_by_name(&s, &cfg(), "Lena", "Huber").await.unwrap();
  assert_eq!(summary.found, 1);
  assert!(summary.winner.is_none());
  assert_eq!(s.writes(), 0);
}

// ─── Trash and restore ───────────────────────────────────────────────────────

fn placeholder_classes() -> Vec<Document> {
  vec![
    doc! { "Vorname": "A", "25/26": "A" },
    doc! { "Vorname": "B", "Klasse 25/26": " w " },
    doc! { "Vorname": "C", "25/26": "3a" },
    doc! { "Vorname": "D" },
    doc! { "Vorname": "E", "25/26": "V", "_deleted": true },
  ]
}

#[tokio::test]
async fn trash_by_class_snapshots_and_tombstones() {
  let s = store(placeholder_classes());
  let summary = ops::trash_by_class(&s, &cfg(), &ClassSelector::default()).await.unwrap();

  assert_eq!(summary.candidates, 2 + 1);
  assert_eq!(summary.selected, 2);
  assert_eq!(summary.trashed, 2);
  assert_eq!(summary.reason, "trash-by-class: A,o,V,W,w");
  assert_eq!(s.trash_len(), 2);

  let active = s.find(&StudentQuery::default()).await.unwrap();
  let names: Vec<_> = active.iter().map(|r| r.given_name().unwrap()).collect();
  assert_eq!(names, vec!["C", "D"]);

  let entries = s
    .find_trash(&RestoreQuery::Reason(summary.reason.clone()))
    .await
    .unwrap();
  assert_eq!(entries.len(), 2);
  for entry in &entries {
    let original = s.get(entry.original_id).await.unwrap().unwrap();
    assert!(original.is_deleted());
    assert_eq!(original.get("_trashId"), Some(&bson::Bson::ObjectId(entry.id)));
    assert_eq!(original.str_field("deletedBy"), Some("script:trash-by-class"));
    assert!(!entry.snapshot.contains_key("_deleted"));
  }
}

#[tokio::test]
async fn trash_dry_run_writes_nothing() {
  let s = store(placeholder_classes());
  let summary = ops::trash_by_class(&s, &dry(), &ClassSelector::default()).await.unwrap();
  assert_eq!(summary.selected, 2);
  assert_eq!(summary.trashed, 0);
  assert_eq!(s.trash_len(), 0);
  assert_eq!(s.writes(), 0);
}

#[tokio::test]
async fn trash_then_restore_round_trip() {
  let s = store(placeholder_classes());
  let before = s.count(&StudentQuery::default()).await.unwrap();

  let trashed = ops::trash_by_class(&s, &cfg(), &ClassSelector::default()).await.unwrap();
  assert_eq!(s.count(&StudentQuery::default()).await.unwrap(), before - 2);

  let query = RestoreQuery::Reason(trashed.reason);
  let restored = ops::restore(&s, &query).await.unwrap();
  assert_eq!(restored.entries, 2);
  assert_eq!(restored.outcome.modified, 2);
  assert_eq!(s.count(&StudentQuery::default()).await.unwrap(), before);

  for doc in s.documents() {
    for key in ["deletedAt", "deletedBy", "deletedReason", "_trashId"] {
      assert!(!doc.contains_key(key), "{key} left on {doc}");
    }
  }
  // The ledger keeps its entries.
  assert_eq!(s.trash_len(), 2);

  let again = ops::restore(&s, &query).await.unwrap();
  assert_eq!(again.entries, 2);
  assert_eq!(again.outcome.matched, 2);
  assert_eq!(again.outcome.modified, 0);
}

#[tokio::test]
async fn restore_by_ids_and_missing_original() {
  let s = store(placeholder_classes());
  ops::trash_by_class(&s, &cfg(), &ClassSelector::new(["A"])).await.unwrap();
  ops::trash_by_class(&s, &cfg(), &ClassSelector::new(["w"])).await.unwrap();

  let entries = s
    .find_trash(&RestoreQuery::Reason("trash-by-class: A".into()))
    .await
    .unwrap();
  assert_eq!(entries.len(), 1);

  let query = RestoreQuery::Ids(vec![entries[0].id]);
  let summary = ops::restore(&s, &query).await.unwrap();
  assert_eq!(summary.outcome.modified, 1);
  assert_eq!(s.count(&StudentQuery::default()).await.unwrap(), 3);

  // A hard-deleted original is skipped, not an error.
  let other = s
    .find_trash(&RestoreQuery::Reason("trash-by-class: w".into()))
    .await
    .unwrap();
  assert!(s.purge(other[0].original_id));
  let summary = ops::restore(&s, &RestoreQuery::Ids(vec![other[0].id])).await.unwrap();
  assert_eq!(summary.entries, 1);
  assert_eq!(summary.outcome.matched, 0);
}

#[tokio::test]
async fn restore_with_no_entries() {
  let s = store(placeholder_classes());
  let summary = ops::restore(&s, &RestoreQuery::Reason("nothing".into())).await.unwrap();
  assert_eq!(summary.entries, 0);
  assert_eq!(s.writes(), 0);
}

// ─── Read-only lookups ───────────────────────────────────────────────────────

#[tokio::test]
async fn check_and_similar_read_only() {
  let mut docs = anna_pair();
  docs.push(doc! { "Vorname": "Vincent", "Familienname": "Dür" });
  let s = store(docs);

  let report = ops::check_duplicates(&s, &cfg(), 20).await.unwrap();
  assert_eq!(report.by_name_and_birth_date.len(), 1);
  assert_eq!(report.by_name_and_birth_date[0].count, 2);

  let hits = ops::similar(&s, &cfg(), "Dur", "Vince", 5).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert!(hits[0].given_matches);
  assert_eq!(s.writes(), 0);
}
