//! Look up records whose names resemble a name from an external list.
//!
//! Used to chase down rows of an import that did not match anything exactly.
//! A record is a hit when its folded family name contains the first four
//! characters of the folded query family name.

use bson::oid::ObjectId;
use serde::Serialize;

use crate::{
  normalize::{NameKey, comparison_key, prefix},
  record::{ClassFields, StudentRecord},
};

pub const DEFAULT_LIMIT: usize = 5;

const FAMILY_PREFIX: usize = 4;
const GIVEN_PREFIX: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarHit {
  pub id:            ObjectId,
  pub family:        String,
  pub given:         String,
  pub class:         Option<String>,
  /// The given name matches too, not only the family name.
  pub given_matches: bool,
}

pub fn similar_names<'a, I>(
  records: I,
  family: &str,
  given: &str,
  class_fields: &ClassFields,
  limit: usize,
) -> Vec<SimilarHit>
where
  I: IntoIterator<Item = &'a StudentRecord>,
{
  let query = NameKey::new(family, given);
  let family_prefix = prefix(&query.family, FAMILY_PREFIX).to_owned();
  let given_prefix = prefix(&query.given, GIVEN_PREFIX).to_owned();
  if family_prefix.is_empty() {
    return Vec::new();
  }

  records
    .into_iter()
    .filter(|r| !r.is_deleted())
    .filter_map(|r| {
      let family = r.family_name().unwrap_or_default();
      let given = r.given_name().unwrap_or_default();
      if !comparison_key(family).contains(&family_prefix) {
        return None;
      }
      let candidate = NameKey::new(family, given);
      let given_matches = query.matches(&candidate)
        || (!given_prefix.is_empty() && candidate.given.starts_with(&given_prefix));
      Some(SimilarHit {
        id: r.id(),
        family: family.to_owned(),
        given: given.to_owned(),
        class: r.str_field(&class_fields.display).map(str::to_owned),
        given_matches,
      })
    })
    .take(limit)
    .collect()
}

#[cfg(test)]
mod tests {
  use bson::doc;

  use super::*;

  fn record(doc: bson::Document) -> StudentRecord {
    let mut doc = doc;
    doc.insert("_id", ObjectId::new());
    StudentRecord::from_document(doc).unwrap()
  }

  #[test]
  fn diacritics_do_not_hide_a_match() {
    let records = vec![
      record(doc! { "Familienname": "Dur", "Vorname": "Vincent", "Klasse 25/26": "4b" }),
      record(doc! { "Familienname": "Yildirim", "Vorname": "Omer" }),
    ];
    let fields = ClassFields::default();

    let hits = similar_names(&records, "Dür", "Vincent", &fields, DEFAULT_LIMIT);
    assert_eq!(hits.len(), 1);
    assert!(hits[0].given_matches);
    assert_eq!(hits[0].class.as_deref(), Some("4b"));

    let hits = similar_names(&records, "Yıldırım", "Ömer", &fields, DEFAULT_LIMIT);
    assert_eq!(hits.len(), 1);
    assert!(hits[0].given_matches);
  }

  #[test]
  fn family_prefix_hits_without_given_match() {
    let records = vec![
      record(doc! { "Familienname": "Steinberger", "Vorname": "Lena" }),
      record(doc! { "Familienname": "Steinbach", "Vorname": "Milan" }),
      record(doc! { "Familienname": "Stein", "Vorname": "Mila", "_deleted": true }),
    ];
    let hits = similar_names(&records, "Steinberger", "Milan", &ClassFields::default(), 5);
    assert_eq!(hits.len(), 2);
    assert!(!hits[0].given_matches);
    assert!(hits[1].given_matches);
  }

  #[test]
  fn limit_applies() {
    let records: Vec<_> = (0..8)
      .map(|_| record(doc! { "Familienname": "Chen", "Vorname": "Xin" }))
      .collect();
    assert_eq!(similar_names(&records, "Chen", "Xin", &ClassFields::default(), 5).len(), 5);
    assert!(similar_names(&records, "", "Xin", &ClassFields::default(), 5).is_empty());
  }
}
