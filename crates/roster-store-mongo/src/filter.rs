//! Translation of [`StudentQuery`] and [`RestoreQuery`] into MongoDB filter
//! documents.
//!
//! The translations must select exactly what [`StudentQuery::matches`] and
//! [`RestoreQuery::matches`] select.

use bson::{Bson, Document, doc};
use roster_core::{
  normalize::escape_regex,
  record::fields,
  store::{ClassFilter, StudentQuery},
  trash::RestoreQuery,
};

/// Case-insensitive regex condition.
fn regex(pattern: String) -> Document { doc! { "$regex": pattern, "$options": "i" } }

/// Whole-value, whitespace-tolerant, case-insensitive equality.
fn equals_trimmed(value: &str) -> Document {
  regex(format!(r"^\s*{}\s*$", escape_regex(value.trim())))
}

fn combine(mut clauses: Vec<Document>) -> Document {
  match clauses.len() {
    0 => Document::new(),
    1 => clauses.remove(0),
    _ => doc! { "$and": clauses },
  }
}

pub fn to_filter(query: &StudentQuery) -> Document {
  let mut clauses = Vec::new();

  if !query.include_deleted {
    clauses.push(doc! { fields::DELETED: { "$ne": true } });
  }
  if query.without_username {
    clauses.push(doc! { fields::NORM_USERNAME: { "$not": { "$type": "string" } } });
  }
  if let Some((given, family)) = &query.name {
    clauses.push(doc! {
      fields::GIVEN_NAME:  equals_trimmed(given),
      fields::FAMILY_NAME: equals_trimmed(family),
    });
  }
  for token in &query.text {
    let any: Vec<Document> = query
      .text_fields()
      .iter()
      .map(|field| doc! { *field: regex(escape_regex(token)) })
      .collect();
    clauses.push(doc! { "$or": any });
  }
  match &query.class {
    ClassFilter::Any => {}
    ClassFilter::Present(cf) => clauses.push(doc! {
      "$or": [
        { cf.canonical.as_str(): { "$type": "string" } },
        { cf.display.as_str(): { "$type": "string" } },
      ]
    }),
    ClassFilter::Equals(cf, value) => clauses.push(doc! {
      "$or": [
        { cf.canonical.as_str(): value.as_str() },
        { cf.display.as_str(): value.as_str() },
      ]
    }),
  }
  if let Some(offering) = &query.offering {
    // Against an array, a regex matches when any element matches.
    clauses.push(doc! {
      fields::OFFERINGS: regex(format!("^{}$", escape_regex(offering))),
    });
  }

  combine(clauses)
}

/// `Familienname`, then `Vorname`, ascending.
pub fn sort() -> Document { doc! { fields::FAMILY_NAME: 1, fields::GIVEN_NAME: 1 } }

pub fn to_trash_filter(query: &RestoreQuery) -> Document {
  match query {
    RestoreQuery::Reason(reason) => doc! { "reason": reason.as_str() },
    RestoreQuery::Ids(ids) => {
      let ids: Vec<Bson> = ids.iter().copied().map(Bson::ObjectId).collect();
      doc! { "_id": { "$in": ids } }
    }
  }
}
