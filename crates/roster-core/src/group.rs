//! Candidate grouping: which records look like the same student.
//!
//! Records are bucketed by a cascading key. The first applicable rule wins:
//!
//! 1. `dob|family|given|YYYY-MM-DD` when a birth date is present,
//! 2. `cls|family|given|class` when a class is present,
//! 3. `name|family|given` otherwise.
//!
//! Records missing either name are never grouped, so two records are never
//! merged on a shared class or birth date alone.

use std::{collections::BTreeMap, fmt};

use bson::Bson;

use crate::{
  normalize::{casefold, short_date},
  record::{ClassFields, StudentRecord, fields},
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
  Dob { family: String, given: String, date: String },
  Class { family: String, given: String, class: String },
  Name { family: String, given: String },
}

impl fmt::Display for GroupKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Dob { family, given, date } => write!(f, "dob|{family}|{given}|{date}"),
      Self::Class { family, given, class } => write!(f, "cls|{family}|{given}|{class}"),
      Self::Name { family, given } => write!(f, "name|{family}|{given}"),
    }
  }
}

/// The `YYYY-MM-DD` birth date of a record, from either a string or a BSON
/// datetime.
pub fn birth_date_key(record: &StudentRecord) -> Option<String> {
  match record.get(fields::BIRTH_DATE)? {
    Bson::String(s) => short_date(s).map(str::to_owned),
    Bson::DateTime(dt) => Some(dt.to_chrono().format("%Y-%m-%d").to_string()),
    _ => None,
  }
}

pub fn group_key(record: &StudentRecord, class_fields: &ClassFields) -> Option<GroupKey> {
  let given = casefold(record.given_name().unwrap_or_default());
  let family = casefold(record.family_name().unwrap_or_default());
  if given.is_empty() || family.is_empty() {
    return None;
  }

  if let Some(date) = birth_date_key(record) {
    return Some(GroupKey::Dob { family, given, date });
  }
  if let Some(class) = record.class(class_fields) {
    return Some(GroupKey::Class { family, given, class: casefold(class) });
  }
  Some(GroupKey::Name { family, given })
}

/// A set of records that share a [`GroupKey`]; always two or more members.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
  pub key:     GroupKey,
  pub members: Vec<StudentRecord>,
}

/// Bucket dedup candidates by [`group_key`], dropping singletons.
///
/// Deleted records and records that already carry a normalised username are
/// skipped even if the caller passes them in. Groups come back ordered by key.
pub fn group_candidates<I>(records: I, class_fields: &ClassFields) -> Vec<DuplicateGroup>
where
  I: IntoIterator<Item = StudentRecord>,
{
  let mut buckets: BTreeMap<GroupKey, Vec<StudentRecord>> = BTreeMap::new();
  for record in records {
    if record.is_deleted() || record.normalized_username().is_some() {
      continue;
    }
    if let Some(key) = group_key(&record, class_fields) {
      buckets.entry(key).or_default().push(record);
    }
  }

  buckets
    .into_iter()
    .filter(|(_, members)| members.len() > 1)
    .map(|(key, members)| DuplicateGroup { key, members })
    .collect()
}
