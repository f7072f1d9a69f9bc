//! Read-only duplicate check.
//!
//! Four independent views on the active records, each listing the keys shared
//! by more than one record:
//!
//! 1. normalised username,
//! 2. trimmed, lowercased username,
//! 3. name plus the first ten characters of the birth date,
//! 4. name plus canonical class.
//!
//! Views 3 and 4 only consider records without a normalised username, the
//! same population the dedup run works on.

use std::{collections::BTreeMap, fmt};

use bson::{Bson, oid::ObjectId};
use serde::Serialize;

use crate::{
  normalize::{casefold, prefix},
  record::{ClassFields, StudentRecord, fields},
};

pub const DEFAULT_LIMIT: usize = 20;

/// One key shared by several records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportGroup {
  pub key:   String,
  pub count: usize,
  pub ids:   Vec<ObjectId>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateReport {
  pub by_norm_username:       Vec<ReportGroup>,
  pub by_username:            Vec<ReportGroup>,
  pub by_name_and_birth_date: Vec<ReportGroup>,
  pub by_name_and_class:      Vec<ReportGroup>,
}

impl DuplicateReport {
  pub fn is_clean(&self) -> bool {
    self.by_norm_username.is_empty()
      && self.by_username.is_empty()
      && self.by_name_and_birth_date.is_empty()
      && self.by_name_and_class.is_empty()
  }
}

fn collect<'a, F>(records: &'a [StudentRecord], limit: usize, key_of: F) -> Vec<ReportGroup>
where
  F: Fn(&'a StudentRecord) -> Option<String>,
{
  let mut buckets: BTreeMap<String, Vec<ObjectId>> = BTreeMap::new();
  for record in records.iter().filter(|r| !r.is_deleted()) {
    if let Some(key) = key_of(record) {
      buckets.entry(key).or_default().push(record.id());
    }
  }

  let mut groups: Vec<ReportGroup> = buckets
    .into_iter()
    .filter(|(_, ids)| ids.len() > 1)
    .map(|(key, ids)| ReportGroup { key, count: ids.len(), ids })
    .collect();
  // BTreeMap iteration already ordered the keys; a stable sort keeps that
  // order among equal counts.
  groups.sort_by(|a, b| b.count.cmp(&a.count));
  groups.truncate(limit);
  groups
}

/// `family|given`, or `None` when either name is empty.
fn name_key(record: &StudentRecord) -> Option<String> {
  let given = casefold(record.given_name().unwrap_or_default());
  let family = casefold(record.family_name().unwrap_or_default());
  if given.is_empty() || family.is_empty() {
    return None;
  }
  Some(format!("{family}|{given}"))
}

fn birth_date_prefix(record: &StudentRecord) -> String {
  match record.get(fields::BIRTH_DATE) {
    Some(Bson::String(s)) => prefix(s, 10).to_owned(),
    Some(Bson::DateTime(dt)) => dt.to_chrono().format("%Y-%m-%d").to_string(),
    _ => String::new(),
  }
}

/// Build the report from a set of records. Deleted records are ignored.
pub fn build_report(
  records: &[StudentRecord],
  class_fields: &ClassFields,
  limit: usize,
) -> DuplicateReport {
  let unassigned = |r: &StudentRecord| r.normalized_username().is_none();

  DuplicateReport {
    by_norm_username:       collect(records, limit, |r| {
      r.normalized_username().map(str::to_owned)
    }),
    by_username:            collect(records, limit, |r| r.username().map(casefold)),
    by_name_and_birth_date: collect(records, limit, |r| {
      let name = name_key(r).filter(|_| unassigned(r))?;
      Some(format!("{name}|{}", birth_date_prefix(r)))
    }),
    by_name_and_class:      collect(records, limit, |r| {
      let name = name_key(r).filter(|_| unassigned(r))?;
      let class = r.str_field(&class_fields.canonical).map(casefold).unwrap_or_default();
      Some(format!("{name}|{class}"))
    }),
  }
}

fn write_section(f: &mut fmt::Formatter<'_>, title: &str, groups: &[ReportGroup]) -> fmt::Result {
  writeln!(f, "{title}: {} groups", groups.len())?;
  for group in groups {
    writeln!(f, "  - {} x {}", group.key, group.count)?;
  }
  Ok(())
}

impl fmt::Display for DuplicateReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write_section(f, "1) NormBenutzername", &self.by_norm_username)?;
    write_section(f, "2) Benutzername", &self.by_username)?;
    write_section(f, "3) name + birth date", &self.by_name_and_birth_date)?;
    write_section(f, "4) name + class", &self.by_name_and_class)
  }
}
