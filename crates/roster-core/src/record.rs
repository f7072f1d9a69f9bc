//! The student record and the handful of fields the reconciliation logic
//! gives meaning to.
//!
//! A student document has no fixed schema: fields are added and renamed as the
//! school-year model moves on (`Klasse 25/26`, `Stufe 26/27`, ...). The record
//! therefore keeps the raw [`Document`] and only offers typed accessors for the
//! fields listed in [`fields`].

use std::fmt;

use bson::{Bson, Document, oid::ObjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Field names ─────────────────────────────────────────────────────────────

/// Document keys with semantic meaning.
pub mod fields {
  pub const ID: &str = "_id";
  pub const GIVEN_NAME: &str = "Vorname";
  pub const FAMILY_NAME: &str = "Familienname";
  pub const BIRTH_DATE: &str = "Geburtsdatum";
  pub const USERNAME: &str = "Benutzername";
  pub const NORM_USERNAME: &str = "NormBenutzername";
  pub const PASSWORD: &str = "Passwort";
  pub const OFFERINGS: &str = "Angebote";

  pub const CREATED_AT: &str = "createdAt";
  pub const UPDATED_AT: &str = "updatedAt";
  pub const IMPORT_STAMP: &str = "ImportStamp";

  pub const DELETED: &str = "_deleted";
  pub const DELETED_AT: &str = "deletedAt";
  pub const DELETED_BY: &str = "deletedBy";
  pub const DELETED_REASON: &str = "deletedReason";
  pub const TRASH_ID: &str = "_trashId";

  pub const MERGED_INTO: &str = "mergedInto";
  pub const DEDUP_AT: &str = "dedupAt";
}

/// Fields that describe the record's bookkeeping rather than the student.
/// They never count towards a record's score and are never merged.
pub const BOOKKEEPING: &[&str] = &[
  fields::ID,
  fields::CREATED_AT,
  fields::UPDATED_AT,
  fields::NORM_USERNAME,
  fields::DELETED,
  fields::MERGED_INTO,
  fields::DEDUP_AT,
  fields::DELETED_AT,
  fields::DELETED_BY,
  fields::DELETED_REASON,
  fields::TRASH_ID,
  fields::IMPORT_STAMP,
];

pub fn is_bookkeeping(key: &str) -> bool { BOOKKEEPING.contains(&key) }

/// `true` for missing values, `null`, blank strings and empty arrays.
pub fn is_empty(value: Option<&Bson>) -> bool {
  match value {
    None | Some(Bson::Null) | Some(Bson::Undefined) => true,
    Some(Bson::String(s)) => s.trim().is_empty(),
    Some(Bson::Array(a)) => a.is_empty(),
    Some(_) => false,
  }
}

/// Read a timestamp stored either as a BSON datetime (scripts) or as an
/// RFC 3339 string (the API).
pub fn timestamp(value: &Bson) -> Option<DateTime<Utc>> {
  match value {
    Bson::DateTime(dt) => Some(dt.to_chrono()),
    Bson::String(s) => DateTime::parse_from_rfc3339(s.trim())
      .ok()
      .map(|dt| dt.with_timezone(&Utc)),
    _ => None,
  }
}

// ─── School year ─────────────────────────────────────────────────────────────

/// The active school year, e.g. `"25/26"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchoolYear(String);

impl SchoolYear {
  pub fn new(year: impl Into<String>) -> Self { Self(year.into()) }

  pub fn as_str(&self) -> &str { &self.0 }

  pub fn class_fields(&self) -> ClassFields {
    ClassFields {
      canonical: self.0.clone(),
      display:   format!("Klasse {}", self.0),
    }
  }
}

impl Default for SchoolYear {
  fn default() -> Self { Self::new("25/26") }
}

impl fmt::Display for SchoolYear {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// The two parallel class attributes of one school year.
///
/// `display` is what the UI edits; `canonical` is what imports and exports
/// read. When they disagree the display value is trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFields {
  pub canonical: String,
  pub display:   String,
}

impl Default for ClassFields {
  fn default() -> Self { SchoolYear::default().class_fields() }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// A student document with a guaranteed `ObjectId` identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentRecord {
  id:  ObjectId,
  doc: Document,
}

impl StudentRecord {
  pub fn from_document(doc: Document) -> Result<Self> {
    let id = doc.get_object_id(fields::ID).map_err(|_| Error::MissingId)?;
    Ok(Self { id, doc })
  }

  pub fn id(&self) -> ObjectId { self.id }

  pub fn document(&self) -> &Document { &self.doc }

  pub fn into_document(self) -> Document { self.doc }

  pub fn get(&self, key: &str) -> Option<&Bson> { self.doc.get(key) }

  /// The raw string value of `key`, if it holds a string.
  pub fn str_field(&self, key: &str) -> Option<&str> {
    match self.doc.get(key) {
      Some(Bson::String(s)) => Some(s.as_str()),
      _ => None,
    }
  }

  pub fn given_name(&self) -> Option<&str> { self.str_field(fields::GIVEN_NAME) }

  pub fn family_name(&self) -> Option<&str> { self.str_field(fields::FAMILY_NAME) }

  pub fn birth_date(&self) -> Option<&str> { self.str_field(fields::BIRTH_DATE) }

  pub fn username(&self) -> Option<&str> { self.str_field(fields::USERNAME) }

  pub fn normalized_username(&self) -> Option<&str> {
    self.str_field(fields::NORM_USERNAME)
  }

  pub fn updated_at(&self) -> Option<DateTime<Utc>> {
    self.doc.get(fields::UPDATED_AT).and_then(timestamp)
  }

  pub fn is_deleted(&self) -> bool {
    matches!(self.doc.get(fields::DELETED), Some(Bson::Boolean(true)))
  }

  pub fn merged_into(&self) -> Option<ObjectId> {
    self.doc.get_object_id(fields::MERGED_INTO).ok()
  }

  /// The record's class for the given year: the trimmed canonical value, or
  /// the trimmed display value when the canonical one is blank.
  pub fn class(&self, class_fields: &ClassFields) -> Option<&str> {
    [&class_fields.canonical, &class_fields.display]
      .into_iter()
      .filter_map(|key| self.str_field(key))
      .map(str::trim)
      .find(|v| !v.is_empty())
  }

  /// Render as relaxed extended JSON (`{"$oid": ...}` ids, ISO dates).
  pub fn to_json(&self) -> serde_json::Value {
    Bson::Document(self.doc.clone()).into_relaxed_extjson()
  }
}

impl TryFrom<Document> for StudentRecord {
  type Error = Error;

  fn try_from(doc: Document) -> Result<Self> { Self::from_document(doc) }
}
