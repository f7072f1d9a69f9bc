//! [`MongoStore`]: the MongoDB implementation of [`StudentStore`].

use bson::{Bson, Document, doc, oid::ObjectId};
use futures::TryStreamExt as _;
use mongodb::{
  Client, Collection, Database, IndexModel,
  options::{IndexOptions, ReturnDocument},
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use roster_core::{
  record::{StudentRecord, fields},
  store::{StudentQuery, StudentStore},
  trash::{RestoreQuery, TrashEntry},
  update::{BulkOutcome, UpdateOp},
};

use crate::{
  Error, Result,
  filter::{sort, to_filter, to_trash_filter},
};

pub const STUDENTS: &str = "students";
pub const TRASH: &str = "students_trash";

/// Used when neither the settings nor the connection string name a database.
pub const DEFAULT_DATABASE: &str = "gesamtliste";

/// Statements per `update` command.
const UPDATE_BATCH: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct MongoSettings {
  pub uri:      String,
  /// Overrides the database named in `uri`.
  #[serde(default)]
  pub database: Option<String>,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A student store backed by a MongoDB database.
///
/// Cloning is cheap; the driver client is reference-counted.
#[derive(Clone)]
pub struct MongoStore {
  db:       Database,
  students: Collection<Document>,
  trash:    Collection<TrashEntry>,
}

impl MongoStore {
  /// Connect and check that the server answers.
  pub async fn connect(settings: &MongoSettings) -> Result<Self> {
    let client = Client::with_uri_str(&settings.uri).await?;
    let db = match &settings.database {
      Some(name) => client.database(name),
      None => client
        .default_database()
        .unwrap_or_else(|| client.database(DEFAULT_DATABASE)),
    };
    db.run_command(doc! { "ping": 1 }).await?;
    info!(database = db.name(), "connected to MongoDB");
    Ok(Self::from_database(db))
  }

  pub fn from_database(db: Database) -> Self {
    Self {
      students: db.collection(STUDENTS),
      trash: db.collection(TRASH),
      db,
    }
  }

  /// Create the indexes the store relies on. Safe to call repeatedly.
  ///
  /// The unique index on `NormBenutzername` only covers string values, so
  /// any number of records may lack one.
  pub async fn ensure_indexes(&self) -> Result<()> {
    let unique_norm = IndexModel::builder()
      .keys(doc! { fields::NORM_USERNAME: 1 })
      .options(
        IndexOptions::builder()
          .name("uniq_NormBenutzername".to_owned())
          .unique(true)
          .partial_filter_expression(doc! { fields::NORM_USERNAME: { "$type": "string" } })
          .build(),
      )
      .build();
    let username = IndexModel::builder()
      .keys(doc! { fields::USERNAME: 1 })
      .options(IndexOptions::builder().name("idx_Benutzername".to_owned()).build())
      .build();

    self.students.create_indexes([unique_norm, username]).await?;
    info!("student indexes ensured");
    Ok(())
  }

  /// Submit one unordered `update` command.
  async fn run_update_batch(&self, ops: &[UpdateOp]) -> Result<BulkOutcome> {
    let statements: Vec<Document> = ops
      .iter()
      .map(|op| doc! { "q": op.filter(), "u": op.to_update_document() })
      .collect();
    let reply = self
      .db
      .run_command(doc! {
        "update":  STUDENTS,
        "updates": statements,
        "ordered": false,
      })
      .await?;

    let write_errors = match reply.get("writeErrors") {
      Some(Bson::Array(errors)) => errors.len() as u64,
      _ => 0,
    };
    if write_errors > 0 {
      warn!(write_errors, "update batch had rejected statements");
    }
    Ok(BulkOutcome {
      matched:  reply_count(&reply, "n")?,
      modified: reply_count(&reply, "nModified")?,
      failed:   write_errors,
    })
  }
}

fn reply_count(reply: &Document, key: &str) -> Result<u64> {
  match reply.get(key) {
    Some(Bson::Int32(n)) => Ok(u64::try_from(*n).unwrap_or_default()),
    Some(Bson::Int64(n)) => Ok(u64::try_from(*n).unwrap_or_default()),
    Some(Bson::Double(n)) => Ok(*n as u64),
    _ => Err(Error::Reply(format!("missing {key:?} in update reply"))),
  }
}

// ─── StudentStore impl ───────────────────────────────────────────────────────

impl StudentStore for MongoStore {
  type Error = Error;

  async fn find(&self, query: &StudentQuery) -> Result<Vec<StudentRecord>> {
    let filter = to_filter(query);
    debug!(%filter, "find students");

    let mut find = self.students.find(filter).sort(sort());
    if let Some(skip) = query.skip {
      find = find.skip(skip as u64);
    }
    if let Some(limit) = query.limit {
      find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    let docs: Vec<Document> = find.await?.try_collect().await?;

    docs
      .into_iter()
      .map(|d| StudentRecord::from_document(d).map_err(Error::from))
      .collect()
  }

  async fn count(&self, query: &StudentQuery) -> Result<u64> {
    Ok(self.students.count_documents(to_filter(query)).await?)
  }

  async fn get(&self, id: ObjectId) -> Result<Option<StudentRecord>> {
    let doc = self.students.find_one(doc! { fields::ID: id }).await?;
    Ok(doc.map(StudentRecord::from_document).transpose()?)
  }

  async fn insert(&self, mut doc: Document) -> Result<StudentRecord> {
    if !matches!(doc.get(fields::ID), Some(Bson::ObjectId(_))) {
      doc.insert(fields::ID, ObjectId::new());
    }
    self.students.insert_one(&doc).await?;
    Ok(StudentRecord::from_document(doc)?)
  }

  async fn update(&self, op: UpdateOp) -> Result<Option<StudentRecord>> {
    if op.is_noop() {
      return self.get(op.id).await;
    }
    let doc = self
      .students
      .find_one_and_update(op.filter(), op.to_update_document())
      .return_document(ReturnDocument::After)
      .await?;
    Ok(doc.map(StudentRecord::from_document).transpose()?)
  }

  async fn apply_updates(&self, ops: Vec<UpdateOp>) -> Result<BulkOutcome> {
    // An empty update document would be sent as a replacement.
    let ops: Vec<UpdateOp> = ops.into_iter().filter(|op| !op.is_noop()).collect();
    let mut outcome = BulkOutcome::default();
    for chunk in ops.chunks(UPDATE_BATCH) {
      outcome += self.run_update_batch(chunk).await?;
    }
    debug!(?outcome, statements = ops.len(), "bulk update done");
    Ok(outcome)
  }

  async fn clear_blank_usernames(&self) -> Result<u64> {
    let result = self
      .students
      .update_many(
        doc! { fields::USERNAME: "" },
        doc! { "$set": { fields::USERNAME: Bson::Null } },
      )
      .await?;
    Ok(result.modified_count)
  }

  async fn insert_trash(&self, entries: Vec<TrashEntry>) -> Result<u64> {
    if entries.is_empty() {
      return Ok(0);
    }
    let result = self.trash.insert_many(entries).ordered(false).await?;
    Ok(result.inserted_ids.len() as u64)
  }

  async fn find_trash(&self, query: &RestoreQuery) -> Result<Vec<TrashEntry>> {
    let entries = self
      .trash
      .find(to_trash_filter(query))
      .sort(doc! { "trashedAt": 1 })
      .await?
      .try_collect::<Vec<_>>()
      .await?;
    Ok(entries)
  }
}
