//! Document repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide revision-checked write APIs over the `documents` table.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Document ids are opaque; any string is a valid key.
//! - Revision check and write run in one `BEGIN IMMEDIATE` transaction.
//! - Every successful write stores a fresh revision token.
//! - Listing reads never return tombstoned rows.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::document::{Document, DocumentId};
use crate::model::revision::Revision;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

const DOCUMENT_SELECT_SQL: &str = "SELECT
    id,
    rev,
    rev_generation,
    type,
    title,
    created,
    deleted
FROM documents";

const DOCUMENT_COLUMNS: &[&str] = &[
    "id",
    "rev",
    "rev_generation",
    "type",
    "title",
    "created",
    "deleted",
    "updated_at",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Why a write was rejected as a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Insert-if-absent found a stored document with the same id.
    AlreadyExists,
    /// Strict upsert on an existing id without a base revision.
    MissingRevision { current: Revision },
    /// The supplied base revision is not the stored one.
    StaleRevision {
        supplied: Revision,
        current: Revision,
    },
}

impl Display for ConflictReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyExists => write!(f, "document already exists"),
            Self::MissingRevision { current } => {
                write!(f, "no base revision supplied, current is {current}")
            }
            Self::StaleRevision { supplied, current } => {
                write!(f, "stale revision {supplied}, current is {current}")
            }
        }
    }
}

/// How an upsert treats an existing document when no base revision is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Existing documents can only be overwritten from their current revision.
    #[default]
    RequireRevision,
    /// A missing base revision overwrites whatever is stored.
    LastWriteWins,
}

/// Repository error for document persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(DocumentId),
    Conflict {
        id: DocumentId,
        reason: ConflictReason,
    },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "document not found: {id}"),
            Self::Conflict { id, reason } => write!(f, "document conflict on {id}: {reason}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "document repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "document repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "document repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted document data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::Conflict { .. } => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for document operations.
pub trait DocumentRepository {
    /// Stores `doc` at a fresh lineage unless the id is already taken.
    fn insert_if_absent(&self, doc: &Document) -> RepoResult<Document>;
    /// Inserts or overwrites `doc`, checking its base revision.
    fn upsert(&self, doc: &Document, policy: WritePolicy) -> RepoResult<Document>;
    /// Loads one document, tombstoned or not.
    fn get_document(&self, id: &str) -> RepoResult<Option<Document>>;
    /// Lists live documents of one type.
    fn list_by_type(&self, doc_type: &str) -> RepoResult<Vec<Document>>;
    /// Lists every stored document including tombstones, ordered by id.
    fn list_all(&self) -> RepoResult<Vec<Document>>;
    /// Counts live documents of one type.
    fn count_live_by_type(&self, doc_type: &str) -> RepoResult<u64>;
    /// Tombstones a document through the revision-checked write path.
    fn soft_delete(&self, id: &str) -> RepoResult<Document>;
    /// Purges a document and its revision history.
    fn hard_delete(&self, id: &str) -> RepoResult<()>;
}

/// SQLite-backed document repository.
pub struct SqliteDocumentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDocumentRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_document_connection_ready(conn)?;
        Ok(Self::from_ready_connection(conn))
    }

    /// Wraps a connection that already passed
    /// [`ensure_document_connection_ready`].
    pub(crate) fn from_ready_connection(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DocumentRepository for SqliteDocumentRepository<'_> {
    fn insert_if_absent(&self, doc: &Document) -> RepoResult<Document> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if load_revision(&tx, &doc.id)?.is_some() {
            return Err(RepoError::Conflict {
                id: doc.id.clone(),
                reason: ConflictReason::AlreadyExists,
            });
        }

        let stored = insert_row(&tx, doc, Revision::initial())?;
        tx.commit()?;
        Ok(stored)
    }

    fn upsert(&self, doc: &Document, policy: WritePolicy) -> RepoResult<Document> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let stored = write_checked(&tx, doc, policy)?;
        tx.commit()?;
        Ok(stored)
    }

    fn get_document(&self, id: &str) -> RepoResult<Option<Document>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DOCUMENT_SELECT_SQL} WHERE id = ?1;"))?;

        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_document_row(row)?));
        }

        Ok(None)
    }

    fn list_by_type(&self, doc_type: &str) -> RepoResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DOCUMENT_SELECT_SQL}
             WHERE type = ?1
               AND deleted = 0
             ORDER BY created ASC, id ASC;"
        ))?;

        let mut rows = stmt.query([doc_type])?;
        let mut docs = Vec::new();
        while let Some(row) = rows.next()? {
            docs.push(parse_document_row(row)?);
        }

        Ok(docs)
    }

    fn list_all(&self) -> RepoResult<Vec<Document>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DOCUMENT_SELECT_SQL} ORDER BY id ASC;"))?;

        let mut rows = stmt.query([])?;
        let mut docs = Vec::new();
        while let Some(row) = rows.next()? {
            docs.push(parse_document_row(row)?);
        }

        Ok(docs)
    }

    fn count_live_by_type(&self, doc_type: &str) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE type = ?1 AND deleted = 0;",
            [doc_type],
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count `{count}`")))
    }

    fn soft_delete(&self, id: &str) -> RepoResult<Document> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut doc =
            load_document(&tx, id)?.ok_or_else(|| RepoError::NotFound(id.to_string()))?;

        doc.soft_delete();
        let stored = write_checked(&tx, &doc, WritePolicy::RequireRevision)?;
        tx.commit()?;
        Ok(stored)
    }

    fn hard_delete(&self, id: &str) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM documents WHERE id = ?1;", [id])?;

        if changed == 0 {
            return Err(RepoError::NotFound(id.to_string()));
        }

        Ok(())
    }
}

fn write_checked(
    tx: &Transaction<'_>,
    doc: &Document,
    policy: WritePolicy,
) -> RepoResult<Document> {
    let Some(current) = load_revision(tx, &doc.id)? else {
        return insert_row(tx, doc, Revision::initial());
    };

    match (&doc.revision, policy) {
        (Some(supplied), _) if *supplied == current => {}
        (Some(supplied), _) => {
            return Err(RepoError::Conflict {
                id: doc.id.clone(),
                reason: ConflictReason::StaleRevision {
                    supplied: supplied.clone(),
                    current,
                },
            });
        }
        (None, WritePolicy::LastWriteWins) => {}
        (None, WritePolicy::RequireRevision) => {
            return Err(RepoError::Conflict {
                id: doc.id.clone(),
                reason: ConflictReason::MissingRevision { current },
            });
        }
    }

    let next = current.next();
    let changed = tx.execute(
        "UPDATE documents
         SET
            rev = ?2,
            rev_generation = ?3,
            type = ?4,
            title = ?5,
            created = ?6,
            deleted = ?7,
            updated_at = (strftime('%s', 'now') * 1000)
         WHERE id = ?1
           AND rev = ?8;",
        params![
            doc.id.as_str(),
            next.to_string(),
            generation_to_db(&next)?,
            doc.doc_type.as_str(),
            doc.title.as_str(),
            doc.created.as_str(),
            bool_to_int(doc.deleted),
            current.to_string(),
        ],
    )?;

    if changed == 0 {
        // Unreachable while the immediate transaction holds the write lock.
        return Err(RepoError::InvalidData(format!(
            "revision of `{}` moved during a locked write",
            doc.id
        )));
    }

    Ok(stored_copy(doc, next))
}

fn insert_row(tx: &Transaction<'_>, doc: &Document, revision: Revision) -> RepoResult<Document> {
    tx.execute(
        "INSERT INTO documents (
            id,
            rev,
            rev_generation,
            type,
            title,
            created,
            deleted
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            doc.id.as_str(),
            revision.to_string(),
            generation_to_db(&revision)?,
            doc.doc_type.as_str(),
            doc.title.as_str(),
            doc.created.as_str(),
            bool_to_int(doc.deleted),
        ],
    )?;

    Ok(stored_copy(doc, revision))
}

fn stored_copy(doc: &Document, revision: Revision) -> Document {
    Document {
        revision: Some(revision),
        ..doc.clone()
    }
}

fn load_revision(tx: &Transaction<'_>, id: &str) -> RepoResult<Option<Revision>> {
    let rev_text: Option<String> = tx
        .query_row("SELECT rev FROM documents WHERE id = ?1;", [id], |row| {
            row.get(0)
        })
        .optional()?;

    rev_text.map(|text| parse_revision(&text)).transpose()
}

fn load_document(tx: &Transaction<'_>, id: &str) -> RepoResult<Option<Document>> {
    let mut stmt = tx.prepare(&format!("{DOCUMENT_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_document_row(row)?));
    }
    Ok(None)
}

fn parse_document_row(row: &Row<'_>) -> RepoResult<Document> {
    let id: String = row.get("id")?;
    let rev_text: String = row.get("rev")?;
    let revision = parse_revision(&rev_text)?;

    let generation: i64 = row.get("rev_generation")?;
    if u64::try_from(generation).ok() != Some(revision.generation()) {
        return Err(RepoError::InvalidData(format!(
            "rev_generation `{generation}` disagrees with rev `{rev_text}` for `{id}`"
        )));
    }

    let deleted = match row.get::<_, i64>("deleted")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid deleted value `{other}` in documents.deleted"
            )));
        }
    };

    Ok(Document {
        id,
        revision: Some(revision),
        doc_type: row.get("type")?,
        title: row.get("title")?,
        created: row.get("created")?,
        deleted,
    })
}

fn parse_revision(value: &str) -> RepoResult<Revision> {
    value.parse().map_err(|_| {
        RepoError::InvalidData(format!("invalid revision `{value}` in documents.rev"))
    })
}

fn generation_to_db(revision: &Revision) -> RepoResult<i64> {
    i64::try_from(revision.generation()).map_err(|_| {
        RepoError::InvalidData(format!("revision generation overflow at {revision}"))
    })
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

/// Checks that `conn` carries the migrated `documents` schema.
///
/// Runs once per connection; the store calls it when (re)opening.
pub fn ensure_document_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "documents")? {
        return Err(RepoError::MissingRequiredTable("documents"));
    }

    for &column in DOCUMENT_COLUMNS {
        if !table_has_column(conn, "documents", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "documents",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
