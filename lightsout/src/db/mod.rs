use crate::error::{CatalogError, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// The document database: one SQLite connection holding every collection as
/// JSON documents keyed by `(collection, id)`.
pub struct DocumentDb {
    conn: Mutex<Connection>,
}

impl DocumentDb {
    /// Open or create the document database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory document database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        initialize_tables(&conn)?;
        Ok(DocumentDb {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CatalogError::Other("document database lock poisoned".into()))
    }

    /// Run `f` against the index outside of any explicit transaction.
    pub fn read<T>(&self, f: impl FnOnce(&DocumentIndex<'_>) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&DocumentIndex { conn: &conn })
    }

    /// Run `f` inside a single transaction. The connection stays locked until
    /// commit, so a check made inside `f` still holds when its write lands.
    /// Returning an error rolls back every write made by `f`.
    pub fn transaction<T>(&self, f: impl FnOnce(&DocumentIndex<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let out = f(&DocumentIndex { conn: &tx })?;
        tx.commit()?;
        Ok(out)
    }
}

fn initialize_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT NOT NULL,
            collection TEXT NOT NULL,
            data_json TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        );

        CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
        ",
    )?;
    Ok(())
}

/// Query surface over a locked connection or an open transaction.
pub struct DocumentIndex<'c> {
    conn: &'c Connection,
}

impl<'c> DocumentIndex<'c> {
    /// Insert a new document. Fails if the id is already taken in the collection.
    pub fn insert_document(
        &self,
        collection: &str,
        id: &str,
        data: &serde_json::Value,
    ) -> Result<()> {
        let data_json = serde_json::to_string(data)?;
        self.conn.execute(
            "INSERT INTO documents (id, collection, data_json) VALUES (?1, ?2, ?3)",
            params![id, collection, data_json],
        )?;
        Ok(())
    }

    /// Replace the data of an existing document. Returns false if no such document.
    pub fn replace_document(
        &self,
        collection: &str,
        id: &str,
        data: &serde_json::Value,
    ) -> Result<bool> {
        let data_json = serde_json::to_string(data)?;
        let changed = self.conn.execute(
            "UPDATE documents SET data_json = ?3 WHERE collection = ?1 AND id = ?2",
            params![collection, id, data_json],
        )?;
        Ok(changed > 0)
    }

    /// Get a document from the index by collection and id.
    pub fn get_document(&self, collection: &str, id: &str) -> Result<Option<DocumentRecord>> {
        let result = self
            .conn
            .query_row(
                "SELECT id, collection, data_json FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                DocumentRecord::from_row,
            )
            .optional()?;
        Ok(result)
    }

    pub fn exists(&self, collection: &str, id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// List all documents in a collection, in id (creation) order.
    pub fn list_documents(&self, collection: &str) -> Result<Vec<DocumentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, collection, data_json FROM documents WHERE collection = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![collection], DocumentRecord::from_row)?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?);
        }
        Ok(docs)
    }

    pub fn count_documents(&self, collection: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Delete a document from the index. Returns false if no such document.
    pub fn delete_document(&self, collection: &str, id: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(changed > 0)
    }

    /// Documents of `collection` whose JSON mentions `target_id` as a string value.
    /// This is a broad search; the caller should refine by checking actual ref fields.
    pub fn find_mentions(&self, collection: &str, target_id: &str) -> Result<Vec<DocumentRecord>> {
        let pattern = format!("%\"{}\"%", target_id);

        let mut stmt = self.conn.prepare(
            "SELECT id, collection, data_json FROM documents
             WHERE collection = ?1 AND data_json LIKE ?2
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![collection, pattern], DocumentRecord::from_row)?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?);
        }
        Ok(docs)
    }
}

/// A raw document row
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: String,
    pub collection: String,
    pub data_json: String,
}

impl DocumentRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(DocumentRecord {
            id: row.get(0)?,
            collection: row.get(1)?,
            data_json: row.get(2)?,
        })
    }

    pub fn parse_data(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.data_json)?)
    }
}
