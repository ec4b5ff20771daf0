// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SQLite-backed vector store.
//!
//! Persists one embedding per chunk (upsert by chunk id) and answers
//! filtered similarity queries by joining candidate vectors with their
//! chunks, ranking them in process. Brute-force is adequate for per-review
//! corpora; the SQL filters keep the scan to candidate rows only.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(feature = "telemetry")]
use std::time::Instant;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::sqlite::CHUNK_COLUMNS;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::ops;
use super::types::{ScoredChunk, SearchOptions, VectorMetadata, VectorRecord, VectorType};

/// The vector store contract the RAG service and orchestrator compile
/// against.
pub trait VectorStore: Send + Sync {
    /// Upsert an embedding by chunk id; returns the vector id.
    ///
    /// The embedding is normalized at store time when the metadata marks
    /// normalization on (the default).
    fn store(
        &self,
        embedding: &[f32],
        chunk_id: &str,
        workspace_id: &str,
        metadata: VectorMetadata,
        vector_type: VectorType,
    ) -> Result<String, StoreError>;

    fn get(&self, vector_id: &str) -> Result<VectorRecord, StoreError>;

    fn delete(&self, vector_id: &str) -> Result<(), StoreError>;

    fn delete_many(&self, vector_ids: &[String]) -> Result<usize, StoreError>;

    /// Which of the given chunk ids already have a stored vector.
    fn existing_chunk_ids(&self, chunk_ids: &[String]) -> Result<HashSet<String>, StoreError>;

    /// Filtered similarity search; an empty result is not an error.
    fn find_similar(
        &self,
        embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<ScoredChunk>, StoreError>;
}

/// Default [`VectorStore`] over the shared SQLite connection.
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVectorStore {
    /// Wrap the persistence facade's connection; the schema is owned by
    /// [`crate::store::SqliteStore`].
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("vector store lock poisoned".to_string()))
    }
}

impl VectorStore for SqliteVectorStore {
    fn store(
        &self,
        embedding: &[f32],
        chunk_id: &str,
        workspace_id: &str,
        mut metadata: VectorMetadata,
        vector_type: VectorType,
    ) -> Result<String, StoreError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        if embedding.is_empty() {
            return Err(StoreError::InvalidVector("empty embedding".to_string()));
        }

        let stored = if metadata.normalized {
            ops::normalize(embedding)
        } else {
            embedding.to_vec()
        };
        metadata.dimensions = Some(stored.len());

        let blob = match vector_type {
            VectorType::Float32 => ops::serialize(&stored, vector_type),
            VectorType::Int8 => ops::quantize_int8(&stored, 0.0, 0.0),
            VectorType::Binary => ops::quantize_binary(&stored),
        };
        let metadata_json = serde_json::to_string(&metadata)?;

        let conn = self.conn()?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM vectors WHERE chunk_id = ?1",
                params![chunk_id],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE vectors SET workspace_id = ?1, embedding = ?2, vector_type = ?3,
                            dimensions = ?4, metadata = ?5
                     WHERE id = ?6",
                    params![
                        workspace_id,
                        blob,
                        vector_type.as_str(),
                        stored.len() as i64,
                        metadata_json,
                        id
                    ],
                )?;
                id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO vectors
                     (id, chunk_id, workspace_id, embedding, vector_type, dimensions, metadata, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        id,
                        chunk_id,
                        workspace_id,
                        blob,
                        vector_type.as_str(),
                        stored.len() as i64,
                        metadata_json,
                        Utc::now().to_rfc3339()
                    ],
                )?;
                id
            }
        };

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("vector_store.store", start.elapsed());

        Ok(id)
    }

    fn get(&self, vector_id: &str) -> Result<VectorRecord, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, chunk_id, workspace_id, embedding, vector_type, dimensions, metadata
             FROM vectors WHERE id = ?1",
            params![vector_id],
            |row| {
                let vector_type: String = row.get(4)?;
                let metadata: String = row.get(6)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                    vector_type,
                    row.get::<_, i64>(5)? as usize,
                    metadata,
                ))
            },
        )
        .map_err(StoreError::from)
        .and_then(|(id, chunk_id, workspace_id, data, vector_type, dimensions, metadata)| {
            Ok(VectorRecord {
                id,
                chunk_id,
                workspace_id,
                data,
                vector_type: VectorType::parse(&vector_type).ok_or_else(|| {
                    StoreError::Serialization(format!("unknown vector type: {}", vector_type))
                })?,
                dimensions,
                metadata: serde_json::from_str(&metadata)?,
            })
        })
    }

    fn delete(&self, vector_id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM vectors WHERE id = ?1", params![vector_id])?;
        Ok(())
    }

    fn delete_many(&self, vector_ids: &[String]) -> Result<usize, StoreError> {
        if vector_ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn()?;
        let placeholders = vec!["?"; vector_ids.len()].join(", ");
        let sql = format!("DELETE FROM vectors WHERE id IN ({})", placeholders);
        let params: Vec<&dyn ToSql> = vector_ids.iter().map(|id| id as &dyn ToSql).collect();
        let deleted = conn.execute(&sql, params.as_slice())?;
        Ok(deleted)
    }

    fn existing_chunk_ids(&self, chunk_ids: &[String]) -> Result<HashSet<String>, StoreError> {
        if chunk_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let conn = self.conn()?;
        let placeholders = vec!["?"; chunk_ids.len()].join(", ");
        let sql = format!(
            "SELECT chunk_id FROM vectors WHERE chunk_id IN ({})",
            placeholders
        );
        let params: Vec<&dyn ToSql> = chunk_ids.iter().map(|id| id as &dyn ToSql).collect();

        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params.as_slice(), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }

    fn find_similar(
        &self,
        embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let query = if options.normalization {
            ops::normalize(embedding)
        } else {
            embedding.to_vec()
        };

        // Candidate selection: filters run in SQL, ranking in process.
        let mut sql = String::from(
            "SELECT v.chunk_id, v.embedding, v.vector_type, v.dimensions
             FROM vectors v JOIN chunks c ON c.id = v.chunk_id WHERE 1=1",
        );
        let mut owned: Vec<String> = Vec::new();

        if let Some(workspace_id) = &options.workspace_id {
            sql.push_str(" AND v.workspace_id = ?");
            owned.push(workspace_id.clone());
        }
        if !options.file_ids.is_empty() {
            sql.push_str(&format!(
                " AND c.file_id IN ({})",
                vec!["?"; options.file_ids.len()].join(", ")
            ));
            owned.extend(options.file_ids.iter().cloned());
        }
        if let Some(exclude_file) = &options.exclude_file_id {
            sql.push_str(" AND c.file_id != ?");
            owned.push(exclude_file.clone());
        }
        if let Some(chunk_type) = options.chunk_type {
            sql.push_str(" AND c.chunk_type = ?");
            owned.push(chunk_type.as_str().to_string());
        }
        if !options.exclude_chunk_ids.is_empty() {
            sql.push_str(&format!(
                " AND c.id NOT IN ({})",
                vec!["?"; options.exclude_chunk_ids.len()].join(", ")
            ));
            owned.extend(options.exclude_chunk_ids.iter().cloned());
        }

        let limit = if options.limit == 0 { 10 } else { options.limit };

        let mut scored: Vec<(String, f32, f32)> = Vec::new();
        {
            let conn = self.conn()?;
            let params: Vec<&dyn ToSql> = owned.iter().map(|v| v as &dyn ToSql).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)? as usize,
                ))
            })?;

            for row in rows {
                let (chunk_id, blob, vector_type, dimensions) = row?;
                let Some(vector_type) = VectorType::parse(&vector_type) else {
                    debug!(chunk_id = %chunk_id, encoding = %vector_type, "skipping vector with unknown encoding");
                    continue;
                };
                let candidate = ops::deserialize(&blob, vector_type, dimensions)?;

                // Matryoshka: adaptively-sliced vectors match against the
                // query's prefix of the same width.
                let distance = if candidate.len() < query.len() {
                    let sliced = ops::slice(&query, 0, candidate.len())?;
                    ops::distance(&sliced, &candidate, options.metric)?
                } else if candidate.len() > query.len() {
                    debug!(
                        chunk_id = %chunk_id,
                        candidate_dims = candidate.len(),
                        query_dims = query.len(),
                        "skipping vector wider than query"
                    );
                    continue;
                } else {
                    ops::distance(&query, &candidate, options.metric)?
                };

                let similarity = ops::distance_to_similarity(distance, options.metric);
                if similarity >= options.min_similarity {
                    scored.push((chunk_id, similarity, distance));
                }
            }
        }

        // Similarity descending, ties broken by ascending chunk id.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);

        let mut results = Vec::with_capacity(scored.len());
        {
            let conn = self.conn()?;
            let sql = format!("SELECT {} FROM chunks WHERE id = ?1", CHUNK_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            for (chunk_id, similarity, distance) in scored {
                let chunk = stmt.query_row(params![chunk_id], crate::store::sqlite::chunk_from_row)?;
                results.push(ScoredChunk {
                    chunk,
                    similarity,
                    distance: options.include_distance.then_some(distance),
                });
            }
        }

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("vector_store.find_similar", start.elapsed());

        Ok(results)
    }
}
