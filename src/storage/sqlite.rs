//! SQLite storage backend for the pattern graph

use super::traits::{EdgeOutcome, GraphStore, OpenStore, StorageError, StorageResult};
use crate::graph::{Entity, GraphEdge, RelationshipType};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

const ENTITY_COLUMNS: &str =
    "id, slug, title, summary, content, tags_json, categories_json, source_url";

const EDGE_COLUMNS: &str = "source_id, target_id, relationship, confidence, evidence, \
     discovered_by, reviewed_by, created_at";

/// SQLite-backed graph store
///
/// Patterns live in `patterns`; relationships live in a single
/// `relationships` table keyed by (source_id, target_id, relationship), so
/// the store itself refuses duplicate edges. Every statement is
/// parameterized; titles and evidence never become part of the SQL text.
/// Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- Pattern nodes
            CREATE TABLE IF NOT EXISTS patterns (
                id TEXT PRIMARY KEY,
                slug TEXT,
                title TEXT NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                content TEXT,
                tags_json TEXT NOT NULL DEFAULT '[]',
                categories_json TEXT NOT NULL DEFAULT '[]',
                source_url TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_patterns_title
                ON patterns(title);

            -- Pattern-to-pattern edges; one row per (source, target, type)
            CREATE TABLE IF NOT EXISTS relationships (
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                relationship TEXT NOT NULL,
                confidence REAL NOT NULL,
                evidence TEXT NOT NULL,
                discovered_by TEXT NOT NULL,
                reviewed_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (source_id, target_id, relationship),
                FOREIGN KEY (source_id) REFERENCES patterns(id) ON DELETE CASCADE,
                FOREIGN KEY (target_id) REFERENCES patterns(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_relationships_target
                ON relationships(target_id);
            CREATE INDEX IF NOT EXISTS idx_relationships_type
                ON relationships(relationship);

            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Entity, String, String)> {
        let mut entity = Entity::new(row.get::<_, String>(0)?, row.get::<_, String>(2)?);
        entity.slug = row.get(1)?;
        entity.summary = row.get(3)?;
        entity.content = row.get(4)?;
        entity.source_url = row.get(7)?;
        Ok((entity, row.get(5)?, row.get(6)?))
    }

    /// Decode the JSON list columns that `row_to_entity` hands back raw
    fn finish_entity(
        (mut entity, tags_json, categories_json): (Entity, String, String),
    ) -> StorageResult<Entity> {
        entity.tags = serde_json::from_str(&tags_json)?;
        entity.categories = serde_json::from_str(&categories_json)?;
        Ok(entity)
    }

    #[allow(clippy::type_complexity)]
    fn row_to_edge_parts(
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<(String, String, String, f64, String, String, String, String)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    }

    fn parts_to_edge(
        (source_id, target_id, relationship, confidence, evidence, discovered_by, reviewed_by, created_at): (
            String,
            String,
            String,
            f64,
            String,
            String,
            String,
            String,
        ),
    ) -> StorageResult<GraphEdge> {
        let relationship_type: RelationshipType = relationship
            .parse()
            .map_err(|e| StorageError::CorruptRow(format!("{}", e)))?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StorageError::DateParse(e.to_string()))?
            .with_timezone(&Utc);

        Ok(GraphEdge {
            source_id,
            target_id,
            relationship_type,
            confidence,
            evidence,
            discovered_by,
            reviewed_by,
            created_at,
        })
    }

    fn entity_exists(conn: &Connection, id: &str) -> StorageResult<bool> {
        let found = conn
            .query_row("SELECT 1 FROM patterns WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl GraphStore for SqliteStore {
    // === Entity Operations ===

    fn upsert_entity(&self, entity: &Entity) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let tags_json = serde_json::to_string(&entity.tags)?;
        let categories_json = serde_json::to_string(&entity.categories)?;

        conn.execute(
            r#"
            INSERT INTO patterns (id, slug, title, summary, content, tags_json, categories_json,
                                  source_url, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                slug = excluded.slug,
                title = excluded.title,
                summary = excluded.summary,
                content = excluded.content,
                tags_json = excluded.tags_json,
                categories_json = excluded.categories_json,
                source_url = excluded.source_url,
                updated_at = excluded.updated_at
            "#,
            params![
                entity.id,
                entity.slug,
                entity.title,
                entity.summary,
                entity.content,
                tags_json,
                categories_json,
                entity.source_url,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    fn find_entity(&self, id: &str) -> StorageResult<Option<Entity>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM patterns WHERE id = ?1", ENTITY_COLUMNS),
                params![id],
                Self::row_to_entity,
            )
            .optional()?;

        row.map(Self::finish_entity).transpose()
    }

    fn list_entities(&self) -> StorageResult<Vec<Entity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM patterns ORDER BY title, id",
            ENTITY_COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::row_to_entity)?;

        let mut entities = Vec::new();
        for row in rows {
            entities.push(Self::finish_entity(row?)?);
        }
        Ok(entities)
    }

    // === Edge Operations ===

    fn create_edge(&self, edge: &GraphEdge) -> StorageResult<EdgeOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut missing = Vec::new();
        if !Self::entity_exists(&tx, &edge.source_id)? {
            missing.push(edge.source_id.clone());
        }
        if edge.target_id != edge.source_id && !Self::entity_exists(&tx, &edge.target_id)? {
            missing.push(edge.target_id.clone());
        }
        if !missing.is_empty() {
            // Dropping the transaction rolls it back; nothing was written.
            return Ok(EdgeOutcome::EndpointNotFound { missing });
        }

        let inserted = tx.execute(
            r#"
            INSERT INTO relationships (source_id, target_id, relationship, confidence, evidence,
                                       discovered_by, reviewed_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(source_id, target_id, relationship) DO NOTHING
            "#,
            params![
                edge.source_id,
                edge.target_id,
                edge.relationship_type.as_str(),
                edge.confidence,
                edge.evidence,
                edge.discovered_by,
                edge.reviewed_by,
                edge.created_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        Ok(if inserted == 0 {
            EdgeOutcome::AlreadyExists
        } else {
            EdgeOutcome::Created
        })
    }

    fn has_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relationship_type: RelationshipType,
    ) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                "SELECT 1 FROM relationships
                 WHERE source_id = ?1 AND target_id = ?2 AND relationship = ?3",
                params![source_id, target_id, relationship_type.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn count_edges(&self, relationship_type: RelationshipType) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM relationships WHERE relationship = ?1",
            params![relationship_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn edges_for(&self, entity_id: &str) -> StorageResult<Vec<GraphEdge>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM relationships
             WHERE source_id = ?1 OR target_id = ?1
             ORDER BY relationship, source_id, target_id",
            EDGE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![entity_id], Self::row_to_edge_parts)?;

        let mut edges = Vec::new();
        for row in rows {
            edges.push(Self::parts_to_edge(row?)?);
        }
        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn seeded_store(ids: &[(&str, &str)]) -> SqliteStore {
        let store = create_test_store();
        for (id, title) in ids {
            store.upsert_entity(&Entity::new(*id, *title)).unwrap();
        }
        store
    }

    #[test]
    fn test_upsert_and_find_entity() {
        let store = create_test_store();
        let entity = Entity::new("pat_a", "Open Budgeting")
            .with_summary("Publish the budget.")
            .with_tags(["finance", "governance"])
            .with_category("transparency");

        store.upsert_entity(&entity).unwrap();

        let loaded = store.find_entity("pat_a").unwrap().unwrap();
        assert_eq!(loaded, entity);
        assert!(store.find_entity("pat_missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_existing_entity() {
        let store = create_test_store();
        store.upsert_entity(&Entity::new("pat_a", "Old title")).unwrap();
        store.upsert_entity(&Entity::new("pat_a", "New title")).unwrap();

        let all = store.list_entities().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "New title");
    }

    #[test]
    fn test_list_entities_ordered_by_title() {
        let store = seeded_store(&[("p1", "Zebra"), ("p2", "Apple"), ("p3", "Mango")]);
        let titles: Vec<String> = store
            .list_entities()
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["Apple", "Mango", "Zebra"]);
    }

    #[test]
    fn test_create_edge_between_existing_patterns() {
        let store = seeded_store(&[("a", "A"), ("b", "B")]);
        let edge = GraphEdge::new("a", "b", RelationshipType::Enables)
            .with_confidence(0.8)
            .with_evidence("A lays the groundwork for B")
            .with_provenance("gpt-4.1-mini", "human");

        assert_eq!(store.create_edge(&edge).unwrap(), EdgeOutcome::Created);
        assert!(store.has_edge("a", "b", RelationshipType::Enables).unwrap());
        assert!(!store.has_edge("b", "a", RelationshipType::Enables).unwrap());
        assert_eq!(store.count_edges(RelationshipType::Enables).unwrap(), 1);
        assert_eq!(store.count_edges(RelationshipType::Requires).unwrap(), 0);
    }

    #[test]
    fn test_create_edge_with_missing_endpoint() {
        let store = seeded_store(&[("a", "A")]);
        let edge = GraphEdge::new("a", "ghost", RelationshipType::Requires);

        let outcome = store.create_edge(&edge).unwrap();
        assert_eq!(
            outcome,
            EdgeOutcome::EndpointNotFound {
                missing: vec!["ghost".to_string()]
            }
        );
        assert_eq!(store.count_edges(RelationshipType::Requires).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_edge_is_not_created_twice() {
        let store = seeded_store(&[("a", "A"), ("b", "B")]);
        let edge = GraphEdge::new("a", "b", RelationshipType::TensionsWith);

        assert_eq!(store.create_edge(&edge).unwrap(), EdgeOutcome::Created);
        assert_eq!(store.create_edge(&edge).unwrap(), EdgeOutcome::AlreadyExists);
        assert_eq!(store.count_edges(RelationshipType::TensionsWith).unwrap(), 1);

        // Same endpoints, different type is a distinct edge
        let other = GraphEdge::new("a", "b", RelationshipType::Enables);
        assert_eq!(store.create_edge(&other).unwrap(), EdgeOutcome::Created);
    }

    #[test]
    fn test_quotes_in_evidence_are_stored_verbatim() {
        let store = seeded_store(&[("a", "Bob's \"pattern\""), ("b", "B")]);
        let evidence = "It's the 'classic' case; DROP TABLE patterns; --";
        let edge = GraphEdge::new("a", "b", RelationshipType::Enables).with_evidence(evidence);

        store.create_edge(&edge).unwrap();

        let edges = store.edges_for("a").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].evidence, evidence);
        assert_eq!(store.title_of("a"), "Bob's \"pattern\"");
        assert_eq!(store.list_entities().unwrap().len(), 2);
    }

    #[test]
    fn test_edges_for_covers_both_directions() {
        let store = seeded_store(&[("a", "A"), ("b", "B"), ("c", "C")]);
        store
            .create_edge(&GraphEdge::new("a", "b", RelationshipType::Enables))
            .unwrap();
        store
            .create_edge(&GraphEdge::new("c", "a", RelationshipType::Requires))
            .unwrap();
        store
            .create_edge(&GraphEdge::new("b", "c", RelationshipType::Requires))
            .unwrap();

        let edges = store.edges_for("a").unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].relationship_type, RelationshipType::Enables);
        assert_eq!(edges[1].source_id, "c");
    }

    #[test]
    fn test_title_of_falls_back_to_id() {
        let store = seeded_store(&[("a", "Alpha")]);
        assert_eq!(store.title_of("a"), "Alpha");
        assert_eq!(store.title_of("pat_unknown"), "pat_unknown");
    }

    #[test]
    fn test_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("graph.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.upsert_entity(&Entity::new("a", "A")).unwrap();
            store.upsert_entity(&Entity::new("b", "B")).unwrap();
            store
                .create_edge(&GraphEdge::new("a", "b", RelationshipType::Enables))
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_entities().unwrap().len(), 2);
        assert_eq!(store.count_edges(RelationshipType::Enables).unwrap(), 1);
    }
}
