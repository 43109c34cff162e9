//! Segment and transform records on top of the SQLite pool.

use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::fmt;

use crate::queries::{segments, transforms};

/// A backbone fragment cut from a larger structure
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: String,
    /// Source-database code, absent for uploaded structures
    pub pdb_name: Option<String>,
    pub name: Option<String>,
    pub chain: String,
    pub start: i64,
    pub end: i64,
    /// `{"tors": [...]}` as JSON text
    pub torsions: String,
    pub shared: bool,
    pub show_on_main: bool,
    pub pdb: String,
    pub owner: Option<i64>,
}

/// The result of driving a segment towards target torsions
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub id: String,
    pub name: Option<String>,
    pub shared: bool,
    pub show_on_main: bool,
    /// `{"transformMeta": [...]}` as JSON text
    pub meta: String,
    pub pdb: String,
    /// Unix milliseconds
    pub date_created: i64,
    pub segment_id: String,
    pub owner: Option<i64>,
}

/// One row of the main-page listing
#[derive(Debug, Clone, PartialEq)]
pub struct SharedTransform {
    pub transform_id: String,
    pub date_created: i64,
    pub protein_name: Option<String>,
    pub pdb_code: Option<String>,
    pub start: i64,
    pub end: i64,
    pub chain: String,
    pub segment_id: String,
}

#[derive(Debug)]
pub enum StoreError {
    Database(sqlx::Error),
    /// A stored blob could not be (de)serialized
    Json(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(err) => write!(f, "Database error: {}", err),
            StoreError::Json(err) => write!(f, "Stored JSON error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(err) => Some(err),
            StoreError::Json(err) => Some(err),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Json(err)
    }
}

fn segment_from_row(row: &SqliteRow) -> Result<Segment, sqlx::Error> {
    Ok(Segment {
        id: row.try_get("id")?,
        pdb_name: row.try_get("pdb_name")?,
        name: row.try_get("name")?,
        chain: row.try_get("chain")?,
        start: row.try_get("start")?,
        end: row.try_get("end")?,
        torsions: row.try_get("torsions")?,
        shared: row.try_get("shared")?,
        show_on_main: row.try_get("show_on_main")?,
        pdb: row.try_get("pdb")?,
        owner: row.try_get("owner")?,
    })
}

fn transform_from_row(row: &SqliteRow) -> Result<Transform, sqlx::Error> {
    Ok(Transform {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        shared: row.try_get("shared")?,
        show_on_main: row.try_get("show_on_main")?,
        meta: row.try_get("meta")?,
        pdb: row.try_get("pdb")?,
        date_created: row.try_get("date_created")?,
        segment_id: row.try_get("segment_id")?,
        owner: row.try_get("owner")?,
    })
}

fn shared_transform_from_row(row: &SqliteRow) -> Result<SharedTransform, sqlx::Error> {
    Ok(SharedTransform {
        transform_id: row.try_get("transform_id")?,
        date_created: row.try_get("date_created")?,
        protein_name: row.try_get("protein_name")?,
        pdb_code: row.try_get("pdb_code")?,
        start: row.try_get("start")?,
        end: row.try_get("end")?,
        chain: row.try_get("chain")?,
        segment_id: row.try_get("segment_id")?,
    })
}

/// Persistence gateway for segments and transforms
#[derive(Debug, Clone)]
pub struct PdbStore {
    pool: SqlitePool,
}

impl PdbStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_segment(&self, segment: &Segment) -> Result<(), StoreError> {
        sqlx::query(&segments::insert(segment))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_segment(&self, id: &str) -> Result<Option<Segment>, StoreError> {
        let row = sqlx::query(&segments::select_by_id(id))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(segment_from_row).transpose()?)
    }

    pub async fn segments_for_owner(&self, owner: i64) -> Result<Vec<Segment>, StoreError> {
        let rows = sqlx::query(&segments::select_by_owner(owner))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(segment_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete a segment the owner holds, cascading to its transforms.
    /// Returns whether a row was removed.
    pub async fn delete_segment(&self, id: &str, owner: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(&segments::delete_owned(id, owner))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn create_transform(&self, transform: &Transform) -> Result<(), StoreError> {
        sqlx::query(&transforms::insert(transform))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_transform(&self, id: &str) -> Result<Option<Transform>, StoreError> {
        let row = sqlx::query(&transforms::select_by_id(id))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(transform_from_row).transpose()?)
    }

    /// The owner's transforms of one segment, oldest first
    pub async fn transforms_for_segment(
        &self,
        owner: i64,
        segment_id: &str,
    ) -> Result<Vec<Transform>, StoreError> {
        let rows = sqlx::query(&transforms::select_by_owner_and_segment(owner, segment_id))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(transform_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn delete_transform(&self, id: &str, owner: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(&transforms::delete_owned(id, owner))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Put a transform on the main page. One-way: nothing clears the flag.
    pub async fn share_transform_on_main(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(&transforms::set_show_on_main(id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Every transform shown on the main page, newest first
    pub async fn shared_transforms(&self) -> Result<Vec<SharedTransform>, StoreError> {
        let rows = sqlx::query(&transforms::select_shown_on_main())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(shared_transform_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_connection_in_temporary_file, init_database_schema};

    fn segment(id: &str, owner: Option<i64>) -> Segment {
        Segment {
            id: id.to_string(),
            pdb_name: Some("1adg".to_string()),
            name: Some("alcohol dehydrogenase".to_string()),
            chain: "A".to_string(),
            start: 290,
            end: 301,
            torsions: r#"{"tors":[]}"#.to_string(),
            shared: true,
            show_on_main: false,
            pdb: "ATOM ...".to_string(),
            owner,
        }
    }

    fn transform(id: &str, segment_id: &str, date_created: i64, owner: Option<i64>) -> Transform {
        Transform {
            id: id.to_string(),
            name: Some(date_created.to_string()),
            shared: true,
            show_on_main: false,
            meta: r#"{"transformMeta":[]}"#.to_string(),
            pdb: "ATOM ...".to_string(),
            date_created,
            segment_id: segment_id.to_string(),
            owner,
        }
    }

    async fn store() -> (PdbStore, tempfile::TempDir) {
        let (pool, guard) = create_test_connection_in_temporary_file().await.unwrap();
        init_database_schema(&pool).await.unwrap();
        (PdbStore::new(pool), guard)
    }

    #[tokio::test]
    async fn test_segment_round_trip() {
        let (store, _guard) = store().await;
        let mut seg = segment("s1", Some(7));
        seg.pdb_name = None;
        seg.name = Some("it's a name".to_string());
        store.create_segment(&seg).await.unwrap();

        let found = store.find_segment("s1").await.unwrap();
        assert_eq!(found, Some(seg));
        assert_eq!(store.find_segment("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_segment_id_is_rejected() {
        let (store, _guard) = store().await;
        store.create_segment(&segment("s1", None)).await.unwrap();
        let err = store.create_segment(&segment("s1", None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[tokio::test]
    async fn test_owner_scoped_listing_and_delete() {
        let (store, _guard) = store().await;
        store.create_segment(&segment("s1", Some(1))).await.unwrap();
        store.create_segment(&segment("s2", Some(2))).await.unwrap();
        store.create_segment(&segment("s3", Some(1))).await.unwrap();

        let ids: Vec<String> = store
            .segments_for_owner(1)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["s1", "s3"]);

        // Someone else's segment stays put
        assert!(!store.delete_segment("s2", 1).await.unwrap());
        assert!(store.find_segment("s2").await.unwrap().is_some());

        assert!(store.delete_segment("s1", 1).await.unwrap());
        assert!(store.find_segment("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deleting_segment_cascades_to_transforms() {
        let (store, _guard) = store().await;
        store.create_segment(&segment("s1", Some(1))).await.unwrap();
        store
            .create_transform(&transform("t1", "s1", 1000, Some(1)))
            .await
            .unwrap();

        store.delete_segment("s1", 1).await.unwrap();
        assert!(store.find_transform("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transform_requires_existing_segment() {
        let (store, _guard) = store().await;
        let err = store
            .create_transform(&transform("t1", "nope", 1000, None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[tokio::test]
    async fn test_transforms_for_segment_ordered_by_date() {
        let (store, _guard) = store().await;
        store.create_segment(&segment("s1", Some(1))).await.unwrap();
        store.create_transform(&transform("t2", "s1", 2000, Some(1))).await.unwrap();
        store.create_transform(&transform("t1", "s1", 1000, Some(1))).await.unwrap();
        store.create_transform(&transform("t3", "s1", 3000, Some(2))).await.unwrap();

        let ids: Vec<String> = store
            .transforms_for_segment(1, "s1")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["t1", "t2"]);

        assert!(!store.delete_transform("t3", 1).await.unwrap());
        assert!(store.delete_transform("t3", 2).await.unwrap());
    }

    #[tokio::test]
    async fn test_shared_transforms_listing() {
        let (store, _guard) = store().await;
        store.create_segment(&segment("s1", None)).await.unwrap();
        store.create_transform(&transform("t1", "s1", 1000, None)).await.unwrap();
        store.create_transform(&transform("t2", "s1", 2000, None)).await.unwrap();
        store.create_transform(&transform("t3", "s1", 3000, None)).await.unwrap();

        assert!(store.shared_transforms().await.unwrap().is_empty());

        assert!(store.share_transform_on_main("t1").await.unwrap());
        assert!(store.share_transform_on_main("t3").await.unwrap());
        assert!(!store.share_transform_on_main("missing").await.unwrap());

        let listing = store.shared_transforms().await.unwrap();
        let ids: Vec<&str> = listing.iter().map(|t| t.transform_id.as_str()).collect();
        assert_eq!(ids, vec!["t3", "t1"]);
        assert_eq!(listing[0].segment_id, "s1");
        assert_eq!(listing[0].pdb_code.as_deref(), Some("1adg"));
        assert_eq!(listing[0].protein_name.as_deref(), Some("alcohol dehydrogenase"));
        assert_eq!((listing[0].start, listing[0].end), (290, 301));
    }
}
