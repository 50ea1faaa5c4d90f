//! Low level sqlite access for the catalog.
//!
//! Mirrors the shape of a typical embedded sqlite cache: one connection, schema created
//! on open, storage tuned for bulk blob storage on an SD card (§4.1).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};

use super::model::{CacheState, EpochMs, Photo, PhotoId, SortMode};

const SCHEMA: &str = include_str!("schema.sql");

pub struct Db(Connection);

impl Db {
    pub fn open_or_create(path: &Path) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed creating catalog directory at: {}", dir.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed opening catalog at: {}", path.display()))?;
        Self::tune(&conn)?;
        Self::create_schema(&conn)?;
        Ok(Self(conn))
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::create_schema(&conn)?;
        Ok(Self(conn))
    }

    /// Favor larger pages and a generous cache for BLOB locality, trading a small crash
    /// window (synchronous=NORMAL) for less SD-card wear.
    fn tune(conn: &Connection) -> anyhow::Result<()> {
        conn.pragma_update(None, "page_size", 16384)?;
        conn.pragma_update(None, "cache_size", -64 * 1024)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(())
    }

    fn create_schema(conn: &Connection) -> anyhow::Result<()> {
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Verifies the store is readable. On corruption, callers should delete and recreate
    /// the file (an empty catalog is a valid recovery state, §4.1).
    pub fn integrity_check(&self) -> anyhow::Result<bool> {
        let ok: String = self
            .0
            .query_row("pragma integrity_check", [], |row| row.get(0))?;
        Ok(ok == "ok")
    }

    pub fn upsert_photos(&mut self, photos: &[Photo]) -> anyhow::Result<()> {
        let tx = self.0.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "insert into photos
                    (photo_id, provider_key, container_key, filename, creation_time,
                     width, height, latitude, longitude, location_name, last_viewed_at)
                 values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 on conflict(photo_id) do update set
                    provider_key = excluded.provider_key,
                    container_key = excluded.container_key,
                    filename = excluded.filename,
                    creation_time = excluded.creation_time,
                    width = excluded.width,
                    height = excluded.height,
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    location_name = excluded.location_name",
            )?;
            for photo in photos {
                stmt.execute(params![
                    photo.id.as_str(),
                    photo.provider_key,
                    photo.container_key,
                    photo.filename,
                    photo.creation_time,
                    photo.width,
                    photo.height,
                    photo.latitude,
                    photo.longitude,
                    photo.location_name,
                    photo.last_viewed_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn delete_photo(&mut self, id: &PhotoId) -> anyhow::Result<()> {
        let tx = self.0.transaction()?;
        unlink_file_payload(&tx, id)?;
        tx.execute("delete from photos where photo_id = ?1", params![id.as_str()])?;
        tx.commit()?;
        Ok(())
    }

    pub fn next_display_candidate(&self, sort: SortMode) -> anyhow::Result<Option<Photo>> {
        let order_by = match sort {
            SortMode::Sequential => {
                "order by (last_viewed_at is not null), photo_id asc"
            }
            SortMode::Random => "order by (last_viewed_at is not null), random()",
            SortMode::Newest => {
                "order by (last_viewed_at is not null), creation_time desc"
            }
            SortMode::Oldest => {
                "order by (last_viewed_at is not null), creation_time asc"
            }
        };
        let sql = format!(
            "select {COLUMNS} from photos where cache_kind != 'unset' {order_by} limit 1"
        );
        let mut stmt = self.0.prepare_cached(&sql)?;
        stmt.query_row([], row_to_photo).optional().map_err(Into::into)
    }

    pub fn mark_viewed(&mut self, id: &PhotoId, now_ms: EpochMs) -> anyhow::Result<()> {
        self.0.execute(
            "update photos set last_viewed_at = ?2
             where photo_id = ?1 and (last_viewed_at is null or last_viewed_at < ?2)",
            params![id.as_str(), now_ms],
        )?;
        Ok(())
    }

    pub fn list_fetch_candidates(&self, limit: usize) -> anyhow::Result<Vec<Photo>> {
        let sql = format!(
            "select {COLUMNS} from photos where cache_kind = 'unset'
             order by (last_viewed_at is not null), last_viewed_at asc
             limit ?1"
        );
        let mut stmt = self.0.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![limit as i64], row_to_photo)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn list_eviction_candidates(&self, limit: usize) -> anyhow::Result<Vec<Photo>> {
        let sql = format!(
            "select {COLUMNS} from photos where cache_kind != 'unset'
             order by (last_viewed_at is null), last_viewed_at asc
             limit ?1"
        );
        let mut stmt = self.0.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![limit as i64], row_to_photo)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn attach_blob(
        &mut self,
        id: &PhotoId,
        bytes: &[u8],
        mime_type: &str,
        cached_at: EpochMs,
    ) -> anyhow::Result<()> {
        let tx = self.0.transaction()?;
        unlink_file_payload(&tx, id)?;
        tx.execute(
            "update photos set
                cache_kind = 'blob', cache_blob = ?2, cache_mime_type = ?3,
                cache_file_path = null, cache_size_bytes = ?4, cache_cached_at = ?5
             where photo_id = ?1",
            params![id.as_str(), bytes, mime_type, bytes.len() as i64, cached_at],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn attach_file(
        &mut self,
        id: &PhotoId,
        path: &Path,
        size_bytes: u64,
        cached_at: EpochMs,
    ) -> anyhow::Result<()> {
        let tx = self.0.transaction()?;
        tx.execute(
            "update photos set
                cache_kind = 'file', cache_file_path = ?2, cache_blob = null,
                cache_mime_type = null, cache_size_bytes = ?3, cache_cached_at = ?4
             where photo_id = ?1",
            params![
                id.as_str(),
                path.to_string_lossy(),
                size_bytes as i64,
                cached_at
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn clear_cache(&mut self, id: &PhotoId) -> anyhow::Result<()> {
        let tx = self.0.transaction()?;
        unlink_file_payload(&tx, id)?;
        tx.execute(
            "update photos set
                cache_kind = 'unset', cache_blob = null, cache_mime_type = null,
                cache_file_path = null, cache_size_bytes = 0, cache_cached_at = null
             where photo_id = ?1",
            params![id.as_str()],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn cache_bytes_total(&self) -> anyhow::Result<u64> {
        let total: i64 = self.0.query_row(
            "select coalesce(sum(cache_size_bytes), 0) from photos where cache_kind != 'unset'",
            [],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }

    pub fn cached_count(&self) -> anyhow::Result<u64> {
        let count: i64 = self.0.query_row(
            "select count(*) from photos where cache_kind != 'unset'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn total_count(&self) -> anyhow::Result<u64> {
        let count: i64 = self
            .0
            .query_row("select count(*) from photos", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn get_setting(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.0
            .query_row("select value from settings where key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(Into::into)
    }

    pub fn put_setting(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.0.execute(
            "insert into settings (key, value) values (?1, ?2)
             on conflict(key) do update set value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

/// Unlinks a photo's on-disk cache file, if any, ahead of a row mutation in `tx`.
///
/// File unlink failures are logged and ignored; orphaned files are tolerated (§4.3.1, §7).
fn unlink_file_payload(tx: &rusqlite::Transaction<'_>, id: &PhotoId) -> anyhow::Result<()> {
    let path: Option<String> = tx
        .query_row(
            "select cache_file_path from photos where photo_id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()?
        .flatten();

    if let Some(path) = path {
        if let Err(err) = fs::remove_file(&path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(%path, %err, "Failed to unlink orphaned cache file");
            }
        }
    }
    Ok(())
}

const COLUMNS: &str = "photo_id, provider_key, container_key, filename, creation_time,
     width, height, latitude, longitude, location_name, last_viewed_at,
     cache_kind, cache_blob, cache_mime_type, cache_file_path, cache_size_bytes, cache_cached_at";

fn row_to_photo(row: &rusqlite::Row<'_>) -> rusqlite::Result<Photo> {
    let cache_kind: String = row.get(11)?;
    let cache_state = match cache_kind.as_str() {
        "blob" => CacheState::Blob {
            bytes: row.get(12)?,
            mime_type: row.get(13)?,
            size_bytes: row.get::<_, i64>(15)? as u64,
            cached_at: row.get(16)?,
        },
        "file" => CacheState::File {
            path: PathBuf::from(row.get::<_, String>(14)?),
            size_bytes: row.get::<_, i64>(15)? as u64,
            cached_at: row.get(16)?,
        },
        _ => CacheState::Unset,
    };

    Ok(Photo {
        id: PhotoId(row.get(0)?),
        provider_key: row.get(1)?,
        container_key: row.get(2)?,
        filename: row.get(3)?,
        creation_time: row.get(4)?,
        width: row.get(5)?,
        height: row.get(6)?,
        latitude: row.get(7)?,
        longitude: row.get(8)?,
        location_name: row.get(9)?,
        last_viewed_at: row.get(10)?,
        cache_state,
    })
}
