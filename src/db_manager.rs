use crate::protocol::{ArtistSubject, ImageKind, RefreshRecord, RefreshStatus};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const CATALOG_FILE_NAME: &str = "catalog.db";

/// SQLite-backed artist catalog: subjects, their attached images, and refresh records.
pub struct DbManager {
    conn: Connection,
}

impl DbManager {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS artists (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                path TEXT,
                musicbrainz_id TEXT,
                dont_fetch_meta INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS artist_images (
                artist_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                position INTEGER NOT NULL,
                path TEXT NOT NULL,
                PRIMARY KEY(artist_id, kind, position),
                FOREIGN KEY(artist_id) REFERENCES artists(id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS provider_refresh (
                artist_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                last_refreshed_ms INTEGER NOT NULL,
                status TEXT NOT NULL,
                provider_version TEXT NOT NULL,
                PRIMARY KEY(artist_id, provider),
                FOREIGN KEY(artist_id) REFERENCES artists(id)
            )",
            [],
        )?;
        Ok(())
    }

    /// Inserts a new artist and returns its generated id.
    pub fn add_artist(
        &self,
        name: &str,
        path: Option<&Path>,
        musicbrainz_id: Option<&str>,
    ) -> Result<String, rusqlite::Error> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO artists (id, name, path, musicbrainz_id, dont_fetch_meta)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![
                id,
                name,
                path.map(|path| path.to_string_lossy().to_string()),
                musicbrainz_id
            ],
        )?;
        Ok(id)
    }

    /// Returns `false` when no artist has that id.
    pub fn set_artist_locked(&self, id: &str, locked: bool) -> Result<bool, rusqlite::Error> {
        let changed = self.conn.execute(
            "UPDATE artists SET dont_fetch_meta = ?1 WHERE id = ?2",
            params![locked, id],
        )?;
        Ok(changed > 0)
    }

    pub fn get_artist(&self, id: &str) -> Result<Option<ArtistSubject>, rusqlite::Error> {
        let artist = self
            .conn
            .query_row(
                "SELECT id, name, path, musicbrainz_id, dont_fetch_meta FROM artists WHERE id = ?1",
                params![id],
                row_to_artist,
            )
            .optional()?;
        match artist {
            Some(mut artist) => {
                self.hydrate_artist(&mut artist)?;
                Ok(Some(artist))
            }
            None => Ok(None),
        }
    }

    pub fn get_all_artists(&self) -> Result<Vec<ArtistSubject>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, path, musicbrainz_id, dont_fetch_meta FROM artists ORDER BY name ASC",
        )?;
        let artist_iter = stmt.query_map([], row_to_artist)?;

        let mut artists = Vec::new();
        for artist in artist_iter {
            artists.push(artist?);
        }
        for artist in &mut artists {
            self.hydrate_artist(artist)?;
        }
        Ok(artists)
    }

    fn hydrate_artist(&self, artist: &mut ArtistSubject) -> Result<(), rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, path FROM artist_images WHERE artist_id = ?1 ORDER BY kind, position ASC",
        )?;
        let image_iter = stmt.query_map(params![artist.id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for image in image_iter {
            let (kind, path) = image?;
            let Some(kind) = ImageKind::parse(&kind) else {
                log::warn!(
                    "Ignoring unknown image kind '{}' for artist {}",
                    kind,
                    artist.id
                );
                continue;
            };
            artist.attach_image(kind, PathBuf::from(path));
        }

        let mut stmt = self.conn.prepare(
            "SELECT provider, last_refreshed_ms, status, provider_version
             FROM provider_refresh WHERE artist_id = ?1",
        )?;
        let record_iter = stmt.query_map(params![artist.id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                RefreshRecord {
                    last_refreshed_unix_ms: row.get(1)?,
                    status: RefreshStatus::parse(&row.get::<_, String>(2)?),
                    provider_version: row.get(3)?,
                },
            ))
        })?;
        let mut records = HashMap::new();
        for record in record_iter {
            let (provider, record) = record?;
            records.insert(provider, record);
        }
        artist.refresh_records = records;
        Ok(())
    }

    /// Replaces the stored images and refresh records of `artist` in one transaction.
    pub fn save_artist_state(&self, artist: &ArtistSubject) -> Result<(), rusqlite::Error> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM artist_images WHERE artist_id = ?1",
            params![artist.id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO artist_images (artist_id, kind, position, path) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (kind, path) in &artist.images {
                stmt.execute(params![
                    artist.id,
                    kind.as_str(),
                    0_i64,
                    path.to_string_lossy().to_string()
                ])?;
            }
            for (i, path) in artist.backdrops.iter().enumerate() {
                stmt.execute(params![
                    artist.id,
                    ImageKind::Backdrop.as_str(),
                    i as i64,
                    path.to_string_lossy().to_string()
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO provider_refresh (artist_id, provider, last_refreshed_ms, status, provider_version)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(artist_id, provider) DO UPDATE SET
                    last_refreshed_ms = excluded.last_refreshed_ms,
                    status = excluded.status,
                    provider_version = excluded.provider_version",
            )?;
            for (provider, record) in &artist.refresh_records {
                stmt.execute(params![
                    artist.id,
                    provider,
                    record.last_refreshed_unix_ms,
                    record.status.as_str(),
                    record.provider_version
                ])?;
            }
        }
        tx.commit()
    }
}

fn row_to_artist(row: &rusqlite::Row<'_>) -> Result<ArtistSubject, rusqlite::Error> {
    Ok(ArtistSubject {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get::<_, Option<String>>(2)?.map(PathBuf::from),
        musicbrainz_id: row.get(3)?,
        dont_fetch_meta: row.get(4)?,
        ..ArtistSubject::default()
    })
}

#[cfg(test)]
mod tests {
    use super::DbManager;
    use crate::protocol::{ArtistSubject, ImageKind, RefreshRecord, RefreshStatus};
    use std::path::{Path, PathBuf};

    #[test]
    fn test_add_artist_round_trips_catalog_fields() {
        let db = DbManager::open_in_memory().expect("in-memory db");
        let id = db
            .add_artist("Sample Group", Some(Path::new("/music/Sample Group")), Some("mbid-1"))
            .expect("add artist");

        let artist = db.get_artist(&id).expect("query").expect("artist exists");
        assert_eq!(artist.name, "Sample Group");
        assert_eq!(artist.path, Some(PathBuf::from("/music/Sample Group")));
        assert_eq!(artist.musicbrainz_id(), Some("mbid-1"));
        assert!(!artist.dont_fetch_meta);
        assert!(artist.refresh_records.is_empty());
    }

    #[test]
    fn test_get_artist_returns_none_for_unknown_id() {
        let db = DbManager::open_in_memory().expect("in-memory db");
        assert!(db.get_artist("missing").expect("query").is_none());
        assert!(!db.set_artist_locked("missing", true).expect("update"));
    }

    #[test]
    fn test_save_artist_state_replaces_images_and_upserts_records() {
        let db = DbManager::open_in_memory().expect("in-memory db");
        let id = db.add_artist("Sample Group", None, Some("mbid-1")).expect("add artist");
        let mut artist = db.get_artist(&id).expect("query").expect("artist exists");

        artist.attach_image(ImageKind::Logo, PathBuf::from("/data/logo.png"));
        artist.attach_image(ImageKind::Backdrop, PathBuf::from("/data/Backdrop.jpg"));
        artist.attach_image(ImageKind::Backdrop, PathBuf::from("/data/Backdrop1.jpg"));
        artist.refresh_records.insert(
            "FanArt".to_string(),
            RefreshRecord {
                last_refreshed_unix_ms: 1_000,
                status: RefreshStatus::Success,
                provider_version: "5".to_string(),
            },
        );
        db.save_artist_state(&artist).expect("save state");

        artist.images.clear();
        artist.refresh_records.insert(
            "FanArt".to_string(),
            RefreshRecord {
                last_refreshed_unix_ms: 2_000,
                status: RefreshStatus::Failure,
                provider_version: "5".to_string(),
            },
        );
        db.save_artist_state(&artist).expect("save state again");

        let stored = db.get_artist(&id).expect("query").expect("artist exists");
        assert!(!stored.has_image(ImageKind::Logo));
        assert_eq!(
            stored.backdrops,
            vec![
                PathBuf::from("/data/Backdrop.jpg"),
                PathBuf::from("/data/Backdrop1.jpg")
            ]
        );
        let record = stored.refresh_record("FanArt").expect("record stored");
        assert_eq!(record.last_refreshed_unix_ms, 2_000);
        assert_eq!(record.status, RefreshStatus::Failure);
    }

    #[test]
    fn test_locked_flag_is_persisted() {
        let db = DbManager::open_in_memory().expect("in-memory db");
        let id = db.add_artist("Sample Group", None, None).expect("add artist");
        assert!(db.set_artist_locked(&id, true).expect("lock"));

        let artists = db.get_all_artists().expect("list");
        assert_eq!(artists.len(), 1);
        assert!(artists[0].dont_fetch_meta);
        assert_eq!(artists[0].musicbrainz_id(), None);
    }

    #[test]
    fn test_saving_state_for_unknown_artist_fails_without_partial_rows() {
        let db = DbManager::open_in_memory().expect("in-memory db");
        let mut artist = ArtistSubject {
            id: "not-in-catalog".to_string(),
            name: "Removed Group".to_string(),
            ..ArtistSubject::default()
        };
        artist.attach_image(ImageKind::Logo, PathBuf::from("/data/logo.png"));

        assert!(db.save_artist_state(&artist).is_err());
        assert!(db.get_artist("not-in-catalog").expect("query").is_none());
    }
}
