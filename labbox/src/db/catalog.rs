//! Challenge, image and user tables.
//!
//! Read by the instance manager; written only by the catalog import.

use labbox_shared::errors::LabboxResult;
use rusqlite::{OptionalExtension, Row, params};

use super::{Database, storage};
use crate::models::{Challenge, Image, User};

fn challenge_from_row(row: &Row<'_>) -> rusqlite::Result<Challenge> {
    Ok(Challenge {
        id: row.get(0)?,
        name: row.get(1)?,
        points: row.get(2)?,
        flag: row.get(3)?,
        dynamic_flag: row.get(4)?,
        image_id: row.get(5)?,
        duration_minutes: row.get(6)?,
        enabled: row.get(7)?,
    })
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<Image> {
    Ok(Image {
        id: row.get(0)?,
        name: row.get(1)?,
        registry: row.get(2)?,
        cpu_limit: row.get(3)?,
        memory_limit_mib: row.get(4)?,
        exposed: row.get(5)?,
    })
}

impl Database {
    // ========================================================================
    // CHALLENGES
    // ========================================================================

    pub fn upsert_challenge(&self, challenge: &Challenge) -> LabboxResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO challenges \
                (id, name, points, flag, dynamic_flag, image_id, duration_minutes, enabled) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(id) DO UPDATE SET \
                name = excluded.name, points = excluded.points, flag = excluded.flag, \
                dynamic_flag = excluded.dynamic_flag, image_id = excluded.image_id, \
                duration_minutes = excluded.duration_minutes, enabled = excluded.enabled",
            params![
                challenge.id,
                challenge.name,
                challenge.points,
                challenge.flag,
                challenge.dynamic_flag,
                challenge.image_id,
                challenge.duration_minutes,
                challenge.enabled,
            ],
        )
        .map_err(storage)?;
        Ok(())
    }

    pub fn find_challenge(&self, id: &str) -> LabboxResult<Option<Challenge>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, points, flag, dynamic_flag, image_id, duration_minutes, enabled \
             FROM challenges WHERE id = ?1",
            params![id],
            challenge_from_row,
        )
        .optional()
        .map_err(storage)
    }

    pub fn list_challenges(&self) -> LabboxResult<Vec<Challenge>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, points, flag, dynamic_flag, image_id, duration_minutes, enabled \
                 FROM challenges ORDER BY id",
            )
            .map_err(storage)?;
        let rows = stmt.query_map([], challenge_from_row).map_err(storage)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(storage)
    }

    // ========================================================================
    // IMAGES
    // ========================================================================

    pub fn upsert_image(&self, image: &Image) -> LabboxResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO images (id, name, registry, cpu_limit, memory_limit_mib, exposed) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(id) DO UPDATE SET \
                name = excluded.name, registry = excluded.registry, \
                cpu_limit = excluded.cpu_limit, memory_limit_mib = excluded.memory_limit_mib, \
                exposed = excluded.exposed",
            params![
                image.id,
                image.name,
                image.registry,
                image.cpu_limit,
                image.memory_limit_mib,
                image.exposed,
            ],
        )
        .map_err(storage)?;
        Ok(())
    }

    pub fn find_image(&self, id: &str) -> LabboxResult<Option<Image>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, registry, cpu_limit, memory_limit_mib, exposed \
             FROM images WHERE id = ?1",
            params![id],
            image_from_row,
        )
        .optional()
        .map_err(storage)
    }

    pub fn list_images(&self) -> LabboxResult<Vec<Image>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, registry, cpu_limit, memory_limit_mib, exposed \
                 FROM images ORDER BY id",
            )
            .map_err(storage)?;
        let rows = stmt.query_map([], image_from_row).map_err(storage)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(storage)
    }

    // ========================================================================
    // USERS
    // ========================================================================

    pub fn upsert_user(&self, user: &User) -> LabboxResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO users (id, name) VALUES (?1, ?2) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![user.id, user.name],
        )
        .map_err(storage)?;
        Ok(())
    }

    pub fn find_user(&self, id: &str) -> LabboxResult<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(storage)
    }
}
