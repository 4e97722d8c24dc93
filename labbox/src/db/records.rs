//! Solve and challenge-record tables.

use labbox_shared::errors::LabboxResult;
use rusqlite::{OptionalExtension, Row, params};

use super::{Database, storage};
use crate::models::{ChallengeRecord, Solve};

const SOLVE_COLUMNS: &str =
    "id, user_id, challenge_id, points, start_at, solved_at, used_time, used_time_str";

fn solve_from_row(row: &Row<'_>) -> rusqlite::Result<Solve> {
    Ok(Solve {
        id: row.get(0)?,
        user_id: row.get(1)?,
        challenge_id: row.get(2)?,
        points: row.get(3)?,
        start_at: row.get(4)?,
        solved_at: row.get(5)?,
        used_time: row.get(6)?,
        used_time_str: row.get(7)?,
    })
}

impl Database {
    pub fn find_solve(&self, user_id: &str, challenge_id: &str) -> LabboxResult<Option<Solve>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {SOLVE_COLUMNS} FROM solves \
                 WHERE user_id = ?1 AND challenge_id = ?2 LIMIT 1"
            ),
            params![user_id, challenge_id],
            solve_from_row,
        )
        .optional()
        .map_err(storage)
    }

    pub fn insert_solve(&self, solve: &Solve) -> LabboxResult<()> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT INTO solves ({SOLVE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                solve.id,
                solve.user_id,
                solve.challenge_id,
                solve.points,
                solve.start_at,
                solve.solved_at,
                solve.used_time,
                solve.used_time_str,
            ],
        )
        .map_err(storage)?;
        Ok(())
    }

    /// Refresh the elapsed-time fields of a solve. `solved_at` is left alone.
    pub fn update_solve_time(
        &self,
        id: &str,
        used_time: i64,
        used_time_str: &str,
    ) -> LabboxResult<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE solves SET used_time = ?1, used_time_str = ?2 WHERE id = ?3",
                params![used_time, used_time_str, id],
            )
            .map_err(storage)?;
        Ok(changed == 1)
    }

    pub fn list_solves(&self, user_id: &str) -> LabboxResult<Vec<Solve>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SOLVE_COLUMNS} FROM solves WHERE user_id = ?1 ORDER BY solved_at"
            ))
            .map_err(storage)?;
        let rows = stmt
            .query_map(params![user_id], solve_from_row)
            .map_err(storage)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(storage)
    }

    pub fn insert_challenge_record(&self, record: &ChallengeRecord) -> LabboxResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO challenge_records \
                (id, user_id, user_name, challenge_id, challenge_name, instance_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.user_id,
                record.user_name,
                record.challenge_id,
                record.challenge_name,
                record.instance_id,
                record.created_at,
            ],
        )
        .map_err(storage)?;
        Ok(())
    }

    pub fn list_challenge_records(&self, user_id: &str) -> LabboxResult<Vec<ChallengeRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, user_name, challenge_id, challenge_name, instance_id, \
                        created_at \
                 FROM challenge_records WHERE user_id = ?1 ORDER BY created_at",
            )
            .map_err(storage)?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(ChallengeRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    user_name: row.get(2)?,
                    challenge_id: row.get(3)?,
                    challenge_name: row.get(4)?,
                    instance_id: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })
            .map_err(storage)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(storage)
    }
}
