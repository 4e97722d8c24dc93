//! Instance table.

use labbox_shared::errors::LabboxResult;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

use super::{Database, storage};
use crate::instance::{Instance, InstanceId, InstanceStatus};

const COLUMNS: &str = "id, user_id, user_name, challenge_id, challenge_name, flag, exposed, \
     duration_minutes, cpu_limit, memory_limit_mib, status, subdomain, access_url, message, \
     created_at, expires_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Instance> {
    let status: String = row.get(10)?;
    let status = status.parse::<InstanceStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Instance {
        id: row.get(0)?,
        user_id: row.get(1)?,
        user_name: row.get(2)?,
        challenge_id: row.get(3)?,
        challenge_name: row.get(4)?,
        flag: row.get(5)?,
        exposed: row.get(6)?,
        duration_minutes: row.get(7)?,
        cpu_limit: row.get(8)?,
        memory_limit_mib: row.get(9)?,
        status,
        subdomain: row.get(11)?,
        access_url: row.get(12)?,
        message: row.get(13)?,
        created_at: row.get(14)?,
        expires_at: row.get(15)?,
    })
}

impl Database {
    /// Insert a new instance. Fails if the id is already present.
    pub fn insert_instance(&self, instance: &Instance) -> LabboxResult<()> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT INTO instances ({COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ),
            params![
                instance.id,
                instance.user_id,
                instance.user_name,
                instance.challenge_id,
                instance.challenge_name,
                instance.flag,
                instance.exposed,
                instance.duration_minutes,
                instance.cpu_limit,
                instance.memory_limit_mib,
                instance.status.as_str(),
                instance.subdomain,
                instance.access_url,
                instance.message,
                instance.created_at,
                instance.expires_at,
            ],
        )
        .map_err(storage)?;
        Ok(())
    }

    pub fn find_instance(&self, id: &InstanceId) -> LabboxResult<Option<Instance>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM instances WHERE id = ?1"),
            params![id],
            from_row,
        )
        .optional()
        .map_err(storage)
    }

    pub fn instance_exists(&self, id: &InstanceId) -> LabboxResult<bool> {
        let conn = self.conn();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM instances WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )
        .map_err(storage)
    }

    pub fn count_instances(&self) -> LabboxResult<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM instances", [], |row| row.get(0))
            .map_err(storage)?;
        Ok(count as usize)
    }

    /// All instances, newest first.
    pub fn list_instances(&self) -> LabboxResult<Vec<Instance>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM instances ORDER BY created_at DESC, id"
            ))
            .map_err(storage)?;
        let rows = stmt.query_map([], from_row).map_err(storage)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(storage)
    }

    pub fn subdomain_in_use(&self, subdomain: &str) -> LabboxResult<bool> {
        let conn = self.conn();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM instances WHERE subdomain = ?1)",
            params![subdomain],
            |row| row.get(0),
        )
        .map_err(storage)
    }

    /// Move an instance to `status` if its current status allows it.
    ///
    /// The check and the write are a single statement, so concurrent
    /// transitions cannot interleave. Returns `false` when the instance is
    /// gone or the transition is not allowed from its current status.
    pub fn transition_status(
        &self,
        id: &InstanceId,
        status: InstanceStatus,
        message: &str,
    ) -> LabboxResult<bool> {
        let allowed = InstanceStatus::predecessors(status);
        let placeholders = (0..allowed.len())
            .map(|i| format!("?{}", i + 4))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE instances SET status = ?1, message = ?2 \
             WHERE id = ?3 AND status IN ({placeholders})"
        );

        let mut values: Vec<String> = vec![
            status.as_str().to_string(),
            message.to_string(),
            id.as_str().to_string(),
        ];
        values.extend(allowed.iter().map(|s| s.as_str().to_string()));

        let conn = self.conn();
        let changed = conn
            .execute(&sql, params_from_iter(values.iter()))
            .map_err(storage)?;
        Ok(changed == 1)
    }

    pub fn update_access_url(&self, id: &InstanceId, access_url: &str) -> LabboxResult<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE instances SET access_url = ?1 WHERE id = ?2",
                params![access_url, id],
            )
            .map_err(storage)?;
        Ok(changed == 1)
    }

    /// Delete an instance. Returns `false` if it did not exist.
    pub fn delete_instance(&self, id: &InstanceId) -> LabboxResult<bool> {
        let conn = self.conn();
        let changed = conn
            .execute("DELETE FROM instances WHERE id = ?1", params![id])
            .map_err(storage)?;
        Ok(changed == 1)
    }
}
