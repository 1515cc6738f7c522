// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User lookup and registration.

use carbwise_core::CarbwiseError;
use carbwise_core::types::{ExternalUserId, User, UserId, UserProfile};
use rusqlite::{OptionalExtension, Row, params};

use crate::database::{Database, map_tr_err, now_timestamp};

const USER_COLUMNS: &str =
    "id, external_id, username, first_name, last_name, active_insulin_minutes, created_at";

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        external_id: ExternalUserId(row.get(1)?),
        profile: UserProfile {
            username: row.get(2)?,
            first_name: row.get(3)?,
            last_name: row.get(4)?,
        },
        active_insulin_minutes: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Returns the user with this external id, inserting it first if missing.
///
/// The upsert refreshes profile names and keeps `id`, `created_at` and the
/// active insulin duration untouched, so repeated calls resolve to one row.
pub async fn get_or_create_user(
    db: &Database,
    external_id: ExternalUserId,
    profile: &UserProfile,
) -> Result<User, CarbwiseError> {
    let profile = profile.clone();
    db.connection()
        .call(move |conn| {
            let now = now_timestamp();
            conn.execute(
                "INSERT INTO users (external_id, username, first_name, last_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT (external_id) DO UPDATE SET
                     username = excluded.username,
                     first_name = excluded.first_name,
                     last_name = excluded.last_name,
                     updated_at = excluded.updated_at",
                params![
                    external_id.0,
                    profile.username,
                    profile.first_name,
                    profile.last_name,
                    now,
                ],
            )?;
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE external_id = ?1"),
                params![external_id.0],
                row_to_user,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Get a user by internal ID.
pub async fn get_user(db: &Database, id: UserId) -> Result<Option<User>, CarbwiseError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.0],
                row_to_user,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Store the user's active insulin duration.
pub async fn set_active_insulin_duration(
    db: &Database,
    id: UserId,
    minutes: u32,
) -> Result<(), CarbwiseError> {
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE users SET active_insulin_minutes = ?1, updated_at = ?2 WHERE id = ?3",
                params![minutes, now_timestamp(), id.0],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(CarbwiseError::NotFound {
            entity: "user",
            id: id.0.to_string(),
        });
    }
    Ok(())
}
