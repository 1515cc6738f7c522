// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only blood sugar log.

use carbwise_core::CarbwiseError;
use carbwise_core::types::{BloodSugarRecord, UserId};
use rusqlite::params;

use crate::database::{Database, map_tr_err, now_timestamp};

pub async fn create_blood_sugar_record(
    db: &Database,
    user_id: UserId,
    value: f64,
) -> Result<BloodSugarRecord, CarbwiseError> {
    db.connection()
        .call(move |conn| {
            let recorded_at = now_timestamp();
            conn.execute(
                "INSERT INTO blood_sugar_records (user_id, value, recorded_at) VALUES (?1, ?2, ?3)",
                params![user_id.0, value, recorded_at],
            )?;
            Ok(BloodSugarRecord {
                id: conn.last_insert_rowid(),
                user_id,
                value,
                recorded_at,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent readings first.
pub async fn list_blood_sugar_records(
    db: &Database,
    user_id: UserId,
    limit: usize,
) -> Result<Vec<BloodSugarRecord>, CarbwiseError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, value, recorded_at FROM blood_sugar_records
                 WHERE user_id = ?1 ORDER BY recorded_at DESC, id DESC LIMIT ?2",
            )?;
            let records = stmt
                .query_map(params![user_id.0, limit], |row| {
                    Ok(BloodSugarRecord {
                        id: row.get(0)?,
                        user_id: UserId(row.get(1)?),
                        value: row.get(2)?,
                        recorded_at: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>();
            records
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::users::get_or_create_user;
    use carbwise_core::types::{ExternalUserId, UserProfile};

    #[tokio::test]
    async fn records_append_and_list_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sugar.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
        let user = get_or_create_user(&db, ExternalUserId(3), &UserProfile::default())
            .await
            .unwrap();

        create_blood_sugar_record(&db, user.id, 5.6).await.unwrap();
        create_blood_sugar_record(&db, user.id, 7.2).await.unwrap();

        let records = list_blood_sugar_records(&db, user.id, 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].value, 7.2);
        assert_eq!(records[1].value, 5.6);
    }
}
