// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dosing-ratio period CRUD.
//!
//! Statements always filter on `user_id` so one user can never touch
//! another user's periods.

use carbwise_core::types::{NewRatioPeriod, RatioBatch, RatioPeriod, UserId};
use carbwise_core::{CarbwiseError, TimePeriod};
use rusqlite::{Row, params};

use crate::database::{Database, map_tr_err, now_timestamp};

fn row_to_period(row: &Row<'_>) -> rusqlite::Result<RatioPeriod> {
    let start: u32 = row.get(2)?;
    let end: u32 = row.get(3)?;
    let period = TimePeriod::from_minutes(start, end).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Integer, Box::new(e))
    })?;
    Ok(RatioPeriod {
        id: row.get(0)?,
        user_id: UserId(row.get(1)?),
        period,
        ratio: row.get(4)?,
    })
}

fn not_found(id: i64) -> CarbwiseError {
    CarbwiseError::NotFound {
        entity: "ratio_period",
        id: id.to_string(),
    }
}

/// List a user's periods ordered by start minute.
pub async fn list_ratio_periods(
    db: &Database,
    user_id: UserId,
) -> Result<Vec<RatioPeriod>, CarbwiseError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, start_minute, end_minute, ratio
                 FROM ratio_periods WHERE user_id = ?1
                 ORDER BY start_minute, id",
            )?;
            let periods = stmt
                .query_map(params![user_id.0], row_to_period)?
                .collect::<Result<Vec<_>, _>>();
            periods
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a period and return it with its new id.
pub async fn create_ratio_period(
    db: &Database,
    user_id: UserId,
    new: &NewRatioPeriod,
) -> Result<RatioPeriod, CarbwiseError> {
    let new = new.clone();
    db.connection()
        .call(move |conn| {
            let id = insert_period(conn, user_id, &new)?;
            Ok(RatioPeriod {
                id,
                user_id,
                period: new.period,
                ratio: new.ratio,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Overwrite bounds and ratio of an existing period.
pub async fn update_ratio_period(db: &Database, period: &RatioPeriod) -> Result<(), CarbwiseError> {
    let period = period.clone();
    let id = period.id;
    let changed = db
        .connection()
        .call(move |conn| update_period(conn, &period))
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(not_found(id));
    }
    Ok(())
}

/// Delete one period.
pub async fn delete_ratio_period(
    db: &Database,
    user_id: UserId,
    id: i64,
) -> Result<(), CarbwiseError> {
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM ratio_periods WHERE id = ?1 AND user_id = ?2",
                params![id, user_id.0],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(not_found(id));
    }
    Ok(())
}

/// Delete every period of a user.
pub async fn delete_all_ratio_periods(
    db: &Database,
    user_id: UserId,
) -> Result<usize, CarbwiseError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM ratio_periods WHERE user_id = ?1",
                params![user_id.0],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Outcome of a batch inside the transaction closure.
enum BatchOutcome {
    Applied,
    Missing(i64),
}

/// Apply deletes, updates and inserts atomically. A missing target rolls
/// the whole batch back.
pub async fn apply_ratio_batch(
    db: &Database,
    user_id: UserId,
    batch: &RatioBatch,
) -> Result<(), CarbwiseError> {
    let batch = batch.clone();
    let outcome = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            for id in &batch.delete {
                let changed = tx.execute(
                    "DELETE FROM ratio_periods WHERE id = ?1 AND user_id = ?2",
                    params![id, user_id.0],
                )?;
                if changed == 0 {
                    return Ok(BatchOutcome::Missing(*id));
                }
            }
            for period in &batch.update {
                if period.user_id != user_id || update_period(&tx, period)? == 0 {
                    return Ok(BatchOutcome::Missing(period.id));
                }
            }
            for new in &batch.insert {
                insert_period(&tx, user_id, new)?;
            }
            tx.commit()?;
            Ok(BatchOutcome::Applied)
        })
        .await
        .map_err(map_tr_err)?;

    match outcome {
        BatchOutcome::Applied => Ok(()),
        BatchOutcome::Missing(id) => Err(not_found(id)),
    }
}

fn insert_period(
    conn: &rusqlite::Connection,
    user_id: UserId,
    new: &NewRatioPeriod,
) -> rusqlite::Result<i64> {
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO ratio_periods (user_id, start_minute, end_minute, ratio, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![
            user_id.0,
            new.period.start_minute(),
            new.period.end_minute(),
            new.ratio,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn update_period(conn: &rusqlite::Connection, period: &RatioPeriod) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE ratio_periods
         SET start_minute = ?1, end_minute = ?2, ratio = ?3, updated_at = ?4
         WHERE id = ?5 AND user_id = ?6",
        params![
            period.start_minute(),
            period.end_minute(),
            period.ratio,
            now_timestamp(),
            period.id,
            period.user_id.0,
        ],
    )
}
