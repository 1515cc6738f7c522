// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Food analyses and their corrections. Both tables are insert-only.

use carbwise_core::CarbwiseError;
use carbwise_core::types::{
    AnalysisCorrection, Confidence, FoodAnalysisRecord, NewCorrection, NewFoodAnalysis, UserId,
};
use rusqlite::{Row, params};

use crate::database::{Database, map_tr_err, now_timestamp};

fn row_to_analysis(row: &Row<'_>) -> rusqlite::Result<FoodAnalysisRecord> {
    let food_items: String = row.get(5)?;
    let food_items = serde_json::from_str(&food_items).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let confidence: String = row.get(8)?;
    Ok(FoodAnalysisRecord {
        id: row.get(0)?,
        user_id: UserId(row.get(1)?),
        image_ref: row.get(2)?,
        declared_weight_grams: row.get(3)?,
        resolved_weight_grams: row.get(4)?,
        food_items,
        carbs_grams: row.get(6)?,
        bread_units: row.get(7)?,
        confidence: Confidence::from_label(&confidence),
        confidence_score: row.get(9)?,
        rationale: row.get(10)?,
        provider: row.get(11)?,
        ratio: row.get(12)?,
        dose_units: row.get(13)?,
        created_at: row.get(14)?,
    })
}

/// Persist an analysis; the confidence score is derived from its bucket.
pub async fn create_food_analysis(
    db: &Database,
    analysis: &NewFoodAnalysis,
) -> Result<FoodAnalysisRecord, CarbwiseError> {
    let food_items = serde_json::to_string(&analysis.food_items).map_err(|e| {
        CarbwiseError::Storage {
            source: Box::new(e),
        }
    })?;
    let analysis = analysis.clone();
    db.connection()
        .call(move |conn| {
            let created_at = now_timestamp();
            let score = analysis.confidence.score();
            conn.execute(
                "INSERT INTO food_analyses (
                     user_id, image_ref, declared_weight_grams, resolved_weight_grams,
                     food_items, carbs_grams, bread_units, confidence, confidence_score,
                     rationale, provider, ratio, dose_units, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    analysis.user_id.0,
                    analysis.image_ref,
                    analysis.declared_weight_grams,
                    analysis.resolved_weight_grams,
                    food_items,
                    analysis.carbs_grams,
                    analysis.bread_units,
                    analysis.confidence.to_string(),
                    score,
                    analysis.rationale,
                    analysis.provider,
                    analysis.ratio,
                    analysis.dose_units,
                    created_at,
                ],
            )?;
            Ok(FoodAnalysisRecord {
                id: conn.last_insert_rowid(),
                user_id: analysis.user_id,
                image_ref: analysis.image_ref,
                declared_weight_grams: analysis.declared_weight_grams,
                resolved_weight_grams: analysis.resolved_weight_grams,
                food_items: analysis.food_items,
                carbs_grams: analysis.carbs_grams,
                bread_units: analysis.bread_units,
                confidence: analysis.confidence,
                confidence_score: score,
                rationale: analysis.rationale,
                provider: analysis.provider,
                ratio: analysis.ratio,
                dose_units: analysis.dose_units,
                created_at,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent analyses first.
pub async fn list_food_analyses(
    db: &Database,
    user_id: UserId,
    limit: usize,
) -> Result<Vec<FoodAnalysisRecord>, CarbwiseError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, image_ref, declared_weight_grams, resolved_weight_grams,
                        food_items, carbs_grams, bread_units, confidence, confidence_score,
                        rationale, provider, ratio, dose_units, created_at
                 FROM food_analyses WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )?;
            let analyses = stmt
                .query_map(params![user_id.0, limit], row_to_analysis)?
                .collect::<Result<Vec<_>, _>>();
            analyses
        })
        .await
        .map_err(map_tr_err)
}

/// Record a correction against an existing analysis of the same user.
pub async fn create_correction(
    db: &Database,
    correction: &NewCorrection,
) -> Result<AnalysisCorrection, CarbwiseError> {
    let correction = correction.clone();
    let analysis_id = correction.analysis_id;
    let created = db
        .connection()
        .call(move |conn| {
            let created_at = now_timestamp();
            let inserted = conn.execute(
                "INSERT INTO analysis_corrections (
                     analysis_id, user_id, original_carbs, corrected_carbs,
                     original_weight, corrected_weight, created_at)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
                 WHERE EXISTS (SELECT 1 FROM food_analyses WHERE id = ?1 AND user_id = ?2)",
                params![
                    correction.analysis_id,
                    correction.user_id.0,
                    correction.original_carbs,
                    correction.corrected_carbs,
                    correction.original_weight,
                    correction.corrected_weight,
                    created_at,
                ],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            Ok(Some(AnalysisCorrection {
                id: conn.last_insert_rowid(),
                analysis_id: correction.analysis_id,
                user_id: correction.user_id,
                original_carbs: correction.original_carbs,
                corrected_carbs: correction.corrected_carbs,
                original_weight: correction.original_weight,
                corrected_weight: correction.corrected_weight,
                created_at,
            }))
        })
        .await
        .map_err(map_tr_err)?;

    created.ok_or_else(|| CarbwiseError::NotFound {
        entity: "food_analysis",
        id: analysis_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::users::get_or_create_user;
    use carbwise_core::types::{ExternalUserId, UserProfile};

    async fn setup() -> (tempfile::TempDir, Database, UserId) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analyses.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
        let user = get_or_create_user(&db, ExternalUserId(5), &UserProfile::default())
            .await
            .unwrap();
        (dir, db, user.id)
    }

    fn sample(user_id: UserId, carbs: f64) -> NewFoodAnalysis {
        NewFoodAnalysis {
            user_id,
            image_ref: Some("file-123".into()),
            declared_weight_grams: None,
            resolved_weight_grams: Some(250.0),
            food_items: vec!["гречка".into(), "котлета".into()],
            carbs_grams: carbs,
            bread_units: carbs / 12.0,
            confidence: Confidence::High,
            rationale: "1. Гречка: 150г, 30г углеводов".into(),
            provider: "gemini".into(),
            ratio: Some(1.2),
            dose_units: carbs / 12.0 * 1.2,
        }
    }

    #[tokio::test]
    async fn analysis_round_trip_keeps_items_and_score() {
        let (_dir, db, user) = setup().await;
        let created = create_food_analysis(&db, &sample(user, 60.0)).await.unwrap();
        assert_eq!(created.confidence_score, 0.9);

        let listed = list_food_analyses(&db, user, 10).await.unwrap();
        assert_eq!(listed, vec![created]);
        assert_eq!(listed[0].food_items, vec!["гречка", "котлета"]);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_limited() {
        let (_dir, db, user) = setup().await;
        for carbs in [10.0, 20.0, 30.0] {
            create_food_analysis(&db, &sample(user, carbs)).await.unwrap();
        }
        let listed = list_food_analyses(&db, user, 2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].carbs_grams, 30.0);
        assert_eq!(listed[1].carbs_grams, 20.0);
    }

    #[tokio::test]
    async fn correction_leaves_analysis_untouched() {
        let (_dir, db, user) = setup().await;
        let analysis = create_food_analysis(&db, &sample(user, 60.0)).await.unwrap();

        let correction = create_correction(
            &db,
            &NewCorrection {
                analysis_id: analysis.id,
                user_id: user,
                original_carbs: 60.0,
                corrected_carbs: 45.0,
                original_weight: Some(250.0),
                corrected_weight: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(correction.corrected_carbs, 45.0);

        let listed = list_food_analyses(&db, user, 1).await.unwrap();
        assert_eq!(listed[0].carbs_grams, 60.0);
    }

    #[tokio::test]
    async fn correction_for_foreign_analysis_is_rejected() {
        let (_dir, db, user) = setup().await;
        let analysis = create_food_analysis(&db, &sample(user, 60.0)).await.unwrap();
        let other = get_or_create_user(&db, ExternalUserId(6), &UserProfile::default())
            .await
            .unwrap();

        let err = create_correction(
            &db,
            &NewCorrection {
                analysis_id: analysis.id,
                user_id: other.id,
                original_carbs: 60.0,
                corrected_carbs: 10.0,
                original_weight: None,
                corrected_weight: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CarbwiseError::NotFound { .. }));
    }
}
