// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Texts built from data: schedules, changesets, analysis results.

use std::fmt::Write as _;

use carbwise_analysis::{FoodAnalysis, WeightSource};
use carbwise_core::clock::format_clock;
use carbwise_core::types::{BloodSugarRecord, Confidence, RatioPeriod, RichText};
use carbwise_core::{Bound, MINUTES_PER_DAY, TimePeriod, ValidationError};
use carbwise_dosing::{DayClock, DoseRecommendation};
use carbwise_ratio::{Changeset, CoverageStatus, DeletePlan, PeriodChange, RatioSchedule};

use crate::menus;

/// Longest rationale shown under an analysis, in characters.
pub const MAX_RATIONALE_CHARS: usize = 900;

pub fn main_menu() -> RichText {
    RichText::new()
        .bold(menus::MAIN_MENU_TITLE)
        .plain(menus::MAIN_MENU_BODY)
}

fn hours(minutes: u32) -> f64 {
    f64::from(minutes) / 60.0
}

fn bounds(period: &TimePeriod) -> (String, String) {
    let end = match period.end_minute() {
        0 => MINUTES_PER_DAY,
        end => end,
    };
    (format_clock(period.start_minute()), format_clock(end))
}

/// The ratio menu body: every period and the coverage status.
pub fn schedule(schedule: &RatioSchedule) -> String {
    if schedule.periods.is_empty() {
        return menus::NO_RATIOS.to_string();
    }
    let mut text = String::from("Ваши коэффициенты:\n\n");
    for p in &schedule.periods {
        let (start, end) = bounds(&p.period);
        let _ = writeln!(text, "🕒 {start} - {end}: {:.1} ед/ХЕ", p.ratio);
    }
    text.push('\n');
    match schedule.status {
        CoverageStatus::Full => text.push_str("✅ Периоды полностью покрывают 24 часа"),
        CoverageStatus::Partial => {
            let _ = write!(
                text,
                "⚠️ Внимание: сохранено только {:.1} часов из 24\n\
                 Добавьте еще периоды, чтобы покрыть все 24 часа",
                hours(schedule.total_minutes)
            );
        }
        CoverageStatus::Exceeded => {
            let _ = write!(
                text,
                "⚠️ Внимание: сохранено {:.1} часов (больше 24)",
                hours(schedule.total_minutes)
            );
        }
    }
    text
}

pub fn period_lines(periods: &[RatioPeriod]) -> String {
    periods
        .iter()
        .map(|p| format!("• {}: {:.1} ед/ХЕ", p.period, p.ratio))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Warning shown before every period is removed.
pub fn clear_warning(periods: &[RatioPeriod], then_add: bool) -> String {
    let intro = if then_add {
        "⚠️ Внимание! Все сохраненные коэффициенты будут удалены, после чего вы сможете ввести новые."
    } else {
        "⚠️ Внимание! Все сохраненные коэффициенты будут удалены."
    };
    format!(
        "{intro}\n\nТекущие периоды:\n{}\n\nПродолжить?",
        period_lines(periods)
    )
}

pub fn edit_prompt(period: &RatioPeriod) -> String {
    format!(
        "Текущий период: {}, коэффициент {:.1} ед/ХЕ.\n\n{}",
        period.period,
        period.ratio,
        menus::PERIOD_PROMPT
    )
}

/// Human-readable list of what an edit does to the other periods.
pub fn changeset(changeset: &Changeset) -> String {
    let mut text = String::from("Новый период пересекается с существующими. Будут выполнены изменения:\n\n");
    for change in &changeset.changes {
        match change {
            PeriodChange::Delete { period, .. } => {
                let _ = writeln!(text, "• Удалить период {period}");
            }
            PeriodChange::Resize {
                from,
                to,
                ratio,
                split_off,
                ..
            } => {
                let _ = writeln!(text, "• Изменить период {from} на {to}");
                for piece in split_off {
                    let _ = writeln!(text, "• Добавить период {piece} ({ratio:.1} ед/ХЕ)");
                }
            }
        }
    }
    text.push_str("\nПродолжить?");
    text
}

pub fn delete_preview(plan: &DeletePlan) -> String {
    let mut text = format!(
        "Удалить период {} ({:.1} ед/ХЕ)?",
        plan.removed.period, plan.removed.ratio
    );
    if let Some(merge) = &plan.merge {
        let _ = write!(
            text,
            "\n\nСоседний период {} ({:.1} ед/ХЕ) будет расширен до {}.",
            merge.from, merge.ratio, merge.to
        );
    }
    text
}

pub fn ratio_saved(period: &TimePeriod, ratio: f64) -> String {
    let (start, end) = bounds(period);
    format!("✅ Коэффициент {ratio:.1} ед/ХЕ для периода {start}-{end} успешно сохранен")
}

pub fn ratio_updated(period: &TimePeriod, ratio: f64) -> String {
    let (start, end) = bounds(period);
    format!("✅ Коэффициент обновлен: {ratio:.1} ед/ХЕ для периода {start}-{end}")
}

fn clock_duration(minutes: u32) -> String {
    format!("{}:{:02}", minutes / 60, minutes % 60)
}

pub fn duration_prompt(current_minutes: u32) -> String {
    let current = if current_minutes == 0 {
        "Время активного инсулина не установлено.".to_string()
    } else {
        format!(
            "Текущее время активного инсулина: {}",
            clock_duration(current_minutes)
        )
    };
    format!("{current}\n\n{}", menus::DURATION_PROMPT)
}

pub fn duration_saved(minutes: u32) -> String {
    format!(
        "✅ Время активного инсулина установлено: {}",
        clock_duration(minutes)
    )
}

pub fn blood_sugar_saved(value: f64) -> String {
    format!("✅ Уровень сахара {value:.1} ммоль/л успешно сохранен")
}

pub fn weight_saved(grams: f64) -> String {
    format!("⚖️ Вес {grams:.0} г сохранен. Теперь отправьте фото блюда.")
}

pub fn blood_sugar_history(records: &[BloodSugarRecord], clock: &DayClock) -> String {
    if records.is_empty() {
        return menus::NO_BLOOD_SUGAR.to_string();
    }
    let mut text = String::from("📈 Последние измерения сахара:\n");
    for r in records {
        let _ = write!(
            text,
            "\n• {}: {:.1} ммоль/л",
            clock.format_timestamp(&r.recorded_at),
            r.value
        );
    }
    text
}

pub fn correction_saved(original: f64, corrected: f64) -> String {
    format!("✅ Корректировка сохранена: {original:.1} г → {corrected:.1} г углеводов")
}

/// The corrective prompt for rejected input.
pub fn validation(err: &ValidationError) -> String {
    match err {
        ValidationError::InvalidPeriodFormat | ValidationError::MinuteOutOfRange(_) => {
            "Неверный формат. Введите период в формате ЧЧ:ММ-ЧЧ:ММ (например, 08:00-12:00)".into()
        }
        ValidationError::EmptyBound => "Время начала и окончания не могут быть пустыми".into(),
        ValidationError::InvalidTimeFormat(bound) => {
            let which = match bound {
                Bound::Start => "начала",
                Bound::End => "окончания",
            };
            format!(
                "Неверный формат времени {which}. Используйте 24-часовой формат ЧЧ:ММ (например, 08:00 или 14:30)"
            )
        }
        ValidationError::StartHourOutOfRange => "Часы начала должны быть в диапазоне 00-23".into(),
        ValidationError::EndHourOutOfRange => "Часы окончания должны быть в диапазоне 00-24".into(),
        ValidationError::Hour24WithMinutes => {
            "При использовании 24 часов, минуты должны быть 00".into()
        }
        ValidationError::NonPositiveRatio => "Коэффициент должен быть больше 0".into(),
        ValidationError::InvalidNumber(_) => {
            "Пожалуйста, введите корректное число (например: 1.5)".into()
        }
        ValidationError::Overlap { conflicts } => {
            let mut text = String::from("Период пересекается с существующими периодами:\n");
            for c in conflicts {
                let _ = write!(text, "\n• {c}");
            }
            text.push_str("\n\nВведите другой период или измените существующие.");
            text
        }
        ValidationError::CoverageExceeded { total_minutes } => format!(
            "Периоды покрыли бы {:.1} часов, больше 24. Введите более короткий период.",
            hours(*total_minutes)
        ),
        ValidationError::InvalidDurationFormat => {
            "Неверный формат. Введите время в формате ЧЧ:ММ (например, 1:30)".into()
        }
        ValidationError::DurationHoursOutOfRange => "Часы должны быть числом от 0 до 24".into(),
        ValidationError::DurationMinutesOutOfRange => "Минуты должны быть числом от 0 до 59".into(),
        ValidationError::ZeroDuration => {
            "Время активного инсулина не может быть равно нулю".into()
        }
        ValidationError::InvalidWeight => {
            "Неверный формат веса. Укажите положительный вес в граммах (например: 150).".into()
        }
        ValidationError::NonPositiveBloodSugar => {
            "Пожалуйста, введите корректное число (например: 5.6)".into()
        }
        ValidationError::StaleChangeset => menus::STALE_CHANGES.into(),
    }
}

fn confidence_label(confidence: Confidence) -> &'static str {
    match confidence {
        Confidence::High => "высокая",
        Confidence::Medium => "средняя",
        Confidence::Low => "низкая",
        Confidence::Unknown => "не определена",
    }
}

/// Cuts `text` to [`MAX_RATIONALE_CHARS`] characters, marking the cut.
pub fn truncate_rationale(text: &str) -> String {
    if text.chars().count() <= MAX_RATIONALE_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MAX_RATIONALE_CHARS - 3).collect();
    cut.push_str("...");
    cut
}

/// Caption sent with the analysed photo.
pub fn analysis_caption(analysis: &FoodAnalysis, dose: &DoseRecommendation) -> RichText {
    let mut text = RichText::new().bold("🍽️ Анализ блюда").plain("\n\n");

    text.push_bold("🍞 Углеводы:");
    text.push_plain(format!(" {:.1} г\n", analysis.carbs_grams));
    text.push_bold("🥖 ХЕ:");
    text.push_plain(format!(" {:.1}\n", dose.bread_units));

    match dose.ratio() {
        Some(ratio) => {
            text.push_bold("💉 Рекомендуемая доза инсулина:");
            text.push_plain(format!(
                " {:.1} ед.\n({:.1} ХЕ × {:.1} ед/ХЕ)\n",
                dose.dose_units, dose.bread_units, ratio
            ));
        }
        None => {
            text.push_bold("💉 Рекомендация по инсулину:");
            text.push_plain(" не настроен коэффициент для текущего времени\n");
        }
    }

    text.push_bold("🎯 Уверенность:");
    text.push_plain(format!(" {}\n", confidence_label(dose.confidence)));

    match (analysis.weight_source, analysis.resolved_weight_grams) {
        (WeightSource::Declared, Some(w)) => {
            text.push_bold("⚖️ Введенный вес:");
            text.push_plain(format!(" {w:.1} г\n"));
        }
        (WeightSource::Estimated, Some(w)) => {
            text.push_bold("⚖️ Рассчитанный вес:");
            text.push_plain(format!(" {w:.1} г\n"));
        }
        _ => {
            text.push_bold("⚖️ Вес:");
            text.push_plain(" не указан\n");
        }
    }

    if !analysis.rationale.trim().is_empty() {
        text.push_plain("\n");
        text.push_bold("📊 Как считали:");
        text.push_plain("\n");
        text.push_plain(truncate_rationale(analysis.rationale.trim()));
    }
    text
}
