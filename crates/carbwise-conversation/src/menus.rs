// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Menu descriptors and the fixed texts shown with them.
//!
//! Menus are transport-neutral: each button is a label plus an [`Action`]
//! payload. Channel adapters turn them into their own keyboards.

use carbwise_core::types::{Menu, MenuButton, RatioPeriod};

use crate::action::{Action, Simple};

pub const MAIN_MENU_TITLE: &str = "🤖 Carbwise";
pub const MAIN_MENU_BODY: &str = ", твой помощник в подсчете углеводов и дозы инсулина.\n\n\
Отправь фото блюда, и я посчитаю углеводы, хлебные единицы и дозу по твоему коэффициенту.\n\n\
Выбери действие:";

pub const SETTINGS_TEXT: &str = "Настройки:";

pub const HELP_TEXT: &str = "Доступные команды:
/start - Главное меню
/help - Показать это сообщение
/history - Последние измерения сахара
/correct <углеводы> [вес] - Исправить последний анализ

Для анализа еды нажмите '🍽️ Анализ еды' и отправьте фото.
Вес блюда в граммах можно указать в подписи к фото или отдельным сообщением перед фото.";

pub const UNKNOWN_COMMAND: &str =
    "Неизвестная команда. Используйте /help для просмотра доступных команд.";
pub const USE_MENU: &str = "Пожалуйста, используйте меню для выбора действия.";
pub const PRESS_ANALYZE_FIRST: &str =
    "Пожалуйста, сначала нажмите кнопку '🍽️ Анализ еды' в меню.";

pub const PERIOD_PROMPT: &str =
    "Введите период времени в формате ЧЧ:ММ-ЧЧ:ММ (например, 08:00-12:00):";
pub const RATIO_PROMPT: &str = "Введите коэффициент (количество единиц инсулина на 1 ХЕ):";
pub const ANALYZE_PROMPT: &str = "Отправьте фото еды для анализа. Вы также можете указать вес блюда в граммах в подписи к фото.";
pub const BLOOD_SUGAR_PROMPT: &str = "Введите уровень сахара в крови (ммоль/л):";
pub const DURATION_PROMPT: &str = "Введите время активного инсулина в формате ЧЧ:ММ (например, 1:30 для 1 часа и 30 минут):";
pub const CONFIRM_PROMPT: &str = "Пожалуйста, подтвердите или отмените изменения кнопками выше.";
pub const ARMED_HINT: &str =
    "Отправьте фото еды или укажите вес блюда в граммах (например: 150).";

pub const NO_RATIOS: &str = "У вас пока нет сохраненных коэффициентов. Нажмите 'Добавить' чтобы создать новый.";
pub const NO_RATIOS_TO_EDIT: &str = "Нет сохраненных коэффициентов для редактирования";
pub const NO_RATIOS_TO_DELETE: &str = "Нет сохраненных коэффициентов для удаления";
pub const RATIOS_CLEARED: &str = "✅ Все коэффициенты успешно удалены";
pub const RATIO_DELETED: &str = "✅ Коэффициент успешно удален";
pub const RATIO_NOT_FOUND: &str = "Коэффициент не найден";
pub const STALE_CHANGES: &str = "⚠️ Коэффициенты изменились, пока вы подтверждали изменения. Попробуйте еще раз.";

pub const NO_WEIGHT: &str = "Вес не указан. Я попробую оценить вес блюда автоматически.";
pub const ANALYZING: &str = "Анализирую изображение...";
pub const ANALYSIS_FAILED: &str = "Извините, произошла ошибка при анализе изображения. Пожалуйста, попробуйте еще раз через несколько минут.";

pub const SAVE_FAILED: &str =
    "Произошла ошибка при сохранении данных. Пожалуйста, попробуйте еще раз.";
pub const INTERNAL_FAILURE: &str = "Что-то пошло не так. Пожалуйста, попробуйте еще раз.";

pub const NO_BLOOD_SUGAR: &str = "У вас пока нет сохраненных измерений сахара.";
pub const CORRECT_USAGE: &str = "Использование: /correct <углеводы, г> [вес, г]\nНапример: /correct 45 180";
pub const NOTHING_TO_CORRECT: &str = "Нет анализов для корректировки. Сначала отправьте фото блюда.";

fn button(label: &str, action: impl Into<Action>) -> MenuButton {
    MenuButton::new(label, action.into().to_string())
}

pub fn main_menu() -> Menu {
    Menu::default()
        .row(vec![button("🍽️ Анализ еды", Simple::AnalyzeFood)])
        .row(vec![button("🩸 Сахар крови", Simple::BloodSugar)])
        .row(vec![button("⚙️ Настройки", Simple::Settings)])
}

pub fn settings_menu() -> Menu {
    Menu::default()
        .row(vec![button("📊 Коэф. на ХЕ", Simple::InsulinRatio)])
        .row(vec![button("⏱ Время активного инсулина", Simple::ActiveInsulinTime)])
        .row(vec![button("◀️ Главное меню", Simple::MainMenu)])
}

/// Add always; edit and delete only when there is something to act on.
pub fn ratio_menu(has_periods: bool) -> Menu {
    let mut menu = Menu::default().row(vec![button("➕ Добавить", Simple::AddInsulinRatio)]);
    if has_periods {
        menu = menu.row(vec![
            button("✏️ Изменить", Simple::EditInsulinRatio),
            button("🗑️ Удалить", Simple::DeleteInsulinRatio),
        ]);
    }
    menu.row(vec![button("◀️ Назад", Simple::Settings)])
}

/// One button per period, then the bulk action and a way back.
pub fn period_picker(
    periods: &[RatioPeriod],
    icon: &str,
    pick: fn(i64) -> Action,
    bulk: (&str, Simple),
) -> Menu {
    let mut menu = Menu::default();
    for p in periods {
        menu = menu.row(vec![button(
            &format!("{icon} {} ({:.1})", p.period, p.ratio),
            pick(p.id),
        )]);
    }
    menu.row(vec![button(bulk.0, bulk.1)])
        .row(vec![button("◀️ Назад", Simple::InsulinRatio)])
}

pub fn cancel_to_ratios() -> Menu {
    Menu::default().row(vec![button("◀️ Отмена", Simple::InsulinRatio)])
}

pub fn back_to_main() -> Menu {
    Menu::default().row(vec![button("◀️ Главное меню", Simple::MainMenu)])
}

pub fn back_to_settings() -> Menu {
    Menu::default().row(vec![button("◀️ Назад", Simple::Settings)])
}

pub fn confirm_changes() -> Menu {
    Menu::default().row(vec![
        button("✅ Да", Simple::ConfirmChanges),
        button("❌ Нет", Simple::CancelChanges),
    ])
}

/// Confirmation before wiping the schedule; `then` runs on "yes".
pub fn confirm_clear(then: Simple) -> Menu {
    Menu::default().row(vec![
        button("✅ Да, удалить все", then),
        button("❌ Нет", Simple::InsulinRatio),
    ])
}

pub fn after_analysis() -> Menu {
    Menu::default().row(vec![
        button("🏠 Главное меню", Simple::MainMenu),
        button("🔄 Новый анализ", Simple::AnalyzeFood),
    ])
}
