// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Image payloads and the prompts shared by every vision provider.

use crate::error::CarbwiseError;

/// Rationale marker a provider uses to signal that no food was found.
pub const NO_FOOD_MARKER: &str = "не обнаружена еда";

/// Full no-food rationale, as requested from the model.
pub const NO_FOOD_MESSAGE: &str =
    "На изображении не обнаружена еда. Пожалуйста, отправьте фото блюда для анализа.";

/// Replies containing any of these are refusals, not weights.
const WEIGHT_REFUSALS: [&str; 3] = ["невозможно", "нет еды", "не видно"];

/// Longest reply still accepted as a bare weight.
const MAX_WEIGHT_REPLY_LEN: usize = 10;

pub const WEIGHT_PROMPT: &str = "Оцени вес еды в граммах, используя визуальные подсказки:

РЕФЕРЕНСНЫЕ ОБЪЕКТЫ для масштаба:
- Тарелка стандартная: диаметр 24-26см
- Столовая ложка или вилка: длина 20см
- Стакан: высота 10-12см, диаметр 7-8см
- Чашка кофе: диаметр 8-9см

ТИПИЧНЫЕ ПОРЦИИ:
- Рис/гречка/макароны: 150-250г
- Мясо/рыба: 100-200г
- Овощи свежие: 100-200г
- Хлеб (ломтик): 25-30г
- Картофель (средний): 100-150г
- Яйцо: 50-60г

Учитывай размер порции относительно посуды, высоту блюда и плотность продуктов.

Верни ТОЛЬКО число в граммах (например: 180)";

/// Builds the carbohydrate analysis prompt. A weight of `None` asks the
/// model to estimate it.
pub fn analysis_prompt(weight_grams: Option<f64>) -> String {
    let weight = weight_grams.unwrap_or(0.0);
    format!(
        "Вы — точный ассистент по анализу продуктов питания для контроля диабета. \
Распознайте продукты на изображении, оцените их вес, если он не указан, и рассчитайте общее количество углеводов.

Вес блюда: {weight:.1} г (если 0 - оцените самостоятельно).

1. Определите все съедобные продукты, включая напитки с калориями.
2. Если еды нет (пустая посуда, приборы, не еда), верните ответ формата A.
3. Для каждого продукта оцените вес и углеводы, включая соусы и панировку.
4. Сложите углеводы всех продуктов.
5. Уверенность: \"high\" если продукты хорошо видны, \"medium\" при неясностях, \"low\" если распознать сложно.

Ответ ТОЛЬКО в JSON.

A. Еда не обнаружена:
{{\"food_items\":[],\"carbs\":0,\"confidence\":\"low\",\"analysis_text\":\"{NO_FOOD_MESSAGE}\",\"weight\":0}}

B. Еда найдена:
{{\"food_items\":[\"продукт1\",\"продукт2\"],\"carbs\":X.X,\"confidence\":\"high/medium/low\",\"analysis_text\":\"ПОДРОБНЫЙ АНАЛИЗ НА РУССКОМ: 1. Название блюда: Xг, Yг углеводов\",\"weight\":X.X}}"
    )
}

/// Interprets a weight-estimation reply as grams.
pub fn parse_weight_reply(reply: &str) -> Result<f64, CarbwiseError> {
    let reply = reply.trim();
    let lowered = reply.to_lowercase();
    if WEIGHT_REFUSALS.iter().any(|marker| lowered.contains(marker)) {
        return Err(CarbwiseError::parse(format!(
            "provider could not estimate weight: {reply}"
        )));
    }
    if reply.chars().count() > MAX_WEIGHT_REPLY_LEN {
        return Err(CarbwiseError::parse(format!(
            "weight reply too long: {reply}"
        )));
    }
    let digits = lowered.trim_end_matches("грамм").trim_end_matches('г').trim();
    digits
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|grams| grams.is_finite() && *grams > 0.0)
        .ok_or_else(|| CarbwiseError::parse(format!("weight reply is not a number: {reply}")))
}

/// Raw image bytes with their detected MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
}

impl ImageInput {
    pub fn new(data: Vec<u8>) -> Self {
        let mime_type = sniff_mime_type(&data);
        Self { data, mime_type }
    }
}

/// Detects PNG and GIF by magic bytes; everything else is treated as JPEG.
pub fn sniff_mime_type(data: &[u8]) -> &'static str {
    match data {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', ..] => "image/gif",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_formats() {
        assert_eq!(sniff_mime_type(&[0x89, b'P', b'N', b'G', 0x0D]), "image/png");
        assert_eq!(sniff_mime_type(b"GIF89a"), "image/gif");
        assert_eq!(sniff_mime_type(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(sniff_mime_type(&[]), "image/jpeg");
    }

    #[test]
    fn weight_reply_accepts_bare_numbers() {
        assert_eq!(parse_weight_reply("180").unwrap(), 180.0);
        assert_eq!(parse_weight_reply(" 250.5\n").unwrap(), 250.5);
        assert_eq!(parse_weight_reply("200г").unwrap(), 200.0);
    }

    #[test]
    fn weight_reply_rejects_refusals_and_prose() {
        assert!(parse_weight_reply("Невозможно").is_err());
        assert!(parse_weight_reply("нет еды").is_err());
        assert!(parse_weight_reply("примерно 180 грамм на тарелке").is_err());
        assert!(parse_weight_reply("abc").is_err());
        assert!(parse_weight_reply("0").is_err());
    }

    #[test]
    fn analysis_prompt_embeds_weight_and_no_food_contract() {
        let prompt = analysis_prompt(Some(180.0));
        assert!(prompt.contains("180.0 г"));
        assert!(prompt.contains(NO_FOOD_MESSAGE));
        assert!(analysis_prompt(None).contains("0.0 г"));
    }
}
