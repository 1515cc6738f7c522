// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MarkdownV2 rendering for Telegram Bot API.
//!
//! Replies are built as [`RichText`] spans, so there is no user-supplied
//! markup to preserve: every span is escaped in full and bold spans are
//! wrapped in `*`.

use carbwise_core::types::{RichText, Span};

/// Characters that must be escaped in MarkdownV2 text.
const SPECIAL_CHARS: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.',
    '!',
];

/// Escapes text for Telegram MarkdownV2 parse mode.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut result = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        if SPECIAL_CHARS.contains(&ch) {
            result.push('\\');
        }
        result.push(ch);
    }
    result
}

/// Renders spans as a MarkdownV2 string.
pub fn format_for_telegram(text: &RichText) -> String {
    let mut out = String::new();
    for span in text.spans() {
        match span {
            Span::Plain(s) => out.push_str(&escape_markdown_v2(s)),
            Span::Bold(s) if s.is_empty() => {}
            Span::Bold(s) => {
                out.push('*');
                out.push_str(&escape_markdown_v2(s));
                out.push('*');
            }
        }
    }
    out
}
