// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Photo download for Telegram messages.

use carbwise_core::error::CarbwiseError;
use carbwise_core::types::MessageContent;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileMeta, PhotoSize};
use tracing::debug;

/// Downloads a file from Telegram servers by its file metadata.
pub async fn download_file(bot: &Bot, file_meta: &FileMeta) -> Result<Vec<u8>, CarbwiseError> {
    let file = bot
        .get_file(file_meta.id.clone())
        .await
        .map_err(|e| CarbwiseError::Channel {
            message: format!("failed to get file info: {e}"),
            source: Some(Box::new(e)),
        })?;

    let mut buf = Vec::new();
    bot.download_file(&file.path, &mut buf)
        .await
        .map_err(|e| CarbwiseError::Channel {
            message: format!("failed to download file: {e}"),
            source: Some(Box::new(e)),
        })?;

    debug!(file_id = %file_meta.id, size = buf.len(), "downloaded file from Telegram");
    Ok(buf)
}

/// The largest variant of a photo. Telegram lists sizes smallest first.
pub fn largest(photos: &[PhotoSize]) -> Option<&PhotoSize> {
    photos.iter().max_by_key(|p| u64::from(p.width) * u64::from(p.height))
}

/// Downloads the largest photo variant and keeps its file id as reference.
pub async fn extract_photo_content(
    bot: &Bot,
    photos: &[PhotoSize],
    caption: Option<&str>,
) -> Result<MessageContent, CarbwiseError> {
    let largest = largest(photos).ok_or_else(|| CarbwiseError::Channel {
        message: "photo array is empty".into(),
        source: None,
    })?;

    let data = download_file(bot, &largest.file).await?;

    Ok(MessageContent::Photo {
        data,
        caption: caption.map(str::to_string),
        file_ref: Some(largest.file.id.to_string()),
    })
}
