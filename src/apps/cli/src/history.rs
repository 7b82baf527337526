//! Conversation history file: a JSON array of `{role, content}` messages.

use std::path::Path;

use anyhow::{Context, Result};
use medassist_core_types::Message;

/// Read prior messages. A missing file is an empty conversation.
pub fn load_history(path: &Path) -> Result<Vec<Message>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read history file {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw)
        .with_context(|| format!("history file {} is not a message list", path.display()))
}

pub fn save_history(path: &Path, messages: &[Message]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let raw = serde_json::to_string_pretty(messages)?;
    std::fs::write(path, raw)
        .with_context(|| format!("failed to write history file {}", path.display()))
}
