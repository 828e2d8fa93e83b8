// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

/// Per-file inline cap.  Content beyond this is cut with a marker so one
/// large attachment cannot flood the context window.
const MAX_ATTACHMENT_CHARS: usize = 10_000;

/// Build the first user message: the task prompt, followed by an attached
/// files section when any paths were given.
///
/// Read errors are never fatal: the offending file is replaced inline by an
/// error marker and the task proceeds.
pub async fn compose_user_message(prompt: &str, attachments: &[PathBuf]) -> String {
    if attachments.is_empty() {
        return prompt.to_string();
    }

    let mut message = String::with_capacity(prompt.len() + 256);
    message.push_str(prompt);
    message.push_str("\n\n--- Attached Files ---\n");

    for path in attachments {
        let shown = path.display();
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                message.push_str(&format!("--- {shown} ---\n"));
                if content.chars().count() > MAX_ATTACHMENT_CHARS {
                    let cut: String = content.chars().take(MAX_ATTACHMENT_CHARS).collect();
                    message.push_str(&cut);
                    message.push_str("... (truncated)");
                } else {
                    message.push_str(&content);
                }
                message.push('\n');
            }
            Err(e) => {
                message.push_str(&format!("--- {shown} --- (error: {e})\n"));
            }
        }
    }

    message
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn no_attachments_returns_prompt_unchanged() {
        let msg = compose_user_message("do the thing", &[]).await;
        assert_eq!(msg, "do the thing");
    }

    #[tokio::test]
    async fn attachment_is_inlined_with_path_header() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "file body here").unwrap();
        let path = f.path().to_path_buf();

        let msg = compose_user_message("prompt", &[path.clone()]).await;
        assert!(msg.starts_with("prompt"));
        assert!(msg.contains("--- Attached Files ---"));
        assert!(msg.contains(&format!("--- {} ---", path.display())));
        assert!(msg.contains("file body here"));
    }

    #[tokio::test]
    async fn oversized_attachment_is_truncated() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{}", "a".repeat(MAX_ATTACHMENT_CHARS + 500)).unwrap();

        let msg = compose_user_message("p", &[f.path().to_path_buf()]).await;
        assert!(msg.contains("... (truncated)"));
        // The inlined body stops at the cap.
        let body_len = msg.matches('a').count();
        assert!(body_len <= MAX_ATTACHMENT_CHARS);
    }

    #[tokio::test]
    async fn read_error_becomes_inline_marker() {
        let missing = PathBuf::from("/tmp/crew_no_such_attachment_xyz.txt");
        let msg = compose_user_message("p", &[missing.clone()]).await;
        assert!(msg.contains(&format!("--- {} --- (error:", missing.display())));
    }

    #[tokio::test]
    async fn mixed_good_and_bad_attachments_both_appear() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "good content").unwrap();
        let missing = PathBuf::from("/tmp/crew_missing_second_file.txt");

        let msg =
            compose_user_message("p", &[f.path().to_path_buf(), missing]).await;
        assert!(msg.contains("good content"));
        assert!(msg.contains("(error:"));
    }
}
