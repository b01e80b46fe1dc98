//! Utility functions for export file naming

use crate::types::ExportFormat;
use regex::Regex;
use std::path::Path;

/// Maximum length (in characters) of one sanitized name component
pub const MAX_COMPONENT_CHARS: usize = 100;

const UNTITLED: &str = "Untitled";
const UNKNOWN_WORKSPACE: &str = "Unknown";

/// Make `name` safe to use inside a file name on every major filesystem
///
/// Reserved characters (`<>:"/\|?*`) and control characters become `_`,
/// whitespace runs collapse into a single `_`, trailing dots are dropped and
/// the result is capped at [`MAX_COMPONENT_CHARS`] characters.
///
/// # Examples
///
/// ```
/// use suno_export::utils::sanitize_component;
///
/// assert_eq!(sanitize_component("AC/DC: Live?"), "AC_DC__Live_");
/// assert_eq!(sanitize_component("  lo   fi  "), "_lo_fi_");
/// ```
pub fn sanitize_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_whitespace = false;

    for c in name.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control() {
            out.push('_');
        } else {
            out.push(c);
        }
    }

    let mut capped: String = out.chars().take(MAX_COMPONENT_CHARS).collect();
    while capped.ends_with('.') {
        capped.pop();
    }
    capped
}

/// Deterministic file name for a clip export
///
/// The name is `<workspace>-<title>-<clip id>.<ext>`, each part sanitized. The
/// clip id keeps names unique across clips sharing a title, and because the
/// name depends only on its inputs, repeated runs target the same path.
pub fn export_filename(
    workspace_name: &str,
    title: &str,
    clip_id: &str,
    format: ExportFormat,
) -> String {
    let workspace = non_empty_or(sanitize_component(workspace_name), UNKNOWN_WORKSPACE);
    let title = non_empty_or(sanitize_component(title), UNTITLED);
    let id: String = clip_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{workspace}-{title}-{id}.{}", format.extension())
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim_matches('_').is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

fn clip_id_pattern() -> Option<&'static Regex> {
    static PATTERN: std::sync::OnceLock<Option<Regex>> = std::sync::OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?i)[_-]([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})\.mp3$",
            )
            .ok()
        })
        .as_ref()
}

/// Recover the clip id from an exported MP3 file name
///
/// Accepts both `<...>-<id>.mp3` (this crate's scheme) and the older
/// `<title>_<id>.mp3` scheme.
pub fn clip_id_from_filename(filename: &str) -> Option<String> {
    clip_id_pattern()?
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// Sibling path with the extension of `format`
pub fn with_format_extension(path: &Path, format: ExportFormat) -> std::path::PathBuf {
    path.with_extension(format.extension())
}

/// Shorten a secret for log output
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(6).collect();
    format!("{prefix}…({} chars)", secret.chars().count())
}
