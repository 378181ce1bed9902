//! Summary renderers for a finished journal. All of them are pure functions
//! of the entry sequence and never touch the journal itself.

use crate::journal::{Journal, LogEntry};

const SUCCESS_COLOR: &str = "#2e7d32";
const FAILURE_COLOR: &str = "#c62828";

/// Escape `&`, `<`, `>` and turn newlines into `<br/>`.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', "<br/>")
}

/// Render the journal as a small HTML document for a summary view.
pub fn to_html(journal: &Journal) -> String {
    let mut out = String::from("<html><body style='font-family: monospace; font-size: 12px;'>");

    for entry in journal.entries() {
        let (color, icon) = if entry.is_success() {
            (SUCCESS_COLOR, "✓")
        } else {
            (FAILURE_COLOR, "✗")
        };

        out.push_str("<div style='margin-bottom: 10px;'>");
        out.push_str(&format!(
            "<b style='color: {};'>{} {}</b><br/>",
            color,
            icon,
            escape_html(&entry.label)
        ));
        if entry.has_output() {
            out.push_str("<pre style='background: #f5f5f5; padding: 5px; margin: 5px 0; white-space: pre-wrap;'>");
            out.push_str(&escape_html(&entry.output));
            out.push_str("</pre>");
        }
        out.push_str("</div>");
    }

    let (color, status) = if journal.has_error() {
        (FAILURE_COLOR, "errors occurred during the operation")
    } else {
        (SUCCESS_COLOR, "all operations succeeded")
    };
    out.push_str(&format!("<p><b style='color: {};'>{}</b></p>", color, status));
    out.push_str("</body></html>");
    out
}

fn plain_header(entry: &LogEntry) -> String {
    let tag = if entry.is_success() { "[OK]" } else { "[FAIL]" };
    format!("{} {}", tag, entry.label)
}

/// Render the journal as plain text. Output lines are indented by two spaces
/// so that only entry headers start at column zero.
pub fn to_plain_text(journal: &Journal) -> String {
    let mut out = String::new();
    for entry in journal.entries() {
        out.push_str(&plain_header(entry));
        out.push('\n');
        if entry.has_output() {
            for line in entry.output.trim_end().lines() {
                out.push_str("  ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push('\n');
    }
    out
}

/// Count the entries in a plain-text transcript produced by [`to_plain_text`].
pub fn count_plain_entries(text: &str) -> usize {
    text.lines()
        .filter(|l| l.starts_with("[OK] ") || l.starts_with("[FAIL] "))
        .count()
}
