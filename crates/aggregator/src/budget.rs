//! Token budgeter: fits relevance-ordered records into a token ceiling.
//!
//! Records are rendered as `"<source>: <summary>"` lines joined by `\n`.
//! Selection takes the longest prefix of the candidates whose rendered text
//! stays within budget and stops at the first record that would overflow.
//! Later records are dropped even if they would fit on their own, so the
//! output is always a prefix of the relevance order.

use medctx_core::context::ContextRecord;

use crate::token;

/// The outcome of budget selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Included records, in candidate order.
    pub records: Vec<ContextRecord>,
    /// Rendered summary lines.
    pub text: String,
    /// Estimated tokens of `text`.
    pub estimated_tokens: usize,
    /// Candidates dropped at or after the first overflow.
    pub dropped: usize,
}

/// The rendered line for a record, or `None` for an empty summary.
pub fn render_line(record: &ContextRecord) -> Option<String> {
    if record.summary().is_empty() {
        None
    } else {
        Some(format!("{}: {}", record.source(), record.summary()))
    }
}

/// Select the longest prefix of `candidates` that fits in `budget` tokens.
///
/// Records with an empty summary contribute no line and always fit, so they
/// are kept if reached before the stop point.
pub fn select_within_budget(candidates: Vec<ContextRecord>, budget: usize) -> Selection {
    let total = candidates.len();
    let mut records = Vec::with_capacity(total);
    let mut text = String::new();
    let mut chars = 0usize;

    for record in candidates {
        let Some(line) = render_line(&record) else {
            records.push(record);
            continue;
        };

        let separator = usize::from(!text.is_empty());
        let next_chars = chars + separator + line.chars().count();
        if token::estimate_for_chars(next_chars) > budget {
            break;
        }

        if separator == 1 {
            text.push('\n');
        }
        text.push_str(&line);
        chars = next_chars;
        records.push(record);
    }

    let dropped = total - records.len();
    Selection {
        estimated_tokens: token::estimate_tokens(&text),
        records,
        text,
        dropped,
    }
}
