//! Structure-aware truncation of tool results.
//!
//! Tool results are the single largest context consumer in an agent loop, and
//! most of their bulk is irrelevant once the model has seen it. Truncation
//! keeps a head and a tail (the parts that usually carry the signal: leading
//! structure and trailing status) and replaces the middle with a marker that
//! reports how much was cut. For JSON-ish content the cut points are nudged
//! to nearby structural boundaries so the surviving fragments stay readable.
//!
//! The character budget is approximate: the marker itself costs a few dozen
//! characters, so output may exceed `max_chars` by up to the marker overhead.

/// Options for [`truncate_tool_result`].
#[derive(Clone, Copy, Debug)]
pub struct TruncateOptions {
    /// Fraction of the available budget given to the head. The rest goes to
    /// the tail.
    pub head_ratio: f64,
    /// Nudge cut points to structural boundaries when the content looks like
    /// JSON.
    pub json_aware: bool,
}

impl Default for TruncateOptions {
    fn default() -> Self {
        Self {
            head_ratio: 0.6,
            json_aware: true,
        }
    }
}

/// One truncated item from a batch pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TruncatedToolResult {
    pub content: String,
    pub was_truncated: bool,
}

const MARKER_PREFIX: &str = "\n[… truncated ";
const MARKER_SUFFIX: &str = " chars …]\n";
/// Slack reserved for the digits of the truncated-character count.
const MARKER_DIGIT_SLACK: usize = 10;

/// Maximum distance a JSON-aware boundary nudge may move a cut point.
const MAX_BOUNDARY_NUDGE: usize = 200;

fn marker(cut_chars: usize) -> String {
    format!("{MARKER_PREFIX}{cut_chars}{MARKER_SUFFIX}")
}

fn marker_overhead() -> usize {
    MARKER_PREFIX.len() + MARKER_SUFFIX.len() + MARKER_DIGIT_SLACK
}

/// Move `idx` down to the nearest char boundary.
fn floor_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Move `idx` up to the nearest char boundary.
fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Truncate a single tool result to roughly `max_chars` characters.
///
/// Content that already fits is returned unchanged. A zero budget collapses
/// to a bare marker. Otherwise the output is
/// `head + "\n[… truncated K chars …]\n" + tail` where K is the number of
/// characters removed.
pub fn truncate_tool_result(content: &str, max_chars: usize, options: &TruncateOptions) -> String {
    if content.len() <= max_chars {
        return content.to_string();
    }
    if max_chars == 0 {
        return "[truncated entire content]".to_string();
    }

    let overhead = marker_overhead();
    if max_chars <= overhead {
        // Budget too small for a head/tail split: keep a prefix and append
        // the marker.
        let head_end = floor_boundary(content, max_chars);
        let head = &content[..head_end];
        return format!("{head}{}", marker(content.len() - head.len()));
    }

    let available = max_chars - overhead;
    let head_ratio = options.head_ratio.clamp(0.0, 1.0);
    let mut head_len = (available as f64 * head_ratio).floor() as usize;
    let mut tail_start = content.len() - (available - head_len);

    if options.json_aware && looks_like_json(content) {
        let nudge = MAX_BOUNDARY_NUDGE.min((available as f64 * 0.15) as usize);
        head_len = nudge_head_to_boundary(content, head_len, nudge);
        tail_start = nudge_tail_to_boundary(content, tail_start, nudge);
    }

    let head_end = floor_boundary(content, head_len);
    let tail_start = ceil_boundary(content, tail_start);

    let head = &content[..head_end];
    let tail = &content[tail_start..];
    let cut = content.len() - head.len() - tail.len();
    format!("{head}{}{tail}", marker(cut))
}

fn looks_like_json(content: &str) -> bool {
    matches!(content.trim_start().as_bytes().first(), Some(b'{' | b'['))
}

/// Pull the head cut backward to just after the nearest structural delimiter.
fn nudge_head_to_boundary(content: &str, cut: usize, max_nudge: usize) -> usize {
    let cut = floor_boundary(content, cut);
    let window_start = cut.saturating_sub(max_nudge);
    let window = &content.as_bytes()[window_start..cut];
    match window
        .iter()
        .rposition(|b| matches!(b, b'\n' | b',' | b'}' | b']'))
    {
        Some(pos) => window_start + pos + 1,
        None => cut,
    }
}

/// Push the tail start forward to the nearest structural opener or newline.
fn nudge_tail_to_boundary(content: &str, start: usize, max_nudge: usize) -> usize {
    let start = ceil_boundary(content, start);
    let window_end = (start + max_nudge).min(content.len());
    let window = &content.as_bytes()[start..window_end];
    match window.iter().position(|b| matches!(b, b'\n' | b'{' | b'[')) {
        Some(pos) if window[pos] == b'\n' => start + pos + 1,
        Some(pos) => start + pos,
        None => start,
    }
}

/// Truncate a batch of tool results against a shared character budget.
///
/// When everything fits, items pass through untouched. Otherwise each item
/// receives a share of the budget proportional to its size (uniform when all
/// items are empty) and is truncated individually.
pub fn truncate_tool_results(
    results: &[String],
    total_budget_chars: usize,
    options: &TruncateOptions,
) -> Vec<TruncatedToolResult> {
    let total: usize = results.iter().map(|r| r.len()).sum();
    if total <= total_budget_chars {
        return results
            .iter()
            .map(|r| TruncatedToolResult {
                content: r.clone(),
                was_truncated: false,
            })
            .collect();
    }

    // total > 0 here: an all-empty batch always fits its budget above.
    results
        .iter()
        .map(|r| {
            let item_budget =
                (total_budget_chars as u128 * r.len() as u128 / total as u128) as usize;
            let content = truncate_tool_result(r, item_budget, options);
            let was_truncated = content != *r;
            TruncatedToolResult {
                content,
                was_truncated,
            }
        })
        .collect()
}
