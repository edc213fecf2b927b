//! Text utilities shared by the pipeline steps: truncation windows, plan
//! field extraction, and salvaging JSON from model output.

/// Truncate to at most `max` characters, on a char boundary.
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Short preview for log lines.
pub(crate) fn preview(text: &str) -> String {
    let trimmed = text.trim().replace('\n', " ");
    if trimmed.chars().count() <= 80 {
        trimmed
    } else {
        format!("{}...", truncate_chars(&trimmed, 80))
    }
}

/// Extract the value of a `KEY: value` line from the plan text.
///
/// Tolerates the markdown bold some planner models emit, e.g.
/// `**DATA_NEEDED:** none` or `CHART_TYPE**: BarGraph`.
pub(crate) fn extract_plan_field(plan: &str, key: &str) -> Option<String> {
    for line in plan.lines() {
        let stripped = line.trim().trim_start_matches('*');
        // `get` is None when the line is short or the cut lands inside a
        // multi-byte character; either way the line cannot start with the
        // ASCII key.
        let Some(prefix) = stripped.get(..key.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(key) {
            continue;
        }
        let rest = stripped[key.len()..].trim_start_matches('*').trim_start();
        if let Some(value) = rest.strip_prefix(':') {
            let value = value.trim().trim_matches('*').trim();
            return Some(value.to_string());
        }
    }
    None
}

/// Return the first complete `{...}` JSON object from text.
///
/// Handles model output with explanation before/after the JSON, and
/// pretty-printed JSON that got truncated (returns whatever was captured
/// so the parse error downstream is descriptive).
pub(crate) fn extract_json_object(text: &str) -> &str {
    let Some(start) = text.find('{') else {
        return text;
    };
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;
    for (i, ch) in text[start..].char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return &text[start..start + i + ch.len_utf8()];
                }
            }
            _ => {}
        }
    }
    &text[start..]
}

/// Strip markdown code fences from model output before JSON parsing.
pub(crate) fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .trim_end_matches('`')
        .to_string()
}
