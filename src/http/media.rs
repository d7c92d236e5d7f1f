//! Media type matching.
//!
//! Supports exact types, `type/*`, `*/*`, and structured-syntax suffix
//! ranges such as `*/*+json` or `application/*+json`. Parameters
//! (`; charset=utf-8`) and case are ignored.

/// Strip parameters and lowercase a `Content-Type` value.
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Whether `content_type` falls inside `range`.
pub fn matches(range: &str, content_type: &str) -> bool {
    let range = essence(range);
    let actual = essence(content_type);

    let (Some((range_type, range_sub)), Some((actual_type, actual_sub))) =
        (range.split_once('/'), actual.split_once('/'))
    else {
        return false;
    };

    if range_type != "*" && range_type != actual_type {
        return false;
    }

    if range_sub == "*" || range_sub == actual_sub {
        return true;
    }

    match range_sub.strip_prefix("*+") {
        Some(suffix) => actual_sub
            .rsplit_once('+')
            .is_some_and(|(_, actual_suffix)| actual_suffix == suffix),
        None => false,
    }
}
