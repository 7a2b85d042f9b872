// SPDX-License-Identifier: MIT

//! Dot/bracket navigation over JSON values

use serde_json::Value;

/// Split `a.b[0].c` into `["a", "b", "0", "c"]`.
///
/// Bracket contents may be quoted (`a["x.y"]`), in which case dots inside
/// the brackets are part of the key.
pub fn parse_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '.' => flush(&mut current, &mut segments),
            '[' => {
                flush(&mut current, &mut segments);
                let mut inner = String::new();
                let mut quote: Option<char> = None;
                for c in chars.by_ref() {
                    match (c, quote) {
                        ('\'' | '"', None) if inner.is_empty() => quote = Some(c),
                        (c, Some(q)) if c == q => quote = None,
                        (']', None) => break,
                        (c, _) => inner.push(c),
                    }
                }
                segments.push(inner.trim().to_string());
            }
            c => current.push(c),
        }
    }
    flush(&mut current, &mut segments);
    segments
}

fn flush(current: &mut String, segments: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
    current.clear();
}

/// Look up `path` under `root`. `None` means undefined.
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    get_segments(root, &parse_path(path))
}

pub fn get_segments<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = match current {
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            Value::Object(map) => map.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}
