//! Service-message value escaping.
//!
//! Values inside `##teamcity[...]` messages are single-quoted, with `|` as
//! the escape character:
//!
//! | raw      | escaped |
//! |----------|---------|
//! | `\|`     | `\|\|`  |
//! | `'`      | `\|'`   |
//! | `\n`     | `\|n`   |
//! | `\r`     | `\|r`   |
//! | `[`      | `\|[`   |
//! | `]`      | `\|]`   |
//! | U+0085   | `\|x`   |
//! | U+2028   | `\|l`   |
//! | U+2029   | `\|p`   |

/// Escapes one value for a service-message attribute.
pub fn escape_service_value(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '|' => escaped.push_str("||"),
            '\'' => escaped.push_str("|'"),
            '\n' => escaped.push_str("|n"),
            '\r' => escaped.push_str("|r"),
            '[' => escaped.push_str("|["),
            ']' => escaped.push_str("|]"),
            '\u{0085}' => escaped.push_str("|x"),
            '\u{2028}' => escaped.push_str("|l"),
            '\u{2029}' => escaped.push_str("|p"),
            other => escaped.push(other),
        }
    }
    escaped
}
