//! The `generate` confidence heuristic (spec §4.G). Advisory only — callers
//! must assert ordering, never exact values (spec §9).

const SQL_KEYWORDS: [&str; 5] = ["SELECT", "INSERT", "UPDATE", "DELETE", "WITH"];

fn dialect_keywords(dialect: &str) -> &'static [&'static str] {
    match dialect.to_ascii_lowercase().as_str() {
        "mysql" | "postgresql" | "postgres" | "sqlite" => &["LIMIT", "OFFSET"],
        "mssql" | "sqlserver" => &["TOP"],
        _ => &[],
    }
}

/// `0.3` if `text` contains no SQL keyword at all; `0.6` if it has one but
/// misses the dialect's pagination keyword; `0.9` otherwise.
pub fn estimate(text: &str, dialect: &str) -> f64 {
    let upper = text.to_ascii_uppercase();
    if !SQL_KEYWORDS.iter().any(|kw| upper.contains(kw)) {
        return 0.3;
    }
    let expected = dialect_keywords(dialect);
    if expected.is_empty() || expected.iter().any(|kw| upper.contains(kw)) {
        0.9
    } else {
        0.6
    }
}
