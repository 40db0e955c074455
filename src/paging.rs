//! Query-clause construction and total-count recovery
//!
//! List endpoints take filter/sort/paging intent as bare clause strings
//! (`"query=(alias startswith j)"`, `"rowsPerPage=20"`) concatenated onto
//! the URL: the first clause gets `?`, the rest get `&`, empty clauses are
//! skipped outright, and spaces are percent-escaped. Responses report how
//! many records matched in total — independent of how many came back on the
//! page — as an `@total` JSON key or a `total` attribute on the XML wrapper.

use crate::result::ParsedBody;

/// Append filter/sort/paging clauses to a URL.
///
/// Zero clauses (or all-empty clauses) return the URL untouched; an empty
/// clause among non-empty ones is skipped without producing `&&`.
pub fn append_clauses<S: AsRef<str>>(url: &str, clauses: &[S]) -> String {
    let mut out = String::from(url);
    let mut first = true;
    for clause in clauses {
        let clause = clause.as_ref();
        if clause.is_empty() {
            continue;
        }
        out.push(if first { '?' } else { '&' });
        out.push_str(&clause.replace(' ', "%20"));
        first = false;
    }
    out
}

/// Clause limiting how many rows a page returns
pub fn row_count_clause(rows: u32) -> String {
    format!("rowsPerPage={}", rows)
}

/// Clause selecting a 1-based page index
pub fn page_number_clause(page: u32) -> String {
    format!("pageNumber={}", page)
}

/// Recover the total-match count from a parsed response body.
///
/// Not every endpoint reports one; absence is 0, never an error.
pub fn total_object_count(body: &ParsedBody) -> u64 {
    match body {
        ParsedBody::Empty => 0,
        ParsedBody::Json(map) => map
            .get("@total")
            .and_then(|v| match v {
                serde_json::Value::String(s) => s.parse().ok(),
                serde_json::Value::Number(n) => n.as_u64(),
                _ => None,
            })
            .unwrap_or(0),
        ParsedBody::Xml(root) => root
            .attribute("total")
            .and_then(|t| t.parse().ok())
            .unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_clauses_leaves_url_bare() {
        let no_clauses: [&str; 0] = [];
        assert_eq!(
            append_clauses("https://s/vmrest/users", &no_clauses),
            "https://s/vmrest/users"
        );
    }

    #[test]
    fn one_clause_gets_question_mark() {
        assert_eq!(
            append_clauses("https://s/vmrest/users", &["rowsPerPage=20"]),
            "https://s/vmrest/users?rowsPerPage=20"
        );
    }

    #[test]
    fn later_clauses_get_ampersands() {
        assert_eq!(
            append_clauses(
                "https://s/vmrest/users",
                &["rowsPerPage=20", "pageNumber=2", "sort=(alias asc)"]
            ),
            "https://s/vmrest/users?rowsPerPage=20&pageNumber=2&sort=(alias%20asc)"
        );
    }

    #[test]
    fn empty_clause_is_skipped_without_double_ampersand() {
        assert_eq!(
            append_clauses("https://s/vmrest/users", &["", "rowsPerPage=20", "", "pageNumber=1"]),
            "https://s/vmrest/users?rowsPerPage=20&pageNumber=1"
        );
        assert_eq!(append_clauses("https://s/vmrest/users", &["", ""]), "https://s/vmrest/users");
    }

    #[test]
    fn spaces_are_percent_escaped() {
        assert_eq!(
            append_clauses("https://s/vmrest/users", &["query=(alias is john doe)"]),
            "https://s/vmrest/users?query=(alias%20is%20john%20doe)"
        );
    }

    #[test]
    fn clause_builders() {
        assert_eq!(row_count_clause(50), "rowsPerPage=50");
        assert_eq!(page_number_clause(3), "pageNumber=3");
    }

    #[test]
    fn json_total_key_is_read() {
        let body = ParsedBody::parse(r#"{"@total":"42","User":[]}"#);
        assert_eq!(total_object_count(&body), 42);
        let body = ParsedBody::parse(r#"{"@total":7,"User":[]}"#);
        assert_eq!(total_object_count(&body), 7);
    }

    #[test]
    fn xml_total_attribute_is_read() {
        let body = ParsedBody::parse(r#"<Users total="13"><User/></Users>"#);
        assert_eq!(total_object_count(&body), 13);
    }

    #[test]
    fn absent_total_yields_zero() {
        assert_eq!(total_object_count(&ParsedBody::parse(r#"{"User":[]}"#)), 0);
        assert_eq!(total_object_count(&ParsedBody::parse("<Users/>")), 0);
        assert_eq!(total_object_count(&ParsedBody::Empty), 0);
    }
}
