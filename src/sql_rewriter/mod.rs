//! SQL text normalisation.
//!
//! The first pipeline stage: strips comments (preserving string-literal
//! contents), collapses redundant whitespace, and extracts `FOR` temporal
//! clauses per referenced relation into a side table keyed by the (possibly
//! aliased) relation name. The cleaned SQL no longer contains the clauses.
//! Idempotent on already-clean SQL.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::{EngineError, Result};

pub mod temporal;

pub use temporal::TemporalRange;

/// Temporal side table: lowercase relation-or-alias → range.
pub type TemporalFilters = HashMap<String, TemporalRange>;

pub fn rewrite(raw_sql: &str) -> Result<(String, TemporalFilters)> {
    let without_comments = strip_comments(raw_sql)?;
    let tokens = tokenize(&without_comments)?;
    let (tokens, temporal_filters) = extract_temporal_clauses(tokens)?;
    let clean_sql = collapse_whitespace(&tokens.join(" "));
    Ok((clean_sql, temporal_filters))
}

/// Remove line (`--`, `//`) and block (`/* */`) comments. Quote handling
/// covers single-quoted strings and double-quote/backtick identifiers; an
/// unterminated quote or block comment is a syntax error.
pub fn strip_comments(input: &str) -> Result<String> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string: Option<char> = None;
    let mut escape_next = false;

    while let Some(ch) = chars.next() {
        if escape_next {
            result.push(ch);
            escape_next = false;
            continue;
        }

        if in_string.is_some() && ch == '\\' {
            result.push(ch);
            escape_next = true;
            continue;
        }

        if ch == '\'' || ch == '"' || ch == '`' {
            if in_string == Some(ch) {
                in_string = None;
            } else if in_string.is_none() {
                in_string = Some(ch);
            }
            result.push(ch);
            continue;
        }

        if in_string.is_some() {
            result.push(ch);
            continue;
        }

        // line comment: --
        if ch == '-' && chars.peek() == Some(&'-') {
            chars.next();
            for c in chars.by_ref() {
                if c == '\n' {
                    result.push('\n');
                    break;
                }
            }
            continue;
        }

        if ch == '/' {
            match chars.peek() {
                Some(&'*') => {
                    chars.next();
                    let mut terminated = false;
                    while let Some(c) = chars.next() {
                        if c == '*' && chars.peek() == Some(&'/') {
                            chars.next();
                            terminated = true;
                            break;
                        }
                    }
                    if !terminated {
                        return Err(EngineError::Sql(
                            "unterminated block comment".to_string(),
                        ));
                    }
                    // a comment separates tokens
                    result.push(' ');
                    continue;
                }
                Some(&'/') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if c == '\n' {
                            result.push('\n');
                            break;
                        }
                    }
                    continue;
                }
                _ => {}
            }
        }

        result.push(ch);
    }

    if let Some(quote) = in_string {
        return Err(EngineError::Sql(format!(
            "statement contains an unbalanced {quote} quote"
        )));
    }

    Ok(result)
}

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("static regex");
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Split into whitespace-separated tokens; a quoted run (with its quotes)
/// is always one token so literal contents survive re-joining.
fn tokenize(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    let mut in_string: Option<char> = None;

    while let Some(ch) = chars.next() {
        if let Some(quote) = in_string {
            current.push(ch);
            if ch == '\\' {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                continue;
            }
            if ch == quote {
                in_string = None;
            }
            continue;
        }
        if ch == '\'' || ch == '"' || ch == '`' {
            in_string = Some(ch);
            current.push(ch);
            continue;
        }
        if ch.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(ch);
    }
    if in_string.is_some() {
        return Err(EngineError::Sql(
            "statement contains an unbalanced quote".to_string(),
        ));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

const CLAUSE_KEYWORDS: [&str; 24] = [
    "SELECT", "FROM", "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "OFFSET", "UNION", "JOIN",
    "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "OUTER", "ON", "USING", "AS", "AND", "OR", "FOR",
    "BY", "DISTINCT",
];

fn is_keyword(token: &str) -> bool {
    CLAUSE_KEYWORDS.contains(&token.to_uppercase().as_str())
}

/// Tokens that end a FOR clause (AND is part of DATES BETWEEN).
fn terminates_for_clause(token: &str) -> bool {
    let upper = token.to_uppercase();
    upper != "AND" && upper != "FOR" && is_keyword(&upper) || token == ";" || token.starts_with('(')
}

/// Walk the token stream; after each relation reference in FROM/JOIN
/// position, lift any `FOR …` clause out into the side table, keyed by the
/// alias when one is present, the relation name otherwise.
fn extract_temporal_clauses(tokens: Vec<String>) -> Result<(Vec<String>, TemporalFilters)> {
    let mut output: Vec<String> = Vec::with_capacity(tokens.len());
    let mut filters = TemporalFilters::new();
    let mut current_relation: Option<String> = None;
    let mut index = 0;

    while index < tokens.len() {
        let token = &tokens[index];
        let upper = token.to_uppercase();

        if upper == "FROM" || upper == "JOIN" {
            output.push(token.clone());
            index += 1;
            // the relation reference itself
            if index < tokens.len() && !is_keyword(&tokens[index]) {
                let reference = tokens[index].clone();
                let relation = reference.trim_end_matches(',').to_string();
                current_relation = Some(normalise_reference(&relation));
                output.push(tokens[index].clone());
                index += 1;
                // a trailing comma means the next token is another relation,
                // not an alias
                if reference.ends_with(',') {
                    continue;
                }
                // optional alias: AS name, or a bare non-keyword token
                if index < tokens.len() && tokens[index].eq_ignore_ascii_case("AS") {
                    output.push(tokens[index].clone());
                    index += 1;
                    if index < tokens.len() {
                        current_relation =
                            Some(normalise_reference(tokens[index].trim_end_matches(',')));
                        output.push(tokens[index].clone());
                        index += 1;
                    }
                } else if index < tokens.len()
                    && !is_keyword(&tokens[index])
                    && !tokens[index].starts_with('(')
                {
                    current_relation =
                        Some(normalise_reference(tokens[index].trim_end_matches(',')));
                    output.push(tokens[index].clone());
                    index += 1;
                }
            }
            continue;
        }

        if upper == "FOR" {
            let relation = current_relation.clone().ok_or_else(|| {
                EngineError::Sql(
                    "FOR clause found with no preceding relation reference".to_string(),
                )
            })?;
            index += 1;
            let mut clause_tokens: Vec<String> = Vec::new();
            while index < tokens.len() && !terminates_for_clause(&tokens[index]) {
                clause_tokens.push(tokens[index].clone());
                index += 1;
            }
            let range = temporal::parse_for_clause(&clause_tokens.join(" "))?;
            filters.insert(relation, range);
            continue;
        }

        output.push(token.clone());
        index += 1;
    }

    Ok((output, filters))
}

/// Strip identifier quoting and lowercase for side-table keys.
fn normalise_reference(reference: &str) -> String {
    reference
        .trim_matches(|c| c == '"' || c == '`')
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_line_and_block_comments() {
        let sql = "SELECT a -- trailing\nFROM t /* inline */ WHERE b = 1";
        let (clean, _) = rewrite(sql).unwrap();
        assert_eq!(clean, "SELECT a FROM t WHERE b = 1");
    }

    #[test]
    fn test_comment_markers_inside_strings_survive() {
        let sql = "SELECT '--not a comment' FROM t";
        let (clean, _) = rewrite(sql).unwrap();
        assert_eq!(clean, "SELECT '--not a comment' FROM t");
    }

    #[test]
    fn test_whitespace_collapse() {
        let (clean, _) = rewrite("SELECT   a\n\tFROM    t").unwrap();
        assert_eq!(clean, "SELECT a FROM t");
    }

    #[test]
    fn test_idempotent_on_clean_sql() {
        let sql = "SELECT a FROM t WHERE b = 1";
        let (first, _) = rewrite(sql).unwrap();
        let (second, _) = rewrite(&first).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, sql);
    }

    #[test]
    fn test_unbalanced_quote_is_rejected() {
        assert!(rewrite("SELECT 'oops FROM t").is_err());
    }

    #[test]
    fn test_unterminated_block_comment_is_rejected() {
        assert!(rewrite("SELECT a /* FROM t").is_err());
    }

    #[test]
    fn test_temporal_clause_extracted_and_removed() {
        let (clean, filters) =
            rewrite("SELECT * FROM logs FOR DATES BETWEEN '2024-01-01' AND '2024-01-02' WHERE x = 1")
                .unwrap();
        assert_eq!(clean, "SELECT * FROM logs WHERE x = 1");
        assert!(filters.contains_key("logs"));
    }

    #[test]
    fn test_temporal_clause_keyed_by_alias() {
        let (clean, filters) =
            rewrite("SELECT * FROM logs AS l FOR '2024-03-01'").unwrap();
        assert_eq!(clean, "SELECT * FROM logs AS l");
        assert!(filters.contains_key("l"));
        assert!(!filters.contains_key("logs"));
    }

    #[test]
    fn test_temporal_clause_per_join_side() {
        let (clean, filters) = rewrite(
            "SELECT * FROM a FOR TODAY INNER JOIN b FOR YESTERDAY ON a.id = b.id",
        )
        .unwrap();
        assert_eq!(clean, "SELECT * FROM a INNER JOIN b ON a.id = b.id");
        assert_eq!(filters.len(), 2);
        assert!(filters.contains_key("a"));
        assert!(filters.contains_key("b"));
    }

    #[test]
    fn test_malformed_temporal_clause() {
        assert!(rewrite("SELECT * FROM t FOR NEXT_TUESDAY").is_err());
    }
}
