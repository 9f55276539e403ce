//! Natural-language to SQL translation.
//!
//! The mutation gate runs before any completion call: a non-administrative
//! question that merely mentions a write keyword is refused outright. The
//! generated statement is then fence-stripped, its row limit normalized to
//! the store's native syntax, and its leading keyword re-checked against
//! the same blacklist before it is allowed anywhere near the store.

use crate::completion::CompletionService;
use crate::error::EngineError;
use crate::models::QueryStatement;

/// Operations a non-administrative question may not request.
pub const MUTATION_KEYWORDS: [&str; 6] =
    ["delete", "drop", "truncate", "update", "insert", "create"];

pub const PERMISSION_DENIED_MESSAGE: &str =
    "You don't have permission to perform data modification operations";

fn translation_prompt(question: &str, object_name: &str, schema_text: &str, role: &str) -> String {
    let role_context = if role.is_empty() {
        String::new()
    } else {
        format!("\nNote that this query is being made by a user with {} role. ", role)
    };
    format!(
        "Given the following SQLite database schema:\n{}\n\n\
         Convert this question into a SQL query to run against the {} table/view:\n\
         {}{}\n\n\
         Return only the SQL query without any explanation or additional text.\n",
        schema_text, object_name, question, role_context
    )
}

/// Translate a question into a validated [`QueryStatement`].
pub async fn translate(
    completion: &dyn CompletionService,
    question: &str,
    object_name: &str,
    schema_text: &str,
    caller_role: &str,
    admin_role: &str,
) -> Result<QueryStatement, EngineError> {
    if caller_role != admin_role && contains_mutation_keyword(question) {
        return Err(EngineError::PermissionDenied(
            PERMISSION_DENIED_MESSAGE.to_string(),
        ));
    }

    let prompt = translation_prompt(question, object_name, schema_text, caller_role);
    let raw = match completion.complete(&prompt, 0.1, 500).await {
        Ok(text) => text,
        Err(err) if err.is_quota() => {
            return Err(EngineError::QuotaExceeded(err.to_string()));
        }
        Err(err) => return Err(EngineError::Translation(err.to_string())),
    };

    let sql = normalize_row_limit(strip_code_fences(&raw).trim());

    // A paraphrase can slip past the question-level gate; the statement
    // itself must still read, not write.
    if caller_role != admin_role && leading_keyword_is_mutation(&sql) {
        return Err(EngineError::PermissionDenied(
            PERMISSION_DENIED_MESSAGE.to_string(),
        ));
    }

    tracing::info!(object = object_name, role = caller_role, "generated statement");

    Ok(QueryStatement {
        sql,
        source_question: question.to_string(),
        target_object: object_name.to_string(),
        requesting_role: caller_role.to_string(),
    })
}

fn contains_mutation_keyword(question: &str) -> bool {
    let question = question.to_lowercase();
    MUTATION_KEYWORDS.iter().any(|kw| question.contains(kw))
}

fn leading_keyword_is_mutation(sql: &str) -> bool {
    let first = sql
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();
    MUTATION_KEYWORDS.contains(&first.as_str())
}

/// Drop enclosing code-fence markers, language-tagged first, then bare.
fn strip_code_fences(text: &str) -> String {
    if let Some(inner) = between(text, "```sql", "```") {
        return inner.trim().to_string();
    }
    if let Some(inner) = between(text, "```", "```") {
        return inner.trim().to_string();
    }
    text.trim().to_string()
}

fn between<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let rest = &text[start..];
    let end = rest.find(close)?;
    Some(&rest[..end])
}

/// Rewrite a `TOP n` clause into native `LIMIT n`, preserving the bound.
/// Statements already carrying a `LIMIT` pass through untouched.
fn normalize_row_limit(sql: &str) -> String {
    let lower = sql.to_lowercase();
    // Offsets found in the lowercased copy only map back when lengths agree.
    if lower.len() != sql.len() {
        return sql.to_string();
    }
    let Some((start, end, bound)) = find_top_clause(&lower) else {
        return sql.to_string();
    };
    if lower.split_whitespace().any(|t| t == "limit") {
        return sql.to_string();
    }

    let mut rewritten = String::with_capacity(sql.len());
    rewritten.push_str(sql[..start].trim_end());
    rewritten.push(' ');
    rewritten.push_str(sql[end..].trim_start());
    let rewritten = rewritten.trim().trim_end_matches(';').trim_end();
    format!("{} LIMIT {}", rewritten, bound)
}

/// Locate a standalone `top N` token pair; returns (start, end, N).
fn find_top_clause(lower: &str) -> Option<(usize, usize, u64)> {
    let bytes = lower.as_bytes();
    let mut search = 0;
    while let Some(pos) = lower[search..].find("top") {
        let start = search + pos;
        let after = start + 3;
        let boundary_before = start == 0 || bytes[start - 1].is_ascii_whitespace();
        let boundary_after = after < lower.len() && bytes[after].is_ascii_whitespace();
        if boundary_before && boundary_after {
            let rest = lower[after..].trim_start();
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !digits.is_empty() {
                if let Ok(bound) = digits.parse::<u64>() {
                    let ws = lower[after..].len() - rest.len();
                    return Some((start, after + ws + digits.len(), bound));
                }
            }
        }
        search = after;
    }
    None
}
