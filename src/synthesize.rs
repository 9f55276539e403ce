//! Natural-language rendering of query and search results.
//!
//! Row sets and ranked snippets are serialized to pretty JSON and handed to
//! the completion service with instructions to answer the user's question
//! without leaking implementation vocabulary (SQL, tables, similarity
//! scores). An empty row set never reaches the completion service.

use crate::completion::CompletionService;
use crate::error::EngineError;
use crate::models::{Row, SearchResult};

pub const EMPTY_RESULT_MESSAGE: &str = "I didn't find any data matching your query.";

/// Render structured query rows as a conversational answer.
pub async fn rows_to_text(
    completion: &dyn CompletionService,
    rows: &[Row],
    question: &str,
    object_name: &str,
) -> Result<String, EngineError> {
    if rows.is_empty() {
        return Ok(EMPTY_RESULT_MESSAGE.to_string());
    }
    let results_json =
        serde_json::to_string_pretty(rows).map_err(|e| EngineError::Other(anyhow::anyhow!(e)))?;
    let prompt = structured_prompt(&results_json, question, object_name);
    match completion.complete(&prompt, 0.5, 1000).await {
        Ok(text) => Ok(text),
        Err(err) if err.is_quota() => Err(EngineError::QuotaExceeded(err.to_string())),
        Err(err) => Err(EngineError::Other(anyhow::anyhow!("{}", err))),
    }
}

/// Render ranked document matches as a conversational answer.
pub async fn search_results_to_text(
    completion: &dyn CompletionService,
    results: &[SearchResult],
    query: &str,
) -> Result<String, EngineError> {
    let results_json = serde_json::to_string_pretty(results)
        .map_err(|e| EngineError::Other(anyhow::anyhow!(e)))?;
    let prompt = document_prompt(&results_json, query);
    match completion.complete(&prompt, 0.5, 1000).await {
        Ok(text) => Ok(text),
        Err(err) if err.is_quota() => Err(EngineError::QuotaExceeded(err.to_string())),
        Err(err) => Err(EngineError::Other(anyhow::anyhow!("{}", err))),
    }
}

fn structured_prompt(results_json: &str, question: &str, object_name: &str) -> String {
    format!(
        "Here are the results of a query against the {} table:\n\
         ```json\n{}\n```\n\n\
         The original question was: \"{}\"\n\n\
         Please convert these SQL query results into a natural language response that directly answers the question.\n\
         Make your response conversational and friendly. Focus on the key information and insights.\n\
         Only mention specific numbers if they're significant to the answer.\n\
         DO NOT mention SQL, queries, or tables in your response.\n",
        object_name, results_json, question
    )
}

fn document_prompt(results_json: &str, query: &str) -> String {
    format!(
        "You are an AI assistant specialized in resume search.\n\n\
         A user asked: \"{}\"\n\n\
         Here are the top matching resumes:\n\
         ```json\n{}\n```\n\n\
         Convert these search results into a natural language response that directly answers the user's query.\n\
         Make your response conversational, friendly, and concise. Focus on key information such as candidate skills, experience, or roles that match the query.\n\
         Do not mention file names, similarity scores, or technical terms like \"vector\" or \"embedding\".\n\
         If no relevant information is found, say so politely.\n",
        query, results_json
    )
}
