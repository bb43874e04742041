use crate::config::Config;
use crate::models::{EvalRecord, EvalResult, EvalRow};
use anyhow::{Context, Result};
use async_openai::{Client, config::OpenAIConfig, types::CreateChatCompletionRequestArgs};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

/// Categories the judge model scores each record on
const EVAL_CATEGORIES: &[&str] = &["coherence", "relevance"];

const EVAL_SYSTEM_PROMPT: &str =
    "You are an impartial evaluator of AI assistant responses. \
Score only what is asked and return strictly valid JSON.";

/// Remote evaluator configuration resolved from a named connection
///
/// The connection name maps to the `<NAME>_ENDPOINT` and `<NAME>_API_KEY`
/// environment variables.
#[derive(Debug, Clone)]
pub struct EvalConnection {
    pub endpoint: String,
    pub api_key: String,
}

impl EvalConnection {
    /// Resolve the named connection from the process environment
    pub fn resolve(name: &str) -> Result<Self> {
        let endpoint_var = format!("{}_ENDPOINT", name);
        let api_key_var = format!("{}_API_KEY", name);

        Ok(Self {
            endpoint: std::env::var(&endpoint_var)
                .with_context(|| format!("Environment variable {} not found", endpoint_var))?,
            api_key: std::env::var(&api_key_var)
                .with_context(|| format!("Environment variable {} not found", api_key_var))?,
        })
    }
}

/// Runs the batch scoring pass over consumed queue records
pub struct Evaluator {
    connection_name: String,
    model: String,
    studio_base: String,
    results_path: PathBuf,
}

impl Evaluator {
    pub fn new(config: &Config) -> Self {
        Self {
            connection_name: config.eval_connection_name.clone(),
            model: config.evaluation_model.clone(),
            studio_base: config.connection_string.clone(),
            results_path: config.results_path.clone(),
        }
    }

    /// Score every record for coherence and relevance, aggregate mean
    /// metrics, and write the full result object to the results file
    pub async fn evaluate_records(&self, records: &[EvalRecord]) -> Result<EvalResult> {
        let connection = EvalConnection::resolve(&self.connection_name)?;
        let client = Self::create_client(&connection);
        let eval_name = Self::run_name();

        let mut rows = Vec::new();
        for record in records {
            let row = self
                .score_record(&client, record)
                .await
                .with_context(|| format!("Failed to score record: {}", record.query))?;
            rows.push(row);
        }

        let metrics = Self::aggregate_metrics(&rows);
        let result = EvalResult {
            rows,
            metrics,
            studio_url: format!(
                "{}/evaluations/{}",
                self.studio_base.trim_end_matches('/'),
                eval_name
            ),
        };

        self.store_results(&result)?;

        Ok(result)
    }

    /// Timestamped name for this evaluation run
    fn run_name() -> String {
        format!(
            "chat_products_eval_{}",
            chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S")
        )
    }

    /// Create the OpenAI-compatible client for the evaluator connection
    fn create_client(connection: &EvalConnection) -> Client<OpenAIConfig> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&connection.api_key)
            .with_api_base(&connection.endpoint);

        Client::with_config(openai_config)
    }

    /// Ask the judge model to score one query/response pair
    async fn score_record(
        &self,
        client: &Client<OpenAIConfig>,
        record: &EvalRecord,
    ) -> Result<EvalRow> {
        let response_text = Self::unquote_response(&record.response.message);
        let request = self.build_judge_request(&record.query, &response_text)?;

        let judge_response = client
            .chat()
            .create(request)
            .await
            .context("Judge model request failed")?;

        let judge_content = match judge_response.choices.first() {
            Some(choice) => match &choice.message.content {
                Some(content) => content.clone(),
                None => String::new(),
            },
            None => String::new(),
        };

        let scores = Self::parse_scores(&judge_content)?;

        Ok(EvalRow {
            query: record.query.clone(),
            response: response_text,
            scores,
        })
    }

    /// Recover the plain reply text from the JSON-quoted message field
    fn unquote_response(message: &str) -> String {
        serde_json::from_str::<String>(message).unwrap_or_else(|_| message.to_string())
    }

    /// Build the judge chat completion request
    fn build_judge_request(
        &self,
        query: &str,
        response: &str,
    ) -> Result<async_openai::types::CreateChatCompletionRequest> {
        let system_message = async_openai::types::ChatCompletionRequestSystemMessageArgs::default()
            .content(EVAL_SYSTEM_PROMPT.to_string())
            .build()
            .context("Failed to build judge system message")?
            .into();

        let user_message = async_openai::types::ChatCompletionRequestUserMessageArgs::default()
            .content(Self::build_judge_prompt(query, response))
            .build()
            .context("Failed to build judge user message")?
            .into();

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([system_message, user_message])
            .temperature(0.1)
            .build()
            .context("Failed to build judge completion request")
    }

    /// Build the judge prompt for one query/response pair
    fn build_judge_prompt(query: &str, response: &str) -> String {
        format!(
            "Score the response to the query below for {} on a scale from 1 to 5.\n\n\
Query: {}\nResponse: {}\n\n\
Return JSON with a 'scores' object mapping each category to its score.",
            EVAL_CATEGORIES.join(", "),
            query,
            response
        )
    }

    /// Parse the judge's JSON output into per-category scores
    ///
    /// Judge models wrap JSON in prose often enough that embedded JSON is
    /// extracted as a fallback. Scores are clamped to the 1 to 5 scale;
    /// a category missing from the scores object falls back to 1.0.
    fn parse_scores(content: &str) -> Result<HashMap<String, f64>> {
        let parsed = Self::parse_json_response(content)?;

        let scores_obj = parsed
            .get("scores")
            .and_then(|s| s.as_object())
            .context("No scores object in judge response")?;

        let mut scores = HashMap::new();
        for category in EVAL_CATEGORIES {
            let score = match scores_obj.get(*category).and_then(|s| s.as_f64()) {
                Some(score) => score.clamp(1.0, 5.0),
                None => 1.0,
            };
            scores.insert(category.to_string(), score);
        }

        Ok(scores)
    }

    /// Parse JSON from the judge output, handling embedded JSON
    fn parse_json_response(content: &str) -> Result<Value> {
        match serde_json::from_str(content) {
            Ok(parsed) => Ok(parsed),
            Err(_) => Self::try_extract_embedded_json(content),
        }
    }

    /// Try to extract JSON that might be embedded in surrounding text
    fn try_extract_embedded_json(content: &str) -> Result<Value> {
        match content.find('{') {
            Some(start) => match content.rfind('}') {
                Some(end) => serde_json::from_str(&content[start..=end])
                    .context("Failed to parse extracted JSON"),
                None => anyhow::bail!("Found opening brace but no closing brace in judge response"),
            },
            None => anyhow::bail!("No JSON found in judge response"),
        }
    }

    /// Mean score per category across all rows
    fn aggregate_metrics(rows: &[EvalRow]) -> HashMap<String, f64> {
        let mut metrics = HashMap::new();

        for category in EVAL_CATEGORIES {
            let scores: Vec<f64> = rows
                .iter()
                .filter_map(|row| row.scores.get(*category))
                .copied()
                .collect();

            let mean = if scores.is_empty() {
                0.0
            } else {
                scores.iter().sum::<f64>() / scores.len() as f64
            };
            metrics.insert(category.to_string(), mean);
        }

        metrics
    }

    /// Write the result object to the results file as pretty JSON
    fn store_results(&self, result: &EvalResult) -> Result<()> {
        let json_content =
            serde_json::to_string_pretty(result).context("Failed to serialize results to JSON")?;

        if let Some(parent) = self.results_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(&self.results_path, json_content).with_context(|| {
            format!(
                "Failed to write results file: {}",
                self.results_path.display()
            )
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatResponse;
    use tempfile::tempdir;

    fn row(coherence: f64, relevance: f64) -> EvalRow {
        EvalRow {
            query: "q".to_string(),
            response: "r".to_string(),
            scores: HashMap::from([
                ("coherence".to_string(), coherence),
                ("relevance".to_string(), relevance),
            ]),
        }
    }

    #[test]
    fn test_parse_scores_valid_json() {
        let content = r#"{"scores": {"coherence": 4.0, "relevance": 5.0}}"#;
        let scores = Evaluator::parse_scores(content).unwrap();
        assert_eq!(scores.get("coherence"), Some(&4.0));
        assert_eq!(scores.get("relevance"), Some(&5.0));
    }

    #[test]
    fn test_parse_scores_embedded_json() {
        let content = r#"Here is my verdict: {"scores": {"coherence": 3, "relevance": 4}} Done."#;
        let scores = Evaluator::parse_scores(content).unwrap();
        assert_eq!(scores.get("coherence"), Some(&3.0));
        assert_eq!(scores.get("relevance"), Some(&4.0));
    }

    #[test]
    fn test_parse_scores_clamping() {
        let content = r#"{"scores": {"coherence": 9.0, "relevance": 0.0}}"#;
        let scores = Evaluator::parse_scores(content).unwrap();
        assert_eq!(scores.get("coherence"), Some(&5.0));
        assert_eq!(scores.get("relevance"), Some(&1.0));
    }

    #[test]
    fn test_parse_scores_missing_category_defaults_to_minimum() {
        let content = r#"{"scores": {"coherence": 4.0}}"#;
        let scores = Evaluator::parse_scores(content).unwrap();
        assert_eq!(scores.get("coherence"), Some(&4.0));
        assert_eq!(scores.get("relevance"), Some(&1.0));
    }

    #[test]
    fn test_parse_scores_no_scores_object() {
        let content = r#"{"feedback": "looks fine"}"#;
        let err = Evaluator::parse_scores(content).unwrap_err();
        assert!(err.to_string().contains("No scores object"));
    }

    #[test]
    fn test_parse_scores_invalid_json() {
        assert!(Evaluator::parse_scores("not json at all").is_err());
    }

    #[test]
    fn test_parse_scores_unclosed_brace() {
        assert!(Evaluator::parse_scores(r#"{"scores": {"coherence": 4"#).is_err());
    }

    #[test]
    fn test_unquote_response() {
        assert_eq!(Evaluator::unquote_response("\"hello\""), "hello");
        // Not JSON-quoted: passed through unchanged
        assert_eq!(Evaluator::unquote_response("plain text"), "plain text");
    }

    #[test]
    fn test_aggregate_metrics_mean() {
        let rows = vec![row(4.0, 5.0), row(2.0, 3.0)];
        let metrics = Evaluator::aggregate_metrics(&rows);
        assert_eq!(metrics.get("coherence"), Some(&3.0));
        assert_eq!(metrics.get("relevance"), Some(&4.0));
    }

    #[test]
    fn test_aggregate_metrics_empty() {
        let metrics = Evaluator::aggregate_metrics(&[]);
        assert_eq!(metrics.get("coherence"), Some(&0.0));
        assert_eq!(metrics.get("relevance"), Some(&0.0));
    }

    #[test]
    fn test_run_name_is_timestamped() {
        let name = Evaluator::run_name();
        assert!(name.starts_with("chat_products_eval_"));
    }

    #[test]
    fn test_resolve_connection_missing_vars() {
        let err = EvalConnection::resolve("NO_SUCH_CONNECTION").unwrap_err();
        assert!(err.to_string().contains("NO_SUCH_CONNECTION_ENDPOINT"));
    }

    fn judge_body(content: &str) -> String {
        serde_json::json!({
            "id": "chatcmpl-judge",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_evaluate_records_end_to_end() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(judge_body(r#"{"scores": {"coherence": 4, "relevance": 5}}"#))
            .expect(2)
            .create_async()
            .await;

        // Connection name unique to this test so parallel tests cannot
        // observe a partial environment
        unsafe {
            std::env::set_var("EVAL_E2E_TEST_ENDPOINT", server.url());
            std::env::set_var("EVAL_E2E_TEST_API_KEY", "judge-key");
        }

        let temp_dir = tempdir().unwrap();
        let results_path = temp_dir.path().join("myevalresults.json");
        let evaluator = Evaluator {
            connection_name: "EVAL_E2E_TEST".to_string(),
            model: "gpt-4o-mini".to_string(),
            studio_base: "https://example.ai/project/".to_string(),
            results_path: results_path.clone(),
        };

        let records = vec![
            EvalRecord {
                query: "best running shoe".to_string(),
                response: ChatResponse {
                    message: "\"The Pegasus is a solid pick.\"".to_string(),
                },
            },
            EvalRecord {
                query: "best trail shoe".to_string(),
                response: ChatResponse {
                    message: "\"Try the Speedgoat.\"".to_string(),
                },
            },
        ];

        let result = evaluator.evaluate_records(&records).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].response, "The Pegasus is a solid pick.");
        assert_eq!(result.metrics.get("coherence"), Some(&4.0));
        assert_eq!(result.metrics.get("relevance"), Some(&5.0));
        assert!(
            result
                .studio_url
                .starts_with("https://example.ai/project/evaluations/chat_products_eval_")
        );

        let stored = std::fs::read_to_string(&results_path).unwrap();
        let stored: EvalResult = serde_json::from_str(&stored).unwrap();
        assert_eq!(stored.rows.len(), 2);
    }
}
