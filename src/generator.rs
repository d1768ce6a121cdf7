use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::GeneratorError;
use crate::models::SchemaContext;

// Turns a question into SQL
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    /// May return an empty string, the caller decides what that means.
    async fn generate(&self, question: &str, schema: &SchemaContext) -> Result<String, GeneratorError>;
}

const TOP_K: usize = 5;

pub fn build_prompt(question: &str, schema: &SchemaContext) -> String {
    format!(
        "You are a PostgreSQL expert. Given an input question, write one syntactically \
         correct PostgreSQL query that answers it.\n\
         Unless the question asks for a specific number of rows, limit the query to at most \
         {TOP_K} results with LIMIT. Never select every column, only the ones needed. \
         Only use columns that exist in the tables below.\n\
         Return only the SQL, without explanation or markdown.\n\n\
         Only use the following tables:\n{}\n\
         Question: {}\nSQLQuery:",
        schema.render(),
        question
    )
}

// Strip markdown fences and a leading "SQLQuery:" label the model sometimes echoes
pub fn clean_sql(raw: &str) -> String {
    let mut sql = raw.trim();
    if let Some(rest) = sql.strip_prefix("SQLQuery:") {
        sql = rest.trim_start();
    }
    if let Some(rest) = sql.strip_prefix("```sql") {
        sql = rest;
    } else if let Some(rest) = sql.strip_prefix("```") {
        sql = rest;
    }
    sql.strip_suffix("```").unwrap_or(sql).trim().to_string()
}

// Gemini generateContent wire format
#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPartOut<'a>>,
}

#[derive(Serialize)]
struct GeminiPartOut<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPartIn>,
}

#[derive(Deserialize, Debug)]
struct GeminiPartIn {
    #[serde(default)]
    text: String,
}

impl GeminiResponse {
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        Some(text)
    }
}

/// Google Gemini backed generator.
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        model: &str,
        api_key: &str,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl SqlGenerator for GeminiGenerator {
    async fn generate(&self, question: &str, schema: &SchemaContext) -> Result<String, GeneratorError> {
        let prompt = build_prompt(question, schema);
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPartOut { text: &prompt }],
            }],
            generation_config: GenerationConfig { temperature: 0.0 },
        };

        let res = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(GeneratorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GeminiResponse = res.json().await?;
        let text = parsed.into_text().ok_or(GeneratorError::EmptyResponse)?;
        let sql = clean_sql(&text);
        tracing::debug!(model = %self.model, sql = %sql, "LLM produced SQL");
        Ok(sql)
    }
}
