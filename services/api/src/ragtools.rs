use anyhow::{Context, Result, bail};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use realtime_middle_tier::types::{FunctionTool, ToolSchema};
use realtime_middle_tier::{Credential, Destination, MiddleTierBuilder, Tool, ToolInvoker, ToolResult};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::{Arc, LazyLock};

pub const SEARCH_API_VERSION: &str = "2024-07-01";

const SEARCH_TOP: usize = 3;
const VECTOR_NEIGHBORS: usize = 50;
const PASSAGE_CHARS: usize = 200;

static SOURCE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_=\-]+$").expect("source key pattern is a valid regex"));

/// Whether `key` is safe to use as a document key in a search expression.
pub fn is_valid_key(key: &str) -> bool {
    SOURCE_KEY.is_match(key)
}

/// Names of the index fields the tools read.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchFields {
    pub identifier: String,
    pub content: String,
    pub embedding: String,
    pub title: String,
    pub use_vector_query: bool,
}

impl Default for SearchFields {
    fn default() -> Self {
        Self {
            identifier: "chunk_id".to_string(),
            content: "chunk".to_string(),
            embedding: "text_vector".to_string(),
            title: "title".to_string(),
            use_vector_query: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub text: String,
    pub k: usize,
    pub fields: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchQuery {
    pub search_text: String,
    pub top: usize,
    pub select: Vec<String>,
    pub search_fields: Vec<String>,
    pub vector: Option<VectorQuery>,
}

pub type Document = Map<String, Value>;

/// A searchable knowledge base.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn search(&self, query: SearchQuery) -> Result<Vec<Document>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    value: Vec<Document>,
}

/// Azure AI Search over its REST API.
pub struct AzureSearchClient {
    client: Client,
    endpoint: String,
    index: String,
    credential: Credential,
}

impl AzureSearchClient {
    pub fn new(endpoint: &str, index: &str, credential: Credential) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index: index.to_string(),
            credential,
        }
    }

    fn search_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.endpoint, self.index, SEARCH_API_VERSION
        )
    }

    fn request_body(query: &SearchQuery) -> Value {
        let mut body = json!({
            "search": query.search_text,
            "top": query.top,
        });
        if !query.select.is_empty() {
            body["select"] = Value::from(query.select.join(","));
        }
        if !query.search_fields.is_empty() {
            body["searchFields"] = Value::from(query.search_fields.join(","));
        }
        if let Some(vector) = &query.vector {
            body["vectorQueries"] = json!([{
                "kind": "text",
                "text": vector.text,
                "k": vector.k,
                "fields": vector.fields,
            }]);
        }
        body
    }
}

#[async_trait]
impl SearchIndex for AzureSearchClient {
    async fn search(&self, query: SearchQuery) -> Result<Vec<Document>> {
        let (header, value) = self
            .credential
            .header()
            .await
            .context("Failed to authenticate to the search service")?;

        let response = self
            .client
            .post(self.search_url())
            .header(header, value)
            .json(&Self::request_body(&query))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("search request failed with {}: {}", status, body);
        }

        let results = response.json::<SearchResponse>().await?;
        Ok(results.value)
    }
}

fn field_text(document: &Document, field: &str) -> String {
    match document.get(field) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn truncate_passage(content: &str) -> String {
    if content.chars().count() > PASSAGE_CHARS {
        let head: String = content.chars().take(PASSAGE_CHARS).collect();
        format!("{}...", head)
    } else {
        content.to_string()
    }
}

pub fn search_schema() -> ToolSchema {
    ToolSchema::Function(FunctionTool::new(
        "search",
        "Search the knowledge base. The knowledge base is in English, translate to and from English if \
         needed. Results are formatted as a source name first in square brackets, followed by the text \
         content, and a line with '-----' at the end of each result.",
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    ))
}

pub fn grounding_schema() -> ToolSchema {
    ToolSchema::Function(FunctionTool::new(
        "report_grounding",
        "Report use of a source from the knowledge base as part of an answer (effectively, cite the source). Sources \
         appear in square brackets before each knowledge base passage. Always use this tool to cite sources when responding \
         with information from the knowledge base.",
        json!({
            "type": "object",
            "properties": {
                "sources": {
                    "type": "array",
                    "items": {
                        "type": "string"
                    },
                    "description": "List of source names from last statement actually used, do not include the ones not used to formulate a response"
                }
            },
            "required": ["sources"],
            "additionalProperties": false
        }),
    ))
}

/// The `search` tool: passages for the model to answer from.
pub struct SearchTool {
    index: Arc<dyn SearchIndex>,
    fields: SearchFields,
}

impl SearchTool {
    pub fn new(index: Arc<dyn SearchIndex>, fields: SearchFields) -> Self {
        Self { index, fields }
    }
}

#[async_trait]
impl ToolInvoker for SearchTool {
    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .context("search requires a 'query' string")?;
        tracing::info!("Searching for '{}' in the knowledge base.", query);

        let vector = self.fields.use_vector_query.then(|| VectorQuery {
            text: query.to_string(),
            k: VECTOR_NEIGHBORS,
            fields: self.fields.embedding.clone(),
        });
        let documents = self
            .index
            .search(SearchQuery {
                search_text: query.to_string(),
                top: SEARCH_TOP,
                select: vec![self.fields.identifier.clone(), self.fields.content.clone()],
                search_fields: vec![],
                vector,
            })
            .await
            .inspect_err(|e| tracing::error!("Search failed: {:#}", e))?;

        let result: String = documents
            .iter()
            .map(|document| {
                let id = field_text(document, &self.fields.identifier);
                tracing::info!("Found result: [{}]", id);
                let content = truncate_passage(&field_text(document, &self.fields.content));
                format!("[{}]: {}\n-----\n", id, content)
            })
            .collect();

        Ok(ToolResult::text(result, Destination::ToServer))
    }
}

/// The `report_grounding` tool: the cited passages, delivered to the client.
pub struct GroundingTool {
    index: Arc<dyn SearchIndex>,
    fields: SearchFields,
}

impl GroundingTool {
    pub fn new(index: Arc<dyn SearchIndex>, fields: SearchFields) -> Self {
        Self { index, fields }
    }
}

#[async_trait]
impl ToolInvoker for GroundingTool {
    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        let sources: Vec<&str> = args
            .get("sources")
            .and_then(Value::as_array)
            .context("report_grounding requires a 'sources' list")?
            .iter()
            .filter_map(Value::as_str)
            .filter(|source| is_valid_key(source))
            .collect();

        if sources.is_empty() {
            tracing::info!("No valid sources to ground");
            return Ok(ToolResult::json(json!({"sources": []}), Destination::ToClient));
        }
        tracing::info!("Grounding sources: {}", sources.join(", "));

        let documents = self
            .index
            .search(SearchQuery {
                search_text: sources.join(" OR "),
                top: sources.len(),
                select: vec![
                    self.fields.identifier.clone(),
                    self.fields.title.clone(),
                    self.fields.content.clone(),
                ],
                search_fields: vec![self.fields.identifier.clone()],
                vector: None,
            })
            .await
            .inspect_err(|e| tracing::error!("Grounding search failed: {:#}", e))?;

        let docs: Vec<Value> = documents
            .iter()
            .map(|document| {
                let title = match document.get(&self.fields.title) {
                    Some(Value::Null) | None => Value::from("Unknown"),
                    Some(title) => title.clone(),
                };
                tracing::info!("Found grounding document: {}", title);
                json!({
                    "chunk_id": document.get(&self.fields.identifier).cloned().unwrap_or(Value::Null),
                    "title": title,
                    "chunk": document.get(&self.fields.content).cloned().unwrap_or(Value::Null),
                })
            })
            .collect();

        Ok(ToolResult::json(json!({"sources": docs}), Destination::ToClient))
    }
}

/// Registers `search` and `report_grounding` backed by `index`.
pub fn attach_rag_tools(
    builder: MiddleTierBuilder,
    index: Arc<dyn SearchIndex>,
    fields: SearchFields,
) -> MiddleTierBuilder {
    let search = SearchTool::new(index.clone(), fields.clone());
    let grounding = GroundingTool::new(index, fields);
    builder
        .with_tool(Tool::new(search_schema(), Arc::new(search)))
        .with_tool(Tool::new(grounding_schema(), Arc::new(grounding)))
}
