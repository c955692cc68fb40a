use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::models::ReceiptExtraction;

/// Turns a photographed table receipt into session fields.
#[async_trait]
pub trait ReceiptReader: Send + Sync {
    async fn read_receipt(&self, image: &[u8], mime_type: &str) -> Result<ReceiptExtraction>;
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    messages: Vec<Message>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

pub struct OpenAiReceiptReader {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiReceiptReader {
    pub fn new(api_key: &str) -> Self {
        OpenAiReceiptReader {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }

    async fn call(&self, parts: Vec<ContentPart>) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            temperature: 0.1,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: vec![ContentPart::Text { text: system_prompt() }],
                },
                Message {
                    role: "user".to_string(),
                    content: parts,
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI error {}: {}", status, body));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .first()
            .ok_or_else(|| anyhow!("Empty response"))?
            .message
            .content
            .trim()
            .to_string();
        Ok(content)
    }
}

#[async_trait]
impl ReceiptReader for OpenAiReceiptReader {
    async fn read_receipt(&self, image: &[u8], mime_type: &str) -> Result<ReceiptExtraction> {
        let data_url = format!("data:{};base64,{}", mime_type, general_purpose::STANDARD.encode(image));

        let raw = self
            .call(vec![
                ContentPart::Text {
                    text: "Extract the session from this gaming receipt.".to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ])
            .await?;
        let mut value = parse_json(&raw)?;

        if !matches_schema(&value)? {
            warn!("receipt extraction did not match schema, asking for a fix");
            let fixed = self
                .call(vec![ContentPart::Text {
                    text: format!("Fix this JSON so it matches the schema exactly. Output JSON only:\n{}", raw),
                }])
                .await?;
            value = parse_json(&fixed)?;
            if !matches_schema(&value)? {
                return Err(anyhow!("Receipt JSON validation failed"));
            }
        }

        let extraction = finish_extraction(serde_json::from_value(value)?);
        debug!(confidence = ?extraction.confidence_score, "receipt extracted");
        Ok(extraction)
    }
}

fn parse_json(raw: &str) -> Result<Value> {
    serde_json::from_str::<Value>(raw).map_err(|e| anyhow!("Invalid JSON: {}", e))
}

fn extraction_schema() -> Result<JSONSchema> {
    let schema = json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["rolling_amount", "win_loss", "extraction_notes"],
        "properties": {
            "rolling_amount": {"type": ["number", "null"], "minimum": 0},
            "win_loss": {"type": ["number", "null"]},
            "buy_in_amount": {"type": ["number", "null"], "minimum": 0},
            "buy_out_amount": {"type": ["number", "null"], "minimum": 0},
            "game_type": {"type": ["string", "null"]},
            "venue": {"type": ["string", "null"]},
            "table_number": {"type": ["string", "null"]},
            "extraction_notes": {"type": "string"},
            "confidence_score": {"type": ["number", "null"], "minimum": 0, "maximum": 1}
        }
    });

    JSONSchema::compile(&schema).map_err(|e| anyhow!("Invalid receipt schema: {}", e))
}

fn matches_schema(value: &Value) -> Result<bool> {
    Ok(extraction_schema()?.is_valid(value))
}

fn finish_extraction(mut data: ReceiptExtraction) -> ReceiptExtraction {
    if data.extraction_notes.trim().is_empty() {
        data.extraction_notes = "notes missing".to_string();
    }
    if data.confidence_score.is_none() {
        data.confidence_score = Some(compute_confidence(&data));
    }
    data
}

/// Confidence from how many of the key session fields were read.
pub fn compute_confidence(data: &ReceiptExtraction) -> f64 {
    let mut score: f64 = 0.3;
    if data.rolling_amount.is_some() {
        score += 0.25;
    }
    if data.win_loss.is_some() {
        score += 0.2;
    }
    if data.game_type.is_some() {
        score += 0.1;
    }
    if data.venue.is_some() || data.table_number.is_some() {
        score += 0.1;
    }
    if data.buy_in_amount.is_some() || data.buy_out_amount.is_some() {
        score += 0.05;
    }
    score.clamp(0.0, 1.0)
}

fn system_prompt() -> String {
    r#"You read casino gaming session receipts. Return JSON only and match the schema exactly.
Fields:
- rolling_amount (number|null, total wagered)
- win_loss (number|null, from the player's side: negative when the player lost)
- buy_in_amount (number|null)
- buy_out_amount (number|null)
- game_type (string|null)
- venue (string|null)
- table_number (string|null)
- extraction_notes (string, short)
- confidence_score (number 0-1|null)
"#
    .to_string()
}
