// src/score/providers.rs
//! Scoring backends. One HTTP client talks to both provider families:
//! Groq (OpenAI-compatible chat completions) and Google (generateContent).
//! Backends return errors — the failover invoker decides what to do with them.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::pool::{ModelDescriptor, Provider};
use super::types::{ScoredResult, ScoringRequest};
use crate::config::ProfileConfig;

#[async_trait::async_trait]
pub trait ScoreBackend: Send + Sync {
    /// Score one post against the fixed profile using the given model.
    /// A post can advertise several roles, hence the list.
    async fn score(
        &self,
        model: &ModelDescriptor,
        request: &ScoringRequest,
    ) -> Result<Vec<ScoredResult>>;
}

/// The fixed profile every post is scored against.
#[derive(Debug, Clone)]
pub struct ScoreProfile {
    pub resume: String,
    pub message_guidelines: String,
}

impl ScoreProfile {
    pub fn load(cfg: &ProfileConfig) -> Result<Self> {
        let resume = std::fs::read_to_string(&cfg.resume_path)
            .with_context(|| format!("reading resume from {}", cfg.resume_path))?;
        let message_guidelines = std::fs::read_to_string(&cfg.message_template_path)
            .with_context(|| format!("reading message template from {}", cfg.message_template_path))?;
        Ok(Self {
            resume,
            message_guidelines,
        })
    }
}

const RESPONSE_SCHEMA: &str = r#"Return a STRICT JSON array, one object per advertised role, each with:
  match_percentage (number 0-100), experience_gap (number, years),
  contact_email (array of strings found in the posting), company_name (string),
  should_apply (boolean), message_content ({"subject": string, "body": string}),
  additional_data (object; include employment_type when stated).
No prose, no markdown fences, JSON only."#;

pub struct LlmBackend {
    http: reqwest::Client,
    groq_api_key: String,
    gemini_api_key: String,
    profile: ScoreProfile,
}

impl LlmBackend {
    /// Keys come from `GROQ_API_KEY` / `GEMINI_API_KEY`; a missing key only
    /// fails calls routed to that provider, which failover then skips past.
    pub fn new(profile: ScoreProfile) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("jobscout/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(60))
            .build()
            .context("building http client")?;
        Ok(Self {
            http,
            groq_api_key: std::env::var("GROQ_API_KEY").unwrap_or_default(),
            gemini_api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            profile,
        })
    }

    fn build_prompt(&self, request: &ScoringRequest) -> String {
        format!(
            "JOB MATCH ANALYSIS TASK\n{schema}\n\nRESUME:\n{resume}\n\n\
             JOB POSTING (found via query: {query}):\n{post}\n\n\
             MESSAGE GUIDELINES:\n{guidelines}\n\nSTRICT JSON OUTPUT:",
            schema = RESPONSE_SCHEMA,
            resume = self.profile.resume,
            query = request.query,
            post = request.post_text,
            guidelines = self.profile.message_guidelines,
        )
    }

    async fn fetch_groq(&self, model: &str, prompt: &str) -> Result<String> {
        if self.groq_api_key.is_empty() {
            bail!("GROQ_API_KEY is not set");
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: 0.4,
        };
        let resp = self
            .http
            .post("https://api.groq.com/openai/v1/chat/completions")
            .bearer_auth(&self.groq_api_key)
            .json(&req)
            .send()
            .await
            .context("groq request failed")?
            .error_for_status()
            .context("groq returned error status")?;
        let body: Resp = resp.json().await.context("decoding groq response")?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("groq response had no choices"))
    }

    async fn fetch_gemini(&self, model: &str, prompt: &str) -> Result<String> {
        if self.gemini_api_key.is_empty() {
            bail!("GEMINI_API_KEY is not set");
        }

        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            contents: Vec<Content<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: RespContent,
        }
        #[derive(Deserialize)]
        struct RespContent {
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct RespPart {
            text: String,
        }

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent?key={key}",
            key = self.gemini_api_key
        );
        let req = Req {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };
        let resp = self
            .http
            .post(&url)
            .json(&req)
            .send()
            .await
            .context("gemini request failed")?
            .error_for_status()
            .context("gemini returned error status")?;
        let body: Resp = resp.json().await.context("decoding gemini response")?;
        body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| anyhow!("gemini response had no candidates"))
    }
}

#[async_trait::async_trait]
impl ScoreBackend for LlmBackend {
    async fn score(
        &self,
        model: &ModelDescriptor,
        request: &ScoringRequest,
    ) -> Result<Vec<ScoredResult>> {
        let prompt = self.build_prompt(request);
        let content = match model.provider {
            Provider::Groq => self.fetch_groq(&model.name, &prompt).await?,
            Provider::Google => self.fetch_gemini(&model.name, &prompt).await?,
        };
        parse_model_payload(&content)
    }
}

/// Parse a model reply into scored results. Accepts a bare object (wrapped
/// into a one-element list) or an array; tolerates markdown fences and prose
/// around the JSON payload.
pub fn parse_model_payload(content: &str) -> Result<Vec<ScoredResult>> {
    let payload = extract_json(content);
    if let Ok(list) = serde_json::from_str::<Vec<ScoredResult>>(payload) {
        return Ok(list);
    }
    if let Ok(single) = serde_json::from_str::<ScoredResult>(payload) {
        return Ok(vec![single]);
    }
    bail!("model reply is not a scored-result payload: {payload:.120}")
}

/// Slice out the outermost JSON value, dropping fences and surrounding prose.
fn extract_json(s: &str) -> &str {
    let t = s.trim();
    let start = t.find(['[', '{']);
    let end = t.rfind([']', '}']);
    match (start, end) {
        (Some(a), Some(b)) if b >= a => &t[a..=b],
        _ => t,
    }
}
