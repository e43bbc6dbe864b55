//! Schedule import from PDF routines via Gemini.
//!
//! The PDF is sent inline (base64) to the `generateContent` endpoint together
//! with an extraction prompt and a response schema. Gemini answers with a JSON
//! array of raw sessions, which [`review`] turns into [`ClassSession`]s.
//!
//! Task suggestions use the same endpoint with a plain text prompt and never
//! fail: any error yields [`FALLBACK_SUGGESTIONS`].

use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::GeminiConfig;
use crate::types::{generate_id, ClassSession, DayOfWeek};

/// HTTP request timeout. PDF extraction can be slow.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Leading bytes of every PDF file.
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Returned by [`GeminiClient::suggest_tasks`] when Gemini cannot help.
pub const FALLBACK_SUGGESTIONS: [&str; 3] = [
    "Review lecture notes",
    "Prepare for next quiz",
    "Read textbook chapter",
];

const EXTRACTION_PROMPT: &str = r#"This PDF is a university class routine or timetable.
Extract every ACTIVE weekly class session.

Look for a "Remarks", "Status", or "Comments" column. Skip any course marked
"Dropped", "Withdrawn", "Cancelled", or with a similar negative status. Only
active, registered courses belong in the output.

For each session report:
- courseName, e.g. "Introduction to Programming"
- courseCode, e.g. "CSE101"
- faculty initials or name, e.g. "JD"
- room, e.g. "UB20401"
- day of the week: Monday, Tuesday, Wednesday, Thursday, Friday, Saturday or Sunday
- startTime and endTime in 24-hour HH:mm, e.g. "14:30"

For grid layouts use the row and column headers to read days and times. Ignore
exam schedules and focus on the weekly routine.

Answer with a JSON array only."#;

/// Errors from schedule import.
#[derive(Error, Debug)]
pub enum ImportError {
    /// The input is not a PDF document.
    #[error("Please upload a PDF file.")]
    NotPdf,

    /// No Gemini API key is configured.
    #[error("API key not found: set GEMINI_API_KEY or API_KEY")]
    MissingApiKey,

    /// The PDF could not be read.
    #[error("failed to read PDF: {0}")]
    Io(#[from] std::io::Error),

    /// The request did not complete.
    #[error("Gemini request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Gemini answered with a non-success status.
    #[error("Gemini error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Gemini answered without any text.
    #[error("Gemini returned an empty response")]
    EmptyResponse,

    /// The answer was not the expected JSON.
    #[error("Gemini returned malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A session as extracted by Gemini, before review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSession {
    pub course_name: Option<String>,
    pub course_code: Option<String>,
    pub faculty: Option<String>,
    pub room: Option<String>,
    pub day: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// A raw row that could not become a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// Position in the extracted list.
    pub index: usize,
    pub reason: String,
}

/// Outcome of reviewing extracted rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewedSchedule {
    pub sessions: Vec<ClassSession>,
    pub rejected: Vec<RejectedRow>,
    /// Rows with neither course code nor course name.
    pub skipped: usize,
}

/// Turns extracted rows into sessions with fresh ids.
///
/// Blank rows are skipped and rows naming an unknown day are rejected; the
/// rest are kept even when times are unusual.
#[must_use]
pub fn review(raw: Vec<RawSession>) -> ReviewedSchedule {
    let mut reviewed = ReviewedSchedule::default();

    for (index, row) in raw.into_iter().enumerate() {
        let course_code = clean(row.course_code);
        let course_name = clean(row.course_name);
        if course_code.is_empty() && course_name.is_empty() {
            reviewed.skipped += 1;
            continue;
        }

        let day_text = clean(row.day);
        let day = match day_text.parse::<DayOfWeek>() {
            Ok(day) => day,
            Err(e) => {
                reviewed.rejected.push(RejectedRow {
                    index,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        reviewed.sessions.push(ClassSession {
            id: generate_id(),
            course_name,
            course_code,
            faculty: clean(row.faculty),
            room: clean(row.room),
            day,
            start_time: clean(row.start_time),
            end_time: clean(row.end_time),
            color: None,
        });
    }

    reviewed
}

fn clean(field: Option<String>) -> String {
    field.map(|s| s.trim().to_string()).unwrap_or_default()
}

/// Reads a PDF from disk, rejecting anything that is not a PDF.
///
/// # Errors
///
/// Returns `ImportError::Io` if the file cannot be read, or
/// `ImportError::NotPdf` if it lacks the PDF header.
pub async fn read_pdf(path: &Path) -> Result<Vec<u8>, ImportError> {
    let bytes = tokio::fs::read(path).await?;
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(ImportError::NotPdf);
    }
    Ok(bytes)
}

/// Gemini `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ImportError::MissingApiKey` if no key is configured, or
    /// `ImportError::Http` if the HTTP client cannot be built.
    pub fn from_config(config: &GeminiConfig) -> Result<Self, ImportError> {
        let api_key = config.api_key.clone().ok_or(ImportError::MissingApiKey)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Extracts the active sessions of a PDF routine.
    ///
    /// # Errors
    ///
    /// Returns `ImportError::NotPdf` for non-PDF input, or any request or
    /// decoding error.
    pub async fn parse_schedule(&self, pdf: &[u8]) -> Result<Vec<RawSession>, ImportError> {
        if !pdf.starts_with(PDF_MAGIC) {
            return Err(ImportError::NotPdf);
        }

        let body = json!({
            "contents": [{
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": "application/pdf",
                            "data": STANDARD.encode(pdf),
                        }
                    },
                    { "text": EXTRACTION_PROMPT }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": session_schema(),
            }
        });

        info!(model = %self.model, bytes = pdf.len(), "Extracting schedule from PDF");
        let Some(text) = self.generate(&body).await? else {
            return Ok(Vec::new());
        };

        let sessions: Vec<RawSession> = serde_json::from_str(&text)?;
        info!(count = sessions.len(), "Extracted class sessions");
        Ok(sessions)
    }

    /// Asks for three study tasks for a course. Never fails.
    pub async fn suggest_tasks(&self, course_name: &str) -> Vec<String> {
        match self.try_suggest_tasks(course_name).await {
            Ok(suggestions) => suggestions,
            Err(e) => {
                warn!(error = %e, "Task suggestion failed, using defaults");
                FALLBACK_SUGGESTIONS.iter().map(|s| (*s).to_string()).collect()
            }
        }
    }

    async fn try_suggest_tasks(&self, course_name: &str) -> Result<Vec<String>, ImportError> {
        let prompt = format!(
            "Suggest 3 study tasks for a university student taking \"{course_name}\". \
             Answer with a JSON array of strings only."
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        let text = self.generate(&body).await?.ok_or(ImportError::EmptyResponse)?;
        let suggestions: Vec<String> = serde_json::from_str(&text)?;
        Ok(suggestions)
    }

    /// Posts a request and returns the first non-empty text part, if any.
    async fn generate(&self, body: &Value) -> Result<Option<String>, ImportError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let body_text = response.text().await?;
        if !status.is_success() {
            return Err(ImportError::Api {
                status: status.as_u16(),
                message: body_text,
            });
        }

        let parsed: GeminiResponse = serde_json::from_str(&body_text)?;
        let text = parsed
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter_map(|part| part.text)
            .find(|text| !text.trim().is_empty());

        debug!(has_text = text.is_some(), "Gemini responded");
        Ok(text)
    }
}

fn session_schema() -> Value {
    let string = json!({ "type": "STRING" });
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "courseName": string,
                "courseCode": string,
                "faculty": string,
                "room": string,
                "day": string,
                "startTime": string,
                "endTime": string,
            }
        }
    })
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}
