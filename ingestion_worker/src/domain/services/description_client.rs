use async_trait::async_trait;
use common::{
    core::retry_policy::RetryPolicy,
    domain::entities::image_record::UNTITLED_IMAGE_TITLE,
    services::vertex_ai::{RemoteCallError, VertexAiClient},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ports::image_describer::{DescriptionClientError, ImageDescriber, ImageDescription};

pub const DESCRIPTION_INSTRUCTION: &str = "Describe this image for an image search engine. \
Give it a title of 5 to 10 words, and a detailed description of the objects, the setting, the colors \
and any visible text. Respond only with a JSON object with exactly two keys: \"title\" and \"description\".";

/// Describes images with a Gemini model hosted on Vertex AI
pub struct VertexDescriptionClient {
    vertex_ai: VertexAiClient,
    retry_policy: RetryPolicy,
}

impl VertexDescriptionClient {
    pub fn new(vertex_ai: VertexAiClient, retry_policy: RetryPolicy) -> Self {
        Self {
            vertex_ai,
            retry_policy,
        }
    }
}

#[async_trait]
impl ImageDescriber for VertexDescriptionClient {
    #[tracing::instrument(name = "Describing image", skip(self))]
    async fn describe(
        &self,
        image_ref: &str,
        mime_type: &str,
    ) -> Result<ImageDescription, DescriptionClientError> {
        let request = GenerateContentRequest::new(image_ref, mime_type);
        let model = &self.vertex_ai.settings().description_model;

        let response: GenerateContentResponse = self
            .retry_policy
            .retry(
                || self.vertex_ai.call_model(model, "generateContent", &request),
                RemoteCallError::is_rate_limited,
            )
            .await?;

        let text = response.text().ok_or(DescriptionClientError::NoContent)?;

        let parse = DescriptionParse::from_model_text(&text);
        if let DescriptionParse::Raw { .. } = parse {
            warn!("Description model did not answer with JSON, using its whole answer as description");
        }

        let description = parse.into_description()?;
        info!(title = %description.title, "Described image");

        Ok(description)
    }
}

/// What could be read from the answer of the description model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptionParse {
    /// The answer was a JSON object, with possibly missing fields
    Structured {
        title: Option<String>,
        description: Option<String>,
    },
    /// The answer was not JSON
    Raw { text: String },
}

#[derive(Deserialize)]
struct StructuredAnswer {
    title: Option<String>,
    description: Option<String>,
}

impl DescriptionParse {
    /// Reads an answer, tolerating markdown code fences around the JSON
    pub fn from_model_text(text: &str) -> Self {
        match serde_json::from_str::<StructuredAnswer>(strip_code_fences(text)) {
            Ok(answer) => DescriptionParse::Structured {
                title: answer.title,
                description: answer.description,
            },
            Err(_) => DescriptionParse::Raw {
                text: text.to_string(),
            },
        }
    }

    /// A non-JSON answer is used as the description, and a missing title is replaced by "Untitled Image".
    /// An empty description is an error.
    pub fn into_description(self) -> Result<ImageDescription, DescriptionClientError> {
        let (title, description) = match self {
            DescriptionParse::Structured { title, description } => {
                (title, description.unwrap_or_default())
            }
            DescriptionParse::Raw { text } => (None, text),
        };

        if description.trim().is_empty() {
            return Err(DescriptionClientError::MissingDescription);
        }

        let title = title
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| UNTITLED_IMAGE_TITLE.to_string());

        Ok(ImageDescription { title, description })
    }
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let inner = inner
        .strip_prefix("json")
        .or_else(|| inner.strip_prefix("JSON"))
        .unwrap_or(inner);
    let inner = inner.trim_end().strip_suffix("```").unwrap_or(inner);

    inner.trim()
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(image_ref: &'a str, mime_type: &'a str) -> Self {
        Self {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part {
                        text: Some(DESCRIPTION_INSTRUCTION),
                        file_data: None,
                    },
                    Part {
                        text: None,
                        file_data: Some(FileData {
                            mime_type,
                            file_uri: image_ref,
                        }),
                    },
                ],
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text parts of the first candidate, `None` when there is none
    fn text(self) -> Option<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();

        (!text.is_empty()).then_some(text)
    }
}
