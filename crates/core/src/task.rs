//! Task kinds and their payloads.
//!
//! The `tasks` table stores the kind as text and the payload as untyped
//! JSON. [`TaskPayload::parse`] turns the pair into a tagged union so that
//! handlers only ever see a validated, kind-specific request.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum length of a generation prompt.
pub const MAX_PROMPT_LEN: usize = 2000;

/// Largest edge accepted for generated images.
pub const MAX_GENERATE_EDGE: u32 = 2048;

/// Upscale factors a restoration vendor accepts.
const VALID_UPSCALE_FACTORS: [u8; 3] = [1, 2, 4];

// ---------------------------------------------------------------------------
// TaskKind
// ---------------------------------------------------------------------------

/// The closed set of work kinds the queue knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Restore,
    Stylize,
    EraStyle,
    Generate,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Restore,
        TaskKind::Stylize,
        TaskKind::EraStyle,
        TaskKind::Generate,
    ];

    /// The value stored in `tasks.task_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Restore => "restore",
            TaskKind::Stylize => "stylize",
            TaskKind::EraStyle => "era_style",
            TaskKind::Generate => "generate",
        }
    }

    /// Parse a stored `task_type`. Returns `None` for unknown kinds.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == value)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payload variants
// ---------------------------------------------------------------------------

/// Restore a damaged or faded photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorePayload {
    pub source_url: String,
    #[serde(default)]
    pub colorize: bool,
    #[serde(default)]
    pub upscale: Option<u8>,
}

/// Re-render a photo in a named artistic style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StylizePayload {
    pub source_url: String,
    pub style: String,
    /// Blend strength in `0.0..=1.0`; vendor default when absent.
    #[serde(default)]
    pub strength: Option<f32>,
}

/// Re-render a portrait as if taken in a historical era.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EraStylePayload {
    pub source_url: String,
    /// Era label, e.g. `"1920s"`.
    pub era: String,
}

/// Generate an image from a text prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratePayload {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub reference_url: Option<String>,
}

// ---------------------------------------------------------------------------
// TaskPayload
// ---------------------------------------------------------------------------

/// A validated task payload, one variant per [`TaskKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    Restore(RestorePayload),
    Stylize(StylizePayload),
    EraStyle(EraStylePayload),
    Generate(GeneratePayload),
}

impl TaskPayload {
    /// Build a payload from the stored `task_type` and JSON column.
    ///
    /// Unknown kinds, JSON that does not match the kind's shape, and values
    /// that fail validation all return [`CoreError::Validation`].
    pub fn parse(task_type: &str, payload: &serde_json::Value) -> Result<Self, CoreError> {
        let kind = TaskKind::parse(task_type)
            .ok_or_else(|| CoreError::Validation(format!("Unsupported task type: {task_type}")))?;

        let parsed = match kind {
            TaskKind::Restore => TaskPayload::Restore(from_json(kind, payload)?),
            TaskKind::Stylize => TaskPayload::Stylize(from_json(kind, payload)?),
            TaskKind::EraStyle => TaskPayload::EraStyle(from_json(kind, payload)?),
            TaskKind::Generate => TaskPayload::Generate(from_json(kind, payload)?),
        };
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::Restore(_) => TaskKind::Restore,
            TaskPayload::Stylize(_) => TaskKind::Stylize,
            TaskPayload::EraStyle(_) => TaskKind::EraStyle,
            TaskPayload::Generate(_) => TaskKind::Generate,
        }
    }

    /// Check field-level constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            TaskPayload::Restore(p) => {
                validate_source_url(&p.source_url)?;
                if let Some(factor) = p.upscale {
                    if !VALID_UPSCALE_FACTORS.contains(&factor) {
                        return Err(CoreError::Validation(format!(
                            "Upscale factor must be one of {VALID_UPSCALE_FACTORS:?}, got {factor}"
                        )));
                    }
                }
            }
            TaskPayload::Stylize(p) => {
                validate_source_url(&p.source_url)?;
                require_non_empty("style", &p.style)?;
                if let Some(strength) = p.strength {
                    if !(0.0..=1.0).contains(&strength) {
                        return Err(CoreError::Validation(format!(
                            "Style strength must be between 0.0 and 1.0, got {strength}"
                        )));
                    }
                }
            }
            TaskPayload::EraStyle(p) => {
                validate_source_url(&p.source_url)?;
                require_non_empty("era", &p.era)?;
            }
            TaskPayload::Generate(p) => {
                require_non_empty("prompt", &p.prompt)?;
                if p.prompt.chars().count() > MAX_PROMPT_LEN {
                    return Err(CoreError::Validation(format!(
                        "Prompt must not exceed {MAX_PROMPT_LEN} characters"
                    )));
                }
                for (name, edge) in [("width", p.width), ("height", p.height)] {
                    if let Some(edge) = edge {
                        if edge == 0 || edge > MAX_GENERATE_EDGE {
                            return Err(CoreError::Validation(format!(
                                "Image {name} must be between 1 and {MAX_GENERATE_EDGE}, got {edge}"
                            )));
                        }
                    }
                }
                if let Some(url) = &p.reference_url {
                    validate_source_url(url)?;
                }
            }
        }
        Ok(())
    }
}

fn from_json<T: serde::de::DeserializeOwned>(
    kind: TaskKind,
    payload: &serde_json::Value,
) -> Result<T, CoreError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| CoreError::Validation(format!("Malformed {kind} payload: {e}")))
}

fn require_non_empty(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn validate_source_url(url: &str) -> Result<(), CoreError> {
    require_non_empty("source_url", url)?;
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(CoreError::Validation(format!(
            "source_url must be an http(s) URL, got \"{url}\""
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
