//! Chapter generation.
//!
//! [`ChapterGenerator`] is the seam between the engine and whatever writes
//! chapters. [`ClaudeNarrator`] is the production implementation: it asks
//! Claude to call the `write_chapter` tool, whose schema is derived from
//! [`ChapterDraft`].

mod schema;

pub use schema::{
    ChapterDraft, ChapterError, ChoiceDraft, MAX_REQUIRED_STAT, MAX_STAT_GAIN, MAX_TIME_LIMIT,
};

use crate::gate::SkillCheckOutcome;
use crate::stats::CharacterStats;
use async_trait::async_trait;
use claude::{Claude, Message, Request};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors from generating a chapter.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Claude API error: {0}")]
    Api(#[from] claude::Error),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Response contained no chapter")]
    MissingChapter,

    #[error("Malformed chapter JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid chapter: {0}")]
    Invalid(#[from] ChapterError),

    #[error("Generator unavailable: {0}")]
    Unavailable(String),
}

/// Everything the generator is told about the branch being written.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Path id the result will be cached under.
    pub path_id: String,
    pub previous_title: String,
    /// Prose of the chapter the choice was made in.
    pub story_so_far: String,
    pub choice_text: String,
    pub skill_check: Option<SkillCheckOutcome>,
    /// Passed for flavor only; the prose must never state them.
    pub stats: CharacterStats,
}

/// Something that writes the chapter following a choice.
#[async_trait]
pub trait ChapterGenerator: Send + Sync {
    /// Produce a draft of the next chapter. Validation happens in the caller.
    async fn generate(&self, request: &GenerationRequest) -> Result<ChapterDraft, GenerationError>;
}

/// Configuration for the Claude narrator.
#[derive(Debug, Clone)]
pub struct NarratorConfig {
    /// The model to use (defaults to the client's model).
    pub model: Option<String>,

    /// Maximum tokens for responses.
    pub max_tokens: usize,

    /// Temperature for generation.
    pub temperature: Option<f32>,

    /// Extra instructions appended to the system prompt.
    pub custom_prompt: Option<String>,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 4096,
            temperature: Some(0.9),
            custom_prompt: None,
        }
    }
}

/// Chapter generator backed by the Claude Messages API.
#[derive(Debug, Clone)]
pub struct ClaudeNarrator {
    client: Claude,
    config: NarratorConfig,
}

impl ClaudeNarrator {
    pub fn new(client: Claude, config: NarratorConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &NarratorConfig {
        &self.config
    }

    fn build_system_prompt(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str(include_str!("prompts/author.txt"));

        prompt.push_str("\n\n");
        prompt.push_str(include_str!("prompts/stats.txt"));

        prompt.push_str("\n\n");
        prompt.push_str(include_str!("prompts/timed_choices.txt"));

        if let Some(ref custom) = self.config.custom_prompt {
            prompt.push_str("\n\n## Additional Instructions\n");
            prompt.push_str(custom);
        }

        prompt
    }

    fn build_user_message(request: &GenerationRequest) -> String {
        let mut message = String::new();

        message.push_str(&format!(
            "## Story so far (previous chapter: {})\n{}\n\n",
            request.previous_title, request.story_so_far
        ));
        message.push_str(&format!("## The reader chose\n{}\n\n", request.choice_text));

        if let Some(outcome) = &request.skill_check {
            message.push_str(&format!("## Skill check\n{}\n\n", outcome.describe()));
        }

        let stats = &request.stats;
        message.push_str(&format!(
            "## Character stats\nStrength {}, Intelligence {}, Agility {}\n\
             (For reference only, to shape plausible choices and outcomes. Never state these \
             values in the story.)\n\n",
            stats.strength, stats.intelligence, stats.agility
        ));

        message.push_str("Write the next chapter now.");
        message
    }

    fn build_request(&self, request: &GenerationRequest) -> Request {
        let mut api_request = Request::new(vec![Message::user(Self::build_user_message(request))])
            .with_system(self.build_system_prompt())
            .with_max_tokens(self.config.max_tokens)
            .forcing_tool(ChapterDraft::as_tool());

        if let Some(ref model) = self.config.model {
            api_request = api_request.with_model(model);
        }
        if let Some(temperature) = self.config.temperature {
            api_request = api_request.with_temperature(temperature);
        }

        api_request
    }
}

#[async_trait]
impl ChapterGenerator for ClaudeNarrator {
    async fn generate(&self, request: &GenerationRequest) -> Result<ChapterDraft, GenerationError> {
        debug!(path = %request.path_id, "requesting chapter from Claude");
        let response = self.client.complete(self.build_request(request)).await?;
        debug!(
            path = %request.path_id,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            stop_reason = ?response.stop_reason,
            "Claude responded"
        );

        match response.tool_input(ChapterDraft::schema_name()) {
            Some(input) => Ok(serde_json::from_value(input.clone())?),
            None => parse_draft_from_text(&response.text()),
        }
    }
}

/// Pull a chapter out of free text, tolerating code fences and chatter
/// around the JSON object.
pub fn parse_draft_from_text(text: &str) -> Result<ChapterDraft, GenerationError> {
    let start = text.find('{').ok_or(GenerationError::MissingChapter)?;
    let end = text.rfind('}').ok_or(GenerationError::MissingChapter)?;
    if end < start {
        return Err(GenerationError::MissingChapter);
    }
    Ok(serde_json::from_str(&text[start..=end])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::SkillCheckOutcome;
    use crate::stats::Stat;

    fn request() -> GenerationRequest {
        GenerationRequest {
            path_id: "path_abc".to_string(),
            previous_title: "Clues in the Fog".to_string(),
            story_so_far: "The fog coils.".to_string(),
            choice_text: "Search the lab".to_string(),
            skill_check: Some(SkillCheckOutcome {
                stat: Stat::Intelligence,
                threshold: 12,
                value: 4,
                passed: false,
            }),
            stats: CharacterStats::new(5, 4, 4),
        }
    }

    fn narrator(config: NarratorConfig) -> ClaudeNarrator {
        ClaudeNarrator::new(Claude::new("test-key").unwrap(), config)
    }

    #[test]
    fn test_system_prompt_sections() {
        let prompt = narrator(NarratorConfig {
            custom_prompt: Some("Keep it gothic.".to_string()),
            ..Default::default()
        })
        .build_system_prompt();

        assert!(prompt.contains("write_chapter"));
        assert!(prompt.contains("Timed choices"));
        assert!(prompt.contains("Every three points"));
        assert!(prompt.ends_with("Keep it gothic."));
    }

    #[test]
    fn test_user_message_contents() {
        let message = ClaudeNarrator::build_user_message(&request());
        assert!(message.contains("The fog coils."));
        assert!(message.contains("Search the lab"));
        assert!(message.contains("failed an intelligence check"));
        assert!(message.contains("Strength 5, Intelligence 4, Agility 4"));
    }

    #[test]
    fn test_request_forces_chapter_tool() {
        let api_request = narrator(NarratorConfig {
            model: Some("claude-test".to_string()),
            ..Default::default()
        })
        .build_request(&request());

        assert_eq!(api_request.model.as_deref(), Some("claude-test"));
        assert_eq!(api_request.max_tokens, 4096);
        assert_eq!(api_request.temperature, Some(0.9));
        let tools = api_request.tools.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "write_chapter");
        assert!(matches!(
            api_request.tool_choice,
            Some(claude::ToolChoice::Tool { ref name }) if name == "write_chapter"
        ));
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "Here you go:\n```json\n{\"title\": \"Midnight\", \"content\": [\"Bells.\"], \"choices\": []}\n```";
        let draft = parse_draft_from_text(text).unwrap();
        assert_eq!(draft.title, "Midnight");
        assert!(draft.choices.is_empty());
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(matches!(
            parse_draft_from_text("I cannot write that."),
            Err(GenerationError::MissingChapter)
        ));
        assert!(matches!(
            parse_draft_from_text("{not json}"),
            Err(GenerationError::Malformed(_))
        ));
    }
}
