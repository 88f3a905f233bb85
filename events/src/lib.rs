//! Event model for the learning platform's real-time stream.
//!
//! This crate defines the records the server pushes over the event stream and
//! the closed taxonomy of event type keys the client reacts to.
//!
//! # Architecture
//!
//! - **Event**: One immutable record as received from the stream. Only the fields
//!   relevant to its type are populated.
//! - **EventType**: The routing key. Job outcomes are keyed per `JobCategory`,
//!   learning-guide generation has its own fixed set of keys, and anything else
//!   is carried through as `EventType::Other`.
//! - **SectionOutline**: One entry of a learning-guide outline.
//!
//! This crate has no dependencies on internal crates, so both the transport layer
//! and the consumers can share it without cycles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

const LEARNING_GUIDE_PREFIX: &str = "learning-guide";

/// Resource categories whose background jobs announce their outcome on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobCategory {
    Quiz,
    Flashcard,
    Content,
    Summary,
}

impl JobCategory {
    pub const ALL: [JobCategory; 4] = [
        JobCategory::Quiz,
        JobCategory::Flashcard,
        JobCategory::Content,
        JobCategory::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobCategory::Quiz => "quiz",
            JobCategory::Flashcard => "flashcard",
            JobCategory::Content => "content",
            JobCategory::Summary => "summary",
        }
    }

    /// The key announcing that a job of this category finished.
    pub fn completed(self) -> EventType {
        EventType::JobCompleted(self)
    }

    /// The key announcing that a job of this category failed.
    pub fn failed(self) -> EventType {
        EventType::JobFailed(self)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct JobCategoryParseError;

impl fmt::Display for JobCategoryParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "expected one of: quiz, flashcard, content, summary")
    }
}

impl std::error::Error for JobCategoryParseError {}

impl FromStr for JobCategory {
    type Err = JobCategoryParseError;
    fn from_str(category: &str) -> Result<JobCategory, Self::Err> {
        match category.to_lowercase().as_str() {
            "quiz" => Ok(JobCategory::Quiz),
            "flashcard" => Ok(JobCategory::Flashcard),
            "content" => Ok(JobCategory::Content),
            "summary" => Ok(JobCategory::Summary),
            _ => Err(JobCategoryParseError),
        }
    }
}

impl fmt::Display for JobCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing key of an [`Event`].
///
/// Serialized as its dotted string form, e.g. `quiz.completed` or
/// `learning-guide.section.chunk`. Keys outside the known taxonomy are kept
/// verbatim in `Other` so they can still be routed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    JobCompleted(JobCategory),
    JobFailed(JobCategory),
    OutlineCompleted,
    SectionStarted,
    SectionChunk,
    SectionCompleted,
    AllSectionsCompleted,
    Other(String),
}

impl EventType {
    /// The learning-guide keys a section stream consumer listens to.
    pub const LEARNING_GUIDE: [EventType; 5] = [
        EventType::OutlineCompleted,
        EventType::SectionStarted,
        EventType::SectionChunk,
        EventType::SectionCompleted,
        EventType::AllSectionsCompleted,
    ];

    fn parse(key: &str) -> EventType {
        if let Some(rest) = key
            .strip_prefix(LEARNING_GUIDE_PREFIX)
            .and_then(|rest| rest.strip_prefix('.'))
        {
            return match rest {
                "outline.completed" => EventType::OutlineCompleted,
                "section.started" => EventType::SectionStarted,
                "section.chunk" => EventType::SectionChunk,
                "section.completed" => EventType::SectionCompleted,
                "all-sections.completed" => EventType::AllSectionsCompleted,
                _ => EventType::Other(key.to_string()),
            };
        }

        match key.split_once('.') {
            Some((category, "completed")) => category
                .parse()
                .map(EventType::JobCompleted)
                .unwrap_or_else(|_| EventType::Other(key.to_string())),
            Some((category, "failed")) => category
                .parse()
                .map(EventType::JobFailed)
                .unwrap_or_else(|_| EventType::Other(key.to_string())),
            _ => EventType::Other(key.to_string()),
        }
    }
}

impl FromStr for EventType {
    type Err = std::convert::Infallible;
    fn from_str(key: &str) -> Result<EventType, Self::Err> {
        Ok(EventType::parse(key))
    }
}

impl From<String> for EventType {
    fn from(key: String) -> Self {
        EventType::parse(&key)
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EventType::JobCompleted(category) => write!(f, "{}.completed", category),
            EventType::JobFailed(category) => write!(f, "{}.failed", category),
            EventType::OutlineCompleted => write!(f, "{LEARNING_GUIDE_PREFIX}.outline.completed"),
            EventType::SectionStarted => write!(f, "{LEARNING_GUIDE_PREFIX}.section.started"),
            EventType::SectionChunk => write!(f, "{LEARNING_GUIDE_PREFIX}.section.chunk"),
            EventType::SectionCompleted => write!(f, "{LEARNING_GUIDE_PREFIX}.section.completed"),
            EventType::AllSectionsCompleted => {
                write!(f, "{LEARNING_GUIDE_PREFIX}.all-sections.completed")
            }
            EventType::Other(key) => f.write_str(key),
        }
    }
}

/// One entry of a learning-guide outline.
///
/// Only the title is interpreted; any other descriptor fields the server sends
/// are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionOutline {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SectionOutline {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            extra: Map::new(),
        }
    }
}

/// A record pushed by the server over the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: EventType,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Opaque key/value data attached to job outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<SectionOutline>>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Creates an event of the given type with every optional field unset.
    pub fn new(event_type: EventType, user_id: impl Into<String>) -> Self {
        Self {
            event_type,
            user_id: user_id.into(),
            job_id: None,
            resource_id: None,
            error: None,
            metadata: None,
            content_id: None,
            section_index: None,
            section_title: None,
            chunk: None,
            sections: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    pub fn with_section_index(mut self, section_index: usize) -> Self {
        self.section_index = Some(section_index);
        self
    }

    pub fn with_section_title(mut self, section_title: impl Into<String>) -> Self {
        self.section_title = Some(section_title.into());
        self
    }

    pub fn with_chunk(mut self, chunk: impl Into<String>) -> Self {
        self.chunk = Some(chunk.into());
        self
    }

    pub fn with_sections(mut self, sections: Vec<SectionOutline>) -> Self {
        self.sections = Some(sections);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_parses_job_outcomes_for_every_category() {
        for category in JobCategory::ALL {
            let completed: EventType = format!("{}.completed", category).parse().unwrap();
            let failed: EventType = format!("{}.failed", category).parse().unwrap();
            assert_eq!(completed, EventType::JobCompleted(category));
            assert_eq!(failed, EventType::JobFailed(category));
        }
    }

    #[test]
    fn test_event_type_parses_learning_guide_keys() {
        let keys = [
            "learning-guide.outline.completed",
            "learning-guide.section.started",
            "learning-guide.section.chunk",
            "learning-guide.section.completed",
            "learning-guide.all-sections.completed",
        ];

        for (key, expected) in keys.iter().zip(EventType::LEARNING_GUIDE.iter()) {
            let parsed: EventType = key.parse().unwrap();
            assert_eq!(&parsed, expected);
            assert_eq!(parsed.to_string(), *key);
        }
    }

    #[test]
    fn test_event_type_keeps_unknown_keys_verbatim() {
        let parsed: EventType = "video.completed".parse().unwrap();
        assert_eq!(parsed, EventType::Other("video.completed".to_string()));
        assert_eq!(parsed.to_string(), "video.completed");

        let parsed: EventType = "learning-guide.section.paused".parse().unwrap();
        assert_eq!(
            parsed,
            EventType::Other("learning-guide.section.paused".to_string())
        );
    }

    #[test]
    fn test_event_deserializes_from_camel_case_wire_format() {
        let event: Event = serde_json::from_value(json!({
            "eventType": "quiz.completed",
            "userId": "user-1",
            "jobId": "job-42",
            "resourceId": "quiz-7",
            "metadata": { "questionCount": 10 },
            "timestamp": "2024-05-01T12:00:00Z"
        }))
        .unwrap();

        assert_eq!(event.event_type, EventType::JobCompleted(JobCategory::Quiz));
        assert_eq!(event.job_id.as_deref(), Some("job-42"));
        assert_eq!(event.resource_id.as_deref(), Some("quiz-7"));
        assert_eq!(event.metadata.unwrap()["questionCount"], json!(10));
        assert!(event.chunk.is_none());
        assert_eq!(event.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_event_deserializes_section_fields_and_outline() {
        let event: Event = serde_json::from_value(json!({
            "eventType": "learning-guide.outline.completed",
            "userId": "user-1",
            "contentId": "c1",
            "sections": [
                { "title": "Intro", "estimatedMinutes": 3 },
                { "title": "Deep dive" }
            ]
        }))
        .unwrap();

        let sections = event.sections.unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title.as_deref(), Some("Intro"));
        assert_eq!(sections[0].extra["estimatedMinutes"], json!(3));
        assert_eq!(event.content_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_event_without_type_is_rejected() {
        let result: Result<Event, _> = serde_json::from_value(json!({ "userId": "user-1" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_job_category_parse_is_case_insensitive() {
        assert_eq!("Flashcard".parse::<JobCategory>(), Ok(JobCategory::Flashcard));
        assert_eq!("video".parse::<JobCategory>(), Err(JobCategoryParseError));
    }
}
