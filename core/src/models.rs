//! Persisted records and the string-backed enums stored in their columns.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Enum stored as a lowercase string column.
///
/// Generates `as_str`, `parse`, `Display` and serde impls that agree on the
/// same spelling.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }

            /// Parse from string representation
            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $( $text => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    /// Stage of a research session. Declared in pipeline order.
    pub enum ResearchStatus {
        TopicInput => "topic_input",
        Researching => "researching",
        ResearchComplete => "research_complete",
        Generating => "generating",
        Generated => "generated",
        Enriching => "enriching",
        Ready => "ready",
        Published => "published",
    }
}

string_enum! {
    /// Stage of a curriculum plan. Declared in pipeline order.
    pub enum CurriculumStatus {
        Planning => "planning",
        OutlineReady => "outline_ready",
        Generating => "generating",
        Complete => "complete",
        Published => "published",
    }
}

string_enum! {
    #[derive(Default)]
    pub enum Difficulty {
        Easy => "easy",
        #[default]
        Medium => "medium",
        Hard => "hard",
    }
}

string_enum! {
    pub enum MediaType {
        Youtube => "youtube",
        KhanAcademy => "khan_academy",
        Article => "article",
        Interactive => "interactive",
        Other => "other",
    }
}

impl MediaType {
    pub fn is_video(self) -> bool {
        matches!(self, MediaType::Youtube | MediaType::KhanAcademy)
    }
}

string_enum! {
    pub enum MediaSource {
        /// Found by media discovery.
        Auto => "auto",
        /// Added by a parent or admin.
        Manual => "manual",
    }
}

string_enum! {
    pub enum ContextType {
        General => "general",
        Lesson => "lesson",
        QuizHelp => "quiz_help",
        Canvas => "canvas",
        Math => "math",
    }
}

string_enum! {
    pub enum LessonStatus {
        Draft => "draft",
        Review => "review",
        Published => "published",
    }
}

string_enum! {
    /// Author of a persisted chat message or completion turn.
    pub enum Role {
        System => "system",
        User => "user",
        Assistant => "assistant",
    }
}

pub const DEFAULT_CHAT_TITLE: &str = "New Chat";
pub const DEFAULT_SUBJECT_ICON: &str = "📚";
pub const DEFAULT_SUBJECT_COLOR: &str = "#6366f1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KidProfile {
    pub id: i64,
    pub display_name: String,
    pub grade_level: u32,
    pub age: Option<u32>,
    pub daily_chat_limit: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewKid {
    pub display_name: String,
    pub grade_level: u32,
    #[serde(default)]
    pub age: Option<u32>,
    /// Falls back to `chat.default_daily_limit`.
    #[serde(default)]
    pub daily_chat_limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSubject {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_color")]
    pub color: String,
}

impl NewSubject {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            icon: default_icon(),
            color: default_color(),
        }
    }
}

fn default_icon() -> String {
    DEFAULT_SUBJECT_ICON.to_string()
}

fn default_color() -> String {
    DEFAULT_SUBJECT_COLOR.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub subject_id: i64,
    pub name: String,
    pub description: String,
    pub grade_level_min: u32,
    pub grade_level_max: u32,
}

#[derive(Debug, Clone)]
pub struct NewTopic {
    pub subject_id: i64,
    pub name: String,
    pub description: String,
    pub grade_level_min: u32,
    pub grade_level_max: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub topic_id: i64,
    pub title: String,
    pub description: String,
    pub content: String,
    pub grade_level: u32,
    pub difficulty: Difficulty,
    pub estimated_minutes: u32,
    pub ai_generated: bool,
    pub status: LessonStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A freshly generated lesson, always stored as an AI-generated draft.
#[derive(Debug, Clone)]
pub struct NewLesson {
    pub topic_id: i64,
    pub title: String,
    pub description: String,
    pub content: String,
    pub grade_level: u32,
    pub difficulty: Difficulty,
    pub estimated_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchSession {
    pub id: i64,
    pub subject_id: i64,
    pub topic_id: Option<i64>,
    pub topic_query: String,
    pub grade_level: u32,
    pub difficulty: Difficulty,
    pub status: ResearchStatus,
    pub lesson_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewResearchSession {
    pub subject_id: i64,
    #[serde(default)]
    pub topic_id: Option<i64>,
    pub topic_query: String,
    #[serde(default = "default_grade")]
    pub grade_level: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
}

fn default_grade() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: i64,
    pub session_id: i64,
    pub summary: String,
    pub key_facts: Vec<String>,
    pub citations: Vec<Citation>,
    pub raw_response: serde_json::Value,
    pub parent_notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Hand edits to a finding. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FindingPatch {
    pub summary: Option<String>,
    pub key_facts: Option<Vec<String>>,
    pub parent_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaResource {
    pub id: i64,
    pub session_id: i64,
    pub lesson_id: Option<i64>,
    pub url: String,
    pub title: String,
    pub description: String,
    pub media_type: MediaType,
    pub source: MediaSource,
    pub thumbnail_url: String,
    pub order: u32,
    pub is_included: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMedia {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_media_type")]
    pub media_type: MediaType,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default = "default_true")]
    pub is_included: bool,
}

fn default_media_type() -> MediaType {
    MediaType::Other
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaPatch {
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub media_type: Option<MediaType>,
    pub thumbnail_url: Option<String>,
    pub order: Option<u32>,
    pub is_included: Option<bool>,
}

/// Session plus its finding and media, as shown to admins.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchSessionDetail {
    #[serde(flatten)]
    pub session: ResearchSession,
    pub finding: Option<Finding>,
    pub media: Vec<MediaResource>,
}

/// Week-by-week plan produced by the outline generator.
///
/// Every field defaults so hand-edited outlines with gaps still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurriculumOutline {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject_name: String,
    #[serde(default)]
    pub subject_icon: String,
    #[serde(default)]
    pub subject_color: String,
    #[serde(default)]
    pub weeks: Vec<OutlineWeek>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutlineWeek {
    #[serde(default = "default_week_number")]
    pub week_number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub lessons: Vec<OutlineLesson>,
}

fn default_week_number() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutlineLesson {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumPlan {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub concept: String,
    pub grade_level: u32,
    pub difficulty: Difficulty,
    pub duration_weeks: u32,
    pub lessons_per_week: u32,
    pub status: CurriculumStatus,
    pub outline: Option<CurriculumOutline>,
    pub subject_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCurriculumPlan {
    pub concept: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_grade")]
    pub grade_level: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default = "default_duration_weeks")]
    pub duration_weeks: u32,
    #[serde(default = "default_lessons_per_week")]
    pub lessons_per_week: u32,
    #[serde(default)]
    pub subject_id: Option<i64>,
}

fn default_duration_weeks() -> u32 {
    2
}

fn default_lessons_per_week() -> u32 {
    2
}

impl NewCurriculumPlan {
    pub fn validate(&self) -> Result<()> {
        if self.concept.trim().is_empty() {
            return Err(CoreError::InvalidInput("Concept is required".to_string()));
        }
        if !(1..=12).contains(&self.grade_level) {
            return Err(CoreError::InvalidInput(
                "grade_level must be between 1 and 12".to_string(),
            ));
        }
        if !(1..=5).contains(&self.duration_weeks) {
            return Err(CoreError::InvalidInput(
                "duration_weeks must be between 1 and 5".to_string(),
            ));
        }
        if !(1..=3).contains(&self.lessons_per_week) {
            return Err(CoreError::InvalidInput(
                "lessons_per_week must be between 1 and 3".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutlinePatch {
    pub outline: Option<CurriculumOutline>,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// One generated lesson slot of a curriculum, keyed by (week, order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumLesson {
    pub id: i64,
    pub plan_id: i64,
    pub lesson_id: i64,
    /// Title of the linked lesson, joined in for narratives and display.
    pub lesson_title: String,
    pub week_number: u32,
    /// Zero-based position within the week.
    pub order: u32,
    /// Newline-joined objectives.
    pub learning_objectives: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurriculumPlanDetail {
    #[serde(flatten)]
    pub plan: CurriculumPlan,
    pub entries: Vec<CurriculumLesson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: i64,
    pub kid_id: i64,
    pub title: String,
    pub context_type: ContextType,
    pub context_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewChatSession {
    pub kid_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_context_type")]
    pub context_type: ContextType,
    #[serde(default)]
    pub context_id: Option<i64>,
}

fn default_context_type() -> ContextType {
    ContextType::General
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: i64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MathPracticeSession {
    pub id: i64,
    pub kid_id: i64,
    pub topic: String,
    /// Tutor chat opened alongside the practice session.
    pub chat_session_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMathSession {
    pub kid_id: i64,
    #[serde(default = "default_math_topic")]
    pub topic: String,
}

pub(crate) fn default_math_topic() -> String {
    "arithmetic".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MathProblemAttempt {
    pub id: i64,
    pub session_id: i64,
    pub problem_text: String,
    pub difficulty: String,
    pub hint: String,
    pub is_correct: Option<bool>,
    pub correct_answer: String,
    pub feedback: String,
    pub order: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMathAttempt {
    pub problem_text: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub correct_answer: String,
    #[serde(default)]
    pub feedback: String,
}
