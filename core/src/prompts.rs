//! Prompt builders.
//!
//! Everything here is pure string templating: same inputs, same prompt.
//! Optional sections disappear entirely when their input is empty.

use crate::models::{Citation, MediaType};

/// A system prompt paired with the user message that goes with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    fn new(system: &str, user: String) -> Self {
        Self {
            system: system.to_string(),
            user,
        }
    }
}

/// Join non-empty blocks with a blank line between them.
fn blocks<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ───────────────────────────────────────────────────────────────────────────
// Chat system prompts
// ───────────────────────────────────────────────────────────────────────────

pub fn tutor_system_prompt(kid_name: &str, grade_level: u32, age: Option<u32>) -> String {
    let age_line = age
        .map(|age| format!(" They are {age} years old."))
        .unwrap_or_default();
    format!(
        "You are Learning Monk Tutor, a friendly and encouraging AI learning assistant for kids.

You are currently helping {kid_name}, who is in grade {grade_level}.{age_line}

IMPORTANT RULES:
- Use age-appropriate language for a grade {grade_level} student
- Be encouraging, patient, and positive
- Use simple explanations with real-world examples kids can relate to
- If they don't understand something, try explaining it a different way
- Use analogies, stories, and fun comparisons
- Never talk down to them, be respectful of their intelligence
- Use the Socratic method when possible: ask guiding questions instead of giving direct answers
- If they ask about something outside their curriculum, gently guide them back or explain at their level
- Never discuss inappropriate topics for children
- If they seem frustrated, acknowledge their feelings and offer encouragement
- Use emojis sparingly to keep things fun 🌟
- Keep responses concise, kids have shorter attention spans
- If they ask you to do their homework, help them understand the concept instead"
    )
}

/// Tutor prompt scoped to a lesson. Callers pass at most 3000 chars of context.
pub fn lesson_system_prompt(kid_name: &str, grade_level: u32, context: &str) -> String {
    let base = tutor_system_prompt(kid_name, grade_level, None);
    if context.is_empty() {
        return base;
    }
    format!(
        "{base}

CURRENT LESSON CONTEXT:
{kid_name} is currently studying the following lesson. Help them understand this material.
Keep your answers focused on this topic.

---
{context}
---"
    )
}

pub fn math_tutor_system_prompt(
    kid_name: &str,
    grade_level: u32,
    problem_text: &str,
    topic: &str,
) -> String {
    format!(
        "You are Learning Monk Math Tutor, a friendly and encouraging AI math helper for kids.

You are currently helping {kid_name}, who is in grade {grade_level}.

CURRENT MATH PROBLEM:
Topic: {topic}
Problem: {problem_text}

IMPORTANT RULES:
- Help {kid_name} work through this math problem step by step
- Use the Socratic method: ask guiding questions instead of giving the answer
- If they're stuck, break the problem into smaller steps
- Use age-appropriate language for grade {grade_level}
- Be encouraging and celebrate effort, not just correct answers
- Use real-world examples to explain concepts
- If they get the wrong answer, help them understand why and try again
- Never just give them the answer, guide them to discover it
- Keep responses concise and focused on the math
- Use simple formatting for math (e.g., 3 x 4 = 12, not LaTeX)"
    )
}

// ───────────────────────────────────────────────────────────────────────────
// Generator system prompts
// ───────────────────────────────────────────────────────────────────────────

pub const LESSON_GENERATOR_PROMPT: &str = "You are Learning Monk Content Creator, an expert educational content writer.

Create engaging, well-structured lessons for kids. Your lessons should:
- Start with a hook that captures attention (a question, story, or fun fact)
- Break complex concepts into digestible parts
- Use real-world examples kids can relate to
- Include \"Think About It\" questions throughout
- End with a summary of key takeaways
- Use markdown formatting with headers, bold text, and bullet points where helpful
- Include suggested activities or experiments when relevant

Format your response as a complete lesson in Markdown. Structure:
# [Lesson Title]

## 🎯 What You'll Learn
[Brief overview]

## 🪝 Hook
[Engaging opening]

## 📖 Main Content
[The lesson content with subheadings]

## 🤔 Think About It
[2-3 thought questions]

## ⭐ Key Takeaways
[Summary points]

## 🎮 Try This!
[Optional activity or experiment]";

pub const RESEARCH_LESSON_GENERATOR_PROMPT: &str = "You are Learning Monk Content Creator, an expert educational content writer.

You have been provided with RESEARCH FINDINGS including a summary, key facts, and citations from reliable sources.
Use this research to create a comprehensive, accurate, and engaging lesson.

Your lessons should:
- Incorporate the research findings naturally into the content
- Cite sources using [Source N] notation where N corresponds to the citation number
- Start with a hook that captures attention
- Break complex concepts into digestible parts
- Use real-world examples kids can relate to
- Include \"Think About It\" questions throughout
- End with a summary of key takeaways and a sources section
- Use markdown formatting with headers, bold text, and bullet points
- Reference multimedia resources where relevant

Format your response as a complete lesson in Markdown. Structure:
# [Lesson Title]

## 🎯 What You'll Learn
[Brief overview]

## 🪝 Hook
[Engaging opening]

## 📖 Main Content
[Research-backed lesson content with [Source N] citations]

## 🤔 Think About It
[2-3 thought questions]

## ⭐ Key Takeaways
[Summary points]

## 🎮 Try This!
[Optional activity or experiment]

## 📚 Sources
[List the sources used]";

pub const QUIZ_GENERATOR_PROMPT: &str = r#"You are Learning Monk Quiz Creator. Generate quizzes from lesson content.

Create questions that test understanding, not just memorization. Mix question types.

RESPOND ONLY WITH VALID JSON in this exact format:
{
  "title": "Quiz title",
  "questions": [
    {
      "question_text": "The question",
      "question_type": "multiple_choice",
      "points": 1,
      "hint": "A helpful hint without giving the answer",
      "explanation": "Why the correct answer is correct",
      "choices": [
        {"text": "Option A", "is_correct": false},
        {"text": "Option B", "is_correct": true},
        {"text": "Option C", "is_correct": false},
        {"text": "Option D", "is_correct": false}
      ]
    },
    {
      "question_text": "True or false: ...",
      "question_type": "true_false",
      "points": 1,
      "hint": "Think about...",
      "explanation": "This is true/false because...",
      "choices": [
        {"text": "True", "is_correct": true},
        {"text": "False", "is_correct": false}
      ]
    }
  ]
}"#;

pub const FEEDBACK_PROMPT: &str = "You are Learning Monk Journal Buddy, giving feedback on a kid's journal entry.

RULES:
- Be warm, encouraging, and specific
- Highlight what they did well (specific things they wrote)
- Ask one thoughtful follow-up question to deepen their thinking
- If there are misconceptions, gently guide them
- Keep feedback to 2-3 short paragraphs
- Use a conversational, friendly tone
- End with encouragement";

pub const HINT_PROMPT: &str = "You are Learning Monk Hint Helper. Give a progressive hint for a quiz question.

RULES:
- Never give the answer directly
- Hint level 1: Very vague nudge in the right direction
- Hint level 2: More specific guidance
- Hint level 3: Nearly gives it away without stating the answer
- Keep hints short (1-2 sentences)
- Be encouraging";

pub const CURRICULUM_OUTLINE_PROMPT: &str = r#"You are Learning Monk Curriculum Designer, an expert at creating structured multi-week learning plans for kids.

Given a concept/topic, grade level, number of weeks, and lessons per week, create a detailed week-by-week curriculum outline.

RESPOND ONLY WITH VALID JSON in this exact format:
{
  "title": "Curriculum title (e.g., 'Introduction to Banking & Money')",
  "description": "A 2-3 sentence overview of what students will learn",
  "subject_name": "A short category name for this curriculum (e.g., 'Financial Literacy', 'Civics', 'Business Basics')",
  "subject_icon": "A single emoji that represents this subject",
  "subject_color": "A hex color code for this subject (e.g., '#10b981')",
  "weeks": [
    {
      "week_number": 1,
      "title": "Week 1: [Theme for this week]",
      "description": "Brief description of this week's focus",
      "lessons": [
        {
          "title": "Lesson title",
          "description": "2-3 sentence description of what this lesson covers",
          "learning_objectives": ["Objective 1", "Objective 2", "Objective 3"],
          "estimated_minutes": 15
        }
      ]
    }
  ]
}

IMPORTANT GUIDELINES:
- Each week should have a clear theme that builds on previous weeks
- Lessons within a week should progress logically
- Learning objectives should be specific and measurable
- Use age-appropriate complexity for the given grade level
- The curriculum should tell a story: start with fundamentals, build to application
- Include a mix of conceptual learning and practical/hands-on activities
- For younger grades (1-4): simpler concepts, more activities, shorter lessons
- For middle grades (5-8): balance theory and practice, introduce real-world connections
- For older grades (9-12): deeper analysis, critical thinking, real-world case studies"#;

pub const MATH_PROBLEM_PROMPT: &str = r#"You are Learning Monk Math Problem Generator. Create age-appropriate math problems for kids.

Given a topic and grade level, generate a single math problem.

RESPOND ONLY WITH VALID JSON in this exact format:
{
  "problem_text": "The math problem in clear, simple language",
  "difficulty": "easy" or "medium" or "hard",
  "hint": "A helpful hint that guides without giving the answer"
}

GUIDELINES:
- Grade 1-2: Single-digit addition/subtraction, counting, simple patterns
- Grade 3-4: Multiplication, division, fractions intro, word problems
- Grade 5-6: Decimals, percentages, area/perimeter, multi-step problems
- Grade 7-8: Pre-algebra, ratios, proportions, basic geometry
- Grade 9-10: Algebra, linear equations, functions, advanced geometry
- Grade 11-12: Advanced algebra, trigonometry, pre-calculus concepts
- Always use age-appropriate language and real-world contexts kids enjoy
- Problems should be solvable by writing/drawing on a canvas
- Avoid problems that require a calculator or complex computation"#;

pub const CURRICULUM_LESSON_PROMPT: &str = "You are Learning Monk Content Creator, writing a lesson that is part of a structured multi-week curriculum.

This lesson is part of a larger curriculum, so it must:
- Connect to previous lessons in the curriculum (reference what was learned before)
- Set up concepts that will be explored in later lessons
- Stay focused on its specific learning objectives
- Feel like part of a cohesive learning journey, not a standalone piece

Create an engaging, well-structured lesson. Use markdown formatting.

Format your response as a complete lesson in Markdown. Structure:
# [Lesson Title]

## 🎯 What You'll Learn
[Brief overview of learning objectives]

## 🔗 Building On What We Know
[Brief 2-3 sentence connection to previous lessons: what have we learned so far in this curriculum that leads to today's topic? Skip this section for the very first lesson.]

## 🪝 Hook
[Engaging opening: question, story, scenario, or fun fact]

## 📖 Main Content
[The lesson content with subheadings, broken into digestible sections]

## 🤔 Think About It
[2-3 thought questions that connect to the lesson's objectives]

## ⭐ Key Takeaways
[Summary points: what should students remember?]

## 🎮 Try This!
[Hands-on activity, experiment, or real-world exercise related to the lesson]

## 👀 Coming Up Next
[1-2 sentence teaser of what's next in the curriculum. Skip for the final lesson.]";

pub const TOPIC_SUGGESTIONS_PROMPT: &str = r#"You are Learning Monk Curriculum Advisor, an expert at designing age-appropriate educational topics for kids.

Given a subject name and description, suggest relevant topics that would make good learning modules.

RESPOND ONLY WITH VALID JSON in this exact format:
{
  "topics": [
    {
      "name": "Topic name (concise, 3-6 words)",
      "description": "One sentence explaining what this topic covers",
      "grade_level_min": 1,
      "grade_level_max": 12
    }
  ]
}

GUIDELINES:
- Suggest 8-10 diverse topics that cover the breadth of the subject
- Order them from foundational to advanced
- Each topic should be distinct (no overlapping content)
- Grade ranges should reflect the topic's complexity
- Use clear, kid-friendly topic names
- Descriptions should be specific, not vague"#;

// ───────────────────────────────────────────────────────────────────────────
// Research system prompts
// ───────────────────────────────────────────────────────────────────────────

pub fn research_system_prompt(grade_level: u32, subject: &str) -> String {
    format!(
        "You are an educational research assistant. Research the following topic
for a grade {grade_level} student studying {subject}.

Provide your response in this exact format:

## Summary
[A comprehensive but grade-appropriate summary of the topic, 2-3 paragraphs]

## Key Facts
- [Fact 1]
- [Fact 2]
- [Fact 3]
- [Fact 4]
- [Fact 5]
- [Add more facts as relevant]

Focus on accuracy, educational value, and age-appropriateness for grade {grade_level}."
    )
}

pub fn media_discovery_system_prompt(grade_level: u32, subject: &str) -> String {
    format!(
        "Find educational video and interactive resources for a grade {grade_level}
student learning about the following topic in {subject}.

For each resource, provide it in this exact format (one per line):
[TYPE] Title | URL | Brief description

Where TYPE is one of: YOUTUBE, KHAN_ACADEMY, INTERACTIVE

Find 3-6 high-quality, age-appropriate resources. Prioritize:
1. Khan Academy lessons/videos
2. YouTube educational videos (from channels like CrashCourse, SciShow, TED-Ed, etc.)
3. Interactive simulations (PhET, etc.)"
    )
}

pub fn research_user_message(topic: &str) -> String {
    format!("Research this topic thoroughly: {topic}")
}

pub fn media_user_message(topic: &str) -> String {
    format!("Find educational resources for: {topic}")
}

// ───────────────────────────────────────────────────────────────────────────
// Generator prompts
// ───────────────────────────────────────────────────────────────────────────

pub fn lesson_prompt(
    topic: &str,
    grade_level: u32,
    difficulty: &str,
    additional_context: &str,
) -> Prompt {
    let mut header = format!(
        "Create a lesson about: {topic}\nGrade level: {grade_level}\nDifficulty: {difficulty}"
    );
    if !additional_context.is_empty() {
        header.push_str(&format!("\nAdditional context: {additional_context}"));
    }
    let user = blocks([
        header.as_str(),
        "Make it engaging, fun, and appropriate for this grade level.",
    ]);
    Prompt::new(LESSON_GENERATOR_PROMPT, user)
}

/// Media item offered to the research lesson writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub title: String,
    pub media_type: MediaType,
    pub url: String,
}

/// Everything the research lesson writer sees.
#[derive(Debug, Clone, Default)]
pub struct ResearchLessonInput {
    pub topic: String,
    pub grade_level: u32,
    pub difficulty: String,
    pub summary: String,
    pub key_facts: Vec<String>,
    pub citations: Vec<Citation>,
    pub media: Vec<MediaRef>,
    pub parent_notes: String,
}

pub fn research_lesson_prompt(input: &ResearchLessonInput) -> Prompt {
    let facts = input
        .key_facts
        .iter()
        .map(|fact| format!("- {fact}"))
        .collect::<Vec<_>>()
        .join("\n");

    let citations = input
        .citations
        .iter()
        .enumerate()
        .map(|(i, citation)| {
            let title = if citation.title.is_empty() {
                &citation.url
            } else {
                &citation.title
            };
            format!("[Source {}] {title} — {}", i + 1, citation.url)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let media_block = if input.media.is_empty() {
        String::new()
    } else {
        let lines = input
            .media
            .iter()
            .map(|m| format!("- {} ({}): {}", m.title, m.media_type, m.url))
            .collect::<Vec<_>>()
            .join("\n");
        format!("AVAILABLE MULTIMEDIA RESOURCES (reference where relevant):\n{lines}")
    };

    let notes_block = if input.parent_notes.is_empty() {
        String::new()
    } else {
        format!("PARENT/TEACHER NOTES:\n{}", input.parent_notes)
    };

    let header = format!(
        "Create a research-backed lesson about: {}\nGrade level: {}\nDifficulty: {}",
        input.topic, input.grade_level, input.difficulty
    );
    let summary = format!("RESEARCH SUMMARY:\n{}", input.summary);
    let facts = format!("KEY FACTS:\n{facts}");
    let citations = format!("CITATIONS:\n{citations}");
    let closing = format!(
        "Make it engaging, accurate, and appropriate for grade {}. Cite sources using [Source N] notation.",
        input.grade_level
    );

    let user = blocks([
        header.as_str(),
        summary.as_str(),
        facts.as_str(),
        citations.as_str(),
        media_block.as_str(),
        notes_block.as_str(),
        closing.as_str(),
    ]);
    Prompt::new(RESEARCH_LESSON_GENERATOR_PROMPT, user)
}

pub fn quiz_prompt(lesson_content: &str, num_questions: u32, grade_level: u32) -> Prompt {
    let user = format!(
        "Based on this lesson content, create a quiz with {num_questions} questions.
Grade level: {grade_level}

LESSON CONTENT:
{lesson_content}

Remember to respond with ONLY valid JSON."
    );
    Prompt::new(QUIZ_GENERATOR_PROMPT, user)
}

pub fn feedback_prompt(journal_content: &str, kid_name: &str, age: Option<u32>) -> Prompt {
    let age_line = age
        .map(|age| format!("The student is {age} years old.\n"))
        .unwrap_or_default();
    let user = format!(
        "{kid_name} wrote this journal entry:

---
{journal_content}
---

{age_line}Please give them warm, encouraging feedback."
    );
    Prompt::new(FEEDBACK_PROMPT, user)
}

/// Hint level grows with the attempt number and tops out at 3.
pub fn hint_level(attempt: u32) -> u32 {
    attempt.clamp(1, 3)
}

pub fn hint_prompt(question_text: &str, choices: &[String], attempt: u32) -> Prompt {
    let user = format!(
        "Question: {question_text}
Options: {}
Hint level: {} out of 3

Give a hint appropriate for this level.",
        choices.join(", "),
        hint_level(attempt)
    );
    Prompt::new(HINT_PROMPT, user)
}

pub fn math_problem_prompt(topic: &str, grade_level: u32) -> Prompt {
    let user = format!(
        "Generate a math problem about: {topic}
Grade level: {grade_level}

Remember to respond with ONLY valid JSON."
    );
    Prompt::new(MATH_PROBLEM_PROMPT, user)
}

pub fn curriculum_outline_prompt(
    concept: &str,
    grade_level: u32,
    duration_weeks: u32,
    lessons_per_week: u32,
    difficulty: &str,
) -> Prompt {
    let total = duration_weeks * lessons_per_week;
    let user = format!(
        "Design a {duration_weeks}-week curriculum about: {concept}
Grade level: {grade_level}
Difficulty: {difficulty}
Lessons per week: {lessons_per_week}
Total lessons: {total}

Create a structured, progressive learning plan that builds knowledge week by week.
Remember to respond with ONLY valid JSON."
    );
    Prompt::new(CURRICULUM_OUTLINE_PROMPT, user)
}

/// One lesson slot of a curriculum plus its place in the sequence.
#[derive(Debug, Clone, Default)]
pub struct CurriculumLessonInput {
    pub concept: String,
    pub grade_level: u32,
    pub difficulty: String,
    pub week_number: u32,
    /// One-based position within the week.
    pub lesson_number: u32,
    pub lesson_title: String,
    pub learning_objectives: Vec<String>,
    pub lesson_description: String,
    /// Newline-joined summaries of the lessons that come before.
    pub previous_lessons: String,
    pub upcoming_title: Option<String>,
}

pub fn curriculum_lesson_prompt(input: &CurriculumLessonInput) -> Prompt {
    let objectives = input
        .learning_objectives
        .iter()
        .map(|objective| format!("- {objective}"))
        .collect::<Vec<_>>()
        .join("\n");

    let header = format!(
        "Create a lesson for a multi-week curriculum about: {}

CURRICULUM POSITION:
- Week {}, Lesson {}
- Grade level: {}
- Difficulty: {}

LESSON DETAILS:
- Title: {}
- Description: {}
- Learning Objectives:
{objectives}",
        input.concept,
        input.week_number,
        input.lesson_number,
        input.grade_level,
        input.difficulty,
        input.lesson_title,
        input.lesson_description,
    );

    let previous = if input.previous_lessons.is_empty() {
        "This is the first lesson in the curriculum.".to_string()
    } else {
        format!("PREVIOUS LESSONS COVERED:\n{}", input.previous_lessons)
    };

    let next = match input.upcoming_title.as_deref().filter(|t| !t.is_empty()) {
        Some(title) => format!("NEXT LESSON: {title}"),
        None => "This is the final lesson in the curriculum.".to_string(),
    };

    let closing = format!(
        "Make it engaging, build on what came before, and set up what comes next. Appropriate for grade {}.",
        input.grade_level
    );

    let user = blocks([
        header.as_str(),
        previous.as_str(),
        next.as_str(),
        closing.as_str(),
    ]);
    Prompt::new(CURRICULUM_LESSON_PROMPT, user)
}

pub fn topic_suggestions_prompt(subject_name: &str, subject_description: &str) -> Prompt {
    let mut header = format!("Suggest topics for the subject: {subject_name}");
    if !subject_description.is_empty() {
        header.push_str(&format!("\nDescription: {subject_description}"));
    }
    let user = blocks([header.as_str(), "Remember to respond with ONLY valid JSON."]);
    Prompt::new(TOPIC_SUGGESTIONS_PROMPT, user)
}
