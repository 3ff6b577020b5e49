use serde::{Deserialize, Serialize};

/// Wire shape of a clarification question: `{id, question, options?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawQuestion {
    id: String,
    question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options: Option<Vec<String>>,
}

/// A clarification question asked while a job is `waiting_user`.
///
/// The backend sends a single shape with optional `options`; here the two
/// kinds are explicit so callers dispatch on the variant. An empty option
/// list is treated as free text, since it could never be answered otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawQuestion", into = "RawQuestion")]
pub enum Question {
    Choice {
        id: String,
        prompt: String,
        options: Vec<String>,
    },
    FreeText {
        id: String,
        prompt: String,
    },
}

impl Question {
    pub fn id(&self) -> &str {
        match self {
            Question::Choice { id, .. } | Question::FreeText { id, .. } => id,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            Question::Choice { prompt, .. } | Question::FreeText { prompt, .. } => prompt,
        }
    }

    /// Fixed choices; empty for free-text questions.
    pub fn options(&self) -> &[String] {
        match self {
            Question::Choice { options, .. } => options,
            Question::FreeText { .. } => &[],
        }
    }
}

impl From<RawQuestion> for Question {
    fn from(raw: RawQuestion) -> Self {
        match raw.options {
            Some(options) if !options.is_empty() => Question::Choice {
                id: raw.id,
                prompt: raw.question,
                options,
            },
            _ => Question::FreeText {
                id: raw.id,
                prompt: raw.question,
            },
        }
    }
}

impl From<Question> for RawQuestion {
    fn from(q: Question) -> Self {
        match q {
            Question::Choice {
                id,
                prompt,
                options,
            } => RawQuestion {
                id,
                question: prompt,
                options: Some(options),
            },
            Question::FreeText { id, prompt } => RawQuestion {
                id,
                question: prompt,
                options: None,
            },
        }
    }
}
