use std::collections::BTreeMap;

use crate::api::AnswersRequest;
use crate::error::NutriError;

use super::question::Question;

/// Answers collected for the questions of a `waiting_user` job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerSheet {
    answers: BTreeMap<String, String>,
}

impl AnswerSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the answer for `question_id`.
    pub fn set(&mut self, question_id: impl Into<String>, answer: impl Into<String>) {
        self.answers.insert(question_id.into(), answer.into());
    }

    /// Pick option `index` of a multiple-choice question.
    pub fn choose(&mut self, question: &Question, index: usize) -> Result<(), NutriError> {
        match question {
            Question::Choice { id, options, .. } => {
                let option = options.get(index).ok_or_else(|| {
                    NutriError::InvalidAnswer(format!(
                        "option {} out of range for question {id} ({} options)",
                        index + 1,
                        options.len()
                    ))
                })?;
                self.set(id.clone(), option.clone());
                Ok(())
            }
            Question::FreeText { id, .. } => Err(NutriError::InvalidAnswer(format!(
                "question {id} takes free text, not a choice"
            ))),
        }
    }

    pub fn get(&self, question_id: &str) -> Option<&str> {
        self.answers.get(question_id).map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.answers.clear();
    }

    /// True iff every question has a non-blank answer. Gates submission.
    pub fn is_complete(&self, questions: &[Question]) -> bool {
        questions
            .iter()
            .all(|q| self.get(q.id()).is_some_and(|a| !a.trim().is_empty()))
    }

    /// Ids of the questions still lacking an answer, in question order.
    pub fn missing<'q>(&self, questions: &'q [Question]) -> Vec<&'q str> {
        questions
            .iter()
            .map(Question::id)
            .filter(|id| self.get(id).is_none_or(|a| a.trim().is_empty()))
            .collect()
    }

    /// Package the answers for `POST /meals/{id}/answers`, keeping only the
    /// ids that were actually asked.
    pub fn to_request(&self, questions: &[Question]) -> AnswersRequest {
        let answers = questions
            .iter()
            .filter_map(|q| {
                self.answers
                    .get(q.id())
                    .map(|a| (q.id().to_string(), a.trim().to_string()))
            })
            .collect();
        AnswersRequest { answers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(id: &str) -> Question {
        Question::Choice {
            id: id.into(),
            prompt: format!("{id}?"),
            options: vec!["Sim".into(), "Não".into()],
        }
    }

    fn free(id: &str) -> Question {
        Question::FreeText {
            id: id.into(),
            prompt: format!("{id}?"),
        }
    }

    #[test]
    fn gate_opens_only_when_every_question_answered() {
        let questions = vec![choice("q1"), choice("q2")];
        let mut sheet = AnswerSheet::new();

        sheet.set("q1", "yes");
        assert!(!sheet.is_complete(&questions));
        assert_eq!(sheet.missing(&questions), vec!["q2"]);

        sheet.set("q2", "no");
        assert!(sheet.is_complete(&questions));
        assert!(sheet.missing(&questions).is_empty());
    }

    #[test]
    fn blank_answer_does_not_count() {
        let questions = vec![free("q1")];
        let mut sheet = AnswerSheet::new();
        sheet.set("q1", "   ");
        assert!(!sheet.is_complete(&questions));
        sheet.set("q1", "molho de tomate");
        assert!(sheet.is_complete(&questions));
    }

    #[test]
    fn no_questions_is_trivially_complete() {
        assert!(AnswerSheet::new().is_complete(&[]));
    }

    #[test]
    fn choose_records_option_text() {
        let q = choice("q1");
        let mut sheet = AnswerSheet::new();
        sheet.choose(&q, 1).unwrap();
        assert_eq!(sheet.get("q1"), Some("Não"));
    }

    #[test]
    fn choose_rejects_out_of_range_and_free_text() {
        let mut sheet = AnswerSheet::new();
        assert!(matches!(
            sheet.choose(&choice("q1"), 5),
            Err(NutriError::InvalidAnswer(_))
        ));
        assert!(matches!(
            sheet.choose(&free("q2"), 0),
            Err(NutriError::InvalidAnswer(_))
        ));
        assert_eq!(sheet, AnswerSheet::new());
    }

    #[test]
    fn request_drops_answers_for_unasked_questions() {
        let questions = vec![choice("q1")];
        let mut sheet = AnswerSheet::new();
        sheet.set("q1", "Sim");
        sheet.set("stale", "x");
        let req = sheet.to_request(&questions);
        assert_eq!(req.answers.len(), 1);
        assert_eq!(req.answers["q1"], "Sim");
    }
}
