use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static QUIZ_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"QUESTION: (.*?)\s*ANSWER: (.*?)\s*DIFFICULTY: (.*?)(?:\s|$)")
        .expect("quiz pattern is a valid regex")
});

/// A check-your-understanding question the model embedded in its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QuizQuestion {
    pub(crate) question: String,
    pub(crate) answer: String,
    pub(crate) difficulty: String,
}

/// Finds a tagged question in `text`.
///
/// Returns the question and the text with the tagged block replaced by the bare question.
pub(crate) fn extract_quiz(text: &str) -> Option<(QuizQuestion, String)> {
    let captures = QUIZ_PATTERN.captures(text)?;
    let tagged = captures.get(0)?;
    let quiz = QuizQuestion {
        question: captures[1].to_string(),
        answer: captures[2].to_string(),
        difficulty: captures[3].to_lowercase(),
    };
    let rest = &text[tagged.end()..];
    let separator = if !rest.is_empty() && tagged.as_str().ends_with(char::is_whitespace) {
        " "
    } else {
        ""
    };
    let visible = format!(
        "{}{}{}{}",
        &text[..tagged.start()],
        quiz.question,
        separator,
        rest
    );
    Some((quiz, visible))
}

/// Questions posed during one connection, keyed by upstream session id.
#[derive(Debug, Default)]
pub(crate) struct LearningContext {
    session_id: Option<String>,
    questions: HashMap<String, QuizQuestion>,
}

impl LearningContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn question(&self, session_id: &str) -> Option<&QuizQuestion> {
        self.questions.get(session_id)
    }

    pub(crate) fn set_session_id(&mut self, session_id: &str) {
        self.session_id = Some(session_id.to_string());
    }

    /// Keeps the latest question for the given session, or for the connection's own session.
    pub(crate) fn record(&mut self, session_id: Option<&str>, quiz: QuizQuestion) {
        let Some(session_id) = session_id.or(self.session_id.as_deref()).map(str::to_string) else {
            tracing::debug!("no session id for question '{}', not recorded", quiz.question);
            return;
        };
        tracing::info!(
            "question posed in session {} ({}): {}",
            session_id,
            quiz.difficulty,
            quiz.question
        );
        tracing::debug!("expected answer: {}", quiz.answer);
        self.questions.insert(session_id, quiz);
    }
}
