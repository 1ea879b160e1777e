//! In-memory conversation history for one terminal session.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Ordered turns. A user turn stays tentative until its answer is committed
/// and is removed again if the answer never arrives.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
    pending: Option<usize>,
}

impl Transcript {
    /// Appends a tentative user turn, discarding any earlier one still pending.
    pub fn begin(&mut self, question: &str) {
        self.rollback();
        self.turns.push(Turn {
            role: Role::User,
            text: question.to_string(),
        });
        self.pending = Some(self.turns.len() - 1);
    }

    /// Confirms the pending user turn and records the answer after it.
    pub fn commit(&mut self, answer: &str) {
        if self.pending.take().is_none() {
            return;
        }
        self.turns.push(Turn {
            role: Role::Assistant,
            text: answer.to_string(),
        });
    }

    /// Drops the pending user turn, if any.
    pub fn rollback(&mut self) {
        if let Some(idx) = self.pending.take() {
            self.turns.truncate(idx);
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of answered exchanges.
    pub fn exchanges(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .count()
    }
}
