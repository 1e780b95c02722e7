//! Candidate model queue.

use std::collections::{HashSet, VecDeque};

/// Models still to try, in order.
///
/// Entries may be appended while the queue is being consumed. A model that was
/// already queued or attempted is never queued again.
#[derive(Debug, Default, Clone)]
pub struct CandidateQueue {
    pending: VecDeque<String>,
    seen: HashSet<String>,
    attempted: Vec<String>,
}

impl CandidateQueue {
    /// Creates a queue from an ordered list, dropping duplicates.
    pub fn new<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut queue = Self::default();
        for model in models {
            queue.push(model);
        }
        queue
    }

    /// Appends a model. Returns false if it was already queued or attempted.
    pub fn push(&mut self, model: impl Into<String>) -> bool {
        let model = model.into();
        if !self.seen.insert(model.clone()) {
            return false;
        }
        self.pending.push_back(model);
        true
    }

    /// Takes the next model and records it as attempted.
    pub fn next_model(&mut self) -> Option<String> {
        let model = self.pending.pop_front()?;
        self.attempted.push(model.clone());
        Some(model)
    }

    /// Returns true when nothing is left to try.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Returns true if the model was queued or attempted at some point.
    pub fn contains(&self, model: &str) -> bool {
        self.seen.contains(model)
    }

    /// Models taken so far, in attempt order.
    pub fn attempted(&self) -> &[String] {
        &self.attempted
    }

    /// Models not yet taken, in order.
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }
}
