//! Rate limits for actions the agent starts on its own.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::intent::Intent;

const WINDOW: Duration = Duration::from_secs(3600);
const MAX_ACTIONS_PER_HOUR: usize = 20;
const MAX_DELETIONS_PER_HOUR: usize = 2;
const MAX_RESETS_PER_HOUR: usize = 1;

/// Category of an autonomous action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Normal,
    Delete,
    Reset,
}

impl ActionKind {
    /// Classify an intent by what its serialized form mentions.
    pub fn classify(intent: &Intent) -> Self {
        let text = serde_json::to_string(intent).unwrap_or_default().to_lowercase();
        if text.contains("reset") || text.contains("git_undo") {
            ActionKind::Reset
        } else if text.contains("delete") {
            ActionKind::Delete
        } else {
            ActionKind::Normal
        }
    }
}

/// Sliding one-hour budget per action kind.
#[derive(Debug, Default)]
pub struct Governor {
    actions: VecDeque<Instant>,
    deletions: VecDeque<Instant>,
    resets: VecDeque<Instant>,
}

fn expire(log: &mut VecDeque<Instant>, now: Instant) {
    while log.front().is_some_and(|t| now.duration_since(*t) >= WINDOW) {
        log.pop_front();
    }
}

impl Governor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the action if it fits the budget. Returns `false` when blocked.
    pub fn check(&mut self, kind: ActionKind) -> bool {
        self.check_at(kind, Instant::now())
    }

    fn check_at(&mut self, kind: ActionKind, now: Instant) -> bool {
        for log in [&mut self.actions, &mut self.deletions, &mut self.resets] {
            expire(log, now);
        }

        let (log, limit) = match kind {
            ActionKind::Delete => (&mut self.deletions, MAX_DELETIONS_PER_HOUR),
            ActionKind::Reset => (&mut self.resets, MAX_RESETS_PER_HOUR),
            ActionKind::Normal => (&mut self.actions, MAX_ACTIONS_PER_HOUR),
        };
        if log.len() >= limit {
            return false;
        }
        if kind != ActionKind::Normal && self.actions.len() >= MAX_ACTIONS_PER_HOUR {
            return false;
        }

        match kind {
            ActionKind::Delete => self.deletions.push_back(now),
            ActionKind::Reset => self.resets.push_back(now),
            ActionKind::Normal => {}
        }
        self.actions.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentKind;

    #[test]
    fn test_classify() {
        assert_eq!(ActionKind::classify(&Intent::of(IntentKind::DeleteFile)), ActionKind::Delete);
        assert_eq!(ActionKind::classify(&Intent::of(IntentKind::GitUndo)), ActionKind::Reset);
        assert_eq!(ActionKind::classify(&Intent::of(IntentKind::ExecutePipeline).with_name("tests")), ActionKind::Normal);
    }

    #[test]
    fn test_deletion_budget() {
        let mut governor = Governor::new();
        let start = Instant::now();
        assert!(governor.check_at(ActionKind::Delete, start));
        assert!(governor.check_at(ActionKind::Delete, start));
        assert!(!governor.check_at(ActionKind::Delete, start));
        // Normal actions still have room
        assert!(governor.check_at(ActionKind::Normal, start));
        // The window slides
        assert!(governor.check_at(ActionKind::Delete, start + WINDOW));
    }

    #[test]
    fn test_action_budget_covers_all_kinds() {
        let mut governor = Governor::new();
        let start = Instant::now();
        for _ in 0..MAX_ACTIONS_PER_HOUR {
            assert!(governor.check_at(ActionKind::Normal, start));
        }
        assert!(!governor.check_at(ActionKind::Normal, start));
        assert!(!governor.check_at(ActionKind::Reset, start));
    }
}
