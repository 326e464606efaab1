//! Single-slot deadline driven by host-supplied time.

/// A cancelable deferred task. Scheduling again replaces whatever was
/// pending.
#[derive(Debug, Clone, PartialEq)]
pub struct Deadline<T> {
    pending: Option<(u64, T)>,
}

impl<T> Default for Deadline<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> Deadline<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm for `now_ms + delay_ms`. Returns true when this superseded a
    /// pending task.
    pub fn schedule(&mut self, now_ms: u64, delay_ms: u64, task: T) -> bool {
        self.pending
            .replace((now_ms.saturating_add(delay_ms), task))
            .is_some()
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(_, task)| task)
    }

    /// Take the task if its deadline has passed.
    pub fn take_due(&mut self, now_ms: u64) -> Option<T> {
        match self.pending {
            Some((due, _)) if due <= now_ms => self.cancel(),
            _ => None,
        }
    }

    pub fn due_at(&self) -> Option<u64> {
        self.pending.as_ref().map(|(due, _)| *due)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_when_due() {
        let mut timer = Deadline::new();
        assert!(!timer.schedule(0, 100, "a"));
        assert_eq!(timer.take_due(99), None);
        assert_eq!(timer.take_due(100), Some("a"));
        assert_eq!(timer.take_due(200), None);
    }

    #[test]
    fn reschedule_supersedes() {
        let mut timer = Deadline::new();
        timer.schedule(0, 100, 1);
        assert!(timer.schedule(50, 100, 2));
        assert_eq!(timer.due_at(), Some(150));
        assert_eq!(timer.take_due(120), None);
        assert_eq!(timer.take_due(150), Some(2));
    }

    #[test]
    fn cancel_clears() {
        let mut timer = Deadline::new();
        timer.schedule(0, 10, ());
        assert_eq!(timer.cancel(), Some(()));
        assert!(!timer.is_pending());
        assert_eq!(timer.take_due(u64::MAX), None);
    }
}
