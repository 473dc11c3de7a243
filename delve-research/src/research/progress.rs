//! Step accounting for a single research run

use super::types::{ProgressEvent, ResearchStage};

/// Counts completed steps against the total known once planning is done.
///
/// Total is `1 + areas * depth + areas + 1`. Skipped search iterations still
/// count, so fractions only grow and the final step lands on exactly 1.0.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    completed: usize,
    total: usize,
}

impl ProgressTracker {
    pub fn new(area_count: usize, depth: usize) -> Self {
        Self {
            completed: 0,
            total: 1 + area_count * depth + area_count + 1,
        }
    }

    pub fn total_steps(&self) -> usize {
        self.total
    }

    pub fn completed_steps(&self) -> usize {
        self.completed
    }

    pub fn fraction(&self) -> f64 {
        if self.completed >= self.total {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    /// Mark one more step as done and describe it
    pub fn advance(&mut self, stage: ResearchStage, message: impl Into<String>) -> ProgressEvent {
        self.completed = (self.completed + 1).min(self.total);
        self.snapshot(stage, message)
    }

    /// Describe the current position without advancing
    pub fn snapshot(&self, stage: ResearchStage, message: impl Into<String>) -> ProgressEvent {
        ProgressEvent {
            stage,
            message: message.into(),
            fraction: self.fraction(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_follow_step_formula() {
        assert_eq!(ProgressTracker::new(2, 1).total_steps(), 6);
        assert_eq!(ProgressTracker::new(3, 3).total_steps(), 14);
    }

    #[test]
    fn fractions_grow_and_end_at_one() {
        let mut tracker = ProgressTracker::new(2, 1);
        let fractions: Vec<f64> = (0..6)
            .map(|_| tracker.advance(ResearchStage::AreaSearch, "step").fraction)
            .collect();

        assert!(fractions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(fractions[0], 1.0 / 6.0);
        assert_eq!(fractions[5], 1.0);

        // Extra advances never overshoot.
        assert_eq!(tracker.advance(ResearchStage::Complete, "again").fraction, 1.0);
    }

    #[test]
    fn snapshot_keeps_position() {
        let mut tracker = ProgressTracker::new(1, 2);
        tracker.advance(ResearchStage::Planning, "plan");
        let snap = tracker.snapshot(ResearchStage::Error, "failed");
        assert_eq!(snap.fraction, 1.0 / 5.0);
        assert_eq!(tracker.completed_steps(), 1);
    }
}
