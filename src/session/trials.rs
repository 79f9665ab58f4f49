//! Per-category trial scoreboard

use crate::error::{Result, SessionError};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Successes out of attempts for one category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TrialCount {
    pub successes: u32,
    pub attempts: u32,
}

impl TrialCount {
    /// Success rate in percent; zero when nothing was attempted
    pub fn percent(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64 * 100.0
        }
    }

    fn record(&mut self, success: bool) {
        self.attempts += 1;
        if success {
            self.successes += 1;
        }
    }
}

impl fmt::Display for TrialCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({:.0}%)", self.successes, self.attempts, self.percent())
    }
}

/// Outcome of an increment batch: one value for every category, or one each
#[derive(Debug, Clone, PartialEq)]
pub enum Outcomes {
    All(bool),
    Each(Vec<bool>),
}

impl From<bool> for Outcomes {
    fn from(success: bool) -> Self {
        Self::All(success)
    }
}

impl From<Vec<bool>> for Outcomes {
    fn from(each: Vec<bool>) -> Self {
        Self::Each(each)
    }
}

impl From<&[bool]> for Outcomes {
    fn from(each: &[bool]) -> Self {
        Self::Each(each.to_vec())
    }
}

/// Category name to trial count
#[derive(Debug, Clone, Default)]
pub struct TrialCounters {
    counts: HashMap<String, TrialCount>,
}

impl TrialCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one attempt per category.
    ///
    /// The batch shape is checked before anything is mutated. Returns the
    /// category names in batch order.
    pub fn increment<S: AsRef<str>>(
        &mut self,
        categories: &[S],
        outcomes: impl Into<Outcomes>,
    ) -> Result<Vec<String>> {
        let outcomes = match outcomes.into() {
            Outcomes::All(success) => vec![success; categories.len()],
            Outcomes::Each(each) if each.len() == categories.len() => each,
            Outcomes::Each(each) => {
                return Err(SessionError::invalid(format!(
                    "{} outcomes for {} categories",
                    each.len(),
                    categories.len()
                )))
            }
        };

        let mut touched = Vec::with_capacity(categories.len());
        for (name, success) in categories.iter().zip(outcomes) {
            let name = name.as_ref();
            self.counts.entry(name.to_string()).or_default().record(success);
            touched.push(name.to_string());
        }
        Ok(touched)
    }

    pub fn get(&self, category: &str) -> Option<TrialCount> {
        self.counts.get(category).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Entries sorted by category name
    pub fn sorted(&self) -> Vec<(&str, TrialCount)> {
        let mut rows: Vec<_> = self.counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        rows
    }

    /// `name successes/attempts (percentage%)` per category
    pub fn scoreboard_lines(&self) -> Vec<String> {
        self.sorted()
            .into_iter()
            .map(|(name, count)| format!("{} {}", name, count))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_nothing_is_zero() {
        assert_eq!(TrialCount::default().percent(), 0.0);
    }

    #[test]
    fn percent_three_of_four() {
        let count = TrialCount {
            successes: 3,
            attempts: 4,
        };
        assert_eq!(count.percent(), 75.0);
        assert_eq!(count.to_string(), "3/4 (75%)");
    }

    #[test]
    fn scalar_outcome_applies_to_all() {
        let mut counters = TrialCounters::new();
        counters.increment(&["left", "right"], true).unwrap();
        counters.increment(&["left"], false).unwrap();
        assert_eq!(
            counters.get("left"),
            Some(TrialCount {
                successes: 1,
                attempts: 2
            })
        );
        assert_eq!(
            counters.get("right"),
            Some(TrialCount {
                successes: 1,
                attempts: 1
            })
        );
    }

    #[test]
    fn per_category_outcomes() {
        let mut counters = TrialCounters::new();
        let touched = counters
            .increment(&["a", "b", "c"], vec![true, false, true])
            .unwrap();
        assert_eq!(touched, vec!["a", "b", "c"]);
        assert_eq!(counters.get("b").unwrap().successes, 0);
        assert_eq!(counters.get("c").unwrap().successes, 1);
    }

    #[test]
    fn mismatched_batch_leaves_store_untouched() {
        let mut counters = TrialCounters::new();
        counters.increment(&["a"], true).unwrap();
        let err = counters.increment(&["a", "b"], vec![true]).unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
        assert_eq!(counters.len(), 1);
        assert_eq!(counters.get("a").unwrap().attempts, 1);
    }

    #[test]
    fn successes_never_exceed_attempts() {
        let mut counters = TrialCounters::new();
        let pattern = [true, false, true, true, false, false, true];
        for (i, outcome) in pattern.iter().enumerate() {
            let cats = if i % 2 == 0 { vec!["x", "y"] } else { vec!["y"] };
            counters.increment(&cats, *outcome).unwrap();
            for (_, count) in counters.sorted() {
                assert!(count.successes <= count.attempts);
            }
        }
    }

    #[test]
    fn scoreboard_is_sorted_by_name() {
        let mut counters = TrialCounters::new();
        counters.increment(&["zeta", "alpha"], vec![false, true]).unwrap();
        assert_eq!(
            counters.scoreboard_lines(),
            vec!["alpha 1/1 (100%)", "zeta 0/1 (0%)"]
        );
    }
}
