//! Scheduling strategies: deterministic reordering of tasks that are
//! mutually independent (within a single topological layer, or across the
//! whole submission when no dependency resolver is configured).
//!
//! A generalization of the teacher's priority-descending ready-task sort
//! into the small family of strategies the processor exposes; the richer
//! heuristics available to the sibling task-mesh scheduler (genetic,
//! hybrid, earliest-deadline-first, critical-ratio) are not part of this
//! surface.

use crate::task::TaskDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStrategy {
    Fifo,
    Lifo,
    Priority,
    ShortestJobFirst,
    Random,
}

impl Default for SchedulingStrategy {
    fn default() -> Self {
        SchedulingStrategy::Fifo
    }
}

/// Reorders `names` (already validated to respect dependency order) so that
/// tasks within a dependency-free group are visited in the strategy's
/// preferred order. `lookup` resolves a name back to its definition for
/// priority/duration comparisons.
pub fn apply_strategy<'a>(strategy: SchedulingStrategy, names: &mut [String], lookup: impl Fn(&str) -> &'a TaskDefinition) {
    match strategy {
        SchedulingStrategy::Fifo => {}
        SchedulingStrategy::Lifo => names.reverse(),
        SchedulingStrategy::Priority => {
            names.sort_by_key(|n| std::cmp::Reverse(lookup(n).priority));
        }
        SchedulingStrategy::ShortestJobFirst => {
            names.sort_by_key(|n| lookup(n).estimated_duration.unwrap_or_default());
        }
        SchedulingStrategy::Random => {
            for i in (1..names.len()).rev() {
                let j = fastrand::usize(0..=i);
                names.swap(i, j);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn def(name: &str, priority: i64, estimated: Option<Duration>) -> TaskDefinition {
        let mut d = TaskDefinition::new(name, Arc::new(|_c| Box::pin(async { Ok(Arc::new(()) as crate::task::TaskOutput) }))).with_priority(priority);
        if let Some(dur) = estimated {
            d = d.with_estimated_duration(dur);
        }
        d
    }

    #[test]
    fn fifo_preserves_order() {
        let defs = vec![def("a", 0, None), def("b", 0, None)];
        let mut names = vec!["a".to_string(), "b".to_string()];
        apply_strategy(SchedulingStrategy::Fifo, &mut names, |n| defs.iter().find(|d| d.name == n).unwrap());
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn lifo_reverses_order() {
        let defs = vec![def("a", 0, None), def("b", 0, None)];
        let mut names = vec!["a".to_string(), "b".to_string()];
        apply_strategy(SchedulingStrategy::Lifo, &mut names, |n| defs.iter().find(|d| d.name == n).unwrap());
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn priority_sorts_descending_with_stable_ties() {
        let defs = vec![def("low", 1, None), def("high", 10, None), def("mid", 5, None)];
        let mut names = vec!["low".to_string(), "high".to_string(), "mid".to_string()];
        apply_strategy(SchedulingStrategy::Priority, &mut names, |n| defs.iter().find(|d| d.name == n).unwrap());
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[test]
    fn shortest_job_first_sorts_ascending_by_duration() {
        let defs = vec![def("long", 0, Some(Duration::from_secs(10))), def("short", 0, Some(Duration::from_secs(1)))];
        let mut names = vec!["long".to_string(), "short".to_string()];
        apply_strategy(SchedulingStrategy::ShortestJobFirst, &mut names, |n| defs.iter().find(|d| d.name == n).unwrap());
        assert_eq!(names, vec!["short", "long"]);
    }

    #[test]
    fn random_preserves_the_same_set_of_names() {
        let defs: Vec<_> = (0..10).map(|i| def(&format!("t{i}"), 0, None)).collect();
        let mut names: Vec<String> = defs.iter().map(|d| d.name.clone()).collect();
        let original = names.clone();
        apply_strategy(SchedulingStrategy::Random, &mut names, |n| defs.iter().find(|d| d.name == n).unwrap());
        let mut sorted_a = names.clone();
        let mut sorted_b = original.clone();
        sorted_a.sort();
        sorted_b.sort();
        assert_eq!(sorted_a, sorted_b);
    }
}
