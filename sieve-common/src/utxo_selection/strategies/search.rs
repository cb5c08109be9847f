//! Bounded depth-first subset search over effective values
//!
//! Shared by branch-and-bound and privacy. The search works on effective
//! values (value minus the marginal input fee), which turns the funding
//! post-condition into a plain subset-sum: a subset `S` is feasible iff
//! `sum(eff(S)) >= target + fixed_fee`, and its change is exactly the excess.
//!
//! The traversal is iterative: `selection[i]` records whether candidate `i`
//! is included on the current path. Candidates must be sorted by descending
//! effective value and all effective values must be positive, which makes
//! "add more" monotone and lets feasible nodes end their branch.

/// How many minimal-change subsets to collect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Keep one best subset; stop early on an exact match
    Best,
    /// Keep up to `max` subsets sharing the best excess
    Ties { max: usize },
}

/// Result of a search run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Indexes of the chosen candidates, one vector per solution
    pub solutions: Vec<Vec<usize>>,
    /// Excess of the solutions over the effective target
    pub best_excess: Option<u64>,
    /// Nodes visited
    pub explored: usize,
    /// Whether the search space was exhausted (or an exact match ended it)
    pub complete: bool,
}

/// Search for subsets of `effective` whose sum reaches `target` with least excess
///
/// # Arguments
/// * `effective` - Positive effective values, sorted descending
/// * `target` - Effective target to reach
/// * `max_nodes` - Node budget
/// * `mode` - Whether to collect ties
pub fn minimal_excess(
    effective: &[i64],
    target: i64,
    max_nodes: usize,
    mode: SearchMode,
) -> SearchOutcome {
    let mut remaining: i64 = effective.iter().fold(0i64, |acc, v| acc.saturating_add(*v));
    let mut current: i64 = 0;
    let mut selection: Vec<bool> = Vec::with_capacity(effective.len());

    let mut best_excess: Option<i64> = None;
    let mut solutions: Vec<Vec<usize>> = Vec::new();
    let mut explored = 0;
    let mut complete = false;

    while explored < max_nodes {
        explored += 1;

        let backtrack = if current.saturating_add(remaining) < target {
            // Even including everything left cannot reach the target
            true
        } else if current >= target {
            let excess = current - target;
            let beyond_incumbent = match (best_excess, mode) {
                (Some(best), SearchMode::Best) => excess >= best,
                (Some(best), SearchMode::Ties { .. }) => excess > best,
                (None, _) => false,
            };
            if !beyond_incumbent {
                record(&selection, excess, &mut best_excess, &mut solutions, mode);
            }
            // Every candidate is positive, so going deeper only adds change
            true
        } else {
            false
        };

        if mode == SearchMode::Best && best_excess == Some(0) {
            complete = true;
            break;
        }

        if backtrack {
            // Drop trailing exclusions, then turn the last inclusion into an exclusion
            while let Some(false) = selection.last() {
                selection.pop();
                remaining = remaining.saturating_add(effective[selection.len()]);
            }
            match selection.last_mut() {
                None => {
                    complete = true;
                    break;
                }
                Some(last) => {
                    *last = false;
                    current = current.saturating_sub(effective[selection.len() - 1]);
                }
            }
        } else {
            let index = selection.len();
            remaining = remaining.saturating_sub(effective[index]);

            // Excluding a candidate and then including an identical one
            // explores the same sums again
            let duplicate = mode == SearchMode::Best
                && index > 0
                && selection.last() == Some(&false)
                && effective[index] == effective[index - 1];

            if duplicate {
                selection.push(false);
            } else {
                selection.push(true);
                current = current.saturating_add(effective[index]);
            }
        }
    }

    SearchOutcome {
        solutions,
        best_excess: best_excess.map(|e| e as u64),
        explored,
        complete,
    }
}

fn record(
    selection: &[bool],
    excess: i64,
    best_excess: &mut Option<i64>,
    solutions: &mut Vec<Vec<usize>>,
    mode: SearchMode,
) {
    let chosen: Vec<usize> = selection
        .iter()
        .enumerate()
        .filter(|(_, included)| **included)
        .map(|(i, _)| i)
        .collect();

    match *best_excess {
        Some(best) if excess == best => {
            if let SearchMode::Ties { max } = mode {
                if solutions.len() < max {
                    solutions.push(chosen);
                }
            }
        }
        Some(best) if excess > best => {}
        _ => {
            *best_excess = Some(excess);
            solutions.clear();
            solutions.push(chosen);
        }
    }
}
