//! Endpoint and question selection.
//!
//! Endpoints are drawn by weighted random choice; questions are drawn
//! round-robin without replacement from each endpoint's pool, with the pool
//! refilled once exhausted. All randomness flows through the injected
//! [`RandomSource`] so tests can script exact sequences.

use crate::RandomSource;
use crate::config::Endpoint;

/// A question pool that hands out each question once per cycle.
#[derive(Debug, Clone)]
pub struct QuestionPool {
    questions: Vec<String>,
    /// Indices not yet used this cycle.
    remaining: Vec<usize>,
}

impl QuestionPool {
    pub fn new(questions: &[String]) -> Self {
        Self {
            questions: questions.to_vec(),
            remaining: (0..questions.len()).collect(),
        }
    }

    /// Draw a random unused question, refilling the pool when exhausted.
    pub fn next(&mut self, rng: &mut dyn RandomSource) -> Option<&str> {
        if self.questions.is_empty() {
            return None;
        }
        if self.remaining.is_empty() {
            self.remaining = (0..self.questions.len()).collect();
        }
        let slot = rng.next_index(self.remaining.len());
        let index = self.remaining.swap_remove(slot);
        self.questions.get(index).map(|q| q.as_str())
    }

    /// Clear used-question tracking (daily reset).
    pub fn reset(&mut self) {
        self.remaining = (0..self.questions.len()).collect();
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// Pick an endpoint by relative weight (uniform when no weights are set).
pub fn pick_endpoint<'a>(
    endpoints: &'a [Endpoint],
    rng: &mut dyn RandomSource,
) -> Option<&'a Endpoint> {
    if endpoints.is_empty() {
        return None;
    }
    let total: f64 = endpoints.iter().map(|e| e.weight.unwrap_or(1.0)).sum();
    let mut roll = rng.next_f64() * total;
    for endpoint in endpoints {
        let weight = endpoint.weight.unwrap_or(1.0);
        if roll < weight {
            return Some(endpoint);
        }
        roll -= weight;
    }
    // Floating-point tail: fall back to the last endpoint.
    endpoints.last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRandom;
    use std::collections::HashSet;

    fn pool(names: &[&str]) -> QuestionPool {
        let questions: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        QuestionPool::new(&questions)
    }

    fn endpoint(name: &str, weight: Option<f64>) -> Endpoint {
        Endpoint {
            url: format!("https://{name}.example.net/main"),
            agent_id: format!("deployment_{name}"),
            name: name.to_string(),
            questions: vec!["q".into()],
            weight,
        }
    }

    #[test]
    fn covers_pool_exactly_once_before_repeating() {
        let mut rng = ScriptedRandom::new(&[2, 1, 0, 0, 0], &[]);
        let mut p = pool(&["a", "b", "c"]);

        let mut seen = HashSet::new();
        for _ in 0..3 {
            seen.insert(p.next(&mut rng).unwrap().to_string());
        }
        assert_eq!(seen.len(), 3, "first M draws must cover the pool");

        // The (M+1)-th draw comes from a refilled pool.
        assert!(seen.contains(p.next(&mut rng).unwrap()));
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let mut rng = ScriptedRandom::new(&[], &[]);
        let mut p = pool(&[]);
        assert!(p.next(&mut rng).is_none());
        assert!(p.is_empty());
    }

    #[test]
    fn reset_clears_used_tracking() {
        let mut rng = ScriptedRandom::new(&[0, 0, 0], &[]);
        let mut p = pool(&["a", "b"]);
        let first = p.next(&mut rng).unwrap().to_string();
        p.reset();
        // After a reset the same question may come straight back.
        assert_eq!(p.next(&mut rng).unwrap(), first);
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn weighted_pick_respects_weights() {
        let endpoints = vec![endpoint("alpha", Some(3.0)), endpoint("beta", Some(1.0))];

        let mut low = ScriptedRandom::new(&[], &[0.5]); // roll 2.0 of 4.0
        assert_eq!(pick_endpoint(&endpoints, &mut low).unwrap().name, "alpha");

        let mut high = ScriptedRandom::new(&[], &[0.9]); // roll 3.6 of 4.0
        assert_eq!(pick_endpoint(&endpoints, &mut high).unwrap().name, "beta");
    }

    #[test]
    fn unweighted_pick_is_uniform() {
        let endpoints = vec![endpoint("alpha", None), endpoint("beta", None)];

        let mut first = ScriptedRandom::new(&[], &[0.25]);
        assert_eq!(pick_endpoint(&endpoints, &mut first).unwrap().name, "alpha");

        let mut second = ScriptedRandom::new(&[], &[0.75]);
        assert_eq!(pick_endpoint(&endpoints, &mut second).unwrap().name, "beta");
    }

    #[test]
    fn no_endpoints_yields_none() {
        let mut rng = ScriptedRandom::new(&[], &[0.5]);
        assert!(pick_endpoint(&[], &mut rng).is_none());
    }
}
