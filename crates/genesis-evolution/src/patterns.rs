//! Pattern library: success/failure buckets of filed insights, keyed by insight type.
//!
//! Each bucket is a ring buffer of `cap` insights in filing order; the oldest entry
//! is evicted when a bucket is full.

use std::collections::{BTreeSet, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{EvolutionInsight, PatternOutcome};

/// Aggregate statistics for one insight type across both buckets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternTrend {
    pub insight_type: String,
    pub count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub mean_strength: f64,
    pub median_strength: f64,
    pub latest: DateTime<Utc>,
}

pub struct PatternLibrary {
    cap: usize,
    success: HashMap<String, VecDeque<EvolutionInsight>>,
    failure: HashMap<String, VecDeque<EvolutionInsight>>,
    evicted: usize,
}

impl PatternLibrary {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            success: HashMap::new(),
            failure: HashMap::new(),
            evicted: 0,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn file(&mut self, insight: EvolutionInsight) {
        let buckets = match insight.outcome {
            PatternOutcome::Success => &mut self.success,
            PatternOutcome::Failure => &mut self.failure,
        };
        let bucket = buckets.entry(insight.insight_type.clone()).or_default();
        if bucket.len() >= self.cap {
            bucket.pop_front();
            self.evicted += 1;
        }
        bucket.push_back(insight);
    }

    pub fn bucket(&self, outcome: PatternOutcome, insight_type: &str) -> Vec<&EvolutionInsight> {
        let buckets = match outcome {
            PatternOutcome::Success => &self.success,
            PatternOutcome::Failure => &self.failure,
        };
        buckets
            .get(insight_type)
            .map(|b| b.iter().collect())
            .unwrap_or_default()
    }

    /// Every retained insight of a type, success bucket first, each in filing order.
    pub fn retained(&self, insight_type: &str) -> Vec<EvolutionInsight> {
        self.bucket(PatternOutcome::Success, insight_type)
            .into_iter()
            .chain(self.bucket(PatternOutcome::Failure, insight_type))
            .cloned()
            .collect()
    }

    pub fn insight_types(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self.success.keys().chain(self.failure.keys()).collect();
        set.into_iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.success.values().chain(self.failure.values()).map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insights dropped by the retention cap since construction.
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    pub fn trend(&self, insight_type: &str) -> Option<PatternTrend> {
        let success = self.bucket(PatternOutcome::Success, insight_type);
        let failure = self.bucket(PatternOutcome::Failure, insight_type);
        let all: Vec<&EvolutionInsight> = success.iter().chain(failure.iter()).copied().collect();
        if all.is_empty() {
            return None;
        }
        let mut strengths: Vec<f64> = all.iter().map(|i| i.pattern_strength).collect();
        strengths.sort_by(|a, b| a.total_cmp(b));
        let mean = strengths.iter().sum::<f64>() / strengths.len() as f64;
        let mid = strengths.len() / 2;
        let median = if strengths.len() % 2 == 0 {
            (strengths[mid - 1] + strengths[mid]) / 2.0
        } else {
            strengths[mid]
        };
        let latest = all.iter().map(|i| i.timestamp).max()?;
        Some(PatternTrend {
            insight_type: insight_type.to_string(),
            count: all.len(),
            success_count: success.len(),
            failure_count: failure.len(),
            mean_strength: mean,
            median_strength: median,
            latest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn insight(t: &str, outcome: PatternOutcome, strength: f64, secs: i64) -> EvolutionInsight {
        EvolutionInsight {
            insight_id: format!("{}-{}", t, secs),
            insight_type: t.into(),
            outcome,
            pattern_strength: strength,
            description: String::new(),
            supporting_data: vec![],
            implications: vec![],
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_routing_and_order() {
        let mut lib = PatternLibrary::new(10);
        lib.file(insight("slow_response", PatternOutcome::Failure, 0.4, 1));
        lib.file(insight("slow_response", PatternOutcome::Failure, 0.6, 2));
        lib.file(insight("high_user_satisfaction", PatternOutcome::Success, 0.9, 3));

        let failures = lib.bucket(PatternOutcome::Failure, "slow_response");
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].insight_id, "slow_response-1");
        assert!(lib.bucket(PatternOutcome::Success, "slow_response").is_empty());
        assert_eq!(lib.insight_types(), vec!["high_user_satisfaction", "slow_response"]);
        assert_eq!(lib.len(), 3);
    }

    #[test]
    fn test_trend_statistics() {
        let mut lib = PatternLibrary::new(10);
        for (i, s) in [0.2, 0.8, 0.5, 0.9].iter().enumerate() {
            lib.file(insight("error_cluster", PatternOutcome::Failure, *s, i as i64));
        }
        let t = lib.trend("error_cluster").unwrap();
        assert_eq!(t.count, 4);
        assert_eq!(t.failure_count, 4);
        assert!((t.mean_strength - 0.6).abs() < 1e-9);
        assert!((t.median_strength - 0.65).abs() < 1e-9);
        assert_eq!(t.latest, Utc.timestamp_opt(3, 0).unwrap());
        assert!(lib.trend("missing").is_none());
    }

    #[test]
    fn test_ring_buffer_cap() {
        let mut lib = PatternLibrary::new(3);
        for i in 0..5 {
            lib.file(insight("slow_response", PatternOutcome::Failure, 0.5, i));
        }
        let bucket = lib.bucket(PatternOutcome::Failure, "slow_response");
        assert_eq!(bucket.len(), 3);
        assert_eq!(bucket[0].insight_id, "slow_response-2");
        assert_eq!(lib.evicted(), 2);
    }
}
