//! Insight extraction: turns raw interaction records into [`EvolutionInsight`]s.
//!
//! Detection is rule-driven. Each [`ExtractionRule`] names a payload field and a
//! predicate; interactions carrying the field are *applicable*, those satisfying
//! the predicate are *matching*, and `pattern_strength = matching / applicable`.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{EvolutionError, Result};
use crate::ids;
use crate::profile::lookup;
use crate::types::{EvolutionInsight, Interaction, PatternOutcome};

/// Matching interactions attached to an insight as evidence.
const MAX_SUPPORTING_DATA: usize = 5;

/// Predicate over one payload field (dotted path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Matcher {
    Below { field: String, threshold: f64 },
    Above { field: String, threshold: f64 },
    Equals { field: String, value: Value },
    Matches { field: String, pattern: String },
}

impl Matcher {
    fn field(&self) -> &str {
        match self {
            Self::Below { field, .. }
            | Self::Above { field, .. }
            | Self::Equals { field, .. }
            | Self::Matches { field, .. } => field,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub insight_type: String,
    pub outcome: PatternOutcome,
    /// Only consider interactions from this source.
    #[serde(default)]
    pub source: Option<String>,
    pub matcher: Matcher,
    pub description: String,
    #[serde(default)]
    pub implications: Vec<String>,
}

struct CompiledRule {
    rule: ExtractionRule,
    regex: Option<Regex>,
}

/// Verdict of one rule on one interaction.
enum Verdict {
    NotApplicable,
    Miss,
    Hit,
}

impl CompiledRule {
    fn judge(&self, interaction: &Interaction) -> Verdict {
        if let Some(ref source) = self.rule.source {
            if source != &interaction.source {
                return Verdict::NotApplicable;
            }
        }
        let Some(value) = lookup(&interaction.payload, self.rule.matcher.field()) else {
            return Verdict::NotApplicable;
        };
        if value.is_null() {
            return Verdict::NotApplicable;
        }
        let hit = match &self.rule.matcher {
            Matcher::Below { threshold, .. } => match value.as_f64() {
                Some(v) => v < *threshold,
                None => return Verdict::NotApplicable,
            },
            Matcher::Above { threshold, .. } => match value.as_f64() {
                Some(v) => v > *threshold,
                None => return Verdict::NotApplicable,
            },
            Matcher::Equals { value: expected, .. } => value == expected,
            Matcher::Matches { .. } => match (value.as_str(), &self.regex) {
                (Some(text), Some(re)) => re.is_match(text),
                _ => return Verdict::NotApplicable,
            },
        };
        if hit {
            Verdict::Hit
        } else {
            Verdict::Miss
        }
    }
}

pub struct InsightExtractor {
    rules: Vec<CompiledRule>,
    min_strength: f64,
    min_sample_size: usize,
}

impl InsightExtractor {
    /// Fails when a `matches` rule carries an invalid regex.
    pub fn new(rules: Vec<ExtractionRule>, min_strength: f64, min_sample_size: usize) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let regex = match &rule.matcher {
                Matcher::Matches { pattern, .. } => Some(Regex::new(pattern).map_err(|e| {
                    EvolutionError::AnalysisFailure(format!(
                        "rule '{}' has invalid pattern: {}",
                        rule.insight_type, e
                    ))
                })?),
                _ => None,
            };
            compiled.push(CompiledRule { rule, regex });
        }
        Ok(Self {
            rules: compiled,
            min_strength,
            min_sample_size: min_sample_size.max(1),
        })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Run every rule over `interactions`. Output order follows rule order; all
    /// fields except `insight_id` depend only on the input.
    pub fn extract(&self, interactions: &[Interaction]) -> Vec<EvolutionInsight> {
        self.rules
            .iter()
            .filter_map(|rule| self.evaluate(rule, interactions))
            .collect()
    }

    fn evaluate(&self, compiled: &CompiledRule, interactions: &[Interaction]) -> Option<EvolutionInsight> {
        let mut applicable = 0usize;
        let mut hits: Vec<&Interaction> = Vec::new();
        for interaction in interactions {
            match compiled.judge(interaction) {
                Verdict::NotApplicable => {}
                Verdict::Miss => applicable += 1,
                Verdict::Hit => {
                    applicable += 1;
                    hits.push(interaction);
                }
            }
        }
        if applicable < self.min_sample_size || hits.is_empty() {
            return None;
        }
        let strength = (hits.len() as f64 / applicable as f64).clamp(0.0, 1.0);
        if strength < self.min_strength {
            tracing::debug!(
                insight_type = %compiled.rule.insight_type,
                strength,
                "Pattern below minimum strength, not emitted"
            );
            return None;
        }

        let rule = &compiled.rule;
        let field = rule.matcher.field();
        let timestamp: DateTime<Utc> = hits
            .iter()
            .map(|i| i.timestamp)
            .max()
            .unwrap_or_else(Utc::now);
        let supporting_data = hits
            .iter()
            .rev()
            .take(MAX_SUPPORTING_DATA)
            .map(|i| {
                json!({
                    "source": i.source,
                    "timestamp": i.timestamp,
                    "field": field,
                    "value": lookup(&i.payload, field).cloned().unwrap_or(Value::Null),
                })
            })
            .collect();

        Some(EvolutionInsight {
            insight_id: ids::insight_id(&rule.insight_type),
            insight_type: rule.insight_type.clone(),
            outcome: rule.outcome,
            pattern_strength: strength,
            description: format!("{} ({}/{} interactions)", rule.description, hits.len(), applicable),
            supporting_data,
            implications: rule.implications.clone(),
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn satisfaction_rule() -> ExtractionRule {
        ExtractionRule {
            insight_type: "low_user_satisfaction".into(),
            outcome: PatternOutcome::Failure,
            source: None,
            matcher: Matcher::Below {
                field: "satisfaction".into(),
                threshold: 0.5,
            },
            description: "Users report low satisfaction".into(),
            implications: vec!["ask clarifying questions earlier".into()],
        }
    }

    fn interactions(scores: &[f64]) -> Vec<Interaction> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| {
                Interaction::at(
                    "chat",
                    Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap(),
                    json!({ "satisfaction": s }),
                )
            })
            .collect()
    }

    #[test]
    fn test_strength_is_match_proportion() {
        let ex = InsightExtractor::new(vec![satisfaction_rule()], 0.3, 3).unwrap();
        let out = ex.extract(&interactions(&[0.1, 0.2, 0.9, 0.3]));
        assert_eq!(out.len(), 1);
        let insight = &out[0];
        assert!((insight.pattern_strength - 0.75).abs() < 1e-9);
        assert_eq!(insight.outcome, PatternOutcome::Failure);
        assert_eq!(insight.supporting_data.len(), 3);
        assert_eq!(insight.timestamp, Utc.timestamp_opt(1_700_000_003, 0).unwrap());
        assert!(insight.description.contains("3/4"));
    }

    #[test]
    fn test_below_min_strength_not_emitted() {
        let ex = InsightExtractor::new(vec![satisfaction_rule()], 0.5, 3).unwrap();
        assert!(ex.extract(&interactions(&[0.1, 0.9, 0.9, 0.9])).is_empty());
    }

    #[test]
    fn test_min_sample_size() {
        let ex = InsightExtractor::new(vec![satisfaction_rule()], 0.1, 3).unwrap();
        assert!(ex.extract(&interactions(&[0.1, 0.1])).is_empty());
    }

    #[test]
    fn test_deterministic_except_id() {
        let ex = InsightExtractor::new(vec![satisfaction_rule()], 0.1, 1).unwrap();
        let input = interactions(&[0.1, 0.7, 0.2]);
        let mut a = ex.extract(&input);
        let mut b = ex.extract(&input);
        assert_ne!(a[0].insight_id, b[0].insight_id);
        a[0].insight_id.clear();
        b[0].insight_id.clear();
        assert_eq!(a, b);
    }

    #[test]
    fn test_source_filter_and_regex() {
        let rule = ExtractionRule {
            insight_type: "ethical_concern".into(),
            outcome: PatternOutcome::Failure,
            source: Some("review".into()),
            matcher: Matcher::Matches {
                field: "notes".into(),
                pattern: "(?i)bias|harm".into(),
            },
            description: "Reviewers flag ethical issues".into(),
            implications: vec![],
        };
        let ex = InsightExtractor::new(vec![rule], 0.1, 1).unwrap();
        let input = vec![
            Interaction::new("review", json!({"notes": "possible BIAS in answer"})),
            Interaction::new("review", json!({"notes": "fine"})),
            Interaction::new("chat", json!({"notes": "harm"})),
        ];
        let out = ex.extract(&input);
        assert_eq!(out.len(), 1);
        assert!((out[0].pattern_strength - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let rule = ExtractionRule {
            insight_type: "broken".into(),
            outcome: PatternOutcome::Failure,
            source: None,
            matcher: Matcher::Matches {
                field: "x".into(),
                pattern: "(unclosed".into(),
            },
            description: String::new(),
            implications: vec![],
        };
        assert!(matches!(
            InsightExtractor::new(vec![rule], 0.1, 1),
            Err(EvolutionError::AnalysisFailure(_))
        ));
    }
}
