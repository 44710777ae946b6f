use serde::{Deserialize, Serialize};

use crate::model::{Assessment, RawScore};

/// How the effort figure of a FinalAssessment is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffortMode {
    /// Effort of the last contributing assessment in processing order.
    #[default]
    LastAssessment,
    /// Mean over every usable score of every contributing assessment.
    Pooled,
}

/// Half-up rounding to 2 decimals: `Int(100*x + 0.5) / 100`.
pub fn round_off_2_decimal(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

/// Numeric reading of a free-form effort value; anything unparseable counts as 0.
pub fn effort_value(effort: Option<&str>) -> f64 {
    effort
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentAverage {
    pub avg_percent: f64,
    pub avg_effort: f64,
    pub effort_sum: f64,
    pub used_count: usize,
    /// Scores left out because their own weight is zero.
    pub excluded_score_ids: Vec<String>,
}

/// Mean percentage and effort over one assessment's scores for one student.
///
/// Returns `None` when no score is usable, so the assessment drops out of the denominator
/// instead of counting as zero.
pub fn assessment_average(scores: &[RawScore]) -> Option<AssessmentAverage> {
    let mut sum_percent = 0.0_f64;
    let mut effort_sum = 0.0_f64;
    let mut used_count: usize = 0;
    let mut excluded_score_ids: Vec<String> = Vec::new();

    for s in scores {
        if s.weight == 0.0 {
            excluded_score_ids.push(s.id.clone());
            continue;
        }
        sum_percent += (s.score / s.weight) * 100.0;
        effort_sum += effort_value(s.effort.as_deref());
        used_count += 1;
    }

    if used_count == 0 {
        return None;
    }
    let n = used_count as f64;
    Some(AssessmentAverage {
        avg_percent: sum_percent / n,
        avg_effort: effort_sum / n,
        effort_sum,
        used_count,
        excluded_score_ids,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentContribution {
    pub assessment_id: String,
    pub weight: f64,
    pub avg_percent: f64,
    pub avg_effort: f64,
    pub weighted_contribution: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub total_weighted_score: f64,
    pub total_weight: f64,
    /// Weighted percentage normalised by the weights actually encountered, rounded.
    pub final_score: f64,
    pub total_effort: f64,
    pub contributions: Vec<AssessmentContribution>,
    pub excluded_score_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFailure {
    /// No assessment had a usable score.
    NoScores,
    /// Some assessments had scores but their weights sum to zero.
    ZeroWeight,
}

/// Pure weighted aggregation over `(assessment, scores)` groups in processing order.
pub fn aggregate(
    groups: &[(Assessment, Vec<RawScore>)],
    effort_mode: EffortMode,
) -> Result<Aggregate, AggregateFailure> {
    let mut total_weighted_score = 0.0_f64;
    let mut total_weight = 0.0_f64;
    let mut last_effort = 0.0_f64;
    let mut pooled_effort_sum = 0.0_f64;
    let mut pooled_effort_count: usize = 0;
    let mut contributions: Vec<AssessmentContribution> = Vec::new();
    let mut excluded_score_ids: Vec<String> = Vec::new();

    for (a, scores) in groups {
        if scores.is_empty() {
            continue;
        }
        let Some(avg) = assessment_average(scores) else {
            excluded_score_ids.extend(scores.iter().map(|s| s.id.clone()));
            continue;
        };
        excluded_score_ids.extend(avg.excluded_score_ids.iter().cloned());

        let weighted_contribution = avg.avg_percent * a.weight / 100.0;
        total_weighted_score += weighted_contribution;
        total_weight += a.weight;
        last_effort = avg.avg_effort;
        pooled_effort_sum += avg.effort_sum;
        pooled_effort_count += avg.used_count;

        contributions.push(AssessmentContribution {
            assessment_id: a.id.clone(),
            weight: a.weight,
            avg_percent: avg.avg_percent,
            avg_effort: avg.avg_effort,
            weighted_contribution,
        });
    }

    if contributions.is_empty() {
        return Err(AggregateFailure::NoScores);
    }
    if total_weight == 0.0 {
        return Err(AggregateFailure::ZeroWeight);
    }

    let effort = match effort_mode {
        EffortMode::LastAssessment => last_effort,
        EffortMode::Pooled => pooled_effort_sum / (pooled_effort_count as f64),
    };

    Ok(Aggregate {
        total_weighted_score,
        total_weight,
        final_score: round_off_2_decimal(total_weighted_score * 100.0 / total_weight),
        total_effort: round_off_2_decimal(effort),
        contributions,
        excluded_score_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssessmentKind;
    use proptest::prelude::*;

    fn assessment(id: &str, weight: f64) -> Assessment {
        Assessment {
            id: id.to_string(),
            subject_id: "math".to_string(),
            academic_year_id: "y1".to_string(),
            term_id: "t1".to_string(),
            kind: AssessmentKind::Quiz,
            weight,
        }
    }

    fn score(id: &str, score: f64, weight: f64, effort: Option<&str>) -> RawScore {
        RawScore {
            id: id.to_string(),
            student_id: "s1".to_string(),
            assessment_id: "a".to_string(),
            title: id.to_string(),
            score,
            weight,
            effort: effort.map(str::to_string),
            comment: None,
        }
    }

    #[test]
    fn round_off_is_half_up() {
        assert_eq!(round_off_2_decimal(0.0), 0.0);
        assert_eq!(round_off_2_decimal(84.444), 84.44);
        assert_eq!(round_off_2_decimal(84.446), 84.45);
        assert_eq!(round_off_2_decimal(90.000_000_000_01), 90.0);
    }

    #[test]
    fn effort_coercion_defaults_to_zero() {
        assert_eq!(effort_value(Some(" 4.5 ")), 4.5);
        assert_eq!(effort_value(Some("good")), 0.0);
        assert_eq!(effort_value(Some("NaN")), 0.0);
        assert_eq!(effort_value(None), 0.0);
    }

    #[test]
    fn midterm_and_final_scenario_is_ninety() {
        let groups = vec![
            (assessment("mid", 40.0), vec![score("m", 36.0, 40.0, Some("3"))]),
            (assessment("fin", 60.0), vec![score("f", 54.0, 60.0, Some("5"))]),
        ];
        let agg = aggregate(&groups, EffortMode::LastAssessment).expect("aggregate");
        assert_eq!(agg.final_score, 90.0);
        assert!((agg.total_weighted_score - 90.0).abs() < 1e-9);
        assert_eq!(agg.total_weight, 100.0);
        assert_eq!(agg.total_effort, 5.0);
    }

    #[test]
    fn assessment_without_scores_is_left_out_of_denominator() {
        let groups = vec![
            (assessment("a1", 50.0), vec![score("x", 16.0, 20.0, None)]),
            (assessment("a2", 50.0), vec![]),
        ];
        let agg = aggregate(&groups, EffortMode::LastAssessment).expect("aggregate");
        assert_eq!(agg.total_weight, 50.0);
        assert_eq!(agg.final_score, 80.0);
        assert_eq!(agg.contributions.len(), 1);
    }

    #[test]
    fn multiple_scores_per_assessment_are_averaged() {
        let groups = vec![(
            assessment("q", 100.0),
            vec![
                score("q1", 5.0, 10.0, Some("2")),
                score("q2", 10.0, 10.0, Some("4")),
            ],
        )];
        let agg = aggregate(&groups, EffortMode::LastAssessment).expect("aggregate");
        assert_eq!(agg.final_score, 75.0);
        assert_eq!(agg.total_effort, 3.0);
    }

    #[test]
    fn zero_weight_scores_are_excluded_not_divided() {
        let groups = vec![(
            assessment("q", 100.0),
            vec![score("bad", 5.0, 0.0, None), score("good", 7.0, 10.0, None)],
        )];
        let agg = aggregate(&groups, EffortMode::LastAssessment).expect("aggregate");
        assert_eq!(agg.final_score, 70.0);
        assert_eq!(agg.excluded_score_ids, vec!["bad".to_string()]);
    }

    #[test]
    fn only_zero_weight_scores_means_no_scores() {
        let groups = vec![(assessment("q", 100.0), vec![score("bad", 5.0, 0.0, None)])];
        assert_eq!(
            aggregate(&groups, EffortMode::LastAssessment),
            Err(AggregateFailure::NoScores)
        );
    }

    #[test]
    fn zero_assessment_weight_is_reported() {
        let groups = vec![(assessment("q", 0.0), vec![score("s", 5.0, 10.0, None)])];
        assert_eq!(
            aggregate(&groups, EffortMode::LastAssessment),
            Err(AggregateFailure::ZeroWeight)
        );
    }

    #[test]
    fn over_range_scores_pass_through() {
        let groups = vec![(assessment("q", 100.0), vec![score("s", 15.0, 10.0, None)])];
        let agg = aggregate(&groups, EffortMode::LastAssessment).expect("aggregate");
        assert_eq!(agg.final_score, 150.0);
    }

    #[test]
    fn effort_modes_differ_on_uneven_assessments() {
        let groups = vec![
            (
                assessment("a1", 50.0),
                vec![
                    score("a", 10.0, 10.0, Some("1")),
                    score("b", 10.0, 10.0, Some("1")),
                    score("c", 10.0, 10.0, Some("1")),
                ],
            ),
            (assessment("a2", 50.0), vec![score("d", 10.0, 10.0, Some("5"))]),
            (assessment("a3", 50.0), vec![]),
        ];
        let last = aggregate(&groups, EffortMode::LastAssessment).expect("last");
        let pooled = aggregate(&groups, EffortMode::Pooled).expect("pooled");
        assert_eq!(last.total_effort, 5.0);
        assert_eq!(pooled.total_effort, 2.0);
        assert_eq!(last.final_score, pooled.final_score);
    }

    proptest! {
        #[test]
        fn aggregation_is_deterministic(
            weights in proptest::collection::vec(1.0f64..100.0, 1..6),
            pct in proptest::collection::vec(0.0f64..1.0, 1..6),
        ) {
            let groups: Vec<(Assessment, Vec<RawScore>)> = weights
                .iter()
                .zip(pct.iter())
                .enumerate()
                .map(|(i, (w, p))| {
                    (
                        assessment(&format!("a{i}"), *w),
                        vec![score(&format!("s{i}"), p * 20.0, 20.0, Some("3"))],
                    )
                })
                .collect();
            let first = aggregate(&groups, EffortMode::LastAssessment);
            let second = aggregate(&groups, EffortMode::LastAssessment);
            prop_assert_eq!(&first, &second);
            let agg = first.expect("aggregate");
            prop_assert!(agg.final_score >= 0.0 && agg.final_score <= 100.0);
        }
    }
}
