//! Head-to-head comparison: near-tie resolution and the duel verdict.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{DuelResult, DuelWinner, EntityAnalysis, ScoreTriple, TieBreak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DuelConfig {
    /// Aggregate margins at or below this are near-ties.
    pub tie_threshold: u8,
    /// Bounds on the total aggregate shift applied to break a near-tie.
    pub min_nudge: u8,
    pub max_nudge: u8,
}

impl Default for DuelConfig {
    fn default() -> Self {
        Self {
            tie_threshold: 3,
            min_nudge: 3,
            max_nudge: 7,
        }
    }
}

/// Secondary evidence quality per side, see [`crate::quality::quality_signal`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualitySignals {
    pub a: f64,
    pub b: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Nudge {
    favors_a: bool,
    /// Total aggregate points moved: half up on the favored side, half down
    /// on the other.
    points: u8,
}

fn plan_nudge(
    a: &ScoreTriple,
    b: &ScoreTriple,
    signals: QualitySignals,
    config: &DuelConfig,
) -> Option<Nudge> {
    // Same near-tie test as the verdict in `resolve`.
    if margin(a, b) > u32::from(config.tie_threshold) {
        return None;
    }
    let diff = a.aggregate() - b.aggregate();
    let threshold = f64::from(config.tie_threshold);
    if signals.a.is_nan() || signals.b.is_nan() || signals.a == signals.b {
        return None;
    }

    let favors_a = signals.a > signals.b;
    let lead = if favors_a { diff } else { -diff };
    // Smallest shift whose rounded margin clears the threshold.
    let needed = (threshold + 0.5 - lead).ceil().max(0.0) as u8;
    let points = needed.clamp(config.min_nudge, config.max_nudge.max(config.min_nudge));

    Some(Nudge { favors_a, points })
}

fn apply_nudge(a: ScoreTriple, b: ScoreTriple, nudge: Nudge) -> (ScoreTriple, ScoreTriple) {
    let up = i16::from(nudge.points.div_ceil(2));
    let down = -i16::from(nudge.points / 2);
    if nudge.favors_a {
        (a.shifted(up), b.shifted(down))
    } else {
        (a.shifted(down), b.shifted(up))
    }
}

/// Resolve near-ties between two score triples.
///
/// When the aggregates are within `tie_threshold`, the side with the better
/// quality signal is nudged up and the other down by a bounded amount. Equal
/// (or undefined) signals leave a near-tie alone. Margins beyond the
/// threshold are never touched, so a decisive lead cannot be inverted.
pub fn differentiate(
    a: ScoreTriple,
    b: ScoreTriple,
    signals: QualitySignals,
    config: &DuelConfig,
) -> (ScoreTriple, ScoreTriple) {
    match plan_nudge(&a, &b, signals, config) {
        Some(nudge) => apply_nudge(a, b, nudge),
        None => (a, b),
    }
}

/// Rounded absolute difference of the aggregates.
pub fn margin(a: &ScoreTriple, b: &ScoreTriple) -> u32 {
    (a.aggregate() - b.aggregate()).abs().round() as u32
}

/// Differentiate two finished analyses and pick the winner. `tie` iff the
/// final margin is within the threshold.
pub fn resolve(
    mut first: EntityAnalysis,
    mut second: EntityAnalysis,
    config: &DuelConfig,
) -> DuelResult {
    let signals = QualitySignals {
        a: first.quality_signal,
        b: second.quality_signal,
    };
    let nudge = plan_nudge(first.scores(), second.scores(), signals, config);

    let tie_break = nudge.map(|nudge| {
        let (a, b) = apply_nudge(first.report.scores, second.report.scores, nudge);
        first.report.scores = a;
        second.report.scores = b;
        let favored = if nudge.favors_a { &first } else { &second };
        TieBreak {
            favored: favored.entity.to_string(),
            points: nudge.points,
        }
    });

    let margin = margin(first.scores(), second.scores());
    let winner = if margin <= u32::from(config.tie_threshold) {
        DuelWinner::Tie
    } else if first.scores().aggregate() > second.scores().aggregate() {
        DuelWinner::Entity(first.entity.to_string())
    } else {
        DuelWinner::Entity(second.entity.to_string())
    };

    info!(
        first = %first.entity,
        second = %second.entity,
        margin,
        tie_broken = tie_break.is_some(),
        "Duel resolved"
    );

    DuelResult {
        entity1: first,
        entity2: second,
        winner,
        margin,
        tie_break,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::FallbackScores;
    use crate::types::{EntityName, SearchStats, SentimentLabel};
    use uuid::Uuid;

    fn flat(score: u8) -> ScoreTriple {
        ScoreTriple::new(score, score, score, SentimentLabel::Neutral)
    }

    fn signals(a: f64, b: f64) -> QualitySignals {
        QualitySignals { a, b }
    }

    fn analysis(name: &str, score: u8, quality: f64) -> EntityAnalysis {
        let mut report = FallbackScores::default().report("unused");
        report.scores = flat(score);
        report.fallback = false;
        report.fallback_reason = None;
        EntityAnalysis {
            run_id: Uuid::new_v4(),
            entity: EntityName::parse(name).unwrap(),
            identity: None,
            report,
            search: SearchStats::default(),
            result_count: 10,
            quality_signal: quality,
            degraded: false,
            degradation_reasons: Vec::new(),
        }
    }

    #[test]
    fn near_tie_is_separated_toward_higher_quality() {
        let config = DuelConfig::default();
        let (a, b) = differentiate(flat(70), flat(72), signals(0.8, 0.5), &config);
        assert!(a.aggregate() > b.aggregate());
        assert!(margin(&a, &b) > 3);
    }

    #[test]
    fn near_tie_leader_with_better_quality_pulls_ahead() {
        let config = DuelConfig::default();
        let (a, b) = differentiate(flat(70), flat(72), signals(0.2, 0.5), &config);
        assert!(b.aggregate() > a.aggregate());
        assert!(margin(&a, &b) > 3);
    }

    #[test]
    fn nudge_stays_within_bounds() {
        let config = DuelConfig::default();
        for (sa, sb) in [(70, 72), (72, 70), (70, 70), (70, 73), (73, 70)] {
            let before = flat(sa).aggregate() - flat(sb).aggregate();
            let (a, b) = differentiate(flat(sa), flat(sb), signals(0.9, 0.1), &config);
            let moved = (a.aggregate() - b.aggregate()) - before;
            assert!((3.0..=7.0).contains(&moved), "{sa} vs {sb} moved {moved}");
        }
    }

    #[test]
    fn decisive_lead_is_untouched() {
        let config = DuelConfig::default();
        let (a, b) = differentiate(flat(80), flat(70), signals(0.1, 0.9), &config);
        assert_eq!((a, b), (flat(80), flat(70)));
    }

    #[test]
    fn equal_signals_leave_near_tie_alone() {
        let config = DuelConfig::default();
        let (a, b) = differentiate(flat(70), flat(72), signals(0.5, 0.5), &config);
        assert_eq!((a, b), (flat(70), flat(72)));
        let (a, b) = differentiate(flat(70), flat(72), signals(f64::NAN, 0.5), &config);
        assert_eq!((a, b), (flat(70), flat(72)));
    }

    #[test]
    fn resolve_records_tie_break_and_winner() {
        let result = resolve(
            analysis("Acme", 70, 0.9),
            analysis("Globex", 72, 0.3),
            &DuelConfig::default(),
        );
        assert_eq!(result.winner, DuelWinner::Entity("Acme".to_string()));
        assert!(result.margin > 3);
        assert_eq!(result.tie_break.map(|t| t.favored), Some("Acme".to_string()));
    }

    #[test]
    fn unresolvable_near_tie_is_reported_as_tie() {
        let result = resolve(
            analysis("Acme", 70, 0.4),
            analysis("Globex", 72, 0.4),
            &DuelConfig::default(),
        );
        assert_eq!(result.winner, DuelWinner::Tie);
        assert_eq!(result.margin, 2);
        assert!(result.tie_break.is_none());
    }

    #[test]
    fn fractional_gap_that_rounds_into_the_band_is_broken() {
        // 70 vs 73.33: over the threshold raw, but the rounded margin is 3.
        let acme = analysis("Acme", 70, 0.9);
        let mut globex = analysis("Globex", 70, 0.1);
        globex.report.scores = ScoreTriple::new(73, 74, 73, SentimentLabel::Neutral);

        let result = resolve(acme, globex, &DuelConfig::default());
        assert_eq!(result.winner, DuelWinner::Entity("Acme".to_string()));
        assert!(result.margin > 3);
        assert_eq!(
            result.tie_break,
            Some(TieBreak {
                favored: "Acme".to_string(),
                points: 7
            })
        );
    }

    #[test]
    fn clear_winner_needs_no_tie_break() {
        let result = resolve(
            analysis("Acme", 90, 0.1),
            analysis("Globex", 60, 0.9),
            &DuelConfig::default(),
        );
        assert_eq!(result.winner, DuelWinner::Entity("Acme".to_string()));
        assert_eq!(result.margin, 30);
        assert!(result.tie_break.is_none());
    }

    #[test]
    fn saturated_scores_fall_back_to_tie() {
        let result = resolve(
            analysis("Acme", 100, 0.9),
            analysis("Globex", 100, 0.1),
            &DuelConfig::default(),
        );
        // Acme is capped at 100, so only Globex's half of the nudge lands.
        assert_eq!(result.margin, 2);
        assert_eq!(result.winner, DuelWinner::Tie);
        assert!(result.tie_break.is_some());
    }
}
