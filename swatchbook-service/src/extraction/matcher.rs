//! Greedy label-to-image spatial matching.
//!
//! Labels are visited in layout order. Each takes the best-scoring image still
//! unused in the pool, so assignment depends on label order and is not a
//! global optimum.

use std::collections::HashSet;

use crate::config::MatcherConfig;

use super::types::{ImageId, Label, Match, MatchRule, SwatchImage};

/// Pair labels with images of one pool, one-to-one.
///
/// `claimed` holds images already taken by an earlier pass on the same page
/// and is extended with every image matched here. A label whose code already
/// has a match is skipped.
pub fn match_labels(
    labels: &[Label],
    images: &[SwatchImage],
    rules: &MatcherConfig,
    claimed: &mut HashSet<ImageId>,
) -> Vec<Match> {
    let mut matches: Vec<Match> = Vec::new();

    for label in labels {
        if matches.iter().any(|m| m.code == label.code) {
            continue;
        }

        let mut best: Option<(usize, f64, MatchRule)> = None;
        for (index, image) in images.iter().enumerate() {
            if claimed.contains(&image.id) {
                continue;
            }
            let Some((score, rule)) = score_pair(label, image, rules) else {
                continue;
            };
            if best.is_none_or(|(_, best_score, _)| score < best_score) {
                best = Some((index, score, rule));
            }
        }

        if let Some((index, _, rule)) = best {
            let image = &images[index];
            claimed.insert(image.id);
            matches.push(Match {
                code: label.code.clone(),
                image: image.clone(),
                rule,
                auto_fixed: false,
            });
        }
    }

    matches
}

/// Score a label/image pair under the placement rules.
///
/// "Label below image" is tried first; "label right of image" only when the
/// pair is outside the below window.
pub fn score_pair(
    label: &Label,
    image: &SwatchImage,
    rules: &MatcherConfig,
) -> Option<(f64, MatchRule)> {
    let dx = label.center_x - image.center_x;
    let dy = label.center_y - image.center_y;

    if let Some(score) = rules.below.score(dy, dx) {
        return Some((score, MatchRule::LabelBelow));
    }
    rules
        .right
        .score(dx, dy)
        .map(|score| (score, MatchRule::LabelRight))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::test_support::swatch_at;

    fn label(code: &str, x: f64, y: f64) -> Label {
        Label {
            code: code.to_string(),
            center_x: x,
            center_y: y,
        }
    }

    #[test]
    fn test_label_below_image() {
        let images = vec![swatch_at(0, 100.0, 200.0)];
        let mut claimed = HashSet::new();
        let matches = match_labels(
            &[label("83046A", 100.0, 300.0)],
            &images,
            &MatcherConfig::default(),
            &mut claimed,
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].code, "83046A");
        assert_eq!(matches[0].rule, MatchRule::LabelBelow);
        assert!(claimed.contains(&images[0].id));
    }

    #[test]
    fn test_adjacent_labels_do_not_cross_assign() {
        let images = vec![swatch_at(0, 100.0, 200.0), swatch_at(1, 300.0, 200.0)];
        let labels = vec![label("83046A", 100.0, 300.0), label("83046B", 300.0, 300.0)];
        let matches = match_labels(
            &labels,
            &images,
            &MatcherConfig::default(),
            &mut HashSet::new(),
        );
        let pairs: Vec<(&str, u32)> = matches
            .iter()
            .map(|m| (m.code.as_str(), m.image.id.xref))
            .collect();
        assert_eq!(pairs, vec![("83046A", 0), ("83046B", 1)]);
    }

    #[test]
    fn test_label_right_of_image() {
        let images = vec![swatch_at(0, 100.0, 200.0)];
        let matches = match_labels(
            &[label("83046A", 210.0, 210.0)],
            &images,
            &MatcherConfig::default(),
            &mut HashSet::new(),
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].rule, MatchRule::LabelRight);
    }

    #[test]
    fn test_image_used_once_greedy_in_label_order() {
        // Both labels prefer the single image; the first label in layout order wins
        let images = vec![swatch_at(0, 100.0, 200.0)];
        let labels = vec![label("83046B", 150.0, 320.0), label("83046A", 100.0, 300.0)];
        let matches = match_labels(
            &labels,
            &images,
            &MatcherConfig::default(),
            &mut HashSet::new(),
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].code, "83046B");
    }

    #[test]
    fn test_claimed_images_are_skipped() {
        let images = vec![swatch_at(0, 100.0, 200.0)];
        let mut claimed = HashSet::from([images[0].id]);
        let matches = match_labels(
            &[label("83046A", 100.0, 300.0)],
            &images,
            &MatcherConfig::default(),
            &mut claimed,
        );
        assert!(matches.is_empty());
    }

    #[test]
    fn test_label_above_or_far_away_is_unmatched() {
        let images = vec![swatch_at(0, 100.0, 200.0)];
        let labels = vec![
            label("83046A", 100.0, 150.0),
            label("83046B", 100.0, 600.0),
            label("83046C", -100.0, 350.0),
        ];
        let matches = match_labels(
            &labels,
            &images,
            &MatcherConfig::default(),
            &mut HashSet::new(),
        );
        assert!(matches.is_empty());
    }

    #[test]
    fn test_repeated_code_matches_once() {
        let images = vec![swatch_at(0, 100.0, 200.0), swatch_at(1, 500.0, 200.0)];
        let labels = vec![label("83046A", 100.0, 300.0), label("83046A", 500.0, 300.0)];
        let matches = match_labels(
            &labels,
            &images,
            &MatcherConfig::default(),
            &mut HashSet::new(),
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].image.id.xref, 0);
    }
}
