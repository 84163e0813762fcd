//! Weighted random choices: post kind, writing style, promotion style, trends

use rand::distributions::WeightedIndex;
use rand::prelude::*;

use crate::config::{PostTypeConfig, PromotionStyle, WritingStyle};
use crate::types::{PostKind, TrendItem};

/// Pick an index with probability proportional to its weight
///
/// Falls back to a uniform pick when every weight is zero.
fn weighted_index<R: Rng + ?Sized>(weights: &[u32], rng: &mut R) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }
    match WeightedIndex::new(weights) {
        Ok(dist) => Some(dist.sample(rng)),
        Err(_) => Some(rng.gen_range(0..weights.len())),
    }
}

/// Weighted style choice, or the freeform style when none are configured
pub fn select_style<R: Rng + ?Sized>(styles: &[WritingStyle], rng: &mut R) -> WritingStyle {
    let weights: Vec<u32> = styles.iter().map(|s| s.weight).collect();
    weighted_index(&weights, rng)
        .map(|i| styles[i].clone())
        .unwrap_or_else(WritingStyle::freeform)
}

/// Look up a style by name
pub fn find_style<'a>(styles: &'a [WritingStyle], name: &str) -> Option<&'a WritingStyle> {
    styles.iter().find(|s| s.name == name)
}

/// Style by name when it exists, otherwise a weighted pick
pub fn style_by_name_or_weighted<R: Rng + ?Sized>(
    styles: &[WritingStyle],
    name: Option<&str>,
    rng: &mut R,
) -> WritingStyle {
    name.and_then(|n| find_style(styles, n))
        .cloned()
        .unwrap_or_else(|| select_style(styles, rng))
}

/// Choose the kind of post by the configured ratios
pub fn select_post_kind<R: Rng + ?Sized>(config: &PostTypeConfig, rng: &mut R) -> PostKind {
    const KINDS: [PostKind; 3] = [
        PostKind::TrendLinked,
        PostKind::Independent,
        PostKind::Promotional,
    ];
    let weights = [config.type_a_ratio, config.type_b_ratio, config.type_c_ratio];
    weighted_index(&weights, rng)
        .map(|i| KINDS[i])
        .unwrap_or(PostKind::TrendLinked)
}

/// Weighted style choice restricted to the styles allowed for `kind`
///
/// Trend-linked posts draw from `type_a_styles`, everything else from
/// `type_b_styles`. When no configured style matches, all styles are eligible.
pub fn select_style_for_kind<R: Rng + ?Sized>(
    kind: PostKind,
    styles: &[WritingStyle],
    config: &PostTypeConfig,
    rng: &mut R,
) -> WritingStyle {
    let allowed = match kind {
        PostKind::TrendLinked => &config.type_a_styles,
        PostKind::Independent | PostKind::Promotional => &config.type_b_styles,
    };
    let candidates: Vec<WritingStyle> = styles
        .iter()
        .filter(|s| allowed.contains(&s.name))
        .cloned()
        .collect();

    if candidates.is_empty() {
        select_style(styles, rng)
    } else {
        select_style(&candidates, rng)
    }
}

/// Weighted promotion style, or the understated default when none are configured
pub fn select_promotion_style<R: Rng + ?Sized>(
    styles: &[PromotionStyle],
    rng: &mut R,
) -> PromotionStyle {
    let weights: Vec<u32> = styles.iter().map(|s| s.weight).collect();
    weighted_index(&weights, rng)
        .map(|i| styles[i].clone())
        .unwrap_or_else(PromotionStyle::understated)
}

/// Up to two distinct trends, chosen uniformly
pub fn pick_trends<R: Rng + ?Sized>(trends: &[TrendItem], rng: &mut R) -> Vec<TrendItem> {
    let count = trends.len().min(2);
    trends.choose_multiple(rng, count).cloned().collect()
}
