//! Derived scalar scores over gold rows.
//!
//! All functions are pure, tolerate missing inputs (a null contributes
//! nothing) and clamp to their stated bounds. Keyword matching is
//! case-insensitive substring containment.

const NIGHTLIFE_KEYWORDS: &[&str] = &[
    "bar", "pub", "club", "nightclub", "lounge", "brewery", "wine", "cocktail", "music venue",
    "theater", "cinema",
];

const FAMILY_KEYWORDS: &[&str] = &[
    "school", "park", "playground", "library", "community center", "daycare", "pediatric",
    "family", "youth", "recreation",
];

const CULTURAL_KEYWORDS: &[&str] = &[
    "museum", "art", "gallery", "theater", "music", "concert", "cultural", "heritage", "historic",
    "library", "exhibition", "festival", "opera", "symphony",
];

const GREEN_KEYWORDS: &[&str] = &[
    "park", "garden", "trail", "beach", "forest", "nature", "outdoor", "recreation", "green",
    "golf", "lake", "river", "hiking", "biking", "open space",
];

/// Number of items containing at least one of the keywords.
fn keyword_matches(items: &[String], keywords: &[&str]) -> usize {
    items
        .iter()
        .filter(|item| {
            let lowered = item.to_lowercase();
            keywords.iter().any(|k| lowered.contains(k))
        })
        .count()
}

fn tags_contain(tags: &[String], needles: &[&str]) -> bool {
    tags.iter().any(|tag| {
        let lowered = tag.to_lowercase();
        needles.iter().any(|n| lowered.contains(n))
    })
}

/// Nightlife score in [0, 10]: 1.5 per matching amenity, +2 for
/// nightlife/entertainment tags.
pub fn nightlife_score(amenities: &[String], tags: &[String]) -> f64 {
    let mut score = keyword_matches(amenities, NIGHTLIFE_KEYWORDS) as f64 * 1.5;
    if tags_contain(tags, &["nightlife", "entertainment"]) {
        score += 2.0;
    }
    score.clamp(0.0, 10.0)
}

/// Family-friendliness in [0, 10]: weighted mean of school rating,
/// safety rating and family-amenity coverage, normalized by the weights
/// actually present; +1 for family/quiet tags.
pub fn family_friendly_score(
    school_rating: Option<f64>,
    safety_rating: Option<f64>,
    amenities: &[String],
    tags: &[String],
) -> f64 {
    let mut weighted = 0.0;
    let mut weight_sum = 0.0;

    if let Some(school) = school_rating {
        weighted += school.clamp(0.0, 10.0) * 0.4;
        weight_sum += 0.4;
    }
    if let Some(safety) = safety_rating {
        weighted += safety.clamp(0.0, 10.0) * 0.3;
        weight_sum += 0.3;
    }
    if !amenities.is_empty() {
        let amenity_score = (keyword_matches(amenities, FAMILY_KEYWORDS) as f64 * 2.0).min(10.0);
        weighted += amenity_score * 0.3;
        weight_sum += 0.3;
    }

    let mut score = if weight_sum > 0.0 { weighted / weight_sum } else { 0.0 };
    if tags_contain(tags, &["family", "quiet"]) {
        score += 1.0;
    }
    score.clamp(0.0, 10.0)
}

/// Cultural score in [0, 10]: 1.5 per matching amenity plus 0.5 per
/// matching aggregated topic.
pub fn cultural_score(amenities: &[String], topics: &[String]) -> f64 {
    let amenity_part = keyword_matches(amenities, CULTURAL_KEYWORDS) as f64 * 1.5;
    let topic_part = keyword_matches(topics, CULTURAL_KEYWORDS) as f64 * 0.5;
    (amenity_part + topic_part).clamp(0.0, 10.0)
}

/// Green-space score in [0, 10]: 1.5 per matching amenity, +2 for
/// outdoor/nature tags.
pub fn green_space_score(amenities: &[String], tags: &[String]) -> f64 {
    let mut score = keyword_matches(amenities, GREEN_KEYWORDS) as f64 * 1.5;
    if tags_contain(tags, &["outdoor", "nature"]) {
        score += 2.0;
    }
    score.clamp(0.0, 10.0)
}

/// Knowledge coverage in [0, 1] from correlated wikipedia pages, topic
/// diversity and amenity extraction counts.
pub fn knowledge_score(wikipedia_count: usize, topic_count: usize, amenity_count: usize) -> f64 {
    let wiki = (wikipedia_count as f64 / 10.0).min(0.5);
    let topics = (topic_count as f64 / 20.0).min(0.3);
    let amenities = (amenity_count as f64 / 20.0).min(0.2);
    (wiki + topics + amenities).clamp(0.0, 1.0)
}

/// Overall extraction confidence in [0, 1]. Missing inputs default to a
/// neutral 0.5.
pub fn overall_confidence(
    location_confidence: Option<f64>,
    extraction_confidence: Option<f64>,
    content_ratio: Option<f64>,
) -> f64 {
    let location = location_confidence.unwrap_or(0.5).clamp(0.0, 1.0);
    let extraction = extraction_confidence.unwrap_or(0.5).clamp(0.0, 1.0);
    let content = content_ratio.unwrap_or(0.5).clamp(0.0, 1.0);
    (location * 0.5 + extraction * 0.3 + content * 0.2).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_nightlife_score_counts_and_tags() {
        let amenities = strings(&["Wine Bar", "Jazz Club", "Grocery"]);
        assert_eq!(nightlife_score(&amenities, &[]), 3.0);
        let tags = strings(&["nightlife"]);
        assert_eq!(nightlife_score(&amenities, &tags), 5.0);
    }

    #[test]
    fn test_nightlife_score_caps_at_ten() {
        let amenities = strings(&[
            "bar", "pub", "club", "nightclub", "lounge", "brewery", "wine shop", "cocktail bar",
        ]);
        let tags = strings(&["entertainment"]);
        assert_eq!(nightlife_score(&amenities, &tags), 10.0);
    }

    #[test]
    fn test_family_score_normalizes_by_present_weights() {
        // Only the school rating is present: the mean is the rating itself.
        let score = family_friendly_score(Some(8.0), None, &[], &[]);
        assert!((score - 8.0).abs() < 1e-9);

        // School and safety present with no amenities.
        let score = family_friendly_score(Some(8.0), Some(6.0), &[], &[]);
        let expected = (8.0 * 0.4 + 6.0 * 0.3) / 0.7;
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_family_score_tag_bonus_and_cap() {
        let amenities = strings(&["school", "park", "playground", "library", "daycare"]);
        let tags = strings(&["family", "quiet"]);
        let score = family_friendly_score(Some(10.0), Some(10.0), &amenities, &tags);
        assert_eq!(score, 10.0);
    }

    #[test]
    fn test_family_score_all_null_is_zero() {
        assert_eq!(family_friendly_score(None, None, &[], &[]), 0.0);
    }

    #[test]
    fn test_cultural_score_topic_boost() {
        let amenities = strings(&["Art Gallery", "Museum"]);
        let topics = strings(&["historic architecture", "cuisine"]);
        let score = cultural_score(&amenities, &topics);
        assert!((score - (3.0 + 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_green_space_score() {
        let amenities = strings(&["Dolores Park", "Hiking Trail"]);
        let tags = strings(&["outdoor living"]);
        assert_eq!(green_space_score(&amenities, &tags), 5.0);
        assert_eq!(green_space_score(&[], &[]), 0.0);
    }

    #[test]
    fn test_knowledge_score_components_cap() {
        assert_eq!(knowledge_score(0, 0, 0), 0.0);
        assert!((knowledge_score(3, 4, 4) - (0.3 + 0.2 + 0.2)).abs() < 1e-9);
        // Saturated inputs hit the per-component maxima.
        assert_eq!(knowledge_score(100, 100, 100), 1.0);
    }

    #[test]
    fn test_overall_confidence_defaults() {
        assert!((overall_confidence(None, None, None) - 0.5).abs() < 1e-9);
        let score = overall_confidence(Some(1.0), Some(1.0), Some(1.0));
        assert_eq!(score, 1.0);
        let score = overall_confidence(Some(0.8), None, Some(0.2));
        assert!((score - (0.8 * 0.5 + 0.5 * 0.3 + 0.2 * 0.2)).abs() < 1e-9);
    }
}
