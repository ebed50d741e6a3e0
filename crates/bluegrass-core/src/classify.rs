//! Kentucky relevance gate and county tagging.
//!
//! Classification is a pure function of (title, body). Tier 1 accepts on
//! title evidence, tier 2 on repeated body mentions, tier 3 records the
//! ambiguous-city rejection so ingest metrics can explain the drop.

use crate::geo;
use crate::models::{ItemLocation, RegionScope};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelevanceTier {
    Tier1Title,
    Tier2Body,
    Tier3AmbiguousCity,
}

impl RelevanceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tier1Title => "tier1_title",
            Self::Tier2Body => "tier2_body",
            Self::Tier3AmbiguousCity => "tier3_ambiguous_city",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub region_scope: RegionScope,
    pub locations: Vec<ItemLocation>,
    pub other_states: Vec<String>,
    /// Accepting tier for `ky` items; `Tier3AmbiguousCity` when the only
    /// evidence was an uncorroborated ambiguous city.
    pub tier: Option<RelevanceTier>,
}

/// Case-insensitive, whitespace-tolerant word-boundary pattern for a place
/// name ("Mount Washington" matches across any run of whitespace).
fn place_pattern(name: &str) -> String {
    let words: Vec<String> = name
        .split_whitespace()
        .map(regex::escape)
        .collect();
    format!(r"(?i)\b{}\b", words.join(r"\s+"))
}

fn place_re(name: &str) -> Regex {
    Regex::new(&place_pattern(name)).unwrap()
}

fn contains_place(text: &str, name: &str) -> bool {
    place_re(name).is_match(text)
}

fn count_place(text: &str, name: &str) -> usize {
    place_re(name).find_iter(text).count()
}

/// "Kentucky" anywhere (any case) or the exact uppercase "KY" token.
pub fn has_ky_signal(text: &str) -> bool {
    static KENTUCKY: OnceLock<Regex> = OnceLock::new();
    static KY: OnceLock<Regex> = OnceLock::new();
    let kentucky = KENTUCKY.get_or_init(|| Regex::new(r"(?i)\bKentucky\b").unwrap());
    let ky = KY.get_or_init(|| Regex::new(r"\bKY\b").unwrap());
    kentucky.is_match(text) || ky.is_match(text)
}

fn count_ky_terms(text: &str) -> usize {
    static KENTUCKY: OnceLock<Regex> = OnceLock::new();
    static KY: OnceLock<Regex> = OnceLock::new();
    let kentucky = KENTUCKY.get_or_init(|| Regex::new(r"(?i)\bKentucky\b").unwrap());
    let ky = KY.get_or_init(|| Regex::new(r"\bKY\b").unwrap());
    kentucky.find_iter(text).count() + ky.find_iter(text).count()
}

/// Counties named with an explicit county marker: `Pike County`, `Pike Co.`.
fn county_re(county: &str) -> Regex {
    let pattern = format!(
        r"(?i)\b{}\s+(county|co\.?)\b",
        county
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s+")
    );
    Regex::new(&pattern).unwrap()
}

fn counties_longest_first() -> &'static [&'static str] {
    static SORTED: OnceLock<Vec<&'static str>> = OnceLock::new();
    SORTED
        .get_or_init(|| {
            let mut counties = geo::KY_COUNTIES.to_vec();
            // Longest first so "Breckinridge" is never shadowed by a prefix.
            counties.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
            counties
        })
        .as_slice()
}

/// Scan for county tags. City names map to counties only when the article
/// carries a KY signal.
pub fn extract_counties(text: &str, ky_signal: bool) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for county in counties_longest_first() {
        if county_re(county).is_match(text) && !found.iter().any(|f| f == county) {
            found.push((*county).to_string());
        }
    }
    if ky_signal {
        for (city, county) in geo::KY_CITY_TO_COUNTY {
            if contains_place(text, city) && !found.iter().any(|f| f == county) {
                found.push((*county).to_string());
            }
        }
    }
    found.sort();
    found
}

/// Counties whose bare name appears in the text, marker or not. Search uses
/// this to widen a query like "pike flooding" to county-tagged items.
pub fn counties_named(text: &str) -> Vec<String> {
    let mut found: Vec<String> = counties_longest_first()
        .iter()
        .filter(|county| contains_place(text, county))
        .map(|county| (*county).to_string())
        .collect();
    found.sort();
    found
}

/// U.S. states other than Kentucky named in the text.
pub fn extract_other_states(text: &str) -> Vec<String> {
    let mut states: Vec<String> = geo::US_STATES
        .iter()
        .filter(|(name, code)| *code != geo::KY_STATE_CODE && contains_place(text, name))
        .map(|(_, code)| (*code).to_string())
        .collect();
    states.sort();
    states.dedup();
    states
}

/// Classify an article by (title, body). Items that fail every tier stay in
/// the corpus as `national`; callers with a KY-only policy use `tier` to
/// record the rejection instead.
pub fn classify(title: &str, body: &str) -> Classification {
    let full_text = format!("{title}\n{body}");
    let ky_signal = has_ky_signal(&full_text);

    let title_has_ky_term = has_ky_signal(title);
    // County names with an explicit marker are unambiguous region names.
    let title_has_region = geo::unambiguous_cities().any(|c| contains_place(title, c))
        || counties_longest_first()
            .iter()
            .any(|county| county_re(county).is_match(title));
    let title_has_ambiguous_city = geo::AMBIGUOUS_CITIES
        .iter()
        .any(|c| contains_place(title, c));

    let tier1 =
        title_has_ky_term || title_has_region || (title_has_ambiguous_city && ky_signal);

    let accepted_tier = if tier1 {
        Some(RelevanceTier::Tier1Title)
    } else {
        // Tier 2 counts body-only mentions of the base term set; ambiguous
        // cities join the count only under an article-wide KY signal.
        let mut mentions = count_ky_terms(body);
        for city in geo::unambiguous_cities() {
            mentions += count_place(body, city);
        }
        for county in counties_longest_first() {
            mentions += county_re(county).find_iter(body).count();
        }
        if ky_signal {
            for city in geo::AMBIGUOUS_CITIES {
                mentions += count_place(body, city);
            }
        }
        (mentions >= 2).then_some(RelevanceTier::Tier2Body)
    };

    let ambiguous_anywhere = geo::AMBIGUOUS_CITIES
        .iter()
        .any(|c| contains_place(&full_text, c));

    match accepted_tier {
        Some(tier) => {
            let counties = extract_counties(&full_text, true);
            let locations = counties
                .iter()
                .map(|county| ItemLocation::county(geo::KY_STATE_CODE, county))
                .collect();
            Classification {
                region_scope: RegionScope::Ky,
                locations,
                other_states: extract_other_states(&full_text),
                tier: Some(tier),
            }
        }
        None => {
            let tier = (ambiguous_anywhere && !ky_signal)
                .then_some(RelevanceTier::Tier3AmbiguousCity);
            let counties = extract_counties(&full_text, ky_signal);
            let locations = counties
                .iter()
                .map(|county| ItemLocation::county(geo::KY_STATE_CODE, county))
                .collect();
            Classification {
                region_scope: RegionScope::National,
                locations,
                other_states: extract_other_states(&full_text),
                tier,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier1_explicit_ky_term_in_title() {
        let c = classify("Kentucky lawmakers pass budget", "The session ended Friday.");
        assert_eq!(c.region_scope, RegionScope::Ky);
        assert_eq!(c.tier, Some(RelevanceTier::Tier1Title));
    }

    #[test]
    fn tier1_unambiguous_city_in_title() {
        let c = classify("Paducah riverfront project breaks ground", "Construction begins.");
        assert_eq!(c.region_scope, RegionScope::Ky);
        assert_eq!(c.tier, Some(RelevanceTier::Tier1Title));
    }

    #[test]
    fn tier1_ambiguous_city_needs_signal() {
        let with_signal = classify(
            "Louisville unveils new bridge plan",
            "The Kentucky transportation cabinet approved the design.",
        );
        assert_eq!(with_signal.region_scope, RegionScope::Ky);
        assert_eq!(with_signal.tier, Some(RelevanceTier::Tier1Title));
    }

    #[test]
    fn tier3_ambiguous_city_without_signal() {
        let c = classify("Franklin mayor resigns", "The city council will meet next week.");
        assert_eq!(c.region_scope, RegionScope::National);
        assert_eq!(c.tier, Some(RelevanceTier::Tier3AmbiguousCity));
    }

    #[test]
    fn tier2_body_mentions() {
        let c = classify(
            "Storm damage reported across the region",
            "Crews in Paducah restored power overnight. Officials in Owensboro expect repairs to finish this week.",
        );
        assert_eq!(c.region_scope, RegionScope::Ky);
        assert_eq!(c.tier, Some(RelevanceTier::Tier2Body));
    }

    #[test]
    fn single_body_mention_is_not_enough() {
        let c = classify(
            "Storm damage reported",
            "Crews in Paducah restored power overnight.",
        );
        assert_eq!(c.region_scope, RegionScope::National);
        assert_eq!(c.tier, None);
    }

    #[test]
    fn unrelated_article_is_national() {
        let c = classify("Markets close higher", "Tech stocks led the rally on Wall Street.");
        assert_eq!(c.region_scope, RegionScope::National);
        assert!(c.locations.is_empty());
        assert_eq!(c.tier, None);
    }

    #[test]
    fn classify_is_pure() {
        let a = classify("Kentucky flooding", "Pike County roads closed.");
        let b = classify("Kentucky flooding", "Pike County roads closed.");
        assert_eq!(a.region_scope, b.region_scope);
        assert_eq!(a.locations, b.locations);
        assert_eq!(a.tier.map(|t| t.as_str()), b.tier.map(|t| t.as_str()));
    }

    #[test]
    fn county_marker_required() {
        // "Pike" alone is not a county tag; "Pike County" and "Pike Co." are.
        assert!(extract_counties("Pike fishing season opens", false).is_empty());
        assert_eq!(
            extract_counties("Flooding hit Pike County on Monday", false),
            vec!["Pike".to_string()]
        );
        assert_eq!(
            extract_counties("Flooding hit Pike Co. on Monday", false),
            vec!["Pike".to_string()]
        );
    }

    #[test]
    fn county_regex_tolerates_whitespace_and_case() {
        assert_eq!(
            extract_counties("bowling green sits in WARREN\n COUNTY", false),
            vec!["Warren".to_string()]
        );
    }

    #[test]
    fn city_maps_to_county_only_with_signal() {
        assert!(extract_counties("A festival in Paducah", false).is_empty());
        assert_eq!(
            extract_counties("A festival in Paducah", true),
            vec!["McCracken".to_string()]
        );
    }

    #[test]
    fn flood_scenario_sets_pike() {
        let c = classify(
            "Flood warning in Pike County",
            "Heavy rains across Kentucky",
        );
        assert_eq!(c.region_scope, RegionScope::Ky);
        assert!(c
            .locations
            .contains(&ItemLocation::county("KY", "Pike")));
    }

    #[test]
    fn counties_named_for_search() {
        assert_eq!(counties_named("pike flooding update"), vec!["Pike".to_string()]);
        assert!(counties_named("turnpike flooding update").is_empty());
    }

    #[test]
    fn other_states_tagged() {
        let c = classify(
            "Kentucky and Tennessee share flood relief funds",
            "Officials from both states met in Frankfort.",
        );
        assert_eq!(c.other_states, vec!["TN".to_string()]);
    }

    #[test]
    fn lowercase_ky_token_is_not_a_signal() {
        assert!(!has_ky_signal("whisky business in the valley"));
        assert!(has_ky_signal("Floods in KY this weekend"));
        assert!(has_ky_signal("kentucky derby"));
    }
}
