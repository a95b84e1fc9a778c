//! Per-User Filter Matcher (§4.8). Pre-indexes rules by collection name so
//! matching stays close to O(#matched_users x #rules_per_user) even for
//! users with many rules.

use std::collections::HashMap;

use crate::core::types::{FilterRule, Listing, UserFilter, ANY};

/// A single user's rules, indexed by lowercased collection name for rules
/// that name specific collections, plus a separate bucket for `ANY`-collection
/// rules that must be checked against every listing regardless of collection.
pub struct IndexedUserFilter {
    user_id: String,
    by_collection: HashMap<String, Vec<FilterRule>>,
    wildcard_collection: Vec<FilterRule>,
}

impl IndexedUserFilter {
    pub fn build(filter: &UserFilter) -> Self {
        let mut by_collection: HashMap<String, Vec<FilterRule>> = HashMap::new();
        let mut wildcard_collection = Vec::new();
        for rule in &filter.rules {
            if is_any(&rule.collections) {
                wildcard_collection.push(rule.clone());
            } else {
                for name in &rule.collections {
                    by_collection
                        .entry(strip_rarity_suffix(name).to_lowercase())
                        .or_default()
                        .push(rule.clone());
                }
            }
        }
        Self {
            user_id: filter.user_id.clone(),
            by_collection,
            wildcard_collection,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// A user matches a Listing if any one of their rules admits it (§3, §4.8).
    pub fn matches(&self, listing: &Listing) -> bool {
        let key = strip_rarity_suffix(&listing.collection_name).to_lowercase();
        let candidates = self
            .by_collection
            .get(&key)
            .into_iter()
            .flatten()
            .chain(self.wildcard_collection.iter());
        candidates.into_iter().any(|rule| rule_matches(rule, listing))
    }
}

fn is_any(values: &[String]) -> bool {
    values.iter().any(|v| v == ANY)
}

/// Strips a trailing `"(...)"` rarity annotation before lowercase comparison
/// (§4.8).
fn strip_rarity_suffix(name: &str) -> &str {
    match name.find('(') {
        Some(index) => name[..index].trim_end(),
        None => name,
    }
}

fn matches_name_list(values: &[String], candidate: &str) -> bool {
    if is_any(values) {
        return true;
    }
    let candidate_key = strip_rarity_suffix(candidate).to_lowercase();
    values
        .iter()
        .any(|v| strip_rarity_suffix(v).to_lowercase() == candidate_key)
}

fn rule_matches(rule: &FilterRule, listing: &Listing) -> bool {
    if !matches_name_list(&rule.collections, &listing.collection_name) {
        return false;
    }
    if !matches_name_list(&rule.models, &listing.model_name) {
        return false;
    }
    let backdrop = listing.backdrop_name.as_deref().unwrap_or("");
    if !matches_name_list(&rule.backdrops, backdrop) {
        return false;
    }
    if !rule.marketplaces.is_empty() && !rule.marketplaces.contains(&listing.marketplace) {
        return false;
    }
    if let Some(min) = rule.price_min {
        if listing.price_ton < min {
            return false;
        }
    }
    if let Some(max) = rule.price_max {
        if listing.price_ton > max {
            return false;
        }
    }
    true
}

/// Returns the subset of `filters` whose rules admit `listing` (§4.6 step 2,
/// §4.8). A failure building one user's index must never block the others;
/// callers are expected to have already dropped users whose rule fetch
/// failed (see `dispatch::collect_matched_users`).
pub fn matching_users<'a>(
    listing: &Listing,
    filters: impl IntoIterator<Item = &'a IndexedUserFilter>,
) -> Vec<&'a str> {
    filters
        .into_iter()
        .filter(|f| f.matches(listing))
        .map(|f| f.user_id())
        .collect()
}
