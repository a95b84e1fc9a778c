//! Deterministic deep-link construction (§6). Pure functions so the
//! Normalizer and the Telegram formatter can both build and re-check links
//! without duplicating the templates.

use crate::core::types::Marketplace;

/// Builds the per-marketplace deep link for a listing. Returns `None` for
/// MRKT when `hash_32` doesn't match the required 32-hex pattern (§3, §6) —
/// the link is omitted entirely, never rendered as `#`.
pub fn marketplace_link(marketplace: Marketplace, listing_id: &str, hash_32: Option<&str>) -> Option<String> {
    match marketplace {
        Marketplace::Portals => Some(format!(
            "https://t.me/portals/market?startapp=gift_{listing_id}"
        )),
        Marketplace::Tonnel => Some(format!(
            "https://t.me/tonnel_network_bot/gift?startapp={listing_id}"
        )),
        Marketplace::Mrkt => {
            let hash = hash_32?;
            if crate::adapters::common::is_hash32(hash) {
                Some(format!("https://t.me/mrkt/app?startapp={hash}"))
            } else {
                None
            }
        }
        Marketplace::Getgems => Some(format!("https://getgems.io/nft/{listing_id}")),
    }
}

/// Builds the canonical `t.me/nft/{slug}-{number}` link. `None` when the
/// gift number is the `N/A` sentinel or otherwise absent.
pub fn nft_link(collection_name: &str, gift_number: &str) -> Option<String> {
    if gift_number.is_empty() || gift_number == crate::core::types::NOT_AVAILABLE {
        return None;
    }
    let slug = slugify(collection_name);
    if slug.is_empty() {
        return None;
    }
    Some(format!("https://t.me/nft/{slug}-{gift_number}"))
}

/// Removes everything but alphanumerics and hyphens (§6).
pub fn slugify(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portals_link_is_deterministic() {
        assert_eq!(
            marketplace_link(Marketplace::Portals, "abc", None),
            Some("https://t.me/portals/market?startapp=gift_abc".to_string())
        );
    }

    #[test]
    fn mrkt_link_omitted_without_valid_hash() {
        assert_eq!(marketplace_link(Marketplace::Mrkt, "x", None), None);
        assert_eq!(
            marketplace_link(Marketplace::Mrkt, "x", Some("not-a-hash")),
            None
        );
    }

    #[test]
    fn mrkt_link_present_with_valid_hash() {
        let hash = "0123456789abcdef0123456789abcdef";
        assert_eq!(
            marketplace_link(Marketplace::Mrkt, "x", Some(hash)),
            Some(format!("https://t.me/mrkt/app?startapp={hash}"))
        );
    }

    #[test]
    fn nft_link_slugifies_collection_name() {
        assert_eq!(
            nft_link("Plush Pepe", "37"),
            Some("https://t.me/nft/PlushPepe-37".to_string())
        );
    }

    #[test]
    fn nft_link_omitted_for_na_gift_number() {
        assert_eq!(nft_link("Plush Pepe", "N/A"), None);
        assert_eq!(nft_link("Plush Pepe", ""), None);
    }
}
