//! Telegram HTML message formatting (§6). One pure function builds the
//! message body and the inline keyboard from a Listing + Enrichment; no I/O.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core::types::{Enrichment, Listing, NOT_AVAILABLE};

/// A rendered message ready for the Telegram send gateway.
pub struct FormattedMessage {
    pub html: String,
    pub button_label: String,
    pub button_url: String,
}

/// Builds the full HTML message body and inline-keyboard button for one
/// Listing (§6). Missing optional fields remove their entire line.
/// `display_price` is the already fee-adjusted price (§4.1) — this function
/// never re-derives fees, it only renders what it's given.
pub fn format_message(
    listing: &Listing,
    enrichment: &Enrichment,
    display_price: Decimal,
    now: DateTime<Utc>,
) -> FormattedMessage {
    let mut lines = Vec::new();
    lines.push("✔️ ЛИСТИНГ".to_string());

    let title = format!("{} #{}", escape_html(&listing.collection_name), escape_html(&listing.gift_number));
    let title = match &listing.nft_link {
        Some(nft_url) => format!("<a href='{}'>{}</a>", nft_url, title),
        None => title,
    };
    let marketplace_name = listing.marketplace.display_name();
    let marketplace_segment = match &listing.marketplace_link {
        Some(mp_url) => format!("<a href='{}'>{}</a>", mp_url, marketplace_name),
        None => marketplace_name.to_string(),
    };
    lines.push(format!(
        "{} на {} за {} TON",
        title,
        marketplace_segment,
        format_price(display_price)
    ));

    if listing.model_name != NOT_AVAILABLE {
        lines.push(format!("Модель: {}", escape_html(&listing.model_name)));
    }

    if let Some(gift_floor) = enrichment.gift_floor {
        lines.push(format!("Флор гифта: {} TON", format_price(gift_floor)));
    }
    if let Some(model_floor) = enrichment.model_floor {
        lines.push(format!("Флор модели: {} TON", format_price(model_floor)));
    }

    if !enrichment.recent_sales.is_empty() {
        lines.push("<blockquote>".to_string());
        for sale in &enrichment.recent_sales {
            lines.push(format!(
                "#{} за {} TON на {} — {}",
                escape_html(&sale.gift_number),
                format_price(sale.price_ton),
                sale.marketplace.display_name(),
                relative_date(sale.sold_at, now),
            ));
        }
        lines.push("</blockquote>".to_string());
    }

    let button_url = listing
        .marketplace_link
        .clone()
        .or_else(|| listing.nft_link.clone())
        .unwrap_or_default();

    FormattedMessage {
        html: lines.join("\n"),
        button_label: format!("🔗 Открыть на {marketplace_name}"),
        button_url,
    }
}

fn format_price(price: Decimal) -> String {
    format!("{:.2}", price)
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Russian relative-date labels (§6), falling back to `DD.MM.YYYY` past 7 days.
fn relative_date(sold_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now.signed_duration_since(sold_at);
    let minutes = delta.num_minutes();
    let hours = delta.num_hours();
    let days = delta.num_days();

    if minutes < 1 {
        "только что".to_string()
    } else if minutes < 60 {
        format!("{} {} назад", minutes, minutes_word(minutes))
    } else if hours < 24 {
        if days_is_today(sold_at, now) {
            format!("{} {} назад", hours, hours_word(hours))
        } else {
            format!("{} {} назад", hours, hours_word(hours))
        }
    } else if days == 0 {
        "сегодня".to_string()
    } else if days <= 7 {
        format!("{} {} назад", days, days_word(days))
    } else {
        sold_at.format("%d.%m.%Y").to_string()
    }
}

fn days_is_today(sold_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    sold_at.date_naive() == now.date_naive()
}

fn minutes_word(n: i64) -> &'static str {
    if n == 1 {
        "минуту"
    } else {
        "минут"
    }
}

fn hours_word(n: i64) -> &'static str {
    if n == 1 {
        "час"
    } else {
        "часов"
    }
}

fn days_word(n: i64) -> &'static str {
    if n == 1 {
        "день"
    } else {
        "дней"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Enrichment, Marketplace, SaleRecord};
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn base_listing() -> Listing {
        Listing {
            marketplace: Marketplace::Portals,
            listing_id: "1".into(),
            collection_name: "Plush Pepe".into(),
            model_name: "Grumpy".into(),
            backdrop_name: None,
            gift_number: "37".into(),
            price_ton: Decimal::new(3750, 2),
            model_rarity: None,
            photo_url: None,
            hash_32: None,
            marketplace_link: Some("https://t.me/portals/market?startapp=gift_1".to_string()),
            nft_link: Some("https://t.me/nft/PlushPepe-37".to_string()),
        }
    }

    #[test]
    fn renders_required_lines_and_omits_missing_floors() {
        let listing = base_listing();
        let enrichment = Enrichment::default();
        let msg = format_message(&listing, &enrichment, listing.price_ton, Utc::now());
        assert!(msg.html.contains("ЛИСТИНГ"));
        assert!(msg.html.contains("Модель: Grumpy"));
        assert!(!msg.html.contains("Флор гифта"));
        assert!(!msg.html.contains("Флор модели"));
        assert!(!msg.html.contains("<blockquote>"));
        assert_eq!(msg.button_label, "🔗 Открыть на Portals");
    }

    #[test]
    fn includes_floors_when_present() {
        let listing = base_listing();
        let enrichment = Enrichment {
            gift_floor: Some(Decimal::from(5)),
            model_floor: Some(Decimal::from(8)),
            recent_sales: vec![],
        };
        let msg = format_message(&listing, &enrichment, listing.price_ton, Utc::now());
        assert!(msg.html.contains("Флор гифта: 5.00 TON"));
        assert!(msg.html.contains("Флор модели: 8.00 TON"));
    }

    #[test]
    fn renders_blockquote_only_when_sales_present() {
        let listing = base_listing();
        let now = Utc::now();
        let enrichment = Enrichment {
            gift_floor: None,
            model_floor: None,
            recent_sales: vec![SaleRecord {
                marketplace: Marketplace::Tonnel,
                gift_number: "12".into(),
                price_ton: Decimal::from(9),
                sold_at: now - Duration::minutes(30),
            }],
        };
        let msg = format_message(&listing, &enrichment, listing.price_ton, now);
        assert!(msg.html.contains("<blockquote>"));
        assert!(msg.html.contains("30 минут назад"));
    }

    #[test]
    fn relative_date_labels_match_expected_bucket() {
        let now = Utc::now();
        assert_eq!(relative_date(now, now), "только что");
        assert_eq!(relative_date(now - Duration::minutes(1), now), "1 минуту назад");
        assert_eq!(relative_date(now - Duration::minutes(5), now), "5 минут назад");
        assert_eq!(relative_date(now - Duration::hours(1), now), "1 час назад");
        assert_eq!(relative_date(now - Duration::hours(3), now), "3 часов назад");
        assert_eq!(relative_date(now - Duration::days(3), now), "3 дней назад");
        assert_eq!(
            relative_date(now - Duration::days(10), now),
            (now - Duration::days(10)).format("%d.%m.%Y").to_string()
        );
    }

    #[test]
    fn model_line_omitted_when_model_is_not_available() {
        let mut listing = base_listing();
        listing.model_name = NOT_AVAILABLE.to_string();
        let msg = format_message(&listing, &Enrichment::default(), listing.price_ton, Utc::now());
        assert!(!msg.html.contains("Модель:"));
    }
}
