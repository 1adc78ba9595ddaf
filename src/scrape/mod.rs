#[cfg(feature = "headless")]
pub mod headless;

use std::collections::HashSet;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{ScraperConfig, Selectors};
use crate::products::{
    ProductRecord, INVALID_PRODUCT_URL, NOT_AVAILABLE, NO_REVIEWS_FOUND, REVIEW_SEPARATOR,
};

static PRODUCT_ID_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"itm[A-Za-z0-9]+").unwrap());
static TOTAL_REVIEWS_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\d,]+)\s+Reviews").unwrap());

/// One rendered-page browser session. Implementations terminate the
/// underlying browser when dropped, so every exit path releases it.
pub trait PageSession {
    fn navigate(&mut self, url: &str) -> anyhow::Result<()>;

    /// Rendered page markup.
    fn content(&mut self) -> anyhow::Result<String>;

    fn scroll_to_end(&mut self);

    /// Best-effort close of an interstitial/login overlay.
    /// Returns whether a close control was found and activated.
    fn dismiss_overlay(&mut self, selectors: &[String]) -> bool;

    /// Wait for client-side rendering to catch up.
    fn settle(&mut self, delay: Duration);
}

/// Opens fresh sessions. Sessions are never pooled or reused; each
/// extraction call gets its own.
pub trait SessionFactory {
    type Session: PageSession;

    fn open(&self) -> anyhow::Result<Self::Session>;
}

/// Fetch up to `count` distinct review snippets from a product detail page,
/// joined with [`REVIEW_SEPARATOR`].
///
/// URLs that don't start with `http` short-circuit to the no-reviews
/// sentinel without opening a session. Any failure during
/// navigate/scroll/parse degrades to the sentinel as well.
pub fn fetch_top_reviews<F: SessionFactory>(
    factory: &F,
    product_url: &str,
    count: usize,
    config: &ScraperConfig,
) -> String {
    if product_url.trim().is_empty() || !product_url.starts_with("http") {
        log::warn!("not a fetchable product URL: '{product_url}'");
        return NO_REVIEWS_FOUND.to_string();
    }

    let reviews = match fetch_review_texts(factory, product_url, count, config) {
        Ok(reviews) => reviews,
        Err(err) => {
            log::warn!("{product_url}: review fetch failed: {err}");
            vec![]
        }
    };

    if reviews.is_empty() {
        NO_REVIEWS_FOUND.to_string()
    } else {
        reviews.join(REVIEW_SEPARATOR)
    }
}

fn fetch_review_texts<F: SessionFactory>(
    factory: &F,
    product_url: &str,
    count: usize,
    config: &ScraperConfig,
) -> anyhow::Result<Vec<String>> {
    // session (and its browser) is dropped on every return path
    let mut session = factory.open()?;

    session.navigate(product_url)?;
    session.settle(Duration::from_secs(config.settle_secs));

    if !session.dismiss_overlay(&config.selectors.overlay_close) {
        log::debug!("{product_url}: no overlay to dismiss");
    }

    // repeated scroll-to-end to trigger lazy-loaded review content
    for _ in 0..config.scroll_passes {
        session.scroll_to_end();
        session.settle(Duration::from_secs(config.scroll_settle_secs));
    }

    let html = session.content()?;

    Ok(extract_review_texts(
        &html,
        count,
        &config.selectors.review_blocks,
    ))
}

/// Pull up to `count` distinct review texts out of rendered markup.
/// Text is whitespace-collapsed; deduplication is exact and case-sensitive.
pub fn extract_review_texts(html: &str, count: usize, block_selectors: &[String]) -> Vec<String> {
    if count == 0 {
        return vec![];
    }

    let document = scraper::Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut reviews = vec![];

    for selector in block_selectors {
        let selector = match scraper::Selector::parse(selector) {
            Ok(s) => s,
            Err(_) => {
                log::warn!("skipping malformed review selector '{selector}'");
                continue;
            }
        };

        for element in document.select(&selector) {
            let text = collapse_whitespace(element.text());
            if text.is_empty() || !seen.insert(text.clone()) {
                continue;
            }

            reviews.push(text);
            if reviews.len() >= count {
                return reviews;
            }
        }
    }

    reviews
}

/// Search the storefront and extract up to `max_products` records, each with
/// up to `review_count` reviews fetched through a fresh session.
pub fn scrape_products<F: SessionFactory>(
    factory: &F,
    query: &str,
    max_products: usize,
    review_count: usize,
    config: &ScraperConfig,
) -> anyhow::Result<Vec<ProductRecord>> {
    let search_url = format!("{}{}", config.search_url, query.trim().replace(' ', "+"));
    log::info!("searching '{query}' at {search_url}");

    let html = {
        let mut session = factory.open()?;

        session.navigate(&search_url)?;
        session.settle(Duration::from_secs(config.settle_secs));

        if !session.dismiss_overlay(&config.selectors.overlay_close) {
            log::debug!("login overlay not found, continuing");
        }
        session.settle(Duration::from_secs(config.settle_secs));

        session.content()?
        // listing session terminates here; review fetches get their own
    };

    let cards = extract_cards(&html, max_products, &config.selectors);
    log::info!("{} result cards extracted", cards.len());

    let mut records = vec![];
    for card in cards {
        let link = card
            .detail_href
            .as_deref()
            .and_then(|href| resolve_detail_url(href, &config.base_url));

        let product_id = link
            .as_deref()
            .and_then(|link| PRODUCT_ID_REGEX.find(link))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let top_reviews = match link {
            Some(ref link) => fetch_top_reviews(factory, link, review_count, config),
            None => INVALID_PRODUCT_URL.to_string(),
        };

        records.push(ProductRecord {
            product_id,
            product_title: card.title,
            rating: card.rating,
            total_reviews: card.total_reviews,
            price: card.price,
            top_reviews,
        });
    }

    Ok(records)
}

struct CardFields {
    title: String,
    price: String,
    rating: String,
    total_reviews: String,
    detail_href: Option<String>,
}

/// Extract result cards from a search page, up to `max_products`.
/// A card missing a required field is skipped; the rest still go through.
fn extract_cards(html: &str, max_products: usize, selectors: &Selectors) -> Vec<CardFields> {
    let document = scraper::Html::parse_document(html);

    let mut cards = vec![];
    for card_selector in &selectors.product_cards {
        let card_selector = match scraper::Selector::parse(card_selector) {
            Ok(s) => s,
            Err(_) => {
                log::warn!("skipping malformed card selector '{card_selector}'");
                continue;
            }
        };

        let elements: Vec<_> = document.select(&card_selector).collect();
        if elements.is_empty() {
            continue;
        }

        for (pos, element) in elements.iter().enumerate() {
            if cards.len() >= max_products {
                break;
            }

            match extract_card(element, selectors) {
                Ok(card) => cards.push(card),
                Err(missing) => {
                    log::warn!("skipping card #{}: no {missing} element", pos + 1);
                }
            }
        }

        // first card selector with hits wins; the lists overlap on purpose
        break;
    }

    cards
}

fn extract_card(
    element: &scraper::ElementRef,
    selectors: &Selectors,
) -> Result<CardFields, &'static str> {
    let title = select_text(element, &selectors.title).ok_or("title")?;
    let price = select_text(element, &selectors.price).ok_or("price")?;
    let rating = select_text(element, &selectors.rating).ok_or("rating")?;
    let label = select_text(element, &selectors.reviews_label).ok_or("reviews label")?;

    // "8,041 Ratings & 1,234 Reviews" -> "1,234"
    let total_reviews = TOTAL_REVIEWS_REGEX
        .captures(&label)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    Ok(CardFields {
        title,
        price,
        rating,
        total_reviews,
        detail_href: find_detail_href(element),
    })
}

fn select_text(element: &scraper::ElementRef, selectors: &[String]) -> Option<String> {
    for selector in selectors {
        let Ok(selector) = scraper::Selector::parse(selector) else {
            continue;
        };

        if let Some(found) = element.select(&selector).next() {
            return Some(collapse_whitespace(found.text()));
        }
    }

    None
}

/// First anchor in the card pointing at a product detail page.
fn find_detail_href(element: &scraper::ElementRef) -> Option<String> {
    let anchor_selector = scraper::Selector::parse("a[href]").unwrap();

    element
        .select(&anchor_selector)
        .filter_map(|anchor| anchor.value().attr("href"))
        .find(|href| href.contains("/p/"))
        .map(|href| href.to_string())
}

/// Resolve a card href to an absolute URL, prefixing the site origin for
/// relative ones. `None` means the link can't be fetched.
fn resolve_detail_url(href: &str, base_url: &str) -> Option<String> {
    if href.starts_with("http") {
        return Some(href.to_string());
    }

    url::Url::parse(base_url)
        .ok()?
        .join(href)
        .ok()
        .map(|resolved| resolved.to_string())
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selectors() -> Selectors {
        Selectors::default()
    }

    fn review_page(blocks: &[&str]) -> String {
        let blocks: String = blocks
            .iter()
            .map(|text| format!(r#"<div class="t-ZTKy"><div><div>{text}</div></div></div>"#))
            .collect();
        format!("<html><body>{blocks}</body></html>")
    }

    #[test]
    fn test_review_extraction_collapses_whitespace() {
        let html = review_page(&["Great \n   phone,\t loved it"]);
        let reviews = extract_review_texts(&html, 5, &selectors().review_blocks);
        assert_eq!(reviews, vec!["Great phone, loved it"]);
    }

    #[test]
    fn test_review_extraction_dedupes_exact_text() {
        let html = review_page(&["Solid value", "Solid value", "solid value"]);
        let reviews = extract_review_texts(&html, 5, &selectors().review_blocks);
        // case-sensitive: the lowercase variant is a distinct review
        assert_eq!(reviews, vec!["Solid value", "solid value"]);
    }

    #[test]
    fn test_review_extraction_stops_at_count() {
        let html = review_page(&["one", "two", "three"]);
        let reviews = extract_review_texts(&html, 2, &selectors().review_blocks);
        assert_eq!(reviews, vec!["one", "two"]);
    }

    #[test]
    fn test_review_extraction_zero_count() {
        let html = review_page(&["one", "two"]);
        let reviews = extract_review_texts(&html, 0, &selectors().review_blocks);
        assert!(reviews.is_empty());
    }

    #[test]
    fn test_review_extraction_skips_empty_blocks() {
        let html = review_page(&["", "  ", "actual review"]);
        let reviews = extract_review_texts(&html, 5, &selectors().review_blocks);
        assert_eq!(reviews, vec!["actual review"]);
    }

    #[test]
    fn test_total_reviews_pattern() {
        let caps = TOTAL_REVIEWS_REGEX
            .captures("8,041 Ratings & 1,234 Reviews")
            .unwrap();
        assert_eq!(&caps[1], "1,234");

        assert!(TOTAL_REVIEWS_REGEX.captures("8,041 Ratings").is_none());
    }

    #[test]
    fn test_product_id_pattern() {
        let link = "https://www.flipkart.com/apple-iphone-14/p/itmABC123?pid=MOBXYZ";
        assert_eq!(
            PRODUCT_ID_REGEX.find(link).unwrap().as_str(),
            "itmABC123"
        );
    }

    #[test]
    fn test_resolve_relative_href() {
        let resolved = resolve_detail_url("/phone/p/itm42", "https://www.flipkart.com").unwrap();
        assert_eq!(resolved, "https://www.flipkart.com/phone/p/itm42");
    }

    #[test]
    fn test_resolve_absolute_href_unchanged() {
        let href = "https://www.flipkart.com/phone/p/itm42";
        assert_eq!(
            resolve_detail_url(href, "https://www.flipkart.com").unwrap(),
            href
        );
    }

    #[test]
    fn test_malformed_card_skipped_order_preserved() {
        let html = r#"<html><body>
            <div data-id="a">
                <div class="_4rR01T">First</div>
                <div class="_30jeq3">₹100</div>
                <div class="_3LWZlK">4.1</div>
                <span class="_2_R_DZ">10 Reviews</span>
            </div>
            <div data-id="b">
                <div class="_30jeq3">₹200</div>
                <div class="_3LWZlK">4.2</div>
                <span class="_2_R_DZ">20 Reviews</span>
            </div>
            <div data-id="c">
                <div class="_4rR01T">Third</div>
                <div class="_30jeq3">₹300</div>
                <div class="_3LWZlK">4.3</div>
                <span class="_2_R_DZ">30 Reviews</span>
            </div>
        </body></html>"#;

        let cards = extract_cards(html, 10, &selectors());
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].title, "First");
        assert_eq!(cards[1].title, "Third");
    }

    #[test]
    fn test_card_without_detail_anchor() {
        let html = r#"<html><body>
            <div data-id="a">
                <div class="_4rR01T">No link here</div>
                <div class="_30jeq3">₹100</div>
                <div class="_3LWZlK">4.1</div>
                <span class="_2_R_DZ">10 Reviews</span>
                <a href="/offers/seasonal">not a detail link</a>
            </div>
        </body></html>"#;

        let cards = extract_cards(html, 10, &selectors());
        assert_eq!(cards.len(), 1);
        assert!(cards[0].detail_href.is_none());
    }

    #[test]
    fn test_card_limit_respected() {
        let card = |id: usize| {
            format!(
                r#"<div data-id="{id}">
                    <div class="_4rR01T">Product {id}</div>
                    <div class="_30jeq3">₹{id}</div>
                    <div class="_3LWZlK">4.0</div>
                    <span class="_2_R_DZ">{id} Reviews</span>
                </div>"#
            )
        };
        let html = format!(
            "<html><body>{}{}{}</body></html>",
            card(1),
            card(2),
            card(3)
        );

        let cards = extract_cards(&html, 2, &selectors());
        assert_eq!(cards.len(), 2);
    }
}
