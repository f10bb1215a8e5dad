//! Background polling of the Encar catalog.
//!
//! Each completed search spawns a poller task that re-runs the catalog
//! query every five minutes and pushes a notification for every listing id
//! it has not reported before. The seen-set is shared across all pollers,
//! so two overlapping searches never announce the same car twice.
//!
//! Starting a new search cancels the user's previous poller through the
//! registry; cancellation is checked both between cycles and while
//! sleeping, so shutdown is prompt.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bot::ui_builder;
use crate::marketplace::encar::{build_catalog_url, EncarClient, Listing};
use crate::session::SearchQuery;
use crate::translation::translate;

const POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Listing ids already reported, shared by every poller.
#[derive(Default)]
pub struct SeenListings {
    ids: Mutex<HashSet<i64>>,
}

impl SeenListings {
    /// Record the id. Returns `true` only the first time it is seen.
    pub async fn insert_if_new(&self, id: i64) -> bool {
        self.ids.lock().await.insert(id)
    }
}

/// One cancellation token per user; registering a new poller cancels the
/// previous one.
#[derive(Default)]
pub struct PollerRegistry {
    tokens: Mutex<HashMap<u64, CancellationToken>>,
}

impl PollerRegistry {
    pub async fn register(&self, user_id: u64) -> CancellationToken {
        let token = CancellationToken::new();
        let mut tokens = self.tokens.lock().await;
        if let Some(previous) = tokens.insert(user_id, token.clone()) {
            debug!(user_id, "Cancelling previous poller");
            previous.cancel();
        }
        token
    }

    pub async fn cancel(&self, user_id: u64) {
        if let Some(token) = self.tokens.lock().await.remove(&user_id) {
            token.cancel();
        }
    }
}

/// Run the polling loop until cancelled. Never returns an error: every
/// failure is logged and retried on the next cycle.
pub async fn run(
    bot: Bot,
    chat_id: ChatId,
    query: SearchQuery,
    encar: Arc<EncarClient>,
    seen: Arc<SeenListings>,
    token: CancellationToken,
) {
    let Some(url) = build_catalog_url(&query) else {
        warn!(%chat_id, "Poller started with an incomplete search, not polling");
        return;
    };
    info!(%chat_id, "Poller started");

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = poll_once(&bot, chat_id, &url, &encar, &seen) => {}
        }
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
    info!(%chat_id, "Poller stopped");
}

async fn poll_once(
    bot: &Bot,
    chat_id: ChatId,
    url: &str,
    encar: &EncarClient,
    seen: &SeenListings,
) {
    let listings = match encar.search(url).await {
        Ok(listings) => listings,
        Err(e) => {
            warn!(%chat_id, error = %e, "Catalog poll failed, retrying next cycle");
            return;
        }
    };

    for listing in listings {
        if !seen.insert_if_new(listing.id).await {
            continue;
        }
        let spec = encar.detail(listing.id).await;
        let text = notification_text(&listing, spec.as_ref());
        let send = bot
            .send_message(chat_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(ui_builder::after_results_keyboard())
            .await;
        if let Err(e) = send {
            warn!(%chat_id, listing_id = listing.id, error = %e, "Failed to send notification");
        }
    }
}

/// Render the notification. Detail specs enrich the message; when the
/// detail fetch failed the message says so instead of omitting it silently.
fn notification_text(listing: &Listing, spec: Option<&crate::marketplace::encar::VehicleSpec>) -> String {
    let name = translate(&format!(
        "{} {} {}",
        listing.manufacturer, listing.model, listing.badge
    ));
    let price_won = (listing.price * 10_000.0) as i64;

    let mut text = format!(
        "✅ Новое поступление по вашему запросу!\n\n<b>{}</b> {} г.\nПробег: {} км\nЦена: ₩{}",
        name,
        listing.form_year_text(),
        ui_builder::format_grouped(listing.mileage as i64),
        ui_builder::format_grouped(price_won),
    );

    match spec {
        Some(spec) => {
            let displacement = spec
                .displacement
                .map(|d| format!("{d}cc"))
                .unwrap_or_else(|| "Не указано".to_string());
            let options: Vec<String> = spec.options.iter().take(5).map(|o| translate(o)).collect();
            text.push_str(&format!(
                "\n⛽ Топливо: {}\n🔄 Трансмиссия: {}\n🏎️ Объём двигателя: {}",
                translate(&spec.fuel_type),
                translate(&spec.transmission),
                displacement,
            ));
            if !options.is_empty() {
                text.push_str(&format!("\n🔧 Опции: {}", options.join(", ")));
            }
            text.push_str(&format!(
                "\n\n👉 <a href='{}'>Ссылка на автомобиль</a>",
                listing.detail_page_url()
            ));
        }
        None => text.push_str("\nℹ️ Не удалось получить подробности о машине."),
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::encar::VehicleSpec;
    use serde_json::json;

    fn listing() -> Listing {
        serde_json::from_value(json!({
            "Id": 38905401,
            "Manufacturer": "현대",
            "Model": "그랜저 IG",
            "Badge": "2.4 프리미엄",
            "Price": 2350.0,
            "Mileage": 41230.0,
            "FormYear": "2019"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn seen_set_reports_each_id_once() {
        let seen = SeenListings::default();
        assert!(seen.insert_if_new(1).await);
        assert!(!seen.insert_if_new(1).await);
        assert!(seen.insert_if_new(2).await);
    }

    #[tokio::test]
    async fn registering_again_cancels_previous_poller() {
        let registry = PollerRegistry::default();
        let first = registry.register(7).await;
        assert!(!first.is_cancelled());
        let second = registry.register(7).await;
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_is_a_noop_for_unknown_users() {
        let registry = PollerRegistry::default();
        registry.cancel(404).await;
        let token = registry.register(7).await;
        registry.cancel(7).await;
        assert!(token.is_cancelled());
    }

    #[test]
    fn notification_includes_specs_when_available() {
        let spec = VehicleSpec {
            displacement: Some(2359),
            fuel_type: "가솔린".to_string(),
            transmission: "오토".to_string(),
            options: vec!["선루프".to_string()],
        };
        let text = notification_text(&listing(), Some(&spec));
        assert!(text.contains("Хёндэ"));
        assert!(text.contains("2019 г."));
        assert!(text.contains("Пробег: 41 230 км"));
        assert!(text.contains("₩23 500 000"));
        assert!(text.contains("2359cc"));
        assert!(text.contains("Ссылка на автомобиль"));
        assert!(text.contains("38905401"));
    }

    #[test]
    fn notification_degrades_without_specs() {
        let text = notification_text(&listing(), None);
        assert!(text.contains("Не удалось получить подробности"));
        assert!(!text.contains("Опции"));
    }
}
