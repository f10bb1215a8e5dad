//! End-to-end funnel state: accumulate selections the way the callback
//! handlers do, then build the catalog query from the session snapshot.

use carwatch::marketplace::encar::{build_catalog_url, normalize_model_name, Facet};
use carwatch::poller::SeenListings;
use carwatch::session::{FacetChoice, Marketplace, SessionStore};
use carwatch::translation::translate;
use carwatch::years::infer_year_range;

const USER: u64 = 777;

/// Walk a full Encar selection sequence through the store and check the
/// resulting query is complete and renders the expected catalog URL.
#[tokio::test]
async fn encar_funnel_builds_catalog_url_from_session() {
    let store = SessionStore::new();

    store
        .update(USER, |q| {
            q.marketplace = Some(Marketplace::Encar);
            q.manufacturer = Some(FacetChoice::new("Hyundai", "현대"));
        })
        .await;
    store
        .update(USER, |q| q.model_group = Some(FacetChoice::new("Grandeur", "그랜저")))
        .await;

    // Generation step: years come from the facet, not from chat text.
    let generation = Facet {
        display_value: "그랜저 IG".to_string(),
        eng_name: "Grandeur IG (01.2016 — 12.2022)".to_string(),
        model_start_date: Some("201611".to_string()),
        model_end_date: Some("202212".to_string()),
    };
    let years = infer_year_range(&generation.generation_info(), 2025);
    store
        .update(USER, |q| {
            q.model = Some(FacetChoice::new(
                "Grandeur IG",
                normalize_model_name("그랜저 IG (IG)"),
            ));
            q.generation_years = Some((years.from, years.to));
            q.year_from = Some(years.from);
            q.year_to = Some(years.to);
        })
        .await;
    store
        .update(USER, |q| {
            q.trim = Some(FacetChoice::new("Premium", "프리미엄"));
            q.price_to = Some(30_000_000);
            q.mileage_from = Some(0);
            q.mileage_to = Some(100_000);
            q.color = Some("검정색".to_string());
        })
        .await;

    let query = store.get_or_create(USER).await;
    assert!(query.is_complete_for_encar());

    let url = build_catalog_url(&query).expect("complete query builds a URL");
    // Months are never selected in the funnel, so the year tokens use the
    // "any month" encoding on both ends.
    assert!(url.contains("Year.range(201600..202212)"));
    assert!(url.contains("Mileage.range(0..100000)"));
    assert!(url.contains("_.Price.range(..3000)"));
    assert!(url.contains(&format!(
        "Model.{}",
        urlencoding::encode("그랜저 IG(IG_)")
    )));
    assert!(url.contains(&format!("Color.{}", urlencoding::encode("검정색"))));
}

#[tokio::test]
async fn clearing_the_session_makes_the_query_incomplete() {
    let store = SessionStore::new();
    store
        .update(USER, |q| {
            q.manufacturer = Some(FacetChoice::new("Hyundai", "현대"));
            q.model_group = Some(FacetChoice::new("Grandeur", "그랜저"));
            q.model = Some(FacetChoice::new("", "그랜저 IG(IG_)"));
            q.trim = Some(FacetChoice::new("", "프리미엄"));
            q.year_from = Some(2018);
            q.year_to = Some(2022);
        })
        .await;
    assert!(store.get_or_create(USER).await.is_complete_for_encar());

    store.clear(USER).await;
    let fresh = store.get_or_create(USER).await;
    assert!(!fresh.is_complete_for_encar());
    assert!(build_catalog_url(&fresh).is_none());
}

#[test]
fn notification_names_are_translated() {
    assert_eq!(translate("현대"), "Хёндэ");
    assert_eq!(translate("그랜저"), "Грандёр");
    // Unknown tokens pass through untouched.
    assert_eq!(translate("수수께끼"), "수수께끼");
}

/// The seen-set dedupes across concurrent pollers: only the first insert of
/// an id wins, so a listing is announced at most once per process.
#[tokio::test]
async fn seen_set_admits_each_listing_once_across_tasks() {
    use std::sync::Arc;

    let seen = Arc::new(SeenListings::default());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let seen = Arc::clone(&seen);
        handles.push(tokio::spawn(async move {
            let mut admitted = 0;
            for id in 0..100i64 {
                if seen.insert_if_new(id).await {
                    admitted += 1;
                }
            }
            admitted
        }));
    }

    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap();
    }
    assert_eq!(total, 100);
}
