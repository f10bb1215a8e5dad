//! KCar: JSON-POST facet endpoints plus an HTML listing page.
//!
//! Facets come back with an availability count; entries with zero stock are
//! dropped so the funnel never offers a dead end. The listing search is a
//! plain page fetch whose filter travels as a URL-encoded JSON blob in the
//! `searchCond` query parameter.

use anyhow::{bail, Context, Result};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const API_URL: &str = "https://api.kcar.com/bc/search/group";
const SITE_URL: &str = "https://www.kcar.com";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manufacturer {
    #[serde(rename = "mnuftrCd", default)]
    pub code: String,
    #[serde(rename = "mnuftrNm", default)]
    pub name: String,
    #[serde(rename = "mnuftrEnm", default)]
    pub english_name: String,
    #[serde(default)]
    pub count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelGroup {
    #[serde(rename = "modelGrpCd", default)]
    pub code: String,
    #[serde(rename = "modelGrpNm", default)]
    pub name: String,
    #[serde(default)]
    pub count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Model {
    #[serde(rename = "modelCd", default)]
    pub code: String,
    #[serde(rename = "modelNm", default)]
    pub name: String,
    #[serde(default)]
    pub count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Grade {
    #[serde(rename = "grdCd", default)]
    pub code: String,
    #[serde(rename = "grdNm", default)]
    pub name: String,
    #[serde(default)]
    pub count: i64,
}

/// One scraped listing card.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapedListing {
    pub title: String,
    pub price: String,
    pub year: String,
    pub mileage: String,
    pub fuel_type: String,
    pub location: String,
    pub description: String,
    /// Badges on the card: free delivery, 360 view, special options.
    pub labels: Vec<String>,
    pub link: String,
    pub image_url: String,
}

/// Filters for the listing search; `None` leaves a dimension open.
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    pub manufacturer_code: String,
    pub model_group_code: String,
    pub model_code: String,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub mileage_from: Option<u32>,
    pub mileage_to: Option<u32>,
    /// Korean color name as the site spells it.
    pub color: Option<String>,
}

/// Facet endpoint envelope; `data` may be absent entirely.
#[derive(Debug, Default, Deserialize)]
struct FacetResponse<T: Default> {
    #[serde(default)]
    data: Vec<T>,
}

pub struct KcarClient {
    client: reqwest::Client,
}

impl KcarClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// All manufacturers, sorted by English name.
    pub async fn manufacturers(&self) -> Vec<Manufacturer> {
        let payload = json!({
            "wr_eq_sell_dcd": "ALL",
            "wr_in_multi_columns": "cntr_rgn_cd|cntr_cd",
        });
        let mut items: Vec<Manufacturer> = self.post_facet("mnuftr", &payload).await;
        items.sort_by(|a, b| a.english_name.cmp(&b.english_name));
        items
    }

    /// Model groups with at least one car in stock, sorted by name.
    pub async fn model_groups(&self, manufacturer_code: &str) -> Vec<ModelGroup> {
        let payload = json!({
            "wr_eq_sell_dcd": "ALL",
            "wr_in_multi_columns": "cntr_rgn_cd|cntr_cd",
            "wr_eq_mnuftr_cd": manufacturer_code,
        });
        let mut items: Vec<ModelGroup> = self.post_facet("modelGrp", &payload).await;
        items.retain(|m| m.count > 0);
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items
    }

    /// Generations with stock, most available first.
    pub async fn models(&self, manufacturer_code: &str, model_group_code: &str) -> Vec<Model> {
        let payload = json!({
            "wr_eq_sell_dcd": "ALL",
            "wr_in_multi_columns": "cntr_rgn_cd|cntr_cd",
            "wr_eq_mnuftr_cd": manufacturer_code,
            "wr_eq_model_grp_cd": model_group_code,
        });
        let mut items: Vec<Model> = self.post_facet("model", &payload).await;
        items.retain(|m| m.count > 0);
        items.sort_by(|a, b| b.count.cmp(&a.count));
        items
    }

    /// Trim grades with stock, most available first.
    pub async fn grades(
        &self,
        manufacturer_code: &str,
        model_group_code: &str,
        model_code: &str,
    ) -> Vec<Grade> {
        let payload = json!({
            "wr_eq_sell_dcd": "ALL",
            "wr_in_multi_columns": "cntr_rgn_cd|cntr_cd",
            "wr_eq_mnuftr_cd": manufacturer_code,
            "wr_eq_model_grp_cd": model_group_code,
            "wr_eq_model_cd": model_code,
        });
        let mut items: Vec<Grade> = self.post_facet("grd", &payload).await;
        items.retain(|g| g.count > 0);
        items.sort_by(|a, b| b.count.cmp(&a.count));
        items
    }

    /// Fetch the listing page for the filter and scrape up to 5 cards.
    pub async fn search(&self, filter: &ListingFilter) -> Result<Vec<ScrapedListing>> {
        let url = search_page_url(filter);
        debug!(%url, "KCar listing search");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            bail!("listing page returned {}", response.status());
        }
        let html = response.text().await?;
        Ok(scrape_listings(&html))
    }

    async fn post_facet<T: for<'de> Deserialize<'de> + Default>(
        &self,
        group: &str,
        payload: &serde_json::Value,
    ) -> Vec<T> {
        let url = format!("{API_URL}/{group}");
        let result: Result<FacetResponse<T>> = async {
            let response = self.client.post(&url).json(payload).send().await?;
            if !response.status().is_success() {
                bail!("facet endpoint returned {}", response.status());
            }
            response.json().await.context("decoding facet response")
        }
        .await;

        match result {
            Ok(data) => data.data,
            Err(e) => {
                debug!(group, error = %e, "Failed to load KCar facet");
                Vec::new()
            }
        }
    }
}

/// Build the search page URL. The filter is serialized to JSON and
/// URL-encoded wholesale, as the site's own frontend does.
pub fn search_page_url(filter: &ListingFilter) -> String {
    let mut cond = serde_json::Map::new();
    cond.insert(
        "wr_eq_mnuftr_cd".into(),
        filter.manufacturer_code.clone().into(),
    );
    cond.insert(
        "wr_eq_model_grp_cd".into(),
        filter.model_group_code.clone().into(),
    );
    cond.insert("wr_eq_model_cd".into(), filter.model_code.clone().into());
    if let (Some(from), Some(to)) = (filter.year_from, filter.year_to) {
        cond.insert("wr_bt_prdcn_year".into(), format!("{from},{to}").into());
    }
    if let (Some(from), Some(to)) = (filter.mileage_from, filter.mileage_to) {
        cond.insert("wr_bt_accent_km".into(), format!("{from},{to}").into());
    }
    if let Some(color) = filter.color.as_deref().filter(|c| !c.is_empty()) {
        cond.insert("wr_eq_extl_color_nm".into(), color.into());
    }

    let cond_json = serde_json::Value::Object(cond).to_string();
    format!("{SITE_URL}/bc/search?searchCond={}", urlencoding::encode(&cond_json))
}

/// Extract listing cards from `div.carListWrap div.carListBox` blocks.
fn scrape_listings(html: &str) -> Vec<ScrapedListing> {
    let document = Html::parse_document(html);
    let box_sel = Selector::parse("div.carListWrap div.carListBox").unwrap();
    let name_sel = Selector::parse("div.carName p.carTit a").unwrap();
    let price_sel = Selector::parse("div.carExpIn p.carExp").unwrap();
    let details_sel = Selector::parse("p.detailCarCon span").unwrap();
    let img_sel = Selector::parse("div.carListImg a img").unwrap();
    let desc_sel = Selector::parse("div.carSimcDesc").unwrap();
    let delivery_sel = Selector::parse("span.stateDlvy").unwrap();
    let view360_sel = Selector::parse("span.car360Img").unwrap();
    let options_sel = Selector::parse("ul.infoTooltip li button").unwrap();

    let mut results = Vec::new();
    for card in document.select(&box_sel).take(5) {
        let name_el = card.select(&name_sel).next();
        let title = name_el
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        let link = name_el
            .and_then(|el| el.value().attr("href"))
            .map(absolute_url)
            .unwrap_or_default();

        let price = card
            .select(&price_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let details: Vec<String> = card
            .select(&details_sel)
            .map(|s| s.text().collect::<String>().trim().to_string())
            .collect();

        let image_url = card
            .select(&img_sel)
            .next()
            .and_then(|el| el.value().attr("src"))
            .map(absolute_url)
            .unwrap_or_default();

        let description = card
            .select(&desc_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let mut labels = Vec::new();
        if card.select(&delivery_sel).next().is_some() {
            labels.push("무료배송".to_string());
        }
        if card.select(&view360_sel).next().is_some() {
            labels.push("360°".to_string());
        }
        for option in card.select(&options_sel) {
            let text = option.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                labels.push(text);
            }
        }

        results.push(ScrapedListing {
            title,
            price,
            year: details.first().cloned().unwrap_or_default(),
            mileage: details.get(1).cloned().unwrap_or_default(),
            fuel_type: details.get(2).cloned().unwrap_or_default(),
            location: details.get(3).cloned().unwrap_or_default(),
            description,
            labels,
            link,
            image_url,
        });
    }
    results
}

fn absolute_url(path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("{SITE_URL}{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facet_envelope_decodes_with_and_without_data() {
        let r: FacetResponse<Grade> = serde_json::from_str(
            r#"{"data":[{"grdCd":"G001","grdNm":"프리미엄","count":3}]}"#,
        )
        .unwrap();
        assert_eq!(r.data.len(), 1);
        assert_eq!(r.data[0].code, "G001");
        assert_eq!(r.data[0].count, 3);

        let empty: FacetResponse<Manufacturer> = serde_json::from_str("{}").unwrap();
        assert!(empty.data.is_empty());
    }

    #[test]
    fn listing_url_encodes_filter_as_json() {
        let filter = ListingFilter {
            manufacturer_code: "101".into(),
            model_group_code: "G030".into(),
            model_code: "M123".into(),
            year_from: Some(2019),
            year_to: Some(2024),
            mileage_from: Some(0),
            mileage_to: Some(60000),
            color: Some("검정색".into()),
        };
        let url = search_page_url(&filter);
        assert!(url.starts_with("https://www.kcar.com/bc/search?searchCond=%7B"));
        assert!(url.contains("wr_eq_mnuftr_cd"));
        assert!(url.contains("wr_bt_prdcn_year"));
        assert!(url.contains("2019%2C2024"));
        assert!(url.contains("wr_bt_accent_km"));
        assert!(url.contains("0%2C60000"));
        assert!(url.contains("wr_eq_extl_color_nm"));
        // Raw JSON punctuation must not leak into the query string.
        assert!(!url.contains('{'));
        assert!(!url.contains('"'));
    }

    #[test]
    fn listing_url_skips_open_dimensions() {
        let filter = ListingFilter {
            manufacturer_code: "101".into(),
            model_group_code: "G030".into(),
            model_code: "M123".into(),
            ..Default::default()
        };
        let url = search_page_url(&filter);
        assert!(!url.contains("wr_bt_prdcn_year"));
        assert!(!url.contains("wr_bt_accent_km"));
        assert!(!url.contains("wr_eq_extl_color_nm"));
    }

    #[test]
    fn scrape_extracts_cards() {
        let html = r#"
            <div class="carListWrap">
              <div class="carListBox">
                <div class="carListImg"><a><img src="/upload/car/1.jpg"/></a></div>
                <div class="carName"><p class="carTit">
                  <a href="/bc/detail/12345">더 뉴 그랜저 2.5 가솔린</a>
                </p></div>
                <div class="carExpIn"><p class="carExp">2,890만원</p></div>
                <p class="detailCarCon">
                  <span>21년03월</span><span>35,000km</span>
                  <span>가솔린</span><span>서울</span>
                </p>
                <div class="carSimcDesc">무사고 차량</div>
                <span class="stateDlvy"></span>
                <ul class="infoTooltip"><li><button>선루프</button></li></ul>
              </div>
            </div>"#;
        let listings = scrape_listings(html);
        assert_eq!(listings.len(), 1);
        let car = &listings[0];
        assert_eq!(car.title, "더 뉴 그랜저 2.5 가솔린");
        assert_eq!(car.link, "https://www.kcar.com/bc/detail/12345");
        assert_eq!(car.price, "2,890만원");
        assert_eq!(car.year, "21년03월");
        assert_eq!(car.mileage, "35,000km");
        assert_eq!(car.fuel_type, "가솔린");
        assert_eq!(car.location, "서울");
        assert_eq!(car.description, "무사고 차량");
        assert_eq!(car.image_url, "https://www.kcar.com/upload/car/1.jpg");
        assert_eq!(car.labels, vec!["무료배송", "선루프"]);
    }

    #[test]
    fn scrape_tolerates_unexpected_layout() {
        assert!(scrape_listings("<html><body></body></html>").is_empty());
    }
}
