//! KbChaChaCha: JSON facet endpoints plus an HTML listing page.
//!
//! Facets select by numeric codes. The listing search has no JSON API; the
//! result page is scraped with CSS selectors, so the extractor is brittle
//! by construction and degrades to an empty list when the layout shifts.

use anyhow::{bail, Context, Result};
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::debug;

const BASE_URL: &str = "https://www.kbchachacha.com/public/search";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Maker {
    #[serde(rename = "makerName", default)]
    pub name: String,
    #[serde(rename = "makerCode", default)]
    pub code: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CarClass {
    #[serde(rename = "className", default)]
    pub name: String,
    #[serde(rename = "classCode", default)]
    pub code: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Generation {
    #[serde(rename = "carName", default)]
    pub name: String,
    #[serde(rename = "carCode", default)]
    pub code: String,
    #[serde(rename = "fromYear", default)]
    pub from_year: String,
    #[serde(rename = "toYear", default)]
    pub to_year: String,
    #[serde(rename = "carOrder", default = "default_order")]
    pub order: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrimModel {
    #[serde(rename = "modelName", default)]
    pub name: String,
    #[serde(rename = "modelCode", default)]
    pub code: String,
    #[serde(rename = "modelOrder", default = "default_order")]
    pub order: i64,
}

fn default_order() -> i64 {
    999
}

impl Generation {
    /// `(2016-2022)` style period for button labels; 현재 renders as "н.в.".
    pub fn period_label(&self) -> String {
        if self.from_year.is_empty() || self.to_year.is_empty() {
            return String::new();
        }
        if self.to_year == "현재" {
            format!("({}-н.в.)", self.from_year)
        } else {
            format!("({}-{})", self.from_year, self.to_year)
        }
    }
}

/// One scraped listing card.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapedListing {
    pub title: String,
    pub year: String,
    pub mileage: String,
    pub region: String,
    /// Price text as shown, in units of 10,000 won.
    pub price: String,
    pub link: String,
    pub image_url: String,
}

/// Filters for the listing search; `None` leaves a dimension open.
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    pub maker_code: String,
    pub class_code: String,
    pub car_code: String,
    pub model_code: String,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub mileage_from: Option<u32>,
    pub mileage_to: Option<u32>,
    pub color_code: Option<String>,
    pub region_code: Option<String>,
}

pub struct KbChaChaChaClient {
    client: reqwest::Client,
}

impl KbChaChaChaClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// All manufacturers, domestic (국산) and imported (수입) merged,
    /// sorted by name.
    pub async fn makers(&self) -> Vec<Maker> {
        #[derive(Default, Deserialize)]
        struct Result_ {
            #[serde(rename = "국산", default)]
            domestic: Vec<Maker>,
            #[serde(rename = "수입", default)]
            imported: Vec<Maker>,
        }
        #[derive(Default, Deserialize)]
        struct Response {
            #[serde(default)]
            result: Result_,
        }

        let url = format!("{BASE_URL}/carMaker.json?page=1&sort=-orderDate");
        match self.get_json::<Response>(&url).await {
            Ok(data) => {
                let mut all = data.result.domestic;
                all.extend(data.result.imported);
                all.sort_by(|a, b| a.name.cmp(&b.name));
                all
            }
            Err(e) => {
                debug!(error = %e, "Failed to load KbChaChaCha makers");
                Vec::new()
            }
        }
    }

    pub async fn classes(&self, maker_code: &str) -> Vec<CarClass> {
        #[derive(Default, Deserialize)]
        struct Result_ {
            #[serde(default)]
            code: Vec<CarClass>,
        }
        #[derive(Default, Deserialize)]
        struct Response {
            #[serde(default)]
            result: Result_,
        }

        let url = format!("{BASE_URL}/carClass.json?makerCode={maker_code}&page=1&sort=-orderDate");
        match self.get_json::<Response>(&url).await {
            Ok(data) => {
                let mut classes = data.result.code;
                classes.sort_by(|a, b| a.name.cmp(&b.name));
                classes
            }
            Err(e) => {
                debug!(maker_code, error = %e, "Failed to load KbChaChaCha classes");
                Vec::new()
            }
        }
    }

    pub async fn generations(&self, maker_code: &str, class_code: &str) -> Vec<Generation> {
        #[derive(Default, Deserialize)]
        struct Result_ {
            #[serde(default)]
            code: Vec<Generation>,
        }
        #[derive(Default, Deserialize)]
        struct Response {
            #[serde(default)]
            result: Result_,
        }

        let url = format!(
            "{BASE_URL}/carName.json?makerCode={maker_code}&page=1&sort=-orderDate&classCode={class_code}"
        );
        match self.get_json::<Response>(&url).await {
            Ok(data) => {
                let mut generations = data.result.code;
                generations.sort_by_key(|g| g.order);
                generations
            }
            Err(e) => {
                debug!(maker_code, class_code, error = %e, "Failed to load KbChaChaCha generations");
                Vec::new()
            }
        }
    }

    pub async fn trims(&self, maker_code: &str, class_code: &str, car_code: &str) -> Vec<TrimModel> {
        #[derive(Default, Deserialize)]
        struct Result_ {
            #[serde(rename = "codeModel", default)]
            code_model: Vec<TrimModel>,
        }
        #[derive(Default, Deserialize)]
        struct Response {
            #[serde(default)]
            result: Result_,
        }

        let url = format!(
            "{BASE_URL}/carModel.json?makerCode={maker_code}&page=1&sort=-orderDate&classCode={class_code}&carCode={car_code}"
        );
        match self.get_json::<Response>(&url).await {
            Ok(data) => {
                let mut trims = data.result.code_model;
                trims.sort_by_key(|t| t.order);
                trims
            }
            Err(e) => {
                debug!(maker_code, class_code, car_code, error = %e, "Failed to load KbChaChaCha trims");
                Vec::new()
            }
        }
    }

    /// Fetch the listing page for the filter and scrape up to 5 cards.
    pub async fn search(&self, filter: &ListingFilter) -> Result<Vec<ScrapedListing>> {
        let url = listing_url(filter);
        debug!(%url, "KbChaChaCha listing search");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            bail!("listing page returned {}", response.status());
        }
        let html = response.text().await?;
        Ok(scrape_listings(&html))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            bail!("facet endpoint returned {}", response.status());
        }
        response.json().await.context("decoding facet response")
    }
}

fn listing_url(filter: &ListingFilter) -> String {
    let mut url = format!(
        "{BASE_URL}/list.empty?makerCode={}&page=1&sort=-orderDate&classCode={}&carCode={}&modelCode={}",
        filter.maker_code, filter.class_code, filter.car_code, filter.model_code
    );
    if let (Some(from), Some(to)) = (filter.year_from, filter.year_to) {
        url.push_str(&format!("&regiDay={from},{to}"));
    }
    if let (Some(from), Some(to)) = (filter.mileage_from, filter.mileage_to) {
        url.push_str(&format!("&km={from},{to}"));
    }
    if let Some(color) = filter.color_code.as_deref().filter(|c| !c.is_empty()) {
        url.push_str(&format!("&color={color}"));
    }
    if let Some(region) = filter.region_code.as_deref().filter(|r| !r.is_empty()) {
        url.push_str(&format!("&sido={region}"));
    }
    url
}

/// Extract listing cards from `div.list-in.type-wd-list div.area` blocks.
fn scrape_listings(html: &str) -> Vec<ScrapedListing> {
    let document = Html::parse_document(html);
    let area_sel = Selector::parse("div.list-in.type-wd-list div.area").unwrap();
    let title_sel = Selector::parse("div.con div.item strong.tit").unwrap();
    let data_line_sel = Selector::parse("div.con div.item div.data-line").unwrap();
    let span_sel = Selector::parse("span").unwrap();
    let price_sel = Selector::parse("div.con div.item div.sort-wrap strong.pay span.price").unwrap();
    let img_sel = Selector::parse("div.thumnail a.item span.item__img img").unwrap();

    let mut results = Vec::new();
    for area in document.select(&area_sel).take(5) {
        let car_seq = area.value().attr("data-car-seq").unwrap_or_default();

        let title = area
            .select(&title_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let details: Vec<String> = area
            .select(&data_line_sel)
            .next()
            .map(|line| {
                line.select(&span_sel)
                    .map(|s| s.text().collect::<String>().trim().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let price = area
            .select(&price_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let image_url = area
            .select(&img_sel)
            .next()
            .and_then(|el| el.value().attr("src"))
            .unwrap_or_default()
            .to_string();

        results.push(ScrapedListing {
            title,
            year: details.first().cloned().unwrap_or_default(),
            mileage: details.get(1).cloned().unwrap_or_default(),
            region: details.get(2).cloned().unwrap_or_default(),
            price,
            link: format!(
                "https://www.kbchachacha.com/public/car/detail.kbc?carSeq={car_seq}"
            ),
            image_url,
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_url_includes_optional_filters() {
        let filter = ListingFilter {
            maker_code: "101".into(),
            class_code: "1101".into(),
            car_code: "2070".into(),
            model_code: "3205".into(),
            year_from: Some(2018),
            year_to: Some(2020),
            mileage_from: Some(0),
            mileage_to: Some(50000),
            color_code: Some("006001".into()),
            region_code: Some("11".into()),
        };
        let url = listing_url(&filter);
        assert!(url.contains("makerCode=101"));
        assert!(url.contains("&regiDay=2018,2020"));
        assert!(url.contains("&km=0,50000"));
        assert!(url.contains("&color=006001"));
        assert!(url.contains("&sido=11"));
    }

    #[test]
    fn listing_url_omits_absent_filters() {
        let filter = ListingFilter {
            maker_code: "101".into(),
            class_code: "1101".into(),
            car_code: "2070".into(),
            model_code: "3205".into(),
            ..Default::default()
        };
        let url = listing_url(&filter);
        assert!(!url.contains("regiDay"));
        assert!(!url.contains("&km="));
        assert!(!url.contains("&color="));
        assert!(!url.contains("&sido="));
    }

    #[test]
    fn period_label_renders_open_end() {
        let gen = Generation {
            from_year: "2016".into(),
            to_year: "현재".into(),
            ..Default::default()
        };
        assert_eq!(gen.period_label(), "(2016-н.в.)");
    }

    #[test]
    fn scrape_extracts_cards() {
        let html = r#"
            <div class="list-in type-wd-list">
              <div class="area" data-car-seq="12345">
                <div class="thumnail"><a class="item"><span class="item__img">
                  <img src="https://img.kbchachacha.com/12345.jpg"/>
                </span></a></div>
                <div class="con"><div class="item">
                  <strong class="tit">그랜저 IG 프리미엄</strong>
                  <div class="data-line">
                    <span>2019년</span><span>4만km</span><span>서울</span>
                  </div>
                  <div class="sort-wrap"><strong class="pay">
                    <span class="price">2,350</span>
                  </strong></div>
                </div></div>
              </div>
            </div>"#;
        let listings = scrape_listings(html);
        assert_eq!(listings.len(), 1);
        let car = &listings[0];
        assert_eq!(car.title, "그랜저 IG 프리미엄");
        assert_eq!(car.year, "2019년");
        assert_eq!(car.mileage, "4만km");
        assert_eq!(car.region, "서울");
        assert_eq!(car.price, "2,350");
        assert!(car.link.ends_with("carSeq=12345"));
        assert_eq!(car.image_url, "https://img.kbchachacha.com/12345.jpg");
    }

    #[test]
    fn scrape_tolerates_unexpected_layout() {
        assert!(scrape_listings("<html><body>nothing here</body></html>").is_empty());
    }
}
