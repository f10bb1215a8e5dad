//! Encar: navigation facets, catalog search, vehicle details.
//!
//! The navigation API returns deeply nested positional JSON
//! (`iNav.Nodes[n].Facets[0].Refinements.Nodes[0].Facets`); any reshuffling
//! upstream silently yields an empty facet list, which the funnel surfaces
//! as "could not load" rather than a hard error.
//!
//! The catalog API takes a parenthesized `(And. … )` filter expression in
//! the query string. The grammar is undocumented and was reverse-engineered;
//! its structural characters must stay unescaped (see [`build_catalog_url`]).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::session::SearchQuery;
use crate::years::GenerationInfo;

const NAV_URL: &str = "https://encar-proxy.habsida.net/api/nav";
const CATALOG_URL: &str = "https://encar-proxy.habsida.net/api/catalog";
const DETAIL_URL: &str = "https://api.encar.com/v1/readside/vehicle";

/// Percent-encoded 일반 ("regular sale").
const SELL_TYPE_ENCODED: &str = "%EC%9D%BC%EB%B0%98";

/// One selectable facet: native display value plus English metadata and,
/// for generations, the production date fields.
#[derive(Debug, Clone, Default)]
pub struct Facet {
    pub display_value: String,
    pub eng_name: String,
    pub model_start_date: Option<String>,
    pub model_end_date: Option<String>,
}

impl Facet {
    pub fn generation_info(&self) -> GenerationInfo {
        GenerationInfo {
            start_raw: self.model_start_date.clone(),
            end_raw: self.model_end_date.clone(),
            label: self.eng_name.clone(),
            display: self.display_value.clone(),
        }
    }
}

/// One catalog search result. Price is in units of 10,000 won.
#[derive(Debug, Clone, Deserialize)]
pub struct Listing {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(rename = "Manufacturer", default)]
    pub manufacturer: String,
    #[serde(rename = "Model", default)]
    pub model: String,
    #[serde(rename = "Badge", default)]
    pub badge: String,
    #[serde(rename = "Price", default)]
    pub price: f64,
    #[serde(rename = "Mileage", default)]
    pub mileage: f64,
    #[serde(rename = "FormYear", default)]
    pub form_year: Value,
}

impl Listing {
    pub fn form_year_text(&self) -> String {
        match &self.form_year {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        }
    }

    pub fn detail_page_url(&self) -> String {
        format!("https://fem.encar.com/cars/detail/{}", self.id)
    }
}

#[derive(Debug, Default, Deserialize)]
struct CatalogResponse {
    #[serde(rename = "SearchResults", default)]
    search_results: Vec<Listing>,
}

/// Specs from the detail endpoint, used to enrich notifications.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSpec {
    #[serde(default)]
    pub displacement: Option<i64>,
    #[serde(default)]
    pub fuel_type: String,
    #[serde(default)]
    pub transmission: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DetailResponse {
    #[serde(default)]
    spec: VehicleSpec,
}

pub struct EncarClient {
    client: reqwest::Client,
}

impl EncarClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn manufacturers(&self) -> Vec<Facet> {
        let q = format!("(And.Hidden.N._.CarType.A._.SellType.{SELL_TYPE_ENCODED}.)");
        match self.nav(&q).await {
            Ok(data) => top_facets(&data, 1).unwrap_or_default(),
            Err(e) => {
                debug!(error = %e, "Failed to load manufacturers");
                Vec::new()
            }
        }
    }

    pub async fn models(&self, manufacturer: &str) -> Vec<Facet> {
        let q = format!(
            "(And.Hidden.N._.SellType.{SELL_TYPE_ENCODED}._.(C.CarType.A._.Manufacturer.{}.))",
            urlencoding::encode(manufacturer)
        );
        match self.nav(&q).await {
            Ok(data) => selected_chain(&data, 2, 1).unwrap_or_default(),
            Err(e) => {
                debug!(manufacturer, error = %e, "Failed to load models");
                Vec::new()
            }
        }
    }

    pub async fn generations(&self, manufacturer: &str, model_group: &str) -> Vec<Facet> {
        let q = format!(
            "(And.Hidden.N._.SellType.{SELL_TYPE_ENCODED}._.(C.CarType.A._.(C.Manufacturer.{}._.ModelGroup.{}.)))",
            urlencoding::encode(manufacturer),
            urlencoding::encode(model_group)
        );
        match self.nav(&q).await {
            Ok(data) => selected_chain(&data, 2, 2).unwrap_or_default(),
            Err(e) => {
                debug!(manufacturer, model_group, error = %e, "Failed to load generations");
                Vec::new()
            }
        }
    }

    pub async fn trims(&self, manufacturer: &str, model_group: &str, model: &str) -> Vec<Facet> {
        let q = format!(
            "(And.Hidden.N._.(C.CarType.A._.(C.Manufacturer.{}._.(C.ModelGroup.{}._.Model.{}.))))",
            urlencoding::encode(manufacturer),
            urlencoding::encode(model_group),
            urlencoding::encode(model)
        );
        match self.nav(&q).await {
            Ok(data) => selected_chain(&data, 1, 3).unwrap_or_default(),
            Err(e) => {
                debug!(manufacturer, model_group, model, error = %e, "Failed to load trims");
                Vec::new()
            }
        }
    }

    async fn nav(&self, q: &str) -> Result<Value> {
        let url = format!("{NAV_URL}?count=true&q={q}&inav=%7CMetadata%7CSort");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            bail!("nav API returned {}", response.status());
        }
        response.json().await.context("decoding nav response")
    }

    /// Run a catalog query built by [`build_catalog_url`]. Errors are
    /// returned to the caller so the poller can log-and-retry.
    pub async fn search(&self, catalog_url: &str) -> Result<Vec<Listing>> {
        let response = self.client.get(catalog_url).send().await?;
        if !response.status().is_success() {
            bail!("catalog API returned {}", response.status());
        }
        let data: CatalogResponse = response.json().await.context("decoding catalog response")?;
        Ok(data.search_results)
    }

    /// Best-effort detail fetch; `None` degrades the notification text.
    pub async fn detail(&self, listing_id: i64) -> Option<VehicleSpec> {
        let url = format!("{DETAIL_URL}/{listing_id}");
        let response = self.client.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let data: DetailResponse = response.json().await.ok()?;
        Some(data.spec)
    }
}

/// Facet list at `iNav.Nodes[node].Facets[0].Refinements.Nodes[0].Facets`.
fn top_facets(data: &Value, node: usize) -> Option<Vec<Facet>> {
    let facets = refinement_facets(data.get("iNav")?.get("Nodes")?.get(node)?)?;
    let mut out: Vec<Facet> = facets.iter().map(parse_facet).collect();
    out.sort_by(|a, b| a.eng_name.cmp(&b.eng_name));
    Some(out)
}

/// Walk `depth` levels down the `IsSelected` chain starting at the top
/// facet list of `node`, returning the refinements of the last selected
/// facet. Returns `None` (empty to callers) on any shape mismatch.
fn selected_chain(data: &Value, node: usize, depth: usize) -> Option<Vec<Facet>> {
    let mut facets = refinement_facets(data.get("iNav")?.get("Nodes")?.get(node)?)?.clone();
    for _ in 0..depth {
        let selected = facets
            .iter()
            .find(|f| f.get("IsSelected").and_then(Value::as_bool) == Some(true))?
            .clone();
        facets = refinement_facets(&selected)?.clone();
    }
    Some(facets.iter().map(parse_facet).collect())
}

fn refinement_facets(node: &Value) -> Option<&Vec<Value>> {
    // Both the top node and nested facets nest one more Facets[0] level.
    let inner = if node.get("Refinements").is_some() {
        node
    } else {
        node.get("Facets")?.get(0)?
    };
    let inner = if inner.get("Refinements").is_some() {
        inner
    } else {
        return None;
    };
    inner
        .get("Refinements")?
        .get("Nodes")?
        .get(0)?
        .get("Facets")?
        .as_array()
}

fn metadata_first(facet: &Value, key: &str) -> Option<String> {
    let v = facet.get("Metadata")?.get(key)?.get(0)?;
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_facet(facet: &Value) -> Facet {
    Facet {
        display_value: facet
            .get("DisplayValue")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        eng_name: metadata_first(facet, "EngName").unwrap_or_default(),
        model_start_date: metadata_first(facet, "ModelStartDate"),
        model_end_date: metadata_first(facet, "ModelEndDate"),
    }
}

/// Normalize a model name to the catalog grammar's `Base(CODE_)` form.
/// Idempotent: a code that already carries the trailing underscore is left
/// alone.
pub fn normalize_model_name(model: &str) -> String {
    match model.rsplit_once('(') {
        Some((base, code_part)) if code_part.ends_with(')') => {
            let code = code_part.trim_end_matches(')');
            let base = base.trim_end();
            if code.ends_with('_') {
                format!("{base}({code})")
            } else {
                format!("{base}({code}_)")
            }
        }
        _ => model.to_string(),
    }
}

/// Build the catalog search URL for a completed session record.
///
/// Value tokens (manufacturer, model group, model, trim, color, sell type)
/// are percent-encoded individually; the grammar's structural characters
/// `(`, `)`, `.`, `_` are emitted literally. Running the whole string
/// through a URL encoder silently breaks the query: the API answers with
/// zero results instead of an error.
///
/// The year filter packs year and month into `YYYYMM` tokens; month 0
/// ("any") encodes as `00` at the start of the range and `12` at the end.
/// Prices are filtered in units of 10,000 won. The mileage range is taken
/// as given: a reversed range is emitted as-is.
pub fn build_catalog_url(query: &SearchQuery) -> Option<String> {
    let manufacturer = query.manufacturer.as_ref()?.name.trim();
    let model_group = query.model_group.as_ref()?.name.trim();
    let model = query.model.as_ref()?.name.trim();
    let trim = query.trim.as_ref()?.name.trim();
    if manufacturer.is_empty() || model_group.is_empty() || model.is_empty() || trim.is_empty() {
        return None;
    }
    let year_from = query.year_from?;
    let year_to = query.year_to?;

    let year_from_token = if query.month_from == 0 {
        format!("{year_from}00")
    } else {
        format!("{year_from}{:02}", query.month_from)
    };
    let year_to_token = if query.month_to == 0 {
        format!("{year_to}12")
    } else {
        format!("{year_to}{:02}", query.month_to)
    };

    let mileage_from = query.mileage_from.unwrap_or(0);
    let mileage_to = query.mileage_to.unwrap_or(200_000);

    let price_filter = match (query.price_from, query.price_to) {
        (Some(min), Some(max)) => format!("_.Price.range({}..{})", min / 10_000, max / 10_000),
        (Some(min), None) => format!("_.Price.range({}..)", min / 10_000),
        (None, Some(max)) => format!("_.Price.range(..{})", max / 10_000),
        (None, None) => String::new(),
    };

    // Inserted between the sell-type filter and the hierarchy block.
    let color_filter = match query.color.as_deref() {
        Some(color) if !color.is_empty() => {
            format!("Color.{}._.", urlencoding::encode(color))
        }
        _ => String::new(),
    };

    let manufacturer_enc = urlencoding::encode(manufacturer);
    let model_group_enc = urlencoding::encode(model_group);
    let model_normalized = normalize_model_name(model);
    let model_enc = urlencoding::encode(&model_normalized);
    let trim_enc = urlencoding::encode(trim);

    let url = format!(
        "{CATALOG_URL}?count=true&q=\
         (And.Hidden.N._.SellType.{SELL_TYPE_ENCODED}{price_filter}._.{color_filter}\
         (C.CarType.A._.\
         (C.Manufacturer.{manufacturer_enc}._.\
         (C.ModelGroup.{model_group_enc}._.\
         (C.Model.{model_enc}._.BadgeGroup.{trim_enc}.))))_.\
         Year.range({year_from_token}..{year_to_token})._.\
         Mileage.range({mileage_from}..{mileage_to}).)\
         &sr=%7CModifiedDate%7C0%7C1"
    );
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FacetChoice;

    fn query() -> SearchQuery {
        SearchQuery {
            manufacturer: Some(FacetChoice::new("", "현대")),
            model_group: Some(FacetChoice::new("", "그랜저")),
            model: Some(FacetChoice::new("", "그랜저 IG(IG_)")),
            trim: Some(FacetChoice::new("", "프리미엄")),
            year_from: Some(2018),
            year_to: Some(2020),
            mileage_from: Some(0),
            mileage_to: Some(50000),
            ..Default::default()
        }
    }

    #[test]
    fn model_name_normalization() {
        assert_eq!(normalize_model_name("그랜저 IG (IG)"), "그랜저 IG(IG_)");
        assert_eq!(normalize_model_name("그랜저 IG(IG_)"), "그랜저 IG(IG_)");
        assert_eq!(normalize_model_name("아반떼"), "아반떼");
    }

    #[test]
    fn golden_catalog_url() {
        let url = build_catalog_url(&query()).unwrap();
        assert!(url.contains(&format!("Manufacturer.{}", urlencoding::encode("현대"))));
        assert!(url.contains("Year.range(201800..202012)"));
        assert!(url.contains("Mileage.range(0..50000)"));
        // Structural grammar characters stay literal; the parentheses in
        // the model value itself are encoded with the rest of the token.
        assert!(url.contains("(And.Hidden.N._.SellType."));
        assert!(url.contains("(C.CarType.A._."));
        assert!(url.contains(&format!(
            "Model.{}._.BadgeGroup",
            urlencoding::encode("그랜저 IG(IG_)")
        )));
        assert!(url.ends_with("&sr=%7CModifiedDate%7C0%7C1"));
    }

    #[test]
    fn months_are_packed_into_year_tokens() {
        let mut q = query();
        q.month_from = 3;
        q.month_to = 9;
        let url = build_catalog_url(&q).unwrap();
        assert!(url.contains("Year.range(201803..202009)"));
    }

    #[test]
    fn price_filter_in_ten_thousands() {
        let mut q = query();
        q.price_from = Some(5_000_000);
        q.price_to = Some(20_000_000);
        let url = build_catalog_url(&q).unwrap();
        assert!(url.contains("_.Price.range(500..2000)"));

        q.price_from = None;
        let url = build_catalog_url(&q).unwrap();
        assert!(url.contains("_.Price.range(..2000)"));
    }

    #[test]
    fn color_filter_is_optional() {
        let url = build_catalog_url(&query()).unwrap();
        assert!(!url.contains("Color."));

        let mut q = query();
        q.color = Some("검정색".to_string());
        let url = build_catalog_url(&q).unwrap();
        assert!(url.contains(&format!("Color.{}", urlencoding::encode("검정색"))));
    }

    #[test]
    fn reversed_mileage_range_is_not_swapped() {
        // Pinned boundary condition: the builder does not validate.
        let mut q = query();
        q.mileage_from = Some(90000);
        q.mileage_to = Some(10000);
        let url = build_catalog_url(&q).unwrap();
        assert!(url.contains("Mileage.range(90000..10000)"));
    }

    #[test]
    fn incomplete_query_yields_none() {
        let mut q = query();
        q.trim = None;
        assert!(build_catalog_url(&q).is_none());

        let mut q = query();
        q.manufacturer = Some(FacetChoice::new("", "  "));
        assert!(build_catalog_url(&q).is_none());
    }

    #[test]
    fn selected_chain_walks_nested_facets() {
        let data: Value = serde_json::json!({
            "iNav": { "Nodes": [ {}, {}, {
                "Facets": [{
                    "Refinements": { "Nodes": [{ "Facets": [
                        { "DisplayValue": "기아", "IsSelected": false },
                        { "DisplayValue": "현대", "IsSelected": true,
                          "Refinements": { "Nodes": [{ "Facets": [
                              { "DisplayValue": "그랜저",
                                "Metadata": { "EngName": ["Grandeur"] } }
                          ] }] } }
                    ] }] }
                }]
            } ] }
        });
        let facets = selected_chain(&data, 2, 1).unwrap();
        assert_eq!(facets.len(), 1);
        assert_eq!(facets[0].display_value, "그랜저");
        assert_eq!(facets[0].eng_name, "Grandeur");
    }

    #[test]
    fn shape_mismatch_yields_none() {
        let data: Value = serde_json::json!({ "iNav": { "Nodes": [] } });
        assert!(selected_chain(&data, 2, 1).is_none());
        assert!(top_facets(&data, 1).is_none());
    }
}
