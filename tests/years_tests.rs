//! Year inference across the strategies, exercised end to end the way the
//! generation step uses it.

use carwatch::years::{infer_year_range, parse_short_year_span, GenerationInfo, YearRange};

fn info(start: Option<&str>, end: Option<&str>, label: &str, display: &str) -> GenerationInfo {
    GenerationInfo {
        start_raw: start.map(String::from),
        end_raw: end.map(String::from),
        label: label.to_string(),
        display: display.to_string(),
    }
}

#[test]
fn api_dates_win_over_label() {
    let gen = info(
        Some("201611"),
        Some("202212"),
        "Grandeur IG (01.2010 — 12.2012)",
        "그랜저 IG",
    );
    // The override keeps the API range since it already spans 2016-2022.
    assert_eq!(
        infer_year_range(&gen, 2025),
        YearRange { from: 2016, to: 2022 }
    );
}

#[test]
fn ongoing_production_ends_at_current_year() {
    let gen = info(Some("202211"), None, "Grandeur GN7", "그랜저 GN7");
    assert_eq!(
        infer_year_range(&gen, 2025),
        YearRange { from: 2022, to: 2025 }
    );
}

#[test]
fn label_range_fills_in_when_api_is_silent() {
    let gen = info(None, None, "Sonata DN8 (03.2019 — 2023)", "쏘나타 DN8");
    assert_eq!(
        infer_year_range(&gen, 2025),
        YearRange { from: 2019, to: 2023 }
    );
}

#[test]
fn display_value_is_the_third_resort() {
    let gen = info(None, None, "Avante", "아반떼 (2020-2023)");
    assert_eq!(
        infer_year_range(&gen, 2025),
        YearRange { from: 2020, to: 2023 }
    );
}

#[test]
fn unknown_generation_gets_seven_year_window() {
    let gen = info(None, None, "Mystery", "수수께끼");
    assert_eq!(
        infer_year_range(&gen, 2025),
        YearRange { from: 2018, to: 2025 }
    );
}

#[test]
fn inference_is_deterministic() {
    let gen = info(Some("201603"), None, "Grandeur IG", "그랜저 IG");
    let first = infer_year_range(&gen, 2025);
    assert_eq!(infer_year_range(&gen, 2025), first);
}

#[test]
fn short_spans_parse_both_forms() {
    assert_eq!(
        parse_short_year_span("그랜저 (19~24년)", 2025),
        Some(YearRange { from: 2019, to: 2024 })
    );
    assert_eq!(
        parse_short_year_span("그랜저 20년~현재", 2025),
        Some(YearRange { from: 2020, to: 2025 })
    );
    assert_eq!(parse_short_year_span("그랜저", 2025), None);
}
