//! Production-year inference for a selected generation.
//!
//! Upstream data about when a generation was built is messy: sometimes a
//! structured `YYYYMM` pair, sometimes a date range embedded in a label,
//! sometimes nothing. Resolution runs an ordered list of named strategies,
//! each filling whichever endpoint is still unknown, then sanitizes the
//! result.

use lazy_static::lazy_static;
use regex::Regex;

/// Raw generation facts as they arrive from a marketplace facet response.
#[derive(Debug, Clone, Default)]
pub struct GenerationInfo {
    /// Structured start date, `YYYYMM`, when the API provides one.
    pub start_raw: Option<String>,
    /// Structured end date, `YYYYMM`. Absent means "still in production".
    pub end_raw: Option<String>,
    /// English label, may embed a range like `(01.2016 — 12.2022)`.
    pub label: String,
    /// Native-language display value, may embed `(2016-2022)`.
    pub display: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub from: i32,
    pub to: i32,
}

lazy_static! {
    /// `YYYY` or `MM.YYYY` on both sides, separated by em-dash, en-dash,
    /// hyphen or tilde, with optional surrounding parentheses.
    static ref LABEL_RANGE: Regex =
        Regex::new(r"\(?(\d{2}\.\d{4}|\d{4})\s*[—–\-~]\s*(\d{2}\.\d{4}|\d{4})\)?")
            .expect("label range pattern should be valid");
    /// Plain `(YYYY-YYYY)` / `(YYYY~YYYY)` as seen in display values.
    static ref DISPLAY_RANGE: Regex = Regex::new(r"\(?(\d{4})\s*[-~]\s*(\d{4})\)?")
        .expect("display range pattern should be valid");
    /// KCar-style short span: `19~24년`, `(19~24년)`, `20년~현재`.
    static ref SHORT_SPAN: Regex = Regex::new(r"(\d{2})\s*년?\s*~\s*(\d{2}년|현재)")
        .expect("short span pattern should be valid");
}

/// Year component of `YYYY` or `MM.YYYY`.
fn year_of(date: &str) -> Option<i32> {
    let tail = date.rsplit('.').next()?;
    if tail.len() == 4 {
        tail.parse().ok()
    } else {
        None
    }
}

/// Strategy 1: structured `YYYYMM` fields. An API that reports a start but
/// no end means the generation is still being built, so the end resolves to
/// the current year.
fn from_api_dates(info: &GenerationInfo, current_year: i32) -> (Option<i32>, Option<i32>) {
    let parse = |raw: &Option<String>| {
        raw.as_deref()
            .filter(|s| s.len() >= 4 && s[..4].bytes().all(|b| b.is_ascii_digit()))
            .and_then(|s| s[..4].parse::<i32>().ok())
    };
    let start = parse(&info.start_raw);
    let mut end = parse(&info.end_raw);
    let api_present = info.start_raw.as_deref().is_some_and(|s| !s.is_empty())
        || info.end_raw.as_deref().is_some_and(|s| !s.is_empty());
    if end.is_none() && api_present {
        end = Some(current_year);
    }
    (start, end)
}

/// Strategy 2/3: a date range embedded in free text. Public because the
/// KbChaChaCha funnel reads generation periods straight from button labels.
pub fn parse_label_range(text: &str) -> Option<(i32, i32)> {
    let caps = LABEL_RANGE.captures(text)?;
    let start = year_of(&caps[1])?;
    let end = year_of(&caps[2])?;
    Some((start, end))
}

fn from_display(text: &str) -> Option<(i32, i32)> {
    let caps = DISPLAY_RANGE.captures(text)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Strategy 4: policy table for models whose upstream metadata is known to
/// be wrong. Widens the range rather than replacing it.
fn apply_special_overrides(info: &GenerationInfo, start: &mut Option<i32>, end: &mut Option<i32>) {
    let label = info.label.to_lowercase();
    let grandeur_ig = label.contains("ig")
        && (label.contains("grandeur") || info.display.contains("그랜저"));
    if grandeur_ig {
        if start.map_or(true, |s| s > 2016) {
            *start = Some(2016);
        }
        if end.map_or(true, |e| e < 2022) {
            *end = Some(2022);
        }
    }
}

/// Post-resolution sanitization. A start year in the future is clamped; an
/// end before the start is pulled up to the current year; an end far in the
/// future is deliberately left alone, since it is how still-in-production
/// models are encoded upstream.
pub fn sanitize(mut range: YearRange, current_year: i32) -> YearRange {
    if range.from > current_year {
        range.from = current_year - 5;
    }
    if range.to < range.from {
        range.to = current_year;
    }
    range
}

/// Resolve a `(start, end)` production range for a generation.
///
/// `current_year` is injected so callers and tests control "today".
pub fn infer_year_range(info: &GenerationInfo, current_year: i32) -> YearRange {
    let (mut start, mut end) = from_api_dates(info, current_year);

    if start.is_none() || end.is_none() {
        if let Some((s, e)) = parse_label_range(&info.label) {
            start = start.or(Some(s));
            end = end.or(Some(e));
        }
    }
    if start.is_none() || end.is_none() {
        if let Some((s, e)) = from_display(&info.display) {
            start = start.or(Some(s));
            end = end.or(Some(e));
        }
    }

    apply_special_overrides(info, &mut start, &mut end);

    let range = YearRange {
        from: start.unwrap_or(current_year - 7),
        to: end.unwrap_or(current_year),
    };
    sanitize(range, current_year)
}

/// Parse a KCar short-year span like `(19~24년)` or `20년~현재`. Two-digit
/// years are resolved into the 2000s; if the end still lands before the
/// start the century rolled over, so a century is added.
pub fn parse_short_year_span(text: &str, current_year: i32) -> Option<YearRange> {
    let caps = SHORT_SPAN.captures(text)?;
    let from = 2000 + caps[1].parse::<i32>().ok()?;
    let to_part = &caps[2];
    let mut to = if to_part == "현재" {
        current_year
    } else {
        2000 + to_part.trim_end_matches('년').parse::<i32>().ok()?
    };
    if to < from {
        to += 100;
    }
    Some(YearRange { from, to })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(start: Option<&str>, end: Option<&str>, label: &str, display: &str) -> GenerationInfo {
        GenerationInfo {
            start_raw: start.map(String::from),
            end_raw: end.map(String::from),
            label: label.to_string(),
            display: display.to_string(),
        }
    }

    #[test]
    fn api_dates_take_precedence() {
        let g = info(Some("201603"), Some("202212"), "IG (2010-2012)", "");
        assert_eq!(
            infer_year_range(&g, 2025),
            YearRange { from: 2016, to: 2022 }
        );
    }

    #[test]
    fn missing_end_date_means_still_in_production() {
        let g = info(Some("201603"), None, "", "");
        assert_eq!(
            infer_year_range(&g, 2025),
            YearRange { from: 2016, to: 2025 }
        );
    }

    #[test]
    fn label_range_round_trip_plain_years() {
        let g = info(None, None, "GN7 (2022—2026)", "");
        assert_eq!(
            infer_year_range(&g, 2025),
            YearRange { from: 2022, to: 2026 }
        );
    }

    #[test]
    fn label_range_round_trip_month_year() {
        let g = info(None, None, "New Rise (01.2016—12.2022)", "");
        assert_eq!(
            infer_year_range(&g, 2025),
            YearRange { from: 2016, to: 2022 }
        );
    }

    #[test]
    fn label_accepts_tilde_and_hyphen() {
        assert_eq!(parse_label_range("(2018~2021)"), Some((2018, 2021)));
        assert_eq!(parse_label_range("(2018-2021)"), Some((2018, 2021)));
        assert_eq!(parse_label_range("no dates here"), None);
    }

    #[test]
    fn display_value_is_third_priority() {
        let g = info(None, None, "no dates", "그랜저 (2016-2022)");
        assert_eq!(
            infer_year_range(&g, 2025),
            YearRange { from: 2016, to: 2022 }
        );
    }

    #[test]
    fn grandeur_ig_override_widens() {
        let g = info(None, None, "Grandeur IG (2018—2019)", "그랜저 IG");
        assert_eq!(
            infer_year_range(&g, 2025),
            YearRange { from: 2016, to: 2022 }
        );
    }

    #[test]
    fn fallback_window() {
        let g = info(None, None, "mystery", "");
        assert_eq!(
            infer_year_range(&g, 2025),
            YearRange { from: 2018, to: 2025 }
        );
    }

    #[test]
    fn future_start_is_clamped() {
        let g = info(Some("203001"), Some("203112"), "", "");
        let r = infer_year_range(&g, 2025);
        assert_eq!(r.from, 2020);
    }

    #[test]
    fn far_future_end_is_tolerated() {
        // Still-in-production models legitimately report end years far out.
        let g = info(Some("202211"), Some("203012"), "", "");
        assert_eq!(
            infer_year_range(&g, 2025),
            YearRange { from: 2022, to: 2030 }
        );
    }

    #[test]
    fn inference_is_deterministic() {
        let g = info(Some("201603"), None, "IG (2016—2022)", "그랜저 IG");
        assert_eq!(infer_year_range(&g, 2024), infer_year_range(&g, 2024));
    }

    #[test]
    fn short_span_expands_century() {
        assert_eq!(
            parse_short_year_span("(19~24년)", 2025),
            Some(YearRange { from: 2019, to: 2024 })
        );
        assert_eq!(
            parse_short_year_span("20년~현재", 2025),
            Some(YearRange { from: 2020, to: 2025 })
        );
        assert_eq!(parse_short_year_span("현재", 2025), None);
    }
}
