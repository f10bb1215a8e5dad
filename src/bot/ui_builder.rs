//! Keyboards and formatting for the search funnel.
//!
//! All funnel steps are inline keyboards; every button carries a
//! self-contained callback payload, so handlers never have to parse state
//! back out of rendered message text.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::session::Marketplace;
use crate::translation::{ENCAR_COLORS, KBCHACHACHA_COLORS, KCAR_COLORS};

/// Chunk buttons into rows of `per_row`.
pub fn rows(buttons: Vec<InlineKeyboardButton>, per_row: usize) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> =
        buttons.chunks(per_row).map(|c| c.to_vec()).collect();
    InlineKeyboardMarkup::new(rows)
}

pub fn main_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback("🔍 Найти авто", "search_car")],
        vec![InlineKeyboardButton::callback(
            "📋 Список моих запросов",
            "my_requests",
        )],
        vec![InlineKeyboardButton::callback(
            "🧹 Удалить все запросы",
            "delete_all_requests",
        )],
        vec![
            InlineKeyboardButton::url(
                "📱 TikTok",
                "https://www.tiktok.com/@unitradingkr".parse().unwrap(),
            ),
            InlineKeyboardButton::url(
                "📺 YouTube",
                "https://youtube.com/@unitradingkr".parse().unwrap(),
            ),
            InlineKeyboardButton::url(
                "📸 Instagram",
                "https://www.instagram.com/uni.trading.kr".parse().unwrap(),
            ),
        ],
    ])
}

pub fn platform_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback("Encar", "platform_encar")],
        vec![InlineKeyboardButton::callback(
            "KbChaChaCha",
            "platform_kbchachacha",
        )],
        vec![InlineKeyboardButton::callback("KCar", "platform_kcar")],
    ])
}

/// Buttons offered after results or a completed search.
pub fn after_results_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "➕ Добавить новый автомобиль в поиск",
            "search_car",
        )],
        vec![InlineKeyboardButton::callback(
            "🏠 Вернуться в главное меню",
            "start",
        )],
    ])
}

/// Year buttons, newest first, each carrying `{prefix}{year}`.
pub fn year_keyboard(from: i32, to: i32, prefix: &str) -> InlineKeyboardMarkup {
    let buttons = (from..=to)
        .rev()
        .map(|y| InlineKeyboardButton::callback(y.to_string(), format!("{prefix}{y}")))
        .collect();
    rows(buttons, 4)
}

/// Mileage steps of 10,000 km from `above` up to 200,000 km.
pub fn mileage_keyboard(above: u32, prefix: &str) -> InlineKeyboardMarkup {
    let buttons = (0..=200_000u32)
        .step_by(10_000)
        .filter(|v| *v >= above)
        .map(|v| InlineKeyboardButton::callback(format!("{v} км"), format!("{prefix}{v}")))
        .collect();
    rows(buttons, 4)
}

/// KCar uses a coarser fixed mileage scale.
pub fn kcar_mileage_keyboard(above: u32, prefix: &str) -> InlineKeyboardMarkup {
    let buttons = [0u32, 50_000, 100_000, 150_000, 200_000, 250_000, 300_000]
        .into_iter()
        .filter(|v| *v >= above)
        .map(|v| InlineKeyboardButton::callback(format!("{v} км"), format!("{prefix}{v}")))
        .collect();
    rows(buttons, 3)
}

/// Color choices for the marketplace, "any" first. Encar and KCar filter by
/// native name, KbChaChaCha by its numeric color code.
pub fn color_keyboard(marketplace: Marketplace) -> InlineKeyboardMarkup {
    let (prefix, colors): (&str, Vec<(&str, &str)>) = match marketplace {
        Marketplace::Encar => ("color_", ENCAR_COLORS.to_vec()),
        Marketplace::Kbchachacha => (
            "kbcha_color_",
            KBCHACHACHA_COLORS.iter().map(|(kr, ru, _)| (*kr, *ru)).collect(),
        ),
        Marketplace::Kcar => ("kcar_color_", KCAR_COLORS.to_vec()),
    };
    let mut buttons = vec![InlineKeyboardButton::callback(
        "Любой",
        format!("{prefix}all"),
    )];
    buttons.extend(
        colors
            .iter()
            .map(|(kr, ru)| InlineKeyboardButton::callback(*ru, format!("{prefix}{kr}"))),
    );
    rows(buttons, 2)
}

pub fn price_keyboard() -> InlineKeyboardMarkup {
    let mut buttons = vec![InlineKeyboardButton::callback("Любая", "any_price")];
    for millions in [10, 15, 20, 25, 30, 35, 40, 50] {
        buttons.push(InlineKeyboardButton::callback(
            format!("До {millions} млн ₩"),
            format!("price_max_{}", millions * 1_000_000),
        ));
    }
    buttons.push(InlineKeyboardButton::callback(
        "Свой диапазон",
        "custom_price",
    ));
    rows(buttons, 2)
}

/// Region choices for the Encar funnel, filtered by native region name.
pub fn location_keyboard() -> InlineKeyboardMarkup {
    const REGIONS: &[(&str, &str)] = &[
        ("Сеул", "서울"),
        ("Пусан", "부산"),
        ("Тэгу", "대구"),
        ("Инчхон", "인천"),
        ("Кванджу", "광주"),
        ("Тэджон", "대전"),
        ("Ульсан", "울산"),
        ("Седжон", "세종"),
        ("Кёнги-до", "경기"),
        ("Канвон-до", "강원"),
        ("Чхунчхон-Пукто", "충북"),
        ("Чхунчхон-Намдо", "충남"),
        ("Чолла-Пукто", "전북"),
        ("Чолла-Намдо", "전남"),
        ("Кёнсан-Пукто", "경북"),
        ("Кёнсан-Намдо", "경남"),
        ("Чеджу-до", "제주"),
    ];
    let mut buttons = vec![InlineKeyboardButton::callback("Любая", "location_all")];
    buttons.extend(
        REGIONS
            .iter()
            .map(|(ru, kr)| InlineKeyboardButton::callback(*ru, format!("location_{kr}"))),
    );
    rows(buttons, 2)
}

/// Group digits with spaces: 23500000 renders as "23 500 000".
pub fn format_grouped(n: i64) -> String {
    let raw = n.abs().to_string();
    let mut out = String::with_capacity(raw.len() + raw.len() / 3);
    let offset = raw.len() % 3;
    for (i, c) in raw.chars().enumerate() {
        if i > 0 && (i + 3 - offset) % 3 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    if n < 0 {
        format!("-{out}")
    } else {
        out
    }
}

/// Price bounds for display, in millions of won.
pub fn format_price_range(from: Option<i64>, to: Option<i64>) -> String {
    match (from, to) {
        (None, None) => "Любая".to_string(),
        (None, Some(max)) => format!("до {} млн ₩", max / 1_000_000),
        (Some(min), None) => format!("от {} млн ₩", min / 1_000_000),
        (Some(min), Some(max)) => {
            format!("{}-{} млн ₩", min / 1_000_000, max / 1_000_000)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouped_number_formatting() {
        assert_eq!(format_grouped(0), "0");
        assert_eq!(format_grouped(950), "950");
        assert_eq!(format_grouped(41230), "41 230");
        assert_eq!(format_grouped(23_500_000), "23 500 000");
    }

    #[test]
    fn price_range_display() {
        assert_eq!(format_price_range(None, None), "Любая");
        assert_eq!(format_price_range(None, Some(15_000_000)), "до 15 млн ₩");
        assert_eq!(format_price_range(Some(5_000_000), None), "от 5 млн ₩");
        assert_eq!(
            format_price_range(Some(5_000_000), Some(15_000_000)),
            "5-15 млн ₩"
        );
    }

    #[test]
    fn year_keyboard_is_newest_first() {
        let markup = year_keyboard(2018, 2021, "year_from_");
        let first = &markup.inline_keyboard[0][0];
        assert_eq!(first.text, "2021");
    }

    #[test]
    fn mileage_keyboard_respects_lower_bound() {
        let markup = mileage_keyboard(150_000, "mileage_to_");
        let labels: Vec<&str> = markup
            .inline_keyboard
            .iter()
            .flatten()
            .map(|b| b.text.as_str())
            .collect();
        assert_eq!(labels, vec!["150000 км", "160000 км", "170000 км", "180000 км", "190000 км", "200000 км"]);
    }

    #[test]
    fn location_keyboard_carries_encar_payloads() {
        use teloxide::types::InlineKeyboardButtonKind;

        let markup = location_keyboard();
        let data: Vec<&str> = markup
            .inline_keyboard
            .iter()
            .flatten()
            .map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(data) => data.as_str(),
                other => panic!("unexpected button kind: {other:?}"),
            })
            .collect();
        assert_eq!(data[0], "location_all");
        assert!(data.contains(&"location_서울"));
        assert!(data.iter().all(|d| d.starts_with("location_")));
    }

    #[test]
    fn color_keyboard_offers_any_first() {
        let markup = color_keyboard(Marketplace::Kbchachacha);
        let first = &markup.inline_keyboard[0][0];
        assert_eq!(first.text, "Любой");
    }
}
