//! KbChaChaCha search funnel: maker, class, generation, trim model, years,
//! mileage, color. The final step scrapes the listing page and shows the
//! freshest result.

use anyhow::Result;
use chrono::Datelike;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InputFile, ParseMode};
use tracing::warn;

use super::{ui_builder, AppState, CallbackCtx};
use crate::marketplace::kbchachacha::ListingFilter;
use crate::session::{FacetChoice, Marketplace, SearchQuery};
use crate::translation::{kbchachacha_color, translate};
use crate::years::parse_label_range;

fn current_year() -> i32 {
    chrono::Utc::now().year()
}

fn summary(query: &SearchQuery) -> String {
    let mut lines = Vec::new();
    if let Some(m) = &query.manufacturer {
        lines.push(format!("Марка: {}", translate(&m.name)));
    }
    if let Some(m) = &query.model_group {
        lines.push(format!("Модель: {}", translate(&m.name)));
    }
    if let Some(m) = &query.model {
        lines.push(format!("Поколение: {}", translate(&m.name)));
    }
    if let Some(t) = &query.trim {
        lines.push(format!("Конфигурация: {}", translate(&t.name)));
    }
    if let (Some(from), Some(to)) = (query.year_from, query.year_to) {
        lines.push(format!("Год: {from}-{to}"));
    }
    if let (Some(from), Some(to)) = (query.mileage_from, query.mileage_to) {
        lines.push(format!("Пробег: {from}-{to} км"));
    }
    lines.join("\n")
}

pub async fn start(ctx: &CallbackCtx<'_>, state: &AppState) -> Result<()> {
    state.sessions.clear(ctx.user_id).await;
    state
        .sessions
        .update(ctx.user_id, |q| q.marketplace = Some(Marketplace::Kbchachacha))
        .await;

    let makers = state.kbchachacha.makers().await;
    if makers.is_empty() {
        ctx.bot
            .send_message(ctx.chat_id, "Не удалось загрузить марки.")
            .await?;
        return Ok(());
    }

    let buttons = makers
        .iter()
        .map(|m| {
            InlineKeyboardButton::callback(
                translate(&m.name),
                format!("kbcha_brand_{}_{}", m.code, m.name),
            )
        })
        .collect();
    ctx.send(
        "Выбери марку автомобиля:".to_string(),
        ui_builder::rows(buttons, 2),
    )
    .await
}

/// Payload is `{code}_{name}`.
pub async fn on_brand(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let Some((code, name)) = payload.split_once('_') else {
        return Ok(());
    };
    state
        .sessions
        .update(ctx.user_id, |q| {
            q.manufacturer = Some(FacetChoice::new(code, name));
        })
        .await;

    let classes = state.kbchachacha.classes(code).await;
    if classes.is_empty() {
        ctx.bot
            .send_message(ctx.chat_id, "Не удалось загрузить модели.")
            .await?;
        return Ok(());
    }

    let buttons = classes
        .iter()
        .map(|c| {
            InlineKeyboardButton::callback(
                translate(&c.name),
                format!("kbcha_model_{}_{}", c.code, c.name),
            )
        })
        .collect();
    let query = state.sessions.get_or_create(ctx.user_id).await;
    ctx.edit(
        format!("{}\nТеперь выбери модель:", summary(&query)),
        ui_builder::rows(buttons, 2),
    )
    .await
}

pub async fn on_model(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let Some((code, name)) = payload.split_once('_') else {
        return Ok(());
    };
    state
        .sessions
        .update(ctx.user_id, |q| {
            q.model_group = Some(FacetChoice::new(code, name));
        })
        .await;

    let query = state.sessions.get_or_create(ctx.user_id).await;
    let maker_code = query.manufacturer.as_ref().map(|m| m.code.clone()).unwrap_or_default();
    let generations = state.kbchachacha.generations(&maker_code, code).await;
    if generations.is_empty() {
        ctx.bot
            .send_message(ctx.chat_id, "Не удалось загрузить поколения.")
            .await?;
        return Ok(());
    }

    let buttons = generations
        .iter()
        .map(|g| {
            let label = format!("{} {}", translate(&g.name), g.period_label())
                .trim()
                .to_string();
            InlineKeyboardButton::callback(label, format!("kbcha_gen_{}_{}", g.code, g.name))
        })
        .collect();
    ctx.edit(
        format!("{}\nТеперь выбери поколение:", summary(&query)),
        ui_builder::rows(buttons, 2),
    )
    .await
}

/// Stores the generation and its production years, taken from the facet's
/// year fields with the name as a fallback.
pub async fn on_generation(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let Some((code, name)) = payload.split_once('_') else {
        return Ok(());
    };

    let query = state.sessions.get_or_create(ctx.user_id).await;
    let maker_code = query.manufacturer.as_ref().map(|m| m.code.clone()).unwrap_or_default();
    let class_code = query.model_group.as_ref().map(|m| m.code.clone()).unwrap_or_default();

    let generations = state.kbchachacha.generations(&maker_code, &class_code).await;
    let selected = generations.iter().find(|g| g.code == code);

    let now = current_year();
    let (mut start, mut end) = selected
        .map(|g| {
            let from = g.from_year.parse::<i32>().ok();
            let to = if g.to_year == "현재" {
                Some(now)
            } else {
                g.to_year.parse::<i32>().ok()
            };
            (from, to)
        })
        .unwrap_or((None, None));
    if start.is_none() || end.is_none() {
        if let Some((s, e)) = parse_label_range(name) {
            start = start.or(Some(s));
            end = end.or(Some(e));
        }
    }
    let mut start = start.unwrap_or(now - 5);
    let mut end = end.unwrap_or(now);
    if start > now {
        start = now - 5;
    }
    if end < start {
        end = now;
    }

    state
        .sessions
        .update(ctx.user_id, |q| {
            q.model = Some(FacetChoice::new(code, name));
            q.generation_years = Some((start, end));
        })
        .await;

    let trims = state.kbchachacha.trims(&maker_code, &class_code, code).await;
    if trims.is_empty() {
        ctx.bot
            .send_message(ctx.chat_id, "Не удалось загрузить конфигурации.")
            .await?;
        return Ok(());
    }

    let buttons = trims
        .iter()
        .map(|t| {
            InlineKeyboardButton::callback(
                translate(&t.name),
                format!("kbcha_trim_{}_{}", t.code, t.name),
            )
        })
        .collect();
    let query = state.sessions.get_or_create(ctx.user_id).await;
    ctx.edit(
        format!("{}\nВыберите конфигурацию:", summary(&query)),
        ui_builder::rows(buttons, 2),
    )
    .await
}

pub async fn on_trim(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let Some((code, name)) = payload.split_once('_') else {
        return Ok(());
    };
    state
        .sessions
        .update(ctx.user_id, |q| {
            q.trim = Some(FacetChoice::new(code, name));
        })
        .await;

    let query = state.sessions.get_or_create(ctx.user_id).await;
    let now = current_year();
    let (start, end) = query.generation_years.unwrap_or((now - 5, now));
    ctx.send(
        format!("{}\n\nВыберите начальный год выпуска:", summary(&query)),
        ui_builder::year_keyboard(start, end.min(now), "kbcha_year_from_"),
    )
    .await
}

pub async fn on_year_from(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let Ok(year) = payload.parse::<i32>() else {
        return Ok(());
    };
    state
        .sessions
        .update(ctx.user_id, |q| q.year_from = Some(year))
        .await;

    let query = state.sessions.get_or_create(ctx.user_id).await;
    let now = current_year();
    let end = query.generation_years.map(|(_, e)| e.min(now)).unwrap_or(now);
    ctx.send(
        format!("Выбран начальный год: {year}\nВыберите конечный год выпуска:"),
        ui_builder::year_keyboard(year, end.max(year), "kbcha_year_to_"),
    )
    .await
}

pub async fn on_year_to(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let Ok(year) = payload.parse::<i32>() else {
        return Ok(());
    };
    state
        .sessions
        .update(ctx.user_id, |q| q.year_to = Some(year))
        .await;

    let query = state.sessions.get_or_create(ctx.user_id).await;
    ctx.send(
        format!(
            "Выбран диапазон годов: {}-{year}\nТеперь выберите минимальный пробег:",
            query.year_from.unwrap_or_default()
        ),
        ui_builder::mileage_keyboard(0, "kbcha_mileage_from_"),
    )
    .await
}

pub async fn on_mileage_from(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let Ok(mileage) = payload.parse::<u32>() else {
        return Ok(());
    };
    state
        .sessions
        .update(ctx.user_id, |q| q.mileage_from = Some(mileage))
        .await;

    ctx.send(
        format!("Выбран минимальный пробег: {mileage} км\nВыберите максимальный пробег:"),
        ui_builder::mileage_keyboard(mileage + 10_000, "kbcha_mileage_to_"),
    )
    .await
}

pub async fn on_mileage_to(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let Ok(mileage) = payload.parse::<u32>() else {
        return Ok(());
    };
    state
        .sessions
        .update(ctx.user_id, |q| q.mileage_to = Some(mileage))
        .await;

    let query = state.sessions.get_or_create(ctx.user_id).await;
    ctx.send(
        format!(
            "Выбран диапазон пробега: {}-{mileage} км\nТеперь выберите цвет автомобиля:",
            query.mileage_from.unwrap_or_default()
        ),
        ui_builder::color_keyboard(Marketplace::Kbchachacha),
    )
    .await
}

/// Final step: run the scrape and show the freshest listing.
pub async fn on_color(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let color = (payload != "all").then(|| payload.to_string());
    let (color_ru, color_code) = color
        .as_deref()
        .and_then(kbchachacha_color)
        .map(|(ru, code)| (ru.to_string(), Some(code.to_string())))
        .unwrap_or_else(|| ("Любой".to_string(), None));
    state
        .sessions
        .update(ctx.user_id, |q| q.color = color)
        .await;

    let query = state.sessions.get_or_create(ctx.user_id).await;
    ctx.bot
        .send_message(
            ctx.chat_id,
            format!(
                "🔍 Ищем по запросу:\n{}\nЦвет: {color_ru}...",
                summary(&query)
            ),
        )
        .await?;

    let filter = ListingFilter {
        maker_code: query.manufacturer.as_ref().map(|m| m.code.clone()).unwrap_or_default(),
        class_code: query.model_group.as_ref().map(|m| m.code.clone()).unwrap_or_default(),
        car_code: query.model.as_ref().map(|m| m.code.clone()).unwrap_or_default(),
        model_code: query.trim.as_ref().map(|t| t.code.clone()).unwrap_or_default(),
        year_from: query.year_from,
        year_to: query.year_to,
        mileage_from: query.mileage_from,
        mileage_to: query.mileage_to,
        color_code,
        region_code: query.location.clone(),
    };

    let cars = match state.kbchachacha.search(&filter).await {
        Ok(cars) => cars,
        Err(e) => {
            warn!(user_id = ctx.user_id, error = %e, "KbChaChaCha search failed");
            Vec::new()
        }
    };

    let Some(car) = cars.first() else {
        ctx.send(
            format!(
                "😔 К сожалению, по вашему запросу ничего не найдено.\n\n{}\nЦвет: {color_ru}",
                summary(&query)
            ),
            ui_builder::after_results_keyboard(),
        )
        .await?;
        return Ok(());
    };

    let caption = format!(
        "🚗 <b>{}</b>\n📆 Год: {}\n🏁 Пробег: {}\n📍 Регион: {}\n💰 Цена: {}만원\n\n🔗 <a href='{}'>Подробнее на KbChaChaCha</a>",
        translate(&car.title),
        car.year,
        car.mileage,
        translate(&car.region),
        car.price,
        car.link,
    );
    send_card(ctx, &car.image_url, caption).await?;

    ctx.send(
        format!(
            "✅ Показан результат поиска по запросу:\n\n{}\nЦвет: {color_ru}",
            summary(&query)
        ),
        ui_builder::after_results_keyboard(),
    )
    .await
}

/// Photo with caption when the image URL is usable, plain text otherwise.
pub(super) async fn send_card(ctx: &CallbackCtx<'_>, image_url: &str, caption: String) -> Result<()> {
    if let Ok(url) = image_url.parse::<url::Url>() {
        let sent = ctx
            .bot
            .send_photo(ctx.chat_id, InputFile::url(url))
            .caption(caption.clone())
            .parse_mode(ParseMode::Html)
            .await;
        if sent.is_ok() {
            return Ok(());
        }
    }
    ctx.send_html(caption).await
}
