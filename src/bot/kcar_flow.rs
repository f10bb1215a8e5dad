//! KCar search funnel: manufacturer, model group, generation, grade, years,
//! mileage, color. The final step scrapes the listing page and shows up to
//! five cards.

use anyhow::Result;
use chrono::Datelike;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::warn;

use super::{kbchachacha_flow::send_card, ui_builder, AppState, CallbackCtx};
use crate::marketplace::kcar::ListingFilter;
use crate::session::{FacetChoice, Marketplace, SearchQuery};
use crate::translation::{kcar_color, translate};
use crate::years::parse_short_year_span;

fn current_year() -> i32 {
    chrono::Utc::now().year()
}

/// Native name with its translation in parentheses when they differ.
fn display_name(native: &str) -> String {
    let translated = translate(native);
    if translated == native {
        native.to_string()
    } else {
        format!("{translated} ({native})")
    }
}

fn summary(query: &SearchQuery) -> String {
    let mut lines = Vec::new();
    if let Some(m) = &query.manufacturer {
        lines.push(format!("Марка: {}", display_name(&m.name)));
    }
    if let Some(m) = &query.model_group {
        lines.push(format!("Модель: {}", display_name(&m.name)));
    }
    if let Some(m) = &query.model {
        lines.push(format!("Поколение: {}", display_name(&m.name)));
    }
    if let Some(t) = &query.trim {
        lines.push(format!("Конфигурация: {}", display_name(&t.name)));
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
        .update(ctx.user_id, |q| q.marketplace = Some(Marketplace::Kcar))
        .await;

    let manufacturers = state.kcar.manufacturers().await;
    if manufacturers.is_empty() {
        ctx.bot
            .send_message(ctx.chat_id, "Не удалось загрузить марки.")
            .await?;
        return Ok(());
    }

    let buttons = manufacturers
        .iter()
        .map(|m| {
            InlineKeyboardButton::callback(
                m.english_name.clone(),
                format!("kcar_brand_{}_{}", m.code, m.name),
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

    let model_groups = state.kcar.model_groups(code).await;
    if model_groups.is_empty() {
        ctx.bot
            .send_message(ctx.chat_id, "Не удалось загрузить модели.")
            .await?;
        return Ok(());
    }

    let buttons = model_groups
        .iter()
        .map(|m| {
            InlineKeyboardButton::callback(
                translate(&m.name),
                format!("kcar_model_{}_{}", m.code, m.name),
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
    let models = state.kcar.models(&maker_code, code).await;
    if models.is_empty() {
        ctx.bot
            .send_message(ctx.chat_id, "Не удалось загрузить поколения.")
            .await?;
        return Ok(());
    }

    let buttons = models
        .iter()
        .map(|m| {
            InlineKeyboardButton::callback(
                translate(&m.name),
                format!("kcar_gen_{}_{}", m.code, m.name),
            )
        })
        .collect();
    ctx.edit(
        format!("{}\nТеперь выбери поколение:", summary(&query)),
        ui_builder::rows(buttons, 2),
    )
    .await
}

/// Stores the generation; its production years come from the short span in
/// the name, like `(19~24년)` or `20년~현재`.
pub async fn on_generation(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let Some((code, name)) = payload.split_once('_') else {
        return Ok(());
    };

    let now = current_year();
    let years = parse_short_year_span(name, now)
        .map(|r| (r.from, r.to))
        .unwrap_or((now - 5, now));

    state
        .sessions
        .update(ctx.user_id, |q| {
            q.model = Some(FacetChoice::new(code, name));
            q.generation_years = Some(years);
        })
        .await;

    let query = state.sessions.get_or_create(ctx.user_id).await;
    let maker_code = query.manufacturer.as_ref().map(|m| m.code.clone()).unwrap_or_default();
    let model_group_code = query.model_group.as_ref().map(|m| m.code.clone()).unwrap_or_default();
    let grades = state.kcar.grades(&maker_code, &model_group_code, code).await;
    if grades.is_empty() {
        ctx.bot
            .send_message(ctx.chat_id, "Не удалось загрузить конфигурации.")
            .await?;
        return Ok(());
    }

    let buttons = grades
        .iter()
        .map(|g| {
            InlineKeyboardButton::callback(
                translate(&g.name),
                format!("kcar_config_{}_{}", g.code, g.name),
            )
        })
        .collect();
    ctx.edit(
        format!("{}\nВыберите конфигурацию:", summary(&query)),
        ui_builder::rows(buttons, 2),
    )
    .await
}

pub async fn on_config(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
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
        ui_builder::year_keyboard(start, end.min(now), "kcar_year_from_"),
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
        ui_builder::year_keyboard(year, end.max(year), "kcar_year_to_"),
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
        ui_builder::kcar_mileage_keyboard(0, "kcar_mileage_from_"),
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
        format!("Выбран минимальный пробег: {mileage} км\nТеперь выберите максимальный пробег:"),
        ui_builder::kcar_mileage_keyboard(mileage + 50_000, "kcar_mileage_to_"),
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
        ui_builder::color_keyboard(Marketplace::Kcar),
    )
    .await
}

/// Final step: run the scrape and show every extracted card.
pub async fn on_color(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let color = (payload != "all").then(|| payload.to_string());
    let color_ru = color
        .as_deref()
        .map(|kr| kcar_color(kr).unwrap_or(kr).to_string())
        .unwrap_or_else(|| "Любой".to_string());
    state
        .sessions
        .update(ctx.user_id, |q| q.color = color)
        .await;

    let query = state.sessions.get_or_create(ctx.user_id).await;
    ctx.bot
        .send_message(
            ctx.chat_id,
            format!(
                "✅ Поиск на KCar с параметрами:\n\n{}\nЦвет: {color_ru}\n\nПожалуйста, подождите, идет поиск автомобилей...",
                summary(&query)
            ),
        )
        .await?;

    let filter = ListingFilter {
        manufacturer_code: query.manufacturer.as_ref().map(|m| m.code.clone()).unwrap_or_default(),
        model_group_code: query.model_group.as_ref().map(|m| m.code.clone()).unwrap_or_default(),
        model_code: query.model.as_ref().map(|m| m.code.clone()).unwrap_or_default(),
        year_from: query.year_from,
        year_to: query.year_to,
        mileage_from: query.mileage_from,
        mileage_to: query.mileage_to,
        color: query.color.clone(),
    };

    let cars = match state.kcar.search(&filter).await {
        Ok(cars) => cars,
        Err(e) => {
            warn!(user_id = ctx.user_id, error = %e, "KCar search failed");
            Vec::new()
        }
    };

    if cars.is_empty() {
        // Link to the same search on the site with only the model filter,
        // so the user can loosen the criteria there.
        let site_filter = ListingFilter {
            manufacturer_code: filter.manufacturer_code.clone(),
            model_group_code: filter.model_group_code.clone(),
            model_code: filter.model_code.clone(),
            ..Default::default()
        };
        let site_url = crate::marketplace::kcar::search_page_url(&site_filter);
        let markup = InlineKeyboardMarkup::new(vec![
            vec![InlineKeyboardButton::url(
                "Просмотреть на сайте KCar",
                site_url.parse()?,
            )],
            vec![InlineKeyboardButton::callback("➕ Новый поиск", "search_car")],
            vec![InlineKeyboardButton::callback("🏠 Главное меню", "start")],
        ]);
        ctx.send(
            "❌ К сожалению, автомобили с указанными параметрами не найдены.\n\nПопробуйте изменить критерии поиска или посмотреть все доступные автомобили данной модели на сайте KCar по ссылке ниже.".to_string(),
            markup,
        )
        .await?;
        return Ok(());
    }

    ctx.bot
        .send_message(ctx.chat_id, format!("✅ Найдено автомобилей: {}", cars.len()))
        .await?;

    for car in &cars {
        let mut text = format!(
            "🚗 <b>{}</b>\n\n💰 <b>Цена:</b> {}\n📅 <b>Год:</b> {}\n🛣 <b>Пробег:</b> {}\n⛽️ <b>Топливо:</b> {}\n📍 <b>Местоположение:</b> {}\n",
            translate(&car.title),
            car.price,
            car.year,
            car.mileage,
            translate(&car.fuel_type),
            translate(&car.location),
        );
        if !car.description.is_empty() {
            text.push_str(&format!("\n📝 <b>Описание:</b> {}\n", translate(&car.description)));
        }
        if !car.labels.is_empty() {
            let labels: Vec<String> = car.labels.iter().map(|l| translate(l)).collect();
            text.push_str(&format!("\n🏷 <b>Особенности:</b> {}\n", labels.join(", ")));
        }
        text.push_str(&format!("\n🔎 <a href='{}'>Подробнее на сайте KCar</a>", car.link));
        send_card(ctx, &car.image_url, text).await?;
    }

    ctx.send(
        "Что вы хотите сделать дальше?".to_string(),
        ui_builder::after_results_keyboard(),
    )
    .await
}
