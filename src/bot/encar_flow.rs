//! Encar search funnel: brand, model, generation, trim, years, price,
//! location, mileage, color. The final step saves the request and spawns a
//! background poller.
//!
//! Every step reads and writes the session record; nothing is recovered
//! from previously rendered message text.

use anyhow::Result;
use chrono::Datelike;
use teloxide::prelude::*;
use teloxide::types::InlineKeyboardButton;
use tracing::info;

use super::{ui_builder, AppState, CallbackCtx};
use crate::marketplace::encar::Facet;
use crate::poller;
use crate::requests::SavedRequest;
use crate::session::{FacetChoice, Marketplace, PendingInput, SearchQuery};
use crate::translation::{encar_color, translate};
use crate::years::infer_year_range;

fn current_year() -> i32 {
    chrono::Utc::now().year()
}

/// Running summary of the selections so far, rebuilt from the session.
fn summary(query: &SearchQuery) -> String {
    let mut lines = Vec::new();
    if let Some(m) = &query.manufacturer {
        lines.push(format!("Марка: {} ({})", m.code, m.name));
    }
    if let Some(m) = &query.model_group {
        lines.push(format!("Модель: {} ({})", m.code, m.name));
    }
    if let Some(m) = &query.model {
        lines.push(format!("Поколение: {} ({})", translate(&m.code), translate(&m.name)));
    }
    if let Some(t) = &query.trim {
        lines.push(format!("Комплектация: {}", translate(&t.name)));
    }
    if let (Some(from), Some(to)) = (query.year_from, query.year_to) {
        lines.push(format!("Выбранный период: {from}-{to}"));
    }
    if query.price_from.is_some() || query.price_to.is_some() || query.location.is_some() {
        lines.push(format!(
            "Ценовой диапазон: {}",
            ui_builder::format_price_range(query.price_from, query.price_to)
        ));
    }
    if let Some(location) = &query.location {
        lines.push(format!("Локация: {}", translate(location)));
    } else if query.mileage_from.is_some() {
        lines.push("Локация: Любая".to_string());
    }
    if let (Some(from), Some(to)) = (query.mileage_from, query.mileage_to) {
        lines.push(format!("Пробег: {from}-{to} км"));
    }
    lines.join("\n")
}

/// `(01.2016 — 12.2022)` period from the facet's production dates.
fn period_label(facet: &Facet) -> String {
    fn format_date(raw: &Option<String>) -> Option<String> {
        let raw = raw.as_deref()?;
        if raw.len() == 6 {
            Some(format!("{}.{}", &raw[4..6], &raw[0..4]))
        } else {
            None
        }
    }
    match format_date(&facet.model_start_date) {
        Some(start) => {
            let end = format_date(&facet.model_end_date).unwrap_or_else(|| "н.в.".to_string());
            format!("({start} — {end})")
        }
        None => String::new(),
    }
}

/// Entry point from the platform menu.
pub async fn start(ctx: &CallbackCtx<'_>, state: &AppState) -> Result<()> {
    state.sessions.clear(ctx.user_id).await;
    state
        .sessions
        .update(ctx.user_id, |q| q.marketplace = Some(Marketplace::Encar))
        .await;

    let manufacturers = state.encar.manufacturers().await;
    if manufacturers.is_empty() {
        ctx.bot
            .send_message(ctx.chat_id, "Не удалось загрузить марки.")
            .await?;
        return Ok(());
    }

    let buttons = manufacturers
        .iter()
        .map(|f| {
            InlineKeyboardButton::callback(
                f.eng_name.clone(),
                format!("brand_{}_{}", f.eng_name, f.display_value),
            )
        })
        .collect();
    ctx.send(
        "Выбери марку автомобиля:".to_string(),
        ui_builder::rows(buttons, 2),
    )
    .await
}

/// Payload is `{eng}_{kr}`.
pub async fn on_brand(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let Some((eng, kr)) = payload.split_once('_') else {
        return Ok(());
    };
    state
        .sessions
        .update(ctx.user_id, |q| {
            q.manufacturer = Some(FacetChoice::new(eng, kr));
        })
        .await;

    let models = state.encar.models(kr).await;
    if models.is_empty() {
        ctx.bot
            .send_message(ctx.chat_id, "Не удалось загрузить модели.")
            .await?;
        return Ok(());
    }

    let buttons = models
        .iter()
        .map(|f| {
            InlineKeyboardButton::callback(
                f.eng_name.clone(),
                format!("model_{}_{}", f.eng_name, f.display_value),
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
    let Some((eng, kr)) = payload.split_once('_') else {
        return Ok(());
    };
    state
        .sessions
        .update(ctx.user_id, |q| {
            q.model_group = Some(FacetChoice::new(eng, kr));
        })
        .await;

    let query = state.sessions.get_or_create(ctx.user_id).await;
    let manufacturer = query.manufacturer.as_ref().map(|m| m.name.clone()).unwrap_or_default();
    let generations = state.encar.generations(&manufacturer, kr).await;
    if generations.is_empty() {
        ctx.bot
            .send_message(ctx.chat_id, "Не удалось загрузить поколения.")
            .await?;
        return Ok(());
    }

    let buttons = generations
        .iter()
        .map(|f| {
            let label = format!(
                "{} {} {}",
                f.eng_name,
                translate(&f.display_value),
                period_label(f)
            )
            .trim()
            .to_string();
            InlineKeyboardButton::callback(
                label,
                format!("generation_{}_{}", f.eng_name, f.display_value),
            )
        })
        .collect();
    ctx.edit(
        format!("{}\nТеперь выбери поколение:", summary(&query)),
        ui_builder::rows(buttons, 2),
    )
    .await
}

/// Stores the generation as the catalog-level model and infers its
/// production years from the facet data.
pub async fn on_generation(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let Some((eng, kr)) = payload.split_once('_') else {
        return Ok(());
    };

    let query = state.sessions.get_or_create(ctx.user_id).await;
    let manufacturer = query.manufacturer.as_ref().map(|m| m.name.clone()).unwrap_or_default();
    let model_group = query.model_group.as_ref().map(|m| m.name.clone()).unwrap_or_default();

    let generations = state.encar.generations(&manufacturer, &model_group).await;
    let selected = generations.iter().find(|f| {
        f.display_value == kr || f.display_value.contains(kr) || f.eng_name.contains(eng)
    });
    let years = selected
        .map(|f| infer_year_range(&f.generation_info(), current_year()))
        .unwrap_or_else(|| {
            infer_year_range(
                &crate::years::GenerationInfo {
                    start_raw: None,
                    end_raw: None,
                    label: eng.to_string(),
                    display: kr.to_string(),
                },
                current_year(),
            )
        });

    state
        .sessions
        .update(ctx.user_id, |q| {
            q.model = Some(FacetChoice::new(eng, kr));
            q.generation_years = Some((years.from, years.to));
            q.year_from = Some(years.from);
            q.year_to = Some(years.to);
        })
        .await;
    info!(user_id = ctx.user_id, from = years.from, to = years.to, "Inferred generation years");

    let trims = state.encar.trims(&manufacturer, &model_group, kr).await;
    if trims.is_empty() {
        ctx.bot
            .send_message(ctx.chat_id, "Не удалось загрузить комплектации.")
            .await?;
        return Ok(());
    }

    let buttons = trims
        .iter()
        .map(|f| {
            InlineKeyboardButton::callback(
                translate(&f.display_value),
                format!("trim_{}_{}", f.eng_name, f.display_value),
            )
        })
        .collect();
    let query = state.sessions.get_or_create(ctx.user_id).await;
    ctx.edit(
        format!("{}\nВыберите комплектацию:", summary(&query)),
        ui_builder::rows(buttons, 2),
    )
    .await
}

pub async fn on_trim(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let (eng, kr) = payload.split_once('_').unwrap_or((payload, payload));
    state
        .sessions
        .update(ctx.user_id, |q| {
            q.trim = Some(FacetChoice::new(eng, kr));
            q.year_from = None;
            q.year_to = None;
        })
        .await;

    let query = state.sessions.get_or_create(ctx.user_id).await;
    ctx.edit(
        format!("{}\n\nВыберите начальный год выпуска:", summary(&query)),
        ui_builder::year_keyboard(2000, current_year(), "year_from_"),
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
    ctx.edit(
        format!(
            "{}\n\nВыбран начальный год: {year}\nВыберите конечный год выпуска:",
            summary(&query)
        ),
        ui_builder::year_keyboard(year, current_year(), "year_to_"),
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
    ctx.edit(
        format!("{}\n\nВыберите ценовой диапазон:", summary(&query)),
        ui_builder::price_keyboard(),
    )
    .await
}

pub async fn on_any_price(ctx: &CallbackCtx<'_>, state: &AppState) -> Result<()> {
    state
        .sessions
        .update(ctx.user_id, |q| {
            q.price_from = None;
            q.price_to = None;
        })
        .await;
    ask_location(ctx, state).await
}

pub async fn on_price_max(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let Ok(max) = payload.parse::<i64>() else {
        return Ok(());
    };
    state
        .sessions
        .update(ctx.user_id, |q| {
            q.price_from = None;
            q.price_to = Some(max);
        })
        .await;
    ask_location(ctx, state).await
}

pub async fn on_custom_price(ctx: &CallbackCtx<'_>, state: &AppState) -> Result<()> {
    state
        .sessions
        .update(ctx.user_id, |q| {
            q.pending = Some(PendingInput::PriceFrom);
        })
        .await;
    let query = state.sessions.get_or_create(ctx.user_id).await;
    ctx.edit_plain(format!(
        "{}\n\nВведите начальную цену в миллионах вон (или введите 'Любой' для отсутствия нижнего предела).\nНапример: 5 (начиная от 5 млн ₩)",
        summary(&query)
    ))
    .await
}

async fn ask_location(ctx: &CallbackCtx<'_>, state: &AppState) -> Result<()> {
    let query = state.sessions.get_or_create(ctx.user_id).await;
    ctx.edit(
        format!("{}\n\nВыберите локацию:", summary(&query)),
        ui_builder::location_keyboard(),
    )
    .await
}

pub async fn on_location(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let location = (payload != "all").then(|| payload.to_string());
    state
        .sessions
        .update(ctx.user_id, |q| q.location = location)
        .await;

    let query = state.sessions.get_or_create(ctx.user_id).await;
    ctx.edit(
        format!("{}\n\nВыберите минимальный пробег:", summary(&query)),
        ui_builder::mileage_keyboard(0, "mileage_from_"),
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

    let query = state.sessions.get_or_create(ctx.user_id).await;
    ctx.edit(
        format!(
            "{}\nМинимальный пробег: {mileage} км\n\nВыберите максимальный пробег:",
            summary(&query)
        ),
        ui_builder::mileage_keyboard(mileage + 10_000, "mileage_to_"),
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
    ctx.edit(
        format!("{}\n\nВыберите цвет автомобиля:", summary(&query)),
        ui_builder::color_keyboard(Marketplace::Encar),
    )
    .await
}

/// Final funnel step: store the color, persist the request, start polling.
pub async fn on_color(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let color = (payload != "all").then(|| payload.to_string());
    state
        .sessions
        .update(ctx.user_id, |q| q.color = color)
        .await;

    let query = state.sessions.get_or_create(ctx.user_id).await;
    if !query.is_complete_for_encar() {
        ctx.bot
            .send_message(
                ctx.chat_id,
                "⚠️ Произошла ошибка: не все данные были сохранены. Пожалуйста, начните поиск заново.",
            )
            .await?;
        return Ok(());
    }

    let color_ru = query
        .color
        .as_deref()
        .map(|kr| encar_color(kr).unwrap_or(kr).to_string())
        .unwrap_or_else(|| "Любой".to_string());
    ctx.edit_plain(format!(
        "{}\nЦвет: {color_ru}\n\n🔍 Начинаем поиск автомобилей по заданным параметрам. Это может занять некоторое время...",
        summary(&query)
    ))
    .await?;

    let manufacturer = query.manufacturer.as_ref().map(|m| m.name.clone()).unwrap_or_default();
    let model_group = query.model_group.as_ref().map(|m| m.name.clone()).unwrap_or_default();
    let model = query.model.as_ref().map(|m| m.name.clone()).unwrap_or_default();
    let trim = query.trim.as_ref().map(|t| t.name.clone()).unwrap_or_default();

    ctx.bot
        .send_message(
            ctx.chat_id,
            format!(
                "📋 Ваш запрос:\n• {manufacturer} {model_group} {model}\n• Комплектация: {trim}\n• Год выпуска: {}-{}\n• Пробег: от {} до {} км\n• Цвет: {color_ru}",
                query.year_from.unwrap_or_default(),
                query.year_to.unwrap_or_default(),
                query.mileage_from.unwrap_or(0),
                query.mileage_to.unwrap_or(200_000),
            ),
        )
        .await?;

    state
        .requests
        .append(
            ctx.user_id,
            SavedRequest {
                manufacturer,
                model_group,
                model,
                trim,
                year_from: query.year_from.unwrap_or_default(),
                year_to: query.year_to.unwrap_or_default(),
                mileage_from: query.mileage_from.unwrap_or(0),
                mileage_to: query.mileage_to.unwrap_or(200_000),
                color: query.color.clone().unwrap_or_else(|| "all".to_string()),
            },
        )
        .await?;

    let token = state.pollers.register(ctx.user_id).await;
    tokio::spawn(poller::run(
        ctx.bot.clone(),
        ctx.chat_id,
        query,
        state.encar.clone(),
        state.seen.clone(),
        token,
    ));

    ctx.send(
        "Хотите добавить ещё один автомобиль в поиск или вернуться в главное меню?".to_string(),
        ui_builder::after_results_keyboard(),
    )
    .await
}
