//! Inline keyboard dispatch.
//!
//! Callback payloads are routed by prefix to the marketplace flows; the
//! handful of shared actions (menu, saved requests, platform choice) live
//! here. Site-prefixed payloads are matched before the generic ones so
//! `kbcha_color_` never falls into `color_`.

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::{debug, warn};

use super::{encar_flow, kbchachacha_flow, kcar_flow, message_handler, ui_builder, AppState, CallbackCtx};
use crate::access::AccessList;

pub async fn callback_handler(bot: Bot, q: CallbackQuery, state: Arc<AppState>) -> Result<()> {
    let user_id = q.from.id.0;
    debug!(user_id, data = q.data.as_deref().unwrap_or(""), "Received callback query");

    if !(state.access.is_allowed(user_id).await || AccessList::is_manager(user_id)) {
        bot.answer_callback_query(q.id)
            .text("❌ У вас нет доступа к боту.")
            .await?;
        return Ok(());
    }

    let Some(msg) = &q.message else {
        bot.answer_callback_query(q.id).await?;
        return Ok(());
    };
    let ctx = CallbackCtx {
        bot: &bot,
        chat_id: msg.chat().id,
        message_id: msg.id(),
        user_id,
    };
    let data = q.data.as_deref().unwrap_or("");

    let handled = dispatch(&ctx, data, &state).await;
    if let Err(e) = handled {
        warn!(user_id, data, error = %e, "Callback handler failed");
    }

    bot.answer_callback_query(q.id).await?;
    Ok(())
}

async fn dispatch(ctx: &CallbackCtx<'_>, data: &str, state: &AppState) -> Result<()> {
    // Shared actions.
    match data {
        "start" => return show_main_menu(ctx).await,
        "search_car" => {
            return ctx
                .send(
                    "Выберите площадку для поиска:".to_string(),
                    ui_builder::platform_keyboard(),
                )
                .await;
        }
        "my_requests" => return show_my_requests(ctx, state).await,
        "delete_all_requests" => return delete_all_requests(ctx, state).await,
        "platform_encar" => return encar_flow::start(ctx, state).await,
        "platform_kbchachacha" => return kbchachacha_flow::start(ctx, state).await,
        "platform_kcar" => return kcar_flow::start(ctx, state).await,
        "any_price" => return encar_flow::on_any_price(ctx, state).await,
        "custom_price" => return encar_flow::on_custom_price(ctx, state).await,
        _ => {}
    }

    if let Some(rest) = data.strip_prefix("delete_request_") {
        return delete_request(ctx, rest, state).await;
    }

    // KbChaChaCha funnel.
    if let Some(rest) = data.strip_prefix("kbcha_brand_") {
        return kbchachacha_flow::on_brand(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("kbcha_model_") {
        return kbchachacha_flow::on_model(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("kbcha_gen_") {
        return kbchachacha_flow::on_generation(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("kbcha_trim_") {
        return kbchachacha_flow::on_trim(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("kbcha_year_from_") {
        return kbchachacha_flow::on_year_from(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("kbcha_year_to_") {
        return kbchachacha_flow::on_year_to(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("kbcha_mileage_from_") {
        return kbchachacha_flow::on_mileage_from(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("kbcha_mileage_to_") {
        return kbchachacha_flow::on_mileage_to(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("kbcha_color_") {
        return kbchachacha_flow::on_color(ctx, rest, state).await;
    }

    // KCar funnel.
    if let Some(rest) = data.strip_prefix("kcar_brand_") {
        return kcar_flow::on_brand(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("kcar_model_") {
        return kcar_flow::on_model(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("kcar_gen_") {
        return kcar_flow::on_generation(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("kcar_config_") {
        return kcar_flow::on_config(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("kcar_year_from_") {
        return kcar_flow::on_year_from(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("kcar_year_to_") {
        return kcar_flow::on_year_to(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("kcar_mileage_from_") {
        return kcar_flow::on_mileage_from(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("kcar_mileage_to_") {
        return kcar_flow::on_mileage_to(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("kcar_color_") {
        return kcar_flow::on_color(ctx, rest, state).await;
    }

    // Encar funnel.
    if let Some(rest) = data.strip_prefix("brand_") {
        return encar_flow::on_brand(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("model_") {
        return encar_flow::on_model(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("generation_") {
        return encar_flow::on_generation(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("trim_") {
        return encar_flow::on_trim(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("year_from_") {
        return encar_flow::on_year_from(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("year_to_") {
        return encar_flow::on_year_to(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("price_max_") {
        return encar_flow::on_price_max(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("location_") {
        return encar_flow::on_location(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("mileage_from_") {
        return encar_flow::on_mileage_from(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("mileage_to_") {
        return encar_flow::on_mileage_to(ctx, rest, state).await;
    }
    if let Some(rest) = data.strip_prefix("color_") {
        return encar_flow::on_color(ctx, rest, state).await;
    }

    debug!(data, "Unrecognized callback payload");
    Ok(())
}

async fn show_main_menu(ctx: &CallbackCtx<'_>) -> Result<()> {
    ctx.send(
        message_handler::welcome_text(),
        ui_builder::main_menu_keyboard(),
    )
    .await
}

async fn show_my_requests(ctx: &CallbackCtx<'_>, state: &AppState) -> Result<()> {
    let requests = state.requests.list(ctx.user_id).await;
    if requests.is_empty() {
        ctx.bot
            .send_message(ctx.chat_id, "У вас пока нет сохранённых запросов.")
            .await?;
        return Ok(());
    }

    for (idx, req) in requests.iter().enumerate() {
        let text = format!(
            "📌 Запрос #{}:\n{} / {} / {} / {}\nГод: {}-{}, Пробег: {}–{} км\nЦвет: {}",
            idx + 1,
            req.manufacturer,
            req.model_group,
            req.model,
            req.trim,
            req.year_from,
            req.year_to,
            req.mileage_from,
            req.mileage_to,
            req.color,
        );
        let markup = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
            format!("🗑 Удалить запрос #{}", idx + 1),
            format!("delete_request_{idx}"),
        )]]);
        ctx.send(text, markup).await?;
    }
    Ok(())
}

async fn delete_request(ctx: &CallbackCtx<'_>, payload: &str, state: &AppState) -> Result<()> {
    let Ok(index) = payload.parse::<usize>() else {
        return Ok(());
    };
    match state.requests.delete(ctx.user_id, index).await? {
        Some(_) => {
            let markup = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
                "🏠 Вернуться в главное меню",
                "start",
            )]]);
            ctx.edit("✅ Запрос успешно удалён.".to_string(), markup).await?;
        }
        None => {
            ctx.bot
                .send_message(ctx.chat_id, "⚠️ Запрос не найден.")
                .await?;
        }
    }
    Ok(())
}

async fn delete_all_requests(ctx: &CallbackCtx<'_>, state: &AppState) -> Result<()> {
    let had_any = state.requests.clear(ctx.user_id).await?;
    let text = if had_any {
        "✅ Все ваши запросы успешно удалены."
    } else {
        "⚠️ У вас нет сохранённых запросов."
    };
    ctx.bot.send_message(ctx.chat_id, text).await?;
    Ok(())
}
