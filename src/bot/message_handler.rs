//! Text message handling: commands and awaited free-text input.
//!
//! The bot waits for free text in exactly three places (both custom price
//! bounds and the manager's grant-access prompt); the session records which
//! one, so a stray message never lands in the wrong parser.

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{debug, info};

use super::{ui_builder, AppState};
use crate::access::AccessList;
use crate::session::PendingInput;

pub fn welcome_text() -> String {
    "👋 Добро пожаловать в бот от <b>UniTrading</b>!\n\n\
     С помощью этого бота вы можете:\n\
     • 🔍 Найти интересующий вас автомобиль\n\
     • 📬 Подписаться на соцсети и быть в курсе\n\n\
     <b>Выберите действие ниже:</b>"
        .to_string()
}

pub async fn message_handler(bot: Bot, msg: Message, state: Arc<AppState>) -> Result<()> {
    let Some(user) = &msg.from else {
        return Ok(());
    };
    let user_id = user.id.0;
    let Some(text) = msg.text() else {
        return Ok(());
    };
    debug!(user_id, "Received text message");

    match text.split_whitespace().next() {
        Some("/start") => return handle_start(&bot, &msg, user_id, &state).await,
        Some("/add_user") => return handle_add_user(&bot, &msg, user_id, &state).await,
        Some("/userlist") => return handle_userlist(&bot, &msg, user_id, &state).await,
        Some("/remove_user") => return handle_remove_user(&bot, &msg, user_id, text, &state).await,
        _ => {}
    }

    match state.sessions.take_pending(user_id).await {
        Some(PendingInput::PriceFrom) => handle_price_from(&bot, &msg, user_id, text, &state).await,
        Some(PendingInput::PriceTo) => handle_price_to(&bot, &msg, user_id, text, &state).await,
        Some(PendingInput::GrantUserId) => handle_grant_input(&bot, &msg, user_id, text, &state).await,
        None => Ok(()),
    }
}

async fn is_authorized(state: &AppState, user_id: u64) -> bool {
    state.access.is_allowed(user_id).await || AccessList::is_manager(user_id)
}

async fn handle_start(bot: &Bot, msg: &Message, user_id: u64, state: &AppState) -> Result<()> {
    if !is_authorized(state, user_id).await {
        bot.send_message(msg.chat.id, "❌ У вас нет доступа к этому боту.")
            .await?;
        return Ok(());
    }
    bot.send_message(msg.chat.id, welcome_text())
        .parse_mode(ParseMode::Html)
        .reply_markup(ui_builder::main_menu_keyboard())
        .await?;
    Ok(())
}

async fn handle_add_user(bot: &Bot, msg: &Message, user_id: u64, state: &AppState) -> Result<()> {
    if !AccessList::is_manager(user_id) {
        bot.send_message(msg.chat.id, "❌ У вас нет прав для добавления пользователей.")
            .await?;
        return Ok(());
    }
    state
        .sessions
        .update(user_id, |q| q.pending = Some(PendingInput::GrantUserId))
        .await;
    bot.send_message(
        msg.chat.id,
        "Введите ID пользователя для разрешения доступа к боту:",
    )
    .await?;
    Ok(())
}

async fn handle_grant_input(
    bot: &Bot,
    msg: &Message,
    user_id: u64,
    text: &str,
    state: &AppState,
) -> Result<()> {
    match text.trim().parse::<u64>() {
        Ok(new_user_id) => {
            state.access.add(new_user_id).await?;
            info!(granted_by = user_id, new_user_id, "Access granted");
            bot.send_message(
                msg.chat.id,
                format!("✅ Пользователю с ID {new_user_id} разрешён доступ к боту."),
            )
            .await?;
        }
        Err(_) => {
            bot.send_message(msg.chat.id, "⚠️ Введите корректный числовой ID.")
                .await?;
        }
    }
    Ok(())
}

async fn handle_userlist(bot: &Bot, msg: &Message, user_id: u64, state: &AppState) -> Result<()> {
    if !AccessList::is_reporter(user_id) {
        bot.send_message(msg.chat.id, "❌ У вас нет доступа к этой команде.")
            .await?;
        return Ok(());
    }
    let ids = state.access.all().await;
    if ids.is_empty() {
        bot.send_message(msg.chat.id, "❌ В списке доступа пока нет пользователей.")
            .await?;
        return Ok(());
    }
    let mut text = "📋 Список пользователей с доступом к боту:\n\n".to_string();
    for id in ids {
        text.push_str(&format!("• <code>{id}</code>\n"));
    }
    text.push_str("\nЧтобы удалить пользователя, отправьте команду:\n/remove_user [ID]");
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn handle_remove_user(
    bot: &Bot,
    msg: &Message,
    user_id: u64,
    text: &str,
    state: &AppState,
) -> Result<()> {
    if !AccessList::is_reporter(user_id) {
        bot.send_message(msg.chat.id, "❌ У вас нет доступа к этой команде.")
            .await?;
        return Ok(());
    }
    let Some(target) = text
        .split_whitespace()
        .nth(1)
        .and_then(|arg| arg.parse::<u64>().ok())
    else {
        bot.send_message(msg.chat.id, "⚠️ Использование: /remove_user [ID]")
            .await?;
        return Ok(());
    };
    if state.access.remove(target).await? {
        info!(removed_by = user_id, target, "Access revoked");
        bot.send_message(
            msg.chat.id,
            format!("✅ Пользователь {target} удалён из списка доступа."),
        )
        .await?;
    } else {
        bot.send_message(
            msg.chat.id,
            format!("⚠️ Пользователь {target} не найден в списке доступа."),
        )
        .await?;
    }
    Ok(())
}

/// "любой" (any case, or the English word) waives the bound.
fn parse_price_millions(text: &str) -> Result<Option<i64>, ()> {
    let text = text.trim().to_lowercase();
    if matches!(text.as_str(), "любой" | "любая" | "any") {
        return Ok(None);
    }
    text.parse::<i64>()
        .map(|millions| Some(millions * 1_000_000))
        .map_err(|_| ())
}

async fn handle_price_from(
    bot: &Bot,
    msg: &Message,
    user_id: u64,
    text: &str,
    state: &AppState,
) -> Result<()> {
    match parse_price_millions(text) {
        Ok(price) => {
            state
                .sessions
                .update(user_id, |q| {
                    q.price_from = price;
                    q.pending = Some(PendingInput::PriceTo);
                })
                .await;
            let display = match price {
                None => "Любая".to_string(),
                Some(p) => format!("{} млн ₩", p / 1_000_000),
            };
            bot.send_message(
                msg.chat.id,
                format!(
                    "Начальная цена: {display}\n\nТеперь введите конечную цену в миллионах вон (или введите 'Любой' для отсутствия верхнего предела).\nНапример: 15 (до 15 млн ₩)"
                ),
            )
            .await?;
        }
        Err(()) => {
            state
                .sessions
                .update(user_id, |q| q.pending = Some(PendingInput::PriceFrom))
                .await;
            bot.send_message(
                msg.chat.id,
                "❌ Неверный формат. Пожалуйста, введите цену в правильном формате (например: 5) или 'Любой'.",
            )
            .await?;
        }
    }
    Ok(())
}

async fn handle_price_to(
    bot: &Bot,
    msg: &Message,
    user_id: u64,
    text: &str,
    state: &AppState,
) -> Result<()> {
    match parse_price_millions(text) {
        Ok(price) => {
            state.sessions.update(user_id, |q| q.price_to = price).await;
            let query = state.sessions.get_or_create(user_id).await;
            bot.send_message(
                msg.chat.id,
                format!(
                    "Ценовой диапазон: {}\n\nВыберите локацию:",
                    ui_builder::format_price_range(query.price_from, query.price_to)
                ),
            )
            .reply_markup(ui_builder::location_keyboard())
            .await?;
        }
        Err(()) => {
            state
                .sessions
                .update(user_id, |q| q.pending = Some(PendingInput::PriceTo))
                .await;
            bot.send_message(
                msg.chat.id,
                "❌ Неверный формат. Пожалуйста, введите цену в правильном формате (например: 15) или 'Любой'.",
            )
            .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_input_parsing() {
        assert_eq!(parse_price_millions("5"), Ok(Some(5_000_000)));
        assert_eq!(parse_price_millions(" 15 "), Ok(Some(15_000_000)));
        assert_eq!(parse_price_millions("Любой"), Ok(None));
        assert_eq!(parse_price_millions("ЛЮБАЯ"), Ok(None));
        assert_eq!(parse_price_millions("any"), Ok(None));
        assert_eq!(parse_price_millions("дорого"), Err(()));
        assert_eq!(parse_price_millions("5.5"), Err(()));
    }
}
