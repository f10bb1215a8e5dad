//! Telegram layer: command handling, callback dispatch, funnel flows.
//!
//! - `message_handler`: commands and awaited free-text input
//! - `callback_handler`: inline keyboard dispatch to the funnel flows
//! - `encar_flow`, `kbchachacha_flow`, `kcar_flow`: one module per site
//! - `ui_builder`: keyboards and formatting

pub mod callback_handler;
pub mod encar_flow;
pub mod kbchachacha_flow;
pub mod kcar_flow;
pub mod message_handler;
pub mod ui_builder;

pub use callback_handler::callback_handler;
pub use message_handler::message_handler;

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, MessageId, ParseMode};

use crate::access::AccessList;
use crate::marketplace::encar::EncarClient;
use crate::marketplace::kbchachacha::KbChaChaChaClient;
use crate::marketplace::kcar::KcarClient;
use crate::poller::{PollerRegistry, SeenListings};
use crate::requests::RequestBook;
use crate::session::SessionStore;

/// Everything the handlers share. Injected once from `main` and cloned as
/// an `Arc` into each dispatch branch.
pub struct AppState {
    pub sessions: SessionStore,
    pub access: AccessList,
    pub requests: RequestBook,
    pub encar: Arc<EncarClient>,
    pub kbchachacha: KbChaChaChaClient,
    pub kcar: KcarClient,
    pub seen: Arc<SeenListings>,
    pub pollers: PollerRegistry,
}

impl AppState {
    pub fn new(access_path: &str, requests_path: &str) -> Self {
        let http = crate::marketplace::build_http_client();
        Self {
            sessions: SessionStore::new(),
            access: AccessList::load(access_path),
            requests: RequestBook::load(requests_path),
            encar: Arc::new(EncarClient::new(http.clone())),
            kbchachacha: KbChaChaChaClient::new(http.clone()),
            kcar: KcarClient::new(http),
            seen: Arc::new(SeenListings::default()),
            pollers: PollerRegistry::default(),
        }
    }
}

/// Where a callback came from and where replies go.
pub struct CallbackCtx<'a> {
    pub bot: &'a Bot,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub user_id: u64,
}

impl CallbackCtx<'_> {
    /// Replace the funnel message in place, keeping the chat uncluttered.
    pub async fn edit(&self, text: String, markup: InlineKeyboardMarkup) -> Result<()> {
        self.bot
            .edit_message_text(self.chat_id, self.message_id, text)
            .reply_markup(markup)
            .await?;
        Ok(())
    }

    pub async fn edit_plain(&self, text: String) -> Result<()> {
        self.bot
            .edit_message_text(self.chat_id, self.message_id, text)
            .await?;
        Ok(())
    }

    pub async fn send(&self, text: String, markup: InlineKeyboardMarkup) -> Result<()> {
        self.bot
            .send_message(self.chat_id, text)
            .reply_markup(markup)
            .await?;
        Ok(())
    }

    pub async fn send_html(&self, text: String) -> Result<()> {
        self.bot
            .send_message(self.chat_id, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}
