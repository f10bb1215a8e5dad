//! # Carwatch Telegram Bot
//!
//! A Telegram bot that builds used-car searches against three Korean
//! marketplaces (Encar, KbChaChaCha, KCar) through an inline-keyboard
//! funnel, then polls the Encar catalog in the background and notifies
//! subscribers about new listings.

pub mod access;
pub mod bot;
pub mod marketplace;
pub mod poller;
pub mod requests;
pub mod session;
pub mod translation;
pub mod years;
