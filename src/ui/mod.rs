//! # UI Module
//!
//! Embeds de Discord que publica el bot.

pub mod embeds;
