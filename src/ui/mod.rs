//! Embeds y formato de texto de las respuestas del bot.

pub mod embeds;
pub mod format;
