//! Standardized embeds for command responses and the mod log

use poise::serenity_prelude::{Colour, CreateEmbed};

pub const EMBED_COLOR: Colour = Colour::new(0x5865F2);
pub const SUCCESS_COLOR: Colour = Colour::new(0x57F287);
pub const ERROR_COLOR: Colour = Colour::new(0xED4245);
pub const WARNING_COLOR: Colour = Colour::new(0xFEE75C);
pub const INFO_COLOR: Colour = Colour::new(0x3B82F6);

fn base(icon: &str, title: &str, description: &str, color: Colour) -> CreateEmbed {
    CreateEmbed::new()
        .title(format!("{icon} {title}"))
        .description(description.to_string())
        .colour(color)
}

/// Green embed for completed actions
#[must_use]
pub fn success(title: &str, description: &str) -> CreateEmbed {
    base("✅", title, description, SUCCESS_COLOR)
}

/// Red embed for hard failures
#[must_use]
pub fn error(title: &str, description: &str) -> CreateEmbed {
    base("❌", title, description, ERROR_COLOR)
}

/// Yellow embed for punitive actions
#[must_use]
pub fn warning(title: &str, description: &str) -> CreateEmbed {
    base("⚠️", title, description, WARNING_COLOR)
}

/// Blue embed for informational notices and benign no-ops
#[must_use]
pub fn info(title: &str, description: &str) -> CreateEmbed {
    base("ℹ️", title, description, INFO_COLOR)
}
