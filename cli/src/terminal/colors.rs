use colored::Color;

pub const PRIMARY: Color = Color::BrightWhite;
pub const ACCENT: Color = Color::BrightGreen;
pub const SEPARATOR: Color = Color::BrightBlack;
pub const TEXT_DEFAULT: Color = Color::White;
pub const IPV4_ADDR: Color = Color::BrightBlue;
pub const IPV4_PREFIX: Color = Color::Blue;
pub const MAC_ADDR: Color = Color::Yellow;
pub const PORT: Color = Color::BrightMagenta;
pub const REMOVED: Color = Color::Red;
