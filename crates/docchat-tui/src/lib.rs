//! docchat-tui: Terminal UI components
//!
//! Widgets and key handling for the docchat terminal front end, built on
//! ratatui and crossterm. Nothing here knows about the conversation model;
//! the binary maps turns into [`widgets::ChatMessage`]s.

pub mod input;
pub mod theme;
pub mod widgets;

pub use input::Action;
pub use theme::Theme;
