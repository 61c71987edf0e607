//! Message list widget for displaying the conversation

use crate::theme::Theme;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};
use std::time::Instant;

use super::spinner::frame_at;

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Author {
    User,
    Assistant,
}

/// How an assistant message should be drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageState {
    #[default]
    Normal,
    /// Waiting on the service; content is empty
    Thinking,
    /// Paused by the user
    Paused,
    /// The request failed
    Error,
}

/// A single message in the chat, ready to draw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub author: Author,
    pub content: String,
    /// Preformatted timestamp shown beside the author, e.g. `14:05`
    pub time_label: Option<String>,
    pub state: MessageState,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            author: Author::User,
            content: content.into(),
            time_label: None,
            state: MessageState::Normal,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            author: Author::Assistant,
            content: content.into(),
            time_label: None,
            state: MessageState::Normal,
        }
    }

    /// An assistant message still waiting on its answer
    pub fn thinking() -> Self {
        Self {
            state: MessageState::Thinking,
            ..Self::assistant("")
        }
    }

    pub fn with_state(mut self, state: MessageState) -> Self {
        self.state = state;
        self
    }

    pub fn with_time(mut self, label: impl Into<String>) -> Self {
        self.time_label = Some(label.into());
        self
    }
}

/// Lay out one message as lines `width` columns wide
fn message_lines(
    msg: &ChatMessage,
    theme: &Theme,
    width: usize,
    spinner_start: Instant,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    let (name, header_style, prefix) = match msg.author {
        Author::User => ("You", theme.user_header(), "▶ "),
        Author::Assistant => ("Assistant", theme.assistant_header(), "◀ "),
    };

    let mut header = vec![Span::styled(format!("{}{}", prefix, name), header_style)];
    if let Some(time) = &msg.time_label {
        header.push(Span::styled(format!("  {}", time), theme.dim_style()));
    }
    lines.push(Line::from(header));

    if msg.state == MessageState::Thinking {
        let frame = frame_at(spinner_start.elapsed());
        lines.push(Line::from(Span::styled(
            format!("  {} thinking...", frame),
            theme.warning_style(),
        )));
    } else {
        let style: Style = match msg.state {
            MessageState::Error => theme.error_style(),
            MessageState::Paused => theme.paused_style(),
            _ => theme.base_style(),
        };
        let content_width = width.saturating_sub(2).max(1);
        for line in textwrap::wrap(&msg.content, content_width) {
            lines.push(Line::from(Span::styled(format!("  {}", line), style)));
        }
    }

    lines.push(Line::from(""));
    lines
}

/// Widget for displaying a list of chat messages
pub struct MessageList<'a> {
    messages: &'a [ChatMessage],
    theme: &'a Theme,
    scroll: usize,
    spinner_start: Instant,
}

impl<'a> MessageList<'a> {
    pub fn new(messages: &'a [ChatMessage], theme: &'a Theme) -> Self {
        Self {
            messages,
            theme,
            scroll: 0,
            spinner_start: Instant::now(),
        }
    }

    /// Number of lines to skip from the top
    pub fn scroll(mut self, scroll: usize) -> Self {
        self.scroll = scroll;
        self
    }

    /// Anchor the thinking animation so it doesn't restart every frame
    pub fn spinner_start(mut self, start: Instant) -> Self {
        self.spinner_start = start;
        self
    }
}

impl Widget for MessageList<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        let width = area.width as usize;
        let visible: Vec<Line> = self
            .messages
            .iter()
            .flat_map(|msg| message_lines(msg, self.theme, width, self.spinner_start))
            .skip(self.scroll)
            .take(area.height as usize)
            .collect();

        Paragraph::new(visible).render(area, buf);
    }
}

/// Total height of `messages` laid out `width` columns wide
pub fn calculate_message_height(messages: &[ChatMessage], width: usize) -> usize {
    let theme = Theme::default();
    let anchor = Instant::now();
    messages
        .iter()
        .map(|msg| message_lines(msg, &theme, width, anchor).len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_height_counts_header_body_and_separator() {
        let messages = vec![
            ChatMessage::user("What is the refund policy?"),
            ChatMessage::thinking(),
        ];
        assert_eq!(calculate_message_height(&messages, 80), 3 + 3);
    }

    #[test]
    fn test_long_content_wraps() {
        let text = "word ".repeat(20);
        let messages = vec![ChatMessage::assistant(text.trim_end())];
        // 99 chars in 18-column lines
        let height = calculate_message_height(&messages, 20);
        assert!(height > 3 + 4, "height was {}", height);
    }

    #[test]
    fn test_header_shows_time_label() {
        let msg = ChatMessage::user("hi").with_time("14:05");
        let lines = message_lines(&msg, &Theme::dark(), 40, Instant::now());
        let header: String = lines[0].spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(header, "▶ You  14:05");
    }

    #[test]
    fn test_thinking_has_no_content_lines() {
        let lines = message_lines(&ChatMessage::thinking(), &Theme::dark(), 40, Instant::now());
        assert_eq!(lines.len(), 3);
        let body: String = lines[1].spans.iter().map(|s| s.content.as_ref()).collect();
        assert!(body.ends_with("thinking..."));
    }

    #[test]
    fn test_paused_message_is_styled() {
        let theme = Theme::dark();
        let msg = ChatMessage::assistant("Response was paused.").with_state(MessageState::Paused);
        let lines = message_lines(&msg, &theme, 40, Instant::now());
        assert_eq!(lines[1].spans[0].style, theme.paused_style());
    }

    #[test]
    fn test_render_skips_scrolled_lines() {
        let theme = Theme::dark();
        let messages = vec![ChatMessage::user("first"), ChatMessage::assistant("second")];
        let area = Rect::new(0, 0, 20, 2);
        let mut buf = Buffer::empty(area);

        MessageList::new(&messages, &theme).scroll(3).render(area, &mut buf);

        let row: String = (0..area.width)
            .map(|x| buf[(x, 0)].symbol().to_string())
            .collect();
        assert!(row.starts_with("◀ Assistant"), "row was {:?}", row);
    }
}
