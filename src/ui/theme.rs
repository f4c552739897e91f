//! Theme palettes. Dark is Tokyo Night derived; light is the clean
//! professional variant. Per-kind colors drive both message headers and the
//! minimap columns, so the two stay visually linked.

use ratatui::style::{Color, Modifier, Style};

use crate::meta::MessageKind;

#[derive(Clone, Copy)]
pub struct ThemePalette {
    pub accent: Color,
    pub accent_alt: Color,
    pub bg: Color,
    pub fg: Color,
    pub surface: Color,
    pub hint: Color,
    pub border: Color,
    pub user: Color,
    pub assistant: Color,
    pub tool_call: Color,
    pub tool_reply: Color,
    pub system: Color,
}

impl ThemePalette {
    /// Dark theme - premium, refined, easy on the eyes
    pub fn dark() -> Self {
        Self {
            accent: Color::Rgb(122, 162, 247),     // #7aa2f7
            accent_alt: Color::Rgb(187, 154, 247), // #bb9af7
            bg: Color::Rgb(26, 27, 38),            // #1a1b26
            fg: Color::Rgb(192, 202, 245),         // #c0caf5
            surface: Color::Rgb(36, 40, 59),       // #24283b
            hint: Color::Rgb(105, 114, 158),       // #696e9e
            border: Color::Rgb(59, 66, 97),        // #3b4261
            user: Color::Rgb(158, 206, 106),       // soft sage green
            assistant: Color::Rgb(122, 162, 247),  // matches accent
            tool_call: Color::Rgb(255, 158, 100),  // warm peach
            tool_reply: Color::Rgb(115, 218, 202), // muted teal
            system: Color::Rgb(224, 175, 104),     // soft amber
        }
    }

    /// Light theme - clean, minimal, professional
    pub fn light() -> Self {
        Self {
            accent: Color::Rgb(47, 107, 231),     // Rich blue
            accent_alt: Color::Rgb(124, 93, 198), // Purple
            bg: Color::Rgb(250, 250, 252),        // Off-white
            fg: Color::Rgb(36, 41, 46),           // Near-black
            surface: Color::Rgb(240, 241, 245),   // Light gray
            hint: Color::Rgb(125, 134, 144),      // Medium gray
            border: Color::Rgb(216, 222, 228),    // Border gray
            user: Color::Rgb(45, 138, 72),        // Forest green
            assistant: Color::Rgb(47, 107, 231),  // Rich blue
            tool_call: Color::Rgb(207, 107, 44),  // Warm orange
            tool_reply: Color::Rgb(23, 134, 166), // Sea blue
            system: Color::Rgb(177, 133, 41),     // Amber
        }
    }

    pub fn kind_color(self, kind: MessageKind) -> Color {
        match kind {
            MessageKind::User => self.user,
            MessageKind::Assistant => self.assistant,
            MessageKind::ToolCall => self.tool_call,
            MessageKind::ToolReply => self.tool_reply,
            MessageKind::System => self.system,
        }
    }

    pub fn kind_style(self, kind: MessageKind) -> Style {
        Style::default().fg(self.kind_color(kind))
    }

    /// Title style - accent colored with bold modifier
    pub fn title(self) -> Style {
        Style::default()
            .fg(self.accent)
            .add_modifier(Modifier::BOLD)
    }

    pub fn hint_style(self) -> Style {
        Style::default().fg(self.hint)
    }

    pub fn border_style(self) -> Style {
        Style::default().fg(self.border)
    }

    /// Highlighted text style - for search matches and the active message
    pub fn highlight_style(self) -> Style {
        Style::default()
            .fg(self.bg)
            .bg(self.accent)
            .add_modifier(Modifier::BOLD)
    }
}
