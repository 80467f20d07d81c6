use nu_ansi_term::{Color, Style};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// ANSI reset, emitted after every colored run.
pub const RESET: &str = "\x1b[0m";

/// Terminal attribute markers understood by [`ColorBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorAttr {
    Normal,
    Bold,
    Underline,
    Reverse,
    Invisible,
    Red,
    Green,
    Blue,
    Cyan,
    Yellow,
    Magenta,
    Grey,
}

impl ColorAttr {
    fn style(self) -> Option<Style> {
        let style = match self {
            ColorAttr::Normal => return None,
            ColorAttr::Bold => Style::new().bold(),
            ColorAttr::Underline => Style::new().underline(),
            ColorAttr::Reverse => Style::new().reverse(),
            ColorAttr::Invisible => Style::new().hidden(),
            ColorAttr::Red => Color::Red.bold(),
            ColorAttr::Green => Color::Green.bold(),
            ColorAttr::Blue => Color::Blue.bold(),
            ColorAttr::Cyan => Color::Cyan.bold(),
            ColorAttr::Yellow => Color::Yellow.bold(),
            ColorAttr::Magenta => Color::Purple.bold(),
            ColorAttr::Grey => Color::Black.bold(),
        };
        Some(style)
    }

    /// The escape sequence that switches this attribute on.
    pub fn escape(self) -> String {
        match self.style() {
            Some(style) => style.prefix().to_string(),
            None => RESET.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Attr(ColorAttr),
}

/// Ordered text and attribute markers. Renders with or without escapes and
/// truncates by visible width without leaving an attribute open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorBuffer {
    segments: Vec<Segment>,
    use_color: bool,
}

impl ColorBuffer {
    pub fn new(use_color: bool) -> Self {
        Self {
            segments: Vec::new(),
            use_color,
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn use_color(&self) -> bool {
        self.use_color
    }

    pub fn append(mut self, text: &str) -> Self {
        self.segments.push(Segment::Text(text.to_string()));
        self
    }

    /// Appends every segment of another buffer.
    pub fn append_buffer(mut self, other: &ColorBuffer) -> Self {
        self.segments.extend(other.segments.iter().cloned());
        self
    }

    pub fn attr(mut self, attr: ColorAttr) -> Self {
        self.segments.push(Segment::Attr(attr));
        self
    }

    /// Appends `text` wrapped in `attr` ... NORMAL.
    pub fn styled(self, attr: ColorAttr, text: &str) -> Self {
        self.attr(attr).append(text).attr(ColorAttr::Normal)
    }

    pub fn bold(self, text: &str) -> Self {
        self.styled(ColorAttr::Bold, text)
    }

    pub fn red(self, text: &str) -> Self {
        self.styled(ColorAttr::Red, text)
    }

    pub fn green(self, text: &str) -> Self {
        self.styled(ColorAttr::Green, text)
    }

    pub fn blue(self, text: &str) -> Self {
        self.styled(ColorAttr::Blue, text)
    }

    pub fn cyan(self, text: &str) -> Self {
        self.styled(ColorAttr::Cyan, text)
    }

    pub fn yellow(self, text: &str) -> Self {
        self.styled(ColorAttr::Yellow, text)
    }

    /// Left-aligns `text` in a field of `width` characters.
    pub fn pad(self, text: &str, width: usize) -> Self {
        self.append(&pad(text, width))
    }

    /// Centers `text` in a field of `width` characters; odd padding goes right.
    pub fn center(self, text: &str, width: usize) -> Self {
        self.append(&center(text, width))
    }

    /// Number of terminal columns the text occupies.
    pub fn visible_len(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Text(text) => display_width(text),
                Segment::Attr(_) => 0,
            })
            .sum()
    }

    /// Keeps at most `len` visible columns. If the last attribute kept is
    /// not NORMAL, a NORMAL marker closes it.
    pub fn truncate(&self, len: usize) -> ColorBuffer {
        let mut out = ColorBuffer::new(self.use_color);
        let mut visible = 0;
        let mut last_attr = None;

        for segment in &self.segments {
            if visible >= len {
                break;
            }
            match segment {
                Segment::Attr(attr) => {
                    last_attr = Some(*attr);
                    out.segments.push(Segment::Attr(*attr));
                }
                Segment::Text(text) => {
                    let count = display_width(text);
                    if visible + count > len {
                        let kept = take_width(text, len - visible);
                        visible = len;
                        out.segments.push(Segment::Text(kept));
                    } else {
                        visible += count;
                        out.segments.push(Segment::Text(text.clone()));
                    }
                }
            }
        }

        if matches!(last_attr, Some(attr) if attr != ColorAttr::Normal) {
            out.segments.push(Segment::Attr(ColorAttr::Normal));
        }
        out
    }

    /// Text with escape sequences.
    pub fn colored(&self) -> String {
        self.segments.iter().fold(String::new(), |mut acc, segment| {
            match segment {
                Segment::Text(text) => acc.push_str(text),
                Segment::Attr(attr) => acc.push_str(&attr.escape()),
            }
            acc
        })
    }

    /// Text only.
    pub fn mono(&self) -> String {
        self.segments.iter().fold(String::new(), |mut acc, segment| {
            if let Segment::Text(text) = segment {
                acc.push_str(text);
            }
            acc
        })
    }

    pub fn render(&self) -> String {
        if self.use_color {
            self.colored()
        } else {
            self.mono()
        }
    }
}

/// Terminal columns, so wide CJK characters count twice and combining marks
/// not at all.
pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

/// Longest prefix of `text` that fits in `width` columns.
pub fn take_width(text: &str, width: usize) -> String {
    let mut used = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        out.push(c);
    }
    out
}

pub fn pad(text: &str, width: usize) -> String {
    let mut out = text.to_string();
    let len = display_width(text);
    if len < width {
        out.extend(std::iter::repeat_n(' ', width - len));
    }
    out
}

pub fn center(text: &str, width: usize) -> String {
    let len = display_width(text);
    if len >= width {
        return text.to_string();
    }
    let total = width - len;
    let left = total / 2;
    let right = total - left;
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(right))
}
