//! Line-oriented rendering of lightweight markup into styled terminal lines.
//!
//! Covers the subset assistant models actually produce: headings, fenced code
//! (syntax-highlighted), emphasis, inline code, lists, blockquotes and
//! horizontal rules. Reasoning segments render through the same inline rules
//! but dimmed and bar-prefixed, as a visually secondary container.

use once_cell::sync::Lazy;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::SyntaxSet;

use crate::stream::Segment;

struct HighlightAssets {
    syntax_set: SyntaxSet,
    theme: Theme,
}

static ASSETS: Lazy<HighlightAssets> = Lazy::new(|| {
    let syntax_set = SyntaxSet::load_defaults_newlines();
    let mut themes = ThemeSet::load_defaults();
    let theme = themes
        .themes
        .remove("base16-ocean.dark")
        .unwrap_or_else(|| themes.themes.into_values().next().expect("bundled themes"));
    HighlightAssets { syntax_set, theme }
});

fn terminal_color(c: syntect::highlighting::Color) -> Color {
    Color::Rgb(c.r, c.g, c.b)
}

/// Render a full markup body into lines.
pub fn render_markdown(text: &str) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut fence_lang: Option<String> = None;

    for raw_line in text.split('\n') {
        if raw_line.trim_start().starts_with("```") {
            match fence_lang.take() {
                Some(_) => lines.push(fence_border()),
                None => {
                    fence_lang = Some(extract_fence_lang(raw_line.trim_start()).to_string());
                    lines.push(fence_border());
                }
            }
            continue;
        }

        if let Some(lang) = &fence_lang {
            lines.push(highlight_code_line(raw_line, lang));
        } else {
            lines.push(render_block_line(raw_line));
        }
    }
    lines
}

/// Render alternating main/reasoning segments into one list of lines.
pub fn render_segments(segments: &[Segment]) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for segment in segments {
        match segment {
            Segment::Main(text) => lines.extend(render_markdown(text)),
            Segment::Reasoning(text) => lines.extend(render_reasoning(text)),
        }
    }
    lines
}

/// Reasoning container: every line dimmed, italicized and bar-prefixed. An
/// empty segment still shows the open container.
pub fn render_reasoning(text: &str) -> Vec<Line<'static>> {
    let bar = Span::styled("│ ", Style::default().fg(Color::DarkGray));
    let base = Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::ITALIC);

    // `split('\n')` yields one (empty) item even for an empty segment, so an
    // unterminated tag with no content still produces the container line.
    text.split('\n')
        .map(|body| {
            let mut spans = vec![bar.clone()];
            spans.extend(parse_inline(body, base));
            Line::from(spans)
        })
        .collect()
}

/// Language token after the opening backticks, if any.
pub fn extract_fence_lang(fence: &str) -> &str {
    fence.trim_start_matches('`').trim()
}

fn fence_border() -> Line<'static> {
    Line::from(vec![Span::styled(
        "```".to_string(),
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM),
    )])
}

/// Highlight one line of fenced code, falling back to plain text when no
/// syntax definition matches the fence language.
pub fn highlight_code_line(line: &str, lang: &str) -> Line<'static> {
    let assets = &*ASSETS;
    let syntax = if lang.is_empty() {
        None
    } else {
        assets.syntax_set.find_syntax_by_token(lang)
    };

    let Some(syntax) = syntax else {
        return Line::from(vec![Span::styled(
            line.to_string(),
            Style::default().fg(Color::Gray),
        )]);
    };

    let mut highlighter = HighlightLines::new(syntax, &assets.theme);
    match highlighter.highlight_line(line, &assets.syntax_set) {
        Ok(regions) => Line::from(
            regions
                .into_iter()
                .map(|(style, piece)| {
                    let mut out = Style::default().fg(terminal_color(style.foreground));
                    if style
                        .font_style
                        .contains(syntect::highlighting::FontStyle::BOLD)
                    {
                        out = out.add_modifier(Modifier::BOLD);
                    }
                    if style
                        .font_style
                        .contains(syntect::highlighting::FontStyle::ITALIC)
                    {
                        out = out.add_modifier(Modifier::ITALIC);
                    }
                    Span::styled(piece.to_string(), out)
                })
                .collect::<Vec<_>>(),
        ),
        Err(_) => Line::from(vec![Span::styled(
            line.to_string(),
            Style::default().fg(Color::Gray),
        )]),
    }
}

/// Block-level rules for a single non-code line.
fn render_block_line(text: &str) -> Line<'static> {
    let body = Style::default().fg(Color::White);

    if text == "---" || text == "***" || text == "___" {
        return Line::from(vec![Span::styled(
            "──────────────────────────────".to_string(),
            Style::default().fg(Color::DarkGray),
        )]);
    }

    if text.starts_with('#') {
        let stripped = text.trim_start_matches('#');
        let level = text.len() - stripped.len();
        let heading = stripped.strip_prefix(' ').unwrap_or(stripped);
        if level <= 6 && !heading.is_empty() {
            let style = match level {
                1 => Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                2 => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                _ => Style::default().fg(Color::Cyan),
            };
            return Line::from(parse_inline(heading, style));
        }
    }

    if let Some(quote) = text.strip_prefix("> ") {
        let dim = Style::default().fg(Color::DarkGray);
        let mut spans = vec![Span::styled("▌ ".to_string(), dim)];
        spans.extend(parse_inline(quote, dim));
        return Line::from(spans);
    }

    if let Some(item) = text.strip_prefix("- ").or_else(|| text.strip_prefix("* ")) {
        let mut spans = vec![Span::styled(
            "• ".to_string(),
            Style::default().fg(Color::Cyan),
        )];
        spans.extend(parse_inline(item, body));
        return Line::from(spans);
    }

    if let Some(dot) = text.find(". ") {
        if dot > 0 && dot <= 3 && text[..dot].bytes().all(|b| b.is_ascii_digit()) {
            let mut spans = vec![Span::styled(
                text[..dot + 2].to_string(),
                Style::default().fg(Color::Cyan),
            )];
            spans.extend(parse_inline(&text[dot + 2..], body));
            return Line::from(spans);
        }
    }

    Line::from(parse_inline(text, body))
}

/// Inline rules: `**bold**`, `*italic*`, `` `code` ``.
fn parse_inline(text: &str, base: Style) -> Vec<Span<'static>> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut i = 0;
    let mut seg_start = 0;

    while i < len {
        if bytes[i] == b'`' {
            if let Some(end) = text[i + 1..].find('`') {
                if i > seg_start {
                    spans.push(Span::styled(text[seg_start..i].to_string(), base));
                }
                spans.push(Span::styled(
                    text[i + 1..i + 1 + end].to_string(),
                    Style::default().fg(Color::Yellow),
                ));
                i = i + 1 + end + 1;
                seg_start = i;
                continue;
            }
        } else if bytes[i] == b'*' && i + 1 < len && bytes[i + 1] == b'*' {
            if let Some(end) = text[i + 2..].find("**") {
                if i > seg_start {
                    spans.push(Span::styled(text[seg_start..i].to_string(), base));
                }
                spans.extend(parse_inline(
                    &text[i + 2..i + 2 + end],
                    base.add_modifier(Modifier::BOLD),
                ));
                i = i + 2 + end + 2;
                seg_start = i;
                continue;
            }
        } else if bytes[i] == b'*' {
            if let Some(end) = text[i + 1..].find('*') {
                if end > 0 {
                    if i > seg_start {
                        spans.push(Span::styled(text[seg_start..i].to_string(), base));
                    }
                    spans.extend(parse_inline(
                        &text[i + 1..i + 1 + end],
                        base.add_modifier(Modifier::ITALIC),
                    ));
                    i = i + 1 + end + 1;
                    seg_start = i;
                    continue;
                }
            }
        }
        i += text[i..].chars().next().map_or(1, |c| c.len_utf8());
    }

    if seg_start < len {
        spans.push(Span::styled(text[seg_start..].to_string(), base));
    }
    if spans.is_empty() {
        spans.push(Span::styled(String::new(), base));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.to_string()).collect()
    }

    #[test]
    fn heading_keeps_its_text_and_drops_the_hashes() {
        let lines = render_markdown("## Setup");
        assert_eq!(lines.len(), 1);
        assert_eq!(flat(&lines[0]), "Setup");
    }

    #[test]
    fn bold_and_code_split_into_styled_spans() {
        let lines = render_markdown("a **b** `c`");
        assert_eq!(flat(&lines[0]), "a b c");
        assert!(lines[0].spans.len() >= 3);
    }

    #[test]
    fn fenced_code_is_highlighted_between_borders() {
        let lines = render_markdown("```rust\nlet x = 1;\n```");
        assert_eq!(lines.len(), 3);
        assert_eq!(flat(&lines[1]), "let x = 1;");
        assert!(
            lines[1].spans.len() > 1,
            "rust code should tokenize into multiple spans"
        );
    }

    #[test]
    fn unknown_fence_language_falls_back_to_plain() {
        let lines = render_markdown("```xyzzy99\nsome text\n```");
        assert_eq!(flat(&lines[1]), "some text");
    }

    #[test]
    fn extract_fence_lang_handles_common_shapes() {
        assert_eq!(extract_fence_lang("```rust"), "rust");
        assert_eq!(extract_fence_lang("```"), "");
        assert_eq!(extract_fence_lang("```py "), "py");
    }

    #[test]
    fn reasoning_lines_are_bar_prefixed() {
        let lines = render_reasoning("first\nsecond");
        assert_eq!(lines.len(), 2);
        assert!(flat(&lines[0]).starts_with("│ "));
        assert!(flat(&lines[1]).contains("second"));
    }

    #[test]
    fn empty_reasoning_still_renders_the_container() {
        let lines = render_reasoning("");
        assert_eq!(lines.len(), 1);
        assert_eq!(flat(&lines[0]).trim(), "│");
    }

    #[test]
    fn segments_render_in_order() {
        let lines = render_segments(&[
            Segment::Main("answer".into()),
            Segment::Reasoning("why".into()),
        ]);
        assert_eq!(lines.len(), 2);
        assert_eq!(flat(&lines[0]), "answer");
        assert!(flat(&lines[1]).contains("why"));
    }
}
