//! Markdown rendering service
//!
//! Converts post bodies to HTML with pulldown-cmark. Fenced code blocks are
//! highlighted with syntect in the palette of the visitor's colour theme.
//! `mermaid` blocks are passed through for the client-side diagram renderer.
//!
//! # Example
//!
//! ```
//! use mysite_web::services::markdown::MarkdownRenderer;
//! use mysite_web::services::theme::Theme;
//!
//! let renderer = MarkdownRenderer::new();
//! let html = renderer.render("# Hello World\n\nThis is **bold** text.", Theme::default());
//! assert!(html.contains("<h1>"));
//! assert!(html.contains("<strong>"));
//! ```

use once_cell::sync::Lazy;
use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

use crate::services::theme::Theme;

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

/// Used when a colour theme names a syntect theme that is not bundled
const FALLBACK_SYNTAX_THEME: &str = "base16-ocean.dark";

/// Language hint of diagram blocks rendered in the browser
const MERMAID_LANG: &str = "mermaid";

/// A thread-safe Markdown renderer with syntax highlighting support.
///
/// Supports headings, lists, links and images, blockquotes, tables, task
/// lists, strikethrough, smart punctuation and highlighted code.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Renders Markdown text to HTML, highlighting code for `theme`.
    ///
    /// Code blocks without a language hint are rendered as plain code.
    pub fn render(&self, markdown: &str, theme: Theme) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);

        let parser = Parser::new_ext(markdown, options);
        let events = self.process_events(parser, theme);

        let mut html_output = String::new();
        html::push_html(&mut html_output, events.into_iter());
        html_output
    }

    /// Processes parser events, replacing code blocks with highlighted HTML.
    fn process_events<'a>(&self, parser: Parser<'a>, theme: Theme) -> Vec<Event<'a>> {
        let mut events = Vec::new();
        let mut in_code_block = false;
        let mut code_lang: Option<String> = None;
        let mut code_content = String::new();

        for event in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    in_code_block = true;
                    code_content.clear();
                    code_lang = match kind {
                        CodeBlockKind::Fenced(lang) => {
                            // Info strings like "rust,ignore" carry extra attributes
                            let lang = lang.split([',', ' ']).next().unwrap_or_default().trim();
                            if lang.is_empty() {
                                None
                            } else {
                                Some(lang.to_string())
                            }
                        }
                        CodeBlockKind::Indented => None,
                    };
                }
                Event::End(TagEnd::CodeBlock) => {
                    in_code_block = false;

                    let block = match code_lang.as_deref() {
                        Some(MERMAID_LANG) => mermaid_block(&code_content),
                        Some(lang) => self.highlight_code(&code_content, lang, theme),
                        None => plain_code_block(&code_content),
                    };

                    events.push(Event::Html(block.into()));
                    code_lang = None;
                }
                Event::Text(text) if in_code_block => {
                    code_content.push_str(&text);
                }
                _ => {
                    events.push(event);
                }
            }
        }

        events
    }

    /// Highlights a code block, or renders it plain with a language class
    /// when the language is not recognized.
    fn highlight_code(&self, code: &str, lang: &str, theme: Theme) -> String {
        let syntax = SYNTAX_SET
            .find_syntax_by_token(lang)
            .or_else(|| SYNTAX_SET.find_syntax_by_extension(lang));

        let Some(syntax) = syntax else {
            return plain_code_block_with_lang(code, lang);
        };

        let syntect_theme = THEME_SET
            .themes
            .get(theme.syntax_theme())
            .or_else(|| THEME_SET.themes.get(FALLBACK_SYNTAX_THEME));

        match syntect_theme {
            Some(syntect_theme) => highlighted_html_for_string(code, &SYNTAX_SET, syntax, syntect_theme)
                .unwrap_or_else(|e| {
                    tracing::debug!(lang, "Highlighting failed: {}", e);
                    plain_code_block_with_lang(code, lang)
                }),
            None => plain_code_block_with_lang(code, lang),
        }
    }
}

fn mermaid_block(code: &str) -> String {
    format!("<pre class=\"mermaid\">{}</pre>", html_escape(code))
}

/// Renders a plain code block without syntax highlighting.
fn plain_code_block(code: &str) -> String {
    format!("<pre><code>{}</code></pre>", html_escape(code))
}

/// Renders a plain code block with a language class.
fn plain_code_block_with_lang(code: &str, lang: &str) -> String {
    format!(
        "<pre><code class=\"language-{}\">{}</code></pre>",
        html_escape(lang),
        html_escape(code)
    )
}

/// Escapes HTML special characters in a string.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(markdown: &str) -> String {
        MarkdownRenderer::new().render(markdown, Theme::Tageslicht)
    }

    #[test]
    fn test_render_headings() {
        let html = render("# H1\n## H2\n### H3");
        assert!(html.contains("<h1>H1</h1>"));
        assert!(html.contains("<h2>H2</h2>"));
        assert!(html.contains("<h3>H3</h3>"));
    }

    #[test]
    fn test_render_inline_styles() {
        let html = render("This is **bold**, *italic* and ~~gone~~.");
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<em>italic</em>"));
        assert!(html.contains("<del>gone</del>"));
    }

    #[test]
    fn test_render_table_and_tasks() {
        let html = render("| a | b |\n|---|---|\n| 1 | 2 |\n\n- [x] done\n- [ ] todo");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>1</td>"));
        assert!(html.contains("type=\"checkbox\""));
    }

    #[test]
    fn test_render_link_and_image() {
        let html = render("[site](https://example.com) ![alt](/img.png)");
        assert!(html.contains("<a href=\"https://example.com\">site</a>"));
        assert!(html.contains("<img src=\"/img.png\" alt=\"alt\""));
    }

    #[test]
    fn test_highlighted_code_follows_theme() {
        let renderer = MarkdownRenderer::new();
        let markdown = "```rust\nfn main() {}\n```";

        let light = renderer.render(markdown, Theme::Tageslicht);
        let dark = renderer.render(markdown, Theme::Halloween);

        assert!(light.contains("<pre style="));
        assert!(dark.contains("<pre style="));
        assert_ne!(light, dark);
    }

    #[test]
    fn test_unknown_language_is_plain_with_class() {
        let html = render("```nosuchlang\n<b>x</b>\n```");
        assert!(html.contains("<code class=\"language-nosuchlang\">"));
        assert!(html.contains("&lt;b&gt;x&lt;/b&gt;"));
    }

    #[test]
    fn test_code_without_language_is_plain() {
        let html = render("```\nlet a = 1 < 2;\n```");
        assert!(html.contains("<pre><code>let a = 1 &lt; 2;\n</code></pre>"));
    }

    #[test]
    fn test_info_string_attributes_are_ignored() {
        let html = render("```rust,ignore\nfn main() {}\n```");
        assert!(html.contains("<pre style="));
    }

    #[test]
    fn test_mermaid_blocks_pass_through() {
        let html = render("```mermaid\ngraph TD; A-->B;\n```");
        assert!(html.contains("<pre class=\"mermaid\">graph TD; A--&gt;B;\n</pre>"));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<a href=\"x\">'&'</a>"), "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;");
    }
}
