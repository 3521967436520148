//! Markdown rendering used to inspect what a document will display.
//!
//! Content is rendered to HTML (raw HTML passes through, as on the
//! marketplace) and then parsed so image sources and inline vector markup
//! can be examined.

use std::sync::LazyLock;

use pulldown_cmark::{html, Options, Parser};
use scraper::{Html, Selector};

static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").expect("valid selector"));
static SVG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("svg").expect("valid selector"));

/// What a rendered markdown document embeds.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RenderedMarkdown {
    /// `src` of every `<img>` in document order.
    pub image_sources: Vec<String>,
    /// Whether the document contains an inline `<svg>` element.
    pub has_svg: bool,
}

pub fn render_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

pub fn inspect_markdown(markdown: &str) -> RenderedMarkdown {
    let document = Html::parse_fragment(&render_to_html(markdown));
    RenderedMarkdown {
        image_sources: document
            .select(&IMG)
            .filter_map(|img| img.value().attr("src"))
            .map(str::to_string)
            .collect(),
        has_svg: document.select(&SVG).next().is_some(),
    }
}
