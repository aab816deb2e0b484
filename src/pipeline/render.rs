//! Markdown to note HTML.

use pulldown_cmark::{Options, Parser, html};

/// Render generated markdown into the HTML body stored on a note.
pub fn render_note_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::empty());
    let mut rendered = String::with_capacity(markdown.len() + markdown.len() / 2);
    html::push_html(&mut rendered, parser);
    rendered.trim_end().to_string()
}
