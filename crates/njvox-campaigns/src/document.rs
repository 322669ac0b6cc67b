use async_trait::async_trait;
use njvox_core::error::Result;

/// One text run inside a paragraph, with the only styling the envelope
/// is allowed to carry.
#[derive(Debug, Clone, Default)]
pub struct TextRun {
    pub content: String,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphStyle {
    Heading1,
    Heading2,
    Heading3,
    Normal,
}

#[derive(Debug, Clone)]
pub struct Paragraph {
    pub style: ParagraphStyle,
    pub runs: Vec<TextRun>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentBody {
    pub paragraphs: Vec<Paragraph>,
}

/// Fetches a campaign body under the user's delegated document-service
/// credentials. Campaigns only ever `read`.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn read(&self, doc_ref: &str) -> Result<DocumentBody>;
}

fn escape(run: &str) -> String {
    run.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn render_run(run: &TextRun) -> String {
    let mut text = escape(&run.content);
    if run.bold {
        text = format!("<strong>{text}</strong>");
    }
    if run.italic {
        text = format!("<em>{text}</em>");
    }
    if run.underline {
        text = format!("<u>{text}</u>");
    }
    text
}

fn render_paragraph(paragraph: &Paragraph) -> Option<String> {
    let body: String = paragraph.runs.iter().map(render_run).collect();
    if body.trim().is_empty() {
        return None;
    }
    Some(match paragraph.style {
        ParagraphStyle::Heading1 => format!("<h1>{body}</h1>"),
        ParagraphStyle::Heading2 => format!("<h2>{body}</h2>"),
        ParagraphStyle::Heading3 => format!("<h3>{body}</h3>"),
        ParagraphStyle::Normal => format!("<p>{body}</p>"),
    })
}

/// Restricts `doc` to the allowed subset (paragraphs, headings,
/// bold/italic/underline) and wraps it in the standard envelope
/// carrying an unfilled `{{unsubscribe_url}}` placeholder for the
/// provider to fill in at send time.
pub fn render_envelope(doc: &DocumentBody) -> String {
    let body: String = doc.paragraphs.iter().filter_map(render_paragraph).collect();
    format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
{body}\
<hr style=\"margin-top: 40px; border: none; border-top: 1px solid #ccc;\">\
<p style=\"font-size: 12px; color: #666; text-align: center;\">\
<a href=\"{{{{unsubscribe_url}}}}\">Unsubscribe</a> from future emails</p>\
</div>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_headings_and_styled_runs() {
        let doc = DocumentBody {
            paragraphs: vec![
                Paragraph {
                    style: ParagraphStyle::Heading1,
                    runs: vec![TextRun {
                        content: "Hello".into(),
                        bold: true,
                        ..Default::default()
                    }],
                },
                Paragraph {
                    style: ParagraphStyle::Normal,
                    runs: vec![TextRun {
                        content: "world".into(),
                        italic: true,
                        ..Default::default()
                    }],
                },
            ],
        };
        let html = render_envelope(&doc);
        assert!(html.contains("<h1><strong>Hello</strong></h1>"));
        assert!(html.contains("<p><em>world</em></p>"));
        assert!(html.contains("{{unsubscribe_url}}"));
    }

    #[test]
    fn empty_paragraphs_are_dropped() {
        let doc = DocumentBody {
            paragraphs: vec![Paragraph {
                style: ParagraphStyle::Normal,
                runs: vec![TextRun::default()],
            }],
        };
        let html = render_envelope(&doc);
        assert!(!html.contains("<p></p>"));
    }

    #[test]
    fn escapes_html_metacharacters() {
        let doc = DocumentBody {
            paragraphs: vec![Paragraph {
                style: ParagraphStyle::Normal,
                runs: vec![TextRun {
                    content: "<script>".into(),
                    ..Default::default()
                }],
            }],
        };
        let html = render_envelope(&doc);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
