use crate::render::{RenderedResponse, SourceSection, SOURCES_NOT_FOUND};

pub const TITLE: &str = "Document Chat Interface";
pub const UPLOAD_SUCCESS: &str = "Documents uploaded and indexed successfully!";
pub const NO_INDEX_NOTICE: &str = "No documents have been indexed yet. Upload a PDF to get started.";

/// Sidebar status after the last upload
#[derive(Debug, Clone, PartialEq)]
pub enum StatusLine {
    Success(String),
    Failure(String),
}

/// Everything one page render shows
#[derive(Debug, Clone, Default)]
pub struct PageView {
    pub status: Option<StatusLine>,
    pub question: String,
    pub rendered: Option<RenderedResponse>,
    pub notice: Option<String>,
    pub error: Option<String>,
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn render_page(view: &PageView) -> String {
    let status = match &view.status {
        Some(StatusLine::Success(msg)) => {
            format!(r#"<p class="status success">{}</p>"#, escape_html(msg))
        }
        Some(StatusLine::Failure(msg)) => {
            format!(r#"<p class="status failure">{}</p>"#, escape_html(msg))
        }
        None => String::new(),
    };

    let mut output = String::new();
    if let Some(notice) = &view.notice {
        output.push_str(&format!(r#"<p class="notice">{}</p>"#, escape_html(notice)));
    }
    if let Some(error) = &view.error {
        output.push_str(&format!(r#"<pre class="error">{}</pre>"#, escape_html(error)));
    }
    if let Some(rendered) = &view.rendered {
        output.push_str(&render_response(rendered));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ display: flex; margin: 0; font-family: sans-serif; }}
aside {{ width: 18rem; min-height: 100vh; padding: 1rem; background: #f0f2f6; }}
main {{ flex: 1; padding: 1rem 2rem; }}
.success {{ color: #1b7f3b; }}
.failure, .error {{ color: #b00020; }}
.excerpt {{ white-space: pre-wrap; }}
</style>
</head>
<body>
<aside>
<form action="/upload" method="post" enctype="multipart/form-data">
<label for="files">Upload Documents</label>
<input id="files" type="file" name="files" accept=".pdf,application/pdf" multiple>
<button type="submit">Upload</button>
</form>
{status}
</aside>
<main>
<h1>{title}</h1>
<form action="/query" method="post">
<label for="question">Ask a question</label>
<input id="question" type="text" name="question" value="{question}">
<button type="submit">Submit Query</button>
</form>
{output}
</main>
</body>
</html>
"#,
        title = TITLE,
        status = status,
        question = escape_html(&view.question),
        output = output,
    )
}

fn render_response(rendered: &RenderedResponse) -> String {
    let mut html = String::new();
    if let Some(raw) = &rendered.raw_output {
        html.push_str(&format!("<p>{}</p>\n", escape_html(raw)));
    }
    html.push_str(&format!(
        "<p><strong>Response:</strong> {}</p>\n<h3>Source Information</h3>\n",
        escape_html(&rendered.answer)
    ));
    match &rendered.source {
        SourceSection::Found { metadata, excerpt } => {
            html.push_str(&format!(
                "<p><strong>Source Document:</strong> <code>{}</code></p>\n<p><strong>Excerpt:</strong></p>\n<div class=\"excerpt\">{}</div>\n",
                escape_html(&SourceSection::metadata_text(metadata)),
                escape_html(excerpt)
            ));
        }
        SourceSection::NotFound => {
            html.push_str(&format!("<p>{}</p>\n", SOURCES_NOT_FOUND));
        }
    }
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_empty_page() {
        let html = render_page(&PageView::default());
        assert!(html.contains("<h1>Document Chat Interface</h1>"));
        assert!(html.contains(r#"accept=".pdf,application/pdf" multiple"#));
        assert!(html.contains("Submit Query"));
        assert!(!html.contains("Response:"));
    }

    #[test]
    fn test_page_with_answer_and_source() {
        let mut metadata = Metadata::new();
        metadata.insert("file_name".to_string(), "report.pdf".to_string());
        let view = PageView {
            status: Some(StatusLine::Success(UPLOAD_SUCCESS.to_string())),
            question: "What was the <revenue>?".to_string(),
            rendered: Some(RenderedResponse {
                raw_output: None,
                answer: "Revenue was $10M.".to_string(),
                source: SourceSection::Found {
                    metadata,
                    excerpt: "Revenue was $10M".to_string(),
                },
            }),
            ..PageView::default()
        };

        let html = render_page(&view);
        assert!(html.contains(UPLOAD_SUCCESS));
        assert!(html.contains(r#"value="What was the &lt;revenue&gt;?""#));
        assert!(html.contains("<strong>Response:</strong> Revenue was $10M."));
        assert!(html.contains("{&quot;file_name&quot;:&quot;report.pdf&quot;}"));
        assert!(html.contains(r#"<div class="excerpt">Revenue was $10M</div>"#));
    }

    #[test]
    fn test_page_without_sources() {
        let view = PageView {
            rendered: Some(RenderedResponse {
                raw_output: Some("raw".to_string()),
                answer: "No idea.".to_string(),
                source: SourceSection::NotFound,
            }),
            ..PageView::default()
        };

        let html = render_page(&view);
        assert!(html.contains("<p>raw</p>"));
        assert!(html.contains(SOURCES_NOT_FOUND));
    }
}
