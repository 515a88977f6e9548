use crate::agent::AgentResponse;
use crate::document::Metadata;
use crate::index::SourceNode;

pub const SOURCES_NOT_FOUND: &str = "Sources for this are not found";

/// Outcome of looking up the first source node of a response
#[derive(Debug, PartialEq)]
pub enum SourceLookup<'a> {
    Found(&'a SourceNode),
    NotFound,
}

/// Synthesized answer of the first tool call, when the call reached a query engine
pub fn raw_tool_output(response: &AgentResponse) -> Option<&str> {
    response
        .sources
        .first()?
        .raw_output
        .as_ref()
        .map(|raw| raw.response.as_str())
}

pub fn first_source(response: &AgentResponse) -> SourceLookup<'_> {
    match response.source_nodes.first() {
        Some(node) => SourceLookup::Found(node),
        None => SourceLookup::NotFound,
    }
}

/// What the UI shows under "Source Information"
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSection {
    Found { metadata: Metadata, excerpt: String },
    NotFound,
}

impl SourceSection {
    /// Metadata rendered as a JSON object
    pub fn metadata_text(metadata: &Metadata) -> String {
        serde_json::to_string(metadata).unwrap_or_else(|_| format!("{:?}", metadata))
    }
}

/// A response reduced to the pieces the UI displays
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedResponse {
    pub raw_output: Option<String>,
    pub answer: String,
    pub source: SourceSection,
}

impl RenderedResponse {
    pub fn from_response(response: &AgentResponse) -> Self {
        let source = match first_source(response) {
            SourceLookup::Found(node) => SourceSection::Found {
                metadata: node.metadata.clone(),
                excerpt: node.text.clone(),
            },
            SourceLookup::NotFound => SourceSection::NotFound,
        };

        RenderedResponse {
            raw_output: raw_tool_output(response).map(str::to_string),
            answer: response.response.clone(),
            source,
        }
    }

    /// Plain-text rendering, one item per line
    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(raw) = &self.raw_output {
            lines.push(raw.clone());
        }
        lines.push(format!("Response: {}", self.answer));
        lines.push("Source Information".to_string());
        match &self.source {
            SourceSection::Found { metadata, excerpt } => {
                lines.push(format!(
                    "Source Document: {}",
                    SourceSection::metadata_text(metadata)
                ));
                lines.push(format!("Excerpt: {}", excerpt));
            }
            SourceSection::NotFound => lines.push(SOURCES_NOT_FOUND.to_string()),
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_engine::{QueryResponse, ToolOutput};

    fn node(text: &str) -> SourceNode {
        let mut metadata = Metadata::new();
        metadata.insert("file_name".to_string(), "report.pdf".to_string());
        metadata.insert("file_type".to_string(), "application/pdf".to_string());
        SourceNode {
            id: "report.pdf#0".to_string(),
            text: text.to_string(),
            metadata,
            score: 0.9,
        }
    }

    fn response(source_nodes: Vec<SourceNode>, sources: Vec<ToolOutput>) -> AgentResponse {
        AgentResponse {
            response: "Revenue was $10M.".to_string(),
            sources,
            source_nodes,
        }
    }

    #[test]
    fn test_empty_sources_render_not_found() {
        let rendered = RenderedResponse::from_response(&response(Vec::new(), Vec::new()));

        assert_eq!(rendered.source, SourceSection::NotFound);
        assert_eq!(rendered.raw_output, None);
        assert_eq!(
            rendered.to_lines(),
            vec![
                "Response: Revenue was $10M.",
                "Source Information",
                "Sources for this are not found",
            ]
        );
    }

    #[test]
    fn test_first_source_rendered_unmodified() {
        let excerpt = "  Revenue was $10M\n\n<b>audited</b>  ";
        let resp = response(vec![node(excerpt), node("second")], Vec::new());

        assert_eq!(first_source(&resp), SourceLookup::Found(&resp.source_nodes[0]));

        let rendered = RenderedResponse::from_response(&resp);
        match &rendered.source {
            SourceSection::Found { metadata, excerpt: shown } => {
                assert_eq!(shown, excerpt);
                assert_eq!(metadata, &resp.source_nodes[0].metadata);
            }
            SourceSection::NotFound => panic!("expected a source"),
        }

        let lines = rendered.to_lines();
        assert_eq!(
            lines[2],
            r#"Source Document: {"file_name":"report.pdf","file_type":"application/pdf"}"#
        );
        assert_eq!(lines[3], format!("Excerpt: {}", excerpt));
    }

    #[test]
    fn test_raw_tool_output() {
        let with_raw = ToolOutput {
            tool_name: "index".to_string(),
            raw_input: "revenue".to_string(),
            content: "Revenue was $10M".to_string(),
            raw_output: Some(QueryResponse {
                response: "Revenue was $10M".to_string(),
                source_nodes: vec![node("Revenue was $10M")],
            }),
        };
        let without_raw = ToolOutput {
            raw_output: None,
            ..with_raw.clone()
        };

        let resp = response(Vec::new(), vec![with_raw]);
        assert_eq!(raw_tool_output(&resp), Some("Revenue was $10M"));
        assert_eq!(RenderedResponse::from_response(&resp).to_lines()[0], "Revenue was $10M");

        let resp = response(Vec::new(), vec![without_raw]);
        assert_eq!(raw_tool_output(&resp), None);
    }
}
