//! Built-in text document converter
//!
//! Treats the upload as UTF-8 text split into pages by form feeds or `---`
//! separator lines, and renders it to HTML, Markdown or a JSON page list.

use async_trait::async_trait;
use lectern_core::OutputFormat;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tracing::debug;

use crate::entry::{ConversionContext, ConversionOutput, Converter};
use crate::error::ConversionError;

/// Option key: artificial delay per page, in milliseconds
pub const PAGE_DELAY_OPTION: &str = "page_delay_ms";

const STAGE_LABEL: &str = "Converting pages";

/// Renders page text to HTML. Loaded once per worker.
#[derive(Debug, Default)]
pub struct TextRenderer {
    pub title: Option<String>,
}

impl TextRenderer {
    pub fn escape(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&quot;"),
                '\'' => out.push_str("&#39;"),
                _ => out.push(c),
            }
        }
        out
    }

    pub fn render_page(&self, index: usize, text: &str) -> String {
        let paragraphs: String = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| format!("<p>{}</p>", Self::escape(p)))
            .collect();
        format!(
            "<section class=\"page\" data-page=\"{}\">{}</section>",
            index + 1,
            paragraphs
        )
    }

    pub fn render_document(&self, sections: &[String]) -> String {
        let title = self.title.as_deref().unwrap_or("Document");
        format!(
            concat!(
                "<!DOCTYPE html><html><head><meta charset=\"utf-8\">",
                "<title>{}</title></head><body>{}</body></html>",
            ),
            Self::escape(title),
            sections.concat()
        )
    }
}

/// Split text into pages on form feeds and lines that are exactly `---`
pub fn split_pages(text: &str) -> Vec<String> {
    let mut pages = Vec::new();
    for chunk in text.split('\x0c') {
        let mut current = String::new();
        for line in chunk.lines() {
            if line.trim_end() == "---" {
                pages.push(std::mem::take(&mut current));
            } else {
                current.push_str(line);
                current.push('\n');
            }
        }
        pages.push(current);
    }
    pages
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TextDocumentConverter;

impl TextDocumentConverter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Converter for TextDocumentConverter {
    type Resource = TextRenderer;

    fn name(&self) -> &'static str {
        "text"
    }

    fn supports(&self, _format: OutputFormat) -> bool {
        true
    }

    async fn convert(
        &self,
        ctx: &ConversionContext<'_, TextRenderer>,
    ) -> Result<ConversionOutput, ConversionError> {
        let bytes = tokio::fs::read(ctx.input_path()).await?;
        let text = String::from_utf8(bytes)
            .map_err(|_| ConversionError::InvalidInput("input is not valid UTF-8".into()))?;

        let pages = split_pages(&text);
        if pages.is_empty() {
            return Err(ConversionError::InvalidInput("document is empty".into()));
        }

        let title = ctx
            .input_path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());
        let renderer = ctx
            .resources()
            .get_or_init(|| async move { Ok::<_, Infallible>(TextRenderer { title }) })
            .await
            .unwrap_or_else(|never| match never {});

        let delay = ctx.option_u64(PAGE_DELAY_OPTION).map(Duration::from_millis);
        let format = ctx.output_format();
        debug!(job_id = %ctx.job_id(), pages = pages.len(), %format, "Converting text document");

        let mut stage = ctx.progress().stage(STAGE_LABEL, pages.len() as u64);
        let mut sections = Vec::with_capacity(pages.len());
        for (index, page) in pages.iter().enumerate() {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if format == OutputFormat::Html {
                sections.push(renderer.render_page(index, page));
            }
            stage.advance(1);
        }
        stage.finish();

        let result = match format {
            OutputFormat::Html => {
                ctx.publish_preview(sections.concat());
                json!({
                    "html": renderer.render_document(&sections),
                    "pages": pages.len(),
                })
            }
            OutputFormat::Markdown => json!({
                "markdown": pages.join("\n\n---\n\n"),
                "pages": pages.len(),
            }),
            OutputFormat::Json => json!({
                "pages": pages
                    .iter()
                    .enumerate()
                    .map(|(index, text)| json!({"index": index, "text": text}))
                    .collect::<Vec<_>>(),
            }),
        };

        Ok(ConversionOutput::new(result))
    }
}
