//! Documentation ingestion
//!
//! Chunks markdown files along heading boundaries, carrying the heading
//! breadcrumb (`"Install > Linux"`) and 1-based line spans into each
//! chunk's payload. Oversized sections split on blank lines toward a ~2 KiB
//! chunk target; fenced code blocks are never cut.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use std::path::Path;
use std::time::Instant;
use walkdir::WalkDir;

use crate::adapters::providers::embedding::CachedEmbedder;
use crate::domain::error::{Error, Result};
use crate::domain::ports::{SharedVectorStore, StoreFilter};
use crate::domain::types::{
    ContextLevel, DocChunkPayload, DocIngestReport, Embedding, MemoryCategory, MemoryRecord,
    MemoryScope, CONTENT_MAX_BYTES,
};

/// Soft chunk size target in bytes
const CHUNK_TARGET: usize = 2048;

/// One extracted documentation chunk
#[derive(Debug, Clone, PartialEq)]
pub struct DocChunk {
    /// Chunk text
    pub content: String,
    /// Heading breadcrumb
    pub heading_path: String,
    /// 1-based first line
    pub start_line: u32,
    /// 1-based last line
    pub end_line: u32,
}

/// Markdown ingestion service
pub struct DocIngestor {
    store: SharedVectorStore,
    embedder: std::sync::Arc<CachedEmbedder>,
}

impl DocIngestor {
    /// Create an ingestor over the given store and embedder
    pub fn new(store: SharedVectorStore, embedder: std::sync::Arc<CachedEmbedder>) -> Self {
        Self { store, embedder }
    }

    /// Ingest every markdown file under `directory`
    pub async fn ingest_directory(
        &self,
        directory: &Path,
        project: Option<&str>,
    ) -> Result<DocIngestReport> {
        let started = Instant::now();
        if !directory.is_dir() {
            return Err(Error::not_found(format!(
                "directory {}",
                directory.display()
            )));
        }

        let files: Vec<_> = WalkDir::new(directory)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir() && e.file_name().to_string_lossy().starts_with('.'))
            })
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file()
                    && matches!(
                        e.path().extension().and_then(|x| x.to_str()),
                        Some("md") | Some("markdown")
                    )
            })
            .map(|e| e.into_path())
            .collect();

        let mut report = DocIngestReport::default();
        for path in files {
            let text = tokio::fs::read_to_string(&path).await?;
            let chunks = chunk_markdown(&text);
            if chunks.is_empty() {
                continue;
            }
            report.files_processed += 1;
            report.chunks += self.store_chunks(&path, project, chunks).await? as u32;
        }
        report.elapsed_s = started.elapsed().as_secs_f64();
        Ok(report)
    }

    async fn store_chunks(
        &self,
        path: &Path,
        project: Option<&str>,
        chunks: Vec<DocChunk>,
    ) -> Result<usize> {
        let path_str = path.display().to_string();
        let contents: Vec<String> = chunks
            .iter()
            .map(|c| {
                crate::services::indexing::truncate_utf8(
                    format!("{path_str}\n{}\n{}", c.heading_path, c.content),
                    CONTENT_MAX_BYTES,
                )
            })
            .collect();
        let encoded = self.embedder.encode_batch(&contents).await?;

        let mut records = Vec::with_capacity(chunks.len());
        for ((chunk, content), vector) in chunks.iter().zip(contents).zip(encoded.vectors) {
            let mut record = MemoryRecord::new(content, MemoryCategory::Doc);
            record.context_level = ContextLevel::ProjectContext;
            record.scope = match project {
                Some(_) => MemoryScope::Project,
                None => MemoryScope::Global,
            };
            record.project_name = project.map(str::to_string);
            record.embedding = Some(Embedding {
                vector,
                model: self.embedder.model_id().to_string(),
            });
            DocChunkPayload {
                file_path: path_str.clone(),
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                heading_path: chunk.heading_path.clone(),
            }
            .write_metadata(&mut record.metadata);
            records.push(record);
        }

        let count = records.len();
        self.store
            .delete_where(&StoreFilter::for_file(project, &path_str))
            .await?;
        self.store.batch_upsert(&records).await?;
        Ok(count)
    }
}

/// Split markdown into heading-scoped chunks.
pub fn chunk_markdown(text: &str) -> Vec<DocChunk> {
    // Byte offset → 1-based line lookup.
    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    let line_of = |offset: usize| -> u32 {
        (line_starts.partition_point(|&start| start <= offset)) as u32
    };

    let mut sections: Vec<(String, usize, usize)> = Vec::new(); // (breadcrumb, start, end)
    let mut breadcrumbs: Vec<(HeadingLevel, String)> = Vec::new();
    let mut section_start: Option<usize> = None;
    let mut heading_text = String::new();
    let mut in_heading = false;

    let parser = Parser::new_ext(text, Options::empty());
    for (event, range) in parser.into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                if let Some(start) = section_start.take() {
                    let crumb = breadcrumb(&breadcrumbs);
                    sections.push((crumb, start, range.start));
                }
                breadcrumbs.retain(|(l, _)| *l < level);
                breadcrumbs.push((level, String::new()));
                heading_text.clear();
                in_heading = true;
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(last) = breadcrumbs.last_mut() {
                    last.1 = heading_text.trim().to_string();
                }
                in_heading = false;
                section_start = Some(range.end);
            }
            Event::Text(t) | Event::Code(t) if in_heading => {
                heading_text.push_str(&t);
            }
            _ => {
                if section_start.is_none() && !in_heading {
                    section_start = Some(range.start);
                }
            }
        }
    }
    if let Some(start) = section_start {
        if start < text.len() {
            sections.push((breadcrumb(&breadcrumbs), start, text.len()));
        }
    }

    let mut chunks = Vec::new();
    for (crumb, start, end) in sections {
        let body = &text[start..end];
        if body.trim().is_empty() {
            continue;
        }
        for (piece_start, piece) in split_section(body, CHUNK_TARGET) {
            let trimmed = piece.trim();
            if trimmed.is_empty() {
                continue;
            }
            // Line spans cover the trimmed content, not surrounding blanks.
            let lead = piece.len() - piece.trim_start().len();
            let abs = start + piece_start + lead;
            chunks.push(DocChunk {
                content: trimmed.to_string(),
                heading_path: crumb.clone(),
                start_line: line_of(abs),
                end_line: line_of(abs + trimmed.len().saturating_sub(1)),
            });
        }
    }
    chunks
}

fn breadcrumb(stack: &[(HeadingLevel, String)]) -> String {
    stack
        .iter()
        .map(|(_, t)| t.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" > ")
}

/// Split an oversized section on blank lines, keeping fenced code intact.
fn split_section(body: &str, target: usize) -> Vec<(usize, &str)> {
    if body.len() <= target {
        return vec![(0, body)];
    }
    let mut pieces = Vec::new();
    let mut piece_start = 0usize;
    let mut cursor = 0usize;
    let mut in_fence = false;

    for line in body.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }
        cursor += line.len();
        let boundary = !in_fence && line.trim().is_empty();
        if boundary && cursor - piece_start >= target {
            pieces.push((piece_start, &body[piece_start..cursor]));
            piece_start = cursor;
        }
    }
    if piece_start < body.len() {
        pieces.push((piece_start, &body[piece_start..]));
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_follow_headings() {
        let md = "# Install\n\nIntro text.\n\n## Linux\n\nUse the package manager.\n\n## macOS\n\nUse brew.\n";
        let chunks = chunk_markdown(md);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].heading_path, "Install");
        assert_eq!(chunks[1].heading_path, "Install > Linux");
        assert_eq!(chunks[2].heading_path, "Install > macOS");
        assert!(chunks[1].content.contains("package manager"));
    }

    #[test]
    fn sibling_headings_replace_in_breadcrumb() {
        let md = "# A\n\n## B\n\ntext b\n\n## C\n\ntext c\n\n# D\n\ntext d\n";
        let chunks = chunk_markdown(md);
        let crumbs: Vec<_> = chunks.iter().map(|c| c.heading_path.as_str()).collect();
        assert!(crumbs.contains(&"A > B"));
        assert!(crumbs.contains(&"A > C"));
        assert!(crumbs.contains(&"D"));
        assert!(!crumbs.iter().any(|c| c.contains("B > C")));
    }

    #[test]
    fn line_numbers_are_one_based() {
        let md = "# Title\n\nFirst paragraph.\n";
        let chunks = chunk_markdown(md);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 3);
    }

    #[test]
    fn preamble_without_heading_is_kept() {
        let md = "Just some text without any heading.\n";
        let chunks = chunk_markdown(md);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading_path, "");
    }

    #[test]
    fn long_sections_split_outside_fences() {
        let paragraph = "word ".repeat(200);
        let md = format!(
            "# Big\n\n{paragraph}\n\n```\ncode line\ncode line\n```\n\n{paragraph}\n\n{paragraph}\n"
        );
        let chunks = chunk_markdown(&md);
        assert!(chunks.len() > 1);
        // The fence stays within a single chunk.
        let with_fence: Vec<_> = chunks
            .iter()
            .filter(|c| c.content.contains("```"))
            .collect();
        assert_eq!(with_fence.len(), 1);
        assert_eq!(with_fence[0].content.matches("```").count(), 2);
    }
}
