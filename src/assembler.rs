use std::path::Path;

use colored::*;
use tracing::{debug, info, warn};

use crate::error::RenderError;
use crate::images::ImageLibrary;
use crate::layout::{lay_out, Block, Layout, PageGeometry, PageNumberFooter, StyleSheet, TocEntry};
use crate::pdf_writer::PdfWriter;
use crate::story::{Element, Story, INCH};

/// Upper bound on layout passes while waiting for TOC page numbers to settle.
pub const MAX_PASSES: usize = 10;

const TITLE_PAGE_SPACE: f32 = 3.5 * INCH;

#[derive(Debug, Clone)]
pub struct AssemblyReport {
    pub pages: usize,
    pub toc: Vec<TocEntry>,
}

/// Paginates a finished story behind a title page and table of contents.
pub struct Assembler<'a> {
    title: String,
    images: &'a ImageLibrary,
    geometry: PageGeometry,
    styles: StyleSheet,
    footer: PageNumberFooter,
}

impl<'a> Assembler<'a> {
    pub fn new(title: impl Into<String>, images: &'a ImageLibrary) -> Self {
        Self {
            title: title.into(),
            images,
            geometry: PageGeometry::default(),
            styles: StyleSheet::default(),
            footer: PageNumberFooter::default(),
        }
    }

    /// Title page and TOC page, followed by the story.
    pub fn blocks(&self, story: Story) -> Vec<Block> {
        let mut blocks = vec![
            Block::Content(Element::Spacer {
                height: TITLE_PAGE_SPACE,
            }),
            Block::Title(self.title.clone()),
            Block::Content(Element::PageBreak),
            Block::TableOfContents,
            Block::Content(Element::PageBreak),
        ];
        blocks.extend(story.into_elements().into_iter().map(Block::Content));
        blocks
    }

    /// Lays the blocks out until the table of contents it renders matches
    /// the headings it places. The first pass only discovers page numbers;
    /// at least one more pass renders them.
    pub fn build(&self, blocks: &[Block]) -> Layout {
        let mut toc: Vec<TocEntry> = Vec::new();
        let mut pass = 1;
        loop {
            let layout = lay_out(blocks, &toc, &self.geometry, &self.styles, &self.footer);
            debug!(
                "Layout pass {} produced {} pages and {} TOC entries",
                pass,
                layout.pages.len(),
                layout.toc.len()
            );
            if pass > 1 && layout.toc == toc {
                return layout;
            }
            if pass >= MAX_PASSES {
                warn!("Table of contents did not settle after {} passes", pass);
                return layout;
            }
            toc = layout.toc.clone();
            pass += 1;
        }
    }

    /// Builds the document and writes it to `output_path`.
    pub async fn write(&self, story: Story, output_path: &Path) -> Result<AssemblyReport, RenderError> {
        info!("Building PDF...");
        let blocks = self.blocks(story);
        let layout = self.build(&blocks);

        for entry in &layout.toc {
            match entry.level {
                0 => info!("{}", entry.text.bold()),
                _ => info!("- > {}", entry.text),
            }
        }

        let writer = PdfWriter::new(&self.geometry, self.images, self.title.clone());
        let mut doc = writer.render(&layout.pages)?;
        writer.save(&mut doc, output_path).await?;

        info!(
            "Manual saved to: {}",
            output_path.display().to_string().blue()
        );
        Ok(AssemblyReport {
            pages: layout.pages.len(),
            toc: layout.toc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Placed;
    use crate::story::ParagraphStyle;

    fn story_with_sections() -> Story {
        let mut story = Story::new();
        for section in ["Basics", "Advanced"] {
            story.push(Element::heading(1, section));
            for article in 0..3 {
                story.push(Element::heading(2, format!("{section} article {article}")));
                for _ in 0..30 {
                    story.push(Element::paragraph(
                        "Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod.",
                        ParagraphStyle::Normal,
                    ));
                }
                story.push(Element::PageBreak);
            }
        }
        story
    }

    /// Last page showing `needle`, which skips its line in the TOC.
    fn page_of(layout: &Layout, needle: &str) -> usize {
        layout
            .pages
            .iter()
            .rev()
            .find(|page| {
                page.items
                    .iter()
                    .any(|item| matches!(item, Placed::Text { text, .. } if text == needle))
            })
            .map(|page| page.number)
            .unwrap()
    }

    #[test]
    fn preamble_puts_title_and_toc_first() {
        let images = ImageLibrary::new();
        let assembler = Assembler::new("Skipper User Manual", &images);
        let layout = assembler.build(&assembler.blocks(story_with_sections()));

        assert_eq!(page_of(&layout, "Skipper User Manual"), 1);
        assert_eq!(page_of(&layout, "Contents"), 2);
        assert_eq!(page_of(&layout, "Basics"), 3);
    }

    #[test]
    fn toc_pages_match_physical_placement_and_are_stable() {
        let images = ImageLibrary::new();
        let assembler = Assembler::new("Manual", &images);
        let blocks = assembler.blocks(story_with_sections());
        let layout = assembler.build(&blocks);

        assert_eq!(layout.toc.len(), 8);
        for entry in &layout.toc {
            let placed_on = layout
                .pages
                .iter()
                .skip(2)
                .find(|page| {
                    page.items
                        .iter()
                        .any(|item| matches!(item, Placed::Text { text, .. } if *text == entry.text))
                })
                .map(|page| page.number)
                .unwrap();
            assert_eq!(entry.page, placed_on, "{}", entry.text);
        }

        let again = lay_out(
            &blocks,
            &layout.toc,
            &PageGeometry::default(),
            &StyleSheet::default(),
            &PageNumberFooter::default(),
        );
        assert_eq!(again, layout);
    }

    #[test]
    fn long_toc_pushes_content_back_and_numbers_follow() {
        let mut story = Story::new();
        for i in 0..150 {
            story.push(Element::heading(1, format!("Section {i}")));
            story.push(Element::PageBreak);
        }
        let images = ImageLibrary::new();
        let assembler = Assembler::new("Manual", &images);
        let layout = assembler.build(&assembler.blocks(story));

        // 150 entries do not fit one two-column page, so content starts later.
        assert!(layout.toc[0].page > 3);
        assert_eq!(layout.toc[0].page, page_of(&layout, "Section 0"));
        assert_eq!(layout.toc[149].page, layout.pages.len());
    }
}
