//! Single-pass flow of blocks into two-column pages.
//!
//! Coordinates are PDF user space: origin bottom-left, y grows upwards.

use tracing::debug;

use crate::metrics::{text_width, Font};
use crate::story::{Element, ParagraphStyle, INCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub font: Font,
    pub size: f32,
    pub leading: f32,
    pub space_before: f32,
    pub space_after: f32,
    pub align: Align,
}

impl TextStyle {
    const fn new(font: Font, size: f32, leading: f32) -> Self {
        Self {
            font,
            size,
            leading,
            space_before: 0.0,
            space_after: 0.0,
            align: Align::Left,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StyleSheet {
    pub normal: TextStyle,
    pub emphasis: TextStyle,
    pub heading1: TextStyle,
    pub heading2: TextStyle,
    pub title: TextStyle,
    /// Left indent per TOC level.
    pub toc_indent: f32,
}

impl Default for StyleSheet {
    fn default() -> Self {
        Self {
            normal: TextStyle::new(Font::Helvetica, 10.0, 12.0),
            emphasis: TextStyle {
                space_before: 10.0,
                space_after: 4.0,
                ..TextStyle::new(Font::HelveticaBoldOblique, 10.0, 12.0)
            },
            heading1: TextStyle {
                space_after: 6.0,
                ..TextStyle::new(Font::HelveticaBold, 18.0, 22.0)
            },
            heading2: TextStyle {
                space_before: 12.0,
                space_after: 6.0,
                ..TextStyle::new(Font::HelveticaBold, 14.0, 18.0)
            },
            title: TextStyle {
                space_after: 6.0,
                align: Align::Center,
                ..TextStyle::new(Font::HelveticaBold, 18.0, 22.0)
            },
            toc_indent: 12.0,
        }
    }
}

/// Usable area of one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub x: f32,
    pub bottom: f32,
    pub top: f32,
    pub width: f32,
}

impl Frame {
    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }
}

#[derive(Debug, Clone)]
pub struct PageGeometry {
    pub page_width: f32,
    pub page_height: f32,
    pub margin_left: f32,
    pub margin_right: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
    pub gutter: f32,
    /// Padding on the inner (gutter) side of each column.
    pub column_padding: f32,
    /// Padding above and below each column.
    pub frame_padding: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            page_width: 8.5 * INCH,
            page_height: 11.0 * INCH,
            margin_left: 0.5 * INCH,
            margin_right: 0.5 * INCH,
            margin_top: 0.5 * INCH,
            margin_bottom: 0.25 * INCH,
            gutter: 12.0,
            column_padding: 10.0,
            frame_padding: 6.0,
        }
    }
}

impl PageGeometry {
    pub fn columns(&self) -> [Frame; 2] {
        let width = self.page_width - self.margin_left - self.margin_right;
        let height = self.page_height - self.margin_top - self.margin_bottom;
        let column = width / 2.0 - self.gutter / 2.0;
        let bottom = self.margin_bottom + self.frame_padding;
        let top = self.margin_bottom + height - self.frame_padding;
        [
            Frame {
                x: self.margin_left,
                bottom,
                top,
                width: column - self.column_padding,
            },
            Frame {
                x: self.margin_left + column + self.gutter + self.column_padding,
                bottom,
                top,
                width: column - self.column_padding,
            },
        ]
    }
}

/// Something drawn on a page. Text `y` is the baseline, image `y` the bottom edge.
#[derive(Debug, Clone, PartialEq)]
pub enum Placed {
    Text {
        x: f32,
        y: f32,
        font: Font,
        size: f32,
        text: String,
    },
    Image {
        source: String,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: usize,
    pub items: Vec<Placed>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TocEntry {
    pub level: u8,
    pub text: String,
    pub page: usize,
}

/// Called once per finished page, after its content is placed.
pub trait PageDecorator {
    fn decorate(&self, page: &mut Page, geometry: &PageGeometry);
}

/// Centered page number at the foot of every page.
#[derive(Debug, Clone)]
pub struct PageNumberFooter {
    pub font: Font,
    pub size: f32,
    pub baseline: f32,
}

impl Default for PageNumberFooter {
    fn default() -> Self {
        Self {
            font: Font::Helvetica,
            size: 9.0,
            baseline: 0.5 * INCH,
        }
    }
}

impl PageDecorator for PageNumberFooter {
    fn decorate(&self, page: &mut Page, geometry: &PageGeometry) {
        let text = page.number.to_string();
        let width = text_width(&text, self.font, self.size);
        page.items.push(Placed::Text {
            x: (geometry.page_width - width) / 2.0,
            y: self.baseline,
            font: self.font,
            size: self.size,
            text,
        });
    }
}

/// Unit of layout: the preamble pieces plus the crawled story.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title(String),
    TableOfContents,
    Content(Element),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub pages: Vec<Page>,
    /// Headings in placement order, with the page they landed on.
    pub toc: Vec<TocEntry>,
}

/// Lays `blocks` out once. `toc` is what the table-of-contents block
/// renders; the entries discovered by this pass are returned in the result.
pub fn lay_out(
    blocks: &[Block],
    toc: &[TocEntry],
    geometry: &PageGeometry,
    styles: &StyleSheet,
    decorator: &dyn PageDecorator,
) -> Layout {
    let mut engine = Engine::new(geometry, styles);
    for block in blocks {
        match block {
            Block::Title(text) => {
                engine.place_text(text, &styles.title, 0.0);
            }
            Block::TableOfContents => engine.place_toc(toc),
            Block::Content(element) => engine.place_element(element),
        }
    }
    engine.finish(decorator)
}

struct Engine<'a> {
    styles: &'a StyleSheet,
    geometry: &'a PageGeometry,
    columns: [Frame; 2],
    pages: Vec<Page>,
    column: usize,
    y: f32,
    column_used: bool,
    page_used: bool,
    toc: Vec<TocEntry>,
}

impl<'a> Engine<'a> {
    fn new(geometry: &'a PageGeometry, styles: &'a StyleSheet) -> Self {
        let columns = geometry.columns();
        Self {
            styles,
            geometry,
            columns,
            pages: vec![Page {
                number: 1,
                items: Vec::new(),
            }],
            column: 0,
            y: columns[0].top,
            column_used: false,
            page_used: false,
            toc: Vec::new(),
        }
    }

    fn frame(&self) -> Frame {
        self.columns[self.column]
    }

    fn remaining(&self) -> f32 {
        self.y - self.frame().bottom
    }

    fn page_number(&self) -> usize {
        self.pages.len()
    }

    fn mark_used(&mut self) {
        self.column_used = true;
        self.page_used = true;
    }

    fn push(&mut self, item: Placed) {
        if let Some(page) = self.pages.last_mut() {
            page.items.push(item);
        }
        self.mark_used();
    }

    fn next_column(&mut self) {
        if self.column + 1 < self.columns.len() {
            self.column += 1;
            self.y = self.frame().top;
            self.column_used = false;
        } else {
            self.new_page();
        }
    }

    fn new_page(&mut self) {
        let number = self.pages.len() + 1;
        self.pages.push(Page {
            number,
            items: Vec::new(),
        });
        self.column = 0;
        self.y = self.frame().top;
        self.column_used = false;
        self.page_used = false;
    }

    fn advance(&mut self, amount: f32) {
        self.y = (self.y - amount).max(self.frame().bottom);
    }

    fn place_element(&mut self, element: &Element) {
        match element {
            Element::Heading { level, text } => {
                let style = if *level <= 1 {
                    self.styles.heading1
                } else {
                    self.styles.heading2
                };
                if let Some(page) = self.place_text(text, &style, 0.0) {
                    let level = level.saturating_sub(1);
                    debug!("TOC entry level {} \"{}\" on page {}", level, text, page);
                    self.toc.push(TocEntry {
                        level,
                        text: text.clone(),
                        page,
                    });
                }
            }
            Element::Paragraph { text, style } => {
                let style = match style {
                    ParagraphStyle::Normal => self.styles.normal,
                    ParagraphStyle::Emphasis => self.styles.emphasis,
                };
                self.place_text(text, &style, 0.0);
            }
            Element::Image {
                source,
                width,
                height,
            } => self.place_image(source, *width as f32, *height as f32),
            Element::PageBreak => {
                if self.page_used {
                    self.new_page();
                }
            }
            Element::ConditionalBreak { min_space } => {
                if self.remaining() < *min_space {
                    self.next_column();
                }
            }
            Element::Spacer { height } => {
                if *height > self.remaining() {
                    self.next_column();
                } else {
                    self.y -= *height;
                    self.mark_used();
                }
            }
        }
    }

    /// Places wrapped text, splitting across columns line by line. Returns
    /// the page the first line landed on.
    fn place_text(&mut self, text: &str, style: &TextStyle, indent: f32) -> Option<usize> {
        let width = self.frame().width - indent;
        let lines = wrap_text(text, style.font, style.size, width);
        if lines.is_empty() {
            return None;
        }
        if self.column_used {
            self.advance(style.space_before);
        }

        let mut first_page = None;
        for line in lines {
            if style.leading > self.remaining() {
                self.next_column();
            }
            let frame = self.frame();
            let x = match style.align {
                Align::Left => frame.x + indent,
                Align::Center => {
                    frame.x + (frame.width - text_width(&line, style.font, style.size)) / 2.0
                }
            };
            let baseline = self.y - style.size;
            self.push(Placed::Text {
                x,
                y: baseline,
                font: style.font,
                size: style.size,
                text: line,
            });
            self.y -= style.leading;
            first_page.get_or_insert(self.page_number());
        }
        self.advance(style.space_after);
        first_page
    }

    fn place_image(&mut self, source: &str, width: f32, height: f32) {
        let frame = self.frame();
        let (mut width, mut height) = (width, height);
        if width > frame.width {
            height *= frame.width / width;
            width = frame.width;
        }
        if height > frame.height() {
            width *= frame.height() / height;
            height = frame.height();
        }
        if height > self.remaining() {
            self.next_column();
        }

        let frame = self.frame();
        self.y -= height;
        let item = Placed::Image {
            source: source.to_string(),
            x: frame.x + (frame.width - width) / 2.0,
            y: self.y,
            width,
            height,
        };
        self.push(item);
    }

    fn place_toc(&mut self, entries: &[TocEntry]) {
        let heading = self.styles.heading1;
        self.place_text("Contents", &heading, 0.0);

        let style = self.styles.normal;
        let dot_width = text_width(".", style.font, style.size);
        for entry in entries {
            let indent = f32::from(entry.level) * self.styles.toc_indent;
            let number = entry.page.to_string();
            let number_width = text_width(&number, style.font, style.size);
            let available = self.frame().width - indent - number_width - 3.0 * dot_width;
            let lines = wrap_text(&entry.text, style.font, style.size, available);
            let last = lines.len().saturating_sub(1);

            for (index, line) in lines.into_iter().enumerate() {
                if style.leading > self.remaining() {
                    self.next_column();
                }
                let frame = self.frame();
                let baseline = self.y - style.size;
                let line_end = frame.x + indent + text_width(&line, style.font, style.size);
                self.push(Placed::Text {
                    x: frame.x + indent,
                    y: baseline,
                    font: style.font,
                    size: style.size,
                    text: line,
                });

                if index == last {
                    let number_x = frame.x + frame.width - number_width;
                    let gap = number_x - line_end - 2.0 * dot_width;
                    let dots = (gap / dot_width).floor().max(0.0) as usize;
                    if dots > 0 {
                        self.push(Placed::Text {
                            x: number_x - dot_width * (dots as f32 + 1.0),
                            y: baseline,
                            font: style.font,
                            size: style.size,
                            text: ".".repeat(dots),
                        });
                    }
                    self.push(Placed::Text {
                        x: number_x,
                        y: baseline,
                        font: style.font,
                        size: style.size,
                        text: number.clone(),
                    });
                }
                self.y -= style.leading;
            }
        }
    }

    fn finish(mut self, decorator: &dyn PageDecorator) -> Layout {
        // A break at the very end must not leave a blank trailing page.
        if !self.page_used && self.pages.len() > 1 {
            self.pages.pop();
        }
        for page in &mut self.pages {
            decorator.decorate(page, self.geometry);
        }
        Layout {
            pages: self.pages,
            toc: self.toc,
        }
    }
}

/// Greedy word wrap. Words wider than a whole line are broken by character.
pub fn wrap_text(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() {
            let candidate = format!("{} {}", current, word);
            if text_width(&candidate, font, size) <= max_width {
                current = candidate;
                continue;
            }
            lines.push(std::mem::take(&mut current));
        }

        if text_width(word, font, size) <= max_width {
            current = word.to_string();
            continue;
        }
        for c in word.chars() {
            let mut candidate = current.clone();
            candidate.push(c);
            if !current.is_empty() && text_width(&candidate, font, size) > max_width {
                lines.push(std::mem::take(&mut current));
                current.push(c);
            } else {
                current = candidate;
            }
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoDecoration;

    impl PageDecorator for NoDecoration {
        fn decorate(&self, _page: &mut Page, _geometry: &PageGeometry) {}
    }

    fn run(blocks: &[Block]) -> Layout {
        lay_out(
            blocks,
            &[],
            &PageGeometry::default(),
            &StyleSheet::default(),
            &NoDecoration,
        )
    }

    fn paragraph(text: &str) -> Block {
        Block::Content(Element::paragraph(text, ParagraphStyle::Normal))
    }

    #[test]
    fn columns_are_equal_and_separated() {
        let [left, right] = PageGeometry::default().columns();
        assert_eq!(left.width, right.width);
        assert_eq!(left.x, 36.0);
        assert_eq!(left.width, 254.0);
        assert_eq!(right.x, 322.0);
        assert_eq!(left.top, 750.0);
        assert_eq!(left.bottom, 24.0);
    }

    #[test]
    fn wrap_respects_width_and_keeps_words() {
        let lines = wrap_text("the quick brown fox jumps over the lazy dog", Font::Helvetica, 10.0, 60.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(text_width(line, Font::Helvetica, 10.0) <= 60.0);
        }
        assert_eq!(lines.join(" "), "the quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn wrap_breaks_overlong_words() {
        let lines = wrap_text(&"W".repeat(40), Font::Helvetica, 10.0, 50.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), "W".repeat(40));
    }

    #[test]
    fn page_breaks_start_new_pages_but_never_blank_ones() {
        let layout = run(&[
            paragraph("one"),
            Block::Content(Element::PageBreak),
            Block::Content(Element::PageBreak),
            paragraph("two"),
            Block::Content(Element::PageBreak),
        ]);
        assert_eq!(layout.pages.len(), 2);
    }

    #[test]
    fn conditional_break_moves_to_next_column_when_short_of_space() {
        let mut blocks: Vec<Block> = (0..40).map(|i| paragraph(&format!("line {i}"))).collect();
        blocks.push(Block::Content(Element::ConditionalBreak {
            min_space: 6.0 * INCH,
        }));
        blocks.push(paragraph("after"));
        let layout = run(&blocks);

        let right_x = PageGeometry::default().columns()[1].x;
        let after = layout.pages[0]
            .items
            .iter()
            .find_map(|item| match item {
                Placed::Text { text, x, y, .. } if text == "after" => Some((*x, *y)),
                _ => None,
            })
            .unwrap();
        assert_eq!(after.0, right_x);
        assert_eq!(after.1, 750.0 - 10.0);
    }

    #[test]
    fn conditional_break_with_room_does_nothing() {
        let layout = run(&[
            paragraph("before"),
            Block::Content(Element::ConditionalBreak {
                min_space: 6.0 * INCH,
            }),
            paragraph("after"),
        ]);
        let xs: Vec<f32> = layout.pages[0]
            .items
            .iter()
            .map(|item| match item {
                Placed::Text { x, .. } => *x,
                Placed::Image { x, .. } => *x,
            })
            .collect();
        assert_eq!(xs, vec![36.0, 36.0]);
    }

    #[test]
    fn long_paragraphs_flow_into_the_second_column_and_next_page() {
        let text = "word ".repeat(4000);
        let layout = run(&[paragraph(&text)]);
        assert!(layout.pages.len() >= 2);
        let right_x = PageGeometry::default().columns()[1].x;
        assert!(layout.pages[0]
            .items
            .iter()
            .any(|item| matches!(item, Placed::Text { x, .. } if *x == right_x)));
    }

    #[test]
    fn headings_register_toc_entries_on_their_page() {
        let layout = run(&[
            Block::Content(Element::heading(1, "Getting started")),
            Block::Content(Element::PageBreak),
            Block::Content(Element::heading(2, "Install")),
        ]);
        assert_eq!(
            layout.toc,
            vec![
                TocEntry {
                    level: 0,
                    text: "Getting started".into(),
                    page: 1
                },
                TocEntry {
                    level: 1,
                    text: "Install".into(),
                    page: 2
                },
            ]
        );
    }

    #[test]
    fn oversized_images_are_scaled_into_the_column() {
        let layout = run(&[Block::Content(Element::Image {
            source: "big.png".into(),
            width: 250,
            height: 2000,
        })]);
        match &layout.pages[0].items[0] {
            Placed::Image { width, height, .. } => {
                assert_eq!(*height, 726.0);
                assert!((*width - 250.0 * 726.0 / 2000.0).abs() < 1e-3);
            }
            other => panic!("unexpected item {other:?}"),
        }
    }

    #[test]
    fn footer_numbers_every_page_centered() {
        let layout = lay_out(
            &[paragraph("a"), Block::Content(Element::PageBreak), paragraph("b")],
            &[],
            &PageGeometry::default(),
            &StyleSheet::default(),
            &PageNumberFooter::default(),
        );
        for page in &layout.pages {
            let footer = page.items.last().unwrap();
            match footer {
                Placed::Text { text, x, y, size, font } => {
                    assert_eq!(text, &page.number.to_string());
                    assert_eq!(*y, 36.0);
                    let width = text_width(text, *font, *size);
                    assert!((x + width / 2.0 - 306.0).abs() < 1e-3);
                }
                other => panic!("unexpected footer {other:?}"),
            }
        }
    }
}
