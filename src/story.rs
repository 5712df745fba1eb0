use serde::Serialize;

/// Points per inch; every length in the story is expressed in PDF points.
pub const INCH: f32 = 72.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParagraphStyle {
    Normal,
    Emphasis,
}

/// One unit of document content, in rendering order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Element {
    Heading { level: u8, text: String },
    Paragraph { text: String, style: ParagraphStyle },
    Image { source: String, width: u32, height: u32 },
    PageBreak,
    ConditionalBreak { min_space: f32 },
    Spacer { height: f32 },
}

impl Element {
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Element::Heading {
            level,
            text: text.into(),
        }
    }

    pub fn paragraph(text: impl Into<String>, style: ParagraphStyle) -> Self {
        Element::Paragraph {
            text: text.into(),
            style,
        }
    }

    /// Headings and paragraphs both count as running text when an image
    /// looks back for the text it belongs to.
    pub fn is_text(&self) -> bool {
        matches!(self, Element::Heading { .. } | Element::Paragraph { .. })
    }
}

/// The ordered element stream shared by every page of a crawl.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Story {
    elements: Vec<Element>,
}

impl Story {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, element: Element) {
        self.elements.push(element);
    }

    /// Inserts `element` right after the most recent text element.
    /// Returns false (and inserts nothing) when the story holds no text yet.
    pub fn insert_after_last_text(&mut self, element: Element) -> bool {
        match self.elements.iter().rposition(Element::is_text) {
            Some(index) => {
                self.elements.insert(index + 1, element);
                true
            }
            None => false,
        }
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn into_elements(self) -> Vec<Element> {
        self.elements
    }
}

impl Extend<Element> for Story {
    fn extend<T: IntoIterator<Item = Element>>(&mut self, iter: T) {
        self.elements.extend(iter);
    }
}
