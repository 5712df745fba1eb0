use tracing::{debug, warn};

use crate::error::{ImageReadError, ParseError};
use crate::images::{scale_to_max_width, ImageReader, MAX_IMAGE_WIDTH};
use crate::markup::{self, MarkupEvent, MarkupHandler, StartTag};
use crate::story::{Element, ParagraphStyle, Story, INCH};

/// Free space below which an emphasized line or an image's caption text
/// moves to the next column.
pub const KEEP_TOGETHER_SPACE: f32 = 6.0 * INCH;
pub const IMAGE_SPACE_BEFORE: f32 = 0.10 * INCH;
pub const IMAGE_SPACE_AFTER: f32 = 0.25 * INCH;

const EMBEDDED_FRAME_TAG: &str = "iframe";

/// Where the article body starts: a `tag` whose class attribute contains `marker`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMarkers {
    pub tag: String,
    pub marker: String,
}

impl Default for ContentMarkers {
    fn default() -> Self {
        Self {
            tag: "section".to_string(),
            marker: "uvFaq".to_string(),
        }
    }
}

impl ContentMarkers {
    fn opens_content(&self, tag: &StartTag) -> bool {
        tag.name == self.tag
            && tag
                .attr("class")
                .map(|class| class.contains(&self.marker))
                .unwrap_or(false)
    }
}

/// Tags whose frames are kept on the stack while inside the content container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentTag {
    Div,
    P,
    Strong,
    Ul,
    Ol,
    Li,
    Img,
    Heading(u8),
}

impl ContentTag {
    fn from_name(name: &str) -> Option<Self> {
        let tag = match name {
            "div" => ContentTag::Div,
            "p" => ContentTag::P,
            "strong" => ContentTag::Strong,
            "ul" => ContentTag::Ul,
            "ol" => ContentTag::Ol,
            "li" => ContentTag::Li,
            "img" => ContentTag::Img,
            "h1" => ContentTag::Heading(1),
            "h2" => ContentTag::Heading(2),
            "h3" => ContentTag::Heading(3),
            "h4" => ContentTag::Heading(4),
            "h5" => ContentTag::Heading(5),
            "h6" => ContentTag::Heading(6),
            _ => return None,
        };
        Some(tag)
    }

    /// Elements for one run of text whose closest enclosing tag is `tag`.
    /// `None` stands for the content container itself.
    fn text_elements(tag: Option<ContentTag>, text: String) -> Vec<Element> {
        match tag {
            Some(ContentTag::Strong) => vec![
                Element::ConditionalBreak {
                    min_space: KEEP_TOGETHER_SPACE,
                },
                Element::paragraph(text, ParagraphStyle::Emphasis),
            ],
            // Site h1s are in-article subheads, one level below sections.
            Some(ContentTag::Heading(1)) => vec![Element::heading(2, text)],
            _ => vec![Element::paragraph(text, ParagraphStyle::Normal)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFrame {
    Tag(StartTag),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Idle,
    InContent,
    InEmbeddedFrame,
}

/// Stack parser for a single article page. Appends straight into the
/// crawl's story.
pub struct PageParser<'a, R: ImageReader> {
    story: &'a mut Story,
    images: &'a mut R,
    markers: &'a ContentMarkers,
    region: Region,
    stack: Vec<ParseFrame>,
    /// Stack index of the open content container's frame.
    container: Option<usize>,
    skipped_images: Vec<ImageReadError>,
}

impl<'a, R: ImageReader> PageParser<'a, R> {
    pub fn new(story: &'a mut Story, images: &'a mut R, markers: &'a ContentMarkers) -> Self {
        Self {
            story,
            images,
            markers,
            region: Region::Idle,
            stack: Vec::new(),
            container: None,
            skipped_images: Vec::new(),
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    /// Ends the page, returning the images that had to be left out.
    pub fn finish(mut self) -> Vec<ImageReadError> {
        if self.region != Region::Idle {
            warn!("Content container was never closed; flushing what was read");
            let children = std::mem::take(&mut self.stack);
            self.apply(None, children);
            self.region = Region::Idle;
            self.container = None;
        }
        self.skipped_images
    }

    /// Pops frames down to and including the innermost open `name` tag and
    /// applies that tag to the frames above it. Popping the container's own
    /// frame ends the content region.
    fn close_tag(&mut self, name: &str) -> Result<(), ParseError> {
        let position = self
            .stack
            .iter()
            .rposition(|frame| matches!(frame, ParseFrame::Tag(tag) if tag.name == name))
            .ok_or_else(|| ParseError::MalformedMarkup {
                tag: name.to_string(),
            })?;
        let children = self.stack.split_off(position + 1);
        self.stack.pop();

        if self.container == Some(position) {
            self.container = None;
            self.region = Region::Idle;
            self.apply(None, children);
        } else {
            self.apply(ContentTag::from_name(name), children);
        }
        Ok(())
    }

    fn apply(&mut self, tag: Option<ContentTag>, children: Vec<ParseFrame>) {
        for child in children {
            match child {
                ParseFrame::Tag(frame) if frame.name == "img" => self.emit_image(&frame),
                ParseFrame::Text(text) => {
                    let text = normalize_whitespace(&text);
                    self.story.extend(ContentTag::text_elements(tag, text));
                }
                ParseFrame::Tag(_) => {}
            }
        }
    }

    fn emit_image(&mut self, frame: &StartTag) {
        let Some(source) = frame.attr("src") else {
            self.skipped_images
                .push(ImageReadError::new("<img>", "missing src attribute"));
            return;
        };
        let (width, height) = match self.images.read_size(source) {
            Ok(size) => size,
            Err(e) => {
                self.skipped_images.push(e);
                return;
            }
        };
        let (width, height) = scale_to_max_width(width, height, MAX_IMAGE_WIDTH);

        // Keep the image in the same column as the text leading up to it.
        self.story.insert_after_last_text(Element::ConditionalBreak {
            min_space: KEEP_TOGETHER_SPACE,
        });
        self.story.push(Element::Spacer {
            height: IMAGE_SPACE_BEFORE,
        });
        self.story.push(Element::Image {
            source: source.to_string(),
            width,
            height,
        });
        self.story.push(Element::Spacer {
            height: IMAGE_SPACE_AFTER,
        });
    }
}

impl<R: ImageReader> MarkupHandler for PageParser<'_, R> {
    type Error = ParseError;

    fn start_tag(&mut self, tag: &StartTag) -> Result<(), ParseError> {
        match self.region {
            Region::InEmbeddedFrame => {}
            Region::Idle if self.markers.opens_content(tag) => {
                self.region = Region::InContent;
                self.container = Some(self.stack.len());
                self.stack.push(ParseFrame::Tag(tag.clone()));
            }
            Region::Idle => {}
            // Self-closing non-void tags never get an end tag to pop them.
            Region::InContent if tag.self_closing && tag.name != "img" => {}
            Region::InContent => {
                if tag.name == EMBEDDED_FRAME_TAG {
                    self.region = Region::InEmbeddedFrame;
                } else if ContentTag::from_name(&tag.name).is_some() || tag.name == self.markers.tag {
                    self.stack.push(ParseFrame::Tag(tag.clone()));
                }
            }
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), ParseError> {
        if self.region == Region::InContent && !text.trim().is_empty() {
            self.stack.push(ParseFrame::Text(text.to_string()));
        }
        Ok(())
    }

    fn end_tag(&mut self, name: &str) -> Result<(), ParseError> {
        match self.region {
            Region::Idle => Ok(()),
            Region::InEmbeddedFrame => {
                if name == EMBEDDED_FRAME_TAG {
                    self.region = Region::InContent;
                }
                Ok(())
            }
            Region::InContent => match ContentTag::from_name(name) {
                // img is void; its frame is consumed by the enclosing tag.
                Some(ContentTag::Img) => Ok(()),
                Some(_) => self.close_tag(name),
                None if name == self.markers.tag => self.close_tag(name),
                None => Ok(()),
            },
        }
    }
}

/// Runs one page's events through a fresh parser.
pub fn parse_page<R: ImageReader>(
    events: &[MarkupEvent],
    story: &mut Story,
    images: &mut R,
    markers: &ContentMarkers,
) -> Result<Vec<ImageReadError>, ParseError> {
    let mut parser = PageParser::new(story, images, markers);
    markup::feed(events, &mut parser)?;
    let skipped = parser.finish();
    debug!("Parsed page with {} skipped images", skipped.len());
    Ok(skipped)
}

/// `src` of every image `parse_page` would place, first occurrence first.
/// Only tracks the container and embedded frames, without building frames.
pub fn image_sources(events: &[MarkupEvent], markers: &ContentMarkers) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    let mut depth = 0usize;
    let mut in_frame = false;

    for event in events {
        match event {
            MarkupEvent::Start(tag) if depth == 0 => {
                if markers.opens_content(tag) {
                    depth = 1;
                }
            }
            MarkupEvent::Start(_) if in_frame => {}
            MarkupEvent::Start(tag) if tag.name == EMBEDDED_FRAME_TAG => in_frame = true,
            MarkupEvent::Start(tag) if tag.name == "img" => {
                if let Some(source) = tag.attr("src") {
                    if !sources.iter().any(|known| known == source) {
                        sources.push(source.to_string());
                    }
                }
            }
            MarkupEvent::Start(tag) if tag.name == markers.tag && !tag.self_closing => depth += 1,
            MarkupEvent::End(name) if depth > 0 && in_frame => {
                if name == EMBEDDED_FRAME_TAG {
                    in_frame = false;
                }
            }
            MarkupEvent::End(name) if depth > 0 && *name == markers.tag => depth -= 1,
            _ => {}
        }
    }
    sources
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
