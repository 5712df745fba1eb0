//! Flat start-tag / text / end-tag event stream over raw markup.
//!
//! Tags come out exactly as the page wrote them, with no implied end tags
//! and no foster parenting.

use std::cell::RefCell;

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use html5ever::TokenizerResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub self_closing: bool,
}

impl StartTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            self_closing: false,
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// True when the class list contains `class` as a whole token.
    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|value| value.split_whitespace().any(|token| token == class))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupEvent {
    Start(StartTag),
    /// Adjacent character data is coalesced into one event.
    Text(String),
    End(String),
}

/// Callback side of the tokenizer.
pub trait MarkupHandler {
    type Error;

    fn start_tag(&mut self, tag: &StartTag) -> Result<(), Self::Error>;
    fn text(&mut self, text: &str) -> Result<(), Self::Error>;
    fn end_tag(&mut self, name: &str) -> Result<(), Self::Error>;
}

/// Replays `events` into `handler` in document order, stopping at the first error.
pub fn feed<H: MarkupHandler>(events: &[MarkupEvent], handler: &mut H) -> Result<(), H::Error> {
    for event in events {
        match event {
            MarkupEvent::Start(tag) => handler.start_tag(tag)?,
            MarkupEvent::Text(text) => handler.text(text)?,
            MarkupEvent::End(name) => handler.end_tag(name)?,
        }
    }
    Ok(())
}

pub fn tokenize(markup: &str) -> Vec<MarkupEvent> {
    let tokenizer = Tokenizer::new(EventSink::default(), TokenizerOpts::default());
    let input = BufferQueue::default();
    input.push_back(StrTendril::from_slice(markup));
    // The sink never asks for a script pause, so this runs once.
    while let TokenizerResult::Script(()) = tokenizer.feed(&input) {}
    tokenizer.end();
    tokenizer.sink.take_events()
}

#[derive(Default)]
struct EventSink {
    events: RefCell<Vec<MarkupEvent>>,
    pending_text: RefCell<String>,
}

impl EventSink {
    fn flush_text(&self) {
        let mut pending = self.pending_text.borrow_mut();
        if !pending.is_empty() {
            self.events
                .borrow_mut()
                .push(MarkupEvent::Text(std::mem::take(&mut *pending)));
        }
    }

    fn take_events(&self) -> Vec<MarkupEvent> {
        self.flush_text();
        self.events.take()
    }

    fn push_tag(&self, tag: Tag) -> TokenSinkResult<()> {
        let name = tag.name.to_string();
        match tag.kind {
            TagKind::StartTag => {
                let attributes = tag
                    .attrs
                    .iter()
                    .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                    .collect();
                self.events.borrow_mut().push(MarkupEvent::Start(StartTag {
                    name: name.clone(),
                    attributes,
                    self_closing: tag.self_closing,
                }));

                // Script and style bodies are opaque text, never markup.
                match name.as_str() {
                    "script" => TokenSinkResult::RawData(RawKind::ScriptData),
                    "style" | "xmp" | "noembed" | "noframes" => {
                        TokenSinkResult::RawData(RawKind::Rawtext)
                    }
                    "title" | "textarea" => TokenSinkResult::RawData(RawKind::Rcdata),
                    _ => TokenSinkResult::Continue,
                }
            }
            TagKind::EndTag => {
                self.events.borrow_mut().push(MarkupEvent::End(name));
                TokenSinkResult::Continue
            }
        }
    }
}

impl TokenSink for EventSink {
    type Handle = ();

    fn process_token(&self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::CharacterTokens(text) => {
                self.pending_text.borrow_mut().push_str(&text);
                TokenSinkResult::Continue
            }
            Token::TagToken(tag) => {
                self.flush_text();
                self.push_tag(tag)
            }
            Token::NullCharacterToken | Token::ParseError(_) => TokenSinkResult::Continue,
            _ => {
                self.flush_text();
                TokenSinkResult::Continue
            }
        }
    }
}
