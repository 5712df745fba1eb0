//! Standard-14 Helvetica metrics and WinAnsi text encoding.
//!
//! Widths are the Adobe AFM advance widths (per 1000 units of font size)
//! for the printable ASCII range; everything else is measured as a digit.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Font {
    Helvetica,
    HelveticaBold,
    HelveticaBoldOblique,
}

impl Font {
    pub const ALL: [Font; 3] = [
        Font::Helvetica,
        Font::HelveticaBold,
        Font::HelveticaBoldOblique,
    ];

    pub fn base_font(self) -> &'static str {
        match self {
            Font::Helvetica => "Helvetica",
            Font::HelveticaBold => "Helvetica-Bold",
            Font::HelveticaBoldOblique => "Helvetica-BoldOblique",
        }
    }

    /// Name of the font in a page's resource dictionary.
    pub fn resource_name(self) -> &'static str {
        match self {
            Font::Helvetica => "F1",
            Font::HelveticaBold => "F2",
            Font::HelveticaBoldOblique => "F3",
        }
    }

    fn widths(self) -> &'static [u16; 95] {
        match self {
            Font::Helvetica => &HELVETICA,
            Font::HelveticaBold | Font::HelveticaBoldOblique => &HELVETICA_BOLD,
        }
    }
}

const DEFAULT_WIDTH: u16 = 556;

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Width of `text` in points when set in `font` at `size`.
pub fn text_width(text: &str, font: Font, size: f32) -> f32 {
    let widths = font.widths();
    let units: u32 = encode_win_ansi(text)
        .into_iter()
        .map(|byte| match byte {
            32..=126 => u32::from(widths[usize::from(byte - 32)]),
            _ => u32::from(DEFAULT_WIDTH),
        })
        .sum();
    units as f32 * size / 1000.0
}

/// Encodes `text` for a WinAnsiEncoding simple font. Characters outside the
/// code page become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            _ => b'?',
        })
        .collect()
}
