//! Equations submitted to the renderer and the results it produces.

use quick_xml::Reader;
use quick_xml::escape;
use quick_xml::events::{BytesStart, Event};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Font used when an equation does not name one.
pub const DEFAULT_FONT: &str = "TeX";

/// Fonts the renderer ships with.
pub const KNOWN_FONTS: &[&str] = &[
    "TeX",
    "STIX-Web",
    "Asana-Math",
    "Neo-Euler",
    "Gyre-Pagella",
    "Gyre-Termes",
    "Latin-Modern",
];

const TEX_ENCODING: &str = "application/x-tex";

/// Input dialect of an equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputFormat {
    /// Display-mode TeX.
    #[serde(alias = "tex")]
    TexDisplay,
    /// Inline-mode TeX.
    #[serde(alias = "inline-tex")]
    TexInline,
    /// Presentation MathML.
    Mathml,
}

impl InputFormat {
    /// The format line sent to the renderer.
    pub fn code(self) -> &'static str {
        match self {
            Self::TexDisplay => "TeX",
            Self::TexInline => "inline-TeX",
            Self::Mathml => "MathML",
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A unit of work: (format, content, font). Also the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Equation {
    format: InputFormat,
    content: String,
    #[serde(default = "default_font")]
    font: String,
}

fn default_font() -> String {
    DEFAULT_FONT.to_string()
}

impl Equation {
    /// Create an equation in the default font.
    pub fn new(format: InputFormat, content: impl Into<String>) -> Self {
        Self {
            format,
            content: content.into(),
            font: default_font(),
        }
    }

    /// Display-mode TeX equation.
    pub fn tex_display(content: impl Into<String>) -> Self {
        Self::new(InputFormat::TexDisplay, content)
    }

    /// Inline-mode TeX equation.
    pub fn tex_inline(content: impl Into<String>) -> Self {
        Self::new(InputFormat::TexInline, content)
    }

    /// MathML equation, taken as-is.
    pub fn mathml(content: impl Into<String>) -> Self {
        Self::new(InputFormat::Mathml, content)
    }

    /// Set the font. `None` keeps the default.
    pub fn with_font(mut self, font: Option<&str>) -> Self {
        if let Some(font) = font {
            self.font = font.to_string();
        }
        self
    }

    /// Build an equation from MathML.
    ///
    /// When the MathML carries a TeX annotation the TeX is converted instead.
    /// The root element's `display="block"` attribute selects display mode.
    pub fn from_mathml(mathml: &str, font: Option<&str>) -> Self {
        match tex_annotation(mathml) {
            Some((tex, true)) => Self::tex_display(tex),
            Some((tex, false)) => Self::tex_inline(tex),
            None => Self::mathml(mathml),
        }
        .with_font(font)
    }

    pub fn format(&self) -> InputFormat {
        self.format
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn font(&self) -> &str {
        &self.font
    }

    /// Whether the font is one the renderer ships with.
    pub fn is_font_valid(&self) -> bool {
        KNOWN_FONTS.contains(&self.font.as_str())
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.format, self.content)
    }
}

/// Extract `(tex, display)` from a MathML string with a TeX annotation.
///
/// Malformed XML, an empty annotation or markup nested inside the annotation
/// all yield `None`, and the MathML is then sent as-is.
fn tex_annotation(mathml: &str) -> Option<(String, bool)> {
    let mut reader = Reader::from_str(mathml);
    let mut display = None;
    // Text collected while inside the TeX annotation.
    let mut tex: Option<String> = None;

    loop {
        match reader.read_event().ok()? {
            Event::Start(element) => {
                if tex.is_some() {
                    return None;
                }
                if display.is_none() {
                    display = Some(attribute(&element, b"display").as_deref() == Some("block"));
                }
                if is_tex_annotation(&element) {
                    tex = Some(String::new());
                }
            }
            Event::Empty(_) => {
                if tex.is_some() {
                    return None;
                }
                display.get_or_insert(false);
            }
            Event::Text(text) => {
                if let Some(tex) = tex.as_mut() {
                    tex.push_str(&text.decode().ok()?);
                }
            }
            Event::CData(text) => {
                if let Some(tex) = tex.as_mut() {
                    tex.push_str(&text.decode().ok()?);
                }
            }
            Event::GeneralRef(reference) => {
                if let Some(tex) = tex.as_mut() {
                    match reference.resolve_char_ref().ok()? {
                        Some(ch) => tex.push(ch),
                        None => {
                            let name = reference.decode().ok()?;
                            tex.push_str(escape::resolve_predefined_entity(&name)?);
                        }
                    }
                }
            }
            Event::End(element) => {
                if element.local_name().as_ref() == b"annotation"
                    && let Some(text) = tex.take()
                {
                    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
                    if !normalized.is_empty() {
                        return Some((normalized, display.unwrap_or(false)));
                    }
                }
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}

fn is_tex_annotation(element: &BytesStart<'_>) -> bool {
    element.local_name().as_ref() == b"annotation"
        && attribute(element, b"encoding").as_deref() == Some(TEX_ENCODING)
}

/// Unescaped, trimmed value of the attribute with local name `name`.
fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    let attr = element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)?;
    let raw = std::str::from_utf8(&attr.value).ok()?;
    let value = escape::unescape(raw).ok()?;
    Some(value.trim().to_string())
}

/// Output of one successful conversion. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionResult {
    svg: String,
    mathml: String,
}

impl ConversionResult {
    pub fn new(svg: impl Into<String>, mathml: impl Into<String>) -> Self {
        Self {
            svg: svg.into(),
            mathml: mathml.into(),
        }
    }

    /// SVG markup.
    pub fn svg(&self) -> &str {
        &self.svg
    }

    /// MathML markup; empty when the renderer produced none.
    pub fn mathml(&self) -> &str {
        &self.mathml
    }
}
