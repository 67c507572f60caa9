//! Line protocol spoken with a renderer instance.
//!
//! Request: the format line, one line of content, then an empty line.
//!
//! Response:
//!
//! ```text
//! <<BEGIN:RESULT
//! <<BEGIN:SVG
//! ...
//! <<END:SVG
//! <<BEGIN:MATHML
//! ...
//! <<END:MATHML
//! <<END:RESULT
//! ```
//!
//! with an optional `ERRORS` section. Anything malformed is a transport
//! error; a non-empty `ERRORS` section or a missing SVG is a conversion error.

use super::process::Instance;
use crate::equation::{ConversionResult, Equation};
use crate::error::{ChannelError, PoolError, Result};
use std::str::FromStr;
use std::time::Duration;
use tracing::trace;

const BEGIN_RESULT: &str = "<<BEGIN:RESULT";
const END_RESULT: &str = "<<END:RESULT";
const BEGIN_PREFIX: &str = "<<BEGIN:";
const END_PREFIX: &str = "<<END:";

/// A named block inside a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Errors,
    Svg,
    Mathml,
}

impl FromStr for Section {
    type Err = ();

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        match name {
            "ERRORS" => Ok(Self::Errors),
            "SVG" => Ok(Self::Svg),
            "MATHML" => Ok(Self::Mathml),
            _ => Err(()),
        }
    }
}

impl Section {
    fn name(self) -> &'static str {
        match self {
            Self::Errors => "ERRORS",
            Self::Svg => "SVG",
            Self::Mathml => "MATHML",
        }
    }
}

/// Raw section text of one response.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Response {
    pub errors: String,
    pub svg: String,
    pub mathml: String,
}

impl Response {
    fn section_mut(&mut self, section: Section) -> &mut String {
        match section {
            Section::Errors => &mut self.errors,
            Section::Svg => &mut self.svg,
            Section::Mathml => &mut self.mathml,
        }
    }

    /// Classify a well-formed response.
    pub fn into_result(self) -> Result<ConversionResult> {
        if !self.errors.is_empty() {
            return Err(PoolError::Conversion(self.errors));
        }
        if self.svg.is_empty() {
            return Err(PoolError::Conversion(
                "Renderer returned no SVG and no error".to_string(),
            ));
        }
        Ok(ConversionResult::new(self.svg, self.mathml))
    }
}

/// Normalise content for the wire: trimmed, no CRs, no blank lines.
///
/// A blank line ends the request, so the content must not contain one.
pub fn sanitize_content(content: &str) -> String {
    content
        .trim()
        .replace('\r', "")
        .split('\n')
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// The lines making up one request.
pub fn request_lines(equation: &Equation) -> [String; 3] {
    [
        equation.format().code().to_string(),
        sanitize_content(equation.content()),
        String::new(),
    ]
}

/// Send one equation and read the reply.
///
/// Transport failures come back as [`PoolError::Transport`]; the caller owns
/// tearing the instance down.
pub fn exchange<I: Instance + ?Sized>(
    instance: &mut I,
    equation: &Equation,
    timeout: Duration,
) -> Result<ConversionResult> {
    for line in request_lines(equation) {
        trace!(line = %line, "[SENT]");
        instance.send_line(&line).map_err(write_failed)?;
    }
    instance.flush().map_err(write_failed)?;

    let response = read_response(|| {
        let line = instance.read_line(timeout)?;
        trace!(line = %line, "[READ]");
        Ok(line)
    })?;
    response.into_result()
}

fn write_failed(err: std::io::Error) -> PoolError {
    PoolError::transport(format!("Failed writing to renderer: {err}"))
}

/// Parse one response from a line source.
pub(crate) fn read_response<F>(mut next_line: F) -> Result<Response>
where
    F: FnMut() -> std::result::Result<String, ChannelError>,
{
    let first = next_line()?;
    if first != BEGIN_RESULT {
        return Err(PoolError::transport(format!(
            "Expecting result start: {first}"
        )));
    }

    let mut response = Response::default();
    let mut open: Option<Section> = None;
    loop {
        let line = next_line()?;
        match open {
            None => {
                if line == END_RESULT {
                    return Ok(response);
                }
                let name = line.strip_prefix(BEGIN_PREFIX).ok_or_else(|| {
                    PoolError::transport(format!("Expecting BEGIN line: {line}"))
                })?;
                let section = name.parse::<Section>().map_err(|_| {
                    PoolError::transport(format!("Unknown result section: {line}"))
                })?;
                open = Some(section);
            }
            Some(section) => match line.strip_prefix(END_PREFIX) {
                Some(name) if is_section_name(name) => {
                    if name != section.name() {
                        return Err(PoolError::transport(format!(
                            "Non-matching END, expecting {}: {line}",
                            section.name()
                        )));
                    }
                    let text = response.section_mut(section);
                    *text = text.trim().to_string();
                    open = None;
                }
                _ => {
                    let text = response.section_mut(section);
                    text.push_str(&line);
                    text.push('\n');
                }
            },
        }
    }
}

/// Section names are upper-case letters and digits.
fn is_section_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}
