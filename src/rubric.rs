//! Rubric (heuristics model) loading with a never-failing fallback.
//!
//! The default rubric is a JSON document describing six evaluation dimensions and their
//! criteria. It is compiled into the binary; `RUBRIC_PATH` may point at a replacement file.
//! Callers may also override it per analysis with arbitrary text, which is passed through
//! untouched. If a replacement file cannot be read or parsed, a minimal embedded rubric listing
//! only the six dimension names is used instead and a warning is returned alongside it.

use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Built-in default framework.
const BUNDLED_RUBRIC: &str = include_str!("../resources/default_rubric.json");

/// Names of the six fixed evaluation dimensions, in presentation order.
pub const DIMENSION_NAMES: [&str; 6] = [
    "Market Opportunity Assessment",
    "Value Creation & Brand Positioning",
    "Operational Excellence & Knowledge Transfer",
    "Financial Structure & Alignment",
    "Leadership & Support Systems",
    "Adaptability & Growth Potential",
];

/// Errors raised while loading the default rubric resource.
#[derive(Debug, Error)]
pub enum RubricError {
    /// Resource file could not be read.
    #[error("failed to read rubric at {path}: {source}")]
    Read {
        /// Location that was attempted.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// Resource file was not a valid framework document.
    #[error("failed to parse rubric at {path}: {source}")]
    Parse {
        /// Location that was attempted.
        path: PathBuf,
        /// Underlying JSON failure.
        #[source]
        source: serde_json::Error,
    },
    /// Built-in resource was not a valid framework document.
    #[error("built-in rubric is invalid: {0}")]
    Bundled(#[source] serde_json::Error),
    /// Rubric parsed but listed no dimensions.
    #[error("rubric at {0} defines no dimensions")]
    Empty(String),
}

/// One scored evaluation category and its criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    /// Display name.
    pub name: String,
    /// Criteria text; empty in the embedded fallback.
    #[serde(default)]
    pub criteria: Vec<String>,
}

/// Structured scoring framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationFramework {
    /// Dimensions in presentation order.
    pub dimensions: Vec<Dimension>,
}

impl EvaluationFramework {
    /// Embedded fallback: the six dimension names without criteria.
    pub fn minimal() -> Self {
        Self {
            dimensions: DIMENSION_NAMES
                .iter()
                .map(|name| Dimension {
                    name: (*name).to_string(),
                    criteria: Vec::new(),
                })
                .collect(),
        }
    }

    /// JSON form used as prompt text: `", "` and `": "` separators, non-ASCII escaped.
    pub fn to_rubric(&self) -> RubricDocument {
        let mut buf = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedAsciiFormatter);
        // Serializing plain strings and vectors cannot fail.
        let text = self
            .serialize(&mut serializer)
            .ok()
            .and_then(|()| String::from_utf8(buf).ok())
            .unwrap_or_default();
        RubricDocument(text)
    }
}

/// Single-line JSON with a space after every separator and `\uXXXX` escapes for non-ASCII.
struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

/// Opaque rubric text interpolated into the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RubricDocument(String);

impl RubricDocument {
    /// Wrap caller-supplied rubric text.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Borrow the rubric text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RubricDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the resolved rubric came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RubricSource {
    /// Caller-supplied text.
    Override,
    /// Default resource file.
    Default,
    /// Embedded minimal rubric.
    Fallback,
}

/// Rubric chosen for one analysis, plus any non-blocking warning.
#[derive(Debug, Clone)]
pub struct ResolvedRubric {
    /// Text to interpolate.
    pub document: RubricDocument,
    /// Provenance of the text.
    pub source: RubricSource,
    /// Set when the default resource was unusable.
    pub warning: Option<String>,
}

/// Parse the framework compiled into the binary.
pub fn bundled_framework() -> Result<EvaluationFramework, RubricError> {
    let framework: EvaluationFramework =
        serde_json::from_str(BUNDLED_RUBRIC).map_err(RubricError::Bundled)?;
    non_empty(framework, "the built-in resource")
}

/// Load and validate a framework file.
pub fn load_framework_file(path: &Path) -> Result<EvaluationFramework, RubricError> {
    let raw = std::fs::read_to_string(path).map_err(|source| RubricError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let framework: EvaluationFramework =
        serde_json::from_str(&raw).map_err(|source| RubricError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    non_empty(framework, &path.display().to_string())
}

/// Load the default framework: the replacement file when one is configured, otherwise the
/// built-in resource.
pub fn load_default_framework(
    replacement: Option<&Path>,
) -> Result<EvaluationFramework, RubricError> {
    match replacement {
        Some(path) => load_framework_file(path),
        None => bundled_framework(),
    }
}

fn non_empty(
    framework: EvaluationFramework,
    origin: &str,
) -> Result<EvaluationFramework, RubricError> {
    if framework.dimensions.is_empty() {
        return Err(RubricError::Empty(origin.to_string()));
    }
    Ok(framework)
}

/// Framework shown in the framework view, with a warning when the fallback is in use.
pub fn framework_for_display(replacement: Option<&Path>) -> (EvaluationFramework, Option<String>) {
    match load_default_framework(replacement) {
        Ok(framework) => (framework, None),
        Err(error) => {
            tracing::warn!(error = %error, "Default rubric unavailable; using embedded fallback");
            (
                EvaluationFramework::minimal(),
                Some(fallback_warning(&error)),
            )
        }
    }
}

/// Pick the rubric for an analysis. Never fails.
///
/// An empty override counts as absent; any other text, whitespace included, is used as given.
pub fn resolve_rubric(override_text: Option<&str>, replacement: Option<&Path>) -> ResolvedRubric {
    if let Some(text) = override_text.filter(|text| !text.is_empty()) {
        tracing::debug!(chars = text.len(), "Using rubric override");
        return ResolvedRubric {
            document: RubricDocument::new(text),
            source: RubricSource::Override,
            warning: None,
        };
    }

    let (framework, warning) = framework_for_display(replacement);
    let source = if warning.is_some() {
        RubricSource::Fallback
    } else {
        RubricSource::Default
    };
    tracing::debug!(
        ?source,
        path = ?replacement.map(Path::display),
        "Resolved default rubric"
    );
    ResolvedRubric {
        document: framework.to_rubric(),
        source,
        warning,
    }
}

fn fallback_warning(error: &RubricError) -> String {
    format!("Default rubric could not be loaded ({error}); using the minimal built-in rubric.")
}
