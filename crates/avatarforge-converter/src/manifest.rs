//! MML manifest parsing.
//!
//! The parser is a two-level grammar rather than a full markup parser:
//! start tags of `m-character` and `m-model` are located first, then the
//! attributes inside each tag are read. Anything else in the document is
//! ignored, so manifests do not need to be well-formed.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConversionError;

/// Element carrying the base model reference.
pub const BASE_ELEMENT: &str = "m-character";

/// Element carrying an overlay model reference.
pub const OVERLAY_ELEMENT: &str = "m-model";

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));

/// Start tag of either element. The name must be followed by whitespace,
/// `/` or `>`, and quoted attribute values may contain `>`.
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<(m-character|m-model)((?:\s|/)(?:[^>"']|"[^"]*"|'[^']*')*)?>"#)
        .expect("valid tag regex")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|[\s/])([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("valid attribute regex")
});

/// References extracted from a manifest. Immutable after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// The base model reference, exactly as written (entities decoded).
    pub base_source: String,
    /// Overlay references in document order.
    pub overlay_sources: Vec<String>,
}

impl Manifest {
    /// True when there is nothing to merge.
    pub fn is_monolithic(&self) -> bool {
        self.overlay_sources.is_empty()
    }

    /// Resolve every reference to an absolute URL.
    ///
    /// Relative references are joined onto `manifest_url`; without one they
    /// must already be absolute.
    pub fn resolve(&self, manifest_url: Option<&Url>) -> Result<ResolvedManifest, ConversionError> {
        let base_source = resolve_reference(&self.base_source, manifest_url)?;
        let overlay_sources = self
            .overlay_sources
            .iter()
            .map(|reference| resolve_reference(reference, manifest_url))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ResolvedManifest {
            base_source,
            overlay_sources,
        })
    }
}

/// A manifest whose references are absolute URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedManifest {
    /// Base model URL.
    pub base_source: Url,
    /// Overlay URLs in document order.
    pub overlay_sources: Vec<Url>,
}

impl ResolvedManifest {
    /// True when there is nothing to merge.
    pub fn is_monolithic(&self) -> bool {
        self.overlay_sources.is_empty()
    }
}

/// Parse manifest text into its base and overlay references.
///
/// Fails with [`ConversionError::ManifestMissingBase`] when no base element
/// with a non-empty `src` exists.
pub fn parse(text: &str) -> Result<Manifest, ConversionError> {
    let text = COMMENT_RE.replace_all(text, "");

    let mut base_source: Option<String> = None;
    let mut extra_bases = 0usize;
    let mut overlay_sources = Vec::new();

    for tag in TAG_RE.captures_iter(&text) {
        let name = &tag[1];
        let attrs = tag.get(2).map_or("", |m| m.as_str());
        let Some(src) = src_attribute(attrs) else {
            continue;
        };

        if name.eq_ignore_ascii_case(BASE_ELEMENT) {
            if base_source.is_none() {
                base_source = Some(src);
            } else {
                extra_bases += 1;
            }
        } else {
            overlay_sources.push(src);
        }
    }

    if extra_bases > 0 {
        warn!(
            ignored = extra_bases,
            "Manifest declares more than one base character, using the first"
        );
    }

    let base_source = base_source.ok_or(ConversionError::ManifestMissingBase)?;
    debug!(
        base = %base_source,
        overlays = overlay_sources.len(),
        "Parsed manifest"
    );

    Ok(Manifest {
        base_source,
        overlay_sources,
    })
}

/// First non-empty `src` attribute inside a tag body.
fn src_attribute(attrs: &str) -> Option<String> {
    ATTR_RE
        .captures_iter(attrs)
        .filter(|attr| attr[1].eq_ignore_ascii_case("src"))
        .find_map(|attr| {
            let raw = attr.get(2).or_else(|| attr.get(3))?.as_str().trim();
            (!raw.is_empty()).then(|| decode_entities(raw))
        })
}

/// Decode the five predefined XML entities.
fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn resolve_reference(reference: &str, manifest_url: Option<&Url>) -> Result<Url, ConversionError> {
    let resolved = match manifest_url {
        Some(base) => base.join(reference),
        None => Url::parse(reference),
    };

    let url = resolved.map_err(|e| ConversionError::InvalidReference {
        reference: reference.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConversionError::InvalidReference {
            reference: reference.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}
