//! Template expansion for art files.
//!
//! Art screens may embed `{{ field }}` placeholders that are resolved
//! against the board identity before the bytes hit the wire, so a single
//! welcome screen works across installations. Tera's builtin filters cover
//! the usual presentation helpers (`upper`, `truncate`, padding, date
//! formatting) without any custom registration.

use std::collections::HashMap;

use serde::Serialize;
use tera::Tera;

use crate::config::Config;

/// Bindings available to art templates.
///
/// `custom` entries are merged under their own keys by callers that need
/// per-screen data (prompt text, node counts and the like).
#[derive(Debug, Clone, Serialize)]
pub struct TemplateData {
    pub board_name: String,
    pub pretty_board_name: String,
    pub description: String,
    pub hostname: String,
    pub website: String,
    pub version: String,
    pub custom: HashMap<String, serde_json::Value>,
}

impl TemplateData {
    /// Populate the standard bindings from the running configuration.
    pub fn from_config(config: &Config, version: &str) -> Self {
        TemplateData {
            board_name: config.general.board_name.clone(),
            pretty_board_name: config.general.pretty_board_name.clone(),
            description: config.general.description.clone(),
            hostname: config.general.hostname.clone(),
            website: config.general.website.clone(),
            version: version.to_string(),
            custom: HashMap::new(),
        }
    }
}

/// Expand `data` as a template against the given bindings.
///
/// Only text sources are expanded: art with raw code-page bytes passes
/// through untouched rather than being corrupted by a lossy conversion.
/// Parse errors or unknown bindings fail the whole expansion; no partial
/// output is produced.
pub fn render(data: &[u8], bindings: &TemplateData) -> Result<Vec<u8>, tera::Error> {
    // Fast path: nothing to expand.
    if !data.windows(2).any(|w| w == b"{{") {
        return Ok(data.to_vec());
    }

    let Ok(text) = std::str::from_utf8(data) else {
        return Ok(data.to_vec());
    };
    let context = tera::Context::from_serialize(bindings)?;
    let rendered = Tera::one_off(text, &context, false)?;
    Ok(rendered.into_bytes())
}
