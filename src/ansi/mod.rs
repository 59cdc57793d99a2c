//! Art loading and rendering.
//!
//! A view's backdrop goes through a fixed pipeline before it reaches the
//! terminal: locate the file (disk override, then embedded assets), strip
//! any SAUCE trailer, expand template placeholders, transcode CP437 when the
//! peer speaks UTF-8, canonicalize line endings to CRLF and append an ANSI
//! reset so stray attributes never leak into the prompt.

pub mod cp437;
pub mod sauce;
pub mod template;

use std::collections::HashMap;
use std::path::Path;

use log::debug;
use thiserror::Error;

use crate::assets;
use crate::config::Config;
use crate::nodes::Connection;
use template::TemplateData;

/// ANSI attribute reset, appended after every rendered screen.
pub const RESET_SEQ: &str = "\x1b[0m";
/// Clear screen and home the cursor.
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
pub const HIDE_CURSOR: &str = "\x1b[?25l";
pub const SHOW_CURSOR: &str = "\x1b[?25h";

/// Directory inside the embedded asset tree holding default art.
const EMBEDDED_PREFIX: &str = "config/ansi";

#[derive(Debug, Error)]
pub enum ArtError {
    #[error("art not found: {name} (checked extensions: {extensions:?})")]
    NotFound {
        name: String,
        extensions: Vec<&'static str>,
    },
    #[error("template expansion failed: {0}")]
    Template(#[from] tera::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extension search order for a consumer. UTF-8 capable terminals prefer
/// `.utf8ans` sources; legacy terminals only understand code-page output.
pub fn extension_preference(is_utf8: bool) -> Vec<&'static str> {
    if is_utf8 {
        vec![".utf8ans", ".ans", ".asc"]
    } else {
        vec![".ans", ".asc"]
    }
}

/// Locate and read an art file, returning its bytes and the extension that
/// matched. The configured art directory overrides the embedded defaults.
pub async fn load_art(
    art_dir: &str,
    name: &str,
    extensions: &[&'static str],
) -> Result<(Vec<u8>, &'static str), ArtError> {
    if !art_dir.is_empty() {
        for ext in extensions {
            let path = Path::new(art_dir).join(format!("{name}{ext}"));
            if let Ok(data) = tokio::fs::read(&path).await {
                debug!("loaded art from disk path={}", path.display());
                return Ok((data, ext));
            }
        }
    }

    for ext in extensions {
        let file_name = format!("{name}{ext}");
        if let Some(data) = assets::embedded_art(&file_name) {
            debug!("loaded art from assets path={EMBEDDED_PREFIX}/{file_name}");
            return Ok((data.to_vec(), ext));
        }
    }

    Err(ArtError::NotFound {
        name: name.to_string(),
        extensions: extensions.to_vec(),
    })
}

/// Run the full render pipeline for `name` and return the wire-ready bytes.
pub async fn compose_art(
    config: &Config,
    version: &str,
    name: &str,
    is_utf8: bool,
    custom: HashMap<String, serde_json::Value>,
) -> Result<Vec<u8>, ArtError> {
    let extensions = extension_preference(is_utf8);
    let (data, ext) = load_art(&config.paths.art, name, &extensions).await?;

    let clean = sauce::strip(&data);

    let mut bindings = TemplateData::from_config(config, version);
    bindings.custom = custom;
    let expanded = template::render(clean, &bindings)?;

    // `.ans` sources are CP437; everything else is already in the target
    // encoding and must pass through byte-for-byte.
    let decoded = if is_utf8 && ext == ".ans" {
        cp437::decode(&expanded).into_bytes()
    } else {
        expanded
    };

    let mut out = normalize_line_endings(&decoded);
    out.extend_from_slice(RESET_SEQ.as_bytes());
    Ok(out)
}

/// Render `name` to a connection as a single write.
pub async fn render_art(
    conn: &dyn Connection,
    config: &Config,
    version: &str,
    name: &str,
) -> Result<(), ArtError> {
    let bytes = compose_art(config, version, name, conn.is_utf8(), HashMap::new()).await?;
    conn.write(&bytes).await?;
    Ok(())
}

/// Canonicalize all line endings to CRLF without doubling existing pairs:
/// collapse CRLF to LF, then expand every LF back to CRLF. Byte-oriented so
/// code-page-native art survives untouched.
fn normalize_line_endings(data: &[u8]) -> Vec<u8> {
    let mut collapsed = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'\r' && data.get(i + 1) == Some(&b'\n') {
            collapsed.push(b'\n');
            i += 2;
        } else {
            collapsed.push(data[i]);
            i += 1;
        }
    }

    let mut out = Vec::with_capacity(collapsed.len() + 16);
    for b in collapsed {
        if b == b'\n' {
            out.push(b'\r');
        }
        out.push(b);
    }
    out
}
