//! Art assets compiled into the binary.
//!
//! A fresh install has no art directory yet; these defaults keep the board
//! presentable until the operator drops overrides into `paths.art`. The
//! loader consults the disk first, so any same-named file there wins.

static EMBEDDED_ART: &[(&str, &[u8])] = &[
    ("welcome.ans", include_bytes!("../config/ansi/welcome.ans")),
    ("main.ans", include_bytes!("../config/ansi/main.ans")),
    ("pause.asc", include_bytes!("../config/ansi/pause.asc")),
    ("boot.utf8ans", include_bytes!("../config/ansi/boot.utf8ans")),
    ("goodbye.asc", include_bytes!("../config/ansi/goodbye.asc")),
];

/// Look up an embedded art file by full file name (`welcome.ans`).
pub fn embedded_art(file_name: &str) -> Option<&'static [u8]> {
    EMBEDDED_ART
        .iter()
        .find(|(name, _)| *name == file_name)
        .map(|(_, bytes)| *bytes)
}

#[cfg(test)]
mod tests {
    use super::embedded_art;

    #[test]
    fn known_assets_resolve() {
        assert!(embedded_art("welcome.ans").is_some());
        assert!(embedded_art("pause.asc").is_some());
        assert!(embedded_art("missing.ans").is_none());
    }
}
