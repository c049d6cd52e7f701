//! Notebook file naming conventions understood by Pluto.jl.

/// Suffixes Pluto accepts as notebook files.
pub const PLUTO_FILE_EXTENSIONS: &[&str] = &[
    ".pluto.jl",
    ".Pluto.jl",
    ".nb.jl",
    ".jl",
    ".plutojl",
    ".pluto",
    ".nbjl",
    ".pljl",
    ".pluto.jl.txt",
    ".jl.txt",
];

/// Whether `file` ends with one of the recognised notebook suffixes.
pub fn is_ext_match(file: &str) -> bool {
    PLUTO_FILE_EXTENSIONS.iter().any(|ext| file.ends_with(ext))
}

/// Extensions without the leading dot, as native file dialogs expect them.
pub fn dialog_extensions() -> Vec<&'static str> {
    PLUTO_FILE_EXTENSIONS
        .iter()
        .map(|ext| ext.trim_start_matches('.'))
        .collect()
}

/// What a command-line locator points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorKind {
    Url,
    Path,
    None,
}

pub fn is_url_or_path(text: &str) -> LocatorKind {
    if text.starts_with("http") {
        LocatorKind::Url
    } else if is_ext_match(text) {
        LocatorKind::Path
    } else {
        LocatorKind::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_suffix_matches() {
        for ext in PLUTO_FILE_EXTENSIONS {
            assert!(is_ext_match(&format!("anything{}", ext)), "{} should match", ext);
        }
    }

    #[test]
    fn test_unlisted_suffix_rejected() {
        assert!(!is_ext_match("notebook.txt"));
        assert!(!is_ext_match("notebook.py"));
        assert!(!is_ext_match(""));
    }

    #[test]
    fn test_dialog_extensions_strip_dot() {
        let exts = dialog_extensions();
        assert_eq!(exts.len(), PLUTO_FILE_EXTENSIONS.len());
        assert!(exts.contains(&"pluto.jl"));
        assert!(exts.iter().all(|e| !e.starts_with('.')));
    }

    #[test]
    fn test_is_url_or_path() {
        assert_eq!(is_url_or_path("http://localhost:1234/edit?id=1"), LocatorKind::Url);
        assert_eq!(is_url_or_path("/home/me/demo.pluto.jl"), LocatorKind::Path);
        assert_eq!(is_url_or_path("README.md"), LocatorKind::None);
    }
}
