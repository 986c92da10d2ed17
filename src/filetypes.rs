//! File type classification by name

use std::fmt;
use std::path::Path;

/// Encoding of a source or data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Cue,
    Json,
    Yaml,
    Toml,
    Text,
    Unknown,
}

impl Encoding {
    /// Classifies a file by its extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext,
            None => return Encoding::Unknown,
        };
        match ext {
            "cue" => Encoding::Cue,
            "json" | "jsonl" | "ldjson" => Encoding::Json,
            "yaml" | "yml" => Encoding::Yaml,
            "toml" => Encoding::Toml,
            "txt" => Encoding::Text,
            _ => Encoding::Unknown,
        }
    }

    /// Data files can be loaded alongside a package when data files are
    /// enabled; otherwise they are orphaned.
    pub fn is_data(self) -> bool {
        matches!(
            self,
            Encoding::Json | Encoding::Yaml | Encoding::Toml | Encoding::Text
        )
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Encoding::Cue => "cue",
            Encoding::Json => "json",
            Encoding::Yaml => "yaml",
            Encoding::Toml => "toml",
            Encoding::Text => "text",
            Encoding::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Reports whether a command-line argument names a file rather than a
/// package: its final element must carry a recognized extension.
pub fn is_file_arg(arg: &str) -> bool {
    let last = arg.rsplit('/').next().unwrap_or(arg);
    // `./...` patterns and qualifiers are never files.
    if last.contains("...") || last.contains(':') {
        return false;
    }
    Encoding::from_path(Path::new(last)) != Encoding::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path() {
        assert_eq!(Encoding::from_path(Path::new("a.cue")), Encoding::Cue);
        assert_eq!(Encoding::from_path(Path::new("a.jsonl")), Encoding::Json);
        assert_eq!(Encoding::from_path(Path::new("/x/a.yml")), Encoding::Yaml);
        assert_eq!(Encoding::from_path(Path::new("a.toml")), Encoding::Toml);
        assert_eq!(Encoding::from_path(Path::new("notes.txt")), Encoding::Text);
        assert_eq!(Encoding::from_path(Path::new("Makefile")), Encoding::Unknown);
        assert_eq!(Encoding::from_path(Path::new("a.go")), Encoding::Unknown);
    }

    #[test]
    fn test_is_data() {
        assert!(Encoding::Json.is_data());
        assert!(!Encoding::Cue.is_data());
        assert!(!Encoding::Unknown.is_data());
    }

    #[test]
    fn test_is_file_arg() {
        assert!(is_file_arg("a.cue"));
        assert!(is_file_arg("./dir/data.json"));
        assert!(!is_file_arg("./dir"));
        assert!(!is_file_arg("example.com/foo"));
        assert!(!is_file_arg("./..."));
        assert!(!is_file_arg("example.com/foo.cue:bar"));
    }
}
