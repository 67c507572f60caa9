//! Shared fixtures: a shell script that speaks the renderer line protocol.
//!
//! The script is launched as `sh render.sh <dir> <font>`. It echoes the
//! content back inside the SVG, reports an error for content starting with
//! `error`, and writes to stderr and exits for content starting with `crash`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FAKE_RENDERER: &str = r#"font="$2"
while IFS= read -r format; do
  content=""
  while IFS= read -r line; do
    [ -z "$line" ] && break
    content="$content$line"
  done
  case "$content" in
    crash*)
      echo "renderer crashed on $content" >&2
      exit 3
      ;;
    error*)
      printf '<<BEGIN:RESULT\n<<BEGIN:ERRORS\nError: %s\n<<END:ERRORS\n<<BEGIN:SVG\n<<END:SVG\n<<BEGIN:MATHML\n<<END:MATHML\n<<END:RESULT\n' "$content"
      ;;
    *)
      printf '<<BEGIN:RESULT\n<<BEGIN:ERRORS\n<<END:ERRORS\n<<BEGIN:SVG\n<svg data-font="%s" data-format="%s">%s</svg>\n<<END:SVG\n<<BEGIN:MATHML\n<math>%s</math>\n<<END:MATHML\n<<END:RESULT\n' "$font" "$format" "$content" "$content"
      ;;
  esac
done
"#;

/// A temp dir holding the fake renderer.
pub struct FakeRenderer {
    dir: TempDir,
}

impl FakeRenderer {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("render.sh"), FAKE_RENDERER).unwrap();
        Self { dir }
    }

    pub fn script(&self) -> PathBuf {
        self.dir.path().join("render.sh")
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// CLI arguments pointing mathpool at the fake renderer.
    pub fn cli_args(&self) -> Vec<String> {
        vec![
            "--launcher".to_string(),
            "sh".to_string(),
            "--renderer".to_string(),
            self.script().display().to_string(),
            "--renderer-dir".to_string(),
            self.dir().display().to_string(),
            "--creation-interval-ms".to_string(),
            "0".to_string(),
        ]
    }
}
