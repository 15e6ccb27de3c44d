//! Reads generated files back for the response.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing::{debug, warn};

use crate::io::workspace::{file_label, list_files_with_extensions};

/// Map of file name to text content for every matching file in `dir`.
///
/// Files that cannot be read as UTF-8 text are logged and left out.
pub fn collect_files(dir: &Path, extensions: &[String]) -> Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    for path in list_files_with_extensions(dir, extensions)? {
        let name = file_label(&path);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                files.insert(name, contents);
            }
            Err(e) => warn!(file = %name, err = %e, "failed to read created file"),
        }
    }
    debug!(count = files.len(), "collected created files");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_exts() -> Vec<String> {
        ["py", "js", "txt"].iter().map(|ext| ext.to_string()).collect()
    }

    #[test]
    fn collects_allowed_extensions_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("main.py"), "print(1)").expect("write");
        fs::write(temp.path().join("app.js"), "console.log(1)").expect("write");
        fs::write(temp.path().join("notes.txt"), "notes").expect("write");
        fs::write(temp.path().join("data.json"), "{}").expect("write");
        fs::create_dir(temp.path().join("pkg.py")).expect("mkdir");

        let files = collect_files(temp.path(), &collect_exts()).expect("collect");
        let names: Vec<&str> = files.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["app.js", "main.py", "notes.txt"]);
        assert_eq!(files["main.py"], "print(1)");
    }

    #[test]
    fn skips_files_that_are_not_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("blob.txt"), [0xff, 0xfe, 0x00]).expect("write");
        fs::write(temp.path().join("ok.txt"), "fine").expect("write");

        let files = collect_files(temp.path(), &collect_exts()).expect("collect");
        assert_eq!(files.len(), 1);
        assert_eq!(files["ok.txt"], "fine");
    }
}
