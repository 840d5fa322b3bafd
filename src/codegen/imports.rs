//! Relative import rewriting
//!
//! Override pieces are authored next to the project root. When a module is
//! generated somewhere else, their relative specifiers have to be re-pointed
//! from the new location.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};

fn specifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // `from '…'`, `import '…'`, `import('…')` and `require('…')`
        Regex::new(r#"(\bfrom\s*|\bimport\s*\(?\s*|\brequire\s*\(\s*)(['"])(\.\.?/[^'"\n]*)['"]"#)
            .unwrap_or_else(|e| unreachable!("static import pattern: {}", e))
    })
}

/// Rewrite relative specifiers in `source`, written relative to `authored_in`,
/// so they resolve the same way from a module placed in `module_dir`.
pub fn rewrite_relative_imports(source: &str, authored_in: &Path, module_dir: &Path) -> String {
    specifier_pattern()
        .replace_all(source, |caps: &Captures<'_>| {
            let target = normalize(&authored_in.join(&caps[3]));
            let rewritten = relative_specifier(module_dir, &target);
            format!("{}{}{}{}", &caps[1], &caps[2], rewritten, &caps[2])
        })
        .into_owned()
}

/// Module specifier leading from `from_dir` to `to`, always `./` or `../` prefixed
pub fn relative_specifier(from_dir: &Path, to: &Path) -> String {
    let from = normalize(from_dir);
    let to = normalize(to);

    let from_parts: Vec<Component<'_>> = from.components().collect();
    let to_parts: Vec<Component<'_>> = to.components().collect();

    let common = from_parts
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments: Vec<String> = Vec::new();
    for _ in common..from_parts.len() {
        segments.push("..".to_string());
    }
    for part in &to_parts[common..] {
        segments.push(part.as_os_str().to_string_lossy().into_owned());
    }

    let joined = segments.join("/");
    if joined.starts_with("..") {
        joined
    } else {
        format!("./{}", joined)
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_specifier() {
        assert_eq!(
            relative_specifier(Path::new("/p/api/ping"), Path::new("/p/lib/db.js")),
            "../../lib/db.js"
        );
        assert_eq!(
            relative_specifier(Path::new("/p"), Path::new("/p/api/ping/index.js")),
            "./api/ping/index.js"
        );
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/p/a/./b/../c")), PathBuf::from("/p/a/c"));
    }

    #[test]
    fn test_rewrites_every_import_form() {
        let source = r#"import db from './lib/db.js'
import './setup.js'
const mail = require("../shared/mail")
const lazy = await import('./lib/lazy.js')
import path from 'node:path'"#;

        let rewritten = rewrite_relative_imports(
            source,
            Path::new("/work/project"),
            Path::new("/work/project/api/users"),
        );

        assert!(rewritten.contains("import db from '../../lib/db.js'"));
        assert!(rewritten.contains("import '../../setup.js'"));
        assert!(rewritten.contains(r#"require("../../../shared/mail")"#));
        assert!(rewritten.contains("import('../../lib/lazy.js')"));
        assert!(rewritten.contains("from 'node:path'"));
    }

    #[test]
    fn test_same_directory_is_unchanged() {
        let source = "import db from './lib/db.js'";
        assert_eq!(
            rewrite_relative_imports(source, Path::new("/p"), Path::new("/p")),
            source
        );
    }
}
