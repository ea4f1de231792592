//! Working-set hints passed to `codemem pack`.

const WORKING_SET_FLAG: &str = "--working-set-file";
const PATCH_FILE_MARKERS: [&str; 2] = ["*** Update File: ", "*** Add File: "];

/// Appends one `--working-set-file <path>` pair per non-blank path.
pub fn append_working_set_file_args(mut args: Vec<String>, paths: &[String]) -> Vec<String> {
    for path in paths.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        args.push(WORKING_SET_FLAG.to_string());
        args.push(path.to_string());
    }
    args
}

/// File paths touched by an `apply_patch` payload, in order, without repeats.
pub fn extract_apply_patch_paths(patch: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in patch.lines() {
        let line = line.trim_end();
        let path = PATCH_FILE_MARKERS
            .iter()
            .find_map(|marker| line.strip_prefix(marker))
            .map(str::trim);
        if let Some(path) = path.filter(|p| !p.is_empty()) {
            if !out.iter().any(|seen| seen == path) {
                out.push(path.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_flag_per_path() {
        let args = vec!["pack".to_string(), "query".to_string()];
        let out = append_working_set_file_args(args, &["src/a.py".into(), " ".into(), "src/b.py".into()]);
        assert_eq!(
            out,
            vec![
                "pack",
                "query",
                "--working-set-file",
                "src/a.py",
                "--working-set-file",
                "src/b.py"
            ]
        );
    }

    #[test]
    fn patch_paths() {
        let patch = [
            "*** Begin Patch",
            "*** Update File: codemem/store/search.py",
            "@@",
            "*** Add File: .opencode/tests/new.test.js",
            "*** Update File: codemem/store/search.py",
            "*** End Patch",
        ]
        .join("\n");
        assert_eq!(
            extract_apply_patch_paths(&patch),
            vec!["codemem/store/search.py", ".opencode/tests/new.test.js"]
        );
        assert!(extract_apply_patch_paths("").is_empty());
    }
}
