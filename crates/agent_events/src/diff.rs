//! Deterministic unified-diff construction for tool-call diff blocks.
//!
//! The backend ships raw old/new text pairs; display layers want a unified
//! diff. The diff is a full line-based LCS (no truncation, single hunk) and
//! the backtrack tie-break is fixed — removal wins when removal and insertion
//! are equally optimal — so the same inputs always produce byte-identical
//! output.

enum DiffOp<'a> {
    Context(&'a str),
    Add(&'a str),
    Remove(&'a str),
}

fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n').collect()
}

fn lcs_table(old_lines: &[&str], new_lines: &[&str]) -> Vec<Vec<usize>> {
    let rows = old_lines.len() + 1;
    let cols = new_lines.len() + 1;
    let mut table = vec![vec![0usize; cols]; rows];

    for i in (0..old_lines.len()).rev() {
        for j in (0..new_lines.len()).rev() {
            table[i][j] = if old_lines[i] == new_lines[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    table
}

fn diff_ops<'a>(old_lines: &[&'a str], new_lines: &[&'a str]) -> Vec<DiffOp<'a>> {
    let table = lcs_table(old_lines, new_lines);
    let mut ops = Vec::new();
    let mut i = 0;
    let mut j = 0;

    while i < old_lines.len() && j < new_lines.len() {
        if old_lines[i] == new_lines[j] {
            ops.push(DiffOp::Context(old_lines[i]));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            ops.push(DiffOp::Remove(old_lines[i]));
            i += 1;
        } else {
            ops.push(DiffOp::Add(new_lines[j]));
            j += 1;
        }
    }

    while i < old_lines.len() {
        ops.push(DiffOp::Remove(old_lines[i]));
        i += 1;
    }

    while j < new_lines.len() {
        ops.push(DiffOp::Add(new_lines[j]));
        j += 1;
    }

    ops
}

/// Builds a single-hunk unified diff between two texts.
///
/// Empty or missing texts are treated as zero lines; an empty path renders as
/// `unknown` so the header is always well-formed.
pub fn build_unified_diff(path: &str, old_text: Option<&str>, new_text: Option<&str>) -> String {
    let safe_path = if path.is_empty() { "unknown" } else { path };
    let old_lines = split_lines(old_text.unwrap_or_default());
    let new_lines = split_lines(new_text.unwrap_or_default());
    let ops = diff_ops(&old_lines, &new_lines);

    let old_count = old_lines.len();
    let new_count = new_lines.len();
    let old_start = usize::from(old_count > 0);
    let new_start = usize::from(new_count > 0);

    let mut out = String::new();
    out.push_str(&format!("--- a/{safe_path}\n"));
    out.push_str(&format!("+++ b/{safe_path}\n"));
    out.push_str(&format!(
        "@@ -{old_start},{old_count} +{new_start},{new_count} @@"
    ));

    for op in ops {
        let (prefix, text) = match op {
            DiffOp::Context(text) => (' ', text),
            DiffOp::Add(text) => ('+', text),
            DiffOp::Remove(text) => ('-', text),
        };
        out.push('\n');
        out.push(prefix);
        out.push_str(text);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::build_unified_diff;

    #[test]
    fn formats_header_and_changes() {
        let diff = build_unified_diff("file.txt", Some("a\nb"), Some("a\nc"));

        assert!(diff.contains("--- a/file.txt"));
        assert!(diff.contains("+++ b/file.txt"));
        assert!(diff.contains("@@ -1,2 +1,2 @@"));
        assert!(diff.contains("\n-b"));
        assert!(diff.contains("\n+c"));
    }

    #[test]
    fn handles_empty_path_and_new_content() {
        let diff = build_unified_diff("", None, Some("line"));

        assert!(diff.contains("--- a/unknown"));
        assert!(diff.contains("@@ -0,0 +1,1 @@"));
        assert!(diff.contains("\n+line"));
    }

    #[test]
    fn handles_removal_to_empty() {
        let diff = build_unified_diff("file.txt", Some("old"), Some(""));

        assert!(diff.contains("@@ -1,1 +0,0 @@"));
        assert!(diff.contains("\n-old"));
    }

    #[test]
    fn output_is_deterministic_across_calls() {
        let first = build_unified_diff("f", Some("a\nx\nb"), Some("a\ny\nb"));
        let second = build_unified_diff("f", Some("a\nx\nb"), Some("a\ny\nb"));

        assert_eq!(first, second);
        // Fixed tie-break: the removal precedes the insertion.
        let minus = first.find("\n-x").expect("removal present");
        let plus = first.find("\n+y").expect("insertion present");
        assert!(minus < plus);
    }

    #[test]
    fn replaying_ops_reconstructs_new_text() {
        let old_text = "fn main() {\n    old();\n}\n";
        let new_text = "fn main() {\n    new();\n    extra();\n}\n";
        let diff = build_unified_diff("src/main.rs", Some(old_text), Some(new_text));

        let mut rebuilt: Vec<&str> = Vec::new();
        for line in diff.lines().skip(3) {
            match line.as_bytes().first() {
                Some(b'+') | Some(b' ') => rebuilt.push(&line[1..]),
                Some(b'-') => {}
                _ => rebuilt.push(line),
            }
        }

        assert_eq!(rebuilt.join("\n"), new_text);
    }
}
