//! Small string helpers for diagnostic rendering.

/// Indents every line of `s` by `n` spaces.
pub fn indent(s: &str, n: usize) -> String {
    let pad = " ".repeat(n);
    s.lines()
        .map(|line| {
            if line.is_empty() {
                line.to_string()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indents_each_line() {
        assert_eq!(indent("a\nb", 2), "  a\n  b");
    }

    #[test]
    fn leaves_empty_lines_alone() {
        assert_eq!(indent("a\n\nb", 2), "  a\n\n  b");
    }
}
