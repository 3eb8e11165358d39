//! Source preprocessing.
//!
//! The scheduler only ever sees a flat list of lines. [`BlockPreprocessor`]
//! produces that list by unrolling every `rudia(N) { ... }` block, inner
//! blocks first, and surrounding each unrolled block with marker comments:
//!
//! ```text
//! rudia(2) {          // rudia(2) imeenezwa hapa:
//!     washa(1)        // --- Mzunguko 1/2 ---
//! }                   washa(1)
//!                     // --- Mzunguko 2/2 ---
//!                     washa(1)
//!                     // --- Mwisho wa rudia ---
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

lazy_static! {
    static ref BLOCK_OPENER_PREFIX: Regex = Regex::new(r"^rudia\s*\((.*?)\)\s*\{").unwrap();
    static ref BLOCK_OPENER: Regex = Regex::new(r"^rudia\s*\((.*)\)\s*\{$").unwrap();
}

pub const DEFAULT_MAX_EXPANDED_LINES: usize = 100_000;

pub trait Preprocessor<T, U = T> {
    fn process(&self, input: T) -> U;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("Kizuizi cha rudia kwenye mstari {line} hakijafungwa")]
    UnterminatedBlock { line: usize },

    #[error("Mabano '}}' yasiyotarajiwa kwenye mstari {line}")]
    UnexpectedClosingBrace { line: usize },

    #[error("Idadi ya marudio si sahihi kwenye mstari {line}: {value}")]
    InvalidRepeatCount { line: usize, value: String },

    #[error("Programu ni ndefu mno baada ya kuenezwa (zaidi ya mistari {limit})")]
    ExpansionTooLarge { limit: usize },
}

pub type PreprocessResult<T> = Result<T, PreprocessError>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceLine {
    number: usize,
    text: String,
}

#[derive(Debug, Clone)]
pub struct BlockPreprocessor {
    max_lines: usize,
}

impl Default for BlockPreprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EXPANDED_LINES)
    }
}

impl<'a> Preprocessor<&'a str, PreprocessResult<Vec<String>>> for BlockPreprocessor {
    fn process(&self, input: &'a str) -> PreprocessResult<Vec<String>> {
        let lines = normalize(input);
        let mut output = Vec::new();
        self.expand(&lines, &mut output)?;
        debug!(
            "Preprocessed {} source lines into {} lines",
            input.lines().count(),
            output.len()
        );
        Ok(output)
    }
}

impl BlockPreprocessor {
    pub fn new(max_lines: usize) -> Self {
        Self { max_lines }
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    fn expand(&self, lines: &[SourceLine], output: &mut Vec<String>) -> PreprocessResult<()> {
        // Braces of non-rudia openers pass through but must still balance.
        let mut open_depth = 0usize;
        let mut index = 0;

        while index < lines.len() {
            let line = &lines[index];
            let text = line.text.trim();

            if let Some(caps) = BLOCK_OPENER.captures(text) {
                let count = parse_count(&caps[1], line.number)?;
                let close = find_matching_close(lines, index)?;

                let mut body = Vec::new();
                self.expand(&lines[index + 1..close], &mut body)?;

                let expanded = count
                    .checked_mul(body.len() + 1)
                    .and_then(|n| n.checked_add(output.len() + 2))
                    .filter(|&n| n <= self.max_lines);
                if expanded.is_none() {
                    return Err(PreprocessError::ExpansionTooLarge {
                        limit: self.max_lines,
                    });
                }

                output.push(format!("// rudia({}) imeenezwa hapa:", count));
                for iteration in 1..=count {
                    output.push(format!("// --- Mzunguko {}/{} ---", iteration, count));
                    output.extend(body.iter().cloned());
                }
                output.push("// --- Mwisho wa rudia ---".to_string());

                index = close + 1;
                continue;
            }

            if !is_comment(text) {
                if text == "}" {
                    if open_depth == 0 {
                        return Err(PreprocessError::UnexpectedClosingBrace { line: line.number });
                    }
                    open_depth -= 1;
                } else if text.ends_with('{') {
                    open_depth += 1;
                }
            }

            if output.len() >= self.max_lines {
                return Err(PreprocessError::ExpansionTooLarge {
                    limit: self.max_lines,
                });
            }
            output.push(line.text.clone());
            index += 1;
        }

        Ok(())
    }
}

fn is_comment(text: &str) -> bool {
    text.starts_with("//")
}

fn parse_count(argument: &str, line: usize) -> PreprocessResult<usize> {
    argument
        .trim()
        .parse::<usize>()
        .map_err(|_| PreprocessError::InvalidRepeatCount {
            line,
            value: argument.trim().to_string(),
        })
}

/// Index of the `}` closing the opener at `open`.
fn find_matching_close(lines: &[SourceLine], open: usize) -> PreprocessResult<usize> {
    let mut depth = 1usize;
    for (index, line) in lines.iter().enumerate().skip(open + 1) {
        let text = line.text.trim();
        if is_comment(text) {
            continue;
        }
        if text.ends_with('{') {
            depth += 1;
        } else if text == "}" {
            depth -= 1;
            if depth == 0 {
                return Ok(index);
            }
        }
    }
    Err(PreprocessError::UnterminatedBlock {
        line: lines[open].number,
    })
}

/// Splits source into lines, putting block openers and closing braces on
/// lines of their own.
fn normalize(source: &str) -> Vec<SourceLine> {
    let mut lines = Vec::new();
    for (index, raw) in source.lines().enumerate() {
        let number = index + 1;
        let text = raw.trim();
        if text.is_empty() || is_comment(text) {
            lines.push(SourceLine {
                number,
                text: raw.to_string(),
            });
            continue;
        }

        let pieces = split_braces(text);
        if pieces.len() == 1 {
            lines.push(SourceLine {
                number,
                text: raw.to_string(),
            });
        } else {
            lines.extend(pieces.into_iter().map(|text| SourceLine { number, text }));
        }
    }
    lines
}

fn split_braces(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text.trim();

    while let Some(opener) = BLOCK_OPENER_PREFIX.find(rest) {
        let remainder = rest[opener.end()..].trim();
        if remainder.is_empty() {
            break;
        }
        pieces.push(opener.as_str().to_string());
        rest = remainder;
    }

    let mut closers = 0;
    let mut statement = rest;
    if statement != "}" {
        while let Some(stripped) = statement.strip_suffix('}') {
            closers += 1;
            statement = stripped.trim_end();
        }
    }
    if !statement.is_empty() {
        pieces.push(statement.to_string());
    }
    pieces.extend(std::iter::repeat("}".to_string()).take(closers));
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn process(source: &str) -> PreprocessResult<Vec<String>> {
        BlockPreprocessor::default().process(source)
    }

    fn executable(lines: &[String]) -> Vec<&str> {
        lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() && !line.starts_with("//"))
            .collect()
    }

    #[test]
    fn test_plain_lines_pass_through() {
        let source = "washa(1)\n\n// maoni\n  subiri(100)";
        assert_eq!(
            process(source).unwrap(),
            vec!["washa(1)", "", "// maoni", "  subiri(100)"]
        );
    }

    #[test]
    fn test_one_line_block() {
        assert_eq!(
            process("rudia(2) { washa(1) }").unwrap(),
            vec![
                "// rudia(2) imeenezwa hapa:",
                "// --- Mzunguko 1/2 ---",
                "washa(1)",
                "// --- Mzunguko 2/2 ---",
                "washa(1)",
                "// --- Mwisho wa rudia ---",
            ]
        );
    }

    #[test]
    fn test_multi_line_block_keeps_body_text() {
        let source = "x = 1\nrudia(3) {\n    washa(x)\n    x = x + 1\n}\nzima(1)";
        let lines = process(source).unwrap();
        assert_eq!(
            executable(&lines),
            vec![
                "x = 1",
                "washa(x)",
                "x = x + 1",
                "washa(x)",
                "x = x + 1",
                "washa(x)",
                "x = x + 1",
                "zima(1)",
            ]
        );
        assert!(lines.contains(&"    washa(x)".to_string()));
    }

    #[test]
    fn test_nested_blocks() {
        let lines = process("rudia(2) { rudia(3) { zima(2) } }").unwrap();
        assert_eq!(executable(&lines), vec!["zima(2)"; 6]);

        let source = "rudia(2) {\n  washa(1)\n  rudia(3) {\n    zima(2)\n  }\n}";
        let lines = process(source).unwrap();
        let ones = executable(&lines).iter().filter(|l| **l == "washa(1)").count();
        let twos = executable(&lines).iter().filter(|l| **l == "zima(2)").count();
        assert_eq!((ones, twos), (2, 6));
    }

    #[test]
    fn test_zero_repetitions() {
        let lines = process("rudia(0) {\nwasha(1)\n}").unwrap();
        assert!(executable(&lines).is_empty());
    }

    #[test]
    fn test_unterminated_block() {
        assert_eq!(
            process("washa(1)\nrudia(2) {\n  zima(1)"),
            Err(PreprocessError::UnterminatedBlock { line: 2 })
        );
    }

    #[test]
    fn test_unexpected_closing_brace() {
        assert_eq!(
            process("washa(1)\n}\nzima(1)"),
            Err(PreprocessError::UnexpectedClosingBrace { line: 2 })
        );
    }

    #[test]
    fn test_dynamic_repeat_count_is_rejected() {
        assert_eq!(
            process("n = 3\nrudia(n) {\nwasha(1)\n}"),
            Err(PreprocessError::InvalidRepeatCount {
                line: 2,
                value: "n".to_string(),
            })
        );
        assert!(matches!(
            process("rudia(-1) { washa(1) }"),
            Err(PreprocessError::InvalidRepeatCount { .. })
        ));
    }

    #[test]
    fn test_malformed_repeat_count_fails_before_running() {
        assert_eq!(
            process("rudia((2)) {\nwasha(1)\n}"),
            Err(PreprocessError::InvalidRepeatCount {
                line: 1,
                value: "(2)".to_string(),
            })
        );
        assert_eq!(
            process("rudia((2)) { washa(1) }"),
            Err(PreprocessError::InvalidRepeatCount {
                line: 1,
                value: "(2)".to_string(),
            })
        );
        assert!(matches!(
            process("rudia(2 + 1) {\nwasha(1)\n}"),
            Err(PreprocessError::InvalidRepeatCount { .. })
        ));
    }

    #[test]
    fn test_expansion_limit() {
        let preprocessor = BlockPreprocessor::new(50);
        assert_eq!(
            preprocessor.process("rudia(100) { washa(1) }"),
            Err(PreprocessError::ExpansionTooLarge { limit: 50 })
        );
        assert!(preprocessor.process("rudia(10) { washa(1) }").is_ok());
    }

    #[test]
    fn test_comments_are_not_split() {
        assert_eq!(
            process("// rudia(2) { washa(1) }").unwrap(),
            vec!["// rudia(2) { washa(1) }"]
        );
    }

    #[test]
    fn test_split_braces() {
        assert_eq!(split_braces("zima(1) }"), vec!["zima(1)", "}"]);
        assert_eq!(split_braces("}"), vec!["}"]);
        assert_eq!(split_braces("} }"), vec!["}", "}"]);
        assert_eq!(split_braces("rudia(2) {"), vec!["rudia(2) {"]);
        assert_eq!(
            split_braces("rudia(2) { rudia(3) { zima(2) } }"),
            vec!["rudia(2) {", "rudia(3) {", "zima(2)", "}", "}"]
        );
    }

    proptest! {
        #[test]
        fn prop_nested_counts_multiply(outer in 0usize..6, inner in 0usize..6) {
            let source = format!("rudia({}) {{\nrudia({}) {{\nwasha(1)\n}}\n}}", outer, inner);
            let lines = process(&source).unwrap();
            prop_assert_eq!(executable(&lines).len(), outer * inner);
        }
    }
}
