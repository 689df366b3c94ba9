//! Parses the self-describing header embedded in a downloaded main file.
//! The header delimiter regex and per-line un-commenting/shlex tokenizing
//! are ported directly from `nitro.go`'s `headerRegex` / `commentRegex` /
//! `parseHeader`. The metadata block and `SETUP:` marker ahead of the
//! directive sequence are this spec's extension (see SPEC_FULL.md §4.6);
//! `original_source/` has no metadata section of its own to ground that
//! split on, so it follows the same lenient `key: value` shape the
//! supervisor and broker config layers already use for structured text.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::{BootstrapError, BootstrapResult};

pub type HeaderMetadata = BTreeMap<String, String>;

/// One parsed directive: an upper-cased opcode and its argument list.
/// `FILE`'s second argument is replaced with the heredoc's collected
/// contents during parsing (mirroring `nitro.go`'s `args[1] = strings.Join(buffer, "\n")`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCommand {
    pub opcode: String,
    pub args: Vec<String>,
}

fn header_regex() -> Regex {
    Regex::new(r"(?s)#\s*={3,}\s*\n(.+?)\n\s*#\s*={3,}\s*").expect("valid regex")
}

fn uncomment(line: &str) -> String {
    let trimmed = line.trim_start();
    match trimmed.strip_prefix('#') {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest).to_string(),
        None => line.to_string(),
    }
}

/// Parses the header block of `code`, returning the leading metadata and
/// the directive sequence that follows `SETUP:`. A file with no metadata
/// (directives start immediately) is accepted: the `SETUP:` marker itself is
/// optional when there's no metadata to separate from the directives.
pub fn parse(code: &str) -> BootstrapResult<(HeaderMetadata, Vec<HeaderCommand>)> {
    let captures = header_regex()
        .captures(code)
        .ok_or(BootstrapError::NoHeaderFound)?;
    let block = captures.get(1).ok_or(BootstrapError::NoHeaderFound)?.as_str();

    let lines: Vec<&str> = block.lines().collect();
    let setup_marker_pos = lines.iter().position(|line| uncomment(line).trim() == "SETUP:");

    let (metadata_lines, directive_lines): (&[&str], &[&str]) = match setup_marker_pos {
        Some(pos) => (&lines[..pos], &lines[pos + 1..]),
        None => (&[], &lines[..]),
    };

    let metadata = parse_metadata(metadata_lines);
    let commands = parse_directives(directive_lines)?;

    Ok((metadata, commands))
}

fn parse_metadata(lines: &[&str]) -> HeaderMetadata {
    let mut metadata = HeaderMetadata::new();
    for line in lines {
        let line = uncomment(line);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            metadata.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    metadata
}

fn parse_directives(lines: &[&str]) -> BootstrapResult<Vec<HeaderCommand>> {
    let mut commands = Vec::new();
    let mut i = 0;
    let mut pending_continuation = String::new();

    while i < lines.len() {
        let raw = uncomment(lines[i]);

        let line = if raw.trim_end().ends_with('\\') {
            pending_continuation.push_str(raw.trim_end().trim_end_matches('\\'));
            pending_continuation.push(' ');
            i += 1;
            continue;
        } else if !pending_continuation.is_empty() {
            let joined = std::mem::take(&mut pending_continuation) + &raw;
            joined
        } else {
            raw
        };

        let tokens = shlex::split(&line).ok_or_else(|| BootstrapError::LineParse(line.clone()))?;
        i += 1;

        if tokens.is_empty() {
            continue;
        }

        let opcode = tokens[0].to_uppercase();
        let mut args = tokens[1..].to_vec();

        if opcode == "FILE" {
            if args.len() != 2 {
                return Err(BootstrapError::Arity(
                    "FILE",
                    "FILE target-path eof-marker",
                    args,
                ));
            }
            let marker = args[1].clone();
            let mut buffer = Vec::new();
            let mut closed = false;
            while i < lines.len() {
                let content_line = uncomment(lines[i]);
                i += 1;
                if content_line.trim() == marker {
                    closed = true;
                    break;
                }
                buffer.push(content_line);
            }
            if !closed {
                return Err(BootstrapError::UnexpectedEof);
            }
            args[1] = buffer.iter().map(|l| format!("{l}\n")).collect();
        }

        commands.push(HeaderCommand { opcode, args });
    }

    if !pending_continuation.is_empty() {
        return Err(BootstrapError::UnexpectedEof);
    }

    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_metadata_and_file_heredoc() {
        let code = "#!/usr/bin/env python\n\
            # ===\n\
            # title: demo\n\
            # SETUP:\n\
            # FILE hello.txt EOF\n\
            # hi\n\
            # EOF\n\
            # RUN python hello.txt\n\
            # ===\n\
            print('hi')\n";

        let (metadata, commands) = parse(code).unwrap();
        assert_eq!(metadata.get("title"), Some(&"demo".to_string()));
        assert_eq!(commands.len(), 2);

        assert_eq!(commands[0].opcode, "FILE");
        assert_eq!(commands[0].args[0], "hello.txt");
        assert_eq!(commands[0].args[1], "hi\n");

        assert_eq!(commands[1].opcode, "RUN");
        assert_eq!(commands[1].args, vec!["python".to_string(), "hello.txt".to_string()]);
    }

    #[test]
    fn header_without_metadata_has_no_setup_marker_required() {
        let code = "# ===\n\
            # ECHO hello world\n\
            # ===\n";
        let (metadata, commands) = parse(code).unwrap();
        assert!(metadata.is_empty());
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].opcode, "ECHO");
        assert_eq!(commands[0].args, vec!["hello".to_string(), "world".to_string()]);
    }

    #[test]
    fn missing_header_is_an_error() {
        assert!(matches!(parse("no header here"), Err(BootstrapError::NoHeaderFound)));
    }

    #[test]
    fn line_continuation_joins_tokens() {
        let code = "# ===\n\
            # ECHO one \\\n\
            # two\n\
            # ===\n";
        let (_, commands) = parse(code).unwrap();
        assert_eq!(commands[0].args, vec!["one".to_string(), "two".to_string()]);
    }
}
