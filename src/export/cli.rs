//! Command form of a tree.
//!
//! ```text
//! set interfaces eth0 address '10.0.0.1/24'
//! set interfaces eth0 disable
//! comment interfaces eth0 'uplink'
//! ```
//!
//! A quoted final token on a `set` line is the value; unquoted tokens are
//! always path segments. Blank lines and `#` comments are skipped. A newline
//! inside a value is written as an unquoted `\n` between quoted parts.

use crate::error::{EngineError, EngineResult};
use crate::tree::{ConfigPath, ConfigTree};

pub fn render(tree: &ConfigTree) -> String {
    let mut sets = Vec::new();
    let mut comments = Vec::new();
    tree.walk(|path, node| {
        if node.is_leaf() {
            match &node.value {
                Some(value) => sets.push(format!("set {} {}", path, quote(value))),
                None => sets.push(format!("set {}", path)),
            }
        }
        if let Some(description) = &node.description {
            comments.push(format!("comment {} {}", path, quote(description)));
        }
    });
    sets.extend(comments);
    sets.join("\n")
}

fn quote(text: &str) -> String {
    format!(
        "'{}'",
        text.replace('\'', "'\\''").replace('\n', "'\\n'")
    )
}

#[derive(Debug, PartialEq, Eq)]
struct Token {
    text: String,
    quoted: bool,
}

/// Split one line into tokens, honoring single and double quotes and the
/// `'\''` and `'\n'` escapes that `render` emits.
fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut text = String::new();
        let mut quoted = false;
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            chars.next();
            match c {
                '\'' | '"' => {
                    quoted = true;
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == c {
                            closed = true;
                            break;
                        }
                        text.push(inner);
                    }
                    if !closed {
                        return Err(format!("unterminated {} quote", c));
                    }
                }
                '\\' => match chars.next() {
                    Some('n') => text.push('\n'),
                    Some(escaped) => text.push(escaped),
                    None => return Err("dangling escape".to_string()),
                },
                other => text.push(other),
            }
        }
        tokens.push(Token { text, quoted });
    }
    Ok(tokens)
}

pub fn parse(text: &str) -> EngineResult<ConfigTree> {
    let mut tree = ConfigTree::new();
    for (number, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let at = |reason: String| {
            EngineError::SerializationFailed(format!("line {}: {}", number + 1, reason))
        };
        let tokens = tokenize(line).map_err(at)?;
        let Some((command, args)) = tokens.split_first() else {
            continue;
        };

        let (segments, value) = match args.split_last() {
            Some((last, rest)) if last.quoted => (rest, Some(last.text.clone())),
            _ => (args, None),
        };
        let path = ConfigPath::new(segments.iter().map(|t| t.text.clone()))
            .map_err(|e| at(e.to_string()))?;
        if path.is_root() {
            return Err(at(format!("'{}' needs a path", command.text)));
        }

        let applied = match command.text.as_str() {
            "set" => tree.set(&path, value),
            "comment" => match value {
                Some(description) => tree.describe(&path, Some(description)),
                None => return Err(at("comment needs a quoted text".to_string())),
            },
            other => return Err(at(format!("unknown command '{}'", other))),
        };
        applied.map_err(|e| at(e.to_string()))?;
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let mut tree = ConfigTree::new();
        tree.set_with_description(
            &"interfaces eth0 address".parse().unwrap(),
            Some("10.0.0.1/24".into()),
            Some("uplink".into()),
        )
        .unwrap();
        tree.set(&"service ssh disable".parse().unwrap(), None)
            .unwrap();

        assert_eq!(
            render(&tree),
            "set interfaces eth0 address '10.0.0.1/24'\n\
             set service ssh disable\n\
             comment interfaces eth0 address 'uplink'"
        );
    }

    #[test]
    fn test_parse_keeps_values_and_comments() {
        let text = "# exported\n\
                    set system host-name 'edge router'\n\
                    set service ssh disable\n\
                    set system login banner \"it's me\"\n\
                    comment system host-name 'primary'\n";
        let tree = parse(text).unwrap();
        let host = tree.get(&"system host-name".parse().unwrap()).unwrap();
        assert_eq!(host.value.as_deref(), Some("edge router"));
        assert_eq!(host.description.as_deref(), Some("primary"));
        let banner = tree.get(&"system login banner".parse().unwrap()).unwrap();
        assert_eq!(banner.value.as_deref(), Some("it's me"));
        assert!(tree.contains(&"service ssh disable".parse().unwrap()));
    }

    #[test]
    fn test_render_then_parse_preserves_quotes() {
        let mut tree = ConfigTree::new();
        tree.set(&"system login banner".parse().unwrap(), Some("don't".into()))
            .unwrap();
        assert_eq!(parse(&render(&tree)).unwrap(), tree);
    }

    #[test]
    fn test_multi_line_values_survive_export() {
        let mut tree = ConfigTree::new();
        tree.set(
            &"system login banner pre-login".parse().unwrap(),
            Some("Authorized\nusers only\n".into()),
        )
        .unwrap();

        let text = render(&tree);
        assert_eq!(text.lines().count(), 1);
        assert_eq!(
            text,
            "set system login banner pre-login 'Authorized'\\n'users only'\\n''"
        );
        assert_eq!(parse(&text).unwrap(), tree);
    }

    #[test]
    fn test_parse_errors_name_the_line() {
        let err = parse("set a '1'\ndelete a\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(parse("set a 'open").is_err());
        assert!(parse("set").is_err());
    }
}
