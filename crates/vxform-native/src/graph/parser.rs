//! Textual filter graph descriptions.
//!
//! ```text
//! graph  := chain (';' chain)*
//! chain  := filter (',' filter)*
//! filter := ('[' label ']')* name ('@' instance)? ('=' args)? ('[' label ']')*
//! args   := arg (':' arg)*
//! arg    := (key '=')? value
//! ```
//!
//! Values may be quoted with `'...'` or escaped with `\` to include any of
//! the separator characters.

use crate::error::{NativeError, Result};

/// One `key=value` (or positional `value`) argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterArg {
    pub key: Option<String>,
    pub value: String,
}

/// A filter occurrence in a description.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterSpec {
    pub name: String,
    pub instance: Option<String>,
    pub args: Vec<FilterArg>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Filters linked in sequence.
pub type ChainSpec = Vec<FilterSpec>;

/// Parse a complete graph description.
pub fn parse(description: &str) -> Result<Vec<ChainSpec>> {
    let mut p = Parser {
        chars: description.chars().collect(),
        pos: 0,
    };
    let mut chains = Vec::new();
    loop {
        p.skip_ws();
        if p.at_end() {
            break;
        }
        chains.push(p.chain()?);
        p.skip_ws();
        match p.peek() {
            Some(';') => p.pos += 1,
            None => break,
            Some(c) => return Err(p.error(&format!("unexpected '{c}'"))),
        }
    }
    if chains.is_empty() {
        return Err(NativeError::InvalidArgument("empty filter graph description".into()));
    }
    Ok(chains)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, what: &str) -> NativeError {
        NativeError::InvalidArgument(format!("filter graph parse error at {}: {what}", self.pos))
    }

    fn chain(&mut self) -> Result<ChainSpec> {
        let mut filters = vec![self.filter()?];
        loop {
            self.skip_ws();
            if self.peek() == Some(',') {
                self.pos += 1;
                filters.push(self.filter()?);
            } else {
                return Ok(filters);
            }
        }
    }

    fn filter(&mut self) -> Result<FilterSpec> {
        let inputs = self.labels()?;
        self.skip_ws();
        let name = self.ident(|c| c.is_ascii_alphanumeric() || c == '_');
        if name.is_empty() {
            return Err(self.error("expected a filter name"));
        }
        let instance = if self.peek() == Some('@') {
            self.pos += 1;
            let inst = self.ident(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
            if inst.is_empty() {
                return Err(self.error("expected an instance name after '@'"));
            }
            Some(inst)
        } else {
            None
        };
        let args = if self.peek() == Some('=') {
            self.pos += 1;
            self.args()?
        } else {
            Vec::new()
        };
        let outputs = self.labels()?;
        Ok(FilterSpec {
            name,
            instance,
            args,
            inputs,
            outputs,
        })
    }

    fn ident(&mut self, accept: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&accept) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn labels(&mut self) -> Result<Vec<String>> {
        let mut labels = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() != Some('[') {
                return Ok(labels);
            }
            self.pos += 1;
            let label = self.ident(|c| c != ']' && c != '[');
            if self.peek() != Some(']') {
                return Err(self.error("unterminated label"));
            }
            self.pos += 1;
            if label.is_empty() {
                return Err(self.error("empty label"));
            }
            labels.push(label);
        }
    }

    fn args(&mut self) -> Result<Vec<FilterArg>> {
        let mut args = Vec::new();
        let mut current = String::new();
        let mut key: Option<String> = None;
        let mut touched = false;
        loop {
            match self.peek() {
                None | Some(',') | Some(';') | Some('[') => break,
                Some(':') => {
                    self.pos += 1;
                    args.push(finish_arg(&mut key, &mut current));
                    touched = false;
                }
                Some('=') if key.is_none() => {
                    self.pos += 1;
                    key = Some(std::mem::take(&mut current).trim().to_string());
                }
                Some('\'') => {
                    self.pos += 1;
                    touched = true;
                    loop {
                        match self.peek() {
                            None => return Err(self.error("unterminated quote")),
                            Some('\'') => {
                                self.pos += 1;
                                break;
                            }
                            Some(c) => {
                                current.push(c);
                                self.pos += 1;
                            }
                        }
                    }
                }
                Some('\\') => {
                    self.pos += 1;
                    let c = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    current.push(c);
                    self.pos += 1;
                    touched = true;
                }
                Some(c) => {
                    current.push(c);
                    self.pos += 1;
                    touched = true;
                }
            }
        }
        if touched || key.is_some() || !args.is_empty() {
            args.push(finish_arg(&mut key, &mut current));
        }
        Ok(args)
    }
}

fn finish_arg(key: &mut Option<String>, current: &mut String) -> FilterArg {
    FilterArg {
        key: key.take(),
        value: std::mem::take(current).trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_linear_chain() {
        let chains = parse("buffer@in=width=4:height=2:pix_fmt=rgba,scale=8:4,buffersink@out").unwrap();
        assert_eq!(chains.len(), 1);
        let chain = &chains[0];
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].instance.as_deref(), Some("in"));
        assert_eq!(chain[0].args[2].key.as_deref(), Some("pix_fmt"));
        assert_eq!(chain[1].args[0], FilterArg { key: None, value: "8".into() });
        assert_eq!(chain[2].name, "buffersink");
    }

    #[test]
    fn test_parse_labels_and_chains() {
        let chains = parse("buffer@a=video_size=2x2:pix_fmt=gray[x]; buffer@b=video_size=1x1:pix_fmt=gray [y];[x][y]overlay=x=1:y=0,buffersink").unwrap();
        assert_eq!(chains.len(), 3);
        assert_eq!(chains[0][0].outputs, vec!["x"]);
        assert_eq!(chains[2][0].inputs, vec!["x", "y"]);
    }

    #[test]
    fn test_quoting_and_escapes() {
        let chains = parse(r"null@n=a='x:y,z':b=c\:d").unwrap();
        let args = &chains[0][0].args;
        assert_eq!(args[0].value, "x:y,z");
        assert_eq!(args[1].value, "c:d");
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("[in").is_err());
        assert!(parse("scale='8").is_err());
        assert!(parse("scale=1,").is_err());
    }
}
