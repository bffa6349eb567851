//! Schema-guided parser for configuration text.
//!
//! Statements are `seg value;`, `seg { ... }`, `tag key { ... }` or
//! `tag key;`. Values may carry an operator (`=`, `+=`, `-=`, `==`), and
//! `seg: value` is accepted as an assignment.

use std::iter::Peekable;
use std::str::Chars;
use std::sync::Arc;

use crate::config::node::{NodeId, Operator, ValueToken};
use crate::config::tree::{ConfigTree, ParseError};
use crate::template::tree::split_qualifier;
use crate::template::SchemaTree;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    Open,
    Close,
    Semi,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self { chars: text.chars().peekable(), line: 1 }
    }

    fn syntax(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax(message.into()).at_line(self.line)
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.chars.peek() {
                Some('\n') => {
                    self.line += 1;
                    self.chars.next();
                }
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    match ahead.peek() {
                        Some('*') => self.skip_block_comment()?,
                        Some('/') => {
                            while let Some(c) = self.chars.next() {
                                if c == '\n' {
                                    self.line += 1;
                                    break;
                                }
                            }
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ParseError> {
        self.chars.next();
        self.chars.next();
        let mut previous = '\0';
        while let Some(c) = self.chars.next() {
            if c == '\n' {
                self.line += 1;
            }
            if previous == '*' && c == '/' {
                return Ok(());
            }
            previous = c;
        }
        Err(self.syntax("unterminated comment"))
    }

    fn next_token(&mut self) -> Result<Option<(Token, usize)>, ParseError> {
        self.skip_trivia()?;
        let line = self.line;
        let Some(c) = self.chars.next() else {
            return Ok(None);
        };
        let token = match c {
            '{' => Token::Open,
            '}' => Token::Close,
            ';' => Token::Semi,
            '"' => {
                let mut raw = String::from('"');
                let mut escaped = false;
                loop {
                    let Some(c) = self.chars.next() else {
                        return Err(self.syntax("unterminated quoted string"));
                    };
                    if c == '\n' {
                        self.line += 1;
                    }
                    raw.push(c);
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '"' {
                        break;
                    }
                }
                Token::Quoted(raw)
            }
            first => {
                let mut word = String::from(first);
                while let Some(c) = self.chars.peek() {
                    if c.is_whitespace() || matches!(*c, '{' | '}' | ';' | '"') {
                        break;
                    }
                    word.push(*c);
                    self.chars.next();
                }
                Token::Word(word)
            }
        };
        Ok(Some((token, line)))
    }
}

/// Parse configuration text into a fresh tree over `schema`.
pub fn parse_config(schema: Arc<SchemaTree>, text: &str, user: u32) -> Result<ConfigTree, ParseError> {
    let mut tree = ConfigTree::new(schema);
    let root = tree.root();
    tree.parse_into(root, text, user)?;
    Ok(tree)
}

impl ConfigTree {
    /// Parse statements into the subtree rooted at `parent`.
    pub fn parse_into(&mut self, parent: NodeId, text: &str, user: u32) -> Result<(), ParseError> {
        let mut parser = Parser { tree: self, lexer: Lexer::new(text), user };
        parser.block(parent, false)
    }
}

struct Parser<'t, 'a> {
    tree: &'t mut ConfigTree,
    lexer: Lexer<'a>,
    user: u32,
}

impl Parser<'_, '_> {
    fn block(&mut self, parent: NodeId, nested: bool) -> Result<(), ParseError> {
        loop {
            let Some((token, line)) = self.lexer.next_token()? else {
                if nested {
                    return Err(self.lexer.syntax("unexpected end of input, missing \"}\""));
                }
                return Ok(());
            };
            match token {
                Token::Close if nested => return Ok(()),
                Token::Close => return Err(ParseError::Syntax("unexpected \"}\"".into()).at_line(line)),
                Token::Semi => continue,
                Token::Open => return Err(ParseError::Syntax("unexpected \"{\"".into()).at_line(line)),
                Token::Quoted(raw) => {
                    return Err(ParseError::Syntax(format!("expected a name, found {raw}")).at_line(line))
                }
                Token::Word(word) => self.statement(parent, &word, line)?,
            }
        }
    }

    fn expect_token(&mut self, what: &str) -> Result<(Token, usize), ParseError> {
        match self.lexer.next_token()? {
            Some(next) => Ok(next),
            None => Err(self.lexer.syntax(format!("unexpected end of input, expected {what}"))),
        }
    }

    fn statement(&mut self, parent: NodeId, word: &str, line: usize) -> Result<(), ParseError> {
        let (word, colon) = match word.strip_suffix(':') {
            Some(stripped) if !stripped.is_empty() => (stripped, true),
            _ => (word, false),
        };
        let (segname, qualifier) = split_qualifier(word);
        let id = self
            .tree
            .add_node(parent, segname, qualifier, self.user)
            .map_err(|e| e.at_line(line))?;
        let schema_id = self.tree.schema_id(id);
        let schema = Arc::clone(self.tree.schema());

        if schema.is_tag(schema_id) && !colon {
            let (token, line) = self.expect_token("an instance key or \"{\"")?;
            return match token {
                Token::Open => self.block(id, true),
                Token::Word(key) | Token::Quoted(key) => {
                    let instance = self
                        .tree
                        .add_node(id, &key, None, self.user)
                        .map_err(|e| e.at_line(line))?;
                    match self.expect_token("\"{\" or \";\"")? {
                        (Token::Open, _) => self.block(instance, true),
                        (Token::Semi, _) => Ok(()),
                        (_, line) => Err(ParseError::Syntax(format!("expected \"{{\" or \";\" after {key}")).at_line(line)),
                    }
                }
                _ => Err(ParseError::Syntax(format!("expected an instance key after {segname}")).at_line(line)),
            };
        }

        let is_group = !schema[schema_id].children().is_empty();
        let (mut token, mut line) = self.expect_token("a value, \"{\" or \";\"")?;
        let mut operator = Operator::Assign;
        if let Token::Word(op) = &token {
            if let Some(parsed) = Operator::from_token(op) {
                operator = parsed;
                (token, line) = self.expect_token("a value")?;
            }
        }
        let (value, terminator, line) = match token {
            Token::Semi => (ValueToken::empty(), Token::Semi, line),
            Token::Open if is_group => return self.block(id, true),
            Token::Word(text) => {
                let (next, next_line) = self.expect_token("\";\"")?;
                (ValueToken::bare(text), next, next_line)
            }
            Token::Quoted(raw) => {
                let (next, next_line) = self.expect_token("\";\"")?;
                (ValueToken::quoted(raw), next, next_line)
            }
            _ => return Err(ParseError::Syntax(format!("unexpected token after {segname}")).at_line(line)),
        };
        self.tree
            .set_value(id, &value, operator, self.user)
            .map_err(|e| e.at_line(line))?;

        match terminator {
            Token::Semi => Ok(()),
            Token::Open if is_group => self.block(id, true),
            _ => Err(ParseError::Syntax(format!("expected \";\" after value of {segname}")).at_line(line)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::render::RenderOptions;
    use crate::template::parse_schema;

    const SCHEMA: &str = r#"
[[node]]
path = "interfaces interface @"
type = "txt"

[[node]]
path = "interfaces interface @ description"
type = "txt"

[[node]]
path = "interfaces interface @ mtu"
type = "u32"

[[node]]
path = "interfaces interface @ disable"

[[node]]
path = "interfaces interface @ enabled"
type = "bool"

[[node]]
path = "interfaces interface @ address @"
type = "ipv4net"

[[node]]
path = "routing metric"
type = "int"
"#;

    const CONFIG: &str = r#"/* header comment */
interfaces {
    interface eth0 {
        description "uplink \"A\"";
        mtu: 1500;
        disable;
        enabled;
        address 10.0.0.0/8;
    }
    interface "my port";
}
// trailing comment
routing {
    metric += 5;
}
"#;

    fn schema() -> Arc<SchemaTree> {
        Arc::new(parse_schema(SCHEMA).unwrap())
    }

    #[test]
    fn test_parse_statements() {
        let tree = parse_config(schema(), CONFIG, 0).unwrap();
        let eth0 = "interfaces interface eth0";
        let desc = tree.find(&format!("{eth0} description")).unwrap();
        assert_eq!(tree[desc].value(), Some("uplink \"A\""));
        let mtu = tree.find(&format!("{eth0} mtu")).unwrap();
        assert_eq!(tree[mtu].value(), Some("1500"));
        let disable = tree.find(&format!("{eth0} disable")).unwrap();
        assert_eq!(tree[disable].value(), None);
        let enabled = tree.find(&format!("{eth0} enabled")).unwrap();
        assert_eq!(tree[enabled].value(), Some("true"));
        assert!(tree.find(&format!("{eth0} address 10.0.0.0/8")).is_some());
        let metric = tree.find("routing metric").unwrap();
        assert_eq!(tree[metric].operator(), Operator::Add);
        assert_eq!(tree[metric].value(), Some("5"));

        let tag = tree.find("interfaces interface").unwrap();
        assert!(tree
            .children(tag)
            .iter()
            .any(|c| tree[*c].segname() == "my port"));
    }

    #[test]
    fn test_render_reparses_to_same_text() {
        let tree = parse_config(schema(), CONFIG, 0).unwrap();
        let text = tree.render(RenderOptions::default());
        let again = parse_config(schema(), &text, 0).unwrap();
        assert_eq!(again.render(RenderOptions::default()), text);
        assert!(text.contains("    interface \"my port\";\n"));
        assert!(text.contains("        description \"uplink \\\"A\\\"\";\n"));
        assert!(text.contains("    metric += 5;\n"));
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let err = parse_config(schema(), "interfaces {\n  interface eth0 {\n    speed 10;\n  }\n}\n", 0).unwrap_err();
        assert!(matches!(err, ParseError::Located { line: 3, .. }));
        assert!(matches!(err.root_cause(), ParseError::NoTemplate { .. }));

        let err = parse_config(schema(), "interfaces {\n", 0).unwrap_err();
        assert!(err.to_string().contains("missing"));

        let err = parse_config(schema(), "interfaces { interface eth0 { mtu 1.5; } }", 0).unwrap_err();
        assert!(err.to_string().contains("value must be an integer"));
    }
}
