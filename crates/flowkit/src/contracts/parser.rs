//! Import and init-parameter extraction from contract sources.
//!
//! The preprocessor only needs import declarations and the contract's init
//! signature, so the default parser is a small scanner that understands
//! comments, string literals and brace depth rather than the full grammar.

use std::ops::Range;

use crate::error::PreprocessError;

/// How an import names its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import A, B from "./A.cdc"`
    Path,
    /// `import "A"`
    Name,
}

/// A string import declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub kind: ImportKind,
    /// The literal between the quotes.
    pub literal: String,
    /// Imported identifiers, empty for name imports.
    pub identifiers: Vec<String>,
    /// Byte span of the whole declaration.
    pub statement: Range<usize>,
    /// Byte span of the quoted literal, quotes included.
    pub literal_span: Range<usize>,
}

/// One parameter of the contract initializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub ty: String,
}

/// What the preprocessor needs to know about a contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub imports: Vec<Import>,
    pub init_parameters: Vec<Parameter>,
}

/// Parses contract code into a [`Program`].
pub trait ProgramParser: Send + Sync {
    fn parse(&self, code: &str, location: &str) -> Result<Program, PreprocessError>;
}

/// The default parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportScanner;

impl ProgramParser for ImportScanner {
    fn parse(&self, code: &str, location: &str) -> Result<Program, PreprocessError> {
        Scanner {
            src: code,
            bytes: code.as_bytes(),
            pos: 0,
            location,
        }
        .run()
    }
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    location: &'a str,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

impl Scanner<'_> {
    fn error(&self, reason: impl Into<String>) -> PreprocessError {
        PreprocessError::Parse {
            path: self.location.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.bytes[self.pos..].starts_with(s.as_bytes())
    }

    fn run(mut self) -> Result<Program, PreprocessError> {
        let mut program = Program::default();
        let mut depth = 0usize;
        let mut init_found = false;

        while let Some(b) = self.peek() {
            if self.starts_with("//") || self.starts_with("/*") {
                self.skip_comment()?;
            } else if b == b'"' {
                self.string()?;
            } else if b == b'{' {
                depth += 1;
                self.pos += 1;
            } else if b == b'}' {
                depth = depth.saturating_sub(1);
                self.pos += 1;
            } else if is_ident_start(b) {
                let start = self.pos;
                let ident = self.ident();
                match ident {
                    "import" if depth == 0 => {
                        if let Some(import) = self.import(start)? {
                            program.imports.push(import);
                        }
                    }
                    "init" if depth == 1 && !init_found => {
                        self.skip_trivia()?;
                        if self.peek() == Some(b'(') {
                            program.init_parameters = self.parameters()?;
                            init_found = true;
                        }
                    }
                    _ => {}
                }
            } else if b.is_ascii_digit() {
                while self.peek().is_some_and(is_ident_continue) {
                    self.pos += 1;
                }
            } else {
                self.pos += 1;
            }
        }
        Ok(program)
    }

    fn ident(&mut self) -> &str {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    fn skip_comment(&mut self) -> Result<(), PreprocessError> {
        if self.starts_with("//") {
            while self.peek().is_some_and(|b| b != b'\n') {
                self.pos += 1;
            }
            return Ok(());
        }

        // Block comments nest.
        let mut nesting = 0usize;
        loop {
            if self.starts_with("/*") {
                nesting += 1;
                self.pos += 2;
            } else if self.starts_with("*/") {
                nesting -= 1;
                self.pos += 2;
                if nesting == 0 {
                    return Ok(());
                }
            } else if self.peek().is_some() {
                self.pos += 1;
            } else {
                return Err(self.error("unterminated block comment"));
            }
        }
    }

    fn skip_trivia(&mut self) -> Result<(), PreprocessError> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'/') if self.starts_with("//") || self.starts_with("/*") => {
                    self.skip_comment()?
                }
                _ => return Ok(()),
            }
        }
    }

    /// Consume a string literal, returning its content and its quoted span.
    fn string(&mut self) -> Result<(String, Range<usize>), PreprocessError> {
        let start = self.pos;
        self.pos += 1;
        let mut content = String::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    return Ok((content, start..self.pos));
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.src[self.pos..].chars().next() {
                        Some('\n') | None => {
                            return Err(self.error("unterminated string literal"));
                        }
                        Some(escaped) => {
                            content.push(escaped);
                            self.pos += escaped.len_utf8();
                        }
                    }
                }
                Some(b'\n') | None => return Err(self.error("unterminated string literal")),
                Some(_) => {
                    let ch = self.src[self.pos..].chars().next().unwrap_or_default();
                    content.push(ch);
                    self.pos += ch.len_utf8().max(1);
                }
            }
        }
    }

    /// Parse the rest of an import declaration starting after the keyword.
    fn import(&mut self, start: usize) -> Result<Option<Import>, PreprocessError> {
        self.skip_trivia()?;

        if self.peek() == Some(b'"') {
            let (literal, literal_span) = self.string()?;
            if literal.is_empty() {
                return Err(self.error("empty import"));
            }
            let kind = if literal.bytes().all(is_ident_continue)
                && literal.bytes().next().is_some_and(is_ident_start)
            {
                ImportKind::Name
            } else {
                ImportKind::Path
            };
            return Ok(Some(Import {
                kind,
                literal,
                identifiers: Vec::new(),
                statement: start..self.pos,
                literal_span,
            }));
        }

        let mut identifiers = Vec::new();
        loop {
            if !self.peek().is_some_and(is_ident_start) {
                return Err(self.error("expected an identifier in import declaration"));
            }
            identifiers.push(self.ident().to_string());
            self.skip_trivia()?;
            if self.peek() == Some(b',') {
                self.pos += 1;
                self.skip_trivia()?;
            } else {
                break;
            }
        }

        let checkpoint = self.pos;
        if !self.peek().is_some_and(is_ident_start) || self.ident() != "from" {
            // Identifier-only import of a built-in contract.
            self.pos = checkpoint;
            return Ok(None);
        }
        self.skip_trivia()?;

        if self.peek() != Some(b'"') {
            // Already an address import.
            return Ok(None);
        }
        let (literal, literal_span) = self.string()?;
        if literal.is_empty() {
            return Err(self.error("empty import location"));
        }
        Ok(Some(Import {
            kind: ImportKind::Path,
            literal,
            identifiers,
            statement: start..self.pos,
            literal_span,
        }))
    }

    /// Parse `(label name: Type, ...)` with the cursor on the opening paren.
    fn parameters(&mut self) -> Result<Vec<Parameter>, PreprocessError> {
        let open = self.pos;
        let mut depth = 0usize;
        let mut close = None;
        while let Some(b) = self.peek() {
            match b {
                b'"' => {
                    self.string()?;
                    continue;
                }
                b'/' if self.starts_with("//") || self.starts_with("/*") => {
                    self.skip_comment()?;
                    continue;
                }
                b'(' | b'<' | b'[' | b'{' => depth += 1,
                b')' | b'>' | b']' | b'}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        close = Some(self.pos);
                        self.pos += 1;
                        break;
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        let close = close.ok_or_else(|| self.error("unterminated init parameter list"))?;

        split_top_level(&self.src[open + 1..close])
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .map(|param| {
                let (head, ty) = param
                    .split_once(':')
                    .ok_or_else(|| self.error(format!("malformed init parameter '{}'", param.trim())))?;
                let name = head
                    .split_whitespace()
                    .last()
                    .ok_or_else(|| self.error("init parameter without a name"))?;
                Ok(Parameter {
                    name: name.to_string(),
                    ty: ty.trim().to_string(),
                })
            })
            .collect()
    }
}

/// Split on commas that are not nested inside brackets.
fn split_top_level(params: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, b) in params.bytes().enumerate() {
        match b {
            b'(' | b'<' | b'[' | b'{' => depth += 1,
            b')' | b'>' | b']' | b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(&params[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&params[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(code: &str) -> Program {
        ImportScanner.parse(code, "test.cdc").unwrap()
    }

    #[test]
    fn test_path_and_name_imports() {
        let code = r#"import FungibleToken from "./FungibleToken.cdc"
import A, B from "../shared/AB.cdc"
import "NonFungibleToken"
import Crypto
import Other from 0x01

access(all) contract Token {}
"#;
        let program = parse(code);
        let literals: Vec<_> = program.imports.iter().map(|i| i.literal.as_str()).collect();
        assert_eq!(
            literals,
            vec!["./FungibleToken.cdc", "../shared/AB.cdc", "NonFungibleToken"]
        );
        assert_eq!(program.imports[1].identifiers, vec!["A", "B"]);
        assert_eq!(program.imports[2].kind, ImportKind::Name);
        assert_eq!(
            &code[program.imports[0].literal_span.clone()],
            "\"./FungibleToken.cdc\""
        );
        assert_eq!(&code[program.imports[2].statement.clone()], "import \"NonFungibleToken\"");
    }

    #[test]
    fn test_ignores_comments_and_strings() {
        let code = r#"// import X from "./X.cdc"
/* import Y from "./Y.cdc" /* nested */ still comment */
access(all) contract C {
    access(all) let s: String
    init() { self.s = "import Z from \"./Z.cdc\"" }
}
"#;
        assert!(parse(code).imports.is_empty());
    }

    #[test]
    fn test_contract_init_parameters() {
        let code = r#"access(all) contract Token {
    access(all) resource Vault {
        init(balance: UFix64) {}
    }
    init(name: String, _ supply: UFix64, owners: {Address: [String]}) {}
}
"#;
        let program = parse(code);
        assert_eq!(
            program.init_parameters,
            vec![
                Parameter { name: "name".to_string(), ty: "String".to_string() },
                Parameter { name: "supply".to_string(), ty: "UFix64".to_string() },
                Parameter { name: "owners".to_string(), ty: "{Address: [String]}".to_string() },
            ]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(ImportScanner.parse("import A from \"./A.cdc", "x.cdc").is_err());
        assert!(ImportScanner.parse("/* open", "x.cdc").is_err());
        assert!(matches!(
            ImportScanner.parse("import \"\"", "x.cdc"),
            Err(PreprocessError::Parse { path, .. }) if path == "x.cdc"
        ));
    }
}
