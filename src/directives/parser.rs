//! 指令解析：两阶段
//!
//! 1. `scan_candidates`：在任意文本中找出单反引号包裹、形如 `name(...)` 的片段；
//!    双反引号与 ``` 代码块整体跳过。调用体内的字符串字面量会被正确跳过，
//!    因此内容里出现反引号或括号不会截断指令。
//! 2. `parse_call`：严格的「裸名 + 括号 + 字面量参数列表」语法，只接受文本、数字、布尔值。
//!    其它一切（表达式、变量、关键字参数、属性调用）都拒绝。

use std::sync::OnceLock;

use regex::Regex;

use crate::core::DirectiveError;

/// 字面量参数
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Literal {
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Text(_) => "text",
            Literal::Int(_) => "integer",
            Literal::Float(_) => "number",
            Literal::Bool(_) => "boolean",
        }
    }
}

/// 解析通过的指令
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub args: Vec<Literal>,
}

/// 文本中的候选片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate<'a> {
    /// 调用名（可能含 `.`，如 `os.remove`）
    pub name: &'a str,
    /// 反引号内的完整文本
    pub source: &'a str,
    /// 在原文中的字节偏移
    pub offset: usize,
}

fn call_head() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_\-]*(?:\.[A-Za-z_][A-Za-z0-9_\-]*)*)\s*\(")
            .expect("static regex")
    })
}

enum CallEnd {
    /// 匹配的 `)` 位置
    Paren(usize),
    /// 字符串外先遇到了反引号
    Backtick(usize),
}

/// 从 `from`（左括号之后）开始寻找匹配的右括号，跳过字符串字面量
fn find_call_end(body: &str, from: usize) -> Option<CallEnd> {
    let bytes = body.as_bytes();
    let mut depth = 1usize;
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => {
                i = skip_string(bytes, i)?;
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(CallEnd::Paren(i));
                }
            }
            b'`' => return Some(CallEnd::Backtick(i)),
            _ => {}
        }
        i += 1;
    }
    None
}

/// 跳过从 i 开始的字符串（支持三引号），返回结束引号之后的位置
fn skip_string(bytes: &[u8], i: usize) -> Option<usize> {
    let q = bytes[i];
    let triple = bytes.len() >= i + 3 && bytes[i + 1] == q && bytes[i + 2] == q;
    let mut j = if triple { i + 3 } else { i + 1 };
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            c if c == q => {
                if !triple {
                    return Some(j + 1);
                }
                if bytes.len() >= j + 3 && bytes[j + 1] == q && bytes[j + 2] == q {
                    return Some(j + 3);
                }
                j += 1;
            }
            b'\n' if !triple => return None,
            _ => j += 1,
        }
    }
    None
}

/// 扫描文本中的候选指令片段
pub fn scan_candidates(text: &str) -> Vec<Candidate<'_>> {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut out = Vec::new();
    let mut i = 0;

    while i < len {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let run = bytes[i..].iter().take_while(|b| **b == b'`').count();
        if run >= 2 {
            // 多反引号代码片段/代码块：跳到同长度的闭合处
            let fence = &text[i..i + run];
            i = text[i + run..]
                .find(fence)
                .map(|j| i + run + j + run)
                .unwrap_or(len);
            continue;
        }

        let start = i + 1;
        let rest = &text[start..];
        if let Some(caps) = call_head().captures(rest) {
            let head = caps.get(0).map(|m| m.end()).unwrap_or(0);
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let close = match find_call_end(rest, head) {
                Some(CallEnd::Paren(p)) => rest[p + 1..].find('`').map(|j| p + 1 + j),
                Some(CallEnd::Backtick(b)) => Some(b),
                // 字符串未闭合：截到下一个反引号（或文末），交给 parse_call 报 Malformed
                None => Some(rest.find('`').unwrap_or(rest.len())),
            };
            if let Some(end) = close {
                out.push(Candidate {
                    name,
                    source: &rest[..end],
                    offset: start,
                });
                i = start + end + 1;
                continue;
            }
        }
        // 普通行内代码：跳过到闭合反引号
        match rest.find('`') {
            Some(j) => i = start + j + 1,
            None => break,
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    Open,
    Close,
    Comma,
    Dot,
    Eq,
    Minus,
    Plus,
    Other,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    start: usize,
    end: usize,
}

fn lex_string(src: &str, start: usize, raw: bool) -> Result<(String, usize), DirectiveError> {
    let bytes = src.as_bytes();
    let end = skip_string(bytes, start)
        .ok_or_else(|| DirectiveError::Malformed(format!("unterminated string in {}", src)))?;
    let q = bytes[start];
    let triple = end - start >= 6 && bytes[start + 1] == q && bytes[start + 2] == q;
    let quote_len = if triple { 3 } else { 1 };
    let inner = &src[start + quote_len..end - quote_len];
    if raw {
        return Ok((inner.to_string(), end));
    }
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Ok((out, end))
}

fn lex_number(src: &str, start: usize) -> Result<(Tok, usize), DirectiveError> {
    let bytes = src.as_bytes();
    let mut j = start;
    let mut is_float = false;
    while j < bytes.len() {
        match bytes[j] {
            b'0'..=b'9' | b'_' => j += 1,
            b'.' if !is_float => {
                is_float = true;
                j += 1;
            }
            b'e' | b'E' => {
                is_float = true;
                j += 1;
                if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                    j += 1;
                }
            }
            _ => break,
        }
    }
    let text: String = src[start..j].chars().filter(|c| *c != '_').collect();
    let tok = if is_float {
        Tok::Float(
            text.parse()
                .map_err(|_| DirectiveError::Malformed(format!("bad number '{}'", text)))?,
        )
    } else {
        Tok::Int(
            text.parse()
                .map_err(|_| DirectiveError::Malformed(format!("bad integer '{}'", text)))?,
        )
    };
    Ok((tok, j))
}

fn tokenize(src: &str) -> Result<Vec<Token>, DirectiveError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        let tok = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'\'' | b'"' => {
                let (s, end) = lex_string(src, i, false)?;
                i = end;
                Tok::Str(s)
            }
            b'r' | b'R' if i + 1 < bytes.len() && (bytes[i + 1] == b'\'' || bytes[i + 1] == b'"') => {
                let (s, end) = lex_string(src, i + 1, true)?;
                i = end;
                Tok::Str(s)
            }
            b'0'..=b'9' => {
                let (t, end) = lex_number(src, i)?;
                i = end;
                t
            }
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => {
                let mut j = i + 1;
                while j < bytes.len()
                    && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_' || bytes[j] == b'-')
                {
                    j += 1;
                }
                i = j;
                Tok::Ident(src[start..j].to_string())
            }
            _ => {
                i += src[i..].chars().next().map(char::len_utf8).unwrap_or(1);
                match c {
                    b'(' => Tok::LParen,
                    b')' => Tok::RParen,
                    b'[' | b'{' => Tok::Open,
                    b']' | b'}' => Tok::Close,
                    b',' => Tok::Comma,
                    b'.' => Tok::Dot,
                    b'=' => Tok::Eq,
                    b'-' => Tok::Minus,
                    b'+' => Tok::Plus,
                    _ => Tok::Other,
                }
            }
        };
        tokens.push(Token { tok, start, end: i });
    }
    Ok(tokens)
}

fn literal_from(tokens: &[Token], index: usize, src: &str) -> Result<Literal, DirectiveError> {
    let source_text = || match (tokens.first(), tokens.last()) {
        (Some(a), Some(b)) => src[a.start..b.end].to_string(),
        _ => String::new(),
    };
    let kinds: Vec<&Tok> = tokens.iter().map(|t| &t.tok).collect();
    match kinds.as_slice() {
        [Tok::Int(n)] | [Tok::Plus, Tok::Int(n)] => Ok(Literal::Int(*n)),
        [Tok::Minus, Tok::Int(n)] => Ok(Literal::Int(-*n)),
        [Tok::Float(f)] | [Tok::Plus, Tok::Float(f)] => Ok(Literal::Float(*f)),
        [Tok::Minus, Tok::Float(f)] => Ok(Literal::Float(-*f)),
        [Tok::Ident(id)] if id == "true" || id == "True" => Ok(Literal::Bool(true)),
        [Tok::Ident(id)] if id == "false" || id == "False" => Ok(Literal::Bool(false)),
        [Tok::Ident(_), Tok::Eq, ..] => Err(DirectiveError::KeywordArgument(source_text())),
        parts if !parts.is_empty() && parts.iter().all(|t| matches!(t, Tok::Str(_))) => {
            // 相邻字符串字面量隐式拼接
            let mut s = String::new();
            for t in parts {
                if let Tok::Str(piece) = t {
                    s.push_str(piece);
                }
            }
            Ok(Literal::Text(s))
        }
        _ => Err(DirectiveError::NonLiteralArgument {
            index,
            source_text: source_text(),
        }),
    }
}

/// 严格解析一个调用表达式
pub fn parse_call(source: &str) -> Result<Directive, DirectiveError> {
    let tokens = tokenize(source)?;
    let name = match tokens.first().map(|t| &t.tok) {
        Some(Tok::Ident(n)) => n.clone(),
        _ => return Err(DirectiveError::NotACall(source.to_string())),
    };
    match tokens.get(1).map(|t| &t.tok) {
        Some(Tok::LParen) => {}
        Some(Tok::Dot) => return Err(DirectiveError::CalleeNotBareName(source.to_string())),
        _ => return Err(DirectiveError::NotACall(source.to_string())),
    }

    let mut args: Vec<&[Token]> = Vec::new();
    let mut depth = 0usize;
    let mut arg_start = 2;
    let mut close = None;
    for (i, t) in tokens.iter().enumerate().skip(2) {
        match t.tok {
            Tok::LParen | Tok::Open => depth += 1,
            Tok::Close => depth = depth.saturating_sub(1),
            Tok::RParen if depth > 0 => depth -= 1,
            Tok::RParen => {
                args.push(&tokens[arg_start..i]);
                close = Some(i);
                break;
            }
            Tok::Comma if depth == 0 => {
                args.push(&tokens[arg_start..i]);
                arg_start = i + 1;
            }
            _ => {}
        }
    }
    let close = close.ok_or_else(|| DirectiveError::Malformed(format!("unbalanced parentheses in {}", source)))?;
    if close + 1 != tokens.len() {
        return Err(DirectiveError::NotACall(source.to_string()));
    }

    // 允许空参数列表与末尾逗号，中间的空参数视为结构错误
    if args.last().map(|a| a.is_empty()).unwrap_or(false) {
        args.pop();
    }
    let mut values = Vec::with_capacity(args.len());
    for (index, arg) in args.iter().enumerate() {
        if arg.is_empty() {
            return Err(DirectiveError::Malformed(format!("empty argument {} in {}", index, source)));
        }
        values.push(literal_from(arg, index, source)?);
    }
    Ok(Directive { name, args: values })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_finds_calls_and_skips_plain_code() {
        let text = "Use `x + 1` then `write(\"a.txt\", \"hi\")` and `list_directory()`.";
        let found = scan_candidates(text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "write");
        assert_eq!(found[0].source, "write(\"a.txt\", \"hi\")");
        assert_eq!(found[1].name, "list_directory");
    }

    #[test]
    fn test_scan_respects_backticks_inside_strings() {
        let text = "`write(\"README.md\", \"run `cargo test` (twice)\")` done";
        let found = scan_candidates(text);
        assert_eq!(found.len(), 1);
        let d = parse_call(found[0].source).unwrap();
        assert_eq!(d.args[1], Literal::Text("run `cargo test` (twice)".into()));
    }

    #[test]
    fn test_scan_skips_fenced_blocks() {
        let text = "```python\nprint(`write(1)`)\n```\n`delete(\"x\")`";
        let found = scan_candidates(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "delete");
    }

    #[test]
    fn test_scan_keeps_unterminated_call_as_candidate() {
        let text = "`write(\"notes.txt, oops)` then `delete(\"x\")`";
        let found = scan_candidates(text);
        let names: Vec<&str> = found.iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["write", "delete"]);
        assert_eq!(found[0].source, "write(\"notes.txt, oops)");
        assert!(matches!(parse_call(found[0].source), Err(DirectiveError::Malformed(_))));
        assert!(parse_call(found[1].source).is_ok());

        let tail = scan_candidates("broken `create(\"a.txt\", \"x");
        assert_eq!(tail.len(), 1);
        assert!(parse_call(tail[0].source).is_err());
    }

    #[test]
    fn test_scan_multiline_triple_quoted() {
        let text = "`create(\"m.py\", \"\"\"def f():\n    return 1\n\"\"\")`";
        let found = scan_candidates(text);
        assert_eq!(found.len(), 1);
        let d = parse_call(found[0].source).unwrap();
        assert_eq!(d.args[1], Literal::Text("def f():\n    return 1\n".into()));
    }

    #[test]
    fn test_parse_literals() {
        let d = parse_call("edit_lines('f.txt', 3, -2, \"a\\nb\", True, 1.5,)").unwrap();
        assert_eq!(d.name, "edit_lines");
        assert_eq!(
            d.args,
            vec![
                Literal::Text("f.txt".into()),
                Literal::Int(3),
                Literal::Int(-2),
                Literal::Text("a\nb".into()),
                Literal::Bool(true),
                Literal::Float(1.5),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_non_literals() {
        assert!(matches!(
            parse_call("write(path, \"x\")"),
            Err(DirectiveError::NonLiteralArgument { index: 0, .. })
        ));
        assert!(matches!(
            parse_call("write(\"a\", 1 + 2)"),
            Err(DirectiveError::NonLiteralArgument { index: 1, .. })
        ));
        assert!(matches!(
            parse_call("list_directory(\"a\", recursive=True)"),
            Err(DirectiveError::KeywordArgument(_))
        ));
        assert!(matches!(
            parse_call("write(\"a\", [1, 2])"),
            Err(DirectiveError::NonLiteralArgument { .. })
        ));
    }

    #[test]
    fn test_parse_structural_errors() {
        assert!(matches!(parse_call("os.remove(\"x\")"), Err(DirectiveError::CalleeNotBareName(_))));
        assert!(matches!(parse_call("write(\"a\")(\"b\")"), Err(DirectiveError::NotACall(_))));
        assert!(matches!(parse_call("write(\"a\""), Err(DirectiveError::Malformed(_))));
        assert!(matches!(parse_call("write(\"a, 1)"), Err(DirectiveError::Malformed(_))));
        assert!(matches!(parse_call("write(1,,2)"), Err(DirectiveError::Malformed(_))));
    }

    #[test]
    fn test_parse_empty_args_and_raw_strings() {
        assert!(parse_call("list_directory()").unwrap().args.is_empty());
        let d = parse_call(r#"write("a", r"C:\temp\n")"#).unwrap();
        assert_eq!(d.args[1], Literal::Text(r"C:\temp\n".into()));
    }
}
