//! Recognizes the C macro call shapes the decomp generates.
//!
//! Nothing here understands C. Calls are found by name with identifier
//! boundaries, arguments are split on top level commas and a leading
//! `/* label */` annotation is kept apart from the value so call shapes that
//! are annotated can be matched verbatim.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroArg<'a> {
    pub label: Option<&'a str>,
    pub value: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroCall<'a> {
    pub name: &'a str,
    /// byte offset of the macro name in the scanned text
    pub offset: usize,
    pub args: Vec<MacroArg<'a>>,
}

impl<'a> MacroCall<'a> {
    pub fn arg(&self, index: usize) -> Option<&'a str> {
        self.args.get(index).map(|arg| arg.value)
    }

    /// Checks the argument count and the annotations in front of arguments.
    ///
    /// `None` in `labels` accepts any annotation (or none) at that position.
    pub fn has_shape(&self, labels: &[Option<&str>]) -> bool {
        self.args.len() == labels.len()
            && self
                .args
                .iter()
                .zip(labels)
                .all(|(arg, expected)| match expected {
                    Some(expected) => arg.label == Some(*expected),
                    None => true,
                })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayDecl<'a> {
    pub name: &'a str,
    pub offset: usize,
    pub body: &'a str,
    pub body_offset: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn skip_ws(text: &str, mut pos: usize) -> usize {
    while let Some(c) = text[pos..].chars().next() {
        if !c.is_whitespace() {
            break;
        }
        pos += c.len_utf8();
    }
    pos
}

fn ident_at(text: &str, pos: usize) -> Option<&str> {
    let len = text[pos..]
        .char_indices()
        .find(|(_, c)| !is_ident_char(*c))
        .map(|(i, _)| i)
        .unwrap_or(text.len() - pos);
    (len != 0).then(|| &text[pos..pos + len])
}

/// occurrences of `word` that are not part of a longer identifier
fn word_positions<'a>(text: &'a str, word: &'a str) -> impl Iterator<Item = usize> + 'a {
    text.match_indices(word).filter_map(move |(pos, _)| {
        let before_ok = text[..pos]
            .chars()
            .next_back()
            .map(|c| !is_ident_char(c))
            .unwrap_or(true);
        let after_ok = text[pos + word.len()..]
            .chars()
            .next()
            .map(|c| !is_ident_char(c))
            .unwrap_or(true);
        (before_ok && after_ok).then_some(pos)
    })
}

fn preceding_word(text: &str, pos: usize) -> Option<&str> {
    let head = text[..pos].trim_end();
    let start = head
        .char_indices()
        .rev()
        .find(|(_, c)| !is_ident_char(*c))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    (start < head.len()).then(|| &head[start..])
}

/// Returns the text between the `{` at `open` and its matching `}`.
pub fn brace_body(text: &str, open: usize) -> Option<&str> {
    if !text[open..].starts_with('{') {
        return None;
    }

    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open + 1..open + i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits `inner` on commas that are not nested in any bracket or comment.
pub fn split_args(inner: &str) -> Vec<MacroArg<'_>> {
    if inner.trim().is_empty() {
        return Vec::new();
    }

    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut in_comment = false;
    let bytes = inner.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if in_comment {
            if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                in_comment = false;
                i += 1;
            }
        } else {
            match bytes[i] {
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    in_comment = true;
                    i += 1;
                }
                b'(' | b'{' | b'[' => depth += 1,
                b')' | b'}' | b']' => depth -= 1,
                b',' if depth == 0 => {
                    args.push(parse_arg(&inner[start..i]));
                    start = i + 1;
                }
                _ => {}
            }
        }
        i += 1;
    }
    args.push(parse_arg(&inner[start..]));
    args
}

fn parse_arg(raw: &str) -> MacroArg<'_> {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("/*")
        && let Some(end) = rest.find("*/")
    {
        return MacroArg {
            label: Some(rest[..end].trim()),
            value: rest[end + 2..].trim(),
        };
    }
    MacroArg {
        label: None,
        value: trimmed,
    }
}

/// finds the `)` closing the call whose `(` is at `open`
fn call_body(text: &str, open: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_comment = false;
    let mut i = open;
    while i < bytes.len() {
        if in_comment {
            if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                in_comment = false;
                i += 1;
            }
        } else {
            match bytes[i] {
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    in_comment = true;
                    i += 1;
                }
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&text[open + 1..i]);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Yields every call of the macro `name` in textual order.
pub fn find_calls<'a>(text: &'a str, name: &'a str) -> impl Iterator<Item = MacroCall<'a>> + 'a {
    word_positions(text, name).filter_map(move |offset| {
        let open = skip_ws(text, offset + name.len());
        if !text[open..].starts_with('(') {
            return None;
        }
        Some(MacroCall {
            name,
            offset,
            args: split_args(call_body(text, open)?),
        })
    })
}

/// Finds `const <type_name> <name>[] = { ... }` declarations.
///
/// With `require_static` the declaration must also be `static`.
pub fn find_array_decls<'a>(
    text: &'a str,
    type_name: &'a str,
    require_static: bool,
) -> Vec<ArrayDecl<'a>> {
    word_positions(text, type_name)
        .filter_map(|type_pos| {
            if preceding_word(text, type_pos) != Some("const") {
                return None;
            }
            if require_static {
                let const_pos = text[..type_pos].trim_end().len() - "const".len();
                if preceding_word(text, const_pos) != Some("static") {
                    return None;
                }
            }

            let name_pos = skip_ws(text, type_pos + type_name.len());
            let name = ident_at(text, name_pos)?;
            let mut pos = name_pos + name.len();
            for expected in ['[', ']', '=', '{'] {
                pos = skip_ws(text, pos);
                if !text[pos..].starts_with(expected) {
                    return None;
                }
                pos += 1;
            }
            let open = pos - 1;

            Some(ArrayDecl {
                name,
                offset: type_pos,
                body: brace_body(text, open)?,
                body_offset: open + 1,
            })
        })
        .collect()
}

/// Contents of every `{ ... }` group sitting directly in `body`.
pub fn top_level_groups(body: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut pos = 0;
    while let Some(found) = body[pos..].find('{') {
        let open = pos + found;
        match brace_body(body, open) {
            Some(inner) => {
                groups.push(inner);
                pos = open + inner.len() + 2;
            }
            None => break,
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_calls_respects_identifier_boundaries() {
        let text = "MACRO_OBJECT(a, 1)\nOBJECT(b, 2)\nOBJECT_WITH_ACTS(c, 3)\nOBJECT (d, 4)";
        let calls = find_calls(text, "OBJECT").collect::<Vec<_>>();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arg(0), Some("b"));
        assert_eq!(calls[1].arg(0), Some("d"));
        assert!(calls[0].offset < calls[1].offset);
    }

    #[test]
    fn test_labels_are_split_from_values() {
        let text = "MACRO_OBJECT(/*preset*/ macro_yellow_coin, /*yaw*/ 90, /*pos*/ 1, -2, 3),";
        let call = find_calls(text, "MACRO_OBJECT").next().unwrap();
        assert_eq!(call.args.len(), 5);
        assert_eq!(call.args[0].label, Some("preset"));
        assert_eq!(call.args[0].value, "macro_yellow_coin");
        assert_eq!(call.args[3].label, None);
        assert_eq!(call.arg(3), Some("-2"));
        assert!(call.has_shape(&[Some("preset"), Some("yaw"), Some("pos"), None, None]));
        assert!(!call.has_shape(&[Some("preset"), Some("pos"), Some("pos"), None, None]));
        assert!(!call.has_shape(&[None, None, None, None]));
    }

    #[test]
    fn test_nested_parens_and_commented_commas() {
        let text = "OBJECT(MODEL_A, (1 << 2), /* a, b */ f(x, y))";
        let call = find_calls(text, "OBJECT").next().unwrap();
        assert_eq!(call.args.len(), 3);
        assert_eq!(call.arg(1), Some("(1 << 2)"));
        assert_eq!(call.args[2].label, Some("a, b"));
        assert_eq!(call.arg(2), Some("f(x, y)"));
    }

    #[test]
    fn test_unterminated_call_is_skipped() {
        let text = "COL_TRI(1, 2, 3)\nCOL_TRI(4, 5";
        assert_eq!(find_calls(text, "COL_TRI").count(), 1);
    }

    #[test]
    fn test_brace_body_nested() {
        let text = "x = { {1, 2}, {3, {4}} } tail";
        let open = text.find('{').unwrap();
        assert_eq!(brace_body(text, open), Some(" {1, 2}, {3, {4}} "));
        assert_eq!(brace_body("{ never closed", 0), None);
        assert_eq!(brace_body("abc", 0), None);
    }

    #[test]
    fn test_find_array_decls() {
        let text = "static const Vtx bob_vtx_0[] = {\n {{{1, 2, 3}}},\n};\n\
                    const Vtx not_static[] = { {{{0}}} };\n\
                    const Gfx bob_dl_0[] = {\n gsSPEndDisplayList(),\n};\n";
        let vtx = find_array_decls(text, "Vtx", true);
        assert_eq!(vtx.len(), 1);
        assert_eq!(vtx[0].name, "bob_vtx_0");
        assert!(vtx[0].body.contains("{{{1, 2, 3}}}"));

        let all_vtx = find_array_decls(text, "Vtx", false);
        assert_eq!(all_vtx.len(), 2);

        let gfx = find_array_decls(text, "Gfx", false);
        assert_eq!(gfx.len(), 1);
        assert_eq!(gfx[0].name, "bob_dl_0");
        assert_eq!(&text[gfx[0].body_offset..gfx[0].body_offset + gfx[0].body.len()], gfx[0].body);
    }

    #[test]
    fn test_top_level_groups() {
        let groups = top_level_groups(" {a, {b}}, {c}, d ");
        assert_eq!(groups, vec!["a, {b}", "c"]);
    }
}
