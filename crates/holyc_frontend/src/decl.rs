//! Declaration-text utilities shared by sema, lowering, and the REPL.
//!
//! Declaration payloads travel through the AST as space-joined token text
//! (`"static I64 * count"`). These helpers split that text into modifier,
//! type, and name parts.

use crate::ast::{NodeKind, TypedNode};

/// Symbol linkage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    External,
    Internal,
}

const COMPAT_MODIFIERS: &[&str] = &[
    "public", "interrupt", "noreg", "reg", "no_warn", "static", "extern", "import", "_extern",
    "_import", "export", "_export",
];

const PERMISSIVE_ONLY_MODIFIERS: &[&str] =
    &["public", "interrupt", "noreg", "reg", "no_warn", "_extern", "_import", "_export"];

fn is_identifier_token(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split declaration text into `(type_text, name)`. Handles trailing
/// declarators with array suffixes and the function-pointer form `(*name)(…)`.
pub fn split_typed_name(text: &str) -> (String, String) {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return (String::new(), String::new());
    }

    for i in 0..tokens.len().saturating_sub(3) {
        if tokens[i] == "("
            && (tokens[i + 1] == "*" || tokens[i + 1] == "&")
            && is_identifier_token(tokens[i + 2])
            && tokens[i + 3] == ")"
        {
            return (tokens[..i].join(" "), tokens[i + 2].to_string());
        }
    }

    // Skip trailing `[ … ]` groups so `I64 arr [ 4 ]` names `arr`.
    let mut j = tokens.len();
    loop {
        if j >= 1 && tokens[j - 1] == "]" {
            let mut depth = 0i32;
            let mut k = j;
            let mut matched = false;
            while k > 0 {
                k -= 1;
                if tokens[k] == "]" {
                    depth += 1;
                } else if tokens[k] == "[" {
                    depth -= 1;
                    if depth == 0 {
                        matched = true;
                        break;
                    }
                }
            }
            if matched {
                j = k;
                continue;
            }
        }
        break;
    }
    if j >= 1 && is_identifier_token(tokens[j - 1]) {
        return (tokens[..j - 1].join(" "), tokens[j - 1].to_string());
    }

    for idx in (0..tokens.len()).rev() {
        if is_identifier_token(tokens[idx]) {
            return (tokens[..idx].join(" "), tokens[idx].to_string());
        }
    }
    (String::new(), String::new())
}

/// Resolve a node's declared type text and name, preferring the parser's
/// `DeclType`/`DeclName` children over re-splitting the raw text.
pub fn typed_name_from_node(node: &TypedNode) -> (String, String) {
    let mut decl_type = String::new();
    let mut decl_name = String::new();
    for child in &node.children {
        match child.kind {
            NodeKind::DeclType => decl_type = child.text.clone(),
            NodeKind::DeclName => decl_name = child.text.clone(),
            _ => {}
        }
    }
    if !decl_name.is_empty() {
        return (decl_type, decl_name);
    }
    split_typed_name(&node.text)
}

/// The first child that is neither `DeclType` nor `DeclName`: the
/// initializer expression of a `VarDecl`, if any.
pub fn var_initializer(node: &TypedNode) -> Option<&TypedNode> {
    node.children
        .iter()
        .find(|c| c.kind != NodeKind::DeclType && c.kind != NodeKind::DeclName)
}

pub fn has_decl_modifier(decl_text: &str, modifier: &str) -> bool {
    decl_text.split_whitespace().any(|token| token == modifier)
}

/// Remove all storage/linkage/compatibility modifiers, leaving the type.
pub fn strip_decl_modifiers(decl_text: &str) -> String {
    decl_text
        .split_whitespace()
        .filter(|token| !COMPAT_MODIFIERS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_permissive_only_modifier(token: &str) -> bool {
    PERMISSIVE_ONLY_MODIFIERS.contains(&token)
}

/// `static` functions and globals get internal linkage.
pub fn function_linkage(decl_text: &str) -> Linkage {
    if has_decl_modifier(decl_text, "static") {
        Linkage::Internal
    } else {
        Linkage::External
    }
}

pub fn is_import_linkage(decl_text: &str) -> bool {
    has_decl_modifier(decl_text, "import") || has_decl_modifier(decl_text, "_import")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_declarator() {
        assert_eq!(split_typed_name("I64 count"), ("I64".into(), "count".into()));
    }

    #[test]
    fn pointer_and_array_declarators() {
        assert_eq!(split_typed_name("U8 * name"), ("U8 *".into(), "name".into()));
        assert_eq!(split_typed_name("I64 arr [ 4 ]"), ("I64".into(), "arr".into()));
    }

    #[test]
    fn function_pointer_declarator() {
        assert_eq!(
            split_typed_name("I64 ( * fp ) ( I64 )"),
            ("I64".into(), "fp".into())
        );
    }

    #[test]
    fn strips_modifiers() {
        assert_eq!(strip_decl_modifiers("static public I64 *"), "I64 *");
        assert!(has_decl_modifier("static I64", "static"));
        assert_eq!(function_linkage("static I64"), Linkage::Internal);
        assert_eq!(function_linkage("I64"), Linkage::External);
    }
}
