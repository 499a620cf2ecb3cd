//! Shared print-format specification parser.
//!
//! The same interpretation of `%…` conversions is needed in three places:
//! sema validates argument lists against it, the IR builder packs arguments
//! with it, and the runtime formatter renders with it. All three consume the
//! output of this parser over the *decoded* format text, so the accepted
//! argument list can never drift between phases.

/// One `%…` conversion in a format string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatAtom {
    pub conv: char,
    /// `%*d`: the width is consumed from the argument list.
    pub width_from_arg: bool,
    /// `%.*f`: the precision is consumed from the argument list.
    pub precision_from_arg: bool,
}

impl FormatAtom {
    /// Number of arguments this atom consumes. `%z` takes an index plus a
    /// string table pointer.
    pub fn arg_count(&self) -> usize {
        let mut count = usize::from(self.width_from_arg) + usize::from(self.precision_from_arg);
        count += if self.conv == 'z' { 2 } else { 1 };
        count
    }

    pub fn is_float(&self) -> bool {
        matches!(self.conv, 'f' | 'F' | 'e' | 'E' | 'g' | 'G')
    }
}

/// Formatting flags preceding a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatFlags {
    pub left_align: bool,
    pub plus: bool,
    pub space: bool,
    pub alt: bool,
    pub zero_pad: bool,
}

/// A fully parsed conversion, as the runtime formatter consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatSpec {
    pub atom: FormatAtom,
    pub flags: FormatFlags,
    /// Literal width, when not taken from the arguments.
    pub width: Option<usize>,
    /// Literal precision, when not taken from the arguments.
    pub precision: Option<usize>,
}

/// A format string split into literal runs and conversions.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatPiece {
    Literal(String),
    Spec(FormatSpec),
}

const CONVERSIONS: &[char] = &[
    'd', 'i', 'u', 'x', 'X', 'o', 'b', 'c', 's', 'p', 'P', 'z', 'f', 'F', 'e', 'E', 'g', 'G',
];

/// Parse decoded format text into literal and conversion pieces.
pub fn parse_format_pieces(format: &str) -> Result<Vec<FormatPiece>, String> {
    let bytes = format.as_bytes();
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            literal.push(bytes[i] as char);
            i += 1;
            continue;
        }
        if i + 1 >= bytes.len() {
            return Err("dangling '%' in print format string".to_string());
        }

        i += 1;
        if bytes[i] == b'%' {
            literal.push('%');
            i += 1;
            continue;
        }

        if !literal.is_empty() {
            pieces.push(FormatPiece::Literal(std::mem::take(&mut literal)));
        }

        let mut flags = FormatFlags::default();
        while i < bytes.len() {
            match bytes[i] {
                b'-' => flags.left_align = true,
                b'+' => flags.plus = true,
                b' ' => flags.space = true,
                b'#' => flags.alt = true,
                b'0' => flags.zero_pad = true,
                b'\'' => {}
                _ => break,
            }
            i += 1;
        }

        let mut atom = FormatAtom { conv: '\0', width_from_arg: false, precision_from_arg: false };
        let mut width = None;
        if i < bytes.len() && bytes[i] == b'*' {
            atom.width_from_arg = true;
            i += 1;
        } else {
            let mut digits = 0usize;
            let mut saw = false;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                digits = digits * 10 + (bytes[i] - b'0') as usize;
                saw = true;
                i += 1;
            }
            if saw {
                width = Some(digits);
            }
        }

        let mut precision = None;
        if i < bytes.len() && bytes[i] == b'.' {
            i += 1;
            if i < bytes.len() && bytes[i] == b'*' {
                atom.precision_from_arg = true;
                i += 1;
            } else {
                let mut digits = 0usize;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    digits = digits * 10 + (bytes[i] - b'0') as usize;
                    i += 1;
                }
                precision = Some(digits);
            }
        }

        while i < bytes.len() {
            let lm = bytes[i];
            if matches!(lm, b'h' | b'l' | b'j' | b't' | b'L' | b'q') {
                i += 1;
                if (lm == b'h' || lm == b'l') && i < bytes.len() && bytes[i] == lm {
                    i += 1;
                }
                continue;
            }
            break;
        }

        if i >= bytes.len() {
            return Err("incomplete print format conversion".to_string());
        }

        let conv = bytes[i] as char;
        i += 1;
        if !CONVERSIONS.contains(&conv) {
            return Err(format!("unsupported print conversion '%{conv}'"));
        }
        atom.conv = conv;
        pieces.push(FormatPiece::Spec(FormatSpec { atom, flags, width, precision }));
    }

    if !literal.is_empty() {
        pieces.push(FormatPiece::Literal(literal));
    }
    Ok(pieces)
}

/// Parse only the conversion atoms, the view sema and the IR builder use.
pub fn parse_format_atoms(format: &str) -> Result<Vec<FormatAtom>, String> {
    let pieces = parse_format_pieces(format)?;
    Ok(pieces
        .into_iter()
        .filter_map(|piece| match piece {
            FormatPiece::Spec(spec) => Some(spec.atom),
            FormatPiece::Literal(_) => None,
        })
        .collect())
}

/// Total argument count a format's atoms consume.
pub fn expected_arg_count(atoms: &[FormatAtom]) -> usize {
    atoms.iter().map(FormatAtom::arg_count).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_conversions() {
        let atoms = parse_format_atoms("%d %s %f\n").unwrap();
        let convs: Vec<char> = atoms.iter().map(|a| a.conv).collect();
        assert_eq!(convs, vec!['d', 's', 'f']);
        assert_eq!(expected_arg_count(&atoms), 3);
    }

    #[test]
    fn escaped_percent_is_literal() {
        let pieces = parse_format_pieces("100%% done").unwrap();
        assert_eq!(pieces, vec![FormatPiece::Literal("100% done".to_string())]);
    }

    #[test]
    fn star_width_and_precision_take_args() {
        let atoms = parse_format_atoms("%*.*f").unwrap();
        assert_eq!(atoms.len(), 1);
        assert!(atoms[0].width_from_arg);
        assert!(atoms[0].precision_from_arg);
        assert_eq!(expected_arg_count(&atoms), 3);
    }

    #[test]
    fn literal_width_and_flags_are_captured() {
        let pieces = parse_format_pieces("%-08.3f").unwrap();
        let FormatPiece::Spec(spec) = &pieces[0] else { panic!("expected spec") };
        assert!(spec.flags.left_align);
        assert!(spec.flags.zero_pad);
        assert_eq!(spec.width, Some(8));
        assert_eq!(spec.precision, Some(3));
    }

    #[test]
    fn z_conversion_takes_two_args() {
        let atoms = parse_format_atoms("%z").unwrap();
        assert_eq!(expected_arg_count(&atoms), 2);
    }

    #[test]
    fn length_modifiers_are_skipped() {
        let atoms = parse_format_atoms("%lld %hhu").unwrap();
        let convs: Vec<char> = atoms.iter().map(|a| a.conv).collect();
        assert_eq!(convs, vec!['d', 'u']);
    }

    #[test]
    fn rejects_unknown_conversion() {
        assert!(parse_format_atoms("%w!").is_err());
        assert!(parse_format_atoms("trailing %").is_err());
    }
}
