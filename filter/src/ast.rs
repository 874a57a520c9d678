//! Filter expression tree

use crate::fields::Field;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    IContains,
    StartsWith,
    EndsWith,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Contains => "contains",
            Self::IContains => "icontains",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
        }
    }

    /// Keyword operators, matched case-insensitively.
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "contains" => Some(Self::Contains),
            "icontains" => Some(Self::IContains),
            "startswith" => Some(Self::StartsWith),
            "endswith" => Some(Self::EndsWith),
            _ => None,
        }
    }
}

/// Literal operand. The source text is kept so that string fields can be
/// compared against literals that happen to look numeric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    pub text: String,
    pub num: Option<i128>,
}

impl Literal {
    /// Literal from an unquoted word: `true`/`false`, decimal or `0x` hex
    /// integers are numeric, anything else is a plain string.
    pub fn from_word(word: &str) -> Self {
        let num = match word.to_ascii_lowercase().as_str() {
            "true" => Some(1),
            "false" => Some(0),
            lower => parse_int(lower),
        };
        Self {
            text: word.to_string(),
            num,
        }
    }

    /// Quoted literals are always strings.
    pub fn quoted(text: String) -> Self {
        Self { text, num: None }
    }
}

fn parse_int(word: &str) -> Option<i128> {
    let (negative, digits) = match word.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, word),
    };
    let (radix, body) = match digits.strip_prefix("0x") {
        Some(hex) => (16, hex),
        None => (10, digits),
    };
    // from_str_radix takes its own sign, only plain digits are allowed here
    if body.is_empty() || !body.bytes().all(|b| (b as char).is_digit(radix)) {
        return None;
    }
    let value = i128::from_str_radix(body, radix).ok()?;
    if negative {
        value.checked_neg()
    } else {
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Compare {
        field: Field,
        op: CmpOp,
        value: Literal,
    },
    In {
        field: Field,
        values: Vec<Literal>,
    },
    Exists(Field),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_numbers() {
        assert_eq!(Literal::from_word("42").num, Some(42));
        assert_eq!(Literal::from_word("-7").num, Some(-7));
        assert_eq!(Literal::from_word("0x1F").num, Some(31));
        assert_eq!(Literal::from_word("TRUE").num, Some(1));
        assert_eq!(Literal::from_word("12ab").num, None);
        assert_eq!(Literal::from_word("-").num, None);
        assert_eq!(Literal::quoted("5".into()).num, None);
    }

    #[test]
    fn test_signed_hex_body_is_not_a_number() {
        assert_eq!(Literal::from_word("0x-5").num, None);
        assert_eq!(Literal::from_word("0x+5").num, None);
        assert_eq!(Literal::from_word("0x").num, None);
        assert_eq!(Literal::from_word("-0x10").num, Some(-16));
        assert_eq!(Literal::from_word("-0x-80000000000000000000000000000000").num, None);
    }

    #[test]
    fn test_out_of_range_literal_is_not_a_number() {
        // 2^127 does not fit, in either sign
        assert_eq!(Literal::from_word("0x80000000000000000000000000000000").num, None);
        assert_eq!(Literal::from_word("-0x80000000000000000000000000000000").num, None);
        assert_eq!(
            Literal::from_word("-0x7fffffffffffffffffffffffffffffff").num,
            Some(-i128::MAX)
        );
    }
}
