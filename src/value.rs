//! The dynamically-typed value every DTS expression evaluates to.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt;

/// A database-flavoured scalar: the single value representation shared by
/// the expression evaluator, column bindings, and the `db` driver traits.
/// Every arithmetic, comparison and coercion rule goes through this type.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Int(i64),
    Numeric(Decimal),
    Str(String),
    Date(NaiveDate),
    VarBinary(Vec<u8>),
    Bool(bool),
    Null,
}

/// Alias kept distinct from [`Variant`] at the type level even though they
/// share a representation: `Value` is what the evaluator produces and
/// consumes; `Variant` is what a `db` driver speaks. Collapsing them to one
/// type (rather than inventing a second struct) is the deliberate choice
/// recorded in `SPEC_FULL.md` §3.
pub type Value = Variant;

impl Variant {
    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Int(_) => "int",
            Variant::Numeric(_) => "numeric",
            Variant::Str(_) => "string",
            Variant::Date(_) => "date",
            Variant::VarBinary(_) => "varbinary",
            Variant::Bool(_) => "bool",
            Variant::Null => "null",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(b) => Some(*b),
            Variant::Int(i) => Some(*i != 0),
            Variant::Null => None,
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Variant::Int(i) => Some(*i),
            Variant::Numeric(d) => d.to_string().parse().ok(),
            Variant::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// String conversion used by `string.concat` and `LOG`: unlike
    /// arithmetic, concatenation coerces NULL to the literal text
    /// `<null>` rather than propagating NULL, a deliberate, documented
    /// asymmetry inherited from the original interpreter.
    pub fn display_or_null_marker(&self) -> String {
        match self {
            Variant::Null => "<null>".to_string(),
            other => other.to_string(),
        }
    }

    /// Numeric addition/subtraction/etc. propagate NULL: any NULL operand
    /// makes the whole expression NULL.
    pub fn checked_arith(
        lhs: &Variant,
        rhs: &Variant,
        op: impl Fn(Decimal, Decimal) -> Option<Decimal>,
    ) -> Option<Variant> {
        if lhs.is_null() || rhs.is_null() {
            return Some(Variant::Null);
        }
        let l = lhs.to_decimal()?;
        let r = rhs.to_decimal()?;
        let result = op(l, r)?;
        Some(Variant::from_decimal_preferring_int(result, lhs, rhs))
    }

    fn to_decimal(&self) -> Option<Decimal> {
        match self {
            Variant::Int(i) => Some(Decimal::from(*i)),
            Variant::Numeric(d) => Some(*d),
            Variant::Bool(b) => Some(Decimal::from(*b as i64)),
            Variant::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn from_decimal_preferring_int(d: Decimal, lhs: &Variant, rhs: &Variant) -> Variant {
        let both_int = matches!(lhs, Variant::Int(_)) && matches!(rhs, Variant::Int(_));
        if both_int && d.fract().is_zero() {
            if let Ok(i) = d.trunc().to_string().parse::<i64>() {
                return Variant::Int(i);
            }
        }
        Variant::Numeric(d)
    }

    /// Three-valued comparison: `None` means "NULL is involved, comparison
    /// is unknown" (SQL semantics), matching how task `RULES` conditions
    /// treat `NULL`-valued columns.
    pub fn partial_compare(&self, other: &Variant) -> Option<std::cmp::Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        match (self, other) {
            (Variant::Int(a), Variant::Int(b)) => a.partial_cmp(b),
            (Variant::Numeric(a), Variant::Numeric(b)) => a.partial_cmp(b),
            (Variant::Int(a), Variant::Numeric(b)) => Decimal::from(*a).partial_cmp(b),
            (Variant::Numeric(a), Variant::Int(b)) => a.partial_cmp(&Decimal::from(*b)),
            (Variant::Str(a), Variant::Str(b)) => a.partial_cmp(b),
            (Variant::Bool(a), Variant::Bool(b)) => a.partial_cmp(b),
            (Variant::Date(a), Variant::Date(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Int(i) => write!(f, "{i}"),
            Variant::Numeric(d) => write!(f, "{d}"),
            Variant::Str(s) => write!(f, "{s}"),
            Variant::Date(d) => write!(f, "{d}"),
            Variant::VarBinary(b) => write!(f, "0x{}", hex(b)),
            Variant::Bool(b) => write!(f, "{b}"),
            Variant::Null => write!(f, ""),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int(v)
    }
}
impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::Str(v.to_string())
    }
}
impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::Str(v)
    }
}
impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_propagates_through_arithmetic() {
        let result = Variant::checked_arith(&Variant::Null, &Variant::Int(3), |a, b| Some(a + b));
        assert_eq!(result, Some(Variant::Null));
    }

    #[test]
    fn null_becomes_marker_text_in_display_concat() {
        assert_eq!(Variant::Null.display_or_null_marker(), "<null>");
        assert_eq!(Variant::Int(5).display_or_null_marker(), "5");
    }

    #[test]
    fn comparison_with_null_is_unknown() {
        assert_eq!(Variant::Null.partial_compare(&Variant::Int(1)), None);
    }

    #[test]
    fn int_plus_int_stays_int() {
        let r = Variant::checked_arith(&Variant::Int(2), &Variant::Int(3), |a, b| Some(a + b));
        assert_eq!(r, Some(Variant::Int(5)));
    }
}
