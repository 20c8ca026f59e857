//! Runtime values.
//!
//! Two interchangeable encodings sit behind one API: a tagged enum (default)
//! and a NaN-boxed `u64` (`nan-boxing` feature). Code outside this module only
//! goes through the constructors, the `as_*` accessors and [`Value::unpack`],
//! so both encodings behave identically.

use std::fmt;

use crate::object::ObjRef;

#[cfg(feature = "nan-boxing")]
mod nanbox;
#[cfg(feature = "nan-boxing")]
pub use nanbox::Value;

#[cfg(not(feature = "nan-boxing"))]
mod tagged;
#[cfg(not(feature = "nan-boxing"))]
pub use tagged::Value;

/// A decoded value, for matching.
#[derive(Debug, Clone, Copy)]
pub enum Unpacked {
    Null,
    Bool(bool),
    Number(f64),
    Obj(ObjRef),
}

impl Value {
    #[inline]
    pub fn as_bool(self) -> Option<bool> {
        match self.unpack() {
            Unpacked::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// `null` and `false` are the only falsy values.
    #[inline]
    pub fn is_falsey(self) -> bool {
        matches!(self.unpack(), Unpacked::Null | Unpacked::Bool(false))
    }

    #[inline]
    pub fn is_obj(self) -> bool {
        self.as_obj().is_some()
    }
}

/// Scalars compare by value, objects by identity. Strings are interned, so
/// identity is content equality for them.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self.unpack(), other.unpack()) {
            (Unpacked::Null, Unpacked::Null) => true,
            (Unpacked::Bool(a), Unpacked::Bool(b)) => a == b,
            (Unpacked::Number(a), Unpacked::Number(b)) => a == b,
            (Unpacked::Obj(a), Unpacked::Obj(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unpack() {
            Unpacked::Null => write!(f, "null"),
            Unpacked::Bool(b) => write!(f, "{b}"),
            Unpacked::Number(n) => write!(f, "{}", format_number(n)),
            Unpacked::Obj(r) => write!(f, "<obj #{}>", r.0),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::NULL
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::boolean(b)
    }
}

impl From<ObjRef> for Value {
    fn from(r: ObjRef) -> Self {
        Value::object(r)
    }
}

/// Formats a number the way C's `%.14g` does.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // Exponent after rounding to 14 significant digits.
    let sci = format!("{n:.13e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((&sci, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);

    if !(-4..14).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exp.abs())
    } else {
        let decimals = (13 - exp).max(0) as usize;
        trim_fraction(&format!("{n:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
