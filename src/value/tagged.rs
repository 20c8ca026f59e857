use super::Unpacked;
use crate::object::ObjRef;

/// Tagged-union value: the enum discriminant carries the type.
#[derive(Clone, Copy)]
pub struct Value(Unpacked);

impl Value {
    pub const NULL: Value = Value(Unpacked::Null);

    #[inline]
    pub fn null() -> Self {
        Value::NULL
    }

    #[inline]
    pub fn boolean(b: bool) -> Self {
        Value(Unpacked::Bool(b))
    }

    #[inline]
    pub fn number(n: f64) -> Self {
        Value(Unpacked::Number(n))
    }

    #[inline]
    pub fn object(r: ObjRef) -> Self {
        Value(Unpacked::Obj(r))
    }

    #[inline]
    pub fn is_number(self) -> bool {
        matches!(self.0, Unpacked::Number(_))
    }

    #[inline]
    pub fn is_null(self) -> bool {
        matches!(self.0, Unpacked::Null)
    }

    #[inline]
    pub fn as_number(self) -> Option<f64> {
        match self.0 {
            Unpacked::Number(n) => Some(n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_obj(self) -> Option<ObjRef> {
        match self.0 {
            Unpacked::Obj(r) => Some(r),
            _ => None,
        }
    }

    #[inline]
    pub fn unpack(self) -> Unpacked {
        self.0
    }
}
