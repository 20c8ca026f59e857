// ── NaN-boxed value ──────────────────────────────────────────────────
//
// A quiet NaN leaves 51 payload bits unused. Null and the booleans live in
// the low bits of the plain quiet-NaN pattern; object handles set the sign
// bit and store the heap index in the low 32 bits.

use super::Unpacked;
use crate::object::ObjRef;

const QNAN: u64 = 0x7FFC_0000_0000_0000;
const SIGN_BIT: u64 = 0x8000_0000_0000_0000;
const TAG_NULL: u64 = QNAN | 1;
const TAG_FALSE: u64 = QNAN | 2;
const TAG_TRUE: u64 = QNAN | 3;
const TAG_OBJ: u64 = SIGN_BIT | QNAN;
const CANONICAL_NAN: u64 = 0x7FF8_0000_0000_0000;
const INDEX_MASK: u64 = 0xFFFF_FFFF;

#[derive(Clone, Copy)]
pub struct Value(u64);

impl Value {
    pub const NULL: Value = Value(TAG_NULL);

    #[inline]
    pub fn null() -> Self {
        Value::NULL
    }

    #[inline]
    pub fn boolean(b: bool) -> Self {
        Value(if b { TAG_TRUE } else { TAG_FALSE })
    }

    #[inline]
    pub fn number(n: f64) -> Self {
        if n.is_nan() {
            // keep every NaN outside the tag space
            Value(CANONICAL_NAN)
        } else {
            Value(n.to_bits())
        }
    }

    #[inline]
    pub fn object(r: ObjRef) -> Self {
        Value(TAG_OBJ | u64::from(r.0))
    }

    #[inline]
    pub fn is_number(self) -> bool {
        (self.0 & QNAN) != QNAN
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == TAG_NULL
    }

    #[inline]
    pub fn as_number(self) -> Option<f64> {
        if self.is_number() { Some(f64::from_bits(self.0)) } else { None }
    }

    #[inline]
    pub fn as_obj(self) -> Option<ObjRef> {
        if (self.0 & TAG_OBJ) == TAG_OBJ {
            Some(ObjRef((self.0 & INDEX_MASK) as u32))
        } else {
            None
        }
    }

    #[inline]
    pub fn unpack(self) -> Unpacked {
        if self.is_number() {
            return Unpacked::Number(f64::from_bits(self.0));
        }
        match self.0 {
            TAG_NULL => Unpacked::Null,
            TAG_FALSE => Unpacked::Bool(false),
            TAG_TRUE => Unpacked::Bool(true),
            bits => Unpacked::Obj(ObjRef((bits & INDEX_MASK) as u32)),
        }
    }
}
