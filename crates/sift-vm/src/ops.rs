//! Opcode enumeration and static metadata.
//!
//! Each opcode is one tag in a stable enumeration; additions only
//! append. A parallel constant table ([`Opcode::info`]) gives every
//! opcode's display text, operand layout (outputs, then inputs, then
//! trailing variadic items), and scratch-byte requirement. The operand
//! layout determines the instruction width; the dispatcher checks the
//! scratch requirement before invoking the handler.

use crate::reg::LANE_COUNT;

/// Scratch bytes reserved per batch by string opcodes with unbounded
/// output.
pub const PAGE_SIZE: usize = 1 << 16;

/// Operand kinds appearing in an instruction's layout.
///
/// Slot kinds (`K`/`S`/`V`/`B`/`H`/`L`) encode a 16-bit register slot;
/// the rest are inline immediates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    /// Mask register slot.
    K,
    /// Scalar or string-slice register slot.
    S,
    /// Value reference register slot.
    V,
    /// Base (struct body span) register slot.
    B,
    /// Hash register slot.
    H,
    /// Bucket register slot.
    L,
    /// Aggregation slot byte offset (u32).
    Agg,
    /// Dictionary entry index (u16).
    Dict,
    /// Auxiliary column index (u16).
    Aux,
    /// Pre-built hash table index (u16).
    HashSet,
    /// Symbol id, varuint-encoded in a 4-byte field.
    Sym,
    /// Literal reference: offset u32, length u32, TLV byte, header length.
    Lit,
    /// Inline u16 immediate.
    ImmU16,
    /// Inline i64 immediate.
    ImmI64,
    /// Inline f64 immediate.
    ImmF64,
    /// Inline u64 immediate.
    ImmU64,
}

impl Arg {
    /// Encoded width in the instruction stream.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Arg::K | Arg::S | Arg::V | Arg::B | Arg::H | Arg::L => 2,
            Arg::Dict | Arg::Aux | Arg::HashSet | Arg::ImmU16 => 2,
            Arg::Agg | Arg::Sym => 4,
            Arg::Lit => 10,
            Arg::ImmI64 | Arg::ImmF64 | Arg::ImmU64 => 8,
        }
    }
}

/// Scratch requirement declared by an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scratch {
    None,
    /// Fixed number of bytes per batch.
    Fixed(usize),
    /// One page; used by opcodes with unbounded per-lane output.
    Page,
}

impl Scratch {
    /// Bytes the dispatcher must see available before the handler runs.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Scratch::None => 0,
            Scratch::Fixed(n) => n,
            Scratch::Page => PAGE_SIZE,
        }
    }
}

/// Static description of one opcode.
#[derive(Debug)]
pub struct OpInfo {
    pub text: &'static str,
    pub out: &'static [Arg],
    pub input: &'static [Arg],
    /// Layout of one variadic item; empty for fixed-arity opcodes.
    /// Variadic instructions encode a u16 item count after the fixed
    /// operands, then `count` items.
    pub va: &'static [Arg],
    pub scratch: Scratch,
}

impl OpInfo {
    /// Width of the fixed operand section (excluding the 2-byte opcode
    /// and any variadic tail).
    #[must_use]
    pub fn fixed_width(&self) -> usize {
        let args = self.out.iter().chain(self.input.iter());
        let mut width: usize = args.map(|a| a.width()).sum();
        if !self.va.is_empty() {
            width += 2; // item count
        }
        width
    }

    /// Width of one variadic item.
    #[must_use]
    pub fn va_width(&self) -> usize {
        self.va.iter().map(|a| a.width()).sum()
    }
}

const NONE: Scratch = Scratch::None;
const PAGE: Scratch = Scratch::Page;
const BOX9: Scratch = Scratch::Fixed(9 * LANE_COUNT);
const BOX16: Scratch = Scratch::Fixed(16 * LANE_COUNT);
const BOX32: Scratch = Scratch::Fixed(32 * LANE_COUNT);
const FMT20: Scratch = Scratch::Fixed(20 * LANE_COUNT);

macro_rules! opcodes {
    ($( $name:ident : $text:literal, out[$($o:ident)*], in[$($i:ident)*], va[$($v:ident)*], $scratch:expr; )*) => {
        /// The opcode enumeration. Tags are assigned in declaration
        /// order and are stable; additions only append.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum Opcode {
            $($name,)*
        }

        impl Opcode {
            const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            /// Number of defined opcodes.
            #[must_use]
            pub fn count() -> usize {
                Self::ALL.len()
            }

            /// Decode an opcode tag.
            #[must_use]
            pub fn from_u16(tag: u16) -> Option<Self> {
                Self::ALL.get(tag as usize).copied()
            }

            /// Static metadata for this opcode.
            #[must_use]
            pub fn info(self) -> &'static OpInfo {
                match self {
                    $(Opcode::$name => &OpInfo {
                        text: $text,
                        out: &[$(Arg::$o,)*],
                        input: &[$(Arg::$i,)*],
                        va: &[$(Arg::$v,)*],
                        scratch: $scratch,
                    },)*
                }
            }
        }
    };
}

opcodes! {
    // === control ===
    Init: "init", out[B K], in[], va[], NONE;
    Trap: "trap", out[], in[], va[], NONE;
    Ret: "ret", out[], in[], va[], NONE;
    RetK: "ret.k", out[], in[K], va[], NONE;
    RetBK: "ret.b.k", out[], in[B K], va[], NONE;
    RetSK: "ret.s.k", out[], in[S K], va[], NONE;
    RetBHK: "ret.b.h.k", out[], in[B H K], va[], NONE;

    // === mask algebra ===
    Broadcast0K: "broadcast0.k", out[K], in[], va[], NONE;
    Broadcast1K: "broadcast1.k", out[K], in[], va[], NONE;
    FalseK: "false.k", out[V K], in[], va[], NONE;
    NotK: "not.k", out[K], in[K], va[], NONE;
    AndK: "and.k", out[K], in[K K], va[], NONE;
    AndnK: "andn.k", out[K], in[K K], va[], NONE;
    OrK: "or.k", out[K], in[K K], va[], NONE;
    XorK: "xor.k", out[K], in[K K], va[], NONE;
    XnorK: "xnor.k", out[K], in[K K], va[], NONE;
    MovK: "mov.k", out[K], in[K], va[], NONE;

    // === register moves ===
    ZeroV: "zero.v", out[V], in[], va[], NONE;
    MovV: "mov.v", out[V], in[V K], va[], NONE;
    MovVK: "mov.v.k", out[V K], in[V K], va[], NONE;
    MovF64: "mov.f64", out[S], in[S K], va[], NONE;
    MovI64: "mov.i64", out[S], in[S K], va[], NONE;
    BlendV: "blend.v", out[V K], in[V K V K], va[], NONE;
    BlendF64: "blend.f64", out[S K], in[S K S K], va[], NONE;
    BroadcastI64: "broadcast.i64", out[S], in[ImmI64], va[], NONE;
    BroadcastF64: "broadcast.f64", out[S], in[ImmF64], va[], NONE;

    // === integer arithmetic ===
    AbsI64: "abs.i64", out[S K], in[S K], va[], NONE;
    NegI64: "neg.i64", out[S K], in[S K], va[], NONE;
    SignI64: "sign.i64", out[S K], in[S K], va[], NONE;
    SquareI64: "square.i64", out[S K], in[S K], va[], NONE;
    BitNotI64: "bitnot.i64", out[S], in[S K], va[], NONE;
    BitCountI64: "bitcount.i64", out[S], in[S K], va[], NONE;
    AddI64: "add.i64", out[S K], in[S S K], va[], NONE;
    AddI64Imm: "add.i64@imm", out[S K], in[S ImmI64 K], va[], NONE;
    SubI64: "sub.i64", out[S K], in[S S K], va[], NONE;
    SubI64Imm: "sub.i64@imm", out[S K], in[S ImmI64 K], va[], NONE;
    RsubI64Imm: "rsub.i64@imm", out[S K], in[S ImmI64 K], va[], NONE;
    MulI64: "mul.i64", out[S K], in[S S K], va[], NONE;
    MulI64Imm: "mul.i64@imm", out[S K], in[S ImmI64 K], va[], NONE;
    DivI64: "div.i64", out[S K], in[S S K], va[], NONE;
    DivI64Imm: "div.i64@imm", out[S K], in[S ImmI64 K], va[], NONE;
    RdivI64Imm: "rdiv.i64@imm", out[S K], in[S ImmI64 K], va[], NONE;
    ModI64: "mod.i64", out[S K], in[S S K], va[], NONE;
    ModI64Imm: "mod.i64@imm", out[S K], in[S ImmI64 K], va[], NONE;
    RmodI64Imm: "rmod.i64@imm", out[S K], in[S ImmI64 K], va[], NONE;
    AddMulI64Imm: "addmul.i64@imm", out[S K], in[S S ImmI64 K], va[], NONE;
    MinValueI64: "minvalue.i64", out[S], in[S S K], va[], NONE;
    MinValueI64Imm: "minvalue.i64@imm", out[S], in[S ImmI64 K], va[], NONE;
    MaxValueI64: "maxvalue.i64", out[S], in[S S K], va[], NONE;
    MaxValueI64Imm: "maxvalue.i64@imm", out[S], in[S ImmI64 K], va[], NONE;
    AndI64: "and.i64", out[S], in[S S K], va[], NONE;
    AndI64Imm: "and.i64@imm", out[S], in[S ImmI64 K], va[], NONE;
    OrI64: "or.i64", out[S], in[S S K], va[], NONE;
    OrI64Imm: "or.i64@imm", out[S], in[S ImmI64 K], va[], NONE;
    XorI64: "xor.i64", out[S], in[S S K], va[], NONE;
    XorI64Imm: "xor.i64@imm", out[S], in[S ImmI64 K], va[], NONE;
    SllI64: "sll.i64", out[S], in[S S K], va[], NONE;
    SllI64Imm: "sll.i64@imm", out[S], in[S ImmI64 K], va[], NONE;
    SraI64: "sra.i64", out[S], in[S S K], va[], NONE;
    SraI64Imm: "sra.i64@imm", out[S], in[S ImmI64 K], va[], NONE;
    SrlI64: "srl.i64", out[S], in[S S K], va[], NONE;
    SrlI64Imm: "srl.i64@imm", out[S], in[S ImmI64 K], va[], NONE;

    // === float arithmetic ===
    AbsF64: "abs.f64", out[S K], in[S K], va[], NONE;
    NegF64: "neg.f64", out[S K], in[S K], va[], NONE;
    SignF64: "sign.f64", out[S K], in[S K], va[], NONE;
    SquareF64: "square.f64", out[S], in[S K], va[], NONE;
    RoundF64: "round.f64", out[S], in[S K], va[], NONE;
    RoundEvenF64: "roundeven.f64", out[S], in[S K], va[], NONE;
    TruncF64: "trunc.f64", out[S], in[S K], va[], NONE;
    FloorF64: "floor.f64", out[S], in[S K], va[], NONE;
    CeilF64: "ceil.f64", out[S], in[S K], va[], NONE;
    AddF64: "add.f64", out[S K], in[S S K], va[], NONE;
    AddF64Imm: "add.f64@imm", out[S K], in[S ImmF64 K], va[], NONE;
    SubF64: "sub.f64", out[S K], in[S S K], va[], NONE;
    SubF64Imm: "sub.f64@imm", out[S K], in[S ImmF64 K], va[], NONE;
    RsubF64Imm: "rsub.f64@imm", out[S K], in[S ImmF64 K], va[], NONE;
    MulF64: "mul.f64", out[S K], in[S S K], va[], NONE;
    MulF64Imm: "mul.f64@imm", out[S K], in[S ImmF64 K], va[], NONE;
    DivF64: "div.f64", out[S K], in[S S K], va[], NONE;
    DivF64Imm: "div.f64@imm", out[S K], in[S ImmF64 K], va[], NONE;
    RdivF64Imm: "rdiv.f64@imm", out[S K], in[S ImmF64 K], va[], NONE;
    ModF64: "mod.f64", out[S K], in[S S K], va[], NONE;
    ModF64Imm: "mod.f64@imm", out[S K], in[S ImmF64 K], va[], NONE;
    RmodF64Imm: "rmod.f64@imm", out[S K], in[S ImmF64 K], va[], NONE;
    MinValueF64: "minvalue.f64", out[S], in[S S K], va[], NONE;
    MinValueF64Imm: "minvalue.f64@imm", out[S], in[S ImmF64 K], va[], NONE;
    MaxValueF64: "maxvalue.f64", out[S], in[S S K], va[], NONE;
    MaxValueF64Imm: "maxvalue.f64@imm", out[S], in[S ImmF64 K], va[], NONE;
    SqrtF64: "sqrt.f64", out[S K], in[S K], va[], NONE;
    CbrtF64: "cbrt.f64", out[S K], in[S K], va[], NONE;
    ExpF64: "exp.f64", out[S K], in[S K], va[], NONE;
    Exp2F64: "exp2.f64", out[S K], in[S K], va[], NONE;
    Exp10F64: "exp10.f64", out[S K], in[S K], va[], NONE;
    Expm1F64: "expm1.f64", out[S K], in[S K], va[], NONE;
    LnF64: "ln.f64", out[S K], in[S K], va[], NONE;
    Ln1pF64: "ln1p.f64", out[S K], in[S K], va[], NONE;
    Log2F64: "log2.f64", out[S K], in[S K], va[], NONE;
    Log10F64: "log10.f64", out[S K], in[S K], va[], NONE;
    SinF64: "sin.f64", out[S K], in[S K], va[], NONE;
    CosF64: "cos.f64", out[S K], in[S K], va[], NONE;
    TanF64: "tan.f64", out[S K], in[S K], va[], NONE;
    AsinF64: "asin.f64", out[S K], in[S K], va[], NONE;
    AcosF64: "acos.f64", out[S K], in[S K], va[], NONE;
    AtanF64: "atan.f64", out[S K], in[S K], va[], NONE;
    Atan2F64: "atan2.f64", out[S K], in[S S K], va[], NONE;
    HypotF64: "hypot.f64", out[S K], in[S S K], va[], NONE;
    PowF64: "pow.f64", out[S K], in[S S K], va[], NONE;
    PowUintF64: "powuint.f64", out[S], in[S ImmI64 K], va[], NONE;

    // === conversions ===
    CvtKToI64: "cvt.ktoi64", out[S], in[K], va[], NONE;
    CvtKToF64: "cvt.ktof64", out[S], in[K], va[], NONE;
    CvtI64ToK: "cvt.i64tok", out[K], in[S K], va[], NONE;
    CvtF64ToK: "cvt.f64tok", out[K], in[S K], va[], NONE;
    CvtI64ToF64: "cvt.i64tof64", out[S K], in[S K], va[], NONE;
    CvtTruncF64ToI64: "cvttrunc.f64toi64", out[S K], in[S K], va[], NONE;
    CvtFloorF64ToI64: "cvtfloor.f64toi64", out[S K], in[S K], va[], NONE;
    CvtCeilF64ToI64: "cvtceil.f64toi64", out[S K], in[S K], va[], NONE;
    CvtI64ToStr: "cvt.i64tostr", out[S K], in[S K], va[], FMT20;

    // === same-type comparison ===
    CmpEqI64: "cmpeq.i64", out[K], in[S S K], va[], NONE;
    CmpEqI64Imm: "cmpeq.i64@imm", out[K], in[S ImmI64 K], va[], NONE;
    CmpLtI64: "cmplt.i64", out[K], in[S S K], va[], NONE;
    CmpLtI64Imm: "cmplt.i64@imm", out[K], in[S ImmI64 K], va[], NONE;
    CmpLeI64: "cmple.i64", out[K], in[S S K], va[], NONE;
    CmpLeI64Imm: "cmple.i64@imm", out[K], in[S ImmI64 K], va[], NONE;
    CmpGtI64: "cmpgt.i64", out[K], in[S S K], va[], NONE;
    CmpGtI64Imm: "cmpgt.i64@imm", out[K], in[S ImmI64 K], va[], NONE;
    CmpGeI64: "cmpge.i64", out[K], in[S S K], va[], NONE;
    CmpGeI64Imm: "cmpge.i64@imm", out[K], in[S ImmI64 K], va[], NONE;
    CmpEqF64: "cmpeq.f64", out[K], in[S S K], va[], NONE;
    CmpEqF64Imm: "cmpeq.f64@imm", out[K], in[S ImmF64 K], va[], NONE;
    CmpLtF64: "cmplt.f64", out[K], in[S S K], va[], NONE;
    CmpLtF64Imm: "cmplt.f64@imm", out[K], in[S ImmF64 K], va[], NONE;
    CmpLeF64: "cmple.f64", out[K], in[S S K], va[], NONE;
    CmpLeF64Imm: "cmple.f64@imm", out[K], in[S ImmF64 K], va[], NONE;
    CmpGtF64: "cmpgt.f64", out[K], in[S S K], va[], NONE;
    CmpGtF64Imm: "cmpgt.f64@imm", out[K], in[S ImmF64 K], va[], NONE;
    CmpGeF64: "cmpge.f64", out[K], in[S S K], va[], NONE;
    CmpGeF64Imm: "cmpge.f64@imm", out[K], in[S ImmF64 K], va[], NONE;
    CmpLtK: "cmplt.k", out[K], in[K K K], va[], NONE;
    CmpLtKImm: "cmplt.k@imm", out[K], in[K ImmU16 K], va[], NONE;
    CmpLeK: "cmple.k", out[K], in[K K K], va[], NONE;
    CmpLeKImm: "cmple.k@imm", out[K], in[K ImmU16 K], va[], NONE;
    CmpGtK: "cmpgt.k", out[K], in[K K K], va[], NONE;
    CmpGtKImm: "cmpgt.k@imm", out[K], in[K ImmU16 K], va[], NONE;
    CmpGeK: "cmpge.k", out[K], in[K K K], va[], NONE;
    CmpGeKImm: "cmpge.k@imm", out[K], in[K ImmU16 K], va[], NONE;
    CmpLtStr: "cmplt.str", out[K], in[S S K], va[], NONE;
    CmpLeStr: "cmple.str", out[K], in[S S K], va[], NONE;
    CmpGtStr: "cmpgt.str", out[K], in[S S K], va[], NONE;
    CmpGeStr: "cmpge.str", out[K], in[S S K], va[], NONE;
    CmpEqSlice: "cmpeq.slice", out[K], in[S S K], va[], NONE;

    // === polymorphic comparison ===
    Cmpv: "cmpv", out[S K], in[V V K], va[], NONE;
    SortCmpvNf: "sortcmpv@nf", out[S K], in[V V K], va[], NONE;
    SortCmpvNl: "sortcmpv@nl", out[S K], in[V V K], va[], NONE;
    CmpvK: "cmpv.k", out[S K], in[V K K], va[], NONE;
    CmpvKImm: "cmpv.k@imm", out[S K], in[V ImmU16 K], va[], NONE;
    CmpvI64: "cmpv.i64", out[S K], in[V S K], va[], NONE;
    CmpvI64Imm: "cmpv.i64@imm", out[S K], in[V ImmI64 K], va[], NONE;
    CmpvF64: "cmpv.f64", out[S K], in[V S K], va[], NONE;
    CmpvF64Imm: "cmpv.f64@imm", out[S K], in[V ImmF64 K], va[], NONE;
    CmpEqV: "cmpeq.v", out[K], in[V V K], va[], NONE;
    CmpEqVImm: "cmpeq.v@imm", out[K], in[V Lit K], va[], NONE;

    // === type introspection ===
    CheckTag: "checktag", out[V K], in[V ImmU16 K], va[], NONE;
    TypeBits: "typebits", out[S], in[V K], va[], NONE;
    IsNanF: "isnan.f", out[K], in[S K], va[], NONE;
    IsNullV: "isnull.v", out[K], in[V K], va[], NONE;
    IsNotNullV: "isnotnull.v", out[K], in[V K], va[], NONE;
    IsTrueV: "istrue.v", out[K], in[V K], va[], NONE;
    IsFalseV: "isfalse.v", out[K], in[V K], va[], NONE;

    // === field lookup & container navigation ===
    FindSym: "findsym", out[V K], in[B Sym K], va[], NONE;
    FindSym2: "findsym2", out[V K], in[B V K Sym K], va[], NONE;
    Tuple: "tuple", out[B K], in[V K], va[], NONE;
    Split: "split", out[V S K], in[S K], va[], NONE;
    ArraySize: "arraysize", out[S], in[S K], va[], NONE;
    ArrayPosition: "arrayposition", out[S K], in[S V K], va[], NONE;
    ObjectSize: "objectsize", out[S K], in[V K], va[], NONE;
    Unpack: "unpack", out[S K], in[V ImmU16 K], va[], NONE;

    // === boxing & unboxing ===
    Unsymbolize: "unsymbolize", out[V], in[V K], va[], NONE;
    UnboxCoerceF64: "unbox.coerce.f64", out[S K], in[V K], va[], NONE;
    UnboxCoerceI64: "unbox.coerce.i64", out[S K], in[V K], va[], NONE;
    UnboxCvtF64: "unbox.cvt.f64", out[S K], in[V K], va[], NONE;
    UnboxCvtI64: "unbox.cvt.i64", out[S K], in[V K], va[], NONE;
    BoxF64: "box.f64", out[V], in[S K], va[], BOX9;
    BoxI64: "box.i64", out[V], in[S K], va[], BOX9;
    BoxK: "box.k", out[V], in[K K], va[], Scratch::Fixed(LANE_COUNT);
    BoxStr: "box.str", out[V], in[S K], va[], PAGE;
    BoxList: "box.list", out[V], in[S K], va[], PAGE;
    MakeList: "makelist", out[V K], in[K], va[V K], PAGE;
    MakeStruct: "makestruct", out[V K], in[K], va[Sym V K], PAGE;
    LitRefOp: "litref", out[V], in[Lit], va[], NONE;
    AuxVal: "auxval", out[V K], in[Aux], va[], NONE;

    // === temporal ===
    DateAddMonth: "dateaddmonth", out[S K], in[S S K], va[], NONE;
    DateAddMonthImm: "dateaddmonth.imm", out[S K], in[S ImmI64 K], va[], NONE;
    DateAddQuarter: "dateaddquarter", out[S K], in[S S K], va[], NONE;
    DateAddYear: "dateaddyear", out[S K], in[S S K], va[], NONE;
    DateDiffMicrosecond: "datediffmicrosecond", out[S K], in[S S K], va[], NONE;
    DateDiffParam: "datediffparam", out[S K], in[S S ImmU64 K], va[], NONE;
    DateDiffMQY: "datediffmqy", out[S K], in[S S ImmU16 K], va[], NONE;
    DateExtractMicrosecond: "dateextractmicrosecond", out[S], in[S K], va[], NONE;
    DateExtractMillisecond: "dateextractmillisecond", out[S], in[S K], va[], NONE;
    DateExtractSecond: "dateextractsecond", out[S], in[S K], va[], NONE;
    DateExtractMinute: "dateextractminute", out[S], in[S K], va[], NONE;
    DateExtractHour: "dateextracthour", out[S], in[S K], va[], NONE;
    DateExtractDay: "dateextractday", out[S], in[S K], va[], NONE;
    DateExtractDow: "dateextractdow", out[S], in[S K], va[], NONE;
    DateExtractDoy: "dateextractdoy", out[S], in[S K], va[], NONE;
    DateExtractMonth: "dateextractmonth", out[S], in[S K], va[], NONE;
    DateExtractQuarter: "dateextractquarter", out[S], in[S K], va[], NONE;
    DateExtractYear: "dateextractyear", out[S], in[S K], va[], NONE;
    DateToUnixEpoch: "datetounixepoch", out[S], in[S K], va[], NONE;
    DateToUnixMicro: "datetounixmicro", out[S], in[S K], va[], NONE;
    DateTruncMillisecond: "datetruncmillisecond", out[S], in[S K], va[], NONE;
    DateTruncSecond: "datetruncsecond", out[S], in[S K], va[], NONE;
    DateTruncMinute: "datetruncminute", out[S], in[S K], va[], NONE;
    DateTruncHour: "datetrunchour", out[S], in[S K], va[], NONE;
    DateTruncDay: "datetruncday", out[S], in[S K], va[], NONE;
    DateTruncDow: "datetruncdow", out[S], in[S ImmU16 K], va[], NONE;
    DateTruncMonth: "datetruncmonth", out[S], in[S K], va[], NONE;
    DateTruncQuarter: "datetruncquarter", out[S], in[S K], va[], NONE;
    DateTruncYear: "datetruncyear", out[S], in[S K], va[], NONE;
    UnboxTs: "unboxts", out[S K], in[V K], va[], NONE;
    BoxTs: "boxts", out[V], in[S K], va[], BOX16;
    TimeBucketTs: "timebucket.ts", out[S], in[S S K], va[], NONE;
    WidthBucketI64: "widthbucket.i64", out[S], in[S S S S K], va[], NONE;
    WidthBucketF64: "widthbucket.f64", out[S], in[S S S S K], va[], NONE;

    // === geo ===
    GeoHash: "geohash", out[S], in[S S S K], va[], BOX16;
    GeoHashImm: "geohashimm", out[S], in[S S ImmU16 K], va[], BOX16;
    GeoTileX: "geotilex", out[S], in[S S K], va[], NONE;
    GeoTileY: "geotiley", out[S], in[S S K], va[], NONE;
    GeoTileEs: "geotilees", out[S], in[S S S K], va[], BOX32;
    GeoTileEsImm: "geotilees.imm", out[S], in[S S ImmU16 K], va[], BOX32;
    GeoDistance: "geodistance", out[S K], in[S S S S K], va[], NONE;

    // === strings ===
    Alloc: "alloc", out[S K], in[S K], va[], PAGE;
    ConcatStr: "concatstr", out[S K], in[], va[S K], PAGE;
    OctetLength: "octetlength", out[S], in[S K], va[], NONE;
    CharLength: "characterlength", out[S], in[S K], va[], NONE;
    Substr: "substr", out[S], in[S S S K], va[], NONE;
    SplitPart: "split_part", out[S K], in[S Dict S K], va[], NONE;
    TrimWsLeft: "trim_ws_left", out[S], in[S K], va[], NONE;
    TrimWsRight: "trim_ws_right", out[S], in[S K], va[], NONE;
    TrimCharLeft: "trim_char_left", out[S], in[S Dict K], va[], NONE;
    TrimCharRight: "trim_char_right", out[S], in[S Dict K], va[], NONE;
    Skip1CharLeft: "skip_1char_left", out[S K], in[S K], va[], NONE;
    Skip1CharRight: "skip_1char_right", out[S K], in[S K], va[], NONE;
    SkipNCharLeft: "skip_nchar_left", out[S K], in[S S K], va[], NONE;
    SkipNCharRight: "skip_nchar_right", out[S K], in[S S K], va[], NONE;
    SLower: "slower", out[S K], in[S K], va[], PAGE;
    SUpper: "supper", out[S K], in[S K], va[], PAGE;
    CmpStrEqCs: "cmp_str_eq_cs", out[K], in[S Dict K], va[], NONE;
    CmpStrEqCi: "cmp_str_eq_ci", out[K], in[S Dict K], va[], NONE;
    CmpStrEqUtf8Ci: "cmp_str_eq_utf8_ci", out[K], in[S Dict K], va[], NONE;
    CmpStrFuzzyA3: "cmp_str_fuzzy_A3", out[K], in[S S Dict K], va[], NONE;
    CmpStrFuzzyUnicodeA3: "cmp_str_fuzzy_unicode_A3", out[K], in[S S Dict K], va[], NONE;
    ContainsFuzzyA3: "contains_fuzzy_A3", out[K], in[S S Dict K], va[], NONE;
    ContainsFuzzyUnicodeA3: "contains_fuzzy_unicode_A3", out[K], in[S S Dict K], va[], NONE;
    ContainsPrefixCs: "contains_prefix_cs", out[S K], in[S Dict K], va[], NONE;
    ContainsPrefixCi: "contains_prefix_ci", out[S K], in[S Dict K], va[], NONE;
    ContainsPrefixUtf8Ci: "contains_prefix_utf8_ci", out[S K], in[S Dict K], va[], NONE;
    ContainsSuffixCs: "contains_suffix_cs", out[S K], in[S Dict K], va[], NONE;
    ContainsSuffixCi: "contains_suffix_ci", out[S K], in[S Dict K], va[], NONE;
    ContainsSuffixUtf8Ci: "contains_suffix_utf8_ci", out[S K], in[S Dict K], va[], NONE;
    ContainsSubstrCs: "contains_substr_cs", out[S K], in[S Dict K], va[], NONE;
    ContainsSubstrCi: "contains_substr_ci", out[S K], in[S Dict K], va[], NONE;
    ContainsSubstrUtf8Ci: "contains_substr_utf8_ci", out[S K], in[S Dict K], va[], NONE;
    EqPatternCs: "eq_pattern_cs", out[S K], in[S Dict K], va[], NONE;
    EqPatternCi: "eq_pattern_ci", out[S K], in[S Dict K], va[], NONE;
    EqPatternUtf8Ci: "eq_pattern_utf8_ci", out[S K], in[S Dict K], va[], NONE;
    ContainsPatternCs: "contains_pattern_cs", out[S K], in[S Dict K], va[], NONE;
    ContainsPatternCi: "contains_pattern_ci", out[S K], in[S Dict K], va[], NONE;
    ContainsPatternUtf8Ci: "contains_pattern_utf8_ci", out[S K], in[S Dict K], va[], NONE;
    IsSubnetOfIp4: "is_subnet_of_ip4", out[K], in[S Dict K], va[], NONE;
    DfaT6: "dfa_tiny6", out[K], in[S Dict K], va[], NONE;
    DfaT7: "dfa_tiny7", out[K], in[S Dict K], va[], NONE;
    DfaT8: "dfa_tiny8", out[K], in[S Dict K], va[], NONE;
    DfaT6Z: "dfa_tiny6Z", out[K], in[S Dict K], va[], NONE;
    DfaT7Z: "dfa_tiny7Z", out[K], in[S Dict K], va[], NONE;
    DfaT8Z: "dfa_tiny8Z", out[K], in[S Dict K], va[], NONE;
    DfaL: "dfa_large", out[K], in[S Dict K], va[], NONE;
    DfaLZ: "dfa_largeZ", out[K], in[S Dict K], va[], NONE;

    // === hash & lookup ===
    HashValue: "hashvalue", out[H], in[V K], va[], NONE;
    HashValuePlus: "hashvalue+", out[H], in[H V K], va[], NONE;
    HashMember: "hashmember", out[K], in[H HashSet K], va[], NONE;
    HashLookup: "hashlookup", out[V K], in[H HashSet K], va[], NONE;

    // === aggregation ===
    AggAndK: "aggand.k", out[], in[Agg K K], va[], NONE;
    AggOrK: "aggor.k", out[], in[Agg K K], va[], NONE;
    AggSumI64: "aggsum.i64", out[], in[Agg S K], va[], NONE;
    AggSumF64: "aggsum.f64", out[], in[Agg S K], va[], NONE;
    AggMinI64: "aggmin.i64", out[], in[Agg S K], va[], NONE;
    AggMinF64: "aggmin.f64", out[], in[Agg S K], va[], NONE;
    AggMaxI64: "aggmax.i64", out[], in[Agg S K], va[], NONE;
    AggMaxF64: "aggmax.f64", out[], in[Agg S K], va[], NONE;
    AggAndI64: "aggand.i64", out[], in[Agg S K], va[], NONE;
    AggOrI64: "aggor.i64", out[], in[Agg S K], va[], NONE;
    AggXorI64: "aggxor.i64", out[], in[Agg S K], va[], NONE;
    AggCount: "aggcount", out[], in[Agg K], va[], NONE;
    AggApproxCount: "aggapproxcount", out[], in[Agg H ImmU16 K], va[], NONE;
    AggApproxCountMerge: "aggapproxcountmerge", out[], in[Agg S ImmU16 K], va[], NONE;
    AggBucket: "aggbucket", out[L], in[H K], va[], NONE;
    AggSlotAndK: "aggslotand.k", out[], in[Agg L K K], va[], NONE;
    AggSlotOrK: "aggslotor.k", out[], in[Agg L K K], va[], NONE;
    AggSlotSumI64: "aggslotsum.i64", out[], in[Agg L S K], va[], NONE;
    AggSlotSumF64: "aggslotsum.f64", out[], in[Agg L S K], va[], NONE;
    AggSlotAvgI64: "aggslotavg.i64", out[], in[Agg L S K], va[], NONE;
    AggSlotAvgF64: "aggslotavg.f64", out[], in[Agg L S K], va[], NONE;
    AggSlotMinI64: "aggslotmin.i64", out[], in[Agg L S K], va[], NONE;
    AggSlotMinF64: "aggslotmin.f64", out[], in[Agg L S K], va[], NONE;
    AggSlotMaxI64: "aggslotmax.i64", out[], in[Agg L S K], va[], NONE;
    AggSlotMaxF64: "aggslotmax.f64", out[], in[Agg L S K], va[], NONE;
    AggSlotAndI64: "aggslotand.i64", out[], in[Agg L S K], va[], NONE;
    AggSlotOrI64: "aggslotor.i64", out[], in[Agg L S K], va[], NONE;
    AggSlotXorI64: "aggslotxor.i64", out[], in[Agg L S K], va[], NONE;
    AggSlotCount: "aggslotcount", out[], in[Agg L K], va[], NONE;
    AggSlotApproxCount: "aggslotapproxcount", out[], in[Agg L H ImmU16 K], va[], NONE;
    AggSlotApproxCountMerge: "aggslotapproxcountmerge", out[], in[Agg L S ImmU16 K], va[], NONE;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_dense_and_stable() {
        for tag in 0..Opcode::count() as u16 {
            let op = Opcode::from_u16(tag).unwrap();
            assert_eq!(op as u16, tag);
        }
        assert!(Opcode::from_u16(Opcode::count() as u16).is_none());
    }

    #[test]
    fn widths_follow_layouts() {
        // add.i64: dst S + dst K + src S + src S + src K = 10 bytes.
        assert_eq!(Opcode::AddI64.info().fixed_width(), 10);
        // add.i64@imm swaps one slot for an 8-byte immediate.
        assert_eq!(Opcode::AddI64Imm.info().fixed_width(), 16);
        // findsym: V + K + B + 4-byte symbol + K.
        assert_eq!(Opcode::FindSym.info().fixed_width(), 12);
        // ret carries no operands.
        assert_eq!(Opcode::Ret.info().fixed_width(), 0);
        // variadic concatstr: S + K + u16 count, then (S,K) items.
        let info = Opcode::ConcatStr.info();
        assert_eq!(info.fixed_width(), 6);
        assert_eq!(info.va_width(), 4);
    }

    #[test]
    fn scratch_requirements() {
        assert_eq!(Opcode::BoxF64.info().scratch.bytes(), 9 * LANE_COUNT);
        assert_eq!(Opcode::ConcatStr.info().scratch.bytes(), PAGE_SIZE);
        assert_eq!(Opcode::AddI64.info().scratch.bytes(), 0);
    }

    #[test]
    fn texts_are_unique() {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        for tag in 0..Opcode::count() as u16 {
            let text = Opcode::from_u16(tag).unwrap().info().text;
            assert!(seen.insert(text), "duplicate opcode text {text}");
        }
    }
}
