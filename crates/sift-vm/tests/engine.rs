//! End-to-end engine tests: programs assembled the way the planner
//! would emit them, run through the row drivers over real encoded
//! buffers.

use std::sync::Arc;

use sift_ion::{header_size_of, read_int, Buffer, Datum, SymbolTable, Type};
use sift_vm::{
    run_aggregate, run_batch, run_dedup, run_filter, run_project, run_splat, AggBuffer,
    AggHashTable, Bytecode, DfaProgram, HashReg, MaskReg, Opcode, Operand, ProgramBuilder,
    ProjectedField, RadixTree64, ScalarReg, ValueReg,
};

/// Encode one struct per row and return the buffer plus row delimiters
/// pointing at each struct's body, the shape the scan layer hands the
/// VM.
fn build_rows(st: &mut SymbolTable, rows: &[Vec<(&str, Datum)>]) -> (Vec<u8>, Vec<(u32, u32)>) {
    let mut buf = Buffer::new();
    let mut delims = Vec::with_capacity(rows.len());
    for row in rows {
        let datum = Datum::new_struct(st, row);
        let start = buf.len();
        buf.write_raw(datum.bytes());
        let header = header_size_of(datum.bytes()).expect("well-formed struct");
        delims.push((
            (start + header) as u32,
            (datum.bytes().len() - header) as u32,
        ));
    }
    (buf.into_bytes(), delims)
}

fn int_rows(label: &str, values: &[i64]) -> (SymbolTable, Vec<u8>, Vec<(u32, u32)>) {
    let mut st = SymbolTable::new();
    let rows: Vec<Vec<(&str, Datum)>> = values
        .iter()
        .map(|&v| vec![(label, Datum::int(v))])
        .collect();
    let (buf, delims) = build_rows(&mut st, &rows);
    (st, buf, delims)
}

/// init + findsym prologue shared by most programs. Returns
/// (builder, value slot, found-mask slot).
fn prologue(st: &SymbolTable, label: &str) -> (ProgramBuilder, u16, u16) {
    let mut b = ProgramBuilder::new();
    b.set_symtab(st);
    let delims = b.b_slot();
    let mask = b.k_slot();
    let v = b.v_slot();
    let found = b.k_slot();
    b.emit(Opcode::Init, &[Operand::B(delims), Operand::K(mask)]);
    let sym = st.symbolize(label).expect("label interned");
    b.emit(
        Opcode::FindSym,
        &[
            Operand::V(v),
            Operand::K(found),
            Operand::B(delims),
            Operand::Sym(sym),
            Operand::K(mask),
        ],
    );
    (b, v, found)
}

#[test]
fn filter_retains_matching_rows_in_order() {
    // a < 30 over more than one batch, including a partial tail.
    let values: Vec<i64> = (0..45).map(|i| (i * 7) % 60).collect();
    let (st, buf, mut delims) = int_rows("a", &values);

    let (mut b, v, found) = prologue(&st, "a");
    let s = b.s_slot();
    let ks = b.k_slot();
    let out = b.k_slot();
    b.emit(
        Opcode::UnboxCoerceI64,
        &[Operand::S(s), Operand::K(ks), Operand::V(v), Operand::K(found)],
    );
    b.emit(
        Opcode::CmpLtI64Imm,
        &[Operand::K(out), Operand::S(s), Operand::I64(30), Operand::K(ks)],
    );
    b.emit(Opcode::RetK, &[Operand::K(out)]);
    let mut bc = b.build();

    let survivors = run_filter(&mut bc, &buf, &mut delims).expect("filter should run");
    let expected: Vec<i64> = values.iter().copied().filter(|&v| v < 30).collect();
    assert_eq!(survivors, expected.len());

    // Survivors decode to the expected values, in input order.
    for (d, want) in delims.iter().zip(&expected) {
        let body = &buf[d.0 as usize..(d.0 + d.1) as usize];
        let (_, rest) = sift_ion::read_label(body).unwrap();
        assert_eq!(read_int(rest).unwrap().0, *want);
    }
}

#[test]
fn filter_via_polymorphic_compare() {
    let values: Vec<i64> = vec![5, -3, 12, 0, 99, 7];
    let (st, buf, mut delims) = int_rows("a", &values);

    let (mut b, v, found) = prologue(&st, "a");
    let cmp = b.s_slot();
    let ck = b.k_slot();
    let out = b.k_slot();
    b.emit(
        Opcode::CmpvI64Imm,
        &[
            Operand::S(cmp),
            Operand::K(ck),
            Operand::V(v),
            Operand::I64(7),
            Operand::K(found),
        ],
    );
    // result < 0  <=>  a < 7
    b.emit(
        Opcode::CmpLtI64Imm,
        &[Operand::K(out), Operand::S(cmp), Operand::I64(0), Operand::K(ck)],
    );
    b.emit(Opcode::RetK, &[Operand::K(out)]);
    let mut bc = b.build();

    let n = run_filter(&mut bc, &buf, &mut delims).expect("filter should run");
    assert_eq!(n, values.iter().filter(|&&v| v < 7).count());
}

#[test]
fn findsym_hits_and_misses_on_ascending_labels() {
    let mut st = SymbolTable::new();
    // Interning order fixes ids: present ids ascend, "gap" id is absent
    // from the struct.
    let labels = ["f1", "f2", "gap", "f3"];
    for l in labels {
        st.intern(l);
    }
    let rows = vec![vec![
        ("f1", Datum::int(10)),
        ("f2", Datum::int(20)),
        ("f3", Datum::int(30)),
    ]];
    let (buf, delims) = build_rows(&mut st, &rows);

    // Hit: f2 resolves to 20.
    let (mut b, v, found) = prologue(&st, "f2");
    b.emit(Opcode::RetK, &[Operand::K(found)]);
    let mut bc = b.build();
    let mask = run_batch(&mut bc, &buf, &delims).expect("batch should run");
    assert_eq!(mask, 1);
    let vreg = ValueReg::load(&bc.vstack, v);
    let value = &buf[vreg.offsets[0] as usize..(vreg.offsets[0] + vreg.sizes[0]) as usize];
    assert_eq!(read_int(value).unwrap().0, 20);

    // Miss: "gap" clears the mask and leaves the cursor just past f2,
    // so a sequenced findsym2 still finds f3.
    let (mut b, v_miss, miss) = prologue(&st, "gap");
    let v2 = b.v_slot();
    let found2 = b.k_slot();
    let delims_slot = 0u16; // the prologue allocated the B slot first
    b.emit(
        Opcode::FindSym2,
        &[
            Operand::V(v2),
            Operand::K(found2),
            Operand::B(delims_slot),
            Operand::V(v_miss),
            Operand::K(miss),
            Operand::Sym(st.symbolize("f3").unwrap()),
            Operand::K(MaskRegSlot::SLOT),
        ],
    );
    b.emit(Opcode::RetK, &[Operand::K(found2)]);
    let mut bc = b.build();
    let _ = run_batch(&mut bc, &buf, &delims).expect("batch should run");
    assert_eq!(MaskReg::load(&bc.vstack, miss).mask, 0, "gap must miss");
    let prev = ValueReg::load(&bc.vstack, v_miss);
    // The miss cursor points at f2's value (just past it is where the
    // sequenced lookup resumes).
    let value = &buf[prev.offsets[0] as usize..(prev.offsets[0] + prev.sizes[0]) as usize];
    assert_eq!(read_int(value).unwrap().0, 20);
    assert_eq!(MaskReg::load(&bc.vstack, found2).mask, 1, "f3 must hit");
    let v2reg = ValueReg::load(&bc.vstack, v2);
    let value = &buf[v2reg.offsets[0] as usize..(v2reg.offsets[0] + v2reg.sizes[0]) as usize];
    assert_eq!(read_int(value).unwrap().0, 30);
}

/// The prologue's valid-lanes mask slot: B takes cells 0..16, so the
/// mask lands at cell 16.
struct MaskRegSlot;
impl MaskRegSlot {
    const SLOT: u16 = 16;
}

#[test]
fn cmpv_mixed_numeric_lanes() {
    let mut st = SymbolTable::new();
    let rows = vec![
        vec![("v", Datum::int(3))],
        vec![("v", Datum::float(3.0))],
        vec![("v", Datum::float(3.5))],
        vec![("v", Datum::string("3"))],
    ];
    let (buf, delims) = build_rows(&mut st, &rows);

    let (mut b, v, found) = prologue(&st, "v");
    let cmp = b.s_slot();
    let ck = b.k_slot();
    b.emit(
        Opcode::CmpvI64Imm,
        &[
            Operand::S(cmp),
            Operand::K(ck),
            Operand::V(v),
            Operand::I64(3),
            Operand::K(found),
        ],
    );
    b.emit(Opcode::RetK, &[Operand::K(ck)]);
    let mut bc = b.build();
    let mask = run_batch(&mut bc, &buf, &delims).expect("batch should run");

    // Lane 3 (string) is not comparable against an integer.
    assert_eq!(mask, 0b0111);
    let results = ScalarReg::load(&bc.vstack, cmp);
    assert_eq!(results.i64(0), 0);
    assert_eq!(results.i64(1), 0);
    assert_eq!(results.i64(2), 1);
}

#[test]
fn cmpv_is_antisymmetric() {
    let mut st = SymbolTable::new();
    let samples = [
        Datum::int(1),
        Datum::int(-9),
        Datum::float(2.5),
        Datum::string("abc"),
        Datum::string("abd"),
        Datum::bool(true),
        Datum::null(),
    ];
    let rows: Vec<Vec<(&str, Datum)>> = samples
        .iter()
        .flat_map(|x| samples.iter().map(move |y| vec![("x", x.clone()), ("y", y.clone())]))
        .collect();
    let (buf, delims) = build_rows(&mut st, &rows);

    let mut forward = Vec::new();
    let mut backward = Vec::new();
    for (first, second) in [("x", "y"), ("y", "x")] {
        let (mut b, vx, kx) = prologue(&st, first);
        let vy = b.v_slot();
        let ky = b.k_slot();
        b.emit(
            Opcode::FindSym,
            &[
                Operand::V(vy),
                Operand::K(ky),
                Operand::B(0),
                Operand::Sym(st.symbolize(second).unwrap()),
                Operand::K(MaskRegSlot::SLOT),
            ],
        );
        let both = b.k_slot();
        b.emit(Opcode::AndK, &[Operand::K(both), Operand::K(kx), Operand::K(ky)]);
        let cmp = b.s_slot();
        let ck = b.k_slot();
        b.emit(
            Opcode::Cmpv,
            &[
                Operand::S(cmp),
                Operand::K(ck),
                Operand::V(vx),
                Operand::V(vy),
                Operand::K(both),
            ],
        );
        b.emit(Opcode::RetK, &[Operand::K(ck)]);
        let mut bc = b.build();
        let mut lane_results = Vec::new();
        for chunk in delims.chunks(16) {
            let mask = run_batch(&mut bc, &buf, chunk).expect("batch should run");
            let results = ScalarReg::load(&bc.vstack, cmp);
            for lane in 0..chunk.len() {
                let comparable = mask & (1 << lane) != 0;
                lane_results.push((comparable, results.i64(lane)));
            }
        }
        if first == "x" {
            forward = lane_results;
        } else {
            backward = lane_results;
        }
    }
    for (i, (f, r)) in forward.iter().zip(&backward).enumerate() {
        assert_eq!(f.0, r.0, "comparability must be symmetric (pair {i})");
        if f.0 {
            assert_eq!(f.1, -r.1, "sign(cmpv(a,b)) = -sign(cmpv(b,a)) (pair {i})");
        }
    }
}

#[test]
fn projection_omits_missing_fields() {
    let mut st = SymbolTable::new();
    st.intern("a");
    st.intern("b");
    let rows = vec![vec![("a", Datum::int(1))]];
    let (buf, delims) = build_rows(&mut st, &rows);

    let (mut b, va, _ka) = prologue(&st, "a");
    let vb = b.v_slot();
    let kb = b.k_slot();
    b.emit(
        Opcode::FindSym,
        &[
            Operand::V(vb),
            Operand::K(kb),
            Operand::B(0),
            Operand::Sym(st.symbolize("b").unwrap()),
            Operand::K(MaskRegSlot::SLOT),
        ],
    );
    b.emit(Opcode::Ret, &[]);
    let mut bc = b.build();

    let fields = [
        ProjectedField { sym: st.symbolize("a").unwrap(), slot: va },
        ProjectedField { sym: st.symbolize("b").unwrap(), slot: vb },
    ];
    let mut dst = Vec::new();
    let (bytes, rows_done) =
        run_project(&mut bc, &buf, &delims, &mut dst, 1 << 16, &fields).expect("project");
    assert_eq!(rows_done, 1);
    // struct {a: 1}: header 0xD3, label varuint, int 1. The header
    // advertises the true content length (3 bytes).
    assert_eq!(dst, [0xD3, 0x80 | 10, 0x21, 0x01]);
    assert_eq!(bytes, dst.len());
}

#[test]
fn projection_rolls_back_when_output_is_full() {
    let (st, buf, delims) = int_rows("a", &[1, 2, 3]);
    let (mut b, va, _) = prologue(&st, "a");
    b.emit(Opcode::Ret, &[]);
    let mut bc = b.build();
    let fields = [ProjectedField { sym: st.symbolize("a").unwrap(), slot: va }];
    let mut dst = Vec::new();
    // Capacity fits nothing: the driver rolls back to the pre-batch
    // offset and reports zero rows.
    let (bytes, rows_done) =
        run_project(&mut bc, &buf, &delims, &mut dst, 2, &fields).expect("project");
    assert_eq!((bytes, rows_done), (0, 0));
    assert!(dst.is_empty());
}

#[test]
fn dedup_retains_first_occurrence() {
    // Hash sequence h1 h2 h1 h3 h2 -> rows r1 r2 r4 survive.
    let values = [100i64, 200, 100, 300, 200];
    let (st, buf, mut delims) = int_rows("a", &values);
    let original = delims.clone();

    let (mut b, v, found) = prologue(&st, "a");
    let h = b.h_slot();
    b.emit(
        Opcode::HashValue,
        &[Operand::H(h), Operand::V(v), Operand::K(found)],
    );
    b.emit(Opcode::RetK, &[Operand::K(found)]);
    let mut bc = b.build();

    let mut hashes = Vec::new();
    let mut tree = RadixTree64::new();
    let kept = run_dedup(&mut bc, &buf, &mut delims, &mut hashes, &mut tree, h).expect("dedup");
    assert_eq!(kept, 3);
    assert_eq!(delims, vec![original[0], original[1], original[3]]);
    assert_eq!(hashes.len(), 3);
    assert_eq!(tree.len(), 3);
    // Distinct hashes only, first occurrences in order.
    assert_ne!(hashes[0], hashes[1]);
    assert_ne!(hashes[1], hashes[2]);
}

#[test]
fn aggregate_sum_skips_masked_lanes() {
    // Values [5, missing, 7, 3]: the missing lane contributes nothing.
    let mut st = SymbolTable::new();
    st.intern("a");
    let rows = vec![
        vec![("a", Datum::int(5))],
        vec![("other", Datum::int(999))],
        vec![("a", Datum::int(7))],
        vec![("a", Datum::int(3))],
    ];
    let (buf, delims) = build_rows(&mut st, &rows);

    let agg = Arc::new(AggBuffer::new(1, 0));
    let (mut b, v, found) = prologue(&st, "a");
    let s = b.s_slot();
    let ks = b.k_slot();
    b.emit(
        Opcode::UnboxCoerceI64,
        &[Operand::S(s), Operand::K(ks), Operand::V(v), Operand::K(found)],
    );
    b.emit(
        Opcode::AggSumI64,
        &[Operand::Agg(0), Operand::S(s), Operand::K(ks)],
    );
    b.emit(Opcode::Ret, &[]);
    b.set_agg(Arc::clone(&agg));
    let mut bc = b.build();

    let rows_done = run_aggregate(&mut bc, &buf, &delims).expect("aggregate");
    assert_eq!(rows_done, 4);
    assert_eq!(agg.load_i64(0), 15);
}

#[test]
fn grouped_aggregation_sums_per_bucket() {
    let mut st = SymbolTable::new();
    st.intern("g");
    st.intern("v");
    let rows = vec![
        vec![("g", Datum::string("x")), ("v", Datum::int(1))],
        vec![("g", Datum::string("y")), ("v", Datum::int(2))],
        vec![("g", Datum::string("x")), ("v", Datum::int(4))],
        vec![("g", Datum::string("y")), ("v", Datum::int(8))],
    ];
    let (buf, delims) = build_rows(&mut st, &rows);

    let agg = Arc::new(AggBuffer::new(2, 1));
    let table = Arc::new(AggHashTable::new(2));
    let (mut b, vg, kg) = prologue(&st, "g");
    let h = b.h_slot();
    b.emit(Opcode::HashValue, &[Operand::H(h), Operand::V(vg), Operand::K(kg)]);
    let l = b.l_slot();
    b.emit(Opcode::AggBucket, &[Operand::L(l), Operand::H(h), Operand::K(kg)]);
    let vv = b.v_slot();
    let kv = b.k_slot();
    b.emit(
        Opcode::FindSym,
        &[
            Operand::V(vv),
            Operand::K(kv),
            Operand::B(0),
            Operand::Sym(st.symbolize("v").unwrap()),
            Operand::K(MaskRegSlot::SLOT),
        ],
    );
    let s = b.s_slot();
    let ks = b.k_slot();
    b.emit(
        Opcode::UnboxCoerceI64,
        &[Operand::S(s), Operand::K(ks), Operand::V(vv), Operand::K(kv)],
    );
    b.emit(
        Opcode::AggSlotSumI64,
        &[Operand::Agg(0), Operand::L(l), Operand::S(s), Operand::K(ks)],
    );
    b.emit(Opcode::Ret, &[]);
    b.set_agg(Arc::clone(&agg));
    b.set_aggtable(Arc::clone(&table));
    let mut bc = b.build();

    run_aggregate(&mut bc, &buf, &delims).expect("aggregate");
    // Buckets append in first-seen order: x -> 0, y -> 1.
    assert_eq!(table.buckets(), 2);
    assert_eq!(agg.load_i64(0), 5);
    assert_eq!(agg.load_i64(1), 10);
}

#[test]
fn splat_expands_lists_with_permutation() {
    let mut st = SymbolTable::new();
    let rows = vec![
        vec![("l", Datum::new_list(&mut SymbolTable::new(), &[Datum::int(1), Datum::int(2)]))],
        vec![("l", Datum::new_list(&mut SymbolTable::new(), &[Datum::int(3)]))],
        vec![("l", Datum::new_list(&mut SymbolTable::new(), &[]))],
    ];
    let (buf, delims) = build_rows(&mut st, &rows);

    let (mut b, v, found) = prologue(&st, "l");
    let s = b.s_slot();
    let ks = b.k_slot();
    b.emit(
        Opcode::Unpack,
        &[
            Operand::S(s),
            Operand::K(ks),
            Operand::V(v),
            Operand::U16(Type::List as u16),
            Operand::K(found),
        ],
    );
    b.emit(Opcode::RetSK, &[Operand::S(s), Operand::K(ks)]);
    let mut bc = b.build();

    let mut out = vec![(0u32, 0u32); 8];
    let mut perm = vec![0i32; 8];
    let (consumed, produced) =
        run_splat(&mut bc, &buf, &delims, &mut out, &mut perm).expect("splat");
    assert_eq!(consumed, 3);
    assert_eq!(produced, 3);
    let values: Vec<i64> = out[..produced]
        .iter()
        .map(|&(off, len)| read_int(&buf[off as usize..(off + len) as usize]).unwrap().0)
        .collect();
    assert_eq!(values, [1, 2, 3]);
    assert_eq!(&perm[..produced], [0, 0, 1]);
}

#[test]
fn box_f64_emits_canonical_nine_byte_form() {
    let (st, buf, delims) = int_rows("a", &[0]);
    let (mut b, _, _) = prologue(&st, "a");
    let s = b.s_slot();
    b.emit(Opcode::BroadcastF64, &[Operand::S(s), Operand::F64(3.5)]);
    let v = b.v_slot();
    b.emit(
        Opcode::BoxF64,
        &[Operand::V(v), Operand::S(s), Operand::K(MaskRegSlot::SLOT)],
    );
    b.emit(Opcode::Ret, &[]);
    let mut bc = b.build();
    run_batch(&mut bc, &buf, &delims).expect("batch should run");

    let vreg = ValueReg::load(&bc.vstack, v);
    assert_eq!(vreg.sizes[0], 9);
    assert_eq!(vreg.header_size[0], 1);
    let bytes = bc.vmref(&buf, vreg.offsets[0], vreg.sizes[0]).unwrap();
    let mut expected = vec![0x48u8];
    expected.extend_from_slice(&3.5f64.to_be_bytes());
    assert_eq!(bytes, &expected[..]);
}

#[test]
fn trap_aborts_with_trap_error() {
    let (st, buf, mut delims) = int_rows("a", &[1]);
    let mut b = ProgramBuilder::new();
    b.set_symtab(&st);
    let d = b.b_slot();
    let k = b.k_slot();
    b.emit(Opcode::Init, &[Operand::B(d), Operand::K(k)]);
    b.emit(Opcode::Trap, &[]);
    let mut bc = b.build();
    let err = run_filter(&mut bc, &buf, &mut delims).unwrap_err();
    assert!(matches!(err, sift_error::SiftError::Trap { .. }));
}

#[test]
fn more_scratch_grows_and_resumes_the_same_batch() {
    let mut st = SymbolTable::new();
    let rows = vec![vec![("s", Datum::string("hello, "))]];
    let (buf, delims) = build_rows(&mut st, &rows);

    let (mut b, v, found) = prologue(&st, "s");
    let s = b.s_slot();
    let ks = b.k_slot();
    b.emit(
        Opcode::Unpack,
        &[
            Operand::S(s),
            Operand::K(ks),
            Operand::V(v),
            Operand::U16(Type::String as u16),
            Operand::K(found),
        ],
    );
    let joined = b.s_slot();
    let jk = b.k_slot();
    b.emit_va(
        Opcode::ConcatStr,
        &[Operand::S(joined), Operand::K(jk)],
        &[
            &[Operand::S(s), Operand::K(ks)],
            &[Operand::S(s), Operand::K(ks)],
        ],
    );
    b.emit(Opcode::RetSK, &[Operand::S(joined), Operand::K(jk)]);
    let mut bc = b.build();
    // Starve the arena so the dispatcher's scratch check fires first.
    bc.scratch_cap = bc.savedlit.len() + 16;

    run_batch(&mut bc, &buf, &delims).expect("driver should grow scratch and resume");
    let out = bc.vmstate.sreg;
    let joined_bytes = bc.vmref(&buf, out.offsets[0], out.sizes[0]).unwrap();
    assert_eq!(joined_bytes, b"hello, hello, ");
}

#[test]
fn string_predicates_against_dictionary() {
    let mut st = SymbolTable::new();
    let rows = vec![
        vec![("s", Datum::string("Hello World"))],
        vec![("s", Datum::string("hello world"))],
        vec![("s", Datum::string("goodbye"))],
    ];
    let (buf, delims) = build_rows(&mut st, &rows);

    let (mut b, v, found) = prologue(&st, "s");
    let s = b.s_slot();
    let ks = b.k_slot();
    b.emit(
        Opcode::Unpack,
        &[
            Operand::S(s),
            Operand::K(ks),
            Operand::V(v),
            Operand::U16(Type::String as u16),
            Operand::K(found),
        ],
    );
    let needle = b.dict_str(b"hello world");
    let eq_ci = b.k_slot();
    b.emit(
        Opcode::CmpStrEqCi,
        &[Operand::K(eq_ci), Operand::S(s), Operand::Dict(needle), Operand::K(ks)],
    );
    let prefix = b.dict_str(b"Hello");
    let rem = b.s_slot();
    let has_prefix = b.k_slot();
    b.emit(
        Opcode::ContainsPrefixCs,
        &[
            Operand::S(rem),
            Operand::K(has_prefix),
            Operand::S(s),
            Operand::Dict(prefix),
            Operand::K(ks),
        ],
    );
    b.emit(Opcode::RetK, &[Operand::K(eq_ci)]);
    let mut bc = b.build();
    let mask = run_batch(&mut bc, &buf, &delims).expect("batch should run");
    assert_eq!(mask, 0b011, "case-insensitive equality");
    assert_eq!(
        MaskReg::load(&bc.vstack, has_prefix).mask,
        0b001,
        "case-sensitive prefix"
    );
    // The prefix op leaves the remainder for chaining.
    let rem_reg = sift_vm::BaseReg::load(&bc.vstack, rem);
    let tail = bc.vmref(&buf, rem_reg.offsets[0], rem_reg.sizes[0]).unwrap();
    assert_eq!(tail, b" World");
}

#[test]
fn dfa_and_fuzzy_predicates() {
    let mut st = SymbolTable::new();
    let rows = vec![
        vec![("s", Datum::string("kitten"))],
        vec![("s", Datum::string("sitting"))],
        vec![("s", Datum::string("unrelated"))],
    ];
    let (buf, delims) = build_rows(&mut st, &rows);

    let (mut b, v, found) = prologue(&st, "s");
    let s = b.s_slot();
    let ks = b.k_slot();
    b.emit(
        Opcode::Unpack,
        &[
            Operand::S(s),
            Operand::K(ks),
            Operand::V(v),
            Operand::U16(Type::String as u16),
            Operand::K(found),
        ],
    );
    // DFA matching exactly "kitten".
    let dfa = b.dict_dfa(DfaProgram::literal(b"kitten", true));
    let dfa_out = b.k_slot();
    b.emit(
        Opcode::DfaT6,
        &[Operand::K(dfa_out), Operand::S(s), Operand::Dict(dfa), Operand::K(ks)],
    );
    // Fuzzy: "kitten" vs "sitting" is the classic distance 3.
    let needle = b.dict_str(b"kitten");
    let threshold = b.s_slot();
    b.emit(Opcode::BroadcastI64, &[Operand::S(threshold), Operand::I64(3)]);
    let fuzzy_out = b.k_slot();
    b.emit(
        Opcode::CmpStrFuzzyA3,
        &[
            Operand::K(fuzzy_out),
            Operand::S(s),
            Operand::S(threshold),
            Operand::Dict(needle),
            Operand::K(ks),
        ],
    );
    b.emit(Opcode::RetK, &[Operand::K(dfa_out)]);
    let mut bc = b.build();
    let mask = run_batch(&mut bc, &buf, &delims).expect("batch should run");
    assert_eq!(mask, 0b001, "dfa matches the exact literal");
    assert_eq!(
        MaskReg::load(&bc.vstack, fuzzy_out).mask,
        0b011,
        "kitten~sitting within distance 3, unrelated not"
    );
}

#[test]
fn hashmember_filters_against_prebuilt_table() {
    let values = [10i64, 20, 30, 40];
    let (st, buf, mut delims) = int_rows("a", &values);

    let (mut b, v, found) = prologue(&st, "a");
    let h = b.h_slot();
    b.emit(Opcode::HashValue, &[Operand::H(h), Operand::V(v), Operand::K(found)]);

    // The planner hashes the accepted encodings the same way the VM
    // will: full encoded value bytes.
    let mut accept = Vec::new();
    for keep in [20i64, 40] {
        let datum = Datum::int(keep);
        accept.push((xxhash_rust::xxh3::xxh3_128(datum.bytes()), None));
    }
    let table = b.hashset(accept);
    let out = b.k_slot();
    b.emit(
        Opcode::HashMember,
        &[Operand::K(out), Operand::H(h), Operand::HashSet(table), Operand::K(found)],
    );
    b.emit(Opcode::RetK, &[Operand::K(out)]);
    let mut bc = b.build();
    let kept = run_filter(&mut bc, &buf, &mut delims).expect("filter");
    assert_eq!(kept, 2);
}

#[test]
fn aux_columns_compact_with_the_filter_permutation() {
    let values = [1i64, 2, 3, 4, 5, 6];
    let (st, buf, mut delims) = int_rows("a", &values);
    let aux_marks: Vec<(u32, u32)> = (0..values.len()).map(|i| (i as u32 * 100, 1)).collect();

    let (mut b, v, found) = prologue(&st, "a");
    let s = b.s_slot();
    let ks = b.k_slot();
    b.emit(
        Opcode::UnboxCoerceI64,
        &[Operand::S(s), Operand::K(ks), Operand::V(v), Operand::K(found)],
    );
    let out = b.k_slot();
    b.emit(
        Opcode::CmpGtI64Imm,
        &[Operand::K(out), Operand::S(s), Operand::I64(3), Operand::K(ks)],
    );
    b.emit(Opcode::RetK, &[Operand::K(out)]);
    b.aux_slots(1);
    let mut bc = b.build();
    bc.auxvals[0] = aux_marks;

    let kept = run_filter(&mut bc, &buf, &mut delims).expect("filter");
    assert_eq!(kept, 3);
    // Aux entries follow the same permutation as the delimiters.
    assert_eq!(&bc.auxvals[0][..kept], &[(300, 1), (400, 1), (500, 1)]);
}

#[test]
fn timestamp_roundtrip_through_unbox_and_box() {
    let mut st = SymbolTable::new();
    let dt = sift_ion::DateTime {
        year: 2021,
        month: 3,
        day: 14,
        hour: 1,
        minute: 59,
        second: 26,
        micros: 535_897,
    };
    let rows = vec![vec![("t", Datum::timestamp(dt))]];
    let (buf, delims) = build_rows(&mut st, &rows);

    let (mut b, v, found) = prologue(&st, "t");
    let s = b.s_slot();
    let ks = b.k_slot();
    b.emit(
        Opcode::UnboxTs,
        &[Operand::S(s), Operand::K(ks), Operand::V(v), Operand::K(found)],
    );
    let y = b.s_slot();
    b.emit(
        Opcode::DateExtractYear,
        &[Operand::S(y), Operand::S(s), Operand::K(ks)],
    );
    let boxed = b.v_slot();
    b.emit(Opcode::BoxTs, &[Operand::V(boxed), Operand::S(s), Operand::K(ks)]);
    b.emit(Opcode::Ret, &[]);
    let mut bc = b.build();
    run_batch(&mut bc, &buf, &delims).expect("batch should run");

    assert_eq!(ScalarReg::load(&bc.vstack, s).i64(0), dt.to_unix_micros());
    assert_eq!(ScalarReg::load(&bc.vstack, y).i64(0), 2021);
    let vreg = ValueReg::load(&bc.vstack, boxed);
    let bytes = bc.vmref(&buf, vreg.offsets[0], vreg.sizes[0]).unwrap();
    let (decoded, _) = sift_ion::read_time(bytes).unwrap();
    assert_eq!(decoded, dt);
}

#[test]
fn parallel_workers_share_aggregation_state() {
    let values: Vec<i64> = (1..=64).collect();
    let (st, buf, delims) = int_rows("a", &values);

    let agg = Arc::new(AggBuffer::new(1, 0));
    let (mut b, v, found) = prologue(&st, "a");
    let s = b.s_slot();
    let ks = b.k_slot();
    b.emit(
        Opcode::UnboxCoerceI64,
        &[Operand::S(s), Operand::K(ks), Operand::V(v), Operand::K(found)],
    );
    b.emit(Opcode::AggSumI64, &[Operand::Agg(0), Operand::S(s), Operand::K(ks)]);
    b.emit(Opcode::Ret, &[]);
    b.set_agg(Arc::clone(&agg));
    let bc = b.build();

    // Disjoint row ranges across workers, each with a cloned image.
    std::thread::scope(|scope| {
        for half in delims.chunks(32) {
            let mut worker: Bytecode = bc.clone_image();
            let buf = &buf;
            scope.spawn(move || {
                run_aggregate(&mut worker, buf, half).expect("worker aggregate");
            });
        }
    });
    assert_eq!(agg.load_i64(0), (1 + 64) * 64 / 2);
}

#[test]
fn dedup_hash_register_reaches_terminal_state() {
    // ret.b.h.k publishes both the delimiters and the hash register.
    let (st, buf, delims) = int_rows("a", &[7, 7]);
    let (mut b, v, found) = prologue(&st, "a");
    let h = b.h_slot();
    b.emit(Opcode::HashValue, &[Operand::H(h), Operand::V(v), Operand::K(found)]);
    b.emit(
        Opcode::RetBHK,
        &[Operand::B(0), Operand::H(h), Operand::K(found)],
    );
    let mut bc = b.build();
    let mask = run_batch(&mut bc, &buf, &delims).expect("batch should run");
    assert_eq!(mask, 0b11);
    let hreg: HashReg = bc.vmstate.hreg;
    assert_eq!(hreg.lo[0], hreg.lo[1], "identical values hash identically");
    assert_ne!(hreg.lo[0], 0);
}
