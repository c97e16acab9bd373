//! Filter-driver throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use sift_ion::{Buffer, Datum, SymbolTable};
use sift_vm::{run_filter, Opcode, Operand, ProgramBuilder};

fn build_input(rows: usize) -> (SymbolTable, Vec<u8>, Vec<(u32, u32)>) {
    let mut st = SymbolTable::new();
    let mut buf = Buffer::new();
    let mut delims = Vec::with_capacity(rows);
    for i in 0..rows {
        let datum = Datum::new_struct(&mut st, &[("a", Datum::int((i % 1000) as i64))]);
        let start = buf.len();
        buf.write_raw(datum.bytes());
        let header = sift_ion::header_size_of(datum.bytes()).unwrap();
        delims.push((
            (start + header) as u32,
            (datum.bytes().len() - header) as u32,
        ));
    }
    (st, buf.into_bytes(), delims)
}

fn bench_filter(c: &mut Criterion) {
    let rows = 65_536;
    let (st, buf, delims) = build_input(rows);

    let mut b = ProgramBuilder::new();
    b.set_symtab(&st);
    let d = b.b_slot();
    let k = b.k_slot();
    let v = b.v_slot();
    let found = b.k_slot();
    let s = b.s_slot();
    let ks = b.k_slot();
    let out = b.k_slot();
    b.emit(Opcode::Init, &[Operand::B(d), Operand::K(k)]);
    b.emit(
        Opcode::FindSym,
        &[
            Operand::V(v),
            Operand::K(found),
            Operand::B(d),
            Operand::Sym(st.symbolize("a").unwrap()),
            Operand::K(k),
        ],
    );
    b.emit(
        Opcode::UnboxCoerceI64,
        &[Operand::S(s), Operand::K(ks), Operand::V(v), Operand::K(found)],
    );
    b.emit(
        Opcode::CmpLtI64Imm,
        &[Operand::K(out), Operand::S(s), Operand::I64(500), Operand::K(ks)],
    );
    b.emit(Opcode::RetK, &[Operand::K(out)]);
    let bc = b.build();

    let mut group = c.benchmark_group("filter");
    group.throughput(Throughput::Elements(rows as u64));
    group.bench_function("int_lt_filter", |bench| {
        bench.iter(|| {
            let mut worker = bc.clone_image();
            let mut work = delims.clone();
            let kept = run_filter(&mut worker, &buf, &mut work).unwrap();
            black_box(kept)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_filter);
criterion_main!(benches);
