//! Encode/decode round-trip properties.

use proptest::prelude::*;

use sift_ion::{read_datum, Buffer, Datum, SymbolTable};

/// A strategy producing arbitrary scalar datums.
fn scalar() -> impl Strategy<Value = Datum<'static>> {
    prop_oneof![
        Just(Datum::null()),
        any::<bool>().prop_map(Datum::bool),
        any::<i64>().prop_map(Datum::int),
        any::<u64>().prop_map(Datum::uint),
        any::<f64>().prop_map(Datum::float),
        "[a-z]{0,12}".prop_map(|s| Datum::string(&s)),
        proptest::collection::vec(any::<u8>(), 0..24).prop_map(|b| Datum::blob(&b)),
    ]
}

proptest! {
    #[test]
    fn scalar_roundtrip(datum in scalar()) {
        let mut st = SymbolTable::new();
        let mut buf = Buffer::new();
        datum.encode(&mut buf, &mut st);
        let bytes = buf.into_bytes();

        // encode(decode(b)) == b with an unchanged symbol table.
        let mut read_st = SymbolTable::new();
        let (decoded, rest) = read_datum(&mut read_st, &bytes).unwrap();
        prop_assert!(rest.is_empty());
        let decoded = decoded.unwrap();
        prop_assert_eq!(decoded.bytes(), &bytes[..]);
        prop_assert!(decoded == datum);
    }

    #[test]
    fn struct_resymbolisation_preserves_equality(
        labels in proptest::collection::btree_set("[a-z]{1,8}", 1..6),
        values in proptest::collection::vec(any::<i64>(), 6),
        shift in 0usize..4,
    ) {
        // Build the struct against a source table with `shift` extra
        // symbols so its ids disagree with the destination table.
        let mut src = SymbolTable::new();
        for i in 0..shift {
            src.intern(&format!("shift{i}"));
        }
        let fields: Vec<(&str, Datum<'_>)> = labels
            .iter()
            .zip(&values)
            .map(|(l, &v)| (l.as_str(), Datum::int(v)))
            .collect();
        let datum = Datum::new_struct(&mut src, &fields);

        let mut dst = SymbolTable::new();
        let mut out = Buffer::new();
        datum.encode(&mut out, &mut dst);
        let bytes = out.into_bytes();

        let mut read_st = dst.clone();
        let (reread, _) = read_datum(&mut read_st, &bytes).unwrap();
        prop_assert!(reread.unwrap() == datum);
    }

    #[test]
    fn size_of_agrees_with_header_plus_body(value in any::<i64>()) {
        let datum = Datum::int(value);
        let bytes = datum.bytes();
        let size = sift_ion::size_of(bytes).unwrap();
        let header = sift_ion::header_size_of(bytes).unwrap();
        let (body, _) = sift_ion::contents(bytes).unwrap();
        prop_assert_eq!(size, header + body.len());
        prop_assert_eq!(size, bytes.len());
    }
}
