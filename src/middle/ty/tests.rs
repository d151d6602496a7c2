use super::{TypeContext, TypeKind, is_arithmetic_pair, types_equal};
use crate::frontend::{intern::InternedSymbol, syntax::MetaKind};

fn sample_types(types: &mut TypeContext) -> Vec<super::Type> {
    let int = types.int();
    let float = types.intern_meta(MetaKind::Float);
    let matrix = types.array_of(int.clone(), &[3, 4]);
    let point = types.structure(
        InternedSymbol::new("Point"),
        vec![
            (InternedSymbol::new("x"), int.clone()),
            (InternedSymbol::new("y"), float.clone()),
        ],
    );
    let function = types.function(vec![int.clone(), matrix.clone()], float.clone());

    vec![
        types.unit(),
        types.any(),
        types.never(),
        int,
        float,
        matrix,
        point,
        function,
    ]
}

#[test]
fn equality_is_reflexive() {
    let mut types = TypeContext::new();

    for ty in sample_types(&mut types) {
        assert!(types_equal(&ty, &ty, false), "{ty:?}");
        assert!(types_equal(&ty, &ty, true), "{ty:?}");
    }
}

#[test]
fn wildcards_equal_everything() {
    let mut types = TypeContext::new();
    let any = types.any();
    let never = types.never();

    for ty in sample_types(&mut types) {
        for strict in [false, true] {
            assert!(types_equal(&any, &ty, strict));
            assert!(types_equal(&ty, &any, strict));
            assert!(types_equal(&never, &ty, strict));
            assert!(types_equal(&ty, &never, strict));
        }
    }
}

#[test]
fn meta_types_are_singletons() {
    let mut types = TypeContext::new();
    let a = types.intern_meta(MetaKind::Int);
    let b = types.intern_type(TypeKind::Meta(MetaKind::Int));

    assert!(std::rc::Rc::ptr_eq(&a.0, &b.0));
    assert!(!types_equal(&a, &types.intern_meta(MetaKind::Float), false));
}

#[test]
fn array_length_only_matters_when_strict() {
    let mut types = TypeContext::new();
    let int = types.int();
    let short = types.array_of(int.clone(), &[2]);
    let long = types.array_of(int.clone(), &[10]);
    let matrix = types.array_of(int, &[2, 2]);

    assert!(types_equal(&short, &long, false));
    assert!(!types_equal(&short, &long, true));
    assert!(!types_equal(&short, &matrix, false));
}

#[test]
fn structs_compare_by_member_types() {
    let mut types = TypeContext::new();
    let int = types.int();
    let float = types.intern_meta(MetaKind::Float);

    let a = types.structure(
        InternedSymbol::new("A"),
        vec![(InternedSymbol::new("x"), int.clone())],
    );
    let b = types.structure(
        InternedSymbol::new("B"),
        vec![(InternedSymbol::new("renamed"), int)],
    );
    let c = types.structure(
        InternedSymbol::new("C"),
        vec![(InternedSymbol::new("x"), float)],
    );

    assert!(types_equal(&a, &b, false));
    assert!(!types_equal(&a, &c, false));
}

#[test]
fn sizes_and_offsets() {
    let mut types = TypeContext::new();
    let int = types.int();
    let pair = types.array_of(int.clone(), &[2]);
    let record = types.structure(
        InternedSymbol::new("Record"),
        vec![
            (InternedSymbol::new("id"), int.clone()),
            (InternedSymbol::new("scores"), pair),
            (InternedSymbol::new("total"), int.clone()),
        ],
    );
    let table = types.array_of(record.clone(), &[3, 2]);

    assert_eq!(int.size_of(), Some(4));
    assert_eq!(record.size_of(), Some(16));
    assert_eq!(table.size_of(), Some(96));
    assert_eq!(record.offset_of(InternedSymbol::new("total")), Some(12));
    assert_eq!(record.offset_of(InternedSymbol::new("missing")), None);
    assert!(record.member(InternedSymbol::new("scores")).is_some());
}

#[test]
fn oversized_types_have_no_size() {
    let mut types = TypeContext::new();
    let int = types.int();
    let huge = types.array_of(int.clone(), &[100_000, 100_000]);
    let holder = types.structure(
        InternedSymbol::new("Holder"),
        vec![
            (InternedSymbol::new("cells"), huge.clone()),
            (InternedSymbol::new("count"), int),
        ],
    );

    assert_eq!(huge.size_of(), None);
    assert_eq!(holder.size_of(), None);
    assert_eq!(holder.offset_of(InternedSymbol::new("count")), None);
    assert_eq!(holder.offset_of(InternedSymbol::new("cells")), Some(0));
}

#[test]
fn descending_drops_the_outer_dimension() {
    let mut types = TypeContext::new();
    let int = types.int();
    let cube = types.array_of(int.clone(), &[2, 3, 4]);

    let plane = types.descend(&cube);
    assert_eq!(plane.to_string(), types.array_of(int.clone(), &[3, 4]).to_string());

    let row = types.descend(&plane);
    let element = types.descend(&row);
    assert!(std::rc::Rc::ptr_eq(&element.0, &int.0));

    assert!(types.descend(&int).is_error());
}

#[test]
fn nested_array_types_are_flattened() {
    let mut types = TypeContext::new();
    let int = types.int();
    let row = types.array_of(int.clone(), &[4]);
    let matrix = types.array_of(row, &[3]);

    assert_eq!(matrix, types.array_of(int, &[3, 4]));
}

#[test]
fn arithmetic_requires_matching_scalars() {
    let mut types = TypeContext::new();
    let int = types.int();
    let float = types.intern_meta(MetaKind::Float);
    let array = types.array_of(int.clone(), &[2]);

    assert!(is_arithmetic_pair(&int, &int));
    assert!(!is_arithmetic_pair(&int, &float));
    assert!(!is_arithmetic_pair(&array, &array));
    assert!(is_arithmetic_pair(&types.never(), &float));
}

#[test]
fn display() {
    let mut types = TypeContext::new();
    let int = types.int();
    let matrix = types.array_of(int.clone(), &[3, 4]);
    let function = types.function(vec![int.clone()], int.clone());
    let point = types.structure(
        InternedSymbol::new("Point"),
        vec![(InternedSymbol::new("a"), int)],
    );

    assert_eq!((*matrix).to_string(), "int[3][4]");
    assert_eq!((*function).to_string(), "fn(int) -> int");
    assert_eq!((*point).to_string(), "struct Point { int a; }");
}
