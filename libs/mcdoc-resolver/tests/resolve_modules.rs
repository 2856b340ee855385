//! Cross-module resolution: imports, spreads, dispatchers, generics, cycles.

use mcdoc_diagnostics::DiagnosticKind;
use mcdoc_resolver::{resolve, FieldKey, Resolution, TypeKind, VersionGate};
use mcdoc_syntax::parse;

fn resolve_sources(sources: &[(&str, &str)]) -> Resolution {
    let modules = sources.iter().map(|(path, text)| {
        let result = parse(path, text);
        assert!(
            result.errors.is_empty(),
            "parse errors in {}: {:?}",
            path,
            result.errors
        );
        result.module
    });
    resolve(modules)
}

#[test]
fn resolves_use_across_modules() {
    let resolution = resolve_sources(&[
        ("java::util", "struct Holder { id: string }\n"),
        (
            "java::data",
            "use super::util::Holder\n\nstruct Entry { holder: Holder }\n",
        ),
    ]);
    assert!(resolution.diagnostics.is_empty(), "{:?}", resolution.diagnostics);

    let entry = resolution.graph.lookup("java::data::Entry").unwrap();
    let TypeKind::Struct(body) = &resolution.graph.node(entry).kind else {
        panic!("expected struct");
    };
    let holder = resolution.graph.lookup("java::util::Holder").unwrap();
    assert_eq!(body.fields[0].value, holder);
}

#[test]
fn unresolved_use_is_nonfatal() {
    let resolution = resolve_sources(&[(
        "java::data",
        "use super::missing::Thing\n\nstruct S { x: int }\n",
    )]);
    assert_eq!(resolution.diagnostics.len(), 1);
    assert_eq!(resolution.diagnostics[0].kind, DiagnosticKind::UnresolvedUse);
    // The struct still resolved.
    assert!(resolution.graph.lookup("java::data::S").is_some());
}

#[test]
fn unresolved_reference_becomes_unknown() {
    let resolution = resolve_sources(&[("m", "struct S { x: Missing }\n")]);
    assert_eq!(resolution.diagnostics.len(), 1);
    assert_eq!(
        resolution.diagnostics[0].kind,
        DiagnosticKind::UnresolvedReference
    );
    let s = resolution.graph.lookup("m::S").unwrap();
    let TypeKind::Struct(body) = &resolution.graph.node(s).kind else {
        panic!("expected struct");
    };
    assert_eq!(body.fields[0].value, resolution.graph.unknown());
}

#[test]
fn spread_flattens_fields_in_source_order() {
    let resolution = resolve_sources(&[(
        "m",
        "struct Base { a: int, b: int }\n\nstruct Outer { ...Base, c: int }\n",
    )]);
    assert!(resolution.diagnostics.is_empty(), "{:?}", resolution.diagnostics);
    let outer = resolution.graph.lookup("m::Outer").unwrap();
    let TypeKind::Struct(body) = &resolution.graph.node(outer).kind else {
        panic!("expected struct");
    };
    let names: Vec<&str> = body
        .fields
        .iter()
        .filter_map(|f| match &f.key {
            FieldKey::Named(n) => Some(n.as_str()),
            FieldKey::Computed(_) => None,
        })
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn spread_name_clash_last_writer_wins() {
    let resolution = resolve_sources(&[(
        "m",
        "struct Base { x: int }\n\nstruct Outer { ...Base, x: string }\n",
    )]);
    let outer = resolution.graph.lookup("m::Outer").unwrap();
    let TypeKind::Struct(body) = &resolution.graph.node(outer).kind else {
        panic!("expected struct");
    };
    assert_eq!(body.fields.len(), 1);
    let winner = resolution.graph.node(body.fields[0].value);
    assert!(
        matches!(
            winner.kind,
            TypeKind::Primitive {
                prim: mcdoc_syntax::ast::Primitive::String,
                ..
            }
        ),
        "later definition should win: {:?}",
        winner.kind
    );
}

#[test]
fn spread_gate_conjoins_with_field_gates() {
    let resolution = resolve_sources(&[(
        "m",
        "struct Base { #[since=\"1.17\"] a: int }\n\nstruct Outer { #[until=\"1.18\"] ...Base }\n",
    )]);
    assert!(resolution.diagnostics.is_empty(), "{:?}", resolution.diagnostics);
    let outer = resolution.graph.lookup("m::Outer").unwrap();
    let TypeKind::Struct(body) = &resolution.graph.node(outer).kind else {
        panic!("expected struct");
    };
    let gate: VersionGate = body.fields[0].gate;
    assert_eq!(gate.since, Some("1.17".parse().unwrap()));
    assert_eq!(gate.until, Some("1.18".parse().unwrap()));
}

#[test]
fn spread_of_non_struct_contributes_nothing() {
    let resolution = resolve_sources(&[(
        "m",
        "type NotAStruct = int\n\nstruct Outer { ...NotAStruct, x: int }\n",
    )]);
    assert!(resolution
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::TypeMismatch));
    let outer = resolution.graph.lookup("m::Outer").unwrap();
    let TypeKind::Struct(body) = &resolution.graph.node(outer).kind else {
        panic!("expected struct");
    };
    assert_eq!(body.fields.len(), 1);
    assert!(!body.open);
}

#[test]
fn spread_of_unknown_marks_struct_open() {
    let resolution = resolve_sources(&[("m", "struct Outer { ...Missing, x: int }\n")]);
    let outer = resolution.graph.lookup("m::Outer").unwrap();
    let TypeKind::Struct(body) = &resolution.graph.node(outer).kind else {
        panic!("expected struct");
    };
    assert!(body.open);
}

#[test]
fn spread_expansion_is_associative() {
    // struct X { ...Y, ...Z, f } and struct X { ...(Y+Z), f } flatten to the
    // same field list.
    let direct = resolve_sources(&[(
        "m",
        "struct Y { a: int }\nstruct Z { b: int }\n\nstruct X { ...Y, ...Z, f: int }\n",
    )]);
    let nested = resolve_sources(&[(
        "m",
        "struct Y { a: int }\nstruct Z { b: int }\nstruct YZ { ...Y, ...Z }\n\nstruct X { ...YZ, f: int }\n",
    )]);

    let names = |resolution: &Resolution| -> Vec<String> {
        let x = resolution.graph.lookup("m::X").unwrap();
        let TypeKind::Struct(body) = &resolution.graph.node(x).kind else {
            panic!("expected struct");
        };
        body.fields
            .iter()
            .filter_map(|f| match &f.key {
                FieldKey::Named(n) => Some(n.clone()),
                FieldKey::Computed(_) => None,
            })
            .collect()
    };
    assert_eq!(names(&direct), names(&nested));
    assert_eq!(names(&direct), vec!["a", "b", "f"]);
}

#[test]
fn circular_spread_is_diagnosed() {
    let resolution = resolve_sources(&[(
        "m",
        "struct A { ...B, a: int }\n\nstruct B { ...A, b: int }\n",
    )]);
    assert!(resolution
        .diagnostics
        .iter()
        .any(|d| d.message.contains("circular spread")));
}

#[test]
fn mutually_recursive_structs_resolve() {
    let resolution = resolve_sources(&[(
        "m",
        "struct Node { children: [Node], payload?: Leaf }\n\nstruct Leaf { parent?: Node }\n",
    )]);
    assert!(resolution.diagnostics.is_empty(), "{:?}", resolution.diagnostics);
    let node = resolution.graph.lookup("m::Node").unwrap();
    let TypeKind::Struct(body) = &resolution.graph.node(node).kind else {
        panic!("expected struct");
    };
    let TypeKind::Array { elem, .. } = resolution.graph.node(body.fields[0].value).kind else {
        panic!("expected array");
    };
    assert_eq!(elem, node);
}

#[test]
fn alias_chain_flattens() {
    let resolution = resolve_sources(&[(
        "m",
        "type A = B\ntype B = C\ntype C = int\n",
    )]);
    assert!(resolution.diagnostics.is_empty(), "{:?}", resolution.diagnostics);
    let a = resolution.graph.lookup("m::A").unwrap();
    let resolved = resolution.graph.resolve_alias(a).unwrap();
    assert!(matches!(
        resolution.graph.node(resolved).kind,
        TypeKind::Primitive { .. }
    ));
}

#[test]
fn circular_alias_collapses_to_unknown() {
    let resolution = resolve_sources(&[("m", "type A = B\ntype B = A\n")]);
    assert!(resolution
        .diagnostics
        .iter()
        .any(|d| d.message.contains("circular type alias")));
    let a = resolution.graph.lookup("m::A").unwrap();
    assert!(matches!(
        resolution.graph.node(a).kind,
        TypeKind::Unknown
    ));
}

#[test]
fn dispatch_statement_populates_registry() {
    let resolution = resolve_sources(&[(
        "m",
        "dispatch minecraft:chunk_generator[flat] to struct Flat { layers: [int] }\n",
    )]);
    assert!(resolution.diagnostics.is_empty(), "{:?}", resolution.diagnostics);
    let map = resolution
        .dispatchers
        .get("minecraft:chunk_generator")
        .unwrap();
    let flat = resolution.graph.lookup("m::Flat").unwrap();
    assert_eq!(map.select("flat"), Some(flat));
    assert_eq!(map.select("noise"), None);
}

#[test]
fn dispatch_fallback_key_registers_fallback() {
    let resolution = resolve_sources(&[(
        "m",
        "dispatch minecraft:loot_function[%unknown] to struct AnyFunction {}\n",
    )]);
    let map = resolution.dispatchers.get("minecraft:loot_function").unwrap();
    assert!(map.fallback.is_some());
    assert_eq!(map.select("whatever"), map.fallback);
}

#[test]
fn generic_instantiations_are_memoized() {
    let resolution = resolve_sources(&[(
        "m",
        "type Tag<V> = struct { values: [V] }\n\nstruct A { t: Tag<int> }\nstruct B { t: Tag<int>, u: Tag<string> }\n",
    )]);
    assert!(resolution.diagnostics.is_empty(), "{:?}", resolution.diagnostics);
    let a = resolution.graph.lookup("m::A").unwrap();
    let b = resolution.graph.lookup("m::B").unwrap();
    let TypeKind::Struct(a_body) = &resolution.graph.node(a).kind else {
        panic!()
    };
    let TypeKind::Struct(b_body) = &resolution.graph.node(b).kind else {
        panic!()
    };
    // Same argument list shares one instantiation; different ones do not.
    assert_eq!(a_body.fields[0].value, b_body.fields[0].value);
    assert_ne!(a_body.fields[0].value, b_body.fields[1].value);
}

#[test]
fn recursive_generic_does_not_diverge() {
    let resolution = resolve_sources(&[(
        "m",
        "type Tree<T> = struct { value: T, children: [Tree<T>] }\n\nstruct S { root: Tree<int> }\n",
    )]);
    assert!(resolution.diagnostics.is_empty(), "{:?}", resolution.diagnostics);
}

#[test]
fn union_variants_keep_gates() {
    let resolution = resolve_sources(&[(
        "m",
        "type T = (#[until=\"1.18\"] int | string)\n",
    )]);
    assert!(resolution.diagnostics.is_empty(), "{:?}", resolution.diagnostics);
    let t = resolution.graph.lookup("m::T").unwrap();
    let resolved = resolution.graph.resolve_alias(t).unwrap();
    let TypeKind::Union { variants } = &resolution.graph.node(resolved).kind else {
        panic!("expected union");
    };
    assert_eq!(variants.len(), 2);
    assert_eq!(variants[0].gate.until, Some("1.18".parse().unwrap()));
    assert!(variants[1].gate.is_open());
}

#[test]
fn constraint_on_boolean_is_diagnosed() {
    let resolution = resolve_sources(&[("m", "type T = boolean @ 0..1\n")]);
    assert!(resolution
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::ConstraintOnNonNumeric));
}

#[test]
fn string_constraint_is_a_length_range() {
    let resolution = resolve_sources(&[("m", "type Id = string @ 1..16\n")]);
    assert!(resolution.diagnostics.is_empty(), "{:?}", resolution.diagnostics);
    let id = resolution.graph.lookup("m::Id").unwrap();
    let resolved = resolution.graph.resolve_alias(id).unwrap();
    let TypeKind::Primitive { range: Some(range), .. } = &resolution.graph.node(resolved).kind
    else {
        panic!("expected constrained string");
    };
    assert_eq!(range.min, Some(1.0));
    assert_eq!(range.max, Some(16.0));
}

#[test]
fn every_struct_field_ref_is_valid() {
    let resolution = resolve_sources(&[
        (
            "java::worldgen",
            "use super::util::Holder\n\ndispatch minecraft:resource[worldgen/biome] to struct Biome {\n\ttemperature: float,\n\teffects?: Holder,\n\t...BiomeExtras,\n}\n\nstruct BiomeExtras { fancy?: boolean }\n",
        ),
        ("java::util", "struct Holder { id: string }\n"),
    ]);
    assert!(resolution.diagnostics.is_empty(), "{:?}", resolution.diagnostics);
    // No dangling references: every field points at an existing node.
    let biome = resolution.graph.lookup("java::worldgen::Biome").unwrap();
    let TypeKind::Struct(body) = &resolution.graph.node(biome).kind else {
        panic!("expected struct");
    };
    for field in &body.fields {
        assert!(field.value.index() < resolution.graph.len());
    }
    assert_eq!(body.fields.len(), 3);
}
