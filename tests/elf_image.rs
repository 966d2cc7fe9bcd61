//! Tests of the simulator device image compiler, read back with the object crate.

use object::{Object, ObjectSection, ObjectSymbol, RelocationKind, RelocationTarget};
use offload::device::{Argument, ArgumentKind, DeviceCompiler, DeviceFunction, DeviceImage, ElfImageCompiler, Linkage};
use offload::ir::{Expr, Stmt, Type};
use offload::DeviceTarget;

fn image() -> DeviceImage {
    let mut image = DeviceImage::new("hexagon", DeviceTarget::simulator());
    let x = Expr::var("x", Type::int(32));
    image.append(DeviceFunction {
        name: "offload_x".into(),
        args: vec![
            Argument::new("input", ArgumentKind::InputBuffer, Type::uint(8), 1),
            Argument::new("scale", ArgumentKind::InputScalar, Type::float(32), 0),
            Argument::new("output", ArgumentKind::OutputBuffer, Type::uint(8), 1),
        ],
        body: Stmt::store("output", Expr::load(Type::uint(8), "input", vec![x.clone()]), vec![x]),
        linkage: Linkage::External,
    });
    image.append(DeviceFunction {
        name: "offload_y".into(),
        args: Vec::new(),
        body: Stmt::Evaluate(Expr::int(0)),
        linkage: Linkage::Internal,
    });
    image
}

#[test]
fn every_function_gets_entry_and_argv_sections() {
    let bytes = ElfImageCompiler::new().compile(&image()).unwrap();
    let file = object::File::parse(&*bytes).unwrap();

    for name in [
        ".text.offload_x",
        ".text.offload_x_argv",
        ".text.offload_y",
        ".text.offload_y_argv",
        ".text.hexagon_init_runtime",
    ] {
        let section = file.section_by_name(name).unwrap_or_else(|| panic!("missing section {name}"));
        assert!(section.size() > 0, "{name} is empty");
    }

    // Entries report success: xor eax, eax; ret
    let entry = file.section_by_name(".text.offload_x").unwrap();
    assert_eq!(entry.data().unwrap(), [0x31, 0xC0, 0xC3]);
}

#[test]
fn symbols_follow_linkage() {
    let bytes = ElfImageCompiler::new().compile(&image()).unwrap();
    let file = object::File::parse(&*bytes).unwrap();

    let exported = file.symbol_by_name("offload_x").unwrap();
    assert!(exported.is_definition());
    assert!(exported.is_global());

    let internal = file.symbol_by_name("offload_y").unwrap();
    assert!(internal.is_definition());
    assert!(internal.is_local());

    // argv thunks are what the runtime calls, so they are always exported
    assert!(file.symbol_by_name("offload_y_argv").unwrap().is_global());
    assert!(file.symbol_by_name("hexagon_init_runtime").unwrap().is_global());
}

#[test]
fn argv_thunk_calls_its_entry() {
    let bytes = ElfImageCompiler::new().compile(&image()).unwrap();
    let file = object::File::parse(&*bytes).unwrap();

    let thunk = file.section_by_name(".text.offload_x_argv").unwrap();
    let code = thunk.data().unwrap();
    assert_eq!(code.last(), Some(&0xC3));

    let relocations: Vec<_> = thunk.relocations().collect();
    assert_eq!(relocations.len(), 1);
    let (offset, relocation) = &relocations[0];
    assert_eq!(relocation.kind(), RelocationKind::Relative);
    assert_eq!(relocation.addend(), -4);
    // The displacement follows the call opcode.
    assert_eq!(code[*offset as usize - 1], 0xE8);

    let RelocationTarget::Symbol(index) = relocation.target() else { panic!("expected symbol target") };
    assert_eq!(file.symbol_by_index(index).unwrap().name().unwrap(), "offload_x");
}

#[test]
fn image_from_other_target_is_rejected() {
    let mut image = image();
    image.target = DeviceTarget::hexagon_remote();
    let err = ElfImageCompiler::new().compile(&image).unwrap_err();
    assert_eq!(err.to_string(), "No device backend for target hexagon-32-remote");
}
