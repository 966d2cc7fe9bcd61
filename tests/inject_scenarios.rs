//! End-to-end offload injection tests.
//!
//! Each test parses a pipeline, runs the pass with the reference ELF backend
//! and inspects the rewritten program, the device image and the blob.

use offload::device::{ElfInspector, ObjectInspector};
use offload::ir::{Callee, Expr, Intrinsic, Stmt, Type, Visitor};
use offload::text::parse_program;
use offload::{DeviceTarget, OffloadConfig, OffloadError, OffloadPass};

/// Collects every extern call in a program, in traversal order.
#[derive(Default)]
struct ExternCalls(Vec<(String, Vec<Expr>)>);

impl Visitor for ExternCalls {
    fn visit_expr(&mut self, expr: &Expr) {
        if let Expr::Call { callee: Callee::Extern(name), args, .. } = expr {
            self.0.push((name.clone(), args.clone()));
        }
        offload::ir::visit::visit_expr_children(self, expr);
    }
}

fn extern_calls(stmt: &Stmt, name: &str) -> Vec<Vec<Expr>> {
    let mut calls = ExternCalls::default();
    calls.visit_stmt(stmt);
    calls.0.into_iter().filter(|(n, _)| n == name).map(|(_, args)| args).collect()
}

fn struct_fields(expr: &Expr) -> &[Expr] {
    match expr {
        Expr::Call { callee: Callee::Intrinsic(Intrinsic::MakeStruct), args, .. } => args,
        other => panic!("expected make_struct, got {other}"),
    }
}

fn uint32_literal(expr: &Expr) -> u64 {
    match expr {
        Expr::UIntImm { value, ty } if *ty == Type::uint(32) => *value,
        other => panic!("expected a resolved uint32 offset, got {other}"),
    }
}

fn run(text: &str) -> offload::Injected {
    let _ = env_logger::builder().is_test(true).try_init();
    let program = parse_program(text).unwrap();
    OffloadPass::default().run(program.body).unwrap()
}

const BRIGHTEN: &str = "
pipeline brighten(k: uint8, input: buffer<uint8, 1>, output: buffer<uint8, 1>) {
  for<hexagon> (x, 0, output.extent.0) {
    output[x] = (input[x] + k)
  }
}";

#[test]
fn single_region_becomes_checked_remote_run() {
    let injected = run(BRIGHTEN);

    let Stmt::Block(stmts) = &injected.body else { panic!("expected block, got\n{}", injected.body) };
    assert_eq!(stmts.len(), 2);
    let Stmt::LetStmt { name, body, .. } = &stmts[1] else { panic!("expected call site") };
    assert_eq!(name, "remote_run_result$0");
    assert!(matches!(**body, Stmt::Assert { .. }));

    let calls = extern_calls(&injected.body, "remote_run");
    assert_eq!(calls.len(), 1);
    let args = &calls[0];
    assert_eq!(args[2], Expr::string("offload_x"));

    // input, k, output.extent.0 | output
    let in_sizes = struct_fields(&args[3]);
    assert_eq!(in_sizes, [Expr::uint(8, 64), Expr::uint(1, 64), Expr::uint(4, 64), Expr::uint(0, 64)]);
    assert_eq!(struct_fields(&args[4])[0], Expr::var("input.buffer", Type::handle()));
    assert_eq!(struct_fields(&args[5]), [Expr::int(1), Expr::int(0), Expr::int(0)]);
    assert_eq!(struct_fields(&args[6]), [Expr::uint(8, 64), Expr::uint(0, 64)]);
    assert_eq!(struct_fields(&args[7]), [Expr::var("output.buffer", Type::handle())]);
    assert_eq!(struct_fields(&args[8]), [Expr::int(2)]);

    let function = injected.image.function("offload_x").unwrap();
    let names: Vec<_> = function.args.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["input", "k", "output.extent.0", "output"]);
}

#[test]
fn two_dimensional_input_with_scalar() {
    let injected = run("
pipeline scale(in: buffer<uint8, 2>, k: uint8, out: buffer<uint8, 2>) {
  for<hexagon> (y, 0, 16) {
    for (x, 0, 16) {
      out[x, y] = (in[x, y] * k)
    }
  }
}");

    assert_eq!(injected.image.len(), 1);
    let function = injected.image.function("offload_y").unwrap();
    let names: Vec<_> = function.args.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["in", "k", "out"]);
    assert_eq!(function.args[0].dimensions, 2);

    let Stmt::Block(stmts) = &injected.body else { panic!("expected block, got\n{}", injected.body) };
    let names: Vec<_> = stmts
        .iter()
        .map(|s| match s {
            Stmt::LetStmt { name, .. } => name.as_str(),
            other => panic!("unexpected statement {other}"),
        })
        .collect();
    assert_eq!(names, ["init_result$0", "remote_run_result$0"]);
    assert_eq!(extern_calls(&injected.body, "remote_initialize").len(), 1);

    let runs = extern_calls(&injected.body, "remote_run");
    assert_eq!(runs.len(), 1);
    let args = &runs[0];
    assert_eq!(struct_fields(&args[3]), [Expr::uint(8, 64), Expr::uint(1, 64), Expr::uint(0, 64)]);
    assert_eq!(
        struct_fields(&args[4]),
        [Expr::var("in.buffer", Type::handle()), Expr::make_struct(vec![Expr::var("k", Type::uint(8))])]
    );
    assert_eq!(struct_fields(&args[5]), [Expr::int(1), Expr::int(0)]);
    assert_eq!(struct_fields(&args[6]), [Expr::uint(8, 64), Expr::uint(0, 64)]);
    assert_eq!(struct_fields(&args[7]), [Expr::var("out.buffer", Type::handle())]);
    assert_eq!(struct_fields(&args[8]), [Expr::int(2)]);
}

#[test]
fn region_named_like_runtime_initializer() {
    let injected = run("
pipeline clash(n: int32, out: buffer<int32, 1>) {
  for<hexagon> (init_runtime, 0, n) {
    out[init_runtime] = 1
  }
}");
    assert!(injected.image.function("offload_init_runtime").is_some());

    let blob = injected.device_code.expect("device code");
    let sections = ElfInspector.sections(blob.bytes()).unwrap();
    let offset_of = |name: &str| sections.iter().find(|s| s.name == name).map(|s| s.offset).unwrap();

    let run_args = &extern_calls(&injected.body, "remote_run")[0];
    assert_eq!(uint32_literal(&run_args[1]), offset_of(".text.offload_init_runtime_argv"));
    let init_args = &extern_calls(&injected.body, "remote_initialize")[0];
    assert_eq!(uint32_literal(&init_args[3]), offset_of(".text.hexagon_init_runtime"));
}

#[test]
fn region_named_like_another_argv_entry_is_rejected() {
    let program = parse_program("
pipeline argv(n: int32) {
  for<hexagon> (x, 0, n) {
    f(x)
  }
  for<hexagon> (x_argv, 0, n) {
    g(x_argv)
  }
}")
    .unwrap();
    let err = OffloadPass::default().run(program.body).unwrap_err();
    assert!(matches!(err, OffloadError::DeviceCompile(_)));
    assert!(err.to_string().contains("function name collides with argv entry of offload_x"), "{err}");
}

#[test]
fn offsets_match_compiled_sections() {
    let injected = run(BRIGHTEN);
    let blob = injected.device_code.expect("device code");
    let sections = ElfInspector.sections(blob.bytes()).unwrap();
    let offset_of = |name: &str| sections.iter().find(|s| s.name == name).map(|s| s.offset).unwrap();

    let run_args = &extern_calls(&injected.body, "remote_run")[0];
    assert_eq!(uint32_literal(&run_args[1]), offset_of(".text.offload_x_argv"));

    let init_args = &extern_calls(&injected.body, "remote_initialize")[0];
    assert_eq!(init_args[2], Expr::uint(blob.bytes().len() as u64, 64));
    assert_eq!(uint32_literal(&init_args[3]), offset_of(".text.hexagon_init_runtime"));

    assert_eq!(blob.offset_of(".text.offload_x_argv").map(u64::from), Some(offset_of(".text.offload_x_argv")));
    assert_eq!(injected.stats.placeholders_resolved, 2);
    assert_eq!(injected.stats.device_code_bytes, blob.bytes().len());
}

#[test]
fn regions_share_state_and_initialization() {
    let injected = run("
pipeline two(a: buffer<float32, 1>, b: buffer<float32, 1>, n: int32) {
  for<hexagon> (x, 0, n) {
    a[x] = 0.5f
  }
  for<hexagon> (y, 0, n) {
    b[y] = a[y]
  }
}");

    assert_eq!(injected.image.len(), 2);
    assert_eq!(extern_calls(&injected.body, "remote_initialize").len(), 1);

    let runs = extern_calls(&injected.body, "remote_run");
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0][0], runs[1][0], "state cell differs between call sites");
    assert_ne!(runs[0][1], runs[1][1]);
    assert_eq!(runs[1][2], Expr::string("offload_y"));

    let Stmt::Block(stmts) = &injected.body else { panic!("expected block") };
    let names: Vec<_> = stmts
        .iter()
        .map(|s| match s {
            Stmt::LetStmt { name, .. } => name.as_str(),
            other => panic!("unexpected statement {other}"),
        })
        .collect();
    assert_eq!(names, ["init_result$0", "remote_run_result$0", "remote_run_result$1"]);
    assert_eq!(injected.stats.regions_offloaded, 2);
}

#[test]
fn read_and_written_buffer_is_inout() {
    let injected = run("
pipeline accumulate(acc: buffer<int32, 1>, input: buffer<int32, 1>) {
  for<hexagon> (x, 0, 64) {
    acc[x] = (acc[x] + input[x])
  }
}");
    let args = &extern_calls(&injected.body, "remote_run")[0];
    assert_eq!(struct_fields(&args[5]), [Expr::int(1)]);
    assert_eq!(struct_fields(&args[7]), [Expr::var("acc.buffer", Type::handle())]);
    assert_eq!(struct_fields(&args[8]), [Expr::int(3)]);
}

#[test]
fn region_inside_host_loop_captures_outer_variable() {
    let injected = run("
pipeline rows(img: buffer<uint16, 2>) {
  parallel for (y, 0, img.extent.1) {
    for<hexagon> (x, 0, img.extent.0) {
      img[x, y] = (uint16)0
    }
  }
}");
    let Stmt::Block(stmts) = &injected.body else { panic!("expected block") };
    assert!(matches!(stmts[1], Stmt::For { ref name, .. } if name == "y"));

    let function = injected.image.function("offload_x").unwrap();
    let names: Vec<_> = function.args.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["img.extent.0", "y", "img"]);
    assert_eq!(function.args[2].dimensions, 2);
}

#[test]
fn program_without_regions_is_untouched() {
    let text = "
pipeline host_only(out: buffer<int32, 1>) {
  for (x, 0, 8) {
    out[x] = x
  }
}";
    let program = parse_program(text).unwrap();
    let injected = OffloadPass::default().run(program.body.clone()).unwrap();
    assert_eq!(injected.body, program.body);
    assert!(injected.device_code.is_none());
    assert!(injected.image.is_empty());
    assert_eq!(injected.stats.placeholders_reserved, 0);
}

#[test]
fn same_region_name_twice_is_internal() {
    let program = parse_program("
pipeline twice(n: int32) {
  for<hexagon> (x, 0, n) {
    f(x)
  }
  for<hexagon> (x, 0, n) {
    g(x)
  }
}")
    .unwrap();
    let err = OffloadPass::default().run(program.body).unwrap_err();
    assert!(err.is_internal());
    assert_eq!(err.symbol(), Some(".text.offload_x_argv"));
}

#[test]
fn unsupported_target_is_reported() {
    let program = parse_program(BRIGHTEN).unwrap();
    let config = OffloadConfig { target: DeviceTarget::hexagon_remote(), ..OffloadConfig::default() };
    let err = OffloadPass::new(config).run(program.body).unwrap_err();
    assert!(matches!(err, OffloadError::DeviceCompile(_)));
    assert!(!err.is_internal());
}

#[test]
fn many_arguments_spill_to_the_stack() {
    let injected = run("
pipeline wide(a: int32, b: int32, c: int32, d: int32, e: int32, f: int32, g: int32, h: float64, out: buffer<int32, 1>) {
  for<hexagon> (x, 0, 4) {
    out[x] = (((((((a + b) + c) + d) + e) + f) + g) + (int32)h)
  }
}");
    let function = injected.image.function("offload_x").unwrap();
    assert_eq!(function.args.len(), 9);
    assert!(injected.device_code.is_some());
}
