//! End-to-end scenarios through the public pipeline API.

use vesperc::models::ast::AstKind;
use vesperc::models::diagnostics::DiagnosticCode;
use vesperc::services::codegen;
use vesperc::{check_source, FileId, PipelineOptions};

fn check(src: &str) -> vesperc::services::pipeline::CheckedUnit {
    check_source(src, FileId(0), &PipelineOptions::default())
}

#[test]
fn valid_integer_range_literal_resolves() {
    let unit = check("let x: i8 = 127;");
    assert!(!unit.has_errors(), "{:?}", unit.diagnostics);

    let AstKind::Program { decls } = &unit.program.kind else {
        unreachable!()
    };
    assert_eq!(
        decls[0].resolved_type.as_ref().map(|t| t.display_name()),
        Some("i8".to_string())
    );
}

#[test]
fn out_of_range_literal_reports_invalid_literal() {
    let unit = check("let x: i8 = 128;");
    let diag = unit
        .diagnostics
        .iter()
        .find(|d| d.code == DiagnosticCode::InvalidLiteral)
        .expect("expected INVALID_LITERAL");
    assert_eq!(diag.message, "Integer literal 128 exceeds range of type i8");
}

#[test]
fn ffi_transfer_conflict_names_both_annotations() {
    let unit = check("extern fn f(#[transfer_full] #[borrowed] p: *mut u8);");
    let diag = unit
        .diagnostics
        .iter()
        .find(|d| d.code == DiagnosticCode::ConflictingAnnotations)
        .expect("expected CONFLICTING_ANNOTATIONS");
    assert!(diag.message.contains("transfer_full"));
    assert!(diag.message.contains("borrowed"));
}

#[test]
fn undefined_identifier_suggests_nearest_name() {
    let unit = check("fn helper(v: string) {}\nfn main() { let value = \"x\"; helper(valuee); }");
    let diag = unit
        .diagnostics
        .iter()
        .find(|d| d.code == DiagnosticCode::UndefinedSymbol)
        .expect("expected UNDEFINED_SYMBOL");
    assert_eq!(diag.suggestion.as_deref(), Some("value"));
}

#[test]
fn multiline_string_normalization_strips_common_indent() {
    let unit = check("let banner = \"\n    hello\n    world\n  \";");
    assert!(!unit.has_errors(), "{:?}", unit.diagnostics);

    let AstKind::Program { decls } = &unit.program.kind else {
        unreachable!()
    };
    let AstKind::LetDecl { init, .. } = &decls[0].kind else {
        unreachable!()
    };
    let AstKind::StringLiteral { value, .. } = &init.kind else {
        unreachable!()
    };
    assert_eq!(value, "\nhello\nworld\n");
}

#[test]
fn never_type_dce_removes_successors_of_panic_block() {
    let unit = check("fn f() { panic(\"x\"); log(\"unreachable\"); }");
    assert!(!unit.has_errors(), "{:?}", unit.diagnostics);

    let (module, diags) = codegen::lower_program(&unit.program, &unit.const_values);
    assert!(diags.is_empty(), "{diags:?}");

    let cfg = &module.functions[0].cfg;
    let entry = cfg.block(cfg.entry);
    assert!(entry.never_terminating);
    assert!(entry.successors.is_empty());
    assert!(
        cfg.blocks.iter().any(|b| b.is_unreachable),
        "the log call's block must be marked unreachable"
    );
    assert!(cfg.edges_are_symmetric());
}

#[test]
fn annotated_program_compiles_end_to_end() {
    let src = r#"
import "runtime.vsp";

pub const VERSION: i32 = 3;
const BUFFER_BYTES: usize = 16 * sizeof(u64);

#[ownership(gc)]
struct Connection {
    #[ownership(pinned)]
    handle: *mut u8,
    bytes_sent: u64
}

enum Status { Idle, Active, Closed = 9 }

extern fn send_raw(#[borrowed] data: []u8, fd: i32) -> i32;

fn describe(status: Status) {
    match status {
        Idle => log("idle"),
        Active => log("active"),
        _ => log("closed")
    }
}

fn pump(buffers: [][]u8, fd: i32) -> i32 {
    let mut total: i32 = 0;
    for buffer in buffers {
        total = total + send_raw(buffer, fd);
    }
    return total;
}
"#;
    let unit = check(src);
    assert!(!unit.has_errors(), "{:?}", unit.diagnostics);

    let (module, diags) = codegen::lower_program(&unit.program, &unit.const_values);
    assert!(diags.is_empty(), "{diags:?}");
    assert_eq!(module.consts.len(), 2);
    assert_eq!(module.functions.len(), 2);
}
