// Closing the loop on the host program. Once every placeholder has an offset, the runtime
// initialization call is sequenced in front of the rewritten program and every placeholder
// variable, including the one the init call itself uses, is replaced with its uint32 literal
// through the generic substitution pass. The init call hands the runtime the address of the
// module state cell, the embedded device code and its length, and the offset of the runtime
// initializer inside that code. Any placeholder still referenced afterwards is an internal
// error.

use super::call_site::checked_call;
use super::placeholder::PlaceholderRegistry;
use super::runtime::{INIT_RESULT_PREFIX, REMOTE_INITIALIZE};
use crate::core::{OffloadError, OffloadResult, OffloadSession};
use crate::ir::{free_references, substitute, EmbeddedBuffer, Expr, Stmt};
use std::sync::Arc;

/// `remote_initialize(&state, &code[0], size, init_offset)` with its result check.
pub fn init_call(
    session: &mut OffloadSession,
    state_cell: &Arc<EmbeddedBuffer>,
    code: &Arc<EmbeddedBuffer>,
    init_offset: Expr,
) -> Stmt {
    let call = REMOTE_INITIALIZE.call(vec![
        Expr::address_of(Expr::load_embedded(state_cell, 0)),
        Expr::address_of(Expr::load_embedded(code, 0)),
        Expr::uint(code.len() as u64, 64),
        init_offset,
    ]);
    checked_call(session, INIT_RESULT_PREFIX, call)
}

/// Prepend `init` to `program` and substitute every resolved placeholder.
pub fn backpatch(program: Stmt, registry: &PlaceholderRegistry, init: Stmt) -> OffloadResult<Stmt> {
    if let Some(missing) = registry.unresolved().next() {
        return Err(OffloadError::UnresolvedPlaceholder { symbol: missing.to_string() });
    }

    let patched = substitute(&registry.substitutions(), Stmt::block([init, program]));

    if let Some(symbol) = free_references(&patched, registry.names()).into_iter().next() {
        return Err(OffloadError::PlaceholderRemains { symbol });
    }
    Ok(patched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Callee, Type};

    fn cells() -> (Arc<EmbeddedBuffer>, Arc<EmbeddedBuffer>) {
        let state = Arc::new(EmbeddedBuffer::zeroed("offload_module_state", Type::handle()));
        let code = Arc::new(EmbeddedBuffer { name: "code".into(), ty: Type::uint(8), data: vec![0x7f, b'E', b'L', b'F'] });
        (state, code)
    }

    #[test]
    fn init_is_sequenced_first_and_patched() {
        let mut registry = PlaceholderRegistry::new();
        let argv = registry.reserve(".text.offload_f_argv").unwrap();
        let init_offset = registry.reserve(".text.hexagon_init_runtime").unwrap();
        registry.resolve(".text.offload_f_argv", 96).unwrap();
        registry.resolve(".text.hexagon_init_runtime", 160).unwrap();

        let (state, code) = cells();
        let mut session = OffloadSession::new();
        let init = init_call(&mut session, &state, &code, init_offset);
        let program = Stmt::Evaluate(Expr::call_extern(Type::int(32), "use", vec![argv]));

        let Stmt::Block(stmts) = backpatch(program, &registry, init).unwrap() else { panic!("expected block") };
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[1], Stmt::Evaluate(Expr::call_extern(Type::int(32), "use", vec![Expr::uint(96, 32)])));

        let Stmt::LetStmt { name, value, .. } = &stmts[0] else { panic!("expected init first") };
        assert_eq!(name, "init_result$0");
        let Expr::Call { callee: Callee::Extern(callee), args, .. } = value else { panic!() };
        assert_eq!(callee, "remote_initialize");
        assert_eq!(args[2], Expr::uint(4, 64));
        assert_eq!(args[3], Expr::uint(160, 32));
    }

    #[test]
    fn refuses_unresolved_registry() {
        let mut registry = PlaceholderRegistry::new();
        let offset = registry.reserve(".text.hexagon_init_runtime").unwrap();
        let (state, code) = cells();
        let init = init_call(&mut OffloadSession::new(), &state, &code, offset);
        let err = backpatch(Stmt::Evaluate(Expr::int(0)), &registry, init).unwrap_err();
        assert!(matches!(err, OffloadError::UnresolvedPlaceholder { .. }));
    }

    #[test]
    fn shadowed_placeholder_survives_and_is_reported() {
        let mut registry = PlaceholderRegistry::new();
        let p = registry.reserve(".text.p").unwrap();
        registry.resolve(".text.p", 8).unwrap();
        // A binding of the same name hides the placeholder from substitution.
        let program = Stmt::let_stmt(".text.p", Expr::uint(1, 32), Stmt::Evaluate(p));
        let err = backpatch(program, &registry, Stmt::Evaluate(Expr::int(0))).unwrap_err();
        assert!(matches!(err, OffloadError::PlaceholderRemains { ref symbol } if symbol == ".text.p"));
    }
}
