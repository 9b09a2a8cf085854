//! Module Driver: topological root compilation, module-initialiser
//! finalisation, IR verification, and object/bitcode/disassembly emission.
//! Grounded in `why_lib`'s top-level compile-then-verify-then-emit
//! sequence, generalised with the dependency-ordered root walk a
//! multi-root program tree needs that `why_lib`'s single-module programs
//! didn't.

use std::collections::HashSet;
use std::path::Path;

use inkwell::targets::{CodeModel, FileType, RelocMode, Target, TargetMachine};
use log::{debug, error, info, warn};

use crate::context::CodegenContext;
use crate::error::{CodegenError, CodegenResult, EmissionFailed, InvariantViolated, VerificationFailed};
use crate::position::Position;
use crate::tree::{Root, RootNode};

/// Depth-first walks `roots` in dependency order (dependencies before
/// dependents), compiling each unique root exactly once. Cycle-guarded by a
/// set of already-visited root identifiers, matching the "cycle-guard by a
/// set of visited root identifiers" contract.
pub fn compile_roots<'ctx>(ctx: &CodegenContext<'ctx>, roots: &[RootNode]) -> CodegenResult<()> {
    let by_id: std::collections::HashMap<&str, &RootNode> = roots.iter().map(|r| (r.id.as_str(), r)).collect();
    let mut visited = HashSet::new();
    for root in roots {
        visit_root(ctx, root, &by_id, &mut visited)?;
    }
    Ok(())
}

fn visit_root<'ctx>(
    ctx: &CodegenContext<'ctx>,
    root: &RootNode,
    by_id: &std::collections::HashMap<&str, &RootNode>,
    visited: &mut HashSet<String>,
) -> CodegenResult<()> {
    if visited.contains(&root.id) {
        return Ok(());
    }
    visited.insert(root.id.clone());

    for dependency in &root.depends_on {
        if let Some(dep_root) = by_id.get(dependency.as_str()) {
            visit_root(ctx, dep_root, by_id, visited)?;
        }
    }

    debug!("compiling root '{}'", root.id);
    compile_root(ctx, root)
}

fn compile_root<'ctx>(ctx: &CodegenContext<'ctx>, root: &RootNode) -> CodegenResult<()> {
    match &root.root {
        Root::Function(function) => {
            let statement = crate::tree::Statement {
                position: function.position.clone(),
                kind: crate::tree::StatementKind::FunctionDefinition(function.clone()),
            };
            use crate::node::CodeGen;
            statement.codegen(ctx)?;
            Ok(())
        }
        Root::Class { descriptor, methods } => {
            crate::class_emit::register_class(ctx, descriptor.clone());
            let _ = ctx.class_struct_type(&descriptor.name);
            for method in methods {
                let statement = crate::tree::Statement {
                    position: method.position.clone(),
                    kind: crate::tree::StatementKind::FunctionDefinition(method.clone()),
                };
                use crate::node::CodeGen;
                statement.codegen(ctx)?;
            }
            crate::class_emit::finish_class_codegen(ctx, descriptor);
            Ok(())
        }
        Root::GlobalVariable { name, ty, initializer } => {
            let statement = crate::tree::Statement {
                position: Position::unknown(),
                kind: crate::tree::StatementKind::VariableDefinition {
                    name: name.clone(),
                    ty: ty.clone(),
                    initializer: initializer.clone(),
                    is_global: true,
                },
            };
            use crate::node::CodeGen;
            statement.codegen(ctx)?;
            Ok(())
        }
        Root::Enumeration { name, members } => {
            let statement = crate::tree::Statement {
                position: Position::unknown(),
                kind: crate::tree::StatementKind::Enumeration { name: name.clone(), members: members.clone() },
            };
            use crate::node::CodeGen;
            statement.codegen(ctx)?;
            Ok(())
        }
    }
}

/// Closes the module-initialiser (if one was ever created) with `ret void`
/// and registers it in `llvm.global_ctors` at priority 65535 — the
/// lowest-priority slot reserved for user static initialisers, reproduced
/// here as the same numeric literal the original backend uses.
pub fn finalize_module_initializer<'ctx>(ctx: &CodegenContext<'ctx>) {
    let Some(init_fn) = *ctx.module_initializer.borrow() else {
        return;
    };

    if init_fn.get_last_basic_block().and_then(|b| b.get_terminator()).is_none() {
        let last_block = init_fn.get_last_basic_block().expect("module initialiser has no blocks");
        let saved = ctx.builder.get_insert_block();
        ctx.builder.position_at_end(last_block);
        ctx.builder.build_return(None).expect("failed to terminate module initialiser");
        if let Some(block) = saved {
            ctx.builder.position_at_end(block);
        }
    }

    const MODULE_INIT_PRIORITY: u32 = 65535;
    let i32_ty = ctx.context.i32_type();
    let ptr_ty = ctx.context.ptr_type(inkwell::AddressSpace::default());
    let ctor_struct_ty = ctx.context.struct_type(&[i32_ty.into(), ptr_ty.into(), ptr_ty.into()], false);
    let entry = ctor_struct_ty.const_named_struct(&[
        i32_ty.const_int(MODULE_INIT_PRIORITY as u64, false).into(),
        init_fn.as_global_value().as_pointer_value().into(),
        ptr_ty.const_null().into(),
    ]);
    let array_ty = ctor_struct_ty.array_type(1);
    let global = ctx.module.add_global(array_ty, None, "llvm.global_ctors");
    global.set_linkage(inkwell::module::Linkage::Appending);
    global.set_initializer(&ctor_struct_ty.const_array(&[entry]));
    info!("registered module initialiser as global constructor at priority {MODULE_INIT_PRIORITY}");
}

/// Emits the `alta.mapping` named module metadata: pairs of (mangled name,
/// original fully qualified name) from the mangler's shadow map.
pub fn emit_mangling_metadata<'ctx>(ctx: &CodegenContext<'ctx>) {
    for (mangled, original) in ctx.shadow_map.borrow().iter() {
        let mangled_md = ctx.context.metadata_string(mangled);
        let original_md = ctx.context.metadata_string(original);
        let node = ctx.context.metadata_node(&[mangled_md.into(), original_md.into()]);
        ctx.module.add_global_metadata("alta.mapping", &node).expect("failed to attach alta.mapping metadata");
    }
}

/// Verifies every function individually (so a failure names the offending
/// function) and then the module as a whole.
pub fn verify_module<'ctx>(ctx: &CodegenContext<'ctx>) -> CodegenResult<()> {
    let mut function = ctx.module.get_first_function();
    while let Some(f) = function {
        if !f.verify(true) {
            let name = f.get_name().to_string_lossy().to_string();
            error!("LLVM rejected function '{name}'");
            return Err(CodegenError::VerificationFailed(
                VerificationFailed { function_name: name, message: "function verifier failed".to_string() },
                Position::unknown(),
            ));
        }
        function = f.get_next_function();
    }

    if let Err(message) = ctx.module.verify() {
        error!("module verification failed: {message}");
        return Err(CodegenError::VerificationFailed(
            VerificationFailed { function_name: "<module>".to_string(), message: message.to_string() },
            Position::unknown(),
        ));
    }

    info!("module verified successfully");
    Ok(())
}

/// Emits the final object file (fatal on failure), and best-effort bitcode
/// and textual-disassembly files alongside it (failures there are logged
/// and ignored).
pub fn emit_outputs<'ctx>(ctx: &CodegenContext<'ctx>, object_path: &Path) -> CodegenResult<()> {
    Target::initialize_all(&Default::default());

    let triple = ctx.module.get_triple();
    let target = Target::from_triple(&triple).map_err(|e| {
        CodegenError::EmissionFailed(
            EmissionFailed { path: object_path.display().to_string(), message: e.to_string() },
            Position::unknown(),
        )
    })?;

    let machine = target
        .create_target_machine(
            &triple,
            &ctx.config.resolved_cpu(),
            &ctx.config.resolved_cpu_features(),
            ctx.config.codegen_opt_level(),
            RelocMode::Default,
            CodeModel::Default,
        )
        .ok_or_else(|| {
            CodegenError::InvariantViolated(
                InvariantViolated { what: "target machine creation failed".to_string() },
                Position::unknown(),
            )
        })?;

    if let Err(e) = ctx.module.write_bitcode_to_path(&object_path.with_extension("bc")) {
        warn!("failed to write bitcode (ignored): {e:?}");
    }

    match machine.write_to_file(&ctx.module, FileType::Assembly, &object_path.with_extension("ll")) {
        Ok(_) => {}
        Err(e) => warn!("failed to write textual disassembly (ignored): {e}"),
    }

    machine.write_to_file(&ctx.module, FileType::Object, object_path).map_err(|e| {
        error!("failed to emit object file '{}': {e}", object_path.display());
        CodegenError::EmissionFailed(
            EmissionFailed { path: object_path.display().to_string(), message: e.to_string() },
            Position::unknown(),
        )
    })?;

    info!("emitted object file '{}'", object_path.display());
    Ok(())
}

/// Runs the full driver pipeline over `roots`, writing the object file (and
/// best-effort bitcode/disassembly) to `object_path`.
pub fn run<'ctx>(ctx: &CodegenContext<'ctx>, roots: &[RootNode], object_path: &Path) -> CodegenResult<()> {
    use anyhow::Context as _;

    compile_roots(ctx, roots).with_context(|| "while compiling program roots".to_string()).map_err(|e| {
        error!("{e:#}");
        CodegenError::InvariantViolated(InvariantViolated { what: e.to_string() }, Position::unknown())
    })?;
    finalize_module_initializer(ctx);
    emit_mangling_metadata(ctx);
    verify_module(ctx)?;
    emit_outputs(ctx, object_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Root, RootNode};

    fn root(id: &str, deps: &[&str]) -> RootNode {
        RootNode {
            id: id.to_string(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            root: Root::Enumeration { name: id.to_string(), members: vec![] },
        }
    }

    #[test]
    fn visits_dependencies_before_dependents() {
        // a diamond dependency graph still visits each root exactly once,
        // dependencies before dependents: verified structurally rather than
        // by running the driver against a live LLVM module.
        let roots = vec![root("d", &["b", "c"]), root("b", &["a"]), root("c", &["a"]), root("a", &[])];
        let by_id: std::collections::HashMap<&str, &RootNode> = roots.iter().map(|r| (r.id.as_str(), r)).collect();
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        fn visit<'a>(
            root: &'a RootNode,
            by_id: &std::collections::HashMap<&str, &'a RootNode>,
            visited: &mut HashSet<String>,
            order: &mut Vec<String>,
        ) {
            if visited.contains(&root.id) {
                return;
            }
            visited.insert(root.id.clone());
            for dep in &root.depends_on {
                if let Some(dep_root) = by_id.get(dep.as_str()) {
                    visit(dep_root, by_id, visited, order);
                }
            }
            order.push(root.id.clone());
        }
        for r in &roots {
            visit(r, &by_id, &mut visited, &mut order);
        }
        assert_eq!(order.len(), 4);
        assert!(order.iter().position(|x| x == "a").unwrap() < order.iter().position(|x| x == "b").unwrap());
        assert!(order.iter().position(|x| x == "a").unwrap() < order.iter().position(|x| x == "c").unwrap());
        assert!(order.iter().position(|x| x == "b").unwrap() < order.iter().position(|x| x == "d").unwrap());
    }
}
