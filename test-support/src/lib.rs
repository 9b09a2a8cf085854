//! Shared fixtures for codegen integration tests, the same role the
//! teacher's parser `test_helpers` module plays for grammar tests: wrap the
//! boilerplate of standing up a minimal context so each test can focus on
//! the one construct it exercises.

use altall::config::CodegenConfig;
use altall::context::CodegenContext;
use inkwell::context::Context;

/// Runs `body` against a freshly created [`CodegenContext`] bound to a
/// throwaway LLVM context, the same "own the context, hand out a reference"
/// shape `inkwell`'s own test suites use since a `CodegenContext<'ctx>`
/// cannot outlive the `Context` it borrows.
pub fn with_test_context<R>(module_name: &str, body: impl FnOnce(&CodegenContext) -> R) -> R {
    let context = Context::create();
    let ctx = CodegenContext::new(&context, module_name, CodegenConfig::default());
    body(&ctx)
}

/// Declares a trivial `void empty()` function, positions the builder at its
/// entry block and returns the function value — the minimal scaffold most
/// expression/statement tests need before they can call `build_*` at all.
pub fn declare_empty_function<'ctx>(ctx: &CodegenContext<'ctx>, name: &str) -> inkwell::values::FunctionValue<'ctx> {
    let fn_type = ctx.context.void_type().fn_type(&[], false);
    let function = ctx.module.add_function(name, fn_type, None);
    let entry = ctx.context.append_basic_block(function, "entry");
    ctx.builder.position_at_end(entry);
    function
}

/// A minimal single-member, no-parent class descriptor, registered on
/// `ctx` and returned for further mutation before first use.
pub fn register_simple_class<'ctx>(ctx: &CodegenContext<'ctx>, name: &str) -> altall::types::ClassDescriptor {
    let descriptor = altall::types::ClassDescriptor::new(name);
    altall::class_emit::register_class(ctx, descriptor.clone());
    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_test_context_yields_a_usable_module() {
        with_test_context("fixture", |ctx| {
            assert_eq!(ctx.module.get_name().to_str().unwrap(), "fixture");
        });
    }

    #[test]
    fn declare_empty_function_positions_builder_in_entry() {
        with_test_context("fixture", |ctx| {
            let function = declare_empty_function(ctx, "noop");
            assert!(ctx.builder.get_insert_block().is_some());
            assert_eq!(function.count_basic_blocks(), 1);
        });
    }
}
