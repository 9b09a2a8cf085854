//! Node Compiler: dispatch from a [`crate::tree`] node to emitted IR.
//!
//! The reference backend implements this dispatch as a family of
//! cooperative coroutines so an unbounded-depth input tree never recurses
//! through the native call stack. This crate targets ordinary (bounded, in
//! practice) program trees, so the same dispatch contract — each node
//! lowers itself by calling back into the others, suspension points are
//! just ordinary calls — is expressed as plain recursive Rust, matching how
//! `why_lib`'s own `CodeGen` trait dispatches one node type per file
//! without any explicit trampoline.

mod expressions;
mod statements;

use inkwell::values::BasicValueEnum;

use crate::context::CodegenContext;
use crate::error::CodegenResult;
use crate::scope_stack::FrameKind;
use crate::tree::{Block, Expression, Statement};

/// Implemented by every tree node that lowers to an (optional) IR value.
/// Statements return `None`; expressions always return `Some`.
pub trait CodeGen<'ctx> {
    fn codegen(&self, ctx: &CodegenContext<'ctx>) -> CodegenResult<Option<BasicValueEnum<'ctx>>>;
}

impl<'ctx> CodeGen<'ctx> for Expression {
    fn codegen(&self, ctx: &CodegenContext<'ctx>) -> CodegenResult<Option<BasicValueEnum<'ctx>>> {
        expressions::codegen_expression(ctx, self).map(Some)
    }
}

impl<'ctx> CodeGen<'ctx> for Statement {
    fn codegen(&self, ctx: &CodegenContext<'ctx>) -> CodegenResult<Option<BasicValueEnum<'ctx>>> {
        statements::codegen_statement(ctx, self)?;
        Ok(None)
    }
}

impl<'ctx> CodeGen<'ctx> for Block {
    fn codegen(&self, ctx: &CodegenContext<'ctx>) -> CodegenResult<Option<BasicValueEnum<'ctx>>> {
        ctx.scope_stack.borrow_mut().push_frame(FrameKind::Other);
        for statement in &self.statements {
            statement.codegen(ctx)?;
        }
        let frame = ctx.scope_stack.borrow_mut().pop_frame();
        // a `return` inside the block already destroyed this frame's items
        // on its way out via `cleanup_to_function_boundary`; only run
        // cleanup here when control actually falls off the block's end.
        if ctx.builder.get_insert_block().and_then(|b| b.get_terminator()).is_none() {
            crate::scope_stack::ScopeStack::cleanup(&frame, |item| crate::copy_destroy::destroy_scope_item(ctx, item));
        }
        Ok(None)
    }
}

/// Compiles an expression statement: push a `Temporary` frame, compile,
/// clean up everything the expression produced, pop. Exposed here (rather
/// than folded into `codegen_statement`) because function-body compilation
/// in [`statements`] also needs it for the implicit top-level expression
/// that precedes every explicit statement sequence.
pub(crate) fn codegen_expression_statement<'ctx>(
    ctx: &CodegenContext<'ctx>,
    expression: &Expression,
) -> CodegenResult<()> {
    ctx.scope_stack.borrow_mut().push_frame(FrameKind::Temporary);
    expression.codegen(ctx)?;
    let frame = ctx.scope_stack.borrow_mut().pop_frame();
    crate::scope_stack::ScopeStack::cleanup(&frame, |item| crate::copy_destroy::destroy_scope_item(ctx, item));
    Ok(())
}
