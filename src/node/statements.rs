//! Statement lowering. Mirrors `why_lib`'s `if_expression.rs`/
//! `while_loop.rs` enter/exit-scope pattern, generalised to push/pop
//! [`crate::scope_stack::ScopeStack`] frames explicitly so destruction order
//! (rather than just lexical discard) is correct at every exit path.

use inkwell::values::BasicValueEnum;
use inkwell::IntPredicate;

use crate::context::CodegenContext;
use crate::error::{CodegenError, CodegenResult, Unimplemented};
use crate::scope_stack::FrameKind;
use crate::translate::convert_metadata_to_basic;
use crate::tree::{Statement, StatementKind};

use super::{codegen_expression_statement, CodeGen};

pub fn codegen_statement<'ctx>(ctx: &CodegenContext<'ctx>, statement: &Statement) -> CodegenResult<()> {
    match &statement.kind {
        StatementKind::Expression(expr) => codegen_expression_statement(ctx, expr),

        StatementKind::Block(block) => {
            ctx.enter_scope();
            block.codegen(ctx)?;
            ctx.exit_scope();
            Ok(())
        }

        StatementKind::FunctionDefinition(function) => codegen_function_definition(ctx, function),

        StatementKind::Return(value) => codegen_return(ctx, value.as_ref()),

        StatementKind::VariableDefinition { name, ty, initializer, is_global } => {
            codegen_variable_definition(ctx, name, ty, initializer.as_ref(), *is_global)
        }

        StatementKind::Conditional { condition, when_true, when_false } => {
            codegen_conditional_statement(ctx, condition, when_true, when_false.as_deref())
        }

        StatementKind::RangedFor { counter_name, counter_type, start, end, inclusive, descending, body } => {
            codegen_ranged_for(ctx, counter_name, counter_type, start, end, *inclusive, *descending, body)
        }

        StatementKind::Break => {
            let (break_target, _) = ctx.current_loop_targets();
            ctx.builder.build_unconditional_branch(break_target).expect("failed to build break branch");
            Ok(())
        }

        StatementKind::Continue => {
            let (_, continue_target) = ctx.current_loop_targets();
            ctx.builder.build_unconditional_branch(continue_target).expect("failed to build continue branch");
            Ok(())
        }

        StatementKind::Enumeration { name, members } => codegen_enumeration(ctx, name, members),

        StatementKind::Throw(_) => Err(CodegenError::Unimplemented(
            Unimplemented { node_kind: "ThrowStatement".into() },
            statement.position.clone(),
        )),
        StatementKind::Try { .. } => Err(CodegenError::Unimplemented(
            Unimplemented { node_kind: "TryStatement".into() },
            statement.position.clone(),
        )),
    }
}

fn codegen_function_definition<'ctx>(
    ctx: &CodegenContext<'ctx>,
    function: &crate::tree::FunctionDefinition,
) -> CodegenResult<()> {
    let declared = ctx.function_declarations.borrow().get(&function.mangled_name).copied();
    let llvm_function = match declared {
        Some(f) => f,
        None => {
            let params: Vec<_> = function.params.iter().map(|p| p.ty.clone()).collect();
            let fn_type = ctx.get_llvm_function_type(&params, &function.return_type, function.is_variadic);
            let f = ctx.module.add_function(&function.mangled_name, fn_type, None);
            ctx.function_declarations.borrow_mut().insert(function.mangled_name.clone(), f);
            f
        }
    };

    let entry = ctx.context.append_basic_block(llvm_function, "entry");
    let previous_block = ctx.builder.get_insert_block();
    ctx.builder.position_at_end(entry);

    ctx.enter_scope();
    ctx.scope_stack.borrow_mut().push_frame(FrameKind::Function);

    for (index, param) in function.params.iter().enumerate() {
        let llvm_param = llvm_function
            .get_nth_param(index as u32)
            .unwrap_or_else(|| panic!("parameter {index} missing from function signature"));
        llvm_param.set_name(&param.name);

        if param.ty.indirection_level() == 0 {
            let slot = ctx.builder.build_alloca(llvm_param.get_type(), &param.name).expect("failed parameter alloca");
            ctx.builder.build_store(slot, llvm_param).expect("failed to store parameter");
            ctx.store_variable(&param.name, slot.into());
            ctx.scope_stack.borrow_mut().push_item(slot.into(), param.ty.clone(), Some(entry));
        } else {
            ctx.store_variable(&param.name, llvm_param);
        }
    }

    function.body.codegen(ctx)?;

    if ctx.builder.get_insert_block().and_then(|b| b.get_terminator()).is_none() {
        if matches!(function.return_type.shape, crate::types::TypeShape::Native(crate::types::Native::Void)) {
            let frame = ctx.scope_stack.borrow_mut().pop_frame();
            crate::scope_stack::ScopeStack::cleanup(&frame, |item| crate::copy_destroy::destroy_scope_item(ctx, item));
            ctx.builder.build_return(None).expect("failed to build implicit void return");
        } else {
            ctx.builder.build_unreachable().expect("failed to terminate non-void function without explicit return");
            ctx.scope_stack.borrow_mut().pop_frame();
        }
    } else {
        // an explicit `return` already popped the function frame and emitted `ret`.
    }

    ctx.exit_scope();

    if let Some(block) = previous_block {
        ctx.builder.position_at_end(block);
    }

    emit_default_value_trampolines(ctx, function, llvm_function)?;

    Ok(())
}

/// For a function whose trailing parameters carry default values, emits one
/// entry point per arity a caller may omit down to: each trampoline takes
/// only the provided prefix of parameters, evaluates the remaining
/// parameters' default-value expressions in declaration order, and forwards
/// every argument to the primary entry point.
///
/// The trampoline is named `<mangled_name>_defaults_<provided_count>`; no
/// other component of this crate currently resolves that name (the detailed
/// tree's call sites carry an already-resolved callee), but the convention
/// is recorded here so a caller-resolution pass has a fixed target to adopt.
fn emit_default_value_trampolines<'ctx>(
    ctx: &CodegenContext<'ctx>,
    function: &crate::tree::FunctionDefinition,
    primary: inkwell::values::FunctionValue<'ctx>,
) -> CodegenResult<()> {
    let trailing_defaults = function.params.iter().rev().take_while(|p| p.default_value.is_some()).count();
    if trailing_defaults == 0 {
        return Ok(());
    }

    for provided in (function.params.len() - trailing_defaults)..function.params.len() {
        let variant_name = format!("{}_defaults_{provided}", function.mangled_name);
        let provided_params = &function.params[..provided];
        let param_types: Vec<_> = provided_params.iter().map(|p| p.ty.clone()).collect();
        let fn_type = ctx.get_llvm_function_type(&param_types, &function.return_type, false);
        let trampoline = ctx.module.add_function(&variant_name, fn_type, None);

        let entry = ctx.context.append_basic_block(trampoline, "entry");
        let previous_block = ctx.builder.get_insert_block();
        ctx.builder.position_at_end(entry);

        ctx.enter_scope();
        ctx.scope_stack.borrow_mut().push_frame(FrameKind::Temporary);

        let mut call_args = Vec::new();
        for (index, param) in provided_params.iter().enumerate() {
            let llvm_param = trampoline
                .get_nth_param(index as u32)
                .unwrap_or_else(|| panic!("trampoline parameter {index} missing from signature"));
            llvm_param.set_name(&param.name);
            if param.ty.indirection_level() == 0 {
                let slot = ctx
                    .builder
                    .build_alloca(llvm_param.get_type(), &param.name)
                    .expect("failed trampoline parameter alloca");
                ctx.builder.build_store(slot, llvm_param).expect("failed to store trampoline parameter");
                ctx.store_variable(&param.name, slot.into());
            } else {
                ctx.store_variable(&param.name, llvm_param);
            }
            call_args.push(llvm_param.into());
        }

        for param in &function.params[provided..] {
            let default_expr = param
                .default_value
                .as_ref()
                .expect("parameter past the provided prefix must carry a default value");
            let value = default_expr.codegen(ctx)?.expect("default-value expression must produce a value");
            call_args.push(value.into());
        }

        let call = ctx
            .builder
            .build_call(primary, &call_args, "default_call")
            .expect("failed to build default-value trampoline call");

        let frame = ctx.scope_stack.borrow_mut().pop_frame();
        crate::scope_stack::ScopeStack::cleanup(&frame, |item| crate::copy_destroy::destroy_scope_item(ctx, item));

        match call.try_as_basic_value().left() {
            Some(v) => {
                ctx.builder.build_return(Some(&v)).expect("failed to build trampoline return");
            }
            None => {
                ctx.builder.build_return(None).expect("failed to build trampoline void return");
            }
        }

        ctx.exit_scope();
        if let Some(block) = previous_block {
            ctx.builder.position_at_end(block);
        }
    }

    Ok(())
}

fn codegen_return<'ctx>(ctx: &CodegenContext<'ctx>, value: Option<&crate::tree::Expression>) -> CodegenResult<()> {
    let return_value: Option<BasicValueEnum<'ctx>> = match value {
        Some(expr) => {
            ctx.scope_stack.borrow_mut().push_frame(FrameKind::Temporary);
            let v = expr.codegen(ctx)?.expect("return expression must produce a value");
            let frame = ctx.scope_stack.borrow_mut().pop_frame();
            crate::scope_stack::ScopeStack::cleanup(&frame, |item| crate::copy_destroy::destroy_scope_item(ctx, item));
            Some(v)
        }
        None => None,
    };

    ctx.scope_stack
        .borrow()
        .cleanup_to_function_boundary(|item| crate::copy_destroy::destroy_scope_item(ctx, item));

    match return_value {
        Some(v) => ctx.builder.build_return(Some(&v)).expect("failed to build return"),
        None => ctx.builder.build_return(None).expect("failed to build void return"),
    };
    Ok(())
}

fn codegen_variable_definition<'ctx>(
    ctx: &CodegenContext<'ctx>,
    name: &str,
    ty: &crate::types::Type,
    initializer: Option<&crate::tree::Expression>,
    is_global: bool,
) -> CodegenResult<()> {
    let metadata = ctx.get_llvm_type(ty);
    let basic = convert_metadata_to_basic(metadata).expect("variable type must be basic");

    if is_global {
        let global = ctx.module.add_global(basic, None, name);
        match initializer {
            Some(expr) if is_constant_expression(expr) => {
                let value = expr.codegen(ctx)?.expect("global initializer must produce a value");
                global.set_initializer(&value);
            }
            Some(expr) => {
                global.set_initializer(&zero_value(basic));
                let module_init = ctx.module_initializer_function();
                let current = ctx.builder.get_insert_block();
                ctx.builder.position_at_end(module_init.get_last_basic_block().expect("module initialiser missing entry block"));
                let value = expr.codegen(ctx)?.expect("global initializer must produce a value");
                ctx.builder.build_store(global.as_pointer_value(), value).expect("failed to store global initializer");
                if let Some(block) = current {
                    ctx.builder.position_at_end(block);
                }
            }
            None => {
                global.set_initializer(&zero_value(basic));
            }
        }
        ctx.store_variable(name, global.as_pointer_value().into());
        return Ok(());
    }

    let slot = ctx.builder.build_alloca(basic, name).expect("failed variable alloca");
    match initializer {
        Some(expr) => {
            let value = expr.codegen(ctx)?.expect("variable initializer must produce a value");
            let value = crate::copy_destroy::copy_value(ctx, value, ty);
            ctx.builder.build_store(slot, value).expect("failed to store variable initializer");
        }
        None => {
            ctx.builder.build_store(slot, zero_value(basic)).expect("failed to zero-initialise variable");
        }
    }
    ctx.store_variable(name, slot.into());
    let source_block = ctx.builder.get_insert_block();
    ctx.scope_stack.borrow_mut().push_item(slot.into(), ty.clone(), source_block);
    Ok(())
}

fn is_constant_expression(expr: &crate::tree::Expression) -> bool {
    matches!(
        expr.kind,
        crate::tree::ExpressionKind::IntegerLiteral(_)
            | crate::tree::ExpressionKind::FloatLiteral(_)
            | crate::tree::ExpressionKind::BooleanLiteral(_)
            | crate::tree::ExpressionKind::Nullptr
    )
}

fn zero_value(ty: inkwell::types::BasicTypeEnum<'_>) -> inkwell::values::BasicValueEnum<'_> {
    use inkwell::types::BasicType;
    ty.const_zero()
}

fn codegen_conditional_statement<'ctx>(
    ctx: &CodegenContext<'ctx>,
    condition: &crate::tree::Expression,
    when_true: &crate::tree::Block,
    when_false: Option<&crate::tree::Block>,
) -> CodegenResult<()> {
    let condition_value = condition.codegen(ctx)?.expect("conditional test must produce a value").into_int_value();
    let current_block = ctx.builder.get_insert_block().expect("no active insertion block");
    let function = current_block.get_parent().expect("insertion block has no parent function");

    let true_block = ctx.context.append_basic_block(function, "if_true");
    let merge_block = ctx.context.append_basic_block(function, "if_merge");
    let false_block = if when_false.is_some() {
        ctx.context.append_basic_block(function, "if_false")
    } else {
        merge_block
    };

    let mark = ctx.scope_stack.borrow().begin_branch();
    ctx.builder.build_conditional_branch(condition_value, true_block, false_block).expect("failed to branch on if-condition");

    ctx.builder.position_at_end(true_block);
    ctx.enter_scope();
    when_true.codegen(ctx)?;
    ctx.exit_scope();
    if ctx.builder.get_insert_block().and_then(|b| b.get_terminator()).is_none() {
        ctx.builder.build_unconditional_branch(merge_block).expect("failed to branch to if-merge");
    }

    if let Some(else_block) = when_false {
        ctx.builder.position_at_end(false_block);
        ctx.enter_scope();
        else_block.codegen(ctx)?;
        ctx.exit_scope();
        if ctx.builder.get_insert_block().and_then(|b| b.get_terminator()).is_none() {
            ctx.builder.build_unconditional_branch(merge_block).expect("failed to branch to if-merge");
        }
    }

    ctx.builder.position_at_end(merge_block);
    ctx.scope_stack.borrow_mut().end_branch(mark, merge_block, &[true_block, false_block], &ctx.builder);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn codegen_ranged_for<'ctx>(
    ctx: &CodegenContext<'ctx>,
    counter_name: &str,
    counter_type: &crate::types::Type,
    start: &crate::tree::Expression,
    end: &crate::tree::Expression,
    inclusive: bool,
    descending: bool,
    body: &crate::tree::Block,
) -> CodegenResult<()> {
    let metadata = ctx.get_llvm_type(counter_type);
    let basic = convert_metadata_to_basic(metadata).expect("loop counter type must be basic");
    let counter_slot = ctx.builder.build_alloca(basic, counter_name).expect("failed loop counter alloca");
    let start_value = start.codegen(ctx)?.expect("loop start must produce a value");
    ctx.builder.build_store(counter_slot, start_value).expect("failed to store loop start value");
    let end_value = end.codegen(ctx)?.expect("loop end must produce a value").into_int_value();

    let current_block = ctx.builder.get_insert_block().expect("no active insertion block");
    let function = current_block.get_parent().expect("insertion block has no parent function");
    let condition_block = ctx.context.append_basic_block(function, "for_condition");
    let body_block = ctx.context.append_basic_block(function, "for_body");
    let step_block = ctx.context.append_basic_block(function, "for_step");
    let exit_block = ctx.context.append_basic_block(function, "for_exit");

    ctx.builder.build_unconditional_branch(condition_block).expect("failed to branch to for-condition");
    ctx.builder.position_at_end(condition_block);
    let counter_value = ctx.builder.build_load(basic, counter_slot, "loop_counter").expect("failed to load loop counter").into_int_value();
    let is_unsigned = counter_type.modifiers.contains(&crate::types::Modifier::Unsigned);
    let predicate = match (descending, inclusive, is_unsigned) {
        (false, false, false) => IntPredicate::SLT,
        (false, false, true) => IntPredicate::ULT,
        (false, true, false) => IntPredicate::SLE,
        (false, true, true) => IntPredicate::ULE,
        (true, false, false) => IntPredicate::SGT,
        (true, false, true) => IntPredicate::UGT,
        (true, true, false) => IntPredicate::SGE,
        (true, true, true) => IntPredicate::UGE,
    };
    let condition = ctx.builder.build_int_compare(predicate, counter_value, end_value, "for_condition_check").expect("for-condition compare failed");
    ctx.builder.build_conditional_branch(condition, body_block, exit_block).expect("failed to branch on for-condition");

    ctx.builder.position_at_end(body_block);
    ctx.enter_scope();
    ctx.scope_stack.borrow_mut().push_frame(FrameKind::Other);
    ctx.store_variable(counter_name, counter_slot.into());
    ctx.push_loop_targets(exit_block, step_block);
    body.codegen(ctx)?;
    ctx.pop_loop_targets();
    let frame = ctx.scope_stack.borrow_mut().pop_frame();
    crate::scope_stack::ScopeStack::cleanup(&frame, |item| crate::copy_destroy::destroy_scope_item(ctx, item));
    ctx.exit_scope();
    if ctx.builder.get_insert_block().and_then(|b| b.get_terminator()).is_none() {
        ctx.builder.build_unconditional_branch(step_block).expect("failed to branch to for-step");
    }

    ctx.builder.position_at_end(step_block);
    let current_counter = ctx.builder.build_load(basic, counter_slot, "loop_counter_step").expect("failed to load loop counter for step").into_int_value();
    let one = current_counter.get_type().const_int(1, false);
    let next = if descending {
        ctx.builder.build_int_sub(current_counter, one, "for_dec").expect("for-loop decrement failed")
    } else {
        ctx.builder.build_int_add(current_counter, one, "for_inc").expect("for-loop increment failed")
    };
    ctx.builder.build_store(counter_slot, next).expect("failed to store stepped loop counter");
    ctx.builder.build_unconditional_branch(condition_block).expect("failed to branch back to for-condition");

    ctx.builder.position_at_end(exit_block);
    Ok(())
}

fn codegen_enumeration<'ctx>(
    ctx: &CodegenContext<'ctx>,
    name: &str,
    members: &[(String, Option<i64>)],
) -> CodegenResult<()> {
    let int_ty = ctx.context.i32_type();
    let mut previous = -1i64;
    for (member_name, explicit_value) in members {
        let value = explicit_value.unwrap_or(previous + 1);
        previous = value;
        let global_name = format!("{name}_0_{member_name}", name = name, member_name = member_name);
        let global = ctx.module.add_global(int_ty, None, &global_name);
        global.set_initializer(&int_ty.const_int(value as u64, true));
        global.set_constant(true);
        ctx.store_constant(format!("{name}::{member_name}"), global.as_pointer_value().into());
    }
    Ok(())
}
