//! Expression lowering. One function per [`crate::tree::ExpressionKind`]
//! variant, grounded in `why_lib`'s per-expression-kind files
//! (`binary_expression.rs`, `if_expression.rs`, `function_call.rs`) each
//! generalised to this language's richer operand set (closures, unions,
//! optionals, class instances) where `why_lib`'s scalar-only version
//! didn't need to.

use inkwell::values::BasicValueEnum;
use inkwell::{FloatPredicate, IntPredicate};

use crate::context::CodegenContext;
use crate::error::{CodegenError, CodegenResult, Unimplemented};
use crate::scope_stack::FrameKind;
use crate::translate::convert_metadata_to_basic;
use crate::tree::{
    ArgumentAdjustment, BinaryOperator, Expression, ExpressionKind, SpecialFetchKind, UnaryOperator,
};
use crate::types::{FunctionKind, Modifier, Native, Type, TypeShape};

use super::CodeGen;

pub fn codegen_expression<'ctx>(
    ctx: &CodegenContext<'ctx>,
    expr: &Expression,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    match &expr.kind {
        ExpressionKind::IntegerLiteral(v) => {
            let metadata = ctx.get_llvm_type(&expr.resolved_type);
            let int_ty = convert_metadata_to_basic(metadata).expect("integer literal type must be basic").into_int_type();
            Ok(int_ty.const_int(*v as u64, true).into())
        }
        ExpressionKind::FloatLiteral(v) => {
            let metadata = ctx.get_llvm_type(&expr.resolved_type);
            let float_ty = convert_metadata_to_basic(metadata).expect("float literal type must be basic").into_float_type();
            Ok(float_ty.const_float(*v).into())
        }
        ExpressionKind::BooleanLiteral(v) => Ok(ctx.context.bool_type().const_int(*v as u64, false).into()),
        ExpressionKind::StringLiteral(s) => Ok(ctx.string_constant_ptr(s).into()),
        ExpressionKind::Nullptr => Ok(ctx.context.ptr_type(inkwell::AddressSpace::default()).const_null().into()),
        ExpressionKind::Sizeof(ty) => {
            let metadata = ctx.get_llvm_type(ty);
            let basic = convert_metadata_to_basic(metadata).expect("sizeof target must be basic");
            Ok(basic.size_of().expect("sizeof requires a sized type").into())
        }

        ExpressionKind::Fetch { name } => codegen_fetch(ctx, name, &expr.position),

        ExpressionKind::SpecialFetch(kind) => codegen_special_fetch(ctx, *kind),

        ExpressionKind::Accessor { target, member, parent_chain, bitfield_range } => {
            codegen_accessor(ctx, target, member, parent_chain, *bitfield_range)
        }

        ExpressionKind::Assignment { target, value, operator_method } => {
            codegen_assignment(ctx, target, value, operator_method.as_deref())
        }

        ExpressionKind::Binary { operator, left, right } => codegen_binary(ctx, *operator, left, right),

        ExpressionKind::Unary { operator, operand } => codegen_unary(ctx, *operator, operand),

        ExpressionKind::Cast { source, path, .. } => {
            let source_value = source.codegen(ctx)?.expect("cast source must produce a value");
            crate::cast::apply_cast(
                ctx,
                path,
                source_value,
                source.resolved_type.clone(),
                &expr.resolved_type,
                &expr.position,
                |ctx, value, ty| crate::copy_destroy::copy_value(ctx, value, ty),
            )
        }

        ExpressionKind::Call { callee, this_argument, arguments } => {
            codegen_call(ctx, callee, this_argument.as_deref(), arguments)
        }

        ExpressionKind::Conditional { condition, when_true, when_false } => {
            codegen_conditional(ctx, condition, when_true, when_false)
        }

        ExpressionKind::Instanceof { value, target_type } => codegen_instanceof(ctx, value, target_type),

        ExpressionKind::ClassInstantiation { class_name, persistent, constructor_name, arguments } => {
            codegen_class_instantiation(ctx, class_name, *persistent, constructor_name.as_deref(), arguments)
        }

        ExpressionKind::SuperCall { parent_class, arguments } => codegen_super_call(ctx, parent_class, arguments),

        ExpressionKind::Lambda { .. } => Err(CodegenError::Unimplemented(
            Unimplemented { node_kind: "LambdaExpression".into() },
            expr.position.clone(),
        )),

        ExpressionKind::Await(_) => Err(CodegenError::Unimplemented(
            Unimplemented { node_kind: "AwaitExpression".into() },
            expr.position.clone(),
        )),

        ExpressionKind::Yield(_) => Err(CodegenError::Unimplemented(
            Unimplemented { node_kind: "YieldExpression".into() },
            expr.position.clone(),
        )),
    }
}

fn codegen_fetch<'ctx>(
    ctx: &CodegenContext<'ctx>,
    name: &str,
    position: &crate::position::Position,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    if let Some(variable) = ctx.find_variable(name) {
        return Ok(variable);
    }
    if let Some(constant) = ctx.find_constant(name) {
        return Ok(constant);
    }
    if let Some(function) = ctx.find_function(name) {
        return Ok(function.as_global_value().as_pointer_value().into());
    }
    Err(CodegenError::InvariantViolated(
        crate::error::InvariantViolated { what: format!("unresolved fetch of '{name}'") },
        position.clone(),
    ))
}

fn codegen_special_fetch<'ctx>(ctx: &CodegenContext<'ctx>, kind: SpecialFetchKind) -> CodegenResult<BasicValueEnum<'ctx>> {
    let ptr_ty = ctx.context.ptr_type(inkwell::AddressSpace::default());
    match kind {
        SpecialFetchKind::InvalidValue => Ok(ptr_ty.const_null().into()),
        SpecialFetchKind::ModuleScheduler => {
            let global_name = "_Alta_module_scheduler";
            let global = ctx.module.get_global(global_name).unwrap_or_else(|| {
                let g = ctx.module.add_global(ptr_ty, None, global_name);
                g.set_initializer(&ptr_ty.const_null());
                g
            });
            Ok(global.as_pointer_value().into())
        }
        SpecialFetchKind::ActiveCoroutine => Ok(ptr_ty.const_null().into()),
    }
}

fn codegen_accessor<'ctx>(
    ctx: &CodegenContext<'ctx>,
    target: &Expression,
    member: &str,
    parent_chain: &[String],
    bitfield_range: Option<(u32, u32)>,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let mut base = target.codegen(ctx)?.expect("accessor target must produce a value");
    let mut current_class = match &target.resolved_type.destroy_indirection().shape {
        TypeShape::Class(name) => name.clone(),
        _ => panic!("accessor target must be a class type"),
    };

    for parent in parent_chain {
        let descriptor = ctx.class_descriptors.borrow().get(&current_class).cloned().expect("class descriptor missing");
        let field = ctx.parent_field_index(&descriptor, parent);
        let struct_ty = ctx.class_struct_type(&current_class);
        base = ctx
            .builder
            .build_struct_gep(struct_ty, base.into_pointer_value(), field, "accessor_parent")
            .expect("parent-chain GEP failed")
            .into();
        current_class = parent.clone();
    }

    let descriptor = ctx.class_descriptors.borrow().get(&current_class).cloned().expect("class descriptor missing");
    let member_position = descriptor
        .members
        .iter()
        .position(|m| m.name == member)
        .expect("member not found in class descriptor");
    let field = ctx.first_member_field_index(&descriptor) + member_position as u32;
    let struct_ty = ctx.class_struct_type(&current_class);
    let member_ptr = ctx
        .builder
        .build_struct_gep(struct_ty, base.into_pointer_value(), field, "member")
        .expect("member GEP failed");

    let member_ty = &descriptor.members[member_position].ty;
    let member_metadata = ctx.get_llvm_type(member_ty);
    let member_basic = convert_metadata_to_basic(member_metadata).expect("member type must be basic");
    let loaded = ctx.builder.build_load(member_basic, member_ptr, "member_load").expect("member load failed");

    if let Some((start, end)) = bitfield_range {
        let int_value = loaded.into_int_value();
        let width = int_value.get_type().get_bit_width();
        let mask = if end - start + 1 >= width { u64::MAX } else { (1u64 << (end - start + 1)) - 1 };
        let shifted = ctx
            .builder
            .build_right_shift(int_value, int_value.get_type().const_int(start as u64, false), false, "bitfield_shift")
            .expect("bitfield shift failed");
        let masked = ctx
            .builder
            .build_and(shifted, int_value.get_type().const_int(mask, false), "bitfield_mask")
            .expect("bitfield mask failed");
        return Ok(masked.into());
    }

    Ok(loaded)
}

fn codegen_assignment<'ctx>(
    ctx: &CodegenContext<'ctx>,
    target: &Expression,
    value: &Expression,
    operator_method: Option<&str>,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let rhs = value.codegen(ctx)?.expect("assignment RHS must produce a value");
    let rhs = crate::copy_destroy::copy_value(ctx, rhs, &value.resolved_type);

    if let Some(method_name) = operator_method {
        let method = ctx
            .module
            .get_function(method_name)
            .unwrap_or_else(|| panic!("operator method '{method_name}' not declared"));
        let target_value = target.codegen(ctx)?.expect("assignment target must produce a value");
        let call = ctx
            .builder
            .build_call(method, &[target_value.into(), rhs.into()], "operator_assign")
            .expect("failed to call assignment operator method");
        return Ok(call.try_as_basic_value().left().expect("operator method must return a value"));
    }

    let target_ptr = target.codegen(ctx)?.expect("assignment target must produce an address").into_pointer_value();
    let prior_metadata = ctx.get_llvm_type(&target.resolved_type);
    let prior_basic = convert_metadata_to_basic(prior_metadata).expect("assignment target type must be basic");
    let prior = ctx.builder.build_load(prior_basic, target_ptr, "prior_value").expect("failed to load prior value");
    crate::copy_destroy::destroy_value(ctx, prior, &target.resolved_type);

    ctx.builder.build_store(target_ptr, rhs).expect("failed to store assignment result");
    Ok(rhs)
}

fn codegen_binary<'ctx>(
    ctx: &CodegenContext<'ctx>,
    operator: BinaryOperator,
    left: &Expression,
    right: &Expression,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let lhs = left.codegen(ctx)?.expect("binary left operand must produce a value");
    let rhs = right.codegen(ctx)?.expect("binary right operand must produce a value");

    let is_float = matches!(left.resolved_type.shape, TypeShape::Native(Native::Float | Native::Double));
    let is_unsigned = left.resolved_type.modifiers.contains(&Modifier::Unsigned);

    use BinaryOperator::*;
    let result = match (operator, is_float) {
        (LogicalAnd, _) => ctx.builder.build_and(lhs.into_int_value(), rhs.into_int_value(), "logical_and").expect("and failed").into(),
        (LogicalOr, _) => ctx.builder.build_or(lhs.into_int_value(), rhs.into_int_value(), "logical_or").expect("or failed").into(),
        (BitwiseAnd, _) => ctx.builder.build_and(lhs.into_int_value(), rhs.into_int_value(), "bitand").expect("and failed").into(),
        (BitwiseOr, _) => ctx.builder.build_or(lhs.into_int_value(), rhs.into_int_value(), "bitor").expect("or failed").into(),
        (BitwiseXor, _) => ctx.builder.build_xor(lhs.into_int_value(), rhs.into_int_value(), "bitxor").expect("xor failed").into(),
        (ShiftLeft, _) => ctx.builder.build_left_shift(lhs.into_int_value(), rhs.into_int_value(), "shl").expect("shl failed").into(),
        (ShiftRight, _) => ctx
            .builder
            .build_right_shift(lhs.into_int_value(), rhs.into_int_value(), !is_unsigned, "shr")
            .expect("shr failed")
            .into(),

        (Add, true) => ctx.builder.build_float_add(lhs.into_float_value(), rhs.into_float_value(), "fadd").expect("fadd failed").into(),
        (Add, false) => ctx.builder.build_int_add(lhs.into_int_value(), rhs.into_int_value(), "add").expect("add failed").into(),
        (Subtract, true) => ctx.builder.build_float_sub(lhs.into_float_value(), rhs.into_float_value(), "fsub").expect("fsub failed").into(),
        (Subtract, false) => ctx.builder.build_int_sub(lhs.into_int_value(), rhs.into_int_value(), "sub").expect("sub failed").into(),
        (Multiply, true) => ctx.builder.build_float_mul(lhs.into_float_value(), rhs.into_float_value(), "fmul").expect("fmul failed").into(),
        (Multiply, false) => ctx.builder.build_int_mul(lhs.into_int_value(), rhs.into_int_value(), "mul").expect("mul failed").into(),
        (Divide, true) => ctx.builder.build_float_div(lhs.into_float_value(), rhs.into_float_value(), "fdiv").expect("fdiv failed").into(),
        (Divide, false) if is_unsigned => {
            ctx.builder.build_int_unsigned_div(lhs.into_int_value(), rhs.into_int_value(), "udiv").expect("udiv failed").into()
        }
        (Divide, false) => ctx.builder.build_int_signed_div(lhs.into_int_value(), rhs.into_int_value(), "sdiv").expect("sdiv failed").into(),
        (Modulo, true) => ctx.builder.build_float_rem(lhs.into_float_value(), rhs.into_float_value(), "frem").expect("frem failed").into(),
        (Modulo, false) if is_unsigned => {
            ctx.builder.build_int_unsigned_rem(lhs.into_int_value(), rhs.into_int_value(), "urem").expect("urem failed").into()
        }
        (Modulo, false) => ctx.builder.build_int_signed_rem(lhs.into_int_value(), rhs.into_int_value(), "srem").expect("srem failed").into(),

        (Equal, true) => ctx
            .builder
            .build_float_compare(FloatPredicate::OEQ, lhs.into_float_value(), rhs.into_float_value(), "feq")
            .expect("feq failed")
            .into(),
        (Equal, false) => ctx
            .builder
            .build_int_compare(IntPredicate::EQ, lhs.into_int_value(), rhs.into_int_value(), "eq")
            .expect("eq failed")
            .into(),
        (NotEqual, true) => ctx
            .builder
            .build_float_compare(FloatPredicate::ONE, lhs.into_float_value(), rhs.into_float_value(), "fne")
            .expect("fne failed")
            .into(),
        (NotEqual, false) => ctx
            .builder
            .build_int_compare(IntPredicate::NE, lhs.into_int_value(), rhs.into_int_value(), "ne")
            .expect("ne failed")
            .into(),
        (LessThan, true) => ctx
            .builder
            .build_float_compare(FloatPredicate::OLT, lhs.into_float_value(), rhs.into_float_value(), "flt")
            .expect("flt failed")
            .into(),
        (LessThan, false) => ctx
            .builder
            .build_int_compare(if is_unsigned { IntPredicate::ULT } else { IntPredicate::SLT }, lhs.into_int_value(), rhs.into_int_value(), "lt")
            .expect("lt failed")
            .into(),
        (LessOrEqual, true) => ctx
            .builder
            .build_float_compare(FloatPredicate::OLE, lhs.into_float_value(), rhs.into_float_value(), "fle")
            .expect("fle failed")
            .into(),
        (LessOrEqual, false) => ctx
            .builder
            .build_int_compare(if is_unsigned { IntPredicate::ULE } else { IntPredicate::SLE }, lhs.into_int_value(), rhs.into_int_value(), "le")
            .expect("le failed")
            .into(),
        (GreaterThan, true) => ctx
            .builder
            .build_float_compare(FloatPredicate::OGT, lhs.into_float_value(), rhs.into_float_value(), "fgt")
            .expect("fgt failed")
            .into(),
        (GreaterThan, false) => ctx
            .builder
            .build_int_compare(if is_unsigned { IntPredicate::UGT } else { IntPredicate::SGT }, lhs.into_int_value(), rhs.into_int_value(), "gt")
            .expect("gt failed")
            .into(),
        (GreaterOrEqual, true) => ctx
            .builder
            .build_float_compare(FloatPredicate::OGE, lhs.into_float_value(), rhs.into_float_value(), "fge")
            .expect("fge failed")
            .into(),
        (GreaterOrEqual, false) => ctx
            .builder
            .build_int_compare(if is_unsigned { IntPredicate::UGE } else { IntPredicate::SGE }, lhs.into_int_value(), rhs.into_int_value(), "ge")
            .expect("ge failed")
            .into(),
    };

    Ok(result)
}

fn codegen_unary<'ctx>(
    ctx: &CodegenContext<'ctx>,
    operator: UnaryOperator,
    operand: &Expression,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    match operator {
        UnaryOperator::Not => {
            let value = operand.codegen(ctx)?.expect("unary operand must produce a value").into_int_value();
            Ok(ctx.builder.build_xor(value, value.get_type().const_all_ones(), "not").expect("not failed").into())
        }
        UnaryOperator::Negate => {
            let value = operand.codegen(ctx)?.expect("unary operand must produce a value");
            match value {
                BasicValueEnum::FloatValue(f) => Ok(ctx.builder.build_float_neg(f, "fneg").expect("fneg failed").into()),
                BasicValueEnum::IntValue(i) => Ok(ctx.builder.build_int_neg(i, "neg").expect("neg failed").into()),
                other => Ok(other),
            }
        }
        UnaryOperator::Plus => operand.codegen(ctx).map(|v| v.expect("unary operand must produce a value")),
        UnaryOperator::BitwiseNot => {
            let value = operand.codegen(ctx)?.expect("unary operand must produce a value").into_int_value();
            Ok(ctx.builder.build_not(value, "bitnot").expect("bitnot failed").into())
        }
        UnaryOperator::PreIncrement | UnaryOperator::PostIncrement | UnaryOperator::PreDecrement | UnaryOperator::PostDecrement => {
            codegen_increment_decrement(ctx, operator, operand)
        }
    }
}

fn codegen_increment_decrement<'ctx>(
    ctx: &CodegenContext<'ctx>,
    operator: UnaryOperator,
    operand: &Expression,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let address = operand.codegen(ctx)?.expect("increment/decrement target must produce an address").into_pointer_value();
    let metadata = ctx.get_llvm_type(&operand.resolved_type);
    let basic = convert_metadata_to_basic(metadata).expect("increment/decrement target type must be basic");
    let old = ctx.builder.build_load(basic, address, "pre_value").expect("failed to load for increment/decrement");

    let is_increment = matches!(operator, UnaryOperator::PreIncrement | UnaryOperator::PostIncrement);
    let new = match old {
        BasicValueEnum::IntValue(i) => {
            let one = i.get_type().const_int(1, false);
            let result = if is_increment {
                ctx.builder.build_int_add(i, one, "inc")
            } else {
                ctx.builder.build_int_sub(i, one, "dec")
            };
            result.expect("increment/decrement arithmetic failed").into()
        }
        BasicValueEnum::FloatValue(f) => {
            let one = f.get_type().const_float(1.0);
            let result = if is_increment {
                ctx.builder.build_float_add(f, one, "inc")
            } else {
                ctx.builder.build_float_sub(f, one, "dec")
            };
            result.expect("increment/decrement arithmetic failed").into()
        }
        other => other,
    };

    ctx.builder.build_store(address, new).expect("failed to store increment/decrement result");

    let is_pre = matches!(operator, UnaryOperator::PreIncrement | UnaryOperator::PreDecrement);
    Ok(if is_pre { new } else { old })
}

fn codegen_call<'ctx>(
    ctx: &CodegenContext<'ctx>,
    callee: &Expression,
    this_argument: Option<&Expression>,
    arguments: &[ArgumentAdjustment],
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let mut argument_values = Vec::new();
    if let Some(this_arg) = this_argument {
        let this_value = this_arg.codegen(ctx)?.expect("'this' argument must produce a value");
        argument_values.push(this_value.into());
    }
    for adjustment in arguments {
        match adjustment {
            ArgumentAdjustment::Single(expr) => {
                let value = expr.codegen(ctx)?.expect("call argument must produce a value");
                argument_values.push(value.into());
            }
            ArgumentAdjustment::Variadic(items) => {
                for item in items {
                    let value = item.codegen(ctx)?.expect("variadic call argument must produce a value");
                    argument_values.push(value.into());
                }
            }
        }
    }

    match &callee.resolved_type.shape {
        TypeShape::Function(f) if f.kind == FunctionKind::Raw => {
            let function_ptr = callee.codegen(ctx)?.expect("raw callee must produce a value").into_pointer_value();
            let fn_type = ctx.get_llvm_function_type(&f.params, &f.return_value, f.is_variadic);
            let call = ctx
                .builder
                .build_indirect_call(fn_type, function_ptr, &argument_values, "raw_call")
                .expect("failed to build raw call");
            Ok(call.try_as_basic_value().left().unwrap_or_else(|| ctx.context.bool_type().const_zero().into()))
        }
        TypeShape::Function(f) if f.kind == FunctionKind::Closure => {
            codegen_closure_call(ctx, callee, f, &argument_values)
        }
        _ => panic!("call target must be a function-typed expression"),
    }
}

/// Branches on whether the closure's state pointer is null into either the
/// raw entry (called without the hidden state argument) or the
/// state-prepended entry, joining the result with a phi — closures whose
/// state is null are indistinguishable at the call site from a raw function
/// reference assigned into a closure-typed slot.
fn codegen_closure_call<'ctx>(
    ctx: &CodegenContext<'ctx>,
    callee: &Expression,
    function_type: &crate::types::FunctionType,
    argument_values: &[inkwell::values::BasicMetadataValueEnum<'ctx>],
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let closure = callee.codegen(ctx)?.expect("closure callee must produce a value").into_struct_value();
    let code_ptr = ctx.builder.build_extract_value(closure, 0, "closure_code").expect("failed to extract closure code pointer").into_pointer_value();
    let state_ptr = ctx.builder.build_extract_value(closure, 1, "closure_state").expect("failed to extract closure state pointer").into_pointer_value();

    let current_block = ctx.builder.get_insert_block().expect("no active insertion block");
    let function = current_block.get_parent().expect("insertion block has no parent function");
    let is_null = ctx.builder.build_is_null(state_ptr, "closure_state_is_null").expect("failed null check");

    let raw_block = ctx.context.append_basic_block(function, "closure_call_raw");
    let stateful_block = ctx.context.append_basic_block(function, "closure_call_stateful");
    let merge_block = ctx.context.append_basic_block(function, "closure_call_merge");
    ctx.builder.build_conditional_branch(is_null, raw_block, stateful_block).expect("failed to branch on closure state");

    let raw_fn_type = ctx.get_llvm_function_type(&function_type.params, &function_type.return_value, function_type.is_variadic);
    ctx.builder.position_at_end(raw_block);
    let raw_call = ctx
        .builder
        .build_indirect_call(raw_fn_type, code_ptr, argument_values, "closure_raw_call")
        .expect("failed to build closure raw call");
    let raw_result = raw_call.try_as_basic_value().left();
    ctx.builder.build_unconditional_branch(merge_block).expect("failed to branch to closure call merge");

    let mut stateful_params = Vec::with_capacity(argument_values.len() + 1);
    stateful_params.push(state_ptr.into());
    stateful_params.extend_from_slice(argument_values);
    let mut stateful_param_types: Vec<Type> = Vec::with_capacity(function_type.params.len() + 1);
    stateful_param_types.push(Type::native(Native::Void).pointer_to());
    stateful_param_types.extend(function_type.params.iter().cloned());
    let stateful_fn_type = ctx.get_llvm_function_type(&stateful_param_types, &function_type.return_value, function_type.is_variadic);
    ctx.builder.position_at_end(stateful_block);
    let stateful_call = ctx
        .builder
        .build_indirect_call(stateful_fn_type, code_ptr, &stateful_params, "closure_stateful_call")
        .expect("failed to build closure stateful call");
    let stateful_result = stateful_call.try_as_basic_value().left();
    ctx.builder.build_unconditional_branch(merge_block).expect("failed to branch to closure call merge");

    ctx.builder.position_at_end(merge_block);
    match (raw_result, stateful_result) {
        (Some(raw), Some(stateful)) => {
            let phi = ctx.builder.build_phi(raw.get_type(), "closure_call_result").expect("failed to build closure call phi");
            phi.add_incoming(&[(&raw, raw_block), (&stateful, stateful_block)]);
            Ok(phi.as_basic_value())
        }
        _ => Ok(ctx.context.bool_type().const_zero().into()),
    }
}

fn codegen_conditional<'ctx>(
    ctx: &CodegenContext<'ctx>,
    condition: &Expression,
    when_true: &Expression,
    when_false: &Expression,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let condition_value = condition.codegen(ctx)?.expect("conditional test must produce a value").into_int_value();
    let current_block = ctx.builder.get_insert_block().expect("no active insertion block");
    let function = current_block.get_parent().expect("insertion block has no parent function");

    let true_block = ctx.context.append_basic_block(function, "ternary_true");
    let false_block = ctx.context.append_basic_block(function, "ternary_false");
    let merge_block = ctx.context.append_basic_block(function, "ternary_merge");

    ctx.scope_stack.borrow_mut().begin_branch();
    ctx.builder.build_conditional_branch(condition_value, true_block, false_block).expect("failed to branch on ternary condition");

    ctx.builder.position_at_end(true_block);
    let true_value = when_true.codegen(ctx)?.expect("ternary true-branch must produce a value");
    ctx.builder.build_unconditional_branch(merge_block).expect("failed to branch to ternary merge");

    ctx.builder.position_at_end(false_block);
    let false_value = when_false.codegen(ctx)?.expect("ternary false-branch must produce a value");
    ctx.builder.build_unconditional_branch(merge_block).expect("failed to branch to ternary merge");

    ctx.builder.position_at_end(merge_block);
    let phi = ctx.builder.build_phi(true_value.get_type(), "ternary_result").expect("failed to build ternary phi");
    phi.add_incoming(&[(&true_value, true_block), (&false_value, false_block)]);
    Ok(phi.as_basic_value())
}

fn codegen_instanceof<'ctx>(
    ctx: &CodegenContext<'ctx>,
    value: &Expression,
    target_type: &Type,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    if let TypeShape::Union(members) = &value.resolved_type.shape {
        let target_index = members
            .iter()
            .position(|m| m == target_type)
            .expect("instanceof target must be a viable union member");
        let union_value = value.codegen(ctx)?.expect("instanceof source must produce a value").into_struct_value();
        let tag = ctx.builder.build_extract_value(union_value, 0, "instanceof_tag").expect("failed to extract union tag").into_int_value();
        return Ok(ctx
            .builder
            .build_int_compare(IntPredicate::EQ, tag, tag.get_type().const_int(target_index as u64, false), "instanceof")
            .expect("instanceof comparison failed")
            .into());
    }

    let target_name = match &target_type.shape {
        TypeShape::Class(name) => name.clone(),
        _ => panic!("instanceof target must be a class or union type"),
    };
    let instance = value.codegen(ctx)?.expect("instanceof source must produce a value");
    let get_child = ctx
        .module
        .get_function("_Alta_get_child")
        .unwrap_or_else(|| {
            let ptr = ctx.context.ptr_type(inkwell::AddressSpace::default());
            let fn_type = ptr.fn_type(&[ptr.into(), ctx.context.i64_type().into()], true);
            ctx.module.add_function("_Alta_get_child", fn_type, None)
        });
    let name_ptr = ctx.string_constant_ptr(&target_name);
    let depth = ctx.context.i64_type().const_int(1, false);
    let call = ctx
        .builder
        .build_call(get_child, &[instance.into(), depth.into(), name_ptr.into()], "instanceof_lookup")
        .expect("failed to call _Alta_get_child for instanceof");
    let found = call.try_as_basic_value().left().expect("_Alta_get_child must return a value").into_pointer_value();
    Ok(ctx.builder.build_is_not_null(found, "instanceof").expect("instanceof null check failed").into())
}

fn codegen_class_instantiation<'ctx>(
    ctx: &CodegenContext<'ctx>,
    class_name: &str,
    persistent: bool,
    constructor_name: Option<&str>,
    arguments: &[ArgumentAdjustment],
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let entry_name = match constructor_name {
        Some(name) => name.to_string(),
        None if persistent => format!("_Alta_persistent_ctor_{class_name}"),
        None => format!("_Alta_stack_ctor_{class_name}"),
    };
    let constructor = ctx
        .module
        .get_function(&entry_name)
        .unwrap_or_else(|| panic!("constructor entry '{entry_name}' not declared"));

    let mut argument_values = Vec::new();
    for adjustment in arguments {
        match adjustment {
            ArgumentAdjustment::Single(expr) => {
                let value = expr.codegen(ctx)?.expect("constructor argument must produce a value");
                argument_values.push(value.into());
            }
            ArgumentAdjustment::Variadic(items) => {
                for item in items {
                    let value = item.codegen(ctx)?.expect("variadic constructor argument must produce a value");
                    argument_values.push(value.into());
                }
            }
        }
    }

    let call = ctx
        .builder
        .build_call(constructor, &argument_values, "class_instantiation")
        .expect("failed to call constructor entry");
    Ok(call.try_as_basic_value().left().expect("constructor entry must return a value"))
}

fn codegen_super_call<'ctx>(
    ctx: &CodegenContext<'ctx>,
    parent_class: &str,
    arguments: &[ArgumentAdjustment],
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let this_value = ctx
        .find_variable("this")
        .expect("super call must occur inside a constructor with a bound 'this'");
    let descriptor = ctx
        .class_descriptors
        .borrow()
        .iter()
        .find(|(_, d)| d.parents.iter().any(|p| p.name == parent_class))
        .map(|(_, d)| d.clone())
        .expect("super call's enclosing class must list the named parent");
    let field = ctx.parent_field_index(&descriptor, parent_class);
    let struct_ty = ctx.class_struct_type(&descriptor.name);
    let parent_ptr = ctx
        .builder
        .build_struct_gep(struct_ty, this_value.into_pointer_value(), field, "super_sub_object")
        .expect("super-call parent GEP failed");

    let offset_from_real_ptr = ctx.class_info_field_ptr(
        {
            let header = ctx
                .builder
                .build_struct_gep(ctx.class_struct_type(parent_class), parent_ptr, 0, "super_instance_info")
                .expect("super instance-info GEP failed");
            ctx.builder
                .build_load(ctx.context.ptr_type(inkwell::AddressSpace::default()), header, "super_class_info")
                .expect("failed to load super class-info")
                .into_pointer_value()
        },
        crate::layout::class_info_field::OFFSET_FROM_REAL,
    );
    let offset_from_real = ctx
        .builder
        .build_load(ctx.context.i64_type(), offset_from_real_ptr, "super_offset_from_real")
        .expect("failed to load offset_from_real")
        .into_int_value();
    let is_first_real = ctx
        .builder
        .build_int_compare(IntPredicate::EQ, offset_from_real, offset_from_real.get_type().const_zero(), "super_is_first_real")
        .expect("super-call diamond check failed");

    let current_block = ctx.builder.get_insert_block().expect("no active insertion block");
    let function = current_block.get_parent().expect("insertion block has no parent function");
    let call_block = ctx.context.append_basic_block(function, "super_call");
    let after_block = ctx.context.append_basic_block(function, "super_call_after");
    ctx.builder.build_conditional_branch(is_first_real, call_block, after_block).expect("failed to branch on super-call diamond guard");

    ctx.builder.position_at_end(call_block);
    let internal_ctor = ctx
        .module
        .get_function(&format!("_Alta_internal_ctor_{parent_class}"))
        .unwrap_or_else(|| panic!("internal constructor for '{parent_class}' not declared"));
    let mut argument_values = vec![parent_ptr.into()];
    for adjustment in arguments {
        match adjustment {
            ArgumentAdjustment::Single(expr) => {
                let value = expr.codegen(ctx)?.expect("super-call argument must produce a value");
                argument_values.push(value.into());
            }
            ArgumentAdjustment::Variadic(items) => {
                for item in items {
                    let value = item.codegen(ctx)?.expect("variadic super-call argument must produce a value");
                    argument_values.push(value.into());
                }
            }
        }
    }
    ctx.builder.build_call(internal_ctor, &argument_values, "super_call_invoke").expect("failed to call parent internal constructor");
    ctx.builder.build_unconditional_branch(after_block).expect("failed to branch past super call");

    ctx.builder.position_at_end(after_block);
    Ok(ctx.context.bool_type().const_zero().into())
}
