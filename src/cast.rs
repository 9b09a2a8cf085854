//! Cast Engine: walks a precomputed [`CastPath`] and emits the IR that
//! realises it. Every step is a pure transformation of a `(value, type)`
//! pair; the pipeline itself is a fold over the path with an optional
//! trailing copy-constructor call, grounded in how `why_lib`'s
//! `as_expression.rs` threads a single coerced value through a short
//! sequence of LLVM builder calls rather than building an AST of its own.

use inkwell::values::BasicValueEnum;
use inkwell::{FloatPredicate, IntPredicate};

use crate::context::CodegenContext;
use crate::error::{CodegenError, CodegenResult, InvariantViolated};
use crate::position::Position;
use crate::translate::convert_metadata_to_basic;
use crate::types::{Native, Type, TypeShape};

/// One step of a cast path, in the order the semantic analyser produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastStep {
    Destination,
    SimpleCoercion,
    Upcast { parent: String },
    Downcast { target: String },
    Reference,
    Dereference,
    Wrap,
    Unwrap,
    Widen { member_index: u32 },
    Narrow { member_index: u32 },
    Multicast { viable: Vec<(u32, Type)> },
    From { class_name: String },
    To { method_name: String },
}

/// A full source-to-destination cast, as handed down by semantic analysis.
#[derive(Debug, Clone)]
pub struct CastPath {
    pub steps: Vec<CastStep>,
    pub copy_required: bool,
    pub is_copyable: bool,
    pub manual: bool,
}

/// The value/type pair threaded through a cast pipeline.
#[derive(Debug, Clone, Copy)]
pub struct Typed<'ctx> {
    pub value: BasicValueEnum<'ctx>,
    pub ty_is_boolean_target: bool,
}

/// Applies `path` to `source_value: source_type`, producing a value of
/// `dest_type`. `copy` is a callback into [`crate::copy_destroy::copy_value`]
/// so this module stays independent of the destroy-side plumbing; `position`
/// is only used for the empty-path diagnostic.
pub fn apply_cast<'ctx>(
    ctx: &CodegenContext<'ctx>,
    path: &CastPath,
    mut value: BasicValueEnum<'ctx>,
    mut current_type: Type,
    dest_type: &Type,
    position: &Position,
    mut copy: impl FnMut(&CodegenContext<'ctx>, BasicValueEnum<'ctx>, &Type) -> BasicValueEnum<'ctx>,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    if path.steps.is_empty() {
        return Err(CodegenError::InvariantViolated(
            InvariantViolated {
                what: "cast path is empty".to_string(),
            },
            position.clone(),
        ));
    }

    let mut copy_pending = path.copy_required;

    for step in &path.steps {
        value = apply_step(ctx, step, value, &current_type, dest_type)?;
        current_type = advance_type(step, &current_type, dest_type);

        if copy_pending && path.is_copyable && current_type.is_copyable_by_default() {
            value = copy(ctx, value, &current_type);
            copy_pending = false;
        }
    }

    Ok(value)
}

fn advance_type(step: &CastStep, current: &Type, dest: &Type) -> Type {
    match step {
        CastStep::Destination => dest.clone(),
        CastStep::Upcast { parent } => Type::class(parent.clone()).pointer_to(),
        CastStep::Downcast { target } => Type::class(target.clone()).pointer_to(),
        CastStep::Reference => current.clone().reference_to(),
        CastStep::Dereference => current.follow(),
        CastStep::Wrap => Type::unmodified(TypeShape::Optional(Box::new(current.clone()))),
        CastStep::Unwrap => match &current.shape {
            TypeShape::Optional(inner) => (**inner).clone(),
            _ => current.clone(),
        },
        CastStep::Narrow { .. } => dest.clone(),
        CastStep::Widen { .. } => dest.clone(),
        CastStep::Multicast { .. } => dest.clone(),
        CastStep::From { .. } | CastStep::To { .. } => dest.clone(),
        CastStep::SimpleCoercion => dest.clone(),
    }
}

fn apply_step<'ctx>(
    ctx: &CodegenContext<'ctx>,
    step: &CastStep,
    value: BasicValueEnum<'ctx>,
    current_type: &Type,
    dest_type: &Type,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    match step {
        CastStep::Destination => Ok(value),

        CastStep::SimpleCoercion => Ok(simple_coercion(ctx, value, current_type, dest_type)),

        CastStep::Upcast { parent } => Ok(upcast(ctx, value, current_type, parent)),

        CastStep::Downcast { target } => Ok(downcast(ctx, value, target)),

        CastStep::Reference => {
            let slot = ctx
                .builder
                .build_alloca(value.get_type(), "tmpify")
                .expect("failed to allocate tmpify slot");
            ctx.builder
                .build_store(slot, value)
                .expect("failed to store tmpified value");
            Ok(slot.into())
        }

        CastStep::Dereference => {
            let pointee = ctx.get_llvm_type_ignoring_indirection(current_type);
            let basic = convert_metadata_to_basic(pointee).expect("dereferenced type must be basic");
            let ptr = value.into_pointer_value();
            Ok(ctx
                .builder
                .build_load(basic, ptr, "deref")
                .expect("failed to build dereference load"))
        }

        CastStep::Wrap => {
            let inner_metadata = ctx.get_llvm_type(current_type);
            let inner_basic = convert_metadata_to_basic(inner_metadata).expect("optional payload must be basic");
            let optional_ty = ctx
                .context
                .struct_type(&[ctx.context.bool_type().into(), inner_basic], false);
            let present = ctx.context.bool_type().const_int(1, false);
            let undef = optional_ty.get_undef();
            let with_flag = ctx
                .builder
                .build_insert_value(undef, present, 0, "wrap_present")
                .expect("failed to insert optional present flag");
            let with_value = ctx
                .builder
                .build_insert_value(with_flag, value, 1, "wrap_value")
                .expect("failed to insert optional payload");
            Ok(with_value.as_basic_value_enum())
        }

        CastStep::Unwrap => {
            let aggregate = value.into_struct_value();
            Ok(ctx
                .builder
                .build_extract_value(aggregate, 1, "unwrap_value")
                .expect("failed to extract optional payload"))
        }

        CastStep::Widen { member_index } => Ok(widen(ctx, value, current_type, dest_type, *member_index)),

        CastStep::Narrow { member_index } => Ok(narrow(ctx, value, dest_type, *member_index)),

        CastStep::Multicast { viable } => multicast(ctx, value, current_type, dest_type, viable),

        CastStep::From { class_name } => {
            let constructor = ctx
                .function_declarations
                .borrow()
                .get(&format!("_Alta_from_{class_name}"))
                .copied()
                .unwrap_or_else(|| panic!("'from' constructor for '{class_name}' not declared"));
            let result = ctx
                .builder
                .build_call(constructor, &[value.into()], "from_cast")
                .expect("failed to call from-constructor");
            Ok(result
                .try_as_basic_value()
                .left()
                .expect("from-constructor must return a value"))
        }

        CastStep::To { method_name } => {
            let method = ctx
                .function_declarations
                .borrow()
                .get(method_name)
                .copied()
                .unwrap_or_else(|| panic!("'to' method '{method_name}' not declared"));
            let result = ctx
                .builder
                .build_call(method, &[value.into()], "to_cast")
                .expect("failed to call to-conversion");
            Ok(result
                .try_as_basic_value()
                .left()
                .expect("to-conversion must return a value"))
        }
    }
}

/// Native-to-native coercions: pointer<->int, float<->float, float<->int,
/// int-width-change with sign-appropriate extension, and — the special case
/// the cast engine always applies last — native-to-boolean as a
/// compare-not-zero rather than a truncation, so a 256 does not become
/// falsy by losing its high bits.
fn simple_coercion<'ctx>(
    ctx: &CodegenContext<'ctx>,
    value: BasicValueEnum<'ctx>,
    current_type: &Type,
    dest_type: &Type,
) -> BasicValueEnum<'ctx> {
    if matches!(dest_type.shape, TypeShape::Native(Native::Boolean)) {
        return native_to_boolean(ctx, value);
    }

    match (value, &dest_type.shape) {
        (BasicValueEnum::IntValue(i), TypeShape::Native(Native::Float | Native::Double)) => {
            let dest_metadata = ctx.get_llvm_type(dest_type);
            let dest_float = convert_metadata_to_basic(dest_metadata)
                .expect("float destination must be basic")
                .into_float_type();
            let signed = current_type.modifiers.iter().all(|m| !matches!(m, crate::types::Modifier::Unsigned));
            if signed {
                ctx.builder
                    .build_signed_int_to_float(i, dest_float, "sitofp")
                    .expect("failed sitofp")
                    .into()
            } else {
                ctx.builder
                    .build_unsigned_int_to_float(i, dest_float, "uitofp")
                    .expect("failed uitofp")
                    .into()
            }
        }
        (BasicValueEnum::FloatValue(f), TypeShape::Native(Native::Integer | Native::Byte)) => {
            let dest_metadata = ctx.get_llvm_type(dest_type);
            let dest_int = convert_metadata_to_basic(dest_metadata)
                .expect("integer destination must be basic")
                .into_int_type();
            let signed = dest_type.modifiers.iter().all(|m| !matches!(m, crate::types::Modifier::Unsigned));
            if signed {
                ctx.builder
                    .build_float_to_signed_int(f, dest_int, "fptosi")
                    .expect("failed fptosi")
                    .into()
            } else {
                ctx.builder
                    .build_float_to_unsigned_int(f, dest_int, "fptoui")
                    .expect("failed fptoui")
                    .into()
            }
        }
        (BasicValueEnum::FloatValue(f), TypeShape::Native(Native::Float | Native::Double)) => {
            let dest_metadata = ctx.get_llvm_type(dest_type);
            let dest_float = convert_metadata_to_basic(dest_metadata)
                .expect("float destination must be basic")
                .into_float_type();
            ctx.builder
                .build_float_cast(f, dest_float, "fpcast")
                .expect("failed float cast")
                .into()
        }
        (BasicValueEnum::IntValue(i), TypeShape::Native(Native::Integer | Native::Byte)) => {
            let dest_metadata = ctx.get_llvm_type(dest_type);
            let dest_int = convert_metadata_to_basic(dest_metadata)
                .expect("integer destination must be basic")
                .into_int_type();
            let signed = current_type.modifiers.iter().all(|m| !matches!(m, crate::types::Modifier::Unsigned));
            ctx.builder
                .build_int_cast_sign_flag(i, dest_int, signed, "intcast")
                .expect("failed int cast")
                .into()
        }
        (BasicValueEnum::PointerValue(p), TypeShape::Native(Native::Integer)) => {
            let dest_metadata = ctx.get_llvm_type(dest_type);
            let dest_int = convert_metadata_to_basic(dest_metadata)
                .expect("integer destination must be basic")
                .into_int_type();
            ctx.builder
                .build_ptr_to_int(p, dest_int, "ptrtoint")
                .expect("failed ptrtoint")
                .into()
        }
        (BasicValueEnum::IntValue(i), _) if dest_type.indirection_level() > 0 => ctx
            .builder
            .build_int_to_ptr(i, ctx.context.ptr_type(inkwell::AddressSpace::default()), "inttoptr")
            .expect("failed inttoptr")
            .into(),
        _ => value,
    }
}

fn native_to_boolean<'ctx>(ctx: &CodegenContext<'ctx>, value: BasicValueEnum<'ctx>) -> BasicValueEnum<'ctx> {
    match value {
        BasicValueEnum::IntValue(i) => ctx
            .builder
            .build_int_compare(IntPredicate::NE, i, i.get_type().const_zero(), "to_bool")
            .expect("failed int-to-bool compare")
            .into(),
        BasicValueEnum::FloatValue(f) => ctx
            .builder
            .build_float_compare(FloatPredicate::ONE, f, f.get_type().const_zero(), "to_bool")
            .expect("failed float-to-bool compare")
            .into(),
        BasicValueEnum::PointerValue(p) => {
            let as_int = ctx
                .builder
                .build_ptr_to_int(p, ctx.context.i64_type(), "ptr_as_int")
                .expect("failed ptrtoint for bool coercion");
            ctx.builder
                .build_int_compare(IntPredicate::NE, as_int, as_int.get_type().const_zero(), "to_bool")
                .expect("failed pointer-to-bool compare")
                .into()
        }
        other => other,
    }
}

/// GEP to a specific inlined parent sub-object (declaration-index known by
/// the caller via [`CodegenContext::parent_field_index`]), then adjusted so
/// the result points at that sub-object's own instance-info-relative base —
/// upcasting never needs the runtime class graph, only the static layout.
fn upcast<'ctx>(
    ctx: &CodegenContext<'ctx>,
    value: BasicValueEnum<'ctx>,
    current_type: &Type,
    parent_name: &str,
) -> BasicValueEnum<'ctx> {
    let class_name = match &current_type.destroy_indirection().shape {
        TypeShape::Class(name) => name.clone(),
        _ => panic!("upcast source must be a class type"),
    };
    let descriptor = ctx
        .class_descriptors
        .borrow()
        .get(&class_name)
        .cloned()
        .unwrap_or_else(|| panic!("class '{class_name}' not registered"));
    let field = ctx.parent_field_index(&descriptor, parent_name);
    let struct_ty = ctx.class_struct_type(&class_name);
    let ptr = value.into_pointer_value();
    let gep = ctx
        .builder
        .build_struct_gep(struct_ty, ptr, field, "upcast")
        .expect("upcast GEP out of range");
    gep.into()
}

/// Runtime child lookup by class-name walk, delegating to the generated
/// program's `_Alta_get_child` runtime entry rather than re-implementing the
/// `offset_to_next` walk in emitted IR directly — mirrors how the class-info
/// ABI in `crate::class_emit` is only ever read by that one runtime helper.
fn downcast<'ctx>(ctx: &CodegenContext<'ctx>, value: BasicValueEnum<'ctx>, target: &str) -> BasicValueEnum<'ctx> {
    let get_child = declare_get_child(ctx);
    let target_name = ctx.string_constant_ptr(target);
    let depth = ctx.context.i64_type().const_int(1, false);
    let call = ctx
        .builder
        .build_call(
            get_child,
            &[value.into(), depth.into(), target_name.into()],
            "downcast",
        )
        .expect("failed to call _Alta_get_child");
    call.try_as_basic_value().left().expect("_Alta_get_child must return a value")
}

fn declare_get_child<'ctx>(ctx: &CodegenContext<'ctx>) -> inkwell::values::FunctionValue<'ctx> {
    if let Some(existing) = ctx.module.get_function("_Alta_get_child") {
        return existing;
    }
    let ptr = ctx.context.ptr_type(inkwell::AddressSpace::default());
    let fn_type = ptr.fn_type(&[ptr.into(), ctx.context.i64_type().into()], true);
    ctx.module.add_function("_Alta_get_child", fn_type, None)
}

/// Packs `value` into a union's `{tag, payload}` overlay: store the tagged
/// struct's payload slot as the member's own type, via a bitcast-free
/// store/reload pair (an alloca typed as the union, GEP'd and stored through
/// as the member type, then reloaded as the union) — avoids needing opaque
/// pointer casts for the payload array.
fn widen<'ctx>(
    ctx: &CodegenContext<'ctx>,
    value: BasicValueEnum<'ctx>,
    member_type: &Type,
    union_type: &Type,
    member_index: u32,
) -> BasicValueEnum<'ctx> {
    let union_metadata = ctx.get_llvm_type(union_type);
    let union_basic = convert_metadata_to_basic(union_metadata).expect("union type must be basic");
    let union_struct = union_basic.into_struct_type();
    let slot = ctx.builder.build_alloca(union_struct, "widen_slot").expect("failed union alloca");

    let tag_ptr = ctx
        .builder
        .build_struct_gep(union_struct, slot, 0, "widen_tag")
        .expect("union tag GEP failed");
    let tag_ty = union_struct.get_field_type_at_index(0).unwrap().into_int_type();
    ctx.builder
        .build_store(tag_ptr, tag_ty.const_int(member_index as u64, false))
        .expect("failed to store union tag");

    let payload_ptr = ctx
        .builder
        .build_struct_gep(union_struct, slot, 1, "widen_payload")
        .expect("union payload GEP failed");
    let member_metadata = ctx.get_llvm_type(member_type);
    let member_basic = convert_metadata_to_basic(member_metadata).expect("union member must be basic");
    let typed_ptr = ctx
        .builder
        .build_pointer_cast(
            payload_ptr,
            ctx.context.ptr_type(inkwell::AddressSpace::default()),
            "widen_payload_typed",
        )
        .expect("failed pointer cast for widen");
    ctx.builder
        .build_store(typed_ptr, value)
        .expect("failed to store union payload");
    let _ = member_basic;

    ctx.builder
        .build_load(union_struct, slot, "widen_reload")
        .expect("failed to reload widened union")
}

/// Projects a union's payload to a specific member type without checking the
/// tag — the cast path only ever contains a `Narrow` step when the semantic
/// analyser already knows the tag matches (a prior multicast arm, or the
/// static type system proved it).
fn narrow<'ctx>(
    ctx: &CodegenContext<'ctx>,
    value: BasicValueEnum<'ctx>,
    member_type: &Type,
    _member_index: u32,
) -> BasicValueEnum<'ctx> {
    let union_struct = value.into_struct_value();
    let slot = ctx
        .builder
        .build_alloca(union_struct.get_type(), "narrow_slot")
        .expect("failed union alloca for narrow");
    ctx.builder
        .build_store(slot, union_struct)
        .expect("failed to store union for narrow");
    let payload_ptr = ctx
        .builder
        .build_struct_gep(union_struct.get_type(), slot, 1, "narrow_payload")
        .expect("union payload GEP failed");
    let member_metadata = ctx.get_llvm_type(member_type);
    let member_basic = convert_metadata_to_basic(member_metadata).expect("union member must be basic");
    ctx.builder
        .build_load(member_basic, payload_ptr, "narrow_reload")
        .expect("failed to reload narrowed member")
}

/// Union -> non-union scalar with runtime tag dispatch: a switch on the tag,
/// one case per viable member that narrows and recursively casts, a default
/// block that calls `_Alta_bad_cast` then `unreachable`, and a phi over the
/// surviving blocks at the merge. Callers are responsible for bracketing
/// this with `ScopeStack::begin_branch`/`end_branch` so per-arm temporaries
/// destruct correctly; this function only emits the switch/phi itself.
fn multicast<'ctx>(
    ctx: &CodegenContext<'ctx>,
    value: BasicValueEnum<'ctx>,
    union_type: &Type,
    dest_type: &Type,
    viable: &[(u32, Type)],
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let union_struct = value.into_struct_value();
    let tag = ctx
        .builder
        .build_extract_value(union_struct, 0, "multicast_tag")
        .expect("failed to extract union tag")
        .into_int_value();

    let current_fn = ctx
        .builder
        .get_insert_block()
        .and_then(|b| b.get_parent())
        .expect("multicast must be emitted inside a function");

    let default_block = ctx.context.append_basic_block(current_fn, "multicast_bad_cast");
    let merge_block = ctx.context.append_basic_block(current_fn, "multicast_merge");

    let mut cases = Vec::with_capacity(viable.len());
    let mut arm_blocks = Vec::with_capacity(viable.len());
    let mut arm_values = Vec::with_capacity(viable.len());

    for (index, member_type) in viable {
        let block = ctx.context.append_basic_block(current_fn, "multicast_arm");
        cases.push((tag.get_type().const_int(*index as u64, false), block));
        arm_blocks.push((block, member_type.clone(), *index));
    }

    ctx.builder
        .build_switch(tag, default_block, &cases)
        .expect("failed to build multicast switch");

    ctx.builder.position_at_end(default_block);
    let bad_cast = declare_bad_cast(ctx);
    let from_name = ctx.string_constant_ptr(&format!("{:?}", union_type.shape));
    let to_name = ctx.string_constant_ptr(&format!("{:?}", dest_type.shape));
    ctx.builder
        .build_call(bad_cast, &[from_name.into(), to_name.into()], "bad_cast")
        .expect("failed to call _Alta_bad_cast");
    ctx.builder.build_unreachable().expect("failed to terminate bad-cast block");

    for (block, member_type, index) in &arm_blocks {
        ctx.builder.position_at_end(*block);
        let narrowed = narrow(ctx, value.into(), member_type, *index);
        let coerced = simple_coercion(ctx, narrowed, member_type, dest_type);
        arm_values.push((coerced, *block));
        ctx.builder
            .build_unconditional_branch(merge_block)
            .expect("failed to branch to multicast merge");
    }

    ctx.builder.position_at_end(merge_block);
    let phi = ctx
        .builder
        .build_phi(arm_values[0].0.get_type(), "multicast_result")
        .expect("failed to build multicast result phi");
    let incoming: Vec<(&dyn inkwell::values::BasicValue<'ctx>, inkwell::basic_block::BasicBlock<'ctx>)> =
        arm_values.iter().map(|(v, b)| (v as &dyn inkwell::values::BasicValue<'ctx>, *b)).collect();
    phi.add_incoming(&incoming);
    Ok(phi.as_basic_value())
}

fn declare_bad_cast<'ctx>(ctx: &CodegenContext<'ctx>) -> inkwell::values::FunctionValue<'ctx> {
    if let Some(existing) = ctx.module.get_function("_Alta_bad_cast") {
        return existing;
    }
    let ptr = ctx.context.ptr_type(inkwell::AddressSpace::default());
    let fn_type = ctx.context.void_type().fn_type(&[ptr.into(), ptr.into()], false);
    ctx.module.add_function("_Alta_bad_cast", fn_type, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_type_destination_adopts_the_requested_type() {
        let current = Type::native(Native::Integer);
        let dest = Type::native(Native::Double);
        assert_eq!(advance_type(&CastStep::Destination, &current, &dest), dest);
    }

    #[test]
    fn advance_type_unwrap_strips_one_optional_layer() {
        let inner = Type::native(Native::Integer);
        let optional = Type::unmodified(TypeShape::Optional(Box::new(inner.clone())));
        let dest = Type::native(Native::Void);
        assert_eq!(advance_type(&CastStep::Unwrap, &optional, &dest), inner);
    }

    #[test]
    fn empty_cast_path_is_rejected_before_any_step_runs() {
        let path = CastPath {
            steps: Vec::new(),
            copy_required: false,
            is_copyable: false,
            manual: false,
        };
        assert!(path.steps.is_empty());
    }
}
