//! Fixed LLVM types for the runtime descriptors every compiled class and
//! closure participates in: class-info, instance-info, basic-class,
//! basic-function and basic-lambda-state. Built once per module in
//! [`RuntimeTypes::new`], the same way [`crate::context::CodegenContext::get_closure_struct_type`]
//! builds the closure struct once and hands out copies of the `StructType`
//! handle rather than rebuilding it per use site.
//!
//! Field layout here is not a style choice: `_Alta_class_info`'s seven
//! fields in this exact order are read by the accompanying C runtime
//! (`_Alta_get_child`, cast/destroy helpers), so reordering or adding a
//! field here is an ABI break.

use inkwell::context::Context;
use inkwell::types::{FunctionType, StructType};
use inkwell::AddressSpace;

#[derive(Debug, Clone, Copy)]
pub struct RuntimeTypes<'ctx> {
    /// `{ i8*, void(i8*)*, i8*, i64, i64, i64, i64 }`:
    /// type_name, destructor, child_name, offset_from_real, offset_from_base,
    /// offset_from_owner, offset_to_next.
    pub class_info: StructType<'ctx>,
    /// `{ class_info* }`
    pub instance_info: StructType<'ctx>,
    /// `{ instance_info }`
    pub basic_class: StructType<'ctx>,
    /// `{ i8*, i8* }`: code pointer, lambda-state pointer (null for raw fns).
    pub basic_function: StructType<'ctx>,
    /// `{ i64 }`: atomic reference count.
    pub basic_lambda_state: StructType<'ctx>,
    /// `void(i8*)`: the class-destructor function pointer type stored in
    /// `class_info`.
    pub destructor_fn: FunctionType<'ctx>,
}

impl<'ctx> RuntimeTypes<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        let i8_ptr = context.ptr_type(AddressSpace::default());
        let i64_t = context.i64_type();

        let destructor_fn = context.void_type().fn_type(&[i8_ptr.into()], false);
        let destructor_ptr = context.ptr_type(AddressSpace::default());

        let class_info = context.opaque_struct_type("_Alta_class_info");
        class_info.set_body(
            &[
                i8_ptr.into(),        // type_name
                destructor_ptr.into(), // destructor (nullable)
                i8_ptr.into(),        // child_name
                i64_t.into(),         // offset_from_real
                i64_t.into(),         // offset_from_base
                i64_t.into(),         // offset_from_owner
                i64_t.into(),         // offset_to_next
            ],
            false,
        );

        let instance_info = context.opaque_struct_type("_Alta_instance_info");
        instance_info.set_body(&[context.ptr_type(AddressSpace::default()).into()], false);

        let basic_class = context.opaque_struct_type("_Alta_basic_class");
        basic_class.set_body(&[instance_info.into()], false);

        let basic_function = context.opaque_struct_type("_Alta_basic_function");
        basic_function.set_body(&[i8_ptr.into(), i8_ptr.into()], false);

        let basic_lambda_state = context.opaque_struct_type("_Alta_basic_lambda_state");
        basic_lambda_state.set_body(&[i64_t.into()], false);

        Self {
            class_info,
            instance_info,
            basic_class,
            basic_function,
            basic_lambda_state,
            destructor_fn,
        }
    }
}

/// Byte offsets of each `class_info` field, used by [`crate::class_emit`]
/// when it builds the constant initializer for a class-info global and by
/// [`crate::cast`] when it reads `offset_from_real`/`offset_from_base` back
/// out at a downcast site. Kept as named indices rather than magic numbers
/// scattered across those modules.
pub mod class_info_field {
    pub const TYPE_NAME: u32 = 0;
    pub const DESTRUCTOR: u32 = 1;
    pub const CHILD_NAME: u32 = 2;
    pub const OFFSET_FROM_REAL: u32 = 3;
    pub const OFFSET_FROM_BASE: u32 = 4;
    pub const OFFSET_FROM_OWNER: u32 = 5;
    pub const OFFSET_TO_NEXT: u32 = 6;
}
