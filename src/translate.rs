//! Type Translator: lowers a [`crate::types::Type`] descriptor to an LLVM
//! type, memoised by the full (modifiers + shape) key exactly as
//! `why_lib::codegen::CodegenContext::get_llvm_type` memoises by `Type`.
//! Extends that function's match over scalars/structs/functions with
//! classes (delegated to [`crate::class_emit`]), unions, optionals and
//! bitfields, and with modifier-driven width/indirection handling the
//! source language's single-`Type::Integer` primitive didn't need.

use inkwell::types::{BasicMetadataTypeEnum, BasicTypeEnum, IntType};
use inkwell::AddressSpace;

use crate::context::CodegenContext;
use crate::types::{FunctionKind, FunctionType as OurFunctionType, Modifier, Native, Type, TypeShape};

impl<'ctx> CodegenContext<'ctx> {
    /// Translates `ty`, consulting and populating [`CodegenContext::type_cache`].
    /// Mirrors `get_llvm_type`'s cache-check-then-insert shape.
    pub fn get_llvm_type(&self, ty: &Type) -> BasicMetadataTypeEnum<'ctx> {
        {
            let cache = self.type_cache.borrow();
            if let Some(hit) = cache.get(ty) {
                return *hit;
            }
        }
        let translated = translate(ty, self);
        self.type_cache.borrow_mut().insert(ty.clone(), translated);
        translated
    }

    /// As [`CodegenContext::get_llvm_type`], but for pointer/reference
    /// modifiers returns the pointee's translation instead of wrapping it in
    /// an opaque pointer — used where a caller already holds an address and
    /// wants the type of the value at that address (e.g. `load`/`alloca`
    /// element types).
    pub fn get_llvm_type_ignoring_indirection(&self, ty: &Type) -> BasicMetadataTypeEnum<'ctx> {
        self.get_llvm_type(&ty.destroy_indirection())
    }
}

/// Converts an LLVM "metadata" type (usable as a call argument type) to a
/// "basic" type (usable for `alloca`/`load`/`store`/struct fields),
/// identical in spirit to `why_lib`'s free function of the same shape.
pub fn convert_metadata_to_basic(ty: BasicMetadataTypeEnum) -> Option<BasicTypeEnum> {
    match ty {
        BasicMetadataTypeEnum::ArrayType(t) => Some(BasicTypeEnum::ArrayType(t)),
        BasicMetadataTypeEnum::FloatType(t) => Some(BasicTypeEnum::FloatType(t)),
        BasicMetadataTypeEnum::IntType(t) => Some(BasicTypeEnum::IntType(t)),
        BasicMetadataTypeEnum::PointerType(t) => Some(BasicTypeEnum::PointerType(t)),
        BasicMetadataTypeEnum::StructType(t) => Some(BasicTypeEnum::StructType(t)),
        BasicMetadataTypeEnum::VectorType(t) => Some(BasicTypeEnum::VectorType(t)),
        _ => None,
    }
}

fn integer_width(modifiers: &[Modifier]) -> u32 {
    let long = modifiers.contains(&Modifier::Long);
    let short = modifiers.contains(&Modifier::Short);
    match (long, short) {
        (true, false) => 64,
        (false, true) => 8,
        _ => 32,
    }
}

fn int_type<'ctx>(ctx: &CodegenContext<'ctx>, width: u32) -> IntType<'ctx> {
    match width {
        8 => ctx.context.i8_type(),
        16 => ctx.context.i16_type(),
        32 => ctx.context.i32_type(),
        64 => ctx.context.i64_type(),
        other => ctx.context.custom_width_int_type(other),
    }
}

/// Bit width of a union's tag field: the smallest integer width that can
/// hold `ceil(log2(member_count))` bits. A single-member union still gets
/// an `i1` tag so the shape is uniform even in the degenerate case.
pub fn union_tag_width(member_count: usize) -> u32 {
    if member_count <= 1 {
        return 1;
    }
    let bits = (usize::BITS - (member_count - 1).leading_zeros()).max(1);
    bits
}

fn translate<'ctx>(ty: &Type, ctx: &CodegenContext<'ctx>) -> BasicMetadataTypeEnum<'ctx> {
    if ty.indirection_level() > 0 {
        return ctx.context.ptr_type(AddressSpace::default()).into();
    }

    match &ty.shape {
        TypeShape::Native(Native::Integer) => int_type(ctx, integer_width(&ty.modifiers)).into(),
        TypeShape::Native(Native::Byte) => ctx.context.i8_type().into(),
        TypeShape::Native(Native::Boolean) => ctx.context.bool_type().into(),
        TypeShape::Native(Native::Void) => {
            panic!("Type::Void cannot be translated to a BasicMetadataTypeEnum")
        }
        TypeShape::Native(Native::Float) => ctx.context.f32_type().into(),
        TypeShape::Native(Native::Double) => ctx.context.f64_type().into(),
        TypeShape::Class(name) => ctx.class_struct_type(name).into(),
        TypeShape::Union(members) => {
            let tag_width = union_tag_width(members.len());
            let tag_ty = int_type(ctx, tag_width);
            let payload_bytes = members
                .iter()
                .map(|m| payload_store_size(ctx, m))
                .max()
                .unwrap_or(0);
            let payload_ty = ctx.context.i8_type().array_type(payload_bytes as u32);
            ctx.context
                .struct_type(&[tag_ty.into(), payload_ty.into()], false)
                .into()
        }
        TypeShape::Optional(inner) => {
            let inner_metadata = ctx.get_llvm_type(inner);
            let inner_basic =
                convert_metadata_to_basic(inner_metadata).expect("optional payload must be a basic type");
            ctx.context
                .struct_type(&[ctx.context.bool_type().into(), inner_basic], false)
                .into()
        }
        TypeShape::Bitfield(bf) => int_type(ctx, bf.underlying_width).into(),
        // Raw function *values* are opaque pointers, like every other
        // indirect type this translator produces; the concrete
        // `FunctionType` (needed only at declaration sites) is built
        // separately by `get_llvm_function_type` below.
        TypeShape::Function(OurFunctionType { kind: FunctionKind::Raw, .. }) => {
            ctx.context.ptr_type(AddressSpace::default()).into()
        }
        TypeShape::Function(OurFunctionType { kind: FunctionKind::Closure, .. }) => {
            ctx.get_closure_struct_type().into()
        }
    }
}

impl<'ctx> CodegenContext<'ctx> {
    /// Builds the concrete `inkwell::types::FunctionType` for a raw function
    /// type, used when declaring or calling a named function directly
    /// (closures never need this: they are always called indirectly through
    /// `extract_closure_fn_ptr` with a type built ad hoc at the call site).
    pub fn get_llvm_function_type(
        &self,
        params: &[Type],
        return_value: &Type,
        is_variadic: bool,
    ) -> inkwell::types::FunctionType<'ctx> {
        let param_types: Vec<BasicMetadataTypeEnum> =
            params.iter().map(|p| self.get_llvm_type(p)).collect();
        match return_value.shape {
            TypeShape::Native(Native::Void) => {
                self.context.void_type().fn_type(&param_types, is_variadic)
            }
            _ => {
                let ret_metadata = self.get_llvm_type(return_value);
                let ret_basic = convert_metadata_to_basic(ret_metadata)
                    .expect("function return type must be basic");
                ret_basic.fn_type(&param_types, is_variadic)
            }
        }
    }
}

/// Store size in bytes of `ty`'s LLVM translation, used to size a union's
/// payload array. `inkwell` does not expose `store_size` without a
/// `TargetData`, so this backend computes it structurally for the shapes a
/// union member can have (scalars, pointers, classes, nested unions/optionals)
/// rather than carrying a `TargetData` through every translate call.
pub(crate) fn payload_store_size<'ctx>(ctx: &CodegenContext<'ctx>, ty: &Type) -> u64 {
    if ty.indirection_level() > 0 {
        return 8;
    }
    match &ty.shape {
        TypeShape::Native(Native::Integer) => (integer_width(&ty.modifiers) / 8) as u64,
        TypeShape::Native(Native::Byte) => 1,
        TypeShape::Native(Native::Boolean) => 1,
        TypeShape::Native(Native::Void) => 0,
        TypeShape::Native(Native::Float) => 4,
        TypeShape::Native(Native::Double) => 8,
        TypeShape::Class(name) => ctx
            .class_descriptors
            .borrow()
            .get(name)
            .map(|d| {
                let header = if d.has_instance_info() { 8 } else { 0 };
                header
                    + d.parents
                        .iter()
                        .map(|p| {
                            payload_store_size(ctx, &Type::class(p.name.clone()))
                        })
                        .sum::<u64>()
                    + d.members
                        .iter()
                        .map(|m| payload_store_size(ctx, &m.ty))
                        .sum::<u64>()
            })
            .unwrap_or(8),
        TypeShape::Union(members) => {
            let tag_bytes = (union_tag_width(members.len()) as u64 + 7) / 8;
            tag_bytes + members.iter().map(|m| payload_store_size(ctx, m)).max().unwrap_or(0)
        }
        TypeShape::Optional(inner) => 1 + payload_store_size(ctx, inner),
        TypeShape::Bitfield(bf) => (bf.underlying_width as u64 + 7) / 8,
        TypeShape::Function(f) => match f.kind {
            FunctionKind::Raw => 8,
            FunctionKind::Closure => 16,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_tag_width_covers_member_count() {
        assert_eq!(union_tag_width(1), 1);
        assert_eq!(union_tag_width(2), 1);
        assert_eq!(union_tag_width(3), 2);
        assert_eq!(union_tag_width(4), 2);
        assert_eq!(union_tag_width(5), 3);
        assert_eq!(union_tag_width(256), 8);
    }
}
