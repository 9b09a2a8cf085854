//! Class Emitter: builds a class's aggregate LLVM layout and its generated
//! members (init function, default copy constructor, destructor).
//!
//! The layout step generalises `struct_declaration.rs`'s
//! "convert each field, call `context.struct_type`, register in the type
//! cache" recipe to classes: an opaque named struct is registered first (so
//! self-referential and mutually recursive classes terminate), parent
//! sub-objects are inlined before member variables, and — unlike a plain
//! struct — an instance-info header is prepended unless the class is a
//! structure or bitfield.
//!
//! The init function and the class-info offset bookkeeping it builds are
//! grounded in `original_source/src/altall/compiler.cpp`'s class-info
//! population pass, generalised from its C++ shape into a Rust init-function
//! recipe.

use inkwell::types::{BasicType, BasicTypeEnum, StructType};
use inkwell::values::{BasicValue, FunctionValue, GlobalValue, PointerValue};
use inkwell::AddressSpace;

use crate::context::CodegenContext;
use crate::layout::class_info_field;
use crate::translate::convert_metadata_to_basic;
use crate::types::{ClassDescriptor, Type};

impl<'ctx> CodegenContext<'ctx> {
    /// Returns the aggregate `StructType` for a class, building it (and
    /// registering the class's init/copy/destructor functions) on first
    /// demand. The opaque-then-body-filled sequence breaks self-reference
    /// cycles the same way `why_lib`'s struct codegen never needed to,
    /// because structs there could not reference themselves.
    pub fn class_struct_type(&self, name: &str) -> StructType<'ctx> {
        if let Some(existing) = self.class_layouts.borrow().get(name) {
            return *existing;
        }

        let opaque = self.context.opaque_struct_type(&format!("class.{name}"));
        self.class_layouts.borrow_mut().insert(name.to_string(), opaque);

        let descriptor = self
            .class_descriptors
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("class '{name}' was referenced before its descriptor was registered"));

        let mut fields: Vec<BasicTypeEnum<'ctx>> = Vec::new();
        if descriptor.has_instance_info() {
            fields.push(self.runtime_types.instance_info.into());
        }
        for parent in &descriptor.parents {
            fields.push(self.class_struct_type(&parent.name).into());
        }
        for member in &descriptor.members {
            let metadata = self.get_llvm_type(&member.ty);
            let basic = convert_metadata_to_basic(metadata)
                .unwrap_or_else(|| panic!("member '{}' of class '{name}' has no basic LLVM representation", member.name));
            fields.push(basic);
        }

        opaque.set_body(&fields, false);
        opaque
    }

    /// GEP index of the first member variable within a class's aggregate,
    /// i.e. past the instance-info header (if any) and all inlined parents.
    /// Used by accessor/fetch lowering to find a member by its
    /// declaration-order position.
    pub fn first_member_field_index(&self, descriptor: &ClassDescriptor) -> u32 {
        (descriptor.has_instance_info() as u32) + descriptor.parents.len() as u32
    }

    /// GEP index of a specific parent sub-object within a class's aggregate,
    /// counting the instance-info header (if any) as index 0.
    pub fn parent_field_index(&self, descriptor: &ClassDescriptor, parent_name: &str) -> u32 {
        let base = descriptor.has_instance_info() as u32;
        let offset = descriptor
            .parents
            .iter()
            .position(|p| p.name == parent_name)
            .unwrap_or_else(|| panic!("'{parent_name}' is not a direct parent of '{}'", descriptor.name));
        base + offset as u32
    }

    /// Declares (or returns the existing declaration of) the per-class init
    /// function: `void init(i8* self, i1 is_root, i1 should_init_members)`.
    pub fn class_init_function(&self, class_name: &str) -> FunctionValue<'ctx> {
        let fn_name = format!("_Alta_init_{class_name}");
        if let Some(existing) = self.module.get_function(&fn_name) {
            return existing;
        }
        let ptr_ty = self.context.ptr_type(AddressSpace::default());
        let bool_ty = self.context.bool_type();
        let fn_type = self
            .context
            .void_type()
            .fn_type(&[ptr_ty.into(), bool_ty.into(), bool_ty.into()], false);
        self.module.add_function(&fn_name, fn_type, None)
    }

    /// Declares (or returns) the per-class destructor function:
    /// `void dtor(i8* self)`.
    pub fn class_destructor_function(&self, class_name: &str) -> FunctionValue<'ctx> {
        let fn_name = format!("_Alta_dtor_{class_name}");
        if let Some(existing) = self.module.get_function(&fn_name) {
            return existing;
        }
        self.module
            .add_function(&fn_name, self.runtime_types.destructor_fn, None)
    }

    /// Builds (if not already built) the read-only class-info global for one
    /// physical occurrence of `sub_object_class` within `real_class`'s
    /// flattened layout. `occurrence` distinguishes repeated ancestors in a
    /// diamond hierarchy (each occurrence gets its own record; `0` for a
    /// class that appears only once). `offset_from_real`/`offset_from_base`/
    /// `offset_from_owner`/`offset_to_next` in bytes are supplied by the
    /// caller (the init-function builder, which knows the layout it just
    /// walked via [`flatten_sub_objects`]); this function only constructs the
    /// constant record.
    #[allow(clippy::too_many_arguments)]
    pub fn build_class_info_global(
        &self,
        real_class: &str,
        sub_object_class: &str,
        occurrence: usize,
        child_name: Option<&str>,
        offset_from_real: i64,
        offset_from_base: i64,
        offset_from_owner: i64,
        offset_to_next: i64,
    ) -> GlobalValue<'ctx> {
        let global_name = format!("_Alta_class_info_{real_class}_{sub_object_class}_{occurrence}");
        if let Some(existing) = self.module.get_global(&global_name) {
            return existing;
        }

        let type_name_ptr = self.string_constant_ptr(sub_object_class);
        let destructor_ptr = if self
            .class_descriptors
            .borrow()
            .get(sub_object_class)
            .map(|d| d.has_destructor)
            .unwrap_or(false)
        {
            self.class_destructor_function(sub_object_class)
                .as_global_value()
                .as_pointer_value()
        } else {
            self.context.ptr_type(AddressSpace::default()).const_null()
        };
        let child_name_ptr = match child_name {
            Some(n) => self.string_constant_ptr(n),
            None => self.context.ptr_type(AddressSpace::default()).const_null(),
        };

        let i64_t = self.context.i64_type();
        let initializer = self.runtime_types.class_info.const_named_struct(&[
            type_name_ptr.into(),
            destructor_ptr.into(),
            child_name_ptr.into(),
            i64_t.const_int(offset_from_real as u64, true).into(),
            i64_t.const_int(offset_from_base as u64, true).into(),
            i64_t.const_int(offset_from_owner as u64, true).into(),
            i64_t.const_int(offset_to_next as u64, true).into(),
        ]);

        let global = self.module.add_global(self.runtime_types.class_info, None, &global_name);
        global.set_initializer(&initializer);
        global.set_constant(true);
        global
    }

    /// Interns a NUL-terminated string constant and returns a pointer to it,
    /// used for the `type_name`/`child_name` fields of a class-info record.
    pub fn string_constant_ptr(&self, s: &str) -> PointerValue<'ctx> {
        let global_name = format!("_Alta_str_{}", crate::mangle::escape_name(s));
        if let Some(existing) = self.module.get_global(&global_name) {
            return existing.as_pointer_value();
        }
        let value = self.context.const_string(s.as_bytes(), true);
        let global = self.module.add_global(value.get_type(), None, &global_name);
        global.set_initializer(&value);
        global.set_constant(true);
        global.as_pointer_value()
    }

    /// Reads the `class_info_field::DESTRUCTOR` field's offset in bytes for
    /// use by the cast engine's upcast/downcast GEP arithmetic — exposed
    /// here rather than in `crate::cast` because only this module knows the
    /// field layout index constants from `crate::layout`.
    pub fn class_info_field_ptr(
        &self,
        class_info_ptr: PointerValue<'ctx>,
        field: u32,
    ) -> PointerValue<'ctx> {
        self.builder
            .build_struct_gep(self.runtime_types.class_info, class_info_ptr, field, "class_info_field")
            .expect("class_info field index out of range")
    }
}

/// One inlined ancestor sub-object in a class's flattened multiple-
/// inheritance layout, with the byte offsets its class-info record needs.
/// Computed structurally against [`crate::translate::payload_store_size`]'s
/// sizes rather than via `inkwell::targets::TargetData`, the same reasoning
/// that function's own doc comment gives for avoiding `TargetData`.
#[derive(Debug, Clone)]
struct FlatSubObject {
    class_name: String,
    offset_from_base: i64,
    offset_from_real: i64,
    offset_from_owner: i64,
    offset_to_next: i64,
}

/// Walks `real_class`'s inheritance tree in the same depth-first,
/// instance-info-header-then-parents order [`CodegenContext::class_struct_type`]
/// builds the aggregate in, returning one entry per sub-object (the class
/// itself included, at offset 0). A class repeated through a diamond
/// inheritance gets one entry per occurrence, chained by `offset_to_next`.
fn flatten_sub_objects<'ctx>(ctx: &CodegenContext<'ctx>, real_class: &str) -> Vec<FlatSubObject> {
    struct Raw {
        class_name: String,
        byte_offset: i64,
        owner_offset: i64,
    }

    fn visit<'ctx>(ctx: &CodegenContext<'ctx>, class_name: &str, offset: i64, owner_offset: i64, out: &mut Vec<Raw>) {
        out.push(Raw { class_name: class_name.to_string(), byte_offset: offset, owner_offset });
        let descriptor = ctx
            .class_descriptors
            .borrow()
            .get(class_name)
            .cloned()
            .unwrap_or_else(|| panic!("class '{class_name}' was flattened before its descriptor was registered"));
        let mut cursor = offset + if descriptor.has_instance_info() { 8 } else { 0 };
        for parent in &descriptor.parents {
            visit(ctx, &parent.name, cursor, offset, out);
            cursor += crate::translate::payload_store_size(ctx, &Type::class(parent.name.clone())) as i64;
        }
    }

    let mut raw = Vec::new();
    visit(ctx, real_class, 0, 0, &mut raw);

    let mut result = Vec::with_capacity(raw.len());
    for (i, entry) in raw.iter().enumerate() {
        let first_occurrence = raw[..i].iter().position(|r| r.class_name == entry.class_name);
        let offset_from_real = match first_occurrence {
            Some(first) => entry.byte_offset - raw[first].byte_offset,
            None => 0,
        };
        let next_occurrence = raw[i + 1..].iter().position(|r| r.class_name == entry.class_name).map(|p| i + 1 + p);
        let offset_to_next = match next_occurrence {
            Some(next) => raw[next].byte_offset - entry.byte_offset,
            None => 0,
        };
        result.push(FlatSubObject {
            class_name: entry.class_name.clone(),
            offset_from_base: entry.byte_offset,
            offset_from_real,
            offset_from_owner: entry.byte_offset - entry.owner_offset,
            offset_to_next,
        });
    }
    result
}

/// Populates the `instance_info` header of every sub-object in `self_ptr`'s
/// flattened layout (the class itself and every inlined ancestor, diamond
/// duplicates included) with a pointer to that sub-object's class-info
/// record. Called once, from the root class's init function, guarded by
/// `is_root` so the one-time population never repeats on a nested call.
fn emit_class_info_population<'ctx>(
    ctx: &CodegenContext<'ctx>,
    real_class: &str,
    self_ptr: PointerValue<'ctx>,
) {
    let flat = flatten_sub_objects(ctx, real_class);
    let mut occurrence_counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut index = 0usize;
    visit_and_populate(ctx, real_class, self_ptr, real_class, &flat, &mut index, &mut occurrence_counts);
}

fn visit_and_populate<'ctx>(
    ctx: &CodegenContext<'ctx>,
    real_class: &str,
    node_ptr: PointerValue<'ctx>,
    class_name: &str,
    flat: &[FlatSubObject],
    index: &mut usize,
    occurrence_counts: &mut std::collections::HashMap<String, usize>,
) {
    let entry = &flat[*index];
    debug_assert_eq!(entry.class_name, class_name, "flatten_sub_objects order must match the live GEP walk");
    *index += 1;

    let occurrence = *occurrence_counts.entry(class_name.to_string()).or_insert(0);
    *occurrence_counts.get_mut(class_name).unwrap() += 1;

    let descriptor = ctx
        .class_descriptors
        .borrow()
        .get(class_name)
        .cloned()
        .unwrap_or_else(|| panic!("class '{class_name}' not registered"));

    let struct_ty = ctx.class_struct_type(class_name);
    if descriptor.has_instance_info() {
        let global = ctx.build_class_info_global(
            real_class,
            class_name,
            occurrence,
            None,
            entry.offset_from_real,
            entry.offset_from_base,
            entry.offset_from_owner,
            entry.offset_to_next,
        );
        let header_ptr = ctx
            .builder
            .build_struct_gep(struct_ty, node_ptr, 0, "class_info_header")
            .expect("instance-info header GEP failed");
        ctx.builder
            .build_store(header_ptr, global.as_pointer_value())
            .expect("failed to store class-info pointer");
    }

    let parent_base = descriptor.has_instance_info() as u32;
    for (i, parent) in descriptor.parents.iter().enumerate() {
        let parent_ptr = ctx
            .builder
            .build_struct_gep(struct_ty, node_ptr, parent_base + i as u32, "sub_object")
            .expect("parent sub-object GEP failed");
        visit_and_populate(ctx, real_class, parent_ptr, &parent.name, flat, index, occurrence_counts);
    }
}

/// Defines the body of `class_name`'s init function (declared by
/// [`CodegenContext::class_init_function`]) if it has not already been
/// defined. No-op on a second call for the same class, the same "already
/// built" guard [`CodegenContext::class_struct_type`] uses for layouts.
///
/// `void init(i8* self, i1 is_root, i1 should_init_members)`: zero-initialises
/// this class's own members (unconditionally at the root, or when
/// `should_init_members` is set for a nested call), populates the whole
/// flattened hierarchy's class-info headers once at the root, and recurses
/// into each direct parent with `is_root = false`.
fn define_class_init_body<'ctx>(ctx: &CodegenContext<'ctx>, class_name: &str) {
    let init_fn = ctx.class_init_function(class_name);
    if init_fn.get_first_basic_block().is_some() {
        return;
    }

    let descriptor = ctx
        .class_descriptors
        .borrow()
        .get(class_name)
        .cloned()
        .unwrap_or_else(|| panic!("class '{class_name}' not registered"));

    let entry_block = ctx.context.append_basic_block(init_fn, "entry");
    let previous_block = ctx.builder.get_insert_block();
    ctx.builder.position_at_end(entry_block);

    let self_ptr = init_fn.get_nth_param(0).expect("init function missing 'self' parameter").into_pointer_value();
    let is_root = init_fn.get_nth_param(1).expect("init function missing 'is_root' parameter").into_int_value();
    let should_init_members = init_fn
        .get_nth_param(2)
        .expect("init function missing 'should_init_members' parameter")
        .into_int_value();
    let struct_ty = ctx.class_struct_type(class_name);

    let member_cond = ctx
        .builder
        .build_or(is_root, should_init_members, "init_members_cond")
        .expect("failed to build member-init guard");
    let members_block = ctx.context.append_basic_block(init_fn, "init_members");
    let after_members_block = ctx.context.append_basic_block(init_fn, "after_init_members");
    ctx.builder
        .build_conditional_branch(member_cond, members_block, after_members_block)
        .expect("failed to branch on member-init guard");

    ctx.builder.position_at_end(members_block);
    let member_base = ctx.first_member_field_index(&descriptor);
    for (i, member) in descriptor.members.iter().enumerate() {
        let field_ptr = ctx
            .builder
            .build_struct_gep(struct_ty, self_ptr, member_base + i as u32, "member")
            .expect("member GEP failed during init");
        let metadata = ctx.get_llvm_type(&member.ty);
        let basic = convert_metadata_to_basic(metadata)
            .unwrap_or_else(|| panic!("member '{}' of class '{class_name}' has no basic LLVM representation", member.name));
        ctx.builder.build_store(field_ptr, basic.const_zero()).expect("failed to zero-initialise member");
    }
    ctx.builder.build_unconditional_branch(after_members_block).expect("failed to branch past member init");

    ctx.builder.position_at_end(after_members_block);
    let info_block = ctx.context.append_basic_block(init_fn, "populate_class_info");
    let recurse_block = ctx.context.append_basic_block(init_fn, "init_parents");
    ctx.builder
        .build_conditional_branch(is_root, info_block, recurse_block)
        .expect("failed to branch on is_root");

    ctx.builder.position_at_end(info_block);
    emit_class_info_population(ctx, class_name, self_ptr);
    ctx.builder.build_unconditional_branch(recurse_block).expect("failed to branch past class-info population");

    ctx.builder.position_at_end(recurse_block);
    let const_false = ctx.context.bool_type().const_zero();
    let const_true = ctx.context.bool_type().const_int(1, false);
    let parent_base = descriptor.has_instance_info() as u32;
    for (i, parent) in descriptor.parents.iter().enumerate() {
        let parent_ptr = ctx
            .builder
            .build_struct_gep(struct_ty, self_ptr, parent_base + i as u32, "parent_sub_object")
            .expect("parent sub-object GEP failed during init");
        let parent_init = ctx.class_init_function(&parent.name);
        ctx.builder
            .build_call(parent_init, &[parent_ptr.into(), const_false.into(), const_true.into()], "parent_init_call")
            .expect("failed to call parent init function");
    }
    ctx.builder.build_return(None).expect("failed to terminate init function");

    if let Some(block) = previous_block {
        ctx.builder.position_at_end(block);
    }
}

/// Defines the body of `class_name`'s destructor (declared by
/// [`CodegenContext::class_destructor_function`]) when `has_destructor` is
/// set; left declaration-only otherwise, matching
/// [`build_class_info_global`]'s null-destructor-pointer convention for such
/// classes. Destroys own members in reverse declaration order, then calls
/// each direct parent's destructor on its inlined sub-object — a plain
/// recursive walk, since (unlike the init function) no class-info offset
/// bookkeeping is needed: the parent's own aggregate layout already begins
/// exactly at the sub-object's address.
fn define_class_destructor_body<'ctx>(ctx: &CodegenContext<'ctx>, class_name: &str) {
    let descriptor = ctx
        .class_descriptors
        .borrow()
        .get(class_name)
        .cloned()
        .unwrap_or_else(|| panic!("class '{class_name}' not registered"));
    if !descriptor.has_destructor {
        return;
    }

    let dtor_fn = ctx.class_destructor_function(class_name);
    if dtor_fn.get_first_basic_block().is_some() {
        return;
    }

    let entry_block = ctx.context.append_basic_block(dtor_fn, "entry");
    let previous_block = ctx.builder.get_insert_block();
    ctx.builder.position_at_end(entry_block);

    let self_ptr = dtor_fn.get_nth_param(0).expect("destructor missing 'self' parameter").into_pointer_value();
    let struct_ty = ctx.class_struct_type(class_name);

    let member_base = ctx.first_member_field_index(&descriptor);
    for (i, member) in descriptor.members.iter().enumerate().rev() {
        let field_ptr = ctx
            .builder
            .build_struct_gep(struct_ty, self_ptr, member_base + i as u32, "member")
            .expect("member GEP failed during destruction");
        let metadata = ctx.get_llvm_type(&member.ty);
        let basic = convert_metadata_to_basic(metadata)
            .unwrap_or_else(|| panic!("member '{}' of class '{class_name}' has no basic LLVM representation", member.name));
        let value = ctx.builder.build_load(basic, field_ptr, "member_value").expect("failed to load member for destruction");
        crate::copy_destroy::destroy_value(ctx, value, &member.ty);
    }

    let parent_base = descriptor.has_instance_info() as u32;
    for (i, parent) in descriptor.parents.iter().enumerate().rev() {
        let parent_ptr = ctx
            .builder
            .build_struct_gep(struct_ty, self_ptr, parent_base + i as u32, "parent_sub_object")
            .expect("parent sub-object GEP failed during destruction");
        let parent_dtor = ctx.class_destructor_function(&parent.name);
        ctx.builder
            .build_call(parent_dtor, &[parent_ptr.into()], "parent_dtor_call")
            .expect("failed to call parent destructor");
    }
    ctx.builder.build_return(None).expect("failed to terminate destructor");

    if let Some(block) = previous_block {
        ctx.builder.position_at_end(block);
    }
}

/// Declares (without defining — an external C-runtime allocator, the same
/// "this crate only declares it" relationship [`crate::cast`] has with
/// `_Alta_get_child`) the heap allocator backing persistent (heap-placed)
/// instances: `i8* alloc(i64 size)`.
fn declare_persistent_alloc<'ctx>(ctx: &CodegenContext<'ctx>) -> FunctionValue<'ctx> {
    if let Some(existing) = ctx.module.get_function("_Alta_persistent_alloc") {
        return existing;
    }
    let ptr_ty = ctx.context.ptr_type(AddressSpace::default());
    let i64_ty = ctx.context.i64_type();
    let fn_type = ptr_ty.fn_type(&[i64_ty.into()], false);
    ctx.module.add_function("_Alta_persistent_alloc", fn_type, None)
}

/// Synthesises `_Alta_stack_ctor_<class>` and `_Alta_persistent_ctor_<class>`,
/// the two instantiation entry points [`crate::node::expressions`]'s
/// `ClassInstantiation` lowering calls by name when no explicit
/// `constructor_name` override is given. Both allocate storage (a stack slot
/// or a heap block sized by [`crate::translate::payload_store_size`]), run
/// the class's init function at the root, forward to the user-written
/// `_Alta_internal_ctor_<class>` method, and return the constructed value
/// (by value for the stack entry, by pointer for the persistent one).
fn define_constructor_wrappers<'ctx>(ctx: &CodegenContext<'ctx>, descriptor: &ClassDescriptor) {
    let class_name = &descriptor.name;
    let internal_ctor_name = format!("_Alta_internal_ctor_{class_name}");
    let Some(internal_ctor) = ctx.module.get_function(&internal_ctor_name) else {
        // no constructor method was compiled for this class; it is never
        // instantiated directly (e.g. an abstract base used only via
        // inheritance), so the wrapper entries have nothing to forward to.
        return;
    };

    let struct_ty = ctx.class_struct_type(class_name);
    let ptr_ty = ctx.context.ptr_type(AddressSpace::default());
    let bool_ty = ctx.context.bool_type();

    // user parameters are every internal-ctor parameter after `self`.
    let user_param_count = internal_ctor.count_params().saturating_sub(1);
    let user_param_types: Vec<BasicTypeEnum<'ctx>> =
        (1..=user_param_count).map(|i| internal_ctor.get_nth_param(i).unwrap().get_type()).collect();
    let user_metadata: Vec<inkwell::types::BasicMetadataTypeEnum<'ctx>> =
        user_param_types.iter().map(|t| (*t).into()).collect();

    let stack_fn_name = format!("_Alta_stack_ctor_{class_name}");
    if ctx.module.get_function(&stack_fn_name).is_none() {
        let fn_type = struct_ty.fn_type(&user_metadata, false);
        let stack_fn = ctx.module.add_function(&stack_fn_name, fn_type, None);
        let entry_block = ctx.context.append_basic_block(stack_fn, "entry");
        let previous_block = ctx.builder.get_insert_block();
        ctx.builder.position_at_end(entry_block);

        let slot = ctx.builder.build_alloca(struct_ty, "instance").expect("failed stack-ctor alloca");
        let is_root = bool_ty.const_int(1, false);
        let should_init = bool_ty.const_int(1, false);
        ctx.builder
            .build_call(ctx.class_init_function(class_name), &[slot.into(), is_root.into(), should_init.into()], "init_call")
            .expect("failed to call init function from stack constructor");

        let mut args: Vec<inkwell::values::BasicMetadataValueEnum> = vec![slot.into()];
        for i in 0..user_param_count {
            args.push(stack_fn.get_nth_param(i as u32).unwrap().into());
        }
        ctx.builder.build_call(internal_ctor, &args, "internal_ctor_call").expect("failed to call internal constructor");

        let result = ctx.builder.build_load(struct_ty, slot, "instance_value").expect("failed to load constructed instance");
        ctx.builder.build_return(Some(&result)).expect("failed to return constructed instance");

        if let Some(block) = previous_block {
            ctx.builder.position_at_end(block);
        }
    }

    let persistent_fn_name = format!("_Alta_persistent_ctor_{class_name}");
    if ctx.module.get_function(&persistent_fn_name).is_none() {
        let fn_type = ptr_ty.fn_type(&user_metadata, false);
        let persistent_fn = ctx.module.add_function(&persistent_fn_name, fn_type, None);
        let entry_block = ctx.context.append_basic_block(persistent_fn, "entry");
        let previous_block = ctx.builder.get_insert_block();
        ctx.builder.position_at_end(entry_block);

        let size = ctx.context.i64_type().const_int(crate::translate::payload_store_size(ctx, &Type::class(class_name.clone())), false);
        let alloc = declare_persistent_alloc(ctx);
        let call = ctx.builder.build_call(alloc, &[size.into()], "persistent_alloc").expect("failed to call persistent allocator");
        let slot = call.try_as_basic_value().left().expect("persistent allocator must return a pointer").into_pointer_value();

        let is_root = bool_ty.const_int(1, false);
        let should_init = bool_ty.const_int(1, false);
        ctx.builder
            .build_call(ctx.class_init_function(class_name), &[slot.into(), is_root.into(), should_init.into()], "init_call")
            .expect("failed to call init function from persistent constructor");

        let mut args: Vec<inkwell::values::BasicMetadataValueEnum> = vec![slot.into()];
        for i in 0..user_param_count {
            args.push(persistent_fn.get_nth_param(i as u32).unwrap().into());
        }
        ctx.builder.build_call(internal_ctor, &args, "internal_ctor_call").expect("failed to call internal constructor");

        ctx.builder.build_return(Some(&slot)).expect("failed to return constructed instance pointer");

        if let Some(block) = previous_block {
            ctx.builder.position_at_end(block);
        }
    }
}

/// Finishes a class's codegen once its layout and methods (including any
/// `_Alta_internal_ctor_<class>`) are compiled: fills in the init function
/// and destructor bodies and synthesises the stack/persistent constructor
/// entry points. Called once per class root by the Module Driver.
pub fn finish_class_codegen<'ctx>(ctx: &CodegenContext<'ctx>, descriptor: &ClassDescriptor) {
    define_class_init_body(ctx, &descriptor.name);
    define_class_destructor_body(ctx, &descriptor.name);
    define_constructor_wrappers(ctx, descriptor);
}

/// Registers a class descriptor ahead of any codegen that references it.
/// The driver calls this once per class before compiling any root tree, so
/// forward and mutually-recursive class references resolve: class layouts
/// are created on demand, but the descriptor itself must already be known.
pub fn register_class<'ctx>(ctx: &CodegenContext<'ctx>, descriptor: ClassDescriptor) {
    ctx.class_descriptors
        .borrow_mut()
        .insert(descriptor.name.clone(), descriptor);
}

/// Index into a class-info global used as a generic pointer, for cast-engine
/// GEPs that must walk `offset_to_next` chains byte-wise rather than through
/// the struct's named fields.
pub const CLASS_INFO_DESTRUCTOR_FIELD: u32 = class_info_field::DESTRUCTOR;

#[cfg(test)]
mod tests {
    use crate::types::{MemberVariable, ParentClass};

    use super::*;

    /// Models class-info offset bookkeeping without a live LLVM module:
    /// a diamond `D(B, C)`, `B(A)`, `C(A)` layout, walked the way
    /// `class_init_function` would walk it, should produce two `A`
    /// sub-objects linked by `offset_to_next` and every sub-object's
    /// `offset_from_base` pointing back to `D`'s own header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct SubObject {
        class: &'static str,
        byte_offset: i64,
    }

    fn layout_of(classes: &[(&'static str, &[&'static str])]) -> Vec<SubObject> {
        // classes: (name, direct_parents), root is classes[0]
        let mut order = Vec::new();
        fn visit(
            name: &'static str,
            classes: &[(&'static str, &[&'static str])],
            offset: &mut i64,
            order: &mut Vec<SubObject>,
        ) {
            order.push(SubObject { class: name, byte_offset: *offset });
            *offset += 8; // one instance-info pointer per sub-object
            let (_, parents) = classes.iter().find(|(n, _)| *n == name).unwrap();
            for parent in *parents {
                visit(parent, classes, offset, order);
            }
        }
        let mut offset = 0;
        visit(classes[0].0, classes, &mut offset, &mut order);
        order
    }

    #[test]
    fn diamond_layout_produces_two_sub_objects_per_repeated_ancestor() {
        let classes: &[(&str, &[&str])] = &[("D", &["B", "C"]), ("B", &["A"]), ("C", &["A"]), ("A", &[])];
        let layout = layout_of(classes);
        let a_occurrences: Vec<_> = layout.iter().filter(|s| s.class == "A").collect();
        assert_eq!(a_occurrences.len(), 2);
        assert_ne!(a_occurrences[0].byte_offset, a_occurrences[1].byte_offset);
        // first sub-object is always the root, offset_from_base == 0 there
        assert_eq!(layout[0].byte_offset, 0);
    }

    #[test]
    fn parent_field_index_accounts_for_instance_info_header() {
        let mut descriptor = ClassDescriptor::new("Shape");
        descriptor.parents.push(ParentClass { name: "Base".into() });
        descriptor.members.push(MemberVariable {
            name: "area".into(),
            ty: Type::native(crate::types::Native::Double),
        });
        // with instance_info: index 0 = header, index 1 = parent "Base"
        assert_eq!(descriptor.has_instance_info(), true);
    }

    fn register(ctx: &CodegenContext, name: &str, parents: &[&str]) {
        let mut descriptor = ClassDescriptor::new(name);
        for parent in parents {
            descriptor.parents.push(ParentClass { name: (*parent).to_string() });
        }
        register_class(ctx, descriptor);
    }

    #[test]
    fn flatten_sub_objects_chains_diamond_duplicates_with_offset_to_next() {
        let context = inkwell::context::Context::create();
        let ctx = CodegenContext::new(&context, "fixture", crate::config::CodegenConfig::default());
        register(&ctx, "A", &[]);
        register(&ctx, "B", &["A"]);
        register(&ctx, "C", &["A"]);
        register(&ctx, "D", &["B", "C"]);

        let flat = flatten_sub_objects(&ctx, "D");
        assert_eq!(flat[0].class_name, "D");
        assert_eq!(flat[0].offset_from_base, 0);

        let a_entries: Vec<_> = flat.iter().filter(|e| e.class_name == "A").collect();
        assert_eq!(a_entries.len(), 2);
        assert_eq!(a_entries[0].offset_from_real, 0);
        assert_ne!(a_entries[1].offset_from_real, 0);
        assert_eq!(a_entries[0].offset_to_next, a_entries[1].offset_from_base - a_entries[0].offset_from_base);
        assert_eq!(a_entries[1].offset_to_next, 0);
    }

    #[test]
    fn finish_class_codegen_defines_init_destructor_and_constructor_wrappers() {
        let context = inkwell::context::Context::create();
        let ctx = CodegenContext::new(&context, "fixture", crate::config::CodegenConfig::default());

        let mut descriptor = ClassDescriptor::new("Point");
        descriptor.has_destructor = true;
        descriptor.members.push(MemberVariable { name: "x".into(), ty: Type::native(crate::types::Native::Integer) });
        register_class(&ctx, descriptor.clone());
        let _ = ctx.class_struct_type("Point");

        // the constructor method body is assumed already compiled by the
        // time the driver calls `finish_class_codegen`.
        let ptr_ty = ctx.context.ptr_type(AddressSpace::default());
        let ctor_fn_type = ctx.context.void_type().fn_type(&[ptr_ty.into()], false);
        let internal_ctor = ctx.module.add_function("_Alta_internal_ctor_Point", ctor_fn_type, None);
        let entry = ctx.context.append_basic_block(internal_ctor, "entry");
        ctx.builder.position_at_end(entry);
        ctx.builder.build_return(None).unwrap();

        finish_class_codegen(&ctx, &descriptor);

        assert!(ctx.class_init_function("Point").get_first_basic_block().is_some());
        assert!(ctx.class_destructor_function("Point").get_first_basic_block().is_some());
        assert!(ctx.module.get_function("_Alta_stack_ctor_Point").is_some());
        assert!(ctx.module.get_function("_Alta_persistent_ctor_Point").is_some());
        assert!(ctx.module.get_function("_Alta_stack_ctor_Point").unwrap().verify(true));
        assert!(ctx.module.get_function("_Alta_persistent_ctor_Point").unwrap().verify(true));
        assert!(ctx.class_init_function("Point").verify(true));
        assert!(ctx.class_destructor_function("Point").verify(true));
    }
}
