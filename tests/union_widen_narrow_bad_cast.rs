//! `int|string` (modelled as `int | *int`, since this crate's `Type` has no
//! dedicated string shape — strings are raw `i8*` pointers elsewhere in the
//! tree): widening an int into the union and narrowing it back must recover
//! an int value, and a multicast with no matching arm for the union's
//! current tag must route through `_Alta_bad_cast` rather than silently
//! producing garbage.

use codegen_test_support::{declare_empty_function, with_test_context};

use altall::cast::{CastPath, CastStep};
use altall::position::Position;
use altall::types::{Native, Type, TypeShape};

fn int_string_union() -> Type {
    Type::unmodified(TypeShape::Union(vec![
        Type::native(Native::Integer),
        Type::native(Native::Integer).pointer_to(),
    ]))
}

#[test]
fn widen_then_narrow_recovers_the_original_member() {
    with_test_context("union_fixture", |ctx| {
        declare_empty_function(ctx, "union_roundtrip");

        let union_ty = int_string_union();
        let int_ty = Type::native(Native::Integer);
        let original = ctx.context.i32_type().const_int(7, false);

        let widen_path = CastPath {
            steps: vec![CastStep::Widen { member_index: 0 }],
            copy_required: false,
            is_copyable: true,
            manual: false,
        };
        let widened = altall::cast::apply_cast(
            ctx,
            &widen_path,
            original.into(),
            int_ty.clone(),
            &union_ty,
            &Position::unknown(),
            |_, v, _| v,
        )
        .expect("widen should not fail");
        assert!(widened.is_struct_value(), "a widened union must be a `{{ tag, payload }}` struct value");

        let narrow_path = CastPath {
            steps: vec![CastStep::Narrow { member_index: 0 }],
            copy_required: false,
            is_copyable: true,
            manual: false,
        };
        let narrowed = altall::cast::apply_cast(
            ctx,
            &narrow_path,
            widened,
            union_ty.clone(),
            &int_ty,
            &Position::unknown(),
            |_, v, _| v,
        )
        .expect("narrow should not fail");
        assert!(narrowed.is_int_value(), "narrowing back to int must recover an int value");
    });
}

#[test]
fn multicast_with_no_matching_arm_routes_through_bad_cast() {
    with_test_context("union_bad_cast_fixture", |ctx| {
        let function = declare_empty_function(ctx, "union_bad_cast");

        let union_ty = int_string_union();
        let bool_ty = Type::native(Native::Boolean);
        let union_struct_metadata = ctx.get_llvm_type(&union_ty);
        let union_basic = altall::translate::convert_metadata_to_basic(union_struct_metadata).unwrap();
        let slot = ctx.builder.build_alloca(union_basic, "u").unwrap();
        ctx.builder.build_store(slot, union_basic.into_struct_type().const_zero()).unwrap();
        let loaded = ctx.builder.build_load(union_basic, slot, "u_loaded").unwrap();

        // the stored union's tag is 0 (zero-initialised); the only viable
        // arm named here is tag 1, so the switch must route tag 0 through
        // the bad-cast default block rather than treating it as a match.
        let multicast_path = CastPath {
            steps: vec![CastStep::Multicast { viable: vec![(1, Type::native(Native::Integer).pointer_to())] }],
            copy_required: false,
            is_copyable: true,
            manual: false,
        };
        altall::cast::apply_cast(
            ctx,
            &multicast_path,
            loaded,
            union_ty.clone(),
            &bool_ty,
            &Position::unknown(),
            |_, v, _| v,
        )
        .expect("multicast with at least one viable arm should not fail");

        let ir = function.print_to_string().to_string();
        assert!(ir.contains("_Alta_bad_cast"), "multicast with no viable arms must call _Alta_bad_cast, got:\n{ir}");
        assert!(ir.contains("unreachable"), "the bad-cast block must terminate with unreachable, got:\n{ir}");
    });
}
