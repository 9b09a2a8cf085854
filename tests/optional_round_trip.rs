//! `optional<int>`: wrapping a bare integer then unwrapping it again must
//! recover a value of the original integer type, via the `{ i1, T }`
//! representation the Type Translator gives `Optional`.

use codegen_test_support::{declare_empty_function, with_test_context};

use altall::cast::{CastPath, CastStep};
use altall::position::Position;
use altall::types::{Native, Type, TypeShape};

#[test]
fn wrap_then_unwrap_recovers_an_int_typed_value() {
    with_test_context("optional_fixture", |ctx| {
        declare_empty_function(ctx, "optional_roundtrip");

        let int_ty = Type::native(Native::Integer);
        let optional_ty = Type::unmodified(TypeShape::Optional(Box::new(int_ty.clone())));

        let original = ctx.context.i32_type().const_int(42, false);

        let wrap_path = CastPath {
            steps: vec![CastStep::Wrap],
            copy_required: false,
            is_copyable: true,
            manual: false,
        };
        let wrapped = altall::cast::apply_cast(
            ctx,
            &wrap_path,
            original.into(),
            int_ty.clone(),
            &optional_ty,
            &Position::unknown(),
            |_, v, _| v,
        )
        .expect("wrap step should not fail");
        assert!(wrapped.is_struct_value(), "a wrapped optional must be a `{{ i1, T }}` struct value");
        assert_eq!(wrapped.into_struct_value().get_type().count_fields(), 2);

        let unwrap_path = CastPath {
            steps: vec![CastStep::Unwrap],
            copy_required: false,
            is_copyable: true,
            manual: false,
        };
        let unwrapped = altall::cast::apply_cast(
            ctx,
            &unwrap_path,
            wrapped,
            optional_ty.clone(),
            &int_ty,
            &Position::unknown(),
            |_, v, _| v,
        )
        .expect("unwrap step should not fail");

        assert!(unwrapped.is_int_value(), "unwrapping an optional<int> must recover an integer value");
        assert_eq!(unwrapped.into_int_value().get_type(), ctx.context.i32_type());
    });
}
