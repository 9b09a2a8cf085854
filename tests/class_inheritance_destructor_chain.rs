//! `B extends A`, both with destructors: `B`'s generated destructor must
//! recurse into `A`'s, and `B`'s aggregate layout must carry two class-info
//! pointers worth of instance-info headers (one per physical sub-object).

use codegen_test_support::with_test_context;

use altall::types::{ClassDescriptor, MemberVariable, Native, ParentClass, Type};

#[test]
fn derived_destructor_calls_parent_destructor() {
    with_test_context("inheritance_fixture", |ctx| {
        let mut a = ClassDescriptor::new("A");
        a.has_destructor = true;
        a.members.push(MemberVariable { name: "x".to_string(), ty: Type::native(Native::Integer) });
        altall::class_emit::register_class(ctx, a.clone());
        let _ = ctx.class_struct_type("A");

        let mut b = ClassDescriptor::new("B");
        b.has_destructor = true;
        b.parents.push(ParentClass { name: "A".to_string() });
        b.members.push(MemberVariable { name: "y".to_string(), ty: Type::native(Native::Integer) });
        altall::class_emit::register_class(ctx, b.clone());
        let _ = ctx.class_struct_type("B");

        altall::class_emit::finish_class_codegen(ctx, &a);
        altall::class_emit::finish_class_codegen(ctx, &b);

        let a_dtor = ctx.class_destructor_function("A");
        let b_dtor = ctx.class_destructor_function("B");

        assert!(a_dtor.get_first_basic_block().is_some(), "A's destructor must have a body");
        assert!(b_dtor.get_first_basic_block().is_some(), "B's destructor must have a body");

        let b_dtor_ir = b_dtor.print_to_string().to_string();
        let a_dtor_name = a_dtor.get_name().to_str().unwrap().to_string();
        assert!(
            b_dtor_ir.contains(&a_dtor_name),
            "B's destructor must call A's destructor ({a_dtor_name}), got:\n{b_dtor_ir}"
        );

        assert!(a_dtor.verify(true), "A's destructor must verify");
        assert!(b_dtor.verify(true), "B's destructor must verify");

        let b_struct = ctx.class_struct_type("B");
        // instance-info header + A sub-object (itself header + member) + B's own member.
        assert_eq!(b_struct.count_fields(), 3, "B's aggregate must inline A's sub-object alongside its own header/member");
    });
}
