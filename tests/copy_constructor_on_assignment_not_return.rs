//! A class `C` with a user copy constructor: returning a `C` value from a
//! function must hand back the value as-is (a copy only makes sense when
//! something new takes ownership of it), while assigning it into another
//! variable must call `_Alta_copy_ctor_C`.

use codegen_test_support::with_test_context;

use altall::cast::{CastPath, CastStep};
use altall::position::Position;
use altall::tree::{Expression, ExpressionKind, FunctionDefinition, Parameter, Root, RootNode, Statement, StatementKind};
use altall::types::{ClassDescriptor, MemberVariable, Native, Type};

fn class_c(ctx: &altall::context::CodegenContext) -> Type {
    let mut descriptor = ClassDescriptor::new("C");
    descriptor.has_user_copy_constructor = true;
    descriptor.members.push(MemberVariable { name: "value".to_string(), ty: Type::native(Native::Integer) });
    altall::class_emit::register_class(ctx, descriptor);
    let struct_ty = ctx.class_struct_type("C");
    let ptr = ctx.context.ptr_type(inkwell::AddressSpace::default());
    let fn_type = struct_ty.fn_type(&[ptr.into()], false);
    ctx.module.add_function("_Alta_copy_ctor_C", fn_type, None);
    Type::class("C")
}

fn fetch(name: &str, ty: Type) -> Expression {
    Expression { position: Position::unknown(), resolved_type: ty, kind: ExpressionKind::Fetch { name: name.to_string() } }
}

/// As in the add-function test: a value-typed local's `Fetch` resolves to
/// its address, so reading it out requires an explicit `Dereference` cast.
fn read_local(name: &str, value_ty: Type) -> Expression {
    let address_ty = value_ty.clone().reference_to();
    Expression {
        position: Position::unknown(),
        resolved_type: value_ty,
        kind: ExpressionKind::Cast {
            source: Box::new(fetch(name, address_ty)),
            path: CastPath { steps: vec![CastStep::Dereference], copy_required: false, is_copyable: true, manual: false },
            manual: false,
        },
    }
}

#[test]
fn returning_a_class_value_does_not_copy_it() {
    with_test_context("return_no_copy_fixture", |ctx| {
        let c_ty = class_c(ctx);

        let identity = FunctionDefinition {
            mangled_name: "identity_c".to_string(),
            original_name: "identity_c".to_string(),
            position: Position::unknown(),
            params: vec![Parameter { name: "input".to_string(), ty: c_ty.clone().pointer_to(), default_value: None }],
            return_type: c_ty.clone().pointer_to(),
            is_variadic: false,
            is_method_of: None,
            body: altall::tree::Block {
                statements: vec![Statement {
                    position: Position::unknown(),
                    kind: StatementKind::Return(Some(fetch("input", c_ty.clone().pointer_to()))),
                }],
            },
        };
        let roots = vec![RootNode { id: "identity_c".to_string(), depends_on: vec![], root: Root::Function(identity) }];
        altall::driver::compile_roots(ctx, &roots).expect("compiling identity_c should succeed");

        let function = ctx.module.get_function("identity_c").unwrap();
        let ir = function.print_to_string().to_string();
        assert!(!ir.contains("_Alta_copy_ctor_C"), "returning a value must not invoke the copy constructor, got:\n{ir}");
    });
}

#[test]
fn assigning_a_class_value_copies_it() {
    with_test_context("assignment_copies_fixture", |ctx| {
        let c_ty = class_c(ctx);

        let assign_into_local = FunctionDefinition {
            mangled_name: "copy_into_local".to_string(),
            original_name: "copy_into_local".to_string(),
            position: Position::unknown(),
            params: vec![Parameter { name: "source".to_string(), ty: c_ty.clone(), default_value: None }],
            return_type: Type::native(Native::Void),
            is_variadic: false,
            is_method_of: None,
            body: altall::tree::Block {
                statements: vec![Statement {
                    position: Position::unknown(),
                    kind: StatementKind::VariableDefinition {
                        name: "copy_target".to_string(),
                        ty: c_ty.clone(),
                        initializer: Some(read_local("source", c_ty.clone())),
                        is_global: false,
                    },
                }],
            },
        };
        let roots = vec![RootNode {
            id: "copy_into_local".to_string(),
            depends_on: vec![],
            root: Root::Function(assign_into_local),
        }];
        altall::driver::compile_roots(ctx, &roots).expect("compiling copy_into_local should succeed");

        let function = ctx.module.get_function("copy_into_local").unwrap();
        let ir = function.print_to_string().to_string();
        assert!(
            ir.contains("_Alta_copy_ctor_C"),
            "initialising a new variable from an existing class value must call the copy constructor, got:\n{ir}"
        );
    });
}
