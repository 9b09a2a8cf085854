//! A free function `add(a, b)` compiled through the full Module Driver
//! pipeline: the module must verify, and the emitted body must actually
//! compute an integer addition and return it, not just type-check.

use codegen_test_support::with_test_context;

use altall::cast::{CastPath, CastStep};
use altall::position::Position;
use altall::tree::{
    Expression, ExpressionKind, FunctionDefinition, Parameter, Root, RootNode, Statement, StatementKind,
};
use altall::types::Type;
use altall::types::Native;

fn fetch(name: &str, ty: Type) -> Expression {
    Expression {
        position: Position::unknown(),
        resolved_type: ty,
        kind: ExpressionKind::Fetch { name: name.to_string() },
    }
}

/// A local variable's `Fetch` resolves to its *address* (the same slot
/// `Assignment`'s target half needs); reading the value out of it is a
/// `Dereference` cast step, the same way semantic analysis would insert one
/// wherever a variable is read rather than assigned into.
fn read_local(name: &str, value_ty: Type) -> Expression {
    let address_ty = value_ty.clone().reference_to();
    Expression {
        position: Position::unknown(),
        resolved_type: value_ty.clone(),
        kind: ExpressionKind::Cast {
            source: Box::new(fetch(name, address_ty)),
            path: CastPath { steps: vec![CastStep::Dereference], copy_required: false, is_copyable: true, manual: false },
            manual: false,
        },
    }
}

#[test]
fn add_function_verifies_and_computes_addition() {
    with_test_context("add_fixture", |ctx| {
        let int_ty = Type::native(Native::Integer);
        let add = FunctionDefinition {
            mangled_name: "add".to_string(),
            original_name: "add".to_string(),
            position: Position::unknown(),
            params: vec![
                Parameter { name: "a".to_string(), ty: int_ty.clone(), default_value: None },
                Parameter { name: "b".to_string(), ty: int_ty.clone(), default_value: None },
            ],
            return_type: int_ty.clone(),
            is_variadic: false,
            is_method_of: None,
            body: altall::tree::Block {
                statements: vec![Statement {
                    position: Position::unknown(),
                    kind: StatementKind::Return(Some(Expression {
                        position: Position::unknown(),
                        resolved_type: int_ty.clone(),
                        kind: ExpressionKind::Binary {
                            operator: altall::tree::BinaryOperator::Add,
                            left: Box::new(read_local("a", int_ty.clone())),
                            right: Box::new(read_local("b", int_ty.clone())),
                        },
                    })),
                }],
            },
        };

        let roots = vec![RootNode { id: "add".to_string(), depends_on: vec![], root: Root::Function(add) }];

        altall::driver::compile_roots(ctx, &roots).expect("compiling the add function should succeed");
        altall::driver::verify_module(ctx).expect("module with a single integer-add function should verify");

        let function = ctx.module.get_function("add").expect("add function must be declared");
        assert_eq!(function.count_params(), 2);

        let ir = function.print_to_string().to_string();
        assert!(ir.contains("add i32"), "expected an integer add instruction in:\n{ir}");
        assert!(ir.contains("ret i32"), "expected an integer return in:\n{ir}");
    });
}
