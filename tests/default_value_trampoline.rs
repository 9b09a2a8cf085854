//! `fn greet(name: int, times: int = 1) -> int` compiled with one trailing
//! default-valued parameter: the primary entry takes both arguments, and a
//! second entry point taking only `name` must evaluate the default and
//! forward both arguments to the primary.

use codegen_test_support::with_test_context;

use altall::cast::{CastPath, CastStep};
use altall::position::Position;
use altall::tree::{
    Expression, ExpressionKind, FunctionDefinition, Parameter, Root, RootNode, Statement, StatementKind,
};
use altall::types::{Native, Type};

fn literal(value: i64, ty: Type) -> Expression {
    Expression { position: Position::unknown(), resolved_type: ty, kind: ExpressionKind::IntegerLiteral(value) }
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
fn omitted_trailing_parameter_gets_a_forwarding_entry_point() {
    with_test_context("default_value_fixture", |ctx| {
        let int_ty = Type::native(Native::Integer);
        let greet = FunctionDefinition {
            mangled_name: "greet".to_string(),
            original_name: "greet".to_string(),
            position: Position::unknown(),
            params: vec![
                Parameter { name: "name".to_string(), ty: int_ty.clone(), default_value: None },
                Parameter { name: "times".to_string(), ty: int_ty.clone(), default_value: Some(literal(1, int_ty.clone())) },
            ],
            return_type: int_ty.clone(),
            is_variadic: false,
            is_method_of: None,
            body: altall::tree::Block {
                statements: vec![Statement {
                    position: Position::unknown(),
                    kind: StatementKind::Return(Some(read_local("times", int_ty.clone()))),
                }],
            },
        };

        let roots = vec![RootNode { id: "greet".to_string(), depends_on: vec![], root: Root::Function(greet) }];
        altall::driver::compile_roots(ctx, &roots).expect("compiling greet should succeed");
        altall::driver::verify_module(ctx).expect("module with a default-valued trailing parameter should verify");

        let primary = ctx.module.get_function("greet").expect("primary entry must be declared");
        assert_eq!(primary.count_params(), 2);

        let trampoline = ctx
            .module
            .get_function("greet_defaults_1")
            .expect("a one-argument trampoline must be emitted for the omitted trailing parameter");
        assert_eq!(trampoline.count_params(), 1);

        let ir = trampoline.print_to_string().to_string();
        assert!(ir.contains("call i32 @greet"), "trampoline must forward to the primary entry, got:\n{ir}");
        assert!(ir.contains("i32 1"), "trampoline must materialise the default-value literal, got:\n{ir}");
    });
}
