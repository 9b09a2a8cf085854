//! A class `C` with a destructor, declared as a plain local (never
//! returned, never reassigned): the variable must still be destroyed when
//! control falls off the declaring block, both at the end of a nested
//! `if` branch and at the end of the enclosing function.

use codegen_test_support::with_test_context;

use altall::position::Position;
use altall::tree::{
    Block, Expression, ExpressionKind, FunctionDefinition, Root, RootNode, Statement, StatementKind,
};
use altall::types::{ClassDescriptor, MemberVariable, Native, Type};

fn class_c(ctx: &altall::context::CodegenContext) -> Type {
    let mut descriptor = ClassDescriptor::new("C");
    descriptor.has_destructor = true;
    descriptor.members.push(MemberVariable { name: "value".to_string(), ty: Type::native(Native::Integer) });
    altall::class_emit::register_class(ctx, descriptor.clone());
    let _ = ctx.class_struct_type("C");
    altall::class_emit::finish_class_codegen(ctx, &descriptor);
    Type::class("C")
}

fn local_def(name: &str, ty: Type) -> Statement {
    Statement {
        position: Position::unknown(),
        kind: StatementKind::VariableDefinition { name: name.to_string(), ty, initializer: None, is_global: false },
    }
}

/// A local class variable declared inside an `if true { ... }` branch with
/// nothing following it: the only place it can be destroyed is the nested
/// block's own closing brace, not the function's.
#[test]
fn class_local_in_nested_block_is_destroyed_at_blocks_end() {
    with_test_context("nested_block_destructor_fixture", |ctx| {
        let c_ty = class_c(ctx);

        let function = FunctionDefinition {
            mangled_name: "use_nested_local".to_string(),
            original_name: "use_nested_local".to_string(),
            position: Position::unknown(),
            params: vec![],
            return_type: Type::native(Native::Void),
            is_variadic: false,
            is_method_of: None,
            body: Block {
                statements: vec![
                    Statement {
                        position: Position::unknown(),
                        kind: StatementKind::Conditional {
                            condition: Expression {
                                position: Position::unknown(),
                                resolved_type: Type::native(Native::Boolean),
                                kind: ExpressionKind::BooleanLiteral(true),
                            },
                            when_true: Box::new(Block { statements: vec![local_def("nested", c_ty.clone())] }),
                            when_false: None,
                        },
                    },
                    Statement { position: Position::unknown(), kind: StatementKind::Return(None) },
                ],
            },
        };

        let roots = vec![RootNode { id: "use_nested_local".to_string(), depends_on: vec![], root: Root::Function(function) }];
        altall::driver::compile_roots(ctx, &roots).expect("compiling use_nested_local should succeed");
        altall::driver::verify_module(ctx).expect("module with a block-scoped class local should verify");

        let function = ctx.module.get_function("use_nested_local").expect("function must be declared");
        let ir = function.print_to_string().to_string();
        assert!(
            ir.contains("class_destroy_call"),
            "class local reaching its block's closing brace must dispatch through the destructor path, got:\n{ir}"
        );
    });
}

/// Same shape but the local lives directly in the function body, so it is
/// destroyed by the implicit void-return cleanup rather than a nested
/// block's.
#[test]
fn class_local_in_function_body_is_destroyed_at_function_end() {
    with_test_context("function_end_destructor_fixture", |ctx| {
        let c_ty = class_c(ctx);

        let function = FunctionDefinition {
            mangled_name: "use_local".to_string(),
            original_name: "use_local".to_string(),
            position: Position::unknown(),
            params: vec![],
            return_type: Type::native(Native::Void),
            is_variadic: false,
            is_method_of: None,
            body: Block { statements: vec![local_def("local", c_ty.clone())] },
        };

        let roots = vec![RootNode { id: "use_local".to_string(), depends_on: vec![], root: Root::Function(function) }];
        altall::driver::compile_roots(ctx, &roots).expect("compiling use_local should succeed");
        altall::driver::verify_module(ctx).expect("module with a function-scoped class local should verify");

        let function = ctx.module.get_function("use_local").expect("function must be declared");
        let ir = function.print_to_string().to_string();
        assert!(
            ir.contains("class_destroy_call"),
            "class local reaching the function's end must dispatch through the destructor path, got:\n{ir}"
        );
    });
}
