//! The detailed-tree input contract: the shape semantic analysis is assumed
//! to have already produced. Everything here is data, never computed by
//! this crate — resolved types, cast paths, parent-chain indices and
//! argument adjustments all arrive pre-filled, the same way `why_lib`'s
//! `ValidatedTypeInformation` arrives pre-resolved onto each expression
//! node rather than being inferred by the codegen pass itself.

use crate::cast::CastPath;
use crate::position::Position;
use crate::types::{ClassDescriptor, Type};

/// One argument at a call site, after semantic analysis has already
/// resolved overload selection and default-value filling.
#[derive(Debug, Clone)]
pub enum ArgumentAdjustment {
    Single(Box<Expression>),
    Variadic(Vec<Expression>),
}

/// A fully resolved expression node.
#[derive(Debug, Clone)]
pub struct Expression {
    pub position: Position,
    pub resolved_type: Type,
    pub kind: ExpressionKind,
}

#[derive(Debug, Clone)]
pub enum ExpressionKind {
    IntegerLiteral(i64),
    FloatLiteral(f64),
    BooleanLiteral(bool),
    StringLiteral(String),
    Nullptr,
    Sizeof(Type),
    /// Resolves a name to a global, a function parameter (`this` is
    /// parameter 0 of methods), or a declared function.
    Fetch { name: String },
    /// One of the module-scheduler global or the active-coroutine handle;
    /// coroutines themselves are out of scope, this only names the slot.
    SpecialFetch(SpecialFetchKind),
    Accessor {
        target: Box<Expression>,
        member: String,
        parent_chain: Vec<String>,
        bitfield_range: Option<(u32, u32)>,
    },
    Assignment {
        target: Box<Expression>,
        value: Box<Expression>,
        operator_method: Option<String>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    Cast {
        source: Box<Expression>,
        path: CastPath,
        manual: bool,
    },
    Call {
        callee: Box<Expression>,
        this_argument: Option<Box<Expression>>,
        arguments: Vec<ArgumentAdjustment>,
    },
    Conditional {
        condition: Box<Expression>,
        when_true: Box<Expression>,
        when_false: Box<Expression>,
    },
    Instanceof {
        value: Box<Expression>,
        target_type: Type,
    },
    ClassInstantiation {
        class_name: String,
        persistent: bool,
        constructor_name: Option<String>,
        arguments: Vec<ArgumentAdjustment>,
    },
    SuperCall {
        parent_class: String,
        arguments: Vec<ArgumentAdjustment>,
    },
    Lambda {
        lambda_id: String,
        params: Vec<Parameter>,
        captures: Vec<String>,
        body: Box<Block>,
    },
    Await(Box<Expression>),
    Yield(Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialFetchKind {
    InvalidValue,
    ModuleScheduler,
    ActiveCoroutine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    LogicalAnd,
    LogicalOr,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    ShiftLeft,
    ShiftRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
    Plus,
    PreIncrement,
    PostIncrement,
    PreDecrement,
    PostDecrement,
    BitwiseNot,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
    pub default_value: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub position: Position,
    pub kind: StatementKind,
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    Expression(Expression),
    Block(Block),
    FunctionDefinition(FunctionDefinition),
    Return(Option<Expression>),
    VariableDefinition {
        name: String,
        ty: Type,
        initializer: Option<Expression>,
        is_global: bool,
    },
    Conditional {
        condition: Expression,
        when_true: Box<Block>,
        when_false: Option<Box<Block>>,
    },
    RangedFor {
        counter_name: String,
        counter_type: Type,
        start: Expression,
        end: Expression,
        inclusive: bool,
        descending: bool,
        body: Box<Block>,
    },
    Break,
    Continue,
    Throw(Expression),
    Try {
        body: Box<Block>,
        catch_name: String,
        catch_type: Type,
        catch_body: Box<Block>,
    },
    Enumeration {
        name: String,
        members: Vec<(String, Option<i64>)>,
    },
}

#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub mangled_name: String,
    pub original_name: String,
    pub position: Position,
    pub params: Vec<Parameter>,
    pub return_type: Type,
    pub is_variadic: bool,
    pub is_method_of: Option<String>,
    pub body: Block,
}

/// One compilable root of the program: either a free function, a class with
/// its methods, or a top-level variable/enum. The Module Driver walks these
/// in dependency order.
#[derive(Debug, Clone)]
pub enum Root {
    Function(FunctionDefinition),
    Class {
        descriptor: ClassDescriptor,
        methods: Vec<FunctionDefinition>,
    },
    GlobalVariable {
        name: String,
        ty: Type,
        initializer: Option<Expression>,
    },
    Enumeration {
        name: String,
        members: Vec<(String, Option<i64>)>,
    },
}

/// A root plus the identifiers of the roots it depends on, as precomputed by
/// semantic analysis; the driver topologically sorts on this.
#[derive(Debug, Clone)]
pub struct RootNode {
    pub id: String,
    pub depends_on: Vec<String>,
    pub root: Root,
}
