//! Central per-compilation state, tying together LLVM's own context/module/
//! builder with this backend's caches: the type-translation cache, the
//! lexical scope used for name resolution, the destruction-order scope
//! stack, the mangler's shadow map and the module-wide runtime descriptor
//! types. Modelled directly on `why_lib`'s `CodegenContext`, generalised
//! with the additional caches (class descriptors, function declarations,
//! invalid-value sentinels) a multiple-inheritance class-based language
//! needs that a struct-only language does not.
//!
//! `RefCell` is used throughout for the same reason the reference
//! implementation gives: the node-compiler visitor methods take `&self`,
//! but LLVM's builder and this backend's caches need mutation. Codegen is
//! single-threaded, so the dynamic borrow checks never contend.

use std::cell::RefCell;
use std::collections::HashMap;

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{BasicMetadataTypeEnum, StructType};
use inkwell::values::{BasicValueEnum, FunctionValue};
use inkwell::AddressSpace;

use crate::config::CodegenConfig;
use crate::layout::RuntimeTypes;
use crate::mangle::ShadowMap;
use crate::scope_stack::ScopeStack;
use crate::types::{ClassDescriptor, Type};

/// A single lexical scope frame for name resolution, mirroring
/// `why_lib::codegen::Scope`: separate namespaces for variables, functions
/// and compile-time constants.
#[derive(Default, Debug)]
pub struct Scope<'ctx> {
    variables: HashMap<String, BasicValueEnum<'ctx>>,
    functions: HashMap<String, FunctionValue<'ctx>>,
    constants: HashMap<String, BasicValueEnum<'ctx>>,
}

pub type LexicalFrame<'ctx> = RefCell<Scope<'ctx>>;

pub struct CodegenContext<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
    pub config: CodegenConfig,
    pub runtime_types: RuntimeTypes<'ctx>,

    /// Memoised Y-type -> LLVM-type translations.
    pub type_cache: RefCell<HashMap<Type, BasicMetadataTypeEnum<'ctx>>>,
    /// Aggregate `StructType`s for classes already given a body, keyed by
    /// class name; consulted by [`crate::translate`] to break reference
    /// cycles (an opaque struct is inserted before its body is filled).
    pub class_layouts: RefCell<HashMap<String, StructType<'ctx>>>,
    /// Class descriptors as received from semantic analysis, keyed by name.
    pub class_descriptors: RefCell<HashMap<String, ClassDescriptor>>,
    /// Declared-but-maybe-not-yet-defined functions, keyed by mangled name,
    /// populated by the two-pass declare-then-define function compiler.
    pub function_declarations: RefCell<HashMap<String, FunctionValue<'ctx>>>,

    pub lexical_scopes: RefCell<Vec<LexicalFrame<'ctx>>>,
    pub scope_stack: RefCell<ScopeStack<'ctx>>,

    pub shadow_map: RefCell<ShadowMap>,
    pub lambda_counter: RefCell<usize>,
    /// Set once a module-initialiser function has been created on first
    /// demand.
    pub module_initializer: RefCell<Option<FunctionValue<'ctx>>>,
    /// Stack of (break target, continue target) block pairs, one per
    /// enclosing loop, consulted by `break`/`continue` lowering.
    pub loop_targets: RefCell<Vec<(BasicBlock<'ctx>, BasicBlock<'ctx>)>>,
}

impl<'ctx> CodegenContext<'ctx> {
    pub fn new(context: &'ctx Context, module_name: &str, config: CodegenConfig) -> Self {
        let module = context.create_module(module_name);
        module.set_triple(&inkwell::targets::TargetTriple::create(
            &config.resolved_target_triple(),
        ));
        let builder = context.create_builder();
        let runtime_types = RuntimeTypes::new(context);

        Self {
            context,
            module,
            builder,
            config,
            runtime_types,
            type_cache: RefCell::new(HashMap::new()),
            class_layouts: RefCell::new(HashMap::new()),
            class_descriptors: RefCell::new(HashMap::new()),
            function_declarations: RefCell::new(HashMap::new()),
            lexical_scopes: RefCell::new(Vec::new()),
            scope_stack: RefCell::new(ScopeStack::new()),
            shadow_map: RefCell::new(ShadowMap::new()),
            lambda_counter: RefCell::new(0),
            module_initializer: RefCell::new(None),
            loop_targets: RefCell::new(Vec::new()),
        }
    }

    pub fn push_loop_targets(&self, break_target: BasicBlock<'ctx>, continue_target: BasicBlock<'ctx>) {
        self.loop_targets.borrow_mut().push((break_target, continue_target));
    }

    pub fn pop_loop_targets(&self) {
        self.loop_targets.borrow_mut().pop().expect("loop target stack underflow");
    }

    pub fn current_loop_targets(&self) -> (BasicBlock<'ctx>, BasicBlock<'ctx>) {
        *self.loop_targets.borrow().last().expect("break/continue used outside a loop")
    }

    pub fn enter_scope(&self) {
        self.lexical_scopes.borrow_mut().push(LexicalFrame::default());
    }

    pub fn exit_scope(&self) {
        self.lexical_scopes
            .borrow_mut()
            .pop()
            .expect("lexical scope stack underflow");
    }

    pub fn store_variable(&self, name: impl ToString, value: BasicValueEnum<'ctx>) {
        let name = name.to_string();
        let scopes = self.lexical_scopes.borrow();
        if let Some(scope) = scopes.last() {
            scope.borrow_mut().variables.insert(name, value);
        }
    }

    pub fn find_variable(&self, name: impl ToString) -> Option<BasicValueEnum<'ctx>> {
        let name = name.to_string();
        let scopes = self.lexical_scopes.borrow();
        scopes
            .iter()
            .rev()
            .find_map(|scope| scope.borrow().variables.get(&name).copied())
    }

    pub fn store_function(&self, name: impl ToString, value: FunctionValue<'ctx>) {
        let name = name.to_string();
        let scopes = self.lexical_scopes.borrow();
        if let Some(scope) = scopes.last() {
            scope.borrow_mut().functions.insert(name, value);
        }
    }

    pub fn find_function(&self, name: impl ToString) -> Option<FunctionValue<'ctx>> {
        let name = name.to_string();
        let scopes = self.lexical_scopes.borrow();
        scopes
            .iter()
            .rev()
            .find_map(|scope| scope.borrow().functions.get(&name).copied())
    }

    pub fn store_constant(&self, name: impl ToString, value: BasicValueEnum<'ctx>) {
        let name = name.to_string();
        let scopes = self.lexical_scopes.borrow();
        if let Some(scope) = scopes.last() {
            scope.borrow_mut().constants.insert(name, value);
        }
    }

    pub fn find_constant(&self, name: impl ToString) -> Option<BasicValueEnum<'ctx>> {
        let name = name.to_string();
        let scopes = self.lexical_scopes.borrow();
        scopes
            .iter()
            .rev()
            .find_map(|scope| scope.borrow().constants.get(&name).copied())
    }

    /// The canonical closure struct type used for every function-typed
    /// value: `{ i8*, i8* }`, function pointer then environment pointer
    /// (null for non-capturing functions). See module docs in
    /// `crate::context` and the closure system overview in `crate::node`.
    pub fn get_closure_struct_type(&self) -> StructType<'ctx> {
        let ptr = self.context.ptr_type(AddressSpace::default());
        self.context.struct_type(&[ptr.into(), ptr.into()], false)
    }

    pub fn next_lambda_id(&self) -> usize {
        let mut counter = self.lambda_counter.borrow_mut();
        let id = *counter;
        *counter += 1;
        id
    }

    /// Returns the module-initialiser function, creating it (with an empty
    /// entry block, `ret void` not yet appended) on first demand.
    pub fn module_initializer_function(&self) -> FunctionValue<'ctx> {
        if let Some(f) = *self.module_initializer.borrow() {
            return f;
        }
        let fn_type = self.context.void_type().fn_type(&[], false);
        let f = self
            .module
            .add_function("_Alta_module_init", fn_type, None);
        let entry = self.context.append_basic_block(f, "entry");
        self.builder.position_at_end(entry);
        *self.module_initializer.borrow_mut() = Some(f);
        f
    }
}
