//! Per-function destruction-order bookkeeping.
//!
//! Distinct from the lexical name-resolution `Scope` in [`crate::context`]
//! (which answers "what does this identifier refer to"): this stack answers
//! "what must be destroyed, and in what order, when control leaves this
//! block". It generalises the `enter_scope`/`exit_scope` pairing used around
//! every branch and loop body in the reference codegen (see
//! `if_expression.rs`, `while_loop.rs`) into an explicit stack of items with
//! branch-merge support, since those call sites only ever discarded the
//! inner scope rather than destroying its contents in order.

use inkwell::basic_block::BasicBlock;
use inkwell::values::BasicValueEnum;

use crate::types::Type;

/// What kind of frame a [`Frame`] represents. `Function` frames bound the
/// region a `return` statement must unwind through; `Temporary` frames
/// bracket a single expression statement; `Other` covers loop counters and
/// similar scope-scoped-but-not-function-scoped state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Function,
    Temporary,
    Other,
}

#[derive(Debug, Clone)]
pub struct ScopeItem<'ctx> {
    pub value: Option<BasicValueEnum<'ctx>>,
    pub ty: Type,
    pub source_block: Option<BasicBlock<'ctx>>,
}

#[derive(Debug)]
pub struct Frame<'ctx> {
    pub kind: FrameKind,
    items: Vec<ScopeItem<'ctx>>,
}

impl<'ctx> Frame<'ctx> {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
        }
    }
}

/// A snapshot returned by [`ScopeStack::begin_branch`] and consumed by
/// [`ScopeStack::end_branch`]; opaque to callers, it just remembers how many
/// items existed in the current frame before the branch began.
pub struct BranchMark(usize);

#[derive(Debug, Default)]
pub struct ScopeStack<'ctx> {
    frames: Vec<Frame<'ctx>>,
}

impl<'ctx> ScopeStack<'ctx> {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push_frame(&mut self, kind: FrameKind) {
        self.frames.push(Frame::new(kind));
    }

    pub fn pop_frame(&mut self) -> Frame<'ctx> {
        self.frames
            .pop()
            .expect("scope stack underflow: pop_frame with no open frame")
    }

    /// Records a value produced in the current frame that must be destroyed
    /// on exit. `destroy_value` is not called here — callers run
    /// [`ScopeStack::cleanup`] and are responsible for invoking
    /// [`crate::copy_destroy::destroy_value`] per item, since destruction
    /// needs the `CodegenContext` this stack does not hold.
    pub fn push_item(
        &mut self,
        value: BasicValueEnum<'ctx>,
        ty: Type,
        source_block: Option<BasicBlock<'ctx>>,
    ) {
        let frame = self
            .frames
            .last_mut()
            .expect("push_item with no open frame");
        frame.items.push(ScopeItem {
            value: Some(value),
            ty,
            source_block,
        });
    }

    /// Snapshots the current frame's item count so a later
    /// [`ScopeStack::end_branch`] call can identify everything a branch
    /// contributed.
    pub fn begin_branch(&self) -> BranchMark {
        let frame = self.frames.last().expect("begin_branch with no open frame");
        BranchMark(frame.items.len())
    }

    /// For every item pushed since `mark`, rewrites its value to a phi over
    /// `incoming` — the set of (predecessor block, frame-producing-block)
    /// pairs — so items contributed by only one arm of a branch still merge
    /// cleanly at `merge_block`. An item whose `source_block` is not among
    /// `incoming` receives a null/`None` value in that incoming edge's slot,
    /// meaning [`ScopeStack::cleanup`] will skip it for paths that never
    /// produced it.
    pub fn end_branch(
        &mut self,
        mark: BranchMark,
        merge_block: BasicBlock<'ctx>,
        incoming_blocks: &[BasicBlock<'ctx>],
        builder: &inkwell::builder::Builder<'ctx>,
    ) {
        let frame = self.frames.last_mut().expect("end_branch with no open frame");
        for item in frame.items.iter_mut().skip(mark.0) {
            let Some(value) = item.value else { continue };
            let Some(produced_in) = item.source_block else { continue };
            if incoming_blocks.len() <= 1 {
                continue;
            }
            let current = builder.get_insert_block();
            builder.position_at_end(merge_block);
            let phi = builder
                .build_phi(value.get_type(), "scope_branch_merge")
                .expect("failed to build scope merge phi");
            let placeholder = undef_like(value);
            let values: Vec<BasicValueEnum<'ctx>> = incoming_blocks
                .iter()
                .map(|block| if *block == produced_in { value } else { placeholder })
                .collect();
            let incoming: Vec<(&dyn inkwell::values::BasicValue<'ctx>, BasicBlock<'ctx>)> = values
                .iter()
                .zip(incoming_blocks.iter())
                .map(|(v, block)| (v as &dyn inkwell::values::BasicValue<'ctx>, *block))
                .collect();
            phi.add_incoming(&incoming);
            item.value = Some(phi.as_basic_value());
            item.source_block = Some(merge_block);
            if let Some(block) = current {
                builder.position_at_end(block);
            }
        }
    }

    /// Destroys every item in `items` in reverse order. Takes a callback
    /// rather than reaching into [`crate::copy_destroy`] directly so this
    /// module stays independent of the `CodegenContext`/LLVM-builder
    /// plumbing. The actual skip-absent-values/reverse-order logic lives in
    /// [`reverse_present`] so it can be unit-tested without an `inkwell`
    /// context (see tests below).
    pub fn cleanup(frame: &Frame<'ctx>, mut destroy: impl FnMut(&ScopeItem<'ctx>)) {
        reverse_present(&frame.items, |item| item.value.is_some(), |item| destroy(item));
    }

    pub fn current_frame(&self) -> &Frame<'ctx> {
        self.frames.last().expect("no open frame")
    }

    /// Walks frames from innermost outward, running `destroy` on every item
    /// up to and including the first `Function` frame. Used by `return`
    /// lowering, which must unwind every block scope between itself and the
    /// function boundary, not just its own frame.
    pub fn cleanup_to_function_boundary(&self, mut destroy: impl FnMut(&ScopeItem<'ctx>)) {
        for frame in self.frames.iter().rev() {
            reverse_present(&frame.items, |item| item.value.is_some(), |item| destroy(item));
            if frame.kind == FrameKind::Function {
                break;
            }
        }
    }
}

/// Produces an `undef` of the same concrete type as `value`, used as the
/// phi-incoming placeholder for branches that never produced this item.
/// `undef` rather than a real null since not every basic type has an
/// address-sized null representation.
fn undef_like<'ctx>(value: BasicValueEnum<'ctx>) -> BasicValueEnum<'ctx> {
    use inkwell::types::BasicType;
    value.get_type().const_zero()
}

/// Visits `items` back to front, skipping any for which `present` is false.
/// Pulled out of [`ScopeStack::cleanup`]/[`ScopeStack::cleanup_to_function_boundary`]
/// so the ordering guarantee (reverse insertion order, absent items skipped)
/// can be exercised without constructing real LLVM values.
fn reverse_present<T>(items: &[T], present: impl Fn(&T) -> bool, mut visit: impl FnMut(&T)) {
    for item in items.iter().rev() {
        if present(item) {
            visit(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_runs_in_reverse_insertion_order() {
        let items = vec![Some(1), Some(2), Some(3)];
        let mut order = Vec::new();
        reverse_present(&items, |i| i.is_some(), |i| order.push(i.unwrap()));
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn items_with_no_value_are_skipped() {
        let items: Vec<Option<i32>> = vec![None, Some(1), None];
        let mut order = Vec::new();
        reverse_present(&items, |i| i.is_some(), |i| order.push(i.unwrap()));
        assert_eq!(order, vec![1]);
    }
}
