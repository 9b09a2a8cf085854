//! Type descriptors: the semantic type representation the code generator
//! consumes. Extends the plain scalar/struct/function `Type` the validated
//! tree used to carry with the class, union, optional and bitfield shapes a
//! class-based language with multiple inheritance needs, plus the modifier
//! flags (const/pointer/reference/signed width) that drive indirection and
//! numeric-width handling in the [`crate::translate`] module.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// A modifier applied to a base type, in source order. Multiple pointer and
/// reference modifiers may stack; `indirection_level` (see [`Type::indirection_level`])
/// counts pointer and reference modifiers together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modifier {
    Constant,
    Pointer,
    Reference,
    Long,
    Short,
    Unsigned,
    Signed,
}

/// Native scalar kinds, independent of width modifiers (width is resolved by
/// [`crate::translate`] from the accompanying [`Modifier`] list).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Native {
    Integer,
    Byte,
    Boolean,
    Void,
    Float,
    Double,
}

/// One member of a union type, in declaration order; the member's position
/// in this list is its runtime tag value.
pub type UnionMember = Type;

/// One entry of a bitfield type: a name and an inclusive bit range within
/// the underlying integer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitfieldEntry {
    pub name: String,
    pub start: u32,
    pub end: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitfieldType {
    pub name: String,
    pub underlying_width: u32,
    pub entries: Vec<BitfieldEntry>,
}

/// Whether a function type is a raw function pointer (no hidden state
/// argument) or a closure (the uniform `{ i8*, i8* }` representation
/// described in [`crate::layout`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    Raw,
    Closure,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionType {
    pub kind: FunctionKind,
    pub params: Vec<Type>,
    pub return_value: Box<Type>,
    pub is_variadic: bool,
}

/// Canonical semantic type representation consumed by every codegen
/// component. `modifiers` is orthogonal to the variant it decorates — it is
/// always consulted by [`crate::translate`] before the bare shape below.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Type {
    pub modifiers: Vec<Modifier>,
    pub shape: TypeShape,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeShape {
    Native(Native),
    /// User-named class, resolved to its index in the owning module's class
    /// table. Codegen never carries the full [`ClassDescriptor`] inline —
    /// that would make `Type` recursive and expensive to hash — only its
    /// name, which [`crate::class_emit`] resolves against the descriptor
    /// table it was given at driver start-up.
    Class(String),
    Union(Vec<UnionMember>),
    Optional(Box<Type>),
    Bitfield(Rc<BitfieldType>),
    Function(FunctionType),
}

impl Type {
    pub fn unmodified(shape: TypeShape) -> Self {
        Self {
            modifiers: Vec::new(),
            shape,
        }
    }

    pub fn native(n: Native) -> Self {
        Self::unmodified(TypeShape::Native(n))
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self::unmodified(TypeShape::Class(name.into()))
    }

    pub fn pointer_to(mut self) -> Self {
        self.modifiers.push(Modifier::Pointer);
        self
    }

    pub fn reference_to(mut self) -> Self {
        self.modifiers.push(Modifier::Reference);
        self
    }

    pub fn pointer_level(&self) -> usize {
        self.modifiers
            .iter()
            .filter(|m| matches!(m, Modifier::Pointer))
            .count()
    }

    pub fn reference_level(&self) -> usize {
        self.modifiers
            .iter()
            .filter(|m| matches!(m, Modifier::Reference))
            .count()
    }

    /// Pointer and reference modifiers together: how many layers of
    /// indirection must be peeled before reaching an addressable or value
    /// form of the bare shape.
    pub fn indirection_level(&self) -> usize {
        self.pointer_level() + self.reference_level()
    }

    pub fn is_const(&self) -> bool {
        self.modifiers.contains(&Modifier::Constant)
    }

    /// Strips every `Reference` modifier, keeping `Pointer`s. An addressable
    /// location becomes a plain value of the same shape.
    pub fn destroy_references(&self) -> Self {
        Self {
            modifiers: self
                .modifiers
                .iter()
                .copied()
                .filter(|m| !matches!(m, Modifier::Reference))
                .collect(),
            shape: self.shape.clone(),
        }
    }

    /// Strips every `Pointer` and `Reference` modifier.
    pub fn destroy_indirection(&self) -> Self {
        Self {
            modifiers: self
                .modifiers
                .iter()
                .copied()
                .filter(|m| !matches!(m, Modifier::Pointer | Modifier::Reference))
                .collect(),
            shape: self.shape.clone(),
        }
    }

    /// Removes exactly one layer of indirection (reference preferred over
    /// pointer, matching how the cast engine's `Dereference` step is only
    /// ever emitted for one layer at a time).
    pub fn follow(&self) -> Self {
        let mut modifiers = self.modifiers.clone();
        if let Some(pos) = modifiers.iter().rposition(|m| matches!(m, Modifier::Reference)) {
            modifiers.remove(pos);
        } else if let Some(pos) = modifiers.iter().rposition(|m| matches!(m, Modifier::Pointer)) {
            modifiers.remove(pos);
        }
        Self {
            modifiers,
            shape: self.shape.clone(),
        }
    }

    /// Alias for [`Type::follow`] kept distinct because the cast engine's
    /// `Dereference` step and the accessor lowering's "load through pointer"
    /// step are conceptually different operations that happen to share an
    /// implementation on this descriptor.
    pub fn dereference(&self) -> Self {
        self.follow()
    }

    pub fn is_copyable_by_default(&self) -> bool {
        !matches!(self.shape, TypeShape::Function(FunctionType { kind: FunctionKind::Raw, .. }))
    }
}

/// One parent class in a [`ClassDescriptor`]'s inheritance list, in
/// declaration order. `sub_object_index` is filled in by [`crate::class_emit`]
/// once the aggregate layout is known; descriptors arriving from semantic
/// analysis leave it at `0` and it is never read before that pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentClass {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberVariable {
    pub name: String,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub name: String,
    pub parents: Vec<ParentClass>,
    pub members: Vec<MemberVariable>,
    pub has_destructor: bool,
    pub has_user_copy_constructor: bool,
    pub is_structure: bool,
    pub is_bitfield: bool,
    pub is_capture: bool,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
            members: Vec::new(),
            has_destructor: false,
            has_user_copy_constructor: false,
            is_structure: false,
            is_bitfield: false,
            is_capture: false,
        }
    }

    /// Whether instances of this class carry an instance-info header.
    /// Structures (POD aggregates) and bitfields do not.
    pub fn has_instance_info(&self) -> bool {
        !self.is_structure && !self.is_bitfield
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indirection_level_counts_both_modifiers() {
        let t = Type::native(Native::Integer)
            .pointer_to()
            .reference_to()
            .pointer_to();
        assert_eq!(t.indirection_level(), 3);
        assert_eq!(t.pointer_level(), 2);
        assert_eq!(t.reference_level(), 1);
    }

    #[test]
    fn follow_prefers_stripping_reference_first() {
        let t = Type::native(Native::Integer).pointer_to().reference_to();
        let followed = t.follow();
        assert_eq!(followed.indirection_level(), 1);
        assert_eq!(followed.reference_level(), 0);
    }

    #[test]
    fn destroy_indirection_clears_both_layers() {
        let t = Type::class("Widget").pointer_to().reference_to();
        assert_eq!(t.destroy_indirection().indirection_level(), 0);
    }
}
