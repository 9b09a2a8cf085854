//! Deterministic symbol mangling.
//!
//! Escapes a human-readable symbol or type into `[A-Za-z0-9_]`, joins nested
//! components with reserved separators, then (for anything that is not a
//! literal/`extern` symbol) finalises the result through a SHA-256 hash
//! prefixed with `Alta_` so emitted identifiers have a bounded, predictable
//! length regardless of how deeply nested or how generic the source symbol
//! was. A shadow map keeps the pre-hash human-readable form around for
//! diagnostics and for the `alta.mapping` module metadata the driver emits.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::types::{Native, Type, TypeShape};

/// Reserved join separators, escaped the same way as any other character so
/// a literal `_0_` appearing in user source can never be confused with a
/// structural separator (see [`escape_name`]).
pub mod separator {
    pub const SCOPE: &str = "_0_";
    pub const PARAMETER_TYPE: &str = "_1_";
    pub const GENERIC_ARGUMENT: &str = "_2_";
    pub const MODIFIER: &str = "_3_";
    pub const ANONYMOUS_SCOPE: &str = "_4_";
    pub const VERSION: &str = "_5_";
    pub const PRERELEASE: &str = "_6_";
    pub const BUILD_METADATA: &str = "_7_";
    pub const VARIADIC_PARAMETER: &str = "_8_";
    pub const PARAMETER_NAME: &str = "_9_";
    pub const LAMBDA_ID: &str = "_10_";
    pub const RETURN_TYPE: &str = "_11_";
}

/// Whether a symbol's mangled name should be the escaped human-readable
/// string verbatim (`Literal`, used for `extern "C"`-style linkage so the
/// accompanying runtime can call it by name) or finalised through the
/// content hash (`Hashed`, the default for everything the compiler itself
/// both produces and consumes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MangleKind {
    Literal,
    Hashed,
}

/// Escapes every byte outside `[A-Za-z0-9]` as `_<ascii-code>_` and doubles
/// any literal underscore, so the escaped form can never accidentally
/// produce one of the reserved separators in [`separator`].
pub fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' => out.push(b as char),
            b'_' => out.push_str("__"),
            other => out.push_str(&format!("_{}_", other)),
        }
    }
    out
}

/// One segment of a scope chain (module, namespace, function, class) to be
/// joined by [`separator::SCOPE`].
#[derive(Debug, Clone)]
pub struct ScopePath(pub Vec<String>);

impl ScopePath {
    pub fn mangled_prefix(&self) -> String {
        self.0
            .iter()
            .map(|s| escape_name(s))
            .collect::<Vec<_>>()
            .join(separator::SCOPE)
    }
}

/// Mangles a type for embedding into a function's parameter-type segment of
/// its own mangled name. Function types are mangled twice over (once for
/// their "raw" form, once with modifiers applied) to disambiguate a
/// raw-function parameter from a closure parameter of otherwise identical
/// shape, matching the source compiler's `mangleType` double pass.
pub fn mangle_type(ty: &Type) -> String {
    let base = match &ty.shape {
        TypeShape::Native(Native::Integer) => "integer".to_string(),
        TypeShape::Native(Native::Byte) => "byte".to_string(),
        TypeShape::Native(Native::Boolean) => "bool".to_string(),
        TypeShape::Native(Native::Void) => "void".to_string(),
        TypeShape::Native(Native::Float) => "float".to_string(),
        TypeShape::Native(Native::Double) => "double".to_string(),
        TypeShape::Class(name) => escape_name(name),
        TypeShape::Union(members) => {
            let parts: Vec<_> = members.iter().map(mangle_type).collect();
            format!("union{}{}", separator::GENERIC_ARGUMENT, parts.join(separator::GENERIC_ARGUMENT))
        }
        TypeShape::Optional(inner) => format!("optional{}{}", separator::GENERIC_ARGUMENT, mangle_type(inner)),
        TypeShape::Bitfield(bf) => format!("bitfield{}{}", separator::GENERIC_ARGUMENT, escape_name(&bf.name)),
        TypeShape::Function(f) => {
            let params: Vec<_> = f.params.iter().map(mangle_type).collect();
            let raw_marker = match f.kind {
                crate::types::FunctionKind::Raw => "raw",
                crate::types::FunctionKind::Closure => "closure",
            };
            format!(
                "function{sep}{raw}{sep}{params}{sep}{ret_sep}{ret}",
                sep = separator::MODIFIER,
                raw = raw_marker,
                params = params.join(separator::PARAMETER_TYPE),
                ret_sep = separator::RETURN_TYPE,
                ret = mangle_type(&f.return_value),
            )
        }
    };

    let modifier_suffix: String = ty
        .modifiers
        .iter()
        .map(|m| match m {
            crate::types::Modifier::Constant => "const",
            crate::types::Modifier::Pointer => "ptr",
            crate::types::Modifier::Reference => "ref",
            crate::types::Modifier::Long => "long",
            crate::types::Modifier::Short => "short",
            crate::types::Modifier::Unsigned => "unsigned",
            crate::types::Modifier::Signed => "signed",
        })
        .collect::<Vec<_>>()
        .join(separator::MODIFIER);

    if modifier_suffix.is_empty() {
        base
    } else {
        format!("{base}{sep}{modifier_suffix}", sep = separator::MODIFIER)
    }
}

/// Maps a finished mangled identifier back to the human-readable symbol it
/// was derived from, for diagnostics and for the `alta.mapping` module
/// metadata the driver emits.
#[derive(Debug, Default)]
pub struct ShadowMap {
    entries: HashMap<String, String>,
}

impl ShadowMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, mangled: &str, original: &str) {
        self.entries
            .entry(mangled.to_string())
            .or_insert_with(|| original.to_string());
    }

    pub fn original_of(&self, mangled: &str) -> Option<&str> {
        self.entries.get(mangled).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The mangler proper: turns a fully escaped, separator-joined symbol string
/// into its final emitted identifier, recording the mapping in `shadows`.
pub struct Mangler<'a> {
    pub shadows: &'a mut ShadowMap,
}

impl<'a> Mangler<'a> {
    pub fn new(shadows: &'a mut ShadowMap) -> Self {
        Self { shadows }
    }

    /// `original` is the pre-escape human-readable form kept for the shadow
    /// map; `escaped` is the already-escaped/joined string to be finalised.
    pub fn finalize(&mut self, original: &str, escaped: String, kind: MangleKind) -> String {
        let mangled = match kind {
            MangleKind::Literal => escaped,
            MangleKind::Hashed => {
                let mut hasher = Sha256::new();
                hasher.update(escaped.as_bytes());
                format!("Alta_{:x}", hasher.finalize())
            }
        };
        self.shadows.record(&mangled, original);
        mangled
    }

    /// Mangles a plain named symbol (variable, module, namespace) scoped
    /// under `scope`.
    pub fn mangle_name(&mut self, scope: &ScopePath, name: &str, kind: MangleKind) -> String {
        let mut escaped = scope.mangled_prefix();
        if !escaped.is_empty() {
            escaped.push_str(separator::SCOPE);
        }
        escaped.push_str(&escape_name(name));
        let original = if scope.0.is_empty() {
            name.to_string()
        } else {
            format!("{}::{}", scope.0.join("::"), name)
        };
        self.finalize(&original, escaped, kind)
    }

    /// Mangles a function, incorporating its parameter types so overloads
    /// with the same name and different signatures never collide.
    pub fn mangle_function(
        &mut self,
        scope: &ScopePath,
        name: &str,
        params: &[Type],
        return_value: &Type,
        kind: MangleKind,
    ) -> String {
        let mut escaped = scope.mangled_prefix();
        if !escaped.is_empty() {
            escaped.push_str(separator::SCOPE);
        }
        escaped.push_str(&escape_name(name));
        for param in params {
            escaped.push_str(separator::PARAMETER_TYPE);
            escaped.push_str(&mangle_type(param));
        }
        escaped.push_str(separator::RETURN_TYPE);
        escaped.push_str(&mangle_type(return_value));

        let original = format!(
            "{}{}({}) -> {:?}",
            scope.0.iter().map(|s| format!("{s}::")).collect::<String>(),
            name,
            params.iter().map(|p| format!("{p:?}")).collect::<Vec<_>>().join(", "),
            return_value,
        );
        self.finalize(&original, escaped, kind)
    }

    /// Mangles a lambda's synthesised implementation function, keyed by the
    /// source position-derived id the type checker assigned it.
    pub fn mangle_lambda(&mut self, scope: &ScopePath, lambda_id: &str) -> String {
        let mut escaped = scope.mangled_prefix();
        if !escaped.is_empty() {
            escaped.push_str(separator::SCOPE);
        }
        escaped.push_str(separator::LAMBDA_ID);
        escaped.push_str(&escape_name(lambda_id));
        let original = format!("{}::<lambda {lambda_id}>", scope.0.join("::"));
        self.finalize(&original, escaped, MangleKind::Hashed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_name_doubles_underscores_and_escapes_ascii() {
        assert_eq!(escape_name("a_b"), "a__b");
        assert_eq!(escape_name("a-b"), "a_45_b");
        assert_eq!(escape_name("Foo1"), "Foo1");
    }

    #[test]
    fn mangling_is_deterministic() {
        let mut shadows = ShadowMap::new();
        let mut mangler = Mangler::new(&mut shadows);
        let scope = ScopePath(vec!["main".into()]);
        let a = mangler.mangle_name(&scope, "counter", MangleKind::Hashed);
        let b = mangler.mangle_name(&scope, "counter", MangleKind::Hashed);
        assert_eq!(a, b);
        assert!(a.starts_with("Alta_"));
    }

    #[test]
    fn literal_symbols_are_not_hashed() {
        let mut shadows = ShadowMap::new();
        let mut mangler = Mangler::new(&mut shadows);
        let scope = ScopePath(vec![]);
        let mangled = mangler.mangle_name(&scope, "printf", MangleKind::Literal);
        assert_eq!(mangled, "printf");
    }

    #[test]
    fn distinct_overloads_mangle_distinctly() {
        let mut shadows = ShadowMap::new();
        let mut mangler = Mangler::new(&mut shadows);
        let scope = ScopePath(vec!["main".into()]);
        let int_ty = Type::native(Native::Integer);
        let float_ty = Type::native(Native::Float);
        let void_ty = Type::native(Native::Void);
        let a = mangler.mangle_function(&scope, "add", &[int_ty.clone()], &void_ty, MangleKind::Hashed);
        let b = mangler.mangle_function(&scope, "add", &[float_ty], &void_ty, MangleKind::Hashed);
        assert_ne!(a, b);
    }

    #[test]
    fn shadow_map_recovers_original_name() {
        let mut shadows = ShadowMap::new();
        let mut mangler = Mangler::new(&mut shadows);
        let scope = ScopePath(vec![]);
        let mangled = mangler.mangle_name(&scope, "counter", MangleKind::Hashed);
        assert_eq!(shadows.original_of(&mangled), Some("counter"));
    }
}
