use std::rc::Rc;

use colored::Colorize;
use hashbrown::HashSet;
use itertools::Itertools;

use crate::frontend::{intern::InternedSymbol, syntax::MetaKind};

/// Size in bytes of every scalar value
pub const WORD_SIZE: u32 = 4;

#[doc(hidden)]
mod private {
    #[doc(hidden)]
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub struct PrivateZst;
}

/// Thin pointer to an interned type kind. Do not construct directly. Instead,
/// use [`TypeContext::intern_type`]
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Type(Rc<TypeKind>, private::PrivateZst);

#[derive(Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// The type of `write(...)` and other value-less calls
    Unit,
    /// Wildcard produced while recovering from an error. Equal to everything.
    Any,
    /// Marks an expression whose error was already reported. Equal to
    /// everything so the error does not cascade.
    Never,
    /// int, float
    Meta(MetaKind),
    /// int[3][4]
    ///
    /// `dims` is ordered outermost first and `element` is never an array
    Array { element: Type, dims: Rc<[u32]> },
    /// fn(int, float) -> int
    Func { params: Rc<[Type]>, ret: Type },
    /// struct tag { ... }
    ///
    /// Members are kept in declaration order
    Struct {
        tag: InternedSymbol,
        members: Rc<[(InternedSymbol, Type)]>,
    },
}

/// Owns the interning table. Every structurally distinct type exists once per
/// context, so `Int`, `Float`, `Unit`, `Any` and `Never` are singletons and
/// pointer identity is a valid fast path for equality.
#[derive(Debug, Clone)]
pub struct TypeContext {
    type_table: HashSet<Rc<TypeKind>>,
    int: Type,
    float: Type,
    unit: Type,
    any: Type,
    never: Type,
}

impl Default for TypeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeContext {
    pub fn new() -> Self {
        let mut type_table = HashSet::new();

        let mut intern = |kind: TypeKind| {
            let rc = type_table.get_or_insert(Rc::new(kind));
            Type(rc.clone(), private::PrivateZst)
        };

        let int = intern(TypeKind::Meta(MetaKind::Int));
        let float = intern(TypeKind::Meta(MetaKind::Float));
        let unit = intern(TypeKind::Unit);
        let any = intern(TypeKind::Any);
        let never = intern(TypeKind::Never);

        Self {
            type_table,
            int,
            float,
            unit,
            any,
            never,
        }
    }

    pub fn intern_type(&mut self, kind: TypeKind) -> Type {
        let rc = self.type_table.get_or_insert(Rc::new(kind));
        Type(rc.clone(), private::PrivateZst)
    }

    /// Returns the canonical instance of a scalar type
    pub fn intern_meta(&self, kind: MetaKind) -> Type {
        match kind {
            MetaKind::Int => self.int.clone(),
            MetaKind::Float => self.float.clone(),
        }
    }

    pub fn int(&self) -> Type {
        self.int.clone()
    }

    pub fn unit(&self) -> Type {
        self.unit.clone()
    }

    pub fn any(&self) -> Type {
        self.any.clone()
    }

    pub fn never(&self) -> Type {
        self.never.clone()
    }

    /// Builds `element[dims[0]][dims[1]]...`. An array element type is
    /// flattened into the result so `element` stays a non-array.
    pub fn array_of(&mut self, element: Type, dims: &[u32]) -> Type {
        if dims.is_empty() {
            return element;
        }

        let (element, dims) = match &*element {
            TypeKind::Array {
                element: inner,
                dims: inner_dims,
            } => (
                inner.clone(),
                dims.iter().chain(inner_dims.iter()).copied().collect(),
            ),
            _ => (element.clone(), dims.into()),
        };

        self.intern_type(TypeKind::Array { element, dims })
    }

    pub fn function(&mut self, params: Vec<Type>, ret: Type) -> Type {
        self.intern_type(TypeKind::Func {
            params: params.into(),
            ret,
        })
    }

    pub fn structure(&mut self, tag: InternedSymbol, members: Vec<(InternedSymbol, Type)>) -> Type {
        self.intern_type(TypeKind::Struct {
            tag,
            members: members.into(),
        })
    }

    /// The type produced by indexing into `ty` once: the outermost dimension
    /// is dropped and a rank one array degenerates to its element type.
    /// Anything that is not an array descends to `Any`.
    pub fn descend(&mut self, ty: &Type) -> Type {
        match &**ty {
            TypeKind::Array { element, dims } => {
                let element = element.clone();
                let rest = dims[1..].to_vec();
                self.array_of(element, &rest)
            }
            _ => self.any(),
        }
    }
}

/// Structural type equality.
///
/// `Any` and `Never` are equal to every type. Array ranks and element types
/// must always match, array lengths only when `strict` is set. Function
/// types compare arity, return and parameter types. Struct types compare
/// member count and member types position by position (with strict array
/// lengths), never the member names.
pub fn types_equal(a: &Type, b: &Type, strict: bool) -> bool {
    if Rc::ptr_eq(&a.0, &b.0) {
        return true;
    }

    match (&**a, &**b) {
        (TypeKind::Any | TypeKind::Never, _) | (_, TypeKind::Any | TypeKind::Never) => true,
        (TypeKind::Unit, TypeKind::Unit) => true,
        (TypeKind::Meta(a), TypeKind::Meta(b)) => a == b,
        (
            TypeKind::Array {
                element: a_element,
                dims: a_dims,
            },
            TypeKind::Array {
                element: b_element,
                dims: b_dims,
            },
        ) => {
            a_dims.len() == b_dims.len()
                && (!strict || a_dims == b_dims)
                && types_equal(a_element, b_element, false)
        }
        (
            TypeKind::Func {
                params: a_params,
                ret: a_ret,
            },
            TypeKind::Func {
                params: b_params,
                ret: b_ret,
            },
        ) => {
            a_params.len() == b_params.len()
                && types_equal(a_ret, b_ret, strict)
                && a_params
                    .iter()
                    .zip(b_params.iter())
                    .all(|(a, b)| types_equal(a, b, strict))
        }
        (
            TypeKind::Struct {
                members: a_members, ..
            },
            TypeKind::Struct {
                members: b_members, ..
            },
        ) => {
            a_members.len() == b_members.len()
                && a_members
                    .iter()
                    .zip(b_members.iter())
                    .all(|((_, a), (_, b))| types_equal(a, b, true))
        }
        _ => false,
    }
}

/// Both operands of an arithmetic or relational operator must be the same
/// scalar type. There is no implicit conversion between `int` and `float`.
pub fn is_arithmetic_pair(a: &Type, b: &Type) -> bool {
    a.is_arithmetic() && b.is_arithmetic() && types_equal(a, b, false)
}

impl core::fmt::Debug for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Type").field(&self.0).finish()
    }
}

impl core::ops::Deref for Type {
    type Target = TypeKind;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl TypeKind {
    pub fn is_meta(&self, kind: MetaKind) -> bool {
        matches!(self, TypeKind::Meta(m) if *m == kind)
    }

    /// Whether this type may appear where a condition is expected. Only `int`
    /// is accepted, apart from the error wildcards.
    pub fn is_logical(&self) -> bool {
        matches!(
            self,
            TypeKind::Meta(MetaKind::Int) | TypeKind::Any | TypeKind::Never
        )
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, TypeKind::Meta(_) | TypeKind::Any | TypeKind::Never)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, TypeKind::Func { .. } | TypeKind::Any | TypeKind::Never)
    }

    pub fn is_indexable(&self) -> bool {
        matches!(self, TypeKind::Array { .. } | TypeKind::Any | TypeKind::Never)
    }

    pub fn is_memberable(&self) -> bool {
        matches!(self, TypeKind::Struct { .. } | TypeKind::Any | TypeKind::Never)
    }

    /// Arrays and structs live in memory and are handled through their
    /// address
    pub fn is_aggregate(&self) -> bool {
        matches!(self, TypeKind::Array { .. } | TypeKind::Struct { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TypeKind::Any | TypeKind::Never)
    }

    /// Size in bytes of a value of this type, `None` when it does not fit in
    /// a `u32`
    pub fn size_of(&self) -> Option<u32> {
        match self {
            TypeKind::Meta(_) => Some(WORD_SIZE),
            TypeKind::Array { element, dims } => dims
                .iter()
                .try_fold(element.size_of()?, |size, dim| size.checked_mul(*dim)),
            TypeKind::Struct { members, .. } => members
                .iter()
                .try_fold(0u32, |size, (_, ty)| size.checked_add(ty.size_of()?)),
            TypeKind::Unit | TypeKind::Any | TypeKind::Never | TypeKind::Func { .. } => Some(0),
        }
    }

    /// Looks up a struct member by name. Members are never resolved through
    /// any enclosing scope.
    pub fn member(&self, name: InternedSymbol) -> Option<&Type> {
        match self {
            TypeKind::Struct { members, .. } => members
                .iter()
                .find(|(member, _)| *member == name)
                .map(|(_, ty)| ty),
            _ => None,
        }
    }

    /// Byte offset of a struct member: the total size of the members declared
    /// before it
    pub fn offset_of(&self, name: InternedSymbol) -> Option<u32> {
        let TypeKind::Struct { members, .. } = self else {
            return None;
        };

        let mut offset = 0u32;
        for (member, ty) in members.iter() {
            if *member == name {
                return Some(offset);
            }

            offset = offset.checked_add(ty.size_of()?)?;
        }

        None
    }

    pub fn function_signature(&self) -> Option<(&[Type], &Type)> {
        match self {
            TypeKind::Func { params, ret } => Some((&params[..], ret)),
            _ => None,
        }
    }
}

impl core::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unit => write!(f, "()"),
            Self::Any => write!(f, "any"),
            Self::Never => write!(f, "!"),
            Self::Meta(meta) => write!(f, "{meta}"),
            Self::Array { element, dims } => {
                write!(f, "{}", **element)?;
                for dim in dims.iter() {
                    write!(f, "[{dim}]")?;
                }
                Ok(())
            }
            Self::Func { params, ret } => write!(
                f,
                "fn({}) -> {}",
                params.iter().map(|p| (**p).to_string()).join(", "),
                **ret
            ),
            Self::Struct { tag, members } => write!(
                f,
                "struct {tag} {{ {}}}",
                members
                    .iter()
                    .map(|(name, ty)| format!("{} {name}; ", **ty))
                    .join("")
            ),
        }
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", (**self).to_string().yellow())
    }
}

#[cfg(test)]
mod tests;
