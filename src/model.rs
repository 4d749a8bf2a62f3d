//! Object model: typed descriptors layered over the raw table rows.
//!
//! A descriptor never stores its own metadata token. It is addressed by a
//! [`Handle<T>`] — the table row index it was built from — and resolves
//! strings, GUIDs, and signatures against a borrowed [`crate::metadata::Metadata`]
//! on first access, caching the result in a [`LazyCell`]. The builder
//! computes real tokens only when it serialises a graph of these
//! descriptors back to bytes, so editing a descriptor graph never requires
//! renumbering anything by hand.

use std::marker::PhantomData;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::heaps::Guid;
use crate::metadata::Metadata;
use crate::signature::{FieldSig, MethodSig};
use crate::tables::{CodedIndex, TableId};

/// An opaque, typed index into one of [`Metadata`]'s row vectors.
///
/// Two handles of different `T` are never comparable; this is how the
/// model keeps "row 3 of TypeDef" and "row 3 of TypeRef" from being
/// confused at compile time even though both are plain `u32`s underneath.
pub struct Handle<T> {
    row: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Wrap a 1-based row index.
    #[must_use]
    pub const fn new(row: u32) -> Self {
        Self {
            row,
            _marker: PhantomData,
        }
    }

    /// The 1-based row index this handle addresses.
    #[must_use]
    pub const fn row(self) -> u32 {
        self.row
    }

    /// Zero-based slice index into the owning `Vec<Row>`.
    #[must_use]
    pub const fn index(self) -> usize {
        (self.row - 1) as usize
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Handle<T> {}
impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.row == other.row
    }
}
impl<T> Eq for Handle<T> {}
impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.row.hash(state);
    }
}
impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({})", self.row)
    }
}

/// A write-once cache for a value derived from the raw tables.
///
/// Distinct from a plain `OnceCell`/manual `Option` in one respect: it is
/// `Sync` via [`OnceLock`], so a descriptor graph can be shared across
/// threads without forcing every resolve to happen up front.
pub struct LazyCell<T>(OnceLock<T>);

impl<T> Default for LazyCell<T> {
    fn default() -> Self {
        Self(OnceLock::new())
    }
}

impl<T> LazyCell<T> {
    /// Create an unpopulated cell.
    #[must_use]
    pub const fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Return the cached value, computing and storing it via `init` on
    /// first access.
    pub fn get_or_init<F: FnOnce() -> T>(&self, init: F) -> &T {
        self.0.get_or_init(init)
    }

    /// Overwrite the cell's value, initialising it if it was empty.
    ///
    /// Takes `&mut self`: once a caller holds a unique reference the
    /// `Sync`-safety `OnceLock` exists for no longer matters, so the value
    /// can be replaced outright instead of only set once.
    pub fn set_mut(&mut self, value: T) {
        self.0 = OnceLock::from(value);
    }

    /// A mutable reference to the cached value, if present.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.0.get_mut()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for LazyCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.get() {
            Some(v) => write!(f, "LazyCell({v:?})"),
            None => write!(f, "LazyCell(<uninit>)"),
        }
    }
}

/// A module descriptor (Module table, 0x00).
#[derive(Debug, Default)]
pub struct ModuleDefinition {
    name: LazyCell<String>,
    mvid: LazyCell<Guid>,
}

impl ModuleDefinition {
    /// Build the descriptor for row `handle`. Resolution is lazy; this
    /// does not touch `metadata` yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The module's name, resolved from `#Strings` on first access.
    pub fn name<'a>(&'a self, metadata: &Metadata, handle: Handle<ModuleDefinition>) -> &'a str {
        self.name.get_or_init(|| {
            metadata
                .modules
                .get(handle.index())
                .and_then(|row| metadata.strings.get(row.name).ok())
                .unwrap_or("")
                .to_string()
        })
    }

    /// The module version ID, resolved from `#GUID` on first access.
    pub fn mvid(&self, metadata: &Metadata, handle: Handle<ModuleDefinition>) -> Guid {
        *self.mvid.get_or_init(|| {
            metadata
                .modules
                .get(handle.index())
                .and_then(|row| metadata.guids.get(row.mvid).ok())
                .unwrap_or([0u8; 16])
        })
    }
}

/// An assembly descriptor (Assembly table, 0x20).
#[derive(Debug, Default)]
pub struct AssemblyDefinition {
    name: LazyCell<String>,
    culture: LazyCell<Option<String>>,
    public_key_token: LazyCell<Option<[u8; 8]>>,
}

impl AssemblyDefinition {
    /// Build an unresolved descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The assembly's simple name.
    pub fn name<'a>(&'a self, metadata: &Metadata, handle: Handle<AssemblyDefinition>) -> &'a str {
        self.name.get_or_init(|| {
            metadata
                .assemblies
                .get(handle.index())
                .and_then(|row| metadata.strings.get(row.name).ok())
                .unwrap_or("")
                .to_string()
        })
    }

    /// The assembly's culture, or `None` for the neutral culture.
    pub fn culture<'a>(
        &'a self,
        metadata: &Metadata,
        handle: Handle<AssemblyDefinition>,
    ) -> Option<&'a str> {
        self.culture
            .get_or_init(|| {
                metadata.assemblies.get(handle.index()).and_then(|row| {
                    if row.culture == 0 {
                        None
                    } else {
                        metadata.strings.get(row.culture).ok().map(str::to_string)
                    }
                })
            })
            .as_deref()
    }

    /// The SHA-1-derived 8-byte public key token, or `None` if the assembly
    /// carries no public key.
    pub fn public_key_token(
        &self,
        metadata: &Metadata,
        handle: Handle<AssemblyDefinition>,
    ) -> Option<[u8; 8]> {
        *self.public_key_token.get_or_init(|| {
            let row = metadata.assemblies.get(handle.index())?;
            if row.public_key == 0 {
                return None;
            }
            let key = metadata.blobs.get(row.public_key).ok()?;
            Some(crate::crypto::public_key_token(key))
        })
    }
}

/// A resolved `TypeDefOrRef` coded index: which table the reference lands
/// in, carried as a typed handle rather than a raw token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDefOrRefDescriptor {
    TypeDef(Handle<TypeDefRowMarker>),
    TypeRef(Handle<TypeRefRowMarker>),
    TypeSpec(Handle<TypeSpecRowMarker>),
    Null,
}

/// Zero-sized marker types so [`Handle`] can distinguish the three tables
/// a `TypeDefOrRef` coded index may land in without needing the actual row
/// structs to be `'static`-bounded generic parameters.
#[derive(Debug)]
pub struct TypeDefRowMarker;
#[derive(Debug)]
pub struct TypeRefRowMarker;
#[derive(Debug)]
pub struct TypeSpecRowMarker;

impl TypeDefOrRefDescriptor {
    /// Build a descriptor from a decoded `TypeDefOrRef` coded index.
    #[must_use]
    pub fn from_coded_index(index: CodedIndex) -> Self {
        if index.is_null() {
            return Self::Null;
        }
        match index.table {
            Some(TableId::TypeDef) => Self::TypeDef(Handle::new(index.row)),
            Some(TableId::TypeRef) => Self::TypeRef(Handle::new(index.row)),
            Some(TableId::TypeSpec) => Self::TypeSpec(Handle::new(index.row)),
            _ => Self::Null,
        }
    }

    /// The namespace and name of the referenced type, where resolvable.
    /// `TypeSpec` rows have no name of their own (they describe a
    /// constructed type via a signature blob) and resolve to `None`.
    pub fn name<'a>(&self, metadata: &'a Metadata) -> Option<(&'a str, &'a str)> {
        match *self {
            TypeDefOrRefDescriptor::TypeDef(h) => {
                let row = metadata.type_defs.get(h.index())?;
                Some((
                    metadata.strings.get(row.type_namespace).unwrap_or(""),
                    metadata.strings.get(row.type_name).unwrap_or(""),
                ))
            }
            TypeDefOrRefDescriptor::TypeRef(h) => {
                let row = metadata.type_refs.get(h.index())?;
                Some((
                    metadata.strings.get(row.type_namespace).unwrap_or(""),
                    metadata.strings.get(row.type_name).unwrap_or(""),
                ))
            }
            TypeDefOrRefDescriptor::TypeSpec(_) | TypeDefOrRefDescriptor::Null => None,
        }
    }
}

/// A resolved `MemberRefParent` coded index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRefParent {
    TypeDef(Handle<TypeDefRowMarker>),
    TypeRef(Handle<TypeRefRowMarker>),
    ModuleRef(Handle<ModuleRefRowMarker>),
    MethodDef(Handle<MethodDefRowMarker>),
    TypeSpec(Handle<TypeSpecRowMarker>),
    Null,
}

#[derive(Debug)]
pub struct ModuleRefRowMarker;
#[derive(Debug)]
pub struct MethodDefRowMarker;

impl MemberRefParent {
    /// Build a descriptor from a decoded `MemberRefParent` coded index.
    #[must_use]
    pub fn from_coded_index(index: CodedIndex) -> Self {
        if index.is_null() {
            return Self::Null;
        }
        match index.table {
            Some(TableId::TypeDef) => Self::TypeDef(Handle::new(index.row)),
            Some(TableId::TypeRef) => Self::TypeRef(Handle::new(index.row)),
            Some(TableId::ModuleRef) => Self::ModuleRef(Handle::new(index.row)),
            Some(TableId::MethodDef) => Self::MethodDef(Handle::new(index.row)),
            Some(TableId::TypeSpec) => Self::TypeSpec(Handle::new(index.row)),
            _ => Self::Null,
        }
    }
}

/// A member reference descriptor (MemberRef table, 0x0A): a member
/// (field or method) referenced by name and signature rather than by
/// direct token, typically pointing at a type defined in another module
/// or assembly.
#[derive(Debug, Default)]
pub struct MemberReference {
    name: LazyCell<String>,
    parent: LazyCell<MemberRefParent>,
}

/// Either interpretation of a `MemberRef` signature blob: the table alone
/// does not say whether the member is a field or a method, so callers
/// inspect the blob's calling-convention byte to decide which to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberRefSignature {
    Field(FieldSig),
    Method(MethodSig),
}

impl MemberReference {
    /// Build an unresolved descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The referenced member's name.
    pub fn name<'a>(&'a self, metadata: &Metadata, handle: Handle<MemberReference>) -> &'a str {
        self.name.get_or_init(|| {
            metadata
                .member_refs
                .get(handle.index())
                .and_then(|row| metadata.strings.get(row.name).ok())
                .unwrap_or("")
                .to_string()
        })
    }

    /// The type or method this member is a member of.
    pub fn parent(&self, metadata: &Metadata, handle: Handle<MemberReference>) -> MemberRefParent {
        *self.parent.get_or_init(|| {
            metadata
                .member_refs
                .get(handle.index())
                .map(|row| MemberRefParent::from_coded_index(row.class))
                .unwrap_or(MemberRefParent::Null)
        })
    }

    /// Decode the member's signature blob. The field-vs-method calling
    /// convention byte (`0x06` for fields) decides which grammar to use;
    /// this is not cached since callers rarely need it more than once.
    pub fn signature(
        &self,
        metadata: &Metadata,
        handle: Handle<MemberReference>,
    ) -> Result<MemberRefSignature> {
        let row = metadata
            .member_refs
            .get(handle.index())
            .ok_or_else(|| Error::InvalidHeapReference {
                heap: "member_refs",
                value: handle.row(),
            })?;
        let blob = metadata.blobs.get(row.signature)?;
        if blob
            .first()
            .is_some_and(|&cc| cc == crate::signature::CallingConvention::FIELD)
        {
            Ok(MemberRefSignature::Field(FieldSig::parse_blob(blob)?))
        } else {
            Ok(MemberRefSignature::Method(MethodSig::parse_blob(blob)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_row_and_index_agree() {
        let h: Handle<TypeDefRowMarker> = Handle::new(5);
        assert_eq!(h.row(), 5);
        assert_eq!(h.index(), 4);
    }

    #[test]
    fn lazy_cell_initializes_once() {
        let calls = std::cell::Cell::new(0);
        let cell: LazyCell<i32> = LazyCell::new();
        let a = *cell.get_or_init(|| {
            calls.set(calls.get() + 1);
            42
        });
        let b = *cell.get_or_init(|| {
            calls.set(calls.get() + 1);
            99
        });
        assert_eq!(a, 42);
        assert_eq!(b, 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn lazy_cell_set_mut_overwrites_after_init() {
        let mut cell: LazyCell<i32> = LazyCell::new();
        cell.set_mut(1);
        assert_eq!(cell.get_or_init(|| 99), &1);
        cell.set_mut(2);
        assert_eq!(cell.get_or_init(|| 99), &2);
    }

    #[test]
    fn lazy_cell_get_mut_mutates_in_place() {
        let mut cell: LazyCell<i32> = LazyCell::new();
        assert!(cell.get_mut().is_none());
        cell.set_mut(10);
        *cell.get_mut().unwrap() += 5;
        assert_eq!(cell.get_or_init(|| 0), &15);
    }

    #[test]
    fn type_def_or_ref_descriptor_from_null_index() {
        let desc = TypeDefOrRefDescriptor::from_coded_index(CodedIndex::null());
        assert_eq!(desc, TypeDefOrRefDescriptor::Null);
    }

    #[test]
    fn type_def_or_ref_descriptor_dispatches_by_table() {
        let idx = CodedIndex {
            table: Some(TableId::TypeRef),
            row: 3,
        };
        let desc = TypeDefOrRefDescriptor::from_coded_index(idx);
        match desc {
            TypeDefOrRefDescriptor::TypeRef(h) => assert_eq!(h.row(), 3),
            other => panic!("expected TypeRef, got {other:?}"),
        }
    }
}
