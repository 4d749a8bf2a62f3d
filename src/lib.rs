//! # cilmeta
//!
//! ECMA-335 CLI metadata reader, object model, and builder.
//!
//! This crate provides functionality to parse, model, and write CLR metadata
//! from .NET assemblies. It works with raw metadata bytes, making it PE-agnostic
//! and suitable for use with any PE parser.
//!
//! ## Features
//!
//! - Parse BSJB metadata root and stream headers, `#~` and `#-` alike
//! - Access heaps: #Strings, #US, #GUID, #Blob, with content-based interning
//! - Parse every ECMA-335 metadata table
//! - Decode and encode signature blobs (types, methods, fields, marshalling)
//! - Build a fresh metadata directory from an edited object-model graph
//!
//! ## Example
//!
//! ```ignore
//! use cilmeta::Metadata;
//!
//! // Parse metadata from raw bytes
//! let metadata = Metadata::parse(&metadata_bytes)?;
//!
//! println!("Runtime version: {}", metadata.version());
//!
//! if let Some(assembly) = metadata.assembly() {
//!     println!("Assembly: {} v{}.{}.{}.{}",
//!         assembly.name,
//!         assembly.version.0, assembly.version.1,
//!         assembly.version.2, assembly.version.3);
//! }
//!
//! // Modify and write back
//! let modified_bytes = metadata.write();
//! ```

pub mod builder;
pub mod crypto;
pub mod error;
pub mod heaps;
pub mod metadata;
pub mod model;
pub mod reader;
pub mod root;
pub mod signature;
pub mod stream;
pub mod tables;
pub mod writer;

// Re-export main types
pub use error::{Error, Result};
pub use metadata::{AssemblyInfo, AssemblyRefInfo, Metadata, MethodInfo, TypeInfo};
pub use root::MetadataRoot;
pub use stream::StreamHeader;

// Re-export heaps
pub use heaps::{BlobHeap, GuidHeap, StringsHeap, UserStringsHeap};

// Re-export tables
pub use tables::{CodedIndex, CodedIndexKind, TableId, TablesHeader};

// Re-export table rows
pub use tables::{
    AssemblyOsRow, AssemblyProcessorRow, AssemblyRefOsRow, AssemblyRefProcessorRow,
    AssemblyRefRow, AssemblyRow, ClassLayoutRow, ConstantRow, CustomAttributeRow, DeclSecurityRow,
    EncLogRow, EncMapRow, EventMapRow, EventPtrRow, EventRow, ExportedTypeRow, FieldLayoutRow,
    FieldMarshalRow, FieldPtrRow, FieldRow, FieldRvaRow, FileRow, GenericParamConstraintRow,
    GenericParamRow, ImplMapRow, InterfaceImplRow, ManifestResourceRow, MemberRefRow,
    MethodDefRow, MethodImplRow, MethodPtrRow, MethodSemanticsRow, MethodSpecRow, ModuleRefRow,
    ModuleRow, NestedClassRow, ParamPtrRow, ParamRow, PropertyMapRow, PropertyPtrRow,
    PropertyRow, StandAloneSigRow, TypeDefRow, TypeRefRow, TypeSpecRow,
};

// Re-export signature codec and object model
pub use model::{
    AssemblyDefinition, Handle, MemberReference, ModuleDefinition, TypeDefOrRefDescriptor,
};
pub use signature::{
    CallingConvention, CustomMarshalDescriptor, ElementType, FieldSig, Limits, LocalVarSig,
    MarshalDescriptor, MethodSig, NativeType, PropertySig, TypeSig,
};
pub use builder::MetadataBuilder;
