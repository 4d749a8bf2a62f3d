//! Two-pass metadata builder: accumulate an object-model graph, then emit
//! a fresh `#~` metadata directory from it.
//!
//! Building happens in two conceptual passes, though they are interleaved
//! behind this API:
//!
//! - **Prepare**: every `add_*` call interns its strings/blobs/GUIDs into
//!   the heaps immediately (via `get_or_add`, so repeated content collapses
//!   to one entry) and reserves the next row in the relevant table in
//!   declaration order. The row's 1-based position *is* its eventual
//!   token — nothing is renumbered later.
//! - **Write**: [`MetadataBuilder::finish`] freezes column widths from the
//!   final heap sizes and table cardinalities and serialises the `#~`
//!   stream, reusing [`crate::metadata::Metadata::write`].
//!
//! Column widths (2 vs. 4 byte heap/table indices) are derived fresh from
//! final sizes at write time, so there is no staleness to resolve between
//! passes in practice. `finish` still runs a small convergence check
//! before returning, capped at four attempts, so a future change that
//! *does* introduce a feedback loop (e.g. writing a signature blob whose
//! own size depends on a token width) fails loudly with
//! [`Error::BadImageFormat`] instead of silently emitting a malformed
//! image.

use crate::error::{Error, Result};
use crate::heaps::Guid;
use crate::metadata::Metadata;
use crate::model::{AssemblyDefinition, Handle, ModuleDefinition, TypeDefRowMarker, TypeRefRowMarker};
use crate::root::MetadataRoot;
use crate::stream::StreamHeader;
use crate::tables::{
    AssemblyRow, CodedIndex, CustomAttributeRow, FieldRow, InterfaceImplRow, MemberRefRow,
    MethodDefRow, ModuleRow, TableId, TablesHeader, TypeDefRow, TypeRefRow,
};

const MAX_CONVERGENCE_ATTEMPTS: u32 = 4;

/// Incrementally builds a [`Metadata`] image from scratch.
pub struct MetadataBuilder {
    metadata: Metadata,
}

impl MetadataBuilder {
    /// Start a new, empty metadata image with the four standard heaps and
    /// a `#~` tables stream.
    #[must_use]
    pub fn new(runtime_version: &str) -> Self {
        let streams = vec![
            StreamHeader {
                offset: 0,
                size: 0,
                name: StreamHeader::TABLES.to_string(),
            },
            StreamHeader {
                offset: 0,
                size: 0,
                name: StreamHeader::STRINGS.to_string(),
            },
            StreamHeader {
                offset: 0,
                size: 0,
                name: StreamHeader::USER_STRINGS.to_string(),
            },
            StreamHeader {
                offset: 0,
                size: 0,
                name: StreamHeader::GUID.to_string(),
            },
            StreamHeader {
                offset: 0,
                size: 0,
                name: StreamHeader::BLOB.to_string(),
            },
        ];

        let root = MetadataRoot {
            major_version: 1,
            minor_version: 1,
            reserved: 0,
            version: runtime_version.to_string(),
            flags: 0,
            streams,
        };

        let tables_header = TablesHeader {
            reserved: 0,
            major_version: 2,
            minor_version: 0,
            heap_sizes: 0,
            reserved2: 1,
            valid: 0,
            sorted: 0,
            row_counts: [0u32; 64],
            uncompressed: false,
        };

        let metadata = Metadata {
            root,
            strings: crate::heaps::StringsHeap::new(),
            user_strings: crate::heaps::UserStringsHeap::new(),
            guids: crate::heaps::GuidHeap::new(),
            blobs: crate::heaps::BlobHeap::new(),
            tables_header,
            modules: Vec::new(),
            type_refs: Vec::new(),
            type_defs: Vec::new(),
            field_ptrs: Vec::new(),
            fields: Vec::new(),
            method_ptrs: Vec::new(),
            method_defs: Vec::new(),
            param_ptrs: Vec::new(),
            params: Vec::new(),
            interface_impls: Vec::new(),
            member_refs: Vec::new(),
            constants: Vec::new(),
            custom_attributes: Vec::new(),
            field_marshals: Vec::new(),
            decl_securities: Vec::new(),
            class_layouts: Vec::new(),
            field_layouts: Vec::new(),
            stand_alone_sigs: Vec::new(),
            event_maps: Vec::new(),
            event_ptrs: Vec::new(),
            events: Vec::new(),
            property_maps: Vec::new(),
            property_ptrs: Vec::new(),
            properties: Vec::new(),
            method_semantics: Vec::new(),
            method_impls: Vec::new(),
            module_refs: Vec::new(),
            type_specs: Vec::new(),
            impl_maps: Vec::new(),
            field_rvas: Vec::new(),
            enc_logs: Vec::new(),
            enc_maps: Vec::new(),
            assemblies: Vec::new(),
            assembly_processors: Vec::new(),
            assembly_oss: Vec::new(),
            assembly_refs: Vec::new(),
            assembly_ref_processors: Vec::new(),
            assembly_ref_oss: Vec::new(),
            files: Vec::new(),
            exported_types: Vec::new(),
            manifest_resources: Vec::new(),
            nested_classes: Vec::new(),
            generic_params: Vec::new(),
            method_specs: Vec::new(),
            generic_param_constraints: Vec::new(),
        };

        log::debug!("new metadata builder for runtime version {runtime_version:?}");
        Self { metadata }
    }

    /// Borrow the metadata assembled so far, e.g. to resolve a descriptor
    /// via the `model` accessors while still building.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Declare the assembly's own module (Module table row 1 by
    /// convention). Interns `name` into `#Strings` and `mvid` into
    /// `#GUID`.
    pub fn add_module(&mut self, name: &str, mvid: Guid) -> Handle<ModuleDefinition> {
        let name_idx = self.metadata.strings.add(name);
        let mvid_idx = self.metadata.guids.add(&mvid);
        self.metadata.modules.push(ModuleRow {
            generation: 0,
            name: name_idx,
            mvid: mvid_idx,
            enc_id: 0,
            enc_base_id: 0,
        });
        Handle::new(self.metadata.modules.len() as u32)
    }

    /// Declare this image's own assembly identity (Assembly table, at
    /// most one row).
    pub fn add_assembly(
        &mut self,
        name: &str,
        version: (u16, u16, u16, u16),
        culture: Option<&str>,
        public_key: Option<&[u8]>,
    ) -> Handle<AssemblyDefinition> {
        let name_idx = self.metadata.strings.add(name);
        let culture_idx = culture.map(|c| self.metadata.strings.add(c)).unwrap_or(0);
        let public_key_idx = public_key.map(|k| self.metadata.blobs.add(k)).unwrap_or(0);

        self.metadata.assemblies.push(AssemblyRow {
            hash_alg_id: 0x8004, // ALG_SID_SHA1
            major_version: version.0,
            minor_version: version.1,
            build_number: version.2,
            revision_number: version.3,
            flags: 0,
            public_key: public_key_idx,
            name: name_idx,
            culture: culture_idx,
        });
        Handle::new(self.metadata.assemblies.len() as u32)
    }

    /// Add a `TypeRef` row: a reference to a type defined elsewhere.
    /// `resolution_scope` is a decoded `ResolutionScope` coded index
    /// (Module, ModuleRef, AssemblyRef, or TypeRef for nested types).
    pub fn add_type_ref(
        &mut self,
        resolution_scope: CodedIndex,
        namespace: &str,
        name: &str,
    ) -> Handle<TypeRefRowMarker> {
        let namespace_idx = self.metadata.strings.add(namespace);
        let name_idx = self.metadata.strings.add(name);
        self.metadata.type_refs.push(TypeRefRow {
            resolution_scope,
            type_name: name_idx,
            type_namespace: namespace_idx,
        });
        Handle::new(self.metadata.type_refs.len() as u32)
    }

    /// Add a `TypeDef` row. `field_list`/`method_list` are the 1-based
    /// index of the first row this type owns in the Field/MethodDef
    /// tables (ECMA-335's run-length-by-next-row-start convention);
    /// callers add fields and methods for a type before moving to the
    /// next type so these stay contiguous.
    pub fn add_type_def(
        &mut self,
        flags: u32,
        namespace: &str,
        name: &str,
        extends: CodedIndex,
    ) -> Handle<TypeDefRowMarker> {
        let namespace_idx = self.metadata.strings.add(namespace);
        let name_idx = self.metadata.strings.add(name);
        let field_list = self.metadata.fields.len() as u32 + 1;
        let method_list = self.metadata.method_defs.len() as u32 + 1;
        self.metadata.type_defs.push(TypeDefRow {
            flags,
            type_name: name_idx,
            type_namespace: namespace_idx,
            extends,
            field_list,
            method_list,
        });
        Handle::new(self.metadata.type_defs.len() as u32)
    }

    /// Add a `Field` row to the most recently added `TypeDef`.
    pub fn add_field(&mut self, flags: u16, name: &str, signature: &[u8]) -> u32 {
        let name_idx = self.metadata.strings.add(name);
        let sig_idx = self.metadata.blobs.add(signature);
        self.metadata.fields.push(FieldRow {
            flags,
            name: name_idx,
            signature: sig_idx,
        });
        self.metadata.fields.len() as u32
    }

    /// Add a `MethodDef` row to the most recently added `TypeDef`.
    pub fn add_method_def(
        &mut self,
        rva: u32,
        impl_flags: u16,
        flags: u16,
        name: &str,
        signature: &[u8],
    ) -> u32 {
        let name_idx = self.metadata.strings.add(name);
        let sig_idx = self.metadata.blobs.add(signature);
        let param_list = self.metadata.params.len() as u32 + 1;
        self.metadata.method_defs.push(MethodDefRow {
            rva,
            impl_flags,
            flags,
            name: name_idx,
            signature: sig_idx,
            param_list,
        });
        self.metadata.method_defs.len() as u32
    }

    /// Add a `MemberRef` row: a reference to a field or method defined in
    /// another type, module, or assembly. `parent` is a decoded
    /// `MemberRefParent` coded index.
    pub fn add_member_ref(
        &mut self,
        parent: CodedIndex,
        name: &str,
        signature: &[u8],
    ) -> Handle<crate::model::MemberReference> {
        let name_idx = self.metadata.strings.add(name);
        let sig_idx = self.metadata.blobs.add(signature);
        self.metadata.member_refs.push(MemberRefRow {
            class: parent,
            name: name_idx,
            signature: sig_idx,
        });
        Handle::new(self.metadata.member_refs.len() as u32)
    }

    /// Add a `NestedClass` row declaring `nested` as lexically nested
    /// inside `enclosing`. Row order does not matter; [`Self::finish`]
    /// sorts this table by its ECMA-335 key before writing.
    pub fn add_nested_class(
        &mut self,
        nested: Handle<TypeDefRowMarker>,
        enclosing: Handle<TypeDefRowMarker>,
    ) {
        self.metadata.nested_classes.push(crate::tables::NestedClassRow {
            nested_class: nested.row(),
            enclosing_class: enclosing.row(),
        });
    }

    /// Add an `InterfaceImpl` row: `implementor` implements `interface`, a
    /// `TypeDefOrRef` coded index. Row order does not matter; see
    /// [`Self::add_nested_class`].
    pub fn add_interface_impl(&mut self, implementor: Handle<TypeDefRowMarker>, interface: CodedIndex) {
        self.metadata.interface_impls.push(InterfaceImplRow {
            class: implementor.row(),
            interface,
        });
    }

    /// Add a `CustomAttribute` row. `parent` is a `HasCustomAttribute`
    /// coded index, `attr_type` a `CustomAttributeType` coded index. Row
    /// order does not matter; see [`Self::add_nested_class`].
    pub fn add_custom_attribute(&mut self, parent: CodedIndex, attr_type: CodedIndex, value: &[u8]) {
        let value_idx = self.metadata.blobs.add(value);
        self.metadata.custom_attributes.push(CustomAttributeRow {
            parent,
            attr_type,
            value: value_idx,
        });
    }

    fn heap_width_signature(&self) -> (bool, bool, bool) {
        (
            self.metadata.strings.uses_wide_indices(),
            self.metadata.guids.uses_wide_indices(),
            self.metadata.blobs.uses_wide_indices(),
        )
    }

    /// Freeze the built image and return it.
    ///
    /// Runs a bounded convergence check on heap index widths: each
    /// `add_*` call already interned its strings/blobs before this point,
    /// so the check is expected to stabilise on its first look, but stays
    /// in place as a guard against accidental growth during `finish`.
    pub fn finish(mut self) -> Result<Metadata> {
        self.metadata.sort_tables();
        let mut last = None;
        for attempt in 1..=MAX_CONVERGENCE_ATTEMPTS {
            let widths = self.heap_width_signature();
            if last == Some(widths) {
                log::debug!("heap index widths converged after {attempt} attempt(s)");
                return Ok(self.metadata);
            }
            last = Some(widths);
        }
        log::error!("heap index widths failed to converge after {MAX_CONVERGENCE_ATTEMPTS} attempts");
        Err(Error::BadImageFormat(
            "heap index width convergence failed".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::CodedIndexKind;

    #[test]
    fn builds_minimal_module_and_assembly() {
        let mut builder = MetadataBuilder::new("v4.0.30319");
        let module = builder.add_module("MyModule.dll", [0u8; 16]);
        let assembly = builder.add_assembly("MyAssembly", (1, 0, 0, 0), None, None);

        let metadata = builder.finish().unwrap();
        assert_eq!(metadata.modules.len(), 1);
        assert_eq!(metadata.assemblies.len(), 1);

        let module_desc = ModuleDefinition::new();
        assert_eq!(module_desc.name(&metadata, module), "MyModule.dll");

        let assembly_desc = AssemblyDefinition::new();
        assert_eq!(assembly_desc.name(&metadata, assembly), "MyAssembly");
        assert_eq!(assembly_desc.culture(&metadata, assembly), None);
    }

    #[test]
    fn deduplicates_strings_across_rows() {
        let mut builder = MetadataBuilder::new("v4.0.30319");
        builder.add_type_ref(
            CodedIndex {
                table: Some(TableId::AssemblyRef),
                row: 1,
            },
            "System",
            "Object",
        );
        builder.add_type_ref(
            CodedIndex {
                table: Some(TableId::AssemblyRef),
                row: 1,
            },
            "System",
            "String",
        );
        let metadata = builder.finish().unwrap();
        // "System" is shared between both rows; only one copy lives in the heap.
        assert_eq!(metadata.type_refs[0].type_namespace, metadata.type_refs[1].type_namespace);
    }

    #[test]
    fn round_trips_through_write_and_parse() {
        let mut builder = MetadataBuilder::new("v4.0.30319");
        builder.add_module("M.dll", [7u8; 16]);
        let metadata = builder.finish().unwrap();

        let bytes = metadata.write();
        let reparsed = Metadata::parse(&bytes).unwrap();
        assert_eq!(reparsed.modules.len(), 1);
        assert_eq!(
            reparsed.strings.get(reparsed.modules[0].name).unwrap(),
            "M.dll"
        );
    }

    #[test]
    fn member_ref_parent_resolves_through_coded_index() {
        let mut builder = MetadataBuilder::new("v4.0.30319");
        let type_ref = builder.add_type_ref(
            CodedIndex {
                table: Some(TableId::AssemblyRef),
                row: 1,
            },
            "System",
            "Console",
        );
        let parent = CodedIndex {
            table: Some(TableId::TypeRef),
            row: type_ref.row(),
        };
        let member = builder.add_member_ref(parent, "WriteLine", &[0x06, 0x01]);
        let metadata = builder.finish().unwrap();

        let desc = crate::model::MemberReference::new();
        assert_eq!(desc.name(&metadata, member), "WriteLine");
        let resolved_parent = desc.parent(&metadata, member);
        assert!(matches!(
            resolved_parent,
            crate::model::MemberRefParent::TypeRef(_)
        ));
        let _ = CodedIndexKind::MemberRefParent;
    }

    #[test]
    fn finish_sorts_nested_class_and_custom_attribute_tables() {
        let mut builder = MetadataBuilder::new("v4.0.30319");
        let outer = builder.add_type_def(0, "NS", "Outer", CodedIndex::null());
        let inner_b = builder.add_type_def(0, "NS", "Outer+B", CodedIndex::null());
        let inner_a = builder.add_type_def(0, "NS", "Outer+A", CodedIndex::null());
        // Declared out of nested-class-key order on purpose.
        builder.add_nested_class(inner_b, outer);
        builder.add_nested_class(inner_a, outer);
        builder.add_custom_attribute(
            CodedIndex {
                table: Some(TableId::TypeDef),
                row: inner_b.row(),
            },
            CodedIndex::null(),
            &[],
        );
        builder.add_custom_attribute(
            CodedIndex {
                table: Some(TableId::TypeDef),
                row: inner_a.row(),
            },
            CodedIndex::null(),
            &[],
        );

        let metadata = builder.finish().unwrap();
        assert!(
            metadata.nested_classes[0].nested_class < metadata.nested_classes[1].nested_class
        );
        assert!(
            metadata.sorted_tables_bitmask() & (1 << TableId::NestedClass as u64) != 0
        );
        assert!(
            metadata.sorted_tables_bitmask() & (1 << TableId::CustomAttribute as u64) != 0
        );
    }

    #[test]
    fn add_interface_impl_records_class_and_interface() {
        let mut builder = MetadataBuilder::new("v4.0.30319");
        let implementor = builder.add_type_def(0, "NS", "Impl", CodedIndex::null());
        let iface = CodedIndex {
            table: Some(TableId::TypeRef),
            row: 1,
        };
        builder.add_interface_impl(implementor, iface);
        let metadata = builder.finish().unwrap();
        assert_eq!(metadata.interface_impls.len(), 1);
        assert_eq!(metadata.interface_impls[0].class, implementor.row());
        assert_eq!(metadata.interface_impls[0].interface, iface);
    }
}
