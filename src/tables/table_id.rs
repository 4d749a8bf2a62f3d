//! Table identifiers (ECMA-335 II.22).

use crate::error::{Error, Result};

/// Identifies one of the metadata tables by its fixed ECMA-335 index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[non_exhaustive]
pub enum TableId {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    FieldMarshal = 0x0D,
    DeclSecurity = 0x0E,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    ImplMap = 0x1C,
    FieldRva = 0x1D,
    EncLog = 0x1E,
    EncMap = 0x1F,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    AssemblyOs = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    AssemblyRefOs = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
}

impl TableId {
    /// Resolve a raw table index byte to a `TableId`.
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0x00 => Self::Module,
            0x01 => Self::TypeRef,
            0x02 => Self::TypeDef,
            0x03 => Self::FieldPtr,
            0x04 => Self::Field,
            0x05 => Self::MethodPtr,
            0x06 => Self::MethodDef,
            0x07 => Self::ParamPtr,
            0x08 => Self::Param,
            0x09 => Self::InterfaceImpl,
            0x0A => Self::MemberRef,
            0x0B => Self::Constant,
            0x0C => Self::CustomAttribute,
            0x0D => Self::FieldMarshal,
            0x0E => Self::DeclSecurity,
            0x0F => Self::ClassLayout,
            0x10 => Self::FieldLayout,
            0x11 => Self::StandAloneSig,
            0x12 => Self::EventMap,
            0x13 => Self::EventPtr,
            0x14 => Self::Event,
            0x15 => Self::PropertyMap,
            0x16 => Self::PropertyPtr,
            0x17 => Self::Property,
            0x18 => Self::MethodSemantics,
            0x19 => Self::MethodImpl,
            0x1A => Self::ModuleRef,
            0x1B => Self::TypeSpec,
            0x1C => Self::ImplMap,
            0x1D => Self::FieldRva,
            0x1E => Self::EncLog,
            0x1F => Self::EncMap,
            0x20 => Self::Assembly,
            0x21 => Self::AssemblyProcessor,
            0x22 => Self::AssemblyOs,
            0x23 => Self::AssemblyRef,
            0x24 => Self::AssemblyRefProcessor,
            0x25 => Self::AssemblyRefOs,
            0x26 => Self::File,
            0x27 => Self::ExportedType,
            0x28 => Self::ManifestResource,
            0x29 => Self::NestedClass,
            0x2A => Self::GenericParam,
            0x2B => Self::MethodSpec,
            0x2C => Self::GenericParamConstraint,
            other => return Err(Error::InvalidTableId(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_every_defined_table() {
        for raw in 0x00u8..=0x2C {
            let id = TableId::from_u8(raw).unwrap();
            assert_eq!(id as u8, raw);
        }
    }

    #[test]
    fn rejects_unused_slots() {
        assert!(TableId::from_u8(0x2D).is_err());
        assert!(TableId::from_u8(0x3F).is_err());
    }
}
