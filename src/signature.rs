//! Signature codec for method, field, property, local-variable, and
//! marshalling-descriptor blobs.
//!
//! ECMA-335 II.23.2 defines the blob signature format; II.23.4 defines the
//! native-type encoding used by marshalling descriptors.

use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::writer::Writer;

/// Bounds how deeply a signature may recurse during decode. Every
/// recursive `TypeSig`/`MethodSig` descent increments a counter checked
/// against `max_depth`; a hostile or corrupt blob that nests modifiers or
/// arrays past the bound fails with [`Error::MalformedSignature`] instead
/// of overflowing the call stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum recursion depth permitted during signature decode.
    pub max_depth: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_depth: 100 }
    }
}

impl Limits {
    fn check(self, depth: u32) -> Result<()> {
        if depth > self.max_depth {
            Err(Error::MalformedSignature(format!(
                "recursion depth {depth} exceeds limit {}",
                self.max_depth
            )))
        } else {
            Ok(())
        }
    }
}

/// Element type codes (ECMA-335 II.23.1.16).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ElementType {
    End = 0x00,
    Void = 0x01,
    Boolean = 0x02,
    Char = 0x03,
    I1 = 0x04,
    U1 = 0x05,
    I2 = 0x06,
    U2 = 0x07,
    I4 = 0x08,
    U4 = 0x09,
    I8 = 0x0A,
    U8 = 0x0B,
    R4 = 0x0C,
    R8 = 0x0D,
    String = 0x0E,
    Ptr = 0x0F,
    ByRef = 0x10,
    ValueType = 0x11,
    Class = 0x12,
    Var = 0x13,
    Array = 0x14,
    GenericInst = 0x15,
    TypedByRef = 0x16,
    IntPtr = 0x18,
    UIntPtr = 0x19,
    FnPtr = 0x1B,
    Object = 0x1C,
    SzArray = 0x1D,
    MVar = 0x1E,
    CModReqd = 0x1F,
    CModOpt = 0x20,
    Internal = 0x21,
    Modifier = 0x40,
    Sentinel = 0x41,
    Pinned = 0x45,
}

impl ElementType {
    /// Parse element type from byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::End),
            0x01 => Some(Self::Void),
            0x02 => Some(Self::Boolean),
            0x03 => Some(Self::Char),
            0x04 => Some(Self::I1),
            0x05 => Some(Self::U1),
            0x06 => Some(Self::I2),
            0x07 => Some(Self::U2),
            0x08 => Some(Self::I4),
            0x09 => Some(Self::U4),
            0x0A => Some(Self::I8),
            0x0B => Some(Self::U8),
            0x0C => Some(Self::R4),
            0x0D => Some(Self::R8),
            0x0E => Some(Self::String),
            0x0F => Some(Self::Ptr),
            0x10 => Some(Self::ByRef),
            0x11 => Some(Self::ValueType),
            0x12 => Some(Self::Class),
            0x13 => Some(Self::Var),
            0x14 => Some(Self::Array),
            0x15 => Some(Self::GenericInst),
            0x16 => Some(Self::TypedByRef),
            0x18 => Some(Self::IntPtr),
            0x19 => Some(Self::UIntPtr),
            0x1B => Some(Self::FnPtr),
            0x1C => Some(Self::Object),
            0x1D => Some(Self::SzArray),
            0x1E => Some(Self::MVar),
            0x1F => Some(Self::CModReqd),
            0x20 => Some(Self::CModOpt),
            0x21 => Some(Self::Internal),
            0x40 => Some(Self::Modifier),
            0x41 => Some(Self::Sentinel),
            0x45 => Some(Self::Pinned),
            _ => None,
        }
    }

    /// Get a human-readable name for the element type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::End => "end",
            Self::Void => "void",
            Self::Boolean => "bool",
            Self::Char => "char",
            Self::I1 => "sbyte",
            Self::U1 => "byte",
            Self::I2 => "short",
            Self::U2 => "ushort",
            Self::I4 => "int",
            Self::U4 => "uint",
            Self::I8 => "long",
            Self::U8 => "ulong",
            Self::R4 => "float",
            Self::R8 => "double",
            Self::String => "string",
            Self::Ptr => "ptr",
            Self::ByRef => "byref",
            Self::ValueType => "valuetype",
            Self::Class => "class",
            Self::Var => "!T",
            Self::Array => "array",
            Self::GenericInst => "generic",
            Self::TypedByRef => "typedref",
            Self::IntPtr => "nint",
            Self::UIntPtr => "nuint",
            Self::FnPtr => "fnptr",
            Self::Object => "object",
            Self::SzArray => "[]",
            Self::MVar => "!!T",
            Self::CModReqd => "modreq",
            Self::CModOpt => "modopt",
            Self::Internal => "internal",
            Self::Modifier => "modifier",
            Self::Sentinel => "...",
            Self::Pinned => "pinned",
        }
    }

    /// Raw tag byte for this element type.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }
}

/// Calling convention flags (ECMA-335 II.23.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallingConvention(pub u8);

impl CallingConvention {
    pub const DEFAULT: u8 = 0x00;
    pub const VARARG: u8 = 0x05;
    pub const FIELD: u8 = 0x06;
    pub const LOCAL_SIG: u8 = 0x07;
    pub const PROPERTY: u8 = 0x08;
    pub const GENERIC: u8 = 0x10;
    pub const HAS_THIS: u8 = 0x20;
    pub const EXPLICIT_THIS: u8 = 0x40;

    /// Check if this is a method signature.
    #[must_use]
    pub fn is_method(self) -> bool {
        let base = self.0 & 0x0F;
        base == Self::DEFAULT || base == Self::VARARG
    }

    /// Check if this is a field signature.
    #[must_use]
    pub fn is_field(self) -> bool {
        (self.0 & 0x0F) == Self::FIELD
    }

    /// Check if this is a property signature.
    #[must_use]
    pub fn is_property(self) -> bool {
        (self.0 & 0x0F) == Self::PROPERTY
    }

    /// Check if the method has an instance pointer (this).
    #[must_use]
    pub fn has_this(self) -> bool {
        (self.0 & Self::HAS_THIS) != 0
    }

    /// Check if this is a generic method.
    #[must_use]
    pub fn is_generic(self) -> bool {
        (self.0 & Self::GENERIC) != 0
    }
}

/// A parsed type from a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSig {
    /// Primitive type (void, bool, char, i1, u1, etc.).
    Primitive(ElementType),
    /// Class or interface reference (TypeDefOrRef coded index).
    Class(u32),
    /// Value type reference (TypeDefOrRef coded index).
    ValueType(u32),
    /// Single-dimensional zero-based array.
    SzArray(Box<TypeSig>),
    /// Multi-dimensional array with bounds.
    Array {
        element_type: Box<TypeSig>,
        rank: u32,
        sizes: Vec<u32>,
        lo_bounds: Vec<i32>,
    },
    /// Pointer to type.
    Ptr(Box<TypeSig>),
    /// By-reference parameter.
    ByRef(Box<TypeSig>),
    /// Generic type instantiation.
    GenericInst {
        is_value_type: bool,
        type_ref: u32,
        type_args: Vec<TypeSig>,
    },
    /// Generic type parameter (T).
    Var(u32),
    /// Generic method parameter (TMethod).
    MVar(u32),
    /// Function pointer.
    FnPtr(Box<MethodSig>),
    /// Modified type (modreq/modopt).
    Modified {
        required: bool,
        modifier: u32,
        inner: Box<TypeSig>,
    },
    /// Pinned type (for locals).
    Pinned(Box<TypeSig>),
}

impl TypeSig {
    /// Parse a type from a signature blob, with the default recursion bound.
    pub fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        Self::parse_with_limits(reader, Limits::default())
    }

    /// Parse a type from a signature blob, enforcing `limits`.
    pub fn parse_with_limits(reader: &mut Reader<'_>, limits: Limits) -> Result<Self> {
        Self::parse_inner(reader, limits, 0)
    }

    fn parse_inner(reader: &mut Reader<'_>, limits: Limits, depth: u32) -> Result<Self> {
        limits.check(depth)?;
        let elem = reader.read_u8()?;

        match elem {
            // Primitives
            0x01 => Ok(TypeSig::Primitive(ElementType::Void)),
            0x02 => Ok(TypeSig::Primitive(ElementType::Boolean)),
            0x03 => Ok(TypeSig::Primitive(ElementType::Char)),
            0x04 => Ok(TypeSig::Primitive(ElementType::I1)),
            0x05 => Ok(TypeSig::Primitive(ElementType::U1)),
            0x06 => Ok(TypeSig::Primitive(ElementType::I2)),
            0x07 => Ok(TypeSig::Primitive(ElementType::U2)),
            0x08 => Ok(TypeSig::Primitive(ElementType::I4)),
            0x09 => Ok(TypeSig::Primitive(ElementType::U4)),
            0x0A => Ok(TypeSig::Primitive(ElementType::I8)),
            0x0B => Ok(TypeSig::Primitive(ElementType::U8)),
            0x0C => Ok(TypeSig::Primitive(ElementType::R4)),
            0x0D => Ok(TypeSig::Primitive(ElementType::R8)),
            0x0E => Ok(TypeSig::Primitive(ElementType::String)),
            0x16 => Ok(TypeSig::Primitive(ElementType::TypedByRef)),
            0x18 => Ok(TypeSig::Primitive(ElementType::IntPtr)),
            0x19 => Ok(TypeSig::Primitive(ElementType::UIntPtr)),
            0x1C => Ok(TypeSig::Primitive(ElementType::Object)),

            // Class
            0x12 => {
                let token = reader.read_compressed_uint()?;
                Ok(TypeSig::Class(token))
            }

            // ValueType
            0x11 => {
                let token = reader.read_compressed_uint()?;
                Ok(TypeSig::ValueType(token))
            }

            // SzArray
            0x1D => {
                let elem_type = Self::parse_inner(reader, limits, depth + 1)?;
                Ok(TypeSig::SzArray(Box::new(elem_type)))
            }

            // Array
            0x14 => {
                let elem_type = Self::parse_inner(reader, limits, depth + 1)?;
                let rank = reader.read_compressed_uint()?;
                let num_sizes = reader.read_compressed_uint()?;
                let mut sizes = Vec::with_capacity(num_sizes as usize);
                for _ in 0..num_sizes {
                    sizes.push(reader.read_compressed_uint()?);
                }
                let num_lo_bounds = reader.read_compressed_uint()?;
                let mut lo_bounds = Vec::with_capacity(num_lo_bounds as usize);
                for _ in 0..num_lo_bounds {
                    lo_bounds.push(reader.read_compressed_int()?);
                }
                Ok(TypeSig::Array {
                    element_type: Box::new(elem_type),
                    rank,
                    sizes,
                    lo_bounds,
                })
            }

            // Ptr
            0x0F => {
                let inner = Self::parse_inner(reader, limits, depth + 1)?;
                Ok(TypeSig::Ptr(Box::new(inner)))
            }

            // ByRef
            0x10 => {
                let inner = Self::parse_inner(reader, limits, depth + 1)?;
                Ok(TypeSig::ByRef(Box::new(inner)))
            }

            // GenericInst
            0x15 => {
                let is_value_type = reader.read_u8()? == 0x11;
                let type_ref = reader.read_compressed_uint()?;
                let gen_arg_count = reader.read_compressed_uint()?;
                let mut type_args = Vec::with_capacity(gen_arg_count as usize);
                for _ in 0..gen_arg_count {
                    type_args.push(Self::parse_inner(reader, limits, depth + 1)?);
                }
                Ok(TypeSig::GenericInst {
                    is_value_type,
                    type_ref,
                    type_args,
                })
            }

            // Var (generic type param)
            0x13 => {
                let index = reader.read_compressed_uint()?;
                Ok(TypeSig::Var(index))
            }

            // MVar (generic method param)
            0x1E => {
                let index = reader.read_compressed_uint()?;
                Ok(TypeSig::MVar(index))
            }

            // FnPtr
            0x1B => {
                let method_sig = MethodSig::parse_inner(reader, limits, depth + 1)?;
                Ok(TypeSig::FnPtr(Box::new(method_sig)))
            }

            // CModReqd
            0x1F => {
                let modifier = reader.read_compressed_uint()?;
                let inner = Self::parse_inner(reader, limits, depth + 1)?;
                Ok(TypeSig::Modified {
                    required: true,
                    modifier,
                    inner: Box::new(inner),
                })
            }

            // CModOpt
            0x20 => {
                let modifier = reader.read_compressed_uint()?;
                let inner = Self::parse_inner(reader, limits, depth + 1)?;
                Ok(TypeSig::Modified {
                    required: false,
                    modifier,
                    inner: Box::new(inner),
                })
            }

            // Pinned
            0x45 => {
                let inner = Self::parse_inner(reader, limits, depth + 1)?;
                Ok(TypeSig::Pinned(Box::new(inner)))
            }

            other => Err(Error::MalformedSignature(format!(
                "unknown element type tag 0x{other:02X} at offset {}",
                reader.position()
            ))),
        }
    }

    /// Encode this type into `writer`, the exact inverse of `parse`.
    pub fn encode(&self, writer: &mut Writer) {
        match self {
            TypeSig::Primitive(elem) => writer.write_u8(elem.tag()),
            TypeSig::Class(token) => {
                writer.write_u8(ElementType::Class.tag());
                writer.write_compressed_uint(*token);
            }
            TypeSig::ValueType(token) => {
                writer.write_u8(ElementType::ValueType.tag());
                writer.write_compressed_uint(*token);
            }
            TypeSig::SzArray(inner) => {
                writer.write_u8(ElementType::SzArray.tag());
                inner.encode(writer);
            }
            TypeSig::Array {
                element_type,
                rank,
                sizes,
                lo_bounds,
            } => {
                writer.write_u8(ElementType::Array.tag());
                element_type.encode(writer);
                writer.write_compressed_uint(*rank);
                writer.write_compressed_uint(sizes.len() as u32);
                for size in sizes {
                    writer.write_compressed_uint(*size);
                }
                writer.write_compressed_uint(lo_bounds.len() as u32);
                for bound in lo_bounds {
                    writer.write_compressed_int(*bound);
                }
            }
            TypeSig::Ptr(inner) => {
                writer.write_u8(ElementType::Ptr.tag());
                inner.encode(writer);
            }
            TypeSig::ByRef(inner) => {
                writer.write_u8(ElementType::ByRef.tag());
                inner.encode(writer);
            }
            TypeSig::GenericInst {
                is_value_type,
                type_ref,
                type_args,
            } => {
                writer.write_u8(ElementType::GenericInst.tag());
                writer.write_u8(if *is_value_type { 0x11 } else { 0x12 });
                writer.write_compressed_uint(*type_ref);
                writer.write_compressed_uint(type_args.len() as u32);
                for arg in type_args {
                    arg.encode(writer);
                }
            }
            TypeSig::Var(index) => {
                writer.write_u8(ElementType::Var.tag());
                writer.write_compressed_uint(*index);
            }
            TypeSig::MVar(index) => {
                writer.write_u8(ElementType::MVar.tag());
                writer.write_compressed_uint(*index);
            }
            TypeSig::FnPtr(method_sig) => {
                writer.write_u8(ElementType::FnPtr.tag());
                method_sig.encode(writer);
            }
            TypeSig::Modified {
                required,
                modifier,
                inner,
            } => {
                writer.write_u8(if *required {
                    ElementType::CModReqd.tag()
                } else {
                    ElementType::CModOpt.tag()
                });
                writer.write_compressed_uint(*modifier);
                inner.encode(writer);
            }
            TypeSig::Pinned(inner) => {
                writer.write_u8(ElementType::Pinned.tag());
                inner.encode(writer);
            }
        }
    }

    /// Encode this type to a fresh byte vector.
    #[must_use]
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        self.encode(&mut writer);
        writer.into_inner()
    }

    /// Physical length in bytes this type would occupy if encoded, computed
    /// without actually writing it.
    #[must_use]
    pub fn physical_len(&self) -> usize {
        match self {
            TypeSig::Primitive(_) => 1,
            TypeSig::Class(token) | TypeSig::ValueType(token) => {
                1 + Writer::compressed_uint_size(*token)
            }
            TypeSig::SzArray(inner) | TypeSig::Ptr(inner) | TypeSig::ByRef(inner) => {
                1 + inner.physical_len()
            }
            TypeSig::Pinned(inner) => 1 + inner.physical_len(),
            TypeSig::Array {
                element_type,
                rank,
                sizes,
                lo_bounds,
            } => {
                1 + element_type.physical_len()
                    + Writer::compressed_uint_size(*rank)
                    + Writer::compressed_uint_size(sizes.len() as u32)
                    + sizes
                        .iter()
                        .map(|s| Writer::compressed_uint_size(*s))
                        .sum::<usize>()
                    + Writer::compressed_uint_size(lo_bounds.len() as u32)
                    + lo_bounds
                        .iter()
                        .map(|b| Writer::compressed_int_size(*b))
                        .sum::<usize>()
            }
            TypeSig::GenericInst {
                type_ref, type_args, ..
            } => {
                2 + Writer::compressed_uint_size(*type_ref)
                    + Writer::compressed_uint_size(type_args.len() as u32)
                    + type_args.iter().map(TypeSig::physical_len).sum::<usize>()
            }
            TypeSig::Var(index) | TypeSig::MVar(index) => 1 + Writer::compressed_uint_size(*index),
            TypeSig::FnPtr(method_sig) => 1 + method_sig.physical_len(),
            TypeSig::Modified {
                modifier, inner, ..
            } => 1 + Writer::compressed_uint_size(*modifier) + inner.physical_len(),
        }
    }
}

/// A parsed method signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSig {
    /// Calling convention flags.
    pub calling_convention: CallingConvention,
    /// Number of generic parameters (0 if not generic).
    pub generic_param_count: u32,
    /// Return type.
    pub return_type: TypeSig,
    /// Parameter types.
    pub params: Vec<TypeSig>,
    /// Sentinel index for vararg methods (None if not vararg).
    pub sentinel: Option<usize>,
}

impl MethodSig {
    /// Parse a method signature from a blob, with the default recursion bound.
    pub fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        Self::parse_inner(reader, Limits::default(), 0)
    }

    /// Parse a method signature from a blob, enforcing `limits`.
    pub fn parse_with_limits(reader: &mut Reader<'_>, limits: Limits) -> Result<Self> {
        Self::parse_inner(reader, limits, 0)
    }

    fn parse_inner(reader: &mut Reader<'_>, limits: Limits, depth: u32) -> Result<Self> {
        limits.check(depth)?;
        let cc = reader.read_u8()?;
        let calling_convention = CallingConvention(cc);

        let generic_param_count = if (cc & CallingConvention::GENERIC) != 0 {
            reader.read_compressed_uint()?
        } else {
            0
        };

        let param_count = reader.read_compressed_uint()?;
        let return_type = TypeSig::parse_inner(reader, limits, depth + 1)?;

        let mut params = Vec::with_capacity(param_count as usize);
        let mut sentinel = None;

        for i in 0..param_count as usize {
            // Check for sentinel (vararg boundary)
            if reader.remaining() > 0 {
                let peek = reader.peek_u8()?;
                if peek == ElementType::Sentinel.tag() {
                    reader.read_u8()?; // consume sentinel
                    sentinel = Some(i);
                }
            }
            params.push(TypeSig::parse_inner(reader, limits, depth + 1)?);
        }

        Ok(Self {
            calling_convention,
            generic_param_count,
            return_type,
            params,
            sentinel,
        })
    }

    /// Parse a method signature from raw bytes.
    pub fn parse_blob(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        Self::parse(&mut reader)
    }

    /// Encode this method signature into `writer`, the exact inverse of `parse`.
    pub fn encode(&self, writer: &mut Writer) {
        writer.write_u8(self.calling_convention.0);
        if self.calling_convention.is_generic() {
            writer.write_compressed_uint(self.generic_param_count);
        }
        writer.write_compressed_uint(self.params.len() as u32);
        self.return_type.encode(writer);
        for (i, param) in self.params.iter().enumerate() {
            if self.sentinel == Some(i) {
                writer.write_u8(ElementType::Sentinel.tag());
            }
            param.encode(writer);
        }
    }

    /// Encode this method signature to a fresh byte vector.
    #[must_use]
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        self.encode(&mut writer);
        writer.into_inner()
    }

    /// Physical length in bytes this signature would occupy if encoded.
    #[must_use]
    pub fn physical_len(&self) -> usize {
        let mut len = 1 + Writer::compressed_uint_size(self.params.len() as u32)
            + self.return_type.physical_len();
        if self.calling_convention.is_generic() {
            len += Writer::compressed_uint_size(self.generic_param_count);
        }
        for (i, param) in self.params.iter().enumerate() {
            if self.sentinel == Some(i) {
                len += 1;
            }
            len += param.physical_len();
        }
        len
    }
}

/// A parsed field signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSig {
    /// The field type.
    pub field_type: TypeSig,
}

impl FieldSig {
    /// Parse a field signature from a blob.
    pub fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let cc = reader.read_u8()?;
        if cc != CallingConvention::FIELD {
            return Err(Error::MalformedSignature(format!(
                "field signature calling convention byte 0x{cc:02X} != FIELD"
            )));
        }
        let field_type = TypeSig::parse(reader)?;
        Ok(Self { field_type })
    }

    /// Parse a field signature from raw bytes.
    pub fn parse_blob(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        Self::parse(&mut reader)
    }

    /// Encode this field signature into `writer`.
    pub fn encode(&self, writer: &mut Writer) {
        writer.write_u8(CallingConvention::FIELD);
        self.field_type.encode(writer);
    }

    /// Encode this field signature to a fresh byte vector.
    #[must_use]
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        self.encode(&mut writer);
        writer.into_inner()
    }

    /// Physical length in bytes this signature would occupy if encoded.
    #[must_use]
    pub fn physical_len(&self) -> usize {
        1 + self.field_type.physical_len()
    }
}

/// A parsed property signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySig {
    /// Whether this is an instance property (has this).
    pub has_this: bool,
    /// Property type.
    pub property_type: TypeSig,
    /// Parameter types (for indexed properties).
    pub params: Vec<TypeSig>,
}

impl PropertySig {
    /// Parse a property signature from a blob.
    pub fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let cc = reader.read_u8()?;
        if (cc & 0x0F) != CallingConvention::PROPERTY {
            return Err(Error::MalformedSignature(format!(
                "property signature calling convention byte 0x{cc:02X} missing PROPERTY bits"
            )));
        }
        let has_this = (cc & CallingConvention::HAS_THIS) != 0;

        let param_count = reader.read_compressed_uint()?;
        let property_type = TypeSig::parse(reader)?;

        let mut params = Vec::with_capacity(param_count as usize);
        for _ in 0..param_count {
            params.push(TypeSig::parse(reader)?);
        }

        Ok(Self {
            has_this,
            property_type,
            params,
        })
    }

    /// Parse a property signature from raw bytes.
    pub fn parse_blob(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        Self::parse(&mut reader)
    }

    /// Encode this property signature into `writer`.
    pub fn encode(&self, writer: &mut Writer) {
        let mut cc = CallingConvention::PROPERTY;
        if self.has_this {
            cc |= CallingConvention::HAS_THIS;
        }
        writer.write_u8(cc);
        writer.write_compressed_uint(self.params.len() as u32);
        self.property_type.encode(writer);
        for param in &self.params {
            param.encode(writer);
        }
    }

    /// Encode this property signature to a fresh byte vector.
    #[must_use]
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        self.encode(&mut writer);
        writer.into_inner()
    }
}

/// A parsed local variables signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVarSig {
    /// Local variable types.
    pub locals: Vec<TypeSig>,
}

impl LocalVarSig {
    /// Parse a local variables signature from a blob.
    pub fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let cc = reader.read_u8()?;
        if cc != CallingConvention::LOCAL_SIG {
            return Err(Error::MalformedSignature(format!(
                "local variable signature calling convention byte 0x{cc:02X} != LOCAL_SIG"
            )));
        }

        let count = reader.read_compressed_uint()?;
        let mut locals = Vec::with_capacity(count as usize);

        for _ in 0..count {
            locals.push(TypeSig::parse(reader)?);
        }

        Ok(Self { locals })
    }

    /// Parse a local variables signature from raw bytes.
    pub fn parse_blob(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        Self::parse(&mut reader)
    }

    /// Encode this local variables signature into `writer`.
    pub fn encode(&self, writer: &mut Writer) {
        writer.write_u8(CallingConvention::LOCAL_SIG);
        writer.write_compressed_uint(self.locals.len() as u32);
        for local in &self.locals {
            local.encode(writer);
        }
    }

    /// Encode this local variables signature to a fresh byte vector.
    #[must_use]
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        self.encode(&mut writer);
        writer.into_inner()
    }
}

/// Native type tag for a marshalling descriptor not otherwise specialised.
/// Carries the raw ECMA-335 II.23.4 tag plus any trailing compressed-uint
/// fields it defines, so unrecognised native types still round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeType {
    /// The native-type tag byte.
    pub tag: u8,
    /// Trailing compressed-uint fields, in encoding order.
    pub extra: Vec<u32>,
}

/// A marshalling descriptor. Most native types carry no further payload
/// ([`NativeType`]); the `NATIVE_TYPE_CUSTOMMARSHALER` tag (`0x2C`) carries
/// four serialised strings describing a custom marshaler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarshalDescriptor {
    /// A native type with no further structure.
    Simple(NativeType),
    /// `NATIVE_TYPE_CUSTOMMARSHALER`: GUID, unmanaged type, managed type, cookie.
    CustomMarshaler(CustomMarshalDescriptor),
}

/// `NATIVE_TYPE_CUSTOMMARSHALER` descriptor (ECMA-335 II.23.4).
///
/// The GUID field is conventionally formatted with braces and hyphens
/// (`{11111111-2222-3333-4444-555555555555}`); a missing or unparseable
/// GUID string decodes to the zero GUID rather than failing, since many
/// real-world assemblies omit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomMarshalDescriptor {
    /// Formatted GUID string, or the zero GUID if absent/invalid.
    pub guid: crate::heaps::Guid,
    /// Unmanaged type name.
    pub unmanaged_type: String,
    /// Managed type name.
    pub managed_type: String,
    /// Marshaler cookie.
    pub cookie: String,
}

pub const NATIVE_TYPE_CUSTOMMARSHALER: u8 = 0x2C;

impl MarshalDescriptor {
    /// Parse a marshalling descriptor from a blob.
    pub fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let tag = reader.read_u8()?;
        if tag == NATIVE_TYPE_CUSTOMMARSHALER {
            let guid_str = reader.read_serialized_string()?;
            let guid = guid_str.and_then(parse_braced_guid).unwrap_or([0u8; 16]);
            let unmanaged_type = reader.read_serialized_string()?.unwrap_or("").to_string();
            let managed_type = reader.read_serialized_string()?.unwrap_or("").to_string();
            let cookie = reader.read_serialized_string()?.unwrap_or("").to_string();
            Ok(MarshalDescriptor::CustomMarshaler(CustomMarshalDescriptor {
                guid,
                unmanaged_type,
                managed_type,
                cookie,
            }))
        } else {
            // Trailing fields for the native types that carry them
            // (array element type + size parameter + size, safearray
            // element type, fixed array count/type, interface index) are
            // all compressed-uints; consume whatever remains of the blob
            // as such so the descriptor round-trips even for tags this
            // codec does not interpret semantically.
            let mut extra = Vec::new();
            while reader.remaining() > 0 {
                extra.push(reader.read_compressed_uint()?);
            }
            Ok(MarshalDescriptor::Simple(NativeType { tag, extra }))
        }
    }

    /// Parse a marshalling descriptor from raw bytes.
    pub fn parse_blob(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        Self::parse(&mut reader)
    }

    /// Encode this marshalling descriptor into `writer`.
    pub fn encode(&self, writer: &mut Writer) {
        match self {
            MarshalDescriptor::Simple(nt) => {
                writer.write_u8(nt.tag);
                for value in &nt.extra {
                    writer.write_compressed_uint(*value);
                }
            }
            MarshalDescriptor::CustomMarshaler(desc) => {
                writer.write_u8(NATIVE_TYPE_CUSTOMMARSHALER);
                let guid_str = format_braced_guid(&desc.guid);
                writer.write_serialized_string(Some(&guid_str));
                writer.write_serialized_string(Some(&desc.unmanaged_type));
                writer.write_serialized_string(Some(&desc.managed_type));
                writer.write_serialized_string(Some(&desc.cookie));
            }
        }
    }

    /// Encode this marshalling descriptor to a fresh byte vector.
    #[must_use]
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        self.encode(&mut writer);
        writer.into_inner()
    }

    /// Physical length in bytes this descriptor would occupy if encoded.
    #[must_use]
    pub fn physical_len(&self) -> usize {
        match self {
            MarshalDescriptor::Simple(nt) => {
                1 + nt
                    .extra
                    .iter()
                    .map(|v| Writer::compressed_uint_size(*v))
                    .sum::<usize>()
            }
            MarshalDescriptor::CustomMarshaler(desc) => {
                let guid_str = format_braced_guid(&desc.guid);
                1 + Writer::serialized_string_size(Some(&guid_str))
                    + Writer::serialized_string_size(Some(&desc.unmanaged_type))
                    + Writer::serialized_string_size(Some(&desc.managed_type))
                    + Writer::serialized_string_size(Some(&desc.cookie))
            }
        }
    }
}

/// Format a GUID the way a custom marshaler descriptor expects:
/// `{11111111-2222-3333-4444-555555555555}`.
#[must_use]
pub fn format_braced_guid(guid: &crate::heaps::Guid) -> String {
    format!("{{{}}}", crate::heaps::format_guid(guid))
}

fn parse_braced_guid(s: &str) -> Option<crate::heaps::Guid> {
    let inner = s.strip_prefix('{')?.strip_suffix('}')?;
    let mut bytes = [0u8; 16];
    let parts: Vec<&str> = inner.split('-').collect();
    if parts.len() != 5 {
        return None;
    }
    let widths = [4, 2, 2, 2, 6];
    let mut cursor = 0;
    for (part, width) in parts.iter().zip(widths) {
        if part.len() != width * 2 {
            return None;
        }
        for i in 0..width {
            bytes[cursor + i] = u8::from_str_radix(&part[i * 2..i * 2 + 2], 16).ok()?;
        }
        cursor += width;
    }
    // The first three fields are little-endian in the GUID's byte layout.
    bytes[0..4].reverse();
    bytes[4..6].reverse();
    bytes[6..8].reverse();
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth_nested_cmod_reqd(depth: usize) -> Vec<u8> {
        let mut writer = Writer::new();
        for _ in 0..depth {
            writer.write_u8(ElementType::CModReqd.tag());
            writer.write_compressed_uint(0);
        }
        writer.write_u8(ElementType::Void.tag());
        writer.into_inner()
    }

    #[test]
    fn decodes_primitive() {
        let blob = [ElementType::I4.tag()];
        let mut reader = Reader::new(&blob);
        assert_eq!(
            TypeSig::parse(&mut reader).unwrap(),
            TypeSig::Primitive(ElementType::I4)
        );
    }

    #[test]
    fn roundtrips_nested_generic_inst() {
        let sig = TypeSig::GenericInst {
            is_value_type: false,
            type_ref: 42,
            type_args: vec![
                TypeSig::Primitive(ElementType::I4),
                TypeSig::SzArray(Box::new(TypeSig::Primitive(ElementType::String))),
            ],
        };
        let bytes = sig.encode_to_vec();
        assert_eq!(bytes.len(), sig.physical_len());
        let mut reader = Reader::new(&bytes);
        let decoded = TypeSig::parse(&mut reader).unwrap();
        assert_eq!(decoded, sig);
    }

    #[test]
    fn roundtrips_method_sig_with_sentinel() {
        let sig = MethodSig {
            calling_convention: CallingConvention(CallingConvention::VARARG),
            generic_param_count: 0,
            return_type: TypeSig::Primitive(ElementType::Void),
            params: vec![
                TypeSig::Primitive(ElementType::I4),
                TypeSig::Primitive(ElementType::R8),
            ],
            sentinel: Some(1),
        };
        let bytes = sig.encode_to_vec();
        assert_eq!(bytes.len(), sig.physical_len());
        let decoded = MethodSig::parse_blob(&bytes).unwrap();
        assert_eq!(decoded, sig);
    }

    #[test]
    fn recursion_guard_allows_boundary_depth() {
        let blob = depth_nested_cmod_reqd(100);
        let mut reader = Reader::new(&blob);
        assert!(TypeSig::parse(&mut reader).is_ok());
    }

    #[test]
    fn recursion_guard_trips_past_limit() {
        let blob = depth_nested_cmod_reqd(200);
        let mut reader = Reader::new(&blob);
        let err = TypeSig::parse(&mut reader).unwrap_err();
        assert!(matches!(err, Error::MalformedSignature(_)));
    }

    #[test]
    fn custom_marshal_descriptor_roundtrip_and_length() {
        let guid = parse_braced_guid("{11111111-2222-3333-4444-555555555555}").unwrap();
        let desc = CustomMarshalDescriptor {
            guid,
            unmanaged_type: "u".to_string(),
            managed_type: "m".to_string(),
            cookie: "c".to_string(),
        };
        let descriptor = MarshalDescriptor::CustomMarshaler(desc);
        let bytes = descriptor.encode_to_vec();
        assert_eq!(bytes.len(), descriptor.physical_len());

        let decoded = MarshalDescriptor::parse_blob(&bytes).unwrap();
        assert_eq!(decoded, descriptor);

        // tag(1) + length-prefixed 38-char braced guid(1+38) + 3 serstrings(1+1 each)
        assert_eq!(bytes.len(), 1 + (1 + 38) + (1 + 1) + (1 + 1) + (1 + 1));
    }

    #[test]
    fn custom_marshal_descriptor_tolerates_missing_guid() {
        let mut writer = Writer::new();
        writer.write_u8(NATIVE_TYPE_CUSTOMMARSHALER);
        writer.write_serialized_string(None);
        writer.write_serialized_string(Some("u"));
        writer.write_serialized_string(Some("m"));
        writer.write_serialized_string(Some("c"));
        let bytes = writer.into_inner();

        let decoded = MarshalDescriptor::parse_blob(&bytes).unwrap();
        match decoded {
            MarshalDescriptor::CustomMarshaler(desc) => assert_eq!(desc.guid, [0u8; 16]),
            _ => panic!("expected CustomMarshaler"),
        }
    }

    #[test]
    fn field_sig_requires_field_calling_convention() {
        let bytes = [0x00, ElementType::I4.tag()];
        assert!(FieldSig::parse_blob(&bytes).is_err());
    }
}
