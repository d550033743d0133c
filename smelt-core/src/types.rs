//! Source-language type system and layout computation.
//!
//! Every scalar source type ("intrinsic") lowers to one of WebAssembly's four
//! numeric machine types. Pointers are `i32` at the machine level. Arrays and
//! structs live in linear memory and are addressed, never loaded whole.

use std::collections::HashMap;
use std::fmt;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

/// WebAssembly numeric machine types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// 32-bit integer
    I32,
    /// 64-bit integer
    I64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
}

impl ValueType {
    /// The WAT name of the type (`i32`, `i64`, `f32`, `f64`).
    pub fn name(self) -> &'static str {
        match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
        }
    }

    /// Floating-point machine types.
    pub fn is_float(self) -> bool {
        matches!(self, ValueType::F32 | ValueType::F64)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scalar source types that lower directly to a machine type.
///
/// 8- and 16-bit integers ride on `i32`; their narrower range is enforced by
/// tightening after casts and by sub-word loads/stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intrinsic {
    /// 8-bit signed integer
    I8,
    /// 8-bit unsigned integer
    U8,
    /// 16-bit signed integer
    I16,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit signed integer
    I32,
    /// 32-bit unsigned integer
    U32,
    /// 64-bit signed integer
    I64,
    /// 64-bit unsigned integer
    U64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
}

impl Intrinsic {
    /// Parse a source type name. Returns `None` for anything that is not an
    /// intrinsic (struct names, aliases, garbage).
    pub fn parse(name: &str) -> Option<Intrinsic> {
        Some(match name {
            "i8" => Intrinsic::I8,
            "u8" => Intrinsic::U8,
            "i16" => Intrinsic::I16,
            "u16" => Intrinsic::U16,
            "i32" => Intrinsic::I32,
            "u32" => Intrinsic::U32,
            "i64" => Intrinsic::I64,
            "u64" => Intrinsic::U64,
            "f32" => Intrinsic::F32,
            "f64" => Intrinsic::F64,
            _ => return None,
        })
    }

    /// Source-level name.
    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::I8 => "i8",
            Intrinsic::U8 => "u8",
            Intrinsic::I16 => "i16",
            Intrinsic::U16 => "u16",
            Intrinsic::I32 => "i32",
            Intrinsic::U32 => "u32",
            Intrinsic::I64 => "i64",
            Intrinsic::U64 => "u64",
            Intrinsic::F32 => "f32",
            Intrinsic::F64 => "f64",
        }
    }

    /// The machine type this intrinsic rides on.
    pub fn value_type(self) -> ValueType {
        match self {
            Intrinsic::I8
            | Intrinsic::U8
            | Intrinsic::I16
            | Intrinsic::U16
            | Intrinsic::I32
            | Intrinsic::U32 => ValueType::I32,
            Intrinsic::I64 | Intrinsic::U64 => ValueType::I64,
            Intrinsic::F32 => ValueType::F32,
            Intrinsic::F64 => ValueType::F64,
        }
    }

    /// Signed integer types: the ones whose name starts with `i`.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Intrinsic::I8 | Intrinsic::I16 | Intrinsic::I32 | Intrinsic::I64
        )
    }

    /// Floating-point types.
    pub fn is_float(self) -> bool {
        matches!(self, Intrinsic::F32 | Intrinsic::F64)
    }

    /// Integer types of any width or signedness.
    pub fn is_integer(self) -> bool {
        !self.is_float()
    }

    /// 64-bit wide types.
    pub fn is_wide(self) -> bool {
        matches!(self, Intrinsic::I64 | Intrinsic::U64 | Intrinsic::F64)
    }

    /// Bit width of the source type (8, 16, 32 or 64).
    pub fn bits(self) -> u32 {
        match self {
            Intrinsic::I8 | Intrinsic::U8 => 8,
            Intrinsic::I16 | Intrinsic::U16 => 16,
            Intrinsic::I32 | Intrinsic::U32 | Intrinsic::F32 => 32,
            Intrinsic::I64 | Intrinsic::U64 | Intrinsic::F64 => 64,
        }
    }

    /// Storage footprint in bytes.
    pub fn byte_size(self) -> u32 {
        self.bits() / 8
    }
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fully-resolved storage type of a named location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSpec {
    /// A scalar type.
    Intrinsic(Intrinsic),
    /// Pointer to another storage type; `i32` at the machine level.
    Pointer(Box<TypeSpec>),
    /// Fixed-count array of contiguous items.
    Array {
        /// Element storage type.
        item: Box<TypeSpec>,
        /// Number of elements.
        count: u32,
    },
    /// Named struct; its layout lives in the [`TypeTable`].
    Struct(String),
}

impl TypeSpec {
    /// The intrinsic, if this is a scalar type.
    pub fn as_intrinsic(&self) -> Option<Intrinsic> {
        match self {
            TypeSpec::Intrinsic(i) => Some(*i),
            _ => None,
        }
    }

    /// Machine type of a value of this storage type, where one exists.
    /// Pointers are `i32`; aggregates have no machine value.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            TypeSpec::Intrinsic(i) => Some(i.value_type()),
            TypeSpec::Pointer(_) => Some(ValueType::I32),
            TypeSpec::Array { .. } | TypeSpec::Struct(_) => None,
        }
    }

    /// True for pointer storage.
    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeSpec::Pointer(_))
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Intrinsic(i) => write!(f, "{i}"),
            TypeSpec::Pointer(t) => write!(f, "{t}*"),
            TypeSpec::Array { item, count } => write!(f, "{item}[{count}]"),
            TypeSpec::Struct(name) => write!(f, "{name}"),
        }
    }
}

/// One named field of a struct, with its precomputed byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    /// Field name.
    pub name: String,
    /// Field storage type.
    pub spec: TypeSpec,
    /// Byte offset from the struct base address.
    pub offset: u32,
}

/// Layout of a declared struct: ordered fields with offsets and a total size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    /// Declared name.
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<StructField>,
    /// Total size in bytes, padded to the widest field alignment.
    pub size: u32,
}

impl StructLayout {
    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// The size oracle and struct registry.
///
/// Struct layouts are registered once per declaration, fields laid out
/// sequentially with natural alignment (capped at 8 bytes), the way a C
/// compiler would. All sizes are in bytes.
#[derive(Debug, Default)]
pub struct TypeTable {
    structs: HashMap<String, StructLayout>,
}

impl TypeTable {
    /// Empty table.
    pub fn new() -> Self {
        TypeTable::default()
    }

    /// Register a struct and compute its field offsets. Field types must
    /// already be resolvable against this table (declaration order matters).
    pub fn declare_struct(&mut self, name: &str, fields: Vec<(String, TypeSpec)>) -> Result<()> {
        if self.structs.contains_key(name) {
            bail!("struct {name} declared twice");
        }
        let mut offset = 0u32;
        let mut max_align = 1u32;
        let mut laid_out = Vec::with_capacity(fields.len());
        for (field_name, spec) in fields {
            let align = self.align_of(&spec)?;
            let size = self.size_of(&spec)?;
            max_align = max_align.max(align);
            offset = round_up(offset, align);
            laid_out.push(StructField {
                name: field_name,
                spec,
                offset,
            });
            offset = offset
                .checked_add(size)
                .ok_or_else(|| anyhow!("struct {name} exceeds the address space"))?;
        }
        let size = round_up(offset, max_align);
        self.structs.insert(
            name.to_string(),
            StructLayout {
                name: name.to_string(),
                fields: laid_out,
                size,
            },
        );
        Ok(())
    }

    /// Layout of a declared struct.
    pub fn struct_layout(&self, name: &str) -> Option<&StructLayout> {
        self.structs.get(name)
    }

    /// Size in bytes of a fully-resolved type spec.
    pub fn size_of(&self, spec: &TypeSpec) -> Result<u32> {
        Ok(match spec {
            TypeSpec::Intrinsic(i) => i.byte_size(),
            TypeSpec::Pointer(_) => 4,
            TypeSpec::Array { item, count } => self
                .size_of(item)?
                .checked_mul(*count)
                .ok_or_else(|| anyhow!("array size overflows"))?,
            TypeSpec::Struct(name) => {
                self.structs
                    .get(name)
                    .ok_or_else(|| anyhow!("unknown struct {name}"))?
                    .size
            }
        })
    }

    /// Natural alignment of a type, capped at 8.
    fn align_of(&self, spec: &TypeSpec) -> Result<u32> {
        Ok(match spec {
            TypeSpec::Intrinsic(i) => i.byte_size(),
            TypeSpec::Pointer(_) => 4,
            TypeSpec::Array { item, .. } => self.align_of(item)?,
            TypeSpec::Struct(name) => {
                let layout = self
                    .structs
                    .get(name)
                    .ok_or_else(|| anyhow!("unknown struct {name}"))?;
                layout
                    .fields
                    .iter()
                    .map(|f| self.align_of(&f.spec).unwrap_or(1))
                    .max()
                    .unwrap_or(1)
            }
        })
    }
}

fn round_up(value: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intrinsic_machine_mapping() {
        assert_eq!(Intrinsic::I8.value_type(), ValueType::I32);
        assert_eq!(Intrinsic::U16.value_type(), ValueType::I32);
        assert_eq!(Intrinsic::U64.value_type(), ValueType::I64);
        assert_eq!(Intrinsic::F32.value_type(), ValueType::F32);
    }

    #[test]
    fn struct_layout_offsets() {
        let mut table = TypeTable::new();
        table
            .declare_struct(
                "S",
                vec![
                    ("a".into(), TypeSpec::Intrinsic(Intrinsic::I32)),
                    ("b".into(), TypeSpec::Intrinsic(Intrinsic::I32)),
                    ("c".into(), TypeSpec::Intrinsic(Intrinsic::F64)),
                ],
            )
            .unwrap();
        let layout = table.struct_layout("S").unwrap();
        assert_eq!(layout.field("a").unwrap().offset, 0);
        assert_eq!(layout.field("b").unwrap().offset, 4);
        assert_eq!(layout.field("c").unwrap().offset, 8);
        assert_eq!(layout.size, 16);
    }

    #[test]
    fn padded_field_alignment() {
        let mut table = TypeTable::new();
        table
            .declare_struct(
                "P",
                vec![
                    ("tag".into(), TypeSpec::Intrinsic(Intrinsic::U8)),
                    ("wide".into(), TypeSpec::Intrinsic(Intrinsic::I64)),
                ],
            )
            .unwrap();
        let layout = table.struct_layout("P").unwrap();
        assert_eq!(layout.field("wide").unwrap().offset, 8);
        assert_eq!(layout.size, 16);
    }

    #[test]
    fn array_sizes() {
        let table = TypeTable::new();
        let spec = TypeSpec::Array {
            item: Box::new(TypeSpec::Intrinsic(Intrinsic::I16)),
            count: 4,
        };
        assert_eq!(table.size_of(&spec).unwrap(), 8);
    }
}
