//! # Nyx Binary Container (.nxb)
//!
//! Serializer/deserializer for compiled units. The format is self-describing
//! via a fixed 32-byte header, all integers little-endian:
//!
//! | offset | field                     | size |
//! |--------|---------------------------|------|
//! | 0      | magic `"NXBC"`            | 4    |
//! | 4      | format version (u32)      | 4    |
//! | 8      | code offset, code len     | 4+4  |
//! | 16     | const offset, const len   | 4+4  |
//! | 24     | symbol offset, symbol len | 4+4  |
//! | 32     | code section              | var  |
//! | ...    | constant pool             | var  |
//! | ...    | symbol table              | var  |
//! | ...    | metadata (JSON, to EOF)   | var  |
//!
//! Serialization is deterministic: the same `CompiledUnit` value always
//! produces byte-identical output (metadata is a BTreeMap, so key order is
//! stable). Deserialization validates magic and version before touching any
//! section and rejects truncated artifacts wholesale - there is no partial
//! load.

use crate::bytecode::{CompiledUnit, Constant, Instruction, Symbol, SymbolKind};
use crate::error;
use nyx_error::Result;
use std::collections::BTreeMap;
use std::path::Path;

/// ASCII magic identifying a Nyx binary container.
pub const MAGIC: [u8; 4] = *b"NXBC";

/// Current container format version.
pub const VERSION: u32 = 1;

/// Size of the fixed header.
pub const HEADER_SIZE: usize = 32;

const TAG_INT: u8 = 0;
const TAG_FLOAT: u8 = 1;
const TAG_STR: u8 = 2;
const TAG_UNIT: u8 = 3;

// =============================================================================
// Serialization
// =============================================================================

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn encode_code(code: &[Instruction], out: &mut Vec<u8>) {
    for insn in code {
        out.push(insn.op);
        put_u32(out, insn.a);
        put_u32(out, insn.b);
    }
}

fn encode_constants(constants: &[Constant], out: &mut Vec<u8>) {
    for c in constants {
        match c {
            Constant::Int(n) => {
                out.push(TAG_INT);
                out.extend_from_slice(&n.to_le_bytes());
            }
            Constant::Float(x) => {
                out.push(TAG_FLOAT);
                out.extend_from_slice(&x.to_bits().to_le_bytes());
            }
            Constant::Str(s) => {
                out.push(TAG_STR);
                put_u32(out, s.len() as u32);
                out.extend_from_slice(s.as_bytes());
            }
            Constant::Unit(unit) => {
                let nested = serialize(unit);
                out.push(TAG_UNIT);
                put_u32(out, nested.len() as u32);
                out.extend_from_slice(&nested);
            }
        }
    }
}

fn encode_symbols(symbols: &[Symbol], out: &mut Vec<u8>) {
    for s in symbols {
        put_u32(out, s.name.len() as u32);
        out.extend_from_slice(s.name.as_bytes());
        out.push(s.kind.as_byte());
        put_u32(out, s.slot);
    }
}

/// Serialize a compiled unit into container bytes.
pub fn serialize(unit: &CompiledUnit) -> Vec<u8> {
    let mut code = Vec::with_capacity(unit.code.len() * Instruction::ENCODED_SIZE);
    encode_code(&unit.code, &mut code);

    let mut constants = Vec::new();
    encode_constants(&unit.constants, &mut constants);

    let mut symbols = Vec::new();
    encode_symbols(&unit.symbols, &mut symbols);

    // BTreeMap keeps key order stable, so this is deterministic.
    let metadata =
        serde_json::to_vec(&unit.metadata).expect("string map serialization cannot fail");

    let code_offset = HEADER_SIZE as u32;
    let const_offset = code_offset + code.len() as u32;
    let symbol_offset = const_offset + constants.len() as u32;

    let mut out = Vec::with_capacity(
        HEADER_SIZE + code.len() + constants.len() + symbols.len() + metadata.len(),
    );
    out.extend_from_slice(&MAGIC);
    put_u32(&mut out, VERSION);
    put_u32(&mut out, code_offset);
    put_u32(&mut out, code.len() as u32);
    put_u32(&mut out, const_offset);
    put_u32(&mut out, constants.len() as u32);
    put_u32(&mut out, symbol_offset);
    put_u32(&mut out, symbols.len() as u32);
    out.extend_from_slice(&code);
    out.extend_from_slice(&constants);
    out.extend_from_slice(&symbols);
    out.extend_from_slice(&metadata);
    out
}

// =============================================================================
// Deserialization
// =============================================================================

/// Cursor over a byte slice with truncation-checked reads.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    section: &'static str,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], section: &'static str) -> Self {
        Self { bytes, pos: 0, section }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(error::truncated_section(self.section, n, self.remaining()));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }
}

fn decode_code(bytes: &[u8]) -> Result<Vec<Instruction>> {
    if bytes.len() % Instruction::ENCODED_SIZE != 0 {
        return Err(error::truncated_section(
            "code",
            Instruction::ENCODED_SIZE,
            bytes.len() % Instruction::ENCODED_SIZE,
        ));
    }
    let mut r = Reader::new(bytes, "code");
    let mut code = Vec::with_capacity(bytes.len() / Instruction::ENCODED_SIZE);
    while r.remaining() > 0 {
        let op = r.u8()?;
        let a = r.u32()?;
        let b = r.u32()?;
        code.push(Instruction { op, a, b });
    }
    Ok(code)
}

fn decode_constants(bytes: &[u8]) -> Result<Vec<Constant>> {
    let mut r = Reader::new(bytes, "constants");
    let mut constants = Vec::new();
    while r.remaining() > 0 {
        let tag = r.u8()?;
        let c = match tag {
            TAG_INT => Constant::Int(r.u64()? as i64),
            TAG_FLOAT => Constant::Float(f64::from_bits(r.u64()?)),
            TAG_STR => {
                let len = r.u32()? as usize;
                let raw = r.take(len)?;
                let s = std::str::from_utf8(raw).map_err(|e| {
                    error::serialization_failed("constant string is not valid UTF-8")
                        .set_source(e)
                })?;
                Constant::Str(s.to_string())
            }
            TAG_UNIT => {
                let len = r.u32()? as usize;
                let raw = r.take(len)?;
                Constant::Unit(Box::new(deserialize(raw)?))
            }
            other => {
                return Err(error::serialization_failed(format!(
                    "unknown constant tag {}",
                    other
                )));
            }
        };
        constants.push(c);
    }
    Ok(constants)
}

fn decode_symbols(bytes: &[u8]) -> Result<Vec<Symbol>> {
    let mut r = Reader::new(bytes, "symbols");
    let mut symbols = Vec::new();
    while r.remaining() > 0 {
        let name_len = r.u32()? as usize;
        let raw = r.take(name_len)?;
        let name = std::str::from_utf8(raw)
            .map_err(|e| {
                error::serialization_failed("symbol name is not valid UTF-8").set_source(e)
            })?
            .to_string();
        let kind_byte = r.u8()?;
        let kind = SymbolKind::from_byte(kind_byte).ok_or_else(|| {
            error::serialization_failed(format!("unknown symbol kind {}", kind_byte))
        })?;
        let slot = r.u32()?;
        symbols.push(Symbol { name, kind, slot });
    }
    Ok(symbols)
}

fn section<'a>(bytes: &'a [u8], name: &'static str, offset: u32, len: u32) -> Result<&'a [u8]> {
    let start = offset as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or_else(|| error::truncated_section(name, len as usize, 0))?;
    if end > bytes.len() || start < HEADER_SIZE {
        return Err(error::truncated_section(name, len as usize, bytes.len().saturating_sub(start)));
    }
    Ok(&bytes[start..end])
}

/// Deserialize container bytes into a compiled unit.
///
/// The magic number is validated before anything else; a wrong magic fails
/// with BadMagic without reading any section data.
pub fn deserialize(bytes: &[u8]) -> Result<CompiledUnit> {
    if bytes.len() < 4 {
        return Err(error::truncated_section("header", 4, bytes.len()));
    }
    if bytes[0..4] != MAGIC {
        return Err(error::bad_magic(&bytes[0..4]));
    }
    if bytes.len() < HEADER_SIZE {
        return Err(error::truncated_section("header", HEADER_SIZE, bytes.len()));
    }

    let mut header = Reader::new(&bytes[4..HEADER_SIZE], "header");
    let version = header.u32()?;
    if version != VERSION {
        return Err(error::unsupported_version(version, VERSION));
    }

    let code_offset = header.u32()?;
    let code_len = header.u32()?;
    let const_offset = header.u32()?;
    let const_len = header.u32()?;
    let symbol_offset = header.u32()?;
    let symbol_len = header.u32()?;

    let code = decode_code(section(bytes, "code", code_offset, code_len)?)?;
    let constants = decode_constants(section(bytes, "constants", const_offset, const_len)?)?;
    let symbols = decode_symbols(section(bytes, "symbols", symbol_offset, symbol_len)?)?;

    let metadata_start = (symbol_offset + symbol_len) as usize;
    if metadata_start > bytes.len() {
        return Err(error::truncated_section("metadata", 0, 0));
    }
    let metadata_bytes = &bytes[metadata_start..];
    let metadata: BTreeMap<String, String> = if metadata_bytes.is_empty() {
        BTreeMap::new()
    } else {
        serde_json::from_slice(metadata_bytes).map_err(|e| {
            error::serialization_failed("metadata section is not a JSON string map").set_source(e)
        })?
    };

    Ok(CompiledUnit { code, constants, symbols, metadata })
}

// =============================================================================
// File helpers
// =============================================================================

/// Write a compiled unit to a `.nxb` file.
pub fn write_file(unit: &CompiledUnit, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, serialize(unit)).map_err(|e| {
        nyx_error::Error::from(e)
            .with_operation("container::write_file")
            .with_context("path", path.display().to_string())
    })
}

/// Read a compiled unit from a `.nxb` file.
pub fn read_file(path: impl AsRef<Path>) -> Result<CompiledUnit> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        nyx_error::Error::from(e)
            .with_operation("container::read_file")
            .with_context("path", path.display().to_string())
    })?;
    deserialize(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Op;
    use nyx_error::ErrorKind;

    fn sample_unit() -> CompiledUnit {
        let mut unit = CompiledUnit::new();
        unit.constants.push(Constant::Int(1));
        unit.constants.push(Constant::Int(2));
        unit.constants.push(Constant::Float(0.8));
        unit.constants.push(Constant::Str("hello".into()));
        unit.code.push(Instruction::with_a(Op::PushConst, 0));
        unit.code.push(Instruction::with_a(Op::PushConst, 1));
        unit.code.push(Instruction::op_only(Op::Add));
        unit.code.push(Instruction::op_only(Op::Print));
        unit.code.push(Instruction::op_only(Op::Return));
        unit.symbols.push(Symbol {
            name: "greet".into(),
            kind: SymbolKind::Function,
            slot: 5,
        });
        unit.metadata.insert("name".into(), "sample".into());
        unit.metadata.insert("compiled_at".into(), "1700000000".into());
        unit
    }

    #[test]
    fn test_round_trip() {
        let unit = sample_unit();
        let bytes = serialize(&unit);
        let loaded = deserialize(&bytes).unwrap();
        assert_eq!(unit, loaded);
    }

    #[test]
    fn test_reserialization_is_byte_identical() {
        let unit = sample_unit();
        let first = serialize(&unit);
        let second = serialize(&deserialize(&first).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn test_nested_unit_round_trip() {
        let mut outer = sample_unit();
        let inner = sample_unit();
        outer.constants.push(Constant::Unit(Box::new(inner)));

        let bytes = serialize(&outer);
        assert_eq!(deserialize(&bytes).unwrap(), outer);
    }

    #[test]
    fn test_empty_unit_has_header_and_empty_code() {
        let unit = CompiledUnit::new();
        let bytes = serialize(&unit);
        assert!(bytes.len() >= HEADER_SIZE);
        assert_eq!(&bytes[0..4], &MAGIC);

        let loaded = deserialize(&bytes).unwrap();
        assert!(loaded.code.is_empty());
        assert!(loaded.constants.is_empty());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = serialize(&sample_unit());
        bytes[0..4].copy_from_slice(b"ELF\x7f");
        let err = deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadMagic);
    }

    #[test]
    fn test_bad_magic_on_short_input() {
        // Four bytes is enough to check the magic, and it is checked first.
        let err = deserialize(b"NOPE").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadMagic);
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = serialize(&sample_unit());
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        let err = deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);
    }

    #[test]
    fn test_truncated_section() {
        let bytes = serialize(&sample_unit());
        // Drop the tail: metadata and part of the symbol table go missing.
        let err = deserialize(&bytes[..HEADER_SIZE + 10]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedSection);
    }

    #[test]
    fn test_truncated_header() {
        let bytes = serialize(&sample_unit());
        let err = deserialize(&bytes[..16]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedSection);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.nxb");

        let unit = sample_unit();
        write_file(&unit, &path).unwrap();
        assert_eq!(read_file(&path).unwrap(), unit);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_file("/no/such/file.nxb").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }
}
