//! Optional sequence-point mapping for compiled methods (`spec.md` §2
//! "DebugInformation", §4.6 `enable_debug_info`, §6 "Debug-symbol
//! provider").
//!
//! Loading debug information is lazy and best-effort: an embedder that
//! has no symbols for an assembly, or whose symbols fail to parse,
//! should see a missing [`DebugInformation`] rather than a failed
//! compile. The caller (`nimbus-jit::Context`) is the one that decides
//! whether a load failure is worth a diagnostic warning.

use crate::ir::SourceLoc;

/// A single `bytecode offset -> source location` mapping, the unit
/// sequence points are recorded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePoint {
    pub bytecode_offset: u32,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// Given an assembly identifier, hand back its debug-symbol bytes, or
/// `None` if the embedder has none. Kept as a trait rather than a plain
/// byte slice so hosts can fetch symbols lazily (from disk, from an
/// embedded resource, from a symbol server) only when a compile actually
/// asks for them.
pub trait DebugSymbolProvider {
    fn symbols_for(&self, assembly_id: &str) -> Option<Vec<u8>>;
}

/// The provider used when an embedder never wires one up: debug
/// information is always absent, never fatal.
pub struct NoDebugSymbols;

impl DebugSymbolProvider for NoDebugSymbols {
    fn symbols_for(&self, _assembly_id: &str) -> Option<Vec<u8>> {
        None
    }
}

/// Sequence points for one assembly, sorted by `bytecode_offset` so
/// lookups are a binary search.
#[derive(Debug, Clone)]
pub struct DebugInformation {
    assembly_id: String,
    sequence_points: Vec<SequencePoint>,
}

impl DebugInformation {
    /// Ask `provider` for `assembly_id`'s symbols and parse them. Returns
    /// `None` for a missing provider entry; `Err` for symbols that were
    /// present but malformed, which the caller is free to treat as a
    /// warning rather than a hard failure.
    pub fn load(assembly_id: &str, provider: &dyn DebugSymbolProvider) -> Option<Result<Self, String>> {
        let bytes = provider.symbols_for(assembly_id)?;
        Some(Self::parse(assembly_id, &bytes))
    }

    /// Parse the wire format: a repeated sequence of
    /// `(u32 offset, u32 line, u32 column, u16 file_len, file bytes)`,
    /// little-endian, sorted by `offset` ascending. This crate only ever
    /// produces/consumes this format itself in tests; a real embedder's
    /// PDB-equivalent bytes would be translated into it upstream, outside
    /// this crate's scope.
    fn parse(assembly_id: &str, bytes: &[u8]) -> Result<Self, String> {
        let mut points = Vec::new();
        let mut cursor = 0usize;
        let mut last_offset = None;
        while cursor < bytes.len() {
            let rest = &bytes[cursor..];
            if rest.len() < 14 {
                return Err(format!("{assembly_id}: truncated sequence point header at byte {cursor}"));
            }
            let offset = u32::from_le_bytes(rest[0..4].try_into().unwrap());
            let line = u32::from_le_bytes(rest[4..8].try_into().unwrap());
            let column = u32::from_le_bytes(rest[8..12].try_into().unwrap());
            let file_len = u16::from_le_bytes(rest[12..14].try_into().unwrap()) as usize;
            let file_start = cursor + 14;
            let file_end = file_start + file_len;
            if bytes.len() < file_end {
                return Err(format!("{assembly_id}: truncated file name at byte {cursor}"));
            }
            let file = String::from_utf8(bytes[file_start..file_end].to_vec())
                .map_err(|e| format!("{assembly_id}: non-UTF8 file name: {e}"))?;
            if let Some(prev) = last_offset {
                if offset < prev {
                    return Err(format!("{assembly_id}: sequence points are not sorted by offset"));
                }
            }
            last_offset = Some(offset);
            points.push(SequencePoint { bytecode_offset: offset, file, line, column });
            cursor = file_end;
        }
        Ok(Self {
            assembly_id: assembly_id.to_string(),
            sequence_points: points,
        })
    }

    pub fn assembly_id(&self) -> &str {
        &self.assembly_id
    }

    /// The sequence point covering `loc`: the last one whose
    /// `bytecode_offset` is at or before `loc`'s offset. `None` for an
    /// unknown location or an offset before the first recorded point.
    pub fn sequence_point_for(&self, loc: SourceLoc) -> Option<&SequencePoint> {
        if loc.is_unknown() {
            return None;
        }
        let offset = loc.offset();
        match self.sequence_points.binary_search_by_key(&offset, |p| p.bytecode_offset) {
            Ok(i) => Some(&self.sequence_points[i]),
            Err(0) => None,
            Err(i) => Some(&self.sequence_points[i - 1]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(points: &[(u32, u32, u32, &str)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (offset, line, column, file) in points {
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&line.to_le_bytes());
            out.extend_from_slice(&column.to_le_bytes());
            out.extend_from_slice(&(file.len() as u16).to_le_bytes());
            out.extend_from_slice(file.as_bytes());
        }
        out
    }

    struct FixedProvider(Vec<u8>);
    impl DebugSymbolProvider for FixedProvider {
        fn symbols_for(&self, _assembly_id: &str) -> Option<Vec<u8>> {
            Some(self.0.clone())
        }
    }

    #[test]
    fn missing_provider_entry_is_none() {
        assert!(DebugInformation::load("Kernels.dll", &NoDebugSymbols).is_none());
    }

    #[test]
    fn looks_up_the_covering_sequence_point() {
        let bytes = encode(&[(0, 10, 1, "saxpy.cs"), (8, 11, 5, "saxpy.cs"), (20, 12, 1, "saxpy.cs")]);
        let provider = FixedProvider(bytes);
        let info = DebugInformation::load("Kernels.dll", &provider).unwrap().unwrap();
        let p = info.sequence_point_for(SourceLoc::new(9)).unwrap();
        assert_eq!(p.line, 11);
        let p = info.sequence_point_for(SourceLoc::new(20)).unwrap();
        assert_eq!(p.line, 12);
        assert!(info.sequence_point_for(SourceLoc::unknown()).is_none());
    }

    #[test]
    fn malformed_symbols_fail_to_parse_without_panicking() {
        let provider = FixedProvider(vec![1, 2, 3]);
        let result = DebugInformation::load("Kernels.dll", &provider).unwrap();
        assert!(result.is_err());
    }
}
