//! On-disk layout of the binary index file: a fixed 88-byte header
//! followed by disjoint, contiguous sections. 64-bit little-endian only;
//! not portable across endianness (mirrors the C layout this format is
//! modeled on, including its exact field sizes).

pub const MAGIC: [u8; 4] = *b"pptI";
pub const VERSION: u32 = 2;

pub const HEADER_SIZE: usize = 88;
pub const FILE_INFO_SIZE: usize = 48;
pub const TOKEN_ID_INFO_SIZE: usize = 8;
pub const TOKEN_ALPHABETICAL_INFO_SIZE: usize = 4;
pub const LINE_INFO_SIZE: usize = 8;

/// The file's first 88 bytes: magic, version, and the absolute offset and
/// count of every other section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexHeader {
    pub code_section_offset: u64,
    pub code_section_length: u64,
    pub file_section_offset: u64,
    pub num_files: u64,
    pub total_tokens: u64,
    pub total_lines: u64,
    pub total_bytes: u64,
    pub token_id_section_offset: u64,
    pub token_alphabetical_section_offset: u64,
    pub num_tokens: u64,
}

impl IndexHeader {
    pub fn write_to(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), HEADER_SIZE);
        out[0..4].copy_from_slice(&MAGIC);
        out[4..8].copy_from_slice(&VERSION.to_le_bytes());
        out[8..16].copy_from_slice(&self.code_section_offset.to_le_bytes());
        out[16..24].copy_from_slice(&self.code_section_length.to_le_bytes());
        out[24..32].copy_from_slice(&self.file_section_offset.to_le_bytes());
        out[32..40].copy_from_slice(&self.num_files.to_le_bytes());
        out[40..48].copy_from_slice(&self.total_tokens.to_le_bytes());
        out[48..56].copy_from_slice(&self.total_lines.to_le_bytes());
        out[56..64].copy_from_slice(&self.total_bytes.to_le_bytes());
        out[64..72].copy_from_slice(&self.token_id_section_offset.to_le_bytes());
        out[72..80].copy_from_slice(&self.token_alphabetical_section_offset.to_le_bytes());
        out[80..88].copy_from_slice(&self.num_tokens.to_le_bytes());
    }

    pub fn read_from(input: &[u8]) -> Result<Self, String> {
        if input.len() < HEADER_SIZE {
            return Err("file too small to contain a header".to_string());
        }
        if input[0..4] != MAGIC {
            return Err(format!("bad magic: {:?}", &input[0..4]));
        }
        let version = u32::from_le_bytes(input[4..8].try_into().unwrap());
        if version != VERSION {
            return Err(format!("unsupported version: {version}"));
        }
        let u = |range: std::ops::Range<usize>| u64::from_le_bytes(input[range].try_into().unwrap());
        Ok(IndexHeader {
            code_section_offset: u(8..16),
            code_section_length: u(16..24),
            file_section_offset: u(24..32),
            num_files: u(32..40),
            total_tokens: u(40..48),
            total_lines: u(48..56),
            total_bytes: u(56..64),
            token_id_section_offset: u(64..72),
            token_alphabetical_section_offset: u(72..80),
            num_tokens: u(80..88),
        })
    }
}

/// One corpus file's entry in the file table, sorted by `code_offset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub filename_cstr: u64,
    pub file_length: u64,
    pub code_offset: u64,
    pub code_length: u64,
    pub num_lines: u64,
    pub lineinfo_offset: u64,
}

impl FileInfo {
    pub fn write_to(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), FILE_INFO_SIZE);
        out[0..8].copy_from_slice(&self.filename_cstr.to_le_bytes());
        out[8..16].copy_from_slice(&self.file_length.to_le_bytes());
        out[16..24].copy_from_slice(&self.code_offset.to_le_bytes());
        out[24..32].copy_from_slice(&self.code_length.to_le_bytes());
        out[32..40].copy_from_slice(&self.num_lines.to_le_bytes());
        out[40..48].copy_from_slice(&self.lineinfo_offset.to_le_bytes());
    }

    pub fn read_from(input: &[u8]) -> Self {
        let u = |range: std::ops::Range<usize>| u64::from_le_bytes(input[range].try_into().unwrap());
        FileInfo {
            filename_cstr: u(0..8),
            file_length: u(8..16),
            code_offset: u(16..24),
            code_length: u(24..32),
            num_lines: u(32..40),
            lineinfo_offset: u(40..48),
        }
    }
}

/// Token-id-order entry: maps a token id directly (by array index) to its
/// spelling in the string pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenIdInfo {
    pub spelling_cstr: u64,
}

impl TokenIdInfo {
    pub fn write_to(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), TOKEN_ID_INFO_SIZE);
        out.copy_from_slice(&self.spelling_cstr.to_le_bytes());
    }

    pub fn read_from(input: &[u8]) -> Self {
        TokenIdInfo { spelling_cstr: u64::from_le_bytes(input.try_into().unwrap()) }
    }
}

/// Alphabetical-order entry: position in this array is the spelling's
/// alphabetical rank; the stored value is the token id at that rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenAlphabeticalInfo {
    pub token_id: u32,
}

impl TokenAlphabeticalInfo {
    pub fn write_to(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), TOKEN_ALPHABETICAL_INFO_SIZE);
        out.copy_from_slice(&self.token_id.to_le_bytes());
    }

    pub fn read_from(input: &[u8]) -> Self {
        TokenAlphabeticalInfo { token_id: u32::from_le_bytes(input.try_into().unwrap()) }
    }
}

/// One line's entry in a file's line table: where the line starts in the
/// raw source, and where its first token starts in the encoded code
/// section (relative to the file's own `code_offset`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineInfo {
    pub file_offset: u32,
    pub code_offset: u32,
}

impl LineInfo {
    pub fn write_to(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), LINE_INFO_SIZE);
        out[0..4].copy_from_slice(&self.file_offset.to_le_bytes());
        out[4..8].copy_from_slice(&self.code_offset.to_le_bytes());
    }

    pub fn read_from(input: &[u8]) -> Self {
        LineInfo {
            file_offset: u32::from_le_bytes(input[0..4].try_into().unwrap()),
            code_offset: u32::from_le_bytes(input[4..8].try_into().unwrap()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_matches_reference_layout() {
        assert_eq!(HEADER_SIZE, 88);
        assert_eq!(FILE_INFO_SIZE, 48);
        assert_eq!(LINE_INFO_SIZE, 8);
    }

    #[test]
    fn header_round_trips() {
        let header = IndexHeader {
            code_section_offset: 88,
            code_section_length: 1000,
            file_section_offset: 1088,
            num_files: 3,
            total_tokens: 40,
            total_lines: 9,
            total_bytes: 500,
            token_id_section_offset: 2000,
            token_alphabetical_section_offset: 2100,
            num_tokens: 25,
        };
        let mut buf = [0u8; HEADER_SIZE];
        header.write_to(&mut buf);
        assert_eq!(IndexHeader::read_from(&buf).unwrap(), header);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let buf = [0u8; HEADER_SIZE];
        assert!(IndexHeader::read_from(&buf).is_err());
    }

    #[test]
    fn file_info_round_trips() {
        let info = FileInfo {
            filename_cstr: 10,
            file_length: 200,
            code_offset: 0,
            code_length: 50,
            num_lines: 8,
            lineinfo_offset: 5000,
        };
        let mut buf = [0u8; FILE_INFO_SIZE];
        info.write_to(&mut buf);
        assert_eq!(FileInfo::read_from(&buf), info);
    }

    #[test]
    fn line_info_round_trips() {
        let info = LineInfo { file_offset: 123, code_offset: 45 };
        let mut buf = [0u8; LINE_INFO_SIZE];
        info.write_to(&mut buf);
        assert_eq!(LineInfo::read_from(&buf), info);
    }
}
