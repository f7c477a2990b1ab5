//! Kind-word layout for the session protocol.
//!
//! The top byte of the 32-bit kind word tags the transaction category; the
//! low 24 bits carry the transaction sequence number (0 for unscheduled,
//! server-pushed packets). The one exception is [`INITIAL_ERROR`], which is
//! a whole-word magic value rather than a tag+tid pair — errors answering
//! the very first client transaction put the tid in a `TID` body field
//! instead.

/// Mask selecting the category tag.
pub const TAG_MASK: u32 = 0xFF00_0000;

/// Mask selecting the embedded transaction id.
pub const TID_MASK: u32 = 0x00FF_FFFF;

/// Whole-word kind used for errors answering an `Initial` transaction.
pub const INITIAL_ERROR: u32 = 0x6665_7272;

/// Transaction categories a client can put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// The connection's first transaction; establishes the tid baseline.
    Initial,
    /// A normal single-packet transaction.
    Simple,
    /// One fragment of a chunked client request.
    Chunked,
    /// One fragment of a chunked server response.
    ChunkedResponse,
}

impl TransactionKind {
    pub const fn tag(self) -> u32 {
        match self {
            TransactionKind::Initial => 0xC000_0000,
            TransactionKind::Simple => 0x8000_0000,
            TransactionKind::Chunked => 0xF000_0000,
            TransactionKind::ChunkedResponse => 0xB000_0000,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0xC000_0000 => Some(TransactionKind::Initial),
            0x8000_0000 => Some(TransactionKind::Simple),
            0xF000_0000 => Some(TransactionKind::Chunked),
            0xB000_0000 => Some(TransactionKind::ChunkedResponse),
            _ => None,
        }
    }
}

/// Packs a category tag and a tid into a kind word.
pub fn pack(kind: TransactionKind, tid: u32) -> u32 {
    kind.tag() | (tid & TID_MASK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for kind in [
            TransactionKind::Initial,
            TransactionKind::Simple,
            TransactionKind::Chunked,
            TransactionKind::ChunkedResponse,
        ] {
            assert_eq!(TransactionKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(TransactionKind::from_tag(0x6600_0000), None);
    }

    #[test]
    fn pack_masks_the_tid_to_24_bits() {
        let word = pack(TransactionKind::Simple, 0x0100_0007);
        assert_eq!(word & TAG_MASK, TransactionKind::Simple.tag());
        assert_eq!(word & TID_MASK, 7);
    }
}
