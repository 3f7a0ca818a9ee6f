//! Fragmentation and reassembly.
//!
//! A payload whose encoded length reaches the radio MTU is split into
//! fragments, each riding in its own `Fragment` packet. Fragment payload
//! layout:
//!
//! ```text
//! fragment_id (8) || fragment_type (1) || index (u16 BE) ||
//! total (u16 BE) || chunk
//! ```
//!
//! One random 8-byte `fragment_id` binds all fragments of one payload.
//! The reassembler is pure: it consumes a collected set and either emits
//! the original payload or rejects the whole group.

use rand::RngCore;

use crate::packet::PacketType;
use crate::{Result, WireError};

/// Fragment header length: id + type + index + total.
pub const FRAGMENT_HEADER_LEN: usize = 13;

/// Hard ceiling on fragments per payload (u16 index space).
pub const MAX_FRAGMENTS: usize = u16::MAX as usize;

/// The packet types that may be fragmented. Wire values equal the inner
/// packet type's value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FragmentType {
    AmigoWelcome = 0,
    AmigoPathUpdate = 1,
    Message = 3,
    Sync = 5,
}

impl FragmentType {
    /// Parse a wire value.
    pub fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::AmigoWelcome),
            1 => Ok(Self::AmigoPathUpdate),
            3 => Ok(Self::Message),
            5 => Ok(Self::Sync),
            other => Err(WireError::UnknownFragmentType(other)),
        }
    }

    /// The wire value.
    pub fn to_wire(self) -> u8 {
        self as u8
    }

    /// The packet type a reassembled payload is handled as.
    pub fn packet_type(self) -> PacketType {
        match self {
            Self::AmigoWelcome => PacketType::AmigoWelcome,
            Self::AmigoPathUpdate => PacketType::AmigoPathUpdate,
            Self::Message => PacketType::Message,
            Self::Sync => PacketType::Sync,
        }
    }

    /// The fragment type for a fragmentable packet type.
    pub fn from_packet_type(packet_type: PacketType) -> Option<Self> {
        match packet_type {
            PacketType::AmigoWelcome => Some(Self::AmigoWelcome),
            PacketType::AmigoPathUpdate => Some(Self::AmigoPathUpdate),
            PacketType::Message => Some(Self::Message),
            PacketType::Sync => Some(Self::Sync),
            _ => None,
        }
    }
}

/// One fragment of an oversize payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    /// Shared id binding the group.
    pub fragment_id: [u8; 8],
    /// Inner payload type.
    pub fragment_type: FragmentType,
    /// Position in `[0, total)`.
    pub index: u16,
    /// Group size.
    pub total: u16,
    /// Chunk bytes.
    pub chunk: Vec<u8>,
}

/// A successfully reassembled payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assembled {
    /// The original payload bytes.
    pub data: Vec<u8>,
    /// Inner payload type.
    pub fragment_type: FragmentType,
    /// The group's shared id.
    pub fragment_id: [u8; 8],
}

impl Fragment {
    /// Serialize to a fragment packet payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAGMENT_HEADER_LEN + self.chunk.len());
        out.extend_from_slice(&self.fragment_id);
        out.push(self.fragment_type.to_wire());
        out.extend_from_slice(&self.index.to_be_bytes());
        out.extend_from_slice(&self.total.to_be_bytes());
        out.extend_from_slice(&self.chunk);
        out
    }

    /// Parse a fragment packet payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < FRAGMENT_HEADER_LEN {
            return Err(WireError::MalformedPacket(format!(
                "fragment payload too short: {} bytes",
                data.len()
            )));
        }
        let mut fragment_id = [0u8; 8];
        fragment_id.copy_from_slice(&data[..8]);
        let fragment_type = FragmentType::from_wire(data[8])?;
        let index = u16::from_be_bytes([data[9], data[10]]);
        let total = u16::from_be_bytes([data[11], data[12]]);
        if total == 0 || index >= total {
            return Err(WireError::MalformedPacket(format!(
                "fragment index {index} out of range for total {total}"
            )));
        }
        Ok(Self {
            fragment_id,
            fragment_type,
            index,
            total,
            chunk: data[FRAGMENT_HEADER_LEN..].to_vec(),
        })
    }
}

/// Split a payload into fragments of `chunk_size` bytes each, under a
/// fresh random fragment id.
///
/// # Errors
///
/// Returns [`WireError::TooManyFragments`] if the payload would need more
/// than 65535 fragments.
pub fn split(data: &[u8], fragment_type: FragmentType, chunk_size: usize) -> Result<Vec<Fragment>> {
    let chunk_size = chunk_size.max(1);
    let count = data.len().div_ceil(chunk_size).max(1);
    if count > MAX_FRAGMENTS {
        return Err(WireError::TooManyFragments { count });
    }

    let mut fragment_id = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut fragment_id);

    let fragments = data
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, chunk)| Fragment {
            fragment_id,
            fragment_type,
            index: index as u16,
            total: count as u16,
            chunk: chunk.to_vec(),
        })
        .collect::<Vec<_>>();

    // A zero-length payload still emits one empty fragment.
    if fragments.is_empty() {
        return Ok(vec![Fragment {
            fragment_id,
            fragment_type,
            index: 0,
            total: 1,
            chunk: Vec::new(),
        }]);
    }
    Ok(fragments)
}

/// Reassemble a complete fragment group.
///
/// Every member must share the first fragment's id, type, and total, and
/// the indices must cover `[0, total)` exactly once. Any disagreement
/// rejects the whole group.
pub fn reassemble(fragments: &[Fragment]) -> Result<Assembled> {
    let first = fragments
        .first()
        .ok_or_else(|| WireError::FragmentMismatch("empty fragment set".into()))?;
    let total = first.total as usize;

    if fragments.len() != total {
        return Err(WireError::FragmentMismatch(format!(
            "have {} fragments, group total is {}",
            fragments.len(),
            total
        )));
    }

    let mut ordered: Vec<Option<&Fragment>> = vec![None; total];
    for fragment in fragments {
        if fragment.fragment_id != first.fragment_id {
            return Err(WireError::FragmentMismatch("fragment id disagreement".into()));
        }
        if fragment.total != first.total {
            return Err(WireError::FragmentMismatch("fragment total disagreement".into()));
        }
        if fragment.fragment_type != first.fragment_type {
            return Err(WireError::FragmentMismatch("fragment type disagreement".into()));
        }
        let slot = &mut ordered[fragment.index as usize];
        if slot.is_some() {
            return Err(WireError::FragmentMismatch(format!(
                "duplicate fragment index {}",
                fragment.index
            )));
        }
        *slot = Some(fragment);
    }

    let mut data = Vec::with_capacity(fragments.iter().map(|f| f.chunk.len()).sum());
    for slot in ordered {
        // Every slot is filled: len == total and indices are distinct.
        if let Some(fragment) = slot {
            data.extend_from_slice(&fragment.chunk);
        }
    }

    Ok(Assembled {
        data,
        fragment_type: first.fragment_type,
        fragment_id: first.fragment_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_reassemble_roundtrip() {
        let data: Vec<u8> = (0..1500u32).map(|i| (i % 251) as u8).collect();
        let fragments = split(&data, FragmentType::Message, 187).expect("split");
        assert_eq!(fragments.len(), 1500usize.div_ceil(187));

        let assembled = reassemble(&fragments).expect("reassemble");
        assert_eq!(assembled.data, data);
        assert_eq!(assembled.fragment_type, FragmentType::Message);
    }

    #[test]
    fn test_out_of_order_reassembly() {
        let data = vec![7u8; 500];
        let mut fragments = split(&data, FragmentType::AmigoWelcome, 100).expect("split");
        fragments.reverse();
        let assembled = reassemble(&fragments).expect("reassemble");
        assert_eq!(assembled.data, data);
    }

    #[test]
    fn test_single_fragment_group() {
        let fragments = split(b"tiny", FragmentType::Sync, 100).expect("split");
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].total, 1);
        let assembled = reassemble(&fragments).expect("reassemble");
        assert_eq!(assembled.data, b"tiny");
    }

    #[test]
    fn test_empty_payload_emits_one_fragment() {
        let fragments = split(b"", FragmentType::Message, 100).expect("split");
        assert_eq!(fragments.len(), 1);
        let assembled = reassemble(&fragments).expect("reassemble");
        assert!(assembled.data.is_empty());
    }

    #[test]
    fn test_fragment_payload_roundtrip() {
        let fragments = split(&[1, 2, 3, 4, 5], FragmentType::Message, 2).expect("split");
        for fragment in &fragments {
            let restored = Fragment::from_bytes(&fragment.to_bytes()).expect("decode");
            assert_eq!(*fragment, restored);
        }
    }

    #[test]
    fn test_incomplete_group_rejected() {
        let mut fragments = split(&[0u8; 300], FragmentType::Message, 100).expect("split");
        fragments.pop();
        assert!(matches!(
            reassemble(&fragments),
            Err(WireError::FragmentMismatch(_))
        ));
    }

    #[test]
    fn test_mixed_ids_rejected() {
        let mut a = split(&[0u8; 200], FragmentType::Message, 100).expect("split");
        let b = split(&[0u8; 200], FragmentType::Message, 100).expect("split");
        a[1] = b[1].clone();
        assert!(matches!(
            reassemble(&a),
            Err(WireError::FragmentMismatch(_))
        ));
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let mut fragments = split(&[0u8; 200], FragmentType::Message, 100).expect("split");
        fragments[1].index = 0;
        assert!(matches!(
            reassemble(&fragments),
            Err(WireError::FragmentMismatch(_))
        ));
    }

    #[test]
    fn test_total_disagreement_rejected() {
        let mut fragments = split(&[0u8; 300], FragmentType::Message, 100).expect("split");
        fragments[2].total = 4;
        assert!(matches!(
            reassemble(&fragments),
            Err(WireError::FragmentMismatch(_))
        ));
    }

    #[test]
    fn test_bad_header_rejected() {
        assert!(Fragment::from_bytes(&[0u8; 5]).is_err());

        // index >= total
        let mut bytes = split(&[0u8; 50], FragmentType::Message, 100).expect("split")[0]
            .to_bytes();
        bytes[9] = 0;
        bytes[10] = 9;
        assert!(Fragment::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_unknown_fragment_type_rejected() {
        let mut bytes = split(&[0u8; 50], FragmentType::Message, 100).expect("split")[0]
            .to_bytes();
        bytes[8] = 7;
        assert!(matches!(
            Fragment::from_bytes(&bytes),
            Err(WireError::UnknownFragmentType(7))
        ));
    }

    #[test]
    fn test_too_many_fragments_rejected() {
        // 65536 one-byte chunks.
        let data = vec![0u8; MAX_FRAGMENTS + 1];
        assert!(matches!(
            split(&data, FragmentType::Message, 1),
            Err(WireError::TooManyFragments { .. })
        ));
    }
}
