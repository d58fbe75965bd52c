//! Per-type encryption classification.
//!
//! Every packet type is either encrypted or unencrypted. A fresh table encrypts
//! nothing; production setups call [`PacketTypeTable::enable_encryption_for_all`]
//! and then exempt the few types that must travel in the clear (typically the
//! connection request) with [`PacketTypeTable::disable_encryption_for`].
//!
//! In insecure mode the read path accepts every type both ways; see
//! [`PacketTypeTable::accepted_sets`].

/// Borrowed pair of type-acceptance sets handed to a packet processor
#[derive(Debug, Clone, Copy)]
pub struct PacketTypeSets<'a> {
    /// `encrypted[t]` is true when type `t` may arrive encrypted
    pub encrypted: &'a [bool],
    /// `unencrypted[t]` is true when type `t` may arrive in plaintext
    pub unencrypted: &'a [bool],
}

impl PacketTypeSets<'_> {
    /// Whether `packet_type` may arrive with the given encryption state
    #[inline]
    pub fn accepts(&self, packet_type: usize, encrypted: bool) -> bool {
        let set = if encrypted {
            self.encrypted
        } else {
            self.unencrypted
        };
        set.get(packet_type).copied().unwrap_or(false)
    }

    /// Number of types covered by these sets
    #[inline]
    pub fn num_packet_types(&self) -> usize {
        self.encrypted.len()
    }
}

/// Encryption classification for every packet type of a factory
#[derive(Debug, Clone)]
pub struct PacketTypeTable {
    encrypted: Box<[bool]>,
    unencrypted: Box<[bool]>,
    all: Box<[bool]>,
}

impl PacketTypeTable {
    /// Table for `num_packet_types` types, all unencrypted
    pub fn new(num_packet_types: usize) -> Self {
        Self {
            encrypted: vec![false; num_packet_types].into_boxed_slice(),
            unencrypted: vec![true; num_packet_types].into_boxed_slice(),
            all: vec![true; num_packet_types].into_boxed_slice(),
        }
    }

    pub fn num_packet_types(&self) -> usize {
        self.encrypted.len()
    }

    /// Mark every type as encrypted
    pub fn enable_encryption_for_all(&mut self) {
        self.encrypted.fill(true);
        self.unencrypted.fill(false);
    }

    /// Mark one type as unencrypted; returns false if the type is out of range
    pub fn disable_encryption_for(&mut self, packet_type: usize) -> bool {
        if packet_type >= self.num_packet_types() {
            return false;
        }
        self.encrypted[packet_type] = false;
        self.unencrypted[packet_type] = true;
        true
    }

    /// Whether `packet_type` is sent encrypted (false for unknown types)
    #[inline]
    pub fn is_encrypted(&self, packet_type: usize) -> bool {
        self.encrypted.get(packet_type).copied().unwrap_or(false)
    }

    /// Acceptance sets for the read path; insecure mode accepts everything both ways
    pub fn accepted_sets(&self, insecure: bool) -> PacketTypeSets<'_> {
        if insecure {
            PacketTypeSets {
                encrypted: &self.all,
                unencrypted: &self.all,
            }
        } else {
            PacketTypeSets {
                encrypted: &self.encrypted,
                unencrypted: &self.unencrypted,
            }
        }
    }
}
