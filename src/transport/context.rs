//! Per-address serialization contexts.
//!
//! A server talking to many peers can serialize each one under its own
//! allocator, packet factory and user data (a different protocol revision, an
//! isolated buffer pool per connection) without running one transport per peer.
//!
//! Mappings borrow their packet factory: the registrant keeps the `Arc` and must
//! remove the mapping before dropping it. A mapping whose factory is gone is a
//! contract violation; lookups assert on it in debug builds.
//!
//! Adding a mapping for an address that already has one is rejected; remove
//! the old mapping first.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use tracing::{debug, trace, warn};

use crate::core::packet::{ContextData, PacketFactory};
use crate::utils::buffer_pool::BufferPool;

/// Serialization context registered for one remote address
pub struct ContextMapping {
    allocator: BufferPool,
    packet_factory: Weak<dyn PacketFactory>,
    context_data: Option<ContextData>,
}

impl ContextMapping {
    pub fn allocator(&self) -> &BufferPool {
        &self.allocator
    }

    /// The mapped factory, or `None` if the registrant already dropped it
    pub fn packet_factory(&self) -> Option<Arc<dyn PacketFactory>> {
        self.packet_factory.upgrade()
    }

    pub fn context_data(&self) -> Option<&ContextData> {
        self.context_data.as_ref()
    }
}

impl std::fmt::Debug for ContextMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextMapping")
            .field("allocator", &self.allocator)
            .field("factory_alive", &(self.packet_factory.strong_count() > 0))
            .field("has_context_data", &self.context_data.is_some())
            .finish()
    }
}

/// Fixed-capacity directory of per-address contexts
#[derive(Debug)]
pub struct ContextManager {
    entries: HashMap<SocketAddr, ContextMapping>,
    max_entries: usize,
}

impl ContextManager {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(max_entries),
            max_entries,
        }
    }

    /// Register a context for `address`; false if full or already mapped
    pub fn add_context_mapping(
        &mut self,
        address: SocketAddr,
        allocator: BufferPool,
        packet_factory: &Arc<dyn PacketFactory>,
        context_data: Option<ContextData>,
    ) -> bool {
        if self.entries.contains_key(&address) {
            debug!(%address, "Context mapping already exists");
            return false;
        }
        if self.entries.len() >= self.max_entries {
            debug!(%address, max = self.max_entries, "Context mapping table full");
            return false;
        }

        self.entries.insert(
            address,
            ContextMapping {
                allocator,
                packet_factory: Arc::downgrade(packet_factory),
                context_data,
            },
        );
        trace!(%address, mappings = self.entries.len(), "Context mapping added");
        true
    }

    /// Remove the context for `address`; false if none was registered
    pub fn remove_context_mapping(&mut self, address: &SocketAddr) -> bool {
        let removed = self.entries.remove(address).is_some();
        if removed {
            trace!(%address, "Context mapping removed");
        }
        removed
    }

    /// Drop every mapping
    pub fn reset_context_mappings(&mut self) {
        let count = self.entries.len();
        self.entries.clear();
        if count > 0 {
            debug!(cleared_count = count, "Context mappings reset");
        }
    }

    /// Context registered for `address`, if any
    pub fn context(&self, address: &SocketAddr) -> Option<&ContextMapping> {
        let mapping = self.entries.get(address)?;
        if mapping.packet_factory.strong_count() == 0 {
            debug_assert!(
                false,
                "packet factory for {address} dropped while its context mapping was live"
            );
            warn!(%address, "Context mapping outlived its packet factory; ignoring it");
            return None;
        }
        Some(mapping)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::Packet;

    struct EmptyFactory(usize);

    impl PacketFactory for EmptyFactory {
        fn create_packet(&self, _: usize) -> Option<Box<dyn Packet>> {
            None
        }
        fn num_packet_types(&self) -> usize {
            self.0
        }
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], port))
    }

    #[test]
    fn test_add_lookup_remove() {
        let factory: Arc<dyn PacketFactory> = Arc::new(EmptyFactory(3));
        let pool = BufferPool::new(1, 64);
        let data: ContextData = Arc::new(String::from("peer-a"));

        let mut manager = ContextManager::new(4);
        assert!(manager.add_context_mapping(addr(1), pool.clone(), &factory, Some(data)));

        let mapping = manager.context(&addr(1)).expect("mapped");
        assert!(mapping.allocator().ptr_eq(&pool));
        assert_eq!(mapping.packet_factory().map(|f| f.num_packet_types()), Some(3));
        assert_eq!(
            mapping
                .context_data()
                .and_then(|d| d.downcast_ref::<String>())
                .map(String::as_str),
            Some("peer-a")
        );
        assert!(manager.context(&addr(2)).is_none());

        assert!(manager.remove_context_mapping(&addr(1)));
        assert!(!manager.remove_context_mapping(&addr(1)));
        assert!(manager.context(&addr(1)).is_none());
    }

    #[test]
    fn test_duplicate_and_full_rejected() {
        let factory: Arc<dyn PacketFactory> = Arc::new(EmptyFactory(1));
        let mut manager = ContextManager::new(2);

        assert!(manager.add_context_mapping(addr(1), BufferPool::default(), &factory, None));
        assert!(!manager.add_context_mapping(addr(1), BufferPool::default(), &factory, None));
        assert!(manager.add_context_mapping(addr(2), BufferPool::default(), &factory, None));
        assert!(!manager.add_context_mapping(addr(3), BufferPool::default(), &factory, None));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_mapping_does_not_own_factory() {
        let factory: Arc<dyn PacketFactory> = Arc::new(EmptyFactory(1));
        let mut manager = ContextManager::new(2);
        manager.add_context_mapping(addr(1), BufferPool::default(), &factory, None);

        assert_eq!(Arc::strong_count(&factory), 1);
        manager.remove_context_mapping(&addr(1));
        drop(factory);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let factory: Arc<dyn PacketFactory> = Arc::new(EmptyFactory(1));
        let mut manager = ContextManager::new(2);
        manager.add_context_mapping(addr(1), BufferPool::default(), &factory, None);

        manager.reset_context_mappings();
        manager.reset_context_mappings();
        assert!(manager.is_empty());
    }
}
