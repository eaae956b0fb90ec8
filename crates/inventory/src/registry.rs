//! Product registry.
//!
//! Lock striping: the structural list is guarded by one coarse `RwLock`, every
//! product's quantity by its own mutex. The registry lock is released before
//! any product lock is taken, so structural reads never wait on a mutation.

use std::sync::{Arc, PoisonError, RwLock};

use stockroom_core::{DomainError, DomainResult, Entity, ProductId};

use crate::product::{Product, ProductRecord};

/// Append-only set of products.
///
/// Lookup is a linear scan over the list. That is fine for the catalogue sizes
/// this core handles; a keyed index would be the first change if it grew.
#[derive(Debug, Default)]
pub struct ProductRegistry {
    products: RwLock<Vec<Arc<Product>>>,
}

impl ProductRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a registry from persisted records.
    pub fn from_records(records: impl IntoIterator<Item = ProductRecord>) -> DomainResult<Self> {
        let registry = Self::new();
        for record in records {
            registry.add(record)?;
        }
        Ok(registry)
    }

    /// Register a product. Ids must be unique.
    pub fn add(&self, record: ProductRecord) -> DomainResult<Arc<Product>> {
        let product = Arc::new(Product::new(record)?);

        let mut products = self.products.write().unwrap_or_else(PoisonError::into_inner);
        if products.iter().any(|p| p.id() == product.id()) {
            return Err(DomainError::DuplicateProduct(product.id()));
        }
        products.push(Arc::clone(&product));

        tracing::debug!(product_id = %product.id(), name = product.name(), "product registered");
        Ok(product)
    }

    pub fn find(&self, id: ProductId) -> Option<Arc<Product>> {
        let products = self.products.read().unwrap_or_else(PoisonError::into_inner);
        products.iter().find(|p| p.id() == id).cloned()
    }

    /// Snapshot of every product, in registration order.
    pub fn list(&self) -> Vec<ProductRecord> {
        let products: Vec<Arc<Product>> = self
            .products
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        products.iter().map(|p| p.snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        self.products.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn seeded() -> ProductRegistry {
        ProductRegistry::from_records([
            ProductRecord::new(1, "Laptop", 5_000_000, 100),
            ProductRecord::new(2, "Mouse", 150_000, 200),
        ])
        .unwrap()
    }

    #[test]
    fn find_returns_registered_product() {
        let registry = seeded();
        let mouse = registry.find(ProductId::new(2)).unwrap();
        assert_eq!(mouse.name(), "Mouse");
        assert!(registry.find(ProductId::new(99)).is_none());
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let registry = seeded();
        let err = registry
            .add(ProductRecord::new(1, "Other laptop", 1, 1))
            .unwrap_err();
        assert_eq!(err, DomainError::DuplicateProduct(ProductId::new(1)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn list_preserves_registration_order() {
        let registry = seeded();
        let ids: Vec<u64> = registry.list().iter().map(|r| r.id.get()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn concurrent_adds_are_all_visible() {
        let registry = Arc::new(ProductRegistry::new());
        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    registry
                        .add(ProductRecord::new(i, format!("item-{i}"), 10, 1))
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(registry.len(), 8);
        for i in 0..8 {
            assert!(registry.find(ProductId::new(i)).is_some());
        }
    }
}
