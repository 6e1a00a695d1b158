//! Shared primitive types used across the entire simulation.

use serde::{Deserialize, Serialize};

/// A simulation tick. One tick = one simulated calendar day.
pub type Tick = u64;

/// Stable farm identifier. Farms are always iterated sorted by this id.
pub type FarmId = String;

/// Crop name as it appears in the reference data (e.g. "tomato").
pub type CropName = String;

/// The canonical run identifier.
pub type RunId = String;

/// Post-harvest processing pathway, which is also the storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Fresh,
    Dried,
    Canned,
    Packaged,
}

impl ProductType {
    /// Fixed iteration order. Fresh first: it absorbs capacity overflow.
    pub const ALL: [ProductType; 4] = [
        ProductType::Fresh,
        ProductType::Dried,
        ProductType::Canned,
        ProductType::Packaged,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Fresh    => "fresh",
            Self::Dried    => "dried",
            Self::Canned   => "canned",
            Self::Packaged => "packaged",
        }
    }
}

/// One value per product type. Used wherever config or state must cover
/// every pathway, so a missing entry is a parse error rather than a default.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerProduct<T> {
    pub fresh:    T,
    pub dried:    T,
    pub canned:   T,
    pub packaged: T,
}

impl<T> PerProduct<T> {
    pub fn get(&self, product: ProductType) -> &T {
        match product {
            ProductType::Fresh    => &self.fresh,
            ProductType::Dried    => &self.dried,
            ProductType::Canned   => &self.canned,
            ProductType::Packaged => &self.packaged,
        }
    }

    pub fn get_mut(&mut self, product: ProductType) -> &mut T {
        match product {
            ProductType::Fresh    => &mut self.fresh,
            ProductType::Dried    => &mut self.dried,
            ProductType::Canned   => &mut self.canned,
            ProductType::Packaged => &mut self.packaged,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProductType, &T)> {
        ProductType::ALL.into_iter().map(move |p| (p, self.get(p)))
    }
}

impl PerProduct<f64> {
    pub fn total(&self) -> f64 {
        self.fresh + self.dried + self.canned + self.packaged
    }
}

/// How a community-level quantity is split across farms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    Equal,
    AreaProportional,
    UsageProportional,
}

impl AllocationMethod {
    /// Fractions summing to 1.0, one per farm, in the order given.
    ///
    /// `areas` and `usage` must be in the same farm order. When the basis
    /// of a proportional method sums to zero the split falls back to equal.
    pub fn shares(&self, areas: &[f64], usage: &[f64]) -> Vec<f64> {
        let n = areas.len();
        if n == 0 {
            return Vec::new();
        }
        let basis: &[f64] = match self {
            Self::Equal             => return vec![1.0 / n as f64; n],
            Self::AreaProportional  => areas,
            Self::UsageProportional => usage,
        };
        let total: f64 = basis.iter().map(|v| v.max(0.0)).sum();
        if total <= 0.0 {
            return vec![1.0 / n as f64; n];
        }
        basis.iter().map(|v| v.max(0.0) / total).collect()
    }
}
