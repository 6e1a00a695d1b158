//! Inventory subsystem: post-harvest processing, community storage and
//! the forced-sale sweep.
//!
//! DAILY ORDER (driven by the engine):
//!   1. Harvests are split across pathways by each farm's food policy,
//!      clipped by the pooled daily pathway capacity in farm order.
//!   2. Each (crop, product, day) batch lands in one tranche whose
//!      ownership shares follow each farm's contribution.
//!   3. The sweep sells expired tranches, then over-capacity stock, oldest
//!      first, at the distress discount.
//!   4. Only then does each farm's market policy sell what it owns.
//!
//! Tranche order everywhere is (harvest_date, expiry_date, id).

use crate::{
    config::{PathwayConfig, StorageConfig},
    data::DataProvider,
    error::SimResult,
    policy::{MarketPolicy, MarketPolicyContext},
    types::{CropName, FarmId, PerProduct, ProductType},
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Quantities below this are treated as gone.
const KG_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageTranche {
    pub id: u64,
    pub crop: CropName,
    pub product_type: ProductType,
    pub quantity_kg: f64,
    pub harvest_date: NaiveDate,
    pub expiry_date: NaiveDate,
    /// Fraction of the tranche each farm owns; sums to 1.
    pub ownership: BTreeMap<FarmId, f64>,
}

impl StorageTranche {
    fn sort_key(&self) -> (NaiveDate, NaiveDate, u64) {
        (self.harvest_date, self.expiry_date, self.id)
    }

    pub fn owned_kg(&self, farm_id: &str) -> f64 {
        self.ownership.get(farm_id).map_or(0.0, |s| s * self.quantity_kg)
    }

    fn holdings_kg(&self) -> BTreeMap<FarmId, f64> {
        self.ownership
            .iter()
            .map(|(f, s)| (f.clone(), s * self.quantity_kg))
            .collect()
    }

    fn set_holdings(&mut self, holdings: BTreeMap<FarmId, f64>) {
        let total: f64 = holdings.values().sum();
        self.quantity_kg = total.max(0.0);
        self.ownership = if total > KG_EPSILON {
            holdings
                .into_iter()
                .filter(|(_, kg)| *kg > KG_EPSILON)
                .map(|(f, kg)| (f, kg / total))
                .collect()
        } else {
            BTreeMap::new()
        };
    }
}

/// One sale out of one tranche.
#[derive(Debug, Clone, PartialEq)]
pub struct Sale {
    pub tranche_id: u64,
    pub crop: CropName,
    pub product_type: ProductType,
    pub quantity_kg: f64,
    pub price_per_kg: f64,
    pub revenue: f64,
    pub forced: bool,
    pub expired: bool,
    /// Revenue attributed to each owner.
    pub by_farm: Vec<(FarmId, f64)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryLedger {
    tranches: Vec<StorageTranche>,
    next_id: u64,
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tranches(&self) -> &[StorageTranche] {
        &self.tranches
    }

    pub fn stock_kg(&self, product: ProductType) -> f64 {
        self.tranches
            .iter()
            .filter(|t| t.product_type == product)
            .map(|t| t.quantity_kg)
            .sum()
    }

    pub fn total_kg(&self) -> f64 {
        self.tranches.iter().map(|t| t.quantity_kg).sum()
    }

    /// Add today's output of one (crop, product). Contributions on the same
    /// harvest date merge into one tranche. Returns the tranche id.
    pub fn add_batch(
        &mut self,
        crop: &str,
        product: ProductType,
        harvest_date: NaiveDate,
        shelf_life_days: u32,
        contributions: &[(FarmId, f64)],
    ) -> Option<u64> {
        let added: f64 = contributions.iter().map(|(_, kg)| kg.max(0.0)).sum();
        if added <= KG_EPSILON {
            return None;
        }

        let existing = self.tranches.iter().position(|t| {
            t.crop == crop && t.product_type == product && t.harvest_date == harvest_date
        });
        let idx = match existing {
            Some(i) => i,
            None => {
                self.next_id += 1;
                self.tranches.push(StorageTranche {
                    id: self.next_id,
                    crop: crop.to_string(),
                    product_type: product,
                    quantity_kg: 0.0,
                    harvest_date,
                    expiry_date: harvest_date + Duration::days(i64::from(shelf_life_days)),
                    ownership: BTreeMap::new(),
                });
                self.tranches.len() - 1
            }
        };

        let tranche = &mut self.tranches[idx];
        let mut holdings = tranche.holdings_kg();
        for (farm, kg) in contributions {
            if *kg > 0.0 {
                *holdings.entry(farm.clone()).or_insert(0.0) += kg;
            }
        }
        tranche.set_holdings(holdings);
        Some(tranche.id)
    }

    /// Indices of matching tranches, oldest first.
    fn ordered(&self, filter: impl Fn(&StorageTranche) -> bool) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..self.tranches.len())
            .filter(|i| filter(&self.tranches[*i]))
            .collect();
        idx.sort_by_key(|i| self.tranches[*i].sort_key());
        idx
    }

    /// Sell `kg` out of tranche `idx` pro rata across its owners.
    fn sell_pro_rata(&mut self, idx: usize, kg: f64, price: f64, expired: bool) -> Sale {
        let tranche = &mut self.tranches[idx];
        let kg = kg.min(tranche.quantity_kg);
        let revenue = kg * price;
        let by_farm = tranche
            .ownership
            .iter()
            .map(|(f, s)| (f.clone(), revenue * s))
            .collect();
        tranche.quantity_kg -= kg;
        Sale {
            tranche_id: tranche.id,
            crop: tranche.crop.clone(),
            product_type: tranche.product_type,
            quantity_kg: kg,
            price_per_kg: price,
            revenue,
            forced: true,
            expired,
            by_farm,
        }
    }

    fn drop_empty(&mut self) {
        self.tranches.retain(|t| t.quantity_kg > KG_EPSILON);
    }

    /// The umbrella rule. Sells, in order, every tranche whose expiry date
    /// has been reached, then the oldest stock of any product above its
    /// storage capacity. Never sells more than either rule requires.
    pub fn forced_sale_sweep(
        &mut self,
        date: NaiveDate,
        storage: &StorageConfig,
        data: &dyn DataProvider,
    ) -> SimResult<Vec<Sale>> {
        let mut sales = Vec::new();
        let discount = 1.0 - storage.forced_sale_discount;

        for idx in self.ordered(|t| t.expiry_date <= date) {
            let t = &self.tranches[idx];
            let price = data.price_per_kg(&t.crop, t.product_type, date)? * discount;
            let kg = t.quantity_kg;
            sales.push(self.sell_pro_rata(idx, kg, price, true));
        }
        self.drop_empty();

        for product in ProductType::ALL {
            let mut excess = self.stock_kg(product) - storage.capacity_kg.get(product);
            if excess <= KG_EPSILON {
                continue;
            }
            for idx in self.ordered(|t| t.product_type == product) {
                if excess <= KG_EPSILON {
                    break;
                }
                let t = &self.tranches[idx];
                let price = data.price_per_kg(&t.crop, product, date)? * discount;
                let take = excess.min(t.quantity_kg);
                excess -= take;
                sales.push(self.sell_pro_rata(idx, take, price, false));
            }
        }
        self.drop_empty();

        Ok(sales)
    }

    /// (crop, product) pairs in which the farm holds stock.
    pub fn holdings_of(&self, farm_id: &str) -> BTreeSet<(CropName, ProductType)> {
        self.tranches
            .iter()
            .filter(|t| t.owned_kg(farm_id) > KG_EPSILON)
            .map(|t| (t.crop.clone(), t.product_type))
            .collect()
    }

    pub fn owned_kg(&self, farm_id: &str, crop: &str, product: ProductType) -> f64 {
        self.tranches
            .iter()
            .filter(|t| t.crop == crop && t.product_type == product)
            .map(|t| t.owned_kg(farm_id))
            .sum()
    }

    /// Sell `kg` of the farm's own share of (crop, product), oldest first.
    /// Co-owners keep their stock; shares are recomputed after each sale.
    pub fn sell_owned(
        &mut self,
        farm_id: &str,
        crop: &str,
        product: ProductType,
        kg: f64,
        price: f64,
    ) -> Vec<Sale> {
        let mut remaining = kg;
        let mut sales = Vec::new();
        for idx in self.ordered(|t| t.crop == crop && t.product_type == product) {
            if remaining <= KG_EPSILON {
                break;
            }
            let tranche = &mut self.tranches[idx];
            let owned = tranche.owned_kg(farm_id);
            if owned <= KG_EPSILON {
                continue;
            }
            let take = remaining.min(owned);
            remaining -= take;

            let mut holdings = tranche.holdings_kg();
            if let Some(h) = holdings.get_mut(farm_id) {
                *h -= take;
            }
            tranche.set_holdings(holdings);
            sales.push(Sale {
                tranche_id: tranche.id,
                crop: tranche.crop.clone(),
                product_type: product,
                quantity_kg: take,
                price_per_kg: price,
                revenue: take * price,
                forced: false,
                expired: false,
                by_farm: vec![(farm_id.to_string(), take * price)],
            });
        }
        self.drop_empty();
        sales
    }

    /// Run one farm's market policy over everything it owns.
    pub fn sell_to_market(
        &mut self,
        date: NaiveDate,
        farm_id: &str,
        policy: &MarketPolicy,
        storage: &StorageConfig,
        data: &dyn DataProvider,
    ) -> SimResult<Vec<Sale>> {
        let mut sales = Vec::new();
        for (crop, product) in self.holdings_of(farm_id) {
            let available = self.owned_kg(farm_id, &crop, product);
            let oldest_expiry = self
                .ordered(|t| t.crop == crop && t.product_type == product && t.owned_kg(farm_id) > KG_EPSILON)
                .first()
                .map(|i| self.tranches[*i].expiry_date);
            let capacity = *storage.capacity_kg.get(product);
            let ctx = MarketPolicyContext {
                crop: crop.clone(),
                product_type: product,
                available_kg: available,
                price_per_kg: data.price_per_kg(&crop, product, date)?,
                reference_price_per_kg: data.reference_price_per_kg(&crop, product)?,
                days_to_expiry: oldest_expiry.map_or(i64::MAX, |e| (e - date).num_days()),
                storage_utilization: if capacity > 0.0 {
                    (self.stock_kg(product) / capacity).min(1.0)
                } else {
                    1.0
                },
            };
            let decision = policy.decide(&ctx);
            let kg = available * decision.sell_fraction.clamp(0.0, 1.0);
            if kg > KG_EPSILON {
                log::debug!(
                    "date={date} farm={farm_id} market {crop}/{} sell {kg:.1} kg ({})",
                    product.name(),
                    decision.reason
                );
                sales.extend(self.sell_owned(farm_id, &crop, product, kg, ctx.price_per_kg));
            }
        }
        Ok(sales)
    }
}

// ── Processing ─────────────────────────────────────────────────────

/// One farm's harvest after processing.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedHarvest {
    pub input_kg: PerProduct<f64>,
    pub output_kg: PerProduct<f64>,
    pub energy_kwh: f64,
    pub labor_cost: f64,
}

/// Split `harvest_kg` by the policy fractions. Every non-fresh pathway is
/// limited by what remains of its daily capacity; the rest goes fresh.
pub fn process_harvest(
    harvest_kg: f64,
    fractions: &PerProduct<f64>,
    pathways: &PerProduct<PathwayConfig>,
    remaining_capacity: &mut PerProduct<f64>,
) -> ProcessedHarvest {
    let mut input = PerProduct::<f64>::default();
    for product in ProductType::ALL {
        if product == ProductType::Fresh {
            continue;
        }
        let wanted = harvest_kg * fractions.get(product).clamp(0.0, 1.0);
        let cap = remaining_capacity.get_mut(product);
        let take = wanted.min(cap.max(0.0));
        *cap -= take;
        *input.get_mut(product) = take;
    }
    input.fresh = (harvest_kg - input.total()).max(0.0);

    let mut output = PerProduct::<f64>::default();
    let mut energy_kwh = 0.0;
    let mut labor_cost = 0.0;
    for (product, kg) in input.iter() {
        let pathway = pathways.get(product);
        *output.get_mut(product) = kg * pathway.weight_retention;
        energy_kwh += kg * pathway.energy_kwh_per_kg;
        labor_cost += kg * pathway.labor_cost_per_kg;
    }

    ProcessedHarvest { input_kg: input, output_kg: output, energy_kwh, labor_cost }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ScenarioConfig, data::ReferenceData};

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn storage(capacity: f64) -> StorageConfig {
        let mut s = ScenarioConfig::default_test().storage;
        s.capacity_kg = PerProduct { fresh: capacity, dried: capacity, canned: capacity, packaged: capacity };
        s
    }

    #[test]
    fn same_day_contributions_share_one_tranche() {
        let mut ledger = InventoryLedger::new();
        let a = ledger.add_batch("tomato", ProductType::Fresh, d(6, 1), 7, &[("a".into(), 300.0)]);
        let b = ledger.add_batch("tomato", ProductType::Fresh, d(6, 1), 7, &[("b".into(), 100.0)]);
        assert_eq!(a, b);
        let t = &ledger.tranches()[0];
        assert_eq!(t.quantity_kg, 400.0);
        assert!((t.ownership["a"] - 0.75).abs() < 1e-12);
        assert_eq!(t.expiry_date, d(6, 8));
    }

    #[test]
    fn overflow_sells_oldest_first_and_only_the_excess() {
        let data = ReferenceData::default_test();
        let mut ledger = InventoryLedger::new();
        ledger.add_batch("tomato", ProductType::Dried, d(6, 2), 365, &[("a".into(), 500.0)]);
        ledger.add_batch("tomato", ProductType::Dried, d(6, 1), 365, &[("a".into(), 500.0)]);

        let sales = ledger.forced_sale_sweep(d(6, 3), &storage(800.0), &data).unwrap();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].quantity_kg, 200.0);
        assert!(!sales[0].expired);
        // 4.00 × (1 − 0.3)
        assert!((sales[0].price_per_kg - 2.8).abs() < 1e-12);

        let oldest = ledger.tranches().iter().find(|t| t.harvest_date == d(6, 1)).unwrap();
        assert_eq!(oldest.quantity_kg, 300.0);
        assert_eq!(ledger.stock_kg(ProductType::Dried), 800.0);
    }

    #[test]
    fn expiry_is_reached_on_the_expiry_date() {
        let data = ReferenceData::default_test();
        let mut ledger = InventoryLedger::new();
        ledger.add_batch("tomato", ProductType::Fresh, d(6, 1), 7, &[("a".into(), 10.0)]);

        assert!(ledger.forced_sale_sweep(d(6, 7), &storage(1e6), &data).unwrap().is_empty());
        let sales = ledger.forced_sale_sweep(d(6, 8), &storage(1e6), &data).unwrap();
        assert_eq!(sales.len(), 1);
        assert!(sales[0].expired);
        assert_eq!(ledger.total_kg(), 0.0);
    }

    #[test]
    fn selling_own_share_leaves_co_owner_stock() {
        let mut ledger = InventoryLedger::new();
        ledger.add_batch(
            "tomato",
            ProductType::Canned,
            d(6, 1),
            730,
            &[("a".into(), 600.0), ("b".into(), 400.0)],
        );
        let sales = ledger.sell_owned("a", "tomato", ProductType::Canned, 600.0, 1.5);
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].by_farm, vec![("a".to_string(), 900.0)]);
        assert!((ledger.owned_kg("b", "tomato", ProductType::Canned) - 400.0).abs() < 1e-9);
        assert_eq!(ledger.owned_kg("a", "tomato", ProductType::Canned), 0.0);
        assert!((ledger.tranches()[0].ownership["b"] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn processing_capacity_overflow_goes_fresh() {
        let pathways = ScenarioConfig::default_test().processing;
        let mut remaining = PerProduct { fresh: 0.0, dried: 100.0, canned: 0.0, packaged: 0.0 };
        let split = PerProduct { fresh: 0.0, dried: 1.0, canned: 0.0, packaged: 0.0 };

        let out = process_harvest(1_000.0, &split, &pathways, &mut remaining);
        assert_eq!(out.input_kg.dried, 100.0);
        assert_eq!(out.input_kg.fresh, 900.0);
        assert!((out.output_kg.dried - 12.0).abs() < 1e-9);
        assert_eq!(remaining.dried, 0.0);
    }
}
