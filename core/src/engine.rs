//! The simulation engine — the daily driver of the farm community model.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   0. Crops advance one day; slots scheduled for today are planted
//!   1. Crop policies turn reference irrigation demand into requests
//!   2. Water allocation, household draw, storage refill, aquifer booking
//!   3. Community energy demand is aggregated
//!   4. Harvests are processed into inventory
//!   4a. Forced-sale sweep (expired, then over capacity)
//!   5. Market policies sell what each farm still owns
//!   6. Energy dispatch in merit order
//!   7. Economic accounting
//!   Month end: monthly records, economic policy, tracker reset, snapshot.
//!   Year end: yearly records, next year's plantings scheduled.
//!
//! RULES:
//!   - Farms are always visited in farm-id order.
//!   - The engine draws no random numbers; all inputs come from the
//!     injected DataProvider and the ScenarioConfig.
//!   - SimulationState is mutated in place, once per day.
//!   - Every event is persisted to the event log in emission order.

use crate::{
    clock::{is_month_end, is_year_end, SimClock},
    config::ScenarioConfig,
    crop_subsystem::{CropDemand, CropLifecycleManager},
    data::{DataProvider, ReferenceData},
    economics_subsystem::{EconomicAccountant, FarmDayFlows},
    energy_subsystem::{DemandBreakdown, EnergyDispatcher},
    error::SimResult,
    event::{EventLogEntry, SimEvent},
    inventory_subsystem::{process_harvest, Sale},
    metrics::{CommunityPeriodTotals, DailyCommunityRecord, DailyFarmRecord, YearlyCommunityRecord},
    policy::{FoodPolicyContext, PolicyRegistry},
    snapshot::{FinalSnapshot, SimSnapshot},
    state::{AquiferState, EnergyState, FarmState, SimulationState, WaterStorageState},
    store::SimStore,
    types::{CropName, FarmId, PerProduct, ProductType, RunId, Tick},
    water_subsystem::{BindingConstraint, WaterAllocator},
};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

pub struct SimEngine {
    pub run_id:  RunId,
    pub clock:   SimClock,
    config:      ScenarioConfig,
    data:        Box<dyn DataProvider>,
    state:       SimulationState,
    crops:       CropLifecycleManager,
    water:       WaterAllocator,
    energy:      EnergyDispatcher,
    accountant:  EconomicAccountant,
    store:       SimStore,
    /// RunInitialized has been written to the event log.
    initialized: bool,
}

/// Per-farm flows gathered while the day runs, booked at step 7.
#[derive(Default)]
struct FarmDay {
    demand_m3: f64,
    processed_kg: f64,
    forced_sale_revenue: f64,
    flows: FarmDayFlows,
}

impl SimEngine {
    /// Build an engine for a validated scenario. Fails before any state is
    /// built on a bad config, an unknown policy or an unknown crop.
    pub fn new(
        run_id: RunId,
        config: ScenarioConfig,
        data: Box<dyn DataProvider>,
        store: SimStore,
    ) -> SimResult<Self> {
        config.validate()?;
        for crop in config.crop_names() {
            data.crop_parameters(&crop)?;
        }
        let energy_policy = PolicyRegistry::for_community_energy(&config.energy.policy)?;
        let crops = CropLifecycleManager::new(&config.economics);

        let mut farms = Vec::with_capacity(config.farms.len());
        for farm_config in config.farms_sorted() {
            let policies = PolicyRegistry::for_farm(&farm_config.policies)?;
            let slots = crops.build_slots(farm_config, data.as_ref())?;
            farms.push(FarmState::new(farm_config, policies, slots));
        }
        crops.schedule_year(&mut farms, config.start_date.year(), config.start_date);

        let state = SimulationState {
            current_date: None,
            farms,
            aquifer: AquiferState::new(
                config.water.aquifer.exploitable_volume_m3,
                config.water.aquifer.recharge_m3_per_year,
            ),
            energy: EnergyState::new(&config.energy.battery),
            water_storage: WaterStorageState::new(
                config.water.storage.initial_level_m3,
                config.water.storage.capacity_m3,
            ),
            inventory: Default::default(),
            community_monthly_municipal_m3: 0.0,
            community_year: CommunityPeriodTotals::default(),
            community_run: CommunityPeriodTotals::default(),
            daily_farm_records: Vec::new(),
            daily_community_records: Vec::new(),
            monthly_records: Vec::new(),
            yearly_records: Vec::new(),
            yearly_community_records: Vec::new(),
        };

        log::info!(
            "run={run_id} scenario={} {} farm(s), {} to {}",
            config.name,
            state.farms.len(),
            config.start_date,
            config.end_date
        );

        Ok(Self {
            clock: SimClock::new(run_id.clone(), config.start_date, config.end_date),
            water: WaterAllocator::new(
                &config.water,
                config.community.household_water_m3_per_day,
                config.energy.grid.import_price_per_kwh,
            ),
            energy: EnergyDispatcher::new(&config.energy, energy_policy),
            accountant: EconomicAccountant::new(&config.economics),
            crops,
            state,
            data,
            config,
            store,
            run_id,
            initialized: false,
        })
    }

    /// Fully wired engine over the built-in test scenario and reference
    /// data, backed by a migrated in-memory store.
    pub fn build_test(run_id: RunId) -> SimResult<Self> {
        Self::build_test_with(run_id, ScenarioConfig::default_test(), ReferenceData::default_test())
    }

    /// Like build_test, with a caller-supplied scenario and data.
    pub fn build_test_with(
        run_id: RunId,
        config: ScenarioConfig,
        data: ReferenceData,
    ) -> SimResult<Self> {
        let store = SimStore::in_memory()?;
        store.migrate()?;
        store.insert_run(&run_id, 0, "0.1.0-test")?;
        Self::new(run_id, config, Box::new(data), store)
    }

    /// Advance one day. This is the core simulation step.
    pub fn tick(&mut self) -> SimResult<Vec<SimEvent>> {
        assert!(!self.clock.paused, "tick() called on paused engine");

        let (tick, date) = self.clock.advance()?;
        let mut events = vec![SimEvent::DayStarted { tick, date }];
        events.extend(self.step_day(date)?);

        if is_month_end(date) {
            events.extend(self.close_month(date)?);
        }
        if is_year_end(date) {
            events.extend(self.close_year(date)?);
        }
        events.push(SimEvent::DayCompleted { tick, date });

        for event in &events {
            self.persist_event(tick, event)?;
        }
        if is_month_end(date) {
            self.take_snapshot(tick, date)?;
        }
        Ok(events)
    }

    /// Run up to n days, stopping early at the end date.
    pub fn run_days(&mut self, n: u64) -> SimResult<()> {
        // Every run log starts with exactly one RunInitialized at tick 0.
        if !self.initialized {
            let init_event = SimEvent::RunInitialized {
                run_id:     self.run_id.clone(),
                scenario:   self.config.name.clone(),
                start_date: self.config.start_date,
                end_date:   self.config.end_date,
                farms:      self.state.farms.len(),
            };
            self.persist_event(0, &init_event)?;
            self.initialized = true;
        }
        self.clock.resume();
        for _ in 0..n {
            if self.clock.is_finished() {
                break;
            }
            self.tick()?;
        }
        self.clock.pause();
        Ok(())
    }

    /// Run to the end date and persist the final snapshot.
    pub fn run_to_end(&mut self) -> SimResult<FinalSnapshot> {
        self.run_days(self.clock.days_remaining())?;
        let snapshot = self.final_snapshot();
        self.store
            .save_final_snapshot(&self.run_id, self.clock.current_tick, &serde_json::to_string(&snapshot)?)?;
        Ok(snapshot)
    }

    pub fn final_snapshot(&self) -> FinalSnapshot {
        FinalSnapshot::from_state(&self.run_id, &self.config.name, &self.clock, &self.state)
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn store(&self) -> &SimStore {
        &self.store
    }

    /// Query events for a specific tick from the store.
    /// Used by the determinism test and replay tooling.
    pub fn store_events_for_tick(
        &self,
        run_id: &str,
        tick: Tick,
    ) -> SimResult<Vec<EventLogEntry>> {
        self.store.events_for_tick(run_id, tick)
    }

    // ── The day ───────────────────────────────────────────────────────

    fn step_day(&mut self, date: NaiveDate) -> SimResult<Vec<SimEvent>> {
        let data = self.data.as_ref();
        let mut events = Vec::new();

        // 0. Crop lifecycle.
        events.extend(self.crops.advance_and_plant(date, &mut self.state.farms, data)?);

        // 1. Crop water demand.
        let mut demands: Vec<Vec<CropDemand>> = Vec::with_capacity(self.state.farms.len());
        for farm in &self.state.farms {
            demands.push(self.crops.daily_demand(farm, data)?);
        }
        let mut days: Vec<FarmDay> = demands
            .iter()
            .map(|d| FarmDay { demand_m3: d.iter().map(|c| c.reference_m3).sum(), ..FarmDay::default() })
            .collect();
        let requests: Vec<f64> = demands
            .iter()
            .map(|d| d.iter().map(|c| c.requested_m3).sum())
            .collect();

        // 2. Water.
        let factors = data.capacity_factors(date)?;
        let renewable_kwh = self.energy.renewable_kwh(&factors);
        let water = self.water.allocate(date, &mut self.state, &requests, renewable_kwh);
        for (idx, alloc) in water.farms.iter().enumerate() {
            let farm = &mut self.state.farms[idx];
            self.crops.credit_water(farm, &demands[idx], alloc.delivered_m3());
            let flows = &mut days[idx].flows;
            flows.water_cost = alloc.cost;
            flows.water_m3 = alloc.delivered_m3();
            flows.groundwater_m3 = alloc.groundwater_m3;
            flows.unmet_water_m3 = alloc.unmet_m3;
            flows.water_energy_kwh = alloc.energy_kwh;
            if alloc.binding != BindingConstraint::None {
                events.push(SimEvent::WaterConstraintBound {
                    date,
                    farm_id: farm.id.clone(),
                    constraint: alloc.binding.as_str().to_string(),
                    clipped_groundwater_m3: alloc.clipped_groundwater_m3,
                    unmet_m3: alloc.unmet_m3,
                });
            }
        }

        // 3. Energy demand.
        let mut demand = DemandBreakdown {
            irrigation_kwh: water.farms.iter().map(|a| a.energy_kwh).sum(),
            community_water_kwh: water.community.energy_kwh,
            processing_kwh: 0.0,
            household_kwh: self.config.community.household_kwh_per_day,
            buildings_kwh: self.config.community.community_buildings_kwh_per_day,
        };

        // 4. Harvest and processing.
        let mut capacity = PerProduct {
            fresh: f64::INFINITY,
            dried: self.config.processing.dried.capacity_kg_per_day,
            canned: self.config.processing.canned.capacity_kg_per_day,
            packaged: self.config.processing.packaged.capacity_kg_per_day,
        };
        let mut batches: BTreeMap<(CropName, ProductType), Vec<(FarmId, f64)>> = BTreeMap::new();
        for (idx, farm) in self.state.farms.iter_mut().enumerate() {
            let (outcomes, harvest_events) = self.crops.harvest(date, farm, data)?;
            events.extend(harvest_events);
            for outcome in outcomes {
                let day = &mut days[idx];
                day.flows.harvest_kg += outcome.harvest_kg;
                day.flows.harvests += 1;
                day.flows.yield_ratio_sum += outcome.yield_ratio;
                if outcome.harvest_kg <= 0.0 {
                    continue;
                }

                let decision = farm.policies.food.decide(&FoodPolicyContext {
                    crop: outcome.crop.clone(),
                    harvest_kg: outcome.harvest_kg,
                    fresh_price_per_kg: data.price_per_kg(&outcome.crop, ProductType::Fresh, date)?,
                    reference_fresh_price_per_kg: data
                        .reference_price_per_kg(&outcome.crop, ProductType::Fresh)?,
                });
                let processed = process_harvest(
                    outcome.harvest_kg,
                    &decision.fractions,
                    &self.config.processing,
                    &mut capacity,
                );
                day.processed_kg += processed.input_kg.total() - processed.input_kg.fresh;
                day.flows.processing_energy_kwh += processed.energy_kwh;
                day.flows.processing_labor_cost += processed.labor_cost;
                for (product, kg) in processed.output_kg.iter() {
                    if *kg > 0.0 {
                        batches
                            .entry((outcome.crop.clone(), product))
                            .or_default()
                            .push((farm.id.clone(), *kg));
                    }
                }
            }
        }
        for ((crop, product), contributions) in &batches {
            self.state.inventory.add_batch(
                crop,
                *product,
                date,
                *self.config.storage.shelf_life_days.get(*product),
                contributions,
            );
        }
        demand.processing_kwh = days.iter().map(|d| d.flows.processing_energy_kwh).sum();

        // 4a. Forced sales.
        let forced = self
            .state
            .inventory
            .forced_sale_sweep(date, &self.config.storage, data)?;
        for sale in &forced {
            events.push(SimEvent::ForcedSale {
                date,
                tranche_id: sale.tranche_id,
                crop: sale.crop.clone(),
                product_type: sale.product_type,
                quantity_kg: sale.quantity_kg,
                revenue: sale.revenue,
                expired: sale.expired,
            });
            self.credit_sale(&mut days, sale);
        }

        // 5. Market sales.
        let mut market_sales = Vec::new();
        for farm in &self.state.farms {
            market_sales.extend(self.state.inventory.sell_to_market(
                date,
                &farm.id,
                &farm.policies.market,
                &self.config.storage,
                data,
            )?);
        }
        for sale in &market_sales {
            self.credit_sale(&mut days, sale);
        }

        // 6. Energy dispatch.
        let (dispatch, energy_events) =
            self.energy.dispatch(date, &demand, &factors, &mut self.state.energy);
        events.extend(energy_events);

        // 7. Accounting. Farms already paid for groundwater energy through
        // the unit cost; the shared bill carries household and building
        // loads plus household water delivery.
        let blended_rate = dispatch.blended_rate_per_kwh();
        let household_water_kwh = water.community.energy_kwh - water.community.refill_energy_kwh;
        let community_energy_cost =
            (demand.household_kwh + demand.buildings_kwh + household_water_kwh) * blended_rate;
        let shared_total = self.accountant.shared_cost_today(
            water.community.household_cost,
            community_energy_cost,
            dispatch.export_revenue,
        );
        let shared = self.accountant.allocate_shared(&self.state.farms, shared_total);

        for (idx, farm) in self.state.farms.iter_mut().enumerate() {
            let day = &days[idx];
            let alloc = &water.farms[idx];
            let share = shared.get(idx).copied().unwrap_or(0.0);
            let (settled, event) =
                self.accountant.settle_day(date, farm, &day.flows, blended_rate, share);
            events.extend(event);

            let record = DailyFarmRecord {
                date,
                farm_id: farm.id.clone(),
                water_demand_m3: day.demand_m3,
                water_requested_m3: alloc.requested_m3,
                groundwater_m3: alloc.groundwater_m3,
                municipal_m3: alloc.municipal_m3,
                unmet_water_m3: alloc.unmet_m3,
                water_cost: alloc.cost,
                water_energy_kwh: alloc.energy_kwh,
                blended_tds_ppm: alloc.blended_tds_ppm,
                water_policy: alloc.policy_name.to_string(),
                water_policy_reason: alloc.policy_reason.clone(),
                binding_constraint: alloc.binding.as_str().to_string(),
                harvest_kg: day.flows.harvest_kg,
                processed_kg: day.processed_kg,
                processing_energy_kwh: day.flows.processing_energy_kwh,
                crop_revenue: day.flows.crop_revenue,
                processed_revenue: day.flows.processed_revenue,
                forced_sale_revenue: day.forced_sale_revenue,
                energy_cost: settled.energy_cost,
                labor_cost: settled.labor_cost,
                input_cost: settled.input_cost,
                shared_opex: settled.shared_opex,
                net_income: settled.net_income,
                cash: farm.cash,
                insolvent: farm.insolvent,
            };
            self.store.insert_daily_farm(&self.run_id, &record)?;
            self.state.daily_farm_records.push(record);
        }

        let community = &water.community;
        let record = DailyCommunityRecord {
            date,
            irrigation_kwh: demand.irrigation_kwh,
            community_water_kwh: demand.community_water_kwh,
            processing_kwh: demand.processing_kwh,
            household_kwh: demand.household_kwh,
            buildings_kwh: demand.buildings_kwh,
            demand_kwh: dispatch.demand_kwh,
            pv_kwh: dispatch.pv_kwh,
            wind_kwh: dispatch.wind_kwh,
            battery_discharge_kwh: dispatch.battery_discharge_kwh,
            battery_charge_kwh: dispatch.battery_charge_kwh,
            grid_import_kwh: dispatch.grid_import_kwh,
            grid_export_kwh: dispatch.grid_export_kwh,
            generator_kwh: dispatch.generator.energy_kwh,
            generator_hours: dispatch.generator.runtime_hours,
            generator_fuel_l: dispatch.generator.fuel_l,
            curtailed_kwh: dispatch.curtailed_kwh,
            unmet_kwh: dispatch.unmet_kwh,
            balance_residual_kwh: dispatch.balance_residual_kwh,
            battery_soc: dispatch.battery_soc,
            energy_cost: dispatch.cost,
            export_revenue: dispatch.export_revenue,
            blended_rate_per_kwh: blended_rate,
            energy_policy_reason: dispatch.policy_reason.clone(),
            household_water_m3: self.config.community.household_water_m3_per_day,
            household_groundwater_m3: community.household_groundwater_m3,
            household_municipal_m3: community.household_municipal_m3,
            household_unmet_m3: community.household_unmet_m3,
            household_water_cost: community.household_cost,
            storage_level_m3: self.state.water_storage.level_m3,
            storage_inflow_m3: community.storage_inflow_m3,
            storage_outflow_m3: community.storage_outflow_m3,
            aquifer_extraction_m3: community.aquifer_extraction_m3,
            aquifer_cumulative_m3: self.state.aquifer.cumulative_extraction_m3,
            forced_sale_kg: forced.iter().map(|s| s.quantity_kg).sum(),
            market_sale_kg: market_sales.iter().map(|s| s.quantity_kg).sum(),
            inventory_kg: self.state.inventory.total_kg(),
        };
        self.state.community_year.add_day(&record);
        self.state.community_run.add_day(&record);
        self.store.insert_daily_community(&self.run_id, &record)?;
        self.state.daily_community_records.push(record);

        self.state.current_date = Some(date);
        log::debug!(
            "date={date} demand {:.1} kWh, water {:.1} m3, inventory {:.0} kg",
            dispatch.demand_kwh,
            requests.iter().sum::<f64>(),
            self.state.inventory.total_kg()
        );
        Ok(events)
    }

    /// Book sale revenue to the owning farms. Fresh sales are crop revenue;
    /// every other product is processed revenue.
    fn credit_sale(&self, days: &mut [FarmDay], sale: &Sale) {
        for (farm_id, revenue) in &sale.by_farm {
            let Some(idx) = self.state.farm_index(farm_id) else {
                continue;
            };
            let day = &mut days[idx];
            if sale.product_type == ProductType::Fresh {
                day.flows.crop_revenue += revenue;
            } else {
                day.flows.processed_revenue += revenue;
            }
            if sale.forced {
                day.forced_sale_revenue += revenue;
            }
        }
    }

    // ── Period closes ─────────────────────────────────────────────────

    fn close_month(&mut self, date: NaiveDate) -> SimResult<Vec<SimEvent>> {
        let mut events = Vec::new();
        self.accountant.begin_month_close();
        for farm in self.state.farms.iter_mut() {
            let (record, close_events) = self.accountant.close_month(date, farm);
            events.extend(close_events);
            self.store.insert_monthly_farm(&self.run_id, &record)?;
            self.state.monthly_records.push(record);
        }
        self.state.community_monthly_municipal_m3 = 0.0;
        log::info!("date={date} month {}-{:02} closed", date.year(), date.month());
        events.push(SimEvent::MonthClosed { date, year: date.year(), month: date.month() });
        Ok(events)
    }

    fn close_year(&mut self, date: NaiveDate) -> SimResult<Vec<SimEvent>> {
        let year = date.year();
        for farm in self.state.farms.iter_mut() {
            let record = self.accountant.close_year(date, farm);
            self.store.insert_yearly_farm(&self.run_id, &record)?;
            self.state.yearly_records.push(record);
        }

        let totals = std::mem::take(&mut self.state.community_year);
        let aquifer = &self.state.aquifer;
        let record = YearlyCommunityRecord {
            year,
            aquifer_extraction_m3: totals.aquifer_extraction_m3,
            aquifer_cumulative_m3: aquifer.cumulative_extraction_m3,
            aquifer_remaining_m3: aquifer.remaining_m3(),
            aquifer_years_remaining: aquifer.years_remaining(totals.annual_extraction_m3()),
            demand_kwh: totals.demand_kwh,
            renewable_share: totals.renewable_share(),
            unmet_energy_kwh: totals.unmet_kwh,
            grid_import_kwh: totals.grid_import_kwh,
            grid_export_kwh: totals.grid_export_kwh,
            curtailed_kwh: totals.curtailed_kwh,
            generator_fuel_l: totals.generator_fuel_l,
            energy_cost: totals.energy_cost,
            forced_sale_kg: totals.forced_sale_kg,
        };
        self.store.insert_yearly_community(&self.run_id, &record)?;
        self.state.yearly_community_records.push(record);

        if let Some(next_day) = date.succ_opt() {
            self.crops.schedule_year(&mut self.state.farms, year + 1, next_day);
        }
        log::info!("date={date} year {year} closed");
        Ok(vec![SimEvent::YearClosed { date, year }])
    }

    // ── Persistence ───────────────────────────────────────────────────

    fn persist_event(&self, tick: Tick, event: &SimEvent) -> SimResult<()> {
        let entry = EventLogEntry {
            id:         None,
            run_id:     self.run_id.clone(),
            tick,
            component:  event.component().to_string(),
            event_type: event.type_name().to_string(),
            payload:    serde_json::to_string(event)?,
        };
        self.store.append_event(&entry)
    }

    fn take_snapshot(&self, tick: Tick, date: NaiveDate) -> SimResult<()> {
        let snapshot = SimSnapshot {
            run_id: self.run_id.clone(),
            tick,
            date,
            clock:  self.clock.clone(),
            state:  self.state.clone(),
        };
        let json = serde_json::to_string(&snapshot)?;
        self.store.save_snapshot(&self.run_id, tick, &date.to_string(), &json)?;
        log::debug!("Snapshot saved at tick {tick} ({date})");
        Ok(())
    }
}
