// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Deterministic trips and customers for `--demo` runs and fixtures.

use anyhow::Result;
use time::macros::date;
use time::{Date, Duration};

use crate::codec::{OptionRef, SelectOption};
use crate::fetch::{OptionQuery, OptionSource};
use crate::grid::{GridConfig, GridDataStore};
use crate::model::{CellValue, Column, ColumnType, Row};

pub const NESTED_KEY: &str = "legs";
pub const ROW_KEY: &str = "documentNo";

const CUSTOMERS: [&str; 24] = [
    "Acme Freight",
    "Acorn Logistics",
    "Atlas Haulage",
    "Bayside Produce",
    "Beacon Steel",
    "Blue Ridge Paper",
    "Cascade Timber",
    "Cedar Valley Foods",
    "Coastal Chemicals",
    "Crescent Beverages",
    "Delta Cold Storage",
    "Eastgate Retail",
    "Evergreen Nursery",
    "Fairview Dairy",
    "Granite Building Supply",
    "Harbor Marine",
    "Ironwood Machinery",
    "Juniper Textiles",
    "Keystone Plastics",
    "Lakeshore Grain",
    "Meridian Pharma",
    "Northwind Apparel",
    "Pinecrest Furniture",
    "Summit Auto Parts",
];

const CITIES: [&str; 14] = [
    "Austin",
    "Seattle",
    "Denver",
    "Madison",
    "Raleigh",
    "Pittsburgh",
    "Portland",
    "Boise",
    "Phoenix",
    "Nashville",
    "Columbus",
    "Minneapolis",
    "Omaha",
    "Tucson",
];

const WAREHOUSES: [&str; 8] = [
    "North Yard",
    "Dock 4",
    "Cross-dock East",
    "Rail Spur",
    "Cold Room B",
    "Port Gate 2",
    "Depot West",
    "Transload Hub",
];

const STATUSES: [&str; 5] = ["Planned", "Dispatched", "In Transit", "Delivered", "Billed"];

const REFERENCE_DATE: Date = date!(2026 - 03 - 02);

/// First pickup date any generated trip can carry.
pub const fn reference_date() -> Date {
    REFERENCE_DATE
}

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

/// Deterministic trip rows with nested legs.
#[derive(Debug, Clone)]
pub struct TripFaker {
    rng: DeterministicRng,
}

impl TripFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
        }
    }

    pub fn trip(&mut self, number: usize) -> Row {
        let customer = self.rng.int_n(CUSTOMERS.len());
        let origin_index = self.rng.int_n(CITIES.len());
        let mut destination_index = self.rng.int_n(CITIES.len());
        if destination_index == origin_index {
            destination_index = (destination_index + 1) % CITIES.len();
        }
        let pickup = REFERENCE_DATE + Duration::days(self.rng.int_n(60) as i64);
        let leg_count = 1 + self.rng.int_n(4);
        let legs = (0..leg_count)
            .map(|leg| self.leg(pickup, leg))
            .collect::<Vec<_>>();

        Row::new()
            .with(ROW_KEY, format!("TRP-{}", 1001 + number))
            .with("customer", customer_ref(customer))
            .with("origin", CITIES[origin_index])
            .with("destination", CITIES[destination_index])
            .with("status", self.pick(&STATUSES))
            .with("rate", (250 + self.rng.int_n(40) * 25) as i64)
            .with("pickupDate", pickup)
            .with(NESTED_KEY, CellValue::Rows(legs))
    }

    pub fn trips(&mut self, count: usize) -> Vec<Row> {
        (0..count).map(|number| self.trip(number)).collect()
    }

    fn leg(&mut self, pickup: Date, leg: usize) -> Row {
        let weight = (self.rng.int_n(2_000) as f64) / 10.0 + 50.0;
        Row::new()
            .with("stop", self.pick(&WAREHOUSES))
            .with("eta", pickup + Duration::days(leg as i64))
            .with("weight", weight)
            .with("sealed", self.rng.bool())
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

pub fn trip_grid_config() -> GridConfig {
    GridConfig {
        nested_data_key: Some(NESTED_KEY.to_owned()),
        row_key: Some(ROW_KEY.to_owned()),
    }
}

pub fn trip_columns() -> Vec<Column> {
    vec![
        Column::new(ROW_KEY, "Trip", ColumnType::Text)
            .sortable()
            .filterable()
            .width(10),
        Column::new("customer", "Customer", ColumnType::LazySelect)
            .filterable()
            .order(1)
            .width(22),
        Column::new("origin", "Origin", ColumnType::Text)
            .filterable()
            .order(2),
        Column::new("destination", "Destination", ColumnType::Text).order(3),
        Column::new("status", "Status", ColumnType::Badge)
            .sortable()
            .order(4),
        Column::new("rate", "Rate", ColumnType::Integer)
            .sortable()
            .editable()
            .order(5),
        Column::new("pickupDate", "Pickup", ColumnType::Date)
            .sortable()
            .editable()
            .order(6),
        Column::new("stop", "Stop", ColumnType::Text)
            .sub_row()
            .editable(),
        Column::new("eta", "ETA", ColumnType::Date)
            .sub_row()
            .editable()
            .order(1),
        Column::new("weight", "Weight", ColumnType::Decimal)
            .sub_row()
            .editable()
            .order(2),
    ]
}

/// A store loaded with `count` deterministic trips.
pub fn trip_store(count: usize) -> GridDataStore {
    let mut store = GridDataStore::new(trip_grid_config());
    store.set_columns(trip_columns());
    store.set_rows(TripFaker::new(7).trips(count));
    store
}

pub fn customer_ref(index: usize) -> OptionRef {
    let index = index % CUSTOMERS.len();
    OptionRef::new(customer_id(index), CUSTOMERS[index])
}

fn customer_id(index: usize) -> String {
    format!("CUST-{:03}", index + 1)
}

/// Searchable, paginated option list. Matching is case-insensitive
/// substring on the label.
#[derive(Debug, Clone)]
pub struct CustomerDirectory {
    options: Vec<SelectOption>,
}

impl CustomerDirectory {
    pub fn new() -> Self {
        Self {
            options: CUSTOMERS
                .iter()
                .enumerate()
                .map(|(index, name)| SelectOption::new(*name, customer_id(index)))
                .collect(),
        }
    }

    /// `total` generated customers, for pagination checks.
    pub fn synthetic(total: usize) -> Self {
        Self {
            options: (0..total)
                .map(|index| SelectOption::new(format!("Customer {index:04}"), customer_id(index)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

impl Default for CustomerDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl OptionSource for CustomerDirectory {
    fn search(&self, query: &OptionQuery) -> Result<Vec<SelectOption>> {
        let needle = query.search_term.trim().to_lowercase();
        Ok(self
            .options
            .iter()
            .filter(|option| needle.is_empty() || option.label.to_lowercase().contains(&needle))
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }
}
