//! Aggregate views over full catalog and ledger snapshots.
//!
//! Each view is recomputed from scratch on every call, so it reflects every
//! write committed before the snapshot was read. An empty ledger yields
//! [`Report::NoData`] rather than an empty row set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{month_key, round_money, Product, SaleEvent};

/// Constant added to historical demand as the forward projection.
pub const DEMAND_PROJECTION_OFFSET: i64 = 5;

/// Products whose remaining stock is strictly below this value raise an alert.
pub const LOW_STOCK_THRESHOLD: i64 = 500;

pub const NO_DEMAND_DATA_MESSAGE: &str = "No sales data found. Add sales first.";
pub const NO_MONTHLY_DATA_MESSAGE: &str =
    "No sales data available. Reports will appear after purchases.";
pub const NO_STOCK_DATA_MESSAGE: &str =
    "No sales data available. Stock report will appear after purchases.";
pub const NO_ALERT_DATA_MESSAGE: &str = "No purchases yet. Alerts will appear after sales.";
pub const LOW_STOCK_MESSAGE: &str = "⚠️ Low Stock - Order More!";

/// Result of a derived view: either rows, or the "no data yet" sentinel.
///
/// Serialized untagged, so the sentinel is `{"message": ...}` and rows are a
/// plain JSON array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Report<T> {
    NoData { message: String },
    Rows(Vec<T>),
}

impl<T> Report<T> {
    #[must_use]
    pub fn no_data(message: &str) -> Self {
        Self::NoData {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData { .. })
    }

    #[must_use]
    pub fn rows(&self) -> Option<&[T]> {
        match self {
            Self::NoData { .. } => None,
            Self::Rows(rows) => Some(rows),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DemandForecast {
    pub product_name: String,
    pub total_sold: i64,
    pub predicted_demand: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyRollup {
    pub month: String,
    pub total_sales: f64,
    pub total_profit: f64,
    pub total_items_sold: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockLevel {
    pub product_name: String,
    pub category: String,
    pub initial_stock: i64,
    pub sold_quantity: i64,
    pub remaining_stock: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockAlert {
    pub product_name: String,
    pub remaining_stock: i64,
    pub message: String,
}

/// Resolves how many units of a catalog product the ledger has sold.
pub trait SoldQuantityLookup {
    /// Whether the ledger holds any sale at all.
    fn has_sales(&self) -> bool;

    fn sold_quantity(&self, product: &Product) -> i64;
}

/// Joins ledger rows to catalog rows by exact product name.
///
/// Sales carry a denormalized name rather than a product id, so renamed or
/// duplicated catalog names share or lose their history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameJoinLookup {
    sold_by_name: BTreeMap<String, i64>,
    sale_count: usize,
}

impl NameJoinLookup {
    #[must_use]
    pub fn from_sales(sales: &[SaleEvent]) -> Self {
        let mut sold_by_name: BTreeMap<String, i64> = BTreeMap::new();
        for sale in sales {
            let entry = sold_by_name.entry(sale.product_name.clone()).or_insert(0);
            *entry = entry.saturating_add(sale.quantity_sold);
        }

        Self {
            sold_by_name,
            sale_count: sales.len(),
        }
    }
}

impl SoldQuantityLookup for NameJoinLookup {
    fn has_sales(&self) -> bool {
        self.sale_count > 0
    }

    fn sold_quantity(&self, product: &Product) -> i64 {
        self.sold_by_name.get(&product.name).copied().unwrap_or(0)
    }
}

/// Ranks products by lifetime quantity sold and projects next-period demand.
///
/// Rows are ordered by quantity descending, then product name ascending.
#[must_use]
pub fn predict_demand(sales: &[SaleEvent]) -> Report<DemandForecast> {
    if sales.is_empty() {
        return Report::no_data(NO_DEMAND_DATA_MESSAGE);
    }

    let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
    for sale in sales {
        let entry = totals.entry(sale.product_name.as_str()).or_insert(0);
        *entry = entry.saturating_add(sale.quantity_sold);
    }

    // BTreeMap iteration is name-ascending; the stable sort keeps that order for ties.
    let mut ranked: Vec<(&str, i64)> = totals.into_iter().collect();
    ranked.sort_by(|lhs, rhs| rhs.1.cmp(&lhs.1));

    Report::Rows(
        ranked
            .into_iter()
            .map(|(name, total_sold)| DemandForecast {
                product_name: name.to_string(),
                total_sold,
                predicted_demand: total_sold.saturating_add(DEMAND_PROJECTION_OFFSET),
            })
            .collect(),
    )
}

/// Rolls ledger rows up by UTC calendar month, oldest month first.
///
/// Missing `total_amount` or `profit` values count as zero.
#[must_use]
pub fn monthly_report(sales: &[SaleEvent]) -> Report<MonthlyRollup> {
    if sales.is_empty() {
        return Report::no_data(NO_MONTHLY_DATA_MESSAGE);
    }

    let mut months: BTreeMap<String, (f64, f64, i64)> = BTreeMap::new();
    for sale in sales {
        let entry = months
            .entry(month_key(sale.sale_date))
            .or_insert((0.0, 0.0, 0));
        entry.0 += sale.total_amount.unwrap_or(0.0);
        entry.1 += sale.profit.unwrap_or(0.0);
        entry.2 = entry.2.saturating_add(sale.quantity_sold);
    }

    Report::Rows(
        months
            .into_iter()
            .map(|(month, (total_sales, total_profit, total_items_sold))| MonthlyRollup {
                month,
                total_sales: round_money(total_sales),
                total_profit: round_money(total_profit),
                total_items_sold,
            })
            .collect(),
    )
}

/// Remaining stock for every catalog product, in catalog order.
///
/// Remaining stock is not clamped: overselling shows up as a negative value.
#[must_use]
pub fn stock_report<L>(products: &[Product], lookup: &L) -> Report<StockLevel>
where
    L: SoldQuantityLookup + ?Sized,
{
    if !lookup.has_sales() {
        return Report::no_data(NO_STOCK_DATA_MESSAGE);
    }

    Report::Rows(
        products
            .iter()
            .map(|product| {
                let sold_quantity = lookup.sold_quantity(product);
                StockLevel {
                    product_name: product.name.clone(),
                    category: product.category.clone(),
                    initial_stock: product.stock,
                    sold_quantity,
                    remaining_stock: product.stock.saturating_sub(sold_quantity),
                }
            })
            .collect(),
    )
}

/// Products whose remaining stock is below [`LOW_STOCK_THRESHOLD`].
#[must_use]
pub fn stock_alert<L>(products: &[Product], lookup: &L) -> Report<StockAlert>
where
    L: SoldQuantityLookup + ?Sized,
{
    if !lookup.has_sales() {
        return Report::no_data(NO_ALERT_DATA_MESSAGE);
    }

    Report::Rows(
        products
            .iter()
            .filter_map(|product| {
                let remaining_stock = product.stock.saturating_sub(lookup.sold_quantity(product));
                (remaining_stock < LOW_STOCK_THRESHOLD).then(|| StockAlert {
                    product_name: product.name.clone(),
                    remaining_stock,
                    message: LOW_STOCK_MESSAGE.to_string(),
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;
    use crate::parse_rfc3339_utc;
    use proptest::prelude::*;

    fn must_some<T>(value: Option<T>) -> T {
        match value {
            Some(inner) => inner,
            None => panic!("expected Some(..), got None"),
        }
    }

    fn fixture_sale(id: i64, name: &str, quantity: i64, sale_date: &str) -> SaleEvent {
        SaleEvent {
            id,
            product_name: name.to_string(),
            category: "Pen".to_string(),
            quantity_sold: quantity,
            price: 10.0,
            total_amount: Some(10.0 * f64::from(i32::try_from(quantity).unwrap_or(0))),
            profit: Some(1.5),
            sale_date: match parse_rfc3339_utc(sale_date) {
                Ok(value) => value,
                Err(err) => panic!("invalid fixture timestamp: {err}"),
            },
        }
    }

    fn fixture_product(id: i64, name: &str, stock: i64) -> Product {
        Product {
            id,
            name: name.to_string(),
            category: "Pen".to_string(),
            price: 10.0,
            stock,
        }
    }

    #[test]
    fn demand_ranking_sums_per_name_and_adds_offset() {
        let sales = vec![
            fixture_sale(1, "Trimax Pen", 3, "2026-01-05T10:00:00Z"),
            fixture_sale(2, "Parker Pen", 10, "2026-01-06T10:00:00Z"),
            fixture_sale(3, "Trimax Pen", 4, "2026-02-01T10:00:00Z"),
        ];

        let report = predict_demand(&sales);
        let rows = must_some(report.rows());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].product_name, "Parker Pen");
        assert_eq!(rows[0].total_sold, 10);
        assert_eq!(rows[0].predicted_demand, 15);
        assert_eq!(rows[1].product_name, "Trimax Pen");
        assert_eq!(rows[1].predicted_demand, 12);
    }

    #[test]
    fn demand_ties_break_by_product_name_ascending() {
        let sales = vec![
            fixture_sale(1, "Zebra Pen", 5, "2026-01-05T10:00:00Z"),
            fixture_sale(2, "Apsara Pencil Pack", 5, "2026-01-05T10:00:00Z"),
            fixture_sale(3, "Marker", 5, "2026-01-05T10:00:00Z"),
        ];

        let names: Vec<String> = must_some(predict_demand(&sales).rows())
            .iter()
            .map(|row| row.product_name.clone())
            .collect();
        assert_eq!(names, vec!["Apsara Pencil Pack", "Marker", "Zebra Pen"]);
    }

    #[test]
    fn empty_ledger_yields_no_data_sentinel_for_every_view() {
        let products = vec![fixture_product(1, "Trimax Pen", 20_000)];
        let lookup = NameJoinLookup::from_sales(&[]);

        assert!(predict_demand(&[]).is_no_data());
        assert!(monthly_report(&[]).is_no_data());
        assert!(stock_report(&products, &lookup).is_no_data());
        assert!(stock_alert(&products, &lookup).is_no_data());
    }

    #[test]
    fn no_data_sentinel_serializes_as_message_object() {
        let value = match serde_json::to_value(predict_demand(&[])) {
            Ok(value) => value,
            Err(err) => panic!("serialize failed: {err}"),
        };
        assert_eq!(value, serde_json::json!({ "message": NO_DEMAND_DATA_MESSAGE }));

        let rows: Report<StockAlert> = Report::Rows(Vec::new());
        let value = match serde_json::to_value(rows) {
            Ok(value) => value,
            Err(err) => panic!("serialize failed: {err}"),
        };
        assert_eq!(value, serde_json::json!([]));
    }

    #[test]
    fn monthly_rollup_orders_months_and_sums_fields() {
        let mut first = fixture_sale(1, "Trimax Pen", 2, "2026-02-10T09:00:00Z");
        first.total_amount = Some(20.0);
        first.profit = Some(4.333);
        let mut second = fixture_sale(2, "Parker Pen", 1, "2026-01-31T23:59:59Z");
        second.total_amount = Some(250.0);
        second.profit = Some(50.0);
        let mut third = fixture_sale(3, "Trimax Pen", 3, "2026-02-11T09:00:00Z");
        third.total_amount = Some(30.0);
        third.profit = Some(6.0);

        let report = monthly_report(&[first, second, third]);
        let rows = must_some(report.rows());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].month, "2026-01");
        assert_eq!(rows[0].total_sales, 250.0);
        assert_eq!(rows[0].total_items_sold, 1);
        assert_eq!(rows[1].month, "2026-02");
        assert_eq!(rows[1].total_sales, 50.0);
        assert_eq!(rows[1].total_profit, 10.33);
        assert_eq!(rows[1].total_items_sold, 5);
    }

    #[test]
    fn monthly_rollup_coalesces_missing_money_fields_to_zero() {
        let mut sale = fixture_sale(1, "Trimax Pen", 2, "2026-03-01T00:00:00Z");
        sale.total_amount = None;
        sale.profit = None;

        let report = monthly_report(&[sale]);
        let rows = must_some(report.rows());
        assert_eq!(rows[0].total_sales, 0.0);
        assert_eq!(rows[0].total_profit, 0.0);
        assert_eq!(rows[0].total_items_sold, 2);
    }

    #[test]
    fn stock_report_subtracts_sold_quantity_and_may_go_negative() {
        let products = vec![
            fixture_product(1, "Trimax Pen", 5),
            fixture_product(2, "Parker Pen", 100),
        ];
        let sales = vec![
            fixture_sale(1, "Trimax Pen", 4, "2026-01-05T10:00:00Z"),
            fixture_sale(2, "Trimax Pen", 4, "2026-01-06T10:00:00Z"),
        ];

        let report = stock_report(&products, &NameJoinLookup::from_sales(&sales));
        let rows = must_some(report.rows());
        assert_eq!(rows[0].sold_quantity, 8);
        assert_eq!(rows[0].remaining_stock, -3);
        assert_eq!(rows[1].sold_quantity, 0);
        assert_eq!(rows[1].remaining_stock, 100);
    }

    #[test]
    fn stock_report_join_is_exact_string_match() {
        let products = vec![fixture_product(1, "Trimax Pen", 50)];
        let sales = vec![fixture_sale(1, "trimax pen", 10, "2026-01-05T10:00:00Z")];

        let report = stock_report(&products, &NameJoinLookup::from_sales(&sales));
        assert_eq!(must_some(report.rows())[0].sold_quantity, 0);
    }

    #[test]
    fn stock_alert_threshold_is_strictly_below_five_hundred() {
        let products = vec![
            fixture_product(1, "At Threshold", 510),
            fixture_product(2, "Below Threshold", 509),
            fixture_product(3, "Plenty", 20_000),
        ];
        let sales = vec![
            fixture_sale(1, "At Threshold", 10, "2026-01-05T10:00:00Z"),
            fixture_sale(2, "Below Threshold", 10, "2026-01-05T10:00:00Z"),
        ];

        let report = stock_alert(&products, &NameJoinLookup::from_sales(&sales));
        let rows = must_some(report.rows());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_name, "Below Threshold");
        assert_eq!(rows[0].remaining_stock, 499);
        assert_eq!(rows[0].message, LOW_STOCK_MESSAGE);
    }

    #[test]
    fn stock_views_accept_any_lookup_implementation() {
        struct FixedLookup;

        impl SoldQuantityLookup for FixedLookup {
            fn has_sales(&self) -> bool {
                true
            }

            fn sold_quantity(&self, product: &Product) -> i64 {
                product.id * 100
            }
        }

        let products = vec![fixture_product(7, "Any", 1_000)];
        let report = stock_alert(&products, &FixedLookup);
        assert_eq!(must_some(report.rows())[0].remaining_stock, 300);
    }

    proptest! {
        #[test]
        fn prop_demand_equals_true_sum_plus_offset_and_is_sorted(
            stream in prop::collection::vec((0usize..6, 1i64..50), 1..60)
        ) {
            let names = ["Trimax Pen", "Parker Pen", "Diary", "Eraser Pack", "Scale 15cm", "Whitener"];
            let sales: Vec<SaleEvent> = stream
                .iter()
                .enumerate()
                .map(|(idx, (name_idx, quantity))| {
                    fixture_sale(
                        i64::try_from(idx).unwrap_or(i64::MAX),
                        names[*name_idx],
                        *quantity,
                        "2026-01-05T10:00:00Z",
                    )
                })
                .collect();

            let report = predict_demand(&sales);
            let rows = must_some(report.rows());

            for row in rows {
                let expected: i64 = sales
                    .iter()
                    .filter(|sale| sale.product_name == row.product_name)
                    .map(|sale| sale.quantity_sold)
                    .sum();
                prop_assert_eq!(row.total_sold, expected);
                prop_assert_eq!(row.predicted_demand, expected + DEMAND_PROJECTION_OFFSET);
            }

            for pair in rows.windows(2) {
                prop_assert!(pair[0].predicted_demand >= pair[1].predicted_demand);
                if pair[0].predicted_demand == pair[1].predicted_demand {
                    prop_assert!(pair[0].product_name < pair[1].product_name);
                }
            }
        }

        #[test]
        fn prop_monthly_items_sum_matches_ledger(
            stream in prop::collection::vec((1u8..=12, 1i64..20), 1..40)
        ) {
            let sales: Vec<SaleEvent> = stream
                .iter()
                .enumerate()
                .map(|(idx, (month, quantity))| {
                    fixture_sale(
                        i64::try_from(idx).unwrap_or(i64::MAX),
                        "Trimax Pen",
                        *quantity,
                        &format!("2025-{month:02}-15T12:00:00Z"),
                    )
                })
                .collect();

            let report = monthly_report(&sales);
            let rows = must_some(report.rows());
            let total: i64 = rows.iter().map(|row| row.total_items_sold).sum();
            let expected: i64 = sales.iter().map(|sale| sale.quantity_sold).sum();
            prop_assert_eq!(total, expected);

            for pair in rows.windows(2) {
                prop_assert!(pair[0].month < pair[1].month);
            }
        }
    }
}
