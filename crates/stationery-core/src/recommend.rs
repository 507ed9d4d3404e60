use serde::{Deserialize, Serialize};

use crate::Product;

/// Number of products returned when nothing matches the purpose and budget.
pub const FALLBACK_RECOMMENDATION_COUNT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSummary {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub stock: i64,
}

impl From<&Product> for ProductSummary {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            category: product.category.clone(),
            price: product.price,
            stock: product.stock,
        }
    }
}

/// Rule-based product selection by purpose keyword and budget.
///
/// A product matches when its price fits the budget and the lowercased purpose
/// occurs in its lowercased category or name; matches keep catalog order. With
/// no match the cheapest [`FALLBACK_RECOMMENDATION_COUNT`] products are
/// returned instead, cheapest first, regardless of budget.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn recommend(products: &[Product], purpose: &str, budget: i64) -> Vec<ProductSummary> {
    let purpose = purpose.to_lowercase();
    let budget = budget as f64;

    let matches: Vec<ProductSummary> = products
        .iter()
        .filter(|product| product.price <= budget)
        .filter(|product| {
            product.category.to_lowercase().contains(&purpose)
                || product.name.to_lowercase().contains(&purpose)
        })
        .map(ProductSummary::from)
        .collect();

    if !matches.is_empty() {
        return matches;
    }

    let mut cheapest: Vec<&Product> = products.iter().collect();
    cheapest.sort_by(|lhs, rhs| lhs.price.total_cmp(&rhs.price));
    cheapest
        .into_iter()
        .take(FALLBACK_RECOMMENDATION_COUNT)
        .map(ProductSummary::from)
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;

    fn fixture_catalog() -> Vec<Product> {
        [
            ("Trimax Pen", "Pen", 10.0),
            ("Parker Pen", "Pen", 250.0),
            ("Classmate Notebook 200 Pages", "Notebook", 120.0),
            ("Sharpener", "Sharpener", 10.0),
            ("Scale 15cm", "Scale", 10.0),
            ("Doms Eraser", "Eraser", 20.0),
            ("Whitener", "Office", 25.0),
            ("Casio Calculator", "Exam", 1200.0),
        ]
        .into_iter()
        .enumerate()
        .map(|(idx, (name, category, price))| Product {
            id: i64::try_from(idx).unwrap_or(i64::MAX) + 1,
            name: name.to_string(),
            category: category.to_string(),
            price,
            stock: 20_000,
        })
        .collect()
    }

    #[test]
    fn purpose_and_budget_both_filter_matches() {
        let catalog: Vec<Product> = fixture_catalog().into_iter().take(2).collect();
        let picks = recommend(&catalog, "pen", 100);

        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].name, "Trimax Pen");
        assert_eq!(picks[0].price, 10.0);
    }

    #[test]
    fn purpose_matching_is_case_insensitive_over_name_and_category() {
        let picks = recommend(&fixture_catalog(), "NOTEBOOK", 500);
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].name, "Classmate Notebook 200 Pages");

        let by_name = recommend(&fixture_catalog(), "eraser", 500);
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].category, "Eraser");
    }

    #[test]
    fn price_equal_to_budget_is_included() {
        let picks = recommend(&fixture_catalog(), "parker", 250);
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].name, "Parker Pen");
    }

    #[test]
    fn empty_match_falls_back_to_five_cheapest_ignoring_budget() {
        let picks = recommend(&fixture_catalog(), "zzz", 5);

        assert_eq!(picks.len(), FALLBACK_RECOMMENDATION_COUNT);
        let names: Vec<&str> = picks.iter().map(|pick| pick.name.as_str()).collect();
        // Equal prices keep catalog order.
        assert_eq!(
            names,
            vec!["Trimax Pen", "Sharpener", "Scale 15cm", "Doms Eraser", "Whitener"]
        );
        for pair in picks.windows(2) {
            assert!(pair[0].price <= pair[1].price);
        }
    }

    #[test]
    fn fallback_returns_whole_catalog_when_smaller_than_five() {
        let catalog: Vec<Product> = fixture_catalog().into_iter().take(3).collect();
        let picks = recommend(&catalog, "zzz", 0);
        assert_eq!(picks.len(), 3);
        assert_eq!(picks[2].name, "Parker Pen");
    }

    #[test]
    fn empty_catalog_recommends_nothing() {
        assert!(recommend(&[], "pen", 100).is_empty());
    }
}
