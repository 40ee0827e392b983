use std::collections::HashMap;

use serde::Serialize;

use crate::models::{Amount, ModuleName};

use super::discount::DiscountBook;

/// Price of one selected module after its discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    pub module: ModuleName,
    pub base: Amount,
    /// Discount actually taken off, never more than `base`.
    pub discount: Amount,
    pub due: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub total: Amount,
    pub payable: Amount,
    pub lines: Vec<LineItem>,
}

impl Quote {
    pub fn savings(&self) -> Amount {
        self.total - self.payable
    }
}

/// Price the selected modules.
///
/// Modules without a configured price cost nothing; a valid discount larger
/// than the module price zeroes that module but never goes negative, so
/// `payable <= total` holds for every input.
pub fn quote(
    selected: &[ModuleName],
    prices: &HashMap<ModuleName, Amount>,
    discounts: &DiscountBook,
) -> Quote {
    let lines: Vec<LineItem> = selected
        .iter()
        .map(|module| {
            let base = prices.get(module).copied().unwrap_or(0);
            let discount = discounts.applied_amount(module).min(base);
            LineItem {
                module: module.clone(),
                base,
                discount,
                due: base - discount,
            }
        })
        .collect();

    let total = lines.iter().fold(0, |sum: Amount, l| sum.saturating_add(l.base));
    let payable = lines.iter().fold(0, |sum: Amount, l| sum.saturating_add(l.due));

    Quote { total, payable, lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiscountQuote;
    use crate::registration::discount::DiscountValidator;
    use proptest::prelude::*;

    fn ctf_prices() -> HashMap<ModuleName, Amount> {
        HashMap::from([("Recon".into(), 500), ("Exploit".into(), 800)])
    }

    fn book_with(entries: &[(&str, &str, Result<Amount, &str>)]) -> DiscountBook {
        let mut validator = DiscountValidator::default();
        for (module, code, result) in entries {
            let ticket = validator
                .begin(&ModuleName::from(*module), code)
                .expect("non-empty code issues a ticket");
            let result = (*result)
                .map(|amount| DiscountQuote { amount, message: None })
                .map_err(|reason| reason.to_string());
            validator.apply(ticket.settle(result));
        }
        validator.book().clone()
    }

    #[test]
    fn test_ctf_night_quote() {
        let selected = vec![ModuleName::from("Recon"), ModuleName::from("Exploit")];
        let book = book_with(&[("Exploit", "HALF", Ok(300))]);
        let quote = quote(&selected, &ctf_prices(), &book);
        assert_eq!(quote.total, 1300);
        assert_eq!(quote.payable, 1000);
        assert_eq!(quote.savings(), 300);
        assert_eq!(quote.lines[1].discount, 300);
        assert_eq!(quote.lines[1].due, 500);
    }

    #[test]
    fn test_oversized_discount_clamps_to_zero() {
        let selected = vec![ModuleName::from("Recon")];
        let book = book_with(&[("Recon", "X", Ok(9999))]);
        let quote = quote(&selected, &ctf_prices(), &book);
        assert_eq!(quote.total, 500);
        assert_eq!(quote.payable, 0);
        assert_eq!(quote.lines[0].discount, 500);
    }

    #[test]
    fn test_invalid_discount_is_ignored() {
        let selected = vec![ModuleName::from("Recon")];
        let book = book_with(&[("Recon", "NOPE", Err("Invalid discount code"))]);
        let quote = quote(&selected, &ctf_prices(), &book);
        assert_eq!(quote.payable, quote.total);
    }

    #[test]
    fn test_unselected_discount_and_unpriced_module() {
        let selected = vec![ModuleName::from("Forensics")];
        let book = book_with(&[("Recon", "X", Ok(100))]);
        let quote = quote(&selected, &ctf_prices(), &book);
        assert_eq!(quote.total, 0);
        assert_eq!(quote.payable, 0);
    }

    #[test]
    fn test_empty_selection() {
        let quote = quote(&[], &ctf_prices(), &DiscountBook::default());
        assert_eq!(quote, Quote::default());
    }

    proptest! {
        #[test]
        fn prop_payable_never_exceeds_total(
            prices in proptest::collection::vec(0u64..5_000, 1..6),
            picks in proptest::collection::vec(any::<bool>(), 6),
            discounts in proptest::collection::vec(proptest::option::of((any::<bool>(), 0u64..10_000)), 6),
        ) {
            let modules: Vec<ModuleName> =
                (0..prices.len()).map(|i| ModuleName::new(format!("M{}", i))).collect();
            let price_map: HashMap<ModuleName, Amount> =
                modules.iter().cloned().zip(prices.iter().copied()).collect();
            let selected: Vec<ModuleName> = modules
                .iter()
                .zip(picks.iter())
                .filter(|(_, picked)| **picked)
                .map(|(m, _)| m.clone())
                .collect();

            let mut validator = DiscountValidator::default();
            let mut any_valid = false;
            for (module, discount) in modules.iter().zip(discounts.iter()) {
                if let Some((valid, amount)) = discount {
                    let ticket = validator.begin(module, "CODE").expect("ticket");
                    let result = if *valid {
                        any_valid |= selected.contains(module) && *amount > 0;
                        Ok(DiscountQuote { amount: *amount, message: None })
                    } else {
                        Err("Invalid discount code".to_string())
                    };
                    validator.apply(ticket.settle(result));
                }
            }

            let q = quote(&selected, &price_map, validator.book());
            prop_assert!(q.payable <= q.total);
            prop_assert_eq!(q.total, selected.iter().map(|m| price_map[m]).sum::<u64>());
            if !any_valid {
                prop_assert_eq!(q.payable, q.total);
            }
            for line in &q.lines {
                prop_assert!(line.due <= line.base);
            }
        }
    }
}
