//! Optimistic basket patches.
//!
//! Each patch edits one line and leaves every other line untouched. Prices are
//! not recomputed; the next re-fetch brings the authoritative totals.

use crate::models::{Basket, BasketPackage, NewBasketItem, PackageId};

/// Increase the line for `item` by its quantity, appending a placeholder line
/// when the package is not yet in the basket.
pub(crate) fn add_package(basket: &mut Basket, item: &NewBasketItem) {
    match basket
        .packages
        .iter_mut()
        .find(|package| package.id == item.package_id)
    {
        Some(package) => {
            package.in_basket.quantity = package.in_basket.quantity.saturating_add(item.quantity);
        }
        None => basket.packages.push(BasketPackage::placeholder(item)),
    }
}

/// Drop the line for `package_id`, returning the quantity it had.
pub(crate) fn remove_package(basket: &mut Basket, package_id: PackageId) -> Option<u32> {
    let position = basket
        .packages
        .iter()
        .position(|package| package.id == package_id)?;

    Some(basket.packages.remove(position).in_basket.quantity)
}

/// Set the line for `package_id` to exactly `quantity`.
pub(crate) fn set_quantity(basket: &mut Basket, package_id: PackageId, quantity: u32) {
    if let Some(package) = basket
        .packages
        .iter_mut()
        .find(|package| package.id == package_id)
    {
        package.in_basket.quantity = quantity;
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use rust_decimal::Decimal;

    use crate::models::{Basket, BasketLinks, BasketPackage, InBasket, PackageId};

    pub(crate) fn line(id: PackageId, quantity: u32) -> BasketPackage {
        BasketPackage {
            id,
            name: format!("Package {id}"),
            description: String::new(),
            in_basket: InBasket {
                quantity,
                price: Decimal::new(999, 2),
                gift_username_id: None,
                gift_username: None,
            },
            image: None,
        }
    }

    pub(crate) fn basket(ident: &str, lines: &[(PackageId, u32)]) -> Basket {
        Basket {
            ident: ident.to_string(),
            complete: false,
            username: Some("steve".to_string()),
            username_id: None,
            packages: lines.iter().map(|&(id, quantity)| line(id, quantity)).collect(),
            coupons: Vec::new(),
            gift_cards: Vec::new(),
            creator_code: None,
            base_price: Decimal::ZERO,
            sales_tax: Decimal::ZERO,
            total_price: Decimal::ZERO,
            currency: "GBP".to_string(),
            complete_url: None,
            cancel_url: None,
            links: BasketLinks::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{fixtures::basket, *};

    fn quantities(basket: &Basket) -> Vec<(PackageId, u32)> {
        basket
            .packages
            .iter()
            .map(|package| (package.id, package.in_basket.quantity))
            .collect()
    }

    #[test]
    fn adding_existing_package_increases_its_line() {
        let mut basket = basket("abc", &[(101, 1), (201, 4)]);

        add_package(&mut basket, &NewBasketItem::new(101).with_quantity(2));

        assert_eq!(quantities(&basket), [(101, 3), (201, 4)]);
    }

    #[test]
    fn adding_new_package_appends_placeholder() {
        let mut basket = basket("abc", &[(101, 1)]);

        add_package(&mut basket, &NewBasketItem::new(201));

        assert_eq!(quantities(&basket), [(101, 1), (201, 1)]);
        assert_eq!(basket.packages[1].name, "");
    }

    #[test]
    fn removing_returns_previous_quantity() {
        let mut basket = basket("abc", &[(101, 3), (201, 1)]);

        assert_eq!(remove_package(&mut basket, 101), Some(3));
        assert_eq!(quantities(&basket), [(201, 1)]);
        assert_eq!(remove_package(&mut basket, 101), None);
    }

    #[test]
    fn setting_quantity_leaves_other_lines_alone() {
        let mut basket = basket("abc", &[(101, 2), (201, 3)]);

        set_quantity(&mut basket, 101, 5);
        set_quantity(&mut basket, 999, 7);

        assert_eq!(quantities(&basket), [(101, 5), (201, 3)]);
    }
}
