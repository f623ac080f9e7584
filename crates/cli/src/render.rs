//! Plain-text output.

use tebex_headless::models::{Basket, Category, Package, Webstore};

pub(crate) fn webstore(webstore: &Webstore) -> String {
    [
        format!("name: {}", webstore.name),
        format!("url: {}", webstore.webstore_url),
        format!("currency: {}", webstore.currency),
        format!("platform: {}", webstore.platform_type),
    ]
    .join("\n")
}

fn package_line(package: &Package) -> String {
    format!(
        "{}\t{}\t{} {}",
        package.id, package.name, package.total_price, package.currency
    )
}

pub(crate) fn categories(categories: &[Category]) -> String {
    let mut lines = Vec::new();

    for category in categories {
        lines.push(format!("{}\t{}", category.id, category.name));

        for package in &category.packages {
            lines.push(format!("  {}", package_line(package)));
        }
    }

    lines.join("\n")
}

pub(crate) fn category(category: &Category) -> String {
    categories(std::slice::from_ref(category))
}

pub(crate) fn packages(packages: &[Package]) -> String {
    packages
        .iter()
        .map(package_line)
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn package(package: &Package) -> String {
    let mut lines = vec![package_line(package)];

    if !package.description.is_empty() {
        lines.push(package.description.clone());
    }

    lines.join("\n")
}

pub(crate) fn basket(basket: Option<&Basket>) -> String {
    let Some(basket) = basket else {
        return "no basket".to_string();
    };

    let mut lines = vec![format!("basket: {}", basket.ident)];

    for package in &basket.packages {
        lines.push(format!(
            "  {}\t{} x {}\t{}",
            package.id, package.in_basket.quantity, package.name, package.in_basket.price
        ));
    }

    let coupons: Vec<_> = basket.coupon_codes().collect();

    if !coupons.is_empty() {
        lines.push(format!("coupons: {}", coupons.join(", ")));
    }

    if let Some(creator_code) = &basket.creator_code {
        lines.push(format!("creator code: {creator_code}"));
    }

    lines.push(format!("total: {} {}", basket.total_price, basket.currency));

    if let Some(link) = basket.checkout_link() {
        lines.push(format!("checkout: {link}"));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use tebex_headless::models::{BasketLinks, BasketPackage, Coupon, InBasket};

    use super::*;

    #[test]
    fn basket_lists_lines_promotions_and_total() {
        let basket = Basket {
            ident: "abc".to_string(),
            complete: false,
            username: Some("steve".to_string()),
            username_id: None,
            packages: vec![BasketPackage {
                id: 101,
                name: "VIP".to_string(),
                description: String::new(),
                in_basket: InBasket {
                    quantity: 2,
                    price: Decimal::new(999, 2),
                    gift_username_id: None,
                    gift_username: None,
                },
                image: None,
            }],
            coupons: vec![Coupon {
                coupon_code: "TEST10".to_string(),
            }],
            gift_cards: Vec::new(),
            creator_code: None,
            base_price: Decimal::new(1998, 2),
            sales_tax: Decimal::ZERO,
            total_price: Decimal::new(1798, 2),
            currency: "GBP".to_string(),
            complete_url: None,
            cancel_url: None,
            links: BasketLinks {
                checkout: Some("https://pay.tebex.io/abc".to_string()),
            },
        };

        assert_eq!(
            super::basket(Some(&basket)),
            "basket: abc\n  101\t2 x VIP\t9.99\ncoupons: TEST10\ntotal: 17.98 GBP\ncheckout: https://pay.tebex.io/abc"
        );
    }

    #[test]
    fn missing_basket_is_reported() {
        assert_eq!(super::basket(None), "no basket");
    }
}
