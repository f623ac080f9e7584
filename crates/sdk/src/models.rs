//! Tebex Models

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Catalog package identifier.
pub type PackageId = u64;

/// Basket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Basket {
    /// Opaque identifier, immutable once created.
    pub ident: String,

    /// Completed baskets are no longer valid mutation targets.
    #[serde(default)]
    pub complete: bool,

    /// Owning user.
    #[serde(default)]
    pub username: Option<String>,

    /// Platform identifier of the owning user.
    #[serde(default, deserialize_with = "string_or_number")]
    pub username_id: Option<String>,

    /// Line items, unique per package id.
    #[serde(default)]
    pub packages: Vec<BasketPackage>,

    /// Applied coupons.
    #[serde(default)]
    pub coupons: Vec<Coupon>,

    /// Applied gift cards.
    #[serde(default, rename = "giftcards")]
    pub gift_cards: Vec<GiftCard>,

    /// Applied creator code.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub creator_code: Option<String>,

    /// Price before tax and promotions.
    #[serde(default)]
    pub base_price: Decimal,

    /// Tax charged on the basket.
    #[serde(default)]
    pub sales_tax: Decimal,

    /// Price the user pays.
    #[serde(default)]
    pub total_price: Decimal,

    /// ISO currency code.
    #[serde(default)]
    pub currency: String,

    /// Redirect target after payment.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub complete_url: Option<String>,

    /// Redirect target when checkout is abandoned.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub cancel_url: Option<String>,

    /// Related links.
    #[serde(default)]
    pub links: BasketLinks,
}

impl Basket {
    /// Line item for `package_id`, if present.
    pub fn package(&self, package_id: PackageId) -> Option<&BasketPackage> {
        self.packages.iter().find(|package| package.id == package_id)
    }

    /// Quantity of `package_id`, if present.
    pub fn quantity_of(&self, package_id: PackageId) -> Option<u32> {
        self.package(package_id)
            .map(|package| package.in_basket.quantity)
    }

    /// Package ids in line order.
    pub fn package_ids(&self) -> Vec<PackageId> {
        self.packages.iter().map(|package| package.id).collect()
    }

    /// Applied coupon codes.
    pub fn coupon_codes(&self) -> impl Iterator<Item = &str> {
        self.coupons.iter().map(|coupon| coupon.coupon_code.as_str())
    }

    /// Link that opens the hosted checkout.
    pub fn checkout_link(&self) -> Option<&str> {
        self.links.checkout.as_deref()
    }
}

/// Basket links
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketLinks {
    /// Hosted checkout link.
    #[serde(default)]
    pub checkout: Option<String>,
}

/// Basket line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketPackage {
    /// Catalog package id.
    pub id: PackageId,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Display description.
    #[serde(default)]
    pub description: String,

    /// Quantity and pricing of this line.
    pub in_basket: InBasket,

    /// Display image.
    #[serde(default)]
    pub image: Option<String>,
}

impl BasketPackage {
    /// Line added ahead of the server; price is unknown until reconciled.
    pub fn placeholder(item: &NewBasketItem) -> Self {
        Self {
            id: item.package_id,
            name: String::new(),
            description: String::new(),
            in_basket: InBasket {
                quantity: item.quantity,
                price: Decimal::ZERO,
                gift_username_id: None,
                gift_username: None,
            },
            image: None,
        }
    }
}

/// Line quantity and pricing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InBasket {
    /// Units of the package.
    pub quantity: u32,

    /// Line price.
    #[serde(default)]
    pub price: Decimal,

    /// Platform identifier of the gift recipient.
    #[serde(default, deserialize_with = "string_or_number")]
    pub gift_username_id: Option<String>,

    /// Recipient when the line is a gift.
    #[serde(default)]
    pub gift_username: Option<String>,
}

/// Applied coupon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    /// Coupon code.
    pub coupon_code: String,
}

/// Applied gift card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftCard {
    /// Gift card number.
    pub card_number: String,
}

/// Purchase type of a basket line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    /// One-off purchase.
    Single,

    /// Recurring purchase.
    Subscription,
}

/// Item to add to a basket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBasketItem {
    /// Catalog package id.
    pub package_id: PackageId,

    /// Units to add; added to any existing quantity.
    pub quantity: u32,

    /// Purchase type, when the package offers a choice.
    pub package_type: Option<PackageType>,

    /// Package variable values.
    pub variable_data: Option<BTreeMap<String, String>>,
}

impl NewBasketItem {
    /// One unit of `package_id`.
    #[must_use]
    pub const fn new(package_id: PackageId) -> Self {
        Self {
            package_id,
            quantity: 1,
            package_type: None,
            variable_data: None,
        }
    }

    /// Set the quantity to add.
    #[must_use]
    pub const fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Set the purchase type.
    #[must_use]
    pub const fn with_type(mut self, package_type: PackageType) -> Self {
        self.package_type = Some(package_type);
        self
    }

    /// Add one package variable value.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variable_data
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }
}

/// Basket creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBasket {
    /// Owning user.
    pub username: String,

    /// Redirect target after payment.
    pub complete_url: String,

    /// Redirect target when checkout is abandoned.
    pub cancel_url: String,
}

/// Kind of promotion code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromotionKind {
    /// Coupon code.
    Coupon,

    /// Gift card number.
    GiftCard,

    /// Creator code.
    CreatorCode,
}

impl PromotionKind {
    /// Basket sub-resource for this kind.
    pub(crate) const fn path_segment(self) -> &'static str {
        match self {
            Self::Coupon => "coupons",
            Self::GiftCard => "giftcards",
            Self::CreatorCode => "creator-codes",
        }
    }

    /// Request body field carrying the code.
    pub(crate) const fn payload_field(self) -> &'static str {
        match self {
            Self::Coupon => "coupon_code",
            Self::GiftCard => "card_number",
            Self::CreatorCode => "creator_code",
        }
    }
}

/// Promotion code attached to a basket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Promotion {
    /// Coupon code.
    Coupon(String),

    /// Gift card number.
    GiftCard(String),

    /// Creator code.
    CreatorCode(String),
}

impl Promotion {
    /// Kind of this promotion.
    #[must_use]
    pub const fn kind(&self) -> PromotionKind {
        match self {
            Self::Coupon(_) => PromotionKind::Coupon,
            Self::GiftCard(_) => PromotionKind::GiftCard,
            Self::CreatorCode(_) => PromotionKind::CreatorCode,
        }
    }

    /// The code itself.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Coupon(code) | Self::GiftCard(code) | Self::CreatorCode(code) => code,
        }
    }

    /// JSON body sent when applying or removing this promotion.
    pub(crate) fn payload(&self) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        body.insert(
            self.kind().payload_field().to_string(),
            serde_json::Value::String(self.code().to_string()),
        );

        serde_json::Value::Object(body)
    }
}

/// Webstore metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webstore {
    /// Webstore id.
    pub id: u64,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Description.
    #[serde(default)]
    pub description: String,

    /// Public store URL.
    #[serde(default)]
    pub webstore_url: String,

    /// ISO currency code.
    #[serde(default)]
    pub currency: String,

    /// Language code.
    #[serde(default)]
    pub lang: String,

    /// Logo URL.
    #[serde(default)]
    pub logo: Option<String>,

    /// Game platform.
    #[serde(default)]
    pub platform_type: String,
}

/// Catalog category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Category id.
    pub id: u64,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// URL slug.
    #[serde(default)]
    pub slug: Option<String>,

    /// Description.
    #[serde(default)]
    pub description: String,

    /// Packages, when requested.
    #[serde(default)]
    pub packages: Vec<Package>,

    /// Sort order.
    #[serde(default)]
    pub order: i64,
}

/// Catalog package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// Package id.
    pub id: PackageId,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Description.
    #[serde(default)]
    pub description: String,

    /// `single`, `subscription` or `both`.
    #[serde(default, rename = "type")]
    pub package_type: String,

    /// Price before tax.
    #[serde(default)]
    pub base_price: Decimal,

    /// Tax.
    #[serde(default)]
    pub sales_tax: Decimal,

    /// Price including tax.
    #[serde(default)]
    pub total_price: Decimal,

    /// ISO currency code.
    #[serde(default)]
    pub currency: String,

    /// Discount applied to the price.
    #[serde(default)]
    pub discount: Decimal,

    /// Display image.
    #[serde(default)]
    pub image: Option<String>,
}

/// Tebex response wrapper.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;

    Ok(value.filter(|value| !value.is_empty()))
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(value)) if !value.is_empty() => Some(value),
        Some(Value::Number(value)) => Some(value.to_string()),
        _ => None,
    })
}
