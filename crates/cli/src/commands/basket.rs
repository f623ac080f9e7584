//! Basket subcommands.

use clap::{Subcommand, ValueEnum};
use tracing::info;

use tebex_headless::{
    TebexHeadless,
    models::{NewBasketItem, PackageId, PackageType, Promotion},
};

use crate::render;

use super::CliError;

/// Purchase type of an added line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum ItemType {
    /// One-off purchase.
    Single,

    /// Recurring purchase.
    Subscription,
}

impl From<ItemType> for PackageType {
    fn from(item_type: ItemType) -> Self {
        match item_type {
            ItemType::Single => Self::Single,
            ItemType::Subscription => Self::Subscription,
        }
    }
}

/// Basket operations.
#[derive(Debug, Subcommand)]
pub(crate) enum BasketCommand {
    /// Show the basket
    Show,

    /// Add a package, creating the basket if needed
    Add {
        /// Package id
        package_id: PackageId,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,

        /// Purchase type
        #[arg(long = "type", value_enum)]
        item_type: Option<ItemType>,

        /// Package variable as `name=value`, repeatable
        #[arg(long = "var", value_parser = parse_variable)]
        variables: Vec<(String, String)>,
    },

    /// Remove a package line
    Remove {
        /// Package id
        package_id: PackageId,
    },

    /// Set a line's quantity
    Quantity {
        /// Package id
        package_id: PackageId,

        /// New quantity
        quantity: u32,
    },

    /// Apply or remove a coupon
    Coupon {
        /// Coupon code
        code: String,

        /// Remove instead of apply
        #[arg(long)]
        remove: bool,
    },

    /// Apply or remove a gift card
    GiftCard {
        /// Gift card number
        number: String,

        /// Remove instead of apply
        #[arg(long)]
        remove: bool,
    },

    /// Apply or remove a creator code
    CreatorCode {
        /// Creator code
        code: String,

        /// Remove instead of apply
        #[arg(long)]
        remove: bool,
    },

    /// Abandon the basket
    Clear,
}

fn parse_variable(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))
}

pub(super) async fn run(sdk: &TebexHeadless, command: BasketCommand) -> Result<String, CliError> {
    let engine = sdk.basket();

    let basket = match command {
        BasketCommand::Show => engine.basket().await?,
        BasketCommand::Add {
            package_id,
            quantity,
            item_type,
            variables,
        } => {
            let mut item = NewBasketItem::new(package_id).with_quantity(quantity);

            if let Some(item_type) = item_type {
                item = item.with_type(item_type.into());
            }

            for (name, value) in variables {
                item = item.with_variable(name, value);
            }

            engine.add_package(&item).await?
        }
        BasketCommand::Remove { package_id } => engine.remove_package(package_id).await?,
        BasketCommand::Quantity {
            package_id,
            quantity,
        } => engine.update_quantity(package_id, quantity).await?,
        BasketCommand::Coupon { code, remove } => {
            return promotion(sdk, Promotion::Coupon(code), remove).await;
        }
        BasketCommand::GiftCard { number, remove } => {
            return promotion(sdk, Promotion::GiftCard(number), remove).await;
        }
        BasketCommand::CreatorCode { code, remove } => {
            return promotion(sdk, Promotion::CreatorCode(code), remove).await;
        }
        BasketCommand::Clear => {
            return Ok(match engine.clear() {
                Some(ident) => format!("basket {ident} cleared"),
                None => "no basket".to_string(),
            });
        }
    };

    Ok(render::basket(basket.as_ref()))
}

async fn promotion(
    sdk: &TebexHeadless,
    promotion: Promotion,
    remove: bool,
) -> Result<String, CliError> {
    let engine = sdk.basket();

    if remove {
        engine.remove_promotion(&promotion).await?;
    } else {
        engine.apply_promotion(&promotion).await?;
    }

    info!(kind = ?promotion.kind(), remove, "promotion updated");

    Ok(render::basket(engine.basket().await?.as_ref()))
}
