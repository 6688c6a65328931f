use clap::{Parser, Subcommand};
use crosslist::{
    AppConfig, AppContext, UnpublishScope,
    catalog::{ItemType, MarketplaceId},
    currency::PriceStyle,
};
use eyre::{Result, WrapErr, eyre};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "crosslist", about = "Publish drafts to several eBay marketplaces")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Provision locations, shipping services and policies.
    Bootstrap {
        /// Marketplace ids; every catalog marketplace when omitted.
        marketplaces: Vec<String>,
    },
    Publish {
        draft_id: String,
        #[arg(required = true)]
        marketplaces: Vec<String>,
        /// `MARKETPLACE=PRICE`, repeatable.
        #[arg(long = "price", value_parser = parse_price_override)]
        prices: Vec<(String, f64)>,
    },
    Unpublish {
        draft_id: String,
        /// Single marketplace; all of them when omitted.
        #[arg(long)]
        marketplace: Option<String>,
    },
    /// Tear down every listing, then delete the draft.
    Delete { draft_id: String },
    /// Exchange rates and localized shipping rates.
    Rates {
        marketplace: Option<String>,
        #[arg(long)]
        psychological: bool,
    },
    /// Resolve the category a draft would be listed under.
    Category {
        marketplace: String,
        #[arg(long)]
        item_type: Option<String>,
        #[arg(long, default_value = "")]
        query: String,
        /// Also list the aspects eBay requires for the category.
        #[arg(long)]
        aspects: bool,
    },
}

fn parse_price_override(raw: &str) -> Result<(String, f64), String> {
    let (marketplace, price) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected MARKETPLACE=PRICE, got `{raw}`"))?;
    let price: f64 = price
        .trim()
        .parse()
        .map_err(|err| format!("invalid price `{price}`: {err}"))?;
    Ok((marketplace.trim().to_string(), price))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();
    let ctx = AppContext::from_config(AppConfig::from_env());

    match cli.command {
        Command::Bootstrap { marketplaces } => {
            let report = ctx.bootstrap_marketplaces(&marketplaces).await?;
            print_json(&report)?;
        }
        Command::Publish {
            draft_id,
            marketplaces,
            prices,
        } => {
            let overrides: BTreeMap<String, f64> = prices.into_iter().collect();
            let report = ctx.publish(&draft_id, &marketplaces, &overrides).await?;
            info!(
                target = "crosslist.cli",
                draft_id = %draft_id,
                succeeded = report.succeeded().count(),
                "publish_complete"
            );
            print_json(&report)?;
        }
        Command::Unpublish {
            draft_id,
            marketplace,
        } => {
            let scope = UnpublishScope::parse(marketplace.as_deref());
            let report = ctx.unpublish(&draft_id, scope).await?;
            print_json(&report)?;
        }
        Command::Delete { draft_id } => {
            let report = ctx.delete_draft(&draft_id).await?;
            print_json(&report)?;
        }
        Command::Rates {
            marketplace,
            psychological,
        } => {
            let style = if psychological {
                PriceStyle::Psychological
            } else {
                PriceStyle::Clean
            };
            let snapshot = ctx.currency.get_rates().await;
            let targets: Vec<String> = match marketplace {
                Some(code) => vec![code],
                None => MarketplaceId::ALL
                    .iter()
                    .map(|id| id.ebay_code().to_string())
                    .collect(),
            };
            let mut shipping = BTreeMap::new();
            for code in targets {
                let rates = ctx.currency.localize_shipping_rates(&code, style).await;
                shipping.insert(code, rates);
            }
            print_json(&serde_json::json!({
                "rates": snapshot,
                "shipping": shipping,
            }))?;
        }
        Command::Category {
            marketplace,
            item_type,
            query,
            aspects,
        } => {
            let id: MarketplaceId = marketplace.parse()?;
            let item_type = match item_type.as_deref() {
                Some(code) => Some(
                    ItemType::from_code(code).ok_or_else(|| eyre!("unknown item type `{code}`"))?,
                ),
                None => None,
            };
            let resolution = ctx.categories.resolve_category(id, item_type, &query).await;
            let required = if aspects {
                ctx.categories
                    .required_aspects(id, &resolution.category_id)
                    .await
            } else {
                Vec::new()
            };
            print_json(&serde_json::json!({
                "marketplace_id": id,
                "category": resolution,
                "required_aspects": required,
            }))?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).wrap_err("rendering report")?;
    println!("{rendered}");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}
