use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Category used when neither live lookup nor the item-type table has an answer.
pub const UNIVERSAL_FALLBACK_CATEGORY: &str = "16265";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(clippy::enum_variant_names)]
pub enum MarketplaceId {
    EbayUs,
    EbayGb,
    EbayDe,
    EbayEs,
    EbayIt,
    EbayAu,
}

impl MarketplaceId {
    pub const ALL: [MarketplaceId; 6] = [
        MarketplaceId::EbayUs,
        MarketplaceId::EbayGb,
        MarketplaceId::EbayDe,
        MarketplaceId::EbayEs,
        MarketplaceId::EbayIt,
        MarketplaceId::EbayAu,
    ];

    pub fn ebay_code(&self) -> &'static str {
        match self {
            MarketplaceId::EbayUs => "EBAY_US",
            MarketplaceId::EbayGb => "EBAY_GB",
            MarketplaceId::EbayDe => "EBAY_DE",
            MarketplaceId::EbayEs => "EBAY_ES",
            MarketplaceId::EbayIt => "EBAY_IT",
            MarketplaceId::EbayAu => "EBAY_AU",
        }
    }

    pub fn entry(&self) -> &'static MarketplaceEntry {
        match self {
            MarketplaceId::EbayUs => &CATALOG[0],
            MarketplaceId::EbayGb => &CATALOG[1],
            MarketplaceId::EbayDe => &CATALOG[2],
            MarketplaceId::EbayEs => &CATALOG[3],
            MarketplaceId::EbayIt => &CATALOG[4],
            MarketplaceId::EbayAu => &CATALOG[5],
        }
    }
}

impl FromStr for MarketplaceId {
    type Err = UnknownMarketplace;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_uppercase().as_str() {
            "EBAY_US" => Ok(MarketplaceId::EbayUs),
            "EBAY_GB" | "EBAY_UK" => Ok(MarketplaceId::EbayGb),
            "EBAY_DE" => Ok(MarketplaceId::EbayDe),
            "EBAY_ES" => Ok(MarketplaceId::EbayEs),
            "EBAY_IT" => Ok(MarketplaceId::EbayIt),
            "EBAY_AU" => Ok(MarketplaceId::EbayAu),
            _ => Err(UnknownMarketplace(input.to_string())),
        }
    }
}

impl fmt::Display for MarketplaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ebay_code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown marketplace `{0}`")]
pub struct UnknownMarketplace(pub String);

#[derive(Debug, Clone, PartialEq)]
pub struct MarketplaceEntry {
    pub id: MarketplaceId,
    pub name: &'static str,
    /// Numeric site id; doubles as the category tree id for taxonomy calls.
    pub site_id: &'static str,
    pub currency: &'static str,
    pub country_code: &'static str,
    pub locale: &'static str,
    pub domain: &'static str,
    pub default_price: f64,
    pub default_shipping_cost: f64,
    pub fallback_shipping_service: &'static str,
    pub default_location_key: &'static str,
}

impl MarketplaceEntry {
    pub fn sku_suffix(&self) -> &'static str {
        self.country_code
    }

    pub fn is_english(&self) -> bool {
        self.locale.starts_with("en")
    }
}

static CATALOG: [MarketplaceEntry; 6] = [
    MarketplaceEntry {
        id: MarketplaceId::EbayUs,
        name: "United States",
        site_id: "0",
        currency: "USD",
        country_code: "US",
        locale: "en-US",
        domain: "ebay.com",
        default_price: 25.0,
        default_shipping_cost: 25.0,
        fallback_shipping_service: "USPSPriority",
        default_location_key: "location_us",
    },
    MarketplaceEntry {
        id: MarketplaceId::EbayGb,
        name: "United Kingdom",
        site_id: "3",
        currency: "GBP",
        country_code: "GB",
        locale: "en-GB",
        domain: "ebay.co.uk",
        default_price: 10.0,
        default_shipping_cost: 10.0,
        fallback_shipping_service: "UK_RoyalMailFirstClassStandard",
        default_location_key: "location_gb",
    },
    MarketplaceEntry {
        id: MarketplaceId::EbayDe,
        name: "Germany",
        site_id: "77",
        currency: "EUR",
        country_code: "DE",
        locale: "de-DE",
        domain: "ebay.de",
        default_price: 12.0,
        default_shipping_cost: 12.0,
        fallback_shipping_service: "DE_DHLPaket",
        default_location_key: "location_de",
    },
    MarketplaceEntry {
        id: MarketplaceId::EbayEs,
        name: "Spain",
        site_id: "186",
        currency: "EUR",
        country_code: "ES",
        locale: "es-ES",
        domain: "ebay.es",
        default_price: 12.0,
        default_shipping_cost: 12.0,
        fallback_shipping_service: "ES_CorreosSpainInternationalEconomyMail",
        default_location_key: "location_es",
    },
    MarketplaceEntry {
        id: MarketplaceId::EbayIt,
        name: "Italy",
        site_id: "101",
        currency: "EUR",
        country_code: "IT",
        locale: "it-IT",
        domain: "ebay.it",
        default_price: 12.0,
        default_shipping_cost: 10.0,
        fallback_shipping_service: "IT_Posta1",
        default_location_key: "location_it",
    },
    MarketplaceEntry {
        id: MarketplaceId::EbayAu,
        name: "Australia",
        site_id: "15",
        currency: "AUD",
        country_code: "AU",
        locale: "en-AU",
        domain: "ebay.com.au",
        default_price: 100.0,
        default_shipping_cost: 100.0,
        fallback_shipping_service: "AU_StandardDelivery",
        default_location_key: "location_au",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Wheels,
    Trucks,
    Deck,
    Apparel,
    Misc,
}

impl ItemType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "WHL" => Some(ItemType::Wheels),
            "TRK" => Some(ItemType::Trucks),
            "DCK" => Some(ItemType::Deck),
            "APP" => Some(ItemType::Apparel),
            "MISC" => Some(ItemType::Misc),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ItemType::Wheels => "WHL",
            ItemType::Trucks => "TRK",
            ItemType::Deck => "DCK",
            ItemType::Apparel => "APP",
            ItemType::Misc => "MISC",
        }
    }

    /// Display label, also used as the `Type` aspect fallback.
    pub fn label(&self) -> &'static str {
        match self {
            ItemType::Wheels => "Skateboard Wheels",
            ItemType::Trucks => "Skateboard Trucks",
            ItemType::Deck => "Skateboard Deck",
            ItemType::Apparel => "Skateboard Apparel",
            ItemType::Misc => "Skateboard Part",
        }
    }

    /// Canned phrase sent to the taxonomy suggestion endpoint.
    pub fn search_phrase(&self) -> &'static str {
        match self {
            ItemType::Wheels => "skateboard wheels",
            ItemType::Trucks => "skateboard trucks",
            ItemType::Deck => "skateboard deck",
            ItemType::Apparel => "skateboard clothing",
            ItemType::Misc => "skateboard parts",
        }
    }

    /// Static category per marketplace. Every storefront currently shares ids.
    pub fn fallback_category(&self, marketplace: MarketplaceId) -> Option<&'static str> {
        let id = match self {
            ItemType::Wheels => "36632",
            ItemType::Trucks => "36631",
            ItemType::Deck => "16263",
            ItemType::Apparel => "36642",
            ItemType::Misc => "16265",
        };
        MarketplaceId::ALL.contains(&marketplace).then_some(id)
    }
}
