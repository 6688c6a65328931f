use crate::catalog::{ItemType, MarketplaceEntry};
use std::collections::BTreeMap;

const UNBRANDED: &str = "Unbranded";
const DOES_NOT_APPLY: &str = "Does not apply";

/// Aspect map shared by every marketplace in one publish run.
///
/// Identifier aspects eBay rejects listings without are filled with the
/// conventional placeholder values when the draft has nothing usable.
pub fn build_base_aspects(
    draft_aspects: &BTreeMap<String, String>,
    item_type: Option<ItemType>,
) -> BTreeMap<String, Vec<String>> {
    let mut aspects: BTreeMap<String, Vec<String>> = draft_aspects
        .iter()
        .filter_map(|(name, value)| {
            let name = name.trim();
            let value = value.trim();
            (!name.is_empty() && !value.is_empty())
                .then(|| (name.to_string(), vec![value.to_string()]))
        })
        .collect();

    let type_label = item_type.map(|t| t.label()).unwrap_or("Skateboard Part");
    let required = [
        ("Brand", UNBRANDED),
        ("MPN", DOES_NOT_APPLY),
        ("UPC", DOES_NOT_APPLY),
        ("EAN", DOES_NOT_APPLY),
        ("Type", type_label),
    ];
    for (name, fallback) in required {
        let present = aspects
            .keys()
            .any(|existing| existing.eq_ignore_ascii_case(name));
        if !present {
            aspects.insert(name.to_string(), vec![fallback.to_string()]);
        }
    }
    aspects
}

fn localized_name(language: &str, name: &str) -> Option<&'static str> {
    let translated = match (language, name.to_ascii_lowercase().as_str()) {
        ("de", "brand") => "Marke",
        ("de", "type") => "Produktart",
        ("de", "mpn") => "Herstellernummer",
        ("de", "colour" | "color") => "Farbe",
        ("de", "size") => "Größe",
        ("es", "brand") => "Marca",
        ("es", "type") => "Tipo",
        ("es", "mpn") => "Número de pieza fabricante",
        ("es", "colour" | "color") => "Color",
        ("es", "size") => "Talla",
        ("it", "brand") => "Marca",
        ("it", "type") => "Tipo",
        ("it", "mpn") => "MPN",
        ("it", "colour" | "color") => "Colore",
        ("it", "size") => "Taglia",
        _ => return None,
    };
    Some(translated)
}

/// Renames aspect keys for the marketplace language; values are untouched.
pub fn localize_aspects(
    aspects: &BTreeMap<String, Vec<String>>,
    entry: &MarketplaceEntry,
) -> BTreeMap<String, Vec<String>> {
    if entry.is_english() {
        return aspects.clone();
    }
    let language = entry.locale.split('-').next().unwrap_or_default();
    let mut localized = BTreeMap::new();
    for (name, values) in aspects {
        let key = localized_name(language, name)
            .map(str::to_string)
            .unwrap_or_else(|| name.clone());
        localized
            .entry(key)
            .or_insert_with(|| values.clone());
    }
    localized
}
