use crate::catalog::MarketplaceEntry;
use crate::ebay::auth::TokenScope;
use crate::ebay::client::EbayClient;
use crate::ebay::error::UpstreamError;
use crate::http::ApiRequest;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionResponse {
    #[serde(default)]
    pub category_suggestions: Vec<CategorySuggestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategorySuggestion {
    pub category: SuggestedCategory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedCategory {
    pub category_id: String,
    #[serde(default)]
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AspectsResponse {
    #[serde(default)]
    pub aspects: Vec<Aspect>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aspect {
    pub localized_aspect_name: String,
    #[serde(default)]
    pub aspect_constraint: Option<AspectConstraint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AspectConstraint {
    #[serde(default)]
    pub aspect_required: Option<bool>,
}

impl Aspect {
    pub fn is_required(&self) -> bool {
        self.aspect_constraint
            .as_ref()
            .and_then(|c| c.aspect_required)
            .unwrap_or(false)
    }
}

impl EbayClient {
    /// Suggestions in eBay's relevance order for the marketplace's category tree.
    pub async fn category_suggestions(
        &self,
        entry: &MarketplaceEntry,
        query: &str,
    ) -> Result<Vec<SuggestedCategory>, UpstreamError> {
        let path = format!(
            "/commerce/taxonomy/v1/category_tree/{}/get_category_suggestions",
            entry.site_id
        );
        let request = ApiRequest::get(self.url(&path)).query("q", query);
        let payload: SuggestionResponse = self
            .send_json("get_category_suggestions", TokenScope::Application, request)
            .await?;
        Ok(payload
            .category_suggestions
            .into_iter()
            .map(|suggestion| suggestion.category)
            .collect())
    }

    pub async fn item_aspects(
        &self,
        entry: &MarketplaceEntry,
        category_id: &str,
    ) -> Result<Vec<Aspect>, UpstreamError> {
        let path = format!(
            "/commerce/taxonomy/v1/category_tree/{}/get_item_aspects_for_category",
            entry.site_id
        );
        let request = ApiRequest::get(self.url(&path)).query("category_id", category_id);
        let payload: AspectsResponse = self
            .send_json("get_item_aspects_for_category", TokenScope::Application, request)
            .await?;
        Ok(payload.aspects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suggestion_payload() {
        let payload: SuggestionResponse = serde_json::from_str(
            r#"{"categorySuggestions":[{"category":{"categoryId":"36632","categoryName":"Wheels"}}]}"#,
        )
        .unwrap();
        assert_eq!(payload.category_suggestions[0].category.category_id, "36632");
    }

    #[test]
    fn aspect_requirement_defaults_to_optional() {
        let payload: AspectsResponse = serde_json::from_str(
            r#"{"aspects":[
                {"localizedAspectName":"Brand","aspectConstraint":{"aspectRequired":true}},
                {"localizedAspectName":"Colour"}
            ]}"#,
        )
        .unwrap();
        assert!(payload.aspects[0].is_required());
        assert!(!payload.aspects[1].is_required());
    }
}
