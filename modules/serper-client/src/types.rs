use serde::{Deserialize, Serialize};

/// Request body for `POST /search`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub q: String,
    /// Host language (`hl`), e.g. `en`.
    #[serde(rename = "hl", skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Country code (`gl`), e.g. `us`.
    #[serde(rename = "gl", skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub num: u32,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            q: query.into(),
            language: None,
            region: None,
            num: 10,
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn num(mut self, num: u32) -> Self {
        self.num = num;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub organic: Vec<OrganicResult>,
}

/// One organic result. Serper omits fields freely, so all are optional.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OrganicResult {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub position: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_serper_field_names() {
        let req = SearchRequest::new("\"Acme\"").language("fr").region("fr").num(20);
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["q"], "\"Acme\"");
        assert_eq!(body["hl"], "fr");
        assert_eq!(body["gl"], "fr");
        assert_eq!(body["num"], 20);
    }

    #[test]
    fn unset_locale_is_omitted() {
        let body = serde_json::to_value(SearchRequest::new("acme")).unwrap();
        assert!(body.get("hl").is_none());
        assert!(body.get("gl").is_none());
    }

    #[test]
    fn sparse_results_deserialize() {
        let json = r#"{"organic": [{"title": "Acme"}, {"link": "https://acme.test", "position": 2}]}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.organic.len(), 2);
        assert_eq!(parsed.organic[0].link, None);
        assert_eq!(parsed.organic[1].position, Some(2));
    }

    #[test]
    fn missing_organic_block_is_empty() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.organic.is_empty());
    }
}
