//! Landmark discovery with map and image links.

use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use super::{Assistant, AssistantError};
use crate::gemini::{GenerateContentRequest, GenerationConfig};

const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/";
const IMAGE_BASE_URL: &str = "https://loremflickr.com/800/600/";

/// A landmark ready to display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    pub name: String,
    pub description: String,
    pub location: String,
    pub rating: Option<f64>,
    pub img_tag: String,
    pub map_link: String,
    pub image_url: String,
}

/// Result of [`Assistant::discover_places`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Discovery {
    pub places: Vec<Place>,
    pub related_queries: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDiscovery {
    #[serde(default)]
    places: Vec<RawPlace>,
    #[serde(default)]
    related_queries: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlace {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    img_tag: String,
}

/// `https://www.google.com/maps/search/?api=1&query=<name location>`
pub fn map_link(name: &str, location: &str) -> String {
    let query = format!("{name} {location}");
    match Url::parse_with_params(MAPS_SEARCH_URL, [("api", "1"), ("query", query.trim())]) {
        Ok(url) => url.into(),
        Err(_) => MAPS_SEARCH_URL.to_string(),
    }
}

/// Keyword image URL; whitespace runs in the tag become commas.
pub fn image_url(img_tag: &str) -> String {
    let tags = img_tag.split_whitespace().collect::<Vec<_>>().join(",");
    let Ok(mut url) = Url::parse(IMAGE_BASE_URL) else {
        return IMAGE_BASE_URL.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(&tags);
    }
    url.into()
}

fn discovery_prompt(query: &str, lang: &str) -> String {
    format!(
        "Find 6 top famous tourist landmarks in {query}. Provide details in {lang} language. \
         Crucial for images: For each place, provide a VERY SPECIFIC visual keyword in English \
         including the city and country (e.g. \"Registan Samarkand Uzbekistan\" or \
         \"Eiffel Tower Paris France\"). Also, generate exactly 5 related Google-style search \
         questions (in {lang}) that people usually ask about {query}."
    )
}

fn discovery_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "places": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "description": { "type": "STRING" },
                        "location": { "type": "STRING" },
                        "rating": { "type": "NUMBER" },
                        "imgTag": { "type": "STRING" }
                    },
                    "required": ["name", "description", "location", "rating", "imgTag"]
                }
            },
            "relatedQueries": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["places", "relatedQueries"]
    })
}

/// Drop a surrounding Markdown code fence, if the model added one.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse the model's JSON answer. Malformed JSON yields an empty result.
pub fn parse_discovery(text: &str) -> Discovery {
    let raw: RawDiscovery = match serde_json::from_str(strip_code_fence(text)) {
        Ok(raw) => raw,
        Err(e) => {
            log::error!("discover: could not parse places response: {e}");
            return Discovery::default();
        }
    };

    let places = raw
        .places
        .into_iter()
        .map(|p| Place {
            map_link: map_link(&p.name, &p.location),
            image_url: image_url(&p.img_tag),
            name: p.name,
            description: p.description,
            location: p.location,
            rating: p.rating,
            img_tag: p.img_tag,
        })
        .collect();

    Discovery {
        places,
        related_queries: raw.related_queries,
    }
}

impl Assistant {
    /// Ask for six landmarks around `query` described in `lang`, plus five
    /// related search questions.
    pub async fn discover_places(&self, query: &str, lang: &str) -> Result<Discovery, AssistantError> {
        let request = GenerateContentRequest::prompt(discovery_prompt(query, lang))
            .with_google_search()
            .with_generation_config(GenerationConfig::json(discovery_schema()));

        let response = self
            .generator
            .generate(&self.config.search_model, &request)
            .await?;

        let text = response.text().unwrap_or_default();
        let discovery = parse_discovery(&text);
        log::info!(
            "discover: {} places, {} related queries for {query:?}",
            discovery.places.len(),
            discovery.related_queries.len()
        );
        Ok(discovery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::tests::{assistant, text_reply, ScriptedGenerator};

    #[test]
    fn map_link_encodes_name_and_location() {
        let link = map_link("Registan", "Samarkand, Uzbekistan");
        let url = Url::parse(&link).unwrap();
        assert_eq!(url.host_str(), Some("www.google.com"));
        assert_eq!(url.path(), "/maps/search/");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("api".to_string(), "1".to_string()),
                ("query".to_string(), "Registan Samarkand, Uzbekistan".to_string())
            ]
        );
    }

    #[test]
    fn image_url_joins_tag_words_with_commas() {
        assert_eq!(
            image_url("Registan  Samarkand\tUzbekistan"),
            "https://loremflickr.com/800/600/Registan,Samarkand,Uzbekistan"
        );
    }

    #[test]
    fn image_url_escapes_path_characters() {
        let url = image_url("Notre Dame/Paris");
        assert!(url.starts_with("https://loremflickr.com/800/600/"));
        assert!(url.ends_with("Notre,Dame%2FParis"), "{url}");
    }

    #[test]
    fn parse_discovery_builds_links() {
        let d = parse_discovery(
            r#"{"places":[{"name":"Eiffel Tower","description":"Iron tower",
                "location":"Paris","rating":4.7,"imgTag":"Eiffel Tower Paris France"}],
                "relatedQueries":["q1","q2"]}"#,
        );
        assert_eq!(d.places.len(), 1);
        let p = &d.places[0];
        assert_eq!(p.rating, Some(4.7));
        assert_eq!(p.image_url, "https://loremflickr.com/800/600/Eiffel,Tower,Paris,France");
        assert!(p.map_link.contains("query=Eiffel+Tower+Paris"));
        assert_eq!(d.related_queries, vec!["q1", "q2"]);
    }

    #[test]
    fn parse_discovery_accepts_fenced_json() {
        let d = parse_discovery("```json\n{\"places\":[],\"relatedQueries\":[\"a\"]}\n```");
        assert_eq!(d.related_queries, vec!["a"]);
    }

    #[test]
    fn unparseable_json_is_an_empty_result() {
        assert_eq!(parse_discovery("sorry, no JSON today"), Discovery::default());
        assert_eq!(parse_discovery(""), Discovery::default());
    }

    #[tokio::test]
    async fn discover_places_requests_schema_and_search() {
        let gen = ScriptedGenerator::new([text_reply(
            r#"{"places":[{"name":"Registan","description":"d","location":"Samarkand",
                "rating":5,"imgTag":"Registan Samarkand Uzbekistan"}],"relatedQueries":[]}"#,
        )]);
        let d = assistant(gen.clone())
            .discover_places("Uzbekistan", "English")
            .await
            .unwrap();

        assert_eq!(d.places[0].name, "Registan");

        let (model, body) = &gen.calls()[0];
        assert_eq!(model, "gemini-3-pro-preview");
        assert_eq!(body["tools"][0]["googleSearch"], json!({}));
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(
            body["generationConfig"]["responseSchema"]["required"],
            json!(["places", "relatedQueries"])
        );
        let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(prompt.contains("landmarks in Uzbekistan"));
    }
}
