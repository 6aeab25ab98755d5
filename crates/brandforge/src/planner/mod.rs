//! Variation planning.
//!
//! One chat call proposes N sparse patches against a base structured
//! description. The planner never fails a pipeline: missing credentials,
//! chat errors, and unparseable responses all route to a deterministic
//! preset fallback, so a batch can always be rendered.

pub mod chat;
pub mod extract;
pub mod patch;

use std::sync::Arc;

use log::warn;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use crate::config::Config;

pub use chat::{ChatClient, ChatError, ChatModel};
pub use extract::extract_json;
pub use patch::deep_merge;

/// Reported as the planner model when no chat client is configured.
const FALLBACK_MODEL_NAME: &str = "offline-presets";

const PLANNER_TEMPERATURE: f32 = 0.8;

const SYSTEM_PROMPT: &str = "\
You are a senior art director for e-commerce product imagery. Given a base \
structured description of a product shot, propose distinct, high-impact \
visual variations. Vary lighting, camera angle, backdrop, depth of field and \
mood, ranging from safe to adventurous, and respect the brand context when \
one is given.\n\
Respond ONLY with a JSON array of patch objects, one per requested \
variation. Each patch is a partial object that will be deep-merged into the \
base structured description; include only the keys you change. An empty \
object keeps the base unchanged.\n\
Format: [ { ... }, { ... }, ... ]";

/// The four built-in style presets used when no chat model is available.
fn fallback_presets() -> Vec<Value> {
    vec![
        json!({
            "lighting": {"conditions": "studio softbox"},
            "photographic_characteristics": {"camera_angle": "eye-level", "depth_of_field": "shallow"},
            "background_setting": "clean premium studio background",
            "aesthetics": {"mood_atmosphere": "premium minimal", "color_scheme": "brand-aligned"}
        }),
        json!({
            "lighting": {"conditions": "golden hour"},
            "photographic_characteristics": {"camera_angle": "three-quarter", "depth_of_field": "medium"},
            "background_setting": "subtle lifestyle scene (out-of-focus)",
            "aesthetics": {"mood_atmosphere": "warm aspirational", "color_scheme": "warm + brand accent"}
        }),
        json!({
            "lighting": {"conditions": "dramatic rim light"},
            "photographic_characteristics": {"camera_angle": "low angle", "depth_of_field": "shallow"},
            "background_setting": "dark premium backdrop",
            "aesthetics": {"mood_atmosphere": "bold luxury", "color_scheme": "dark + brand accent"}
        }),
        json!({
            "lighting": {"conditions": "top light diffused"},
            "photographic_characteristics": {"camera_angle": "top-down flat lay", "depth_of_field": "deep"},
            "background_setting": "flat lay surface (stone/wood) minimal props",
            "aesthetics": {"mood_atmosphere": "editorial clean", "color_scheme": "neutral + brand accent"}
        }),
    ]
}

pub struct VariationPlanner {
    chat: Option<Arc<dyn ChatModel>>,
}

impl VariationPlanner {
    pub fn new(chat: Option<Arc<dyn ChatModel>>) -> Self {
        Self { chat }
    }

    /// Builds the planner from configuration. Missing or unusable chat
    /// credentials are downgraded to the preset fallback.
    pub fn from_config(config: &Config) -> Self {
        let chat: Option<Arc<dyn ChatModel>> = match &config.llm_api_key {
            Some(key) => {
                let key = SecretString::from(key.expose_secret().to_string());
                match ChatClient::new(config.llm_base_url.clone(), key, config.llm_model.clone()) {
                    Ok(client) => Some(Arc::new(client)),
                    Err(e) => {
                        warn!("Chat client unavailable ({}), planner will use presets", e);
                        None
                    }
                }
            }
            None => {
                warn!("No chat API key configured, planner will use presets");
                None
            }
        };
        Self { chat }
    }

    pub fn model_name(&self) -> &str {
        self.chat
            .as_deref()
            .map(ChatModel::model_name)
            .unwrap_or(FALLBACK_MODEL_NAME)
    }

    /// Proposes exactly `n` patches for `base`. Infallible by contract: any
    /// planning failure yields the deterministic preset patches instead.
    pub async fn propose_patches(
        &self,
        user_prompt: &str,
        base: &Value,
        brand_context: &str,
        n: usize,
    ) -> Vec<Value> {
        let Some(chat) = &self.chat else {
            return Self::fallback(n);
        };

        let user = format!(
            "Product/Prompt: {}\nBrand context:\n{}\n\nBase structured description: {}\n\nCreate {} distinct variations.",
            user_prompt, brand_context, base, n
        );

        match chat.complete(SYSTEM_PROMPT, &user, PLANNER_TEMPERATURE).await {
            Ok(content) => match Self::interpret(&content, n) {
                Some(patches) => patches,
                None => {
                    warn!("Planner response was not a usable patch list, using presets");
                    Self::fallback(n)
                }
            },
            Err(e) => {
                warn!("Planner chat call failed ({}), using presets", e);
                Self::fallback(n)
            }
        }
    }

    /// Turns raw chat output into exactly `n` patch objects, or `None` when
    /// no patch list can be recovered.
    fn interpret(content: &str, n: usize) -> Option<Vec<Value>> {
        let value = extract_json(content)?;

        let array = match value {
            Value::Array(items) => items,
            // Models sometimes wrap the array in an envelope object; take the
            // "variations" key or the first array-valued key.
            Value::Object(map) => {
                if let Some(Value::Array(items)) = map.get("variations") {
                    items.clone()
                } else {
                    map.into_iter().find_map(|(_, v)| match v {
                        Value::Array(items) => Some(items),
                        _ => None,
                    })?
                }
            }
            _ => return None,
        };

        let mut patches: Vec<Value> = array
            .into_iter()
            .map(|item| {
                if item.is_object() {
                    item
                } else {
                    Value::Object(Default::default())
                }
            })
            .take(n)
            .collect();
        while patches.len() < n {
            patches.push(Value::Object(Default::default()));
        }
        Some(patches)
    }

    /// Deterministic preset patches, cycled to length `n`.
    fn fallback(n: usize) -> Vec<Value> {
        let presets = fallback_presets();
        (0..n).map(|i| presets[i % presets.len()].clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct CannedChat(String);

    #[async_trait]
    impl ChatModel for CannedChat {
        async fn complete(&self, _: &str, _: &str, _: f32) -> Result<String, ChatError> {
            Ok(self.0.clone())
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    struct FailingChat;

    #[async_trait]
    impl ChatModel for FailingChat {
        async fn complete(&self, _: &str, _: &str, _: f32) -> Result<String, ChatError> {
            Err(ChatError::MissingContent)
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn planner_with(content: &str) -> VariationPlanner {
        VariationPlanner::new(Some(Arc::new(CannedChat(content.to_string()))))
    }

    fn base() -> Value {
        json!({"subject": "sneaker"})
    }

    #[tokio::test]
    async fn test_no_client_yields_presets() {
        let planner = VariationPlanner::new(None);
        let patches = planner.propose_patches("red sneaker", &base(), "", 3).await;
        assert_eq!(patches, fallback_presets()[..3].to_vec());
        assert_eq!(planner.model_name(), FALLBACK_MODEL_NAME);
    }

    #[tokio::test]
    async fn test_presets_cycle_past_four() {
        let planner = VariationPlanner::new(None);
        let patches = planner.propose_patches("red sneaker", &base(), "", 6).await;
        assert_eq!(patches.len(), 6);
        let presets = fallback_presets();
        assert_eq!(patches[4], presets[0]);
        assert_eq!(patches[5], presets[1]);
    }

    #[tokio::test]
    async fn test_unparseable_response_yields_presets() {
        let planner = planner_with("I'm sorry, I can't produce JSON today.");
        let patches = planner.propose_patches("red sneaker", &base(), "", 4).await;
        assert_eq!(patches, fallback_presets());
    }

    #[tokio::test]
    async fn test_chat_failure_yields_presets() {
        let planner = VariationPlanner::new(Some(Arc::new(FailingChat)));
        let patches = planner.propose_patches("red sneaker", &base(), "", 2).await;
        assert_eq!(patches, fallback_presets()[..2].to_vec());
    }

    #[tokio::test]
    async fn test_parses_plain_array_with_prose() {
        let planner = planner_with(
            r#"Here you go:
[{"lighting": {"conditions": "neon"}}, {"background_setting": "rooftop"}]"#,
        );
        let patches = planner.propose_patches("red sneaker", &base(), "", 2).await;
        assert_eq!(patches[0], json!({"lighting": {"conditions": "neon"}}));
        assert_eq!(patches[1], json!({"background_setting": "rooftop"}));
    }

    #[tokio::test]
    async fn test_unwraps_variations_envelope() {
        let planner = planner_with(r#"{"variations": [{"a": 1}, {"b": 2}, {"c": 3}]}"#);
        let patches = planner.propose_patches("p", &base(), "", 3).await;
        assert_eq!(patches, vec![json!({"a": 1}), json!({"b": 2}), json!({"c": 3})]);
    }

    #[tokio::test]
    async fn test_unwraps_unnamed_envelope_key() {
        let planner = planner_with(r#"{"patches": [{"a": 1}]}"#);
        let patches = planner.propose_patches("p", &base(), "", 1).await;
        assert_eq!(patches, vec![json!({"a": 1})]);
    }

    #[tokio::test]
    async fn test_short_response_is_padded_with_empty_patches() {
        let planner = planner_with(r#"[{"a": 1}]"#);
        let patches = planner.propose_patches("p", &base(), "", 3).await;
        assert_eq!(patches.len(), 3);
        assert_eq!(patches[0], json!({"a": 1}));
        assert_eq!(patches[1], json!({}));
        assert_eq!(patches[2], json!({}));
    }

    #[tokio::test]
    async fn test_long_response_is_truncated() {
        let planner = planner_with(r#"[{"a":1},{"b":2},{"c":3},{"d":4},{"e":5}]"#);
        let patches = planner.propose_patches("p", &base(), "", 2).await;
        assert_eq!(patches, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[tokio::test]
    async fn test_non_object_items_become_empty_patches() {
        let planner = planner_with(r#"[{"a": 1}, "just a caption", 42]"#);
        let patches = planner.propose_patches("p", &base(), "", 3).await;
        assert_eq!(patches, vec![json!({"a": 1}), json!({}), json!({})]);
    }

    #[tokio::test]
    async fn test_fenced_response_is_accepted() {
        let planner = planner_with("```json\n[{\"a\": 1}, {\"b\": 2}]\n```");
        let patches = planner.propose_patches("p", &base(), "", 2).await;
        assert_eq!(patches, vec![json!({"a": 1}), json!({"b": 2})]);
    }
}
