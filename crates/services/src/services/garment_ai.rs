//! Service for AI-assisted catalog enrichment of garments and accessories.

use std::{sync::Arc, time::Duration};

use futures::{StreamExt, stream};
use thiserror::Error;
use tokio::{
    sync::Mutex,
    time::{self, MissedTickBehavior},
};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    ai_gateway::{AiGateway, ChatTransport, GatewayError},
    analysis_history::{AnalysisHistory, AnalysisHistoryEntry},
    config::GarmentAiConfig,
    garment_prompts::{
        ImageData, ItemInfo, ItemSummary, PromptError, UserProfile, build_analysis_prompt,
        build_compatibility_prompt, build_description_prompt, build_wardrobe_gaps_prompt,
    },
    response_interpreter::{EnrichmentResult, ResponseInterpreter},
};

#[derive(Debug, Error)]
pub enum GarmentAiError {
    #[error("invalid request: {0}")]
    Prompt(#[from] PromptError),
    #[error("ai gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

impl GarmentAiError {
    /// Input or configuration problems the caller must fix before retrying
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Prompt(_) | Self::Gateway(GatewayError::MissingApiKey)
        )
    }
}

/// One item of a batch description run
#[derive(Debug, Clone)]
pub struct DescribeRequest {
    pub item_id: Uuid,
    pub image: ImageData,
    pub item_info: ItemInfo,
}

#[derive(Debug)]
pub struct DescribeOutcome {
    pub item_id: Uuid,
    pub result: Result<String, GarmentAiError>,
}

/// Enrichment entry point used by the routes and the batch migration
#[derive(Clone)]
pub struct GarmentAiService {
    gateway: Arc<AiGateway>,
    interpreter: Arc<ResponseInterpreter>,
    batch_concurrency: usize,
    batch_delay: Duration,
}

impl GarmentAiService {
    /// Service backed by the HTTPS gateway
    pub fn from_config(config: GarmentAiConfig) -> Result<Self, GarmentAiError> {
        let (batch_concurrency, batch_delay) = (config.batch_concurrency, config.batch_delay);
        let gateway = AiGateway::from_config(config)?;
        Ok(Self::new(gateway, batch_concurrency, batch_delay))
    }

    pub fn with_transport(transport: Arc<dyn ChatTransport>, config: GarmentAiConfig) -> Self {
        let (batch_concurrency, batch_delay) = (config.batch_concurrency, config.batch_delay);
        Self::new(
            AiGateway::with_transport(transport, config),
            batch_concurrency,
            batch_delay,
        )
    }

    fn new(gateway: AiGateway, batch_concurrency: usize, batch_delay: Duration) -> Self {
        Self {
            gateway: Arc::new(gateway),
            interpreter: Arc::new(ResponseInterpreter::new(Arc::new(AnalysisHistory::new()))),
            batch_concurrency: batch_concurrency.max(1),
            batch_delay,
        }
    }

    /// Suggest catalog fields and a description for the pictured item.
    ///
    /// Unreadable replies are not errors; they come back as a fallback result.
    pub async fn enrich(
        &self,
        image: Option<&ImageData>,
        profile: Option<&UserProfile>,
        item_info: Option<&ItemInfo>,
    ) -> Result<EnrichmentResult, GarmentAiError> {
        let prompt = build_analysis_prompt(image, profile, item_info)?;
        let raw = self.gateway.complete(prompt.messages).await?;

        let result = self
            .interpreter
            .interpret_analysis(&raw, &prompt.vocabulary, item_info);

        info!(
            item_name = %result.form_data.name,
            category = %result.form_data.category,
            source = ?result.source,
            overall_confidence = result.confidence.overall,
            "Completed garment analysis"
        );
        Ok(result)
    }

    /// Free-text description of the pictured item
    pub async fn describe(
        &self,
        image: Option<&ImageData>,
        item_info: Option<&ItemInfo>,
    ) -> Result<String, GarmentAiError> {
        let messages = build_description_prompt(image, item_info)?;
        let raw = self.gateway.complete(messages).await?;
        Ok(self.interpreter.interpret_description(&raw, item_info))
    }

    /// Styling narrative for how a set of items work together
    pub async fn compatibility(&self, items: &[ItemSummary]) -> Result<String, GarmentAiError> {
        let messages = build_compatibility_prompt(items)?;
        Ok(self.gateway.complete(messages).await?)
    }

    /// Narrative scan of the whole catalog for missing pieces
    pub async fn wardrobe_gaps(
        &self,
        items: &[ItemSummary],
        profile: Option<&UserProfile>,
    ) -> Result<String, GarmentAiError> {
        let messages = build_wardrobe_gaps_prompt(items, profile)?;
        Ok(self.gateway.complete(messages).await?)
    }

    /// Describe many items with bounded fan-out. Call starts are spaced at least
    /// `batch_delay` apart; each item settles on its own and outcomes are returned
    /// in request order.
    pub async fn describe_many(&self, requests: Vec<DescribeRequest>) -> Vec<DescribeOutcome> {
        let total = requests.len();
        info!(
            total,
            concurrency = self.batch_concurrency,
            delay_ms = self.batch_delay.as_millis() as u64,
            "Starting batch description run"
        );

        // First tick is immediate, later ticks wait a full period after the previous one
        let pacer = (!self.batch_delay.is_zero()).then(|| {
            let mut interval = time::interval(self.batch_delay);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Mutex::new(interval)
        });
        let pacer = pacer.as_ref();

        let mut outcomes: Vec<(usize, DescribeOutcome)> =
            stream::iter(requests.into_iter().enumerate())
                .map(|(index, request)| async move {
                    if let Some(pacer) = pacer {
                        pacer.lock().await.tick().await;
                    }
                    let result = self
                        .describe(Some(&request.image), Some(&request.item_info))
                        .await;
                    if let Err(e) = &result {
                        warn!(item_id = %request.item_id, error = %e, "Batch description failed");
                    }
                    (
                        index,
                        DescribeOutcome {
                            item_id: request.item_id,
                            result,
                        },
                    )
                })
                .buffer_unordered(self.batch_concurrency)
                .collect()
                .await;

        outcomes.sort_by_key(|(index, _)| *index);
        let outcomes: Vec<DescribeOutcome> = outcomes.into_iter().map(|(_, o)| o).collect();

        info!(
            total,
            failed = outcomes.iter().filter(|o| o.result.is_err()).count(),
            "Finished batch description run"
        );
        outcomes
    }

    /// Recent analyses, newest first
    pub fn history(&self) -> Vec<AnalysisHistoryEntry> {
        self.interpreter.history().entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        ai_gateway::tests::{
            InFlightTransport, ScriptedTransport, UnreachableTransport, test_config,
        },
        analysis_history::HISTORY_CAPACITY,
        response_interpreter::ResultSource,
    };

    const CAMISA_REPLY: &str = "Based on the image, here is the result: {\"formData\":{\"name\":\"Camisa Azul\",\"category\":\"Camisas\",\"color\":\"Azul\",\"brand\":\"Zara\",\"suggestedTags\":[\"casual\"],\"notes\":\"\"},\"aiMetadata\":\"A blue cotton shirt...\",\"confidence\":{\"category\":9,\"color\":8,\"overall\":8}}";

    fn image() -> ImageData {
        ImageData::Url {
            url: "https://img.example/camisa.jpg".to_string(),
        }
    }

    fn female() -> UserProfile {
        UserProfile {
            gender: Some("female".to_string()),
        }
    }

    fn service(transport: Arc<dyn ChatTransport>) -> GarmentAiService {
        GarmentAiService::with_transport(transport, test_config())
    }

    #[tokio::test]
    async fn test_enrich_returns_parsed_result() {
        let transport = Arc::new(ScriptedTransport::replying(CAMISA_REPLY));
        let service = service(transport.clone());
        let info = ItemInfo {
            name: Some("".to_string()),
            category: Some("".to_string()),
            color: Some("".to_string()),
            ..ItemInfo::default()
        };

        let result = service
            .enrich(Some(&image()), Some(&female()), Some(&info))
            .await
            .unwrap();

        assert_eq!(result.source, ResultSource::Parsed);
        assert_eq!(result.form_data.name, "Camisa Azul");
        assert_eq!(result.confidence.overall, 8);
        assert_eq!(transport.call_count(), 1);

        let history = service.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].item_name, "Camisa Azul");
    }

    #[tokio::test]
    async fn test_enrich_degrades_unreadable_reply() {
        let service = service(Arc::new(ScriptedTransport::replying(
            "I cannot analyze this image.",
        )));

        let result = service
            .enrich(Some(&image()), Some(&female()), None)
            .await
            .unwrap();

        assert!(result.is_fallback());
        assert_eq!(result.form_data.category, "Camisas");
        assert_eq!(result.confidence.overall, 5);
        assert_eq!(result.ai_metadata, "I cannot analyze this image.");
        assert_eq!(service.history().len(), 1);
    }

    #[tokio::test]
    async fn test_enrich_degrades_blank_reply() {
        let transport = Arc::new(ScriptedTransport::replying(""));
        let service = service(transport.clone());

        let result = service.enrich(Some(&image()), None, None).await.unwrap();

        assert!(result.is_fallback());
        assert_eq!(result.confidence.overall, 5);
        assert_eq!(transport.call_count(), 1);
        assert_eq!(service.history().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_image_fails_before_any_call() {
        let service = service(Arc::new(UnreachableTransport));

        let err = service.enrich(None, None, None).await.unwrap_err();
        assert!(matches!(err, GarmentAiError::Prompt(PromptError::MissingImage)));
        assert!(err.is_precondition());
        assert!(service.history().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_any_call() {
        let config = GarmentAiConfig {
            api_key: None,
            ..GarmentAiConfig::default()
        };
        let service = GarmentAiService::with_transport(Arc::new(UnreachableTransport), config);

        let err = service
            .describe(Some(&image()), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GarmentAiError::Gateway(GatewayError::MissingApiKey)
        ));
        assert!(err.is_precondition());
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let transport = Arc::new(ScriptedTransport::new(vec![Err(GatewayError::Http {
            status: 500,
            body: "boom".to_string(),
        })]));
        let service = service(transport.clone());

        let err = service
            .enrich(Some(&image()), None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GarmentAiError::Gateway(GatewayError::Http { status: 500, .. })
        ));
        assert!(!err.is_precondition());
        assert_eq!(transport.call_count(), 1);
        assert!(service.history().is_empty());
    }

    #[tokio::test]
    async fn test_history_stays_bounded_across_calls() {
        let service = service(Arc::new(ScriptedTransport::replying(CAMISA_REPLY)));
        for _ in 0..(HISTORY_CAPACITY + 5) {
            service
                .enrich(Some(&image()), Some(&female()), None)
                .await
                .unwrap();
        }
        assert_eq!(service.history().len(), HISTORY_CAPACITY);
    }

    #[tokio::test]
    async fn test_advisory_calls_return_raw_reply() {
        let reply = "Combinan bien: el azul y el beige se equilibran.";
        let service = service(Arc::new(ScriptedTransport::replying(reply)));
        let items = vec![
            ItemSummary {
                name: "Camisa".to_string(),
                kind: Default::default(),
                category: "Camisas".to_string(),
                color: "Azul".to_string(),
                ai_metadata: None,
            },
            ItemSummary {
                name: "Chino".to_string(),
                kind: Default::default(),
                category: "Pantalones".to_string(),
                color: "Beige".to_string(),
                ai_metadata: None,
            },
        ];

        assert_eq!(service.compatibility(&items).await.unwrap(), reply);
        assert_eq!(
            service.wardrobe_gaps(&items, Some(&female())).await.unwrap(),
            reply
        );
        assert!(service.history().is_empty());
    }

    fn batch(names: &[&str]) -> Vec<DescribeRequest> {
        names
            .iter()
            .map(|name| DescribeRequest {
                item_id: Uuid::new_v4(),
                image: image(),
                item_info: ItemInfo {
                    name: Some(name.to_string()),
                    ..ItemInfo::default()
                },
            })
            .collect()
    }

    #[tokio::test]
    async fn test_describe_many_bounds_fan_out_and_keeps_order() {
        let transport = Arc::new(InFlightTransport::new(Duration::from_millis(10)));
        let config = GarmentAiConfig {
            batch_concurrency: 2,
            batch_delay: Duration::ZERO,
            ..test_config()
        };
        let service = GarmentAiService::with_transport(transport.clone(), config);

        let requests = batch(&["item-0", "item-1", "item-2", "FALLA", "item-4", "item-5"]);
        let ids: Vec<Uuid> = requests.iter().map(|r| r.item_id).collect();

        let outcomes = service.describe_many(requests).await;

        assert_eq!(outcomes.iter().map(|o| o.item_id).collect::<Vec<_>>(), ids);
        assert!(outcomes[3].result.is_err());
        assert_eq!(outcomes.iter().filter(|o| o.result.is_ok()).count(), 5);
        assert!(transport.peak() <= 2);
    }

    #[tokio::test]
    async fn test_describe_many_spaces_call_starts() {
        let delay = Duration::from_millis(60);
        let transport = Arc::new(InFlightTransport::new(Duration::from_millis(5)));
        let config = GarmentAiConfig {
            batch_concurrency: 3,
            batch_delay: delay,
            ..test_config()
        };
        let service = GarmentAiService::with_transport(transport.clone(), config);

        let outcomes = service.describe_many(batch(&["a", "b", "c"])).await;
        assert!(outcomes.iter().all(|o| o.result.is_ok()));

        let starts = transport.starts();
        assert_eq!(starts.len(), 3);
        for pair in starts.windows(2) {
            // Small slack for timer granularity
            assert!(
                pair[1] - pair[0] >= delay - Duration::from_millis(10),
                "calls started {:?} apart",
                pair[1] - pair[0]
            );
        }
        assert!(starts[2] - starts[0] >= 2 * delay - Duration::from_millis(10));
    }
}
