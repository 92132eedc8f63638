use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    Distance, FieldType, Filter, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use uuid::Uuid;

use crate::gemini_client::{GeminiClient, EMBEDDING_DIMENSIONS};
use crate::services::retrieval::ContentKey;

#[derive(Clone)]
pub struct QdrantClient {
    client: Qdrant,
    collection_name: String,
    top_k: u64,
    score_threshold: f32,
}

/// One retrieved textbook chunk with its similarity score.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub text: String,
    pub chunk_index: i64,
    pub score: f32,
}

impl QdrantClient {
    pub async fn new(
        url: String,
        api_key: Option<String>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let mut client_builder = Qdrant::from_url(&url);

        if let Some(key) = api_key {
            client_builder = client_builder.api_key(key);
        }

        let client = client_builder.build()?;

        let top_k = std::env::var("QDRANT_TOP_K")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(4);
        let score_threshold = std::env::var("QDRANT_SCORE_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(0.0);

        Ok(Self {
            client,
            collection_name: "textbook_chunks".to_string(),
            top_k,
            score_threshold,
        })
    }

    pub async fn create_collection(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!("Creating Qdrant collection: {}", self.collection_name);

        let result = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection_name).vectors_config(
                    VectorParamsBuilder::new(EMBEDDING_DIMENSIONS as u64, Distance::Cosine),
                ),
            )
            .await;

        match result {
            Ok(_) => {
                tracing::info!("Successfully created Qdrant collection: {}", self.collection_name);
                self.create_payload_indexes().await?;
                Ok(())
            }
            Err(e) => {
                let error_msg = e.to_string();
                if error_msg.contains("already exists") {
                    tracing::debug!(
                        "Qdrant collection '{}' already exists, ensuring indexes exist",
                        self.collection_name
                    );
                    self.create_payload_indexes().await?;
                } else {
                    tracing::warn!(
                        "Failed to create Qdrant collection '{}': {}",
                        self.collection_name,
                        e
                    );
                }
                Ok(())
            }
        }
    }

    async fn create_payload_indexes(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Chunks are always filtered by content_key; a keyword index keeps
        // that filter off the scroll path.
        let index_result = self
            .client
            .create_field_index(
                CreateFieldIndexCollectionBuilder::new(
                    &self.collection_name,
                    "content_key",
                    FieldType::Keyword,
                )
                .wait(true),
            )
            .await;

        match index_result {
            Ok(_) => tracing::info!("Created content_key index"),
            Err(e) => {
                if e.to_string().contains("already exists") {
                    tracing::debug!("content_key index already exists, skipping");
                } else {
                    tracing::warn!("Failed to create content_key index: {}", e);
                }
            }
        }

        Ok(())
    }

    /// Replace every stored chunk for a chapter with a freshly embedded set.
    /// Returns the number of chunks written.
    pub async fn replace_chapter_chunks(
        &self,
        key: &ContentKey,
        chunks: &[String],
        gemini_client: &GeminiClient,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let content_key = key.encode();

        // Drop the chapter's previous chunks so re-uploads never leave stale text behind
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection_name)
                    .points(Filter::must([Condition::matches(
                        "content_key",
                        content_key.clone(),
                    )]))
                    .wait(true),
            )
            .await?;

        let mut points = Vec::with_capacity(chunks.len());
        for (chunk_index, chunk) in chunks.iter().enumerate() {
            let embedding = gemini_client.embed_content(chunk).await?;

            let payload: Payload = json!({
                "content_key": content_key,
                "class_level": key.class_level,
                "subject": key.subject,
                "chapter_id": key.chapter_id,
                "chunk_index": chunk_index as i64,
                "text": chunk,
            })
            .try_into()
            .map_err(|e| format!("Failed to build chunk payload: {}", e))?;

            points.push(PointStruct::new(
                Uuid::new_v4().to_string(),
                embedding,
                payload,
            ));
        }

        let written = points.len();
        if written > 0 {
            self.client
                .upsert_points(
                    UpsertPointsBuilder::new(&self.collection_name, points).wait(true),
                )
                .await?;
        }

        tracing::debug!("Stored {} textbook chunks for {}", written, content_key);
        Ok(written)
    }

    /// Top-k similarity search over one chapter's chunks.
    pub async fn search_chunks(
        &self,
        query_embedding: Vec<f32>,
        key: &ContentKey,
    ) -> Result<Vec<ChunkHit>, Box<dyn std::error::Error + Send + Sync>> {
        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection_name, query_embedding, self.top_k)
                    .filter(Filter::must([Condition::matches(
                        "content_key",
                        key.encode(),
                    )]))
                    .score_threshold(self.score_threshold)
                    .with_payload(true),
            )
            .await?;

        let mut hits = Vec::new();
        for scored_point in search_result.result {
            let payload = scored_point.payload;

            let text = match payload.get("text").and_then(|v| v.as_str()) {
                Some(t) => t.to_string(),
                None => continue,
            };
            let chunk_index = payload
                .get("chunk_index")
                .and_then(|v| v.as_integer())
                .unwrap_or(0);

            hits.push(ChunkHit {
                text,
                chunk_index,
                score: scored_point.score,
            });
        }

        Ok(hits)
    }

    /// Embed the student's question and concatenate the best-matching chunk
    /// texts. Empty string when nothing matches; the caller applies the
    /// fallback and the character budget.
    pub async fn build_context_for_query(
        &self,
        query: &str,
        key: &ContentKey,
        gemini_client: &GeminiClient,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let query_embedding = gemini_client.embed_content(query).await?;
        let mut hits = self.search_chunks(query_embedding, key).await?;

        if hits.is_empty() {
            return Ok(String::new());
        }

        tracing::debug!(
            "Qdrant returned {} chunks for {} (best score {:.3})",
            hits.len(),
            key.encode(),
            hits.first().map(|h| h.score).unwrap_or(0.0)
        );

        // Present the winning chunks in document order, not score order
        hits.sort_by_key(|h| h.chunk_index);

        let context = hits
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(context)
    }
}
