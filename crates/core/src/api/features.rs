use reqwest::Method;
use serde::Serialize;
use tracing::{debug, warn};

use super::{ApiClient, ApiError};
use crate::submission::FALLBACK_FACE_SWAPPER_MODELS;
use crate::types::{Feature, FeaturesPage, PROCESSOR_OPTION_TYPE, STATUS_ACTIVE};

pub const FEATURE_PAGE_SIZE: u64 = 200;
pub const FACE_SWAPPER_MODEL_CATEGORY: &str = "face_swapper_model";

/// Option categories used when `/features/model-categories` is unavailable.
pub const FALLBACK_MODEL_CATEGORIES: [&str; 6] = [
    "face_swapper_model",
    "face_enhancer_model",
    "frame_enhancer_model",
    "face_detector_model",
    "lip_syncer_model",
    "deep_swapper_model",
];

/// Body for `POST /features`.
#[derive(Debug, Clone, Serialize)]
pub struct NewFeature {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub weight: u32,
}

/// Body for `PATCH /features/:id`. Weight is not editable after creation.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureUpdate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
}

impl From<&Feature> for FeatureUpdate {
    fn from(feature: &Feature) -> Self {
        Self {
            name: feature.name.clone(),
            value: feature.value.clone(),
            kind: feature.kind.clone(),
            status: feature.status.clone(),
        }
    }
}

impl ApiClient {
    /// `GET /features?skip=&take=`
    pub async fn features_page(&self, skip: u64, take: u64) -> Result<FeaturesPage, ApiError> {
        self.get_json_query("/features", &[("skip", skip), ("take", take)])
            .await
    }

    /// Walk every page of the catalog. Stops at `total`, or on the first
    /// empty page when the server omits it.
    pub async fn all_features(&self) -> Result<Vec<Feature>, ApiError> {
        let mut skip = 0;
        let mut features = Vec::new();
        loop {
            let page = self.features_page(skip, FEATURE_PAGE_SIZE).await?;
            let fetched = page.items.len();
            features.extend(page.items);

            let total = page.total.unwrap_or(features.len() as u64);
            if features.len() as u64 >= total || fetched == 0 {
                break;
            }
            skip += FEATURE_PAGE_SIZE;
        }
        debug!(count = features.len(), "Loaded feature catalog");
        Ok(features)
    }

    /// `GET /features/:id`
    pub async fn feature(&self, id: i64) -> Result<Feature, ApiError> {
        self.get_json(&format!("/features/{id}")).await
    }

    /// `POST /features`
    pub async fn create_feature(&self, feature: &NewFeature) -> Result<Feature, ApiError> {
        self.send_body(Method::POST, "/features", feature).await
    }

    /// `PATCH /features/:id`
    pub async fn update_feature(&self, id: i64, update: &FeatureUpdate) -> Result<Feature, ApiError> {
        self.send_body(Method::PATCH, &format!("/features/{id}"), update)
            .await
    }

    /// `DELETE /features/:id`
    pub async fn delete_feature(&self, id: i64) -> Result<(), ApiError> {
        self.send_empty(Method::DELETE, &format!("/features/{id}"))
            .await
    }

    /// `GET /features/model-categories`, falling back to the built-in list.
    pub async fn model_categories(&self) -> Vec<String> {
        match self.get_json::<Vec<String>>("/features/model-categories").await {
            Ok(categories) if !categories.is_empty() => categories,
            Ok(_) => fallback_strings(&FALLBACK_MODEL_CATEGORIES),
            Err(error) => {
                warn!(%error, "Model categories unavailable; using built-in list");
                fallback_strings(&FALLBACK_MODEL_CATEGORIES)
            }
        }
    }

    /// `GET /features/processor-options/category/:category`
    pub async fn models_by_category(&self, category: &str) -> Result<Vec<Feature>, ApiError> {
        self.get_json(&format!("/features/processor-options/category/{category}"))
            .await
    }

    /// `GET /features/processor-options`
    pub async fn processor_options(&self) -> Result<Vec<Feature>, ApiError> {
        self.get_json("/features/processor-options").await
    }

    /// `GET /features/core-processors`
    pub async fn core_processors(&self) -> Result<Vec<Feature>, ApiError> {
        self.get_json("/features/core-processors").await
    }

    /// Active face swapper model names, or the built-in pair when the
    /// lookup fails or comes back empty.
    pub async fn face_swapper_models(&self) -> Vec<String> {
        match self.models_by_category(FACE_SWAPPER_MODEL_CATEGORY).await {
            Ok(options) => {
                let names = active_option_names(&options);
                if names.is_empty() {
                    fallback_strings(&FALLBACK_FACE_SWAPPER_MODELS)
                } else {
                    names
                }
            }
            Err(error) => {
                warn!(%error, "Face swapper models unavailable; using built-in list");
                fallback_strings(&FALLBACK_FACE_SWAPPER_MODELS)
            }
        }
    }
}

/// Option value (or name) of every active `processor_option` entry.
pub fn active_option_names(options: &[Feature]) -> Vec<String> {
    options
        .iter()
        .filter(|option| option.kind == PROCESSOR_OPTION_TYPE && option.status == STATUS_ACTIVE)
        .map(|option| option.value.clone().unwrap_or_else(|| option.name.clone()))
        .collect()
}

fn fallback_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
