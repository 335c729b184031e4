use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::form_urlencoded;

use super::{ApiClient, ApiError};
use crate::types::{MediaAsset, MediaListResponse};

const OUTPUT_PATH: &str = "/media-assets/output/facefusion";
pub const MEDIA_PAGE_SIZE: u64 = 100;

pub const PROXY_ROUTE: &str = "/api/media/proxy";
pub const DOWNLOAD_ROUTE: &str = "/api/media/download";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedAsset {
    pub id: String,
    pub object_key: String,
    #[serde(rename = "type", default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub related_jobs: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMediaResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub deleted_asset: Option<DeletedAsset>,
}

impl ApiClient {
    /// `GET /media-assets/output/facefusion?skip=&take=`
    pub async fn media_page(&self, skip: u64, take: u64) -> Result<MediaListResponse, ApiError> {
        self.get_json_query(OUTPUT_PATH, &[("skip", skip), ("take", take)])
            .await
    }

    /// Follow `pagination.hasMore` until exhausted. Without pagination the
    /// first page is the whole list.
    pub async fn all_media(&self) -> Result<Vec<MediaAsset>, ApiError> {
        let first = self.media_page(0, MEDIA_PAGE_SIZE).await?;
        let mut assets = first.data;
        let Some(mut pagination) = first.pagination else {
            return Ok(assets);
        };

        while pagination.has_more {
            let next = self
                .media_page(pagination.skip + pagination.take, pagination.take)
                .await?;
            let fetched = next.data.len();
            assets.extend(next.data);
            match next.pagination {
                Some(page) if fetched > 0 => pagination = page,
                _ => break,
            }
        }
        Ok(assets)
    }

    /// Total output count from a one-item page.
    pub async fn media_total(&self) -> Result<u64, ApiError> {
        let page = self.media_page(0, 1).await?;
        Ok(page
            .pagination
            .map_or(page.data.len() as u64, |pagination| pagination.total))
    }

    /// `DELETE /media-assets/output/:id`
    pub async fn delete_media(&self, id: &str) -> Result<DeleteMediaResponse, ApiError> {
        self.send_json(self.request(Method::DELETE, &format!("/media-assets/output/{id}"))?)
            .await
    }
}

/// Relative gateway URL that redirects to a signed preview of `asset`.
pub fn proxy_url(asset: &MediaAsset) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("p", &asset.gateway_path())
        .finish();
    format!("{PROXY_ROUTE}?{query}")
}

/// Relative gateway URL that downloads `asset` under its key's file name.
pub fn download_url(asset: &MediaAsset) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("p", &asset.gateway_path())
        .append_pair("filename", asset.file_name())
        .finish();
    format!("{DOWNLOAD_ROUTE}?{query}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaType;

    fn asset(key: &str) -> MediaAsset {
        MediaAsset {
            id: "m1".to_string(),
            media_type: MediaType::Video,
            bucket: "facefusion-output".to_string(),
            object_key: key.to_string(),
            path: None,
            mime_type: "video/mp4".to_string(),
            width: None,
            height: None,
            duration_sec: None,
            size_bytes: 0,
            created_at: "2026-10-01T00:00:00Z".to_string(),
            output_for_jobs: Vec::new(),
        }
    }

    #[test]
    fn proxy_url_encodes_composite_path() {
        assert_eq!(
            proxy_url(&asset("results/u1/out file.mp4")),
            "/api/media/proxy?p=facefusion-output%2Fresults%2Fu1%2Fout+file.mp4"
        );
    }

    #[test]
    fn download_url_uses_last_key_segment() {
        assert_eq!(
            download_url(&asset("results/u1/result.mp4")),
            "/api/media/download?p=facefusion-output%2Fresults%2Fu1%2Fresult.mp4&filename=result.mp4"
        );
        assert!(download_url(&asset("results/")).ends_with("&filename=download"));
    }
}
