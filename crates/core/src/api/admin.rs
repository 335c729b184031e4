use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ApiClient, ApiError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: i64,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlansPage {
    #[serde(default)]
    pub items: Vec<Plan>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// Body for `POST /plans` and `PUT /plans/:id`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

/// Limits attached to a plan version. Keys follow the backend's snake_case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitlementLimits {
    pub max_processors_per_job: u32,
    pub max_weight_per_job: u32,
    pub daily_weight_quota: u64,
    pub max_video_sec: u32,
    pub max_resolution: String,
    pub watermark: bool,
    pub concurrency: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRef {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    pub id: i64,
    pub plan_id: i64,
    pub version: u32,
    #[serde(default)]
    pub entitlements: EntitlementLimits,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub plan: Option<PlanRef>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntitlement {
    pub plan_id: i64,
    pub version: u32,
    #[serde(flatten)]
    pub limits: EntitlementLimits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub role: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub plan_code: String,
    pub plan_name: String,
    #[serde(default)]
    pub plan_priority: i64,
    pub status: String,
    #[serde(default)]
    pub current_start: Option<String>,
    #[serde(default)]
    pub billing_ref: Option<String>,
    #[serde(default)]
    pub entitlements: Map<String, Value>,
    #[serde(default)]
    pub plan_limits: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWithSubscription {
    #[serde(flatten)]
    pub user: User,
    #[serde(default)]
    pub subscription: Option<Subscription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuota {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub plan: Option<Value>,
    #[serde(default)]
    pub jobs_this_month: u64,
    #[serde(default)]
    pub plan_entitlements: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionChange {
    pub plan: String,
    pub status: String,
}

impl ApiClient {
    /// `GET /plans`
    pub async fn plans(&self) -> Result<PlansPage, ApiError> {
        self.get_json("/plans").await
    }

    pub async fn plan(&self, id: i64) -> Result<Plan, ApiError> {
        self.get_json(&format!("/plans/{id}")).await
    }

    pub async fn create_plan(&self, input: &PlanInput) -> Result<Plan, ApiError> {
        self.send_body(Method::POST, "/plans", input).await
    }

    pub async fn update_plan(&self, id: i64, input: &PlanInput) -> Result<Plan, ApiError> {
        self.send_body(Method::PUT, &format!("/plans/{id}"), input)
            .await
    }

    pub async fn delete_plan(&self, id: i64) -> Result<(), ApiError> {
        self.send_empty(Method::DELETE, &format!("/plans/{id}"))
            .await
    }

    /// `GET /entitlements`
    pub async fn entitlements(&self) -> Result<Vec<Entitlement>, ApiError> {
        self.get_json("/entitlements").await
    }

    pub async fn entitlements_for_plan(&self, plan_id: i64) -> Result<Vec<Entitlement>, ApiError> {
        self.get_json(&format!("/entitlements/plan/{plan_id}"))
            .await
    }

    pub async fn latest_entitlement(&self, plan_id: i64) -> Result<Entitlement, ApiError> {
        self.get_json(&format!("/entitlements/plan/{plan_id}/latest"))
            .await
    }

    pub async fn create_entitlement(&self, input: &NewEntitlement) -> Result<Entitlement, ApiError> {
        self.send_body(Method::POST, "/entitlements", input).await
    }

    pub async fn update_entitlement(
        &self,
        id: i64,
        limits: &EntitlementLimits,
    ) -> Result<Entitlement, ApiError> {
        self.send_body(Method::PUT, &format!("/entitlements/{id}"), limits)
            .await
    }

    pub async fn delete_entitlement(&self, id: i64) -> Result<(), ApiError> {
        self.send_empty(Method::DELETE, &format!("/entitlements/{id}"))
            .await
    }

    /// `GET /user`
    pub async fn users(&self) -> Result<Vec<User>, ApiError> {
        self.get_json("/user").await
    }

    pub async fn user(&self, id: &str) -> Result<User, ApiError> {
        self.get_json(&format!("/user/{id}")).await
    }

    /// `GET /user/me`
    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.get_json("/user/me").await
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), ApiError> {
        self.send_empty(Method::DELETE, &format!("/user/{id}"))
            .await
    }

    /// `GET /user/subscriptions`
    pub async fn subscriptions(&self) -> Result<Vec<UserWithSubscription>, ApiError> {
        self.get_json("/user/subscriptions").await
    }

    /// `GET /user/:id/quota`
    pub async fn user_quota(&self, user_id: &str) -> Result<UserQuota, ApiError> {
        self.get_json(&format!("/user/{user_id}/quota")).await
    }

    /// `PUT /user/:id/subscription`
    pub async fn update_subscription(
        &self,
        user_id: &str,
        change: &SubscriptionChange,
    ) -> Result<Value, ApiError> {
        self.send_body(Method::PUT, &format!("/user/{user_id}/subscription"), change)
            .await
    }
}
